use crate::content::metadata::{page_metadata, visible_text, PageMetadata};
use crate::content::{ContentExtractor, Extraction};
use scraper::{Html, Selector};
use url::Url;

/// Containers that usually hold the main content, in priority order
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    ".content",
    ".post-content",
    ".entry-content",
];

/// Extracts text from the first well-known content container
pub struct SelectorExtractor {
    selectors: Vec<Selector>,
}

impl SelectorExtractor {
    /// Builds an extractor from custom container selectors
    ///
    /// Selectors that fail to parse are ignored.
    pub fn with_selectors(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
        }
    }
}

impl Default for SelectorExtractor {
    fn default() -> Self {
        Self::with_selectors(CONTENT_SELECTORS)
    }
}

impl ContentExtractor for SelectorExtractor {
    fn name(&self) -> &'static str {
        "selector"
    }

    fn extract(&self, html: &str, _base_url: Option<&Url>) -> Extraction {
        let document = Html::parse_document(html);
        let text = self
            .selectors
            .iter()
            .find_map(|selector| {
                document
                    .select(selector)
                    .map(visible_text)
                    .find(|text| !text.is_empty())
            })
            .unwrap_or_default();

        with_metadata(text, page_metadata(&document))
    }
}

/// Extracts all visible body text, dropping markup
pub struct TagStripExtractor;

impl ContentExtractor for TagStripExtractor {
    fn name(&self) -> &'static str {
        "tag-strip"
    }

    fn extract(&self, html: &str, _base_url: Option<&Url>) -> Extraction {
        let document = Html::parse_document(html);
        let text = Selector::parse("body")
            .ok()
            .and_then(|body| document.select(&body).next())
            .map(visible_text)
            .unwrap_or_else(|| visible_text(document.root_element()));

        with_metadata(text, page_metadata(&document))
    }
}

fn with_metadata(text: String, meta: PageMetadata) -> Extraction {
    Extraction {
        ok: !text.is_empty(),
        title: meta.title,
        text,
        language: meta.language,
        author: meta.author,
        published_date: meta.published_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_prefers_article() {
        let html = r#"<html><body>
            <header>Site header</header>
            <article><h2>Story</h2><p>The body of the story.</p></article>
            <footer>Footer</footer>
        </body></html>"#;
        let extraction = SelectorExtractor::default().extract(html, None);
        assert!(extraction.ok);
        assert_eq!(extraction.text, "Story The body of the story.");
    }

    #[test]
    fn test_selector_falls_through_priority() {
        let html = r#"<html><body><div id="content">From id</div><div class="content">From class</div></body></html>"#;
        let extraction = SelectorExtractor::default().extract(html, None);
        assert_eq!(extraction.text, "From id");
    }

    #[test]
    fn test_selector_not_ok_without_container() {
        let html = "<html><body><div>Loose text</div></body></html>";
        let extraction = SelectorExtractor::default().extract(html, None);
        assert!(!extraction.ok);
        assert!(extraction.text.is_empty());
    }

    #[test]
    fn test_tag_strip_ignores_head_and_scripts() {
        let html = r#"<html><head><title>T</title><script>a()</script></head>
            <body><p>One</p><noscript>Enable JS</noscript><p>Two</p></body></html>"#;
        let extraction = TagStripExtractor.extract(html, None);
        assert_eq!(extraction.text, "One Two");
        assert_eq!(extraction.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_custom_selectors() {
        let extractor = SelectorExtractor::with_selectors(&[".story", "not a [valid"]);
        let html = r#"<html><body><div class="story">Custom</div></body></html>"#;
        assert_eq!(extractor.extract(html, None).text, "Custom");
    }
}
