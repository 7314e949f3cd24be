//! Page metadata helpers shared by the built-in extractors

use scraper::{ElementRef, Html, Selector};

/// Elements whose text never counts as page content
pub(crate) const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Metadata read from the document head
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PageMetadata {
    pub title: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
}

pub(crate) fn page_metadata(document: &Html) -> PageMetadata {
    PageMetadata {
        title: extract_title(document),
        language: first_attr(document, "html[lang]", "lang").map(|lang| normalize_language(&lang)),
        author: first_attr(document, "meta[name='author'][content]", "content"),
        published_date: first_attr(
            document,
            "meta[property='article:published_time'][content]",
            "content",
        )
        .or_else(|| first_attr(document, "time[datetime]", "datetime")),
    }
}

/// Extracts the page title
///
/// Prefers `<title>`, then `og:title`, then the first `<h1>`.
fn extract_title(document: &Html) -> Option<String> {
    first_text(document, "title")
        .or_else(|| first_attr(document, "meta[property='og:title'][content]", "content"))
        .or_else(|| first_text(document, "h1"))
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Primary language subtag, lowercased (`en-US` -> `en`)
pub(crate) fn normalize_language(lang: &str) -> String {
    lang.trim()
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Visible text under an element, skipping non-content subtrees
pub(crate) fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|element| NON_CONTENT_TAGS.contains(&element.name()))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_metadata() {
        let html = r#"<html lang="en-US"><head>
            <title>  My   Article </title>
            <meta name="author" content="Jane Roe">
            <meta property="article:published_time" content="2024-03-01T10:00:00Z">
        </head><body></body></html>"#;
        let meta = page_metadata(&Html::parse_document(html));
        assert_eq!(meta.title.as_deref(), Some("My Article"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.author.as_deref(), Some("Jane Roe"));
        assert_eq!(meta.published_date.as_deref(), Some("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn test_title_fallbacks() {
        let og = r#"<html><head><meta property="og:title" content="OG"></head></html>"#;
        assert_eq!(page_metadata(&Html::parse_document(og)).title.as_deref(), Some("OG"));

        let h1 = "<html><body><h1>Heading</h1></body></html>";
        assert_eq!(page_metadata(&Html::parse_document(h1)).title.as_deref(), Some("Heading"));
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = "<html><body><p>Hello</p><script>var x = 1;</script><style>p{}</style><p>World</p></body></html>";
        let document = Html::parse_document(html);
        assert_eq!(visible_text(document.root_element()), "Hello World");
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("EN-gb"), "en");
        assert_eq!(normalize_language("de"), "de");
        assert_eq!(normalize_language("pt_BR"), "pt");
    }
}
