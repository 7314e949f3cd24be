use crate::content::ExtractorChain;
use crate::engine::FetchResult;
use crate::pipeline::artifacts::ParsedItem;
use url::Url;

/// Parses a successfully fetched detail page into an item
///
/// Links in the page resolve against the final URL. Returns `None` for
/// non-ok pages. An item is produced even when no extractor found text;
/// validation decides what to do with it.
pub fn parse_page(page: &FetchResult, chain: &ExtractorChain) -> Option<ParsedItem> {
    if !page.ok {
        return None;
    }

    let base = Url::parse(&page.final_url)
        .or_else(|_| Url::parse(&page.url))
        .ok();
    let (extraction, extractor) = chain.extract(&page.text, base.as_ref());

    Some(ParsedItem {
        url: page.final_url.clone(),
        title: extraction.title,
        text: extraction.text,
        status_code: page.status_code,
        language: extraction.language,
        author: extraction.author,
        published_date: extraction.published_date,
        extractor: extractor.to_string(),
        fingerprint: None,
        issues: Vec::new(),
    })
}
