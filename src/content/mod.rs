//! Content extraction
//!
//! Turns detail-page HTML into a title, body text and page metadata. The
//! extraction algorithm itself is a capability ([`ContentExtractor`]); this
//! module ships two simple built-in extractors and the fallback chain that
//! tries a richer injected extractor first.

mod extractors;
mod metadata;

pub use extractors::{SelectorExtractor, TagStripExtractor};

use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Output of a content extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// True when the extractor found usable content
    pub ok: bool,
    pub title: Option<String>,
    pub text: String,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
}

impl Extraction {
    pub fn has_content(&self) -> bool {
        self.ok && !self.text.trim().is_empty()
    }
}

/// Capability extracting content from HTML
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, html: &str, base_url: Option<&Url>) -> Extraction;
}

/// Fallback chain: rich extractor, then selector-based, then tag stripping
///
/// The first extractor yielding content wins. Metadata the winner did not
/// provide is filled in from later extractors.
pub struct ExtractorChain {
    extractors: Vec<Arc<dyn ContentExtractor>>,
}

impl ExtractorChain {
    pub fn new(rich: Option<Arc<dyn ContentExtractor>>) -> Self {
        let mut extractors: Vec<Arc<dyn ContentExtractor>> = Vec::new();
        if let Some(rich) = rich {
            extractors.push(rich);
        }
        extractors.push(Arc::new(SelectorExtractor::default()));
        extractors.push(Arc::new(TagStripExtractor));
        Self { extractors }
    }

    /// Extracts content, returning the result and the winning extractor name
    pub fn extract(&self, html: &str, base_url: Option<&Url>) -> (Extraction, &'static str) {
        let mut winner: Option<(Extraction, &'static str)> = None;
        let mut fallbacks: Vec<Extraction> = Vec::new();

        for extractor in &self.extractors {
            let extraction = extractor.extract(html, base_url);
            if extraction.has_content() {
                winner = Some((extraction, extractor.name()));
                break;
            }
            fallbacks.push(extraction);
        }

        let (mut result, name) = winner.unwrap_or_else(|| (Extraction::default(), "none"));
        for fallback in fallbacks {
            fill_missing(&mut result, fallback);
        }
        (result, name)
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(None)
    }
}

fn fill_missing(target: &mut Extraction, source: Extraction) {
    target.title = target.title.take().or(source.title);
    target.language = target.language.take().or(source.language);
    target.author = target.author.take().or(source.author);
    target.published_date = target.published_date.take().or(source.published_date);
}
