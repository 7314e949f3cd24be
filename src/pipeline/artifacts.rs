//! Data produced by one pipeline run

use crate::config::PageKind;
use crate::diagnostics::Diagnosis;
use crate::engine::FetchResult;
use crate::pipeline::Stage;
use serde::Serialize;

/// Severity of an item issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Warning,
    Error,
}

/// One validation or quality finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub level: IssueLevel,
    pub code: String,
    pub message: String,
}

impl Issue {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}

/// Returns true if any issue is error-level
pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_error)
}

/// Structured record parsed from a detail page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedItem {
    /// Canonical URL once the item passed dedupe
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Name of the extractor that produced the text
    pub extractor: String,
    /// Content fingerprint, set when content dedupe is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Warning-level issues collected on the way
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

/// An item removed by validation, quality filtering or dedupe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedItem {
    pub stage: Stage,
    pub item: ParsedItem,
    pub issues: Vec<Issue>,
}

/// Page-level failure recorded without aborting the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub url: String,
    pub message: String,
}

/// Diagnosis attached to one fetched page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDiagnosis {
    pub url: String,
    pub kind: PageKind,
    pub diagnosis: Diagnosis,
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub listing_urls: usize,
    pub listing_fetched: usize,
    pub listing_failed: usize,
    pub links_extracted: usize,
    pub detail_fetched: usize,
    pub detail_failed: usize,
    pub items_parsed: usize,
    pub items_valid: usize,
    pub items_passed_quality: usize,
    pub items_kept: usize,
    pub items_dropped: usize,
    pub duplicates: usize,
    /// Reported separately from the counters
    #[serde(skip)]
    pub errors: Vec<StageError>,
}

impl StageStats {
    pub fn record_error(&mut self, stage: Stage, url: &str, message: impl Into<String>) {
        self.errors.push(StageError {
            stage,
            url: url.to_string(),
            message: message.into(),
        });
    }
}

/// Everything one pipeline run produced
///
/// Collections keep the order of their inputs.
#[derive(Debug, Clone, Default)]
pub struct PipelineArtifacts {
    pub source_id: String,
    pub listing_urls: Vec<String>,
    pub listing_pages: Vec<FetchResult>,
    pub detail_links: Vec<String>,
    pub detail_pages: Vec<FetchResult>,
    pub parsed_items: Vec<ParsedItem>,
    /// Items that passed every stage, with canonical URLs
    pub valid_items: Vec<ParsedItem>,
    pub dropped_items: Vec<DroppedItem>,
    /// Non-proceed diagnoses, listing pages first
    pub diagnoses: Vec<PageDiagnosis>,
    pub stats: StageStats,
    /// Stages entered, in order
    pub stages: Vec<Stage>,
    /// True when the run stopped early on cancellation
    pub cancelled: bool,
}

impl PipelineArtifacts {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    /// The diagnosis representing the whole source
    ///
    /// The first non-proceed page diagnosis, else a healthy one.
    pub fn source_diagnosis(&self) -> Diagnosis {
        self.diagnoses
            .iter()
            .map(|d| d.diagnosis.clone())
            .find(|d| !d.is_ok())
            .unwrap_or_else(Diagnosis::ok)
    }

    /// Drops items with the given issues, updating counters
    pub(crate) fn drop_item(&mut self, stage: Stage, item: ParsedItem, issues: Vec<Issue>) {
        tracing::debug!(
            source = %self.source_id,
            url = %item.url,
            stage = %stage,
            codes = ?issues.iter().map(|i| i.code.as_str()).collect::<Vec<_>>(),
            "Dropped item"
        );
        self.stats.items_dropped += 1;
        self.dropped_items.push(DroppedItem {
            stage,
            item,
            issues,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn item(url: &str) -> ParsedItem {
        ParsedItem {
            url: url.to_string(),
            title: None,
            text: String::new(),
            status_code: Some(200),
            language: None,
            author: None,
            published_date: None,
            extractor: "none".to_string(),
            fingerprint: None,
            issues: vec![],
        }
    }

    #[test]
    fn test_source_diagnosis_defaults_ok() {
        assert!(PipelineArtifacts::new("s").source_diagnosis().is_ok());
    }

    #[test]
    fn test_source_diagnosis_first_non_ok() {
        let mut artifacts = PipelineArtifacts::new("s");
        artifacts.diagnoses.push(PageDiagnosis {
            url: "https://a.test/1".to_string(),
            kind: PageKind::Listing,
            diagnosis: crate::diagnostics::diagnose_response(Some(429), &BTreeMap::new(), ""),
        });
        artifacts.diagnoses.push(PageDiagnosis {
            url: "https://a.test/2".to_string(),
            kind: PageKind::Detail,
            diagnosis: crate::diagnostics::diagnose_response(Some(401), &BTreeMap::new(), ""),
        });
        assert_eq!(
            artifacts.source_diagnosis().label,
            crate::diagnostics::DiagnosisLabel::RateLimited
        );
    }

    #[test]
    fn test_drop_item_counts() {
        let mut artifacts = PipelineArtifacts::new("s");
        artifacts.drop_item(
            Stage::Validate,
            item("https://a.test/"),
            vec![Issue::error("missing_text", "no text")],
        );
        assert_eq!(artifacts.stats.items_dropped, 1);
        assert_eq!(artifacts.dropped_items[0].issues[0].code, "missing_text");
    }

    #[test]
    fn test_issue_levels() {
        let issues = vec![Issue::warning("language_unknown", "no lang")];
        assert!(!has_errors(&issues));
        let issues = vec![
            Issue::warning("language_unknown", "no lang"),
            Issue::error("short_text", "too short"),
        ];
        assert!(has_errors(&issues));
    }
}
