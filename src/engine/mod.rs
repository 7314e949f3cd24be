//! Fetch engines
//!
//! A fetch engine turns a URL into a [`FetchResult`]. Engines never return
//! `Err` for ordinary network or HTTP failures: those become non-ok results
//! carrying a [`FetchError`]. Only construction can fail (bad headers,
//! impossible quotas, a renderer that is required but missing).

mod browser;
mod http;
mod policy;
mod remote;

pub use browser::{ActionError, BrowserEngine, RenderDriver, RenderSession, RenderedPage};
pub use http::{build_http_client, HttpEngine};
pub use policy::EngineSet;
pub use remote::RemoteRenderDriver;

use crate::config::ActionPlan;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Connect,
    Transport,
    HttpStatus,
    Body,
    Render,
    Action,
    Cancelled,
}

/// Failure attached to a non-ok [`FetchResult`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of fetching one URL
///
/// `ok` holds iff there was no transport error and the status is in
/// `[200, 400)`. Never mutated once handed downstream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// URL that was requested
    pub url: String,

    /// URL after redirects (or as reported by the renderer)
    pub final_url: String,

    pub status_code: Option<u16>,

    /// Response body or rendered DOM
    #[serde(skip)]
    pub text: String,

    /// Response headers with lowercased names
    pub headers: BTreeMap<String, String>,

    #[serde(serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,

    pub ok: bool,

    pub error: Option<FetchError>,

    /// Number of attempts made, including the first
    pub attempts: u32,

    /// True when the text is a rendered DOM
    pub rendered: bool,
}

impl FetchResult {
    /// Builds a result from a received response
    pub fn from_response(
        url: &str,
        final_url: String,
        status_code: u16,
        headers: BTreeMap<String, String>,
        text: String,
        elapsed: Duration,
    ) -> Self {
        let ok = is_ok_status(status_code);
        Self {
            url: url.to_string(),
            final_url,
            status_code: Some(status_code),
            text,
            headers,
            elapsed,
            ok,
            error: None,
            attempts: 1,
            rendered: false,
        }
    }

    /// Builds a failed result with no response
    pub fn failure(url: &str, error: FetchError, elapsed: Duration) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status_code: None,
            text: String::new(),
            headers: BTreeMap::new(),
            elapsed,
            ok: false,
            error: Some(error),
            attempts: 1,
            rendered: false,
        }
    }

    /// Marks the result as rendered
    pub fn rendered(mut self) -> Self {
        self.rendered = true;
        self
    }

    /// Attaches an error, forcing the result to non-ok
    pub fn with_error(mut self, error: FetchError) -> Self {
        self.ok = false;
        self.error = Some(error);
        self
    }

    /// Returns a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns true if the error (if any) may be retried
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().map(|e| e.retryable).unwrap_or(false)
    }
}

/// Returns true for statuses that count as a successful fetch
pub fn is_ok_status(status: u16) -> bool {
    (200..400).contains(&status)
}

fn serialize_duration_ms<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Capability interface shared by every engine
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Short engine name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Fetches a URL without page actions
    async fn fetch(&self, url: &str) -> FetchResult;

    /// Fetches a URL running the action plan before capture
    ///
    /// Engines that cannot run actions fall back to [`FetchEngine::fetch`].
    async fn fetch_rendered(&self, url: &str, plan: &ActionPlan) -> FetchResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status_range() {
        assert!(is_ok_status(200));
        assert!(is_ok_status(301));
        assert!(is_ok_status(399));
        assert!(!is_ok_status(400));
        assert!(!is_ok_status(503));
        assert!(!is_ok_status(199));
    }

    #[test]
    fn test_with_error_forces_not_ok() {
        let result = FetchResult::from_response(
            "https://a.test/",
            "https://a.test/".to_string(),
            200,
            BTreeMap::new(),
            "body".to_string(),
            Duration::ZERO,
        )
        .with_error(FetchError::new(FetchErrorKind::Action, "click failed", false));
        assert!(!result.ok);
        assert!(!result.is_retryable());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("retry-after".to_string(), "3".to_string());
        let result = FetchResult::from_response(
            "https://a.test/",
            "https://a.test/".to_string(),
            429,
            headers,
            String::new(),
            Duration::ZERO,
        );
        assert_eq!(result.header("Retry-After"), Some("3"));
        assert!(!result.ok);
    }
}
