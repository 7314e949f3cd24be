//! Plain HTTP fetch engine
//!
//! This module handles all plain HTTP requests, including:
//! - Building HTTP clients with the configured timeout, TLS, headers and cookies
//! - GET requests with redirect following
//! - Error classification into [`FetchErrorKind`]
//! - Retry and rate limiting through [`fetch_with_retry`]

use crate::config::{ActionPlan, EngineConfig, RetryPolicy};
use crate::engine::{FetchEngine, FetchError, FetchErrorKind, FetchResult};
use crate::resilience::{fetch_with_retry, status_is_retryable, RateLimiter};
use crate::EngineError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds an HTTP client from engine configuration
///
/// # Arguments
///
/// * `config` - Engine configuration supplying timeout, TLS, headers and cookies
///
/// # Returns
///
/// * `Ok(Client)` - Configured HTTP client
/// * `Err(EngineError)` - A header could not be encoded or the client failed to build
pub fn build_http_client(config: &EngineConfig) -> Result<Client, EngineError> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("sumi-harvest/{}", env!("CARGO_PKG_VERSION")));

    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| EngineError::InvalidHeader {
                name: name.clone(),
                message: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| EngineError::InvalidHeader {
            name: name.clone(),
            message: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }

    if !config.cookies.is_empty() {
        let cookie = config
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        let value = HeaderValue::from_str(&cookie).map_err(|e| EngineError::InvalidHeader {
            name: "cookie".to_string(),
            message: e.to_string(),
        })?;
        headers.insert(COOKIE, value);
    }

    let timeout = config.timeout();
    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .danger_accept_invalid_certs(!config.verify_tls)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Engine issuing plain GET requests
pub struct HttpEngine {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl HttpEngine {
    /// Creates an engine with its own client and the given shared limiter
    pub fn new(config: &EngineConfig, limiter: Arc<RateLimiter>) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_http_client(config)?,
            limiter,
            retry: config.retry.clone(),
        })
    }

    /// Performs a single GET attempt
    async fn fetch_once(&self, url: &str) -> FetchResult {
        let start = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchResult::failure(url, classify_error(&e), start.elapsed()),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let error = FetchError::new(
                    FetchErrorKind::Body,
                    format!("Failed to read body: {}", e),
                    true,
                );
                let mut result = FetchResult::failure(url, error, start.elapsed());
                result.final_url = final_url;
                result.status_code = Some(status);
                result.headers = headers;
                return result;
            }
        };

        let result =
            FetchResult::from_response(url, final_url, status, headers, text, start.elapsed());
        if result.ok {
            return result;
        }

        let retryable = status_is_retryable(status, &self.retry);
        result.with_error(FetchError::new(
            FetchErrorKind::HttpStatus,
            format!("HTTP {}", status),
            retryable,
        ))
    }
}

#[async_trait]
impl FetchEngine for HttpEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        let result = fetch_with_retry(&self.limiter, &self.retry, |_| self.fetch_once(url)).await;
        tracing::debug!(
            url = %url,
            status = ?result.status_code,
            attempts = result.attempts,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "HTTP fetch finished"
        );
        result
    }

    async fn fetch_rendered(&self, url: &str, plan: &ActionPlan) -> FetchResult {
        if !plan.is_empty() {
            tracing::debug!(url = %url, "HTTP engine ignores page actions");
        }
        self.fetch(url).await
    }
}

/// Collects headers into a map with lowercased names
///
/// Repeated headers are joined with `", "`.
pub(crate) fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        map.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

/// Classifies a transport error
///
/// Timeouts and connection failures are retryable; request-building
/// errors (e.g. an unparseable URL) are not.
fn classify_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::new(FetchErrorKind::Timeout, "Request timeout", true)
    } else if error.is_connect() {
        FetchError::new(
            FetchErrorKind::Connect,
            format!("Connection failed: {}", error),
            true,
        )
    } else if error.is_builder() {
        FetchError::new(FetchErrorKind::Transport, error.to_string(), false)
    } else {
        FetchError::new(FetchErrorKind::Transport, error.to_string(), true)
    }
}
