//! Rendering fetch engine
//!
//! [`BrowserEngine`] drives a [`RenderDriver`] capability: it opens a
//! session, runs the page actions in order, waits for the capture selector,
//! and captures the final DOM. Action failures are skipped with a warning
//! unless the engine is strict, in which case the first failure aborts the
//! fetch.

use crate::config::{ActionPlan, EngineConfig, PageAction, RetryPolicy};
use crate::engine::{FetchEngine, FetchError, FetchErrorKind, FetchResult};
use crate::resilience::{fetch_with_retry, status_is_retryable, RateLimiter};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure of one rendering step
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("Failed to open page: {0}")]
    Open(String),

    #[error("Action '{action}' failed: {message}")]
    Action { action: String, message: String },

    #[error("Timed out waiting for selector '{0}'")]
    WaitTimeout(String),

    #[error("Failed to capture page: {0}")]
    Capture(String),
}

/// DOM captured at the end of a rendering session
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub html: String,
    /// Status of the main document, when the renderer reports one
    pub status_code: Option<u16>,
    pub final_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Action failures reported at capture time by drivers that defer the plan
    pub action_errors: Vec<ActionError>,
}

/// Capability that opens rendering sessions
///
/// Implemented by [`RemoteRenderDriver`](crate::engine::RemoteRenderDriver)
/// and by any driver the embedding application injects.
#[async_trait]
pub trait RenderDriver: Send + Sync {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn RenderSession>, ActionError>;
}

/// One open page in a rendering engine
#[async_trait]
pub trait RenderSession: Send {
    async fn perform(&mut self, action: &PageAction) -> Result<(), ActionError>;

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ActionError>;

    async fn content(&mut self) -> Result<RenderedPage, ActionError>;

    async fn close(&mut self);
}

/// Engine fetching pages through a rendering driver
pub struct BrowserEngine {
    driver: Arc<dyn RenderDriver>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timeout: Duration,
    strict: bool,
}

impl BrowserEngine {
    pub fn new(
        config: &EngineConfig,
        driver: Arc<dyn RenderDriver>,
        limiter: Arc<RateLimiter>,
        strict: bool,
    ) -> Self {
        Self {
            driver,
            limiter,
            retry: config.retry.clone(),
            timeout: config.timeout(),
            strict,
        }
    }

    async fn render_once(&self, url: &str, plan: &ActionPlan) -> FetchResult {
        let start = Instant::now();

        let mut session = match self.driver.open(url, self.timeout).await {
            Ok(session) => session,
            Err(e) => {
                let error = FetchError::new(FetchErrorKind::Render, e.to_string(), true);
                return FetchResult::failure(url, error, start.elapsed()).rendered();
            }
        };

        if let Err(e) = self.run_plan(session.as_mut(), url, plan).await {
            session.close().await;
            let error = FetchError::new(FetchErrorKind::Action, e.to_string(), false);
            return FetchResult::failure(url, error, start.elapsed()).rendered();
        }

        let captured = session.content().await;
        session.close().await;

        let mut page = match captured {
            Ok(page) => page,
            Err(e) => {
                let error = FetchError::new(FetchErrorKind::Render, e.to_string(), true);
                return FetchResult::failure(url, error, start.elapsed()).rendered();
            }
        };

        for failure in std::mem::take(&mut page.action_errors) {
            if let Err(e) = self.check(Err(failure), url, "deferred") {
                let error = FetchError::new(FetchErrorKind::Action, e.to_string(), false);
                return FetchResult::failure(url, error, start.elapsed()).rendered();
            }
        }

        // Renderers that do not report a document status captured a page
        let status = page.status_code.unwrap_or(200);
        let final_url = page.final_url.unwrap_or_else(|| url.to_string());
        let headers = page
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let result =
            FetchResult::from_response(url, final_url, status, headers, page.html, start.elapsed())
                .rendered();
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

    /// Runs every action then the capture wait
    ///
    /// Returns the first error only in strict mode.
    async fn run_plan(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        plan: &ActionPlan,
    ) -> Result<(), ActionError> {
        for action in &plan.steps {
            let outcome = session.perform(action).await;
            self.check(outcome, url, action.name())?;
        }

        if let Some(selector) = &plan.wait_for {
            let outcome = session.wait_for(selector, self.timeout).await;
            self.check(outcome, url, "wait-for")?;
        }

        Ok(())
    }

    fn check(&self, outcome: Result<(), ActionError>, url: &str, step: &str) -> Result<(), ActionError> {
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if self.strict => Err(e),
            Err(e) => {
                tracing::warn!(url = %url, step = step, error = %e, "Skipping failed page action");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl FetchEngine for BrowserEngine {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_rendered(url, &ActionPlan::default()).await
    }

    async fn fetch_rendered(&self, url: &str, plan: &ActionPlan) -> FetchResult {
        let result =
            fetch_with_retry(&self.limiter, &self.retry, |_| self.render_once(url, plan)).await;
        tracing::debug!(
            url = %url,
            status = ?result.status_code,
            attempts = result.attempts,
            actions = plan.steps.len(),
            "Rendered fetch finished"
        );
        result
    }
}
