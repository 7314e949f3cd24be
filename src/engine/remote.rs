//! Rendering through a remote rendering service
//!
//! The session buffers every action locally and sends the whole plan in one
//! request when the page content is captured. The request carries the strict
//! flag so the service can stop at the first failing action; failures it
//! reports come back on the captured page for the engine to judge.

use crate::config::PageAction;
use crate::engine::{ActionError, RenderDriver, RenderSession, RenderedPage};
use crate::EngineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Extra time granted to the service on top of the page timeout
const SERVICE_GRACE: Duration = Duration::from_secs(5);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    actions: &'a [PageAction],
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for: Option<&'a str>,
    timeout_ms: u64,
    strict: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderResponse {
    html: String,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    final_url: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    action_errors: Vec<RemoteActionError>,
}

/// Action the service could not perform
#[derive(Deserialize)]
struct RemoteActionError {
    action: String,
    #[serde(default)]
    selector: Option<String>,
    message: String,
}

impl From<RemoteActionError> for ActionError {
    fn from(failure: RemoteActionError) -> Self {
        let message = match failure.selector {
            Some(selector) => format!("{} ({})", failure.message, selector),
            None => failure.message,
        };
        ActionError::Action {
            action: failure.action,
            message,
        }
    }
}

/// Driver posting render requests to `engine.render-endpoint`
pub struct RemoteRenderDriver {
    client: Client,
    endpoint: String,
    strict: bool,
}

impl RemoteRenderDriver {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, EngineError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            strict: false,
        })
    }

    /// Asks the service to stop at the first failing action
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[async_trait]
impl RenderDriver for RemoteRenderDriver {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn RenderSession>, ActionError> {
        Ok(Box::new(RemoteSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            url: url.to_string(),
            timeout,
            strict: self.strict,
            actions: Vec::new(),
            wait_for: None,
        }))
    }
}

struct RemoteSession {
    client: Client,
    endpoint: String,
    url: String,
    timeout: Duration,
    strict: bool,
    actions: Vec<PageAction>,
    wait_for: Option<String>,
}

#[async_trait]
impl RenderSession for RemoteSession {
    async fn perform(&mut self, action: &PageAction) -> Result<(), ActionError> {
        self.actions.push(action.clone());
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), ActionError> {
        self.wait_for = Some(selector.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<RenderedPage, ActionError> {
        let request = RenderRequest {
            url: &self.url,
            actions: &self.actions,
            wait_for: self.wait_for.as_deref(),
            timeout_ms: self.timeout.as_millis() as u64,
            strict: self.strict,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout + SERVICE_GRACE)
            .json(&request)
            .send()
            .await
            .map_err(|e| ActionError::Open(format!("render service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Capture(format!(
                "render service returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| ActionError::Capture(format!("invalid render response: {}", e)))?;

        Ok(RenderedPage {
            html: body.html,
            status_code: body.status_code,
            final_url: body.final_url,
            headers: body.headers.unwrap_or_default(),
            action_errors: body.action_errors.into_iter().map(ActionError::from).collect(),
        })
    }

    async fn close(&mut self) {
        self.actions.clear();
    }
}
