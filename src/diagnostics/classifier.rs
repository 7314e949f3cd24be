use crate::diagnostics::markers::{find_marker, AUTH_MARKERS, CHALLENGE_MARKERS, JS_REQUIRED_MARKERS};
use crate::engine::FetchResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bodies shorter than this on a 2xx response are treated as script shells
pub const MIN_PLAUSIBLE_BODY: usize = 128;

/// What a fetch outcome looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosisLabel {
    RateLimited,
    ChallengeDetected,
    AuthRequired,
    Forbidden,
    JsRequiredOrMissing,
    Ok,
    UnknownError,
}

/// Recommended corrective action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NextStep {
    Proceed,
    TryHttpTuning,
    StopForHuman,
    UseAuth,
    SwitchToBrowser,
}

/// Advisory classification of a fetch outcome
///
/// A diagnosis never changes what the pipeline does by itself; the
/// coordinator decides whether to act on `next_step`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub label: DiagnosisLabel,
    pub reason: String,
    pub next_step: NextStep,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Diagnosis {
    fn new(label: DiagnosisLabel, next_step: NextStep, reason: impl Into<String>) -> Self {
        Self {
            label,
            reason: reason.into(),
            next_step,
            details: BTreeMap::new(),
        }
    }

    fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// The diagnosis of a healthy response
    pub fn ok() -> Self {
        Self::new(DiagnosisLabel::Ok, NextStep::Proceed, "response looks healthy")
    }

    pub fn is_ok(&self) -> bool {
        self.next_step == NextStep::Proceed
    }
}

/// Classifies a raw HTTP response
///
/// Checks run in fixed order and the first match wins: rate limiting,
/// challenge markers, auth walls, explicit 403, script-only 2xx pages,
/// healthy 2xx, anything else.
///
/// # Arguments
///
/// * `status` - Response status, `None` for transport failures
/// * `headers` - Response headers with lowercased names
/// * `body` - Response body
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use sumi_harvest::diagnostics::{diagnose_response, DiagnosisLabel, NextStep};
///
/// let d = diagnose_response(Some(429), &BTreeMap::new(), "");
/// assert_eq!(d.label, DiagnosisLabel::RateLimited);
/// assert_eq!(d.next_step, NextStep::TryHttpTuning);
/// ```
pub fn diagnose_response(
    status: Option<u16>,
    headers: &BTreeMap<String, String>,
    body: &str,
) -> Diagnosis {
    let retry_after = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .map(|(_, value)| value.as_str());

    if status == Some(429) || retry_after.is_some() {
        let mut diagnosis = Diagnosis::new(
            DiagnosisLabel::RateLimited,
            NextStep::TryHttpTuning,
            "server is rate limiting requests",
        );
        if let Some(value) = retry_after {
            diagnosis = diagnosis.detail("retryAfter", value);
        }
        return with_status(diagnosis, status);
    }

    let lowered = body.to_lowercase();

    if let Some(marker) = find_marker(&lowered, CHALLENGE_MARKERS) {
        let diagnosis = Diagnosis::new(
            DiagnosisLabel::ChallengeDetected,
            NextStep::StopForHuman,
            "anti-bot challenge detected",
        )
        .detail("marker", marker);
        return with_status(diagnosis, status);
    }

    let auth_marker = find_marker(&lowered, AUTH_MARKERS);
    if status == Some(401) || auth_marker.is_some() {
        let mut diagnosis = Diagnosis::new(
            DiagnosisLabel::AuthRequired,
            NextStep::UseAuth,
            "content requires authentication",
        );
        if let Some(marker) = auth_marker {
            diagnosis = diagnosis.detail("marker", marker);
        }
        return with_status(diagnosis, status);
    }

    if status == Some(403) {
        return with_status(
            Diagnosis::new(
                DiagnosisLabel::Forbidden,
                NextStep::TryHttpTuning,
                "server refused the request",
            ),
            status,
        );
    }

    match status {
        Some(code) if (200..300).contains(&code) => {
            if let Some(marker) = find_marker(&lowered, JS_REQUIRED_MARKERS) {
                let diagnosis = Diagnosis::new(
                    DiagnosisLabel::JsRequiredOrMissing,
                    NextStep::SwitchToBrowser,
                    "page asks for JavaScript",
                )
                .detail("marker", marker);
                return with_status(diagnosis, status);
            }

            let length = body.trim().len();
            if code != 204 && length < MIN_PLAUSIBLE_BODY {
                let diagnosis = Diagnosis::new(
                    DiagnosisLabel::JsRequiredOrMissing,
                    NextStep::SwitchToBrowser,
                    "body is implausibly short",
                )
                .detail("bodyLength", length);
                return with_status(diagnosis, status);
            }

            with_status(Diagnosis::ok(), status)
        }
        Some(code) => with_status(
            Diagnosis::new(
                DiagnosisLabel::UnknownError,
                NextStep::TryHttpTuning,
                format!("unexpected HTTP status {}", code),
            ),
            status,
        ),
        None => Diagnosis::new(
            DiagnosisLabel::UnknownError,
            NextStep::TryHttpTuning,
            "no response received",
        ),
    }
}

/// Classifies a DOM captured by a rendering engine
///
/// A captured DOM is treated like a 2xx response without headers.
pub fn diagnose_rendered_dom(dom: &str) -> Diagnosis {
    diagnose_response(Some(200), &BTreeMap::new(), dom).detail("origin", "rendered-dom")
}

/// Classifies a fetch result, using its error when there was no response
pub fn diagnose_fetch(result: &FetchResult) -> Diagnosis {
    if result.status_code.is_none() {
        let reason = result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no response received".to_string());
        return Diagnosis::new(DiagnosisLabel::UnknownError, NextStep::TryHttpTuning, reason)
            .detail("url", &result.url);
    }

    let diagnosis = if result.rendered && result.ok {
        diagnose_rendered_dom(&result.text)
    } else {
        diagnose_response(result.status_code, &result.headers, &result.text)
    };
    diagnosis.detail("url", &result.url)
}

fn with_status(diagnosis: Diagnosis, status: Option<u16>) -> Diagnosis {
    match status {
        Some(code) => diagnosis.detail("status", code),
        None => diagnosis,
    }
}
