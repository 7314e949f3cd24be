use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Current configuration schema version; migration stamps every source with it
pub const CURRENT_CONFIG_VERSION: u32 = 3;

/// Largest accepted value, in seconds, for any timeout or delay setting
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Converts a seconds setting to a duration, clamped to `[0, MAX_DURATION_SECS]`
///
/// NaN maps to zero. Unlike [`Duration::from_secs_f64`] this never panics.
pub fn secs_to_duration(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(value.clamp(0.0, MAX_DURATION_SECS))
}

/// Declarative description of one harvesting source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Schema version, normalized to [`CURRENT_CONFIG_VERSION`] after migration
    #[serde(default)]
    pub config_version: u32,

    /// Unique identifier of the source (no whitespace)
    pub source_id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub engine: EngineConfig,

    pub entrypoints: Vec<EntryPoint>,

    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

// ===== Engine =====

/// Which fetch engine implementation a source uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    #[default]
    Http,
    Browser,
    Hybrid,
}

/// Fetch mode used for one kind of page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    Http,
    Browser,
}

/// Kind of page being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    Listing,
    Detail,
}

/// Fetch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    #[serde(rename = "type")]
    pub kind: EngineKind,

    /// Request timeout in seconds
    pub timeout: f64,

    pub verify_tls: bool,

    pub user_agent: Option<String>,

    pub headers: BTreeMap<String, String>,

    pub cookies: BTreeMap<String, String>,

    pub rate_limit: RateLimitConfig,

    pub retry: RetryPolicy,

    /// Mode for listing pages when `type = hybrid`
    pub listing_mode: Option<FetchMode>,

    /// Mode for detail pages when `type = hybrid`
    pub detail_mode: Option<FetchMode>,

    /// Rendering service endpoint used by the remote render driver
    pub render_endpoint: Option<String>,

    /// Fall back to plain HTTP when a renderer is needed but unavailable
    pub allow_http_fallback: bool,

    /// Let the coordinator re-run the source with a browser when diagnosed
    pub escalate_on_diagnosis: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Http,
            timeout: 30.0,
            verify_tls: true,
            user_agent: None,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            listing_mode: None,
            detail_mode: None,
            render_endpoint: None,
            allow_http_fallback: false,
            escalate_on_diagnosis: false,
        }
    }
}

impl EngineConfig {
    /// Returns the request timeout as a duration
    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.timeout)
    }

    /// Resolves the fetch mode for a page kind
    ///
    /// `http` and `browser` engines force a single mode; `hybrid` uses the
    /// explicit per-kind modes, defaulting to http listings and browser details.
    pub fn mode_for(&self, kind: PageKind) -> FetchMode {
        match self.kind {
            EngineKind::Http => FetchMode::Http,
            EngineKind::Browser => FetchMode::Browser,
            EngineKind::Hybrid => match kind {
                PageKind::Listing => self.listing_mode.unwrap_or(FetchMode::Http),
                PageKind::Detail => self.detail_mode.unwrap_or(FetchMode::Browser),
            },
        }
    }

    /// Returns true if any page kind is fetched through a renderer
    pub fn needs_renderer(&self) -> bool {
        [PageKind::Listing, PageKind::Detail]
            .iter()
            .any(|kind| self.mode_for(*kind) == FetchMode::Browser)
    }
}

/// Rate-limit policy for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    /// Sustained requests per second; unset disables the token bucket
    pub rps: Option<f64>,

    /// Token bucket capacity
    pub burst: u32,

    /// Minimum delay between granted calls (seconds)
    pub min_delay: f64,

    /// Upper bound of the uniform random delay added to `min_delay` (seconds)
    pub jitter: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: None,
            burst: 1,
            min_delay: 0.0,
            jitter: 0.0,
        }
    }
}

/// Backoff strategy between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffMode {
    #[default]
    Exp,
    Fixed,
    None,
}

/// Retry policy applied by every fetch engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    pub max_retries: u32,

    pub backoff: BackoffMode,

    /// Base delay in seconds
    pub base_delay: f64,

    /// Maximum delay in seconds
    pub max_delay: f64,

    /// Relative jitter applied to each delay, in [0, 1]
    pub jitter_fraction: f64,

    pub retryable_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: BackoffMode::Exp,
            base_delay: 0.5,
            max_delay: 8.0,
            jitter_fraction: 0.1,
            retryable_status: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

// ===== Entry points =====

/// Seed URL template plus paging specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EntryPoint {
    /// URL template; may contain `{page}` or `{offset}`
    pub url: String,

    #[serde(default)]
    pub paging: Option<PagingConfig>,
}

impl EntryPoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            paging: None,
        }
    }

    pub fn with_paging(mut self, paging: PagingConfig) -> Self {
        self.paging = Some(paging);
        self
    }
}

/// Paging mode of an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PagingMode {
    #[default]
    Page,
    Offset,
    Cursor,
}

/// Paging specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PagingConfig {
    pub mode: PagingMode,
    pub start: i64,
    pub step: i64,
    pub count: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            mode: PagingMode::Page,
            start: 1,
            step: 1,
            count: 1,
        }
    }
}

// ===== Discovery =====

/// Link-extraction method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Regex,
    Css,
    Xpath,
}

/// Field used to deduplicate items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupeField {
    Url,
    Content,
}

/// Link-discovery rules applied to listing pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    pub method: DiscoveryMethod,

    /// Regex pattern (method = regex); capture group 1 is used when present
    #[serde(default)]
    pub pattern: Option<String>,

    /// CSS selector or XPath expression (method = css | xpath)
    #[serde(default)]
    pub selector: Option<String>,

    /// Attribute holding the link for selector methods
    #[serde(default = "default_href")]
    pub attribute: String,

    /// Keep only links containing this substring
    #[serde(default)]
    pub filter: Option<String>,

    /// Base URL for resolving relative links; defaults to the listing page URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_dedupe_fields")]
    pub dedupe: Vec<DedupeField>,

    #[serde(default)]
    pub keep_fragment: bool,
}

impl DiscoveryConfig {
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::with_method(DiscoveryMethod::Regex, Some(pattern.into()), None)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::with_method(DiscoveryMethod::Css, None, Some(selector.into()))
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::with_method(DiscoveryMethod::Xpath, None, Some(expression.into()))
    }

    fn with_method(
        method: DiscoveryMethod,
        pattern: Option<String>,
        selector: Option<String>,
    ) -> Self {
        Self {
            method,
            pattern,
            selector,
            attribute: default_href(),
            filter: None,
            base_url: None,
            dedupe: default_dedupe_fields(),
            keep_fragment: false,
        }
    }

    pub fn dedupes_content(&self) -> bool {
        self.dedupe.contains(&DedupeField::Content)
    }
}

// ===== Actions =====

/// A single browser interaction, executed in order before capture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PageAction {
    Scroll {
        #[serde(default = "default_one")]
        times: u32,
        #[serde(default, rename = "pause-ms")]
        pause_ms: u64,
    },
    Click {
        selector: String,
    },
    WaitForSelector {
        selector: String,
        #[serde(default = "default_action_timeout", rename = "timeout-ms")]
        timeout_ms: u64,
    },
    Type {
        selector: String,
        text: String,
    },
    Hover {
        selector: String,
    },
    Sleep {
        ms: u64,
    },
}

impl PageAction {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scroll { .. } => "scroll",
            Self::Click { .. } => "click",
            Self::WaitForSelector { .. } => "wait-for-selector",
            Self::Type { .. } => "type",
            Self::Hover { .. } => "hover",
            Self::Sleep { .. } => "sleep",
        }
    }

    /// The selector this action targets, if any
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Click { selector }
            | Self::WaitForSelector { selector, .. }
            | Self::Type { selector, .. }
            | Self::Hover { selector } => Some(selector),
            Self::Scroll { .. } | Self::Sleep { .. } => None,
        }
    }
}

/// Ordered actions plus the selector to wait for before capture
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ActionPlan {
    pub steps: Vec<PageAction>,
    pub wait_for: Option<String>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.wait_for.is_none()
    }
}

/// Browser action configuration for listing and detail pages
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ActionsConfig {
    /// Abort the fetch on the first failed action
    pub strict: bool,
    pub listing: ActionPlan,
    pub detail: ActionPlan,
}

impl ActionsConfig {
    pub fn plan_for(&self, kind: PageKind) -> &ActionPlan {
        match kind {
            PageKind::Listing => &self.listing,
            PageKind::Detail => &self.detail,
        }
    }
}

// ===== Pipeline =====

/// Worker pool widths and caps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfig {
    pub listing_concurrency: usize,
    pub detail_concurrency: usize,
    pub max_detail_pages: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            listing_concurrency: 4,
            detail_concurrency: 8,
            max_detail_pages: None,
        }
    }
}

/// Structural validation thresholds for parsed items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ValidationConfig {
    pub require_title: bool,
    pub require_text: bool,
    pub min_title_len: usize,
    pub max_title_len: Option<usize>,
    pub min_text_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_title: false,
            require_text: true,
            min_title_len: 0,
            max_title_len: Some(500),
            min_text_len: 0,
        }
    }
}

/// Heuristic content-quality thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct QualityConfig {
    pub min_text_len: usize,
    pub min_title_len: usize,
    /// Drop items containing challenge/anti-bot markers
    pub detect_blocked: bool,
    /// Extra regexes that mark an item as blocked
    pub block_patterns: Vec<String>,
    /// Maximum share of repeated tokens, in [0, 1]
    pub max_boilerplate_ratio: f64,
    pub language_allow: Vec<String>,
    pub language_deny: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_text_len: 0,
            min_title_len: 0,
            detect_blocked: true,
            block_patterns: Vec::new(),
            max_boilerplate_ratio: 0.85,
            language_allow: Vec::new(),
            language_deny: Vec::new(),
        }
    }
}

// ===== Storage =====

/// Serialization format hint for the artifact sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageFormat {
    #[default]
    Jsonl,
    Json,
}

/// Storage hints handed to the artifact sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub format: StorageFormat,
    pub write_items: bool,
    pub write_dropped: bool,
    pub write_pages: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            format: StorageFormat::Jsonl,
            write_items: true,
            write_dropped: false,
            write_pages: false,
        }
    }
}

impl SourceConfig {
    /// Builds a minimal current-version source, mostly for tests and embedding
    pub fn new(
        source_id: impl Into<String>,
        entrypoints: Vec<EntryPoint>,
        discovery: DiscoveryConfig,
    ) -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            source_id: source_id.into(),
            enabled: true,
            engine: EngineConfig::default(),
            entrypoints,
            discovery,
            actions: ActionsConfig::default(),
            pipeline: PipelineConfig::default(),
            validation: ValidationConfig::default(),
            quality: QualityConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_href() -> String {
    "href".to_string()
}

fn default_action_timeout() -> u64 {
    10_000
}

fn default_dedupe_fields() -> Vec<DedupeField> {
    vec![DedupeField::Url]
}
