//! Sumi-Harvest: a configuration-driven web harvesting engine
//!
//! Given a declarative description of a data source, this crate discovers
//! listing pages, fetches them through a swappable fetch engine, extracts
//! detail links, fetches and parses detail pages, then validates, filters and
//! deduplicates the resulting records before handing them to an output sink
//! together with a run report.

pub mod config;
pub mod content;
pub mod diagnostics;
pub mod engine;
pub mod output;
pub mod pipeline;
pub mod resilience;
pub mod runtime;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
///
/// Ordinary network and HTTP failures never surface here; they are carried
/// as non-ok [`engine::FetchResult`] values. Only failures that abort a whole
/// source run are represented.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid stage transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: pipeline::Stage,
        to: pipeline::Stage,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid discovery rule: {0}")]
    InvalidPattern(String),

    #[error("Duplicate source id: {0}")]
    DuplicateSource(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors raised while assembling fetch engines
///
/// These are programming or resource errors, not per-request failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Rendering engine required for source '{0}' but no renderer is available")]
    RendererUnavailable(String),

    #[error("Invalid rate limit: {0}")]
    RateLimit(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{load_sources, SourceConfig};
pub use diagnostics::{diagnose_rendered_dom, diagnose_response, Diagnosis};
pub use engine::{FetchEngine, FetchResult};
pub use pipeline::{Pipeline, PipelineArtifacts};
pub use runtime::Coordinator;
pub use url::canonicalize_url;
