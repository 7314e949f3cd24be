//! Configuration module for Sumi-Harvest
//!
//! Source configuration documents are loaded from TOML or JSON, migrated to
//! the current schema version, deserialized and validated before any
//! network I/O takes place.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_sources;
//! use std::path::Path;
//!
//! let loaded = load_sources(Path::new("sources.toml")).unwrap();
//! for source in &loaded.sources {
//!     println!("{} -> {:?}", source.source_id, source.engine.kind);
//! }
//! ```

mod migration;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ActionPlan, ActionsConfig, BackoffMode, DedupeField, DiscoveryConfig, DiscoveryMethod,
    EngineConfig, EngineKind, EntryPoint, FetchMode, PageAction, PageKind, PagingConfig,
    PagingMode, PipelineConfig, QualityConfig, RateLimitConfig, RetryPolicy, SourceConfig,
    StorageConfig, StorageFormat, ValidationConfig, CURRENT_CONFIG_VERSION, MAX_DURATION_SECS,
};
pub use types::secs_to_duration;

// Re-export loader, migration and validation functions
pub use migration::{detect_version, migrate};
pub use parser::{
    compute_config_hash, load_sources, parse_sources_str, ConfigFormat, LoadedSources,
    RejectedSource,
};
pub use validation::{validate_source, validate_sources};
