//! Output module for run results
//!
//! This module handles:
//! - Recording run metrics
//! - Building and writing the run report
//! - Persisting per-source artifacts through a sink
//! - Printing a console summary

mod metrics;
mod report;
mod sink;
mod summary;

pub use metrics::{MetricsRegistry, MetricsSnapshot, TimerStats};
pub use report::{write_report, RunReport, RunSummary, SourceReport};
pub use sink::{ArtifactSink, JsonLinesSink};
pub use summary::{format_report, print_report};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
