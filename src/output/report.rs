//! Run report
//!
//! The report is the one artifact every run produces, including runs where
//! every source failed.

use crate::diagnostics::Diagnosis;
use crate::output::metrics::MetricsSnapshot;
use crate::output::OutputResult;
use crate::pipeline::{PipelineArtifacts, StageError, StageStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Totals across all sources
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sources_total: usize,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
    pub items_kept: usize,
    pub items_dropped: usize,
}

/// Outcome of one source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_id: String,

    /// True iff the pipeline completed without a fatal error or cancellation
    pub ok: bool,

    /// Source disabled in configuration and never run
    pub skipped: bool,

    pub cancelled: bool,

    /// Re-run with the rendering engine after diagnosis
    pub escalated: bool,

    /// Configuration was migrated from an older version
    pub migrated: bool,

    /// Error that aborted the source, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,

    pub stats: StageStats,

    pub errors: Vec<StageError>,

    pub diagnosis: Diagnosis,

    /// Files written by the artifact sink
    pub artifacts: Vec<PathBuf>,

    pub duration_ms: u64,
}

impl SourceReport {
    /// Report for a source whose pipeline returned artifacts
    pub fn from_artifacts(artifacts: &PipelineArtifacts, duration_ms: u64) -> Self {
        Self {
            source_id: artifacts.source_id.clone(),
            ok: !artifacts.cancelled,
            skipped: false,
            cancelled: artifacts.cancelled,
            escalated: false,
            migrated: false,
            fatal_error: None,
            stats: artifacts.stats.clone(),
            errors: artifacts.stats.errors.clone(),
            diagnosis: artifacts.source_diagnosis(),
            artifacts: Vec::new(),
            duration_ms,
        }
    }

    /// Report for a source aborted before or during its run
    pub fn failed(source_id: &str, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            source_id: source_id.to_string(),
            ok: false,
            skipped: false,
            cancelled: false,
            escalated: false,
            migrated: false,
            fatal_error: Some(error.to_string()),
            stats: StageStats::default(),
            errors: Vec::new(),
            diagnosis: Diagnosis::ok(),
            artifacts: Vec::new(),
            duration_ms,
        }
    }

    /// Report for a disabled source
    pub fn skipped(source_id: &str) -> Self {
        Self {
            skipped: true,
            fatal_error: None,
            ..Self::failed(source_id, "", 0)
        }
    }
}

/// Aggregated report of one harvesting run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub summary: RunSummary,
    pub sources: Vec<SourceReport>,
    pub metrics: MetricsSnapshot,
    /// Failure that stopped the run before any source started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Builds the report, deriving the summary from the source reports
    pub fn new(
        run_id: String,
        started_at: DateTime<Utc>,
        sources: Vec<SourceReport>,
        metrics: MetricsSnapshot,
    ) -> Self {
        let summary = RunSummary {
            sources_total: sources.len(),
            sources_ok: sources.iter().filter(|s| s.ok).count(),
            sources_failed: sources.iter().filter(|s| !s.ok && !s.skipped).count(),
            sources_skipped: sources.iter().filter(|s| s.skipped).count(),
            items_kept: sources.iter().map(|s| s.stats.items_kept).sum(),
            items_dropped: sources.iter().map(|s| s.stats.items_dropped).sum(),
        };
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            config_hash: None,
            summary,
            sources,
            metrics,
            error: None,
        }
    }

    /// Report for a run that failed before any source started
    ///
    /// Used when the configuration cannot be loaded at all.
    pub fn aborted(error: impl Into<String>) -> Self {
        let mut report = Self::new(
            uuid::Uuid::new_v4().to_string(),
            Utc::now(),
            Vec::new(),
            MetricsSnapshot::default(),
        );
        report.error = Some(error.into());
        report
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// True when the run started and every source that ran finished ok
    pub fn all_ok(&self) -> bool {
        self.error.is_none() && self.summary.sources_failed == 0
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    pub fn to_json(&self) -> OutputResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Writes the report as pretty JSON to `path`, or to stdout when `None`
pub fn write_report(report: &RunReport, path: Option<&Path>) -> OutputResult<()> {
    let json = report.to_json()?;
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = File::create(path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => println!("{}", json),
    }
    Ok(())
}
