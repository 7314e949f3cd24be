//! Artifact sinks
//!
//! A sink receives each source's [`PipelineArtifacts`] once the source
//! finishes and returns the locations it wrote.

use crate::config::{StorageConfig, StorageFormat};
use crate::output::{OutputError, OutputResult};
use crate::pipeline::PipelineArtifacts;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receiver for per-source artifacts
///
/// Implementations must be thread-safe; sources finishing concurrently may
/// call the sink at the same time.
pub trait ArtifactSink: Send + Sync {
    /// Persists one source's artifacts
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PathBuf>)` - Locations written, reported in the run report
    /// * `Err(OutputError)` - Writing failed
    fn write_source(
        &self,
        artifacts: &PipelineArtifacts,
        storage: &StorageConfig,
    ) -> OutputResult<Vec<PathBuf>>;
}

/// Writes artifacts as JSON lines under `<root>/<source-id>/`
///
/// - `items.jsonl`: kept items (`write-items`)
/// - `dropped.jsonl`: dropped items with their issues (`write-dropped`)
/// - `pages.jsonl`: fetch results without bodies (`write-pages`)
///
/// With `format = json` each file holds one pretty JSON array instead and
/// uses the `.json` extension.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    root: PathBuf,
}

impl JsonLinesSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for JsonLinesSink {
    fn write_source(
        &self,
        artifacts: &PipelineArtifacts,
        storage: &StorageConfig,
    ) -> OutputResult<Vec<PathBuf>> {
        let id = artifacts.source_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(OutputError::Write(format!(
                "source id '{}' cannot be used as a directory name",
                id
            )));
        }
        let dir = self.root.join(id);
        fs::create_dir_all(&dir)?;

        let mut written = Vec::new();
        if storage.write_items {
            written.push(write_records(
                &dir,
                "items",
                storage.format,
                &artifacts.valid_items,
            )?);
        }
        if storage.write_dropped {
            written.push(write_records(
                &dir,
                "dropped",
                storage.format,
                &artifacts.dropped_items,
            )?);
        }
        if storage.write_pages {
            let pages: Vec<_> = artifacts
                .listing_pages
                .iter()
                .chain(&artifacts.detail_pages)
                .collect();
            written.push(write_records(&dir, "pages", storage.format, &pages)?);
        }

        tracing::debug!(
            source = %artifacts.source_id,
            files = written.len(),
            "Wrote artifacts"
        );
        Ok(written)
    }
}

fn write_records<T: Serialize>(
    dir: &Path,
    name: &str,
    format: StorageFormat,
    records: &[T],
) -> OutputResult<PathBuf> {
    let path = match format {
        StorageFormat::Jsonl => dir.join(format!("{}.jsonl", name)),
        StorageFormat::Json => dir.join(format!("{}.json", name)),
    };

    let mut writer = BufWriter::new(File::create(&path)?);
    match format {
        StorageFormat::Jsonl => {
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
        }
        StorageFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(path)
}
