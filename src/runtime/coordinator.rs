//! Run coordinator
//!
//! Fans the pipeline out across sources, optionally several at a time, and
//! folds the outcomes back into one [`RunReport`]. A source is reported ok
//! iff its pipeline completed without a fatal error and without being
//! cancelled; item-level drops and page-level fetch failures never make a
//! source fail.

use crate::config::{EngineKind, LoadedSources, SourceConfig};
use crate::content::ContentExtractor;
use crate::diagnostics::NextStep;
use crate::engine::RenderDriver;
use crate::output::{ArtifactSink, MetricsRegistry, RunReport, SourceReport};
use crate::pipeline::{
    ClaimRecorder, DedupeStore, MemoryDedupeStore, Pipeline, PipelineArtifacts, PipelineContext,
};
use crate::HarvestError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Options for one harvesting run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of sources run concurrently
    pub max_parallel_sources: usize,

    /// Overall deadline; cancels remaining work when reached
    pub timeout: Option<Duration>,

    /// One dedupe store for all sources instead of one per source
    pub share_dedupe: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel_sources: 2,
            timeout: None,
            share_dedupe: false,
        }
    }
}

/// Orchestrates pipeline runs across sources
pub struct Coordinator {
    options: RunOptions,
    render_driver: Option<Arc<dyn RenderDriver>>,
    extractor: Option<Arc<dyn ContentExtractor>>,
    sink: Option<Arc<dyn ArtifactSink>>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            render_driver: None,
            extractor: None,
            sink: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Renderer for sources needing one and lacking a `render-endpoint`
    pub fn with_render_driver(mut self, driver: Arc<dyn RenderDriver>) -> Self {
        self.render_driver = Some(driver);
        self
    }

    /// Rich content extractor tried before the built-in ones
    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Token cancelling the whole run when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every source and aggregates the report
    ///
    /// Never fails: sources that cannot run are reported as failed.
    pub async fn run(&self, sources: Vec<SourceConfig>) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let metrics = MetricsRegistry::new();

        let reports = self.run_sources(sources, &metrics).await;
        RunReport::new(run_id, started_at, reports, metrics.snapshot())
    }

    /// Runs sources from a loaded configuration file
    ///
    /// Sources rejected at load time appear in the report as failed, and
    /// the report carries the file's hash.
    pub async fn run_loaded(&self, loaded: LoadedSources) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let metrics = MetricsRegistry::new();

        let LoadedSources {
            sources,
            rejected,
            migrated,
            config_hash,
        } = loaded;

        let mut reports = self.run_sources(sources, &metrics).await;
        for report in &mut reports {
            report.migrated = migrated.contains(&report.source_id);
        }
        for rejected in rejected {
            metrics.incr("sources.failed", 1);
            reports.push(SourceReport::failed(
                &rejected.source_id,
                HarvestError::Config(rejected.error),
                0,
            ));
        }

        RunReport::new(run_id, started_at, reports, metrics.snapshot()).with_config_hash(config_hash)
    }

    async fn run_sources(
        &self,
        sources: Vec<SourceConfig>,
        metrics: &MetricsRegistry,
    ) -> Vec<SourceReport> {
        let shared: Option<Arc<dyn DedupeStore>> = if self.options.share_dedupe {
            Some(Arc::new(MemoryDedupeStore::new()))
        } else {
            None
        };

        let cancel = self.cancel.child_token();
        let timer = self.options.timeout.map(|timeout| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!("Run timeout of {:?} reached, cancelling", timeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        tracing::info!(
            sources = sources.len(),
            parallel = self.options.max_parallel_sources,
            "Starting harvest run"
        );

        let reports: Vec<SourceReport> = stream::iter(sources)
            .map(|source| self.run_source(source, shared.clone(), &cancel, metrics))
            .buffered(self.options.max_parallel_sources.max(1))
            .collect()
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }
        reports
    }

    async fn run_source(
        &self,
        source: SourceConfig,
        shared: Option<Arc<dyn DedupeStore>>,
        cancel: &CancellationToken,
        run_metrics: &MetricsRegistry,
    ) -> SourceReport {
        let id = source.source_id.clone();
        if !source.enabled {
            tracing::info!(source = %id, "Source disabled, skipping");
            run_metrics.incr("sources.skipped", 1);
            return SourceReport::skipped(&id);
        }

        let start = Instant::now();
        let metrics = MetricsRegistry::new();
        let outcome = self.harvest(&source, shared, cancel, &metrics).await;
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        let mut report = match outcome {
            Ok((artifacts, escalated)) => {
                let mut report = SourceReport::from_artifacts(&artifacts, elapsed_ms());
                report.escalated = escalated;
                if let Some(sink) = &self.sink {
                    match sink.write_source(&artifacts, &source.storage) {
                        Ok(paths) => report.artifacts = paths,
                        Err(e) => {
                            tracing::error!(source = %id, "Failed to write artifacts: {}", e);
                            report.ok = false;
                            report.fatal_error = Some(HarvestError::Output(e).to_string());
                        }
                    }
                }
                report
            }
            Err(e) => {
                tracing::error!(source = %id, "Source aborted: {}", e);
                SourceReport::failed(&id, e, elapsed_ms())
            }
        };
        report.duration_ms = elapsed_ms();

        if report.ok {
            tracing::info!(
                source = %id,
                kept = report.stats.items_kept,
                dropped = report.stats.items_dropped,
                "Source finished"
            );
            metrics.incr("sources.ok", 1);
        } else {
            metrics.incr("sources.failed", 1);
        }
        run_metrics.merge(&metrics);
        report
    }

    /// Runs the pipeline, re-running once with a renderer when diagnosed
    async fn harvest(
        &self,
        source: &SourceConfig,
        shared: Option<Arc<dyn DedupeStore>>,
        cancel: &CancellationToken,
        metrics: &MetricsRegistry,
    ) -> Result<(PipelineArtifacts, bool), HarvestError> {
        let recorder = shared.map(|store| Arc::new(ClaimRecorder::new(store)));
        let first_store = recorder
            .clone()
            .map(|recorder| recorder as Arc<dyn DedupeStore>);
        let artifacts = self
            .pipeline(source.clone(), first_store)?
            .run(cancel, metrics)
            .await?;

        if !self.should_escalate(source, &artifacts) {
            return Ok((artifacts, false));
        }

        tracing::info!(
            source = %source.source_id,
            reason = %artifacts.source_diagnosis().reason,
            "Escalating to rendering engine"
        );
        metrics.incr("sources.escalated", 1);

        let mut escalated = source.clone();
        escalated.engine.kind = EngineKind::Browser;
        // Keys the first attempt claimed are released to the re-run only
        let rerun_store: Option<Arc<dyn DedupeStore>> = recorder
            .map(|recorder| Arc::new(recorder.reclaiming()) as Arc<dyn DedupeStore>);
        let artifacts = self
            .pipeline(escalated, rerun_store)?
            .run(cancel, metrics)
            .await?;
        Ok((artifacts, true))
    }

    fn pipeline(
        &self,
        source: SourceConfig,
        dedupe: Option<Arc<dyn DedupeStore>>,
    ) -> Result<Pipeline, HarvestError> {
        Pipeline::new(
            source,
            PipelineContext {
                render_driver: self.render_driver.clone(),
                extractor: self.extractor.clone(),
                dedupe,
            },
        )
    }

    fn should_escalate(&self, source: &SourceConfig, artifacts: &PipelineArtifacts) -> bool {
        let engine = &source.engine;
        engine.escalate_on_diagnosis
            && engine.kind == EngineKind::Http
            && !artifacts.cancelled
            && artifacts.source_diagnosis().next_step == NextStep::SwitchToBrowser
            && (engine.render_endpoint.is_some() || self.render_driver.is_some())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(RunOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, EntryPoint};

    fn source(id: &str) -> SourceConfig {
        SourceConfig::new(
            id,
            vec![EntryPoint::new("https://x.test/list")],
            DiscoveryConfig::css("a"),
        )
    }

    #[tokio::test]
    async fn test_disabled_source_skipped() {
        let mut disabled = source("off");
        disabled.enabled = false;

        let report = Coordinator::default().run(vec![disabled]).await;
        assert_eq!(report.summary.sources_skipped, 1);
        assert_eq!(report.summary.sources_failed, 0);
        assert!(report.source("off").unwrap().skipped);
    }

    #[tokio::test]
    async fn test_invalid_source_reported_failed() {
        let mut broken = source("broken");
        broken.discovery.selector = None;

        let report = Coordinator::default().run(vec![broken]).await;
        assert_eq!(report.summary.sources_failed, 1);
        let source = report.source("broken").unwrap();
        assert!(!source.ok);
        assert!(source
            .fatal_error
            .as_deref()
            .unwrap()
            .starts_with("Configuration error"));
        assert_eq!(report.metrics.counters["sources.failed"], 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_ok() {
        let coordinator = Coordinator::default();
        coordinator.cancellation_token().cancel();

        let report = coordinator.run(vec![source("a")]).await;
        let source = report.source("a").unwrap();
        assert!(source.cancelled);
        assert!(!source.ok);
        assert_eq!(report.summary.sources_failed, 1);
    }

    #[test]
    fn test_escalation_requires_renderer() {
        let coordinator = Coordinator::default();
        let mut config = source("js");
        config.engine.escalate_on_diagnosis = true;

        let mut artifacts = PipelineArtifacts::new("js");
        artifacts.diagnoses.push(crate::pipeline::PageDiagnosis {
            url: "https://x.test/list".to_string(),
            kind: crate::config::PageKind::Listing,
            diagnosis: crate::diagnostics::diagnose_response(
                Some(200),
                &Default::default(),
                "please enable JavaScript to continue",
            ),
        });

        assert!(!coordinator.should_escalate(&config, &artifacts));

        config.engine.render_endpoint = Some("http://render.test/render".to_string());
        assert!(coordinator.should_escalate(&config, &artifacts));

        config.engine.escalate_on_diagnosis = false;
        assert!(!coordinator.should_escalate(&config, &artifacts));
    }
}
