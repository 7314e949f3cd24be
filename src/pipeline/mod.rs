//! Per-source harvesting pipeline
//!
//! One [`Pipeline`] run walks the stages of [`Stage`] in order:
//! discover, fetch listing, extract links, fetch detail, parse, validate,
//! quality filter and dedupe. Each stage consumes the full output of the
//! previous one. Page-level failures are recorded in the run's
//! [`StageStats`] and never abort the run; only configuration and engine
//! errors do, and those surface from [`Pipeline::new`] before any I/O.

mod artifacts;
mod dedupe;
mod discover;
mod fetch;
mod links;
mod parse;
mod quality;
mod stage;
mod validate;

pub use artifacts::{
    has_errors, DroppedItem, Issue, IssueLevel, PageDiagnosis, ParsedItem, PipelineArtifacts,
    StageError, StageStats,
};
pub use dedupe::{
    content_fingerprint, content_key, dedupe_item, url_key, ClaimRecorder, DedupeOutcome,
    DedupeStore, MemoryDedupeStore, ReclaimingDedupeStore,
};
pub use discover::{discover, expand_entrypoint};
pub use fetch::{fetch_all, is_cancelled};
pub use links::{union_links, xpath_to_css, LinkExtractor, LinkMethod};
pub use parse::parse_page;
pub use quality::{boilerplate_ratio, QualityFilter};
pub use stage::{Stage, StageTracker};
pub use validate::validate_item;

use crate::config::{validate_source, PageKind, SourceConfig};
use crate::content::{ContentExtractor, ExtractorChain};
use crate::diagnostics::diagnose_fetch;
use crate::engine::{EngineSet, FetchResult, RenderDriver};
use crate::output::MetricsRegistry;
use crate::HarvestError;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Capabilities injected by the embedding application
#[derive(Default, Clone)]
pub struct PipelineContext {
    /// Renderer used when the source has no `render-endpoint`
    pub render_driver: Option<Arc<dyn RenderDriver>>,

    /// Rich content extractor tried before the built-in ones
    pub extractor: Option<Arc<dyn ContentExtractor>>,

    /// Store shared with other runs; a fresh in-memory store otherwise
    pub dedupe: Option<Arc<dyn DedupeStore>>,
}

/// A validated, ready-to-run pipeline for one source
pub struct Pipeline {
    source: SourceConfig,
    engines: EngineSet,
    links: LinkExtractor,
    quality: QualityFilter,
    extractors: ExtractorChain,
    dedupe: Arc<dyn DedupeStore>,
}

impl Pipeline {
    /// Validates the source and builds every stage
    ///
    /// # Returns
    ///
    /// * `Ok(Pipeline)` - Ready to run
    /// * `Err(HarvestError::Config)` - Invalid source configuration
    /// * `Err(HarvestError::Engine)` - Engines could not be built
    pub fn new(source: SourceConfig, context: PipelineContext) -> Result<Self, HarvestError> {
        validate_source(&source)?;
        let links = LinkExtractor::from_config(&source.discovery)?;
        let quality = QualityFilter::new(&source.quality)?;
        let engines = EngineSet::build(&source, context.render_driver)?;
        let dedupe = context
            .dedupe
            .unwrap_or_else(|| Arc::new(MemoryDedupeStore::new()));

        Ok(Self {
            source,
            engines,
            links,
            quality,
            extractors: ExtractorChain::new(context.extractor),
            dedupe,
        })
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Listing URLs the discover stage would produce
    pub fn listing_urls(&self) -> Vec<String> {
        discover(&self.source.entrypoints)
    }

    /// Runs every stage
    ///
    /// Cancellation stops new fetches; the artifacts produced so far are
    /// returned with `cancelled` set.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        metrics: &MetricsRegistry,
    ) -> Result<PipelineArtifacts, HarvestError> {
        let id = self.source.source_id.as_str();
        let mut tracker = StageTracker::new();
        let mut artifacts = PipelineArtifacts::new(id);
        let run_start = Instant::now();

        tracing::info!(source = %id, engine = ?self.source.engine.kind, "Starting pipeline");

        // Discover
        let started = self.enter(&mut tracker, Stage::Discover)?;
        artifacts.listing_urls = self.listing_urls();
        artifacts.stats.listing_urls = artifacts.listing_urls.len();
        self.leave(metrics, Stage::Discover, started);
        tracing::info!(source = %id, urls = artifacts.listing_urls.len(), "Discovered listing URLs");

        // Fetch listing
        if self.stop_if_cancelled(cancel, &mut artifacts) {
            return Ok(self.finish(tracker, artifacts, metrics, run_start));
        }
        let started = self.enter(&mut tracker, Stage::FetchListing)?;
        artifacts.listing_pages = fetch_all(
            &self.engines,
            PageKind::Listing,
            &artifacts.listing_urls,
            self.source.pipeline.listing_concurrency,
            cancel,
        )
        .await;
        self.record_fetches(&mut artifacts, PageKind::Listing, metrics);
        self.leave(metrics, Stage::FetchListing, started);
        tracing::info!(
            source = %id,
            ok = artifacts.stats.listing_fetched,
            failed = artifacts.stats.listing_failed,
            "Fetched listing pages"
        );

        // Extract links
        let started = self.enter(&mut tracker, Stage::ExtractLinks)?;
        let mut links = union_links(
            artifacts
                .listing_pages
                .iter()
                .filter(|page| page.ok)
                .map(|page| self.links.extract(&page.text, &page.final_url)),
        );
        artifacts.stats.links_extracted = links.len();
        if let Some(cap) = self.source.pipeline.max_detail_pages {
            if links.len() > cap {
                tracing::debug!(source = %id, found = links.len(), cap, "Capping detail pages");
                links.truncate(cap);
            }
        }
        artifacts.detail_links = links;
        metrics.gauge(&format!("{}.links", id), artifacts.detail_links.len() as f64);
        self.leave(metrics, Stage::ExtractLinks, started);
        tracing::info!(source = %id, links = artifacts.detail_links.len(), "Extracted detail links");

        // Fetch detail
        if self.stop_if_cancelled(cancel, &mut artifacts) {
            return Ok(self.finish(tracker, artifacts, metrics, run_start));
        }
        let started = self.enter(&mut tracker, Stage::FetchDetail)?;
        artifacts.detail_pages = fetch_all(
            &self.engines,
            PageKind::Detail,
            &artifacts.detail_links,
            self.source.pipeline.detail_concurrency,
            cancel,
        )
        .await;
        self.record_fetches(&mut artifacts, PageKind::Detail, metrics);
        self.leave(metrics, Stage::FetchDetail, started);
        tracing::info!(
            source = %id,
            ok = artifacts.stats.detail_fetched,
            failed = artifacts.stats.detail_failed,
            "Fetched detail pages"
        );

        // Parse
        let started = self.enter(&mut tracker, Stage::Parse)?;
        artifacts.parsed_items = artifacts
            .detail_pages
            .iter()
            .filter_map(|page| parse_page(page, &self.extractors))
            .collect();
        artifacts.stats.items_parsed = artifacts.parsed_items.len();
        self.leave(metrics, Stage::Parse, started);

        // Validate
        let started = self.enter(&mut tracker, Stage::Validate)?;
        let mut candidates = Vec::with_capacity(artifacts.parsed_items.len());
        for item in artifacts.parsed_items.clone() {
            let issues = validate_item(&item, &self.source.validation);
            if let Some(item) = keep_or_drop(&mut artifacts, Stage::Validate, item, issues) {
                candidates.push(item);
            }
        }
        artifacts.stats.items_valid = candidates.len();
        self.leave(metrics, Stage::Validate, started);

        // Quality filter
        let started = self.enter(&mut tracker, Stage::QualityFilter)?;
        let mut passed = Vec::with_capacity(candidates.len());
        for item in candidates {
            let issues = self.quality.check(&item);
            if let Some(item) = keep_or_drop(&mut artifacts, Stage::QualityFilter, item, issues) {
                passed.push(item);
            }
        }
        artifacts.stats.items_passed_quality = passed.len();
        self.leave(metrics, Stage::QualityFilter, started);

        // Dedupe
        let started = self.enter(&mut tracker, Stage::Dedupe)?;
        let keep_fragment = self.source.discovery.keep_fragment;
        let by_content = self.source.discovery.dedupes_content();
        for item in passed {
            match dedupe_item(item, self.dedupe.as_ref(), keep_fragment, by_content) {
                DedupeOutcome::Kept(item) => artifacts.valid_items.push(item),
                DedupeOutcome::Dropped(item, issue) => {
                    if issue.code.starts_with("duplicate_") {
                        artifacts.stats.duplicates += 1;
                    }
                    artifacts.drop_item(Stage::Dedupe, item, vec![issue]);
                }
            }
        }
        artifacts.stats.items_kept = artifacts.valid_items.len();
        self.leave(metrics, Stage::Dedupe, started);

        Ok(self.finish(tracker, artifacts, metrics, run_start))
    }

    fn enter(&self, tracker: &mut StageTracker, stage: Stage) -> Result<Instant, HarvestError> {
        tracker.advance(stage)?;
        tracing::debug!(source = %self.source.source_id, stage = %stage, "Entering stage");
        Ok(Instant::now())
    }

    fn leave(&self, metrics: &MetricsRegistry, stage: Stage, started: Instant) {
        metrics.observe(&format!("stage.{}", stage), started.elapsed());
    }

    fn stop_if_cancelled(
        &self,
        cancel: &CancellationToken,
        artifacts: &mut PipelineArtifacts,
    ) -> bool {
        if cancel.is_cancelled() {
            tracing::warn!(source = %self.source.source_id, "Run cancelled, skipping remaining fetches");
            artifacts.cancelled = true;
        }
        artifacts.cancelled
    }

    /// Updates counters, errors and diagnoses for one fetch stage
    fn record_fetches(
        &self,
        artifacts: &mut PipelineArtifacts,
        kind: PageKind,
        metrics: &MetricsRegistry,
    ) {
        let (stage, prefix) = match kind {
            PageKind::Listing => (Stage::FetchListing, "fetch.listing"),
            PageKind::Detail => (Stage::FetchDetail, "fetch.detail"),
        };
        let pages: &[FetchResult] = match kind {
            PageKind::Listing => &artifacts.listing_pages,
            PageKind::Detail => &artifacts.detail_pages,
        };

        let mut ok = 0;
        let mut errors = Vec::new();
        let mut diagnoses = Vec::new();
        let mut cancelled = false;

        for page in pages {
            if is_cancelled(page) {
                cancelled = true;
                continue;
            }
            metrics.observe(prefix, page.elapsed);
            metrics.incr(&format!("{}.attempts", prefix), u64::from(page.attempts));

            let diagnosis = diagnose_fetch(page);
            if !diagnosis.is_ok() {
                diagnoses.push(PageDiagnosis {
                    url: page.url.clone(),
                    kind,
                    diagnosis,
                });
            }

            if page.ok {
                ok += 1;
            } else {
                let message = match (&page.error, page.status_code) {
                    (Some(error), _) => error.to_string(),
                    (None, Some(status)) => format!("HTTP status {}", status),
                    (None, None) => "fetch failed".to_string(),
                };
                tracing::warn!(
                    source = %self.source.source_id,
                    url = %page.url,
                    error = %message,
                    "Page fetch failed"
                );
                errors.push((page.url.clone(), message));
            }
        }

        let failed = errors.len();
        for (url, message) in errors {
            artifacts.stats.record_error(stage, &url, message);
        }
        metrics.incr(&format!("{}.ok", prefix), ok as u64);
        metrics.incr(&format!("{}.failed", prefix), failed as u64);
        match kind {
            PageKind::Listing => {
                artifacts.stats.listing_fetched = ok;
                artifacts.stats.listing_failed = failed;
            }
            PageKind::Detail => {
                artifacts.stats.detail_fetched = ok;
                artifacts.stats.detail_failed = failed;
            }
        }
        artifacts.diagnoses.extend(diagnoses);
        if cancelled {
            artifacts.cancelled = true;
        }
    }

    fn finish(
        &self,
        mut tracker: StageTracker,
        mut artifacts: PipelineArtifacts,
        metrics: &MetricsRegistry,
        run_start: Instant,
    ) -> PipelineArtifacts {
        tracker.finish();
        artifacts.stages = tracker.visited().to_vec();

        metrics.incr("items.parsed", artifacts.stats.items_parsed as u64);
        metrics.incr("items.kept", artifacts.stats.items_kept as u64);
        metrics.incr("items.dropped", artifacts.stats.items_dropped as u64);
        metrics.incr("items.duplicates", artifacts.stats.duplicates as u64);
        metrics.observe("pipeline.run", run_start.elapsed());

        tracing::info!(
            source = %artifacts.source_id,
            kept = artifacts.stats.items_kept,
            dropped = artifacts.stats.items_dropped,
            errors = artifacts.stats.errors.len(),
            cancelled = artifacts.cancelled,
            "Pipeline finished"
        );
        artifacts
    }
}

/// Keeps an item with only warnings, drops it on any error
fn keep_or_drop(
    artifacts: &mut PipelineArtifacts,
    stage: Stage,
    mut item: ParsedItem,
    issues: Vec<Issue>,
) -> Option<ParsedItem> {
    if has_errors(&issues) {
        artifacts.drop_item(stage, item, issues);
        None
    } else {
        item.issues.extend(issues);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, EntryPoint, PagingConfig, PagingMode};

    fn source(discovery: DiscoveryConfig) -> SourceConfig {
        SourceConfig::new(
            "unit",
            vec![EntryPoint::new("https://x.test/p={page}").with_paging(PagingConfig {
                mode: PagingMode::Page,
                start: 1,
                step: 1,
                count: 3,
            })],
            discovery,
        )
    }

    #[test]
    fn test_regex_without_pattern_rejected_before_io() {
        let mut discovery = DiscoveryConfig::regex("");
        discovery.pattern = None;
        let result = Pipeline::new(source(discovery), PipelineContext::default());
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_browser_without_renderer_rejected() {
        let mut config = source(DiscoveryConfig::css("a"));
        config.engine.kind = crate::config::EngineKind::Browser;
        let result = Pipeline::new(config, PipelineContext::default());
        assert!(matches!(result, Err(HarvestError::Engine(_))));
    }

    #[test]
    fn test_listing_urls_expanded() {
        let pipeline =
            Pipeline::new(source(DiscoveryConfig::css("a")), PipelineContext::default()).unwrap();
        assert_eq!(
            pipeline.listing_urls(),
            vec!["https://x.test/p=1", "https://x.test/p=2", "https://x.test/p=3"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_fetches() {
        let pipeline =
            Pipeline::new(source(DiscoveryConfig::css("a")), PipelineContext::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let metrics = MetricsRegistry::new();

        let artifacts = pipeline.run(&cancel, &metrics).await.unwrap();
        assert!(artifacts.cancelled);
        assert_eq!(artifacts.listing_urls.len(), 3);
        assert!(artifacts.listing_pages.is_empty());
        assert_eq!(
            artifacts.stages,
            vec![Stage::Pending, Stage::Discover, Stage::Done]
        );
    }

    #[test]
    fn test_keep_or_drop() {
        let mut artifacts = PipelineArtifacts::new("unit");
        let item = ParsedItem {
            url: "https://x.test/1".to_string(),
            title: None,
            text: "text".to_string(),
            status_code: Some(200),
            language: None,
            author: None,
            published_date: None,
            extractor: "selector".to_string(),
            fingerprint: None,
            issues: vec![],
        };

        let kept = keep_or_drop(
            &mut artifacts,
            Stage::QualityFilter,
            item.clone(),
            vec![Issue::warning("language_unknown", "none")],
        )
        .unwrap();
        assert_eq!(kept.issues.len(), 1);

        assert!(keep_or_drop(
            &mut artifacts,
            Stage::QualityFilter,
            item,
            vec![Issue::error("short_text", "short")],
        )
        .is_none());
        assert_eq!(artifacts.dropped_items.len(), 1);
        assert_eq!(artifacts.dropped_items[0].stage, Stage::QualityFilter);
    }
}
