use crate::config::{FetchMode, PageKind, SourceConfig};
use crate::engine::{
    BrowserEngine, FetchEngine, FetchResult, HttpEngine, RemoteRenderDriver, RenderDriver,
};
use crate::resilience::RateLimiter;
use crate::EngineError;
use std::sync::Arc;

/// Engines selected for one source run
///
/// Resolves the hybrid policy once at construction: each page kind is bound
/// to either the plain HTTP engine or the rendering engine. All engines of a
/// source share one rate limiter.
pub struct EngineSet {
    listing: Arc<dyn FetchEngine>,
    detail: Arc<dyn FetchEngine>,
    source: SourceConfig,
}

impl EngineSet {
    /// Builds the engines for a source
    ///
    /// Renderer resolution order: configured `render-endpoint`, then the
    /// injected driver, then plain HTTP when `allow-http-fallback` is set.
    ///
    /// # Returns
    ///
    /// * `Ok(EngineSet)` - Engines bound per page kind
    /// * `Err(EngineError::RendererUnavailable)` - A renderer is required and none resolved
    pub fn build(
        source: &SourceConfig,
        injected: Option<Arc<dyn RenderDriver>>,
    ) -> Result<Self, EngineError> {
        let config = &source.engine;
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit)?);

        let driver: Option<Arc<dyn RenderDriver>> = if config.needs_renderer() {
            match (&config.render_endpoint, injected) {
                (Some(endpoint), _) => Some(Arc::new(
                    RemoteRenderDriver::new(endpoint.clone())?.with_strict(source.actions.strict),
                )),
                (None, Some(driver)) => Some(driver),
                (None, None) if config.allow_http_fallback => {
                    tracing::warn!(
                        source = %source.source_id,
                        "No renderer available, falling back to plain HTTP"
                    );
                    None
                }
                (None, None) => {
                    return Err(EngineError::RendererUnavailable(source.source_id.clone()))
                }
            }
        } else {
            None
        };

        let browser: Option<Arc<dyn FetchEngine>> = match driver {
            Some(driver) => Some(Arc::new(BrowserEngine::new(
                config,
                driver,
                Arc::clone(&limiter),
                source.actions.strict,
            ))),
            None => None,
        };

        let mut http: Option<Arc<dyn FetchEngine>> = None;
        let mut bind = |kind: PageKind| -> Result<Arc<dyn FetchEngine>, EngineError> {
            if let (FetchMode::Browser, Some(browser)) = (config.mode_for(kind), &browser) {
                return Ok(Arc::clone(browser));
            }
            if let Some(engine) = &http {
                return Ok(Arc::clone(engine));
            }
            let engine: Arc<dyn FetchEngine> =
                Arc::new(HttpEngine::new(config, Arc::clone(&limiter))?);
            http = Some(Arc::clone(&engine));
            Ok(engine)
        };

        let listing = bind(PageKind::Listing)?;
        let detail = bind(PageKind::Detail)?;

        tracing::debug!(
            source = %source.source_id,
            listing = listing.name(),
            detail = detail.name(),
            "Engines selected"
        );

        Ok(Self {
            listing,
            detail,
            source: source.clone(),
        })
    }

    /// Returns the engine bound to a page kind
    pub fn engine_for(&self, kind: PageKind) -> &Arc<dyn FetchEngine> {
        match kind {
            PageKind::Listing => &self.listing,
            PageKind::Detail => &self.detail,
        }
    }

    /// Fetches a page with the engine and action plan for its kind
    pub async fn fetch(&self, kind: PageKind, url: &str) -> FetchResult {
        let plan = self.source.actions.plan_for(kind);
        let engine = self.engine_for(kind);
        if plan.is_empty() {
            engine.fetch(url).await
        } else {
            engine.fetch_rendered(url, plan).await
        }
    }
}
