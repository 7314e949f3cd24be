use crate::config::types::{
    ActionsConfig, DiscoveryConfig, DiscoveryMethod, EngineConfig, EntryPoint, PagingMode,
    PipelineConfig, QualityConfig, SourceConfig, ValidationConfig, MAX_DURATION_SECS,
};
use crate::pipeline::{LinkExtractor, QualityFilter};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

const MAX_CONCURRENCY: usize = 64;

/// Validates a single source configuration
///
/// Every check here runs before any network I/O; a source failing it is
/// aborted without being fetched.
pub fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    validate_source_id(&source.source_id)?;
    validate_entrypoints(&source.entrypoints)?;
    validate_discovery(&source.discovery)?;
    validate_engine(&source.engine)?;
    validate_actions(&source.actions)?;
    validate_pipeline(&source.pipeline)?;
    validate_item_rules(&source.validation)?;
    validate_quality(&source.quality)?;
    Ok(())
}

/// Validates a set of sources loaded from the same file
///
/// Besides per-source checks, rejects source ids that collide.
pub fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for source in sources {
        validate_source(source)
            .map_err(|e| prefix_error(&source.source_id, e))?;
        if !seen.insert(source.source_id.as_str()) {
            return Err(ConfigError::DuplicateSource(source.source_id.clone()));
        }
    }
    Ok(())
}

fn prefix_error(source_id: &str, error: ConfigError) -> ConfigError {
    match error {
        ConfigError::Validation(msg) => {
            ConfigError::Validation(format!("source '{}': {}", source_id, msg))
        }
        ConfigError::InvalidUrl(msg) => {
            ConfigError::InvalidUrl(format!("source '{}': {}", source_id, msg))
        }
        ConfigError::InvalidPattern(msg) => {
            ConfigError::InvalidPattern(format!("source '{}': {}", source_id, msg))
        }
        other => other,
    }
}

fn validate_source_id(source_id: &str) -> Result<(), ConfigError> {
    if source_id.is_empty() {
        return Err(ConfigError::Validation(
            "source-id cannot be empty".to_string(),
        ));
    }

    if source_id.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "source-id must not contain whitespace, got '{}'",
            source_id
        )));
    }

    Ok(())
}

fn validate_entrypoints(entrypoints: &[EntryPoint]) -> Result<(), ConfigError> {
    if entrypoints.is_empty() {
        return Err(ConfigError::Validation(
            "at least one entrypoint is required".to_string(),
        ));
    }

    for entry in entrypoints {
        // Placeholders are substituted before parsing so templates validate too
        let sample = entry.url.replace("{page}", "1").replace("{offset}", "0");
        let url = Url::parse(&sample).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid entrypoint URL '{}': {}", entry.url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Entrypoint URL '{}' must use http or https",
                entry.url
            )));
        }

        if let Some(paging) = &entry.paging {
            let expands = matches!(paging.mode, PagingMode::Page | PagingMode::Offset);
            if expands && paging.count == 0 {
                return Err(ConfigError::Validation(format!(
                    "paging count for '{}' must be >= 1",
                    entry.url
                )));
            }
            if expands && paging.step == 0 && paging.count > 1 {
                return Err(ConfigError::Validation(format!(
                    "paging step for '{}' cannot be 0 when count > 1",
                    entry.url
                )));
            }
        }
    }

    Ok(())
}

fn validate_discovery(discovery: &DiscoveryConfig) -> Result<(), ConfigError> {
    let rule_present = |value: &Option<String>| {
        value.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    };

    match discovery.method {
        DiscoveryMethod::Regex if !rule_present(&discovery.pattern) => {
            return Err(ConfigError::InvalidPattern(
                "discovery.method = regex requires a non-empty pattern".to_string(),
            ));
        }
        DiscoveryMethod::Css | DiscoveryMethod::Xpath if !rule_present(&discovery.selector) => {
            return Err(ConfigError::InvalidPattern(format!(
                "discovery.method = {:?} requires a non-empty selector",
                discovery.method
            )));
        }
        _ => {}
    }

    if discovery.attribute.trim().is_empty() {
        return Err(ConfigError::InvalidPattern(
            "discovery.attribute cannot be empty".to_string(),
        ));
    }

    if let Some(base) = &discovery.base_url {
        Url::parse(base).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid discovery.base-url '{}': {}", base, e))
        })?;
    }

    // Compiling the extractor surfaces bad regexes, selectors and XPath
    LinkExtractor::from_config(discovery)?;

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if !(engine.timeout > 0.0) {
        return Err(ConfigError::Validation(format!(
            "engine.timeout must be > 0, got {}",
            engine.timeout
        )));
    }
    check_seconds("engine.timeout", engine.timeout)?;

    let rate = &engine.rate_limit;
    if let Some(rps) = rate.rps {
        if !(rps > 0.0) || !rps.is_finite() {
            return Err(ConfigError::Validation(format!(
                "engine.rate-limit.rps must be > 0, got {}",
                rps
            )));
        }
        // One token per day at the slowest
        if rps < 1.0 / MAX_DURATION_SECS {
            return Err(ConfigError::Validation(format!(
                "engine.rate-limit.rps must be >= {}, got {}",
                1.0 / MAX_DURATION_SECS,
                rps
            )));
        }
    }
    if rate.burst < 1 {
        return Err(ConfigError::Validation(
            "engine.rate-limit.burst must be >= 1".to_string(),
        ));
    }
    check_seconds("engine.rate-limit.min-delay", rate.min_delay)?;
    check_seconds("engine.rate-limit.jitter", rate.jitter)?;

    let retry = &engine.retry;
    check_seconds("engine.retry.base-delay", retry.base_delay)?;
    check_seconds("engine.retry.max-delay", retry.max_delay)?;
    if retry.max_delay < retry.base_delay {
        return Err(ConfigError::Validation(format!(
            "engine.retry.max-delay ({}) must be >= base-delay ({})",
            retry.max_delay, retry.base_delay
        )));
    }
    if !(0.0..=1.0).contains(&retry.jitter_fraction) {
        return Err(ConfigError::Validation(format!(
            "engine.retry.jitter-fraction must be within [0, 1], got {}",
            retry.jitter_fraction
        )));
    }

    if let Some(endpoint) = &engine.render_endpoint {
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid engine.render-endpoint '{}': {}", endpoint, e))
        })?;
    }

    for name in engine.headers.keys() {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "engine.headers contains an empty header name".to_string(),
            ));
        }
    }

    Ok(())
}

/// Seconds settings must be finite and within `[0, MAX_DURATION_SECS]`
fn check_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=MAX_DURATION_SECS).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be within [0, {}] seconds, got {}",
            name, MAX_DURATION_SECS, value
        )));
    }
    Ok(())
}

fn validate_actions(actions: &ActionsConfig) -> Result<(), ConfigError> {
    for plan in [&actions.listing, &actions.detail] {
        for action in &plan.steps {
            if let Some(selector) = action.selector() {
                if selector.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "action '{}' requires a non-empty selector",
                        action.name()
                    )));
                }
            }
        }
        if let Some(wait_for) = &plan.wait_for {
            if wait_for.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "actions wait-for cannot be empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    for (name, width) in [
        ("listing-concurrency", pipeline.listing_concurrency),
        ("detail-concurrency", pipeline.detail_concurrency),
    ] {
        if width < 1 || width > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "pipeline.{} must be between 1 and {}, got {}",
                name, MAX_CONCURRENCY, width
            )));
        }
    }
    Ok(())
}

fn validate_item_rules(rules: &ValidationConfig) -> Result<(), ConfigError> {
    if let Some(max) = rules.max_title_len {
        if max < rules.min_title_len {
            return Err(ConfigError::Validation(format!(
                "validation.max-title-len ({}) must be >= min-title-len ({})",
                max, rules.min_title_len
            )));
        }
    }
    Ok(())
}

fn validate_quality(quality: &QualityConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&quality.max_boilerplate_ratio) {
        return Err(ConfigError::Validation(format!(
            "quality.max-boilerplate-ratio must be within [0, 1], got {}",
            quality.max_boilerplate_ratio
        )));
    }

    // Compiling the filter surfaces bad block patterns
    QualityFilter::new(quality)?;

    Ok(())
}
