use crate::config::migration::migrate;
use crate::config::types::SourceConfig;
use crate::config::validation::validate_source;
use crate::ConfigError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Key holding the array of sources in a multi-source document
const SOURCES_KEY: &str = "source";

/// On-disk format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(format!(
                "{} (extension {:?})",
                path.display(),
                other.unwrap_or("none")
            ))),
        }
    }
}

/// A source document that could not be turned into a runnable source
#[derive(Debug)]
pub struct RejectedSource {
    /// Source id when the document carries one, else a positional name
    pub source_id: String,
    pub error: ConfigError,
}

/// Result of loading a configuration file
#[derive(Debug)]
pub struct LoadedSources {
    /// Sources that migrated, deserialized and validated
    pub sources: Vec<SourceConfig>,

    /// Sources rejected at load time; reported as failed, never fetched
    pub rejected: Vec<RejectedSource>,

    /// Ids of sources that were migrated from an older schema version
    pub migrated: Vec<String>,

    /// Hex-encoded SHA-256 of the raw document
    pub config_hash: String,
}

impl LoadedSources {
    pub fn was_migrated(&self, source_id: &str) -> bool {
        self.migrated.iter().any(|id| id == source_id)
    }
}

/// Loads every source from a configuration file
///
/// The file is parsed into a generic document, each source document is
/// migrated to the current schema, deserialized and validated. A source that
/// fails any of those steps is rejected on its own; duplicate source ids
/// fail the whole file.
///
/// # Arguments
///
/// * `path` - Path to a `.toml` or `.json` configuration file
///
/// # Returns
///
/// * `Ok(LoadedSources)` - Runnable sources, rejected sources and the file hash
/// * `Err(ConfigError)` - The file could not be read or parsed, or ids collide
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_sources;
///
/// let loaded = load_sources(Path::new("sources.toml")).unwrap();
/// println!("{} runnable sources", loaded.sources.len());
/// ```
pub fn load_sources(path: &Path) -> Result<LoadedSources, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_sources_str(&content, format)
}

/// Parses sources from an in-memory document
pub fn parse_sources_str(content: &str, format: ConfigFormat) -> Result<LoadedSources, ConfigError> {
    let document: Value = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    let mut loaded = LoadedSources {
        sources: Vec::new(),
        rejected: Vec::new(),
        migrated: Vec::new(),
        config_hash: compute_config_hash(content),
    };
    let mut seen_ids = HashSet::new();

    for (index, raw) in split_documents(document)?.into_iter().enumerate() {
        let (doc, migrated) = migrate(raw);
        let source_id = doc
            .get("source-id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("source-{}", index + 1));

        if !seen_ids.insert(source_id.clone()) {
            return Err(ConfigError::DuplicateSource(source_id));
        }

        if migrated {
            tracing::info!(source = %source_id, "Migrated source config to current version");
            loaded.migrated.push(source_id.clone());
        }

        let parsed = serde_json::from_value::<SourceConfig>(doc)
            .map_err(ConfigError::from)
            .and_then(|source| validate_source(&source).map(|()| source));

        match parsed {
            Ok(source) => loaded.sources.push(source),
            Err(error) => {
                tracing::warn!(source = %source_id, error = %error, "Rejected source config");
                loaded.rejected.push(RejectedSource { source_id, error });
            }
        }
    }

    Ok(loaded)
}

/// Splits a document into per-source documents
///
/// Accepted shapes: a single source object, an array of sources, or an
/// object with a `source` array (the TOML `[[source]]` form).
fn split_documents(document: Value) -> Result<Vec<Value>, ConfigError> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(SOURCES_KEY) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(ConfigError::Validation(format!(
                "'{}' must be an array of sources, got {}",
                SOURCES_KEY,
                type_name(&other)
            ))),
            None => Ok(vec![Value::Object(map)]),
        },
        other => Err(ConfigError::Validation(format!(
            "Config document must be an object or array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Computes a SHA-256 hash of the configuration content
///
/// Recorded in the run report so runs can be tied to the exact
/// configuration they used.
pub fn compute_config_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
