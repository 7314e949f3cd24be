//! Source-document migration
//!
//! Migration runs on the generic document value, before typed
//! deserialization, so legacy shapes that no longer fit [`SourceConfig`]
//! can still be relocated. Each step is pure and keyed off the detected
//! version; a document already at the current version only has its version
//! key rewritten as a plain integer.
//!
//! [`SourceConfig`]: crate::config::SourceConfig

use crate::config::types::CURRENT_CONFIG_VERSION;
use serde_json::{json, Map, Value};

const VERSION_KEY: &str = "config-version";
const VERSION_ALIASES: &[&str] = &["config_version", "configVersion"];

/// Migrates one source document to the current version
///
/// Returns the migrated document and whether anything was changed.
/// Unknown or garbled versions are treated as version 0. Documents claiming
/// a version newer than this build understands are not migrated. Either way
/// the version key is written back as an integer so `"v3"` or `"3"` load the
/// same as `3`.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sumi_harvest::config::migrate;
///
/// let (doc, migrated) = migrate(json!({"source-id": "a", "format": "jsonl"}));
/// assert!(migrated);
/// assert_eq!(doc["storage"]["format"], "jsonl");
///
/// let (_, again) = migrate(doc);
/// assert!(!again);
/// ```
pub fn migrate(doc: Value) -> (Value, bool) {
    let mut map = match doc {
        Value::Object(map) => map,
        other => return (other, false),
    };

    let version = detect_version(&map);
    if version >= CURRENT_CONFIG_VERSION {
        if version > CURRENT_CONFIG_VERSION {
            tracing::warn!(
                version,
                current = CURRENT_CONFIG_VERSION,
                "Config version is newer than supported, leaving as is"
            );
        }
        // "3", "v3" or an aliased key still deserialize as the integer field
        stamp_version(&mut map, version);
        return (Value::Object(map), false);
    }

    if version < 1 {
        v0_to_v1(&mut map);
    }
    if version < 2 {
        v1_to_v2(&mut map);
    }
    if version < 3 {
        v2_to_v3(&mut map);
    }

    stamp_version(&mut map, CURRENT_CONFIG_VERSION);
    (Value::Object(map), true)
}

/// Writes `version` as an integer under the canonical key, dropping aliases
fn stamp_version(map: &mut Map<String, Value>, version: u32) {
    for alias in VERSION_ALIASES {
        map.remove(*alias);
    }
    map.insert(VERSION_KEY.to_string(), json!(version));
}

/// Reads the schema version from a document
///
/// Accepts integers and strings such as `"2"`, `"v2"` or `"2.1"`.
pub fn detect_version(map: &Map<String, Value>) -> u32 {
    let raw = map.get(VERSION_KEY).or_else(|| {
        VERSION_ALIASES
            .iter()
            .find_map(|alias| map.get(*alias))
    });

    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u32))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_version_string(s),
        _ => 0,
    }
}

fn parse_version_string(s: &str) -> u32 {
    let trimmed = s.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let major = trimmed.split('.').next().unwrap_or("");
    major.parse().unwrap_or(0)
}

/// v0 -> v1: the engine block becomes mandatory
fn v0_to_v1(map: &mut Map<String, Value>) {
    let use_browser = take_any(map, &["use-browser", "use_browser"])
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let engine = match map.remove("engine") {
        Some(Value::Object(block)) => Value::Object(block),
        Some(Value::String(kind)) => json!({ "type": kind.to_lowercase() }),
        _ if use_browser => json!({ "type": "browser" }),
        _ => json!({ "type": "http" }),
    };
    map.insert("engine".to_string(), engine);
}

/// v1 -> v2: flat storage format and rate limit move into nested blocks
fn v1_to_v2(map: &mut Map<String, Value>) {
    if let Some(format) = take_any(map, &["storage-format", "storage_format", "format"]) {
        let storage = object_entry(map, "storage");
        storage.entry("format").or_insert(format);
    }

    if let Some(delay) = map.get("rate-limit").filter(|v| v.is_number()).cloned() {
        map.remove("rate-limit");
        let engine = object_entry(map, "engine");
        let rate_limit = object_entry(engine, "rate-limit");
        rate_limit.entry("min-delay").or_insert(delay);
    }
}

/// v2 -> v3: explicit hybrid modes and the `source-id` key
fn v2_to_v3(map: &mut Map<String, Value>) {
    if !map.contains_key("source-id") {
        if let Some(id) = take_any(map, &["id", "source_id", "sourceId"]) {
            map.insert("source-id".to_string(), id);
        }
    }

    let engine = object_entry(map, "engine");
    let is_hybrid = engine
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.eq_ignore_ascii_case("hybrid"))
        .unwrap_or(false);
    if is_hybrid {
        engine
            .entry("listing-mode")
            .or_insert_with(|| json!("http"));
        engine
            .entry("detail-mode")
            .or_insert_with(|| json!("browser"));
    }
}

/// Removes and returns the first present key
fn take_any(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| map.remove(*key))
}

/// Returns the object stored at `key`, replacing any non-object value
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot holds an object"),
    }
}
