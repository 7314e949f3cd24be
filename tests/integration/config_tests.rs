//! Loading configuration files from disk

use std::io::Write;
use sumi_harvest::config::{
    load_sources, EngineKind, StorageFormat, CURRENT_CONFIG_VERSION,
};
use sumi_harvest::pipeline::{Pipeline, PipelineContext};
use tempfile::Builder;

fn write_config(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file.flush().expect("Failed to flush config");
    file
}

const LEGACY_JSON: &str = r#"[
  {
    "id": "legacy",
    "use_browser": false,
    "format": "json",
    "rate-limit": 0.5,
    "entrypoints": [{ "url": "https://news.test/list" }],
    "discovery": { "method": "css", "selector": "a.story" }
  }
]"#;

#[test]
fn test_legacy_source_migrates_to_runnable_config() {
    let file = write_config(LEGACY_JSON, ".json");
    let loaded = load_sources(file.path()).expect("Failed to load legacy config");

    assert!(loaded.rejected.is_empty(), "rejected: {:?}", loaded.rejected);
    assert!(loaded.was_migrated("legacy"));

    let source = &loaded.sources[0];
    assert_eq!(source.source_id, "legacy");
    assert_eq!(source.config_version, CURRENT_CONFIG_VERSION);
    assert_eq!(source.engine.kind, EngineKind::Http);
    assert_eq!(source.engine.rate_limit.min_delay, 0.5);
    assert_eq!(source.storage.format, StorageFormat::Json);

    assert!(Pipeline::new(source.clone(), PipelineContext::default()).is_ok());
}

#[test]
fn test_migrated_config_reloads_unchanged() {
    let file = write_config(LEGACY_JSON, ".json");
    let first = load_sources(file.path()).expect("Failed to load legacy config");

    let saved = serde_json::to_string_pretty(&first.sources).expect("Failed to serialize");
    let file = write_config(&saved, ".json");
    let second = load_sources(file.path()).expect("Failed to reload config");

    assert!(second.migrated.is_empty());
    assert_eq!(first.sources, second.sources);
    assert_ne!(first.config_hash, second.config_hash);
}

#[test]
fn test_hybrid_toml_source() {
    let file = write_config(
        r#"
[[source]]
source-id = "mixed"
config-version = 2

[source.engine]
type = "hybrid"
render-endpoint = "http://render.test/render"

[[source.entrypoints]]
url = "https://shop.test/c?p={page}"
paging = { mode = "page", start = 1, count = 3 }

[source.discovery]
method = "xpath"
selector = "//a[@class='product']/@href"
"#,
        ".toml",
    );

    let loaded = load_sources(file.path()).expect("Failed to load TOML config");
    let source = &loaded.sources[0];
    assert!(loaded.was_migrated("mixed"));
    assert_eq!(source.engine.kind, EngineKind::Hybrid);
    assert!(source.engine.listing_mode.is_some());
    assert!(source.engine.detail_mode.is_some());

    let pipeline = Pipeline::new(source.clone(), PipelineContext::default())
        .expect("Hybrid source with render endpoint should build");
    assert_eq!(
        pipeline.listing_urls(),
        vec![
            "https://shop.test/c?p=1",
            "https://shop.test/c?p=2",
            "https://shop.test/c?p=3"
        ]
    );
}

#[test]
fn test_string_config_version_loads_as_current() {
    let file = write_config(
        r#"
[[source]]
source-id = "quoted"
config-version = "v3"

[[source.entrypoints]]
url = "https://news.test/list"

[source.discovery]
method = "css"
selector = "a.story"
"#,
        ".toml",
    );

    let loaded = load_sources(file.path()).expect("Failed to load config");
    assert!(loaded.rejected.is_empty(), "rejected: {:?}", loaded.rejected);
    assert!(!loaded.was_migrated("quoted"));
    assert_eq!(loaded.sources[0].config_version, CURRENT_CONFIG_VERSION);
}
