//! Coordinated runs across sources

use crate::common::{article, css_source, listing, mount_page, story_text};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{compute_config_hash, load_sources, SourceConfig};
use sumi_harvest::output::JsonLinesSink;
use sumi_harvest::runtime::{Coordinator, RunOptions};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts `/list` linking to two stories, plus the stories
async fn mount_site(server: &MockServer) {
    mount_page(server, "/list", listing(&["/item/1", "/item/2"])).await;
    mount_page(
        server,
        "/item/1",
        article("Harbor cleanup", &story_text("the harbor cleanup")),
    )
    .await;
    mount_page(
        server,
        "/item/2",
        article("Library hours", &story_text("longer library hours")),
    )
    .await;
}

fn site_source(id: &str, server: &MockServer) -> SourceConfig {
    css_source(id, format!("{}/list", server.uri()))
}

#[tokio::test]
async fn test_escalates_script_shell_to_renderer() {
    let server = MockServer::start().await;
    let base = server.uri();
    let list_url = format!("{}/list", base);
    let item_url = format!("{}/item/1", base);

    // Plain HTTP only sees the script shell
    mount_page(
        &server,
        "/list",
        "<html><body><div id=\"app\"></div><script src=\"/app.js\"></script></body></html>"
            .to_string(),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(json!({ "url": list_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": listing(&["/item/1"]),
            "statusCode": 200,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(json!({ "url": item_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": article("Rendered story", &story_text("rendered pages")),
            "statusCode": 200,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = css_source("spa", list_url);
    source.engine.render_endpoint = Some(format!("{}/render", base));
    source.engine.escalate_on_diagnosis = true;

    let report = Coordinator::default().run(vec![source]).await;
    let spa = report.source("spa").expect("Missing source report");

    assert!(spa.ok, "report: {:?}", spa);
    assert!(spa.escalated);
    assert_eq!(spa.stats.items_kept, 1);
    assert_eq!(report.metrics.counters["sources.escalated"], 1);
    assert_eq!(report.metrics.counters["sources.ok"], 1);
}

#[tokio::test]
async fn test_no_escalation_when_disabled() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/list",
        "<html><body>Please enable JavaScript.</body></html>".to_string(),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut source = site_source("spa", &server);
    source.engine.render_endpoint = Some(format!("{}/render", server.uri()));

    let report = Coordinator::default().run(vec![source]).await;
    let spa = report.source("spa").unwrap();
    assert!(spa.ok);
    assert!(!spa.escalated);
    assert_eq!(spa.stats.items_kept, 0);
    assert_eq!(spa.diagnosis.next_step, sumi_harvest::diagnostics::NextStep::SwitchToBrowser);
}

#[tokio::test]
async fn test_run_loaded_reports_rejected_and_migrated() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let content = format!(
        r#"
[[source]]
source-id = "current"
config-version = 3

[[source.entrypoints]]
url = "{base}/list"

[source.discovery]
method = "css"
selector = "a.item"

[[source]]
id = "legacy"
engine = "http"
format = "jsonl"

[[source.entrypoints]]
url = "{base}/list"

[source.discovery]
method = "css"
selector = "a.item"

[[source]]
source-id = "broken"
config-version = 3

[[source.entrypoints]]
url = "{base}/list"

[source.discovery]
method = "css"
"#
    );
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();

    let loaded = load_sources(file.path()).expect("Failed to load config");
    assert_eq!(loaded.sources.len(), 2);
    assert_eq!(loaded.rejected.len(), 1);

    let report = Coordinator::default().run_loaded(loaded).await;

    assert_eq!(report.config_hash.as_deref(), Some(compute_config_hash(&content).as_str()));
    assert_eq!(report.summary.sources_total, 3);
    assert_eq!(report.summary.sources_ok, 2);
    assert_eq!(report.summary.sources_failed, 1);
    assert_eq!(report.summary.items_kept, 4);

    assert!(report.source("legacy").unwrap().migrated);
    assert!(!report.source("current").unwrap().migrated);

    let broken = report.source("broken").unwrap();
    assert!(!broken.ok);
    assert!(broken
        .fatal_error
        .as_deref()
        .unwrap()
        .contains("selector"));
    assert!(!report.all_ok());
}

#[tokio::test]
async fn test_sink_writes_artifacts() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let output = tempfile::tempdir().expect("Failed to create temp dir");

    let mut source = site_source("site", &server);
    source.storage.write_dropped = true;

    let coordinator = Coordinator::new(RunOptions::default())
        .with_sink(Arc::new(JsonLinesSink::new(output.path())));
    let report = coordinator.run(vec![source]).await;

    let site = report.source("site").unwrap();
    assert!(site.ok);
    assert_eq!(
        site.artifacts,
        vec![
            output.path().join("site").join("items.jsonl"),
            output.path().join("site").join("dropped.jsonl"),
        ]
    );

    let items = std::fs::read_to_string(output.path().join("site/items.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = items
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid JSON line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["title"], "Harbor cleanup");
    assert!(lines[0]["url"].as_str().unwrap().ends_with("/item/1"));

    let dropped = std::fs::read_to_string(output.path().join("site/dropped.jsonl")).unwrap();
    assert!(dropped.is_empty());
}

#[tokio::test]
async fn test_shared_dedupe_across_sources() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let options = RunOptions {
        max_parallel_sources: 1,
        share_dedupe: true,
        ..RunOptions::default()
    };
    let report = Coordinator::new(options)
        .run(vec![site_source("first", &server), site_source("mirror", &server)])
        .await;

    let first = report.source("first").unwrap();
    let mirror = report.source("mirror").unwrap();
    assert_eq!(first.stats.items_kept, 2);
    assert_eq!(mirror.stats.items_kept, 0);
    assert_eq!(mirror.stats.duplicates, 2);
    // Duplicates are item drops, not source failures
    assert!(mirror.ok);
}

#[tokio::test]
async fn test_private_dedupe_by_default() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let report = Coordinator::default()
        .run(vec![site_source("first", &server), site_source("mirror", &server)])
        .await;

    assert_eq!(report.source("first").unwrap().stats.items_kept, 2);
    assert_eq!(report.source("mirror").unwrap().stats.items_kept, 2);
    assert_eq!(report.summary.items_kept, 4);
}

#[tokio::test]
async fn test_timeout_cancels_slow_source() {
    let server = MockServer::start().await;
    mount_page(&server, "/list", listing(&["/item/1"])).await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(article("Slow", &story_text("slow servers")))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let options = RunOptions {
        timeout: Some(Duration::from_millis(300)),
        ..RunOptions::default()
    };
    let report = Coordinator::new(options)
        .run(vec![site_source("slow", &server)])
        .await;

    let slow = report.source("slow").unwrap();
    assert!(slow.cancelled);
    assert!(!slow.ok);
    assert_eq!(slow.stats.items_kept, 0);
    assert_eq!(slow.stats.detail_failed, 0);
}

#[tokio::test]
async fn test_escalated_source_respects_shared_dedupe() {
    let server = MockServer::start().await;
    let base = server.uri();
    let shell_url = format!("{}/shell", base);

    mount_page(&server, "/list", listing(&["/item/1"])).await;
    mount_page(
        &server,
        "/item/1",
        article("Harbor cleanup", &story_text("the harbor cleanup")),
    )
    .await;
    mount_page(
        &server,
        "/shell",
        "<html><body><div id=\"app\"></div><script src=\"/app.js\"></script></body></html>"
            .to_string(),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(json!({ "url": shell_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": listing(&["/item/1", "/item/2"]),
            "statusCode": 200,
        })))
        .mount(&server)
        .await;
    for (id, title) in [("1", "Harbor cleanup"), ("2", "Library hours")] {
        Mock::given(method("POST"))
            .and(path("/render"))
            .and(body_partial_json(json!({ "url": format!("{}/item/{}", base, id) })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html": article(title, &story_text(title)),
                "statusCode": 200,
            })))
            .mount(&server)
            .await;
    }

    let mut spa = css_source("spa", shell_url);
    spa.engine.render_endpoint = Some(format!("{}/render", base));
    spa.engine.escalate_on_diagnosis = true;

    let options = RunOptions {
        max_parallel_sources: 1,
        share_dedupe: true,
        ..RunOptions::default()
    };
    let report = Coordinator::new(options)
        .run(vec![site_source("plain", &server), spa])
        .await;

    assert_eq!(report.source("plain").unwrap().stats.items_kept, 1);

    let spa = report.source("spa").unwrap();
    assert!(spa.escalated, "report: {:?}", spa);
    // /item/1 already belongs to the first source
    assert_eq!(spa.stats.items_kept, 1);
    assert_eq!(spa.stats.duplicates, 1);
}
