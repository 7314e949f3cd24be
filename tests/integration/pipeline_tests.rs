//! End-to-end pipeline runs against mock sites

use crate::common::{
    article, css_source, listing, mount_listing_page, mount_page, story_text,
};
use serde_json::json;
use sumi_harvest::config::{
    DedupeField, DiscoveryConfig, EngineKind, EntryPoint, PagingConfig, PagingMode,
};
use sumi_harvest::diagnostics::{DiagnosisLabel, NextStep};
use sumi_harvest::output::MetricsRegistry;
use sumi_harvest::pipeline::{Pipeline, PipelineContext, Stage};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run(pipeline: &Pipeline) -> (sumi_harvest::PipelineArtifacts, MetricsRegistry) {
    let metrics = MetricsRegistry::new();
    let artifacts = pipeline
        .run(&CancellationToken::new(), &metrics)
        .await
        .expect("Pipeline run failed");
    (artifacts, metrics)
}

#[tokio::test]
async fn test_full_pipeline_two_listing_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_listing_page(
        &server,
        "/list",
        "1",
        listing(&["/item/1", "/item/2", "/item/3?utm_source=feed"]),
    )
    .await;
    mount_listing_page(
        &server,
        "/list",
        "2",
        listing(&["/item/2", "/item/4", "/item/5", "/other/x"]),
    )
    .await;

    let budget = story_text("the new transit budget");
    mount_page(&server, "/item/1", article("Transit budget debated", &budget)).await;
    mount_page(
        &server,
        "/item/2",
        article("Library hours extended", &story_text("longer library hours")),
    )
    .await;
    // Same story syndicated under another URL
    mount_page(&server, "/item/3", article("Transit budget debated", &budget)).await;
    Mock::given(method("GET"))
        .and(path("/item/4"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    mount_page(&server, "/item/5", article("Brief", "Too short.")).await;

    let mut source = css_source("news", format!("{}/list?page={{page}}", base));
    source.entrypoints = vec![EntryPoint::new(format!("{}/list?page={{page}}", base))
        .with_paging(PagingConfig {
            mode: PagingMode::Page,
            start: 1,
            step: 1,
            count: 2,
        })];
    source.discovery.filter = Some("/item/".to_string());
    source.discovery.dedupe = vec![DedupeField::Url, DedupeField::Content];
    source.quality.min_text_len = 40;

    let pipeline = Pipeline::new(source, PipelineContext::default()).expect("Invalid source");
    let (artifacts, metrics) = run(&pipeline).await;

    assert_eq!(
        artifacts.listing_urls,
        vec![format!("{}/list?page=1", base), format!("{}/list?page=2", base)]
    );
    assert_eq!(artifacts.detail_links.len(), 5, "links: {:?}", artifacts.detail_links);
    assert_eq!(artifacts.detail_links[2], format!("{}/item/3", base));

    let stats = &artifacts.stats;
    assert_eq!(stats.listing_fetched, 2);
    assert_eq!(stats.listing_failed, 0);
    assert_eq!(stats.detail_fetched, 4);
    assert_eq!(stats.detail_failed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].stage, Stage::FetchDetail);
    assert!(stats.errors[0].url.ends_with("/item/4"));

    assert_eq!(stats.items_parsed, 4);
    assert_eq!(stats.items_valid, 4);
    assert_eq!(stats.items_passed_quality, 3);
    assert_eq!(stats.items_kept, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.items_kept + stats.items_dropped, stats.items_parsed);

    let kept: Vec<&str> = artifacts.valid_items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(kept, vec![format!("{}/item/1", base), format!("{}/item/2", base)]);
    assert!(artifacts.valid_items.iter().all(|i| i.fingerprint.is_some()));

    let codes: Vec<&str> = artifacts
        .dropped_items
        .iter()
        .flat_map(|d| d.issues.iter().map(|i| i.code.as_str()))
        .collect();
    assert!(codes.contains(&"short_text"));
    assert!(codes.contains(&"duplicate_content"));

    assert_eq!(artifacts.stages.first(), Some(&Stage::Pending));
    assert_eq!(artifacts.stages.last(), Some(&Stage::Done));
    assert!(!artifacts.cancelled);

    assert_eq!(metrics.counter("fetch.detail.ok"), 4);
    assert_eq!(metrics.counter("fetch.detail.failed"), 1);
    assert_eq!(metrics.counter("items.kept"), 2);
}

#[tokio::test]
async fn test_listing_retried_on_503() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(3)
        .mount(&server)
        .await;

    let mut source = css_source("flaky", format!("{}/list", server.uri()));
    source.engine.retry.max_retries = 2;

    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, metrics) = run(&pipeline).await;

    assert_eq!(artifacts.stats.listing_failed, 1);
    assert_eq!(artifacts.listing_pages[0].attempts, 3);
    assert_eq!(artifacts.listing_pages[0].status_code, Some(503));
    assert_eq!(metrics.counter("fetch.listing.attempts"), 3);
    assert!(artifacts.detail_links.is_empty());
    // Fetch failures are recorded, not fatal
    assert_eq!(artifacts.stages.last(), Some(&Stage::Done));
}

#[tokio::test]
async fn test_rate_limited_listing_diagnosed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_string("slow down"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = css_source("busy", format!("{}/list", server.uri()));
    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    let diagnosis = artifacts.source_diagnosis();
    assert_eq!(diagnosis.label, DiagnosisLabel::RateLimited);
    assert_eq!(diagnosis.next_step, NextStep::TryHttpTuning);
    assert_eq!(diagnosis.details.get("retryAfter").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_script_shell_listing_suggests_browser() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/list",
        "<html><body><noscript>Please enable JavaScript</noscript></body></html>".to_string(),
    )
    .await;

    let source = css_source("spa", format!("{}/list", server.uri()));
    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    // The page itself was fetched fine; only the diagnosis flags it
    assert_eq!(artifacts.stats.listing_fetched, 1);
    assert_eq!(artifacts.stats.links_extracted, 0);
    let diagnosis = artifacts.source_diagnosis();
    assert_eq!(diagnosis.label, DiagnosisLabel::JsRequiredOrMissing);
    assert_eq!(diagnosis.next_step, NextStep::SwitchToBrowser);
}

#[tokio::test]
async fn test_regex_discovery_with_capture_group() {
    let server = MockServer::start().await;
    let base = server.uri();

    let html = format!(
        r#"<html><head><title>Feed</title></head><body>
        <script>var stories = [{{"link": "{base}/story/10"}}, {{"link": "{base}/story/11"}}];</script>
        <p>The latest stories are loaded from the inline data block above.</p>
        </body></html>"#
    );
    mount_page(&server, "/feed", html).await;
    mount_page(
        &server,
        "/story/10",
        article("Harbor cleanup", &story_text("the harbor cleanup")),
    )
    .await;
    mount_page(
        &server,
        "/story/11",
        article("School lunches", &story_text("school lunch menus")),
    )
    .await;

    let mut source = css_source("inline", format!("{}/feed", base));
    source.discovery = DiscoveryConfig::regex(r#""link": "([^"]+)""#);

    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    assert_eq!(
        artifacts.detail_links,
        vec![format!("{}/story/10", base), format!("{}/story/11", base)]
    );
    assert_eq!(artifacts.stats.items_kept, 2);
}

#[tokio::test]
async fn test_xpath_discovery() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/list", listing(&["/item/7", "/item/8"])).await;
    mount_page(&server, "/item/7", article("Park opens", &story_text("the new park"))).await;
    mount_page(
        &server,
        "/item/8",
        article("Bridge repairs", &story_text("bridge repairs")),
    )
    .await;

    let mut source = css_source("xpath", format!("{}/list", base));
    source.discovery = DiscoveryConfig::xpath("//a[contains(@class,'item')]/@href");

    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    assert_eq!(artifacts.detail_links.len(), 2);
    let titles: Vec<_> = artifacts
        .valid_items
        .iter()
        .filter_map(|i| i.title.as_deref())
        .collect();
    assert_eq!(titles, vec!["Park opens", "Bridge repairs"]);
}

#[tokio::test]
async fn test_browser_engine_through_render_endpoint() {
    let server = MockServer::start().await;
    let base = server.uri();
    let list_url = format!("{}/list", base);
    let item_url = format!("{}/item/1", base);

    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(json!({ "url": list_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": listing(&["/item/1"]),
            "statusCode": 200
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .and(body_partial_json(json!({ "url": item_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": article("Rendered story", &story_text("rendered pages")),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut source = css_source("rendered", list_url.clone());
    source.engine.kind = EngineKind::Browser;
    source.engine.render_endpoint = Some(format!("{}/render", base));

    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    assert!(artifacts.listing_pages[0].rendered);
    assert_eq!(artifacts.detail_links, vec![item_url.clone()]);
    assert_eq!(artifacts.stats.items_kept, 1);
    assert_eq!(artifacts.valid_items[0].url, item_url);
    assert_eq!(
        artifacts.valid_items[0].title.as_deref(),
        Some("Rendered story")
    );
}

#[tokio::test]
async fn test_max_detail_pages_caps_fetches() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/list", listing(&["/item/1", "/item/2", "/item/3"])).await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(article("First", &story_text("the first story"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("unused"))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/item/2", article("Second", &story_text("the second story"))).await;

    let mut source = css_source("capped", format!("{}/list", base));
    source.pipeline.max_detail_pages = Some(2);

    let pipeline = Pipeline::new(source, PipelineContext::default()).unwrap();
    let (artifacts, _) = run(&pipeline).await;

    assert_eq!(artifacts.stats.links_extracted, 3);
    assert_eq!(artifacts.detail_links.len(), 2);
    assert_eq!(artifacts.stats.items_kept, 2);
}
