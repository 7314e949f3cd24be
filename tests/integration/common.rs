//! Shared fixtures for integration tests

use sumi_harvest::config::{DiscoveryConfig, EntryPoint, SourceConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A detail page whose main content lives in an `<article>`
pub fn article(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
</head>
<body>
  <nav><a href="/">Home</a> <a href="/about">About</a></nav>
  <article><p>{body}</p></article>
  <footer>Published by the test newsroom</footer>
</body>
</html>"#
    )
}

/// A listing page linking to `hrefs` with `class="item"`
pub fn listing(hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<li><a class="item" href="{}">Story</a></li>"#, href))
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><title>Latest stories</title></head>
<body>
  <h1>Latest stories from the test newsroom</h1>
  <ul>{links}</ul>
  <a href="/about">About this site</a>
</body>
</html>"#
    )
}

/// Mounts a 200 HTML response for `route`
pub async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// Mounts a listing page answering `route?page=<page>`
pub async fn mount_listing_page(server: &MockServer, route: &str, page: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("page", page))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// A CSS-discovery source over one listing URL, with fast retries
pub fn css_source(id: &str, listing_url: String) -> SourceConfig {
    let mut source = SourceConfig::new(
        id,
        vec![EntryPoint::new(listing_url)],
        DiscoveryConfig::css("a.item"),
    );
    source.engine.retry.max_retries = 0;
    source.engine.retry.base_delay = 0.01;
    source.engine.retry.max_delay = 0.05;
    source.engine.timeout = 5.0;
    source
}

/// Body text long enough for quality and diagnosis checks
pub fn story_text(topic: &str) -> String {
    format!(
        "The city council met on Tuesday to discuss {topic}. Residents asked \
         detailed questions about budgets, schedules and the expected impact \
         on nearby neighborhoods before the vote was postponed."
    )
}
