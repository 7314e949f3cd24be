use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "gbraid", "wbraid", "msclkid", "mc_eid", "mc_cid", "igshid",
    "yclid", "_ga", "_gl", "_hsenc", "_hsmi", "mkt_tok", "oly_anon_id", "oly_enc_id",
];

/// Canonicalizes a URL so equivalent URLs compare equal
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase scheme and host, drop the scheme's default port
///    (the `url` crate already does both while parsing)
/// 3. Remove tracking query parameters (`utm_*` and [`TRACKING_PARAMS`])
/// 4. Sort the remaining query parameters by name, then value
/// 5. Remove an empty query string
/// 6. Drop the fragment unless `keep_fragment` is set
///
/// The result is a fixed point: canonicalizing it again returns it unchanged.
///
/// # Arguments
///
/// * `url_str` - The URL to canonicalize
/// * `keep_fragment` - Keep the `#fragment` part
///
/// # Returns
///
/// * `Ok(String)` - Canonical URL
/// * `Err(UrlError)` - Failed to parse or unsupported scheme
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::canonicalize_url;
///
/// let url = canonicalize_url("HTTP://Example.COM:80/a?b=2&utm_source=x&a=1#top", false).unwrap();
/// assert_eq!(url, "http://example.com/a?a=1&b=2");
/// ```
pub fn canonicalize_url(url_str: &str, keep_fragment: bool) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    if !keep_fragment {
        url.set_fragment(None);
    }

    Ok(url.into())
}

/// Filters out tracking parameters and sorts the rest
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Resolves a link found on a page against a base URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
