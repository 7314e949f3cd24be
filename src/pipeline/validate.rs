use crate::config::ValidationConfig;
use crate::pipeline::artifacts::{Issue, ParsedItem};
use url::Url;

/// Checks an item's structure against the source's validation rules
///
/// # Issue codes
///
/// | Code | Condition |
/// |------|-----------|
/// | `invalid_url` | URL does not parse or is not http(s) |
/// | `missing_title` | No title and `require-title` is set |
/// | `short_title` | Title shorter than `min-title-len` |
/// | `long_title` | Title longer than `max-title-len` |
/// | `missing_text` | No text and `require-text` is set |
/// | `text_too_short` | Text shorter than `min-text-len` |
///
/// Lengths count characters, not bytes.
pub fn validate_item(item: &ParsedItem, rules: &ValidationConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    match Url::parse(&item.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => issues.push(Issue::error(
            "invalid_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => issues.push(Issue::error("invalid_url", format!("{}: {}", item.url, e))),
    }

    match item.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        None if rules.require_title => {
            issues.push(Issue::error("missing_title", "item has no title"));
        }
        None => {}
        Some(title) => {
            let len = title.chars().count();
            if len < rules.min_title_len {
                issues.push(Issue::error(
                    "short_title",
                    format!("title has {} chars, minimum is {}", len, rules.min_title_len),
                ));
            }
            if let Some(max) = rules.max_title_len {
                if len > max {
                    issues.push(Issue::error(
                        "long_title",
                        format!("title has {} chars, maximum is {}", len, max),
                    ));
                }
            }
        }
    }

    let text_len = item.text.trim().chars().count();
    if text_len == 0 {
        if rules.require_text {
            issues.push(Issue::error("missing_text", "item has no text"));
        }
    } else if text_len < rules.min_text_len {
        issues.push(Issue::error(
            "text_too_short",
            format!("text has {} chars, minimum is {}", text_len, rules.min_text_len),
        ));
    }

    issues
}
