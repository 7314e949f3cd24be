//! Link extraction from listing pages
//!
//! The configured discovery rule is compiled once into a [`LinkMethod`]
//! before any network I/O; a rule that does not compile is a configuration
//! error. XPath rules are translated into CSS selectors (see
//! [`xpath_to_css`]).

use crate::config::{DiscoveryConfig, DiscoveryMethod};
use crate::url::{canonicalize_url, resolve_link};
use crate::ConfigError;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Compiled link-discovery method
#[derive(Debug, Clone)]
pub enum LinkMethod {
    /// Capture group 1 when the pattern has one, else the whole match
    Regex(Regex),

    Css { selector: Selector, attribute: String },

    /// XPath expression translated to a CSS selector
    Xpath {
        expression: String,
        selector: Selector,
        attribute: String,
    },
}

/// Link extractor compiled from a discovery configuration
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    method: LinkMethod,
    filter: Option<String>,
    base_url: Option<Url>,
    keep_fragment: bool,
}

impl LinkExtractor {
    /// Compiles the discovery rule
    ///
    /// # Returns
    ///
    /// * `Ok(LinkExtractor)` - Ready-to-use extractor
    /// * `Err(ConfigError)` - Missing or invalid pattern, selector or base URL
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        let rule = match config.method {
            DiscoveryMethod::Regex => config.pattern.as_deref(),
            DiscoveryMethod::Css | DiscoveryMethod::Xpath => config.selector.as_deref(),
        }
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .ok_or_else(|| {
            ConfigError::InvalidPattern(format!(
                "discovery.method = {:?} has no rule to compile",
                config.method
            ))
        })?;

        let method = match config.method {
            DiscoveryMethod::Regex => LinkMethod::Regex(Regex::new(rule).map_err(|e| {
                ConfigError::InvalidPattern(format!("Invalid regex '{}': {}", rule, e))
            })?),
            DiscoveryMethod::Css => LinkMethod::Css {
                selector: parse_selector(rule)?,
                attribute: config.attribute.clone(),
            },
            DiscoveryMethod::Xpath => {
                let (css, attribute) = xpath_to_css(rule).map_err(|e| {
                    ConfigError::InvalidPattern(format!("Unsupported XPath '{}': {}", rule, e))
                })?;
                LinkMethod::Xpath {
                    expression: rule.to_string(),
                    selector: parse_selector(&css)?,
                    attribute: attribute.unwrap_or_else(|| config.attribute.clone()),
                }
            }
        };

        let base_url = match &config.base_url {
            Some(base) => Some(Url::parse(base).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid discovery.base-url '{}': {}", base, e))
            })?),
            None => None,
        };

        Ok(Self {
            method,
            filter: config.filter.clone().filter(|f| !f.is_empty()),
            base_url,
            keep_fragment: config.keep_fragment,
        })
    }

    pub fn method(&self) -> &LinkMethod {
        &self.method
    }

    /// Extracts canonical detail links from one listing page
    ///
    /// Links are resolved against the configured base URL (or the page URL),
    /// filtered by substring, canonicalized and deduplicated in page order.
    pub fn extract(&self, html: &str, page_url: &str) -> Vec<String> {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => match Url::parse(page_url) {
                Ok(url) => url,
                Err(_) => return Vec::new(),
            },
        };

        let mut seen = HashSet::new();
        self.raw_links(html)
            .into_iter()
            .filter_map(|href| resolve_link(&href, &base))
            .filter(|url| {
                self.filter
                    .as_deref()
                    .map(|needle| url.as_str().contains(needle))
                    .unwrap_or(true)
            })
            .filter_map(|url| canonicalize_url(url.as_str(), self.keep_fragment).ok())
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Raw link values as they appear in the page
    fn raw_links(&self, html: &str) -> Vec<String> {
        match &self.method {
            LinkMethod::Regex(pattern) => pattern
                .captures_iter(html)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| decode_entities(m.as_str()))
                .collect(),
            LinkMethod::Css {
                selector,
                attribute,
            }
            | LinkMethod::Xpath {
                selector,
                attribute,
                ..
            } => {
                let document = Html::parse_document(html);
                document
                    .select(selector)
                    .filter_map(|element| element.value().attr(attribute))
                    .map(str::to_string)
                    .collect()
            }
        }
    }
}

/// Forms the order-preserving union of per-page link lists
pub fn union_links(pages: impl IntoIterator<Item = Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    pages
        .into_iter()
        .flatten()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn parse_selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css)
        .map_err(|e| ConfigError::InvalidPattern(format!("Invalid CSS selector '{}': {:?}", css, e)))
}

/// Regex matches come from raw markup, so `&amp;` in hrefs must be undone
fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Translates the XPath subset used for link discovery into CSS
///
/// Supported: `//` and `/` steps over tag names or `*`, predicates `[@a]`,
/// `[@a='v']` and `[contains(@a,'v')]`, and a trailing `/@attr` selecting the
/// attribute to read. Positional predicates, functions other than
/// `contains`, and axes are rejected.
///
/// # Returns
///
/// The CSS selector and the attribute named by a trailing `/@attr`, if any.
///
/// # Examples
///
/// ```
/// use sumi_harvest::pipeline::xpath_to_css;
///
/// let (css, attr) = xpath_to_css("//div[@class='list']//a/@href").unwrap();
/// assert_eq!(css, r#"div[class="list"] a"#);
/// assert_eq!(attr.as_deref(), Some("href"));
/// ```
pub fn xpath_to_css(expression: &str) -> Result<(String, Option<String>), String> {
    let mut rest = expression.trim();
    if rest.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut css = String::new();
    let mut attribute = None;
    let mut first = true;

    while !rest.is_empty() {
        let combinator = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            " "
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            " > "
        } else if first {
            " "
        } else {
            return Err(format!("unexpected '{}'", rest));
        };

        if let Some(r) = rest.strip_prefix('@') {
            if combinator != " > " || first {
                return Err("attribute step must follow an element step with '/'".to_string());
            }
            let (name, r) = take_name(r)?;
            if !r.trim().is_empty() {
                return Err(format!("unexpected '{}' after attribute step", r));
            }
            attribute = Some(name.to_string());
            break;
        }

        let (name, r) = if let Some(r) = rest.strip_prefix('*') {
            ("*", r)
        } else {
            take_name(rest)?
        };
        rest = r;
        if rest.starts_with("::") || rest.starts_with('(') {
            return Err(format!("axes and functions are not supported near '{}'", name));
        }

        let mut step = name.to_string();
        while let Some(r) = rest.strip_prefix('[') {
            let end = closing_bracket(r).ok_or("unterminated predicate")?;
            step.push_str(&translate_predicate(&r[..end])?);
            rest = &r[end + 1..];
        }

        if !first {
            css.push_str(combinator);
        }
        css.push_str(&step);
        first = false;
    }

    if css.is_empty() {
        return Err("expression selects no element".to_string());
    }
    Ok((css, attribute))
}

fn take_name(input: &str) -> Result<(&str, &str), String> {
    let end = input
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    if end == 0 {
        return Err(format!("expected a name at '{}'", input));
    }
    Ok((&input[..end], &input[end..]))
}

/// Index of the `]` closing a predicate, honoring quoted literals
fn closing_bracket(input: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

fn translate_predicate(predicate: &str) -> Result<String, String> {
    let predicate = predicate.trim();

    if let Some(args) = predicate
        .strip_prefix("contains(")
        .and_then(|p| p.strip_suffix(')'))
    {
        let (attr, literal) = args
            .split_once(',')
            .ok_or_else(|| format!("contains() needs two arguments in '{}'", predicate))?;
        let attr = attribute_name(attr)?;
        let value = quoted_literal(literal)?;
        return Ok(format!("[{}*=\"{}\"]", attr, value));
    }

    if predicate.starts_with('@') {
        return match predicate.split_once('=') {
            Some((attr, literal)) => Ok(format!(
                "[{}=\"{}\"]",
                attribute_name(attr)?,
                quoted_literal(literal)?
            )),
            None => Ok(format!("[{}]", attribute_name(predicate)?)),
        };
    }

    Err(format!("unsupported predicate '[{}]'", predicate))
}

fn attribute_name(raw: &str) -> Result<&str, String> {
    let raw = raw.trim();
    let name = raw
        .strip_prefix('@')
        .ok_or_else(|| format!("expected an attribute at '{}'", raw))?;
    let (name, rest) = take_name(name)?;
    if !rest.is_empty() {
        return Err(format!("unexpected '{}' in attribute name", rest));
    }
    Ok(name)
}

fn quoted_literal(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
        .ok_or_else(|| format!("expected a quoted string at '{}'", raw))?;
    Ok(inner.replace('\\', "\\\\").replace('"', "\\\""))
}
