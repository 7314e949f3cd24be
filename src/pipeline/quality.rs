use crate::config::QualityConfig;
use crate::diagnostics::markers::{find_marker, CHALLENGE_MARKERS};
use crate::pipeline::artifacts::{Issue, ParsedItem};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Below this many tokens the boilerplate ratio is not meaningful
const MIN_TOKENS_FOR_RATIO: usize = 20;

/// Tokens per window when measuring repetition in longer texts
const RATIO_WINDOW: usize = 100;

/// Share of `max-boilerplate-ratio` above which a warning is raised
const REPETITION_WARNING_FACTOR: f64 = 0.75;

/// Heuristic content-quality checks, compiled once per source
#[derive(Debug, Clone)]
pub struct QualityFilter {
    min_text_len: usize,
    min_title_len: usize,
    detect_blocked: bool,
    block_patterns: Vec<Regex>,
    max_boilerplate_ratio: f64,
    language_allow: HashSet<String>,
    language_deny: HashSet<String>,
}

impl QualityFilter {
    /// Compiles the quality rules
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` for a block pattern that is not
    /// a valid regex and `ConfigError::Validation` for a ratio outside [0, 1].
    pub fn new(config: &QualityConfig) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&config.max_boilerplate_ratio) {
            return Err(ConfigError::Validation(format!(
                "quality.max-boilerplate-ratio must be within [0, 1], got {}",
                config.max_boilerplate_ratio
            )));
        }

        let block_patterns = config
            .block_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
                    ConfigError::InvalidPattern(format!("block pattern '{}': {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            min_text_len: config.min_text_len,
            min_title_len: config.min_title_len,
            detect_blocked: config.detect_blocked,
            block_patterns,
            max_boilerplate_ratio: config.max_boilerplate_ratio,
            language_allow: language_set(&config.language_allow),
            language_deny: language_set(&config.language_deny),
        })
    }

    /// Checks one item
    ///
    /// Error codes: `short_text`, `short_title`, `blocked_content`,
    /// `blocked_pattern`, `boilerplate`, `language_denied`,
    /// `language_not_allowed`. Warning codes: `repetitive_text`,
    /// `language_unknown`.
    pub fn check(&self, item: &ParsedItem) -> Vec<Issue> {
        let mut issues = Vec::new();
        let text = item.text.trim();

        let text_len = text.chars().count();
        if text_len < self.min_text_len {
            issues.push(Issue::error(
                "short_text",
                format!("text has {} chars, minimum is {}", text_len, self.min_text_len),
            ));
        }

        let title_len = item.title.as_deref().map_or(0, |t| t.trim().chars().count());
        if title_len < self.min_title_len {
            issues.push(Issue::error(
                "short_title",
                format!("title has {} chars, minimum is {}", title_len, self.min_title_len),
            ));
        }

        let haystack = match &item.title {
            Some(title) => format!("{}\n{}", title, text),
            None => text.to_string(),
        };

        if self.detect_blocked {
            if let Some(marker) = find_marker(&haystack.to_lowercase(), CHALLENGE_MARKERS) {
                issues.push(Issue::error(
                    "blocked_content",
                    format!("content contains challenge marker '{}'", marker),
                ));
            }
        }

        if let Some(pattern) = self.block_patterns.iter().find(|p| p.is_match(&haystack)) {
            issues.push(Issue::error(
                "blocked_pattern",
                format!("content matches block pattern '{}'", pattern.as_str()),
            ));
        }

        if let Some(ratio) = boilerplate_ratio(text) {
            if ratio > self.max_boilerplate_ratio {
                issues.push(Issue::error(
                    "boilerplate",
                    format!(
                        "repeated-token ratio {:.2} exceeds {:.2}",
                        ratio, self.max_boilerplate_ratio
                    ),
                ));
            } else if ratio > self.max_boilerplate_ratio * REPETITION_WARNING_FACTOR {
                issues.push(Issue::warning(
                    "repetitive_text",
                    format!("repeated-token ratio {:.2}", ratio),
                ));
            }
        }

        issues.extend(self.check_language(item.language.as_deref()));
        issues
    }

    fn check_language(&self, language: Option<&str>) -> Option<Issue> {
        if self.language_allow.is_empty() && self.language_deny.is_empty() {
            return None;
        }

        let Some(language) = language.map(primary_subtag).filter(|l| !l.is_empty()) else {
            return Some(Issue::warning(
                "language_unknown",
                "item has no language; language rules not applied",
            ));
        };

        if self.language_deny.contains(&language) {
            return Some(Issue::error(
                "language_denied",
                format!("language '{}' is denied", language),
            ));
        }
        if !self.language_allow.is_empty() && !self.language_allow.contains(&language) {
            return Some(Issue::error(
                "language_not_allowed",
                format!("language '{}' is not in the allow list", language),
            ));
        }
        None
    }
}

/// Share of repeated tokens, `1 - unique / total`, averaged over windows
///
/// Texts longer than 100 tokens are measured over half-overlapping
/// windows of that size, the last one aligned to the end of the text, so the
/// result does not grow with length alone.
///
/// Returns `None` for texts too short to judge.
pub fn boilerplate_ratio(text: &str) -> Option<f64> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if tokens.len() < MIN_TOKENS_FOR_RATIO {
        return None;
    }
    if tokens.len() <= RATIO_WINDOW {
        return Some(repeated_share(&tokens));
    }

    let last = tokens.len() - RATIO_WINDOW;
    let mut starts: Vec<usize> = (0..=last).step_by(RATIO_WINDOW / 2).collect();
    if starts.last() != Some(&last) {
        starts.push(last);
    }
    let total: f64 = starts
        .iter()
        .map(|&start| repeated_share(&tokens[start..start + RATIO_WINDOW]))
        .sum();
    Some(total / starts.len() as f64)
}

fn repeated_share(tokens: &[String]) -> f64 {
    let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    1.0 - unique.len() as f64 / tokens.len() as f64
}

fn primary_subtag(lang: &str) -> String {
    lang.trim()
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn language_set(languages: &[String]) -> HashSet<String> {
    languages
        .iter()
        .map(|l| primary_subtag(l))
        .filter(|l| !l.is_empty())
        .collect()
}
