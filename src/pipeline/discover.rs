use crate::config::{EntryPoint, PagingMode};
use std::collections::HashSet;

const PAGE_PLACEHOLDER: &str = "{page}";
const OFFSET_PLACEHOLDER: &str = "{offset}";

/// Expands entry points into concrete listing URLs
///
/// Output keeps entry-point order and drops repeats.
pub fn discover(entrypoints: &[EntryPoint]) -> Vec<String> {
    let mut seen = HashSet::new();
    entrypoints
        .iter()
        .flat_map(expand_entrypoint)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Expands one entry point's paging specification
///
/// - `page`: substitutes `start, start+step, ...` (`count` values) for `{page}`
/// - `offset`: substitutes the running offset for `{offset}`
/// - `cursor` or no paging: the template passes through unexpanded
pub fn expand_entrypoint(entry: &EntryPoint) -> Vec<String> {
    let Some(paging) = &entry.paging else {
        return vec![entry.url.clone()];
    };

    let placeholder = match paging.mode {
        PagingMode::Page => PAGE_PLACEHOLDER,
        PagingMode::Offset => OFFSET_PLACEHOLDER,
        PagingMode::Cursor => return vec![entry.url.clone()],
    };

    (0..i64::from(paging.count))
        .map(|i| paging.start.saturating_add(i.saturating_mul(paging.step)))
        .map(|value| entry.url.replace(placeholder, &value.to_string()))
        .collect()
}
