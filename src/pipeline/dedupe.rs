use crate::pipeline::artifacts::{Issue, ParsedItem};
use crate::url::canonicalize_url;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Key-set used to reject repeated items
///
/// Keys are namespaced: `url:<canonical url>` and `content:<fingerprint>`.
/// Implementations must make [`DedupeStore::insert_if_absent`] atomic so two
/// concurrent callers can never both accept the same key.
pub trait DedupeStore: Send + Sync {
    fn seen(&self, key: &str) -> bool;

    fn add(&self, key: &str);

    /// Adds `key` and returns true if it was not present
    fn insert_if_absent(&self, key: &str) -> bool;
}

/// In-process dedupe store
#[derive(Debug, Default)]
pub struct MemoryDedupeStore {
    keys: Mutex<HashSet<String>>,
}

impl MemoryDedupeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DedupeStore for MemoryDedupeStore {
    fn seen(&self, key: &str) -> bool {
        match self.keys.lock() {
            Ok(keys) => keys.contains(key),
            Err(poisoned) => poisoned.into_inner().contains(key),
        }
    }

    fn add(&self, key: &str) {
        self.insert_if_absent(key);
    }

    fn insert_if_absent(&self, key: &str) -> bool {
        let mut keys = match self.keys.lock() {
            Ok(keys) => keys,
            Err(poisoned) => poisoned.into_inner(),
        };
        keys.insert(key.to_string())
    }
}

/// Store wrapper remembering which keys it newly claimed in the inner store
pub struct ClaimRecorder {
    inner: Arc<dyn DedupeStore>,
    claimed: Mutex<HashSet<String>>,
}

impl ClaimRecorder {
    pub fn new(inner: Arc<dyn DedupeStore>) -> Self {
        Self {
            inner,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Keys this wrapper won so far
    pub fn claimed(&self) -> HashSet<String> {
        match self.claimed.lock() {
            Ok(claimed) => claimed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Store that lets a re-run of the same source take these keys again
    pub fn reclaiming(&self) -> ReclaimingDedupeStore {
        ReclaimingDedupeStore {
            shared: Arc::clone(&self.inner),
            held: self.claimed(),
            local: MemoryDedupeStore::new(),
        }
    }
}

impl DedupeStore for ClaimRecorder {
    fn seen(&self, key: &str) -> bool {
        self.inner.seen(key)
    }

    fn add(&self, key: &str) {
        self.insert_if_absent(key);
    }

    fn insert_if_absent(&self, key: &str) -> bool {
        if !self.inner.insert_if_absent(key) {
            return false;
        }
        let mut claimed = match self.claimed.lock() {
            Ok(claimed) => claimed,
            Err(poisoned) => poisoned.into_inner(),
        };
        claimed.insert(key.to_string());
        true
    }
}

/// Shared store for a re-run, built by [`ClaimRecorder::reclaiming`]
///
/// Keys held by the earlier attempt are checked against a private set, so
/// the re-run may claim each of them once. Every other key goes through the
/// shared store and counts against other sources as usual.
pub struct ReclaimingDedupeStore {
    shared: Arc<dyn DedupeStore>,
    held: HashSet<String>,
    local: MemoryDedupeStore,
}

impl DedupeStore for ReclaimingDedupeStore {
    fn seen(&self, key: &str) -> bool {
        if self.held.contains(key) {
            self.local.seen(key)
        } else {
            self.shared.seen(key)
        }
    }

    fn add(&self, key: &str) {
        self.insert_if_absent(key);
    }

    fn insert_if_absent(&self, key: &str) -> bool {
        if self.held.contains(key) {
            self.local.insert_if_absent(key)
        } else {
            self.shared.insert_if_absent(key)
        }
    }
}

/// Namespaced URL key
pub fn url_key(canonical_url: &str) -> String {
    format!("url:{}", canonical_url)
}

/// Namespaced content key
pub fn content_key(fingerprint: &str) -> String {
    format!("content:{}", fingerprint)
}

/// Stable SHA-256 fingerprint over normalized title and text
///
/// Normalization lowercases and collapses whitespace, so cosmetic differences
/// do not change the fingerprint.
pub fn content_fingerprint(title: Option<&str>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_fingerprint(title.unwrap_or("")).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_for_fingerprint(text).as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_for_fingerprint(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Outcome of deduplicating one item
#[derive(Debug)]
pub enum DedupeOutcome {
    /// Item accepted; its URL is canonical and its fingerprint set if computed
    Kept(ParsedItem),
    /// Item rejected with the reason
    Dropped(ParsedItem, Issue),
}

/// Deduplicates one item against the store
///
/// The URL key is claimed first; the content key is only consulted for items
/// whose URL was new. A URL that cannot be canonicalized is dropped.
pub fn dedupe_item(
    mut item: ParsedItem,
    store: &dyn DedupeStore,
    keep_fragment: bool,
    by_content: bool,
) -> DedupeOutcome {
    let canonical = match canonicalize_url(&item.url, keep_fragment) {
        Ok(canonical) => canonical,
        Err(e) => {
            let issue = Issue::error("uncanonicalizable_url", e.to_string());
            return DedupeOutcome::Dropped(item, issue);
        }
    };

    if !store.insert_if_absent(&url_key(&canonical)) {
        let issue = Issue::error(
            "duplicate_url",
            format!("URL already seen: {}", canonical),
        );
        return DedupeOutcome::Dropped(item, issue);
    }
    item.url = canonical;

    if by_content {
        let fingerprint = content_fingerprint(item.title.as_deref(), &item.text);
        if !store.insert_if_absent(&content_key(&fingerprint)) {
            let issue = Issue::error(
                "duplicate_content",
                format!("content fingerprint already seen: {}", &fingerprint[..16]),
            );
            item.fingerprint = Some(fingerprint);
            return DedupeOutcome::Dropped(item, issue);
        }
        item.fingerprint = Some(fingerprint);
    }

    DedupeOutcome::Kept(item)
}
