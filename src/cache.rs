//! Response cache
//!
//! The session consults the cache with the display text of a query before
//! routing, and stores only complete, successful responses. [`QueryCache`] is
//! an in-memory implementation with exact and token-overlap matching.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How a cached response matched the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHitType {
    None,
    Exact,
    Semantic,
}

impl CacheHitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Exact => "exact",
            Self::Semantic => "semantic",
        }
    }

    /// Label shown in the transcript in place of a model tier
    pub fn tier_label(&self) -> &'static str {
        match self {
            Self::None => "Cache",
            Self::Exact => "Cache (Exact)",
            Self::Semantic => "Cache (Semantic)",
        }
    }
}

impl fmt::Display for CacheHitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub response: String,
    pub hit_type: CacheHitType,
    /// Label of the tier that originally produced the response
    pub tier_label: String,
}

/// Lookup/store interface the session depends on
pub trait CacheManager: Send + Sync {
    fn lookup(&self, query: &str) -> Option<CacheHit>;
    fn store(&self, query: &str, response: &str, tier_label: &str);
}

/// Lowercase, collapse whitespace, drop trailing `?`, `!` and `.`
pub fn normalize_query(query: &str) -> String {
    let collapsed = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['?', '!', '.'])
        .trim_end()
        .to_string()
}

fn token_set(normalized: &str) -> HashSet<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens that flip the meaning of a question; `t` comes from split contractions
const NEGATIONS: &[&str] = &[
    "not", "no", "never", "without", "cannot", "nor", "t", "dont", "doesnt", "isnt", "cant",
];

/// Jaccard similarity of two token sets
///
/// Word order is ignored. A pair whose differing tokens include a negation
/// scores 0, so "delete the prod database" never matches "not delete the prod
/// database" however long the shared part is.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a
        .symmetric_difference(b)
        .any(|token| NEGATIONS.contains(&token.as_str()))
    {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Tuning for [`QueryCache`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: usize,
    /// Minimum token-set Jaccard similarity for a semantic hit; values above
    /// 1.0 disable semantic matching
    ///
    /// Similarity is lexical. Apart from negation words, two questions that
    /// differ by one token in a long sentence still clear 0.85, so raise the
    /// threshold where that matters.
    pub similarity_threshold: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            capacity: 1000,
            similarity_threshold: 0.85,
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.exact_hits + self.semantic_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: String,
    tier_label: String,
    tokens: HashSet<String>,
    created: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    stats: CacheStats,
}

/// In-memory exact + semantic cache
#[derive(Debug)]
pub struct QueryCache {
    settings: CacheSettings,
    inner: Mutex<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl QueryCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn purge_expired(&self, inner: &mut CacheInner) {
        let ttl = self.settings.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.created.elapsed() < ttl);
        if inner.entries.len() != before {
            let CacheInner { entries, order, .. } = inner;
            order.retain(|key| entries.contains_key(key));
        }
    }
}

impl CacheManager for QueryCache {
    fn lookup(&self, query: &str) -> Option<CacheHit> {
        let key = normalize_query(query);
        if key.is_empty() {
            return None;
        }

        let mut inner = self.lock();
        self.purge_expired(&mut inner);

        if let Some(entry) = inner.entries.get(&key) {
            let hit = CacheHit {
                response: entry.response.clone(),
                hit_type: CacheHitType::Exact,
                tier_label: entry.tier_label.clone(),
            };
            inner.stats.exact_hits += 1;
            return Some(hit);
        }

        let tokens = token_set(&key);
        let best = inner
            .entries
            .values()
            .map(|entry| (jaccard(&tokens, &entry.tokens), entry))
            .filter(|(score, _)| *score >= self.settings.similarity_threshold)
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(score, entry)| {
                tracing::debug!(similarity = score, "Semantic cache match");
                CacheHit {
                    response: entry.response.clone(),
                    hit_type: CacheHitType::Semantic,
                    tier_label: entry.tier_label.clone(),
                }
            });

        match best {
            Some(hit) => {
                inner.stats.semantic_hits += 1;
                Some(hit)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    fn store(&self, query: &str, response: &str, tier_label: &str) {
        let key = normalize_query(query);
        if key.is_empty() || response.is_empty() || self.settings.capacity == 0 {
            return;
        }

        let mut inner = self.lock();
        let entry = CacheEntry {
            response: response.to_string(),
            tier_label: tier_label.to_string(),
            tokens: token_set(&key),
            created: Instant::now(),
        };

        if inner.entries.insert(key.clone(), entry).is_some() {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key);

        while inner.entries.len() > self.settings.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}
