// src/cache.rs
//
// Content-addressed memoization of function results with a learned
// eviction policy.
//
// Locking: one readers-writer lock over the entry map. Lookups take the
// shared mode; hit/miss/eviction counters and per-entry access counters
// are relaxed atomics, so read-path statistics are best-effort. Eviction
// and insertion always run under the exclusive mode.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::clock::{Clock, TimestampMs};
use crate::types::{canonical_params, ParamMap};

/// Per-key access history depth.
const ACCESS_HISTORY_LIMIT: usize = 100;

/// Accesses older than this do not count toward the predicted
/// re-access probability.
const ACCESS_WINDOW_MS: i64 = 3_600_000;

struct CacheEntry {
    value: serde_json::Value,
    created_ms: TimestampMs,
    access_count: AtomicU64,
    last_access_ms: AtomicI64,
    compute_cost_ms: i64,
    memory_size: i64,
}

/// Bookkeeping kept next to each entry.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetadata {
    pub function_name: String,
    pub params_digest: String,
    pub text_digest: String,
    pub hit_count: u64,
    pub eviction_risk: f64,
}

/// Per-function cost-benefit summary driving the should-cache decision.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostBenefit {
    pub compute_cost_ms: f64,
    pub storage_cost: f64,
    pub hit_probability: f64,
    pub benefit: f64,
}

/// Counter snapshot. Counters are advisory; see module docs.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub max_size: usize,
    pub cost_benefit_models: HashMap<String, CostBenefit>,
}

struct CacheInner {
    // BTreeMap so eviction scans run in a deterministic key order.
    entries: BTreeMap<String, CacheEntry>,
    metadata: BTreeMap<String, CacheMetadata>,
    cost_benefit: HashMap<String, CostBenefit>,
}

pub struct IntelligentCache {
    inner: RwLock<CacheInner>,
    // Access history is appended on the read path, so it lives under its
    // own small mutex instead of the main lock.
    access_patterns: Mutex<HashMap<String, VecDeque<TimestampMs>>>,
    clock: Arc<dyn Clock>,
    max_size: usize,
    ttl_ms: i64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl IntelligentCache {
    pub fn new(max_size: usize, ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: BTreeMap::new(),
                metadata: BTreeMap::new(),
                cost_benefit: HashMap::new(),
            }),
            access_patterns: Mutex::new(HashMap::new()),
            clock,
            max_size: max_size.max(1),
            ttl_ms,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Lookup. Records the access, honors the TTL (expired entries miss
    /// but are not deleted on the read path).
    pub fn get(
        &self,
        function_name: &str,
        text: &str,
        params: &ParamMap,
    ) -> Option<serde_json::Value> {
        let key = cache_key(function_name, text, params);
        let now_ms = self.clock.now_ms();
        self.record_access(&key, now_ms);

        let inner = self.inner.read();
        let Some(entry) = inner.entries.get(&key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if now_ms - entry.created_ms > self.ttl_ms {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry.access_count.fetch_add(1, Ordering::Relaxed);
        entry.last_access_ms.store(now_ms, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Store a computed result.
    ///
    /// When the cache is full, exactly one entry is evicted (minimum
    /// eviction score) before the new entry lands.
    pub fn set(
        &self,
        function_name: &str,
        text: &str,
        params: &ParamMap,
        value: serde_json::Value,
        compute_cost_ms: i64,
    ) {
        let key = cache_key(function_name, text, params);
        let now_ms = self.clock.now_ms();
        let memory_size = estimate_memory_size(&value);

        let mut inner = self.inner.write();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            self.evict_one(&mut inner, now_ms);
        }

        let entry = CacheEntry {
            value,
            created_ms: now_ms,
            access_count: AtomicU64::new(1),
            last_access_ms: AtomicI64::new(now_ms),
            compute_cost_ms,
            memory_size,
        };
        let eviction_risk = eviction_risk(&entry, now_ms);

        inner.entries.insert(key.clone(), entry);
        inner.metadata.insert(
            key,
            CacheMetadata {
                function_name: function_name.to_string(),
                params_digest: canonical_params(params),
                text_digest: text_digest(text),
                hit_count: 0,
                eviction_risk,
            },
        );

        self.update_cost_benefit(&mut inner, function_name, compute_cost_ms, memory_size);
    }

    /// Predictive caching decision.
    ///
    /// With no model for the function yet, cache anything that took more
    /// than 100ms to compute; afterwards follow the learned benefit score.
    pub fn should_cache(&self, function_name: &str, _text: &str, compute_cost_ms: i64) -> bool {
        let inner = self.inner.read();
        match inner.cost_benefit.get(function_name) {
            None => compute_cost_ms > 100,
            Some(model) => model.benefit > 0.1,
        }
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn clean_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now_ms - e.created_ms > self.ttl_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
            inner.metadata.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, function_name: &str, text: &str, params: &ParamMap) -> bool {
        let key = cache_key(function_name, text, params);
        self.inner.read().entries.contains_key(&key)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size: inner.entries.len(),
            max_size: self.max_size,
            cost_benefit_models: inner.cost_benefit.clone(),
        }
    }

    fn record_access(&self, key: &str, now_ms: TimestampMs) {
        let mut patterns = self.access_patterns.lock();
        let history = patterns.entry(key.to_string()).or_default();
        history.push_back(now_ms);
        while history.len() > ACCESS_HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Fraction of recorded accesses that fall inside the last hour.
    /// Floor of 0.1 when the key has no history.
    fn predict_access_probability(&self, key: &str, now_ms: TimestampMs) -> f64 {
        let patterns = self.access_patterns.lock();
        match patterns.get(key) {
            None => 0.1,
            Some(history) if history.is_empty() => 0.1,
            Some(history) => {
                let recent = history
                    .iter()
                    .filter(|ts| now_ms - **ts < ACCESS_WINDOW_MS)
                    .count();
                (recent as f64 / history.len() as f64).clamp(0.0, 1.0)
            }
        }
    }

    fn evict_one(&self, inner: &mut CacheInner, now_ms: TimestampMs) {
        let mut victim: Option<(String, f64)> = None;
        for (key, entry) in &inner.entries {
            let prob = self.predict_access_probability(key, now_ms);
            let score = eviction_score(entry, prob, now_ms);
            match &victim {
                // Strict < keeps the earliest key on ties, so the choice
                // is deterministic for identical inputs.
                Some((_, best)) if score >= *best => {}
                _ => victim = Some((key.clone(), score)),
            }
        }

        if let Some((key, _score)) = victim {
            inner.entries.remove(&key);
            inner.metadata.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn update_cost_benefit(
        &self,
        inner: &mut CacheInner,
        function_name: &str,
        compute_cost_ms: i64,
        memory_size: i64,
    ) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        let model = inner
            .cost_benefit
            .entry(function_name.to_string())
            .or_default();
        model.compute_cost_ms = (model.compute_cost_ms + compute_cost_ms as f64) / 2.0;
        model.storage_cost = (model.storage_cost + memory_size as f64) / 2.0;
        model.hit_probability = (model.hit_probability + hit_rate) / 2.0;
        if model.storage_cost > 0.0 {
            model.benefit = (model.compute_cost_ms / 1000.0) * model.hit_probability / model.storage_cost;
        }
    }
}

/// score = (access_frequency * compute_cost_sec * predicted_access_prob)
///       / (memory_cost_mb * (seconds_since_last_access + 1))
///
/// Lower scores evict first.
fn eviction_score(entry: &CacheEntry, access_probability: f64, now_ms: TimestampMs) -> f64 {
    let age_secs = ((now_ms - entry.created_ms) as f64 / 1000.0).max(0.0);
    let idle_secs = ((now_ms - entry.last_access_ms.load(Ordering::Relaxed)) as f64 / 1000.0).max(0.0);
    let access_frequency = entry.access_count.load(Ordering::Relaxed) as f64 / (age_secs + 1.0);
    let compute_cost_secs = entry.compute_cost_ms as f64 / 1000.0;
    let memory_cost_mb = (entry.memory_size as f64 / (1024.0 * 1024.0)).max(1e-9);

    (access_frequency * compute_cost_secs * access_probability) / (memory_cost_mb * (idle_secs + 1.0))
}

fn eviction_risk(entry: &CacheEntry, now_ms: TimestampMs) -> f64 {
    let age_secs = ((now_ms - entry.created_ms) as f64 / 1000.0).max(0.0);
    let idle_secs = ((now_ms - entry.last_access_ms.load(Ordering::Relaxed)) as f64 / 1000.0).max(0.0);
    (age_secs + idle_secs) / (entry.access_count.load(Ordering::Relaxed) as f64 + 1.0)
}

/// function:text_digest:canonical_params
pub fn cache_key(function_name: &str, text: &str, params: &ParamMap) -> String {
    format!(
        "{}:{}:{}",
        function_name,
        text_digest(text),
        canonical_params(params)
    )
}

/// Short texts key directly; large texts key by hash prefix, length, and a
/// head/tail sample.
fn text_digest(text: &str) -> String {
    if text.len() <= 100 {
        return text.to_string();
    }

    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut prefix = String::new();
    for byte in digest.iter().take(8) {
        prefix.push_str(&format!("{byte:02x}"));
    }

    let chars: Vec<char> = text.chars().collect();
    let sample: String = if chars.len() > 200 {
        chars[..100]
            .iter()
            .chain(chars[chars.len() - 100..].iter())
            .collect()
    } else {
        text.to_string()
    };

    format!("{}:{}:{}", prefix, text.len(), sample)
}

fn estimate_memory_size(value: &serde_json::Value) -> i64 {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes.len() as i64 * 2,
        Err(_) => 1024,
    }
}
