//! Bounded TTL cache for successful tool results.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::{Map, Value};
use tracing::debug;

const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);

#[derive(Debug, Clone)]
struct CachedResult {
    content: String,
    cached_at: Instant,
}

impl CachedResult {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() >= ttl
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<String, CachedResult>,
    stats: CacheStats,
}

/// LRU of tool output keyed by [`cache_key`]. Entries older than the TTL are
/// treated as absent and dropped on access.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let fresh = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.content.clone()),
            Some(_) => {
                inner.entries.pop(key);
                debug!("Dropped expired cache entry");
                None
            }
            None => None,
        };
        if fresh.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        fresh
    }

    pub fn insert(&self, key: String, content: String) {
        self.lock().entries.put(
            key,
            CachedResult {
                content,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned cache is still structurally valid.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Canonical key: `identity|service.action|arguments` with object keys sorted at every
/// depth, so insertion order never changes the key.
pub fn cache_key(
    identity_id: &str,
    service_id: &str,
    action: &str,
    arguments: &Map<String, Value>,
) -> String {
    let mut out = String::with_capacity(identity_id.len() + service_id.len() + action.len() + 32);
    out.push_str(identity_id);
    out.push('|');
    out.push_str(service_id);
    out.push('.');
    out.push_str(action);
    out.push('|');
    write_object(&mut out, arguments);
    out
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key) {
            write_value(out, value);
        }
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
