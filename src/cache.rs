//! Bounded TTL cache for decoded GET responses.
//!
//! Entries are evicted least-recently-used once `capacity` is reached and are
//! treated as absent after their TTL. The TTL depends on the endpoint: search
//! results go stale quickly, profile lookups rarely change.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    inserted: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted) >= self.ttl
    }
}

pub struct ResponseCache {
    base_ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
}

impl ResponseCache {
    /// `None` when `capacity` is zero (caching disabled).
    pub fn new(capacity: usize, base_ttl: Duration) -> Option<Self> {
        let cap = NonZeroUsize::new(capacity)?;
        Some(Self { base_ttl, entries: Mutex::new(LruCache::new(cap)) })
    }

    /// `METHOD endpoint?k=v&...` with parameters sorted by key.
    pub fn key(method: &str, endpoint: &str, params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        if query.is_empty() {
            format!("{method} {endpoint}")
        } else {
            format!("{method} {endpoint}?{}", query.join("&"))
        }
    }

    /// TTL used for responses from `endpoint`.
    pub fn ttl_for(&self, endpoint: &str) -> Duration {
        if endpoint.contains("search") {
            self.base_ttl / 5
        } else if endpoint.contains("user/info") || endpoint.contains("batch_info") {
            self.base_ttl * 4
        } else {
            self.base_ttl
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match entries.get(key) {
            Some(e) if !e.is_expired(now) => {
                debug!(key, "cache hit");
                Some(e.value.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, endpoint: &str, value: Value) {
        let ttl = self.ttl_for(endpoint);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.put(key, Entry { value, inserted: Instant::now(), ttl });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Drop every entry whose key contains `pattern`; returns how many.
    pub fn clear_by_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let doomed: Vec<String> =
            entries.iter().filter(|(k, _)| k.contains(pattern)).map(|(k, _)| k.clone()).collect();
        for k in &doomed {
            entries.pop(k);
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_key_sorts_params() {
        let a = ResponseCache::key("GET", "/x", &params(&[("b", "2"), ("a", "1")]));
        let b = ResponseCache::key("GET", "/x", &params(&[("a", "1"), ("b", "2")]));
        assert_eq!(a, b);
        assert_eq!(a, "GET /x?a=1&b=2");
        assert_eq!(ResponseCache::key("GET", "/x", &[]), "GET /x");
    }

    #[test]
    fn test_zero_capacity_disables() {
        assert!(ResponseCache::new(0, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_endpoint_ttl() {
        let c = ResponseCache::new(4, Duration::from_secs(300)).unwrap();
        assert_eq!(c.ttl_for("/twitter/tweet/advanced_search"), Duration::from_secs(60));
        assert_eq!(c.ttl_for("/twitter/user/info"), Duration::from_secs(1200));
        assert_eq!(c.ttl_for("/twitter/user/batch_info_by_ids"), Duration::from_secs(1200));
        assert_eq!(c.ttl_for("/twitter/user/followers"), Duration::from_secs(300));
    }

    #[test]
    fn test_get_insert_and_expiry() {
        let c = ResponseCache::new(4, Duration::from_millis(30)).unwrap();
        c.insert("k".into(), "/twitter/user/followers", json!({"a": 1}));
        assert_eq!(c.get("k"), Some(json!({"a": 1})));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(c.get("k"), None);
        assert!(c.is_empty(), "got: {}", c.len());
    }

    #[test]
    fn test_lru_eviction() {
        let c = ResponseCache::new(2, Duration::from_secs(60)).unwrap();
        c.insert("a".into(), "/e", json!(1));
        c.insert("b".into(), "/e", json!(2));
        assert!(c.get("a").is_some());
        c.insert("c".into(), "/e", json!(3));
        assert!(c.get("b").is_none());
        assert!(c.get("a").is_some());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_clear_by_pattern() {
        let c = ResponseCache::new(8, Duration::from_secs(60)).unwrap();
        c.insert("GET /twitter/user/info?userName=a".into(), "/twitter/user/info", json!(1));
        c.insert("GET /twitter/user/info?userName=b".into(), "/twitter/user/info", json!(2));
        c.insert("GET /twitter/tweets?tweet_ids=1".into(), "/twitter/tweets", json!(3));
        assert_eq!(c.clear_by_pattern("user/info"), 2);
        assert_eq!(c.len(), 1);
        c.clear();
        assert!(c.is_empty());
    }
}
