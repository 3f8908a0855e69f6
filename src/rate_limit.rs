//! Per-endpoint rate-limit tracking and retry backoff.
//!
//! State per endpoint is created on the first response that carries any of
//! the `X-Rate-Limit-*` headers and only ever updated afterwards.  All state
//! sits behind one mutex; [`RateLimitManager::update`] is the single entry
//! point that mutates it.  Concurrent updates are last-writer-wins.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::secs;

pub const HEADER_LIMIT: &str = "X-Rate-Limit-Limit";
pub const HEADER_REMAINING: &str = "X-Rate-Limit-Remaining";
pub const HEADER_RESET: &str = "X-Rate-Limit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Longest pre-emptive wait before a request, in seconds.
const MAX_PREEMPTIVE_WAIT: f64 = 5.0;
/// Share of the time-to-reset waited when that time exceeds the cap.
const PREEMPTIVE_WAIT_SHARE: f64 = 0.2;
/// Quota window assumed until the server reports a reset time.
const DEFAULT_WINDOW_MINUTES: i64 = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff policy
// ─────────────────────────────────────────────────────────────────────────────

/// `delay = min(max_delay, base_delay * factor^attempt)`, scaled per status
/// code, then jittered by `±jitter * delay` and floored at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: f64,
    pub max_delay: f64,
    pub factor: f64,
    /// Fraction of the delay used as symmetric jitter.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay: 1.0, max_delay: 60.0, factor: 2.0, jitter: 0.1 }
    }
}

fn status_multiplier(status: Option<u16>) -> f64 {
    match status {
        Some(429) => 1.5,
        Some(500..=599) => 1.2,
        Some(408) => 1.3,
        _ => 1.0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State and stats
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitState {
    pub limit: u64,
    pub remaining: i64,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub limit: u64,
    pub remaining: i64,
    pub usage_percent: f64,
    pub reset_in_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub blocked_count: u64,
    pub wait_count: u64,
    pub total_wait_time: f64,
    pub avg_wait_time: f64,
    pub last_reset: DateTime<Utc>,
    pub endpoints: BTreeMap<String, EndpointStats>,
}

#[derive(Debug)]
struct Counters {
    blocked_count: u64,
    wait_count: u64,
    total_wait_time: f64,
    last_reset: DateTime<Utc>,
}

impl Counters {
    fn fresh() -> Self {
        Self { blocked_count: 0, wait_count: 0, total_wait_time: 0.0, last_reset: Utc::now() }
    }
}

#[derive(Debug)]
struct Inner {
    endpoints: HashMap<String, RateLimitState>,
    counters: Counters,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RateLimitManager {
    policy: BackoffPolicy,
    default_limit: u64,
    inner: Mutex<Inner>,
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl RateLimitManager {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_default_limit(policy, 200)
    }

    pub fn with_default_limit(policy: BackoffPolicy, default_limit: u64) -> Self {
        Self {
            policy,
            default_limit,
            inner: Mutex::new(Inner { endpoints: HashMap::new(), counters: Counters::fresh() }),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of one endpoint's state, if tracked.
    pub fn state(&self, endpoint: &str) -> Option<RateLimitState> {
        self.lock().endpoints.get(endpoint).cloned()
    }

    /// Fold the rate-limit headers of a response into the endpoint's state.
    /// Header names are matched exactly.  Unparseable values are ignored.
    pub fn update(&self, endpoint: &str, headers: &HashMap<String, String>) {
        let raw_limit = headers.get(HEADER_LIMIT);
        let raw_remaining = headers.get(HEADER_REMAINING);
        let raw_reset = headers.get(HEADER_RESET);
        if raw_limit.is_none() && raw_remaining.is_none() && raw_reset.is_none() {
            return;
        }

        let limit = raw_limit.and_then(|v| v.trim().parse::<u64>().ok());
        let remaining = raw_remaining.and_then(|v| v.trim().parse::<i64>().ok());
        let reset = raw_reset
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let mut inner = self.lock();
        let default_limit = self.default_limit;
        let state = inner.endpoints.entry(endpoint.to_string()).or_insert_with(|| {
            debug!(endpoint, "tracking rate limit");
            RateLimitState {
                limit: default_limit,
                remaining: default_limit as i64,
                reset_time: Utc::now() + chrono::Duration::minutes(DEFAULT_WINDOW_MINUTES),
            }
        });

        if let Some(limit) = limit {
            state.limit = limit;
        }
        if let Some(remaining) = remaining {
            state.remaining = remaining;
            if (remaining as f64) < state.limit as f64 * 0.1 {
                warn!(endpoint, remaining, limit = state.limit, "rate limit running low");
            }
        }
        if let Some(reset) = reset {
            state.reset_time = reset;
        }
    }

    /// How long to hold off before calling `endpoint`, if at all.
    ///
    /// Only an exhausted quota with a future reset causes a wait.  Waits
    /// longer than 5 s are cut to `min(5 s, 20% of the time to reset)`.
    /// Unknown endpoints never wait.
    pub fn should_wait(&self, endpoint: &str) -> Option<Duration> {
        self.should_wait_at(endpoint, Utc::now())
    }

    fn should_wait_at(&self, endpoint: &str, now: DateTime<Utc>) -> Option<Duration> {
        let mut inner = self.lock();
        let state = inner.endpoints.get(endpoint)?;
        if state.remaining > 0 || state.reset_time <= now {
            return None;
        }

        let mut wait = (state.reset_time - now).num_milliseconds() as f64 / 1000.0;
        if wait > MAX_PREEMPTIVE_WAIT {
            wait = MAX_PREEMPTIVE_WAIT.min(wait * PREEMPTIVE_WAIT_SHARE);
        }
        warn!(endpoint, wait_seconds = wait, "rate limit exhausted, waiting");

        let counters = &mut inner.counters;
        counters.blocked_count += 1;
        counters.wait_count += 1;
        counters.total_wait_time += wait;
        Some(secs(wait))
    }

    /// Retry delay for the given zero-based attempt.
    pub fn calculate_backoff(&self, attempt: u32, status: Option<u16>) -> Duration {
        let jitter_unit = rand::thread_rng().gen_range(-1.0..=1.0);
        let delay = self.backoff_seconds(attempt, status, jitter_unit);

        let mut inner = self.lock();
        inner.counters.wait_count += 1;
        inner.counters.total_wait_time += delay;
        secs(delay)
    }

    /// Deterministic core of [`calculate_backoff`](Self::calculate_backoff);
    /// `jitter_unit` is in `[-1, 1]`.
    fn backoff_seconds(&self, attempt: u32, status: Option<u16>, jitter_unit: f64) -> f64 {
        let p = &self.policy;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut delay = p.max_delay.min(p.base_delay * p.factor.powi(exponent));
        delay *= status_multiplier(status);
        delay += p.jitter * delay * jitter_unit;
        if delay.is_finite() {
            delay.max(0.0)
        } else {
            0.0
        }
    }

    pub fn get_stats(&self) -> RateLimitStats {
        let inner = self.lock();
        let now = Utc::now();
        let endpoints = inner
            .endpoints
            .iter()
            .map(|(name, s)| {
                let usage_percent = if s.limit > 0 {
                    (s.limit as f64 - s.remaining as f64) / s.limit as f64 * 100.0
                } else {
                    0.0
                };
                let reset_in = ((s.reset_time - now).num_milliseconds() as f64 / 1000.0).max(0.0);
                (
                    name.clone(),
                    EndpointStats {
                        limit: s.limit,
                        remaining: s.remaining,
                        usage_percent,
                        reset_in_seconds: reset_in,
                    },
                )
            })
            .collect();

        let c = &inner.counters;
        RateLimitStats {
            blocked_count: c.blocked_count,
            wait_count: c.wait_count,
            total_wait_time: c.total_wait_time,
            avg_wait_time: if c.wait_count > 0 { c.total_wait_time / c.wait_count as f64 } else { 0.0 },
            last_reset: c.last_reset,
            endpoints,
        }
    }

    /// Zero the counters.  Endpoint state is kept.
    pub fn reset_stats(&self) {
        self.lock().counters = Counters::fresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, String)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn exhausted(manager: &RateLimitManager, endpoint: &str, reset_in: i64) {
        let reset = (Utc::now().timestamp() + reset_in).to_string();
        manager.update(
            endpoint,
            &headers(&[(HEADER_LIMIT, "100".into()), (HEADER_REMAINING, "0".into()), (HEADER_RESET, reset)]),
        );
    }

    #[test]
    fn test_unknown_endpoint_never_waits() {
        let m = RateLimitManager::default();
        assert_eq!(m.should_wait("/never/seen"), None);
        m.update("/quiet", &HashMap::new());
        assert!(m.state("/quiet").is_none(), "no headers, no state");
    }

    #[test]
    fn test_update_tracks_state() {
        let m = RateLimitManager::default();
        m.update("/a", &headers(&[(HEADER_REMAINING, "42".into())]));
        let s = m.state("/a").unwrap();
        assert_eq!(s.limit, 200, "default limit until reported");
        assert_eq!(s.remaining, 42);

        m.update("/a", &headers(&[(HEADER_LIMIT, "50".into()), (HEADER_REMAINING, "junk".into())]));
        let s = m.state("/a").unwrap();
        assert_eq!(s.limit, 50);
        assert_eq!(s.remaining, 42);
    }

    #[test]
    fn test_header_names_case_sensitive() {
        let m = RateLimitManager::default();
        m.update("/a", &headers(&[("x-rate-limit-remaining", "1".into())]));
        assert!(m.state("/a").is_none());
    }

    #[test]
    fn test_long_wait_is_capped() {
        let m = RateLimitManager::default();
        exhausted(&m, "/a", 100);
        let wait = m.should_wait("/a").unwrap();
        assert!((wait.as_secs_f64() - 5.0).abs() < 1e-6, "got: {:?}", wait);

        // 20% of the time to reset when that is under the cap
        let now = Utc::now();
        exhausted(&m, "/b", 20);
        let wait = m.should_wait_at("/b", now).unwrap().as_secs_f64();
        assert!(wait > 3.5 && wait <= 4.0 + 1e-6, "got: {}", wait);
    }

    #[test]
    fn test_short_wait_verbatim() {
        let m = RateLimitManager::default();
        exhausted(&m, "/a", 3);
        let wait = m.should_wait("/a").unwrap().as_secs_f64();
        assert!(wait > 1.0 && wait <= 3.0, "got: {}", wait);
    }

    #[test]
    fn test_no_wait_with_quota_or_past_reset() {
        let m = RateLimitManager::default();
        exhausted(&m, "/past", -10);
        assert_eq!(m.should_wait("/past"), None);
        m.update("/ok", &headers(&[(HEADER_REMAINING, "5".into())]));
        assert_eq!(m.should_wait("/ok"), None);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let m = RateLimitManager::default();
        let d: Vec<f64> = (0..5).map(|a| m.backoff_seconds(a, None, 0.0)).collect();
        assert_eq!(d, vec![1.0, 2.0, 4.0, 8.0, 16.0]);
        assert_eq!(m.backoff_seconds(10, None, 0.0), 60.0);
        assert_eq!(m.backoff_seconds(1000, None, 0.0), 60.0);
    }

    #[test]
    fn test_backoff_status_multipliers() {
        let m = RateLimitManager::default();
        assert_eq!(m.backoff_seconds(1, Some(429), 0.0), 3.0);
        assert!((m.backoff_seconds(1, Some(503), 0.0) - 2.4).abs() < 1e-9);
        assert!((m.backoff_seconds(1, Some(408), 0.0) - 2.6).abs() < 1e-9);
        assert_eq!(m.backoff_seconds(1, Some(404), 0.0), 2.0);
    }

    #[test]
    fn test_backoff_beyond_duration_range_saturates() {
        let policy = BackoffPolicy { base_delay: 1e30, max_delay: 1e30, factor: 2.0, jitter: 0.0 };
        let m = RateLimitManager::new(policy);
        assert_eq!(m.calculate_backoff(0, Some(429)), Duration::MAX);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let m = RateLimitManager::default();
        assert!((m.backoff_seconds(2, None, 1.0) - 4.4).abs() < 1e-9);
        assert!((m.backoff_seconds(2, None, -1.0) - 3.6).abs() < 1e-9);
        for _ in 0..50 {
            let d = m.calculate_backoff(3, None).as_secs_f64();
            assert!((7.2..=8.8).contains(&d), "got: {}", d);
        }
    }

    #[test]
    fn test_stats_and_reset() {
        let m = RateLimitManager::default();
        exhausted(&m, "/a", 100);
        m.should_wait("/a");
        let stats = m.get_stats();
        assert_eq!(stats.blocked_count, 1);
        assert_eq!(stats.wait_count, 1);
        assert!((stats.avg_wait_time - 5.0).abs() < 1e-6);
        let ep = &stats.endpoints["/a"];
        assert_eq!(ep.usage_percent, 100.0);
        assert!(ep.reset_in_seconds > 90.0);

        m.reset_stats();
        let stats = m.get_stats();
        assert_eq!(stats.wait_count, 0);
        assert_eq!(stats.avg_wait_time, 0.0);
        assert_eq!(stats.endpoints.len(), 1, "endpoint state survives a stats reset");
    }
}
