//! Per-key token bucket rate limiting.
//!
//! Buckets refill lazily on each call: no background timer, no global lock.
//! The key map sits behind an `RwLock` and every bucket has its own `Mutex`,
//! so two different keys never wait on each other once their buckets exist.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of buckets kept before idle ones are pruned.
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;

/// Outcome of one `check_and_consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,

    /// Milliseconds until one token is available. Zero when allowed.
    pub retry_after_ms: u64,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: 0,
        }
    }
}

/// The bucket store behind the chat rate gate.
///
/// The in-process [`RateLimiter`] is enough for a single instance. Several
/// instances behind a load balancer need an implementation backed by a shared
/// atomic store, keyed exactly like this one.
#[async_trait]
pub trait Limiter: Send + Sync {
    async fn check_and_consume(&self, key: &str, capacity: f64, refill_per_sec: f64)
    -> RateDecision;
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity.max(0.0),
            capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if refills(self.refill_per_sec) {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        }
        self.tokens = self.tokens.clamp(0.0, self.capacity.max(0.0));
        self.last_refill = now;
    }

    /// Whether the bucket would be full at `now`, i.e. dropping it is
    /// indistinguishable from recreating it.
    fn is_full_at(&self, now: Instant) -> bool {
        if self.tokens >= self.capacity {
            return true;
        }
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        refills(self.refill_per_sec) && self.tokens + elapsed * self.refill_per_sec >= self.capacity
    }
}

fn refills(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

fn retry_after_ms(tokens: f64, refill_per_sec: f64) -> u64 {
    if !refills(refill_per_sec) {
        return u64::MAX;
    }
    let wait = ((1.0 - tokens) / refill_per_sec * 1000.0).ceil();
    if !wait.is_finite() || wait >= u64::MAX as f64 {
        u64::MAX
    } else {
        wait.max(0.0) as u64
    }
}

/// In-memory token bucket limiter.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
    max_buckets: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUCKETS)
    }
}

impl RateLimiter {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_buckets,
        }
    }

    /// Refill the key's bucket, then try to take one token.
    pub fn check_and_consume(&self, key: &str, capacity: f64, refill_per_sec: f64) -> RateDecision {
        self.check_and_consume_at(key, capacity, refill_per_sec, Instant::now())
    }

    /// [`Self::check_and_consume`] against an explicit clock reading.
    pub fn check_and_consume_at(
        &self,
        key: &str,
        capacity: f64,
        refill_per_sec: f64,
        now: Instant,
    ) -> RateDecision {
        let bucket = self.bucket(key, capacity, refill_per_sec, now);
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());

        // Settings may change between calls (config reload); latest wins.
        bucket.capacity = capacity;
        bucket.refill_per_sec = refill_per_sec;
        bucket.refill(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::allow()
        } else {
            let retry = retry_after_ms(bucket.tokens, refill_per_sec);
            debug!(key = %key, tokens = bucket.tokens, retry_after_ms = retry, "Rate limit denied");
            RateDecision {
                allowed: false,
                retry_after_ms: retry,
            }
        }
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(
        &self,
        key: &str,
        capacity: f64,
        refill_per_sec: f64,
        now: Instant,
    ) -> Arc<Mutex<Bucket>> {
        if let Some(existing) = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            return existing.clone();
        }

        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());

        if buckets.len() >= self.max_buckets && !buckets.contains_key(key) {
            let before = buckets.len();
            // Skip buckets a caller still holds; the write lock stops new
            // handles being cloned meanwhile.
            buckets.retain(|_, b| {
                if Arc::strong_count(b) > 1 {
                    return true;
                }
                match b.try_lock() {
                    Ok(bucket) => !bucket.is_full_at(now),
                    Err(_) => true,
                }
            });
            let pruned = before - buckets.len();
            if pruned > 0 {
                debug!(pruned, remaining = buckets.len(), "Pruned idle rate-limit buckets");
            } else {
                warn!(buckets = buckets.len(), "Rate limiter over bucket limit, nothing idle to prune");
            }
        }

        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(capacity, refill_per_sec, now))))
            .clone()
    }
}

#[async_trait]
impl Limiter for RateLimiter {
    async fn check_and_consume(
        &self,
        key: &str,
        capacity: f64,
        refill_per_sec: f64,
    ) -> RateDecision {
        RateLimiter::check_and_consume(self, key, capacity, refill_per_sec)
    }
}

/// Composite bucket key `route:identity:address`.
///
/// Blank identity becomes `anonymous`, blank address `unknown-ip`. Separators
/// inside a part are escaped so one part can never impersonate another.
pub fn rate_key(route: &str, identity: &str, address: &str) -> String {
    fn part<'a>(value: &'a str, fallback: &'a str) -> String {
        let value = value.trim();
        let value = if value.is_empty() { fallback } else { value };
        value.replace('%', "%25").replace(':', "%3A")
    }
    format!(
        "{}:{}:{}",
        part(route, "default"),
        part(identity, "anonymous"),
        part(address, "unknown-ip")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain(limiter: &RateLimiter, key: &str, capacity: f64, rate: f64, now: Instant) {
        for _ in 0..capacity as usize {
            assert!(limiter.check_and_consume_at(key, capacity, rate, now).allowed);
        }
        assert!(!limiter.check_and_consume_at(key, capacity, rate, now).allowed);
    }

    #[test]
    fn new_bucket_starts_full() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_and_consume_at("k", 10.0, 0.2, now).allowed);
        }
        let denied = limiter.check_and_consume_at("k", 10.0, 0.2, now);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_ms, 5000);
    }

    #[test]
    fn one_refill_interval_allows_exactly_one() {
        for (capacity, rate) in [(1.0, 0.5), (3.0, 1.0), (10.0, 2.0), (5.0, 0.25)] {
            let limiter = RateLimiter::default();
            let start = Instant::now();
            drain(&limiter, "k", capacity, rate, start);

            let later = start + Duration::from_secs_f64(1.0 / rate);
            assert!(limiter.check_and_consume_at("k", capacity, rate, later).allowed);
            let denied = limiter.check_and_consume_at("k", capacity, rate, later);
            assert!(!denied.allowed);
            assert_eq!(denied.retry_after_ms, (1000.0 / rate) as u64);
        }
    }

    #[test]
    fn empty_bucket_refills_to_capacity_after_c_over_r() {
        for (capacity, rate) in [(1.0, 0.5), (4.0, 1.0), (10.0, 2.0)] {
            let limiter = RateLimiter::default();
            let start = Instant::now();
            drain(&limiter, "k", capacity, rate, start);

            let later = start + Duration::from_secs_f64(capacity / rate);
            drain(&limiter, "k", capacity, rate, later);
            let denied = limiter.check_and_consume_at("k", capacity, rate, later);
            assert_eq!(denied.retry_after_ms, (1000.0 / rate) as u64);
        }
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        drain(&limiter, "k", 2.0, 1.0, start);
        // An hour of idle time still only yields two tokens.
        drain(&limiter, "k", 2.0, 1.0, start + Duration::from_secs(3600));
    }

    #[test]
    fn retry_hint_accounts_for_partial_tokens() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        drain(&limiter, "k", 1.0, 1.0, start);
        let denied = limiter.check_and_consume_at("k", 1.0, 1.0, start + Duration::from_millis(250));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_ms, 750);
    }

    #[test]
    fn denied_calls_still_advance_the_clock() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        drain(&limiter, "k", 1.0, 1.0, start);
        let half = start + Duration::from_millis(500);
        assert!(!limiter.check_and_consume_at("k", 1.0, 1.0, half).allowed);
        assert!(limiter.check_and_consume_at("k", 1.0, 1.0, start + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn zero_refill_saturates_retry_hint() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        drain(&limiter, "k", 1.0, 0.0, now);
        let denied = limiter.check_and_consume_at("k", 1.0, 0.0, now + Duration::from_secs(60));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_ms, u64::MAX);

        let negative = limiter.check_and_consume_at("k", 1.0, -1.0, now);
        assert_eq!(negative.retry_after_ms, u64::MAX);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        drain(&limiter, "alice", 2.0, 0.1, now);
        assert!(limiter.check_and_consume_at("bob", 2.0, 0.1, now).allowed);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn idle_buckets_are_pruned_past_limit() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        limiter.check_and_consume_at("a", 2.0, 1.0, start);
        limiter.check_and_consume_at("b", 2.0, 1.0, start);

        // "a" and "b" are full again after a second; inserting "c" prunes them.
        limiter.check_and_consume_at("c", 2.0, 1.0, start + Duration::from_secs(5));
        assert_eq!(limiter.len(), 1);
        assert!(limiter.check_and_consume_at("a", 2.0, 1.0, start + Duration::from_secs(5)).allowed);
    }

    #[test]
    fn busy_buckets_survive_pruning() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        drain(&limiter, "a", 1.0, 0.001, start);
        limiter.check_and_consume_at("b", 1.0, 0.001, start + Duration::from_secs(1));
        assert_eq!(limiter.len(), 2);
        assert!(!limiter.check_and_consume_at("a", 1.0, 0.001, start + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn handed_out_bucket_survives_pruning() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        let held = limiter.bucket("a", 1.0, 0.001, start);

        // "a" is full, but a caller still holds it; pruning must keep it.
        limiter.check_and_consume_at("b", 1.0, 0.001, start);
        assert_eq!(limiter.len(), 2);

        {
            let mut bucket = held.lock().unwrap();
            bucket.refill(start);
            assert!(bucket.tokens >= 1.0);
            bucket.tokens -= 1.0;
        }
        drop(held);
        assert!(!limiter.check_and_consume_at("a", 1.0, 0.001, start).allowed);
    }

    #[test]
    fn concurrent_consumers_never_overdraw() {
        let limiter = Arc::new(RateLimiter::default());
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check_and_consume_at("shared", 100.0, 0.001, now).allowed)
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }

    #[tokio::test]
    async fn limiter_trait_delegates() {
        let limiter: Arc<dyn Limiter> = Arc::new(RateLimiter::default());
        assert!(limiter.check_and_consume("k", 1.0, 1.0).await.allowed);
        assert!(!limiter.check_and_consume("k", 1.0, 1.0).await.allowed);
    }

    #[test]
    fn rate_key_composes_and_defaults() {
        assert_eq!(rate_key("ai-chat", "u1", "10.0.0.1"), "ai-chat:u1:10.0.0.1");
        assert_eq!(rate_key("ai-chat", " ", ""), "ai-chat:anonymous:unknown-ip");
    }

    #[test]
    fn rate_key_escapes_separators() {
        let spoofed = rate_key("ai-chat", "u1:10.0.0.1", "x");
        assert_ne!(spoofed, rate_key("ai-chat", "u1", "10.0.0.1:x"));
        assert_eq!(spoofed, "ai-chat:u1%3A10.0.0.1:x");
    }

    #[test]
    fn decision_serializes_camel_case() {
        let json = serde_json::to_string(&RateDecision {
            allowed: false,
            retry_after_ms: 42,
        })
        .unwrap();
        assert_eq!(json, r#"{"allowed":false,"retryAfterMs":42}"#);
    }
}
