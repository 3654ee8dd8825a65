use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Atomic check-and-increment counter keyed by identity.
///
/// Losing limiter state only loosens limiting; it never affects whether a
/// passcode is valid.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_increment(&self, key: &str, now: DateTime<Utc>) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    window_expires_at: DateTime<Utc>,
}

/// Pod-local limiter. Every accepted request pushes the window expiry out to
/// `now + window`, so a steady trickle of requests keeps the counter alive.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, Counter>>,
    max_requests: u32,
    window: Duration,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { store: Arc::new(DashMap::new()), max_requests, window, enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::new(u32::MAX, Duration::ZERO) }
    }

    /// Drops counters whose window has lapsed.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.store.retain(|_, c| c.window_expires_at > now);
    }

    pub fn tracked_keys(&self) -> usize { self.store.len() }

    fn decide(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        if !self.enabled { return RateDecision::Allowed; }
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        // the entry guard holds the shard lock, so read-modify-write is atomic per key
        let mut entry = self.store.entry(key.to_string()).or_insert(Counter { count: 0, window_expires_at: now });
        if entry.window_expires_at <= now {
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            let retry_after = (entry.window_expires_at - now).to_std().unwrap_or(Duration::ZERO);
            return RateDecision::Denied { retry_after };
        }
        entry.count += 1;
        entry.window_expires_at = now + window;
        RateDecision::Allowed
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_increment(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        self.decide(key, now)
    }
}

/// Limiter key for passcode requests.
pub fn otp_request_key(email: &str) -> String {
    format!("otp_request:{email}")
}
