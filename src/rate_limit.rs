//! Per-client fixed-window rate limiting.
//!
//! Each client keeps the timestamps of its requests inside the trailing
//! window. A request is allowed while fewer than `limit` timestamps remain
//! after pruning. State is local to this process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Time until a slot frees up, set only when denied.
    pub retry_after: Option<Duration>,
    /// Requests left in the current window.
    pub remaining: Option<usize>,
}

/// Trailing-window request counter keyed by client identifier.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Requests allowed per window.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Checks and records a request from `client_id` at the current instant.
    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now())
    }

    /// Checks and records a request from `client_id` at `now`.
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let mut clients = self.lock();
        let timestamps = clients.entry(client_id.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if self.is_expired(oldest, now) {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.limit {
            let retry_after = timestamps
                .front()
                .map_or(self.window, |&oldest| self.time_until_free(oldest, now));
            return RateLimitDecision {
                allowed: false,
                retry_after: Some(retry_after),
                remaining: Some(0),
            };
        }

        timestamps.push_back(now);
        RateLimitDecision {
            allowed: true,
            retry_after: None,
            remaining: Some(self.limit - timestamps.len()),
        }
    }

    /// Drops clients whose every timestamp has left the window.
    ///
    /// Returns the number of clients removed.
    pub fn prune_idle_clients(&self) -> usize {
        self.prune_at(Instant::now())
    }

    /// Drops clients that are idle as of `now`.
    pub fn prune_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, timestamps| timestamps.iter().any(|&ts| !self.is_expired(ts, now)));
        let removed = before - clients.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = clients.len(), "Pruned idle rate-limit clients");
        }
        removed
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn is_expired(&self, ts: Instant, now: Instant) -> bool {
        now.saturating_duration_since(ts) > self.window
    }

    /// Whole seconds until `oldest` leaves the window, rounded up, at least 1.
    fn time_until_free(&self, oldest: Instant, now: Instant) -> Duration {
        let left = self
            .window
            .saturating_sub(now.saturating_duration_since(oldest));
        let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
        Duration::from_secs(secs.max(1))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        let first = limiter.check_at("a", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, Some(1));
        assert_eq!(first.retry_after, None);

        let second = limiter.check_at("a", now);
        assert!(second.allowed);
        assert_eq!(second.remaining, Some(0));

        let third = limiter.check_at("a", now);
        assert!(!third.allowed);
        assert_eq!(third.remaining, Some(0));
        assert!(third.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("a", now);
        limiter.check_at("a", now);
        assert!(!limiter.check_at("a", now).allowed);

        let other = limiter.check_at("b", now);
        assert!(other.allowed);
        assert_eq!(other.remaining, Some(1));
    }

    #[test]
    fn retry_after_counts_down_to_oldest_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);

        let denied = limiter.check_at("a", start + Duration::from_millis(20_500));
        assert!(!denied.allowed);
        // 39.5s left, rounded up
        assert_eq!(denied.retry_after, Some(Duration::from_secs(40)));
    }

    #[test]
    fn denied_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        for i in 1..5 {
            assert!(!limiter.check_at("a", start + Duration::from_secs(i)).allowed);
        }
        assert!(limiter.check_at("a", start + Duration::from_secs(11)).allowed);
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        assert!(limiter.check_at("a", start + Duration::from_secs(5)).allowed);
        assert!(!limiter.check_at("a", start + Duration::from_secs(9)).allowed);

        // First request has aged out, second is still inside the window.
        let later = limiter.check_at("a", start + Duration::from_secs(11));
        assert!(later.allowed);
        assert_eq!(later.remaining, Some(0));
    }

    #[test]
    fn prune_removes_only_idle_clients() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("idle", start);
        limiter.check_at("active", start + Duration::from_secs(8));
        assert_eq!(limiter.tracked_clients(), 2);

        let removed = limiter.prune_at(start + Duration::from_secs(12));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);

        assert_eq!(limiter.prune_at(start + Duration::from_secs(30)), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.check("shared").allowed).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
