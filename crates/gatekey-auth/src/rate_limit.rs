//! Login rate limiting.
//!
//! An explicit component with an injected clock and attempt store, so a
//! multi-process deployment can swap the in-memory store for a shared
//! one without touching call sites. Fixed window per key (lowercased
//! email): failures increment a counter; crossing the threshold rejects
//! further attempts until the window rolls over; a successful login
//! resets the key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::AuthError;

/// Injected time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One key's failure window.
#[derive(Debug, Clone, Copy)]
pub struct AttemptWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Storage for attempt windows.
pub trait AttemptStore: Send + Sync {
    fn get(&self, key: &str) -> Option<AttemptWindow>;
    fn put(&self, key: &str, window: AttemptWindow);
    fn remove(&self, key: &str);
}

/// Process-local attempt store.
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    windows: DashMap<String, AttemptWindow>,
}

impl AttemptStore for InMemoryAttemptStore {
    fn get(&self, key: &str) -> Option<AttemptWindow> {
        self.windows.get(key).map(|w| *w)
    }

    fn put(&self, key: &str, window: AttemptWindow) {
        self.windows.insert(key.to_string(), window);
    }

    fn remove(&self, key: &str) {
        self.windows.remove(key);
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window_secs: 300,
        }
    }
}

pub struct LoginRateLimiter {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl LoginRateLimiter {
    pub fn new(
        config: RateLimitConfig,
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// In-memory limiter on the system clock.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryAttemptStore::default()),
            Arc::new(SystemClock),
        )
    }

    /// Reject if the key has exhausted its window.
    pub fn check(&self, key: &str) -> Result<(), AuthError> {
        let Some(window) = self.store.get(key) else {
            return Ok(());
        };

        let now = self.clock.now();
        let window_len = Duration::seconds(self.config.window_secs as i64);
        let elapsed = now - window.window_start;

        if elapsed >= window_len {
            // Window rolled over; stale entry.
            self.store.remove(key);
            return Ok(());
        }

        if window.count >= self.config.max_attempts {
            let retry_after = (window_len - elapsed).num_seconds().max(1) as u64;
            return Err(AuthError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        Ok(())
    }

    /// Record a credential failure for the key.
    pub fn record_failure(&self, key: &str) {
        let now = self.clock.now();
        let window_len = Duration::seconds(self.config.window_secs as i64);

        let window = match self.store.get(key) {
            Some(w) if now - w.window_start < window_len => AttemptWindow {
                count: w.count + 1,
                window_start: w.window_start,
            },
            _ => AttemptWindow {
                count: 1,
                window_start: now,
            },
        };
        self.store.put(key, window);
    }

    /// Clear the key after a successful authentication.
    pub fn reset(&self, key: &str) {
        self.store.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc::now()),
            })
        }

        fn advance(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn limiter(clock: Arc<ManualClock>, max_attempts: u32) -> LoginRateLimiter {
        LoginRateLimiter::new(
            RateLimitConfig {
                max_attempts,
                window_secs: 300,
            },
            Arc::new(InMemoryAttemptStore::default()),
            clock,
        )
    }

    #[test]
    fn allows_until_threshold() {
        let clock = ManualClock::new();
        let limiter = limiter(clock, 3);

        for _ in 0..2 {
            limiter.record_failure("alice@example.com");
        }
        assert!(limiter.check("alice@example.com").is_ok());

        limiter.record_failure("alice@example.com");
        let err = limiter.check("alice@example.com").unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
    }

    #[test]
    fn carries_retry_after_hint() {
        let clock = ManualClock::new();
        let limiter = limiter(clock.clone(), 1);

        limiter.record_failure("bob@example.com");
        clock.advance(100);

        match limiter.check("bob@example.com").unwrap_err() {
            AuthError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, 200);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn window_rollover_clears_the_key() {
        let clock = ManualClock::new();
        let limiter = limiter(clock.clone(), 1);

        limiter.record_failure("carol@example.com");
        assert!(limiter.check("carol@example.com").is_err());

        clock.advance(301);
        assert!(limiter.check("carol@example.com").is_ok());
    }

    #[test]
    fn success_resets() {
        let clock = ManualClock::new();
        let limiter = limiter(clock, 1);

        limiter.record_failure("dave@example.com");
        assert!(limiter.check("dave@example.com").is_err());

        limiter.reset("dave@example.com");
        assert!(limiter.check("dave@example.com").is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let clock = ManualClock::new();
        let limiter = limiter(clock, 1);

        limiter.record_failure("eve@example.com");
        assert!(limiter.check("eve@example.com").is_err());
        assert!(limiter.check("frank@example.com").is_ok());
    }
}
