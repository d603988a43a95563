//! Rate limiters: a sliding-window limiter for login attempts and a token
//! bucket for per-client message throughput. Both are thread-safe via a
//! mutex; holding the lock across `now()` is acceptable at this call volume.

use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter, used to throttle login attempts per peer
/// address. Mirrors `original_source/include/cgs/service/rate_limiter.hpp`.
pub struct SlidingWindowLimiter {
    max_attempts: u32,
    window: Duration,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        SlidingWindowLimiter {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record "now" into `key`'s timestamp deque after pruning entries older
    /// than `now - window`, then return whether the deque length after
    /// pruning is still under the limit. Every call is recorded, including
    /// denied ones: a flood past the limit keeps the window hot
    /// indefinitely.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap();
        let deque = attempts.entry(key.to_string()).or_default();
        Self::purge_expired(deque, now, self.window);
        deque.push_back(now);
        deque.len() <= self.max_attempts as usize
    }

    /// Remaining attempts available for `key` within the current window.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap();
        match attempts.get_mut(key) {
            Some(deque) => {
                Self::purge_expired(deque, now, self.window);
                self.max_attempts.saturating_sub(deque.len() as u32)
            }
            None => self.max_attempts,
        }
    }

    /// Drop `key`'s tracked attempts entirely.
    pub fn reset(&self, key: &str) {
        self.attempts.lock().unwrap().remove(key);
    }

    fn purge_expired(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = deque.front() {
            if now.duration_since(front) > window {
                deque.pop_front();
            } else {
                break;
            }
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter, used to throttle per-client message throughput.
/// Mirrors `original_source/include/cgs/service/token_bucket.hpp`.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_rate: u32) -> Self {
        TokenBucketLimiter {
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to consume `n` tokens for `key`. New keys start at full capacity.
    pub fn consume(&self, key: &str, n: u32) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        let need = n as f64;
        if bucket.tokens >= need {
            bucket.tokens -= need;
            true
        } else {
            false
        }
    }

    /// Current available tokens for `key`, without consuming any.
    pub fn available(&self, key: &str) -> f64 {
        let now = Instant::now();
        let buckets = self.buckets.lock().unwrap();
        match buckets.get(key) {
            Some(bucket) => {
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                (bucket.tokens + elapsed * self.refill_rate).min(self.capacity)
            }
            None => self.capacity,
        }
    }

    /// Remove tracking for `key` entirely (e.g. on disconnect).
    pub fn remove(&self, key: &str) {
        self.buckets.lock().unwrap().remove(key);
    }

    /// Reset `key`'s bucket to full capacity.
    pub fn reset(&self, key: &str) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.insert(
            key.to_string(),
            Bucket {
                tokens: self.capacity,
                last_refill: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn sliding_window_denies_past_max() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn sliding_window_reset_clears_deque() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        limiter.reset("k");
        assert!(limiter.allow("k"));
    }

    #[test]
    fn token_bucket_boundary_capacity_5_rate_1() {
        let bucket = TokenBucketLimiter::new(5, 1);
        for _ in 0..5 {
            assert!(bucket.consume("k", 1));
        }
        assert!(!bucket.consume("k", 1));
    }

    #[test]
    fn token_bucket_never_exceeds_capacity() {
        let bucket = TokenBucketLimiter::new(5, 1000);
        sleep(Duration::from_millis(50));
        assert!(bucket.available("k") <= 5.0);
    }

    #[test]
    fn token_bucket_new_keys_start_full() {
        let bucket = TokenBucketLimiter::new(10, 1);
        assert_eq!(bucket.available("fresh"), 10.0);
    }
}
