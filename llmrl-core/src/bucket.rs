//! A single token bucket: fractional refill, non-reserving consumption.
//!
//! Grounded on the refill arithmetic of an actor-based rate limiter
//! (elapsed-time-based linear refill clamped to capacity), but implemented
//! as a plain mutex-guarded struct rather than an actor mailbox — nothing
//! here needs to hold a reply channel open across an await, and a mutex
//! keeps the bucket from ever needing a back-pointer to its caller.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// `capacity` tokens, refilled continuously at `refill_rate` tokens/second.
///
/// `try_consume` never blocks and never reserves: a failed attempt leaves
/// the bucket untouched. `wait_duration` is a pure query — it does not
/// consume anything, so callers must always follow a non-zero wait with
/// another `try_consume` once the wait elapses (the bucket may have been
/// drained by another waiter in the meantime).
#[derive(Debug)]
pub struct TokenBucket {
    inner: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            inner: Mutex::new(BucketState {
                capacity,
                refill_rate,
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempts to consume `n` tokens. Returns `true` and debits the
    /// bucket on success; returns `false` and leaves it untouched
    /// otherwise.
    pub fn try_consume(&self, n: f64) -> bool {
        let mut state = self.inner.lock().unwrap();
        state.refill(Instant::now());
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// How long a caller would need to wait before `n` tokens become
    /// available, given the current refill rate. Zero if already
    /// available.
    pub fn wait_duration(&self, n: f64) -> Duration {
        let mut state = self.inner.lock().unwrap();
        state.refill(Instant::now());
        if state.tokens >= n {
            Duration::ZERO
        } else {
            let needed = n - state.tokens;
            Duration::from_secs_f64(needed / state.refill_rate)
        }
    }

    pub fn tokens(&self) -> f64 {
        let mut state = self.inner.lock().unwrap();
        state.refill(Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.inner.lock().unwrap().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn refills_linearly_and_clamps_to_capacity() {
        let bucket = TokenBucket::new(10.0, 5.0);
        assert!(bucket.try_consume(10.0));
        assert!(!bucket.try_consume(1.0));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.tokens(), 5.0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_duration_reflects_remaining_need() {
        let bucket = TokenBucket::new(1.0, 1.0);
        assert!(bucket.try_consume(1.0));
        let wait = bucket.wait_duration(1.0);
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[test]
    fn try_consume_never_reserves_on_failure() {
        let bucket = TokenBucket::new(1.0, 0.0);
        assert!(!bucket.try_consume(2.0));
        assert_eq!(bucket.tokens(), 1.0);
    }
}
