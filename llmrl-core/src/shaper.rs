//! Pairs a request-count bucket with a token-count bucket for one
//! (provider, model) and enforces both before a call is allowed through.

use std::time::Duration;

use tokio::time::sleep;

use crate::bucket::TokenBucket;

/// Proactive admission gate: a caller awaits [`Shaper::acquire`] before the
/// transport is ever touched. Shaping never rotates credentials or talks
/// to the network — that is the engine's job once the shaper lets a call
/// through.
pub struct Shaper {
    request_bucket: TokenBucket,
    token_bucket: TokenBucket,
    on_limit_hit: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Shaper {
    /// `requests_per_minute`/`tokens_per_minute` become bucket capacities
    /// refilled at `rate/60` per second.
    pub fn new(requests_per_minute: f64, tokens_per_minute: f64) -> Self {
        Self {
            request_bucket: TokenBucket::new(requests_per_minute, requests_per_minute / 60.0),
            token_bucket: TokenBucket::new(tokens_per_minute, tokens_per_minute / 60.0),
            on_limit_hit: None,
        }
    }

    pub fn with_on_limit_hit(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_limit_hit = Some(Box::new(hook));
        self
    }

    /// Blocks until both one request slot and `estimated_tokens` token
    /// budget are available, then consumes both atomically with respect
    /// to this call (though not with respect to concurrent callers — see
    /// the note below).
    ///
    /// If the two consumes race against another waiter and only one
    /// succeeds, the already-spent bucket is not refunded: buckets never
    /// reserve and never refund, so under contention a caller may loop
    /// more than once. This matches the non-reserving contract of
    /// [`TokenBucket`] rather than adding a two-phase commit on top of it.
    pub async fn acquire(&self, estimated_tokens: f64) {
        let mut warned = false;
        loop {
            let wait = self
                .request_bucket
                .wait_duration(1.0)
                .max(self.token_bucket.wait_duration(estimated_tokens));

            if wait > Duration::ZERO {
                if !warned {
                    if let Some(hook) = &self.on_limit_hit {
                        hook();
                    }
                    warned = true;
                }
                sleep(wait).await;
            }

            if self.request_bucket.try_consume(1.0) && self.token_bucket.try_consume(estimated_tokens) {
                return;
            }
        }
    }

    pub fn request_tokens_available(&self) -> f64 {
        self.request_bucket.tokens()
    }

    pub fn token_budget_available(&self) -> f64 {
        self.token_bucket.tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_request_capacity() {
        let shaper = Shaper::new(60.0, 100_000.0);
        shaper.acquire(10.0).await;
        assert!(shaper.request_tokens_available() < 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_hit_hook_fires_once_per_wait() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let shaper = Shaper::new(1.0, 1_000_000.0).with_on_limit_hit(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        shaper.acquire(1.0).await;
        shaper.acquire(1.0).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
