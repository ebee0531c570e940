//! Common types shared across the `llmrl` workspace.
//!
//! This crate defines the error taxonomy, the remote-limit snapshot type,
//! and the observability helpers used by
//! [`llmrl-core`](../llmrl_core/index.html) and its companion transport
//! crates. It is intentionally lightweight and dependency-minimal so that
//! every crate in the workspace can depend on it without pulling in the
//! request-engine or reqwest stacks.
//!
//! # Overview
//!
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`LimitSnapshot`]: the normalized view of a remote rate-limit state
//!   that header dialects produce and credential pools/engines consume
//! - [`RateLimitError`] and [`Result`]: shared error handling, following the
//!   taxonomy of admission/remote-limit/transport failures a mediator needs
//!   to distinguish

use std::time::Duration;

use chrono::{DateTime, Utc};

pub mod observability;

/// Normalized snapshot of a remote rate-limit state, produced by a header
/// dialect and consumed by the credential pool and request engine.
///
/// All fields are optional because not every provider exposes every
/// dimension (e.g. the generic dialect has no notion of token limits).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimitSnapshot {
    pub requests_remaining: Option<i64>,
    pub requests_limit: Option<i64>,
    pub tokens_remaining: Option<i64>,
    pub tokens_limit: Option<i64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub retry_after: Option<Duration>,
}

impl LimitSnapshot {
    /// True once either dimension has been reported as fully consumed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.requests_remaining, Some(r) if r <= 0)
            || matches!(self.tokens_remaining, Some(t) if t <= 0)
    }

    /// Fraction of the request quota already consumed, if known.
    pub fn usage_ratio(&self) -> Option<f64> {
        match (self.requests_remaining, self.requests_limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                Some(1.0 - (remaining as f64 / limit as f64))
            }
            _ => None,
        }
    }
}

/// Error taxonomy for the rate-limit mediator.
///
/// Each variant corresponds to one row of the error-handling table: whether
/// it is retried, surfaced immediately, or carries enough context
/// (snapshot, attempt counters) for the caller to decide.
#[derive(thiserror::Error, Debug, Clone)]
pub enum RateLimitError {
    /// Unknown provider/model, or an empty credential pool.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configured spend cap (daily/weekly/monthly) was met or exceeded.
    #[error("budget exceeded: {window} window at {current:.4} >= cap {cap:.4}")]
    BudgetExceeded {
        window: &'static str,
        current: f64,
        cap: f64,
    },

    /// Every credential in the pool is cooling down, or the retry budget was
    /// exhausted while the remote kept reporting a rate limit.
    #[error("rate limit exhausted after {retries} retries, {keys_tried} keys tried")]
    RateLimitExhausted {
        retries: u32,
        keys_tried: usize,
        total_wait: Duration,
        last_snapshot: Option<LimitSnapshot>,
    },

    /// The transport reported a timeout on every retry attempt.
    #[error("transport timed out after {retries} retries: {message}")]
    TransportTimeout { retries: u32, message: String },

    /// The transport failed for a reason other than a timeout; never
    /// retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The priority queue was at capacity.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// An item waited in the priority queue past its deadline.
    #[error("queue wait timed out after {0:?}")]
    QueueTimeout(Duration),
}

/// Convenient alias for results that use [`RateLimitError`].
pub type Result<T> = std::result::Result<T, RateLimitError>;
