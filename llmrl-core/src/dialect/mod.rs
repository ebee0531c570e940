//! Per-provider translation from raw HTTP headers/status into a
//! [`LimitSnapshot`].
//!
//! Everything downstream (credential pool, engine backoff, capacity
//! warnings) works off the normalized snapshot so that adding a fourth
//! provider only means adding a fourth dialect, never touching the engine.

pub mod anthropic;
pub mod generic;
pub mod openai;

pub use anthropic::AnthropicDialect;
pub use generic::GenericDialect;
pub use openai::OpenAiDialect;

pub use llmrl_common::LimitSnapshot;

use std::collections::HashMap;
use std::time::Duration;

/// Parses a provider's response headers/status into normalized rate-limit
/// state. Headers passed in are always lowercased (see
/// [`crate::transport::TransportResponse`]).
pub trait HeaderDialect: Send + Sync {
    /// Extract whatever the provider reports about remaining
    /// capacity/reset time. Fields the provider doesn't expose stay `None`.
    fn parse(&self, headers: &HashMap<String, String>) -> LimitSnapshot;

    /// Whether this status/body combination signals the remote is
    /// rate-limiting the caller right now (as opposed to some other error).
    fn is_remote_limit(&self, status: u16, body: Option<&str>) -> bool;

    /// `Retry-After`, in seconds, if present. All three providers in this
    /// module share the same header name, so the default suffices.
    fn retry_after(&self, headers: &HashMap<String, String>) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

pub(crate) fn parse_i64_header(headers: &HashMap<String, String>, key: &str) -> Option<i64> {
    headers.get(key).and_then(|v| v.trim().parse::<i64>().ok())
}
