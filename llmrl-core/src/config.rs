//! Configuration records.
//!
//! These are plain, serde-derived data — the crate accepts already-built
//! values rather than reading files or environment variables itself. An
//! external loader (TOML, env, whatever the embedding application already
//! uses) is expected to deserialize directly into these types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Admission priority for a queued or dispatched call. Lower numeric value
/// is serviced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Bulk = 4,
}

/// How a [`CredentialPool`](crate::pool::CredentialPool) picks the next
/// credential among the ones not currently cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationStrategy {
    RoundRobin,
    LeastUsed,
    Random,
    Failover,
}

/// Per-(provider, model) capacity and pricing, supplied by the caller (or
/// taken from [`crate::presets`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelLimits {
    pub requests_per_minute: f64,
    pub tokens_per_minute: f64,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

/// Wall-clock spend caps evaluated by the [`crate::ledger::CostLedger`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSpec {
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
    pub alert_threshold: f64,
}

impl Default for BudgetSpec {
    fn default() -> Self {
        Self {
            daily: None,
            weekly: None,
            monthly: None,
            alert_threshold: 0.8,
        }
    }
}

/// Retry/backoff tuning for the [`crate::engine::RequestEngine`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub jitter: bool,
    pub request_timeout: Duration,
    /// A capacity warning fires once `usage_ratio >= 1 - warning_threshold`.
    pub warning_threshold: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 5,
            jitter: true,
            request_timeout: Duration::from_secs(60),
            warning_threshold: 0.1,
        }
    }
}

/// Rotation policy and cooldown default for a [`crate::pool::CredentialPool`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub strategy: RotationStrategy,
    pub default_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::RoundRobin,
            default_cooldown: Duration::from_secs(60),
        }
    }
}
