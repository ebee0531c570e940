//! Rotates among a set of credentials for one provider, parking any that
//! report a remote limit on cooldown until it's safe to try them again.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::time::Instant;

use llmrl_common::{LimitSnapshot, RateLimitError, Result};

use crate::config::RotationStrategy;

/// Per-credential bookkeeping. The secret itself is never logged; callers
/// only ever see [`CredentialState::fingerprint`].
#[derive(Debug, Clone)]
struct CredentialState {
    secret: String,
    requests_made: u64,
    tokens_used: u64,
    last_used_at: Option<DateTime<Utc>>,
    last_limited_at: Option<DateTime<Utc>>,
    cooldown_until: Option<Instant>,
    snapshot: Option<LimitSnapshot>,
}

impl CredentialState {
    fn on_cooldown(&self) -> bool {
        self.cooldown_until.map(|until| Instant::now() < until).unwrap_or(false)
    }
}

/// Masks a secret as `"<first4>...<last4>"`, or `"***"` if it is too short
/// to mask meaningfully (fewer than 9 characters).
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 9 {
        return "***".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

/// Point-in-time view of pool health, queryable without mutating
/// anything.
#[derive(Debug, Clone)]
pub struct Capacity {
    pub keys_available: usize,
    pub keys_exhausted: usize,
    pub requests_remaining: Option<i64>,
    pub tokens_remaining: Option<i64>,
    pub soonest_reset: Option<DateTime<Utc>>,
}

impl Capacity {
    pub fn total_keys(&self) -> usize {
        self.keys_available + self.keys_exhausted
    }
}

/// A lightweight, non-secret-leaking view of one credential's bookkeeping,
/// for metrics/introspection.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub fingerprint: String,
    pub requests_made: u64,
    pub tokens_used: u64,
    pub on_cooldown: bool,
    pub limit_snapshot: Option<LimitSnapshot>,
}

pub struct CredentialPool {
    states: Mutex<Vec<CredentialState>>,
    cursor: Mutex<usize>,
    strategy: RotationStrategy,
    default_cooldown: Duration,
}

impl CredentialPool {
    pub fn new(secrets: Vec<String>, strategy: RotationStrategy, default_cooldown: Duration) -> Result<Self> {
        if secrets.is_empty() {
            return Err(RateLimitError::Config(
                "credential pool requires at least one credential".to_string(),
            ));
        }
        let states = secrets
            .into_iter()
            .map(|secret| CredentialState {
                secret,
                requests_made: 0,
                tokens_used: 0,
                last_used_at: None,
                last_limited_at: None,
                cooldown_until: None,
                snapshot: None,
            })
            .collect();
        Ok(Self {
            states: Mutex::new(states),
            cursor: Mutex::new(0),
            strategy,
            default_cooldown,
        })
    }

    /// Picks the next credential not currently cooling down, per the
    /// configured [`RotationStrategy`]. Returns `None` when every
    /// credential is on cooldown.
    pub fn select(&self) -> Option<String> {
        let mut states = self.states.lock().unwrap();
        let available: Vec<usize> = (0..states.len()).filter(|&i| !states[i].on_cooldown()).collect();
        if available.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            RotationStrategy::RoundRobin => {
                let mut cursor = self.cursor.lock().unwrap();
                let len = states.len();
                let idx = (0..len)
                    .map(|offset| (*cursor + offset) % len)
                    .find(|i| available.contains(i))
                    .expect("available is non-empty");
                *cursor = (idx + 1) % len;
                idx
            }
            RotationStrategy::LeastUsed => {
                let with_known_remaining: Vec<usize> = available
                    .iter()
                    .copied()
                    .filter(|&i| states[i].snapshot.and_then(|s| s.requests_remaining).is_some())
                    .collect();
                if !with_known_remaining.is_empty() {
                    *with_known_remaining
                        .iter()
                        .max_by_key(|&&i| states[i].snapshot.unwrap().requests_remaining.unwrap())
                        .unwrap()
                } else {
                    *available.iter().min_by_key(|&&i| states[i].requests_made).unwrap()
                }
            }
            RotationStrategy::Random => *available.choose(&mut rand::thread_rng()).unwrap(),
            RotationStrategy::Failover => available[0],
        };

        states[chosen].last_used_at = Some(Utc::now());
        states[chosen].requests_made += 1;
        Some(states[chosen].secret.clone())
    }

    pub fn report_success(&self, secret: &str, snapshot: Option<LimitSnapshot>) {
        let mut states = self.states.lock().unwrap();
        if let Some(state) = states.iter_mut().find(|s| s.secret == secret) {
            if let Some(snap) = snapshot {
                state.snapshot = Some(snap);
            }
        }
    }

    /// Parks the credential on cooldown. Precedence for how long: the
    /// snapshot's `retry_after` if present; otherwise the time until
    /// `reset_at` floored at `default_cooldown`; otherwise
    /// `default_cooldown`. Never negative.
    pub fn report_remote_limit(&self, secret: &str, snapshot: Option<LimitSnapshot>) {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.iter_mut().find(|s| s.secret == secret) else {
            return;
        };

        state.last_limited_at = Some(Utc::now());
        if let Some(snap) = snapshot {
            state.snapshot = Some(snap);
        }

        let delta = match snapshot {
            Some(LimitSnapshot { retry_after: Some(retry_after), .. }) => retry_after,
            Some(LimitSnapshot { reset_at: Some(reset_at), .. }) => {
                let remaining_ms = (reset_at - Utc::now()).num_milliseconds().max(0);
                Duration::from_millis(remaining_ms as u64).max(self.default_cooldown)
            }
            _ => self.default_cooldown,
        };

        state.cooldown_until = Some(Instant::now() + delta);
    }

    pub fn reset(&self, secret: &str) {
        let mut states = self.states.lock().unwrap();
        if let Some(state) = states.iter_mut().find(|s| s.secret == secret) {
            state.cooldown_until = None;
            state.last_limited_at = None;
        }
    }

    pub fn reset_all(&self) {
        let mut states = self.states.lock().unwrap();
        for state in states.iter_mut() {
            state.cooldown_until = None;
            state.last_limited_at = None;
            state.requests_made = 0;
            state.tokens_used = 0;
        }
    }

    pub fn capacity(&self) -> Capacity {
        let states = self.states.lock().unwrap();
        let keys_available = states.iter().filter(|s| !s.on_cooldown()).count();
        let keys_exhausted = states.len() - keys_available;

        let mut requests_remaining: Option<i64> = None;
        let mut tokens_remaining: Option<i64> = None;
        for state in states.iter() {
            if let Some(snap) = state.snapshot {
                if let Some(r) = snap.requests_remaining {
                    requests_remaining = Some(requests_remaining.unwrap_or(0) + r);
                }
                if let Some(t) = snap.tokens_remaining {
                    tokens_remaining = Some(tokens_remaining.unwrap_or(0) + t);
                }
            }
        }

        let soonest_reset = states
            .iter()
            .filter(|s| s.on_cooldown())
            .filter_map(|s| s.snapshot.and_then(|snap| snap.reset_at))
            .min();

        Capacity {
            keys_available,
            keys_exhausted,
            requests_remaining,
            tokens_remaining,
            soonest_reset,
        }
    }

    pub fn snapshots(&self) -> Vec<CredentialSnapshot> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .map(|s| CredentialSnapshot {
                fingerprint: mask_secret(&s.secret),
                requests_made: s.requests_made,
                tokens_used: s.tokens_used,
                on_cooldown: s.on_cooldown(),
                limit_snapshot: s.snapshot,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(strategy: RotationStrategy) -> CredentialPool {
        CredentialPool::new(
            vec!["key-aaaa1111".to_string(), "key-bbbb2222".to_string()],
            strategy,
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(CredentialPool::new(vec![], RotationStrategy::RoundRobin, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn masking_short_secrets() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-aaaaaaaa1111"), "sk-a...1111");
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_cycles_through_keys() {
        let pool = pool(RotationStrategy::RoundRobin);
        let first = pool.select().unwrap();
        let second = pool.select().unwrap();
        assert_ne!(first, second);
        let third = pool.select().unwrap();
        assert_eq!(first, third);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_precedence_prefers_retry_after() {
        let pool = pool(RotationStrategy::Failover);
        let key = pool.select().unwrap();
        pool.report_remote_limit(
            &key,
            Some(LimitSnapshot {
                retry_after: Some(Duration::from_millis(5)),
                ..Default::default()
            }),
        );
        assert_eq!(pool.capacity().keys_exhausted, 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(pool.capacity().keys_exhausted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failover_exhausts_to_none_when_all_cooling() {
        let pool = pool(RotationStrategy::Failover);
        let a = pool.select().unwrap();
        pool.report_remote_limit(&a, None);
        let b = pool.select().unwrap();
        pool.report_remote_limit(&b, None);
        assert!(pool.select().is_none());
    }
}
