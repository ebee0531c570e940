//! Orchestrates one call end-to-end: admission against the cost ledger,
//! shaping, credential selection, the transport call, remote-limit
//! detection, and retry/backoff/rotation.
//!
//! Retries, backoff and rotation all live here rather than inside the
//! transport, so a single loop owns the decision of whether to sleep,
//! rotate credentials, or give up.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use llmrl_common::{LimitSnapshot, RateLimitError};

use crate::config::{EngineOptions, ModelLimits};
use crate::dialect::HeaderDialect;
use crate::ledger::CostLedger;
use crate::pool::{mask_secret, CredentialPool};
use crate::shaper::Shaper;
use crate::transport::{Method, Transport, TransportError, TransportRequest};

/// A single outbound call as the caller describes it. `estimated_tokens`
/// feeds the shaper before the call is made; `input_tokens`/`output_tokens`
/// feed the ledger after a successful response, once the real usage is
/// known (the shaper never learns the true count — see the crate's
/// non-goals on predicting token counts from payloads).
pub struct CallRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub estimated_tokens: f64,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// The outcome of a completed (successful or exhausted) call.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub decoded: Option<serde_json::Value>,
    pub headers: Option<HashMap<String, String>>,
    pub snapshot: Option<LimitSnapshot>,
    pub retries: u32,
    pub total_wait: Duration,
    pub credential_fingerprint: String,
    pub error: Option<String>,
}

/// The shared collaborators a single [`RequestEngine::call`] needs. The
/// engine itself holds none of these — they stay owned by
/// [`crate::facade::MultiProviderFacade`] and are passed in by reference
/// per call, so nothing here ever needs a back-pointer to its caller.
pub struct CallContext<'a> {
    pub shaper: &'a Shaper,
    pub pool: &'a CredentialPool,
    pub dialect: &'a dyn HeaderDialect,
    pub ledger: &'a CostLedger,
    pub limits: &'a ModelLimits,
    pub provider: &'a str,
    pub model: &'a str,
}

/// Snapshot of an engine's lifetime counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    total_tokens: AtomicU64,
    failed_requests: AtomicU64,
    retried_requests: AtomicU64,
}

type RemoteLimitHook = dyn Fn(&str, LimitSnapshot) + Send + Sync;
type RetryHook = dyn Fn(u32, Duration) + Send + Sync;
type CapacityWarningHook = dyn Fn(f64) + Send + Sync;

pub struct RequestEngine {
    transport: Arc<dyn Transport>,
    options: EngineOptions,
    counters: Counters,
    on_remote_limit: Option<Box<RemoteLimitHook>>,
    on_retry: Option<Box<RetryHook>>,
    on_capacity_warning: Option<Box<CapacityWarningHook>>,
}

impl RequestEngine {
    pub fn new(transport: Arc<dyn Transport>, options: EngineOptions) -> Self {
        Self {
            transport,
            options,
            counters: Counters::default(),
            on_remote_limit: None,
            on_retry: None,
            on_capacity_warning: None,
        }
    }

    pub fn with_on_remote_limit(mut self, hook: impl Fn(&str, LimitSnapshot) + Send + Sync + 'static) -> Self {
        self.on_remote_limit = Some(Box::new(hook));
        self
    }

    pub fn with_on_retry(mut self, hook: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(hook));
        self
    }

    pub fn with_on_capacity_warning(mut self, hook: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_capacity_warning = Some(Box::new(hook));
        self
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            total_tokens: self.counters.total_tokens.load(Ordering::Relaxed),
            failed_requests: self.counters.failed_requests.load(Ordering::Relaxed),
            retried_requests: self.counters.retried_requests.load(Ordering::Relaxed),
        }
    }

    pub async fn call(
        &self,
        ctx: CallContext<'_>,
        req: CallRequest,
    ) -> std::result::Result<RequestOutcome, RateLimitError> {
        ctx.ledger.check_admission()?;
        ctx.shaper.acquire(req.estimated_tokens).await;

        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut retries: u32 = 0;
        let mut total_wait = Duration::ZERO;
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_snapshot: Option<LimitSnapshot> = None;

        loop {
            let Some(secret) = ctx.pool.select() else {
                self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
                return Err(RateLimitError::RateLimitExhausted {
                    retries,
                    keys_tried: tried.len(),
                    total_wait,
                    last_snapshot,
                });
            };
            tried.insert(secret.clone());
            let fingerprint = mask_secret(&secret);

            let mut headers = req.headers.clone();
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
                headers.insert("authorization".to_string(), format!("Bearer {secret}"));
            }

            let transport_req = TransportRequest {
                method: req.method,
                url: req.url.clone(),
                headers,
                body: req.body.clone(),
                timeout: self.options.request_timeout,
            };

            match self.transport.request(transport_req).await {
                Err(TransportError::Timeout(_)) => {
                    retries += 1;
                    self.counters.retried_requests.fetch_add(1, Ordering::Relaxed);
                    if retries > self.options.max_retries {
                        self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
                        return Ok(self.terminal_outcome(fingerprint, last_snapshot, retries, total_wait, "transport timed out"));
                    }
                    continue;
                }
                Err(TransportError::Other(message)) => {
                    self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return Ok(self.terminal_outcome(fingerprint, last_snapshot, retries, total_wait, &message));
                }
                Ok(resp) => {
                    let body_text = String::from_utf8_lossy(&resp.body);
                    let snapshot = ctx.dialect.parse(&resp.headers);
                    last_snapshot = Some(snapshot);

                    if ctx.dialect.is_remote_limit(resp.status, Some(&body_text)) {
                        ctx.pool.report_remote_limit(&secret, Some(snapshot));
                        if let Some(hook) = &self.on_remote_limit {
                            hook(&fingerprint, snapshot);
                        }
                        tracing::warn!(credential = %fingerprint, status = resp.status, "remote rate limit reported");

                        let backoff = self.compute_backoff(&snapshot, retries);
                        if let Some(hook) = &self.on_retry {
                            hook(retries + 1, backoff);
                        }
                        tokio::time::sleep(backoff).await;
                        total_wait += backoff;
                        retries += 1;
                        self.counters.retried_requests.fetch_add(1, Ordering::Relaxed);

                        if retries > self.options.max_retries {
                            self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
                            return Err(RateLimitError::RateLimitExhausted {
                                retries,
                                keys_tried: tried.len(),
                                total_wait,
                                last_snapshot: Some(snapshot),
                            });
                        }
                        continue;
                    }

                    ctx.pool.report_success(&secret, Some(snapshot));

                    if let Some(ratio) = snapshot.usage_ratio() {
                        if ratio >= 1.0 - self.options.warning_threshold {
                            if let Some(hook) = &self.on_capacity_warning {
                                hook(ratio);
                            }
                            tracing::warn!(credential = %fingerprint, usage_ratio = ratio, "approaching remote capacity");
                        }
                    }

                    if let (Some(input), Some(output)) = (req.input_tokens, req.output_tokens) {
                        self.counters.total_tokens.fetch_add(input + output, Ordering::Relaxed);
                        ctx.ledger.record(
                            ctx.provider,
                            ctx.model,
                            input,
                            output,
                            ctx.limits.input_cost_per_1k,
                            ctx.limits.output_cost_per_1k,
                        )?;
                    }

                    let decoded = serde_json::from_slice(&resp.body).ok();
                    return Ok(RequestOutcome {
                        success: true,
                        status_code: Some(resp.status),
                        body: Some(resp.body.clone()),
                        decoded,
                        headers: Some(resp.headers),
                        snapshot: Some(snapshot),
                        retries,
                        total_wait,
                        credential_fingerprint: fingerprint,
                        error: None,
                    });
                }
            }
        }
    }

    fn terminal_outcome(
        &self,
        fingerprint: String,
        snapshot: Option<LimitSnapshot>,
        retries: u32,
        total_wait: Duration,
        error: &str,
    ) -> RequestOutcome {
        RequestOutcome {
            success: false,
            status_code: None,
            body: None,
            decoded: None,
            headers: None,
            snapshot,
            retries,
            total_wait,
            credential_fingerprint: fingerprint,
            error: Some(error.to_string()),
        }
    }

    /// Backoff precedence: the snapshot's `retry_after`; else the time
    /// until `reset_at`; else `base_delay * 2^retries`. Always clamped to
    /// `max_delay`, then optionally jittered by a uniform factor in
    /// `[0.5, 1.5]`.
    fn compute_backoff(&self, snapshot: &LimitSnapshot, retries: u32) -> Duration {
        let raw = if let Some(retry_after) = snapshot.retry_after {
            retry_after
        } else if let Some(reset_at) = snapshot.reset_at {
            let remaining_ms = (reset_at - Utc::now()).num_milliseconds().max(0);
            Duration::from_millis(remaining_ms as u64)
        } else {
            self.options.base_delay.mul_f64(2f64.powi(retries as i32))
        };

        let clamped = raw.min(self.options.max_delay);

        if self.options.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
            Duration::from_secs_f64((clamped.as_secs_f64() * factor).max(0.0))
        } else {
            clamped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetSpec;
    use crate::dialect::OpenAiDialect;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct ScriptedTransport {
        responses: StdMutex<Vec<Result<TransportResponse, TransportError>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(&self, _req: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn limits() -> ModelLimits {
        ModelLimits {
            requests_per_minute: 60.0,
            tokens_per_minute: 100_000.0,
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_429_then_succeeds() {
        let transport = Arc::new(ScriptedTransport {
            responses: StdMutex::new(vec![
                Ok(TransportResponse { status: 429, headers: HashMap::new(), body: vec![] }),
                Ok(TransportResponse { status: 200, headers: HashMap::new(), body: b"{}".to_vec() }),
            ]),
        });
        let engine = RequestEngine::new(transport, EngineOptions { jitter: false, base_delay: Duration::from_millis(1), ..Default::default() });
        let shaper = Shaper::new(60.0, 100_000.0);
        let pool = CredentialPool::new(vec!["key-aaaa1111".into()], crate::config::RotationStrategy::Failover, Duration::from_millis(1)).unwrap();
        let dialect = OpenAiDialect;
        let ledger = CostLedger::new(BudgetSpec::default());
        let limits = limits();

        let ctx = CallContext { shaper: &shaper, pool: &pool, dialect: &dialect, ledger: &ledger, limits: &limits, provider: "openai", model: "gpt-4o" };
        let req = CallRequest {
            method: Method::Post,
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            headers: HashMap::new(),
            body: vec![],
            estimated_tokens: 10.0,
            input_tokens: Some(5),
            output_tokens: Some(5),
        };

        let outcome = engine.call(ctx, req).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.retries, 1);
        assert_eq!(engine.metrics().retried_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries() {
        let responses: Vec<_> = (0..10)
            .map(|_| Ok(TransportResponse { status: 429, headers: HashMap::new(), body: vec![] }))
            .collect();
        let transport = Arc::new(ScriptedTransport { responses: StdMutex::new(responses) });
        let engine = RequestEngine::new(
            transport,
            EngineOptions { jitter: false, base_delay: Duration::from_millis(1), max_retries: 2, ..Default::default() },
        );
        let shaper = Shaper::new(600.0, 1_000_000.0);
        let pool = CredentialPool::new(vec!["key-aaaa1111".into()], crate::config::RotationStrategy::Failover, Duration::from_millis(1)).unwrap();
        let dialect = OpenAiDialect;
        let ledger = CostLedger::new(BudgetSpec::default());
        let limits = limits();

        let ctx = CallContext { shaper: &shaper, pool: &pool, dialect: &dialect, ledger: &ledger, limits: &limits, provider: "openai", model: "gpt-4o" };
        let req = CallRequest {
            method: Method::Post,
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            headers: HashMap::new(),
            body: vec![],
            estimated_tokens: 10.0,
            input_tokens: None,
            output_tokens: None,
        };

        let err = engine.call(ctx, req).await.unwrap_err();
        assert!(matches!(err, RateLimitError::RateLimitExhausted { retries: 3, .. }));
    }
}
