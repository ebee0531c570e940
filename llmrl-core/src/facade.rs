//! Routes calls to the right per-(provider, model) collaborators and
//! aggregates metrics across all of them.
//!
//! One [`CostLedger`] is shared across every provider; each provider owns
//! one [`CredentialPool`] and one [`Shaper`] per model. Callers reach all
//! of it through the single [`MultiProviderFacade::call`] entry point.

use std::collections::HashMap;
use std::sync::Arc;

use llmrl_common::{RateLimitError, Result};

use crate::config::ModelLimits;
use crate::dialect::HeaderDialect;
use crate::engine::{CallContext, CallRequest, EngineMetrics, RequestEngine, RequestOutcome};
use crate::ledger::CostLedger;
use crate::pool::CredentialPool;
use crate::shaper::Shaper;

/// Everything needed to admit and dispatch calls for one provider: a
/// credential pool, a dialect for interpreting its responses, and one
/// shaper per model the caller has configured.
struct ProviderEntry {
    pool: CredentialPool,
    dialect: Arc<dyn HeaderDialect>,
    shapers: HashMap<String, Shaper>,
    limits: HashMap<String, ModelLimits>,
}

/// Aggregate metrics across every provider/model pair.
#[derive(Debug, Clone, Default)]
pub struct FacadeMetrics {
    pub engine: EngineMetrics,
    pub total_cost: f64,
    pub cost_by_model: HashMap<String, f64>,
    pub cost_daily: f64,
    pub cost_weekly: f64,
    pub cost_monthly: f64,
}

/// One entry in [`MultiProviderFacade::builder`]'s provider list: a name,
/// a dialect, a credential pool, and the models it serves.
pub struct ProviderSpec {
    pub name: String,
    pub dialect: Arc<dyn HeaderDialect>,
    pub pool: CredentialPool,
    pub models: HashMap<String, ModelLimits>,
}

/// Top-level entry point: indexes shapers/pools/dialects by
/// `(provider, model)` and owns the single [`CostLedger`] and
/// [`RequestEngine`] shared by every call.
///
/// Unknown provider or model is a configuration error, surfaced
/// synchronously before anything suspends.
pub struct MultiProviderFacade {
    providers: HashMap<String, ProviderEntry>,
    ledger: CostLedger,
    engine: RequestEngine,
}

impl MultiProviderFacade {
    pub fn new(providers: Vec<ProviderSpec>, ledger: CostLedger, engine: RequestEngine) -> Result<Self> {
        Self::with_on_limit_hit(providers, ledger, engine, None)
    }

    /// Like [`Self::new`], but wires `on_limit_hit` into every constructed
    /// [`Shaper`] so the per-(provider, model) callback fires the first
    /// time that pair's `acquire` has to sleep.
    pub fn with_on_limit_hit(
        providers: Vec<ProviderSpec>,
        ledger: CostLedger,
        engine: RequestEngine,
        on_limit_hit: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    ) -> Result<Self> {
        let mut table = HashMap::new();
        for spec in providers {
            let provider_name = spec.name.clone();
            let shapers = spec
                .models
                .iter()
                .map(|(model, limits)| {
                    let mut shaper = Shaper::new(limits.requests_per_minute, limits.tokens_per_minute);
                    if let Some(hook) = on_limit_hit.clone() {
                        let provider_name = provider_name.clone();
                        let model_name = model.clone();
                        shaper = shaper.with_on_limit_hit(move || hook(&provider_name, &model_name));
                    }
                    (model.clone(), shaper)
                })
                .collect();
            table.insert(
                spec.name,
                ProviderEntry {
                    pool: spec.pool,
                    dialect: spec.dialect,
                    shapers,
                    limits: spec.models,
                },
            );
        }
        Ok(Self {
            providers: table,
            ledger,
            engine,
        })
    }

    fn entry(&self, provider: &str) -> Result<&ProviderEntry> {
        self.providers
            .get(provider)
            .ok_or_else(|| RateLimitError::Config(format!("unknown provider: {provider}")))
    }

    /// Dispatches one call through the (provider, model)'s shaper and
    /// credential pool, the shared ledger, and the shared engine.
    pub async fn call(&self, provider: &str, model: &str, req: CallRequest) -> Result<RequestOutcome> {
        let entry = self.entry(provider)?;
        let shaper = entry
            .shapers
            .get(model)
            .ok_or_else(|| RateLimitError::Config(format!("unknown model: {model} for provider {provider}")))?;
        let limits = entry.limits.get(model).expect("shaper and limits are inserted together");

        let ctx = CallContext {
            shaper,
            pool: &entry.pool,
            dialect: entry.dialect.as_ref(),
            ledger: &self.ledger,
            limits,
            provider,
            model,
        };
        self.engine.call(ctx, req).await
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn pool(&self, provider: &str) -> Result<&CredentialPool> {
        Ok(&self.entry(provider)?.pool)
    }

    /// Aggregates engine counters and ledger spend.
    pub fn metrics(&self) -> FacadeMetrics {
        let now = chrono::Utc::now();
        FacadeMetrics {
            engine: self.engine.metrics(),
            total_cost: self.ledger.total(),
            cost_by_model: self.ledger.breakdown_by_model(),
            cost_daily: self.ledger.total_since(now - chrono::Duration::seconds(86_400)),
            cost_weekly: self.ledger.total_since(now - chrono::Duration::seconds(604_800)),
            cost_monthly: self.ledger.total_since(now - chrono::Duration::seconds(2_592_000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BudgetSpec, EngineOptions, RotationStrategy};
    use crate::dialect::OpenAiDialect;
    use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubTransport;

    #[async_trait]
    impl Transport for StubTransport {
        async fn request(&self, _req: TransportRequest) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse { status: 200, headers: HashMap::new(), body: b"{}".to_vec() })
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
    async fn unknown_provider_is_a_config_error() {
        let pool = CredentialPool::new(vec!["key-aaaa1111".into()], RotationStrategy::Failover, Duration::from_secs(1)).unwrap();
        let mut models = HashMap::new();
        models.insert("gpt-4o".to_string(), limits());
        let spec = ProviderSpec { name: "openai".into(), dialect: Arc::new(OpenAiDialect), pool, models };
        let facade = MultiProviderFacade::new(
            vec![spec],
            CostLedger::new(BudgetSpec::default()),
            RequestEngine::new(Arc::new(StubTransport), EngineOptions::default()),
        )
        .unwrap();

        let req = CallRequest {
            method: crate::transport::Method::Get,
            url: "https://example.com".into(),
            headers: HashMap::new(),
            body: vec![],
            estimated_tokens: 1.0,
            input_tokens: None,
            output_tokens: None,
        };
        let err = facade.call("anthropic", "gpt-4o", req).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_call_updates_aggregate_metrics() {
        let pool = CredentialPool::new(vec!["key-aaaa1111".into()], RotationStrategy::Failover, Duration::from_secs(1)).unwrap();
        let mut models = HashMap::new();
        models.insert("gpt-4o".to_string(), limits());
        let spec = ProviderSpec { name: "openai".into(), dialect: Arc::new(OpenAiDialect), pool, models };
        let facade = MultiProviderFacade::new(
            vec![spec],
            CostLedger::new(BudgetSpec::default()),
            RequestEngine::new(Arc::new(StubTransport), EngineOptions::default()),
        )
        .unwrap();

        let req = CallRequest {
            method: crate::transport::Method::Get,
            url: "https://example.com".into(),
            headers: HashMap::new(),
            body: vec![],
            estimated_tokens: 1.0,
            input_tokens: Some(1000),
            output_tokens: Some(1000),
        };
        let outcome = facade.call("openai", "gpt-4o", req).await.unwrap();
        assert!(outcome.success);
        assert_eq!(facade.metrics().engine.total_requests, 1);
        assert_eq!(facade.metrics().total_cost, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn on_limit_hit_fires_with_provider_and_model() {
        use std::sync::Mutex as StdMutex;

        let pool = CredentialPool::new(vec!["key-aaaa1111".into()], RotationStrategy::Failover, Duration::from_secs(1)).unwrap();
        let mut models = HashMap::new();
        models.insert(
            "gpt-4o".to_string(),
            ModelLimits { requests_per_minute: 1.0, tokens_per_minute: 100_000.0, input_cost_per_1k: 1.0, output_cost_per_1k: 2.0 },
        );
        let spec = ProviderSpec { name: "openai".into(), dialect: Arc::new(OpenAiDialect), pool, models };

        let hits: Arc<StdMutex<Vec<(String, String)>>> = Arc::new(StdMutex::new(Vec::new()));
        let hits_clone = hits.clone();
        let facade = MultiProviderFacade::with_on_limit_hit(
            vec![spec],
            CostLedger::new(BudgetSpec::default()),
            RequestEngine::new(Arc::new(StubTransport), EngineOptions::default()),
            Some(Arc::new(move |provider: &str, model: &str| {
                hits_clone.lock().unwrap().push((provider.to_string(), model.to_string()));
            })),
        )
        .unwrap();

        let req = |tokens| CallRequest {
            method: crate::transport::Method::Get,
            url: "https://example.com".into(),
            headers: HashMap::new(),
            body: vec![],
            estimated_tokens: tokens,
            input_tokens: None,
            output_tokens: None,
        };

        facade.call("openai", "gpt-4o", req(1.0)).await.unwrap();
        facade.call("openai", "gpt-4o", req(1.0)).await.unwrap();

        assert_eq!(hits.lock().unwrap().as_slice(), &[("openai".to_string(), "gpt-4o".to_string())]);
    }
}
