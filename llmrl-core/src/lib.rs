//! Client-side rate-limit mediator for outbound calls to LLM providers.
//!
//! This crate sits between an application and one or more remote APIs and
//! enforces two complementary disciplines: proactive shaping (a
//! token-bucket [`shaper`] refuses to emit more traffic than the local
//! budget allows) and reactive adaptation (the [`engine`] observes
//! response headers/status, learns each remote limit via a [`dialect`],
//! parks exhausted credentials on cooldown in the [`pool`], and retries
//! with backoff). A [`ledger`] enforces wall-clock spend caps alongside
//! it, and a [`queue`] orders admitted work by priority. [`facade`] ties
//! all of the above together per (provider, model).
//!
//! The crate is deliberately narrow: configuration *loading* (files/env),
//! static preset *catalogs* beyond a small convenience table, and the
//! HTTP transport itself are external collaborators. [`transport::Transport`]
//! is the seam an embedding application (or the companion
//! `llmrl-reqwest` crate) fills in.
//!
//! # Example
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use llmrl_core::config::{BudgetSpec, EngineOptions, RotationStrategy};
//! use llmrl_core::dialect::OpenAiDialect;
//! use llmrl_core::engine::{CallRequest, RequestEngine};
//! use llmrl_core::facade::{MultiProviderFacade, ProviderSpec};
//! use llmrl_core::ledger::CostLedger;
//! use llmrl_core::pool::CredentialPool;
//! use llmrl_core::presets;
//! use llmrl_core::transport::Method;
//!
//! # async fn demo(transport: Arc<dyn llmrl_core::transport::Transport>) -> llmrl_common::Result<()> {
//! let pool = CredentialPool::new(
//!     vec!["sk-aaaa1111bbbb2222".to_string()],
//!     RotationStrategy::RoundRobin,
//!     Duration::from_secs(60),
//! )?;
//! let mut models = HashMap::new();
//! models.insert("gpt-4".to_string(), presets::OPENAI_GPT_4);
//!
//! let facade = MultiProviderFacade::new(
//!     vec![ProviderSpec { name: "openai".to_string(), dialect: Arc::new(OpenAiDialect), pool, models }],
//!     CostLedger::new(BudgetSpec::default()),
//!     RequestEngine::new(transport, EngineOptions::default()),
//! )?;
//!
//! let outcome = facade
//!     .call(
//!         "openai",
//!         "gpt-4",
//!         CallRequest {
//!             method: Method::Post,
//!             url: "https://api.openai.com/v1/chat/completions".to_string(),
//!             headers: HashMap::new(),
//!             body: b"{}".to_vec(),
//!             estimated_tokens: 50.0,
//!             input_tokens: None,
//!             output_tokens: None,
//!         },
//!     )
//!     .await?;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod facade;
pub mod ledger;
pub mod pool;
pub mod presets;
pub mod queue;
pub mod shaper;
pub mod transport;

pub use llmrl_common::{LimitSnapshot, RateLimitError, Result};
