//! Thin example binary over `llmrl-core`: a status/monitor CLI.
//!
//! The CLI surface is an external collaborator rather than a library
//! responsibility — this binary is a thin shell that builds one
//! [`MultiProviderFacade`] and forwards straight to
//! [`MultiProviderFacade::call`].

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use llmrl_common::observability::{init_logging, LogConfig};
use llmrl_core::config::{BudgetSpec, EngineOptions, RotationStrategy};
use llmrl_core::dialect::{AnthropicDialect, HeaderDialect, OpenAiDialect};
use llmrl_core::engine::{CallRequest, RequestEngine};
use llmrl_core::facade::{MultiProviderFacade, ProviderSpec};
use llmrl_core::ledger::CostLedger;
use llmrl_core::pool::CredentialPool;
use llmrl_core::transport::Method;
use llmrl_reqwest::ReqwestTransport;

#[derive(Parser)]
#[command(name = "llmrl", about = "Check and monitor LLM provider rate-limit status")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check rate-limit status for an API key.
    Status {
        #[arg(long, short = 'p')]
        provider: Provider,
        #[arg(long, short = 'k')]
        key: String,
    },
    /// Repeat `status` on an interval until interrupted.
    Monitor {
        #[arg(long, short = 'p')]
        provider: Provider,
        #[arg(long, short = 'k')]
        key: String,
        #[arg(long, short = 'i', default_value_t = 30)]
        interval: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Openai,
    Anthropic,
}

impl Provider {
    fn name(self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    fn status_url(self) -> &'static str {
        match self {
            Provider::Openai => "https://api.openai.com/v1/models",
            Provider::Anthropic => "https://api.anthropic.com/v1/models",
        }
    }

    fn dialect(self) -> Arc<dyn HeaderDialect> {
        match self {
            Provider::Openai => Arc::new(OpenAiDialect),
            Provider::Anthropic => Arc::new(AnthropicDialect),
        }
    }
}

fn build_facade(provider: Provider, key: String) -> llmrl_common::Result<MultiProviderFacade> {
    let pool = CredentialPool::new(vec![key], RotationStrategy::Failover, Duration::from_secs(60))?;
    let mut models = HashMap::new();
    models.insert(
        "status".to_string(),
        llmrl_core::config::ModelLimits {
            requests_per_minute: 60.0,
            tokens_per_minute: 1_000_000.0,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        },
    );
    let spec = ProviderSpec { name: provider.name().to_string(), dialect: provider.dialect(), pool, models };
    MultiProviderFacade::new(
        vec![spec],
        CostLedger::new(BudgetSpec::default()),
        RequestEngine::new(Arc::new(ReqwestTransport::new()), EngineOptions { max_retries: 0, ..Default::default() }),
    )
}

async fn check_status(provider: Provider, key: String) -> anyhow::Result<()> {
    let facade = build_facade(provider, key)?;
    let req = CallRequest {
        method: Method::Get,
        url: provider.status_url().to_string(),
        headers: HashMap::new(),
        body: vec![],
        estimated_tokens: 1.0,
        input_tokens: None,
        output_tokens: None,
    };

    match facade.call(provider.name(), "status", req).await {
        Ok(outcome) if outcome.success => {
            println!("Rate Limit Status ({})", provider.name());
            println!("{}", "=".repeat(40));
            if let Some(snapshot) = outcome.snapshot {
                if let (Some(remaining), Some(limit)) = (snapshot.requests_remaining, snapshot.requests_limit) {
                    let pct = (remaining as f64 / limit as f64) * 100.0;
                    println!("Requests: {remaining}/{limit} ({pct:.1}% remaining)");
                }
                if let (Some(remaining), Some(limit)) = (snapshot.tokens_remaining, snapshot.tokens_limit) {
                    let pct = (remaining as f64 / limit as f64) * 100.0;
                    println!("Tokens:   {remaining}/{limit} ({pct:.1}% remaining)");
                }
                if let Some(reset_at) = snapshot.reset_at {
                    println!("Resets:   {}", reset_at.to_rfc3339());
                }
            } else {
                println!("No rate limit information available in response headers");
            }
            println!();
            Ok(())
        }
        Ok(outcome) => anyhow::bail!("request failed: {}", outcome.error.unwrap_or_default()),
        Err(err) => anyhow::bail!("request failed: {err}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = init_logging(LogConfig { app_name: "llmrl", ..Default::default() });
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Status { provider, key } => check_status(provider, key).await,
        Command::Monitor { provider, key, interval } => {
            println!("Monitoring {} rate limits (Ctrl+C to stop)", provider.name());
            println!("{}", "=".repeat(50));
            loop {
                if let Err(err) = check_status(provider, key.clone()).await {
                    eprintln!("error: {err}");
                }
                println!("Next check in {interval}s...");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        println!("\nMonitoring stopped");
                        return ExitCode::SUCCESS;
                    }
                }
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
