//! Static `ModelLimits` tables for a handful of widely known models.
//!
//! Plain `const` values an application may copy into its own
//! [`crate::facade::ProviderSpec`] — nothing here is loaded lazily or
//! mutated at runtime. Applications are never required to use these; they
//! may always supply their own [`ModelLimits`].

use crate::config::ModelLimits;

pub const OPENAI_GPT_4: ModelLimits = ModelLimits {
    requests_per_minute: 500.0,
    tokens_per_minute: 10_000.0,
    input_cost_per_1k: 0.03,
    output_cost_per_1k: 0.06,
};

pub const OPENAI_GPT_4_TURBO: ModelLimits = ModelLimits {
    requests_per_minute: 500.0,
    tokens_per_minute: 30_000.0,
    input_cost_per_1k: 0.01,
    output_cost_per_1k: 0.03,
};

pub const OPENAI_GPT_3_5_TURBO: ModelLimits = ModelLimits {
    requests_per_minute: 3_500.0,
    tokens_per_minute: 60_000.0,
    input_cost_per_1k: 0.0005,
    output_cost_per_1k: 0.0015,
};

pub const ANTHROPIC_CLAUDE_OPUS_4: ModelLimits = ModelLimits {
    requests_per_minute: 50.0,
    tokens_per_minute: 40_000.0,
    input_cost_per_1k: 0.015,
    output_cost_per_1k: 0.075,
};

pub const ANTHROPIC_CLAUDE_SONNET_4: ModelLimits = ModelLimits {
    requests_per_minute: 50.0,
    tokens_per_minute: 40_000.0,
    input_cost_per_1k: 0.003,
    output_cost_per_1k: 0.015,
};

pub const ANTHROPIC_CLAUDE_HAIKU_4: ModelLimits = ModelLimits {
    requests_per_minute: 50.0,
    tokens_per_minute: 50_000.0,
    input_cost_per_1k: 0.0008,
    output_cost_per_1k: 0.004,
};

/// Looks up a preset by `"provider/model"`, e.g. `"openai/gpt-4"`.
/// Returns `None` for anything not in the table above — callers fall back
/// to a caller-supplied [`ModelLimits`] in that case.
pub fn lookup(provider: &str, model: &str) -> Option<ModelLimits> {
    match (provider, model) {
        ("openai", "gpt-4") => Some(OPENAI_GPT_4),
        ("openai", "gpt-4-turbo") => Some(OPENAI_GPT_4_TURBO),
        ("openai", "gpt-3.5-turbo") => Some(OPENAI_GPT_3_5_TURBO),
        ("anthropic", "claude-opus-4") => Some(ANTHROPIC_CLAUDE_OPUS_4),
        ("anthropic", "claude-sonnet-4") => Some(ANTHROPIC_CLAUDE_SONNET_4),
        ("anthropic", "claude-haiku-4") => Some(ANTHROPIC_CLAUDE_HAIKU_4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_preset_round_trips() {
        let limits = lookup("openai", "gpt-4").unwrap();
        assert_eq!(limits.requests_per_minute, 500.0);
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(lookup("openai", "gpt-5-ultra").is_none());
    }
}
