//! Append-only spend ledger with rolling wall-clock budgets.
//!
//! Entries accumulate without limit and are never persisted across
//! restarts. Each append re-evaluates the configured daily/weekly/monthly
//! caps against the sum of entries that fall inside that window as of now.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use llmrl_common::{RateLimitError, Result};

use crate::config::BudgetSpec;

const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 604_800;
const MONTH_SECS: i64 = 2_592_000;

#[derive(Debug, Clone)]
pub struct CostEntry {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AlertState {
    daily: bool,
    weekly: bool,
    monthly: bool,
}

/// Tracks spend and enforces optional daily/weekly/monthly caps.
///
/// `on_alert` fires the first time a window's usage crosses
/// `alert_threshold * cap`; it is not re-fired until the window rolls past
/// the point where usage drops back under the threshold and crosses it
/// again (see [`CostLedger::reset_alerts`]).
pub struct CostLedger {
    entries: Mutex<Vec<CostEntry>>,
    budget: BudgetSpec,
    alerted: Mutex<AlertState>,
    on_alert: Option<Box<dyn Fn(&str, f64, f64) + Send + Sync>>,
}

impl CostLedger {
    pub fn new(budget: BudgetSpec) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            budget,
            alerted: Mutex::new(AlertState::default()),
            on_alert: None,
        }
    }

    pub fn with_on_alert(mut self, hook: impl Fn(&str, f64, f64) + Send + Sync + 'static) -> Self {
        self.on_alert = Some(Box::new(hook));
        self
    }

    /// Records a completed call's token usage and cost, then checks every
    /// configured budget window. The entry is retained even if a budget
    /// is exceeded — the ledger reflects reality; the caller decides what
    /// to do with the error.
    pub fn record(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        input_cost_per_1k: f64,
        output_cost_per_1k: f64,
    ) -> Result<f64> {
        let cost = (input_tokens as f64 / 1000.0) * input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * output_cost_per_1k;
        let now = Utc::now();

        let mut entries = self.entries.lock().unwrap();
        entries.push(CostEntry {
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost,
            timestamp: now,
        });
        self.check_budgets(&entries, now)?;
        Ok(cost)
    }

    /// Re-checks budgets without recording anything, so the engine can
    /// refuse admission *before* spending on a call that would breach a
    /// cap.
    pub fn check_admission(&self) -> Result<()> {
        let entries = self.entries.lock().unwrap();
        self.check_budgets(&entries, Utc::now())
    }

    fn check_budgets(&self, entries: &[CostEntry], now: DateTime<Utc>) -> Result<()> {
        let mut alerted = self.alerted.lock().unwrap();

        if let Some(cap) = self.budget.daily {
            self.check_window(entries, now, DAY_SECS, cap, "daily", &mut alerted.daily)?;
        }
        if let Some(cap) = self.budget.weekly {
            self.check_window(entries, now, WEEK_SECS, cap, "weekly", &mut alerted.weekly)?;
        }
        if let Some(cap) = self.budget.monthly {
            self.check_window(entries, now, MONTH_SECS, cap, "monthly", &mut alerted.monthly)?;
        }
        Ok(())
    }

    fn check_window(
        &self,
        entries: &[CostEntry],
        now: DateTime<Utc>,
        window_secs: i64,
        cap: f64,
        name: &'static str,
        alert_flag: &mut bool,
    ) -> Result<()> {
        let since = now - chrono::Duration::seconds(window_secs);
        let current: f64 = entries.iter().filter(|e| e.timestamp >= since).map(|e| e.cost).sum();

        if current >= cap * self.budget.alert_threshold && !*alert_flag {
            *alert_flag = true;
            if let Some(hook) = &self.on_alert {
                hook(name, current, cap);
            }
            tracing::warn!(window = name, current, cap, "cost ledger alert threshold crossed");
        }

        if current >= cap {
            return Err(RateLimitError::BudgetExceeded {
                window: name,
                current,
                cap,
            });
        }
        Ok(())
    }

    pub fn total_since(&self, since: DateTime<Utc>) -> f64 {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp >= since)
            .map(|e| e.cost)
            .sum()
    }

    pub fn total(&self) -> f64 {
        self.entries.lock().unwrap().iter().map(|e| e.cost).sum()
    }

    /// Spend grouped by `"provider/model"`.
    pub fn breakdown_by_model(&self) -> std::collections::HashMap<String, f64> {
        let mut out = std::collections::HashMap::new();
        for entry in self.entries.lock().unwrap().iter() {
            *out.entry(format!("{}/{}", entry.provider, entry.model)).or_insert(0.0) += entry.cost;
        }
        out
    }

    pub fn reset_alerts(&self) {
        let mut alerted = self.alerted.lock().unwrap();
        *alerted = AlertState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_under_cap_until_threshold() {
        let ledger = CostLedger::new(BudgetSpec {
            daily: Some(10.0),
            weekly: None,
            monthly: None,
            alert_threshold: 0.8,
        });
        let cost = ledger.record("openai", "gpt-4o", 1000, 0, 1.0, 0.0).unwrap();
        assert_eq!(cost, 1.0);
        assert_eq!(ledger.total(), 1.0);
    }

    #[test]
    fn exceeding_daily_cap_is_rejected_but_entry_is_kept() {
        let ledger = CostLedger::new(BudgetSpec {
            daily: Some(1.0),
            weekly: None,
            monthly: None,
            alert_threshold: 0.8,
        });
        let err = ledger.record("openai", "gpt-4o", 2000, 0, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, RateLimitError::BudgetExceeded { window: "daily", .. }));
        assert_eq!(ledger.total(), 2.0);
    }

    #[test]
    fn alert_fires_once_per_crossing() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let ledger = CostLedger::new(BudgetSpec {
            daily: Some(10.0),
            weekly: None,
            monthly: None,
            alert_threshold: 0.5,
        })
        .with_on_alert(move |_, _, _| {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        });

        ledger.record("openai", "gpt-4o", 5000, 0, 1.0, 0.0).unwrap();
        ledger.record("openai", "gpt-4o", 100, 0, 1.0, 0.0).unwrap();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn breakdown_is_keyed_by_provider_slash_model() {
        let ledger = CostLedger::new(BudgetSpec::default());
        ledger.record("openai", "gpt-4o", 1000, 0, 1.0, 0.0).unwrap();
        ledger.record("anthropic", "claude-3-5-sonnet", 1000, 0, 3.0, 0.0).unwrap();
        let breakdown = ledger.breakdown_by_model();
        assert_eq!(breakdown.get("openai/gpt-4o"), Some(&1.0));
        assert_eq!(breakdown.get("anthropic/claude-3-5-sonnet"), Some(&3.0));
    }
}
