// src/core/cost.rs — Per-cycle spend accounting and model pricing

use std::collections::HashMap;

use crate::provider::TokenUsage;

/// Cumulative spend for one cycle.
///
/// The ledger is the single writer of spend-so-far. Charges are clamped to be
/// non-negative and finite so the total can only grow.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    total_usd: f64,
    by_phase: HashMap<String, f64>,
    charges: u32,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a charge against a phase. The orchestrator books builder and
    /// critic spend together as "attempt" and the skill description as
    /// "describe". Returns the amount actually booked.
    pub fn charge(&mut self, phase: &str, amount_usd: f64) -> f64 {
        let booked = if amount_usd.is_finite() && amount_usd > 0.0 {
            amount_usd
        } else {
            if amount_usd != 0.0 {
                tracing::warn!(phase, amount_usd, "Ignoring invalid cost charge");
            }
            0.0
        };
        self.total_usd += booked;
        *self.by_phase.entry(phase.into()).or_default() += booked;
        self.charges += 1;
        booked
    }

    pub fn total(&self) -> f64 {
        self.total_usd
    }

    pub fn phase_total(&self, phase: &str) -> f64 {
        self.by_phase.get(phase).copied().unwrap_or(0.0)
    }

    pub fn charges(&self) -> u32 {
        self.charges
    }

    /// Human-readable breakdown, most expensive phase first.
    pub fn summary(&self) -> String {
        let mut phases: Vec<(&String, &f64)> = self.by_phase.iter().collect();
        phases.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        let parts: Vec<String> = phases
            .iter()
            .map(|(phase, cost)| format!("{}=${:.4}", phase, cost))
            .collect();
        format!("total=${:.4} ({})", self.total_usd, parts.join(", "))
    }
}

pub fn calculate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let (input_price, output_price) = model_pricing(model);
    let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_price;
    let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_price;
    input_cost + output_cost
}

/// Returns (input_price_per_mtok, output_price_per_mtok).
pub fn model_pricing(model: &str) -> (f64, f64) {
    match model {
        // Anthropic
        m if m.contains("claude-opus") => (15.0, 75.0),
        m if m.contains("claude-sonnet") => (3.0, 15.0),
        m if m.contains("claude-haiku") || m.contains("haiku") => (0.8, 4.0),

        // OpenAI
        m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
        m if m.contains("gpt-4.1") => (2.0, 8.0),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6),
        m if m.contains("gpt-4o") => (2.5, 10.0),
        m if m.contains("gpt-4-turbo") => (10.0, 30.0),
        m if m.contains("gpt-3.5-turbo") => (0.5, 1.5),
        m if m.contains("o3-mini") => (1.1, 4.4),
        m if m.contains("o4-mini") => (1.1, 4.4),
        m if m.contains("text-embedding-3-small") => (0.02, 0.0),
        m if m.contains("text-embedding-3-large") => (0.13, 0.0),

        // Local models are free
        m if m.contains("llama")
            || m.contains("mistral")
            || m.contains("gemma")
            || m.contains("qwen")
            || m.contains("codestral")
            || m.contains("deepseek") =>
        {
            (0.0, 0.0)
        }

        // Default: assume moderate pricing
        _ => (10.0, 30.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u32, output: u32) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    // ─── CostLedger ─────────────────────────────────────────────

    #[test]
    fn test_ledger_starts_empty() {
        let ledger = CostLedger::new();
        assert_eq!(ledger.total(), 0.0);
        assert_eq!(ledger.charges(), 0);
    }

    #[test]
    fn test_ledger_accumulates_by_phase() {
        let mut ledger = CostLedger::new();
        ledger.charge("attempt", 0.10);
        ledger.charge("attempt", 0.05);
        ledger.charge("describe", 0.02);
        assert!((ledger.total() - 0.17).abs() < 1e-9);
        assert!((ledger.phase_total("attempt") - 0.15).abs() < 1e-9);
        assert!((ledger.phase_total("describe") - 0.02).abs() < 1e-9);
        assert_eq!(ledger.phase_total("build"), 0.0);
        assert_eq!(ledger.charges(), 3);
    }

    #[test]
    fn test_ledger_rejects_negative_and_nan() {
        let mut ledger = CostLedger::new();
        ledger.charge("attempt", 0.5);
        assert_eq!(ledger.charge("attempt", -1.0), 0.0);
        assert_eq!(ledger.charge("attempt", f64::NAN), 0.0);
        assert_eq!(ledger.charge("attempt", f64::INFINITY), 0.0);
        assert!((ledger.total() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_total_is_monotonic() {
        let mut ledger = CostLedger::new();
        let mut previous = 0.0;
        for amount in [0.1, -0.3, 0.0, 0.2, f64::NAN, 0.05] {
            ledger.charge("attempt", amount);
            assert!(ledger.total() >= previous);
            previous = ledger.total();
        }
    }

    #[test]
    fn test_ledger_summary() {
        let mut ledger = CostLedger::new();
        ledger.charge("describe", 0.01);
        ledger.charge("attempt", 0.02);
        let summary = ledger.summary();
        assert!(summary.starts_with("total=$0.0300"));
        assert!(summary.find("attempt").unwrap() < summary.find("describe").unwrap());
    }

    // ─── pricing ────────────────────────────────────────────────

    #[test]
    fn test_pricing_openai() {
        assert_eq!(model_pricing("gpt-4.1"), (2.0, 8.0));
        assert_eq!(model_pricing("gpt-4.1-mini"), (0.4, 1.6));
        assert_eq!(model_pricing("gpt-4o"), (2.5, 10.0));
        assert_eq!(model_pricing("gpt-4o-mini"), (0.15, 0.6));
        assert_eq!(model_pricing("gpt-4-turbo"), (10.0, 30.0));
    }

    #[test]
    fn test_pricing_local_is_free() {
        assert_eq!(model_pricing("llama3.1:8b"), (0.0, 0.0));
        assert_eq!(model_pricing("qwen2.5-coder"), (0.0, 0.0));
    }

    #[test]
    fn test_pricing_default() {
        assert_eq!(model_pricing("some-unknown-model"), (10.0, 30.0));
    }

    #[test]
    fn test_calculate_cost() {
        // 1M input @ $2 + 500k output @ $8 = 2 + 4
        let cost = calculate_cost("gpt-4.1", &usage(1_000_000, 500_000));
        assert!((cost - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_cost_zero_usage() {
        assert_eq!(calculate_cost("gpt-4o", &usage(0, 0)), 0.0);
    }
}
