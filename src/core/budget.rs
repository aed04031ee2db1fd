// src/core/budget.rs — Attempt, spend and deadline limits for a cycle

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::ExhaustReason;

/// Per-cycle limits. Spend-so-far lives in the cycle's `CostLedger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub max_attempts: u32,
    pub max_spend_usd: f64,
    pub deadline: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_spend_usd: 2.0,
            deadline: Duration::from_secs(300),
        }
    }
}

impl Budget {
    pub fn new(max_attempts: u32, max_spend_usd: f64, deadline: Duration) -> Self {
        Self {
            max_attempts,
            max_spend_usd,
            deadline,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_spend(mut self, max_spend_usd: f64) -> Self {
        self.max_spend_usd = max_spend_usd;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

impl From<&crate::infra::config::BudgetConfig> for Budget {
    fn from(cfg: &crate::infra::config::BudgetConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            max_spend_usd: cfg.max_spend_usd,
            deadline: Duration::from_secs(cfg.deadline_seconds),
        }
    }
}

/// Whether the cycle may start another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    StopAttempts,
    StopSpend,
    StopDeadline,
}

impl Decision {
    pub fn is_continue(self) -> bool {
        self == Decision::Continue
    }

    pub fn exhaust_reason(self) -> Option<ExhaustReason> {
        match self {
            Decision::Continue => None,
            Decision::StopAttempts => Some(ExhaustReason::Attempts),
            Decision::StopSpend => Some(ExhaustReason::Spend),
            Decision::StopDeadline => Some(ExhaustReason::Deadline),
        }
    }
}

pub struct BudgetPolicy;

impl BudgetPolicy {
    /// Decide whether another attempt may start.
    ///
    /// Every limit is inclusive: reaching it stops the cycle. When several
    /// limits are reached at once the attempt limit wins, then spend, then
    /// the deadline. NaN spend counts as exhausted.
    pub fn evaluate(
        attempts_used: u32,
        spend_so_far: f64,
        elapsed: Duration,
        budget: &Budget,
    ) -> Decision {
        if attempts_used >= budget.max_attempts {
            return Decision::StopAttempts;
        }
        if spend_so_far.is_nan() || spend_so_far >= budget.max_spend_usd {
            return Decision::StopSpend;
        }
        if elapsed >= budget.deadline {
            return Decision::StopDeadline;
        }
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> Budget {
        Budget::new(3, 1.0, Duration::from_secs(60))
    }

    #[test]
    fn test_continue_within_limits() {
        let d = BudgetPolicy::evaluate(1, 0.5, Duration::from_secs(10), &budget());
        assert_eq!(d, Decision::Continue);
        assert!(d.exhaust_reason().is_none());
    }

    #[test]
    fn test_attempt_boundary_stops() {
        assert_eq!(
            BudgetPolicy::evaluate(3, 0.0, Duration::ZERO, &budget()),
            Decision::StopAttempts
        );
        assert_eq!(
            BudgetPolicy::evaluate(2, 0.0, Duration::ZERO, &budget()),
            Decision::Continue
        );
    }

    #[test]
    fn test_spend_boundary_stops() {
        assert_eq!(
            BudgetPolicy::evaluate(1, 1.0, Duration::ZERO, &budget()),
            Decision::StopSpend
        );
        assert_eq!(
            BudgetPolicy::evaluate(1, 0.999, Duration::ZERO, &budget()),
            Decision::Continue
        );
    }

    #[test]
    fn test_deadline_boundary_stops() {
        assert_eq!(
            BudgetPolicy::evaluate(1, 0.0, Duration::from_secs(60), &budget()),
            Decision::StopDeadline
        );
    }

    #[test]
    fn test_tie_break_attempts_over_spend() {
        assert_eq!(
            BudgetPolicy::evaluate(3, 1.0, Duration::ZERO, &budget()),
            Decision::StopAttempts
        );
    }

    #[test]
    fn test_tie_break_spend_over_deadline() {
        assert_eq!(
            BudgetPolicy::evaluate(0, 5.0, Duration::from_secs(600), &budget()),
            Decision::StopSpend
        );
    }

    #[test]
    fn test_all_limits_exceeded() {
        assert_eq!(
            BudgetPolicy::evaluate(10, 5.0, Duration::from_secs(600), &budget()),
            Decision::StopAttempts
        );
    }

    #[test]
    fn test_zero_attempt_budget_never_continues() {
        let b = budget().with_max_attempts(0);
        assert_eq!(
            BudgetPolicy::evaluate(0, 0.0, Duration::ZERO, &b),
            Decision::StopAttempts
        );
    }

    #[test]
    fn test_nan_spend_stops() {
        assert_eq!(
            BudgetPolicy::evaluate(0, f64::NAN, Duration::ZERO, &budget()),
            Decision::StopSpend
        );
    }

    #[test]
    fn test_deterministic() {
        let b = budget();
        for attempts in 0..5 {
            for spend in [0.0, 0.5, 1.0, 2.0] {
                let a = BudgetPolicy::evaluate(attempts, spend, Duration::from_secs(30), &b);
                let c = BudgetPolicy::evaluate(attempts, spend, Duration::from_secs(30), &b);
                assert_eq!(a, c);
            }
        }
    }

    #[test]
    fn test_exhaust_reason_mapping() {
        assert_eq!(
            Decision::StopAttempts.exhaust_reason(),
            Some(ExhaustReason::Attempts)
        );
        assert_eq!(Decision::StopSpend.exhaust_reason(), Some(ExhaustReason::Spend));
        assert_eq!(
            Decision::StopDeadline.exhaust_reason(),
            Some(ExhaustReason::Deadline)
        );
    }

    #[test]
    fn test_budget_builders() {
        let b = Budget::default()
            .with_max_attempts(5)
            .with_max_spend(0.25)
            .with_deadline(Duration::from_secs(5));
        assert_eq!(b.max_attempts, 5);
        assert!((b.max_spend_usd - 0.25).abs() < f64::EPSILON);
        assert_eq!(b.deadline, Duration::from_secs(5));
    }
}
