// src/core/orchestrator.rs — Cycle controller: retrieve, attempt, reflect, consolidate

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::attempt::{AttemptOutcome, AttemptRunner, Interrupt, StopSignal};
use super::budget::{Budget, BudgetPolicy};
use super::consolidate::SkillConsolidator;
use super::cost::CostLedger;
use super::prompts::PromptBuilder;
use super::reflexion::ReflexionComposer;
use super::types::*;
use crate::arbiter::Executor;
use crate::memory::{ScoredSkill, SkillStore};
use crate::provider::Generator;

/// Stand-in deadline when the configured one does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Drives build → attack → judge → reflect cycles until a solution passes or
/// the budget runs out.
///
/// One orchestrator can serve many concurrent cycles: all per-cycle state
/// (context, ledger, attempt count) lives on the stack of `run`.
pub struct Orchestrator {
    builder: Arc<dyn Generator>,
    critic: Arc<dyn Generator>,
    describer: Option<Arc<dyn Generator>>,
    executor: Arc<dyn Executor>,
    store: Arc<dyn SkillStore>,
    config: CycleEngineConfig,
    prompts: PromptBuilder,
    composer: ReflexionComposer,
    cancel: CancellationToken,
    /// Optional callback for real-time progress events.
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl Orchestrator {
    pub fn new(
        builder: Arc<dyn Generator>,
        critic: Arc<dyn Generator>,
        executor: Arc<dyn Executor>,
        store: Arc<dyn SkillStore>,
        config: CycleEngineConfig,
    ) -> Self {
        let composer = ReflexionComposer::new(config.note_cap_chars);
        Self {
            builder,
            critic,
            describer: None,
            executor,
            store,
            config,
            prompts: PromptBuilder::new(),
            composer,
            cancel: CancellationToken::new(),
            on_progress: None,
        }
    }

    /// Generator used to write skill descriptions. Without one, skills are
    /// described by their task objective.
    pub fn with_describer(mut self, describer: Arc<dyn Generator>) -> Self {
        self.describer = Some(describer);
        self
    }

    /// Cancelling `token` stops every running cycle at its next suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn config(&self) -> &CycleEngineConfig {
        &self.config
    }

    /// Fire a progress event if a callback is set.
    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    fn transition(&self, state: CycleState) {
        tracing::debug!(%state, "Cycle state");
        self.emit(ProgressEvent::StateChanged { state });
    }

    /// Run one cycle to its terminal outcome.
    pub async fn run(&self, task: Task, budget: &Budget) -> CycleOutcome {
        let started = Instant::now();
        let deadline = started
            .checked_add(budget.deadline)
            .unwrap_or_else(|| started + FAR_FUTURE);

        let token = self.cancel.child_token();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                token.cancel();
            })
        };

        tracing::info!(
            task_id = %task.id,
            max_attempts = budget.max_attempts,
            max_spend = budget.max_spend_usd,
            "Starting cycle: {}",
            task.objective
        );
        let outcome = self
            .drive(Arc::new(task), budget, StopSignal::new(token, deadline), started)
            .await;
        timer.abort();

        tracing::info!(
            outcome = %outcome.label(),
            attempts = outcome.attempts_used(),
            cost = outcome.total_cost(),
            "Cycle finished"
        );
        self.emit(ProgressEvent::Complete {
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn drive(
        &self,
        task: Arc<Task>,
        budget: &Budget,
        stop: StopSignal,
        started: Instant,
    ) -> CycleOutcome {
        let mut ledger = CostLedger::new();
        let mut attempts_used: u32 = 0;
        let mut last_verdict: Option<Verdict> = None;

        // ── Retrieving ──
        self.transition(CycleState::Retrieving);
        let skills = if stop.check().is_none() {
            self.retrieve(&task).await
        } else {
            Vec::new()
        };
        self.emit(ProgressEvent::SkillsRetrieved {
            count: skills.len(),
        });
        let mut ctx = Context::new(task.clone()).with_skills(skills);

        let decision = BudgetPolicy::evaluate(0, 0.0, started.elapsed(), budget);
        if let Some(reason) = decision.exhaust_reason() {
            return self.exhausted(reason, attempts_used, &ledger, last_verdict);
        }

        let runner = AttemptRunner::new(
            self.builder.as_ref(),
            self.critic.as_ref(),
            self.executor.as_ref(),
            &self.prompts,
            &self.config,
        );

        loop {
            // ── Attempting ──
            if let Some(interrupt) = stop.check() {
                return self.exhausted(interrupt_reason(interrupt), attempts_used, &ledger, last_verdict);
            }
            self.transition(CycleState::Attempting);
            attempts_used += 1;
            self.emit(ProgressEvent::AttemptStart {
                attempt: attempts_used,
                max_attempts: budget.max_attempts,
            });

            let result = match runner.run(attempts_used, ctx.snapshot(), &stop).await {
                AttemptOutcome::Completed(result) => result,
                AttemptOutcome::Interrupted { cost_usd, reason } => {
                    ledger.charge("attempt", cost_usd);
                    tracing::info!(attempt = attempts_used, ?reason, "Attempt interrupted");
                    return self.exhausted(interrupt_reason(reason), attempts_used, &ledger, last_verdict);
                }
                AttemptOutcome::CapabilityFailure { cost_usd, error } => {
                    ledger.charge("attempt", cost_usd);
                    tracing::error!(attempt = attempts_used, "Capability failure: {}", error);
                    return self.exhausted(
                        ExhaustReason::CapabilityFailure {
                            message: error.to_string(),
                        },
                        attempts_used,
                        &ledger,
                        last_verdict,
                    );
                }
            };

            ledger.charge("attempt", result.cost_usd);
            last_verdict = Some(result.verdict.clone());
            tracing::info!(
                attempt = result.attempt,
                verdict = %result.verdict,
                cost = result.cost_usd,
                spent = ledger.total(),
                "Attempt finished"
            );
            self.emit(ProgressEvent::AttemptEnd {
                attempt: result.attempt,
                verdict: result.verdict.clone(),
                cost: result.cost_usd,
                spent_so_far: ledger.total(),
            });

            // ── Consolidating ──
            if let (true, Some(solution)) = (result.verdict.is_pass(), result.solution.clone()) {
                self.transition(CycleState::Consolidating);
                let consolidator = SkillConsolidator::new(
                    self.store.as_ref(),
                    self.describer.as_deref(),
                    &self.prompts,
                    &self.config.generator_retry,
                    self.config.dedup_threshold,
                );
                let report = consolidator.consolidate(&result, &task, stop.token()).await;
                ledger.charge("describe", report.cost_usd);
                self.emit(ProgressEvent::Consolidated {
                    consolidation: report.consolidation.clone(),
                });
                self.transition(CycleState::Done);
                tracing::debug!(cost = %ledger.summary(), "Cycle spend");
                return CycleOutcome::Solved {
                    solution,
                    attempts_used,
                    total_cost: ledger.total(),
                    consolidation: report.consolidation,
                };
            }

            let decision =
                BudgetPolicy::evaluate(attempts_used, ledger.total(), started.elapsed(), budget);
            if let Some(reason) = decision.exhaust_reason() {
                return self.exhausted(reason, attempts_used, &ledger, last_verdict);
            }

            // ── Reflecting ──
            self.transition(CycleState::Reflecting);
            if let Some(note) = self.composer.compose(&result) {
                self.emit(ProgressEvent::Reflexion {
                    attempt: note.attempt,
                    note_chars: note.text.chars().count(),
                });
                ctx.push_note(note);
            }
        }
    }

    /// Top-K skills for the task. Store failures degrade to no hints.
    async fn retrieve(&self, task: &Task) -> Vec<ScoredSkill> {
        if self.config.top_k == 0 {
            return Vec::new();
        }
        let embedding = match self.store.embed(&retrieval_query(task)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Skill retrieval skipped, embedding failed: {}", e);
                return Vec::new();
            }
        };
        match self.store.query(&embedding, self.config.top_k).await {
            Ok(skills) => {
                tracing::debug!(count = skills.len(), "Retrieved skills");
                skills
            }
            Err(e) => {
                tracing::warn!("Skill retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    fn exhausted(
        &self,
        reason: ExhaustReason,
        attempts_used: u32,
        ledger: &CostLedger,
        last_verdict: Option<Verdict>,
    ) -> CycleOutcome {
        self.transition(CycleState::BudgetExceeded);
        tracing::info!(%reason, attempts = attempts_used, "Cycle exhausted");
        tracing::debug!(cost = %ledger.summary(), "Cycle spend");
        self.transition(CycleState::Done);
        CycleOutcome::Exhausted {
            reason,
            attempts_used,
            total_cost: ledger.total(),
            last_verdict,
        }
    }
}

fn interrupt_reason(interrupt: Interrupt) -> ExhaustReason {
    match interrupt {
        Interrupt::Cancelled => ExhaustReason::Cancelled,
        Interrupt::Deadline => ExhaustReason::Deadline,
    }
}

/// Text embedded to find skills relevant to a task.
pub fn retrieval_query(task: &Task) -> String {
    if task.constraints.is_empty() {
        task.objective.clone()
    } else {
        format!("{}\n{}", task.objective, task.constraints.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_query_plain() {
        assert_eq!(retrieval_query(&Task::new("sort")), "sort");
    }

    #[test]
    fn test_retrieval_query_with_constraints() {
        let task = Task::new("sort").with_constraints(vec!["stable".into(), "in place".into()]);
        assert_eq!(retrieval_query(&task), "sort\nstable\nin place");
    }

    #[test]
    fn test_interrupt_reason_mapping() {
        assert_eq!(interrupt_reason(Interrupt::Cancelled), ExhaustReason::Cancelled);
        assert_eq!(interrupt_reason(Interrupt::Deadline), ExhaustReason::Deadline);
    }
}
