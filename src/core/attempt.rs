// src/core/attempt.rs — One build → attack → judge attempt

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::prompts::PromptBuilder;
use super::sanitize::sanitize_code;
use super::types::{Artifact, AttemptResult, Context, CycleEngineConfig, Verdict};
use crate::arbiter::{ExecutionRequest, Executor};
use crate::infra::errors::GenerationError;
use crate::provider::retry::{retry_transient, RetryFailure};
use crate::provider::{Generation, GenerationRequest, Generator, ResponseHint};

/// Exit code recorded on verdicts synthesized without running anything.
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// Why an attempt stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    Deadline,
}

/// Cooperative stop condition for a cycle: external cancellation or the
/// wall-clock deadline, whichever comes first.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
    deadline: Instant,
}

impl StopSignal {
    pub fn new(token: CancellationToken, deadline: Instant) -> Self {
        Self { token, deadline }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// `Some` once the cycle should stop at the next suspension point.
    pub fn check(&self) -> Option<Interrupt> {
        if Instant::now() >= self.deadline {
            Some(Interrupt::Deadline)
        } else if self.token.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else {
            None
        }
    }

    /// Reason to report once the token has fired.
    pub fn reason(&self) -> Interrupt {
        self.check().unwrap_or(Interrupt::Cancelled)
    }
}

/// How an attempt ended.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// A verdict was reached, real or synthetic.
    Completed(AttemptResult),
    /// Stopped at a suspension point before a verdict.
    Interrupted { cost_usd: f64, reason: Interrupt },
    /// A generator failed in a way no retry can fix.
    CapabilityFailure {
        cost_usd: f64,
        error: GenerationError,
    },
}

/// Drives one attempt against the capabilities. Holds no cycle state.
pub struct AttemptRunner<'a> {
    builder: &'a dyn Generator,
    critic: &'a dyn Generator,
    executor: &'a dyn Executor,
    prompts: &'a PromptBuilder,
    config: &'a CycleEngineConfig,
}

/// Internal early exit from the build or attack phase.
enum Phase {
    Interrupted(Interrupt),
    Fatal(GenerationError),
    Unavailable(String),
}

impl<'a> AttemptRunner<'a> {
    pub fn new(
        builder: &'a dyn Generator,
        critic: &'a dyn Generator,
        executor: &'a dyn Executor,
        prompts: &'a PromptBuilder,
        config: &'a CycleEngineConfig,
    ) -> Self {
        Self {
            builder,
            critic,
            executor,
            prompts,
            config,
        }
    }

    /// Run attempt number `attempt` (1-based) on a snapshot of the context.
    pub async fn run(&self, attempt: u32, ctx: Context, stop: &StopSignal) -> AttemptOutcome {
        let started = Instant::now();
        let mut cost = 0.0;

        let synthetic = |solution: Option<Artifact>,
                         tests: Option<Artifact>,
                         note: String,
                         verdict: Verdict,
                         cost: f64|
         -> AttemptOutcome {
            AttemptOutcome::Completed(AttemptResult {
                attempt,
                solution,
                tests,
                verdict,
                cost_usd: cost,
                synthetic_note: Some(note),
                duration: started.elapsed(),
            })
        };
        let synthetic_fail = |detail: &str| Verdict::Fail {
            exit_code: SYNTHETIC_EXIT_CODE,
            stderr_excerpt: detail.to_string(),
        };

        // ── Build ──
        let request = match self.prompts.build_request(&ctx) {
            Ok(r) => r,
            Err(error) => return AttemptOutcome::CapabilityFailure { cost_usd: cost, error },
        };
        let generation = match self.generate(self.builder, request, "build", stop).await {
            Ok(g) => g,
            Err(phase) => return self.phase_exit(phase, None, cost, &synthetic, &synthetic_fail),
        };
        cost += generation.cost_usd;

        let solution = match sanitize_code(&generation.text, ResponseHint::Solution) {
            Ok(code) => Artifact::new(code),
            Err(malformed) => {
                tracing::warn!(attempt, "Builder output rejected: {}", malformed);
                let note = format!("Malformed output: {}.", malformed);
                return synthetic(None, None, note.clone(), synthetic_fail(&note), cost);
            }
        };
        tracing::debug!(attempt, solution = %solution.id, chars = solution.code.len(), "Solution built");

        // ── Attack ──
        let request = match self.prompts.attack_request(&ctx, &solution) {
            Ok(r) => r,
            Err(error) => return AttemptOutcome::CapabilityFailure { cost_usd: cost, error },
        };
        let generation = match self.generate(self.critic, request, "attack", stop).await {
            Ok(g) => g,
            Err(phase) => {
                return self.phase_exit(phase, Some(solution), cost, &synthetic, &synthetic_fail)
            }
        };
        cost += generation.cost_usd;

        let tests = match sanitize_code(&generation.text, ResponseHint::Tests) {
            Ok(code) => Artifact::new(code),
            Err(malformed) => {
                tracing::warn!(attempt, "Critic output rejected: {}", malformed);
                let note = format!("Malformed test output: {}.", malformed);
                return synthetic(Some(solution), None, note.clone(), synthetic_fail(&note), cost);
            }
        };
        tracing::debug!(attempt, tests = %tests.id, chars = tests.code.len(), "Tests generated");

        // ── Judge ──
        if let Some(reason) = stop.check() {
            return AttemptOutcome::Interrupted { cost_usd: cost, reason };
        }
        let request = ExecutionRequest {
            solution,
            tests,
            timeout: self.config.execution_timeout,
        };
        let executor = self.executor;
        let executed = retry_transient(&self.config.executor_retry, "execute", stop.token(), || {
            executor.execute(&request)
        })
        .await;

        let ExecutionRequest { solution, tests, .. } = request;
        match executed {
            Ok(verdict) => AttemptOutcome::Completed(AttemptResult {
                attempt,
                solution: Some(solution),
                tests: Some(tests),
                verdict,
                cost_usd: cost,
                synthetic_note: None,
                duration: started.elapsed(),
            }),
            Err(RetryFailure::Cancelled { .. }) => AttemptOutcome::Interrupted {
                cost_usd: cost,
                reason: stop.reason(),
            },
            Err(RetryFailure::Exhausted { last, .. }) | Err(RetryFailure::Fatal(last)) => {
                tracing::warn!(attempt, "Executor unavailable, recording timeout: {}", last);
                let note = format!("Execution environment unavailable: {}.", last.message);
                synthetic(Some(solution), Some(tests), note, Verdict::Timeout, cost)
            }
        }
    }

    async fn generate(
        &self,
        generator: &dyn Generator,
        request: GenerationRequest,
        label: &str,
        stop: &StopSignal,
    ) -> Result<Generation, Phase> {
        if let Some(reason) = stop.check() {
            return Err(Phase::Interrupted(reason));
        }
        let result = retry_transient(&self.config.generator_retry, label, stop.token(), || {
            let request = request.clone();
            async move { generator.generate(request).await }
        })
        .await;

        match result {
            Ok(generation) => Ok(generation),
            Err(RetryFailure::Fatal(e)) => Err(Phase::Fatal(e)),
            Err(RetryFailure::Exhausted { last, tries }) => Err(Phase::Unavailable(format!(
                "The {} step failed {} times in a row: {}.",
                label, tries, last
            ))),
            Err(RetryFailure::Cancelled { .. }) => Err(Phase::Interrupted(stop.reason())),
        }
    }

    fn phase_exit<S, F>(
        &self,
        phase: Phase,
        solution: Option<Artifact>,
        cost: f64,
        synthetic: &S,
        synthetic_fail: &F,
    ) -> AttemptOutcome
    where
        S: Fn(Option<Artifact>, Option<Artifact>, String, Verdict, f64) -> AttemptOutcome,
        F: Fn(&str) -> Verdict,
    {
        match phase {
            Phase::Interrupted(reason) => AttemptOutcome::Interrupted {
                cost_usd: cost,
                reason,
            },
            Phase::Fatal(error) => AttemptOutcome::CapabilityFailure {
                cost_usd: cost,
                error,
            },
            Phase::Unavailable(note) => synthetic(solution, None, note.clone(), synthetic_fail(&note), cost),
        }
    }
}
