// src/core/types.rs — Core domain types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::memory::{ScoredSkill, SkillId};
use crate::provider::retry::RetryConfig;

/// Immutable description of what a cycle must build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub objective: String,
    pub constraints: Vec<String>,
    pub category: Option<String>,
}

impl Task {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            objective: objective.into(),
            constraints: Vec::new(),
            category: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Content hash identifying a generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn of(content: &str) -> Self {
        Self(hex::encode(Sha256::digest(content.as_bytes())))
    }

    /// First 12 hex characters, enough to tell attempts apart in prompts and logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Sanitized code text plus its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub code: String,
}

impl Artifact {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: ArtifactId::of(&code),
            code,
        }
    }
}

/// Outcome of executing a solution against its adversarial tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { exit_code: i32, stderr_excerpt: String },
    Crash { reason: String },
    Timeout,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail { .. } => "fail",
            Verdict::Crash { .. } => "crash",
            Verdict::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Fail { exit_code, .. } => write!(f, "fail(exit={})", exit_code),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Output of one build → attack → judge attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    /// 1-based attempt number within the cycle.
    pub attempt: u32,
    pub solution: Option<Artifact>,
    pub tests: Option<Artifact>,
    pub verdict: Verdict,
    pub cost_usd: f64,
    /// Set when the verdict did not come from a normal execution
    /// (malformed output, capability unavailable after retries).
    pub synthetic_note: Option<String>,
    pub duration: Duration,
}

impl AttemptResult {
    pub fn solution_id(&self) -> Option<&ArtifactId> {
        self.solution.as_ref().map(|a| &a.id)
    }
}

/// Critique of a failed attempt, fed to the next builder call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflexionNote {
    pub attempt: u32,
    pub solution_id: Option<ArtifactId>,
    pub text: String,
}

/// Working memory for one cycle.
///
/// Owned by the orchestrator. Attempt runners only ever see a snapshot.
#[derive(Debug, Clone)]
pub struct Context {
    pub task: Arc<Task>,
    pub skills: Vec<ScoredSkill>,
    notes: Vec<ReflexionNote>,
}

impl Context {
    pub fn new(task: Arc<Task>) -> Self {
        Self {
            task,
            skills: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_skills(mut self, skills: Vec<ScoredSkill>) -> Self {
        self.skills = skills;
        self
    }

    /// Append-only: one note per failed attempt, never evicted.
    pub fn push_note(&mut self, note: ReflexionNote) {
        self.notes.push(note);
    }

    /// Notes oldest first.
    pub fn notes(&self) -> impl Iterator<Item = &ReflexionNote> {
        self.notes.iter()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn snapshot(&self) -> Context {
        self.clone()
    }
}

/// Why a cycle stopped without a passing solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExhaustReason {
    Attempts,
    Spend,
    Deadline,
    Cancelled,
    CapabilityFailure { message: String },
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustReason::Attempts => write!(f, "attempts"),
            ExhaustReason::Spend => write!(f, "spend"),
            ExhaustReason::Deadline => write!(f, "deadline"),
            ExhaustReason::Cancelled => write!(f, "cancelled"),
            ExhaustReason::CapabilityFailure { message } => {
                write!(f, "capability-failure: {}", message)
            }
        }
    }
}

/// What happened to the winning solution in the skill store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Consolidation {
    Inserted { skill_id: SkillId },
    Reinforced { skill_id: SkillId, similarity: f32 },
    /// The store write failed; the cycle is still solved.
    Skipped { reason: String },
}

/// Terminal record of a cycle. Exactly one is produced per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Solved {
        solution: Artifact,
        attempts_used: u32,
        total_cost: f64,
        consolidation: Consolidation,
    },
    Exhausted {
        reason: ExhaustReason,
        attempts_used: u32,
        total_cost: f64,
        last_verdict: Option<Verdict>,
    },
}

impl CycleOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, CycleOutcome::Solved { .. })
    }

    pub fn attempts_used(&self) -> u32 {
        match self {
            CycleOutcome::Solved { attempts_used, .. }
            | CycleOutcome::Exhausted { attempts_used, .. } => *attempts_used,
        }
    }

    pub fn total_cost(&self) -> f64 {
        match self {
            CycleOutcome::Solved { total_cost, .. }
            | CycleOutcome::Exhausted { total_cost, .. } => *total_cost,
        }
    }

    /// Short label for logs and history rows: "solved" or the exhaust reason.
    pub fn label(&self) -> String {
        match self {
            CycleOutcome::Solved { .. } => "solved".into(),
            CycleOutcome::Exhausted { reason, .. } => match reason {
                ExhaustReason::CapabilityFailure { .. } => "capability-failure".into(),
                other => other.to_string(),
            },
        }
    }
}

/// States of the cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Retrieving,
    Attempting,
    Reflecting,
    Consolidating,
    BudgetExceeded,
    Done,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Retrieving => "retrieving",
            CycleState::Attempting => "attempting",
            CycleState::Reflecting => "reflecting",
            CycleState::Consolidating => "consolidating",
            CycleState::BudgetExceeded => "budget-exceeded",
            CycleState::Done => "done",
        };
        write!(f, "{}", s)
    }
}

/// Progress events emitted during a cycle for real-time display.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StateChanged {
        state: CycleState,
    },
    SkillsRetrieved {
        count: usize,
    },
    AttemptStart {
        attempt: u32,
        max_attempts: u32,
    },
    AttemptEnd {
        attempt: u32,
        verdict: Verdict,
        cost: f64,
        spent_so_far: f64,
    },
    Reflexion {
        attempt: u32,
        note_chars: usize,
    },
    Consolidated {
        consolidation: Consolidation,
    },
    Complete {
        outcome: CycleOutcome,
    },
}

/// Tunables of the cycle engine that are not part of the per-cycle budget.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleEngineConfig {
    /// Number of skills retrieved as hints.
    pub top_k: usize,
    /// Similarity at or above which a new skill reinforces an existing one.
    pub dedup_threshold: f32,
    /// Hard upper bound on reflexion note length, in characters.
    pub note_cap_chars: usize,
    pub execution_timeout: Duration,
    pub generator_retry: RetryConfig,
    pub executor_retry: RetryConfig,
    /// Ask the generator for a skill description instead of using the objective.
    pub describe_skills: bool,
}

impl Default for CycleEngineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            dedup_threshold: 0.92,
            note_cap_chars: 1_200,
            execution_timeout: Duration::from_secs(30),
            generator_retry: RetryConfig::default(),
            executor_retry: RetryConfig::for_executor(),
            describe_skills: true,
        }
    }
}

impl From<&crate::infra::config::Config> for CycleEngineConfig {
    fn from(cfg: &crate::infra::config::Config) -> Self {
        Self {
            top_k: cfg.retrieval.top_k,
            dedup_threshold: cfg.retrieval.dedup_threshold,
            note_cap_chars: cfg.reflexion.note_cap_chars,
            execution_timeout: Duration::from_secs(cfg.executor.timeout_seconds),
            generator_retry: cfg.retry.generator(),
            executor_retry: cfg.retry.executor(),
            describe_skills: cfg.memory.describe_skills,
        }
    }
}
