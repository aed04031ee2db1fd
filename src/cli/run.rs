// src/cli/run.rs — Default command: run cycles for one task or a task list

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::arbiter::local::LocalProcessExecutor;
use crate::core::budget::Budget;
use crate::core::curriculum::Curriculum;
use crate::core::orchestrator::Orchestrator;
use crate::core::types::{Consolidation, CycleEngineConfig, CycleOutcome, ExhaustReason, Task};
use crate::infra::config::{Config, LoopConfig};
use crate::memory::embeddings::LocalEmbedder;
use crate::memory::in_memory::InMemorySkillStore;
use crate::memory::store::{CycleRecord, SqliteSkillStore};
use crate::memory::SkillStore;
use crate::provider::openai_compat::{OpenAICompatGenerator, DEFAULT_BASE_URL};
use crate::provider::{Embedder, Generator};

/// How the default command should run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub budget: Budget,
    pub constraints: Vec<String>,
    pub category: Option<String>,
    pub continuous: bool,
    pub ephemeral: bool,
    pub quiet: bool,
}

/// Run one cycle per objective. In continuous mode the list repeats until
/// Ctrl-C, pausing between cycles; with no objectives the critic model sets
/// each task. Otherwise it runs once and fails if the last cycle is not solved.
pub async fn run_tasks(
    objectives: Vec<String>,
    options: RunOptions,
    config: &Config,
) -> anyhow::Result<()> {
    if objectives.is_empty() && !options.continuous {
        anyhow::bail!("No task given. Pass an objective, --stdin, --tasks-file, or --loop.");
    }

    let api_key = api_key(config)?;
    let embedder = embedder_from_config(config, &api_key);

    let history = if options.ephemeral {
        None
    } else {
        Some(Arc::new(open_store(config, embedder.clone())?))
    };
    let store: Arc<dyn SkillStore> = match history {
        Some(ref s) => s.clone() as Arc<dyn SkillStore>,
        None => Arc::new(InMemorySkillStore::new(embedder.clone())),
    };

    let builder: Arc<dyn Generator> = Arc::new(OpenAICompatGenerator::new(
        api_key.clone(),
        &config.models.base_url,
        &config.models.builder,
    ));
    let critic: Arc<dyn Generator> = Arc::new(OpenAICompatGenerator::new(
        api_key.clone(),
        &config.models.base_url,
        &config.models.critic,
    ));
    let executor = Arc::new(LocalProcessExecutor::from_config(&config.executor));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n[interrupt] cancelling...");
                cancel.cancel();
            }
        });
    }

    let engine_config = CycleEngineConfig::from(config);
    let curriculum = objectives.is_empty().then(|| {
        Curriculum::new(
            critic.clone(),
            config.continuous.difficulty,
            engine_config.generator_retry.clone(),
        )
    });
    let mut orchestrator =
        Orchestrator::new(builder, critic, executor, store, engine_config.clone())
            .with_cancellation(cancel.clone());
    if engine_config.describe_skills {
        let model = config
            .models
            .describer
            .as_deref()
            .unwrap_or(&config.models.builder);
        orchestrator = orchestrator.with_describer(Arc::new(OpenAICompatGenerator::new(
            api_key.clone(),
            &config.models.base_url,
            model,
        )));
    }
    if !options.quiet {
        orchestrator = orchestrator.with_progress(super::progress::terminal_progress());
    }

    let mut last: Option<CycleOutcome> = None;
    'cycles: loop {
        let tasks = match curriculum {
            Some(ref curriculum) => match curriculum.next_task(&cancel).await {
                Ok(generated) => vec![generated.task],
                Err(e) => {
                    tracing::warn!("Task generation failed: {}", e);
                    if cancel.is_cancelled()
                        || !pause(config.continuous.error_pause(), &cancel).await
                    {
                        break 'cycles;
                    }
                    continue;
                }
            },
            None => objectives.iter().map(|o| build_task(o, &options)).collect(),
        };

        for task in tasks {
            if cancel.is_cancelled() {
                break 'cycles;
            }
            if !options.quiet {
                eprintln!("[task] {}", truncate_objective(&task.objective, 60));
            }

            let record_task = task.clone();
            let outcome = orchestrator.run(task, &options.budget).await;

            if let CycleOutcome::Solved { ref solution, .. } = outcome {
                println!("{}", solution.code);
            }
            if let Some(ref s) = history {
                if let Err(e) = s.record_cycle(&cycle_record(&record_task, &outcome)) {
                    tracing::warn!("Failed to record cycle: {}", e);
                }
            }
            let wait = pause_after(&outcome, &config.continuous);
            last = Some(outcome);

            if options.continuous && !pause(wait, &cancel).await {
                break 'cycles;
            }
        }
        if !options.continuous {
            break;
        }
    }

    match last {
        Some(outcome) if !options.continuous && !outcome.is_solved() => {
            anyhow::bail!("No passing solution ({})", outcome.label())
        }
        _ => Ok(()),
    }
}

/// API key from the configured environment variable. Only the hosted default
/// endpoint requires one; local OpenAI-compatible servers accept an empty key.
pub fn api_key(config: &Config) -> anyhow::Result<String> {
    match std::env::var(&config.models.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ if config.models.base_url.trim_end_matches('/') == DEFAULT_BASE_URL => {
            anyhow::bail!(
                "{} is not set. Export it or point [models].base_url at a local server.",
                config.models.api_key_env
            )
        }
        _ => Ok(String::new()),
    }
}

pub fn embedder_from_config(config: &Config, api_key: &str) -> Arc<dyn Embedder> {
    if config.models.uses_local_embedder() {
        Arc::new(LocalEmbedder::default())
    } else {
        Arc::new(OpenAICompatGenerator::new(
            api_key.to_string(),
            &config.models.base_url,
            &config.models.embedder,
        ))
    }
}

pub fn open_store(config: &Config, embedder: Arc<dyn Embedder>) -> anyhow::Result<SqliteSkillStore> {
    let path = config.memory.resolved_db_path();
    tracing::debug!(path = %path.display(), "Opening skill store");
    SqliteSkillStore::open(&path, embedder)
        .map_err(|e| anyhow::anyhow!("Cannot open skill store at {}: {}", path.display(), e))
}

/// Objectives from a task file: one per line, blank lines and `#` comments skipped.
pub fn load_task_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Pause before the next continuous cycle. Capability failures back off longer.
fn pause_after(outcome: &CycleOutcome, settings: &LoopConfig) -> Duration {
    match outcome {
        CycleOutcome::Exhausted {
            reason: ExhaustReason::CapabilityFailure { .. },
            ..
        } => settings.error_pause(),
        _ => settings.pause(),
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

fn build_task(objective: &str, options: &RunOptions) -> Task {
    let task = Task::new(objective).with_constraints(options.constraints.clone());
    match options.category {
        Some(ref category) => task.with_category(category.clone()),
        None => task,
    }
}

pub fn cycle_record(task: &Task, outcome: &CycleOutcome) -> CycleRecord {
    let skill_id = match outcome {
        CycleOutcome::Solved {
            consolidation:
                Consolidation::Inserted { skill_id } | Consolidation::Reinforced { skill_id, .. },
            ..
        } => Some(*skill_id),
        _ => None,
    };
    CycleRecord {
        id: uuid::Uuid::new_v4().to_string(),
        task_id: task.id.clone(),
        objective: task.objective.clone(),
        outcome: outcome.label(),
        attempts: outcome.attempts_used(),
        cost_usd: outcome.total_cost(),
        skill_id,
        created_at: Utc::now(),
    }
}

fn truncate_objective(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or(s);
    if first_line.chars().count() > max {
        let truncated: String = first_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}
