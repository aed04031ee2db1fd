// src/core/curriculum.rs — Self-generated tasks for continuous runs without input

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use super::prompts::PromptBuilder;
use super::sanitize::sanitize_description;
use super::types::Task;
use crate::infra::errors::GenerationError;
use crate::provider::retry::{retry_transient, RetryConfig};
use crate::provider::Generator;

const OBJECTIVE_MAX_CHARS: usize = 1_000;
const RECENT_KEPT: usize = 5;

/// Category recorded on skills learned from generated tasks.
pub const CURRICULUM_CATEGORY: &str = "curriculum";

/// A task proposed by the curriculum generator.
#[derive(Debug, Clone)]
pub struct GeneratedTask {
    pub task: Task,
    pub cost_usd: f64,
}

/// Asks a generator for the next challenge at a fixed difficulty.
///
/// The last few objectives are fed back into the prompt so consecutive
/// challenges differ.
pub struct Curriculum {
    generator: Arc<dyn Generator>,
    prompts: PromptBuilder,
    retry: RetryConfig,
    difficulty: u8,
    recent: Mutex<VecDeque<String>>,
}

impl Curriculum {
    pub fn new(generator: Arc<dyn Generator>, difficulty: u8, retry: RetryConfig) -> Self {
        Self {
            generator,
            prompts: PromptBuilder::new(),
            retry,
            difficulty: difficulty.clamp(1, 10),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub async fn next_task(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GeneratedTask, GenerationError> {
        let request = self
            .prompts
            .curriculum_request(self.difficulty, &self.recent_objectives())?;

        let generation = retry_transient(&self.retry, "curriculum", cancel, || {
            let request = request.clone();
            async move { self.generator.generate(request).await }
        })
        .await
        .map_err(|e| e.into_error())?;

        let objective = sanitize_description(&generation.text, OBJECTIVE_MAX_CHARS).ok_or_else(
            || GenerationError::Permanent {
                provider: self.generator.id().to_string(),
                message: "curriculum reply was empty".into(),
            },
        )?;
        self.remember(&objective);
        tracing::info!(
            difficulty = self.difficulty,
            cost = generation.cost_usd,
            "Generated task: {}",
            objective
        );

        Ok(GeneratedTask {
            task: Task::new(objective).with_category(CURRICULUM_CATEGORY),
            cost_usd: generation.cost_usd,
        })
    }

    fn recent_objectives(&self) -> Vec<String> {
        match self.recent.lock() {
            Ok(recent) => recent.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn remember(&self, objective: &str) {
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == RECENT_KEPT {
                recent.pop_front();
            }
            recent.push_back(objective.to_string());
        }
    }
}
