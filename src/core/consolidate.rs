// src/core/consolidate.rs — Distill a passing attempt into a stored skill

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::prompts::PromptBuilder;
use super::sanitize::sanitize_description;
use super::types::{AttemptResult, Consolidation, Task};
use crate::memory::{Skill, SkillId, SkillMetadata, SkillStore};
use crate::provider::retry::{retry_transient, RetryConfig};
use crate::provider::Generator;

const DESCRIPTION_MAX_CHARS: usize = 300;

/// Result of consolidating one winning attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationReport {
    pub consolidation: Consolidation,
    /// Spend on the description call, if any.
    pub cost_usd: f64,
}

/// Persists winning solutions while keeping the store free of near-duplicates.
///
/// If the closest existing skill scores at or above the dedup threshold the
/// existing skill is reinforced and nothing new is inserted. Store failures
/// are logged and reported as `Skipped`; they never fail the cycle.
pub struct SkillConsolidator<'a> {
    store: &'a dyn SkillStore,
    describer: Option<&'a dyn Generator>,
    prompts: &'a PromptBuilder,
    retry: &'a RetryConfig,
    dedup_threshold: f32,
}

impl<'a> SkillConsolidator<'a> {
    pub fn new(
        store: &'a dyn SkillStore,
        describer: Option<&'a dyn Generator>,
        prompts: &'a PromptBuilder,
        retry: &'a RetryConfig,
        dedup_threshold: f32,
    ) -> Self {
        Self {
            store,
            describer,
            prompts,
            retry,
            dedup_threshold,
        }
    }

    pub async fn consolidate(
        &self,
        result: &AttemptResult,
        task: &Task,
        cancel: &CancellationToken,
    ) -> ConsolidationReport {
        let solution = match (&result.solution, result.verdict.is_pass()) {
            (Some(solution), true) => solution,
            _ => {
                return ConsolidationReport {
                    consolidation: Consolidation::Skipped {
                        reason: "attempt did not pass".into(),
                    },
                    cost_usd: 0.0,
                }
            }
        };

        let (description, cost_usd) = self.describe(task, result, cancel).await;
        let skipped = |reason: String| ConsolidationReport {
            consolidation: Consolidation::Skipped { reason },
            cost_usd,
        };

        let embedding = match self
            .store
            .embed(&format!("{}\n{}", description, solution.code))
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Skill embedding failed, not storing: {}", e);
                return skipped(e.to_string());
            }
        };

        match self.store.query(&embedding, 1).await {
            Ok(hits) => {
                if let Some(best) = hits.into_iter().next() {
                    if best.similarity >= self.dedup_threshold {
                        let id = best.skill.id;
                        return match self.store.reinforce(&id).await {
                            Ok(()) => {
                                tracing::info!(
                                    skill_id = %id,
                                    similarity = best.similarity,
                                    "Reinforced existing skill"
                                );
                                ConsolidationReport {
                                    consolidation: Consolidation::Reinforced {
                                        skill_id: id,
                                        similarity: best.similarity,
                                    },
                                    cost_usd,
                                }
                            }
                            Err(e) => {
                                tracing::warn!(skill_id = %id, "Skill reinforcement failed: {}", e);
                                skipped(e.to_string())
                            }
                        };
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Dedup query failed, inserting without dedup: {}", e);
            }
        }

        let skill = Skill {
            id: SkillId::new(),
            name: skill_name(task),
            description,
            solution: solution.clone(),
            embedding,
            metadata: SkillMetadata {
                category: task.category.clone(),
                tags: vec!["verified".into(), "auto-generated".into()],
                created_at: Utc::now(),
                success_count: 1,
            },
        };
        match self.store.upsert(skill).await {
            Ok(id) => {
                tracing::info!(skill_id = %id, "Stored new skill");
                ConsolidationReport {
                    consolidation: Consolidation::Inserted { skill_id: id },
                    cost_usd,
                }
            }
            Err(e) => {
                tracing::warn!("Skill upsert failed: {}", e);
                skipped(e.to_string())
            }
        }
    }

    /// Generated one-line description, or the objective-based fallback.
    async fn describe(
        &self,
        task: &Task,
        result: &AttemptResult,
        cancel: &CancellationToken,
    ) -> (String, f64) {
        let fallback = fallback_description(task);
        let (Some(describer), Some(solution)) = (self.describer, result.solution.as_ref()) else {
            return (fallback, 0.0);
        };
        let request = match self.prompts.describe_request(task, solution) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Describe prompt failed: {}", e);
                return (fallback, 0.0);
            }
        };

        let generated = retry_transient(self.retry, "describe", cancel, || {
            let request = request.clone();
            async move { describer.generate(request).await }
        })
        .await;

        match generated {
            Ok(g) => {
                let description =
                    sanitize_description(&g.text, DESCRIPTION_MAX_CHARS).unwrap_or(fallback);
                (description, g.cost_usd)
            }
            Err(e) => {
                tracing::warn!("Skill description failed, using fallback: {}", e.into_error());
                (fallback, 0.0)
            }
        }
    }
}

pub fn skill_name(task: &Task) -> String {
    let prefix: String = task.id.chars().take(8).collect();
    format!("skill_{}", prefix)
}

pub fn fallback_description(task: &Task) -> String {
    format!("Solution for: {}", task.objective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Artifact, Verdict};
    use crate::infra::errors::{GenerationError, StoreError};
    use crate::memory::in_memory::InMemorySkillStore;
    use crate::memory::ScoredSkill;
    use crate::provider::{Generation, GenerationRequest};
    use async_trait::async_trait;
    use std::time::Duration;

    fn passing(code: &str) -> AttemptResult {
        AttemptResult {
            attempt: 1,
            solution: Some(Artifact::new(code)),
            tests: Some(Artifact::new("assert True")),
            verdict: Verdict::Pass,
            cost_usd: 0.0,
            synthetic_note: None,
            duration: Duration::ZERO,
        }
    }

    struct Describer(Result<Generation, GenerationError>);

    #[async_trait]
    impl Generator for Describer {
        fn id(&self) -> &str {
            "describer"
        }

        async fn generate(&self, _r: GenerationRequest) -> Result<Generation, GenerationError> {
            self.0.clone()
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SkillStore for BrokenStore {
        async fn embed(&self, _t: &str) -> Result<Vec<f32>, StoreError> {
            Ok(vec![1.0])
        }
        async fn query(&self, _e: &[f32], _k: usize) -> Result<Vec<ScoredSkill>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn upsert(&self, _s: Skill) -> Result<SkillId, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn reinforce(&self, _id: &SkillId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_inserts_new_skill() {
        let store = InMemorySkillStore::default();
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let consolidator = SkillConsolidator::new(&store, None, &prompts, &retry, 0.92);
        let task = Task::new("sum a list of integers").with_category("lists");

        let report = consolidator
            .consolidate(&passing("def s(xs): return sum(xs)"), &task, &CancellationToken::new())
            .await;
        let Consolidation::Inserted { skill_id } = report.consolidation else {
            panic!("expected insert, got {:?}", report.consolidation);
        };
        let skill = store.get(&skill_id).unwrap();
        assert_eq!(skill.name, skill_name(&task));
        assert_eq!(skill.description, "Solution for: sum a list of integers");
        assert_eq!(skill.metadata.tags, vec!["verified", "auto-generated"]);
        assert_eq!(skill.metadata.category.as_deref(), Some("lists"));
        assert_eq!(report.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_duplicate_is_reinforced() {
        let store = InMemorySkillStore::default();
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let consolidator = SkillConsolidator::new(&store, None, &prompts, &retry, 0.92);
        let task = Task::new("sum a list of integers");
        let result = passing("def s(xs): return sum(xs)");
        let cancel = CancellationToken::new();

        let first = consolidator.consolidate(&result, &task, &cancel).await;
        let second = consolidator.consolidate(&result, &task, &cancel).await;

        let Consolidation::Inserted { skill_id } = first.consolidation else {
            panic!("expected insert");
        };
        assert!(matches!(
            second.consolidation,
            Consolidation::Reinforced { skill_id: id, .. } if id == skill_id
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&skill_id).unwrap().metadata.success_count, 2);
    }

    #[tokio::test]
    async fn test_generated_description_used_and_charged() {
        let store = InMemorySkillStore::default();
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let describer = Describer(Ok(Generation::new("Sums integers in a list.\n\nMore.", 0.004)));
        let consolidator =
            SkillConsolidator::new(&store, Some(&describer), &prompts, &retry, 0.92);
        let task = Task::new("sum");

        let report = consolidator
            .consolidate(&passing("def s(xs): return sum(xs)"), &task, &CancellationToken::new())
            .await;
        let Consolidation::Inserted { skill_id } = report.consolidation else {
            panic!("expected insert");
        };
        assert_eq!(store.get(&skill_id).unwrap().description, "Sums integers in a list.");
        assert!((report.cost_usd - 0.004).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_describer_failure_falls_back() {
        let store = InMemorySkillStore::default();
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let describer = Describer(Err(GenerationError::Permanent {
            provider: "describer".into(),
            message: "bad".into(),
        }));
        let consolidator =
            SkillConsolidator::new(&store, Some(&describer), &prompts, &retry, 0.92);
        let task = Task::new("reverse a string");

        let report = consolidator
            .consolidate(&passing("def r(s): return s[::-1]"), &task, &CancellationToken::new())
            .await;
        let Consolidation::Inserted { skill_id } = report.consolidation else {
            panic!("expected insert");
        };
        assert_eq!(
            store.get(&skill_id).unwrap().description,
            "Solution for: reverse a string"
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_skipped() {
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let consolidator = SkillConsolidator::new(&BrokenStore, None, &prompts, &retry, 0.92);
        let report = consolidator
            .consolidate(&passing("x = 1"), &Task::new("t"), &CancellationToken::new())
            .await;
        assert!(matches!(report.consolidation, Consolidation::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_non_pass_is_not_stored() {
        let store = InMemorySkillStore::default();
        let prompts = PromptBuilder::new();
        let retry = RetryConfig::none();
        let consolidator = SkillConsolidator::new(&store, None, &prompts, &retry, 0.92);
        let mut result = passing("x = 1");
        result.verdict = Verdict::Timeout;
        let report = consolidator
            .consolidate(&result, &Task::new("t"), &CancellationToken::new())
            .await;
        assert!(matches!(report.consolidation, Consolidation::Skipped { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_skill_name_uses_task_prefix() {
        let mut task = Task::new("t");
        task.id = "0123456789abcdef".into();
        assert_eq!(skill_name(&task), "skill_01234567");
    }
}
