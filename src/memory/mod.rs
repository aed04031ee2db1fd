// src/memory/mod.rs — Skill memory: types, store capability, ranking

pub mod embeddings;
pub mod in_memory;
pub mod schema;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::types::Artifact;
use crate::infra::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillId(pub Uuid);

impl SkillId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| StoreError::NotFound { id: s.to_string() })
    }
}

impl Default for SkillId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Times this skill was produced again (or reused) by a passing cycle.
    pub success_count: u32,
}

impl Default for SkillMetadata {
    fn default() -> Self {
        Self {
            category: None,
            tags: Vec::new(),
            created_at: Utc::now(),
            success_count: 1,
        }
    }
}

/// A verified solution kept for future retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub description: String,
    pub solution: Artifact,
    pub embedding: Vec<f32>,
    pub metadata: SkillMetadata,
}

/// A skill with its similarity to the query that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSkill {
    pub skill: Skill,
    pub similarity: f32,
}

/// Persistent, shared skill memory.
///
/// Shared by concurrent cycles. Implementations guard their own state;
/// callers never hold a store lock across an await.
#[async_trait]
pub trait SkillStore: Send + Sync {
    /// Embed text in the vector space the store searches.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    /// Up to `k` skills by descending similarity, ties newest first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredSkill>, StoreError>;

    /// Insert the skill, replacing any skill with the same id.
    async fn upsert(&self, skill: Skill) -> Result<SkillId, StoreError>;

    /// Increment the skill's success counter.
    async fn reinforce(&self, id: &SkillId) -> Result<(), StoreError>;
}

/// Score every skill against `query` and keep the best `k`.
pub fn rank_skills<'a>(
    skills: impl IntoIterator<Item = &'a Skill>,
    query: &[f32],
    k: usize,
) -> Vec<ScoredSkill> {
    let mut scored: Vec<ScoredSkill> = skills
        .into_iter()
        .map(|skill| ScoredSkill {
            similarity: embeddings::cosine_similarity(&skill.embedding, query),
            skill: skill.clone(),
        })
        .collect();
    sort_scored(&mut scored);
    scored.truncate(k);
    scored
}

/// Descending similarity; equal scores put the most recently created first.
pub fn sort_scored(scored: &mut [ScoredSkill]) {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.skill.metadata.created_at.cmp(&a.skill.metadata.created_at))
    });
}
