// src/cli/skills.rs — Browse and search the skill library

use std::sync::Arc;

use crate::infra::config::Config;
use crate::memory::embeddings::LocalEmbedder;
use crate::memory::{ScoredSkill, Skill, SkillStore};

pub async fn list_skills(config: &Config, limit: u32) -> anyhow::Result<()> {
    if !config.memory.resolved_db_path().exists() {
        println!("No skills learned yet.");
        return Ok(());
    }
    let store = super::run::open_store(config, Arc::new(LocalEmbedder::default()))?;
    let skills = store.list_skills(limit)?;
    if skills.is_empty() {
        println!("No skills learned yet.");
        return Ok(());
    }
    for skill in &skills {
        println!("{}", format_skill(skill, None));
    }
    Ok(())
}

/// Rank stored skills against `query` with the configured embedder.
pub async fn search_skills(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k).max(1);
    let api_key = if config.models.uses_local_embedder() {
        String::new()
    } else {
        super::run::api_key(config)?
    };
    let embedder = super::run::embedder_from_config(config, &api_key);
    let store = super::run::open_store(config, embedder)?;

    let embedding = store.embed(query).await?;
    let hits: Vec<ScoredSkill> = store.query(&embedding, k).await?;
    if hits.is_empty() {
        println!("No matching skills.");
        return Ok(());
    }
    for hit in &hits {
        println!("{}", format_skill(&hit.skill, Some(hit.similarity)));
    }
    Ok(())
}

fn format_skill(skill: &Skill, similarity: Option<f32>) -> String {
    let score = similarity
        .map(|s| format!(" [{:.2}]", s))
        .unwrap_or_default();
    let category = skill
        .metadata
        .category
        .as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default();
    format!(
        "{}{}{}  x{}  {}\n    {}",
        skill.name,
        score,
        category,
        skill.metadata.success_count,
        skill.id,
        skill.description
    )
}
