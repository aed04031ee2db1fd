// src/memory/in_memory.rs — Process-local skill store

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{rank_skills, ScoredSkill, Skill, SkillId, SkillStore};
use crate::infra::errors::StoreError;
use crate::memory::embeddings::LocalEmbedder;
use crate::provider::Embedder;

/// Skill store kept entirely in memory. Used for `--ephemeral` runs and tests.
pub struct InMemorySkillStore {
    skills: Mutex<Vec<Skill>>,
    embedder: Arc<dyn Embedder>,
}

impl Default for InMemorySkillStore {
    fn default() -> Self {
        Self::new(Arc::new(LocalEmbedder::default()))
    }
}

impl InMemorySkillStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            skills: Mutex::new(Vec::new()),
            embedder,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &SkillId) -> Option<Skill> {
        self.lock()
            .ok()
            .and_then(|s| s.iter().find(|sk| &sk.id == id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Skill>>, StoreError> {
        self.skills
            .lock()
            .map_err(|_| StoreError::Unavailable("skill list lock poisoned".into()))
    }
}

#[async_trait]
impl SkillStore for InMemorySkillStore {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vectors = self
            .embedder
            .embed(&[text])
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| StoreError::Embedding("embedder returned no vector".into()))
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredSkill>, StoreError> {
        let skills = self.lock()?;
        Ok(rank_skills(skills.iter(), embedding, k))
    }

    async fn upsert(&self, skill: Skill) -> Result<SkillId, StoreError> {
        let mut skills = self.lock()?;
        let id = skill.id;
        match skills.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = skill,
            None => skills.push(skill),
        }
        Ok(id)
    }

    async fn reinforce(&self, id: &SkillId) -> Result<(), StoreError> {
        let mut skills = self.lock()?;
        let skill = skills
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        skill.metadata.success_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Artifact;
    use crate::memory::SkillMetadata;

    async fn skill(store: &InMemorySkillStore, description: &str) -> Skill {
        Skill {
            id: SkillId::new(),
            name: "s".into(),
            description: description.into(),
            solution: Artifact::new(description),
            embedding: store.embed(description).await.unwrap(),
            metadata: SkillMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let store = InMemorySkillStore::default();
        let s = skill(&store, "sort numbers ascending").await;
        let id = store.upsert(s.clone()).await.unwrap();
        assert_eq!(id, s.id);
        assert_eq!(store.len(), 1);

        let q = store.embed("sort numbers ascending").await.unwrap();
        let hits = store.query(&q, 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].skill.id, id);
        assert!(hits[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn test_upsert_same_id_replaces() {
        let store = InMemorySkillStore::default();
        let mut s = skill(&store, "first").await;
        store.upsert(s.clone()).await.unwrap();
        s.description = "second".into();
        store.upsert(s.clone()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&s.id).unwrap().description, "second");
    }

    #[tokio::test]
    async fn test_reinforce_increments() {
        let store = InMemorySkillStore::default();
        let s = skill(&store, "x").await;
        store.upsert(s.clone()).await.unwrap();
        store.reinforce(&s.id).await.unwrap();
        store.reinforce(&s.id).await.unwrap();
        assert_eq!(store.get(&s.id).unwrap().metadata.success_count, 3);
    }

    #[tokio::test]
    async fn test_reinforce_missing() {
        let store = InMemorySkillStore::default();
        let err = store.reinforce(&SkillId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = InMemorySkillStore::default();
        let q = store.embed("anything").await.unwrap();
        assert!(store.query(&q, 3).await.unwrap().is_empty());
        assert!(store.is_empty());
    }
}
