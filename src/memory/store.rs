// src/memory/store.rs — SQLite-backed skill store and cycle history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{rank_skills, schema, ScoredSkill, Skill, SkillId, SkillMetadata, SkillStore};
use crate::core::types::{Artifact, ArtifactId};
use crate::infra::errors::StoreError;
use crate::provider::Embedder;

/// Skill store persisted in SQLite.
///
/// The connection sits behind a mutex; every operation takes the lock for the
/// duration of one statement batch and releases it on return, error included.
pub struct SqliteSkillStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
}

/// One finished cycle, as kept in the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub id: String,
    pub task_id: String,
    pub objective: String,
    pub outcome: String,
    pub attempts: u32,
    pub cost_usd: f64,
    pub skill_id: Option<SkillId>,
    pub created_at: DateTime<Utc>,
}

/// Lifetime totals across every recorded cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub cycles: u64,
    pub solved: u64,
    pub total_cost_usd: f64,
    pub skills: u64,
}

impl SqliteSkillStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    // -- Skills --

    pub fn count_skills(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM skills", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_SKILL),
                params![id.to_string()],
                SkillRow::from_row,
            )
            .optional()?;
        row.map(SkillRow::into_skill).transpose()
    }

    /// Most successful skills first.
    pub fn list_skills(&self, limit: u32) -> Result<Vec<Skill>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY success_count DESC, created_at DESC LIMIT ?1",
            SELECT_SKILL
        ))?;
        let rows = stmt.query_map(params![limit], SkillRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_skill()?);
        }
        Ok(result)
    }

    fn all_skills(&self) -> Result<Vec<Skill>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(SELECT_SKILL)?;
        let rows = stmt.query_map([], SkillRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_skill()?);
        }
        Ok(result)
    }

    // -- Cycle history --

    pub fn record_cycle(&self, record: &CycleRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cycles (id, task_id, objective, outcome, attempts, cost_usd,
             skill_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.task_id,
                record.objective,
                record.outcome,
                record.attempts,
                record.cost_usd,
                record.skill_id.map(|id| id.to_string()),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn recent_cycles(&self, limit: u32) -> Result<Vec<CycleRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, objective, outcome, attempts, cost_usd, skill_id, created_at
             FROM cycles ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, task_id, objective, outcome, attempts, cost_usd, skill_id, created_at) =
                row?;
            result.push(CycleRecord {
                id,
                task_id,
                objective,
                outcome,
                attempts,
                cost_usd,
                skill_id: skill_id.as_deref().map(SkillId::parse).transpose()?,
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(result)
    }

    pub fn history_summary(&self) -> Result<HistorySummary, StoreError> {
        let conn = self.conn()?;
        let (cycles, solved, total_cost_usd) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN outcome = 'solved' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(cost_usd), 0.0)
             FROM cycles",
            [],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, f64>(2)?)),
        )?;
        let skills: i64 = conn.query_row("SELECT COUNT(*) FROM skills", [], |r| r.get(0))?;
        Ok(HistorySummary {
            cycles: cycles as u64,
            solved: solved as u64,
            total_cost_usd,
            skills: skills as u64,
        })
    }
}

#[async_trait]
impl SkillStore for SqliteSkillStore {
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
        let skills = self.all_skills()?;
        Ok(rank_skills(skills.iter(), embedding, k))
    }

    async fn upsert(&self, skill: Skill) -> Result<SkillId, StoreError> {
        let embedding = serde_json::to_string(&skill.embedding)?;
        let tags = serde_json::to_string(&skill.metadata.tags)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO skills (id, name, description, code, artifact_id, embedding,
             category, tags, success_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                code = excluded.code,
                artifact_id = excluded.artifact_id,
                embedding = excluded.embedding,
                category = excluded.category,
                tags = excluded.tags,
                success_count = excluded.success_count",
            params![
                skill.id.to_string(),
                skill.name,
                skill.description,
                skill.solution.code,
                skill.solution.id.0,
                embedding,
                skill.metadata.category,
                tags,
                skill.metadata.success_count,
                skill.metadata.created_at.to_rfc3339(),
            ],
        )?;
        Ok(skill.id)
    }

    async fn reinforce(&self, id: &SkillId) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE skills SET success_count = success_count + 1, last_used = ?1
             WHERE id = ?2",
            params![now, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

const SELECT_SKILL: &str = "SELECT id, name, description, code, artifact_id, embedding,
    category, tags, success_count, created_at FROM skills";

/// Raw column values; JSON decoding happens outside the rusqlite row callback.
struct SkillRow {
    id: String,
    name: String,
    description: String,
    code: String,
    artifact_id: String,
    embedding: String,
    category: Option<String>,
    tags: String,
    success_count: u32,
    created_at: String,
}

impl SkillRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            code: row.get(3)?,
            artifact_id: row.get(4)?,
            embedding: row.get(5)?,
            category: row.get(6)?,
            tags: row.get(7)?,
            success_count: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_skill(self) -> Result<Skill, StoreError> {
        Ok(Skill {
            id: SkillId::parse(&self.id)?,
            name: self.name,
            description: self.description,
            solution: Artifact {
                id: ArtifactId(self.artifact_id),
                code: self.code,
            },
            embedding: serde_json::from_str(&self.embedding)?,
            metadata: SkillMetadata {
                category: self.category,
                tags: serde_json::from_str(&self.tags)?,
                created_at: parse_timestamp(&self.created_at),
                success_count: self.success_count,
            },
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
