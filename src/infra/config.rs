// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::paths;
use crate::provider::openai_compat::DEFAULT_BASE_URL;
use crate::provider::retry::RetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub reflexion: ReflexionConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default, rename = "loop")]
    pub continuous: LoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_attempts: u32,
    pub max_spend_usd: f64,
    pub deadline_seconds: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_spend_usd: 2.0,
            deadline_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Skills attached to each cycle as hints.
    pub top_k: usize,
    /// Cosine similarity at or above which a new skill counts as a duplicate.
    pub dedup_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            dedup_threshold: 0.92,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexionConfig {
    pub note_cap_chars: usize,
}

impl Default for ReflexionConfig {
    fn default() -> Self {
        Self {
            note_cap_chars: 1_200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub generator_retries: u32,
    pub executor_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            generator_retries: 4,
            executor_retries: 2,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn generator(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.generator_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..Default::default()
        }
    }

    pub fn executor(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.executor_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms / 2),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::for_executor()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub builder: String,
    pub critic: String,
    /// Model for skill descriptions. Falls back to the builder model.
    pub describer: Option<String>,
    /// Embedding model, or "local" for the offline hashing embedder.
    pub embedder: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            builder: "gpt-4.1".into(),
            critic: "gpt-4.1".into(),
            describer: Some("gpt-4.1-mini".into()),
            embedder: "text-embedding-3-small".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

impl ModelsConfig {
    pub fn uses_local_embedder(&self) -> bool {
        self.embedder.eq_ignore_ascii_case("local")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub command: String,
    /// `{solution}` and `{tests}` are replaced by the file names.
    pub args: Vec<String>,
    pub solution_file: String,
    pub tests_file: String,
    pub timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: "python3".into(),
            args: vec!["{tests}".into()],
            solution_file: "solution.py".into(),
            tests_file: "test_solution.py".into(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Overrides the default database location.
    pub db_path: Option<PathBuf>,
    /// Ask a model for skill descriptions instead of reusing the objective.
    pub describe_skills: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            describe_skills: true,
        }
    }
}

impl MemoryConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(paths::db_path)
    }
}

/// Settings for `--loop` runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Pause between cycles.
    pub pause_seconds: u64,
    /// Longer pause after a cycle ends in a capability failure.
    pub error_pause_seconds: u64,
    /// Difficulty (1-10) of self-generated tasks when no task is given.
    pub difficulty: u8,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            pause_seconds: 5,
            error_pause_seconds: 10,
            difficulty: 5,
        }
    }
}

impl LoopConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_seconds)
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_secs(self.error_pause_seconds)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.retrieval.dedup_threshold) {
            anyhow::bail!(
                "retrieval.dedup_threshold must be between 0 and 1, got {}",
                self.retrieval.dedup_threshold
            );
        }
        if !self.budget.max_spend_usd.is_finite() || self.budget.max_spend_usd < 0.0 {
            anyhow::bail!("budget.max_spend_usd must be a non-negative number");
        }
        if self.reflexion.note_cap_chars == 0 {
            anyhow::bail!("reflexion.note_cap_chars must be at least 1");
        }
        if !(1..=10).contains(&self.continuous.difficulty) {
            anyhow::bail!(
                "loop.difficulty must be between 1 and 10, got {}",
                self.continuous.difficulty
            );
        }
        if self.executor.command.trim().is_empty() {
            anyhow::bail!("executor.command must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.budget.max_attempts, 3);
        assert!((c.budget.max_spend_usd - 2.0).abs() < 0.001);
        assert_eq!(c.budget.deadline_seconds, 300);
        assert_eq!(c.retrieval.top_k, 3);
        assert!((c.retrieval.dedup_threshold - 0.92).abs() < 0.001);
        assert_eq!(c.executor.command, "python3");
        assert!(c.memory.describe_skills);
        assert_eq!(c.continuous.pause(), Duration::from_secs(5));
        assert_eq!(c.continuous.error_pause(), Duration::from_secs(10));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.budget.max_attempts, 3);
        assert_eq!(config.models.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_parse_partial_section() {
        let toml_str = r#"
[budget]
max_attempts = 5

[retrieval]
dedup_threshold = 0.8
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.budget.max_attempts, 5);
        assert!((config.budget.max_spend_usd - 2.0).abs() < 0.001);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.dedup_threshold - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[budget]
max_attempts = 4
max_spend_usd = 0.5
deadline_seconds = 120

[retrieval]
top_k = 5
dedup_threshold = 0.95

[reflexion]
note_cap_chars = 800

[retry]
generator_retries = 1
executor_retries = 0
initial_delay_ms = 100
max_delay_ms = 1000

[models]
builder = "llama3.1:70b"
critic = "qwen2.5-coder"
embedder = "local"
base_url = "http://localhost:11434/v1"
api_key_env = "OLLAMA_KEY"

[executor]
command = "pytest"
args = ["-q", "{tests}"]
solution_file = "solution.py"
tests_file = "test_attack.py"
timeout_seconds = 10

[memory]
db_path = "/tmp/skills.db"
describe_skills = false

[loop]
pause_seconds = 1
error_pause_seconds = 30
difficulty = 8
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.budget.max_attempts, 4);
        assert_eq!(config.budget.deadline_seconds, 120);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.reflexion.note_cap_chars, 800);
        assert_eq!(config.retry.generator().max_retries, 1);
        assert_eq!(config.retry.executor().max_retries, 0);
        assert_eq!(config.retry.generator().initial_delay, Duration::from_millis(100));
        assert!(config.models.uses_local_embedder());
        assert!(config.models.describer.is_some());
        assert_eq!(config.executor.args, vec!["-q", "{tests}"]);
        assert_eq!(
            config.memory.resolved_db_path(),
            PathBuf::from("/tmp/skills.db")
        );
        assert!(!config.memory.describe_skills);
        assert_eq!(config.continuous.pause(), Duration::from_secs(1));
        assert_eq!(config.continuous.error_pause(), Duration::from_secs(30));
        assert_eq!(config.continuous.difficulty, 8);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut c = Config::default();
        c.retrieval.dedup_threshold = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_difficulty_out_of_range() {
        let mut c = Config::default();
        c.continuous.difficulty = 0;
        assert!(c.validate().is_err());
        c.continuous.difficulty = 11;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_note_cap() {
        let mut c = Config::default();
        c.reflexion.note_cap_chars = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.budget.max_attempts, config.budget.max_attempts);
        assert_eq!(deserialized.executor.args, config.executor.args);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget]\nmax_attempts = 7\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.budget.max_attempts, 7);
    }

    #[test]
    fn test_load_from_file_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ndedup_threshold = -0.1\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
