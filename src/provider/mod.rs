// src/provider/mod.rs — Text generation capability

pub mod openai_compat;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::GenerationError;

/// Core trait for anything that turns a prompt into text.
///
/// Implementations may be model-backed, templated or rule-based. The cycle
/// engine never inspects how the text was produced, only the text and its cost.
#[async_trait]
pub trait Generator: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError>;
}

/// Turns text into a vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn id(&self) -> &str;

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, GenerationError>;
}

/// What shape of answer the prompt expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseHint {
    /// Full solution source code.
    Solution,
    /// Adversarial test source code.
    Tests,
    /// A short natural-language description.
    Description,
}

impl std::fmt::Display for ResponseHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseHint::Solution => write!(f, "solution"),
            ResponseHint::Tests => write!(f, "tests"),
            ResponseHint::Description => write!(f, "description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub hint: ResponseHint,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, hint: ResponseHint) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            hint,
            max_tokens: None,
            temperature: Some(0.0),
        }
    }
}

/// Text produced by a generator together with what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub cost_usd: f64,
    pub usage: TokenUsage,
}

impl Generation {
    pub fn new(text: impl Into<String>, cost_usd: f64) -> Self {
        Self {
            text: text.into(),
            cost_usd,
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
