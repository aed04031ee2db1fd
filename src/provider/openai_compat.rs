// src/provider/openai_compat.rs — OpenAI-compatible generator and embedder
//
// Works against api.openai.com and any endpoint speaking the same
// `/chat/completions` and `/embeddings` dialect (Groq, Together, OpenRouter, vLLM, Ollama).

use async_trait::async_trait;

use super::{Embedder, Generation, GenerationRequest, Generator, TokenUsage};
use crate::core::cost::calculate_cost;
use crate::infra::errors::GenerationError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Request timeout for a single completion.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Default wait when a 429 carries no usable Retry-After header.
const DEFAULT_RATE_LIMIT_MS: u64 = 5_000;

pub struct OpenAICompatGenerator {
    id_str: String,
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAICompatGenerator {
    pub fn new(api_key: String, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id_str: format!("openai-compat/{}", model),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            GenerationError::Transient {
                provider: self.id_str.clone(),
                message: e.to_string(),
            }
        } else {
            GenerationError::Permanent {
                provider: self.id_str.clone(),
                message: e.to_string(),
            }
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, GenerationError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("ouroboros/{}", env!("CARGO_PKG_VERSION")),
            )
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(DEFAULT_RATE_LIMIT_MS);
            return Err(GenerationError::RateLimited {
                provider: self.id_str.clone(),
                retry_after_ms,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, error_body);
            return Err(if status.is_server_error() {
                GenerationError::Transient {
                    provider: self.id_str.clone(),
                    message,
                }
            } else {
                GenerationError::Permanent {
                    provider: self.id_str.clone(),
                    message,
                }
            });
        }

        response
            .json()
            .await
            .map_err(|e| GenerationError::Transient {
                provider: self.id_str.clone(),
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl Generator for OpenAICompatGenerator {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!(
            model = %self.model,
            hint = %request.hint,
            prompt_chars = request.prompt.len(),
            "Sending generation request"
        );

        let resp = self.post_json("chat/completions", body).await?;
        let (text, usage) = parse_completion(&resp);
        let cost_usd = calculate_cost(&self.model, &usage);

        Ok(Generation {
            text,
            cost_usd,
            usage,
        })
    }
}

#[async_trait]
impl Embedder for OpenAICompatGenerator {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, GenerationError> {
        let inputs: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let resp = self.post_json("embeddings", body).await?;
        let vectors = parse_embeddings(&resp);
        if vectors.len() != texts.len() {
            return Err(GenerationError::Permanent {
                provider: self.id_str.clone(),
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            });
        }
        Ok(vectors)
    }
}

fn parse_completion(resp: &serde_json::Value) -> (String, TokenUsage) {
    let text = resp["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };
    (text, usage)
}

fn parse_embeddings(resp: &serde_json::Value) -> Vec<Vec<f32>> {
    let Some(data) = resp["data"].as_array() else {
        return Vec::new();
    };
    let mut items: Vec<(u64, Vec<f32>)> = data
        .iter()
        .map(|item| {
            let index = item["index"].as_u64().unwrap_or(0);
            let vector = item["embedding"]
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .map(|v| v as f32)
                        .collect()
                })
                .unwrap_or_default();
            (index, vector)
        })
        .collect();
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, v)| v).collect()
}
