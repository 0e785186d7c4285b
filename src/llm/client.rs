use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::llm::{GenerationConfig, TextGenerator};

/// Client for an OpenAI-compatible text completions endpoint.
pub struct CompletionClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
        config: &GenerationConfig,
    ) -> Result<CompletionResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(config.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("API returned {status}: {body}")));
        }

        let body = response.json::<CompletionResponse>().await?;
        Ok(body)
    }
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let request = CompletionRequest {
            model: config.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let response = self.complete(&request, config).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %config.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion received"
            );
        }

        Ok(response.first_text())
    }
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Trimmed text of the first choice, or an empty string.
    pub fn first_text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.text.as_deref())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}
