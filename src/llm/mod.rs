pub mod client;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::Result;

pub use client::CompletionClient;

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl From<&LlmConfig> for GenerationConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`. An empty string means the model produced nothing usable.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;
}
