//! LLM provider configuration and API request/response types.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Anthropic {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
    },
    /// Any OpenAI-compatible API with Bearer token auth.
    OpenAICompatible {
        api_key: String,
        base_url: String,
        model: String,
    },
}

impl LlmProvider {
    /// Create from environment variables. Prefers ANTHROPIC_API_KEY, then
    /// OPENAI_API_KEY, then RPG_API_KEY + RPG_BASE_URL.
    pub fn from_env() -> Result<Self> {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            return Ok(Self::Anthropic {
                api_key: key,
                model: std::env::var("RPG_MODEL")
                    .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            });
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            return Ok(Self::OpenAI {
                api_key: key,
                model: std::env::var("RPG_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            });
        }
        if let (Ok(key), Ok(url)) = (std::env::var("RPG_API_KEY"), std::env::var("RPG_BASE_URL"))
        {
            return Ok(Self::OpenAICompatible {
                api_key: key,
                base_url: url,
                model: std::env::var("RPG_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            });
        }
        anyhow::bail!(
            "No LLM API key found. Set ANTHROPIC_API_KEY, OPENAI_API_KEY, \
             or RPG_API_KEY + RPG_BASE_URL."
        )
    }

    /// Human-readable provider name.
    pub fn provider_name(&self) -> &str {
        match self {
            Self::Anthropic { .. } => "Anthropic",
            Self::OpenAI { .. } => "OpenAI",
            Self::OpenAICompatible { .. } => "OpenAI-Compatible",
        }
    }

    /// Model name in use.
    pub fn model_name(&self) -> &str {
        match self {
            Self::Anthropic { model, .. }
            | Self::OpenAI { model, .. }
            | Self::OpenAICompatible { model, .. } => model,
        }
    }

    /// Cost per million prompt tokens (USD).
    pub fn cost_per_mtok_prompt(&self) -> f64 {
        match self {
            Self::Anthropic { .. } => 3.0,
            Self::OpenAI { .. } | Self::OpenAICompatible { .. } => 0.15,
        }
    }

    /// Cost per million completion tokens (USD).
    pub fn cost_per_mtok_completion(&self) -> f64 {
        match self {
            Self::Anthropic { .. } => 15.0,
            Self::OpenAI { .. } | Self::OpenAICompatible { .. } => 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// API Request / Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    pub system: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct AnthropicResponse {
    pub content: Vec<AnthropicContent>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
pub(crate) struct AnthropicContent {
    pub text: String,
}

#[derive(Deserialize)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Serialize)]
pub(crate) struct OpenAIRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Serialize)]
pub(crate) struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
pub(crate) struct OpenAIChoice {
    pub message: OpenAIChoiceMessage,
}

#[derive(Deserialize)]
pub(crate) struct OpenAIChoiceMessage {
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
