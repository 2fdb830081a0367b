//! LLM client for semantic extraction via Anthropic, OpenAI, or any
//! OpenAI-compatible API.

mod providers;

pub use providers::LlmProvider;

use anyhow::{Context, Result};
use providers::{
    AnthropicRequest, AnthropicResponse, Message, OpenAIMessage, OpenAIRequest, OpenAIResponse,
};
use rpg_core::config::EncoderConfig;
use std::sync::Mutex;

/// Token usage of a single completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A completed LLM response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
    pub model: String,
}

/// Cumulative usage across a client's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub requests: u64,
}

/// An LLM client over a configured provider. Usage is accumulated across
/// calls for cost accounting; counters are append-only and thread-safe.
pub struct LlmClient {
    provider: LlmProvider,
    http: reqwest::Client,
    max_tokens: u32,
    stats: Mutex<UsageStats>,
}

impl LlmClient {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            max_tokens: 4096,
            stats: Mutex::new(UsageStats::default()),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(LlmProvider::from_env()?))
    }

    /// Create from environment with config-driven max_tokens.
    pub fn from_env_with_config(config: &EncoderConfig) -> Result<Self> {
        let mut client = Self::from_env()?;
        client.max_tokens = config.llm_max_tokens;
        Ok(client)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Cumulative prompt/completion tokens and request count.
    pub fn usage_stats(&self) -> UsageStats {
        *self.stats.lock().unwrap()
    }

    /// Provider-specific cost in USD for the given usage.
    pub fn estimate_cost(&self, stats: &UsageStats) -> f64 {
        let prompt = stats.prompt_tokens as f64 / 1_000_000.0;
        let completion = stats.completion_tokens as f64 / 1_000_000.0;
        prompt * self.provider.cost_per_mtok_prompt()
            + completion * self.provider.cost_per_mtok_completion()
    }

    fn record(&self, usage: Usage) {
        let mut stats = self.stats.lock().unwrap();
        stats.prompt_tokens += usage.prompt_tokens;
        stats.completion_tokens += usage.completion_tokens;
        stats.requests += 1;
    }

    /// Send a completion request and return the response with usage.
    pub async fn complete(&self, user: &str, system: &str) -> Result<Completion> {
        let completion = match &self.provider {
            LlmProvider::Anthropic { api_key, model } => {
                let req = AnthropicRequest {
                    model: model.clone(),
                    max_tokens: self.max_tokens,
                    system: system.to_string(),
                    messages: vec![Message {
                        role: "user".to_string(),
                        content: user.to_string(),
                    }],
                };

                let resp = self
                    .http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("content-type", "application/json")
                    .json(&req)
                    .send()
                    .await
                    .context("failed to call Anthropic API")?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    anyhow::bail!("Anthropic API returned {}: {}", status, text);
                }

                let body = resp
                    .json::<AnthropicResponse>()
                    .await
                    .context("failed to parse Anthropic response")?;

                let content = body
                    .content
                    .first()
                    .map(|c| c.text.clone())
                    .ok_or_else(|| anyhow::anyhow!("empty response from Anthropic"))?;
                let usage = body.usage.map_or(Usage::default(), |u| Usage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                });
                Completion {
                    content,
                    usage,
                    model: model.clone(),
                }
            }
            LlmProvider::OpenAI { api_key, model } => {
                self.openai_style(
                    "https://api.openai.com/v1/chat/completions",
                    api_key,
                    model,
                    user,
                    system,
                )
                .await?
            }
            LlmProvider::OpenAICompatible {
                api_key,
                base_url,
                model,
            } => {
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                self.openai_style(&url, api_key, model, user, system).await?
            }
        };

        self.record(completion.usage);
        Ok(completion)
    }

    async fn openai_style(
        &self,
        url: &str,
        api_key: &str,
        model: &str,
        user: &str,
        system: &str,
    ) -> Result<Completion> {
        let req = OpenAIRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            // Deterministic output for structured JSON extraction
            temperature: Some(0.0),
        };

        let resp = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&req)
            .send()
            .await
            .with_context(|| format!("failed to call chat API at {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API returned {}: {}", status, text);
        }

        let body = resp
            .json::<OpenAIResponse>()
            .await
            .context("failed to parse chat API response")?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("empty response from chat API"))?;
        let usage = body.usage.map_or(Usage::default(), |u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        Ok(Completion {
            content,
            usage,
            model: model.to_string(),
        })
    }

    /// Send a completion request with retry logic (exponential backoff).
    pub async fn complete_with_retry(
        &self,
        user: &str,
        system: &str,
        config: &EncoderConfig,
    ) -> Result<Completion> {
        let mut last_err = None;
        let max_attempts = config.retry_attempts.max(1) as usize;

        for attempt in 0..max_attempts {
            match self.complete(user, system).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let delay_idx = attempt.min(config.retry_delays_ms.len().saturating_sub(1));
                    let delay_ms = config
                        .retry_delays_ms
                        .get(delay_idx)
                        .copied()
                        .unwrap_or(4000);

                    if attempt < max_attempts - 1 {
                        tracing::warn!(
                            "LLM request failed (attempt {}/{}): {}. Retrying in {}ms",
                            attempt + 1,
                            max_attempts,
                            e,
                            delay_ms
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("LLM request failed after all retries")))
    }

    /// Complete a request and parse JSON from the response, retrying once
    /// with a stricter format prompt on parse failure.
    pub async fn complete_json<T: serde::de::DeserializeOwned>(
        &self,
        user: &str,
        system: &str,
    ) -> Result<T> {
        let response = self.complete(user, system).await?;
        match Self::parse_json_response::<T>(&response.content) {
            Ok(parsed) => return Ok(parsed),
            Err(first_err) => {
                tracing::warn!("JSON parse failed, retrying with format correction: {first_err}");
            }
        }

        let strict_prompt = format!(
            "{}\n\nPrevious response had invalid JSON. Output the SAME semantic analysis \
             but with correct JSON formatting. No explanation, no markdown.",
            user
        );
        let response = self.complete(&strict_prompt, system).await?;
        Self::parse_json_response::<T>(&response.content)
    }

    /// Parse a JSON payload out of an LLM response: plain JSON, a
    /// `<solution>…</solution>` block, a fenced code block, or the first
    /// `{…}`/`[…]` substring.
    pub fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
        let trimmed = text.trim();

        let candidate = if let Some(inner) = extract_between(text, "<solution>", "</solution>") {
            inner.trim()
        } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
            trimmed
        } else if let Some(inner) = extract_between(text, "```json", "```") {
            inner.trim()
        } else if let Some(inner) = extract_between(text, "```", "```") {
            inner.trim()
        } else if let Some(inner) = first_json_object(text) {
            inner
        } else {
            trimmed
        };

        serde_json::from_str(candidate)
            .or_else(|e| {
                // The chosen candidate may still carry prose around an
                // embedded object; fall back to the first {…} substring.
                if let Some(inner) = first_json_object(candidate) {
                    serde_json::from_str(inner)
                } else {
                    Err(e)
                }
            })
            .context("failed to parse LLM JSON response")
    }
}

fn extract_between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

/// The first balanced `{…}` substring of the text.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_plain_json() {
        let parsed: HashMap<String, u32> =
            LlmClient::parse_json_response(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_parse_solution_block() {
        let text = "Here is my analysis.\n<solution>{\"a\": 3}</solution>\nDone.";
        let parsed: HashMap<String, u32> = LlmClient::parse_json_response(text).unwrap();
        assert_eq!(parsed["a"], 3);
    }

    #[test]
    fn test_parse_fenced_block() {
        let text = "```json\n{\"a\": 4}\n```";
        let parsed: HashMap<String, u32> = LlmClient::parse_json_response(text).unwrap();
        assert_eq!(parsed["a"], 4);
    }

    #[test]
    fn test_parse_embedded_object() {
        let text = "The assignments are {\"a\": 5} as requested.";
        let parsed: HashMap<String, u32> = LlmClient::parse_json_response(text).unwrap();
        assert_eq!(parsed["a"], 5);
    }

    #[test]
    fn test_parse_nested_object_with_strings() {
        let text = r#"Sure: {"outer": {"desc": "has } brace"}} trailing"#;
        let parsed: serde_json::Value = LlmClient::parse_json_response(text).unwrap();
        assert_eq!(parsed["outer"]["desc"], "has } brace");
    }

    #[test]
    fn test_parse_failure_is_error() {
        let result: Result<HashMap<String, u32>> =
            LlmClient::parse_json_response("no json here at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_estimate_cost() {
        let client = LlmClient::new(LlmProvider::OpenAI {
            api_key: "test".to_string(),
            model: "gpt-4o-mini".to_string(),
        });
        let stats = UsageStats {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
            requests: 10,
        };
        let cost = client.estimate_cost(&stats);
        assert!((cost - 0.75).abs() < 1e-9);
    }
}
