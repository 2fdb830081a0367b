//! Graph identity and encoder configuration.
//!
//! Load order: `.rpg/config.toml` → environment variables → defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity of the repository an RPG was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpgConfig {
    pub name: String,
    pub root_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubInfo>,
}

/// GitHub provenance for a persisted graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubInfo {
    pub owner: String,
    pub repo: String,
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

/// Encoding pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Token budget per extraction batch — batches fill until this limit.
    pub max_batch_tokens: usize,
    /// A final batch below this merges into its predecessor when it fits.
    pub min_batch_tokens: usize,
    /// Retries for per-entity LLM JSON parse/validation failures.
    pub max_parse_iterations: usize,
    /// Domain discovery ballots.
    pub discovery_votes: usize,
    /// Maximum functional areas kept after discovery.
    pub max_areas: usize,
    /// Maximum hierarchical assignment rounds before declaring stuck.
    pub max_assignment_rounds: usize,
    /// Semantic cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Drift above this threshold re-routes a modified entity.
    pub drift_threshold: f64,
    /// Change ratio above this threshold requests a full re-encode.
    pub force_regenerate_threshold: f64,
    /// Directory depth cap for file discovery.
    pub max_depth: usize,
    /// LLM retry attempts for transient failures.
    pub retry_attempts: u32,
    /// Backoff delays per retry attempt, in milliseconds.
    pub retry_delays_ms: Vec<u64>,
    /// Maximum completion tokens per LLM request.
    pub llm_max_tokens: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_batch_tokens: 50_000,
            min_batch_tokens: 10_000,
            max_parse_iterations: 2,
            discovery_votes: 3,
            max_areas: 8,
            max_assignment_rounds: 10,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            drift_threshold: 0.3,
            force_regenerate_threshold: 0.5,
            max_depth: 10,
            retry_attempts: 3,
            retry_delays_ms: vec![1000, 2000, 4000],
            llm_max_tokens: 4096,
        }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl EncoderConfig {
    /// Load config from `.rpg/config.toml` in the project root, with env var
    /// overrides. Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".rpg").join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        env_override("RPG_MAX_BATCH_TOKENS", &mut config.max_batch_tokens);
        env_override("RPG_MIN_BATCH_TOKENS", &mut config.min_batch_tokens);
        env_override("RPG_DRIFT_THRESHOLD", &mut config.drift_threshold);
        env_override(
            "RPG_FORCE_REGENERATE_THRESHOLD",
            &mut config.force_regenerate_threshold,
        );
        env_override("RPG_CACHE_TTL_SECS", &mut config.cache_ttl_secs);
        env_override("RPG_MAX_DEPTH", &mut config.max_depth);
        env_override("RPG_DISCOVERY_VOTES", &mut config.discovery_votes);

        config.validate()?;
        Ok(config)
    }

    /// Validate threshold ranges and batch bounds.
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_tokens >= self.max_batch_tokens {
            anyhow::bail!(
                "min_batch_tokens ({}) must be less than max_batch_tokens ({})",
                self.min_batch_tokens,
                self.max_batch_tokens,
            );
        }
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            anyhow::bail!("drift_threshold must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.force_regenerate_threshold) {
            anyhow::bail!("force_regenerate_threshold must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.max_batch_tokens, 50_000);
        assert_eq!(config.min_batch_tokens, 10_000);
        assert_eq!(config.max_parse_iterations, 2);
        assert_eq!(config.discovery_votes, 3);
        assert_eq!(config.drift_threshold, 0.3);
        assert_eq!(config.force_regenerate_threshold, 0.5);
        assert_eq!(config.max_depth, 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
max_batch_tokens = 24000
min_batch_tokens = 4000
drift_threshold = 0.4
"#;
        let config: EncoderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_batch_tokens, 24_000);
        assert_eq!(config.min_batch_tokens, 4_000);
        assert_eq!(config.drift_threshold, 0.4);
        // Defaults for unspecified fields
        assert_eq!(config.discovery_votes, 3);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let config = EncoderConfig::load(Path::new("/nonexistent/path")).unwrap();
        assert_eq!(config.max_batch_tokens, 50_000);
    }

    #[test]
    fn test_invalid_batch_bounds_rejected() {
        let config = EncoderConfig {
            min_batch_tokens: 60_000,
            ..EncoderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
