//! Semantic extraction: turn code entities into validated features.
//!
//! Entities flow through a content-addressed cache, then an LLM path when a
//! client is configured and source is present, then a deterministic
//! heuristic fallback. Batches are token-aware and per-entity calls inside
//! a batch run in parallel.

use crate::cache::SemanticCache;
use crate::llm::LlmClient;
use crate::naming;
use futures_util::future::join_all;
use rpg_core::config::EncoderConfig;
use rpg_core::node::{EntityType, SemanticFeature};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Hard ceiling on a single entity's token estimate.
const ENTITY_TOKEN_CAP: usize = 200_000;

/// The semantic extraction system prompt.
pub const SEMANTIC_EXTRACTION_SYSTEM: &str = "\
You are a senior software analyst extracting semantic features from code.
Extract purpose, not implementation.

Rules:
- Features are verb+object phrases, lowercase, 3-8 words.
- One responsibility per feature; no chained actions.
- Avoid vague verbs (handle, process, deal with).
- Avoid library names and control-flow vocabulary.
- Prefer domain semantics over code mechanics.

Respond with JSON only:
{\"description\": \"...\", \"subFeatures\": [\"...\"], \"keywords\": [\"...\"]}";

/// The file-level aggregation system prompt.
pub const FILE_AGGREGATION_SYSTEM: &str = "\
You are a senior software analyst. Given the features of every entity in a
source file, produce ONE cohesive verb+object phrase (lowercase, 3-8 words)
describing the file's overall responsibility.

Respond with JSON only:
{\"description\": \"...\", \"keywords\": [\"...\"]}";

/// An entity presented for semantic extraction.
#[derive(Debug, Clone)]
pub struct EntityInput {
    pub entity_type: EntityType,
    pub name: String,
    pub file_path: String,
    pub parent: Option<String>,
    pub source_code: Option<String>,
    pub documentation: Option<String>,
}

#[derive(Deserialize)]
struct LlmFeature {
    description: String,
    #[serde(default, rename = "subFeatures")]
    sub_features: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
struct LlmFileFeature {
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Extracts validated semantic features for entities and files.
pub struct SemanticExtractor<'a> {
    llm: Option<&'a LlmClient>,
    cache: Option<&'a SemanticCache>,
    config: &'a EncoderConfig,
    warnings: Mutex<Vec<String>>,
}

impl<'a> SemanticExtractor<'a> {
    pub fn new(
        llm: Option<&'a LlmClient>,
        cache: Option<&'a SemanticCache>,
        config: &'a EncoderConfig,
    ) -> Self {
        Self {
            llm,
            cache,
            config,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Drain the warnings accumulated so far.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut self.warnings.lock().unwrap())
    }

    fn warn(&self, message: String) {
        tracing::warn!("{message}");
        self.warnings.lock().unwrap().push(message);
    }

    /// Estimated prompt tokens for an entity: summed field lengths over 4,
    /// bounded by a constant.
    pub fn estimate_entity_tokens(input: &EntityInput) -> usize {
        let chars = input.name.len()
            + input.file_path.len()
            + input.source_code.as_deref().map_or(0, str::len)
            + input.documentation.as_deref().map_or(0, str::len);
        (chars / 4).clamp(1, ENTITY_TOKEN_CAP)
    }

    /// Group entities into token-aware batches of input indices.
    ///
    /// An entity larger than `max_batch_tokens` gets its own batch; batches
    /// otherwise fill greedily up to the budget; a final batch below
    /// `min_batch_tokens` merges into its predecessor when the merge stays
    /// within budget. The union of batches is the input list, in order.
    pub fn build_batches(
        inputs: &[EntityInput],
        min_batch_tokens: usize,
        max_batch_tokens: usize,
    ) -> Vec<Vec<usize>> {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0usize;

        for (i, input) in inputs.iter().enumerate() {
            let tokens = Self::estimate_entity_tokens(input);

            if tokens > max_batch_tokens {
                if !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                batches.push(vec![i]);
                continue;
            }

            if !current.is_empty() && current_tokens + tokens > max_batch_tokens {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }

            current.push(i);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            batches.push(current);
        }

        // Tail merge: fold an undersized final batch into its predecessor
        // when the combined batch still fits.
        if batches.len() >= 2 {
            let last_tokens: usize = batches[batches.len() - 1]
                .iter()
                .map(|&i| Self::estimate_entity_tokens(&inputs[i]))
                .sum();
            let prev_tokens: usize = batches[batches.len() - 2]
                .iter()
                .map(|&i| Self::estimate_entity_tokens(&inputs[i]))
                .sum();
            if last_tokens < min_batch_tokens && prev_tokens + last_tokens <= max_batch_tokens {
                let last = batches.pop().unwrap();
                batches.last_mut().unwrap().extend(last);
            }
        }

        batches
    }

    /// Extract a feature for one entity: cache → LLM → heuristic.
    pub async fn extract(&self, input: &EntityInput) -> SemanticFeature {
        let key = SemanticCache::cache_key(
            &input.file_path,
            input.entity_type.as_str(),
            &input.name,
        );
        let hash = SemanticCache::content_hash(
            &input.file_path,
            input.entity_type.as_str(),
            &input.name,
            input.parent.as_deref(),
            input.source_code.as_deref(),
            input.documentation.as_deref(),
        );

        if let Some(cache) = self.cache {
            match cache.get(&key, &hash) {
                Ok(Some(feature)) => return feature,
                Ok(None) => {}
                Err(e) => self.warn(format!("cache read failed for {key}: {e}")),
            }
        }

        let feature = match (self.llm, input.source_code.as_deref()) {
            (Some(llm), Some(_)) => match self.extract_via_llm(llm, input).await {
                Some(feature) => feature,
                None => self.heuristic_feature(input),
            },
            _ => self.heuristic_feature(input),
        };

        if let Some(cache) = self.cache
            && let Err(e) = cache.set(&key, &hash, &feature)
        {
            self.warn(format!("cache write failed for {key}: {e}"));
        }

        feature
    }

    /// Extract all entities, batching by token budget. Per-entity calls
    /// inside a batch run in parallel; batches run in sequence. The output
    /// is index-aligned with the input.
    pub async fn extract_batch(&self, inputs: &[EntityInput]) -> Vec<SemanticFeature> {
        let batches = Self::build_batches(
            inputs,
            self.config.min_batch_tokens,
            self.config.max_batch_tokens,
        );

        let mut features: Vec<Option<SemanticFeature>> = vec![None; inputs.len()];
        for batch in batches {
            let extracted =
                join_all(batch.iter().map(|&i| self.extract(&inputs[i]))).await;
            for (&i, feature) in batch.iter().zip(extracted) {
                features[i] = Some(feature);
            }
        }
        features.into_iter().map(Option::unwrap).collect()
    }

    async fn extract_via_llm(
        &self,
        llm: &LlmClient,
        input: &EntityInput,
    ) -> Option<SemanticFeature> {
        let prompt = build_entity_prompt(input);
        let attempts = self.config.max_parse_iterations.max(1);

        for attempt in 0..attempts {
            match llm
                .complete_json::<LlmFeature>(&prompt, SEMANTIC_EXTRACTION_SYSTEM)
                .await
            {
                Ok(raw) if !raw.description.trim().is_empty() => {
                    return Some(normalize_llm_feature(raw));
                }
                Ok(_) => {
                    tracing::debug!(
                        "empty description for {} (attempt {})",
                        input.name,
                        attempt + 1
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "LLM extraction failed for {} (attempt {}): {e}",
                        input.name,
                        attempt + 1
                    );
                }
            }
        }

        self.warn(format!(
            "LLM extraction failed for {}:{}; using heuristic",
            input.file_path, input.name
        ));
        None
    }

    /// Deterministic fallback: verb-mapped description plus keywords from
    /// the name, entity type, parent, and path segments.
    pub fn heuristic_feature(&self, input: &EntityInput) -> SemanticFeature {
        let validated = naming::validate_feature_name(&naming::heuristic_description(&input.name));

        let mut keywords: BTreeSet<String> = naming::humanize(&input.name)
            .split_whitespace()
            .map(String::from)
            .collect();
        keywords.insert(input.entity_type.as_str().to_string());
        if let Some(parent) = &input.parent {
            keywords.insert(parent.to_lowercase());
        }
        for segment in input.file_path.split('/') {
            if segment.len() > 2 && !segment.contains('.') {
                keywords.insert(segment.to_lowercase());
            }
        }

        SemanticFeature {
            description: validated.description,
            sub_features: validated.sub_features,
            keywords,
        }
    }

    /// Aggregate child entity features into one file-level feature.
    pub async fn aggregate_file_features(
        &self,
        child_features: &[SemanticFeature],
        file_name: &str,
        file_path: &str,
    ) -> SemanticFeature {
        let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);

        if child_features.is_empty() {
            return SemanticFeature::new(format!("define {} module", naming::humanize(stem)))
                .with_keywords([stem.to_lowercase()]);
        }

        let mut keywords: BTreeSet<String> = child_features
            .iter()
            .flat_map(|f| f.keywords.iter().cloned())
            .collect();
        keywords.insert(stem.to_lowercase());

        let sub_features: Vec<String> = if child_features.len() > 1 {
            child_features.iter().map(|f| f.description.clone()).collect()
        } else {
            Vec::new()
        };

        if let Some(llm) = self.llm {
            let prompt = build_file_prompt(child_features, file_name, file_path);
            match llm
                .complete_json::<LlmFileFeature>(&prompt, FILE_AGGREGATION_SYSTEM)
                .await
            {
                Ok(raw) if !raw.description.trim().is_empty() => {
                    let validated = naming::validate_feature_name(&raw.description);
                    keywords.extend(raw.keywords.into_iter().map(|k| k.to_lowercase()));
                    return SemanticFeature {
                        description: validated.description,
                        sub_features,
                        keywords,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    self.warn(format!("file aggregation failed for {file_path}: {e}"));
                }
            }
        }

        // Heuristic: lead with the most frequent child verb (first-seen wins
        // ties), suffix the humanized file name and "functionality".
        let verb = most_frequent_leading_verb(child_features)
            .unwrap_or_else(|| "provide".to_string());
        let description = naming::validate_phrase(&format!(
            "{verb} {} functionality",
            naming::humanize(stem)
        ));

        SemanticFeature {
            description,
            sub_features,
            keywords,
        }
    }
}

fn most_frequent_leading_verb(features: &[SemanticFeature]) -> Option<String> {
    let mut order: Vec<(String, usize)> = Vec::new();
    for feature in features {
        let Some(first) = feature.description.split_whitespace().next() else {
            continue;
        };
        if let Some(entry) = order.iter_mut().find(|(verb, _)| verb == first) {
            entry.1 += 1;
        } else {
            order.push((first.to_string(), 1));
        }
    }
    // max_by_key keeps the last max; iterate manually so first-seen wins.
    let mut best: Option<(String, usize)> = None;
    for (verb, count) in order {
        match &best {
            Some((_, best_count)) if *best_count >= count => {}
            _ => best = Some((verb, count)),
        }
    }
    best.map(|(verb, _)| verb)
}

fn normalize_llm_feature(raw: LlmFeature) -> SemanticFeature {
    let validated = naming::validate_feature_name(&raw.description);
    let mut sub_features = validated.sub_features;
    sub_features.extend(
        raw.sub_features
            .iter()
            .map(|s| naming::validate_phrase(s))
            .filter(|s| !s.is_empty()),
    );
    sub_features.dedup();

    let keywords: BTreeSet<String> = raw
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    SemanticFeature {
        description: validated.description,
        sub_features,
        keywords,
    }
}

fn build_entity_prompt(input: &EntityInput) -> String {
    let mut prompt = format!(
        "### Entity\n{} `{}` in {}\n",
        input.entity_type, input.name, input.file_path
    );
    if let Some(parent) = &input.parent {
        prompt.push_str(&format!("Member of `{parent}`\n"));
    }
    if let Some(doc) = &input.documentation {
        prompt.push_str(&format!("\n### Documentation\n{doc}\n"));
    }
    if let Some(source) = &input.source_code {
        prompt.push_str(&format!("\n### Source\n```\n{source}\n```\n"));
    }
    prompt
}

fn build_file_prompt(
    child_features: &[SemanticFeature],
    file_name: &str,
    file_path: &str,
) -> String {
    let mut prompt = format!("### File\n{file_name} ({file_path})\n\n### Entity features\n");
    for feature in child_features {
        prompt.push_str(&format!("- {}\n", feature.description));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, source_len: usize) -> EntityInput {
        EntityInput {
            entity_type: EntityType::Function,
            name: name.to_string(),
            file_path: String::new(),
            parent: None,
            source_code: if source_len > 0 {
                Some("x".repeat(source_len))
            } else {
                None
            },
            documentation: None,
        }
    }

    fn config() -> EncoderConfig {
        EncoderConfig::default()
    }

    /// Entities sized to the given token estimates (tokens ≈ chars / 4).
    fn sized_inputs(token_sizes: &[usize]) -> Vec<EntityInput> {
        token_sizes
            .iter()
            .map(|&t| input("e", t * 4))
            .collect()
    }

    #[test]
    fn test_batching_greedy_fill_and_no_tail_merge() {
        // Sizes 20k, 45k, 2k with min=10k, max=50k: e1 alone (adding e2
        // would exceed), then e2+e3 (47k). The 47k tail is above min, so no
        // further merge: exactly 2 batches.
        let inputs = sized_inputs(&[20_000, 45_000, 2_000]);
        let batches = SemanticExtractor::build_batches(&inputs, 10_000, 50_000);
        assert_eq!(batches, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_batching_oversize_entity_isolated() {
        let inputs = sized_inputs(&[5_000, 80_000, 5_000]);
        let batches = SemanticExtractor::build_batches(&inputs, 10_000, 50_000);
        assert_eq!(batches, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_batching_undersized_tail_kept_when_merge_would_overflow() {
        // The 3k tail is below min, but folding it into the 49k predecessor
        // would exceed the budget, so it stays its own batch.
        let inputs = sized_inputs(&[49_000, 3_000]);
        let batches = SemanticExtractor::build_batches(&inputs, 10_000, 50_000);
        assert_eq!(batches, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_batching_no_batch_exceeds_budget_except_oversize_singleton() {
        let inputs = sized_inputs(&[12_000, 9_000, 70_000, 8_000, 40_000, 6_000]);
        let batches = SemanticExtractor::build_batches(&inputs, 10_000, 50_000);
        for batch in &batches {
            let tokens: usize = batch
                .iter()
                .map(|&i| SemanticExtractor::estimate_entity_tokens(&inputs[i]))
                .sum();
            assert!(tokens <= 50_000 || batch.len() == 1);
        }
    }

    #[test]
    fn test_batching_covers_all_inputs_in_order() {
        let inputs = sized_inputs(&[60_000, 1_000, 30_000, 30_000, 500]);
        let batches = SemanticExtractor::build_batches(&inputs, 10_000, 50_000);
        let flattened: Vec<usize> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_batching_empty() {
        let batches = SemanticExtractor::build_batches(&[], 10_000, 50_000);
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_extraction_without_llm() {
        let cfg = config();
        let extractor = SemanticExtractor::new(None, None, &cfg);
        let entity = EntityInput {
            entity_type: EntityType::Function,
            name: "getUserProfile".to_string(),
            file_path: "src/services/user.py".to_string(),
            parent: Some("UserService".to_string()),
            source_code: Some("def getUserProfile(): ...".to_string()),
            documentation: None,
        };
        let feature = extractor.extract(&entity).await;
        assert_eq!(feature.description, "retrieve user profile");
        assert!(feature.keywords.contains("function"));
        assert!(feature.keywords.contains("userservice"));
        assert!(feature.keywords.contains("services"));
        assert!(feature.keywords.contains("src"));
        // File-name segment contains a dot and is excluded
        assert!(!feature.keywords.contains("user.py"));
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let cfg = config();
        let cache = SemanticCache::in_memory(3600).unwrap();
        let extractor = SemanticExtractor::new(None, Some(&cache), &cfg);
        let entity = input("parseArgs", 40);

        let first = extractor.extract(&entity).await;
        let second = extractor.extract(&entity).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_aggregate_empty_file() {
        let cfg = config();
        let extractor = SemanticExtractor::new(None, None, &cfg);
        let feature = extractor
            .aggregate_file_features(&[], "data_loader.py", "src/data_loader.py")
            .await;
        assert_eq!(feature.description, "define data loader module");
        assert!(feature.keywords.contains("data_loader"));
    }

    #[tokio::test]
    async fn test_aggregate_most_frequent_verb() {
        let cfg = config();
        let extractor = SemanticExtractor::new(None, None, &cfg);
        let children = vec![
            SemanticFeature::new("parse config entries").with_keywords(["config"]),
            SemanticFeature::new("parse env overrides").with_keywords(["env"]),
            SemanticFeature::new("validate final settings").with_keywords(["settings"]),
        ];
        let feature = extractor
            .aggregate_file_features(&children, "config.py", "src/config.py")
            .await;
        assert_eq!(feature.description, "parse config functionality");
        assert_eq!(feature.sub_features.len(), 3);
        assert!(feature.keywords.contains("config"));
        assert!(feature.keywords.contains("env"));
        assert!(feature.keywords.contains("settings"));
    }

    #[tokio::test]
    async fn test_aggregate_tie_broken_by_first_seen() {
        let cfg = config();
        let extractor = SemanticExtractor::new(None, None, &cfg);
        let children = vec![
            SemanticFeature::new("load raw records"),
            SemanticFeature::new("store clean records"),
        ];
        let feature = extractor
            .aggregate_file_features(&children, "io.py", "src/io.py")
            .await;
        assert!(feature.description.starts_with("load"));
    }

    #[test]
    fn test_token_estimate_bounded() {
        let huge = input("x", ENTITY_TOKEN_CAP * 8);
        assert_eq!(
            SemanticExtractor::estimate_entity_tokens(&huge),
            ENTITY_TOKEN_CAP
        );
        let tiny = input("", 0);
        assert_eq!(SemanticExtractor::estimate_entity_tokens(&tiny), 1);
    }
}
