//! FindBestParent: top-down semantic routing of a feature into the
//! functional hierarchy.
//!
//! Child selection prefers the LLM, falls back to embedding similarity,
//! and finally picks the first candidate deterministically (warning once).
//! Routing submissions are revision-checked: a stale revision is rejected
//! with the graph untouched.

use crate::embeddings::{EmbeddingGenerator, cosine_similarity};
use crate::llm::LlmClient;
use rpg_core::error::RpgError;
use rpg_core::graph::Rpg;
use rpg_core::node::SemanticFeature;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const ROUTING_SYSTEM: &str = "\
You are a code architecture classifier. Given an entity's semantic feature
and candidate categories, select the most semantically compatible category.

Respond with JSON only:
{\"selectedId\": \"<candidate id or null>\", \"confidence\": 0.0-1.0}";

#[derive(Deserialize)]
struct RouteResponse {
    #[serde(rename = "selectedId")]
    selected_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    confidence: f64,
}

/// Routes entity features to their best high-level parent.
pub struct SemanticRouter<'a> {
    llm: Option<&'a LlmClient>,
    embedder: Option<&'a EmbeddingGenerator>,
    llm_attempts: AtomicU64,
    warned_deterministic: AtomicBool,
}

impl<'a> SemanticRouter<'a> {
    pub fn new(llm: Option<&'a LlmClient>, embedder: Option<&'a EmbeddingGenerator>) -> Self {
        Self {
            llm,
            embedder,
            llm_attempts: AtomicU64::new(0),
            warned_deterministic: AtomicBool::new(false),
        }
    }

    /// All LLM routing attempts so far, including failed ones.
    pub fn llm_attempts(&self) -> u64 {
        self.llm_attempts.load(Ordering::Relaxed)
    }

    /// Descend from the hierarchy roots, selecting the best child at each
    /// level until reaching a node with no high-level children. Returns
    /// `None` when the hierarchy is empty.
    pub async fn find_best_parent(
        &self,
        rpg: &Rpg,
        feature: &SemanticFeature,
    ) -> Option<String> {
        let mut candidates: Vec<(String, String)> = rpg
            .functional_roots()
            .iter()
            .map(|n| (n.id.clone(), n.feature.description.clone()))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        loop {
            let best = self.select_best_child(feature, &candidates).await?;
            let children: Vec<(String, String)> = rpg
                .high_level_children(&best)
                .iter()
                .map(|n| (n.id.clone(), n.feature.description.clone()))
                .collect();
            if children.is_empty() {
                return Some(best);
            }
            candidates = children;
        }
    }

    /// Select among candidate `(id, description)` pairs: LLM → embeddings →
    /// first candidate.
    async fn select_best_child(
        &self,
        feature: &SemanticFeature,
        candidates: &[(String, String)],
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return Some(candidates[0].0.clone());
        }

        if let Some(llm) = self.llm {
            self.llm_attempts.fetch_add(1, Ordering::Relaxed);
            let prompt = build_routing_prompt(feature, candidates);
            match llm.complete_json::<RouteResponse>(&prompt, ROUTING_SYSTEM).await {
                Ok(RouteResponse {
                    selected_id: Some(id),
                    ..
                }) if candidates.iter().any(|(cid, _)| *cid == id) => {
                    return Some(id);
                }
                Ok(_) => {
                    tracing::warn!("LLM routing returned no valid candidate; trying embeddings");
                }
                Err(e) => {
                    tracing::warn!("LLM routing failed ({e}); trying embeddings");
                }
            }
        }

        if let Some(embedder) = self.embedder
            && let Some(best) = self.embed_select(embedder, feature, candidates).await
        {
            return Some(best);
        }

        if !self.warned_deterministic.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "no LLM or embedding provider for routing; picking first candidate deterministically"
            );
        }
        Some(candidates[0].0.clone())
    }

    async fn embed_select(
        &self,
        embedder: &EmbeddingGenerator,
        feature: &SemanticFeature,
        candidates: &[(String, String)],
    ) -> Option<String> {
        let anchor = embedder.embed(&feature.description).await.ok()?;
        let texts: Vec<String> = candidates.iter().map(|(_, desc)| desc.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await.ok()?;

        let mut best: Option<(usize, f64)> = None;
        for (i, embedding) in embeddings.iter().enumerate() {
            let Ok(embedding) = embedding else { continue };
            let similarity = cosine_similarity(&anchor.vector, &embedding.vector);
            if best.is_none_or(|(_, s)| similarity > s) {
                best = Some((i, similarity));
            }
        }
        best.map(|(i, _)| candidates[i].0.clone())
    }
}

/// Revision-checked routing submission: verifies the caller's revision
/// against the graph before attaching the node to the chosen parent.
pub fn submit_routing(
    rpg: &mut Rpg,
    revision: &str,
    parent_id: &str,
    node_id: &str,
) -> Result<(), RpgError> {
    rpg.check_revision(revision)?;
    rpg.add_functional_edge(parent_id, node_id)?;
    Ok(())
}

fn build_routing_prompt(feature: &SemanticFeature, candidates: &[(String, String)]) -> String {
    let mut prompt = format!("### Entity feature\n{}\n", feature.description);
    if !feature.keywords.is_empty() {
        let keywords: Vec<&str> = feature.keywords.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Keywords: {}\n", keywords.join(", ")));
    }
    prompt.push_str("\n### Candidates\n");
    for (id, description) in candidates {
        prompt.push_str(&format!("- {id}: {description}\n"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpg_core::config::RpgConfig;
    use rpg_core::node::{HighLevelNode, LowLevelNode, NodeMetadata};

    fn high(id: &str, desc: &str) -> HighLevelNode {
        HighLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new(desc),
            metadata: None,
        }
    }

    fn hierarchy() -> Rpg {
        let mut rpg = Rpg::new(RpgConfig::default());
        rpg.add_high_level_node(high("domain:Data", "coordinate data concerns"));
        rpg.add_high_level_node(high("domain:Data/load data", "load data"));
        rpg.add_high_level_node(high(
            "domain:Data/load data/parse rows",
            "parse rows",
        ));
        rpg.add_functional_edge("domain:Data", "domain:Data/load data")
            .unwrap();
        rpg.add_functional_edge("domain:Data/load data", "domain:Data/load data/parse rows")
            .unwrap();
        rpg
    }

    #[tokio::test]
    async fn test_deterministic_descent_without_providers() {
        let rpg = hierarchy();
        let router = SemanticRouter::new(None, None);
        let parent = router
            .find_best_parent(&rpg, &SemanticFeature::new("parse csv rows"))
            .await;
        // Single chains descend to the leaf subcategory
        assert_eq!(parent.as_deref(), Some("domain:Data/load data/parse rows"));
        assert_eq!(router.llm_attempts(), 0);
    }

    #[tokio::test]
    async fn test_empty_hierarchy_routes_nowhere() {
        let rpg = Rpg::new(RpgConfig::default());
        let router = SemanticRouter::new(None, None);
        assert!(
            router
                .find_best_parent(&rpg, &SemanticFeature::new("parse csv rows"))
                .await
                .is_none()
        );
    }

    #[test]
    fn test_submit_routing_checks_revision() {
        let mut rpg = hierarchy();
        rpg.add_low_level_node(LowLevelNode {
            id: "new.py:file".to_string(),
            feature: SemanticFeature::new("parse new rows"),
            metadata: NodeMetadata::default(),
            source_code: None,
        });

        let stale = "0000000000000000";
        let err = submit_routing(
            &mut rpg,
            stale,
            "domain:Data/load data/parse rows",
            "new.py:file",
        )
        .unwrap_err();
        assert!(matches!(err, RpgError::StaleRevision { .. }));
        // Graph unchanged: the node has no parent yet
        assert!(rpg.get_parent("new.py:file").is_none());

        let current = rpg.revision();
        submit_routing(
            &mut rpg,
            &current,
            "domain:Data/load data/parse rows",
            "new.py:file",
        )
        .unwrap();
        assert_eq!(
            rpg.get_parent("new.py:file").unwrap().id(),
            "domain:Data/load data/parse rows"
        );
    }
}
