//! Structural reorganization: multi-ballot domain discovery and iterative
//! hierarchical assignment into a 3-level functional hierarchy that is
//! independent of on-disk layout.

use crate::llm::LlmClient;
use crate::naming;
use anyhow::Result;
use rpg_core::config::EncoderConfig;
use rpg_core::graph::Rpg;
use rpg_core::node::{
    HighLevelNode, SemanticFeature, area_node_id, category_node_id, subcategory_node_id,
};
use std::collections::{BTreeMap, BTreeSet};

/// Fallback route for groups the assignment loop never placed.
pub const UNCATEGORIZED_PATH: (&str, &str, &str) =
    ("Uncategorized", "general purpose", "miscellaneous");

/// One file inside a feature group.
#[derive(Debug, Clone)]
pub struct GroupFile {
    pub node_id: String,
    pub path: String,
    pub feature: SemanticFeature,
}

/// Files bundled by top-level directory, as presented to the LLM.
#[derive(Debug, Clone)]
pub struct FileFeatureGroup {
    /// Top-level directory, `"."` when the path has no directory component.
    pub label: String,
    pub files: Vec<GroupFile>,
}

/// Group the graph's file nodes by top-level directory.
pub fn build_file_groups(rpg: &Rpg) -> Vec<FileFeatureGroup> {
    let mut groups: BTreeMap<String, Vec<GroupFile>> = BTreeMap::new();
    for node in rpg.file_nodes() {
        let label = node
            .metadata
            .path
            .split_once('/')
            .map_or(".", |(top, _)| top)
            .to_string();
        groups.entry(label).or_default().push(GroupFile {
            node_id: node.id.clone(),
            path: node.metadata.path.clone(),
            feature: node.feature.clone(),
        });
    }
    groups
        .into_iter()
        .map(|(label, files)| FileFeatureGroup { label, files })
        .collect()
}

/// A fully-accepted assignment path.
pub type AreaPath = (String, String, String);

const DOMAIN_DISCOVERY_SYSTEM: &str = "\
You are a software architect identifying the functional areas of a
repository from its file-level features. Name 3-8 areas covering what the
code DOES (domains of responsibility), not how it is laid out on disk.

Respond with a JSON array of PascalCase area names, e.g.
[\"DataIngestion\", \"QueryPlanning\"].";

const ASSIGNMENT_SYSTEM: &str = "\
You are a software architect organizing file groups into a functional
hierarchy. Every path has EXACTLY three segments:
Area/category/subcategory — the Area must come from the provided list,
category and subcategory are lowercase verb+object phrases.

Respond inside <solution> tags with a JSON object mapping paths to group
labels: <solution>{\"Area/category/subcategory\": [\"group\", ...]}</solution>";

/// LLM-driven hierarchy construction.
pub struct HierarchyBuilder<'a> {
    llm: &'a LlmClient,
    config: &'a EncoderConfig,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(llm: &'a LlmClient, config: &'a EncoderConfig) -> Self {
        Self { llm, config }
    }

    /// Run the full reorganization: discover areas, assign groups, build the
    /// 3-level hierarchy in the graph. Returns the discovered area names.
    pub async fn reorganize(
        &self,
        rpg: &mut Rpg,
        groups: &[FileFeatureGroup],
    ) -> Result<Vec<String>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let areas = self.discover_domains(groups).await?;
        let assignments = self.assign_groups(&areas, groups).await;
        apply_assignments(rpg, groups, &assignments);
        Ok(areas)
    }

    /// Multi-ballot domain discovery: `discovery_votes` runs, candidates
    /// normalized to PascalCase and aggregated by frequency (ties broken
    /// alphabetically), truncated to `max_areas`. Fails only when every
    /// ballot returns no valid areas.
    pub async fn discover_domains(
        &self,
        groups: &[FileFeatureGroup],
    ) -> Result<Vec<String>> {
        let prompt = build_discovery_prompt(groups);
        let mut ballots: Vec<Vec<String>> = Vec::new();

        for round in 0..self.config.discovery_votes.max(1) {
            match self
                .llm
                .complete_json::<Vec<String>>(&prompt, DOMAIN_DISCOVERY_SYSTEM)
                .await
            {
                Ok(candidates) => ballots.push(candidates),
                Err(e) => {
                    tracing::warn!("domain discovery ballot {} failed: {e}", round + 1);
                    ballots.push(Vec::new());
                }
            }
        }

        let areas = tally_areas(&ballots, self.config.max_areas);
        if areas.is_empty() {
            anyhow::bail!("domain discovery produced no valid areas");
        }
        Ok(areas)
    }

    /// Iterative assignment: up to `max_assignment_rounds` prompts over the
    /// still-unassigned groups. Terminates early when everything is placed
    /// or a round assigns nothing (stuck).
    pub async fn assign_groups(
        &self,
        areas: &[String],
        groups: &[FileFeatureGroup],
    ) -> BTreeMap<String, AreaPath> {
        let mut assigned: BTreeMap<String, AreaPath> = BTreeMap::new();

        for round in 0..self.config.max_assignment_rounds {
            let unassigned: Vec<&FileFeatureGroup> = groups
                .iter()
                .filter(|g| !assigned.contains_key(&g.label))
                .collect();
            if unassigned.is_empty() {
                break;
            }

            let prompt = build_assignment_prompt(areas, &unassigned);
            let response = match self.llm.complete(&prompt, ASSIGNMENT_SYSTEM).await {
                Ok(completion) => completion.content,
                Err(e) => {
                    tracing::warn!("assignment round {} failed: {e}", round + 1);
                    continue;
                }
            };

            let mapping = parse_assignment_response(&response);
            let mut placed_this_round = 0usize;
            for (path, labels) in mapping {
                let Some(accepted) = accept_path(&path, areas) else {
                    continue;
                };
                for label in labels {
                    let known = groups.iter().any(|g| g.label == label);
                    if known && !assigned.contains_key(&label) {
                        assigned.insert(label, accepted.clone());
                        placed_this_round += 1;
                    }
                }
            }

            if placed_this_round == 0 {
                tracing::warn!("assignment stuck after round {}", round + 1);
                break;
            }
        }

        assigned
    }
}

/// Normalize a candidate area name to PascalCase: split on non-alphanumeric
/// boundaries, title-case each token. Returns `None` for empty candidates.
pub fn normalize_area(raw: &str) -> Option<String> {
    let tokens: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let mut chars = t.chars();
            let first = chars.next().unwrap().to_uppercase().to_string();
            // Preserve interior capitals so camelCase splits cleanly
            format!("{first}{}", chars.as_str())
        })
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(""))
    }
}

/// Aggregate ballots by frequency; ties break alphabetically; at most
/// `max_areas` survive.
pub fn tally_areas(ballots: &[Vec<String>], max_areas: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for ballot in ballots {
        // An area counts once per ballot regardless of repetition.
        let normalized: BTreeSet<String> =
            ballot.iter().filter_map(|c| normalize_area(c)).collect();
        for area in normalized {
            *counts.entry(area).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    // Descending frequency; BTreeMap iteration already sorted names, and
    // sort_by is stable, so ties stay alphabetical.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(max_areas)
        .map(|(area, _)| area)
        .collect()
}

/// Parse a `path → [groupLabel…]` mapping from a `<solution>` block, an
/// `{"assignments": {…}}` object, or a bare top-level object.
pub fn parse_assignment_response(text: &str) -> BTreeMap<String, Vec<String>> {
    let Ok(value) = LlmClient::parse_json_response::<serde_json::Value>(text) else {
        return BTreeMap::new();
    };

    let object = match value.get("assignments") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        _ => match value {
            serde_json::Value::Object(map) => map,
            _ => return BTreeMap::new(),
        },
    };

    object
        .into_iter()
        .filter_map(|(path, labels)| {
            let labels: Vec<String> = match labels {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
                serde_json::Value::String(s) => vec![s],
                _ => return None,
            };
            Some((path, labels))
        })
        .collect()
}

/// Accept a path iff it has exactly three non-empty `/`-separated segments
/// and its area fuzzy-matches the discovered set.
pub fn accept_path(path: &str, areas: &[String]) -> Option<AreaPath> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.trim().is_empty()) {
        return None;
    }
    let area = fuzzy_match_area(segments[0].trim(), areas)?;
    Some((
        area,
        segments[1].trim().to_string(),
        segments[2].trim().to_string(),
    ))
}

/// Exact → case-insensitive → prefix → substring matching against the
/// discovered areas.
pub fn fuzzy_match_area(name: &str, areas: &[String]) -> Option<String> {
    if let Some(exact) = areas.iter().find(|a| *a == name) {
        return Some(exact.clone());
    }
    let lowered = name.to_lowercase();
    if let Some(ci) = areas.iter().find(|a| a.to_lowercase() == lowered) {
        return Some(ci.clone());
    }
    if let Some(prefix) = areas
        .iter()
        .find(|a| a.to_lowercase().starts_with(&lowered) || lowered.starts_with(&a.to_lowercase()))
    {
        return Some(prefix.clone());
    }
    areas
        .iter()
        .find(|a| a.to_lowercase().contains(&lowered) || lowered.contains(&a.to_lowercase()))
        .cloned()
}

/// Build the 3-level hierarchy in the graph from accepted assignments.
/// Unassigned groups route under the Uncategorized fallback. Low-level
/// nodes are only ever edge targets here — the node set is conserved.
pub fn apply_assignments(
    rpg: &mut Rpg,
    groups: &[FileFeatureGroup],
    assignments: &BTreeMap<String, AreaPath>,
) {
    for group in groups {
        let (area, category, subcategory) = assignments
            .get(&group.label)
            .cloned()
            .unwrap_or_else(|| {
                (
                    UNCATEGORIZED_PATH.0.to_string(),
                    UNCATEGORIZED_PATH.1.to_string(),
                    UNCATEGORIZED_PATH.2.to_string(),
                )
            });

        let area_id = area_node_id(&area);
        let category_id = category_node_id(&area, &category);
        let subcategory_id = subcategory_node_id(&area, &category, &subcategory);

        if !rpg.has_node(&area_id) {
            let humanized = naming::humanize(&area);
            rpg.add_high_level_node(HighLevelNode {
                id: area_id.clone(),
                feature: SemanticFeature::new(naming::validate_phrase(&humanized))
                    .with_keywords(humanized.split_whitespace()),
                metadata: None,
            });
        }
        if !rpg.has_node(&category_id) {
            rpg.add_high_level_node(HighLevelNode {
                id: category_id.clone(),
                feature: SemanticFeature::new(naming::validate_phrase(&category)),
                metadata: None,
            });
        }
        if !rpg.has_node(&subcategory_id) {
            rpg.add_high_level_node(HighLevelNode {
                id: subcategory_id.clone(),
                feature: SemanticFeature::new(naming::validate_phrase(&subcategory)),
                metadata: None,
            });
        }

        let _ = rpg.add_functional_edge(&area_id, &category_id);
        let _ = rpg.add_functional_edge(&category_id, &subcategory_id);
        for file in &group.files {
            if rpg.has_node(&file.node_id) {
                let _ = rpg.add_functional_edge(&subcategory_id, &file.node_id);
            }
        }
    }
}

fn build_discovery_prompt(groups: &[FileFeatureGroup]) -> String {
    let mut prompt = String::from("### File groups\n");
    for group in groups {
        prompt.push_str(&format!("\n#### {}\n", group.label));
        for file in &group.files {
            let keywords: Vec<&str> =
                file.feature.keywords.iter().map(String::as_str).collect();
            prompt.push_str(&format!(
                "- {} — {} [{}]\n",
                file.path,
                file.feature.description,
                keywords.join(", ")
            ));
        }
    }
    prompt
}

fn build_assignment_prompt(areas: &[String], unassigned: &[&FileFeatureGroup]) -> String {
    let mut prompt = format!("### Functional areas\n{}\n\n### Unassigned groups\n", areas.join(", "));
    for group in unassigned {
        prompt.push_str(&format!("\n#### {}\n", group.label));
        for file in &group.files {
            prompt.push_str(&format!("- {} — {}\n", file.path, file.feature.description));
        }
    }
    prompt
}
