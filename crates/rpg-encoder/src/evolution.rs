//! Incremental evolution: map git diffs to atomic graph updates.
//!
//! A commit range is parsed into per-entity deltas which are applied in
//! strict Delete→Modify→Insert order. Deletions cascade and prune orphaned
//! ancestors; modifications measure semantic drift and re-route when it
//! exceeds the threshold; insertions route through FindBestParent. A single
//! failing entity never aborts the batch — errors are collected per entity.

use crate::embeddings::EmbeddingGenerator;
use crate::extractor::{EntityInput, SemanticExtractor};
use crate::router::SemanticRouter;
use anyhow::{Context, Result};
use rpg_core::error::RpgError;
use rpg_core::graph::Rpg;
use rpg_core::node::{
    CodeEntity, EntityType, LowLevelNode, Node, NodeMetadata, file_node_id,
};
use rpg_parser::entities::{self, Import};
use rpg_parser::languages::Language;
use rpg_parser::resolver::resolve_specifier;
use std::collections::BTreeSet;
use std::path::Path;

/// Options for an evolution run.
#[derive(Debug, Clone)]
pub struct EvolveOptions {
    /// Git commit range, e.g. `HEAD~1..HEAD` or `a..b`.
    pub commit_range: String,
    /// Drift above this threshold re-routes a modified entity.
    pub drift_threshold: f64,
    /// Change ratio above this threshold requests a full re-encode.
    pub force_regenerate_threshold: f64,
    /// Store source code on inserted/updated nodes.
    pub include_source: bool,
}

impl Default for EvolveOptions {
    fn default() -> Self {
        Self {
            commit_range: "HEAD~1..HEAD".to_string(),
            drift_threshold: 0.3,
            force_regenerate_threshold: 0.5,
            include_source: false,
        }
    }
}

/// Which atomic phase an entity error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolvePhase {
    Deletion,
    Modification,
    Insertion,
}

/// A per-entity failure; the batch keeps running.
#[derive(Debug, Clone)]
pub struct EntityError {
    pub entity: String,
    pub phase: EvolvePhase,
    pub error: String,
}

/// Summary of an evolution run.
#[derive(Debug, Default)]
pub struct EvolveReport {
    pub inserted: usize,
    pub deleted: usize,
    pub modified: usize,
    pub rerouted: usize,
    pub pruned_nodes: usize,
    /// Set when the change ratio exceeded the threshold; the graph was not
    /// mutated.
    pub requires_full_encode: bool,
    pub errors: Vec<EntityError>,
}

/// One changed entity, keyed by its stable ID
/// `"{filePath}:{entityType}:{qualifiedName}"`.
#[derive(Debug, Clone)]
pub struct EntityDelta {
    pub stable_id: String,
    pub file_path: String,
    pub entity: CodeEntity,
    pub source: Option<String>,
    /// Imports of the containing file (file deltas only).
    pub imports: Vec<Import>,
}

/// A modification: the old and new versions of an entity.
#[derive(Debug, Clone)]
pub struct ModifiedEntity {
    pub old: EntityDelta,
    pub new: EntityDelta,
}

/// Entity-level deltas parsed from a commit range.
#[derive(Debug, Default)]
pub struct DiffResult {
    pub insertions: Vec<EntityDelta>,
    pub deletions: Vec<String>,
    pub modifications: Vec<ModifiedEntity>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.insertions.len() + self.deletions.len() + self.modifications.len()
    }
}

/// Split a commit range into its two endpoints.
pub fn parse_commit_range(range: &str) -> Result<(String, String), RpgError> {
    let (old, new) = range
        .split_once("..")
        .ok_or_else(|| RpgError::InvalidInput(format!("not a commit range: {range}")))?;
    let old = old.trim();
    let new = new.trim_start_matches('.').trim();
    if old.is_empty() || new.is_empty() {
        return Err(RpgError::InvalidInput(format!("not a commit range: {range}")));
    }
    Ok((old.to_string(), new.to_string()))
}

/// Compute entity-level deltas for a commit range by parsing both versions
/// of every changed source file.
pub fn compute_diff(root: &Path, commit_range: &str) -> Result<DiffResult> {
    let (old_spec, new_spec) = parse_commit_range(commit_range)?;
    let repo = git2::Repository::open(root).context("failed to open git repo")?;
    let old_tree = repo
        .revparse_single(&old_spec)
        .with_context(|| format!("unknown revision: {old_spec}"))?
        .peel_to_commit()?
        .tree()?;
    let new_tree = repo
        .revparse_single(&new_spec)
        .with_context(|| format!("unknown revision: {new_spec}"))?
        .peel_to_commit()?
        .tree()?;

    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

    let mut result = DiffResult::default();
    for delta in diff.deltas() {
        let status = delta.status();
        match status {
            git2::Delta::Added => {
                if let Some(path) = delta.new_file().path().and_then(Path::to_str) {
                    if let Some(content) = blob_content(&repo, &new_tree, path) {
                        result
                            .insertions
                            .extend(file_deltas(path, &content));
                    }
                }
            }
            git2::Delta::Deleted => {
                if let Some(path) = delta.old_file().path().and_then(Path::to_str) {
                    if let Some(content) = blob_content(&repo, &old_tree, path) {
                        for delta in file_deltas(path, &content) {
                            result.deletions.push(delta.stable_id);
                        }
                    }
                }
            }
            git2::Delta::Modified | git2::Delta::Renamed => {
                let old_path = delta.old_file().path().and_then(Path::to_str);
                let new_path = delta.new_file().path().and_then(Path::to_str);
                let (Some(old_path), Some(new_path)) = (old_path, new_path) else {
                    continue;
                };
                let old_content = blob_content(&repo, &old_tree, old_path);
                let new_content = blob_content(&repo, &new_tree, new_path);
                let (Some(old_content), Some(new_content)) = (old_content, new_content) else {
                    continue;
                };
                diff_file_entities(
                    old_path,
                    &old_content,
                    new_path,
                    &new_content,
                    &mut result,
                );
            }
            _ => {}
        }
    }

    Ok(result)
}

fn blob_content(repo: &git2::Repository, tree: &git2::Tree<'_>, path: &str) -> Option<String> {
    if Language::from_path(Path::new(path)).is_none() {
        return None;
    }
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    String::from_utf8(blob.content().to_vec()).ok()
}

/// All deltas of one file version: the file itself first, then its entities.
fn file_deltas(path: &str, content: &str) -> Vec<EntityDelta> {
    let Some(language) = Language::from_path(Path::new(path)) else {
        return Vec::new();
    };
    let parsed = entities::parse(content, language);
    let lines: Vec<&str> = content.lines().collect();

    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    let file_entity = CodeEntity {
        entity_type: EntityType::File,
        name: stem.to_string(),
        start_line: 1,
        end_line: lines.len().max(1),
        start_column: 0,
        end_column: 0,
        parameters: None,
        parent: None,
        documentation: None,
    };

    let mut deltas = vec![EntityDelta {
        stable_id: file_node_id(path),
        file_path: path.to_string(),
        entity: file_entity,
        source: Some(content.to_string()),
        imports: parsed.imports.clone(),
    }];

    for entity in parsed.entities {
        let source = slice_lines(&lines, entity.start_line, entity.end_line);
        deltas.push(EntityDelta {
            stable_id: entity.stable_id(path),
            file_path: path.to_string(),
            entity,
            source: Some(source),
            imports: Vec::new(),
        });
    }
    deltas
}

fn slice_lines(lines: &[&str], start: usize, end: usize) -> String {
    let start = start.saturating_sub(1);
    let end = end.min(lines.len());
    lines[start..end].join("\n")
}

/// Entity-level diff of one modified file.
fn diff_file_entities(
    old_path: &str,
    old_content: &str,
    new_path: &str,
    new_content: &str,
    result: &mut DiffResult,
) {
    let old_deltas = file_deltas(old_path, old_content);
    let new_deltas = file_deltas(new_path, new_content);

    let old_ids: BTreeSet<&str> = old_deltas.iter().map(|d| d.stable_id.as_str()).collect();
    let new_ids: BTreeSet<&str> = new_deltas.iter().map(|d| d.stable_id.as_str()).collect();

    for old in &old_deltas {
        if !new_ids.contains(old.stable_id.as_str()) {
            result.deletions.push(old.stable_id.clone());
        }
    }
    for new in new_deltas {
        if !old_ids.contains(new.stable_id.as_str()) {
            result.insertions.push(new);
        } else if let Some(old) = old_deltas.iter().find(|d| d.stable_id == new.stable_id) {
            // Same entity in both versions: only a content change counts
            if old.source != new.source {
                result.modifications.push(ModifiedEntity {
                    old: old.clone(),
                    new,
                });
            }
        }
    }
}

/// Run a full evolution: diff the commit range, gate on change ratio, and
/// apply the deltas in Delete→Modify→Insert order.
pub async fn evolve(
    rpg: &mut Rpg,
    root: &Path,
    options: &EvolveOptions,
    extractor: &SemanticExtractor<'_>,
    router: &SemanticRouter<'_>,
    embedder: Option<&EmbeddingGenerator>,
) -> Result<EvolveReport> {
    if !root.is_dir() {
        return Err(
            RpgError::InvalidInput(format!("root path does not exist: {}", root.display()))
                .into(),
        );
    }

    let diff = compute_diff(root, &options.commit_range)?;

    // Change-ratio gate: past the threshold an incremental patch is worse
    // than a fresh encode. The graph is left untouched.
    let node_count = rpg.get_low_level_nodes().len();
    let ratio = if node_count == 0 {
        if diff.is_empty() { 0.0 } else { 1.0 }
    } else {
        diff.total_changes() as f64 / node_count as f64
    };
    if ratio > options.force_regenerate_threshold {
        return Ok(EvolveReport {
            requires_full_encode: true,
            ..EvolveReport::default()
        });
    }

    Ok(apply_diff(rpg, &diff, options, extractor, router, embedder).await)
}

/// Apply parsed deltas in strict Delete→Modify→Insert order.
pub async fn apply_diff(
    rpg: &mut Rpg,
    diff: &DiffResult,
    options: &EvolveOptions,
    extractor: &SemanticExtractor<'_>,
    router: &SemanticRouter<'_>,
    embedder: Option<&EmbeddingGenerator>,
) -> EvolveReport {
    let mut report = EvolveReport::default();

    // Phase 1: deletions (CASCADE + orphan pruning). Idempotent on
    // already-missing nodes.
    for stable_id in &diff.deletions {
        match resolve_node_id(rpg, stable_id) {
            Some(node_id) => {
                let parent = rpg.get_parent(&node_id).map(|p| p.id().to_string());
                rpg.remove_node(&node_id);
                report.deleted += 1;
                report.pruned_nodes += prune_orphans(rpg, parent);
            }
            None => {
                tracing::debug!("deletion target already absent: {stable_id}");
            }
        }
    }

    // Phase 2: modifications with drift-based re-routing.
    for modification in &diff.modifications {
        match apply_modification(rpg, modification, options, extractor, router, embedder).await
        {
            Ok(ModifyOutcome::Updated) => report.modified += 1,
            Ok(ModifyOutcome::Rerouted { pruned }) => {
                report.rerouted += 1;
                report.pruned_nodes += pruned;
            }
            Ok(ModifyOutcome::Inserted) => report.inserted += 1,
            Err(e) => report.errors.push(EntityError {
                entity: modification.new.stable_id.clone(),
                phase: EvolvePhase::Modification,
                error: e.to_string(),
            }),
        }
    }

    // Phase 3: insertions, file deltas first so entity routing sees the
    // file node.
    let mut insertions: Vec<&EntityDelta> = diff.insertions.iter().collect();
    insertions.sort_by_key(|d| (d.entity.entity_type != EntityType::File, d.stable_id.clone()));
    for delta in insertions {
        match insert_entity(rpg, delta, options, extractor, router).await {
            Ok(()) => report.inserted += 1,
            Err(e) => report.errors.push(EntityError {
                entity: delta.stable_id.clone(),
                phase: EvolvePhase::Insertion,
                error: e.to_string(),
            }),
        }
    }

    report
}

enum ModifyOutcome {
    Updated,
    Rerouted { pruned: usize },
    /// The node was missing entirely; the change became an insertion.
    Inserted,
}

async fn apply_modification(
    rpg: &mut Rpg,
    modification: &ModifiedEntity,
    options: &EvolveOptions,
    extractor: &SemanticExtractor<'_>,
    router: &SemanticRouter<'_>,
    embedder: Option<&EmbeddingGenerator>,
) -> Result<ModifyOutcome> {
    let delta = &modification.new;
    let Some(node_id) = resolve_node_id(rpg, &delta.stable_id) else {
        insert_entity(rpg, delta, options, extractor, router).await?;
        return Ok(ModifyOutcome::Inserted);
    };

    let old_feature = rpg
        .get_node(&node_id)
        .map(|n| n.feature().clone())
        .ok_or_else(|| RpgError::NodeNotFound(node_id.clone()))?;
    let new_feature = extractor.extract(&entity_input(delta)).await;

    let drift = compute_drift(&old_feature, &new_feature, embedder).await;
    if drift > options.drift_threshold {
        // Semantic drift: the node no longer belongs where it sits. Treat
        // as delete + re-insert so routing can relocate it.
        let parent = rpg.get_parent(&node_id).map(|p| p.id().to_string());
        rpg.remove_node(&node_id);
        let pruned = prune_orphans(rpg, parent);

        let new_id = delta.entity.node_id(&delta.file_path);
        let routed_feature = new_feature.clone();
        let node = build_node(&new_id, delta, new_feature, options);
        rpg.add_low_level_node(node);
        if let Some(parent_id) = router.find_best_parent(rpg, &routed_feature).await {
            rpg.add_functional_edge(&parent_id, &new_id)?;
        }
        return Ok(ModifyOutcome::Rerouted { pruned });
    }

    // Below threshold: update in place.
    rpg.update_node(&node_id, Some(new_feature), Some(metadata_for(delta)))?;
    Ok(ModifyOutcome::Updated)
}

async fn insert_entity(
    rpg: &mut Rpg,
    delta: &EntityDelta,
    options: &EvolveOptions,
    extractor: &SemanticExtractor<'_>,
    router: &SemanticRouter<'_>,
) -> Result<()> {
    let feature = extractor.extract(&entity_input(delta)).await;
    let node_id = if delta.entity.entity_type == EntityType::File {
        file_node_id(&delta.file_path)
    } else {
        delta.entity.node_id(&delta.file_path)
    };

    let routed_feature = feature.clone();
    let node = build_node(&node_id, delta, feature, options);
    rpg.add_low_level_node(node);

    if let Some(parent_id) = router.find_best_parent(rpg, &routed_feature).await {
        rpg.add_functional_edge(&parent_id, &node_id)?;
    }

    // New files get their import wiring best-effort.
    if delta.entity.entity_type == EntityType::File {
        inject_file_imports(rpg, delta);
    }
    Ok(())
}

/// Resolve a stable ID to a graph node: exact match first, then the longest
/// prefix match on `"{filePath}:{entityType}:{entityName}"` (node IDs carry
/// a start line; stable IDs do not).
pub fn resolve_node_id(rpg: &Rpg, stable_id: &str) -> Option<String> {
    if rpg.has_node(stable_id) {
        return Some(stable_id.to_string());
    }

    // Qualified names use `Class.method`; node IDs carry the bare name.
    let prefix = match stable_id.rsplit_once(':') {
        Some((head, qualified)) => {
            let bare = qualified.rsplit('.').next().unwrap_or(qualified);
            format!("{head}:{bare}")
        }
        None => stable_id.to_string(),
    };

    let mut best: Option<(usize, String)> = None;
    for id in rpg.nodes().keys() {
        if !id.starts_with(&prefix) {
            continue;
        }
        let common = common_prefix_len(id, stable_id);
        match &best {
            Some((len, _)) if *len >= common => {}
            _ => best = Some((common, id.clone())),
        }
    }
    best.map(|(_, id)| id)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Remove empty high-level ancestors, walking upward from `start`.
/// Returns the number of pruned nodes.
pub fn prune_orphans(rpg: &mut Rpg, start: Option<String>) -> usize {
    let mut pruned = 0;
    let mut current = start;
    while let Some(id) = current {
        let is_high = matches!(rpg.get_node(&id), Some(Node::High(_)));
        if !is_high || !rpg.get_children(&id).is_empty() {
            break;
        }
        let parent = rpg.get_parent(&id).map(|p| p.id().to_string());
        rpg.remove_node(&id);
        pruned += 1;
        current = parent;
    }
    pruned
}

/// Drift between two features: embedding cosine distance when a provider is
/// configured, else Jaccard distance over keywords, else Jaccard distance
/// over description tokens.
pub async fn compute_drift(
    old: &rpg_core::node::SemanticFeature,
    new: &rpg_core::node::SemanticFeature,
    embedder: Option<&EmbeddingGenerator>,
) -> f64 {
    if let Some(embedder) = embedder {
        let old_embed = embedder.embed(&old.description).await;
        let new_embed = embedder.embed(&new.description).await;
        if let (Ok(old_embed), Ok(new_embed)) = (old_embed, new_embed) {
            return 1.0
                - crate::embeddings::cosine_similarity(&old_embed.vector, &new_embed.vector);
        }
        tracing::warn!("embedding drift failed; falling back to keyword Jaccard");
    }

    if !old.keywords.is_empty() && !new.keywords.is_empty() {
        return jaccard_distance(&old.keywords, &new.keywords);
    }

    let old_tokens: BTreeSet<String> = old
        .description
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    let new_tokens: BTreeSet<String> = new
        .description
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    jaccard_distance(&old_tokens, &new_tokens)
}

/// Jaccard distance: 0.0 both empty, 1.0 when only one side is empty.
pub fn jaccard_distance(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    1.0 - (intersection as f64 / union as f64)
}

fn entity_input(delta: &EntityDelta) -> EntityInput {
    EntityInput {
        entity_type: delta.entity.entity_type,
        name: delta.entity.name.clone(),
        file_path: delta.file_path.clone(),
        parent: delta.entity.parent.clone(),
        source_code: delta.source.clone(),
        documentation: delta.entity.documentation.clone(),
    }
}

fn metadata_for(delta: &EntityDelta) -> NodeMetadata {
    NodeMetadata {
        entity_type: Some(delta.entity.entity_type),
        path: delta.file_path.clone(),
        start_line: Some(delta.entity.start_line),
        end_line: Some(delta.entity.end_line),
        qualified_name: Some(delta.entity.qualified_name()),
        extra: None,
    }
}

fn build_node(
    node_id: &str,
    delta: &EntityDelta,
    feature: rpg_core::node::SemanticFeature,
    options: &EvolveOptions,
) -> LowLevelNode {
    LowLevelNode {
        id: node_id.to_string(),
        feature,
        metadata: metadata_for(delta),
        source_code: if options.include_source {
            delta.source.clone()
        } else {
            None
        },
    }
}

/// Best-effort import edges for a freshly-inserted file: its relative
/// imports are resolved against the file paths already in the graph.
fn inject_file_imports(rpg: &mut Rpg, delta: &EntityDelta) {
    let known_files: BTreeSet<String> = rpg
        .file_nodes()
        .iter()
        .map(|n| n.metadata.path.clone())
        .collect();
    let source_id = file_node_id(&delta.file_path);

    for import in &delta.imports {
        let names: Vec<String> = if import.names.is_empty() {
            import
                .module
                .rsplit(['/', '.'])
                .next()
                .map(String::from)
                .into_iter()
                .collect()
        } else {
            import.names.clone()
        };
        let Some(target_file) =
            resolve_specifier(&import.module, &delta.file_path, &known_files)
        else {
            continue;
        };
        if target_file == delta.file_path {
            continue;
        }
        let target_id = file_node_id(&target_file);
        if !rpg.has_node(&target_id) {
            continue;
        }
        for name in names {
            let edge = rpg_core::edge::DependencyEdge {
                source: source_id.clone(),
                target: target_id.clone(),
                kind: rpg_core::edge::DependencyKind::Import,
                symbol: Some(name),
                target_symbol: None,
                line: Some(import.line),
            };
            let _ = rpg.add_dependency_edge(edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpg_core::config::{EncoderConfig, RpgConfig};
    use rpg_core::node::{HighLevelNode, SemanticFeature};

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_commit_range() {
        assert_eq!(
            parse_commit_range("HEAD~1..HEAD").unwrap(),
            ("HEAD~1".to_string(), "HEAD".to_string())
        );
        assert_eq!(
            parse_commit_range("a...b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert!(parse_commit_range("HEAD").is_err());
        assert!(parse_commit_range("..").is_err());
    }

    #[test]
    fn test_jaccard_drift_fallback() {
        // {auth, login} vs {auth, logout}: 1 - 1/3 ≈ 0.667
        let old = keywords(&["auth", "login"]);
        let new = keywords(&["auth", "logout"]);
        let drift = jaccard_distance(&old, &new);
        assert!((drift - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
        assert!(drift > 0.3);
    }

    #[test]
    fn test_jaccard_degenerate_cases() {
        assert_eq!(jaccard_distance(&keywords(&[]), &keywords(&[])), 0.0);
        assert_eq!(jaccard_distance(&keywords(&["a"]), &keywords(&[])), 1.0);
        assert_eq!(jaccard_distance(&keywords(&["a"]), &keywords(&["a"])), 0.0);
    }

    #[tokio::test]
    async fn test_drift_description_token_fallback() {
        let old = SemanticFeature::new("parse config values");
        let new = SemanticFeature::new("parse config values");
        assert_eq!(compute_drift(&old, &new, None).await, 0.0);

        let changed = SemanticFeature::new("emit binary payloads");
        assert_eq!(compute_drift(&old, &changed, None).await, 1.0);
    }

    fn graph() -> Rpg {
        Rpg::new(RpgConfig::default())
    }

    fn high(id: &str, desc: &str) -> HighLevelNode {
        HighLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new(desc),
            metadata: None,
        }
    }

    fn low(id: &str, desc: &str, kw: &[&str]) -> LowLevelNode {
        LowLevelNode {
            id: id.to_string(),
            feature: SemanticFeature {
                description: desc.to_string(),
                sub_features: Vec::new(),
                keywords: keywords(kw),
            },
            metadata: NodeMetadata::default(),
            source_code: None,
        }
    }

    #[test]
    fn test_prune_orphans_recurses_upward() {
        let mut rpg = graph();
        rpg.add_high_level_node(high("domain:A", "coordinate area a"));
        rpg.add_high_level_node(high("domain:A/b", "do b things"));
        rpg.add_high_level_node(high("domain:A/b/c", "do c things"));
        rpg.add_low_level_node(low("x.py:file", "transform x", &[]));
        rpg.add_functional_edge("domain:A", "domain:A/b").unwrap();
        rpg.add_functional_edge("domain:A/b", "domain:A/b/c").unwrap();
        rpg.add_functional_edge("domain:A/b/c", "x.py:file").unwrap();

        let parent = rpg.get_parent("x.py:file").map(|p| p.id().to_string());
        rpg.remove_node("x.py:file");
        let pruned = prune_orphans(&mut rpg, parent);

        // The whole empty chain is gone
        assert_eq!(pruned, 3);
        assert!(!rpg.has_node("domain:A/b/c"));
        assert!(!rpg.has_node("domain:A/b"));
        assert!(!rpg.has_node("domain:A"));
    }

    #[test]
    fn test_prune_stops_at_populated_ancestor() {
        let mut rpg = graph();
        rpg.add_high_level_node(high("domain:A", "coordinate area a"));
        rpg.add_high_level_node(high("domain:A/b", "do b things"));
        rpg.add_high_level_node(high("domain:A/other", "do other things"));
        rpg.add_low_level_node(low("x.py:file", "transform x", &[]));
        rpg.add_low_level_node(low("y.py:file", "transform y", &[]));
        rpg.add_functional_edge("domain:A", "domain:A/b").unwrap();
        rpg.add_functional_edge("domain:A", "domain:A/other").unwrap();
        rpg.add_functional_edge("domain:A/b", "x.py:file").unwrap();
        rpg.add_functional_edge("domain:A/other", "y.py:file").unwrap();

        let parent = rpg.get_parent("x.py:file").map(|p| p.id().to_string());
        rpg.remove_node("x.py:file");
        let pruned = prune_orphans(&mut rpg, parent);

        assert_eq!(pruned, 1);
        assert!(!rpg.has_node("domain:A/b"));
        // A still has the other branch
        assert!(rpg.has_node("domain:A"));
    }

    #[test]
    fn test_resolve_node_id_exact_and_prefix() {
        let mut rpg = graph();
        rpg.add_low_level_node(low("a.py:file", "define module", &[]));
        rpg.add_low_level_node(low("a.py:function:load:10", "load rows", &[]));
        rpg.add_low_level_node(low("a.py:method:save:20", "save rows", &[]));

        // Exact: file node
        assert_eq!(resolve_node_id(&rpg, "a.py:file").unwrap(), "a.py:file");
        // Prefix: stable ID lacks the start line
        assert_eq!(
            resolve_node_id(&rpg, "a.py:function:load").unwrap(),
            "a.py:function:load:10"
        );
        // Qualified method name resolves through the bare name
        assert_eq!(
            resolve_node_id(&rpg, "a.py:method:Store.save").unwrap(),
            "a.py:method:save:20"
        );
        assert!(resolve_node_id(&rpg, "a.py:function:ghost").is_none());
    }

    fn delta(stable_id: &str, path: &str, name: &str, ty: EntityType, src: &str) -> EntityDelta {
        EntityDelta {
            stable_id: stable_id.to_string(),
            file_path: path.to_string(),
            entity: CodeEntity {
                entity_type: ty,
                name: name.to_string(),
                start_line: 1,
                end_line: 3,
                start_column: 0,
                end_column: 0,
                parameters: None,
                parent: None,
                documentation: None,
            },
            source: Some(src.to_string()),
            imports: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_diff_is_noop() {
        let mut rpg = graph();
        rpg.add_low_level_node(low("a.py:file", "define module", &[]));
        let before = rpg.revision();

        let config = EncoderConfig::default();
        let extractor = SemanticExtractor::new(None, None, &config);
        let router = SemanticRouter::new(None, None);
        let report = apply_diff(
            &mut rpg,
            &DiffResult::default(),
            &EvolveOptions::default(),
            &extractor,
            &router,
            None,
        )
        .await;

        assert_eq!(report.inserted, 0);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.modified, 0);
        assert_eq!(report.rerouted, 0);
        assert_eq!(report.pruned_nodes, 0);
        assert_eq!(rpg.revision(), before);
    }

    #[tokio::test]
    async fn test_delete_modify_insert_scheduling() {
        // S4: delete X, modify Y with high drift, insert Z →
        // deleted=1, rerouted=1, inserted=1, modified=0
        let mut rpg = graph();
        rpg.add_high_level_node(high("domain:A", "coordinate records"));
        rpg.add_high_level_node(high("domain:A/work items", "track work items"));
        rpg.add_functional_edge("domain:A", "domain:A/work items").unwrap();

        rpg.add_low_level_node(low(
            "x.py:function:gone:1",
            "remove stale entries",
            &["stale"],
        ));
        rpg.add_low_level_node(low(
            "y.py:function:shift:1",
            "authenticate login sessions",
            &["auth", "login"],
        ));
        // A third entity keeps the subcategory populated through the churn
        rpg.add_low_level_node(low("w.py:function:keep:1", "track open items", &["items"]));
        rpg.add_functional_edge("domain:A/work items", "x.py:function:gone:1")
            .unwrap();
        rpg.add_functional_edge("domain:A/work items", "y.py:function:shift:1")
            .unwrap();
        rpg.add_functional_edge("domain:A/work items", "w.py:function:keep:1")
            .unwrap();

        let diff = DiffResult {
            deletions: vec!["x.py:function:gone".to_string()],
            modifications: vec![ModifiedEntity {
                old: delta(
                    "y.py:function:shift",
                    "y.py",
                    "shift",
                    EntityType::Function,
                    "def shift(): old",
                ),
                new: delta(
                    "y.py:function:shift",
                    "y.py",
                    "shift",
                    EntityType::Function,
                    "def shift(): new",
                ),
            }],
            insertions: vec![delta(
                "z.py:function:fresh",
                "z.py",
                "fresh",
                EntityType::Function,
                "def fresh(): pass",
            )],
        };

        let config = EncoderConfig::default();
        let extractor = SemanticExtractor::new(None, None, &config);
        let router = SemanticRouter::new(None, None);
        let report = apply_diff(
            &mut rpg,
            &diff,
            &EvolveOptions::default(),
            &extractor,
            &router,
            None,
        )
        .await;

        assert!(report.errors.is_empty());
        assert_eq!(report.deleted, 1);
        assert_eq!(report.rerouted, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.modified, 0);

        assert!(!rpg.has_node("x.py:function:gone:1"));
        // The rerouted node landed under the surviving hierarchy leaf
        assert!(rpg.has_node("y.py:function:shift:1"));
        assert_eq!(
            rpg.get_parent("y.py:function:shift:1").unwrap().id(),
            "domain:A/work items"
        );
        assert!(rpg.has_node("z.py:function:fresh:1"));
    }

    #[tokio::test]
    async fn test_low_drift_updates_in_place() {
        let mut rpg = graph();
        rpg.add_low_level_node(low(
            "y.py:function:f:1",
            "parse config values",
            &["parse", "config", "values"],
        ));

        // The heuristic feature for `f` keeps similar keywords when the
        // threshold is high enough not to trigger
        let diff = DiffResult {
            modifications: vec![ModifiedEntity {
                old: delta("y.py:function:f", "y.py", "f", EntityType::Function, "a"),
                new: delta("y.py:function:f", "y.py", "f", EntityType::Function, "b"),
            }],
            ..DiffResult::default()
        };

        let config = EncoderConfig::default();
        let extractor = SemanticExtractor::new(None, None, &config);
        let router = SemanticRouter::new(None, None);
        let options = EvolveOptions {
            drift_threshold: 1.0,
            ..EvolveOptions::default()
        };
        let report =
            apply_diff(&mut rpg, &diff, &options, &extractor, &router, None).await;

        assert_eq!(report.modified, 1);
        assert_eq!(report.rerouted, 0);
        // Node updated in place, same ID
        assert!(rpg.has_node("y.py:function:f:1"));
    }

    #[tokio::test]
    async fn test_missing_modification_target_becomes_insertion() {
        let mut rpg = graph();
        let diff = DiffResult {
            modifications: vec![ModifiedEntity {
                old: delta("g.py:function:g", "g.py", "g", EntityType::Function, "a"),
                new: delta("g.py:function:g", "g.py", "g", EntityType::Function, "b"),
            }],
            ..DiffResult::default()
        };

        let config = EncoderConfig::default();
        let extractor = SemanticExtractor::new(None, None, &config);
        let router = SemanticRouter::new(None, None);
        let report = apply_diff(
            &mut rpg,
            &diff,
            &EvolveOptions::default(),
            &extractor,
            &router,
            None,
        )
        .await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.modified, 0);
        assert!(rpg.has_node("g.py:function:g:1"));
    }
}
