//! The encoder orchestrator: semantic lifting → reorganization →
//! grounding & wiring.
//!
//! Phases are strictly ordered. Phase 2 only starts once every Phase 1 node
//! is in the graph and file descriptions are deduplicated; Phase 3 observes
//! the reorganized hierarchy and all file nodes. Every Phase 3 sub-phase is
//! wrapped: failures become warnings, never lost graphs.

use crate::cache::SemanticCache;
use crate::discovery::{self, DiscoveryOptions};
use crate::extractor::{EntityInput, SemanticExtractor};
use crate::grounding;
use crate::hierarchy::{self, HierarchyBuilder};
use crate::injection;
use crate::llm::LlmClient;
use anyhow::Result;
use rpg_core::config::{EncoderConfig, RpgConfig};
use rpg_core::error::RpgError;
use rpg_core::graph::Rpg;
use rpg_core::node::{
    EntityType, LowLevelNode, NodeMetadata, SemanticFeature, file_node_id,
};
use rpg_parser::calls::{CallExtractor, CallSite};
use rpg_parser::entities::{self, ParseResult};
use rpg_parser::inheritance::{InheritanceExtractor, InheritanceRelation};
use rpg_parser::languages::Language;
use rpg_parser::resolver::{ParsedFile, SymbolResolver};
use rpg_parser::type_infer::{ClassInfo, TypeInferrer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

/// Options for an encoding run.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub discovery: DiscoveryOptions,
    /// The operator explicitly requested an LLM; failing to provide one is
    /// fatal rather than a silent degradation.
    pub require_llm: bool,
    /// Store entity source code on low-level nodes.
    pub include_source: bool,
    /// Run the LLM-mediated cross-area data-flow analysis.
    pub cross_area_analysis: bool,
    /// Run the 3-ballot LLM file-exclusion vote before parsing.
    pub exclusion_voting: bool,
    /// Operator-supplied exclusion list (see `discovery::parse_excluded_paths`).
    pub excluded_paths: Vec<String>,
}

/// The outcome of an encoding run.
#[derive(Debug)]
pub struct EncodeResult {
    pub rpg: Rpg,
    pub files_processed: usize,
    pub entities_extracted: usize,
    pub duration: std::time::Duration,
    pub warnings: Vec<String>,
}

/// Everything Phase 1 learned about one file, carried into Phase 3.
struct FileRecord {
    rel_path: String,
    source: String,
    parsed: ParseResult,
    entity_features: Vec<SemanticFeature>,
    file_feature: SemanticFeature,
}

/// Drives the three-phase encoding pipeline.
pub struct Encoder<'a> {
    llm: Option<&'a LlmClient>,
    cache: Option<&'a SemanticCache>,
    config: &'a EncoderConfig,
}

impl<'a> Encoder<'a> {
    pub fn new(
        llm: Option<&'a LlmClient>,
        cache: Option<&'a SemanticCache>,
        config: &'a EncoderConfig,
    ) -> Self {
        Self { llm, cache, config }
    }

    /// Encode a repository into a fresh RPG.
    pub async fn encode(&self, root: &Path, options: &EncodeOptions) -> Result<EncodeResult> {
        let started = Instant::now();

        if !root.is_dir() {
            return Err(RpgError::InvalidInput(format!(
                "root path does not exist: {}",
                root.display()
            ))
            .into());
        }
        if options.require_llm && self.llm.is_none() {
            return Err(RpgError::LlmRequired.into());
        }

        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("repository")
            .to_string();
        let mut rpg = Rpg::new(RpgConfig {
            name,
            root_path: root.display().to_string(),
            github: None,
        });
        let mut warnings: Vec<String> = Vec::new();

        // Phase 1 — semantic lifting.
        let extractor = SemanticExtractor::new(self.llm, self.cache, self.config);
        let records = self
            .lift_phase(root, options, &extractor, &mut rpg, &mut warnings)
            .await;
        warnings.extend(extractor.take_warnings());

        let files_processed = records.len();
        let entities_extracted = records.iter().map(|r| r.parsed.entities.len()).sum();

        // Phase 2 — reorganization. Requires an LLM; skips silently when
        // none was (implicitly) configured.
        let areas = match self.llm {
            Some(llm) => {
                let groups = hierarchy::build_file_groups(&rpg);
                if groups.is_empty() {
                    Vec::new()
                } else {
                    let builder = HierarchyBuilder::new(llm, self.config);
                    match builder.reorganize(&mut rpg, &groups).await {
                        Ok(areas) => areas,
                        Err(e) => {
                            warnings.push(format!("reorganization failed: {e}"));
                            Vec::new()
                        }
                    }
                }
            }
            None => Vec::new(),
        };

        // Phase 3 — grounding & wiring. Each sub-phase failure is a
        // warning; the graph is still returned.
        grounding::ground(&mut rpg);
        self.wiring_phase(&mut rpg, &records, &mut warnings);
        if options.cross_area_analysis
            && let Some(llm) = self.llm
            && !areas.is_empty()
        {
            match injection::inject_cross_area_flows(&mut rpg, llm, &areas).await {
                Ok(added) => tracing::debug!("cross-area analysis added {added} flows"),
                Err(e) => warnings.push(format!("cross-area analysis failed: {e}")),
            }
        }

        Ok(EncodeResult {
            rpg,
            files_processed,
            entities_extracted,
            duration: started.elapsed(),
            warnings,
        })
    }

    /// Phase 1: discovery, parsing, feature extraction, file aggregation,
    /// description dedup, node + containment-edge insertion.
    async fn lift_phase(
        &self,
        root: &Path,
        options: &EncodeOptions,
        extractor: &SemanticExtractor<'_>,
        rpg: &mut Rpg,
        warnings: &mut Vec<String>,
    ) -> Vec<FileRecord> {
        let discovered = match discovery::discover_files(root, &options.discovery) {
            Ok(result) => result,
            Err(e) => {
                warnings.push(format!("file discovery failed: {e}"));
                return Vec::new();
            }
        };
        warnings.extend(discovered.warnings);

        let excluded: BTreeSet<&str> =
            options.excluded_paths.iter().map(String::as_str).collect();
        let mut rel_paths: Vec<String> = discovered
            .files
            .iter()
            .filter_map(|abs| abs.strip_prefix(root).ok())
            .filter_map(|rel| rel.to_str())
            .map(str::to_string)
            .filter(|rel| !excluded.contains(rel.as_str()))
            .collect();

        if options.exclusion_voting && let Some(llm) = self.llm {
            let voted_out = discovery::vote_file_exclusions(llm, &rel_paths).await;
            if !voted_out.is_empty() {
                tracing::info!("exclusion vote removed {} files", voted_out.len());
                rel_paths.retain(|rel| !voted_out.contains(rel));
            }
        }

        // Parse every file and line up all entity inputs for one batched
        // extraction pass.
        let mut parsed_files: Vec<(String, String, ParseResult)> = Vec::new();
        for rel in rel_paths {
            let abs = root.join(&rel);
            let source = match std::fs::read_to_string(&abs) {
                Ok(source) => source,
                Err(e) => {
                    warnings.push(format!("failed to read {rel}: {e}"));
                    continue;
                }
            };
            let Some(language) = Language::from_path(Path::new(&rel)) else {
                continue;
            };
            let parsed = entities::parse(&source, language);
            for error in &parsed.errors {
                warnings.push(format!("{rel}: {error}"));
            }
            parsed_files.push((rel, source, parsed));
        }

        let mut inputs: Vec<EntityInput> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        for (file_idx, (rel, source, parsed)) in parsed_files.iter().enumerate() {
            let lines: Vec<&str> = source.lines().collect();
            for entity in &parsed.entities {
                inputs.push(EntityInput {
                    entity_type: entity.entity_type,
                    name: entity.name.clone(),
                    file_path: rel.clone(),
                    parent: entity.parent.clone(),
                    source_code: Some(entity_body(&lines, entity.start_line, entity.end_line)),
                    documentation: entity.documentation.clone(),
                });
                owners.push(file_idx);
            }
        }

        let features = extractor.extract_batch(&inputs).await;

        let mut per_file_features: Vec<Vec<SemanticFeature>> =
            vec![Vec::new(); parsed_files.len()];
        for (owner, feature) in owners.into_iter().zip(features) {
            per_file_features[owner].push(feature);
        }

        let mut records: Vec<FileRecord> = Vec::new();
        for ((rel, source, parsed), entity_features) in
            parsed_files.into_iter().zip(per_file_features)
        {
            let file_name = rel.rsplit('/').next().unwrap_or(&rel).to_string();
            let file_feature = extractor
                .aggregate_file_features(&entity_features, &file_name, &rel)
                .await;
            records.push(FileRecord {
                rel_path: rel,
                source,
                parsed,
                entity_features,
                file_feature,
            });
        }

        dedup_file_descriptions(&mut records);

        // Insert nodes: file node first, then its children, then the
        // containment edges, so every edge references a present node.
        for record in &records {
            let file_id = file_node_id(&record.rel_path);
            let line_count = record.source.lines().count().max(1);
            rpg.add_low_level_node(LowLevelNode {
                id: file_id.clone(),
                feature: record.file_feature.clone(),
                metadata: NodeMetadata {
                    entity_type: Some(EntityType::File),
                    path: record.rel_path.clone(),
                    start_line: Some(1),
                    end_line: Some(line_count),
                    qualified_name: None,
                    extra: None,
                },
                source_code: None,
            });

            let lines: Vec<&str> = record.source.lines().collect();
            for (entity, feature) in
                record.parsed.entities.iter().zip(&record.entity_features)
            {
                let node_id = entity.node_id(&record.rel_path);
                rpg.add_low_level_node(LowLevelNode {
                    id: node_id.clone(),
                    feature: feature.clone(),
                    metadata: NodeMetadata {
                        entity_type: Some(entity.entity_type),
                        path: record.rel_path.clone(),
                        start_line: Some(entity.start_line),
                        end_line: Some(entity.end_line),
                        qualified_name: Some(entity.qualified_name()),
                        extra: None,
                    },
                    source_code: if options.include_source {
                        Some(entity_body(&lines, entity.start_line, entity.end_line))
                    } else {
                        None
                    },
                });
                let _ = rpg.add_functional_edge(&file_id, &node_id);
            }
        }

        records
    }

    /// Phase 3b/c: dependency edges and data flows.
    fn wiring_phase(&self, rpg: &mut Rpg, records: &[FileRecord], warnings: &mut Vec<String>) {
        let parsed_files: Vec<ParsedFile> = records
            .iter()
            .map(|r| ParsedFile {
                rel_path: r.rel_path.clone(),
                result: r.parsed.clone(),
            })
            .collect();
        let resolver = SymbolResolver::build(&parsed_files);
        let files: Vec<String> = records.iter().map(|r| r.rel_path.clone()).collect();

        // Imports.
        injection::inject_import_edges(rpg, &resolver, &files);

        // Calls and inheritance, with type inference over the repository's
        // classes.
        let mut calls: Vec<CallSite> = Vec::new();
        let mut relations: Vec<InheritanceRelation> = Vec::new();
        let mut sources: BTreeMap<String, String> = BTreeMap::new();
        for record in records {
            let Some(language) = Language::from_path(Path::new(&record.rel_path)) else {
                continue;
            };
            calls.extend(CallExtractor::extract(
                &record.source,
                language,
                &record.rel_path,
            ));
            relations.extend(InheritanceExtractor::extract(
                &record.source,
                language,
                &record.rel_path,
            ));
            sources.insert(record.rel_path.clone(), record.source.clone());
        }

        let inferrer = build_type_inferrer(records, &relations);
        injection::inject_call_edges(rpg, &resolver, &inferrer, &calls, |file| {
            sources.get(file).cloned()
        });
        injection::inject_inheritance_edges(rpg, &resolver, &relations);

        // Data flows: intra-module self-loops and inter-module imports.
        for record in records {
            let lines: Vec<&str> = record.source.lines().collect();
            for entity in &record.parsed.entities {
                let node_id = entity.node_id(&record.rel_path);
                let body = entity_body(&lines, entity.start_line, entity.end_line);
                let parameters = entity.parameters.clone().unwrap_or_default();
                injection::inject_entity_flows(rpg, &node_id, &parameters, &body);
            }
        }
        injection::inject_import_flows(rpg, &resolver, &files);

        // Edge soundness is an invariant, not an expectation of this phase;
        // a violation here means an injector bug.
        if let Err(e) = verify_edge_soundness(rpg) {
            warnings.push(format!("edge injection produced unsound edges: {e}"));
        }
    }
}

/// Build the TypeInferrer's class table from extracted entities and
/// inheritance relations.
fn build_type_inferrer(
    records: &[FileRecord],
    relations: &[InheritanceRelation],
) -> TypeInferrer {
    let mut classes: BTreeMap<String, ClassInfo> = BTreeMap::new();
    for record in records {
        for entity in &record.parsed.entities {
            match entity.entity_type {
                EntityType::Class => {
                    classes
                        .entry(entity.name.clone())
                        .or_insert_with(|| ClassInfo {
                            name: entity.name.clone(),
                            ..ClassInfo::default()
                        });
                }
                EntityType::Method => {
                    if let Some(parent) = &entity.parent {
                        classes
                            .entry(parent.clone())
                            .or_insert_with(|| ClassInfo {
                                name: parent.clone(),
                                ..ClassInfo::default()
                            })
                            .methods
                            .insert(entity.name.clone());
                    }
                }
                _ => {}
            }
        }
    }
    for relation in relations {
        if let Some(info) = classes.get_mut(&relation.child_class)
            && !info.bases.contains(&relation.parent_class)
        {
            info.bases.push(relation.parent_class.clone());
        }
    }

    let mut inferrer = TypeInferrer::new();
    for info in classes.into_values() {
        inferrer.add_class(info);
    }
    inferrer
}

/// Append `_k` suffixes to colliding file-level descriptions so every file
/// node's description is unique within the encode.
fn dedup_file_descriptions(records: &mut [FileRecord]) {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for record in records.iter_mut() {
        let count = seen
            .entry(record.file_feature.description.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        if *count > 1 {
            record.file_feature.description =
                format!("{}_{}", record.file_feature.description, count);
        }
    }
}

fn entity_body(lines: &[&str], start: usize, end: usize) -> String {
    let start = start.saturating_sub(1);
    let end = end.min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

fn verify_edge_soundness(rpg: &Rpg) -> std::result::Result<(), String> {
    for edge in rpg.get_dependency_edges() {
        if !rpg.has_node(&edge.source) || !rpg.has_node(&edge.target) {
            return Err(format!("dangling dependency edge {} -> {}", edge.source, edge.target));
        }
    }
    for edge in rpg.get_data_flow_edges() {
        if !rpg.has_node(&edge.from) || !rpg.has_node(&edge.to) {
            return Err(format!("dangling data-flow edge {} -> {}", edge.from, edge.to));
        }
    }
    Ok(())
}
