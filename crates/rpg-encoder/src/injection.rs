//! Dependency and data-flow edge injection.
//!
//! File-to-file wiring comes from resolved imports, calls, and inheritance
//! relations; intra-module flows are self-loops on the owning entity node;
//! inter-module flows follow resolved relative imports. All edges share the
//! graph's `(source, target)` dedup slot, import winning over call/inherit.

use crate::llm::LlmClient;
use anyhow::Result;
use rpg_core::edge::{DataFlowEdge, DataFlowKind, DependencyEdge, DependencyKind};
use rpg_core::graph::Rpg;
use rpg_core::node::file_node_id;
use rpg_parser::calls::CallSite;
use rpg_parser::inheritance::{InheritKind, InheritanceRelation};
use rpg_parser::resolver::SymbolResolver;
use rpg_parser::type_infer::TypeInferrer;
use serde::Deserialize;

/// Inject file→file import edges from each file's resolved imports.
/// Self-loops are skipped.
pub fn inject_import_edges(rpg: &mut Rpg, resolver: &SymbolResolver, files: &[String]) -> usize {
    let mut added = 0;
    for file in files {
        let source_id = file_node_id(file);
        for (symbol, target_file) in resolver.resolved_imports(file) {
            if target_file == *file {
                continue;
            }
            let target_id = file_node_id(&target_file);
            if !rpg.has_node(&source_id) || !rpg.has_node(&target_id) {
                continue;
            }
            let edge = DependencyEdge {
                source: source_id.clone(),
                target: target_id,
                kind: DependencyKind::Import,
                symbol: Some(symbol),
                target_symbol: None,
                line: None,
            };
            if rpg.add_dependency_edge(edge).unwrap_or(false) {
                added += 1;
            }
        }
    }
    added
}

/// Inject file→file call edges from resolved call sites. The type inferrer
/// upgrades variable receivers to a qualified `Class.method` target symbol
/// when it can.
pub fn inject_call_edges(
    rpg: &mut Rpg,
    resolver: &SymbolResolver,
    inferrer: &TypeInferrer,
    calls: &[CallSite],
    caller_source: impl Fn(&str) -> Option<String>,
) -> usize {
    let mut added = 0;
    for call in calls {
        let Some(resolved) = resolver.resolve_call(call) else {
            continue;
        };
        if resolved.target_file == resolved.source_file {
            continue;
        }
        let source_id = file_node_id(&resolved.source_file);
        let target_id = file_node_id(&resolved.target_file);
        if !rpg.has_node(&source_id) || !rpg.has_node(&target_id) {
            continue;
        }

        let caller_class = call
            .caller_entity
            .as_deref()
            .and_then(|entity| entity.split('.').next())
            .filter(|first| first.chars().next().is_some_and(char::is_uppercase));
        let body = caller_source(&call.caller_file).unwrap_or_default();
        let target_symbol = inferrer.resolve(call, caller_class, &body);

        let edge = DependencyEdge {
            source: source_id,
            target: target_id,
            kind: DependencyKind::Call,
            symbol: Some(resolved.symbol),
            target_symbol,
            line: Some(call.line),
        };
        if rpg.add_dependency_edge(edge).unwrap_or(false) {
            added += 1;
        }
    }
    added
}

/// Inject file→file inherit/implement edges from resolved relations.
pub fn inject_inheritance_edges(
    rpg: &mut Rpg,
    resolver: &SymbolResolver,
    relations: &[InheritanceRelation],
) -> usize {
    let mut added = 0;
    for relation in relations {
        let Some(resolved) = resolver.resolve_inheritance(relation) else {
            continue;
        };
        if resolved.target_file == resolved.source_file {
            continue;
        }
        let source_id = file_node_id(&resolved.source_file);
        let target_id = file_node_id(&resolved.target_file);
        if !rpg.has_node(&source_id) || !rpg.has_node(&target_id) {
            continue;
        }

        let kind = match resolved.kind {
            InheritKind::Inherit => DependencyKind::Inherit,
            InheritKind::Implement => DependencyKind::Implement,
        };
        let edge = DependencyEdge {
            source: source_id,
            target: target_id,
            kind,
            symbol: Some(resolved.parent_class),
            target_symbol: None,
            line: None,
        };
        if rpg.add_dependency_edge(edge).unwrap_or(false) {
            added += 1;
        }
    }
    added
}

/// Parameters that flow onward inside a body: the name reappears as an
/// argument of some inner call (between `(`/`,` and `,`/`)`).
pub fn detect_parameter_flows(parameters: &[String], body: &str) -> Vec<String> {
    // The first line is the signature — a parameter trivially appears there.
    let body = body.split_once('\n').map_or("", |(_, rest)| rest);
    parameters
        .iter()
        .filter(|param| !param.is_empty() && *param != "self" && appears_as_argument(body, param))
        .cloned()
        .collect()
}

fn appears_as_argument(body: &str, name: &str) -> bool {
    let bytes = body.as_bytes();
    let mut from = 0;
    while let Some(pos) = body[from..].find(name) {
        let start = from + pos;
        let end = start + name.len();
        from = end;

        // Whole-word match only
        let before_ident = start > 0 && is_ident_byte(bytes[start - 1]);
        let after_ident = end < bytes.len() && is_ident_byte(bytes[end]);
        if before_ident || after_ident {
            continue;
        }

        let prev = body[..start].trim_end().chars().last();
        let next = body[end..].trim_start().chars().next();
        let opens = matches!(prev, Some('(') | Some(','));
        let closes = matches!(next, Some(')') | Some(','));
        if opens && closes {
            return true;
        }
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Local variables that are assigned once and referenced again later in the
/// same body.
pub fn detect_variable_chains(body: &str) -> Vec<String> {
    let mut chains: Vec<String> = Vec::new();
    let lines: Vec<&str> = body.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(var) = declared_variable(line) else {
            continue;
        };
        if chains.contains(&var) {
            continue;
        }
        let referenced_later = lines[i + 1..]
            .iter()
            .any(|later| references_word(later, &var));
        if referenced_later {
            chains.push(var);
        }
    }
    chains
}

/// The variable declared by a simple assignment line, if any.
fn declared_variable(line: &str) -> Option<String> {
    let line = line
        .trim()
        .trim_start_matches("let ")
        .trim_start_matches("const ")
        .trim_start_matches("var ")
        .trim_start_matches("mut ");
    let (lhs, rhs) = line.split_once('=')?;
    if rhs.starts_with('=') {
        // Equality comparison, not an assignment
        return None;
    }
    let name = lhs.trim().trim_end_matches(':').trim();
    // Strip a `name: Type` annotation
    let name = name.split(':').next().unwrap_or(name).trim();
    if !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.chars().next().unwrap().is_numeric()
    {
        Some(name.to_string())
    } else {
        None
    }
}

fn references_word(line: &str, word: &str) -> bool {
    let bytes = line.as_bytes();
    let mut from = 0;
    while let Some(pos) = line[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        from = end;
        let before = start > 0 && is_ident_byte(bytes[start - 1]);
        let after = end < bytes.len() && is_ident_byte(bytes[end]);
        if !before && !after {
            return true;
        }
    }
    false
}

/// Emit intra-module flow self-loops for one entity node.
pub fn inject_entity_flows(
    rpg: &mut Rpg,
    node_id: &str,
    parameters: &[String],
    body: &str,
) -> usize {
    if !rpg.has_node(node_id) {
        return 0;
    }
    let mut added = 0;
    for param in detect_parameter_flows(parameters, body) {
        let edge = DataFlowEdge {
            from: node_id.to_string(),
            to: node_id.to_string(),
            data_id: param,
            data_type: DataFlowKind::Parameter,
        };
        if rpg.add_data_flow_edge(edge).unwrap_or(false) {
            added += 1;
        }
    }
    for var in detect_variable_chains(body) {
        let edge = DataFlowEdge {
            from: node_id.to_string(),
            to: node_id.to_string(),
            data_id: var,
            data_type: DataFlowKind::VariableChain,
        };
        if rpg.add_data_flow_edge(edge).unwrap_or(false) {
            added += 1;
        }
    }
    added
}

/// Inter-module flows: for every resolved relative import, data flows from
/// the imported file's node into the importer's node.
pub fn inject_import_flows(rpg: &mut Rpg, resolver: &SymbolResolver, files: &[String]) -> usize {
    let mut added = 0;
    for file in files {
        let importer_id = file_node_id(file);
        for (symbol, target_file) in resolver.resolved_imports(file) {
            if target_file == *file {
                continue;
            }
            let imported_id = file_node_id(&target_file);
            if !rpg.has_node(&importer_id) || !rpg.has_node(&imported_id) {
                continue;
            }
            let edge = DataFlowEdge {
                from: imported_id,
                to: importer_id.clone(),
                data_id: symbol,
                data_type: DataFlowKind::Import,
            };
            if rpg.add_data_flow_edge(edge).unwrap_or(false) {
                added += 1;
            }
        }
    }
    added
}

const CROSS_AREA_SYSTEM: &str = "\
You are a software architect analyzing data movement between the functional
areas of a repository. Given each area's contents and the known dependency
edges, identify area-to-area data flows.

Respond with a JSON array:
[{\"source\": \"Area\", \"target\": \"Area\", \"data_id\": \"what flows\", \"data_type\": \"kind\"}]";

#[derive(Deserialize)]
struct CrossAreaFlow {
    source: String,
    target: String,
    data_id: String,
    #[serde(default)]
    data_type: Option<String>,
}

/// LLM-mediated cross-area flow analysis. Only pairs of discovered area
/// names are accepted; self-flows are dropped.
pub async fn inject_cross_area_flows(
    rpg: &mut Rpg,
    llm: &LlmClient,
    areas: &[String],
) -> Result<usize> {
    if areas.is_empty() {
        return Ok(0);
    }

    let prompt = build_cross_area_prompt(rpg, areas);
    let flows = llm
        .complete_json::<Vec<CrossAreaFlow>>(&prompt, CROSS_AREA_SYSTEM)
        .await?;

    let mut added = 0;
    for flow in flows {
        if flow.source == flow.target {
            continue;
        }
        if !areas.contains(&flow.source) || !areas.contains(&flow.target) {
            continue;
        }
        let edge = DataFlowEdge {
            from: rpg_core::node::area_node_id(&flow.source),
            to: rpg_core::node::area_node_id(&flow.target),
            data_id: flow.data_id,
            data_type: flow
                .data_type
                .as_deref()
                .map_or(DataFlowKind::Other("area".to_string()), DataFlowKind::from),
        };
        if rpg.add_data_flow_edge(edge).unwrap_or(false) {
            added += 1;
        }
    }
    Ok(added)
}

fn build_cross_area_prompt(rpg: &Rpg, areas: &[String]) -> String {
    let mut prompt = String::from("### Functional areas\n");
    for area in areas {
        let area_id = rpg_core::node::area_node_id(area);
        prompt.push_str(&format!("\n#### {area}\n"));
        for category in rpg.get_children(&area_id) {
            prompt.push_str(&format!("- {}\n", category.feature().description));
            for subcategory in rpg.get_children(category.id()) {
                prompt.push_str(&format!("  - {}\n", subcategory.feature().description));
            }
        }
    }
    prompt.push_str("\n### Known dependency edges\n");
    for edge in rpg.get_dependency_edges() {
        prompt.push_str(&format!(
            "- {} -{}-> {}\n",
            edge.source,
            edge.kind.as_str(),
            edge.target
        ));
    }
    prompt
}
