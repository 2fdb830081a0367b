//! Versioned JSON document for persisted RPGs.
//!
//! The document is stable and self-describing: `version`, `config`, all
//! nodes, and the three edge sets, with camelCase field names.

use crate::config::RpgConfig;
use crate::edge::{DataFlowEdge, DependencyEdge, FunctionalEdge};
use crate::graph::Rpg;
use crate::node::Node;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CURRENT_VERSION: &str = "1.0.0";

/// The persisted form of an [`Rpg`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpgDocument {
    version: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    config: RpgConfig,
    nodes: Vec<Node>,
    functional_edges: Vec<FunctionalEdge>,
    dependency_edges: Vec<DependencyEdge>,
    data_flow_edges: Vec<DataFlowEdge>,
}

/// Serialize a graph to a pretty-printed JSON document.
pub fn to_json(graph: &Rpg) -> Result<String> {
    let doc = RpgDocument {
        version: CURRENT_VERSION.to_string(),
        created_at: graph.created_at,
        updated_at: graph.updated_at,
        config: graph.config().clone(),
        nodes: graph.nodes().values().cloned().collect(),
        functional_edges: graph.get_functional_edges().to_vec(),
        dependency_edges: graph.get_dependency_edges().to_vec(),
        data_flow_edges: graph.get_data_flow_edges().to_vec(),
    };
    serde_json::to_string_pretty(&doc).context("failed to serialize RPG to JSON")
}

/// Deserialize a graph from a JSON document, validating the version and
/// edge soundness (every edge endpoint must name a present node).
pub fn from_json(json: &str) -> Result<Rpg> {
    let doc: RpgDocument =
        serde_json::from_str(json).context("failed to deserialize RPG from JSON")?;

    if doc.version != CURRENT_VERSION {
        anyhow::bail!(
            "RPG version mismatch: expected {}, found {}",
            CURRENT_VERSION,
            doc.version
        );
    }

    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    for node in doc.nodes {
        nodes.insert(node.id().to_string(), node);
    }

    for edge in &doc.functional_edges {
        require(&nodes, &edge.source)?;
        require(&nodes, &edge.target)?;
    }
    for edge in &doc.dependency_edges {
        require(&nodes, &edge.source)?;
        require(&nodes, &edge.target)?;
    }
    for edge in &doc.data_flow_edges {
        require(&nodes, &edge.from)?;
        require(&nodes, &edge.to)?;
    }

    let mut graph = Rpg::new(doc.config);
    graph.created_at = doc.created_at;
    graph.updated_at = doc.updated_at;
    graph.nodes = nodes;
    graph.functional_edges = doc.functional_edges;
    graph.dependency_edges = doc.dependency_edges;
    graph.data_flow_edges = doc.data_flow_edges;
    Ok(graph)
}

fn require(nodes: &BTreeMap<String, Node>, id: &str) -> Result<()> {
    if nodes.contains_key(id) {
        Ok(())
    } else {
        anyhow::bail!("edge references missing node: {id}")
    }
}
