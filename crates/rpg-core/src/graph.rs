//! The Repository Planning Graph: a node map plus functional, dependency,
//! and data-flow edge sets with CASCADE removal semantics.

use crate::config::RpgConfig;
use crate::edge::{
    DataFlowEdge, DependencyEdge, DependencyKind, EdgeClass, EdgeRef, FunctionalEdge,
};
use crate::error::RpgError;
use crate::node::{EntityType, HighLevelNode, LowLevelNode, Node, NodeMetadata, SemanticFeature};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Aggregate node/edge counts for a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpgStats {
    pub total_nodes: usize,
    pub high_level_nodes: usize,
    pub low_level_nodes: usize,
    pub functional_edges: usize,
    pub dependency_edges: usize,
    pub data_flow_edges: usize,
}

/// The complete Repository Planning Graph.
///
/// Nodes are keyed by unique ID. Edge insertion enforces the uniqueness
/// contract: functional edges are unique per `(source, target)`, dependency
/// edges are unique per `(source, target)` across kinds with import taking
/// precedence, data-flow edges are unique per `(from, to, dataId, dataType)`.
/// Node removal cascades to all incident edges of every class.
#[derive(Debug, Clone)]
pub struct Rpg {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) config: RpgConfig,
    pub(crate) nodes: BTreeMap<String, Node>,
    pub(crate) functional_edges: Vec<FunctionalEdge>,
    pub(crate) dependency_edges: Vec<DependencyEdge>,
    pub(crate) data_flow_edges: Vec<DataFlowEdge>,
}

impl Rpg {
    /// Create an empty graph for the given repository config.
    pub fn new(config: RpgConfig) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            config,
            nodes: BTreeMap::new(),
            functional_edges: Vec::new(),
            dependency_edges: Vec::new(),
            data_flow_edges: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Insert (or replace) a low-level node.
    pub fn add_low_level_node(&mut self, node: LowLevelNode) {
        self.nodes.insert(node.id.clone(), Node::Low(node));
        self.touch();
    }

    /// Insert (or replace) a high-level node.
    pub fn add_high_level_node(&mut self, node: HighLevelNode) {
        self.nodes.insert(node.id.clone(), Node::High(node));
        self.touch();
    }

    /// Update a node's feature and/or metadata in place.
    pub fn update_node(
        &mut self,
        id: &str,
        feature: Option<SemanticFeature>,
        metadata: Option<NodeMetadata>,
    ) -> Result<(), RpgError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| RpgError::NodeNotFound(id.to_string()))?;
        if let Some(feature) = feature {
            *node.feature_mut() = feature;
        }
        if let Some(metadata) = metadata {
            match node {
                Node::Low(n) => n.metadata = metadata,
                Node::High(n) => n.metadata = Some(metadata),
            }
        }
        self.touch();
        Ok(())
    }

    /// Remove a node with CASCADE: all incident edges of every class go with
    /// it, atomically. Idempotent — removing a missing node returns `None`.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        self.functional_edges
            .retain(|e| e.source != id && e.target != id);
        self.dependency_edges
            .retain(|e| e.source != id && e.target != id);
        self.data_flow_edges.retain(|e| e.from != id && e.to != id);
        self.touch();
        Some(node)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// All nodes, keyed by ID.
    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub fn get_high_level_nodes(&self) -> Vec<&HighLevelNode> {
        self.nodes.values().filter_map(Node::as_high).collect()
    }

    pub fn get_low_level_nodes(&self) -> Vec<&LowLevelNode> {
        self.nodes.values().filter_map(Node::as_low).collect()
    }

    /// Low-level nodes whose metadata marks them as files.
    pub fn file_nodes(&self) -> Vec<&LowLevelNode> {
        self.nodes
            .values()
            .filter_map(Node::as_low)
            .filter(|n| n.metadata.entity_type == Some(EntityType::File))
            .collect()
    }

    /// High-level nodes without a functional parent (hierarchy roots).
    pub fn functional_roots(&self) -> Vec<&HighLevelNode> {
        self.nodes
            .values()
            .filter_map(Node::as_high)
            .filter(|n| self.get_parent(&n.id).is_none())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Add a functional (containment) edge. Returns `false` without error if
    /// the edge already exists or the target already has a different parent
    /// (the functional relation stays a forest).
    pub fn add_functional_edge(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<bool, RpgError> {
        self.require_node(source)?;
        self.require_node(target)?;
        if self.functional_edges.iter().any(|e| e.target == target) {
            return Ok(false);
        }
        self.functional_edges.push(FunctionalEdge {
            source: source.to_string(),
            target: target.to_string(),
        });
        self.touch();
        Ok(true)
    }

    /// Add a dependency edge, deduplicating on `(source, target)` across
    /// kinds. An import edge replaces an existing call/inherit/implement edge
    /// for the same pair and is never itself replaced. Duplicate insertion
    /// returns `Ok(false)`.
    pub fn add_dependency_edge(&mut self, edge: DependencyEdge) -> Result<bool, RpgError> {
        self.require_node(&edge.source)?;
        self.require_node(&edge.target)?;
        if let Some(existing) = self
            .dependency_edges
            .iter_mut()
            .find(|e| e.source == edge.source && e.target == edge.target)
        {
            if existing.kind != DependencyKind::Import && edge.kind == DependencyKind::Import {
                *existing = edge;
                self.touch();
                return Ok(true);
            }
            return Ok(false);
        }
        self.dependency_edges.push(edge);
        self.touch();
        Ok(true)
    }

    /// Add a data-flow edge, deduplicating on `(from, to, dataId, dataType)`.
    /// Self-loops are legal (intra-module flows).
    pub fn add_data_flow_edge(&mut self, edge: DataFlowEdge) -> Result<bool, RpgError> {
        self.require_node(&edge.from)?;
        self.require_node(&edge.to)?;
        if self.data_flow_edges.iter().any(|e| {
            e.from == edge.from
                && e.to == edge.to
                && e.data_id == edge.data_id
                && e.data_type == edge.data_type
        }) {
            return Ok(false);
        }
        self.data_flow_edges.push(edge);
        self.touch();
        Ok(true)
    }

    pub fn get_functional_edges(&self) -> &[FunctionalEdge] {
        &self.functional_edges
    }

    pub fn get_dependency_edges(&self) -> &[DependencyEdge] {
        &self.dependency_edges
    }

    pub fn get_data_flow_edges(&self) -> &[DataFlowEdge] {
        &self.data_flow_edges
    }

    /// Functional children of a node, in insertion order.
    pub fn get_children(&self, id: &str) -> Vec<&Node> {
        self.functional_edges
            .iter()
            .filter(|e| e.source == id)
            .filter_map(|e| self.nodes.get(&e.target))
            .collect()
    }

    /// Functional parent of a node, if any.
    pub fn get_parent(&self, id: &str) -> Option<&Node> {
        self.functional_edges
            .iter()
            .find(|e| e.target == id)
            .and_then(|e| self.nodes.get(&e.source))
    }

    /// High-level functional children of a node.
    pub fn high_level_children(&self, id: &str) -> Vec<&HighLevelNode> {
        self.get_children(id)
            .into_iter()
            .filter_map(Node::as_high)
            .collect()
    }

    /// Incoming edges of a node, optionally filtered by edge class.
    pub fn get_in_edges(&self, id: &str, class: Option<EdgeClass>) -> Vec<EdgeRef<'_>> {
        self.edges_where(class, |e| e.target() == id)
    }

    /// Outgoing edges of a node, optionally filtered by edge class.
    pub fn get_out_edges(&self, id: &str, class: Option<EdgeClass>) -> Vec<EdgeRef<'_>> {
        self.edges_where(class, |e| e.source() == id)
    }

    fn edges_where<'a>(
        &'a self,
        class: Option<EdgeClass>,
        pred: impl Fn(&EdgeRef<'a>) -> bool,
    ) -> Vec<EdgeRef<'a>> {
        let mut out = Vec::new();
        if class.is_none() || class == Some(EdgeClass::Functional) {
            out.extend(
                self.functional_edges
                    .iter()
                    .map(EdgeRef::Functional)
                    .filter(&pred),
            );
        }
        if class.is_none() || class == Some(EdgeClass::Dependency) {
            out.extend(
                self.dependency_edges
                    .iter()
                    .map(EdgeRef::Dependency)
                    .filter(&pred),
            );
        }
        if class.is_none() || class == Some(EdgeClass::DataFlow) {
            out.extend(
                self.data_flow_edges
                    .iter()
                    .map(EdgeRef::DataFlow)
                    .filter(&pred),
            );
        }
        out
    }

    // -----------------------------------------------------------------------
    // Config & stats
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &RpgConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: RpgConfig) {
        self.config = config;
        self.touch();
    }

    /// Serialize to the stable JSON document (see [`crate::schema`]).
    pub fn to_json(&self) -> anyhow::Result<String> {
        crate::schema::to_json(self)
    }

    /// Deserialize from the stable JSON document, validating version and
    /// edge soundness.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        crate::schema::from_json(json)
    }

    pub fn stats(&self) -> RpgStats {
        let high = self.nodes.values().filter(|n| n.is_high()).count();
        RpgStats {
            total_nodes: self.nodes.len(),
            high_level_nodes: high,
            low_level_nodes: self.nodes.len() - high,
            functional_edges: self.functional_edges.len(),
            dependency_edges: self.dependency_edges.len(),
            data_flow_edges: self.data_flow_edges.len(),
        }
    }

    fn require_node(&self, id: &str) -> Result<(), RpgError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(RpgError::NodeNotFound(id.to_string()))
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl PartialEq for Rpg {
    /// Structural equality: config, nodes, and edge sets. Timestamps are
    /// excluded so persisted round-trips compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
            && self.nodes == other.nodes
            && self.functional_edges == other.functional_edges
            && self.dependency_edges == other.dependency_edges
            && self.data_flow_edges == other.data_flow_edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::file_node_id;

    fn low(id: &str, desc: &str) -> LowLevelNode {
        LowLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new(desc),
            metadata: NodeMetadata {
                entity_type: Some(EntityType::File),
                path: id.trim_end_matches(":file").to_string(),
                ..NodeMetadata::default()
            },
            source_code: None,
        }
    }

    fn high(id: &str, desc: &str) -> HighLevelNode {
        HighLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new(desc),
            metadata: None,
        }
    }

    fn graph() -> Rpg {
        Rpg::new(RpgConfig {
            name: "fixture".to_string(),
            root_path: "/tmp/fixture".to_string(),
            github: None,
        })
    }

    #[test]
    fn test_cascade_removes_all_incident_edges() {
        let mut g = graph();
        g.add_low_level_node(low(&file_node_id("a.py"), "parse input rows"));
        g.add_low_level_node(low(&file_node_id("b.py"), "store parsed rows"));
        g.add_high_level_node(high("domain:Data", "manage data access"));
        g.add_functional_edge("domain:Data", "a.py:file").unwrap();
        g.add_dependency_edge(DependencyEdge {
            source: "a.py:file".to_string(),
            target: "b.py:file".to_string(),
            kind: DependencyKind::Import,
            symbol: Some("store".to_string()),
            target_symbol: None,
            line: None,
        })
        .unwrap();
        g.add_data_flow_edge(DataFlowEdge {
            from: "a.py:file".to_string(),
            to: "a.py:file".to_string(),
            data_id: "rows".to_string(),
            data_type: crate::edge::DataFlowKind::Parameter,
        })
        .unwrap();

        assert!(g.remove_node("a.py:file").is_some());
        assert!(g.get_functional_edges().is_empty());
        assert!(g.get_dependency_edges().is_empty());
        assert!(g.get_data_flow_edges().is_empty());
        // Idempotent on missing nodes
        assert!(g.remove_node("a.py:file").is_none());
    }

    #[test]
    fn test_dependency_dedup_import_precedence() {
        let mut g = graph();
        g.add_low_level_node(low("a.py:file", "parse input rows"));
        g.add_low_level_node(low("b.py:file", "store parsed rows"));

        let call = DependencyEdge {
            source: "a.py:file".to_string(),
            target: "b.py:file".to_string(),
            kind: DependencyKind::Call,
            symbol: Some("save".to_string()),
            target_symbol: None,
            line: Some(12),
        };
        assert!(g.add_dependency_edge(call.clone()).unwrap());
        // Same pair, call again: no-op
        assert!(!g.add_dependency_edge(call).unwrap());
        assert_eq!(g.get_dependency_edges().len(), 1);

        // Import upgrades the slot
        let import = DependencyEdge {
            source: "a.py:file".to_string(),
            target: "b.py:file".to_string(),
            kind: DependencyKind::Import,
            symbol: Some("Store".to_string()),
            target_symbol: None,
            line: None,
        };
        assert!(g.add_dependency_edge(import).unwrap());
        assert_eq!(g.get_dependency_edges().len(), 1);
        assert_eq!(g.get_dependency_edges()[0].kind, DependencyKind::Import);

        // A later call never downgrades an import
        let call_again = DependencyEdge {
            source: "a.py:file".to_string(),
            target: "b.py:file".to_string(),
            kind: DependencyKind::Call,
            symbol: None,
            target_symbol: None,
            line: None,
        };
        assert!(!g.add_dependency_edge(call_again).unwrap());
        assert_eq!(g.get_dependency_edges()[0].kind, DependencyKind::Import);
    }

    #[test]
    fn test_functional_edges_stay_a_forest() {
        let mut g = graph();
        g.add_high_level_node(high("domain:A", "coordinate area a"));
        g.add_high_level_node(high("domain:B", "coordinate area b"));
        g.add_low_level_node(low("x.py:file", "transform records"));

        assert!(g.add_functional_edge("domain:A", "x.py:file").unwrap());
        // Second parent is refused silently
        assert!(!g.add_functional_edge("domain:B", "x.py:file").unwrap());
        assert_eq!(g.get_functional_edges().len(), 1);
        assert_eq!(g.get_parent("x.py:file").unwrap().id(), "domain:A");
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut g = graph();
        g.add_low_level_node(low("a.py:file", "parse input rows"));
        let err = g
            .add_dependency_edge(DependencyEdge {
                source: "a.py:file".to_string(),
                target: "ghost.py:file".to_string(),
                kind: DependencyKind::Call,
                symbol: None,
                target_symbol: None,
                line: None,
            })
            .unwrap_err();
        assert!(matches!(err, RpgError::NodeNotFound(_)));
        assert!(g.get_dependency_edges().is_empty());
    }

    #[test]
    fn test_in_out_edges_filtered_by_class() {
        let mut g = graph();
        g.add_high_level_node(high("domain:A", "coordinate area a"));
        g.add_low_level_node(low("a.py:file", "parse input rows"));
        g.add_low_level_node(low("b.py:file", "store parsed rows"));
        g.add_functional_edge("domain:A", "a.py:file").unwrap();
        g.add_dependency_edge(DependencyEdge {
            source: "a.py:file".to_string(),
            target: "b.py:file".to_string(),
            kind: DependencyKind::Import,
            symbol: None,
            target_symbol: None,
            line: None,
        })
        .unwrap();

        assert_eq!(g.get_out_edges("a.py:file", None).len(), 1);
        assert_eq!(
            g.get_in_edges("a.py:file", Some(EdgeClass::Functional)).len(),
            1
        );
        assert_eq!(
            g.get_in_edges("b.py:file", Some(EdgeClass::Dependency)).len(),
            1
        );
        assert!(g
            .get_in_edges("b.py:file", Some(EdgeClass::Functional))
            .is_empty());
    }

    #[test]
    fn test_stats() {
        let mut g = graph();
        g.add_high_level_node(high("domain:A", "coordinate area a"));
        g.add_low_level_node(low("a.py:file", "parse input rows"));
        g.add_functional_edge("domain:A", "a.py:file").unwrap();
        let stats = g.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.high_level_nodes, 1);
        assert_eq!(stats.low_level_nodes, 1);
        assert_eq!(stats.functional_edges, 1);
    }

    #[test]
    fn test_update_node() {
        let mut g = graph();
        g.add_low_level_node(low("a.py:file", "parse input rows"));
        g.update_node(
            "a.py:file",
            Some(SemanticFeature::new("validate input rows")),
            None,
        )
        .unwrap();
        assert_eq!(
            g.get_node("a.py:file").unwrap().feature().description,
            "validate input rows"
        );
        assert!(matches!(
            g.update_node("ghost", None, None),
            Err(RpgError::NodeNotFound(_))
        ));
    }
}
