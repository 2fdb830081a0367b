//! Node types for the Repository Planning Graph.
//!
//! High-level nodes describe *what* the repository does (functional areas,
//! categories, subcategories); low-level nodes describe *where* that behavior
//! lives (files, classes, functions, methods).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A semantic feature: a verb+object phrase describing purpose, not
/// implementation, plus optional atomic sub-features and keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFeature {
    /// Primary verb+object phrase (3-8 words, lowercase, no punctuation).
    pub description: String,
    /// Additional atomic phrases, ordered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_features: Vec<String>,
    /// Short tokens for matching and aggregation.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keywords: BTreeSet<String>,
}

impl SemanticFeature {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            sub_features: Vec::new(),
            keywords: BTreeSet::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// The kind of code unit a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    File,
    Class,
    Function,
    Method,
    /// Multi-directory high-level nodes after grounding.
    Module,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Module => "module",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An AST-level code entity as produced by the extractor.
/// Lines are 1-indexed and end-inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEntity {
    pub entity_type: EntityType,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    /// Enclosing class name for methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl CodeEntity {
    /// The node ID for this entity within `rel_path`:
    /// `"{relPath}:{entityType}:{name}:{startLine}"`.
    pub fn node_id(&self, rel_path: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            rel_path, self.entity_type, self.name, self.start_line
        )
    }

    /// The stable evolution ID: `"{filePath}:{entityType}:{qualifiedName}"`.
    pub fn stable_id(&self, rel_path: &str) -> String {
        format!("{}:{}:{}", rel_path, self.entity_type, self.qualified_name())
    }

    /// Dot-qualified name (`Class.method` for methods, bare name otherwise).
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent, self.name),
            None => self.name.clone(),
        }
    }
}

/// Structural metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A low-level node: a concrete code unit (file, class, function, method).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowLevelNode {
    pub id: String,
    pub feature: SemanticFeature,
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
}

/// A high-level node: a functional area, category, or subcategory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighLevelNode {
    pub id: String,
    pub feature: SemanticFeature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
}

/// Either node kind, as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "camelCase")]
pub enum Node {
    High(HighLevelNode),
    Low(LowLevelNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Self::High(n) => &n.id,
            Self::Low(n) => &n.id,
        }
    }

    pub fn feature(&self) -> &SemanticFeature {
        match self {
            Self::High(n) => &n.feature,
            Self::Low(n) => &n.feature,
        }
    }

    pub fn feature_mut(&mut self) -> &mut SemanticFeature {
        match self {
            Self::High(n) => &mut n.feature,
            Self::Low(n) => &mut n.feature,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Self::High(_))
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low(_))
    }

    pub fn as_low(&self) -> Option<&LowLevelNode> {
        match self {
            Self::Low(n) => Some(n),
            Self::High(_) => None,
        }
    }

    pub fn as_high(&self) -> Option<&HighLevelNode> {
        match self {
            Self::High(n) => Some(n),
            Self::Low(_) => None,
        }
    }
}

/// ID of the file node for a repo-relative path: `"{relPath}:file"`.
pub fn file_node_id(rel_path: &str) -> String {
    format!("{rel_path}:file")
}

/// ID of a top-level functional area node: `"domain:{Area}"`.
pub fn area_node_id(area: &str) -> String {
    format!("domain:{area}")
}

/// ID of a category node: `"domain:{Area}/{category}"`.
pub fn category_node_id(area: &str, category: &str) -> String {
    format!("domain:{area}/{category}")
}

/// ID of a subcategory node: `"domain:{Area}/{category}/{subcategory}"`.
pub fn subcategory_node_id(area: &str, category: &str, subcategory: &str) -> String {
    format!("domain:{area}/{category}/{subcategory}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_node_id() {
        let entity = CodeEntity {
            entity_type: EntityType::Function,
            name: "load_config".to_string(),
            start_line: 10,
            end_line: 25,
            start_column: 0,
            end_column: 1,
            parameters: None,
            parent: None,
            documentation: None,
        };
        assert_eq!(
            entity.node_id("src/config.py"),
            "src/config.py:function:load_config:10"
        );
        assert_eq!(
            entity.stable_id("src/config.py"),
            "src/config.py:function:load_config"
        );
    }

    #[test]
    fn test_method_qualified_name() {
        let entity = CodeEntity {
            entity_type: EntityType::Method,
            name: "save".to_string(),
            start_line: 3,
            end_line: 8,
            start_column: 4,
            end_column: 5,
            parameters: Some(vec!["self".to_string(), "path".to_string()]),
            parent: Some("Store".to_string()),
            documentation: None,
        };
        assert_eq!(entity.qualified_name(), "Store.save");
        assert_eq!(entity.stable_id("db.py"), "db.py:method:Store.save");
    }

    #[test]
    fn test_domain_id_grammar() {
        assert_eq!(area_node_id("DataAccess"), "domain:DataAccess");
        assert_eq!(
            category_node_id("DataAccess", "load records"),
            "domain:DataAccess/load records"
        );
        assert_eq!(
            subcategory_node_id("DataAccess", "load records", "parse rows"),
            "domain:DataAccess/load records/parse rows"
        );
    }

    #[test]
    fn test_node_serde_tags_level() {
        let node = Node::Low(LowLevelNode {
            id: "a.py:file".to_string(),
            feature: SemanticFeature::new("parse configuration values"),
            metadata: NodeMetadata {
                entity_type: Some(EntityType::File),
                path: "a.py".to_string(),
                ..NodeMetadata::default()
            },
            source_code: None,
        });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["level"], "low");
        assert_eq!(json["metadata"]["entityType"], "file");
    }
}
