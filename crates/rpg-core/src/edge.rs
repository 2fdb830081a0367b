//! Edge types: containment (functional), dependency wiring, and data flow.

use serde::{Deserialize, Serialize};

/// A containment edge in the functional hierarchy (parent → child).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionalEdge {
    pub source: String,
    pub target: String,
}

/// The kind of a dependency edge between code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Import,
    Call,
    Inherit,
    Implement,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Call => "call",
            Self::Inherit => "inherit",
            Self::Implement => "implement",
        }
    }
}

/// A dependency edge (source depends on target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub kind: DependencyKind,
    /// The symbol referenced at the source (callee or imported name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// The resolved symbol on the target side, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// The kind of data carried by a data-flow edge. Open set: unknown kinds
/// observed in persisted documents round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataFlowKind {
    Import,
    Parameter,
    VariableChain,
    Other(String),
}

impl DataFlowKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Import => "import",
            Self::Parameter => "parameter",
            Self::VariableChain => "variable_chain",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for DataFlowKind {
    fn from(s: &str) -> Self {
        match s {
            "import" => Self::Import,
            "parameter" => Self::Parameter,
            "variable_chain" => Self::VariableChain,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for DataFlowKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataFlowKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A data-flow edge (data moves from → to). Intra-module flows are self-loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFlowEdge {
    pub from: String,
    pub to: String,
    /// What flows: a parameter name, variable name, or imported symbol.
    pub data_id: String,
    pub data_type: DataFlowKind,
}

/// Edge class selector for filtered in/out edge queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    Functional,
    Dependency,
    DataFlow,
}

/// A borrowed view of any edge, returned by in/out edge queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeRef<'a> {
    Functional(&'a FunctionalEdge),
    Dependency(&'a DependencyEdge),
    DataFlow(&'a DataFlowEdge),
}

impl EdgeRef<'_> {
    pub fn source(&self) -> &str {
        match self {
            Self::Functional(e) => &e.source,
            Self::Dependency(e) => &e.source,
            Self::DataFlow(e) => &e.from,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Functional(e) => &e.target,
            Self::Dependency(e) => &e.target,
            Self::DataFlow(e) => &e.to,
        }
    }
}
