//! Optimistic-concurrency revision hashing for routing submissions.
//!
//! Callers that compute a routing decision against a graph snapshot echo the
//! snapshot's revision when submitting; a mismatch means the graph moved
//! underneath them and the submission is rejected untouched.

use crate::error::RpgError;
use crate::graph::Rpg;
use sha2::{Digest, Sha256};

/// Length of the hex-encoded revision digest.
const REVISION_LEN: usize = 16;

impl Rpg {
    /// Short digest over the graph's semantic state: sorted node IDs, their
    /// feature descriptions, and the functional edge pairs. Dependency and
    /// data-flow edges are excluded so wiring-only enrichment does not
    /// invalidate in-flight routing submissions.
    pub fn revision(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, node) in &self.nodes {
            hasher.update(id.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(node.feature().description.as_bytes());
            hasher.update(b"\x1e");
        }
        let mut edges: Vec<(&str, &str)> = self
            .functional_edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        edges.sort_unstable();
        for (source, target) in edges {
            hasher.update(source.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(target.as_bytes());
            hasher.update(b"\x1e");
        }
        let digest = hasher.finalize();
        hex_prefix(&digest, REVISION_LEN)
    }

    /// Reject a submission carrying a stale revision.
    pub fn check_revision(&self, submitted: &str) -> Result<(), RpgError> {
        let current = self.revision();
        if submitted == current {
            Ok(())
        } else {
            Err(RpgError::StaleRevision {
                submitted: submitted.to_string(),
                current,
            })
        }
    }
}

/// Hex-encode the first `len` nibbles of a digest.
pub fn hex_prefix(digest: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= len {
            out.truncate(len);
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpgConfig;
    use crate::node::{LowLevelNode, NodeMetadata, SemanticFeature};

    fn graph() -> Rpg {
        Rpg::new(RpgConfig::default())
    }

    fn node(id: &str) -> LowLevelNode {
        LowLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new("transform records"),
            metadata: NodeMetadata::default(),
            source_code: None,
        }
    }

    #[test]
    fn test_revision_is_16_hex() {
        let g = graph();
        let rev = g.revision();
        assert_eq!(rev.len(), 16);
        assert!(rev.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_revision_changes_with_nodes() {
        let mut g = graph();
        let before = g.revision();
        g.add_low_level_node(node("a.py:file"));
        assert_ne!(before, g.revision());
    }

    #[test]
    fn test_stale_revision_rejected() {
        let mut g = graph();
        let old = g.revision();
        g.add_low_level_node(node("a.py:file"));
        let err = g.check_revision(&old).unwrap_err();
        assert!(matches!(err, RpgError::StaleRevision { .. }));
        g.check_revision(&g.revision()).unwrap();
    }
}
