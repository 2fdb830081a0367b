//! Artifact grounding: attach LCA directory paths to high-level nodes.

use rpg_core::graph::Rpg;
use rpg_core::lca::compute_lca;
use rpg_core::node::{EntityType, Node};

/// Ground every hierarchy root: post-order over high-level nodes, each one
/// receiving the LCA set of its descendant files' directories. The
/// lexicographically smallest LCA lands in `metadata.path`; when several
/// LCAs cover the subtree they all go to `metadata.extra.paths` and the
/// node is tagged as a `module`.
pub fn ground(rpg: &mut Rpg) {
    let roots: Vec<String> = rpg
        .functional_roots()
        .iter()
        .map(|n| n.id.clone())
        .collect();
    for root in roots {
        ground_node(rpg, &root);
    }
}

/// Ground one node; returns the directory paths of descendant files.
fn ground_node(rpg: &mut Rpg, id: &str) -> Vec<String> {
    let children: Vec<(String, bool)> = rpg
        .get_children(id)
        .iter()
        .map(|child| (child.id().to_string(), child.is_high()))
        .collect();

    let mut dirs: Vec<String> = Vec::new();
    for (child_id, is_high) in children {
        if is_high {
            dirs.extend(ground_node(rpg, &child_id));
        } else if let Some(Node::Low(node)) = rpg.get_node(&child_id) {
            if !node.metadata.path.is_empty() {
                dirs.push(dir_of(&node.metadata.path));
            }
        }
    }
    dirs.sort();
    dirs.dedup();

    if !dirs.is_empty()
        && let Some(Node::High(node)) = rpg.get_node_mut(id)
    {
        let lcas = compute_lca(&dirs);
        if let Some(smallest) = lcas.first() {
            let mut metadata = node.metadata.take().unwrap_or_default();
            metadata.path = smallest.clone();
            if lcas.len() > 1 {
                metadata.entity_type = Some(EntityType::Module);
                metadata.extra = Some(serde_json::json!({ "paths": lcas }));
            }
            node.metadata = Some(metadata);
        }
    }

    dirs
}

/// Parent directory of a repo-relative path; `"."` for root-level files.
fn dir_of(path: &str) -> String {
    path.rsplit_once('/')
        .map_or(".".to_string(), |(dir, _)| dir.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpg_core::config::RpgConfig;
    use rpg_core::node::{HighLevelNode, LowLevelNode, NodeMetadata, SemanticFeature};

    fn file_node(path: &str) -> LowLevelNode {
        LowLevelNode {
            id: format!("{path}:file"),
            feature: SemanticFeature::new("transform input records"),
            metadata: NodeMetadata {
                entity_type: Some(EntityType::File),
                path: path.to_string(),
                ..NodeMetadata::default()
            },
            source_code: None,
        }
    }

    fn high_node(id: &str) -> HighLevelNode {
        HighLevelNode {
            id: id.to_string(),
            feature: SemanticFeature::new("coordinate data concerns"),
            metadata: None,
        }
    }

    #[test]
    fn test_multi_lca_grounding() {
        // Files in a/b/c, a/b/d, a/e consolidate to LCAs {a/b, a/e}
        let mut rpg = Rpg::new(RpgConfig::default());
        rpg.add_high_level_node(high_node("domain:Data"));
        for path in ["a/b/c/x.py", "a/b/d/y.py", "a/e/z.py"] {
            rpg.add_low_level_node(file_node(path));
            rpg.add_functional_edge("domain:Data", &format!("{path}:file"))
                .unwrap();
        }

        ground(&mut rpg);

        let node = rpg.get_node("domain:Data").unwrap().as_high().unwrap();
        let metadata = node.metadata.as_ref().unwrap();
        assert_eq!(metadata.path, "a/b");
        assert_eq!(metadata.entity_type, Some(EntityType::Module));
        let paths = metadata.extra.as_ref().unwrap()["paths"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["a/b", "a/e"]);
    }

    #[test]
    fn test_single_lca_grounding() {
        let mut rpg = Rpg::new(RpgConfig::default());
        rpg.add_high_level_node(high_node("domain:Data"));
        for path in ["src/data/a.py", "src/data/b.py"] {
            rpg.add_low_level_node(file_node(path));
            rpg.add_functional_edge("domain:Data", &format!("{path}:file"))
                .unwrap();
        }

        ground(&mut rpg);

        let node = rpg.get_node("domain:Data").unwrap().as_high().unwrap();
        let metadata = node.metadata.as_ref().unwrap();
        assert_eq!(metadata.path, "src/data");
        assert!(metadata.extra.is_none());
        assert_ne!(metadata.entity_type, Some(EntityType::Module));
    }

    #[test]
    fn test_grounding_propagates_bottom_up() {
        // Area → subcategory → files: the area sees all descendant dirs
        let mut rpg = Rpg::new(RpgConfig::default());
        rpg.add_high_level_node(high_node("domain:Data"));
        rpg.add_high_level_node(high_node("domain:Data/load"));
        rpg.add_functional_edge("domain:Data", "domain:Data/load")
            .unwrap();
        rpg.add_low_level_node(file_node("src/load/a.py"));
        rpg.add_functional_edge("domain:Data/load", "src/load/a.py:file")
            .unwrap();

        ground(&mut rpg);

        let area = rpg.get_node("domain:Data").unwrap().as_high().unwrap();
        assert_eq!(area.metadata.as_ref().unwrap().path, "src/load");
        let sub = rpg.get_node("domain:Data/load").unwrap().as_high().unwrap();
        assert_eq!(sub.metadata.as_ref().unwrap().path, "src/load");
    }

    #[test]
    fn test_prefix_freeness_invariant() {
        let mut rpg = Rpg::new(RpgConfig::default());
        rpg.add_high_level_node(high_node("domain:Mixed"));
        for path in ["x/y/a.py", "x/y/z/b.py", "w/c.py"] {
            rpg.add_low_level_node(file_node(path));
            rpg.add_functional_edge("domain:Mixed", &format!("{path}:file"))
                .unwrap();
        }

        ground(&mut rpg);

        let node = rpg.get_node("domain:Mixed").unwrap().as_high().unwrap();
        let metadata = node.metadata.as_ref().unwrap();
        let paths: Vec<String> = metadata
            .extra
            .as_ref()
            .map(|e| {
                e["paths"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_else(|| vec![metadata.path.clone()]);
        for a in &paths {
            for b in &paths {
                if a != b {
                    assert!(!b.starts_with(&format!("{a}/")));
                }
            }
        }
    }
}
