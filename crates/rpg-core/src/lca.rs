//! LCA computation over directory paths using trie-based branching analysis.

use std::collections::BTreeMap;

/// A trie node for path prefix analysis. `BTreeMap` keeps traversal order
/// deterministic, which keeps LCA output order deterministic.
#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    is_terminal: bool,
}

impl TrieNode {
    fn insert(&mut self, segments: &[&str]) {
        if segments.is_empty() {
            self.is_terminal = true;
            return;
        }
        self.children
            .entry(segments[0].to_string())
            .or_default()
            .insert(&segments[1..]);
    }
}

/// Compute the Least Common Ancestor directories for a set of directory
/// paths (the directories containing a high-level node's descendant files).
///
/// All directories are inserted into a prefix trie. The walk descends
/// single-child chains, splits once at the first branching point, and inside
/// each branch stops at the first node that is terminal (a directory where
/// files end) or branching — pruning the consolidated subtree below it so
/// each covered path appears exactly once. The result is sorted and
/// prefix-free: no returned path is a prefix of another.
pub fn compute_lca(dirs: &[String]) -> Vec<String> {
    if dirs.is_empty() {
        return Vec::new();
    }

    // All paths in the same directory: that directory is the single LCA.
    if dirs.iter().all(|d| d == &dirs[0]) {
        return vec![dirs[0].clone()];
    }

    let mut root = TrieNode::default();
    for dir in dirs {
        let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
        root.insert(&segments);
    }

    let mut results = Vec::new();
    collect_boundaries(&root, &mut Vec::new(), true, &mut results);
    results.sort();
    results.dedup();
    results
}

fn collect_boundaries(
    node: &TrieNode,
    current: &mut Vec<String>,
    can_split: bool,
    results: &mut Vec<String>,
) {
    // Files end here: this directory is a boundary; the subtree below it is
    // consolidated into it.
    if node.is_terminal {
        results.push(join(current));
        return;
    }

    match node.children.len() {
        0 => {
            // Leaf without terminal marker only happens for the empty input
            // guard above; emit the path defensively.
            results.push(join(current));
        }
        1 => {
            let (segment, child) = node.children.iter().next().unwrap();
            current.push(segment.clone());
            collect_boundaries(child, current, can_split, results);
            current.pop();
        }
        _ if can_split => {
            // First branching point: split once, each branch finds its own
            // boundary.
            for (segment, child) in &node.children {
                current.push(segment.clone());
                collect_boundaries(child, current, false, results);
                current.pop();
            }
        }
        _ => {
            // Branching below the split point: this is the boundary.
            results.push(join(current));
        }
    }
}

fn join(segments: &[String]) -> String {
    if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}
