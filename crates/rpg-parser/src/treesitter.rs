//! Shared tree-sitter parsing helpers.

use crate::languages::Language;

/// Parse source text into a tree-sitter tree. Returns `None` when the
/// grammar fails to load or parsing aborts entirely; trees with syntax
/// errors are still returned (extraction is best-effort).
pub fn parse_tree(source: &str, language: Language) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&language.ts_language()).ok()?;
    parser.parse(source.as_bytes(), None)
}

/// Collect human-readable descriptions of syntax error nodes in a tree.
pub fn collect_errors(tree: &tree_sitter::Tree) -> Vec<String> {
    let mut errors = Vec::new();
    collect_error_nodes(&tree.root_node(), &mut errors);
    errors
}

fn collect_error_nodes(node: &tree_sitter::Node, errors: &mut Vec<String>) {
    if node.is_error() || node.is_missing() {
        errors.push(format!(
            "syntax error at line {}, column {}",
            node.start_position().row + 1,
            node.start_position().column + 1
        ));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(&child, errors);
    }
}

/// Slice the source text covered by a node.
pub fn node_text<'a>(node: &tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Text of a named field child, if present.
pub fn field_text<'a>(
    node: &tree_sitter::Node,
    field: &str,
    source: &'a str,
) -> Option<&'a str> {
    node.child_by_field_name(field)
        .map(|n| node_text(&n, source))
}
