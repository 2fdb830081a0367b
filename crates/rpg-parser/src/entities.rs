//! Extract code entities (functions, classes, methods) and imports from AST.
//!
//! Each supported language maps its concrete syntax nodes to the shared
//! [`CodeEntity`] model. Extraction is best-effort: syntax errors are
//! collected non-fatally and a partial result is always returned.

use crate::languages::Language;
use crate::treesitter::{self, node_text};
use anyhow::{Context, Result};
use rpg_core::node::{CodeEntity, EntityType};
use std::path::Path;

/// A normalized import: the referenced module and the imported symbols.
/// For languages where only the path is syntactically available (Rust `use`,
/// Go `import_spec`, Java `import`), `names` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub names: Vec<String>,
    pub line: usize,
}

/// The result of parsing one source file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub entities: Vec<CodeEntity>,
    pub imports: Vec<Import>,
    pub errors: Vec<String>,
}

/// Parse source text in the given language into entities and imports.
pub fn parse(source: &str, language: Language) -> ParseResult {
    let Some(tree) = treesitter::parse_tree(source, language) else {
        return ParseResult {
            errors: vec![format!("failed to parse {} source", language.name())],
            ..ParseResult::default()
        };
    };

    let mut result = ParseResult {
        errors: treesitter::collect_errors(&tree),
        ..ParseResult::default()
    };
    let root = tree.root_node();

    match language {
        Language::Python => extract_python(&root, source, None, &mut result),
        Language::Rust => extract_rust(&root, source, None, &mut result),
        Language::TypeScript | Language::JavaScript => {
            extract_js(&root, source, None, &mut result);
        }
        Language::Go => extract_go(&root, source, &mut result),
        Language::Java => extract_java(&root, source, None, &mut result),
        Language::C | Language::Cpp => extract_c_like(&root, source, None, &mut result),
        Language::CSharp => extract_csharp(&root, source, None, &mut result),
        Language::Ruby => extract_ruby(&root, source, None, &mut result),
        Language::Kotlin => extract_kotlin(&root, source, None, &mut result),
    }

    result
}

/// Parse a file from disk, detecting the language by extension.
pub fn parse_file(path: &Path) -> Result<ParseResult> {
    let language = Language::from_path(path)
        .ok_or_else(|| anyhow::anyhow!("unsupported file extension: {}", path.display()))?;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse(&source, language))
}

/// Build a [`CodeEntity`] from a tree-sitter node.
fn make_entity(
    node: &tree_sitter::Node,
    entity_type: EntityType,
    name: &str,
    parent: Option<&str>,
    parameters: Option<Vec<String>>,
    documentation: Option<String>,
) -> CodeEntity {
    CodeEntity {
        entity_type,
        name: name.to_string(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_column: node.start_position().column,
        end_column: node.end_position().column,
        parameters,
        parent: parent.map(String::from),
        documentation,
    }
}

fn method_or_function(parent: Option<&str>) -> EntityType {
    if parent.is_some() {
        EntityType::Method
    } else {
        EntityType::Function
    }
}

/// Contiguous `///`, `//`, `*`-style, or `#` comment lines directly above a
/// node, joined. Used for languages without an in-body docstring convention.
fn preceding_doc_comment(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sib) = current {
        if !sib.kind().contains("comment") {
            break;
        }
        let text = node_text(&sib, source)
            .trim_start_matches("///")
            .trim_start_matches("//")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim()
            .to_string();
        lines.push(text);
        current = sib.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let doc = lines.join("\n").trim().to_string();
    if doc.is_empty() { None } else { Some(doc) }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn extract_python(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        name,
                        parent_class,
                        python_parameters(&child, source),
                        python_docstring(&child, source),
                    ));
                }
            }
            // Decorated definitions (@property, @staticmethod, ...) wrap the
            // real definition; recurse into them.
            "decorated_definition" => {
                extract_python(&child, source, parent_class, result);
            }
            "class_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        python_docstring(&child, source),
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_python(&body, source, Some(class_name), result);
                    }
                }
            }
            "import_statement" | "import_from_statement" => {
                if let Some(import) = parse_python_import(
                    node_text(&child, source),
                    child.start_position().row + 1,
                ) {
                    result.imports.push(import);
                }
            }
            // A lambda bound to a name adopts the variable's name, like an
            // arrow function; anonymous inline lambdas are skipped.
            "expression_statement" => {
                if let Some(assignment) = child.named_child(0)
                    && assignment.kind() == "assignment"
                    && let (Some(left), Some(right)) = (
                        assignment.child_by_field_name("left"),
                        assignment.child_by_field_name("right"),
                    )
                    && left.kind() == "identifier"
                    && right.kind() == "lambda"
                {
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        node_text(&left, source),
                        parent_class,
                        None,
                        None,
                    ));
                }
            }
            _ => {
                if parent_class.is_none() {
                    extract_python(&child, source, None, result);
                }
            }
        }
    }
}

fn python_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params_node = node.child_by_field_name("parameters")?;
    let mut params = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        match child.kind() {
            "identifier" => params.push(node_text(&child, source).to_string()),
            "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = child
                    .child_by_field_name("name")
                    .or_else(|| child.named_child(0))
                {
                    if name.kind() == "identifier" {
                        params.push(node_text(&name, source).to_string());
                    }
                }
            }
            _ => {}
        }
    }
    Some(params)
}

/// A Python docstring: the first statement of the body when it is a bare
/// string expression.
fn python_docstring(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let raw = node_text(&string, source);
    let trimmed = raw
        .trim_start_matches(['r', 'b', 'f', 'u'])
        .trim_matches('"')
        .trim_matches('\'')
        .trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_python_import(text: &str, line: usize) -> Option<Import> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("from ") {
        let parts: Vec<&str> = rest.splitn(2, " import ").collect();
        if parts.len() == 2 {
            let module = parts[0].trim().to_string();
            let names: Vec<String> = parts[1]
                .trim_matches(['(', ')'])
                .split(',')
                .map(|s| s.trim().split(" as ").next().unwrap_or("").trim().to_string())
                .filter(|s| !s.is_empty() && s != "*")
                .collect();
            return Some(Import {
                module,
                names,
                line,
            });
        }
    } else if let Some(rest) = text.strip_prefix("import ") {
        let module = rest
            .split(',')
            .next()
            .unwrap_or("")
            .split(" as ")
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if !module.is_empty() {
            return Some(Import {
                module,
                names: Vec::new(),
                line,
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

fn extract_rust(
    node: &tree_sitter::Node,
    source: &str,
    parent_type: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_type),
                        name,
                        parent_type,
                        rust_parameters(&child, source),
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "struct_item" | "enum_item" | "union_item" | "type_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        node_text(&name_node, source),
                        None,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            // `impl` has no name field; the impl'd type names the context.
            "impl_item" => {
                if let Some(type_node) = child.child_by_field_name("type") {
                    let type_name = node_text(&type_node, source);
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_rust(&body, source, Some(type_name), result);
                    }
                }
            }
            "trait_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        name,
                        None,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_rust(&body, source, Some(name), result);
                    }
                }
            }
            "mod_item" => {
                if let Some(body) = child.child_by_field_name("body") {
                    extract_rust(&body, source, None, result);
                }
            }
            "use_declaration" => {
                if let Some(arg) = child.child_by_field_name("argument") {
                    result.imports.push(Import {
                        module: node_text(&arg, source).to_string(),
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            _ => {
                if parent_type.is_none() {
                    extract_rust(&child, source, None, result);
                }
            }
        }
    }
}

fn rust_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params_node = node.child_by_field_name("parameters")?;
    let mut params = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        match child.kind() {
            "parameter" => {
                if let Some(pattern) = child.child_by_field_name("pattern") {
                    params.push(node_text(&pattern, source).trim_start_matches("mut ").to_string());
                }
            }
            "self_parameter" => params.push("self".to_string()),
            _ => {}
        }
    }
    Some(params)
}

// ---------------------------------------------------------------------------
// TypeScript / JavaScript
// ---------------------------------------------------------------------------

fn extract_js(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        node_text(&name_node, source),
                        parent_class,
                        js_parameters(&child, source),
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "class_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_js(&body, source, Some(class_name), result);
                    }
                }
            }
            "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        node_text(&name_node, source),
                        None,
                        None,
                        None,
                    ));
                }
            }
            "method_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Method,
                        node_text(&name_node, source),
                        parent_class,
                        js_parameters(&child, source),
                        None,
                    ));
                }
            }
            // Arrow functions bound to a variable adopt the variable's name;
            // unnamed inline functions are skipped.
            "lexical_declaration" | "variable_declaration" => {
                let mut inner = child.walk();
                for decl in child.children(&mut inner) {
                    if decl.kind() != "variable_declarator" {
                        continue;
                    }
                    let value = decl.child_by_field_name("value");
                    let is_function = value.as_ref().is_some_and(|v| {
                        matches!(v.kind(), "arrow_function" | "function_expression" | "function")
                    });
                    if is_function
                        && let Some(name_node) = decl.child_by_field_name("name")
                    {
                        result.entities.push(make_entity(
                            &child,
                            method_or_function(parent_class),
                            node_text(&name_node, source),
                            parent_class,
                            value.as_ref().and_then(|v| js_parameters(v, source)),
                            preceding_doc_comment(&child, source),
                        ));
                    }
                }
            }
            "import_statement" => {
                if let Some(import) = parse_js_import(&child, source) {
                    result.imports.push(import);
                }
            }
            "export_statement" => {
                // Exported declarations carry the real definition inside.
                extract_js(&child, source, parent_class, result);
            }
            _ => {
                if parent_class.is_none() {
                    extract_js(&child, source, None, result);
                }
            }
        }
    }
}

fn js_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params_node = node.child_by_field_name("parameters")?;
    let mut params = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        match child.kind() {
            "identifier" => params.push(node_text(&child, source).to_string()),
            "required_parameter" | "optional_parameter" => {
                if let Some(pattern) = child.child_by_field_name("pattern") {
                    if pattern.kind() == "identifier" {
                        params.push(node_text(&pattern, source).to_string());
                    }
                }
            }
            _ => {}
        }
    }
    Some(params)
}

fn parse_js_import(node: &tree_sitter::Node, source: &str) -> Option<Import> {
    let source_node = node.child_by_field_name("source")?;
    let module = node_text(&source_node, source)
        .trim_matches(['"', '\''])
        .to_string();
    let mut names = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "import_clause" {
            let mut inner = child.walk();
            for clause_child in child.children(&mut inner) {
                match clause_child.kind() {
                    "identifier" => names.push(node_text(&clause_child, source).to_string()),
                    "named_imports" => {
                        let mut spec_cursor = clause_child.walk();
                        for spec in clause_child.children(&mut spec_cursor) {
                            if spec.kind() == "import_specifier"
                                && let Some(name) = spec.child_by_field_name("name")
                            {
                                names.push(node_text(&name, source).to_string());
                            }
                        }
                    }
                    "namespace_import" => {
                        // import * as ns — the alias is the only usable name
                        let mut ns_cursor = clause_child.walk();
                        for ns_child in clause_child.children(&mut ns_cursor) {
                            if ns_child.kind() == "identifier" {
                                names.push(node_text(&ns_child, source).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Some(Import {
        module,
        names,
        line: node.start_position().row + 1,
    })
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn extract_go(node: &tree_sitter::Node, source: &str, result: &mut ParseResult) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Function,
                        node_text(&name_node, source),
                        None,
                        go_parameters(&child, source),
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "method_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let receiver = go_receiver_type(&child, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Method,
                        node_text(&name_node, source),
                        receiver.as_deref(),
                        go_parameters(&child, source),
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "type_declaration" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() == "type_spec"
                        && let Some(name_node) = spec.child_by_field_name("name")
                    {
                        let type_node = spec.child_by_field_name("type");
                        let is_named_type = type_node.is_some_and(|t| {
                            matches!(t.kind(), "struct_type" | "interface_type")
                        });
                        if is_named_type {
                            result.entities.push(make_entity(
                                &child,
                                EntityType::Class,
                                node_text(&name_node, source),
                                None,
                                None,
                                preceding_doc_comment(&child, source),
                            ));
                        }
                    }
                }
            }
            "import_declaration" => {
                collect_go_imports(&child, source, result);
            }
            _ => extract_go(&child, source, result),
        }
    }
}

/// The receiver type of a Go method, with any pointer prefix stripped.
fn go_receiver_type(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for child in receiver.children(&mut cursor) {
        if child.kind() == "parameter_declaration"
            && let Some(type_node) = child.child_by_field_name("type")
        {
            let text = node_text(&type_node, source).trim_start_matches('*');
            return Some(text.to_string());
        }
    }
    None
}

fn go_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params_node = node.child_by_field_name("parameters")?;
    let mut params = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        if child.kind() == "parameter_declaration"
            && let Some(name) = child.child_by_field_name("name")
        {
            params.push(node_text(&name, source).to_string());
        }
    }
    Some(params)
}

fn collect_go_imports(node: &tree_sitter::Node, source: &str, result: &mut ParseResult) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                if let Some(path) = child.child_by_field_name("path") {
                    result.imports.push(Import {
                        module: node_text(&path, source).trim_matches('"').to_string(),
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            "import_spec_list" => collect_go_imports(&child, source, result),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Java
// ---------------------------------------------------------------------------

fn extract_java(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration"
            | "record_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_java(&body, source, Some(class_name), result);
                    }
                }
            }
            "method_declaration" | "constructor_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Method,
                        node_text(&name_node, source),
                        parent_class,
                        java_parameters(&child, source),
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "import_declaration" => {
                let text = node_text(&child, source)
                    .trim_start_matches("import")
                    .trim_start_matches(" static")
                    .trim()
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    result.imports.push(Import {
                        module: text,
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            _ => {
                if parent_class.is_none() {
                    extract_java(&child, source, None, result);
                }
            }
        }
    }
}

fn java_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params_node = node.child_by_field_name("parameters")?;
    let mut params = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        if matches!(child.kind(), "formal_parameter" | "spread_parameter")
            && let Some(name) = child.child_by_field_name("name")
        {
            params.push(node_text(&name, source).to_string());
        }
    }
    Some(params)
}

// ---------------------------------------------------------------------------
// C / C++
// ---------------------------------------------------------------------------

fn extract_c_like(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(name) = c_declarator_name(&child, source) {
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        &name,
                        parent_class,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "struct_specifier" | "class_specifier" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    // Forward declarations have no body and are not entities.
                    if let Some(body) = child.child_by_field_name("body") {
                        let class_name = node_text(&name_node, source);
                        result.entities.push(make_entity(
                            &child,
                            EntityType::Class,
                            class_name,
                            None,
                            None,
                            preceding_doc_comment(&child, source),
                        ));
                        extract_c_like(&body, source, Some(class_name), result);
                    }
                }
            }
            "namespace_definition" => {
                if let Some(body) = child.child_by_field_name("body") {
                    extract_c_like(&body, source, None, result);
                }
            }
            "preproc_include" => {
                if let Some(path) = child.child_by_field_name("path") {
                    result.imports.push(Import {
                        module: node_text(&path, source)
                            .trim_matches(['"', '<', '>'])
                            .to_string(),
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            _ => {
                if parent_class.is_none() {
                    extract_c_like(&child, source, None, result);
                }
            }
        }
    }
}

/// Dig through pointer/function declarators to the declared identifier.
fn c_declarator_name(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier"
            | "destructor_name" | "operator_name" => {
                return Some(node_text(&current, source).to_string());
            }
            _ => {
                if let Some(inner) = current.child_by_field_name("declarator") {
                    current = inner;
                } else {
                    return None;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// C#
// ---------------------------------------------------------------------------

fn extract_csharp(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" | "interface_declaration" | "struct_declaration"
            | "record_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        extract_csharp(&body, source, Some(class_name), result);
                    }
                }
            }
            "method_declaration" | "constructor_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Method,
                        node_text(&name_node, source),
                        parent_class,
                        None,
                        preceding_doc_comment(&child, source),
                    ));
                }
            }
            "namespace_declaration" | "file_scoped_namespace_declaration" => {
                if let Some(body) = child.child_by_field_name("body") {
                    extract_csharp(&body, source, None, result);
                } else {
                    extract_csharp(&child, source, None, result);
                }
            }
            "using_directive" => {
                let text = node_text(&child, source)
                    .trim_start_matches("using")
                    .trim()
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    result.imports.push(Import {
                        module: text,
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            _ => {
                if parent_class.is_none() {
                    extract_csharp(&child, source, None, result);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ruby
// ---------------------------------------------------------------------------

fn extract_ruby(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class" | "module" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        None,
                    ));
                    extract_ruby(&child, source, Some(class_name), result);
                }
            }
            "method" | "singleton_method" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        node_text(&name_node, source),
                        parent_class,
                        None,
                        None,
                    ));
                }
            }
            _ => extract_ruby(&child, source, parent_class, result),
        }
    }
}

// ---------------------------------------------------------------------------
// Kotlin
// ---------------------------------------------------------------------------

fn extract_kotlin(
    node: &tree_sitter::Node,
    source: &str,
    parent_class: Option<&str>,
    result: &mut ParseResult,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" | "object_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    result.entities.push(make_entity(
                        &child,
                        EntityType::Class,
                        class_name,
                        None,
                        None,
                        None,
                    ));
                    extract_kotlin(&child, source, Some(class_name), result);
                }
            }
            "function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    result.entities.push(make_entity(
                        &child,
                        method_or_function(parent_class),
                        node_text(&name_node, source),
                        parent_class,
                        None,
                        None,
                    ));
                }
            }
            kind if kind.contains("import") => {
                let text = node_text(&child, source)
                    .trim_start_matches("import")
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    result.imports.push(Import {
                        module: text,
                        names: Vec::new(),
                        line: child.start_position().row + 1,
                    });
                }
            }
            _ => extract_kotlin(&child, source, parent_class, result),
        }
    }
}
