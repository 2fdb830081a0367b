//! Extract inheritance and interface-implementation relations.
//!
//! Language conventions are enforced exactly: C# treats the first base as
//! inheritance and the rest as implementations, Go embedded structs inherit,
//! Rust `impl Trait for Type` implements, Java separates `extends` from
//! `implements`, Kotlin delegation specifiers with a constructor invocation
//! inherit and the rest implement.

use crate::languages::Language;
use crate::treesitter::{self, node_text};

/// Inherit vs. implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritKind {
    Inherit,
    Implement,
}

/// A child class extending or implementing a parent.
#[derive(Debug, Clone)]
pub struct InheritanceRelation {
    pub child_file: String,
    pub child_class: String,
    pub parent_class: String,
    pub kind: InheritKind,
}

/// Walks a parse tree and emits inheritance relations.
pub struct InheritanceExtractor;

impl InheritanceExtractor {
    pub fn extract(
        source: &str,
        language: Language,
        file_path: &str,
    ) -> Vec<InheritanceRelation> {
        let Some(tree) = treesitter::parse_tree(source, language) else {
            return Vec::new();
        };
        let mut relations = Vec::new();
        walk(&tree.root_node(), source, language, file_path, &mut relations);
        relations
    }
}

fn relation(
    file_path: &str,
    child: &str,
    parent: &str,
    kind: InheritKind,
) -> InheritanceRelation {
    InheritanceRelation {
        child_file: file_path.to_string(),
        child_class: child.to_string(),
        parent_class: parent.to_string(),
        kind,
    }
}

/// Strip generic arguments from a base type name: `Base<T>` → `Base`.
fn base_name(text: &str) -> &str {
    text.split(['<', '(']).next().unwrap_or(text).trim()
}

fn walk(
    node: &tree_sitter::Node,
    source: &str,
    language: Language,
    file_path: &str,
    out: &mut Vec<InheritanceRelation>,
) {
    match (language, node.kind()) {
        (Language::Python, "class_definition") => {
            if let (Some(name), Some(bases)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("superclasses"),
            ) {
                let child = node_text(&name, source);
                let mut cursor = bases.walk();
                for base in bases.named_children(&mut cursor) {
                    if matches!(base.kind(), "identifier" | "attribute") {
                        let parent = node_text(&base, source);
                        let parent = parent.rsplit('.').next().unwrap_or(parent);
                        out.push(relation(file_path, child, parent, InheritKind::Inherit));
                    }
                }
            }
        }
        (Language::TypeScript | Language::JavaScript, "class_declaration") => {
            if let Some(name) = node.child_by_field_name("name") {
                let child = node_text(&name, source);
                let mut cursor = node.walk();
                for heritage in node.children(&mut cursor) {
                    if heritage.kind() != "class_heritage" {
                        continue;
                    }
                    let mut inner = heritage.walk();
                    for clause in heritage.children(&mut inner) {
                        let kind = match clause.kind() {
                            "extends_clause" => InheritKind::Inherit,
                            "implements_clause" => InheritKind::Implement,
                            _ => continue,
                        };
                        let mut ids = clause.walk();
                        for id in clause.named_children(&mut ids) {
                            if matches!(
                                id.kind(),
                                "identifier" | "type_identifier" | "generic_type"
                            ) {
                                out.push(relation(
                                    file_path,
                                    child,
                                    base_name(node_text(&id, source)),
                                    kind,
                                ));
                            }
                        }
                    }
                    // JS grammar puts the extended expression directly under
                    // class_heritage without an extends_clause wrapper.
                    if language == Language::JavaScript {
                        let mut ids = heritage.walk();
                        for id in heritage.named_children(&mut ids) {
                            if id.kind() == "identifier" {
                                out.push(relation(
                                    file_path,
                                    child,
                                    node_text(&id, source),
                                    InheritKind::Inherit,
                                ));
                            }
                        }
                    }
                }
            }
        }
        (Language::Rust, "impl_item") => {
            // `impl Trait for Type` — the type implements the trait.
            if let (Some(trait_node), Some(type_node)) = (
                node.child_by_field_name("trait"),
                node.child_by_field_name("type"),
            ) {
                out.push(relation(
                    file_path,
                    base_name(node_text(&type_node, source)),
                    base_name(node_text(&trait_node, source)),
                    InheritKind::Implement,
                ));
            }
        }
        (Language::Go, "type_declaration") => {
            let mut cursor = node.walk();
            for spec in node.children(&mut cursor) {
                if spec.kind() != "type_spec" {
                    continue;
                }
                let (Some(name), Some(ty)) = (
                    spec.child_by_field_name("name"),
                    spec.child_by_field_name("type"),
                ) else {
                    continue;
                };
                if ty.kind() != "struct_type" {
                    continue;
                }
                let child = node_text(&name, source);
                // Embedded (anonymous) struct fields are inheritance.
                let Some(fields) = ty.named_child(0) else { continue };
                let mut inner = fields.walk();
                for field in fields.named_children(&mut inner) {
                    if field.kind() == "field_declaration"
                        && field.child_by_field_name("name").is_none()
                        && let Some(ftype) = field.child_by_field_name("type")
                    {
                        let parent = node_text(&ftype, source).trim_start_matches('*');
                        let parent = parent.rsplit('.').next().unwrap_or(parent);
                        out.push(relation(file_path, child, parent, InheritKind::Inherit));
                    }
                }
            }
        }
        (Language::Java, "class_declaration") => {
            if let Some(name) = node.child_by_field_name("name") {
                let child = node_text(&name, source);
                if let Some(superclass) = node.child_by_field_name("superclass") {
                    let parent = node_text(&superclass, source)
                        .trim_start_matches("extends")
                        .trim();
                    out.push(relation(
                        file_path,
                        child,
                        base_name(parent),
                        InheritKind::Inherit,
                    ));
                }
                if let Some(interfaces) = node.child_by_field_name("interfaces") {
                    collect_type_names(&interfaces, source, |parent| {
                        out.push(relation(file_path, child, parent, InheritKind::Implement));
                    });
                }
            }
        }
        (Language::Cpp, "class_specifier" | "struct_specifier") => {
            if let Some(name) = node.child_by_field_name("name") {
                let child = node_text(&name, source);
                let mut cursor = node.walk();
                for clause in node.children(&mut cursor) {
                    if clause.kind() == "base_class_clause" {
                        collect_type_names(&clause, source, |parent| {
                            out.push(relation(file_path, child, parent, InheritKind::Inherit));
                        });
                    }
                }
            }
        }
        (Language::CSharp, "class_declaration") => {
            if let Some(name) = node.child_by_field_name("name") {
                let child = node_text(&name, source);
                let mut cursor = node.walk();
                for clause in node.children(&mut cursor) {
                    if clause.kind() != "base_list" {
                        continue;
                    }
                    // First base is the superclass, the rest are interfaces.
                    let mut first = true;
                    collect_type_names(&clause, source, |parent| {
                        let kind = if first {
                            InheritKind::Inherit
                        } else {
                            InheritKind::Implement
                        };
                        first = false;
                        out.push(relation(file_path, child, parent, kind));
                    });
                }
            }
        }
        (Language::Ruby, "class") => {
            if let (Some(name), Some(superclass)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("superclass"),
            ) {
                let parent = node_text(&superclass, source).trim_start_matches('<').trim();
                out.push(relation(
                    file_path,
                    node_text(&name, source),
                    parent,
                    InheritKind::Inherit,
                ));
            }
        }
        (Language::Kotlin, "class_declaration") => {
            if let Some(name) = node.child_by_field_name("name") {
                let child = node_text(&name, source);
                let mut cursor = node.walk();
                for child_node in node.children(&mut cursor) {
                    if !child_node.kind().contains("delegation_specifier") {
                        continue;
                    }
                    // A constructor invocation (`Base()`) marks inheritance;
                    // a bare type (`Iface`) marks implementation.
                    let has_ctor = contains_kind(&child_node, "constructor_invocation")
                        || node_text(&child_node, source).contains('(');
                    let kind = if has_ctor {
                        InheritKind::Inherit
                    } else {
                        InheritKind::Implement
                    };
                    out.push(relation(
                        file_path,
                        child,
                        base_name(node_text(&child_node, source)),
                        kind,
                    ));
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(&child, source, language, file_path, out);
    }
}

fn collect_type_names(
    node: &tree_sitter::Node,
    source: &str,
    mut f: impl FnMut(&str),
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(
            child.kind(),
            "identifier" | "type_identifier" | "generic_type" | "scoped_type_identifier"
                | "qualified_name" | "generic_name"
        ) {
            f(base_name(node_text(&child, source)));
        }
    }
}

fn contains_kind(node: &tree_sitter::Node, kind: &str) -> bool {
    if node.kind() == kind {
        return true;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if contains_kind(&child, kind) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_inherit() {
        let source = "class Dog(Animal, Pet):\n    pass\n";
        let rels = InheritanceExtractor::extract(source, Language::Python, "dog.py");
        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.child_class == "Dog"));
        assert!(rels.iter().all(|r| r.kind == InheritKind::Inherit));
        let parents: Vec<&str> = rels.iter().map(|r| r.parent_class.as_str()).collect();
        assert_eq!(parents, vec!["Animal", "Pet"]);
    }

    #[test]
    fn test_typescript_extends_and_implements() {
        let source = "class View extends Base implements Drawable {}\n";
        let rels = InheritanceExtractor::extract(source, Language::TypeScript, "view.ts");
        let base = rels.iter().find(|r| r.parent_class == "Base").unwrap();
        assert_eq!(base.kind, InheritKind::Inherit);
        let drawable = rels.iter().find(|r| r.parent_class == "Drawable").unwrap();
        assert_eq!(drawable.kind, InheritKind::Implement);
    }

    #[test]
    fn test_rust_impl_trait_for_type() {
        let source = "struct Cache;\ntrait Store {}\nimpl Store for Cache {}\n";
        let rels = InheritanceExtractor::extract(source, Language::Rust, "cache.rs");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].child_class, "Cache");
        assert_eq!(rels[0].parent_class, "Store");
        assert_eq!(rels[0].kind, InheritKind::Implement);
    }

    #[test]
    fn test_go_embedded_struct_inherits() {
        let source = r#"
package main

type Base struct{}

type Worker struct {
    Base
    name string
}
"#;
        let rels = InheritanceExtractor::extract(source, Language::Go, "worker.go");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].child_class, "Worker");
        assert_eq!(rels[0].parent_class, "Base");
        assert_eq!(rels[0].kind, InheritKind::Inherit);
    }

    #[test]
    fn test_java_extends_vs_implements() {
        let source =
            "public class App extends Base implements Runnable, Closeable {}\n";
        let rels = InheritanceExtractor::extract(source, Language::Java, "App.java");
        let base = rels.iter().find(|r| r.parent_class == "Base").unwrap();
        assert_eq!(base.kind, InheritKind::Inherit);
        let implemented: Vec<&str> = rels
            .iter()
            .filter(|r| r.kind == InheritKind::Implement)
            .map(|r| r.parent_class.as_str())
            .collect();
        assert_eq!(implemented, vec!["Runnable", "Closeable"]);
    }

    #[test]
    fn test_csharp_first_base_inherits_rest_implement() {
        let source = "class App : Base, IRunnable, IDisposable {}\n";
        let rels = InheritanceExtractor::extract(source, Language::CSharp, "App.cs");
        assert_eq!(rels.len(), 3);
        assert_eq!(rels[0].parent_class, "Base");
        assert_eq!(rels[0].kind, InheritKind::Inherit);
        assert!(rels[1..].iter().all(|r| r.kind == InheritKind::Implement));
    }

    #[test]
    fn test_ruby_superclass() {
        let source = "class Dog < Animal\nend\n";
        let rels = InheritanceExtractor::extract(source, Language::Ruby, "dog.rb");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].parent_class, "Animal");
        assert_eq!(rels[0].kind, InheritKind::Inherit);
    }
}
