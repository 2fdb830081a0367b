//! Extract call sites with caller context and receiver classification.

use crate::entities;
use crate::languages::Language;
use crate::treesitter::{self, node_text};
use rpg_core::node::CodeEntity;

/// Classification of a call's receiver expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// `self.foo()` / `this.foo()`.
    SelfRef,
    /// `super.foo()` / `super().foo()`.
    Super,
    /// Any other receiver expression, captured verbatim.
    Variable,
    /// Bare call with no receiver.
    None,
}

/// A single call/invocation/new-expression found in a file.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub caller_file: String,
    /// Dot-joined enclosing class/function context, when inside one.
    pub caller_entity: Option<String>,
    pub callee_symbol: String,
    pub line: usize,
    pub receiver: Option<String>,
    pub receiver_kind: ReceiverKind,
}

/// Walks a parse tree and emits call sites with receiver classification.
pub struct CallExtractor;

impl CallExtractor {
    pub fn extract(source: &str, language: Language, file_path: &str) -> Vec<CallSite> {
        let Some(tree) = treesitter::parse_tree(source, language) else {
            return Vec::new();
        };

        // Caller context comes from the extracted entity scopes: the
        // innermost entity whose line range contains the call.
        let scopes = entities::parse(source, language).entities;

        let mut calls = Vec::new();
        walk_calls(
            &tree.root_node(),
            source,
            language,
            file_path,
            &scopes,
            &mut calls,
        );
        calls
    }
}

/// The qualified name of the innermost entity scope enclosing `line`.
fn enclosing_entity(scopes: &[CodeEntity], line: usize) -> Option<String> {
    scopes
        .iter()
        .filter(|e| line >= e.start_line && line <= e.end_line)
        .min_by_key(|e| e.end_line - e.start_line)
        .map(CodeEntity::qualified_name)
}

fn classify_receiver(text: &str) -> (Option<String>, ReceiverKind) {
    match text {
        "self" | "this" => (Some(text.to_string()), ReceiverKind::SelfRef),
        "super" | "super()" | "base" => (Some(text.to_string()), ReceiverKind::Super),
        _ => (Some(text.to_string()), ReceiverKind::Variable),
    }
}

fn push_call(
    calls: &mut Vec<CallSite>,
    file_path: &str,
    scopes: &[CodeEntity],
    line: usize,
    callee: &str,
    receiver: Option<&str>,
) {
    if callee.is_empty() {
        return;
    }
    let (receiver, receiver_kind) = match receiver {
        Some(text) => classify_receiver(text),
        None => (None, ReceiverKind::None),
    };
    calls.push(CallSite {
        caller_file: file_path.to_string(),
        caller_entity: enclosing_entity(scopes, line),
        callee_symbol: callee.to_string(),
        line,
        receiver,
        receiver_kind,
    });
}

fn walk_calls(
    node: &tree_sitter::Node,
    source: &str,
    language: Language,
    file_path: &str,
    scopes: &[CodeEntity],
    calls: &mut Vec<CallSite>,
) {
    let line = node.start_position().row + 1;
    match (language, node.kind()) {
        (Language::Python, "call") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "attribute" => {
                        let callee = func
                            .child_by_field_name("attribute")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("object")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::TypeScript | Language::JavaScript, "call_expression") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "member_expression" => {
                        let callee = func
                            .child_by_field_name("property")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("object")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::TypeScript | Language::JavaScript, "new_expression") => {
            if let Some(ctor) = node.child_by_field_name("constructor") {
                push_call(calls, file_path, scopes, line, node_text(&ctor, source), None);
            }
        }
        (Language::Rust, "call_expression") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "scoped_identifier" => {
                        let callee = node_text(&func, source)
                            .rsplit("::")
                            .next()
                            .unwrap_or_default()
                            .to_string();
                        push_call(calls, file_path, scopes, line, &callee, None);
                    }
                    "field_expression" => {
                        let callee = func
                            .child_by_field_name("field")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("value")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::Go, "call_expression") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "selector_expression" => {
                        let callee = func
                            .child_by_field_name("field")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("operand")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::Java, "method_invocation") => {
            let callee = node
                .child_by_field_name("name")
                .map(|n| node_text(&n, source))
                .unwrap_or_default();
            let receiver = node
                .child_by_field_name("object")
                .map(|n| node_text(&n, source));
            push_call(calls, file_path, scopes, line, callee, receiver);
        }
        (Language::Java, "object_creation_expression") => {
            if let Some(ty) = node.child_by_field_name("type") {
                push_call(calls, file_path, scopes, line, node_text(&ty, source), None);
            }
        }
        (Language::C | Language::Cpp, "call_expression") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "field_expression" => {
                        let callee = func
                            .child_by_field_name("field")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("argument")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::CSharp, "invocation_expression") => {
            if let Some(func) = node.child_by_field_name("function") {
                match func.kind() {
                    "identifier" => {
                        push_call(calls, file_path, scopes, line, node_text(&func, source), None);
                    }
                    "member_access_expression" => {
                        let callee = func
                            .child_by_field_name("name")
                            .map(|n| node_text(&n, source))
                            .unwrap_or_default();
                        let receiver = func
                            .child_by_field_name("expression")
                            .map(|n| node_text(&n, source));
                        push_call(calls, file_path, scopes, line, callee, receiver);
                    }
                    _ => {}
                }
            }
        }
        (Language::CSharp, "object_creation_expression") => {
            if let Some(ty) = node.child_by_field_name("type") {
                push_call(calls, file_path, scopes, line, node_text(&ty, source), None);
            }
        }
        (Language::Ruby, "call") => {
            let callee = node
                .child_by_field_name("method")
                .map(|n| node_text(&n, source))
                .unwrap_or_default();
            let receiver = node
                .child_by_field_name("receiver")
                .map(|n| node_text(&n, source));
            push_call(calls, file_path, scopes, line, callee, receiver);
        }
        (Language::Kotlin, "call_expression") => {
            // kotlin-ng: the callee expression is the first child; navigation
            // expressions carry receiver.target syntax.
            if let Some(callee_node) = node.named_child(0) {
                let text = node_text(&callee_node, source);
                if callee_node.kind() == "navigation_expression" {
                    if let Some((receiver, callee)) = text.rsplit_once('.') {
                        push_call(calls, file_path, scopes, line, callee, Some(receiver));
                    }
                } else if callee_node.kind() == "simple_identifier" {
                    push_call(calls, file_path, scopes, line, text, None);
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_calls(&child, source, language, file_path, scopes, calls);
    }
}
