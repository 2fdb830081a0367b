//! Resolve variable receivers to a qualified `ClassName.method`.
//!
//! Resolution order: local constructor assignments in the enclosing
//! function, instance-attribute assignments (`self.x = Foo()` /
//! `this.x = new Bar()`), an MRO walk over the inferred type, then a fuzzy
//! fallback that only accepts a method defined by exactly one class and not
//! on the common-method blocklist.

use crate::calls::{CallSite, ReceiverKind};
use std::collections::{BTreeMap, BTreeSet};

/// Method names too generic to resolve by name alone.
pub const COMMON_METHOD_BLOCKLIST: &[&str] = &[
    "get", "set", "add", "remove", "update", "delete", "create", "init", "new", "run",
    "start", "stop", "open", "close", "read", "write", "clear", "copy", "clone", "next",
    "len", "size", "items", "keys", "values", "push", "pop", "insert", "contains",
];

/// A class known to the inferrer: its methods and direct bases.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub name: String,
    pub methods: BTreeSet<String>,
    pub bases: Vec<String>,
}

/// Name-level type inference over the classes of a repository.
#[derive(Debug, Default)]
pub struct TypeInferrer {
    classes: BTreeMap<String, ClassInfo>,
}

impl TypeInferrer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Method Resolution Order for a class: the class itself, then its bases
    /// depth-first. Cycles are tolerated via a visited set.
    pub fn mro(&self, class: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        self.mro_dfs(class, &mut visited, &mut order);
        order
    }

    fn mro_dfs(&self, class: &str, visited: &mut BTreeSet<String>, order: &mut Vec<String>) {
        if !visited.insert(class.to_string()) {
            return;
        }
        order.push(class.to_string());
        if let Some(info) = self.classes.get(class) {
            for base in &info.bases {
                self.mro_dfs(base, visited, order);
            }
        }
    }

    /// Resolve a variable/self/super receiver call to `ClassName.method`.
    ///
    /// `caller_class` is the class of the enclosing method, when inside one;
    /// `body_source` is the source text searched for constructor assignments.
    pub fn resolve(
        &self,
        call: &CallSite,
        caller_class: Option<&str>,
        body_source: &str,
    ) -> Option<String> {
        let method = call.callee_symbol.as_str();
        match call.receiver_kind {
            ReceiverKind::SelfRef => self.resolve_in_mro(caller_class?, method, 0),
            ReceiverKind::Super => self.resolve_in_mro(caller_class?, method, 1),
            ReceiverKind::Variable => {
                let receiver = call.receiver.as_deref()?;

                // 1. Local variable typed by a constructor assignment.
                if let Some(ty) = infer_local_type(body_source, receiver)
                    && let Some(resolved) = self.resolve_in_mro(&ty, method, 0)
                {
                    return Some(resolved);
                }

                // 2. Instance attribute typed by self.x = Foo() / this.x = new Bar().
                if let Some(attr) = receiver
                    .strip_prefix("self.")
                    .or_else(|| receiver.strip_prefix("this."))
                    && let Some(ty) = infer_attribute_type(body_source, attr)
                    && let Some(resolved) = self.resolve_in_mro(&ty, method, 0)
                {
                    return Some(resolved);
                }

                // 3. Receiver text is itself a known class (static-style call).
                if self.classes.contains_key(receiver)
                    && let Some(resolved) = self.resolve_in_mro(receiver, method, 0)
                {
                    return Some(resolved);
                }

                // 4. Fuzzy fallback: exactly one class defines the method and
                // it is not a blocklisted common name.
                self.fuzzy_resolve(method)
            }
            ReceiverKind::None => None,
        }
    }

    /// Walk the MRO of `class` starting at `start_index` for a class that
    /// defines `method`.
    fn resolve_in_mro(&self, class: &str, method: &str, start_index: usize) -> Option<String> {
        let mro = self.mro(class);
        for candidate in mro.iter().skip(start_index) {
            if let Some(info) = self.classes.get(candidate)
                && info.methods.contains(method)
            {
                return Some(format!("{candidate}.{method}"));
            }
        }
        None
    }

    fn fuzzy_resolve(&self, method: &str) -> Option<String> {
        if COMMON_METHOD_BLOCKLIST.contains(&method) {
            return None;
        }
        let mut defining: Vec<&str> = self
            .classes
            .values()
            .filter(|c| c.methods.contains(method))
            .map(|c| c.name.as_str())
            .collect();
        if defining.len() == 1 {
            let class = defining.pop().unwrap();
            Some(format!("{class}.{method}"))
        } else {
            None
        }
    }
}

/// `x = Foo(`, `x = new Foo(`, `let x = Foo::new(` — the type constructed
/// into a local variable.
fn infer_local_type(source: &str, var: &str) -> Option<String> {
    for line in source.lines() {
        let line = line.trim();
        let rest = assignment_rhs(line, var)?;
        if let Some(ty) = constructed_type(rest) {
            return Some(ty);
        }
        // Keep scanning: this assignment wasn't a constructor call.
        continue;
    }
    None
}

/// `self.x = Foo(` / `this.x = new Bar(` — the type constructed into an
/// instance attribute.
fn infer_attribute_type(source: &str, attr: &str) -> Option<String> {
    for line in source.lines() {
        let line = line.trim();
        let rest = assignment_rhs(line, &format!("self.{attr}"))
            .or_else(|| assignment_rhs(line, &format!("this.{attr}")));
        if let Some(rest) = rest
            && let Some(ty) = constructed_type(rest)
        {
            return Some(ty);
        }
    }
    None
}

/// The right-hand side of `lhs = ...` on a line, tolerating `let`/`const`/
/// `var` prefixes and type annotations.
fn assignment_rhs<'a>(line: &'a str, lhs: &str) -> Option<&'a str> {
    let line = line
        .trim_start_matches("let ")
        .trim_start_matches("const ")
        .trim_start_matches("var ")
        .trim_start_matches("mut ");
    let rest = line.strip_prefix(lhs)?;
    // Reject prefix matches of a longer identifier (`parser` vs `p`).
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return None;
    }
    let rest = rest.trim_start();
    // Tolerate `: Type =` annotations between the name and the assignment.
    let eq = rest.find('=')?;
    if rest[..eq].contains(|c: char| !c.is_alphanumeric() && !": _<>&[]".contains(c)) {
        return None;
    }
    Some(rest[eq + 1..].trim_start())
}

/// The class name constructed by an expression: `Foo(...)`, `new Foo(...)`,
/// `Foo::new(...)`, `Foo{...}`.
fn constructed_type(expr: &str) -> Option<String> {
    let expr = expr.trim_start_matches("new ").trim_start_matches("await ");
    let name: String = expr
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() || !name.chars().next().unwrap().is_uppercase() {
        return None;
    }
    let after = &expr[name.len()..];
    if after.starts_with('(') || after.starts_with("::new") || after.trim_start().starts_with('{')
    {
        Some(name)
    } else {
        None
    }
}
