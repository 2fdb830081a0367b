//! Resolve symbols to their defining files.
//!
//! Two passes over all parsed files build an exports table
//! (`symbol → defining files`) and a per-file imports table
//! (`imported name → resolved file`). Calls and inheritance relations then
//! resolve through: direct import → same-file definition → any exporting
//! file (deterministic order) → case-insensitive fuzzy retry.

use crate::calls::CallSite;
use crate::entities::ParseResult;
use crate::inheritance::{InheritKind, InheritanceRelation};
use std::collections::{BTreeMap, BTreeSet};

/// Extensions tried when resolving a relative specifier against known files.
const CANDIDATE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".py", ""];

/// A parsed file presented to the resolver.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub rel_path: String,
    pub result: ParseResult,
}

/// A call resolved to its defining file.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub source_file: String,
    pub target_file: String,
    pub symbol: String,
    pub line: usize,
}

/// An inheritance relation resolved to the parent's defining file.
#[derive(Debug, Clone)]
pub struct ResolvedInheritance {
    pub source_file: String,
    pub target_file: String,
    pub child_class: String,
    pub parent_class: String,
    pub kind: InheritKind,
}

/// Exports/imports tables over a set of parsed files.
#[derive(Debug, Default)]
pub struct SymbolResolver {
    /// symbol → files defining it.
    exports: BTreeMap<String, BTreeSet<String>>,
    /// file → imported name → resolved file (None for externals).
    imports: BTreeMap<String, BTreeMap<String, Option<String>>>,
    known_files: BTreeSet<String>,
}

impl SymbolResolver {
    /// Build both tables from parsed files.
    pub fn build(files: &[ParsedFile]) -> Self {
        let mut resolver = Self {
            known_files: files.iter().map(|f| f.rel_path.clone()).collect(),
            ..Self::default()
        };

        // Pass 1: exports.
        for file in files {
            for entity in &file.result.entities {
                resolver
                    .exports
                    .entry(entity.name.clone())
                    .or_default()
                    .insert(file.rel_path.clone());
            }
        }

        // Pass 2: imports.
        for file in files {
            let table = resolver.imports.entry(file.rel_path.clone()).or_default();
            for import in &file.result.imports {
                let resolved = resolve_specifier(
                    &import.module,
                    &file.rel_path,
                    &resolver.known_files,
                );
                if import.names.is_empty() {
                    // Only the path is available: the binding name is the
                    // module's last segment.
                    let name = import
                        .module
                        .rsplit(['/', '.'])
                        .next()
                        .map(|s| s.rsplit("::").next().unwrap_or(s))
                        .unwrap_or(&import.module)
                        .to_string();
                    if !name.is_empty() {
                        table.entry(name).or_insert(resolved);
                    }
                } else {
                    for name in &import.names {
                        table.entry(name.clone()).or_insert_with(|| resolved.clone());
                    }
                }
            }
        }

        resolver
    }

    /// All files that export `symbol`.
    pub fn exporters(&self, symbol: &str) -> Option<&BTreeSet<String>> {
        self.exports.get(symbol)
    }

    /// The resolved imports of a file: `(imported name, defining file)` for
    /// every import that resolved to a known file.
    pub fn resolved_imports(&self, file: &str) -> Vec<(String, String)> {
        self.imports
            .get(file)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(name, target)| {
                        target.as_ref().map(|t| (name.clone(), t.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a call site to the file defining its callee. Unresolved calls
    /// return `None` and are silently dropped by the injector.
    pub fn resolve_call(&self, call: &CallSite) -> Option<ResolvedCall> {
        let target_file = self.locate_symbol(&call.callee_symbol, &call.caller_file)?;
        Some(ResolvedCall {
            source_file: call.caller_file.clone(),
            target_file,
            symbol: call.callee_symbol.clone(),
            line: call.line,
        })
    }

    /// Resolve an inheritance relation to the parent's defining file.
    pub fn resolve_inheritance(
        &self,
        rel: &InheritanceRelation,
    ) -> Option<ResolvedInheritance> {
        let target_file = self.locate_symbol(&rel.parent_class, &rel.child_file)?;
        Some(ResolvedInheritance {
            source_file: rel.child_file.clone(),
            target_file,
            child_class: rel.child_class.clone(),
            parent_class: rel.parent_class.clone(),
            kind: rel.kind,
        })
    }

    /// (a) direct import; (b) defined in the source file; (c) any exporting
    /// file, first in deterministic order; (d) case-insensitive retry.
    fn locate_symbol(&self, symbol: &str, source_file: &str) -> Option<String> {
        if let Some(table) = self.imports.get(source_file)
            && let Some(Some(target)) = table.get(symbol)
        {
            return Some(target.clone());
        }

        if let Some(files) = self.exports.get(symbol) {
            if files.contains(source_file) {
                return Some(source_file.to_string());
            }
            if let Some(first) = files.iter().next() {
                return Some(first.clone());
            }
        }

        // Case-insensitive fuzzy retry.
        let lowered = symbol.to_lowercase();
        for (exported, files) in &self.exports {
            if exported.to_lowercase() == lowered {
                if files.contains(source_file) {
                    return Some(source_file.to_string());
                }
                if let Some(first) = files.iter().next() {
                    return Some(first.clone());
                }
            }
        }

        None
    }
}

/// Resolve a module specifier to a known file. Relative specifiers (starting
/// with `.` or `/`) join against the importer's directory and try the
/// candidate extensions plus `index.*`; everything else is external.
pub fn resolve_specifier(
    specifier: &str,
    importer: &str,
    known_files: &BTreeSet<String>,
) -> Option<String> {
    if !specifier.starts_with('.') && !specifier.starts_with('/') {
        return None;
    }

    let importer_dir = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
    let base = join_relative(specifier, importer_dir)?;

    for ext in CANDIDATE_EXTENSIONS {
        let candidate = format!("{base}{ext}");
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in CANDIDATE_EXTENSIONS {
        if ext.is_empty() {
            continue;
        }
        let candidate = format!("{base}/index{ext}");
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Join a relative specifier to a directory, normalizing `.` and `..`
/// segments. Python-style dotted specifiers (`.mod`, `..pkg.mod`) are
/// converted to path form first.
fn join_relative(specifier: &str, importer_dir: &str) -> Option<String> {
    let path_style = if specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
    {
        specifier.trim_start_matches('/').to_string()
    } else {
        // Python relative import: leading dots climb, remainder is dotted.
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let rest = specifier[dots..].replace('.', "/");
        format!("{}{}", "../".repeat(dots.saturating_sub(1)), rest)
    };

    let mut segments: Vec<&str> = if specifier.starts_with('/') {
        Vec::new()
    } else {
        importer_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in path_style.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}
