//! Tree-sitter based code parsing for RPG entity and dependency extraction.
//!
//! Extracts language-neutral code entities, imports, call sites with
//! receiver classification, inheritance relations, and resolves symbols to
//! their defining files.

pub mod calls;
pub mod entities;
pub mod inheritance;
pub mod languages;
pub mod resolver;
pub mod treesitter;
pub mod type_infer;
