//! Core types and storage for the Repository Planning Graph (RPG).
//!
//! Provides the graph data model ([`graph::Rpg`]), node and edge types,
//! JSON persistence, LCA-based directory grounding, revision hashing,
//! and the shared error taxonomy.

pub mod config;
pub mod edge;
pub mod error;
pub mod graph;
pub mod lca;
pub mod node;
pub mod revision;
pub mod schema;
pub mod storage;
