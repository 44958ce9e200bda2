//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, editing,
//! serializing and validating workflow graphs.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Node, Edge, Workflow) and graph edits
//! - [`parser`]: JSON/YAML loading and saving
//! - [`validator`]: Editor-facing issues and pre-run structural checks

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Config, Edge, Node, NodeKind, Position, Workflow};
pub use parser::{load_workflow, save_workflow};
pub use validator::{check_runnable, validate, Issue};
