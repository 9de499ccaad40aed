//! # rdfmesh Testkit
//!
//! Testing utilities for rdfmesh.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Edit sources**: [`GraphGenerator`] drives an agent toward a seeded
//!   ground-truth graph; [`ScriptedEdits`] replays an exact fragment
//!   sequence for deterministic protocol tests
//! - **Fixtures**: prebuilt linear and divergent documents
//! - **Generators**: proptest strategies for property-based testing
//!
//! ## Simulated Edits
//!
//! ```rust
//! use rdfmesh_testkit::graph::{GraphGenerator, DEFAULT_SEED};
//! use rdfmesh_core::EditSource;
//!
//! let mut edits = GraphGenerator::new(DEFAULT_SEED);
//! let state = std::collections::HashMap::new();
//! let (op, triple) = edits.next_fragment(&state);
//! println!("{op} {triple}");
//! ```

pub mod fixtures;
pub mod generators;
pub mod graph;

pub use fixtures::{divergent_pair, linear_document};
pub use graph::{GraphGenerator, ScriptedEdits, DEFAULT_SEED};
