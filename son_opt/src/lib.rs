//! Sea-of-nodes optimizing middle end.
//!
//! A front-end builds a graph through [`GraphBuilder`], peepholing every
//! node as it goes. The pipeline then
//!
//! 1. runs the worklist engine to a global fixpoint,
//! 2. reports whatever semantic errors survive,
//! 3. builds the loop tree, places every node with global code motion and
//!    orders each block with a list scheduler.
//!
//! The resulting [`Schedule`] is what a backend consumes.

pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod opt;

pub use codegen::{schedule, Schedule};
pub use config::OptConfig;
pub use ir::{Graph, GraphBuilder, NodeId, Operator};
pub use opt::{compile, iterate, type_check};
