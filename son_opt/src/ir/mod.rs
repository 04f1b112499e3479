//! Sea-of-nodes intermediate representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): typed ids, side tables and bit sets
//! - **Operators** (`operators.rs`): the closed set of node kinds
//! - **Node** (`node.rs`): inputs, users, cached type, source span
//! - **Graph** (`graph.rs`): node storage and the edge-surgery primitives
//! - **Builder** (`builder/`): the front-end's eager-peephole construction API
//!
//! Control and data share one graph. Input 0 of a node is its control
//! dependence, or empty for nodes free to float.

pub mod arena;
pub mod builder;
pub mod graph;
pub mod node;
pub mod operators;

pub use arena::{BitSet, Id, SecondaryMap};
pub use builder::GraphBuilder;
pub use graph::Graph;
pub use node::{Node, NodeFlags, NodeId};
pub use operators::{
    ArithOp, BitwiseOp, CallTarget, CmpOp, ControlOp, FieldRef, MemoryOp, Operator,
};
