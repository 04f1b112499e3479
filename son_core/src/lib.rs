//! Core data model shared by the sea-of-nodes optimizer.
//!
//! - **types**: the interned type lattice driving constant propagation
//! - **span**: source locations attached to nodes
//! - **error**: the semantic/internal error taxonomy returned by every phase

pub mod error;
pub mod span;
pub mod types;

pub use error::{Diagnostic, Phase, SonError, SonResult};
pub use span::Span;
pub use types::{Ty, TypeData, TypeTable};
