//! Peephole optimization.
//!
//! - **compute**: forward type inference, one node at a time
//! - **idealize**: local graph rewrites
//! - **gvn**: hash-consing of equivalent nodes
//! - **peephole**: the per-node driver tying the three together
//! - **worklist** and **iter**: the global fixpoint engine
//! - **typecheck**: residual semantic errors after the fixpoint
//! - **pipeline**: the phase sequence from built graph to schedule

pub mod compute;
pub mod gvn;
pub mod idealize;
pub mod iter;
pub mod peephole;
pub mod pipeline;
pub mod typecheck;
pub mod worklist;

pub use iter::{iterate, IterStats};
pub use pipeline::{compile, OptPipeline, PipelineConfig, PipelineStats};
pub use typecheck::type_check;
pub use worklist::WorkList;
