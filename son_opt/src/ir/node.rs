//! Graph nodes.
//!
//! A node is an [`Operator`] plus ordered input edges, the reverse use edges
//! the graph maintains for it, and one cached [`Ty`].
//!
//! # Edge conventions
//!
//! Input 0 is the control slot. Floating data nodes leave it empty; code
//! motion records their block in the schedule instead. Region inputs start
//! at 1 so that Phi input `i` lines up with Region input `i`; a Phi's input 0
//! is its Region.
//!
//! An input may be `None` while a node is under construction, e.g. the
//! back edge of a loop that has not been closed yet.

use super::arena::Id;
use super::operators::Operator;
use smallvec::SmallVec;
use son_core::span::Span;
use son_core::types::Ty;

/// Unique identifier for a node in the graph.
pub type NodeId = Id<Node>;

/// Inline input capacity before spilling to the heap.
pub(crate) type Inputs = SmallVec<[Option<NodeId>; 4]>;
/// Inline use capacity before spilling to the heap.
pub(crate) type Outputs = SmallVec<[NodeId; 4]>;

bitflags::bitflags! {
    /// Node state bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Killed; the slot is retained but holds no edges.
        const DEAD = 0b0000_0001;
        /// Currently registered in the value-numbering table.
        const HASHED = 0b0000_0010;
    }
}

/// A node in the sea of nodes.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Operator,
    pub(crate) inputs: Inputs,
    /// One entry per input edge pointing at this node.
    pub(crate) outputs: Outputs,
    /// `None` until first computed, and again once dead.
    pub(crate) ty: Option<Ty>,
    /// Pin count keeping an otherwise unused node alive.
    pub(crate) keep: u16,
    pub(crate) flags: NodeFlags,
    /// Nodes to revisit when this one changes.
    pub(crate) deps: SmallVec<[NodeId; 2]>,
    /// Source location of the construct that created this node.
    pub span: Span,
}

impl Node {
    pub(crate) fn new(op: Operator, inputs: Inputs, span: Span) -> Self {
        Node {
            op,
            inputs,
            outputs: SmallVec::new(),
            ty: None,
            keep: 0,
            flags: NodeFlags::empty(),
            deps: SmallVec::new(),
            span,
        }
    }

    /// Input `i`, or `None` when the slot is empty or out of range.
    #[inline]
    pub fn input(&self, i: usize) -> Option<NodeId> {
        self.inputs.get(i).copied().flatten()
    }

    #[inline]
    pub fn inputs(&self) -> &[Option<NodeId>] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    #[inline]
    pub fn n_ins(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn ty(&self) -> Option<Ty> {
        self.ty
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    /// No uses and no pins.
    #[inline]
    pub fn is_unused(&self) -> bool {
        self.outputs.is_empty() && self.keep == 0
    }

    #[inline]
    pub fn is_kept(&self) -> bool {
        self.keep > 0
    }
}
