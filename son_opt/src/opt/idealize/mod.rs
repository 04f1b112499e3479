//! Local rewrite rules.
//!
//! `idealize` either returns a different node computing the same value, or
//! edits `n` in place and returns `n`, or returns `None`. New nodes are
//! created through [`Graph::peephole`] so they arrive already simplified.

mod arith;
mod control;
mod memory;

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{ControlOp, MemoryOp, Operator};
use son_core::span::Span;

impl Graph {
    /// Apply the first matching rewrite rule to `n`.
    pub fn idealize(&mut self, n: NodeId) -> Option<NodeId> {
        let op = self.op(n).clone();
        let x = match op {
            Operator::IntOp(op) => self.idealize_int_op(n, op),
            Operator::Bitwise(op) => self.idealize_bitwise(n, op),
            Operator::IntCmp(op) => self.idealize_int_cmp(n, op),
            Operator::Phi(_) => self.idealize_phi(n),
            Operator::Cast(t) => {
                let x = self.input(n, 1)?;
                let tx = self.ty(x);
                self.types.isa(tx, t).then_some(x)
            }
            Operator::CProj(idx) => self.idealize_cproj(n, idx),
            Operator::Control(ControlOp::Region | ControlOp::Loop) => self.idealize_region(n),
            Operator::Control(ControlOp::If) => self.idealize_if(n),
            Operator::Control(ControlOp::Stop) => self.idealize_stop(n),
            Operator::Memory(MemoryOp::Load(_)) => self.idealize_load(n),
            Operator::Memory(MemoryOp::Store(_)) => self.idealize_store(n),
            _ => None,
        };
        if x.is_some() {
            log::trace!("idealize {n} {} -> {:?}", self.op(n).label(), x);
        }
        x
    }

    /// Build and simplify a binary data node.
    pub(crate) fn binary(&mut self, op: Operator, lhs: NodeId, rhs: NodeId, span: Span) -> NodeId {
        let n = self.add_node(op, &[None, Some(lhs), Some(rhs)], span);
        self.peephole(n)
    }

    /// Swap inputs 1 and 2 in place.
    pub(crate) fn swap_operands(&mut self, n: NodeId) -> NodeId {
        let (a, b) = (self.input(n, 1), self.input(n, 2));
        self.unlock(n);
        let node = self.node_mut(n);
        node.inputs[1] = b;
        node.inputs[2] = a;
        n
    }

    #[inline]
    pub(crate) fn is_con(&self, n: NodeId) -> bool {
        self.op(n).is_constant()
    }
}
