//! The peephole contract.
//!
//! Every visit of a node runs the same steps:
//!
//! 1. recompute its type from its inputs
//! 2. replace it with a constant if the type is high or a single value
//! 3. value-number it against a structurally identical node
//! 4. apply local rewrites (`idealize`)
//!
//! The result is a replacement node, the node itself when only its type or
//! its own edges changed, or nothing when the node is already at fixpoint.

use crate::ir::graph::Graph;
use crate::ir::node::{NodeFlags, NodeId};
use crate::ir::operators::{ControlOp, Operator};
use son_core::span::Span;
use son_core::types::{Ty, TypeData};

impl Graph {
    /// Run one peephole step on `n`.
    pub fn peephole_opt(&mut self, n: NodeId) -> Option<NodeId> {
        if self.is_dead(n) || *self.op(n) == Operator::Scope {
            return None;
        }
        let old = self.node(n).ty();
        let t = self.compute(n);
        self.set_type(n, t);

        if self.foldable_to_constant(n, t) {
            let c = self.con(t);
            if c != n {
                return Some(self.dead_code_elim(n, c));
            }
        }

        if let Some(m) = self.value_number(n) {
            return Some(self.dead_code_elim(n, m));
        }

        if let Some(x) = self.idealize(n) {
            return Some(x);
        }

        if old != Some(t) {
            Some(n)
        } else {
            None
        }
    }

    /// Eager peephole used while the graph is built.
    ///
    /// With peepholes disabled the node is only typed and queued, leaving
    /// the work to the fixpoint engine.
    pub fn peephole(&mut self, n: NodeId) -> NodeId {
        if !self.eager {
            let t = self.compute(n);
            if self.node(n).ty().is_none() {
                self.node_mut(n).ty = Some(t);
            } else {
                self.set_type(n, t);
            }
            self.work.push(n);
            return n;
        }
        match self.peephole_opt(n) {
            None => n,
            // Edited in place: it may match a new rule or a hashed twin.
            Some(x) if x == n => self.peephole(n),
            Some(x) => {
                let x = if x.index() > n.index() && !self.is_dead(x) {
                    self.peephole(x)
                } else {
                    x
                };
                self.dead_code_elim(n, x)
            }
        }
    }

    /// Constant node for `t`, shared through value numbering.
    pub fn con(&mut self, t: Ty) -> NodeId {
        let start = self.start();
        let c = self.add_node(Operator::Constant(t), &[Some(start)], Span::DUMMY);
        self.peephole(c)
    }

    /// Integer constant node.
    pub fn con_int(&mut self, v: i64) -> NodeId {
        let t = self.types.int(v);
        self.con(t)
    }

    /// Dead control.
    pub fn xctrl(&mut self) -> NodeId {
        self.con(Ty::XCONTROL)
    }

    fn foldable_to_constant(&self, n: NodeId, t: Ty) -> bool {
        match self.op(n) {
            Operator::Constant(_) | Operator::Scope => return false,
            Operator::Control(ControlOp::Start | ControlOp::Stop) => return false,
            _ => {}
        }
        if matches!(self.types.get(t), TypeData::Tuple(_)) {
            return false;
        }
        self.types.is_high_or_const(t)
    }

    /// Look `n` up in the value-numbering table, registering it on a miss.
    ///
    /// On a hit the surviving node takes the join of both types.
    fn value_number(&mut self, n: NodeId) -> Option<NodeId> {
        if self.node(n).flags.contains(NodeFlags::HASHED) || !self.op(n).is_gvn_candidate() {
            return None;
        }
        if self.inputs(n).iter().skip(1).any(|i| i.is_none()) {
            return None;
        }
        let key = self.gvn_key(n);
        match self.gvn.get(&key) {
            Some(m) if m != n && !self.is_dead(m) => {
                let (tm, tn) = (self.ty(m), self.ty(n));
                let joined = self.types.join(tm, tn);
                self.set_type(m, joined);
                Some(m)
            }
            _ => {
                self.gvn.insert(key, n);
                self.node_mut(n).flags.insert(NodeFlags::HASHED);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operators::ArithOp;

    #[test]
    fn test_constants_are_shared() {
        let mut g = Graph::new(&[]);
        let a = g.con_int(5);
        let b = g.con_int(5);
        let c = g.con_int(6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_constant_folding_replaces_node() {
        let mut g = Graph::new(&[]);
        let a = g.con_int(2);
        let b = g.con_int(3);
        let add = g.add_node(Operator::IntOp(ArithOp::Add), &[None, Some(a), Some(b)], Span::DUMMY);
        let r = g.peephole(add);
        assert!(g.is_dead(add));
        assert_eq!(g.types.int_value(g.ty(r)), Some(5));
    }

    #[test]
    fn test_value_numbering_merges_duplicates() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let start = g.start();
        let x = g.add_node(Operator::Proj(2), &[Some(start)], Span::DUMMY);
        let x = g.peephole(x);
        g.keep(x);
        let one = g.con_int(1);
        let a = g.add_node(Operator::IntOp(ArithOp::Sub), &[None, Some(x), Some(one)], Span::DUMMY);
        let a = g.peephole(a);
        g.keep(a);
        let b = g.add_node(Operator::IntOp(ArithOp::Sub), &[None, Some(x), Some(one)], Span::DUMMY);
        let b = g.peephole(b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lazy_mode_only_types() {
        let mut g = Graph::new(&[]);
        g.set_eager(false);
        let a = g.con_int(2);
        let b = g.con_int(2);
        assert_ne!(a, b);
        assert!(g.worklist().contains(a));
        assert_eq!(g.types.int_value(g.ty(b)), Some(2));
    }
}
