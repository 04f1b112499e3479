//! Memory forwarding.
//!
//! Each alias class has its own memory thread, so a load only has to look
//! at the last writer of its own field: a Store to the same object, or the
//! allocation that initialized it. Array elements share the body alias and
//! are told apart by their index node; two constant indices that differ
//! never overlap.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{FieldRef, MemoryOp, Operator};

impl Graph {
    /// Strip null-check casts to find the underlying pointer value.
    pub(crate) fn base_ptr(&self, mut p: NodeId) -> NodeId {
        while let Operator::Cast(_) = self.op(p) {
            match self.input(p, 1) {
                Some(x) => p = x,
                None => break,
            }
        }
        p
    }

    /// The New that produced pointer `p`, if `p` is its pointer projection.
    fn allocation_of(&self, p: NodeId) -> Option<NodeId> {
        let p = self.base_ptr(p);
        if *self.op(p) != Operator::Proj(1) {
            return None;
        }
        let new = self.input(p, 0)?;
        matches!(self.op(new), Operator::Memory(MemoryOp::New(_))).then_some(new)
    }

    /// Two pointers provably naming different objects.
    fn distinct_objects(&self, a: NodeId, b: NodeId) -> bool {
        match (self.allocation_of(a), self.allocation_of(b)) {
            (Some(x), Some(y)) => x != y,
            _ => false,
        }
    }

    fn same_object(&self, a: NodeId, b: NodeId) -> bool {
        self.base_ptr(a) == self.base_ptr(b)
    }

    fn field_of(&self, n: NodeId) -> Option<FieldRef> {
        match self.op(n) {
            Operator::Memory(MemoryOp::Load(f) | MemoryOp::Store(f)) => Some(f.clone()),
            _ => None,
        }
    }

    /// Element index of an array access; `None` for a plain field.
    pub(crate) fn elem_index(&self, n: NodeId) -> Option<NodeId> {
        match self.op(n) {
            Operator::Memory(MemoryOp::Load(_)) => self.input(n, 3),
            Operator::Memory(MemoryOp::Store(_)) => self.input(n, 4),
            _ => None,
        }
    }

    fn distinct_indices(&self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return false;
        };
        match (
            self.types.int_value(self.ty(a)),
            self.types.int_value(self.ty(b)),
        ) {
            (Some(x), Some(y)) => x != y,
            _ => false,
        }
    }

    /// Number of fields a New initializes.
    pub(crate) fn new_field_count(&self, new: NodeId) -> usize {
        (self.node(new).n_ins() - 1) / 2
    }

    /// The memory slot of `new` for a field, by memory projection index.
    fn new_slot(&self, new: NodeId, proj: u32) -> Option<usize> {
        let i = (proj as usize).checked_sub(2)?;
        (i < self.new_field_count(new)).then_some(i)
    }

    /// Forward `value` as the result of load `n` if its type fits the field.
    fn forward(&mut self, n: NodeId, value: NodeId, field: &FieldRef) -> Option<NodeId> {
        self.add_dep(value, n);
        let t = self.ty(value);
        self.types.isa(t, field.declared).then_some(value).filter(|&v| v != n)
    }

    pub(super) fn idealize_load(&mut self, n: NodeId) -> Option<NodeId> {
        let field = self.field_of(n)?;
        let mem = self.input(n, 1)?;
        let ptr = self.input(n, 2)?;

        match self.op(mem).clone() {
            Operator::Memory(MemoryOp::Store(sf)) if sf.alias == field.alias => {
                let sptr = self.input(mem, 2)?;
                let (sidx, idx) = (self.elem_index(mem), self.elem_index(n));
                if let Some(i) = sidx {
                    self.add_dep(i, n);
                }
                let same = self.same_object(sptr, ptr);
                if same && sidx == idx {
                    let val = self.input(mem, 3)?;
                    return self.forward(n, val, &field);
                }
                if self.distinct_objects(sptr, ptr) || (same && self.distinct_indices(sidx, idx)) {
                    let older = self.input(mem, 1)?;
                    self.set_def(n, 1, Some(older));
                    return Some(n);
                }
                None
            }
            Operator::Proj(idx) => {
                let new = self.input(mem, 0)?;
                if !matches!(self.op(new), Operator::Memory(MemoryOp::New(_))) {
                    return None;
                }
                self.add_dep(new, n);
                let slot = self.new_slot(new, idx)?;
                if self.allocation_of(ptr) == Some(new) {
                    let count = self.new_field_count(new);
                    let init = self.input(new, 1 + count + slot)?;
                    return self.forward(n, init, &field);
                }
                if self.allocation_of(ptr).is_some() {
                    let before = self.input(new, 1 + slot)?;
                    self.set_def(n, 1, Some(before));
                    return Some(n);
                }
                None
            }
            _ => None,
        }
    }

    /// A Store overwriting a same-object Store nothing else observes
    /// replaces it on the memory thread.
    pub(super) fn idealize_store(&mut self, n: NodeId) -> Option<NodeId> {
        let field = self.field_of(n)?;
        let mem = self.input(n, 1)?;
        let ptr = self.input(n, 2)?;
        let Some(prior) = self.field_of(mem) else {
            return None;
        };
        if !self.op(mem).is_store() || prior.alias != field.alias {
            return None;
        }
        let prior_ptr = self.input(mem, 2)?;
        self.add_dep(mem, n);
        if self.outputs(mem).len() != 1
            || !self.same_object(prior_ptr, ptr)
            || self.elem_index(mem) != self.elem_index(n)
        {
            return None;
        }
        let older = self.input(mem, 1)?;
        self.set_def(n, 1, Some(older));
        Some(n)
    }
}
