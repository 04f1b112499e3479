//! Residual error collection.
//!
//! Peepholes never stop on a semantic error, so erroneous code on a dead
//! path simply folds away. Whatever survives the fixpoint is reported here,
//! one diagnostic per offending node, ordered by node id.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{CmpOp, MemoryOp, Operator};
use son_core::error::{Diagnostic, SonError, SonResult};
use son_core::types::{Nil, StructType, Ty};

impl Graph {
    /// The semantic error carried by `n`, if any.
    pub fn err(&mut self, n: NodeId) -> Option<String> {
        let op = self.op(n).clone();
        match op {
            Operator::Memory(MemoryOp::Load(field)) => {
                let ptr = self.in_ty(n, 2);
                self.null_check(ptr, &field.name).or_else(|| self.index_check(n))
            }
            Operator::Memory(MemoryOp::Store(field)) => {
                let ptr = self.in_ty(n, 2);
                let early = self.null_check(ptr, &field.name).or_else(|| self.index_check(n));
                if early.is_some() {
                    return early;
                }
                if field.is_final {
                    return Some(format!("cannot modify final field '{}'", field.name));
                }
                let val = self.in_ty(n, 3);
                if !self.types.isa(val, field.declared) {
                    return Some(format!(
                        "cannot store {} into field '{}' of type {}",
                        self.types.display(val),
                        field.name,
                        self.types.display(field.declared)
                    ));
                }
                None
            }
            Operator::Phi(declared) => {
                let region = self.input(n, 0)?;
                let mut seen: Vec<Ty> = Vec::new();
                let mut escapes = false;
                for i in 1..self.node(n).n_ins() {
                    if self.ctrl_dead(region, i) {
                        continue;
                    }
                    let t = self.in_ty(n, i);
                    escapes |= !self.types.isa(t, declared);
                    if !seen.contains(&t) {
                        seen.push(t);
                    }
                }
                if (self.ty(n) != Ty::BOTTOM && !escapes) || seen.len() < 2 {
                    return None;
                }
                Some(format!(
                    "type mismatch across branches: {} and {}",
                    self.types.display(seen[0]),
                    self.types.display(seen[1])
                ))
            }
            Operator::Memory(MemoryOp::New(obj)) => {
                let is_array = matches!(
                    self.types.as_struct(obj),
                    Some(StructType::Named { name, .. }) if name.starts_with('[')
                );
                if !is_array {
                    return None;
                }
                // The length is the first initial value.
                let len = self.in_ty(n, 1 + self.new_field_count(n));
                if self.types.is_high(len) || self.types.is_int(len) {
                    return None;
                }
                Some(format!(
                    "cannot allocate an array with length {}",
                    self.types.display(len)
                ))
            }
            Operator::IntOp(_) | Operator::Bitwise(_) => self.int_operands(n, op.label()),
            Operator::IntCmp(CmpOp::Lt | CmpOp::Le) => self.int_operands(n, op.label()),
            _ => None,
        }
    }

    fn null_check(&self, ptr: Ty, field: &str) -> Option<String> {
        if self.types.is_high(ptr) {
            return None;
        }
        match self.types.as_ptr(ptr) {
            Some(p) if p.nil == Nil::MaybeNil => {
                Some(format!("might be null accessing '{field}'"))
            }
            Some(_) => None,
            None => Some(format!("expected a reference accessing '{field}'")),
        }
    }

    fn index_check(&self, n: NodeId) -> Option<String> {
        let idx = self.ty(self.elem_index(n)?);
        if self.types.is_high(idx) || self.types.is_int(idx) {
            return None;
        }
        Some(format!("cannot index an array with {}", self.types.display(idx)))
    }

    fn int_operands(&self, n: NodeId, label: &str) -> Option<String> {
        let refs = (1..self.node(n).n_ins()).any(|i| self.types.is_ptr(self.in_ty(n, i)));
        refs.then(|| format!("cannot apply {label} to a reference"))
    }
}

/// Collect the errors of every live reachable node.
pub fn type_check(graph: &mut Graph) -> SonResult<()> {
    let mut nodes = graph.reachable();
    nodes.sort_unstable();
    let mut diagnostics = Vec::new();
    for n in nodes {
        if let Some(message) = graph.err(n) {
            diagnostics.push(Diagnostic::new(message, graph.node(n).span));
        }
    }
    log::debug!("type check: {} errors", diagnostics.len());
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(SonError::Semantic(diagnostics))
    }
}
