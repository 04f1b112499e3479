//! Structural value numbering.
//!
//! Side-effect-free nodes with the same operator and the same inputs are
//! the same value. A node is registered ("hashed") when its peephole runs
//! and must be unregistered before any of its edges change, since the key is
//! computed from the edges.

use crate::ir::node::{Inputs, NodeId};
use crate::ir::operators::Operator;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GvnKey {
    op: Operator,
    inputs: Inputs,
}

impl GvnKey {
    pub(crate) fn new(op: &Operator, inputs: &Inputs) -> Self {
        GvnKey {
            op: op.clone(),
            inputs: inputs.clone(),
        }
    }
}

/// Hash-cons table from structure to the canonical node.
#[derive(Debug, Clone, Default)]
pub struct GvnTable {
    map: FxHashMap<GvnKey, NodeId>,
}

impl GvnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &GvnKey) -> Option<NodeId> {
        self.map.get(key).copied()
    }

    pub(crate) fn insert(&mut self, key: GvnKey, n: NodeId) {
        self.map.insert(key, n);
    }

    /// Remove `key` if it maps to `n`.
    pub(crate) fn remove(&mut self, key: &GvnKey, n: NodeId) -> bool {
        if self.map.get(key) == Some(&n) {
            self.map.remove(key);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operators::ArithOp;
    use smallvec::smallvec;

    #[test]
    fn test_same_structure_same_key() {
        let a: Inputs = smallvec![None, Some(NodeId::new(1)), Some(NodeId::new(2))];
        let add = Operator::IntOp(ArithOp::Add);
        let mut table = GvnTable::new();
        table.insert(GvnKey::new(&add, &a), NodeId::new(9));
        assert_eq!(table.get(&GvnKey::new(&add, &a.clone())), Some(NodeId::new(9)));

        let sub = Operator::IntOp(ArithOp::Sub);
        assert_eq!(table.get(&GvnKey::new(&sub, &a)), None);
    }

    #[test]
    fn test_remove_checks_owner() {
        let a: Inputs = smallvec![None, Some(NodeId::new(1))];
        let op = Operator::Not;
        let key = GvnKey::new(&op, &a);
        let mut table = GvnTable::new();
        table.insert(key.clone(), NodeId::new(4));
        assert!(!table.remove(&key, NodeId::new(5)));
        assert!(table.remove(&key, NodeId::new(4)));
        assert!(table.is_empty());
    }
}
