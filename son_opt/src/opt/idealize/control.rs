//! Control-flow simplification.
//!
//! Dead paths are removed from merge points together with the matching Phi
//! inputs, merges left with one path collapse, and branches whose outcome is
//! known collapse onto their controlling block.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::Operator;
use son_core::types::{Ty, TypeData};

impl Graph {
    /// A Loop whose back edge has not been wired yet.
    pub(crate) fn in_progress(&self, region: NodeId) -> bool {
        self.op(region).is_loop() && self.node(region).n_ins() == 3 && self.input(region, 2).is_none()
    }

    /// The one value a Phi merges along live paths, ignoring itself.
    fn single_unique_input(&mut self, phi: NodeId, region: NodeId) -> Option<NodeId> {
        let mut live = None;
        for i in 1..self.node(phi).n_ins() {
            if self.ctrl_dead(region, i) {
                continue;
            }
            let v = self.input(phi, i)?;
            if v == phi {
                continue;
            }
            match live {
                None => live = Some(v),
                Some(l) if l == v => {}
                Some(_) => return None,
            }
        }
        live
    }

    pub(super) fn idealize_phi(&mut self, n: NodeId) -> Option<NodeId> {
        let region = self.input(n, 0)?;
        if self.in_progress(region) {
            return None;
        }
        self.add_dep(region, n);
        self.single_unique_input(n, region)
    }

    pub(super) fn idealize_region(&mut self, n: NodeId) -> Option<NodeId> {
        if self.in_progress(n) {
            return None;
        }
        let is_loop = self.op(n).is_loop();

        // Delete one dead path at a time; the node is revisited for the rest.
        let n_ins = self.node(n).n_ins();
        let first_dead = (1..n_ins).find(|&i| self.ctrl_dead(n, i) && !(is_loop && i == 1));
        if let Some(path) = first_dead {
            if n_ins > 2 {
                let phis: Vec<NodeId> = self
                    .outputs(n)
                    .iter()
                    .copied()
                    .filter(|&u| self.op(u).is_phi() && self.input(u, 0) == Some(n))
                    .collect();
                for phi in phis {
                    if self.node(phi).n_ins() > path {
                        self.del_def(phi, path);
                    }
                }
                self.del_def(n, path);
                return Some(n);
            }
        }

        let has_phis = self.outputs(n).iter().any(|&u| self.op(u).is_phi());
        if has_phis {
            return None;
        }
        if self.node(n).n_ins() == 2 {
            return self.input(n, 1);
        }
        self.empty_diamond(n)
    }

    /// `Region(True(If), False(If))` with no Phis is the If's own control.
    fn empty_diamond(&mut self, n: NodeId) -> Option<NodeId> {
        if self.node(n).n_ins() != 3 || self.op(n).is_loop() {
            return None;
        }
        let (a, b) = (self.input(n, 1)?, self.input(n, 2)?);
        if !matches!(self.op(a), Operator::CProj(_)) || !matches!(self.op(b), Operator::CProj(_)) {
            return None;
        }
        let iff = self.input(a, 0)?;
        if a == b || self.input(b, 0) != Some(iff) || *self.op(iff) != Operator::IF {
            return None;
        }
        // Each arm must flow straight into the merge.
        self.add_dep(a, n);
        self.add_dep(b, n);
        if self.outputs(a).len() != 1 || self.outputs(b).len() != 1 {
            return None;
        }
        self.input(iff, 0)
    }

    pub(super) fn idealize_if(&mut self, n: NodeId) -> Option<NodeId> {
        // A test already decided by a dominating If gets its constant outcome.
        let pred = self.input(n, 1)?;
        if self.is_con(pred) {
            return None;
        }
        let outcome = match self.ty(n) {
            Ty::IF_TRUE => Ty::ONE,
            Ty::IF_FALSE => Ty::ZERO,
            _ => return None,
        };
        let c = self.con(outcome);
        self.set_def(n, 1, Some(c));
        Some(n)
    }

    pub(super) fn idealize_cproj(&mut self, n: NodeId, idx: u32) -> Option<NodeId> {
        let parent = self.input(n, 0)?;
        if *self.op(parent) != Operator::IF {
            return None;
        }
        let t = self.ty(parent);
        let mine = self.types.tuple_elem(t, idx as usize);
        let other = self.types.tuple_elem(t, 1 - idx as usize);
        if mine == Ty::CONTROL && other == Ty::XCONTROL {
            return self.input(parent, 0);
        }
        None
    }

    /// Drop Returns on dead paths.
    pub(super) fn idealize_stop(&mut self, n: NodeId) -> Option<NodeId> {
        let dead = (0..self.node(n).n_ins()).find(|&i| match self.input(n, i) {
            Some(r) => match self.types.get(self.ty(r)) {
                TypeData::Tuple(elems) => elems.first() == Some(&Ty::XCONTROL),
                _ => self.ty(r) == Ty::XCONTROL,
            },
            None => true,
        });
        let i = dead?;
        self.del_def(n, i);
        Some(n)
    }
}
