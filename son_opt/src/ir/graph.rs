//! Sea-of-Nodes graph structure.
//!
//! The graph provides:
//! - **Arena-based storage**: nodes are addressed by [`NodeId`], never freed
//! - **Def-use symmetry**: every input edge has exactly one matching use edge
//! - **Edge surgery**: `set_def`, `add_def`, `del_def` and `subsume` keep both
//!   directions consistent and kill what becomes unreachable
//! - **Dominance queries**: immediate dominators of CFG nodes during
//!   optimization, cached until the control skeleton changes
//!
//! # Ownership
//!
//! The graph owns the type table, the worklist and the value-numbering table.
//! Every structural edit pushes the affected neighbourhood onto the worklist,
//! which is why these live together.

use super::arena::{Arena, SecondaryMap};
use super::node::{Inputs, Node, NodeFlags, NodeId};
use super::operators::{ControlOp, Operator};
use crate::opt::gvn::{GvnKey, GvnTable};
use crate::opt::worklist::WorkList;
use smallvec::SmallVec;
use son_core::span::Span;
use son_core::types::{Ty, TypeTable};

// =============================================================================
// Graph Structure
// =============================================================================

/// A Sea-of-Nodes graph for one function.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Arena<Node>,

    /// Interned types referenced by every node.
    pub types: TypeTable,

    /// Nodes whose neighbourhood changed since they were last visited.
    pub(crate) work: WorkList,

    /// Structural hash-consing table.
    pub(crate) gvn: GvnTable,

    /// Function entry; produces `[Ctrl, Mem, args...]`.
    start: NodeId,

    /// Function exit; its inputs are the Returns.
    stop: NodeId,

    /// Declared argument types.
    args: Box<[Ty]>,

    /// Bumped whenever a CFG edge changes; invalidates `idepths`.
    cfg_epoch: u32,

    /// `(epoch + 1, depth)` per CFG node; zero means never computed.
    idepths: SecondaryMap<Node, (u32, u32)>,

    /// Run peepholes as nodes are built.
    pub(crate) eager: bool,

    /// Set while verifying the fixpoint; dependency recording is suppressed.
    pub(crate) mid_assert: bool,

    /// Peephole applications that produced a different node.
    pub(crate) rewrites: usize,
}

impl Graph {
    /// Create a graph with Start and Stop for a function taking `args`.
    pub fn new(args: &[Ty]) -> Self {
        Self::with_types(TypeTable::new(), args)
    }

    /// Like [`Graph::new`], for argument types interned in `types`.
    pub fn with_types(types: TypeTable, args: &[Ty]) -> Self {
        let mut graph = Graph {
            nodes: Arena::with_capacity(256),
            types,
            work: WorkList::new(),
            gvn: GvnTable::new(),
            start: NodeId::new(0),
            stop: NodeId::new(0),
            args: args.into(),
            cfg_epoch: 0,
            idepths: SecondaryMap::new(),
            eager: true,
            mid_assert: false,
            rewrites: 0,
        };

        let start = graph.add_node(Operator::START, &[], Span::DUMMY);
        let start_ty = graph.start_type();
        graph.nodes[start].ty = Some(start_ty);
        graph.keep(start);

        let stop = graph.add_node(Operator::STOP, &[], Span::DUMMY);
        graph.nodes[stop].ty = Some(Ty::BOTTOM);
        graph.keep(stop);

        graph.start = start;
        graph.stop = stop;
        graph
    }

    /// `[Ctrl, MEM_BOT, args...]`
    pub(crate) fn start_type(&mut self) -> Ty {
        let mut elems: SmallVec<[Ty; 8]> = SmallVec::new();
        elems.push(Ty::CONTROL);
        elems.push(Ty::MEM_BOT);
        elems.extend(self.args.iter().copied());
        self.types.tuple(&elems)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    #[inline]
    pub fn stop(&self) -> NodeId {
        self.stop
    }

    pub fn args(&self) -> &[Ty] {
        &self.args
    }

    /// Number of node slots ever allocated, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, n: NodeId) -> &Node {
        &self.nodes[n]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, n: NodeId) -> &mut Node {
        &mut self.nodes[n]
    }

    #[inline]
    pub fn op(&self, n: NodeId) -> &Operator {
        &self.nodes[n].op
    }

    #[inline]
    pub fn input(&self, n: NodeId, i: usize) -> Option<NodeId> {
        self.nodes[n].input(i)
    }

    #[inline]
    pub fn inputs(&self, n: NodeId) -> &[Option<NodeId>] {
        self.nodes[n].inputs()
    }

    #[inline]
    pub fn outputs(&self, n: NodeId) -> &[NodeId] {
        self.nodes[n].outputs()
    }

    /// Cached type; BOTTOM before the first computation.
    #[inline]
    pub fn ty(&self, n: NodeId) -> Ty {
        self.nodes[n].ty.unwrap_or(Ty::BOTTOM)
    }

    #[inline]
    pub fn is_dead(&self, n: NodeId) -> bool {
        self.nodes[n].is_dead()
    }

    #[inline]
    pub fn is_cfg(&self, n: NodeId) -> bool {
        self.nodes[n].op.is_cfg()
    }

    /// Live nodes in id order.
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.is_dead())
            .map(|(id, _)| id)
    }

    /// Peephole rewrites performed so far.
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    /// Enable or disable peepholes during construction.
    pub fn set_eager(&mut self, eager: bool) {
        self.eager = eager;
    }

    pub fn worklist(&self) -> &WorkList {
        &self.work
    }

    pub fn worklist_mut(&mut self) -> &mut WorkList {
        &mut self.work
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Allocate a node and register its use edges. The node is untyped.
    pub fn add_node(&mut self, op: Operator, inputs: &[Option<NodeId>], span: Span) -> NodeId {
        let is_cfg = op.is_cfg();
        let ins: Inputs = inputs.iter().copied().collect();
        let id = self.nodes.alloc(Node::new(op, ins, span));
        for def in inputs.iter().flatten() {
            self.nodes[*def].outputs.push(id);
        }
        if is_cfg {
            self.cfg_epoch += 1;
        }
        id
    }

    // =========================================================================
    // Edge Surgery
    // =========================================================================

    /// Replace input `idx` of `n` with `new`.
    ///
    /// The new use is registered before the old one is dropped, so a def
    /// reachable through both is never killed in between.
    pub fn set_def(&mut self, n: NodeId, idx: usize, new: Option<NodeId>) {
        let old = self.nodes[n].input(idx);
        if old == new {
            return;
        }
        self.unlock(n);
        if let Some(new) = new {
            self.nodes[new].outputs.push(n);
        }
        if idx >= self.nodes[n].inputs.len() {
            self.nodes[n].inputs.resize(idx + 1, None);
        }
        self.nodes[n].inputs[idx] = new;
        if let Some(old) = old {
            if self.del_use(old, n) {
                self.kill(old);
            } else {
                self.work.push(old);
            }
        }
        self.edge_changed(n);
    }

    /// Append an input edge.
    pub fn add_def(&mut self, n: NodeId, new: Option<NodeId>) {
        self.unlock(n);
        self.nodes[n].inputs.push(new);
        if let Some(new) = new {
            self.nodes[new].outputs.push(n);
        }
        self.edge_changed(n);
    }

    /// Remove input `idx` by swapping the last input into its place.
    pub fn del_def(&mut self, n: NodeId, idx: usize) {
        self.unlock(n);
        let old = self.nodes[n].inputs.swap_remove(idx);
        if let Some(old) = old {
            if self.del_use(old, n) {
                self.kill(old);
            } else {
                self.work.push(old);
            }
        }
        self.edge_changed(n);
    }

    /// Drop the last input.
    pub fn pop_def(&mut self, n: NodeId) {
        let len = self.nodes[n].inputs.len();
        if len > 0 {
            self.del_def(n, len - 1);
        }
    }

    fn edge_changed(&mut self, n: NodeId) {
        if self.nodes[n].op.is_cfg() {
            self.cfg_epoch += 1;
        }
        self.work.push(n);
        self.move_deps(n);
    }

    /// Remove one use edge `user` from `def`; true if `def` became unused.
    ///
    /// Rules that count a node's uses register as its dependents, so losing
    /// a use wakes them.
    fn del_use(&mut self, def: NodeId, user: NodeId) -> bool {
        let outputs = &mut self.nodes[def].outputs;
        if let Some(pos) = outputs.iter().rposition(|&u| u == user) {
            outputs.remove(pos);
        }
        self.move_deps(def);
        self.nodes[def].is_unused() && !self.nodes[def].is_dead()
    }

    /// Redirect every use of `old` to `new`, then kill `old` if nothing
    /// keeps it.
    pub fn subsume(&mut self, old: NodeId, new: NodeId) {
        debug_assert_ne!(old, new, "cannot subsume a node with itself");
        while let Some(user) = self.nodes[old].outputs.pop() {
            self.unlock(user);
            let slot = self.nodes[user]
                .inputs
                .iter()
                .position(|&i| i == Some(old));
            if let Some(slot) = slot {
                self.nodes[user].inputs[slot] = Some(new);
            }
            self.nodes[new].outputs.push(user);
            if self.nodes[user].op.is_cfg() {
                self.cfg_epoch += 1;
            }
            let outs = self.nodes[user].outputs.clone();
            self.work.push_all(outs);
            self.work.push(user);
            self.move_deps(user);
        }
        self.rewrites += 1;
        if self.nodes[old].is_unused() && !self.nodes[old].is_dead() {
            self.kill(old);
        }
    }

    /// Kill `n` and, transitively, every input that loses its last use.
    pub fn kill(&mut self, n: NodeId) {
        debug_assert!(self.nodes[n].is_unused(), "killing a used node {n}");
        let mut stack = vec![n];
        while let Some(n) = stack.pop() {
            if self.nodes[n].is_dead() || !self.nodes[n].is_unused() {
                continue;
            }
            self.unlock(n);
            self.move_deps(n);
            if self.nodes[n].op.is_cfg() {
                self.cfg_epoch += 1;
            }
            let node = &mut self.nodes[n];
            let inputs = std::mem::take(&mut node.inputs);
            node.flags |= NodeFlags::DEAD;
            node.ty = None;
            for def in inputs.into_iter().flatten() {
                if self.del_use(def, n) {
                    stack.push(def);
                } else if !self.nodes[def].is_dead() {
                    self.work.push(def);
                }
            }
        }
    }

    /// Pin `n` so it survives losing its uses.
    pub fn keep(&mut self, n: NodeId) -> NodeId {
        self.nodes[n].keep += 1;
        n
    }

    pub fn unkeep(&mut self, n: NodeId) -> NodeId {
        debug_assert!(self.nodes[n].keep > 0, "unbalanced unkeep of {n}");
        self.nodes[n].keep = self.nodes[n].keep.saturating_sub(1);
        n
    }

    /// Unpin `n` and kill it if that was all that held it.
    pub fn release(&mut self, n: NodeId) {
        self.unkeep(n);
        if self.nodes[n].is_unused() && !self.nodes[n].is_dead() {
            self.kill(n);
        }
    }

    /// Kill `n` if it is unused and distinct from its replacement `m`.
    pub fn dead_code_elim(&mut self, n: NodeId, m: NodeId) -> NodeId {
        if m != n && self.nodes[n].is_unused() && !self.nodes[n].is_dead() {
            self.keep(m);
            self.kill(n);
            self.unkeep(m);
        }
        m
    }

    // =========================================================================
    // Value Numbering
    // =========================================================================

    pub(crate) fn gvn_key(&self, n: NodeId) -> GvnKey {
        let node = &self.nodes[n];
        GvnKey::new(&node.op, &node.inputs)
    }

    /// Unregister `n` from the value-numbering table before its edges change.
    pub(crate) fn unlock(&mut self, n: NodeId) {
        if self.nodes[n].flags.contains(NodeFlags::HASHED) {
            let key = self.gvn_key(n);
            self.gvn.remove(&key, n);
            self.nodes[n].flags.remove(NodeFlags::HASHED);
        }
    }

    // =========================================================================
    // Types and Dependencies
    // =========================================================================

    /// Store a new type and return the previous one.
    ///
    /// Types only move up the lattice. Dependents registered on `n` are moved
    /// onto the worklist when the type changes.
    pub(crate) fn set_type(&mut self, n: NodeId, t: Ty) -> Option<Ty> {
        let old = self.nodes[n].ty;
        if old == Some(t) {
            return old;
        }
        debug_assert!(
            match old {
                Some(o) => self.types.isa(t, o),
                None => true,
            },
            "type of {n} fell from {:?} to {}",
            old.map(|o| self.types.str(o)),
            self.types.str(t)
        );
        self.nodes[n].ty = Some(t);
        self.move_deps(n);
        old
    }

    /// Ask for `dep` to be revisited when `n` changes.
    ///
    /// Used by rules that inspect nodes beyond their immediate inputs.
    pub(crate) fn add_dep(&mut self, n: NodeId, dep: NodeId) {
        if self.mid_assert || n == dep || self.nodes[n].is_dead() {
            return;
        }
        let deps = &mut self.nodes[n].deps;
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    /// Move the dependents of `n` onto the worklist.
    pub(crate) fn move_deps(&mut self, n: NodeId) {
        if self.nodes[n].deps.is_empty() {
            return;
        }
        let deps = std::mem::take(&mut self.nodes[n].deps);
        for d in deps {
            if !self.nodes[d].is_dead() {
                self.work.push(d);
            }
        }
    }

    // =========================================================================
    // Dominance
    // =========================================================================

    /// Immediate dominator of a CFG node; `None` for Start.
    pub fn idom(&mut self, n: NodeId) -> Option<NodeId> {
        let node = &self.nodes[n];
        match node.op {
            Operator::Control(ControlOp::Start) => None,
            Operator::Control(ControlOp::Loop) => node.input(1),
            Operator::Control(ControlOp::Region) => {
                let ins: SmallVec<[NodeId; 4]> = node
                    .inputs
                    .iter()
                    .skip(1)
                    .flatten()
                    .copied()
                    .filter(|&c| self.nodes[c].op.is_cfg())
                    .collect();
                let mut lca: Option<NodeId> = None;
                for c in ins {
                    lca = Some(match lca {
                        None => c,
                        Some(l) => self.lca(l, c),
                    });
                }
                lca
            }
            Operator::Control(ControlOp::Stop) => None,
            _ => node.input(0).filter(|&c| self.nodes[c].op.is_cfg()),
        }
    }

    /// Dominator-tree depth; Start is zero.
    pub fn idepth(&mut self, n: NodeId) -> u32 {
        let (epoch, depth) = *self.idepths.get(n);
        if epoch == self.cfg_epoch + 1 {
            return depth;
        }
        let depth = match self.idom(n) {
            Some(d) if d != n => self.idepth(d) + 1,
            _ => 0,
        };
        self.idepths.set(n, (self.cfg_epoch + 1, depth));
        depth
    }

    /// Least common ancestor of two CFG nodes in the dominator tree.
    pub fn lca(&mut self, mut a: NodeId, mut b: NodeId) -> NodeId {
        while a != b {
            let (da, db) = (self.idepth(a), self.idepth(b));
            if da >= db {
                match self.idom(a) {
                    Some(d) => a = d,
                    None => return a,
                }
            } else {
                match self.idom(b) {
                    Some(d) => b = d,
                    None => return b,
                }
            }
        }
        a
    }

    // =========================================================================
    // Walks and Validation
    // =========================================================================

    /// Nodes reachable from Stop through inputs, plus their users.
    ///
    /// Returned in discovery order, Stop first.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = super::arena::BitSet::with_capacity(self.nodes.len());
        let mut order = Vec::new();
        let mut stack = vec![self.stop];
        seen.insert(self.stop.as_usize());
        while let Some(n) = stack.pop() {
            order.push(n);
            let node = &self.nodes[n];
            for &next in node.inputs.iter().flatten().chain(node.outputs.iter()) {
                if !self.nodes[next].is_dead() && seen.insert(next.as_usize()) {
                    stack.push(next);
                }
            }
        }
        order
    }

    /// Check def-use symmetry over all live nodes.
    pub fn verify_edges(&self) -> Result<(), String> {
        for (id, node) in self.nodes.iter() {
            if node.is_dead() {
                if !node.inputs.is_empty() {
                    return Err(format!("dead node {id} still has inputs"));
                }
                continue;
            }
            for &def in node.inputs.iter().flatten() {
                if self.nodes[def].is_dead() {
                    return Err(format!("{id} uses dead node {def}"));
                }
                let ins = node.inputs.iter().filter(|&&i| i == Some(def)).count();
                let outs = self.nodes[def].outputs.iter().filter(|&&u| u == id).count();
                if ins != outs {
                    return Err(format!(
                        "{id} has {ins} edges from {def} but {def} lists {outs} uses"
                    ));
                }
            }
            for &user in node.outputs.iter() {
                if self.nodes[user].is_dead() {
                    return Err(format!("{id} is used by dead node {user}"));
                }
                if !self.nodes[user].inputs.contains(&Some(id)) {
                    return Err(format!("{id} lists use {user} without an edge"));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Debug Formatting
// =============================================================================

impl Graph {
    /// One line per live node: `#id Label(inputs) : type`.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for n in self.live_nodes() {
            let node = &self.nodes[n];
            let ins: Vec<String> = node
                .inputs
                .iter()
                .map(|i| i.map_or_else(|| "_".to_string(), |i| i.to_string()))
                .collect();
            let ty = node
                .ty
                .map_or_else(|| "?".to_string(), |t| self.types.str(t));
            let _ = writeln!(out, "{n} {}({}) : {ty}", node.op.label(), ins.join(", "));
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
