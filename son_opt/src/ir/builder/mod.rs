//! Graph builder for front-ends.
//!
//! Converts structured source (variables, if/else, while loops, structs)
//! into a Sea-of-Nodes graph, peepholing every node as it is created.
//!
//! # Scopes
//!
//! Variables and memory live in the inputs of a [`Operator::Scope`] node:
//! slot 0 is the current control, then one slot per alias class, then
//! variables in declaration order. Because the scope *uses* every live
//! value, nothing reachable from a variable can be collected behind the
//! builder's back.
//!
//! # Lazy Loop Phis
//!
//! Entering a loop does not create a Phi per variable. Instead each slot of
//! the body scope holds the loop-head scope itself as a sentinel; the first
//! read or write of a sentinel slot creates the Phi on demand. Variables a
//! loop never touches therefore never get a Phi.
//!
//! A lazy Phi is declared with the most general type of its entry value's
//! category (`int` for an integer, any pointer for a reference), so Phis
//! feeding each other around nested loops settle there instead of at
//! BOTTOM.

mod arithmetic;
mod control;
mod objects;


pub use arithmetic::ArithmeticBuilder;
pub use control::ControlBuilder;
pub use objects::{ObjectBuilder, StructDecl};

use super::graph::Graph;
use super::node::NodeId;
use super::operators::{MemoryOp, Operator};
use rustc_hash::FxHashMap;
use son_core::error::{Phase, SonError, SonResult};
use son_core::span::Span;
use son_core::types::Ty;
use std::sync::Arc;

// =============================================================================
// Builder State
// =============================================================================

/// An open `if` statement.
#[derive(Debug)]
struct IfFrame {
    /// Scope of the arm not currently being built.
    other: NodeId,
    /// The else arm is the current one.
    in_else: bool,
    /// Scope length when the statement began.
    depth: usize,
}

/// An open `while` loop.
#[derive(Debug)]
struct LoopFrame {
    /// Scope at the loop head; sentinel for untouched body slots.
    head: NodeId,
    /// Scope taking the exit path once the test is built.
    exit: Option<NodeId>,
    depth: usize,
}

#[derive(Debug)]
enum Frame {
    If(IfFrame),
    Loop(LoopFrame),
}

/// A `return` waiting for the function exit to be assembled.
#[derive(Debug, Clone, Copy)]
struct ExitPath {
    ctrl: NodeId,
    mem: NodeId,
    val: NodeId,
}

/// Builds one function graph.
#[derive(Debug)]
pub struct GraphBuilder {
    pub(crate) graph: Graph,

    /// Current scope node.
    scope: NodeId,

    /// Lexical name levels mapping each variable to its scope slot.
    names: Vec<FxHashMap<Arc<str>, usize>>,

    /// Scope slot of each alias class.
    alias_slots: FxHashMap<u32, usize>,

    frames: Vec<Frame>,
    returns: Vec<ExitPath>,

    /// Declared structs by name.
    structs: FxHashMap<Arc<str>, StructDecl>,

    /// Source position stamped on new nodes.
    span: Span,
}

impl GraphBuilder {
    /// Start building a function taking arguments of the given types.
    pub fn new(args: &[Ty]) -> Self {
        Self::with_graph(Graph::new(args))
    }

    /// Build on a fresh graph, e.g. one with eager peepholes disabled.
    pub fn with_graph(mut graph: Graph) -> Self {
        let start = graph.start();
        let ctrl = graph.add_node(Operator::CProj(0), &[Some(start)], Span::DUMMY);
        let ctrl = graph.peephole(ctrl);
        let scope = graph.add_node(Operator::Scope, &[Some(ctrl)], Span::DUMMY);
        Self {
            graph,
            scope,
            names: vec![FxHashMap::default()],
            alias_slots: FxHashMap::default(),
            frames: Vec::new(),
            returns: Vec::new(),
            structs: FxHashMap::default(),
            span: Span::DUMMY,
        }
    }

    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Stamp subsequent nodes with `span`.
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    /// Current control.
    pub fn ctrl(&self) -> NodeId {
        self.graph
            .input(self.scope, 0)
            .unwrap_or_else(|| self.graph.start())
    }

    pub(crate) fn set_ctrl(&mut self, ctrl: NodeId) {
        self.graph.set_def(self.scope, 0, Some(ctrl));
    }

    /// Current control is known dead.
    pub fn is_dead_code(&self) -> bool {
        self.graph.ty(self.ctrl()) == Ty::XCONTROL
    }

    /// Add a node at the current span and peephole it.
    ///
    /// Inputs stay alive even if the new node folds away, so handles the
    /// caller still holds remain valid; leftovers are collected by the
    /// fixpoint engine.
    pub(crate) fn emit(&mut self, op: Operator, inputs: &[Option<NodeId>]) -> NodeId {
        for def in inputs.iter().flatten() {
            self.graph.keep(*def);
        }
        let n = self.graph.add_node(op, inputs, self.span);
        let n = self.graph.peephole(n);
        for def in inputs.iter().flatten() {
            self.graph.unkeep(*def);
        }
        n
    }

    /// Function argument `i`.
    pub fn arg(&mut self, i: usize) -> NodeId {
        let start = self.graph.start();
        self.emit(Operator::Proj(2 + i as u32), &[Some(start)])
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Declare `name` in the innermost lexical level.
    pub fn define(&mut self, name: &str, value: NodeId) -> SonResult<()> {
        let level = self.names.last_mut().ok_or_else(|| {
            SonError::internal(Phase::Build, "no lexical scope to define in")
        })?;
        if level.contains_key(name) {
            return Err(SonError::semantic(
                format!("redefining name '{name}'"),
                self.span,
            ));
        }
        let slot = self.graph.node(self.scope).n_ins();
        level.insert(name.into(), slot);
        self.graph.add_def(self.scope, Some(value));
        Ok(())
    }

    fn slot_of(&self, name: &str) -> SonResult<usize> {
        self.names
            .iter()
            .rev()
            .find_map(|level| level.get(name).copied())
            .ok_or_else(|| SonError::semantic(format!("undefined name '{name}'"), self.span))
    }

    /// Current value of `name`.
    pub fn get(&mut self, name: &str) -> SonResult<NodeId> {
        let slot = self.slot_of(name)?;
        self.read_slot(self.scope, slot)
    }

    /// Rebind `name` to `value`.
    pub fn assign(&mut self, name: &str, value: NodeId) -> SonResult<()> {
        let slot = self.slot_of(name)?;
        self.write_slot(self.scope, slot, value)
    }

    /// Resolve slot `i` of `scope`, materializing a lazy loop Phi if the
    /// slot still holds a loop-head sentinel.
    pub(crate) fn read_slot(&mut self, scope: NodeId, i: usize) -> SonResult<NodeId> {
        let v = self.graph.input(scope, i).ok_or_else(|| {
            SonError::internal(Phase::Build, format!("scope slot {i} is empty"))
        })?;
        if *self.graph.op(v) != Operator::Scope {
            return Ok(v);
        }
        let head = v;
        let loop_ctrl = self.graph.input(head, 0).ok_or_else(|| {
            SonError::internal(Phase::Build, "loop head scope has no control")
        })?;
        // A loop entered on dead control folded away; nothing to merge.
        if !self.graph.in_progress(loop_ctrl) {
            let entry = self.read_slot(head, i)?;
            self.graph.set_def(scope, i, Some(entry));
            return Ok(entry);
        }
        let current = self.graph.input(head, i);
        let phi = match current {
            Some(p) if self.graph.op(p).is_phi() && self.graph.input(p, 0) == Some(loop_ctrl) => p,
            _ => {
                let entry = self.read_slot(head, i)?;
                // The back edge is unknown yet; assume anything of the entry's kind.
                let declared = self.graph.types.glb(self.graph.ty(entry));
                let phi = self.graph.add_node(
                    Operator::Phi(declared),
                    &[Some(loop_ctrl), Some(entry), None],
                    self.span,
                );
                let phi = self.graph.peephole(phi);
                self.graph.set_def(head, i, Some(phi));
                phi
            }
        };
        self.graph.set_def(scope, i, Some(phi));
        Ok(phi)
    }

    /// Overwrite slot `i`; a sentinel is resolved first so the loop head
    /// still gets its Phi.
    pub(crate) fn write_slot(&mut self, scope: NodeId, i: usize, value: NodeId) -> SonResult<()> {
        self.graph.keep(value);
        let resolved = self.read_slot(scope, i);
        self.graph.unkeep(value);
        resolved?;
        self.graph.set_def(scope, i, Some(value));
        Ok(())
    }

    // =========================================================================
    // Memory Slots
    // =========================================================================

    /// Register a scope slot for a new alias class, initialized to the
    /// entry memory.
    pub(crate) fn add_alias_slot(&mut self, alias: u32) -> SonResult<()> {
        if !self.frames.is_empty() {
            return Err(SonError::internal(
                Phase::Build,
                "structs must be declared outside control flow",
            ));
        }
        let start = self.graph.start();
        let mem = self.emit(Operator::Proj(1), &[Some(start)]);
        let slot = self.graph.node(self.scope).n_ins();
        self.graph.add_def(self.scope, Some(mem));
        self.alias_slots.insert(alias, slot);
        Ok(())
    }

    fn alias_slot(&self, alias: u32) -> SonResult<usize> {
        self.alias_slots.get(&alias).copied().ok_or_else(|| {
            SonError::internal(Phase::Build, format!("alias #{alias} has no memory slot"))
        })
    }

    /// Memory state of an alias class.
    pub(crate) fn mem(&mut self, alias: u32) -> SonResult<NodeId> {
        let slot = self.alias_slot(alias)?;
        self.read_slot(self.scope, slot)
    }

    pub(crate) fn set_mem(&mut self, alias: u32, mem: NodeId) -> SonResult<()> {
        let slot = self.alias_slot(alias)?;
        self.write_slot(self.scope, slot, mem)
    }

    /// Every alias slot joined into one memory value.
    fn merge_all_memory(&mut self) -> SonResult<NodeId> {
        let mut slots: Vec<usize> = self.alias_slots.values().copied().collect();
        slots.sort_unstable();
        let mut inputs = Vec::with_capacity(slots.len() + 1);
        inputs.push(None);
        for slot in slots {
            let m = self.read_slot(self.scope, slot)?;
            inputs.push(Some(m));
        }
        Ok(self.emit(Operator::Memory(MemoryOp::Merge), &inputs))
    }

    // =========================================================================
    // Scope Surgery
    // =========================================================================

    /// Copy of `scope`. A loop copy fills every data slot with `scope`
    /// itself as the lazy-Phi sentinel.
    pub(crate) fn dup_scope(&mut self, scope: NodeId, for_loop: bool) -> NodeId {
        let mut inputs: Vec<Option<NodeId>> = self.graph.inputs(scope).to_vec();
        if for_loop {
            for slot in inputs.iter_mut().skip(1) {
                *slot = Some(scope);
            }
        }
        self.graph.add_node(Operator::Scope, &inputs, Span::DUMMY)
    }

    /// Drop slots of names declared at or after `depth`.
    pub(crate) fn truncate_scope(&mut self, scope: NodeId, depth: usize) {
        while self.graph.node(scope).n_ins() > depth {
            self.graph.pop_def(scope);
        }
    }

    pub(crate) fn push_names(&mut self) {
        self.names.push(FxHashMap::default());
    }

    pub(crate) fn pop_names(&mut self) {
        if self.names.len() > 1 {
            self.names.pop();
        }
    }

    /// Current scope length, for truncation when a nested level closes.
    pub(crate) fn depth(&self) -> usize {
        self.graph.node(self.scope).n_ins()
    }

    /// Kill a scope node the builder no longer tracks.
    pub(crate) fn drop_scope(&mut self, scope: NodeId) {
        if self.graph.is_dead(scope) {
            return;
        }
        if self.graph.node(scope).is_kept() {
            self.graph.unkeep(scope);
        }
        // Sentinel uses from nested scopes are gone by now; clear the
        // inputs so any remaining values lose this use.
        while self.graph.node(scope).n_ins() > 0 {
            self.graph.pop_def(scope);
        }
        if self.graph.node(scope).is_unused() {
            self.graph.kill(scope);
        }
    }

    // =========================================================================
    // Exits
    // =========================================================================

    /// Record a return of `val` on the current path and make what follows
    /// dead code.
    pub(crate) fn add_exit(&mut self, val: NodeId) -> SonResult<()> {
        self.graph.keep(val);
        let mem = self.merge_all_memory();
        self.graph.unkeep(val);
        let mem = mem?;
        let ctrl = self.ctrl();
        self.graph.keep(ctrl);
        self.graph.keep(mem);
        self.graph.keep(val);
        self.returns.push(ExitPath { ctrl, mem, val });
        let dead = self.graph.xctrl();
        self.set_ctrl(dead);
        Ok(())
    }

    /// Close the function and hand back the graph.
    ///
    /// A path still live at the end returns integer zero.
    pub fn finish(mut self) -> SonResult<Graph> {
        if !self.frames.is_empty() {
            return Err(SonError::internal(
                Phase::Build,
                format!("{} control statements left open", self.frames.len()),
            ));
        }
        if !self.is_dead_code() {
            let zero = self.graph.con_int(0);
            self.add_exit(zero)?;
        }

        let returns = std::mem::take(&mut self.returns);
        let ret = match returns.as_slice() {
            [] => None,
            [path] => Some(self.emit(
                Operator::RETURN,
                &[Some(path.ctrl), Some(path.mem), Some(path.val)],
            )),
            paths => {
                let mut ctrls = vec![None];
                ctrls.extend(paths.iter().map(|p| Some(p.ctrl)));
                let region = self.graph.add_node(Operator::REGION, &ctrls, self.span);
                let t = self.graph.compute(region);
                self.graph.set_type(region, t);
                self.graph.keep(region);

                let mut mems = vec![Some(region)];
                mems.extend(paths.iter().map(|p| Some(p.mem)));
                let mem = self.emit(Operator::Phi(Ty::BOTTOM), &mems);
                self.graph.keep(mem);

                let mut vals = vec![Some(region)];
                vals.extend(paths.iter().map(|p| Some(p.val)));
                let val = self.emit(Operator::Phi(Ty::BOTTOM), &vals);
                self.graph.keep(val);

                self.graph.unkeep(region);
                let ctrl = self.graph.peephole(region);
                let ret = self.emit(Operator::RETURN, &[Some(ctrl), Some(mem), Some(val)]);
                self.graph.unkeep(mem);
                self.graph.unkeep(val);
                Some(ret)
            }
        };

        if let Some(ret) = ret {
            let stop = self.graph.stop();
            self.graph.add_def(stop, Some(ret));
        }
        for path in returns {
            self.graph.release(path.ctrl);
            self.graph.release(path.mem);
            self.graph.release(path.val);
        }
        let scope = self.scope;
        self.drop_scope(scope);
        let stop = self.graph.stop();
        self.graph.peephole(stop);

        log::debug!(
            "built graph: {} live nodes, {} structs",
            self.graph.live_nodes().count(),
            self.structs.len()
        );
        Ok(self.graph)
    }
}
