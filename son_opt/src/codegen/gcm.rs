//! Global code motion.
//!
//! Assigns every floating node to one basic block:
//!
//! 1. **Schedule early**: the deepest block among the blocks of the node's
//!    inputs, i.e. the highest point where every input is available.
//! 2. **Schedule late**: the lowest common dominator of all uses. A Phi use
//!    counts at the end of the matching predecessor block.
//! 3. **Select**: walk from the late block up the dominator tree to the
//!    early block and take the shallowest loop depth, preferring the lower
//!    block on ties.
//!
//! Loads must read memory before any Store that overwrites it. A Load's late
//! block is therefore raised to dominate every Store and Phi consuming the
//! same memory, and a Load sharing a block with such a Store becomes an extra
//! input of the Store so local scheduling orders them.

use super::cfg::{BlockId, Cfg, DominatorTree};
use crate::ir::arena::{BitSet, SecondaryMap};
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::operators::Operator;
use son_core::error::{Phase, SonError, SonResult};

/// How a node gets its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Control node; owns its block.
    Control,
    /// Pinned below a control node (Phi, Cast, projections of control).
    Pinned(NodeId),
    /// Projection of a floating node; goes wherever its source goes.
    Follows(NodeId),
    /// Free to move.
    Floating,
}

/// Late-pass visit state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Visit {
    #[default]
    New,
    Active,
    Done,
}

/// Block assignment for every placed node.
pub type Blocks = SecondaryMap<Node, Option<BlockId>>;

struct Gcm<'a> {
    graph: &'a Graph,
    cfg: &'a Cfg,
    dom: &'a DominatorTree,
    early: Blocks,
    late: Blocks,
    visit: SecondaryMap<Node, Visit>,
}

/// Place every live node and fill each block's node list (unordered).
///
/// Block loop depths must already be set.
pub fn schedule_global(
    graph: &mut Graph,
    cfg: &mut Cfg,
    dom: &DominatorTree,
) -> SonResult<Blocks> {
    let nodes = live_nodes(graph);
    let blocks = {
        let len = graph.len();
        let mut gcm = Gcm {
            graph: &*graph,
            cfg: &*cfg,
            dom,
            early: Blocks::with_capacity(len),
            late: Blocks::with_capacity(len),
            visit: SecondaryMap::with_capacity(len),
        };
        gcm.run(&nodes)?
    };

    let edges = add_anti_deps(graph, &nodes, &blocks);

    for i in 0..cfg.len() {
        cfg.block_mut(BlockId::new(i as u32)).nodes.clear();
    }
    for &n in &nodes {
        if let Some(b) = blocks[n] {
            cfg.block_mut(b).nodes.push(n);
        }
    }
    log::debug!(
        "gcm: placed {} nodes in {} blocks, {} anti-dependences",
        nodes.len(),
        cfg.len(),
        edges
    );
    Ok(blocks)
}

/// Every live node connected to Start or Stop, by id. Stop and Scopes are
/// left out.
fn live_nodes(graph: &Graph) -> Vec<NodeId> {
    let mut seen = BitSet::with_capacity(graph.len());
    let mut stack = vec![graph.start(), graph.stop()];
    seen.insert(graph.start().as_usize());
    seen.insert(graph.stop().as_usize());
    let mut out = Vec::new();
    while let Some(n) = stack.pop() {
        if n != graph.stop() {
            out.push(n);
        }
        for &m in graph.inputs(n).iter().flatten().chain(graph.outputs(n)) {
            if graph.is_dead(m) || *graph.op(m) == Operator::Scope {
                continue;
            }
            if seen.insert(m.as_usize()) {
                stack.push(m);
            }
        }
    }
    out.sort_unstable();
    out
}

fn placement(graph: &Graph, n: NodeId) -> Placement {
    if graph.is_cfg(n) {
        return Placement::Control;
    }
    let ctrl = graph.input(n, 0).filter(|&c| graph.is_cfg(c));
    match (graph.op(n), ctrl) {
        (Operator::Phi(_) | Operator::Cast(_) | Operator::Proj(_), Some(c)) => Placement::Pinned(c),
        (Operator::Proj(_), None) => match graph.input(n, 0) {
            Some(src) => Placement::Follows(src),
            None => Placement::Floating,
        },
        _ => Placement::Floating,
    }
}

impl Gcm<'_> {
    fn run(&mut self, nodes: &[NodeId]) -> SonResult<Blocks> {
        for &n in nodes {
            self.schedule_early(n)?;
        }
        for &n in nodes {
            self.schedule_late(n)?;
        }

        let mut blocks = Blocks::with_capacity(self.graph.len());
        for &n in nodes {
            let b = match placement(self.graph, n) {
                Placement::Control | Placement::Pinned(_) => self.fixed(n)?,
                Placement::Follows(src) => self.placed(src)?,
                Placement::Floating => self.placed(n)?,
            };
            blocks.set(n, Some(b));
        }
        Ok(blocks)
    }

    /// Block of a control node or of a node pinned below one.
    fn fixed(&self, n: NodeId) -> SonResult<BlockId> {
        let ctrl = match placement(self.graph, n) {
            Placement::Control => n,
            Placement::Pinned(c) => c,
            _ => return Err(self.fault(n, "is not pinned")),
        };
        self.cfg
            .block_of(ctrl)
            .ok_or_else(|| self.fault(n, "is pinned to control outside the CFG"))
    }

    /// Final block of a floating node, falling back to its early block.
    fn placed(&self, n: NodeId) -> SonResult<BlockId> {
        match placement(self.graph, n) {
            Placement::Control | Placement::Pinned(_) => self.fixed(n),
            Placement::Follows(src) => self.placed(src),
            Placement::Floating => self.late[n]
                .or(self.early[n])
                .ok_or_else(|| self.fault(n, "was never placed")),
        }
    }

    fn fault(&self, n: NodeId, what: &str) -> SonError {
        SonError::internal(
            Phase::CodeMotion,
            format!("{n} {} {what}", self.graph.op(n).label()),
        )
    }

    // =========================================================================
    // Schedule Early
    // =========================================================================

    /// Earliest legal block of `n` and of every floating input it needs.
    fn schedule_early(&mut self, root: NodeId) -> SonResult<()> {
        if !self.is_movable(root) || self.early[root].is_some() {
            return Ok(());
        }
        let mut stack = vec![(root, false)];
        while let Some((n, expanded)) = stack.pop() {
            if self.early[n].is_some() {
                continue;
            }
            if !expanded {
                stack.push((n, true));
                for &d in self.graph.inputs(n).iter().flatten() {
                    if self.is_movable(d) && self.early[d].is_none() {
                        stack.push((d, false));
                    }
                }
                continue;
            }
            let mut best = self.cfg.entry;
            for &d in self.graph.inputs(n).iter().flatten() {
                let b = if self.is_movable(d) {
                    self.early[d].unwrap_or(self.cfg.entry)
                } else {
                    self.fixed(d)?
                };
                if self.dom.depth(b) > self.dom.depth(best) {
                    best = b;
                }
            }
            self.early.set(n, Some(best));
        }
        Ok(())
    }

    fn is_movable(&self, n: NodeId) -> bool {
        matches!(
            placement(self.graph, n),
            Placement::Floating | Placement::Follows(_)
        )
    }

    // =========================================================================
    // Schedule Late
    // =========================================================================

    /// Uses of `n` with projections of `n` looked through, paired with the
    /// node they actually consume.
    fn uses(&self, n: NodeId) -> Vec<(NodeId, NodeId)> {
        let mut out = Vec::new();
        for &u in self.graph.outputs(n) {
            if placement(self.graph, u) == Placement::Follows(n) {
                out.extend(self.graph.outputs(u).iter().map(|&w| (w, u)));
            } else {
                out.push((u, n));
            }
        }
        out
    }

    /// Memory consumers that a Load must not sink past.
    fn anti_uses(&self, load: NodeId) -> Vec<NodeId> {
        if !self.graph.op(load).is_load() {
            return Vec::new();
        }
        let Some(mem) = self.graph.input(load, 1) else {
            return Vec::new();
        };
        self.graph
            .outputs(mem)
            .iter()
            .copied()
            .filter(|&u| u != load && (self.graph.op(u).is_store() || self.graph.op(u).is_phi()))
            .collect()
    }

    fn schedule_late(&mut self, root: NodeId) -> SonResult<()> {
        if placement(self.graph, root) != Placement::Floating || self.visit[root] != Visit::New {
            return Ok(());
        }
        let mut stack = vec![(root, false)];
        while let Some((n, expanded)) = stack.pop() {
            if !expanded {
                if self.visit[n] != Visit::New {
                    continue;
                }
                self.visit.set(n, Visit::Active);
                stack.push((n, true));
                let deps = self
                    .uses(n)
                    .into_iter()
                    .map(|(u, _)| u)
                    .chain(self.anti_uses(n));
                for u in deps.collect::<Vec<_>>() {
                    if placement(self.graph, u) == Placement::Floating && self.visit[u] == Visit::New {
                        stack.push((u, false));
                    }
                }
                continue;
            }
            let b = self.late_block(n)?;
            self.late.set(n, Some(b));
            self.visit.set(n, Visit::Done);
        }
        Ok(())
    }

    /// Block where `user` needs the value `via`.
    fn use_block(&self, user: NodeId, via: NodeId) -> SonResult<Option<BlockId>> {
        match placement(self.graph, user) {
            Placement::Floating => Ok(if self.visit[user] == Visit::Done {
                self.late[user]
            } else {
                None
            }),
            Placement::Pinned(_) if self.graph.op(user).is_phi() => {
                let mut lca = None;
                for i in 1..self.graph.node(user).n_ins() {
                    if self.graph.input(user, i) == Some(via) {
                        lca = self.meet(lca, self.phi_pred_block(user, i));
                    }
                }
                Ok(lca)
            }
            Placement::Control if *self.graph.op(user) == Operator::STOP => Ok(None),
            _ => self.fixed(user).map(Some),
        }
    }

    /// End of the predecessor block that Phi input `i` arrives from.
    fn phi_pred_block(&self, phi: NodeId, i: usize) -> Option<BlockId> {
        let region = self.graph.input(phi, 0)?;
        let ctrl = self.graph.input(region, i)?;
        self.cfg.block_of(ctrl)
    }

    fn meet(&self, a: Option<BlockId>, b: Option<BlockId>) -> Option<BlockId> {
        match (a, b) {
            (Some(a), Some(b)) => Some(self.dom.lca(a, b)),
            (a, None) => a,
            (None, b) => b,
        }
    }

    fn late_block(&self, n: NodeId) -> SonResult<BlockId> {
        let early = self.early[n].unwrap_or(self.cfg.entry);
        let mut lca = None;
        for (u, via) in self.uses(n) {
            lca = self.meet(lca, self.use_block(u, via)?);
        }

        // Raise a Load above the Stores and merges of its memory, unless
        // that would lift it above its own inputs: such a consumer is on a
        // path the Load never shares.
        for u in self.anti_uses(n) {
            let blocks: Vec<Option<BlockId>> = if self.graph.op(u).is_phi() {
                let mem = self.graph.input(n, 1);
                (1..self.graph.node(u).n_ins())
                    .filter(|&i| self.graph.input(u, i) == mem)
                    .map(|i| self.phi_pred_block(u, i))
                    .collect()
            } else {
                vec![self.use_block(u, n)?]
            };
            for b in blocks.into_iter().flatten() {
                let raised = self.meet(lca, Some(b));
                if raised.is_some_and(|r| self.dom.dominates(early, r)) {
                    lca = raised;
                }
            }
        }

        Ok(match lca {
            Some(lca) => self.select(n, early, lca),
            None => early,
        })
    }

    /// Shallowest loop depth on the dominator path from `lca` up to `early`.
    fn select(&self, n: NodeId, early: BlockId, lca: BlockId) -> BlockId {
        if !self.dom.dominates(early, lca) {
            log::trace!("gcm: {n} uses are not below its inputs; keeping it early");
            return early;
        }
        let mut best = lca;
        let mut x = lca;
        while x != early {
            match self.dom.idom(x) {
                Some(up) => x = up,
                None => break,
            }
            if self.cfg.block(x).loop_depth < self.cfg.block(best).loop_depth {
                best = x;
            }
        }
        best
    }
}

/// Make each Store an extra user of the Loads placed in its block that read
/// the memory it overwrites. Returns the number of edges added.
fn add_anti_deps(graph: &mut Graph, nodes: &[NodeId], blocks: &Blocks) -> usize {
    let mut added = 0;
    for &load in nodes {
        if !graph.op(load).is_load() {
            continue;
        }
        let Some(mem) = graph.input(load, 1) else {
            continue;
        };
        let stores: Vec<NodeId> = graph
            .outputs(mem)
            .iter()
            .copied()
            .filter(|&s| graph.op(s).is_store() && blocks[s] == blocks[load])
            .collect();
        for st in stores {
            if !graph.inputs(st).contains(&Some(load)) {
                graph.add_def(st, Some(load));
                added += 1;
            }
        }
    }
    added
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::loop_tree::LoopTree;
    use crate::config::OptConfig;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, ObjectBuilder};
    use crate::ir::operators::{ArithOp, CmpOp};
    use crate::opt::iter::iterate;
    use son_core::types::Ty;

    fn place(g: &mut Graph) -> (Cfg, DominatorTree, Blocks) {
        iterate(g, &OptConfig::default()).unwrap();
        let mut cfg = Cfg::build(g).unwrap();
        let dom = DominatorTree::build(&cfg);
        LoopTree::compute(&cfg, &dom).apply_depths(&mut cfg);
        let blocks = schedule_global(g, &mut cfg, &dom).unwrap();
        (cfg, dom, blocks)
    }

    fn find(g: &Graph, op: &Operator) -> NodeId {
        g.live_nodes().find(|&n| g.op(n) == op).expect("node present")
    }

    /// `i = 0; while (i < n) { i = i + a * b } return i`
    fn invariant_in_loop() -> Graph {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT, Ty::INT_BOT, Ty::INT_BOT]);
        let zero = b.const_int(0);
        b.define("i", zero).unwrap();
        b.begin_loop().unwrap();
        let i = b.get("i").unwrap();
        let n = b.arg(0);
        let t = b.compare(CmpOp::Lt, i, n);
        b.loop_test(t).unwrap();
        let (x, y) = (b.arg(1), b.arg(2));
        let prod = b.mul(x, y);
        let i = b.get("i").unwrap();
        let next = b.add(i, prod);
        b.assign("i", next).unwrap();
        b.end_loop().unwrap();
        let i = b.get("i").unwrap();
        b.return_value(i).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_invariant_hoisted_out_of_loop() {
        let mut g = invariant_in_loop();
        let (cfg, _, blocks) = place(&mut g);
        let mul = find(&g, &Operator::IntOp(ArithOp::Mul));
        let add = find(&g, &Operator::IntOp(ArithOp::Add));

        let mul_block = blocks[mul].unwrap();
        let add_block = blocks[add].unwrap();
        assert_eq!(cfg.block(mul_block).loop_depth, 0);
        assert_eq!(cfg.block(add_block).loop_depth, 1);
    }

    #[test]
    fn test_every_node_dominated_by_inputs() {
        let mut g = invariant_in_loop();
        let (cfg, dom, blocks) = place(&mut g);
        for (_, bb) in cfg.iter() {
            for &n in &bb.nodes {
                // Merges take inputs from their predecessors.
                if g.op(n).is_phi() || g.op(n).is_region() {
                    continue;
                }
                let b = blocks[n].unwrap();
                for &d in g.inputs(n).iter().flatten() {
                    if let Some(db) = blocks[d] {
                        assert!(dom.dominates(db, b), "{d} does not dominate its use {n}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_pinned_nodes_stay() {
        let mut g = invariant_in_loop();
        let (cfg, _, blocks) = place(&mut g);
        let phi = g.live_nodes().find(|&n| g.op(n).is_phi()).unwrap();
        let lp = g.input(phi, 0).unwrap();
        assert_eq!(blocks[phi], cfg.block_for_head(lp));
        let arg = g
            .live_nodes()
            .find(|&n| g.op(n) == &Operator::Proj(2))
            .unwrap();
        assert_eq!(blocks[arg], Some(cfg.entry));
    }

    #[test]
    fn test_used_value_sinks_to_its_branch() {
        // `x = a + 1; if (c) return x; return 0`: the add is only needed
        // on the true arm.
        let mut b = GraphBuilder::new(&[Ty::INT_BOT, Ty::INT_BOT]);
        let a = b.arg(0);
        let one = b.const_int(1);
        let x = b.add(a, one);
        b.define("x", x).unwrap();
        let c = b.arg(1);
        b.begin_if(c).unwrap();
        let x = b.get("x").unwrap();
        b.return_value(x).unwrap();
        b.end_if().unwrap();
        let zero = b.const_int(0);
        b.return_value(zero).unwrap();
        let mut g = b.finish().unwrap();

        let (cfg, _, blocks) = place(&mut g);
        let add = find(&g, &Operator::IntOp(ArithOp::Add));
        let head = cfg.block(blocks[add].unwrap()).head;
        assert_eq!(g.op(head), &Operator::CProj(0));
    }

    #[test]
    fn test_load_stays_above_store() {
        // `p = make(); x = p.v; if (c) p.v = 2; return x + 1`
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        b.declare_struct("S", &[("v", Ty::INT_BOT, false)]).unwrap();
        let fv = b.field("S", "v").unwrap();
        let ptr_ty = b.ref_type("S", false);
        let p = b.call("make", &[], ptr_ty);
        let x = b.load(p, &fv).unwrap();
        b.define("x", x).unwrap();
        let c = b.arg(0);
        b.begin_if(c).unwrap();
        let two = b.const_int(2);
        b.store(p, &fv, two).unwrap();
        b.end_if().unwrap();
        let x = b.get("x").unwrap();
        let one = b.const_int(1);
        let y = b.add(x, one);
        b.return_value(y).unwrap();
        let mut g = b.finish().unwrap();

        let (cfg, dom, blocks) = place(&mut g);
        let load = g.live_nodes().find(|&n| g.op(n).is_load()).unwrap();
        let store = g.live_nodes().find(|&n| g.op(n).is_store()).unwrap();
        assert_eq!(g.input(load, 1), g.input(store, 1));

        let lb = blocks[load].unwrap();
        assert!(dom.dominates(lb, blocks[store].unwrap()));
        let ret = g.live_nodes().find(|&n| g.op(n) == &Operator::RETURN).unwrap();
        assert_ne!(Some(lb), cfg.block_of(ret));
    }
}
