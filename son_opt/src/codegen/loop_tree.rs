//! Loop nesting over the CFG, and forced exits for infinite loops.
//!
//! A loop is found from its back edge: an edge whose target dominates its
//! source. In a graph built from structured code every such target is a
//! Loop node's block, and each Loop has exactly one back edge.
//!
//! Code motion needs every loop to reach Stop. A loop with no way out is
//! given a `Never` branch whose taken arm returns; the branch never fires at
//! runtime but makes the loop body post-dominated by an exit.

use super::cfg::{BlockId, Cfg, DominatorTree};
use crate::ir::arena::BitSet;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::Operator;
use rustc_hash::FxHashMap;
use son_core::error::{Phase, SonError, SonResult};
use son_core::span::Span;
use son_core::types::Ty;
use std::collections::VecDeque;

// =============================================================================
// Loop
// =============================================================================

/// A natural loop in the CFG.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The loop header block.
    pub header: BlockId,

    /// Back edge sources (blocks that jump back to header).
    pub back_edges: Vec<BlockId>,

    /// All blocks in the loop body, header included.
    pub body: Vec<BlockId>,

    /// Membership bits for `body`.
    members: BitSet,

    /// Enclosing loop, if nested.
    pub parent: Option<usize>,

    /// Loops nested directly inside this one.
    pub children: Vec<usize>,

    /// Loop depth (1 = outermost).
    pub depth: u32,
}

impl Loop {
    #[inline]
    pub fn contains(&self, block: BlockId) -> bool {
        self.members.contains(block.as_usize())
    }
}

// =============================================================================
// Loop Tree
// =============================================================================

/// Loop nesting results.
#[derive(Debug, Clone, Default)]
pub struct LoopTree {
    /// All detected loops.
    pub loops: Vec<Loop>,

    /// Map from header block to loop index.
    header_to_loop: FxHashMap<BlockId, usize>,

    /// Map from block to innermost containing loop.
    block_to_loop: FxHashMap<BlockId, usize>,
}

impl LoopTree {
    pub fn compute(cfg: &Cfg, dom: &DominatorTree) -> Self {
        let mut tree = LoopTree::default();

        for &block in &cfg.rpo {
            for &succ in &cfg.block(block).successors {
                if dom.dominates(succ, block) {
                    tree.add_loop(succ, block, cfg);
                }
            }
        }

        tree.compute_nesting();
        tree
    }

    fn add_loop(&mut self, header: BlockId, back_edge: BlockId, cfg: &Cfg) {
        if let Some(&idx) = self.header_to_loop.get(&header) {
            let lp = &mut self.loops[idx];
            if !lp.back_edges.contains(&back_edge) {
                lp.back_edges.push(back_edge);
            }
            Self::fill_body(lp, back_edge, cfg);
            return;
        }

        let mut lp = Loop {
            header,
            back_edges: vec![back_edge],
            body: vec![header],
            members: BitSet::with_capacity(cfg.len()),
            parent: None,
            children: Vec::new(),
            depth: 1,
        };
        lp.members.insert(header.as_usize());
        Self::fill_body(&mut lp, back_edge, cfg);

        self.header_to_loop.insert(header, self.loops.len());
        self.loops.push(lp);
    }

    /// Everything that reaches the back edge without passing the header.
    fn fill_body(lp: &mut Loop, back_edge: BlockId, cfg: &Cfg) {
        let mut worklist = VecDeque::new();
        worklist.push_back(back_edge);
        while let Some(block) = worklist.pop_front() {
            if lp.members.insert(block.as_usize()) {
                lp.body.push(block);
                worklist.extend(cfg.block(block).predecessors.iter().copied());
            }
        }
    }

    fn compute_nesting(&mut self) {
        let n = self.loops.len();

        for i in 0..n {
            // Smallest other loop holding our header.
            let header = self.loops[i].header;
            let parent = (0..n)
                .filter(|&j| j != i && self.loops[j].contains(header))
                .min_by_key(|&j| self.loops[j].body.len());
            if let Some(parent) = parent {
                self.loops[i].parent = Some(parent);
                self.loops[parent].children.push(i);
            }
        }

        for i in 0..n {
            let mut depth = 1;
            let mut current = self.loops[i].parent;
            while let Some(parent) = current {
                depth += 1;
                current = self.loops[parent].parent;
            }
            self.loops[i].depth = depth;
        }

        // Innermost loop wins.
        for (i, lp) in self.loops.iter().enumerate() {
            for &block in &lp.body {
                let deeper = match self.block_to_loop.get(&block) {
                    Some(&j) => self.loops[j].depth < lp.depth,
                    None => true,
                };
                if deeper {
                    self.block_to_loop.insert(block, i);
                }
            }
        }
    }

    /// Get the innermost loop containing a block.
    pub fn loop_for_block(&self, block: BlockId) -> Option<&Loop> {
        self.block_to_loop.get(&block).map(|&idx| &self.loops[idx])
    }

    pub fn loop_for_header(&self, header: BlockId) -> Option<&Loop> {
        self.header_to_loop.get(&header).map(|&idx| &self.loops[idx])
    }

    /// Get loop depth for a block (0 if not in loop).
    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.loop_for_block(block).map_or(0, |lp| lp.depth)
    }

    /// Record every block's loop depth on the block itself.
    pub fn apply_depths(&self, cfg: &mut Cfg) {
        for i in 0..cfg.len() {
            let block = BlockId::new(i as u32);
            cfg.block_mut(block).loop_depth = self.loop_depth(block);
        }
    }

    /// Whether the loop can be left from a block on the dominator chain
    /// running from its back edge up to its header.
    pub fn has_exit(&self, lp: &Loop, cfg: &Cfg, dom: &DominatorTree) -> bool {
        for &back in &lp.back_edges {
            let mut x = back;
            loop {
                if cfg.block(x).successors.iter().any(|&s| !lp.contains(s)) {
                    return true;
                }
                if x == lp.header {
                    break;
                }
                match dom.idom(x) {
                    Some(up) => x = up,
                    None => break,
                }
            }
        }
        false
    }

    /// Loop nodes heading loops without an exit.
    pub fn exitless_loops(&self, graph: &Graph, cfg: &Cfg, dom: &DominatorTree) -> Vec<NodeId> {
        self.loops
            .iter()
            .filter(|lp| !self.has_exit(lp, cfg, dom))
            .map(|lp| cfg.block(lp.header).head)
            .filter(|&head| graph.op(head).is_loop())
            .collect()
    }
}

// =============================================================================
// Forced Exits
// =============================================================================

/// Route the back edge of `lp` through a `Never` branch whose true arm
/// returns. Returns the new Return node.
pub fn force_exit(graph: &mut Graph, lp: NodeId) -> SonResult<NodeId> {
    let back = graph.input(lp, 2).ok_or_else(|| {
        SonError::internal(Phase::LoopTree, format!("loop {lp} has no back edge"))
    })?;
    let span = graph.node(lp).span;

    let never = typed(graph, Operator::NEVER, &[Some(back)], span);
    let exit = typed(graph, Operator::CProj(0), &[Some(never)], span);
    let stay = typed(graph, Operator::CProj(1), &[Some(never)], span);
    graph.set_def(lp, 2, Some(stay));

    let top = graph.con(Ty::TOP);
    let ret = typed(graph, Operator::RETURN, &[Some(exit), Some(top), Some(top)], span);
    let stop = graph.stop();
    graph.add_def(stop, Some(ret));
    log::debug!("forced exit for loop {lp}: {never} -> {ret}");
    Ok(ret)
}

/// Add a node and type it without running any peephole.
fn typed(graph: &mut Graph, op: Operator, inputs: &[Option<NodeId>], span: Span) -> NodeId {
    let n = graph.add_node(op, inputs, span);
    let t = graph.compute(n);
    graph.set_type(n, t);
    n
}

/// Give every exitless loop a forced exit. Returns how many were patched;
/// the CFG must be rebuilt when this is non-zero.
pub fn force_exits(
    graph: &mut Graph,
    cfg: &Cfg,
    dom: &DominatorTree,
    tree: &LoopTree,
) -> SonResult<usize> {
    let loops = tree.exitless_loops(graph, cfg, dom);
    for &lp in &loops {
        force_exit(graph, lp)?;
    }
    Ok(loops.len())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptConfig;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder};
    use crate::ir::operators::CmpOp;
    use crate::opt::iter::iterate;

    fn analyze(g: &Graph) -> (Cfg, DominatorTree, LoopTree) {
        let cfg = Cfg::build(g).unwrap();
        let dom = DominatorTree::build(&cfg);
        let tree = LoopTree::compute(&cfg, &dom);
        (cfg, dom, tree)
    }

    /// `i = 0; while (i < a) { j = 0; while (j < a) j++; i++ } return i`
    fn nested_loops() -> Graph {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        let zero = b.const_int(0);
        b.define("i", zero).unwrap();
        b.begin_loop().unwrap();
        let i = b.get("i").unwrap();
        let a = b.arg(0);
        let t = b.compare(CmpOp::Lt, i, a);
        b.loop_test(t).unwrap();
        {
            let zero = b.const_int(0);
            b.define("j", zero).unwrap();
            b.begin_loop().unwrap();
            let j = b.get("j").unwrap();
            let a = b.arg(0);
            let t = b.compare(CmpOp::Lt, j, a);
            b.loop_test(t).unwrap();
            let j = b.get("j").unwrap();
            let one = b.const_int(1);
            let next = b.add(j, one);
            b.assign("j", next).unwrap();
            b.end_loop().unwrap();
        }
        let i = b.get("i").unwrap();
        let one = b.const_int(1);
        let next = b.add(i, one);
        b.assign("i", next).unwrap();
        b.end_loop().unwrap();
        let i = b.get("i").unwrap();
        b.return_value(i).unwrap();
        let mut g = b.finish().unwrap();
        iterate(&mut g, &OptConfig::default()).unwrap();
        g
    }

    /// `i = 0; while (1) { i = i + a }` with no way out.
    fn infinite_loop() -> Graph {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        let zero = b.const_int(0);
        b.define("i", zero).unwrap();
        b.begin_loop().unwrap();
        let i = b.get("i").unwrap();
        let a = b.arg(0);
        let next = b.add(i, a);
        b.assign("i", next).unwrap();
        b.end_loop().unwrap();
        let mut g = b.finish().unwrap();
        iterate(&mut g, &OptConfig::default()).unwrap();
        g
    }

    #[test]
    fn test_nested_loop_depths() {
        let g = nested_loops();
        let (mut cfg, dom, tree) = analyze(&g);
        assert_eq!(tree.loops.len(), 2);

        let inner = tree.loops.iter().position(|lp| lp.depth == 2).unwrap();
        let outer = tree.loops[inner].parent.unwrap();
        assert_eq!(tree.loops[outer].depth, 1);
        assert_eq!(tree.loops[outer].children, vec![inner]);
        assert!(tree.loops[outer].contains(tree.loops[inner].header));

        tree.apply_depths(&mut cfg);
        assert_eq!(cfg.block(cfg.entry).loop_depth, 0);
        assert_eq!(cfg.block(tree.loops[inner].header).loop_depth, 2);
        for lp in &tree.loops {
            assert!(tree.has_exit(lp, &cfg, &dom));
        }
        assert!(tree.exitless_loops(&g, &cfg, &dom).is_empty());
    }

    #[test]
    fn test_loop_header_is_loop_node() {
        let g = nested_loops();
        let (cfg, _, tree) = analyze(&g);
        for lp in &tree.loops {
            assert!(g.op(cfg.block(lp.header).head).is_loop());
            assert_eq!(tree.loop_for_header(lp.header).map(|l| l.header), Some(lp.header));
            assert_eq!(lp.back_edges.len(), 1);
        }
    }

    #[test]
    fn test_infinite_loop_gets_forced_exit() {
        let mut g = infinite_loop();
        let (cfg, dom, tree) = analyze(&g);
        assert_eq!(tree.loops.len(), 1);
        let lps = tree.exitless_loops(&g, &cfg, &dom);
        assert_eq!(lps.len(), 1);

        let patched = force_exits(&mut g, &cfg, &dom, &tree).unwrap();
        assert_eq!(patched, 1);
        assert!(g.verify_edges().is_ok());

        let back = g.input(lps[0], 2).unwrap();
        assert_eq!(g.op(back), &Operator::CProj(1));
        let never = g.input(back, 0).unwrap();
        assert_eq!(g.op(never), &Operator::NEVER);
        assert!(g.inputs(g.stop()).iter().flatten().any(|&r| g.op(r) == &Operator::RETURN));

        // The rebuilt CFG sees the exit.
        let (cfg, dom, tree) = analyze(&g);
        assert!(tree.exitless_loops(&g, &cfg, &dom).is_empty());
        assert_eq!(tree.loops.len(), 1);
    }
}
