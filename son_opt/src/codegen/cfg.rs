//! Control flow graph extracted from the Sea-of-Nodes skeleton.
//!
//! Sea-of-Nodes keeps control and data in one graph. Code motion and
//! scheduling need the classic view instead:
//! - **Basic blocks**: one per block-head node (Start, Region, Loop, control
//!   projections and CallEnd), owning the straight-line control that follows
//! - **Dominator tree**: immediate dominators and depths for placement
//!
//! # Structure
//!
//! The CFG is rebuilt from control edges whenever it is needed. Block
//! predecessors follow the head's inputs, so predecessor `i - 1` of a Region
//! block is the block of Region input `i`, which is also the path that Phi
//! input `i` arrives on.

use crate::ir::arena::{BitSet, Id, SecondaryMap};
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::operators::{ControlOp, Operator};
use rustc_hash::FxHashMap;
use son_core::error::{Phase, SonError, SonResult};

// =============================================================================
// Basic Block
// =============================================================================

/// A basic block in the CFG.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// The node that starts this block.
    pub head: NodeId,

    /// Predecessor blocks, in head input order.
    pub predecessors: Vec<BlockId>,

    /// Successor blocks.
    pub successors: Vec<BlockId>,

    /// Control nodes owned by this block, head first.
    pub control: Vec<NodeId>,

    /// Every node placed in this block, in execution order once scheduled.
    pub nodes: Vec<NodeId>,

    /// The last control node of the block (the head if it is alone).
    pub terminator: NodeId,

    /// Loop depth (0 = not in loop).
    pub loop_depth: u32,
}

impl BasicBlock {
    fn new(head: NodeId) -> Self {
        BasicBlock {
            head,
            predecessors: Vec::new(),
            successors: Vec::new(),
            control: Vec::new(),
            nodes: Vec::new(),
            terminator: head,
            loop_depth: 0,
        }
    }
}

/// Block identifier.
pub type BlockId = Id<BasicBlock>;

// =============================================================================
// CFG
// =============================================================================

/// Control flow graph extracted from Sea-of-Nodes.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// All basic blocks, in the order their heads were created.
    blocks: Vec<BasicBlock>,

    /// Mapping from head nodes to block IDs.
    head_to_block: FxHashMap<NodeId, BlockId>,

    /// Owning block of every control node.
    node_block: SecondaryMap<Node, Option<BlockId>>,

    /// Entry block (corresponds to Start).
    pub entry: BlockId,

    /// Reverse postorder traversal.
    pub rpo: Vec<BlockId>,

    /// Postorder numbers for dominance computation.
    pub postorder: SecondaryMap<BasicBlock, u32>,
}

impl Cfg {
    /// Build the CFG from every control node reachable from Start.
    pub fn build(graph: &Graph) -> SonResult<Self> {
        let mut cfg = Cfg {
            blocks: Vec::new(),
            head_to_block: FxHashMap::default(),
            node_block: SecondaryMap::with_capacity(graph.len()),
            entry: BlockId::new(0),
            rpo: Vec::new(),
            postorder: SecondaryMap::new(),
        };

        let control = Self::control_nodes(graph);

        // Heads first; Start has the lowest id so it becomes block 0.
        for &n in &control {
            if graph.op(n).is_block_head() {
                cfg.add_block(n);
            }
        }
        cfg.entry = cfg
            .block_for_head(graph.start())
            .ok_or_else(|| SonError::internal(Phase::LoopTree, "Start has no block"))?;

        for &n in &control {
            let b = cfg.enclosing_block(graph, n)?;
            cfg.node_block.set(n, Some(b));
            cfg.blocks[b.as_usize()].control.push(n);
        }

        // The terminator is the one control node with no successor inside
        // its own block.
        for &n in &control {
            let b = cfg.node_block[n];
            let continues = graph.outputs(n).iter().any(|&u| {
                graph.is_cfg(u) && !graph.op(u).is_block_head() && cfg.node_block[u] == b
            });
            if let (Some(b), false) = (b, continues) {
                cfg.blocks[b.as_usize()].terminator = n;
            }
        }

        // Edges follow head inputs, so Region predecessors line up with
        // Phi inputs.
        for i in 0..cfg.blocks.len() {
            let block = BlockId::new(i as u32);
            let head = cfg.blocks[i].head;
            let preds: Vec<NodeId> = match graph.op(head) {
                Operator::Control(ControlOp::Start) => Vec::new(),
                op if op.is_region() => {
                    graph.inputs(head).iter().skip(1).flatten().copied().collect()
                }
                _ => graph.input(head, 0).into_iter().collect(),
            };
            for p in preds {
                let Some(pred) = cfg.node_block[p] else {
                    return Err(SonError::internal(
                        Phase::LoopTree,
                        format!(
                            "{head} {} has a predecessor {p} outside the CFG",
                            graph.op(head).label()
                        ),
                    ));
                };
                cfg.add_edge(pred, block);
            }
        }

        cfg.compute_rpo();
        log::debug!("cfg: {} blocks from {} control nodes", cfg.len(), control.len());
        Ok(cfg)
    }

    /// Live control nodes reachable forward from Start, by id. Stop is not
    /// part of any block.
    fn control_nodes(graph: &Graph) -> Vec<NodeId> {
        let mut seen = BitSet::with_capacity(graph.len());
        let mut order = Vec::new();
        let mut stack = vec![graph.start()];
        seen.insert(graph.start().as_usize());
        while let Some(n) = stack.pop() {
            order.push(n);
            for &u in graph.outputs(n) {
                if graph.is_cfg(u) && *graph.op(u) != Operator::STOP && seen.insert(u.as_usize()) {
                    stack.push(u);
                }
            }
        }
        order.sort_unstable();
        order
    }

    /// Block of the nearest head reached through control inputs.
    fn enclosing_block(&self, graph: &Graph, n: NodeId) -> SonResult<BlockId> {
        let mut x = n;
        loop {
            if let Some(b) = self.block_for_head(x) {
                return Ok(b);
            }
            match graph.input(x, 0) {
                Some(c) if graph.is_cfg(c) => x = c,
                _ => {
                    return Err(SonError::internal(
                        Phase::LoopTree,
                        format!("{n} {} is not below any block head", graph.op(n).label()),
                    ))
                }
            }
        }
    }

    fn add_block(&mut self, head: NodeId) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(head));
        self.head_to_block.insert(head, id);
        id
    }

    /// Predecessors keep duplicates so they stay aligned with head inputs.
    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.as_usize()].successors.contains(&to) {
            self.blocks[from.as_usize()].successors.push(to);
        }
        self.blocks[to.as_usize()].predecessors.push(from);
    }

    /// Compute reverse postorder traversal.
    fn compute_rpo(&mut self) {
        let mut visited = BitSet::with_capacity(self.blocks.len());
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited.insert(self.entry.as_usize());

        while let Some((block, next)) = stack.pop() {
            let succs = &self.blocks[block.as_usize()].successors;
            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if visited.insert(succ.as_usize()) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        for (i, &block) in postorder.iter().enumerate() {
            self.postorder.set(block, i as u32);
        }
        postorder.reverse();
        self.rpo = postorder;
    }

    /// Get a block by ID.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.as_usize()]
    }

    /// Get a mutable block.
    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.as_usize()]
    }

    /// Get the block started by a head node.
    pub fn block_for_head(&self, head: NodeId) -> Option<BlockId> {
        self.head_to_block.get(&head).copied()
    }

    /// Owning block of a control node.
    #[inline]
    pub fn block_of(&self, n: NodeId) -> Option<BlockId> {
        *self.node_block.get(n)
    }

    /// Get the number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over blocks in reverse postorder.
    pub fn iter_rpo(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.rpo
            .iter()
            .copied()
            .map(move |id| (id, &self.blocks[id.as_usize()]))
    }

    /// Iterate over all blocks.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::new(i as u32), b))
    }
}

// =============================================================================
// Dominator Tree
// =============================================================================

/// Dominator tree for the CFG, built with the Cooper-Harvey-Kennedy
/// iteration over reverse postorder.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator for each block; the entry maps to itself.
    idom: SecondaryMap<BasicBlock, Option<BlockId>>,

    /// Dominator tree children.
    children: SecondaryMap<BasicBlock, Vec<BlockId>>,

    /// Dominator tree depth; the entry is zero.
    depth: SecondaryMap<BasicBlock, u32>,
}

impl DominatorTree {
    pub fn build(cfg: &Cfg) -> Self {
        let n = cfg.len();
        let mut dom = DominatorTree {
            idom: SecondaryMap::with_capacity(n),
            children: SecondaryMap::with_capacity(n),
            depth: SecondaryMap::with_capacity(n),
        };
        if n == 0 {
            return dom;
        }
        dom.idom.set(cfg.entry, Some(cfg.entry));

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &cfg.rpo {
                if block == cfg.entry {
                    continue;
                }
                let preds = &cfg.block(block).predecessors;

                // Start from any processed predecessor, then intersect.
                let Some(mut new_idom) = preds.iter().copied().find(|&p| dom.idom[p].is_some())
                else {
                    continue;
                };
                for &pred in preds {
                    if pred != new_idom && dom.idom[pred].is_some() {
                        new_idom = dom.intersect(pred, new_idom, cfg);
                    }
                }

                if dom.idom[block] != Some(new_idom) {
                    dom.idom.set(block, Some(new_idom));
                    changed = true;
                }
            }
        }

        for &block in &cfg.rpo {
            if let Some(parent) = dom.idom(block) {
                dom.children.entry(parent).push(block);
            }
        }

        // RPO visits every parent before its children.
        for &block in &cfg.rpo {
            let depth = dom.idom(block).map_or(0, |p| dom.depth[p] + 1);
            dom.depth.set(block, depth);
        }
        dom
    }

    /// Walk both fingers up until they meet; the one with the smaller
    /// postorder number is the deeper of the two.
    fn intersect(&self, mut b1: BlockId, mut b2: BlockId, cfg: &Cfg) -> BlockId {
        while b1 != b2 {
            while cfg.postorder[b1] < cfg.postorder[b2] {
                match self.idom[b1] {
                    Some(up) if up != b1 => b1 = up,
                    _ => return b2,
                }
            }
            while cfg.postorder[b2] < cfg.postorder[b1] {
                match self.idom[b2] {
                    Some(up) if up != b2 => b2 = up,
                    _ => return b1,
                }
            }
        }
        b1
    }

    /// Immediate dominator; `None` for the entry.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom[block].filter(|&d| d != block)
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(block)
    }

    #[inline]
    pub fn depth(&self, block: BlockId) -> u32 {
        self.depth[block]
    }

    /// Check if `a` dominates `b`.
    pub fn dominates(&self, a: BlockId, mut b: BlockId) -> bool {
        while self.depth(b) > self.depth(a) {
            match self.idom(b) {
                Some(up) => b = up,
                None => return false,
            }
        }
        a == b
    }

    /// Check if `a` strictly dominates `b`.
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Deepest block dominating both.
    pub fn lca(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            if self.depth(a) >= self.depth(b) {
                match self.idom(a) {
                    Some(up) => a = up,
                    None => return a,
                }
            } else {
                match self.idom(b) {
                    Some(up) => b = up,
                    None => return b,
                }
            }
        }
        a
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptConfig;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder};
    use crate::opt::iter::iterate;
    use son_core::types::Ty;

    fn optimized(b: GraphBuilder) -> Graph {
        let mut g = b.finish().unwrap();
        iterate(&mut g, &OptConfig::default()).unwrap();
        g
    }

    /// `x = a ? 1 : 2; return x`
    fn diamond() -> Graph {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        let a = b.arg(0);
        let zero = b.const_int(0);
        b.define("x", zero).unwrap();
        b.begin_if(a).unwrap();
        let one = b.const_int(1);
        b.assign("x", one).unwrap();
        b.else_branch().unwrap();
        let two = b.const_int(2);
        b.assign("x", two).unwrap();
        b.end_if().unwrap();
        let x = b.get("x").unwrap();
        b.return_value(x).unwrap();
        optimized(b)
    }

    /// `i = 0; while (i < a) i = i + 1; return i`
    fn counting_loop() -> Graph {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        let zero = b.const_int(0);
        b.define("i", zero).unwrap();
        b.begin_loop().unwrap();
        let i = b.get("i").unwrap();
        let a = b.arg(0);
        let test = b.compare(crate::ir::operators::CmpOp::Lt, i, a);
        b.loop_test(test).unwrap();
        let i = b.get("i").unwrap();
        let one = b.const_int(1);
        let next = b.add(i, one);
        b.assign("i", next).unwrap();
        b.end_loop().unwrap();
        let i = b.get("i").unwrap();
        b.return_value(i).unwrap();
        optimized(b)
    }

    fn region_block(g: &Graph, cfg: &Cfg, op: &Operator) -> BlockId {
        cfg.iter()
            .find(|(_, bb)| g.op(bb.head) == op)
            .map(|(id, _)| id)
            .expect("block with the requested head")
    }

    #[test]
    fn test_cfg_build_straight_line() {
        let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
        let a = b.arg(0);
        b.return_value(a).unwrap();
        let g = optimized(b);
        let cfg = Cfg::build(&g).unwrap();

        // Start, then the entry control projection holding the Return.
        assert_eq!(cfg.len(), 2);
        assert_eq!(cfg.block(cfg.entry).head, g.start());
        assert_eq!(cfg.block(cfg.entry).successors.len(), 1);
        let body = cfg.block(cfg.entry).successors[0];
        assert_eq!(g.op(cfg.block(body).terminator), &Operator::RETURN);
        assert_eq!(cfg.rpo, vec![cfg.entry, body]);
    }

    #[test]
    fn test_cfg_diamond_edges() {
        let g = diamond();
        let cfg = Cfg::build(&g).unwrap();
        assert_eq!(cfg.len(), 5);

        let merge = region_block(&g, &cfg, &Operator::REGION);
        let bb = cfg.block(merge);
        assert_eq!(bb.predecessors.len(), 2);
        assert_eq!(g.op(bb.terminator), &Operator::RETURN);
        for (i, &pred) in bb.predecessors.iter().enumerate() {
            assert_eq!(Some(pred), cfg.block_of(g.input(bb.head, i + 1).unwrap()));
        }
    }

    #[test]
    fn test_dominators_diamond() {
        let g = diamond();
        let cfg = Cfg::build(&g).unwrap();
        let dom = DominatorTree::build(&cfg);
        let merge = region_block(&g, &cfg, &Operator::REGION);
        let arms = cfg.block(merge).predecessors.clone();
        let branch = dom.idom(arms[0]).unwrap();

        assert_eq!(dom.idom(arms[1]), Some(branch));
        assert_eq!(dom.idom(merge), Some(branch));
        assert_eq!(g.op(cfg.block(branch).terminator), &Operator::IF);
        assert_eq!(dom.lca(arms[0], arms[1]), branch);
        assert!(dom.dominates(cfg.entry, merge));
        assert!(!dom.dominates(arms[0], merge));
        assert!(dom.dominates(merge, merge));
        assert!(!dom.strictly_dominates(merge, merge));
        assert_eq!(dom.idom(cfg.entry), None);
        assert_eq!(dom.depth(merge), dom.depth(branch) + 1);
    }

    #[test]
    fn test_dominators_loop() {
        let g = counting_loop();
        let cfg = Cfg::build(&g).unwrap();
        let dom = DominatorTree::build(&cfg);
        let head = region_block(&g, &cfg, &Operator::LOOP);
        let bb = cfg.block(head);
        assert_eq!(bb.predecessors.len(), 2);

        // The back edge comes from a block the header dominates.
        let back = bb.predecessors[1];
        assert!(dom.dominates(head, back));
        assert!(!dom.dominates(back, head));
        assert!(dom.children(head).len() >= 2);
    }
}
