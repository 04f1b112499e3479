//! Code motion and scheduling.
//!
//! Turns the optimized graph into blocks of ordered nodes:
//!
//! - [`cfg`]: basic blocks keyed by block-head nodes, plus dominators
//! - [`loop_tree`]: natural loops, nesting depth, forced exits for loops
//!   that never leave
//! - [`gcm`]: global code motion, one block per node
//! - [`list_sched`]: a linear order within each block
//!
//! [`schedule`] runs all four and returns the [`Schedule`] a backend reads.
//! Past this point the graph may only see 1:1 node substitutions.

pub mod cfg;
pub mod gcm;
pub mod list_sched;
pub mod loop_tree;

use self::cfg::{BasicBlock, BlockId, Cfg, DominatorTree};
use self::gcm::Blocks;
use self::loop_tree::LoopTree;
use crate::config::OptConfig;
use crate::ir::arena::SecondaryMap;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use son_core::error::SonResult;
use son_core::types::Ty;

/// Build the CFG, dominators and loop tree, patching infinite loops first
/// when `config.force_exits` is set. Block loop depths are filled in.
pub fn build_loop_tree(
    graph: &mut Graph,
    config: &OptConfig,
) -> SonResult<(Cfg, DominatorTree, LoopTree)> {
    let mut cfg = Cfg::build(graph)?;
    let mut dom = DominatorTree::build(&cfg);
    let mut tree = LoopTree::compute(&cfg, &dom);

    if config.force_exits && loop_tree::force_exits(graph, &cfg, &dom, &tree)? > 0 {
        cfg = Cfg::build(graph)?;
        dom = DominatorTree::build(&cfg);
        tree = LoopTree::compute(&cfg, &dom);
    }

    tree.apply_depths(&mut cfg);
    log::debug!(
        "loop tree: {} blocks, {} loops",
        cfg.len(),
        tree.loops.len()
    );
    Ok((cfg, dom, tree))
}

// =============================================================================
// Schedule
// =============================================================================

/// The scheduled graph: every placed node's block, its slot in that block,
/// and its final type.
#[derive(Debug)]
pub struct Schedule {
    cfg: Cfg,
    dom: DominatorTree,
    loops: LoopTree,
    blocks: Blocks,
    position: SecondaryMap<Node, Option<u32>>,
    types: SecondaryMap<Node, Option<Ty>>,
}

impl Schedule {
    fn new(graph: &Graph, cfg: Cfg, dom: DominatorTree, loops: LoopTree, blocks: Blocks) -> Self {
        let mut position = SecondaryMap::with_capacity(graph.len());
        let mut types = SecondaryMap::with_capacity(graph.len());
        for (_, bb) in cfg.iter() {
            for (i, &n) in bb.nodes.iter().enumerate() {
                position.set(n, Some(i as u32));
                types.set(n, Some(graph.ty(n)));
            }
        }
        Schedule {
            cfg,
            dom,
            loops,
            blocks,
            position,
            types,
        }
    }

    /// Block holding `n`; `None` for Stop and nodes not scheduled.
    #[inline]
    pub fn block_of(&self, n: NodeId) -> Option<BlockId> {
        *self.blocks.get(n)
    }

    /// Index of `n` in its block's linear order.
    #[inline]
    pub fn position(&self, n: NodeId) -> Option<u32> {
        *self.position.get(n)
    }

    /// Final type of `n`.
    #[inline]
    pub fn ty(&self, n: NodeId) -> Option<Ty> {
        *self.types.get(n)
    }

    #[inline]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    #[inline]
    pub fn dominators(&self) -> &DominatorTree {
        &self.dom
    }

    #[inline]
    pub fn loops(&self) -> &LoopTree {
        &self.loops
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.cfg.block(id)
    }

    /// Ordered nodes of one block.
    pub fn nodes(&self, id: BlockId) -> &[NodeId] {
        &self.cfg.block(id).nodes
    }

    /// Blocks in reverse postorder with their ordered nodes.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &[NodeId])> {
        self.cfg.iter_rpo().map(|(id, bb)| (id, bb.nodes.as_slice()))
    }

    /// Number of scheduled nodes.
    pub fn node_count(&self) -> usize {
        self.cfg.iter().map(|(_, bb)| bb.nodes.len()).sum()
    }
}

/// Loop tree, global code motion and local scheduling over an optimized,
/// error-free graph.
pub fn schedule(graph: &mut Graph, config: &OptConfig) -> SonResult<Schedule> {
    let (mut cfg, dom, loops) = build_loop_tree(graph, config)?;
    let blocks = gcm::schedule_global(graph, &mut cfg, &dom)?;
    list_sched::schedule_local(graph, &mut cfg, &blocks)?;
    Ok(Schedule::new(graph, cfg, dom, loops, blocks))
}

// =============================================================================
// Tests
// =============================================================================
