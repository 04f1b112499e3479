//! Local list scheduling.
//!
//! Orders the nodes code motion placed in each block. A node is ready once
//! every input it has in the same block is scheduled; Phi inputs and inputs
//! from other blocks never count. The ready node with the highest priority
//! goes next, ties going to whichever became ready first.
//!
//! | Priority | Nodes                                     |
//! |----------|-------------------------------------------|
//! | 1001     | value projections of the block head       |
//! | 1000     | Phis                                      |
//! | 500      | everything else                           |
//! | 1        | the block's terminator                    |
//!
//! Projections of any other multi-output node in the block are not
//! scheduled on their own: they are emitted right behind their source, and
//! a node using a projection waits on the source instead.
//!
//! The head always comes first. A block whose nodes never all become ready
//! has a dependence cycle, which is an internal error.

use super::cfg::{BasicBlock, BlockId, Cfg};
use super::gcm::Blocks;
use crate::ir::arena::SecondaryMap;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::operators::Operator;
use son_core::error::{Phase, SonError, SonResult};

/// Priority of a projection of the block head.
pub const PRIORITY_PROJ: u32 = 1001;
/// Priority of a Phi.
pub const PRIORITY_PHI: u32 = 1000;
/// Priority of an ordinary node.
pub const PRIORITY_DEFAULT: u32 = 500;
/// Priority of the block terminator.
pub const PRIORITY_TERMINATOR: u32 = 1;

/// Order every block in place.
pub fn schedule_local(graph: &Graph, cfg: &mut Cfg, blocks: &Blocks) -> SonResult<()> {
    let mut scheduled = 0;
    for i in 0..cfg.len() {
        let id = BlockId::new(i as u32);
        let order = schedule_block(graph, cfg.block(id), id, blocks)?;
        scheduled += order.len();
        cfg.block_mut(id).nodes = order;
    }
    log::debug!("list scheduling: {scheduled} nodes in {} blocks", cfg.len());
    Ok(())
}

fn priority(graph: &Graph, bb: &BasicBlock, n: NodeId) -> u32 {
    if n == bb.terminator {
        return PRIORITY_TERMINATOR;
    }
    match graph.op(n) {
        Operator::Proj(_) => PRIORITY_PROJ,
        Operator::Phi(_) => PRIORITY_PHI,
        _ => PRIORITY_DEFAULT,
    }
}

/// Linear order for one block.
pub fn schedule_block(
    graph: &Graph,
    bb: &BasicBlock,
    id: BlockId,
    blocks: &Blocks,
) -> SonResult<Vec<NodeId>> {
    let member = |n: NodeId| blocks[n] == Some(id);
    // The node scheduled in place of `n`.
    let unit = |n: NodeId| match (graph.op(n), graph.input(n, 0)) {
        (Operator::Proj(_), Some(src)) if src != bb.head && member(src) => src,
        _ => n,
    };
    let counts = |d: NodeId, u: NodeId| {
        d != bb.head && member(d) && member(u) && !graph.op(u).is_phi() && unit(d) != unit(u)
    };

    let mut riders: SecondaryMap<Node, Vec<NodeId>> = SecondaryMap::new();
    let mut pending: SecondaryMap<Node, u32> = SecondaryMap::new();
    let mut ready: Vec<NodeId> = Vec::new();
    for &n in &bb.nodes {
        if n == bb.head {
            continue;
        }
        let count = graph
            .inputs(n)
            .iter()
            .flatten()
            .filter(|&&d| counts(d, n))
            .count() as u32;
        let u = unit(n);
        *pending.entry(u) += count;
        if u != n {
            riders.entry(u).push(n);
        }
    }
    for &n in &bb.nodes {
        if n != bb.head && unit(n) == n && pending[n] == 0 {
            ready.push(n);
        }
    }

    let mut order = Vec::with_capacity(bb.nodes.len());
    if member(bb.head) {
        order.push(bb.head);
    }

    while !ready.is_empty() {
        // First of the highest priority.
        let mut pick = 0;
        let mut best = priority(graph, bb, ready[0]);
        for (i, &n) in ready.iter().enumerate().skip(1) {
            let p = priority(graph, bb, n);
            if p > best {
                best = p;
                pick = i;
            }
        }
        let n = ready.remove(pick);
        order.push(n);
        order.extend_from_slice(&riders[n]);

        for &m in std::iter::once(&n).chain(riders[n].iter()) {
            for &u in graph.outputs(m) {
                if u == bb.head || !counts(m, u) {
                    continue;
                }
                let left = pending.entry(unit(u));
                if *left > 0 {
                    *left -= 1;
                    if *left == 0 {
                        ready.push(unit(u));
                    }
                }
            }
        }
    }

    if order.len() != bb.nodes.len() {
        let stuck: Vec<String> = bb
            .nodes
            .iter()
            .filter(|n| !order.contains(n))
            .map(|&n| format!("{n} {}", graph.op(n).label()))
            .collect();
        return Err(SonError::internal(
            Phase::Schedule,
            format!(
                "dependence cycle in block {id} (head {}): {}",
                bb.head,
                stuck.join(", ")
            ),
        ));
    }
    Ok(order)
}

// =============================================================================
// Tests
// =============================================================================
