//! Worklist fixpoint engine.
//!
//! Drives peepholes over the whole graph until no node changes. Every change
//! re-queues only the changed node's neighbourhood, so the common path is
//! near-linear in graph size.
//!
//! # Invariant
//!
//! Every reachable node is either on the worklist or already at fixpoint.
//! With [`OptConfig::verify`] set, the drained graph is re-walked on a
//! scratch copy and any node that would still change is reported as an
//! internal error.

use crate::config::OptConfig;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use son_core::error::{Phase, SonError, SonResult};

/// Counters from one run of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterStats {
    /// Nodes popped and peepholed.
    pub steps: usize,
    /// Peepholes that replaced a node.
    pub rewrites: usize,
    /// Nodes queued for the run, counting those already pending.
    pub pushes: usize,
    /// Live nodes after the run.
    pub live_nodes: usize,
}

/// Run the worklist to a fixpoint.
pub fn iterate(graph: &mut Graph, config: &OptConfig) -> SonResult<IterStats> {
    graph.work.reseed(config.seed);
    let seed_nodes = graph.reachable();
    graph.work.push_all(seed_nodes);

    let rewrites_before = graph.rewrites;
    let pushed_before = graph.work.total_pushed() - graph.work.len();
    let mut steps = 0usize;

    while let Some(n) = graph.work.pop() {
        if graph.is_dead(n) {
            continue;
        }
        steps += 1;
        if steps > config.max_steps {
            return Err(SonError::internal(
                Phase::Optimize,
                format!(
                    "no fixpoint after {} steps ({} nodes still queued)",
                    config.max_steps,
                    graph.work.len()
                ),
            ));
        }
        step(graph, n);
    }

    if config.verify {
        verify_fixpoint(graph)?;
    }

    let stats = IterStats {
        steps,
        rewrites: graph.rewrites - rewrites_before,
        pushes: graph.work.total_pushed() - pushed_before,
        live_nodes: graph.live_nodes().count(),
    };
    log::debug!(
        "iterate: {} steps, {} pushes, {} rewrites, {} live nodes (seed {})",
        stats.steps,
        stats.pushes,
        stats.rewrites,
        stats.live_nodes,
        config.seed
    );
    Ok(stats)
}

/// Peephole one node and queue whatever its change may enable.
fn step(graph: &mut Graph, n: NodeId) {
    if let Some(x) = graph.peephole_opt(n) {
        if graph.is_dead(x) {
            return;
        }
        if graph.node(x).ty().is_none() {
            let t = graph.compute(x);
            graph.set_type(x, t);
        }
        if x != n || !graph.op(x).is_constant() {
            if !graph.is_dead(n) {
                let uses = graph.outputs(n).to_vec();
                graph.work.push_all(uses);
            }
            graph.work.push(x);
            if x != n && !graph.is_dead(n) {
                let defs: Vec<NodeId> = graph.inputs(n).iter().flatten().copied().collect();
                graph.work.push_all(defs);
                log::trace!(
                    "{n} {} => {x} {}",
                    graph.op(n).label(),
                    graph.op(x).label()
                );
                graph.subsume(n, x);
            }
        }
    }
    if !graph.is_dead(n) {
        graph.move_deps(n);
        if graph.node(n).is_unused() {
            graph.kill(n);
        }
    }
}

/// Fail if any reachable node not on the worklist would still change.
///
/// Runs on a scratch copy; the real graph is untouched.
pub fn verify_fixpoint(graph: &Graph) -> SonResult<()> {
    let mut scratch = graph.clone();
    scratch.mid_assert = true;
    for n in graph.reachable() {
        if graph.work.contains(n) || scratch.is_dead(n) {
            continue;
        }
        let before = scratch.ty(n);
        if let Some(x) = scratch.peephole_opt(n) {
            let after = scratch.ty(x);
            return Err(SonError::internal(
                Phase::Optimize,
                format!(
                    "{n} {} : {} is not at fixpoint, it would become {x} {} : {}",
                    graph.op(n).label(),
                    graph.types.str(before),
                    scratch.op(x).label(),
                    scratch.types.str(after)
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operators::{ArithOp, Operator};
    use son_core::span::Span;
    use son_core::types::Ty;

    /// `(x + 1) + 2` built without eager peepholes.
    fn lazy_chain(g: &mut Graph) -> (NodeId, NodeId) {
        g.set_eager(false);
        let start = g.start();
        let ctrl = g.add_node(Operator::CProj(0), &[Some(start)], Span::DUMMY);
        let ctrl = g.peephole(ctrl);
        let mem = g.add_node(Operator::Proj(1), &[Some(start)], Span::DUMMY);
        let mem = g.peephole(mem);
        let x = g.add_node(Operator::Proj(2), &[Some(start)], Span::DUMMY);
        let x = g.peephole(x);
        let one = g.con_int(1);
        let two = g.con_int(2);
        let a = g.binary(Operator::IntOp(ArithOp::Add), x, one, Span::DUMMY);
        let b = g.binary(Operator::IntOp(ArithOp::Add), a, two, Span::DUMMY);
        let ret = g.add_node(Operator::RETURN, &[Some(ctrl), Some(mem), Some(b)], Span::DUMMY);
        let ret = g.peephole(ret);
        let stop = g.stop();
        g.add_def(stop, Some(ret));
        (x, ret)
    }

    #[test]
    fn test_lazy_graph_reaches_same_fixpoint() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let (x, ret) = lazy_chain(&mut g);
        let stats = iterate(&mut g, &OptConfig::default().with_verify(true)).unwrap();
        assert!(stats.rewrites > 0);
        let val = g.input(ret, 2).unwrap();
        assert_eq!(g.op(val), &Operator::IntOp(ArithOp::Add));
        assert_eq!(g.input(val, 1), Some(x));
        assert_eq!(g.types.int_value(g.in_ty(val, 2)), Some(3));
    }

    #[test]
    fn test_second_run_does_nothing() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        lazy_chain(&mut g);
        iterate(&mut g, &OptConfig::default()).unwrap();
        let rewrites = g.rewrites();
        let stats = iterate(&mut g, &OptConfig::default().with_verify(true)).unwrap();
        assert_eq!(stats.rewrites, 0);
        assert_eq!(g.rewrites(), rewrites);
        // The drained list is refilled with the whole graph.
        assert!(stats.pushes >= g.reachable().len());
        assert!(stats.steps <= stats.pushes);
    }

    #[test]
    fn test_step_limit_is_internal_error() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        lazy_chain(&mut g);
        let err = iterate(&mut g, &OptConfig::default().with_max_steps(1)).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_verify_catches_unqueued_change() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        lazy_chain(&mut g);
        iterate(&mut g, &OptConfig::default()).unwrap();
        // Rewire behind the engine's back and drop the queued work.
        let zero = g.con_int(0);
        let ret = g.input(g.stop(), 0).unwrap();
        let val = g.input(ret, 2).unwrap();
        g.set_def(val, 2, Some(zero));
        g.worklist_mut().clear();
        assert!(verify_fixpoint(&g).is_err());
    }
}
