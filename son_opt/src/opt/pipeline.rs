//! Phase pipeline.
//!
//! Runs a built graph through the fixed phase sequence:
//!
//! 1. **Optimize**: worklist fixpoint over every reachable node
//! 2. **TypeCheck**: collect residual semantic errors; any error stops here
//! 3. **Schedule**: loop tree, global code motion, local list scheduling
//!
//! A compilation runs to completion or aborts at the first failing phase.
//! Nothing is resumable, and nothing past type checking runs on a graph
//! that still carries errors.

use super::iter::{iterate, IterStats};
use super::typecheck::type_check;
use crate::codegen::{schedule, Schedule};
use crate::config::OptConfig;
use crate::ir::graph::Graph;
use son_core::error::{Phase, SonError, SonResult};

use std::time::{Duration, Instant};

// =============================================================================
// Pass Phase
// =============================================================================

/// Phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassPhase {
    /// Peephole fixpoint.
    Optimize,
    /// Residual error collection.
    TypeCheck,
    /// Code motion and local ordering.
    Schedule,
}

impl PassPhase {
    pub fn name(self) -> &'static str {
        match self {
            PassPhase::Optimize => "optimize",
            PassPhase::TypeCheck => "type-check",
            PassPhase::Schedule => "schedule",
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Which phases run and with what settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Settings shared by the optimizer and code motion.
    pub opt: OptConfig,

    /// Run code motion and scheduling after a clean type check.
    pub schedule: bool,

    /// Collect per-phase timing.
    pub collect_timing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl PipelineConfig {
    /// Stop after the optimizer and the type check.
    pub fn minimal() -> Self {
        Self {
            opt: OptConfig::default(),
            schedule: false,
            collect_timing: false,
        }
    }

    /// Every phase through scheduling.
    pub fn full() -> Self {
        Self {
            opt: OptConfig::default(),
            schedule: true,
            collect_timing: true,
        }
    }

    pub fn with_opt(mut self, opt: OptConfig) -> Self {
        self.opt = opt;
        self
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Output of one compilation.
#[derive(Debug)]
pub struct Compiled {
    /// Present when scheduling ran.
    pub schedule: Option<Schedule>,
    pub stats: PipelineStats,
}

/// Drives one graph through the phases.
#[derive(Debug, Clone, Default)]
pub struct OptPipeline {
    config: PipelineConfig,
}

impl OptPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every configured phase. Semantic errors surface after the
    /// optimizer has folded away whatever dead code carried them.
    pub fn run(&self, graph: &mut Graph) -> SonResult<Compiled> {
        let start = Instant::now();
        let mut stats = PipelineStats {
            initial_size: graph.live_nodes().count(),
            ..Default::default()
        };

        let iter = self.timed(PassPhase::Optimize, graph, &mut stats, |g| {
            iterate(g, &self.config.opt)
        })?;
        stats.iter = iter;

        self.timed(PassPhase::TypeCheck, graph, &mut stats, type_check)?;

        let schedule = if self.config.schedule {
            Some(self.timed(PassPhase::Schedule, graph, &mut stats, |g| {
                schedule(g, &self.config.opt)
            })?)
        } else {
            None
        };

        stats.total_time = start.elapsed();
        stats.final_size = graph.live_nodes().count();
        log::debug!(
            "pipeline: {} phases, {} -> {} live nodes",
            stats.passes.len(),
            stats.initial_size,
            stats.final_size
        );
        Ok(Compiled { schedule, stats })
    }

    fn timed<T>(
        &self,
        phase: PassPhase,
        graph: &mut Graph,
        stats: &mut PipelineStats,
        pass: impl FnOnce(&mut Graph) -> SonResult<T>,
    ) -> SonResult<T> {
        let start = self.config.collect_timing.then(Instant::now);
        let out = pass(graph);
        let time = start.map_or(Duration::ZERO, |s| s.elapsed());
        stats.passes.push(PassStat {
            phase,
            ok: out.is_ok(),
            live_nodes: graph.live_nodes().count(),
            time,
        });
        log::debug!("{} finished in {:?}", phase.name(), time);
        out
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStat {
    pub phase: PassPhase,
    /// Whether the phase succeeded.
    pub ok: bool,
    /// Live nodes once the phase finished.
    pub live_nodes: usize,
    /// Zero unless timing is collected.
    pub time: Duration,
}

/// Statistics from the whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub passes: Vec<PassStat>,
    /// Worklist counters from the optimizer.
    pub iter: IterStats,
    pub total_time: Duration,
    /// Live nodes handed in by the builder.
    pub initial_size: usize,
    /// Live nodes at the end.
    pub final_size: usize,
}

impl PipelineStats {
    /// Final over initial size.
    pub fn size_reduction(&self) -> f64 {
        if self.initial_size == 0 {
            1.0
        } else {
            self.final_size as f64 / self.initial_size as f64
        }
    }

    pub fn phase(&self, phase: PassPhase) -> Option<&PassStat> {
        self.passes.iter().find(|p| p.phase == phase)
    }
}

// =============================================================================
// Quick Entry Points
// =============================================================================

/// Optimize, check and schedule.
pub fn compile(graph: &mut Graph, config: &OptConfig) -> SonResult<Schedule> {
    let pipeline = OptPipeline::with_config(PipelineConfig::full().with_opt(config.clone()));
    let compiled = pipeline.run(graph)?;
    compiled
        .schedule
        .ok_or_else(|| SonError::internal(Phase::Schedule, "full pipeline produced no schedule"))
}

/// Optimize and check only.
pub fn check(graph: &mut Graph, config: &OptConfig) -> SonResult<PipelineStats> {
    let pipeline = OptPipeline::with_config(PipelineConfig::minimal().with_opt(config.clone()));
    Ok(pipeline.run(graph)?.stats)
}

// =============================================================================
// Tests
// =============================================================================
