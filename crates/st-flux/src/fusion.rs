// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Pattern mining over executed plans.
//!
//! The engine keeps a bounded history of executed plans and periodically
//! scans it for recurring two-step operational sequences. A pair that
//! recurs often enough is fused: a super-kernel composing both ops is
//! registered in the kernel library and seeded into the belief store
//! with a discounted prior.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::beliefs::BeliefStore;
use crate::dispatch::{JIT_COMPILE_PREFIX, JIT_EXECUTE_PREFIX};
use crate::kernels::{FluxReport, Kernel, KernelInvocation, KernelLibrary, SourceView};
use crate::planner::ExecutionPlan;

/// Discount applied to the summed parent costs when seeding a fused
/// kernel's prior, reflecting elided intermediate buffering.
const FUSION_DISCOUNT: f64 = 0.8;

/// Parent cost assumed when a mined op has no base-cost entry.
const DEFAULT_PARENT_COST: f64 = 100.0;

pub struct PatternEngine {
    history: VecDeque<ExecutionPlan>,
    capacity: usize,
    executions: u64,
    fusion_threshold: usize,
    analysis_interval: u64,
}

impl PatternEngine {
    pub fn new(capacity: usize, fusion_threshold: usize, analysis_interval: u64) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            executions: 0,
            fusion_threshold: fusion_threshold.max(1),
            analysis_interval: analysis_interval.max(1),
        }
    }

    pub fn set_fusion_threshold(&mut self, threshold: usize) {
        self.fusion_threshold = threshold.max(1);
    }

    pub fn set_analysis_interval(&mut self, interval: u64) {
        self.analysis_interval = interval.max(1);
    }

    /// Clears the execution counter (the history is kept).
    pub fn reset_counter(&mut self) {
        self.executions = 0;
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Appends an executed plan and triggers analysis every
    /// `analysis_interval` executions.
    pub fn record_executed_plan(
        &mut self,
        plan: ExecutionPlan,
        library: &mut KernelLibrary,
        beliefs: &mut BeliefStore,
    ) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(plan);
        self.executions += 1;
        debug!(
            executions = self.executions,
            history = self.history.len(),
            "recorded executed plan"
        );
        if self.executions % self.analysis_interval == 0 {
            self.analyze(library, beliefs);
        }
    }

    /// Mines the whole history for recurring operational pairs and
    /// registers a fused kernel for each pair past the threshold.
    pub fn analyze(&mut self, library: &mut KernelLibrary, beliefs: &mut BeliefStore) {
        let counts = self.frequent_sequences(beliefs);
        for ((first, second), count) in counts {
            if count >= self.fusion_threshold {
                info!(
                    first = %first,
                    second = %second,
                    count,
                    "sequence met fusion threshold"
                );
                register_fused_kernel(&first, &second, library, beliefs);
            }
        }
    }

    /// Counts consecutive step pairs across the history. JIT control
    /// steps, ops without a base cost, and self-pairs are excluded.
    fn frequent_sequences(
        &self,
        beliefs: &BeliefStore,
    ) -> Vec<((String, String), usize)> {
        let mut counts: Vec<((String, String), usize)> = Vec::new();
        for plan in &self.history {
            for window in plan.steps.windows(2) {
                let first = window[0].op.as_str();
                let second = window[1].op.as_str();
                if first == second {
                    continue;
                }
                if is_control_step(first) || is_control_step(second) {
                    continue;
                }
                if !beliefs.has_base(first) || !beliefs.has_base(second) {
                    continue;
                }
                match counts
                    .iter_mut()
                    .find(|(pair, _)| pair.0 == first && pair.1 == second)
                {
                    Some((_, count)) => *count += 1,
                    None => counts.push(((first.to_string(), second.to_string()), 1)),
                }
            }
        }
        counts
    }
}

fn is_control_step(op: &str) -> bool {
    op.starts_with(JIT_COMPILE_PREFIX) || op.starts_with(JIT_EXECUTE_PREFIX)
}

/// Registers `FUSED_<A>_<B>` in both the kernel library and the belief
/// store. Skips silently when the kernel already exists; skips with a
/// warning when either parent is not a native kernel.
pub fn register_fused_kernel(
    first: &str,
    second: &str,
    library: &mut KernelLibrary,
    beliefs: &mut BeliefStore,
) {
    let fused_name = format!("FUSED_{first}_{second}");
    if library.contains(&fused_name) {
        debug!(kernel = %fused_name, "fused kernel already registered");
        return;
    }

    let first_fn = match library.get(first).and_then(Kernel::as_native) {
        Some(f) => f.clone(),
        None => {
            warn!(op = %first, "cannot fuse: parent kernel is missing or not native");
            return;
        }
    };
    let second_fn = match library.get(second).and_then(Kernel::as_native) {
        Some(f) => f.clone(),
        None => {
            warn!(op = %second, "cannot fuse: parent kernel is missing or not native");
            return;
        }
    };

    let kernel = Kernel::native(move |inv: &mut KernelInvocation<'_>| {
        // stage one lands in a scratch buffer the fused kernel owns; its
        // Hamming weight never reaches the observed flux, which is the
        // saving fusion buys
        let mut staged: Vec<f64> = Vec::new();
        let first_report = {
            let mut sub = KernelInvocation {
                src: inv.src,
                aux: inv.aux,
                dst: crate::kernels::SinkView::Temp(&mut staged),
                alpha: inv.alpha,
                dims: inv.dims,
            };
            first_fn(&mut sub)?
        };
        let second_report = {
            let mut sub = KernelInvocation {
                src: SourceView::Temp(&staged),
                aux: inv.aux,
                dst: inv.dst.reborrow(),
                alpha: inv.alpha,
                dims: inv.dims,
            };
            second_fn(&mut sub)?
        };
        Ok(FluxReport {
            cycle_cost: first_report.cycle_cost + second_report.cycle_cost,
            hw_in_cost: first_report.hw_in_cost,
            hw_out_cost: second_report.hw_out_cost,
        })
    });
    library.register(fused_name.clone(), kernel);

    let parent_cost = |op: &str| {
        if beliefs.has_base(op) {
            beliefs.base(op)
        } else {
            DEFAULT_PARENT_COST
        }
    };
    let prior = FUSION_DISCOUNT * (parent_cost(first) + parent_cost(second));
    beliefs.set_base(fused_name.clone(), prior);
    info!(kernel = %fused_name, prior, "registered fused super-kernel");
}
