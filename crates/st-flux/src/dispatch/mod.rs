// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Plan execution. The dispatcher walks a plan step by step, resolving
//! symbolic buffer tags against a per-execution frame, invoking kernels,
//! and summing their flux sub-records into a performance record.

pub mod jit;

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::kernels::{
    FluxReport, Kernel, KernelInvocation, KernelLibrary, SinkView, SourceView,
};
use crate::planner::{ExecutionPlan, PlanStep};
use crate::task::Task;

use jit::{CodeGenerator, SpecializedKernel};

pub const JIT_COMPILE_PREFIX: &str = "JIT_COMPILE_";
pub const JIT_EXECUTE_PREFIX: &str = "EXECUTE_JIT_";

/// Tag that resolves to the task's primary input.
pub const INPUT_TAG: &str = "input";
/// Tag that resolves to the task's output buffer.
pub const OUTPUT_TAG: &str = "output";

/// What actually happened when a plan ran.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceRecord {
    pub cycle_cost: u64,
    pub hw_in_cost: u64,
    pub hw_out_cost: u64,
    /// Exact integer sum of the three cost components, as a real.
    pub observed_holistic_flux: f64,
    pub latency_ns: u128,
}

impl PerformanceRecord {
    fn from_totals(totals: FluxReport, latency_ns: u128) -> Self {
        Self {
            cycle_cost: totals.cycle_cost,
            hw_in_cost: totals.hw_in_cost,
            hw_out_cost: totals.hw_out_cost,
            observed_holistic_flux: totals.total() as f64,
            latency_ns,
        }
    }
}

#[derive(Default)]
pub struct Dispatcher {
    last_specialized: Option<SpecializedKernel>,
    codegen: Option<Box<dyn CodeGenerator>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an external code generator consulted before the built-in
    /// specialization rule.
    pub fn set_code_generator(&mut self, generator: Box<dyn CodeGenerator>) {
        self.codegen = Some(generator);
    }

    /// Executes every step of `plan` against `task`. Transient buffers
    /// live in a frame local to this call and are dropped on every exit
    /// path. Kernel failures abandon the plan; no record is produced.
    pub fn execute(
        &mut self,
        plan: &ExecutionPlan,
        task: &mut Task<'_>,
        library: &KernelLibrary,
    ) -> Result<PerformanceRecord> {
        debug!(plan = %plan.name, task = task.id, "beginning plan execution");
        let started = Instant::now();
        self.last_specialized = None;

        let mut frame: HashMap<String, Vec<f64>> = HashMap::new();
        let mut totals = FluxReport::default();

        for step in &plan.steps {
            let report = self.dispatch_step(step, task, library, &mut frame)?;
            totals.accumulate(report);
        }

        let record = PerformanceRecord::from_totals(totals, started.elapsed().as_nanos());
        debug!(
            plan = %plan.name,
            flux = record.observed_holistic_flux,
            latency_ns = record.latency_ns as u64,
            "plan execution complete"
        );
        Ok(record)
    }

    fn dispatch_step(
        &mut self,
        step: &PlanStep,
        task: &mut Task<'_>,
        library: &KernelLibrary,
        frame: &mut HashMap<String, Vec<f64>>,
    ) -> Result<FluxReport> {
        let op = step.op.as_str();
        debug!(op, src = %step.src_tag, dst = %step.dst_tag, "dispatching step");

        if let Some(target) = op.strip_prefix(JIT_COMPILE_PREFIX) {
            if target != "SAXPY" {
                return Err(EngineError::UnknownKernel { op: op.to_string() });
            }
            let specialized = jit::specialize_saxpy(task, self.codegen.as_deref_mut());
            self.last_specialized = Some(specialized);
            // compile cost is predicted through transform_cost, not
            // measured in arithmetic cycles
            return Ok(FluxReport::default());
        }

        if op.starts_with(JIT_EXECUTE_PREFIX) {
            let kernel = self
                .last_specialized
                .as_ref()
                .ok_or(EngineError::MissingJitArtifact)?;
            return Ok(jit::run_specialized(kernel, task));
        }

        let kernel = library
            .get(op)
            .ok_or_else(|| EngineError::UnknownKernel { op: op.to_string() })?;
        let native = match kernel {
            Kernel::Native(f) => f.clone(),
            Kernel::Portable(_) => {
                return Err(EngineError::TaskValidationFailed(format!(
                    "kernel '{op}' is a portable payload; no loader is available"
                )))
            }
        };

        // materialize transient sources as owned copies so the frame can
        // hand out the destination mutably afterwards
        let scratch: Option<Vec<f64>> = match step.src_tag.as_str() {
            INPUT_TAG => None,
            OUTPUT_TAG => Some(task.out.as_ref().to_f64()),
            tag => Some(frame.get(tag).cloned().unwrap_or_default()),
        };
        let src = match &scratch {
            None => SourceView::Caller(task.in_a),
            Some(values) => SourceView::Temp(values),
        };
        let dst = match step.dst_tag.as_str() {
            OUTPUT_TAG => SinkView::Caller(task.out.reborrow()),
            tag => SinkView::Temp(frame.entry(tag.to_string()).or_default()),
        };

        let mut invocation = KernelInvocation {
            src,
            aux: task.in_b,
            dst,
            alpha: task.alpha.unwrap_or(1.0),
            dims: task.dims,
        };
        native(&mut invocation).map_err(|err| match err {
            failure @ EngineError::KernelFailed { .. } => failure,
            other => EngineError::KernelFailed {
                op: op.to_string(),
                cause: other.to_string(),
            },
        })
    }
}
