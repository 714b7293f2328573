// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Data-adaptive kernel specialization.
//!
//! The specializer inspects the task payload and picks a pre-registered
//! variant. A real runtime code generator can be slotted in through
//! [`CodeGenerator`] without touching the dispatch contract: when the
//! generator yields nothing, variant selection falls back to the
//! deterministic sparsity rule.

use tracing::debug;

use crate::kernels::FluxReport;
use crate::profiler::hamming_weight;
use crate::task::Task;

/// External code-generator hook. `None` defers to the built-in variants.
pub trait CodeGenerator: Send {
    fn generate(&mut self, task: &Task<'_>) -> Option<SpecializedKernel>;
}

/// A compiled-for-this-data kernel, closed over the scalar parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpecializedKernel {
    /// Skips zero input lanes; profitable past 50% zeros.
    SaxpySparse { alpha: f32 },
    /// Straight fused multiply-add over every lane.
    SaxpyDense { alpha: f32 },
}

/// Chooses the SAXPY variant for the task's input data: the fraction of
/// zero elements decides sparse vs dense.
pub fn specialize_saxpy(
    task: &Task<'_>,
    mut codegen: Option<&mut (dyn CodeGenerator + 'static)>,
) -> SpecializedKernel {
    if let Some(generator) = codegen.as_deref_mut() {
        if let Some(kernel) = generator.generate(task) {
            debug!("external code generator supplied a specialized kernel");
            return kernel;
        }
    }

    let samples = task.in_a.to_f64();
    let zero_fraction = if samples.is_empty() {
        1.0
    } else {
        samples.iter().filter(|&&v| v == 0.0).count() as f64 / samples.len() as f64
    };
    let alpha = task.alpha.unwrap_or(1.0);
    let kernel = if zero_fraction > 0.5 {
        SpecializedKernel::SaxpySparse { alpha }
    } else {
        SpecializedKernel::SaxpyDense { alpha }
    };
    debug!(zero_fraction, ?kernel, "specialized SAXPY variant selected");
    kernel
}

/// Runs the stashed variant directly against the task buffers.
pub fn run_specialized(kernel: &SpecializedKernel, task: &mut Task<'_>) -> FluxReport {
    let x = task.in_a.to_f64();
    let n = x.len();
    let mut report = FluxReport::default();
    if n == 0 {
        return report;
    }

    report.hw_in_cost =
        hamming_weight(task.in_a.as_bytes()) + hamming_weight(task.out.as_ref().as_bytes());

    let mut y = task.out.as_ref().to_f64();
    if y.len() < n {
        y.resize(n, 0.0);
    }

    match *kernel {
        SpecializedKernel::SaxpySparse { alpha } => {
            let a = alpha as f64;
            let mut active: u64 = 0;
            for (yi, &xi) in y.iter_mut().zip(&x) {
                if xi != 0.0 {
                    *yi = a * xi + *yi;
                    active += 1;
                }
            }
            report.cycle_cost = active * 2;
        }
        SpecializedKernel::SaxpyDense { alpha } => {
            let a = alpha as f64;
            for (yi, &xi) in y.iter_mut().zip(&x) {
                *yi = a * xi + *yi;
            }
            report.cycle_cost = n as u64 * 2;
        }
    }

    task.out.store_f64(&y);
    report.hw_out_cost = hamming_weight(task.out.as_ref().as_bytes());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{BufferMut, BufferRef, Task, TaskKind};

    #[test]
    fn mostly_zero_input_selects_the_sparse_variant() {
        let x = [0.0f32, 0.0, 0.0, 1.0];
        let mut y = [0.0f32; 4];
        let task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F32(&x),
            BufferMut::F32(&mut y),
        )
        .with_alpha(2.0);
        assert_eq!(
            specialize_saxpy(&task, None),
            SpecializedKernel::SaxpySparse { alpha: 2.0 }
        );
    }

    #[test]
    fn dense_input_selects_the_dense_variant_with_default_alpha() {
        let x = [1.0f32, 2.0, 3.0, 0.0];
        let mut y = [0.0f32; 4];
        let task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F32(&x),
            BufferMut::F32(&mut y),
        );
        assert_eq!(
            specialize_saxpy(&task, None),
            SpecializedKernel::SaxpyDense { alpha: 1.0 }
        );
    }

    #[test]
    fn sparse_and_dense_variants_agree_on_the_result() {
        let x = [0.0f32, 3.0, 0.0, 5.0];

        let mut y1 = [1.0f32, 1.0, 1.0, 1.0];
        let mut task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F32(&x),
            BufferMut::F32(&mut y1),
        );
        let sparse = run_specialized(&SpecializedKernel::SaxpySparse { alpha: 2.0 }, &mut task);

        let mut y2 = [1.0f32, 1.0, 1.0, 1.0];
        let mut task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F32(&x),
            BufferMut::F32(&mut y2),
        );
        let dense = run_specialized(&SpecializedKernel::SaxpyDense { alpha: 2.0 }, &mut task);

        assert_eq!(y1, y2);
        assert_eq!(y1, [1.0, 7.0, 1.0, 11.0]);
        // the sparse variant only pays for the active lanes
        assert!(sparse.cycle_cost < dense.cycle_cost);
    }

    #[test]
    fn code_generator_takes_precedence() {
        struct Fixed;
        impl CodeGenerator for Fixed {
            fn generate(&mut self, _task: &Task<'_>) -> Option<SpecializedKernel> {
                Some(SpecializedKernel::SaxpyDense { alpha: 7.0 })
            }
        }
        let x = [0.0f32; 8];
        let mut y = [0.0f32; 8];
        let task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F32(&x),
            BufferMut::F32(&mut y),
        );
        let mut generator = Fixed;
        assert_eq!(
            specialize_saxpy(&task, Some(&mut generator)),
            SpecializedKernel::SaxpyDense { alpha: 7.0 }
        );
    }
}
