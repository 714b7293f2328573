// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Task intake. Shape and operand checks run before the cognitive cycle
//! so that a malformed task never reaches profiling or learning.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::task::{Task, TaskKind};

fn reject(reason: impl Into<String>) -> EngineError {
    EngineError::TaskValidationFailed(reason.into())
}

/// Validates a task before the Perceive step. An empty primary input is
/// allowed (it profiles to zero and dispatches to a zero-flux record);
/// structural mismatches are not.
pub fn validate(task: &Task<'_>) -> Result<()> {
    match &task.kind {
        TaskKind::Custom(name) if name.trim().is_empty() => {
            return Err(reject("task kind tag is empty"));
        }
        TaskKind::Gemm => {
            let dims = task
                .dims
                .ok_or_else(|| reject("GEMM requires M, N, K dimensions"))?;
            let b = task
                .in_b
                .ok_or_else(|| reject("GEMM requires a B operand in in_b"))?;
            if task.in_a.len() < dims.m * dims.k {
                return Err(reject(format!(
                    "GEMM A operand holds {} elements, needs {}",
                    task.in_a.len(),
                    dims.m * dims.k
                )));
            }
            if b.len() < dims.k * dims.n {
                return Err(reject(format!(
                    "GEMM B operand holds {} elements, needs {}",
                    b.len(),
                    dims.k * dims.n
                )));
            }
            if task.out.len() != dims.m * dims.n {
                return Err(reject(format!(
                    "GEMM output holds {} elements, needs {}",
                    task.out.len(),
                    dims.m * dims.n
                )));
            }
        }
        TaskKind::Saxpy => {
            if task.out.len() != task.in_a.len() {
                return Err(reject(format!(
                    "SAXPY accumulator holds {} elements, input holds {}",
                    task.out.len(),
                    task.in_a.len()
                )));
            }
        }
        TaskKind::Convolution => {
            if task.in_b.is_none() {
                return Err(reject("convolution requires a filter in in_b"));
            }
        }
        TaskKind::FftInverse => {
            if task.in_a.len() % 2 != 0 {
                return Err(reject(
                    "inverse transform input must hold interleaved re/im pairs",
                ));
            }
        }
        _ => {}
    }
    debug!(task = task.id, kind = task.kind.as_str(), "task accepted");
    Ok(())
}
