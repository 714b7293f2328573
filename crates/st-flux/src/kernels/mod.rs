// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Kernel library: op name to callable, plus the flux sub-records every
//! kernel reports back to the dispatcher.

pub mod cpu;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::profiler::hamming_weight;
use crate::task::{BufferMut, BufferRef, GemmDims};

/// Fine-grained cost record reported by one kernel invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FluxReport {
    /// Kernel-estimated arithmetic work.
    pub cycle_cost: u64,
    /// Hamming weight of the consumed operands at run time.
    pub hw_in_cost: u64,
    /// Hamming weight of the produced output at run time.
    pub hw_out_cost: u64,
}

impl FluxReport {
    pub fn total(&self) -> u64 {
        self.cycle_cost + self.hw_in_cost + self.hw_out_cost
    }

    pub fn accumulate(&mut self, other: FluxReport) {
        self.cycle_cost += other.cycle_cost;
        self.hw_in_cost += other.hw_in_cost;
        self.hw_out_cost += other.hw_out_cost;
    }
}

/// Resolved source operand for one plan step: either a caller buffer or
/// a transient f64 buffer owned by the execution frame.
#[derive(Clone, Copy, Debug)]
pub enum SourceView<'x> {
    Caller(BufferRef<'x>),
    Temp(&'x [f64]),
}

impl SourceView<'_> {
    pub fn len(&self) -> usize {
        match self {
            SourceView::Caller(buf) => buf.len(),
            SourceView::Temp(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            SourceView::Caller(buf) => buf.to_f64(),
            SourceView::Temp(s) => s.to_vec(),
        }
    }

    pub fn hamming_weight(&self) -> u64 {
        match self {
            SourceView::Caller(buf) => hamming_weight(buf.as_bytes()),
            SourceView::Temp(s) => hamming_weight(bytemuck::cast_slice(s)),
        }
    }
}

/// Resolved destination for one plan step.
#[derive(Debug)]
pub enum SinkView<'x> {
    Caller(BufferMut<'x>),
    Temp(&'x mut Vec<f64>),
}

impl SinkView<'_> {
    pub fn len(&self) -> usize {
        match self {
            SinkView::Caller(buf) => buf.len(),
            SinkView::Temp(v) => v.len(),
        }
    }

    /// Current contents, widened to f64. SAXPY-style kernels read their
    /// accumulator operand through this.
    pub fn read_f64(&self) -> Vec<f64> {
        match self {
            SinkView::Caller(buf) => buf.as_ref().to_f64(),
            SinkView::Temp(v) => v.to_vec(),
        }
    }

    /// Stores the result. Caller buffers narrow to their element kind and
    /// keep their length; transient buffers take the values wholesale.
    pub fn store_f64(&mut self, values: &[f64]) {
        match self {
            SinkView::Caller(buf) => buf.store_f64(values),
            SinkView::Temp(v) => {
                v.clear();
                v.extend_from_slice(values);
            }
        }
    }

    pub fn hamming_weight(&self) -> u64 {
        match self {
            SinkView::Caller(buf) => hamming_weight(buf.as_ref().as_bytes()),
            SinkView::Temp(v) => hamming_weight(bytemuck::cast_slice(v)),
        }
    }

    pub fn reborrow(&mut self) -> SinkView<'_> {
        match self {
            SinkView::Caller(buf) => SinkView::Caller(buf.reborrow()),
            SinkView::Temp(v) => SinkView::Temp(v),
        }
    }
}

/// Everything a kernel sees for one step.
pub struct KernelInvocation<'x> {
    pub src: SourceView<'x>,
    /// Secondary caller operand (GEMM B, convolution filter).
    pub aux: Option<BufferRef<'x>>,
    pub dst: SinkView<'x>,
    pub alpha: f32,
    pub dims: Option<GemmDims>,
}

pub type NativeKernel = Arc<dyn Fn(&mut KernelInvocation<'_>) -> Result<FluxReport> + Send + Sync>;

/// A registered kernel. Portable payloads are parked until a bytecode
/// loader exists; dispatching one is a validation failure.
#[derive(Clone)]
pub enum Kernel {
    Native(NativeKernel),
    Portable(Vec<u8>),
}

impl Kernel {
    pub fn native(
        f: impl Fn(&mut KernelInvocation<'_>) -> Result<FluxReport> + Send + Sync + 'static,
    ) -> Self {
        Kernel::Native(Arc::new(f))
    }

    pub fn as_native(&self) -> Option<&NativeKernel> {
        match self {
            Kernel::Native(f) => Some(f),
            Kernel::Portable(_) => None,
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kernel::Native(_) => f.write_str("Kernel::Native(..)"),
            Kernel::Portable(bytes) => write!(f, "Kernel::Portable({} bytes)", bytes.len()),
        }
    }
}

/// Op name to kernel mapping. Populated at construction, augmented at
/// run time by the pattern engine's fused registrations.
#[derive(Debug, Default)]
pub struct KernelLibrary {
    kernels: HashMap<String, Kernel>,
}

impl KernelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_kernels() -> Self {
        let mut lib = Self::new();
        cpu::install_default_kernels(&mut lib);
        lib
    }

    pub fn register(&mut self, name: impl Into<String>, kernel: Kernel) {
        self.kernels.insert(name.into(), kernel);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Kernel> {
        self.kernels.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kernels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}
