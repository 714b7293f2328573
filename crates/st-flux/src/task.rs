// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

use std::sync::atomic::{AtomicU64, Ordering};

/// Kind tag that selects the planner's candidate rule table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Convolution,
    Gemm,
    Saxpy,
    FftForward,
    FftInverse,
    /// Free-form op name routed directly against the belief tables.
    Custom(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Convolution => "CONVOLUTION",
            TaskKind::Gemm => "GEMM",
            TaskKind::Saxpy => "SAXPY",
            TaskKind::FftForward => "FFT_FORWARD",
            TaskKind::FftInverse => "FFT_INVERSE",
            TaskKind::Custom(name) => name,
        }
    }
}

/// Read-only view of a caller-owned input buffer.
///
/// The engine never frees or retains these; they live for the duration of
/// one `Engine::execute` call.
#[derive(Clone, Copy, Debug)]
pub enum BufferRef<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
    Bytes(&'a [u8]),
}

impl<'a> BufferRef<'a> {
    /// Element count in the buffer's native element kind.
    pub fn len(&self) -> usize {
        match self {
            BufferRef::F32(s) => s.len(),
            BufferRef::F64(s) => s.len(),
            BufferRef::Bytes(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Raw byte view, used for Hamming-weight accounting.
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            BufferRef::F32(s) => bytemuck::cast_slice(s),
            BufferRef::F64(s) => bytemuck::cast_slice(s),
            BufferRef::Bytes(s) => s,
        }
    }

    /// Numeric view of the payload, widening every element kind to f64.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            BufferRef::F32(s) => s.iter().map(|&v| v as f64).collect(),
            BufferRef::F64(s) => s.to_vec(),
            BufferRef::Bytes(s) => s.iter().map(|&v| v as f64).collect(),
        }
    }
}

/// Mutable view of the caller-owned output buffer.
#[derive(Debug)]
pub enum BufferMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
    Bytes(&'a mut [u8]),
}

impl<'a> BufferMut<'a> {
    pub fn len(&self) -> usize {
        match self {
            BufferMut::F32(s) => s.len(),
            BufferMut::F64(s) => s.len(),
            BufferMut::Bytes(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared view of the current contents.
    pub fn as_ref(&self) -> BufferRef<'_> {
        match self {
            BufferMut::F32(s) => BufferRef::F32(s),
            BufferMut::F64(s) => BufferRef::F64(s),
            BufferMut::Bytes(s) => BufferRef::Bytes(s),
        }
    }

    /// Reborrows the underlying slice for a shorter-lived mutable view.
    pub fn reborrow(&mut self) -> BufferMut<'_> {
        match self {
            BufferMut::F32(s) => BufferMut::F32(s),
            BufferMut::F64(s) => BufferMut::F64(s),
            BufferMut::Bytes(s) => BufferMut::Bytes(s),
        }
    }

    /// Stores `values` into the buffer, narrowing to the native element
    /// kind. Excess values are dropped; missing values leave the tail
    /// untouched.
    pub fn store_f64(&mut self, values: &[f64]) {
        match self {
            BufferMut::F32(s) => {
                for (dst, &v) in s.iter_mut().zip(values) {
                    *dst = v as f32;
                }
            }
            BufferMut::F64(s) => {
                for (dst, &v) in s.iter_mut().zip(values) {
                    *dst = v;
                }
            }
            BufferMut::Bytes(s) => {
                for (dst, &v) in s.iter_mut().zip(values) {
                    *dst = v as u8;
                }
            }
        }
    }
}

/// GEMM problem shape: C[m×n] = A[m×k] · B[k×n].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GemmDims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// One unit of work submitted to the engine. Buffers are caller-owned.
#[derive(Debug)]
pub struct Task<'a> {
    pub kind: TaskKind,
    pub in_a: BufferRef<'a>,
    pub in_b: Option<BufferRef<'a>>,
    pub out: BufferMut<'a>,
    /// Scalar parameter (SAXPY alpha). Kernels default it to 1.0.
    pub alpha: Option<f32>,
    pub dims: Option<GemmDims>,
    pub id: u64,
}

impl<'a> Task<'a> {
    pub fn new(kind: TaskKind, in_a: BufferRef<'a>, out: BufferMut<'a>) -> Self {
        Self {
            kind,
            in_a,
            in_b: None,
            out,
            alpha: None,
            dims: None,
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_in_b(mut self, in_b: BufferRef<'a>) -> Self {
        self.in_b = Some(in_b);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_dims(mut self, dims: GemmDims) -> Self {
        self.dims = Some(dims);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotone() {
        let a = [0.0f32; 4];
        let mut out_a = [0.0f32; 4];
        let mut out_b = [0.0f32; 4];
        let t1 = Task::new(TaskKind::Saxpy, BufferRef::F32(&a), BufferMut::F32(&mut out_a));
        let t2 = Task::new(TaskKind::Saxpy, BufferRef::F32(&a), BufferMut::F32(&mut out_b));
        assert!(t2.id > t1.id);
    }

    #[test]
    fn buffer_views_agree_on_length() {
        let data = [1.0f32, 2.0, 3.0];
        let buf = BufferRef::F32(&data);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.byte_len(), 12);
        assert_eq!(buf.to_f64(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn store_f64_narrows_per_element_kind() {
        let mut bytes = [0u8; 3];
        let mut out = BufferMut::Bytes(&mut bytes);
        out.store_f64(&[1.0, 510.0, -3.0]);
        // float-to-int casts saturate
        assert_eq!(bytes, [1, 255, 0]);
    }
}
