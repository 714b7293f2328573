// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! CPU reference kernels. Each wraps its arithmetic in flux accounting:
//! Hamming weight of operands before, Hamming weight of output after,
//! and a cycle estimate proportional to the arithmetic performed.

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;
use tracing::debug;

use crate::error::{kernel_failed, Result};
use crate::kernels::{FluxReport, Kernel, KernelInvocation, KernelLibrary};
use crate::profiler::hamming_weight;
use crate::task::BufferRef;

fn aux_hamming(aux: Option<BufferRef<'_>>) -> u64 {
    aux.map(|buf| hamming_weight(buf.as_bytes())).unwrap_or(0)
}

pub fn install_default_kernels(lib: &mut KernelLibrary) {
    lib.register("SAXPY_STANDARD", Kernel::native(saxpy_standard));
    lib.register("GEMM_NAIVE", Kernel::native(gemm_naive));
    lib.register("GEMM_FLUX_ADAPTIVE", Kernel::native(gemm_flux_adaptive));
    lib.register("CONV_DIRECT", Kernel::native(conv_direct));
    lib.register("ELEMENT_WISE_MULTIPLY", Kernel::native(element_wise_multiply));
    lib.register("FFT_FORWARD", Kernel::native(fft_forward));
    lib.register("FFT_INVERSE", Kernel::native(fft_inverse));
}

/// y = alpha * x + y over the destination buffer.
fn saxpy_standard(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let x = inv.src.to_f64();
    let n = x.len();
    let mut report = FluxReport::default();
    if n == 0 {
        return Ok(report);
    }

    report.hw_in_cost = inv.src.hamming_weight() + inv.dst.hamming_weight();

    let mut y = inv.dst.read_f64();
    if y.len() < n {
        y.resize(n, 0.0);
    }
    if inv.alpha == 0.0 {
        // alpha of zero makes the whole update a no-op
        debug!("SAXPY short-circuit: alpha is zero");
    } else {
        let a = inv.alpha as f64;
        for (yi, &xi) in y.iter_mut().zip(&x) {
            *yi = a * xi + *yi;
        }
    }
    inv.dst.store_f64(&y);

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = n as u64 * 2;
    Ok(report)
}

fn gemm_operands(inv: &KernelInvocation<'_>, op: &str) -> Result<(Vec<f64>, Vec<f64>, usize, usize, usize)> {
    let dims = inv
        .dims
        .ok_or_else(|| kernel_failed(op, "missing M, N, K dimensions"))?;
    let b = inv
        .aux
        .ok_or_else(|| kernel_failed(op, "missing B operand"))?;
    let a = inv.src.to_f64();
    let b = b.to_f64();
    if a.len() < dims.m * dims.k || b.len() < dims.k * dims.n {
        return Err(kernel_failed(op, "operand shorter than its dimensions"));
    }
    Ok((a, b, dims.m, dims.n, dims.k))
}

/// C = A · B through the dense path.
fn gemm_naive(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let (a, b, m, n, k) = gemm_operands(inv, "GEMM_NAIVE")?;
    let mut report = FluxReport::default();
    report.hw_in_cost = inv.src.hamming_weight() + aux_hamming(inv.aux);

    let a2 = Array2::from_shape_vec((m, k), a[..m * k].to_vec())
        .map_err(|e| kernel_failed("GEMM_NAIVE", e.to_string()))?;
    let b2 = Array2::from_shape_vec((k, n), b[..k * n].to_vec())
        .map_err(|e| kernel_failed("GEMM_NAIVE", e.to_string()))?;
    let mut c = Array2::<f64>::zeros((m, n));
    ndarray::linalg::general_mat_mul(1.0, &a2, &b2, 0.0, &mut c);
    let c = c.into_raw_vec();
    inv.dst.store_f64(&c);

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = (m * n * k) as u64 * 2;
    Ok(report)
}

/// Sparsity-aware GEMM: zero operands contribute no multiply-adds, and
/// the cycle estimate only counts the work actually done.
fn gemm_flux_adaptive(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let (a, b, m, n, k) = gemm_operands(inv, "GEMM_FLUX_ADAPTIVE")?;
    let mut report = FluxReport::default();
    report.hw_in_cost = inv.src.hamming_weight() + aux_hamming(inv.aux);

    let mut c = vec![0.0f64; m * n];
    let mut macs: u64 = 0;
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                let av = a[i * k + l];
                if av == 0.0 {
                    continue;
                }
                let bv = b[l * n + j];
                if bv == 0.0 {
                    continue;
                }
                sum += av * bv;
                macs += 1;
            }
            c[i * n + j] = sum;
        }
    }
    inv.dst.store_f64(&c);

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = macs * 2;
    Ok(report)
}

/// Time-domain convolution of the input with the filter in `aux`,
/// truncated to the destination length.
fn conv_direct(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let filter = inv
        .aux
        .ok_or_else(|| kernel_failed("CONV_DIRECT", "missing filter operand"))?;
    let x = inv.src.to_f64();
    let h = filter.to_f64();
    let mut report = FluxReport::default();
    if x.is_empty() || h.is_empty() {
        return Ok(report);
    }
    report.hw_in_cost = inv.src.hamming_weight() + hamming_weight(filter.as_bytes());

    let out_len = if inv.dst.len() > 0 { inv.dst.len() } else { x.len() };
    let mut y = vec![0.0f64; out_len];
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (j, &hj) in h.iter().enumerate() {
            if let Some(&xv) = i.checked_sub(j).and_then(|idx| x.get(idx)) {
                sum += hj * xv;
            }
        }
        *yi = sum;
    }
    inv.dst.store_f64(&y);

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = (out_len * h.len()) as u64 * 2;
    Ok(report)
}

fn spectrum_of(samples: &[f64], bins: usize) -> Vec<Complex64> {
    let mut buf: Vec<Complex64> = samples
        .iter()
        .take(bins)
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    buf.resize(bins, Complex64::new(0.0, 0.0));
    FftPlanner::<f64>::new().plan_fft_forward(bins).process(&mut buf);
    buf
}

fn interleaved_to_complex(data: &[f64]) -> Vec<Complex64> {
    data.chunks_exact(2)
        .map(|re_im| Complex64::new(re_im[0], re_im[1]))
        .collect()
}

fn complex_to_interleaved(data: &[Complex64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for c in data {
        out.push(c.re);
        out.push(c.im);
    }
    out
}

/// Pointwise complex product of the source spectrum with the spectrum of
/// the `aux` operand. Without an aux operand the spectrum passes through
/// unchanged.
fn element_wise_multiply(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let mut report = FluxReport::default();
    let mut spectrum = interleaved_to_complex(&inv.src.to_f64());
    if spectrum.is_empty() {
        inv.dst.store_f64(&[]);
        return Ok(report);
    }
    report.hw_in_cost = inv.src.hamming_weight();

    if let Some(aux) = inv.aux {
        report.hw_in_cost += hamming_weight(aux.as_bytes());
        let other = spectrum_of(&aux.to_f64(), spectrum.len());
        for (s, o) in spectrum.iter_mut().zip(&other) {
            *s *= o;
        }
    }
    inv.dst.store_f64(&complex_to_interleaved(&spectrum));

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = spectrum.len() as u64 * 6;
    Ok(report)
}

fn fft_cycle_cost(n: usize) -> u64 {
    if n == 0 {
        return 0;
    }
    (n as f64 * (n as f64).log2() * 5.0) as u64
}

/// Real input to interleaved re/im spectrum.
fn fft_forward(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let samples = inv.src.to_f64();
    let n = samples.len();
    let mut report = FluxReport::default();
    if n == 0 {
        inv.dst.store_f64(&[]);
        return Ok(report);
    }
    report.hw_in_cost = inv.src.hamming_weight();

    let mut buf: Vec<Complex64> = samples.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buf);
    inv.dst.store_f64(&complex_to_interleaved(&buf));

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = fft_cycle_cost(n);
    Ok(report)
}

/// Interleaved re/im spectrum back to the real signal.
fn fft_inverse(inv: &mut KernelInvocation<'_>) -> Result<FluxReport> {
    let mut spectrum = interleaved_to_complex(&inv.src.to_f64());
    let n = spectrum.len();
    let mut report = FluxReport::default();
    if n == 0 {
        inv.dst.store_f64(&[]);
        return Ok(report);
    }
    report.hw_in_cost = inv.src.hamming_weight();

    FftPlanner::<f64>::new()
        .plan_fft_inverse(n)
        .process(&mut spectrum);
    let scale = 1.0 / n as f64;
    let signal: Vec<f64> = spectrum.iter().map(|c| c.re * scale).collect();
    inv.dst.store_f64(&signal);

    report.hw_out_cost = inv.dst.hamming_weight();
    report.cycle_cost = fft_cycle_cost(n);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{SinkView, SourceView};
    use crate::task::{BufferMut, BufferRef, GemmDims};

    fn invoke<'x>(
        src: SourceView<'x>,
        aux: Option<BufferRef<'x>>,
        dst: SinkView<'x>,
        alpha: f32,
        dims: Option<GemmDims>,
    ) -> KernelInvocation<'x> {
        KernelInvocation {
            src,
            aux,
            dst,
            alpha,
            dims,
        }
    }

    #[test]
    fn saxpy_updates_in_place_and_reports_exact_flux() {
        let x = [1.0f32, 2.0, 3.0, 4.0];
        let mut y = [10.0f32, 10.0, 10.0, 10.0];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&x)),
            None,
            SinkView::Caller(BufferMut::F32(&mut y)),
            2.0,
            None,
        );
        let report = saxpy_standard(&mut inv).unwrap();
        assert_eq!(y, [12.0, 14.0, 16.0, 18.0]);
        assert_eq!(report.cycle_cost, 8);
        assert!(report.hw_in_cost > 0);
        assert!(report.hw_out_cost > 0);
    }

    #[test]
    fn saxpy_alpha_zero_leaves_the_accumulator_untouched() {
        let x = [5.0f32, 5.0];
        let mut y = [1.0f32, 2.0];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&x)),
            None,
            SinkView::Caller(BufferMut::F32(&mut y)),
            0.0,
            None,
        );
        saxpy_standard(&mut inv).unwrap();
        assert_eq!(y, [1.0, 2.0]);
    }

    #[test]
    fn saxpy_empty_input_reports_all_zero_flux() {
        let x: [f32; 0] = [];
        let mut y: [f32; 0] = [];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&x)),
            None,
            SinkView::Caller(BufferMut::F32(&mut y)),
            1.0,
            None,
        );
        let report = saxpy_standard(&mut inv).unwrap();
        assert_eq!(report, FluxReport::default());
    }

    #[test]
    fn gemm_naive_multiplies_correctly() {
        // A = [[1, 2], [3, 4]], B = [[5, 6], [7, 8]]
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [5.0f32, 6.0, 7.0, 8.0];
        let mut c = [0.0f32; 4];
        let dims = GemmDims { m: 2, n: 2, k: 2 };
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&a)),
            Some(BufferRef::F32(&b)),
            SinkView::Caller(BufferMut::F32(&mut c)),
            1.0,
            Some(dims),
        );
        let report = gemm_naive(&mut inv).unwrap();
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
        assert_eq!(report.cycle_cost, 16);
    }

    #[test]
    fn gemm_flux_adaptive_matches_naive_and_skips_zero_work() {
        let a = [1.0f32, 0.0, 0.0, 4.0];
        let b = [5.0f32, 6.0, 7.0, 8.0];
        let dims = GemmDims { m: 2, n: 2, k: 2 };

        let mut c_naive = [0.0f32; 4];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&a)),
            Some(BufferRef::F32(&b)),
            SinkView::Caller(BufferMut::F32(&mut c_naive)),
            1.0,
            Some(dims),
        );
        let naive = gemm_naive(&mut inv).unwrap();

        let mut c_adaptive = [0.0f32; 4];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&a)),
            Some(BufferRef::F32(&b)),
            SinkView::Caller(BufferMut::F32(&mut c_adaptive)),
            1.0,
            Some(dims),
        );
        let adaptive = gemm_flux_adaptive(&mut inv).unwrap();

        assert_eq!(c_naive, c_adaptive);
        assert!(adaptive.cycle_cost < naive.cycle_cost);
    }

    #[test]
    fn gemm_without_dims_fails() {
        let a = [1.0f32; 4];
        let b = [1.0f32; 4];
        let mut c = [0.0f32; 4];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F32(&a)),
            Some(BufferRef::F32(&b)),
            SinkView::Caller(BufferMut::F32(&mut c)),
            1.0,
            None,
        );
        assert!(gemm_naive(&mut inv).is_err());
    }

    #[test]
    fn conv_direct_convolves_with_the_filter() {
        let x = [1.0f64, 0.0, 0.0, 0.0];
        let h = [1.0f64, 0.5];
        let mut y = [0.0f64; 4];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F64(&x)),
            Some(BufferRef::F64(&h)),
            SinkView::Caller(BufferMut::F64(&mut y)),
            1.0,
            None,
        );
        conv_direct(&mut inv).unwrap();
        assert_eq!(y, [1.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn fft_round_trip_recovers_the_signal() {
        let x = [1.0f64, 2.0, 3.0, 4.0];
        let mut freq: Vec<f64> = Vec::new();
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F64(&x)),
            None,
            SinkView::Temp(&mut freq),
            1.0,
            None,
        );
        fft_forward(&mut inv).unwrap();
        assert_eq!(freq.len(), 8);

        let mut back = [0.0f64; 4];
        let mut inv = invoke(
            SourceView::Temp(&freq),
            None,
            SinkView::Caller(BufferMut::F64(&mut back)),
            1.0,
            None,
        );
        fft_inverse(&mut inv).unwrap();
        for (orig, got) in x.iter().zip(&back) {
            assert!((orig - got).abs() < 1e-9);
        }
    }

    #[test]
    fn frequency_path_matches_direct_convolution() {
        // circular convolution via FFT agrees with the direct kernel on a
        // filter shorter than the signal when no wraparound occurs
        let x = [1.0f64, 2.0, -1.0, 0.5, 0.0, 0.0, 0.0, 0.0];
        let h = [0.5f64, 0.25];

        let mut direct = [0.0f64; 8];
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F64(&x)),
            Some(BufferRef::F64(&h)),
            SinkView::Caller(BufferMut::F64(&mut direct)),
            1.0,
            None,
        );
        conv_direct(&mut inv).unwrap();

        let mut freq: Vec<f64> = Vec::new();
        let mut inv = invoke(
            SourceView::Caller(BufferRef::F64(&x)),
            None,
            SinkView::Temp(&mut freq),
            1.0,
            None,
        );
        fft_forward(&mut inv).unwrap();

        let mut product: Vec<f64> = Vec::new();
        let mut inv = invoke(
            SourceView::Temp(&freq),
            Some(BufferRef::F64(&h)),
            SinkView::Temp(&mut product),
            1.0,
            None,
        );
        element_wise_multiply(&mut inv).unwrap();

        let mut via_fft = [0.0f64; 8];
        let mut inv = invoke(
            SourceView::Temp(&product),
            None,
            SinkView::Caller(BufferMut::F64(&mut via_fft)),
            1.0,
            None,
        );
        fft_inverse(&mut inv).unwrap();

        for (d, f) in direct.iter().zip(&via_fft) {
            assert!((d - f).abs() < 1e-9, "direct {d} vs fft {f}");
        }
    }
}
