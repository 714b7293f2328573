// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Task perception: turns a task's primary input into a `DataProfile`.
//!
//! Profiling is best-effort and never fails a task. Degenerate inputs
//! (empty, single sample, all-silent spectra) produce a zero profile
//! with `sparsity_ratio = 1`.

use num_complex::Complex64;
use rustfft::FftPlanner;
use tracing::debug;

use crate::sensors::{self, SensorContext, SensorOracle};
use crate::task::Task;

const POWER_EPSILON: f64 = 1e-9;

/// Intrinsic cost posture of a task's data, consumed by plan scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataProfile {
    /// Mean absolute first difference of the payload.
    pub amplitude_flux: f64,
    /// Spectral centroid, normalized so Nyquist sits at 0.5.
    pub frequency_flux: f64,
    /// Spectral Shannon entropy, normalized to [0, 1] by log2(bins).
    pub entropy_flux: f64,
    /// Reserved. Computed as zero, consumed by nothing yet.
    pub temporal_coherence: f64,
    /// Population count of the raw input bytes.
    pub hamming_weight: u64,
    /// 1 - hamming_weight / total_bits; 1.0 for an empty buffer.
    pub sparsity_ratio: f64,
    pub sensors: SensorContext,
}

impl DataProfile {
    fn zero() -> Self {
        Self {
            amplitude_flux: 0.0,
            frequency_flux: 0.0,
            entropy_flux: 0.0,
            temporal_coherence: 0.0,
            hamming_weight: 0,
            sparsity_ratio: 1.0,
            sensors: SensorContext::default(),
        }
    }
}

#[derive(Default)]
pub struct Profiler {
    next_override: Option<SensorContext>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a one-shot sensor context consumed by the next `analyze`.
    pub fn override_next_context(&mut self, ctx: SensorContext) {
        self.next_override = Some(ctx);
    }

    /// Derives the profile of `task.in_a`. Deterministic apart from the
    /// sensor context, which comes from the override slot or the oracle.
    pub fn analyze(&mut self, task: &Task<'_>, oracle: &mut dyn SensorOracle) -> DataProfile {
        let mut profile = DataProfile::zero();

        let bytes = task.in_a.as_bytes();
        profile.hamming_weight = hamming_weight(bytes);
        if !bytes.is_empty() {
            let total_bits = (bytes.len() as u64) * 8;
            profile.sparsity_ratio = 1.0 - profile.hamming_weight as f64 / total_bits as f64;
        }

        let samples = task.in_a.to_f64();
        profile.amplitude_flux = amplitude_flux(&samples);
        if samples.len() >= 2 {
            let spectrum = magnitude_spectrum(&samples);
            profile.frequency_flux = spectral_centroid(&spectrum, samples.len());
            profile.entropy_flux = spectral_entropy(&spectrum);
        }

        profile.sensors = match self.next_override.take() {
            Some(ctx) => ctx,
            None => sensors::gather_context(oracle),
        };

        debug!(
            task = task.kind.as_str(),
            amp = profile.amplitude_flux,
            freq = profile.frequency_flux,
            entropy = profile.entropy_flux,
            hw = profile.hamming_weight,
            "profiled task input"
        );
        profile
    }
}

pub fn hamming_weight(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| b.count_ones() as u64).sum()
}

fn amplitude_flux(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let sum: f64 = samples.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    sum / (samples.len() - 1) as f64
}

/// Magnitudes of the first n/2 + 1 bins of the forward transform.
fn magnitude_spectrum(samples: &[f64]) -> Vec<f64> {
    let n = samples.len();
    let mut buf: Vec<Complex64> = samples.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buf);
    buf.iter().take(n / 2 + 1).map(|c| c.norm()).collect()
}

/// Centroid of the magnitude spectrum over normalized frequencies
/// [0, 0.5]. Zero when the total power is below epsilon.
fn spectral_centroid(spectrum: &[f64], n: usize) -> f64 {
    let total: f64 = spectrum.iter().sum();
    if total <= POWER_EPSILON || n == 0 {
        return 0.0;
    }
    let weighted: f64 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &mag)| (i as f64 / n as f64) * mag)
        .sum();
    weighted / total
}

/// Shannon entropy of the normalized spectrum, divided by log2(bins).
fn spectral_entropy(spectrum: &[f64]) -> f64 {
    let total: f64 = spectrum.iter().sum();
    if total <= POWER_EPSILON || spectrum.len() < 2 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &mag in spectrum {
        let p = mag / total;
        if p > POWER_EPSILON {
            entropy -= p * p.log2();
        }
    }
    entropy / (spectrum.len() as f64).log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SimulatedSensorHub;
    use crate::task::{BufferMut, BufferRef, Task, TaskKind};

    fn analyze_bytes(data: &[u8]) -> DataProfile {
        let mut out = [0u8; 1];
        let task = Task::new(
            TaskKind::Saxpy,
            BufferRef::Bytes(data),
            BufferMut::Bytes(&mut out),
        );
        Profiler::new().analyze(&task, &mut SimulatedSensorHub::new())
    }

    #[test]
    fn hamming_and_sparsity_match_known_payload() {
        let profile = analyze_bytes(&[0x01, 0xF0, 0x03, 0xFF]);
        assert_eq!(profile.hamming_weight, 15);
        assert!((profile.sparsity_ratio - 17.0 / 32.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_yields_zero_profile_with_full_sparsity() {
        let profile = analyze_bytes(&[]);
        assert_eq!(profile.hamming_weight, 0);
        assert_eq!(profile.sparsity_ratio, 1.0);
        assert_eq!(profile.amplitude_flux, 0.0);
        assert_eq!(profile.frequency_flux, 0.0);
        assert_eq!(profile.entropy_flux, 0.0);
    }

    #[test]
    fn single_sample_has_no_spectral_flux() {
        let data = [42.0f64];
        let mut out = [0.0f64; 1];
        let task = Task::new(
            TaskKind::Convolution,
            BufferRef::F64(&data),
            BufferMut::F64(&mut out),
        );
        let profile = Profiler::new().analyze(&task, &mut SimulatedSensorHub::new());
        assert_eq!(profile.amplitude_flux, 0.0);
        assert_eq!(profile.frequency_flux, 0.0);
        assert_eq!(profile.entropy_flux, 0.0);
    }

    #[test]
    fn silent_signal_has_zero_centroid_and_entropy() {
        let data = [0.0f64; 16];
        let mut out = [0.0f64; 16];
        let task = Task::new(
            TaskKind::Convolution,
            BufferRef::F64(&data),
            BufferMut::F64(&mut out),
        );
        let profile = Profiler::new().analyze(&task, &mut SimulatedSensorHub::new());
        assert_eq!(profile.frequency_flux, 0.0);
        assert_eq!(profile.entropy_flux, 0.0);
        assert_eq!(profile.sparsity_ratio, 1.0);
    }

    #[test]
    fn spiky_signal_outscores_smooth_signal_on_amplitude() {
        let smooth = [5.0f64; 16];
        let mut spiky = [0.0f64; 16];
        for (i, v) in spiky.iter_mut().enumerate() {
            *v = if i % 2 == 0 { 0.0 } else { 1000.0 };
        }
        let mut out = [0.0f64; 16];
        let t_smooth = Task::new(
            TaskKind::Convolution,
            BufferRef::F64(&smooth),
            BufferMut::F64(&mut out),
        );
        let p_smooth = Profiler::new().analyze(&t_smooth, &mut SimulatedSensorHub::new());
        let mut out = [0.0f64; 16];
        let t_spiky = Task::new(
            TaskKind::Convolution,
            BufferRef::F64(&spiky),
            BufferMut::F64(&mut out),
        );
        let p_spiky = Profiler::new().analyze(&t_spiky, &mut SimulatedSensorHub::new());
        assert!(p_spiky.amplitude_flux >= 10.0 * p_smooth.amplitude_flux.max(1.0));
        // the alternating signal concentrates power at Nyquist
        assert!(p_spiky.frequency_flux > p_smooth.frequency_flux);
    }

    #[test]
    fn entropy_stays_in_unit_range() {
        let data: Vec<f64> = (0..64).map(|i| ((i * 37) % 23) as f64 - 11.0).collect();
        let mut out = [0.0f64; 1];
        let task = Task::new(
            TaskKind::Convolution,
            BufferRef::F64(&data),
            BufferMut::F64(&mut out),
        );
        let profile = Profiler::new().analyze(&task, &mut SimulatedSensorHub::new());
        assert!(profile.entropy_flux >= 0.0 && profile.entropy_flux <= 1.0);
        assert!(profile.sparsity_ratio >= 0.0 && profile.sparsity_ratio <= 1.0);
    }

    #[test]
    fn sensor_override_is_one_shot() {
        let data = [1.0f64, 2.0];
        let mut out = [0.0f64; 2];
        let task = Task::new(
            TaskKind::Saxpy,
            BufferRef::F64(&data),
            BufferMut::F64(&mut out),
        );
        let mut profiler = Profiler::new();
        let mut hub = SimulatedSensorHub::new();
        let hot = SensorContext {
            temperature_celsius: 99.0,
            ..SensorContext::default()
        };
        profiler.override_next_context(hot);
        let first = profiler.analyze(&task, &mut hub);
        assert_eq!(first.sensors.temperature_celsius, 99.0);
        let second = profiler.analyze(&task, &mut hub);
        assert_eq!(second.sensors, SensorContext::default());
    }
}
