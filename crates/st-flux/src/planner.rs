// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Candidate plan generation and predictive cost simulation.
//!
//! For each task kind the planner emits every known strategy, scores it
//! against the belief store and the task's data profile, applies the
//! sensor modulation, and returns the candidates sorted ascending by
//! predicted holistic flux. Ties keep rule-table order.

use tracing::debug;

use crate::beliefs::BeliefStore;
use crate::error::{EngineError, Result};
use crate::profiler::DataProfile;
use crate::sensors::SensorContext;
use crate::task::TaskKind;

/// One step of a plan: an op plus symbolic input/output buffer tags
/// resolved by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub op: String,
    pub src_tag: String,
    pub dst_tag: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlan {
    pub name: String,
    pub steps: Vec<PlanStep>,
    pub predicted_holistic_flux: f64,
}

impl ExecutionPlan {
    pub fn new(name: impl Into<String>, steps: &[(&str, &str, &str)]) -> Self {
        Self {
            name: name.into(),
            steps: steps
                .iter()
                .map(|(op, src, dst)| PlanStep {
                    op: (*op).to_string(),
                    src_tag: (*src).to_string(),
                    dst_tag: (*dst).to_string(),
                })
                .collect(),
            predicted_holistic_flux: 0.0,
        }
    }
}

/// Step-name markers that make a plan network- or I/O-bound for the
/// sensor modulation.
const NETWORK_MARKERS: [&str; 2] = ["NETWORK_", "REMOTE_"];
const IO_MARKERS: [&str; 2] = ["DISK_", "LOAD_"];

/// Multiplier applied when telemetry reports unusable data quality.
const BAD_QUALITY_PENALTY: f64 = 1000.0;

#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Generates, scores, and sorts the candidates for one task.
    pub fn rank(
        &self,
        kind: &TaskKind,
        profile: &DataProfile,
        beliefs: &BeliefStore,
    ) -> Result<Vec<ExecutionPlan>> {
        let mut candidates = self.candidate_plans(kind, beliefs);
        if candidates.is_empty() {
            return Err(EngineError::UnroutableTask(kind.as_str().to_string()));
        }
        for plan in &mut candidates {
            plan.predicted_holistic_flux = simulate_flux(plan, profile, beliefs);
            debug!(
                plan = %plan.name,
                flux = plan.predicted_holistic_flux,
                "scored candidate"
            );
        }
        candidates.sort_by(|a, b| {
            a.predicted_holistic_flux
                .total_cmp(&b.predicted_holistic_flux)
        });
        Ok(candidates)
    }

    /// The strategy rule table, keyed on task kind, plus fused variants
    /// surfaced from the belief store.
    pub fn candidate_plans(&self, kind: &TaskKind, beliefs: &BeliefStore) -> Vec<ExecutionPlan> {
        let mut plans = match kind {
            TaskKind::Convolution => vec![
                ExecutionPlan::new("Direct (Time)", &[("CONV_DIRECT", "input", "output")]),
                ExecutionPlan::new(
                    "Frequency (FFT)",
                    &[
                        ("FFT_FORWARD", "input", "temp_freq"),
                        ("ELEMENT_WISE_MULTIPLY", "temp_freq", "temp_result"),
                        ("FFT_INVERSE", "temp_result", "output"),
                    ],
                ),
            ],
            TaskKind::Gemm => vec![
                ExecutionPlan::new("Naive", &[("GEMM_NAIVE", "input", "output")]),
                ExecutionPlan::new(
                    "Flux-Adaptive",
                    &[("GEMM_FLUX_ADAPTIVE", "input", "output")],
                ),
            ],
            TaskKind::Saxpy => vec![
                ExecutionPlan::new("Standard", &[("SAXPY_STANDARD", "input", "output")]),
                ExecutionPlan::new(
                    "JIT Compiled",
                    &[
                        ("JIT_COMPILE_SAXPY", "input", "output"),
                        ("EXECUTE_JIT_SAXPY", "input", "output"),
                    ],
                ),
            ],
            TaskKind::FftForward => vec![ExecutionPlan::new(
                "Forward (FFT)",
                &[("FFT_FORWARD", "input", "output")],
            )],
            TaskKind::FftInverse => vec![ExecutionPlan::new(
                "Inverse (FFT)",
                &[("FFT_INVERSE", "input", "output")],
            )],
            TaskKind::Custom(op) => {
                if beliefs.has_base(op) || beliefs.has_transform(op) {
                    vec![ExecutionPlan::new(
                        format!("Direct ({op})"),
                        &[(op.as_str(), "input", "output")],
                    )]
                } else {
                    Vec::new()
                }
            }
        };

        let fused = fused_variants(&plans, beliefs);
        plans.extend(fused);
        plans
    }
}

/// Rewrites each baseline plan around registered fused super-kernels:
/// whenever two consecutive steps have a `FUSED_A_B` entry in the belief
/// store, a variant plan running the fused op instead is appended.
fn fused_variants(plans: &[ExecutionPlan], beliefs: &BeliefStore) -> Vec<ExecutionPlan> {
    let mut variants = Vec::new();
    for plan in plans {
        for window in 0..plan.steps.len().saturating_sub(1) {
            let first = &plan.steps[window];
            let second = &plan.steps[window + 1];
            let fused_op = format!("FUSED_{}_{}", first.op, second.op);
            if !beliefs.has_base(&fused_op) {
                continue;
            }
            let mut steps: Vec<PlanStep> = Vec::with_capacity(plan.steps.len() - 1);
            steps.extend_from_slice(&plan.steps[..window]);
            steps.push(PlanStep {
                op: fused_op.clone(),
                src_tag: first.src_tag.clone(),
                dst_tag: second.dst_tag.clone(),
            });
            steps.extend_from_slice(&plan.steps[window + 2..]);
            variants.push(ExecutionPlan {
                name: format!("{} [{fused_op}]", plan.name),
                steps,
                predicted_holistic_flux: 0.0,
            });
        }
    }
    variants
}

/// Flux(P, D) = Σ over steps of transform cost plus operational cost
/// (base plus data-dependent term), modulated by the sensor context.
pub fn simulate_flux(plan: &ExecutionPlan, profile: &DataProfile, beliefs: &BeliefStore) -> f64 {
    let mut total = 0.0;
    for step in &plan.steps {
        let op = step.op.as_str();
        if beliefs.has_transform(op) {
            total += beliefs.transform(op);
        }
        if beliefs.has_base(op) {
            total += beliefs.base(op) + dynamic_term(op, profile, beliefs);
        }
    }
    total * sensor_multiplier(plan, &profile.sensors)
}

/// The data-dependent cost term f(s, D, lambda) for an operational step.
fn dynamic_term(op: &str, profile: &DataProfile, beliefs: &BeliefStore) -> f64 {
    let mut term = match op {
        "CONV_DIRECT" => {
            profile.amplitude_flux * beliefs.sensitivity("lambda_Conv_Amp")
                + profile.frequency_flux * beliefs.sensitivity("lambda_Conv_Freq")
        }
        "SAXPY_STANDARD" => profile.amplitude_flux * beliefs.sensitivity("lambda_SAXPY_generic"),
        // the specialization discount: half the generic SAXPY term
        "EXECUTE_JIT_SAXPY" => {
            0.5 * profile.amplitude_flux * beliefs.sensitivity("lambda_SAXPY_generic")
        }
        _ if op.starts_with("GEMM_") => {
            (1.0 - profile.sparsity_ratio) * beliefs.sensitivity("lambda_Sparsity")
        }
        _ => 0.0,
    };

    let hw_key = format!("{op}_lambda_hw_combined");
    if beliefs.has_sensitivity(&hw_key) {
        term += profile.hamming_weight as f64 * beliefs.sensitivity(&hw_key);
    }
    term
}

fn plan_contains_marker(plan: &ExecutionPlan, markers: &[&str]) -> bool {
    plan.steps
        .iter()
        .any(|step| markers.iter().any(|marker| step.op.contains(marker)))
}

/// Environmental adjustment applied after summing the step costs.
pub fn sensor_multiplier(plan: &ExecutionPlan, sensors: &SensorContext) -> f64 {
    let mut multiplier = 1.0;
    if sensors.temperature_celsius > 85.0 {
        multiplier *= 1.5;
    }
    if sensors.power_draw_watts > 100.0 {
        multiplier *= 1.0 + 0.005 * (sensors.power_draw_watts - 100.0);
    }
    if sensors.network_latency_ms > 100.0 && plan_contains_marker(plan, &NETWORK_MARKERS) {
        multiplier *= 1.2;
    }
    if sensors.io_throughput_mbps < 50.0 && plan_contains_marker(plan, &IO_MARKERS) {
        multiplier *= 1.15;
    }
    if sensors.data_quality > 0.0 {
        multiplier /= sensors.data_quality;
    } else {
        multiplier *= BAD_QUALITY_PENALTY;
    }
    multiplier
}
