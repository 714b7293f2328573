// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Closing the loop: compare predicted and observed flux, assign credit
//! across the belief tables, and drive ε-greedy exploration.
//!
//! A deviation past the quark threshold is a "flux quark": the belief
//! model mispredicted badly enough to be worth a correction. Deviations
//! inside the threshold leave the beliefs untouched.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::beliefs::BeliefStore;
use crate::dispatch::PerformanceRecord;
use crate::planner::ExecutionPlan;
use crate::task::TaskKind;

/// Suffix appended to exploratory path names so updates stay attributable.
pub const EXPLORATORY_TAG: &str = " (Exploratory)";

/// Identifies which belief entries a feedback pass may touch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LearningContext {
    pub path_name: String,
    pub transform_key: Option<String>,
    pub main_operation_name: Option<String>,
    pub operation_key: Option<String>,
}

impl LearningContext {
    /// Derives the context from the executed plan: the first step found
    /// in `transform_cost` takes transform blame, the first step found in
    /// `base_cost` is the main operation, and the lambda key prefers the
    /// op's combined hardware sensitivity over the task-kind lambda.
    pub fn from_plan(
        plan: &ExecutionPlan,
        kind: &TaskKind,
        beliefs: &BeliefStore,
        explored: bool,
    ) -> Self {
        let mut path_name = plan.name.clone();
        if explored {
            path_name.push_str(EXPLORATORY_TAG);
        }

        let transform_key = plan
            .steps
            .iter()
            .find(|step| beliefs.has_transform(&step.op))
            .map(|step| step.op.clone());
        let main_operation_name = plan
            .steps
            .iter()
            .find(|step| beliefs.has_base(&step.op))
            .map(|step| step.op.clone());

        let operation_key = main_operation_name.as_ref().map(|op| {
            let hw_key = format!("{op}_lambda_hw_combined");
            if beliefs.has_sensitivity(&hw_key) {
                hw_key
            } else {
                kind_lambda(kind).to_string()
            }
        });

        Self {
            path_name,
            transform_key,
            main_operation_name,
            operation_key,
        }
    }
}

fn kind_lambda(kind: &TaskKind) -> &'static str {
    match kind {
        TaskKind::Convolution => "lambda_Conv_Amp",
        TaskKind::Gemm => "lambda_Sparsity",
        _ => "lambda_SAXPY_generic",
    }
}

pub struct FeedbackLoop {
    quark_threshold: f64,
    eta_transform: f64,
    eta_base: f64,
    eta_lambda: f64,
    exploration_rate: f64,
    rng: StdRng,
}

impl FeedbackLoop {
    pub fn new(
        quark_threshold: f64,
        eta_transform: f64,
        eta_base: f64,
        eta_lambda: f64,
        exploration_rate: f64,
    ) -> Self {
        Self {
            quark_threshold,
            eta_transform,
            eta_base,
            eta_lambda,
            exploration_rate: exploration_rate.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn set_exploration_rate(&mut self, rate: f64) {
        self.exploration_rate = rate.clamp(0.0, 1.0);
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Bernoulli(ε) draw taken once per task before dispatch. Rates of
    /// exactly 0 and 1 are deterministic.
    pub fn should_explore(&mut self) -> bool {
        self.rng.gen_bool(self.exploration_rate)
    }

    /// Credit assignment over the belief tables. Best effort: a context
    /// whose keys match nothing is a warning, never an error.
    pub fn learn(
        &self,
        beliefs: &mut BeliefStore,
        context: &LearningContext,
        predicted: f64,
        record: &PerformanceRecord,
    ) {
        let observed = record.observed_holistic_flux;

        if predicted == 0.0 && observed == 0.0 {
            debug!(path = %context.path_name, "zero predicted, zero observed; beliefs stable");
            return;
        }

        // a prediction of zero met by real cost is a quark of magnitude
        // one; the observed value itself is the lesson
        let deviation = if predicted == 0.0 {
            1.0
        } else {
            (observed - predicted) / predicted
        };

        if predicted != 0.0 && deviation.abs() < self.quark_threshold {
            debug!(
                path = %context.path_name,
                deviation,
                "deviation within quark threshold; beliefs stable"
            );
            return;
        }

        info!(
            path = %context.path_name,
            predicted,
            observed,
            deviation,
            "flux quark detected; updating beliefs"
        );

        let mut touched = false;

        if let Some(key) = &context.transform_key {
            if beliefs.has_transform(key) {
                if predicted == 0.0 {
                    beliefs.set_transform(key.clone(), observed);
                } else {
                    beliefs.update_transform(key, (observed - predicted) * self.eta_transform);
                }
                debug!(key = %key, value = beliefs.transform(key), "transform cost updated");
                touched = true;
            }
        }

        if let Some(op) = &context.main_operation_name {
            if beliefs.update_base(op, deviation * self.eta_base) {
                debug!(op = %op, value = beliefs.base(op), "base cost updated");
                touched = true;
            }
        }

        if let Some(key) = &context.operation_key {
            if beliefs.has_sensitivity(key) {
                if beliefs.sensitivity(key) == 0.0 && observed != 0.0 {
                    beliefs.set_sensitivity(key.clone(), (observed * self.eta_lambda).max(0.01));
                }
                beliefs.update_sensitivity(key, 1.0 + deviation * self.eta_lambda);
                debug!(key = %key, value = beliefs.sensitivity(key), "sensitivity updated");
                touched = true;
            }
        }

        if !touched {
            warn!(
                path = %context.path_name,
                "could not assign credit: no learning-context key matches the belief tables"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(observed: f64) -> PerformanceRecord {
        PerformanceRecord {
            observed_holistic_flux: observed,
            ..PerformanceRecord::default()
        }
    }

    fn feedback() -> FeedbackLoop {
        FeedbackLoop::new(0.15, 0.1, 0.05, 0.1, 0.0)
    }

    #[test]
    fn deviation_within_threshold_leaves_beliefs_alone() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        let context = LearningContext {
            path_name: "Standard".into(),
            main_operation_name: Some("SAXPY_STANDARD".into()),
            operation_key: Some("lambda_SAXPY_generic".into()),
            ..LearningContext::default()
        };
        feedback().learn(&mut beliefs, &context, 100.0, &record(110.0));
        assert_eq!(beliefs.base("SAXPY_STANDARD"), 100.0);
        assert_eq!(beliefs.sensitivity("lambda_SAXPY_generic"), 0.5);
    }

    #[test]
    fn underestimates_raise_base_and_lambda() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        let context = LearningContext {
            path_name: "Standard".into(),
            main_operation_name: Some("SAXPY_STANDARD".into()),
            operation_key: Some("lambda_SAXPY_generic".into()),
            ..LearningContext::default()
        };
        // deviation = +1.0
        feedback().learn(&mut beliefs, &context, 100.0, &record(200.0));
        assert!((beliefs.base("SAXPY_STANDARD") - 105.0).abs() < 1e-9);
        assert!((beliefs.sensitivity("lambda_SAXPY_generic") - 0.55).abs() < 1e-9);
    }

    #[test]
    fn overestimates_lower_base_and_lambda_but_respect_floors() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        let context = LearningContext {
            path_name: "Standard".into(),
            main_operation_name: Some("SAXPY_STANDARD".into()),
            operation_key: Some("lambda_SAXPY_generic".into()),
            ..LearningContext::default()
        };
        feedback().learn(&mut beliefs, &context, 1000.0, &record(10.0));
        assert!(beliefs.base("SAXPY_STANDARD") >= crate::beliefs::COST_FLOOR);
        assert!(beliefs.base("SAXPY_STANDARD") < 100.0);
        assert!(beliefs.sensitivity("lambda_SAXPY_generic") >= 0.0);
    }

    #[test]
    fn transform_errors_shift_toward_observed() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        let context = LearningContext {
            path_name: "Frequency (FFT)".into(),
            transform_key: Some("FFT_FORWARD".into()),
            ..LearningContext::default()
        };
        // observed 700 vs predicted 630: shift by (700 - 630) * 0.1
        feedback().learn(&mut beliefs, &context, 630.0, &record(700.0));
        assert!((beliefs.transform("FFT_FORWARD") - 307.0).abs() < 1e-9);
    }

    #[test]
    fn zero_prediction_with_cost_sets_the_transform_to_observed() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        beliefs.set_transform("FFT_FORWARD", 1.0);
        let context = LearningContext {
            path_name: "Frequency (FFT)".into(),
            transform_key: Some("FFT_FORWARD".into()),
            ..LearningContext::default()
        };
        feedback().learn(&mut beliefs, &context, 0.0, &record(512.0));
        assert_eq!(beliefs.transform("FFT_FORWARD"), 512.0);
    }

    #[test]
    fn dormant_lambda_is_reawakened_by_observed_cost() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        beliefs.set_sensitivity("lambda_SAXPY_generic", 0.0);
        let context = LearningContext {
            path_name: "Standard".into(),
            operation_key: Some("lambda_SAXPY_generic".into()),
            ..LearningContext::default()
        };
        feedback().learn(&mut beliefs, &context, 0.0, &record(300.0));
        assert!(beliefs.sensitivity("lambda_SAXPY_generic") > 0.0);
    }

    #[test]
    fn unmatched_context_is_only_a_warning() {
        let mut beliefs = BeliefStore::with_default_beliefs();
        let context = LearningContext {
            path_name: "Ghost".into(),
            transform_key: Some("NO_SUCH_TRANSFORM".into()),
            main_operation_name: Some("NO_SUCH_OP".into()),
            operation_key: Some("NO_SUCH_LAMBDA".into()),
            ..LearningContext::default()
        };
        feedback().learn(&mut beliefs, &context, 100.0, &record(400.0));
        assert_eq!(beliefs.base("NO_SUCH_OP"), 0.0);
    }

    #[test]
    fn exploration_rate_extremes_are_deterministic() {
        let mut fb = feedback();
        fb.set_exploration_rate(0.0);
        assert!((0..64).all(|_| !fb.should_explore()));
        fb.set_exploration_rate(1.0);
        assert!((0..64).all(|_| fb.should_explore()));
    }

    #[test]
    fn context_derivation_prefers_the_combined_hw_lambda() {
        let beliefs = BeliefStore::with_default_beliefs();
        let plan = ExecutionPlan::new("Standard", &[("SAXPY_STANDARD", "input", "output")]);
        let context = LearningContext::from_plan(&plan, &TaskKind::Saxpy, &beliefs, false);
        assert_eq!(
            context.operation_key.as_deref(),
            Some("SAXPY_STANDARD_lambda_hw_combined")
        );
        assert_eq!(context.main_operation_name.as_deref(), Some("SAXPY_STANDARD"));
        assert!(context.transform_key.is_none());
    }

    #[test]
    fn context_derivation_blames_the_first_transform_step() {
        let beliefs = BeliefStore::with_default_beliefs();
        let plan = ExecutionPlan::new(
            "JIT Compiled",
            &[
                ("JIT_COMPILE_SAXPY", "input", "output"),
                ("EXECUTE_JIT_SAXPY", "input", "output"),
            ],
        );
        let context = LearningContext::from_plan(&plan, &TaskKind::Saxpy, &beliefs, true);
        assert_eq!(context.transform_key.as_deref(), Some("JIT_COMPILE_SAXPY"));
        assert_eq!(
            context.main_operation_name.as_deref(),
            Some("EXECUTE_JIT_SAXPY")
        );
        assert!(context.path_name.ends_with(EXPLORATORY_TAG));
    }
}
