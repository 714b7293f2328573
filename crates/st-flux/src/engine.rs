// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! The engine: one owner for the belief store, kernel library, and the
//! five cycle components, running each task through
//! Perceive → Decide → Act → Learn before the next begins.

use serde::Serialize;
use tracing::{debug, info};

use crate::beliefs::BeliefStore;
use crate::config::EngineConfig;
use crate::dispatch::jit::CodeGenerator;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::feedback::{FeedbackLoop, LearningContext};
use crate::fusion::PatternEngine;
use crate::intake;
use crate::kernels::KernelLibrary;
use crate::planner::{ExecutionPlan, Planner};
use crate::profiler::Profiler;
use crate::sensors::{SensorContext, SensorOracle, SimulatedSensorHub};
use crate::task::Task;
use crate::telemetry;

/// Outcome of one full cycle, returned to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionReport {
    pub plan_name: String,
    pub predicted_holistic_flux: f64,
    pub observed_holistic_flux: f64,
    /// The Bernoulli(ε) draw fired for this task.
    pub exploration_requested: bool,
    /// A suboptimal plan was actually chosen.
    pub explored: bool,
    pub cycle_cost: u64,
    pub hw_in_cost: u64,
    pub hw_out_cost: u64,
    pub latency_ns: u128,
}

pub struct Engine {
    beliefs: BeliefStore,
    library: KernelLibrary,
    profiler: Profiler,
    planner: Planner,
    dispatcher: Dispatcher,
    feedback: FeedbackLoop,
    patterns: PatternEngine,
    sensors: Box<dyn SensorOracle>,
}

impl Engine {
    /// Engine with seeded default beliefs, the stock kernel library, and
    /// environment-resolved configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::from_env())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        telemetry::init_tracing();
        let engine = Self {
            beliefs: BeliefStore::with_default_beliefs(),
            library: KernelLibrary::with_default_kernels(),
            profiler: Profiler::new(),
            planner: Planner::new(),
            dispatcher: Dispatcher::new(),
            feedback: FeedbackLoop::new(
                config.quark_threshold,
                config.eta_transform,
                config.eta_base,
                config.eta_lambda,
                config.exploration_rate,
            ),
            patterns: PatternEngine::new(
                config.history_capacity,
                config.fusion_threshold,
                config.analysis_interval,
            ),
            sensors: Box::new(SimulatedSensorHub::new()),
        };
        info!("engine online: beliefs seeded, kernel library populated");
        engine
    }

    /// Runs one full Perceive → Decide → Act → Learn cycle.
    pub fn execute(&mut self, task: &mut Task<'_>) -> Result<ExecutionReport> {
        intake::validate(task)?;

        // PERCEIVE
        let profile = self.profiler.analyze(task, self.sensors.as_mut());

        // DECIDE
        let mut candidates = self.planner.rank(&task.kind, &profile, &self.beliefs)?;
        let exploration_requested = self.feedback.should_explore();
        let explored = exploration_requested && candidates.len() > 1;
        let plan = if explored {
            let optimal = &candidates[0];
            info!(
                chosen = %candidates[1].name,
                over = %optimal.name,
                "exploration fired: running the second-best plan"
            );
            candidates.remove(1)
        } else {
            if exploration_requested {
                info!("exploration requested but no alternative path exists");
            }
            candidates.remove(0)
        };
        debug!(
            plan = %plan.name,
            predicted = plan.predicted_holistic_flux,
            "plan chosen"
        );

        // ACT. A kernel failure abandons the plan here and skips learning.
        let record = self.dispatcher.execute(&plan, task, &self.library)?;

        // LEARN
        let context = LearningContext::from_plan(&plan, &task.kind, &self.beliefs, explored);
        self.feedback.learn(
            &mut self.beliefs,
            &context,
            plan.predicted_holistic_flux,
            &record,
        );

        // RECORD for pattern mining
        let report = ExecutionReport {
            plan_name: plan.name.clone(),
            predicted_holistic_flux: plan.predicted_holistic_flux,
            observed_holistic_flux: record.observed_holistic_flux,
            exploration_requested,
            explored,
            cycle_cost: record.cycle_cost,
            hw_in_cost: record.hw_in_cost,
            hw_out_cost: record.hw_out_cost,
            latency_ns: record.latency_ns,
        };
        self.patterns
            .record_executed_plan(plan, &mut self.library, &mut self.beliefs);

        Ok(report)
    }

    /// Read-only view of the belief model.
    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    pub fn kernel_library(&self) -> &KernelLibrary {
        &self.library
    }

    /// Feeds an externally executed plan into the pattern engine. This
    /// is the out-of-band recording path for hosts that run plans
    /// through their own schedulers.
    pub fn record_executed_plan(&mut self, plan: ExecutionPlan) {
        self.patterns
            .record_executed_plan(plan, &mut self.library, &mut self.beliefs);
    }

    /// Replaces the sensor oracle collaborator.
    pub fn set_sensor_oracle(&mut self, oracle: Box<dyn SensorOracle>) {
        self.sensors = oracle;
    }

    /// Installs an external specializer consulted before the built-in
    /// variant selection.
    pub fn set_code_generator(&mut self, generator: Box<dyn CodeGenerator>) {
        self.dispatcher.set_code_generator(generator);
    }

    // Test hooks: forceable exploration, sensor context, and fusion
    // settings keep the cycle deterministic under test.

    pub fn set_exploration_rate(&mut self, rate: f64) {
        self.feedback.set_exploration_rate(rate);
    }

    /// One-shot sensor override consumed by the next `execute`.
    pub fn override_next_sensor_context(&mut self, ctx: SensorContext) {
        self.profiler.override_next_context(ctx);
    }

    pub fn set_fusion_settings(&mut self, threshold: usize, interval: u64) {
        self.patterns.set_fusion_threshold(threshold);
        self.patterns.set_analysis_interval(interval);
    }

    pub fn reset_pattern_counters(&mut self) {
        self.patterns.reset_counter();
    }

    /// Mutable belief access for calibration and tests.
    pub fn beliefs_mut(&mut self) -> &mut BeliefStore {
        &mut self.beliefs
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
