// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! The mutable cost model every other component reads and updates.
//!
//! Three string-keyed tables: base operational cost (cost floor of an
//! operation under neutral data), transform cost (pure representation
//! changes such as an FFT or a JIT compile), and sensitivity lambdas
//! (coefficients of the data-dependent cost terms).

use std::collections::HashMap;

/// Costs never drop below this after an update.
pub const COST_FLOOR: f64 = 1.0;

#[derive(Clone, Debug, Default)]
pub struct BeliefStore {
    base_cost: HashMap<String, f64>,
    transform_cost: HashMap<String, f64>,
    sensitivity: HashMap<String, f64>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_beliefs() -> Self {
        let mut store = Self::new();
        store.install_default_beliefs();
        store
    }

    /// Seeds the canonical entries for the known ops. Values are the
    /// calibration baseline for a generic CPU substrate.
    pub fn install_default_beliefs(&mut self) {
        self.base_cost.insert("CONV_DIRECT".into(), 200.0);
        self.base_cost.insert("ELEMENT_WISE_MULTIPLY".into(), 50.0);
        self.base_cost.insert("GEMM_NAIVE".into(), 500.0);
        self.base_cost.insert("GEMM_FLUX_ADAPTIVE".into(), 450.0);
        self.base_cost.insert("SAXPY_STANDARD".into(), 100.0);
        self.base_cost.insert("EXECUTE_JIT_SAXPY".into(), 70.0);

        self.transform_cost.insert("FFT_FORWARD".into(), 300.0);
        self.transform_cost.insert("FFT_INVERSE".into(), 280.0);
        self.transform_cost.insert("JIT_COMPILE_SAXPY".into(), 1000.0);

        self.sensitivity.insert("lambda_Conv_Amp".into(), 1.0);
        self.sensitivity.insert("lambda_Conv_Freq".into(), 0.8);
        self.sensitivity.insert("lambda_Sparsity".into(), 150.0);
        self.sensitivity.insert("lambda_SAXPY_generic".into(), 0.5);

        self.sensitivity
            .insert("SAXPY_STANDARD_lambda_hw_combined".into(), 0.1);
        self.sensitivity
            .insert("EXECUTE_JIT_SAXPY_lambda_hw_combined".into(), 0.05);
        self.sensitivity
            .insert("GEMM_NAIVE_lambda_hw_combined".into(), 0.2);
        self.sensitivity
            .insert("GEMM_FLUX_ADAPTIVE_lambda_hw_combined".into(), 0.15);
        self.sensitivity
            .insert("CONV_DIRECT_lambda_hw_combined".into(), 0.25);
    }

    /// Absent entries read as zero: a cost dimension that is not known
    /// does not contribute to a prediction.
    pub fn base(&self, op: &str) -> f64 {
        self.base_cost.get(op).copied().unwrap_or(0.0)
    }

    pub fn transform(&self, op: &str) -> f64 {
        self.transform_cost.get(op).copied().unwrap_or(0.0)
    }

    pub fn sensitivity(&self, key: &str) -> f64 {
        self.sensitivity.get(key).copied().unwrap_or(0.0)
    }

    pub fn has_base(&self, op: &str) -> bool {
        self.base_cost.contains_key(op)
    }

    pub fn has_transform(&self, op: &str) -> bool {
        self.transform_cost.contains_key(op)
    }

    pub fn has_sensitivity(&self, key: &str) -> bool {
        self.sensitivity.contains_key(key)
    }

    pub fn set_base(&mut self, op: impl Into<String>, value: f64) {
        self.base_cost.insert(op.into(), value.max(COST_FLOOR));
    }

    pub fn set_transform(&mut self, op: impl Into<String>, value: f64) {
        self.transform_cost.insert(op.into(), value.max(COST_FLOOR));
    }

    pub fn set_sensitivity(&mut self, key: impl Into<String>, value: f64) {
        self.sensitivity.insert(key.into(), value.max(0.0));
    }

    /// Scales an existing base cost by `1 + delta_relative`, clamped to
    /// the floor. Returns false when the op is unknown.
    pub fn update_base(&mut self, op: &str, delta_relative: f64) -> bool {
        match self.base_cost.get_mut(op) {
            Some(cost) => {
                *cost = (*cost * (1.0 + delta_relative)).max(COST_FLOOR);
                true
            }
            None => false,
        }
    }

    /// Shifts an existing transform cost by an absolute delta, clamped to
    /// the floor. Returns false when the op is unknown.
    pub fn update_transform(&mut self, op: &str, delta_absolute: f64) -> bool {
        match self.transform_cost.get_mut(op) {
            Some(cost) => {
                *cost = (*cost + delta_absolute).max(COST_FLOOR);
                true
            }
            None => false,
        }
    }

    /// Multiplies an existing sensitivity, clamped non-negative. Returns
    /// false when the key is unknown.
    pub fn update_sensitivity(&mut self, key: &str, multiplier: f64) -> bool {
        match self.sensitivity.get_mut(key) {
            Some(lambda) => {
                *lambda = (*lambda * multiplier).max(0.0);
                true
            }
            None => false,
        }
    }

    pub fn iter_base(&self) -> impl Iterator<Item = (&str, f64)> {
        self.base_cost.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn iter_transform(&self) -> impl Iterator<Item = (&str, f64)> {
        self.transform_cost.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn iter_sensitivity(&self) -> impl Iterator<Item = (&str, f64)> {
        self.sensitivity.iter().map(|(k, &v)| (k.as_str(), v))
    }
}
