// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables for one engine instance. Resolved once at construction; the
/// belief model itself is never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ε of the ε-greedy exploration draw.
    pub exploration_rate: f64,
    /// Relative deviation below which no belief update happens.
    pub quark_threshold: f64,
    /// Learning rate for transform-cost shifts.
    pub eta_transform: f64,
    /// Learning rate for base-cost scaling.
    pub eta_base: f64,
    /// Learning rate for sensitivity scaling.
    pub eta_lambda: f64,
    /// Occurrences a step pair needs before it is fused.
    pub fusion_threshold: usize,
    /// Pattern analysis runs every this many executions.
    pub analysis_interval: u64,
    /// Bounded plan-history ring size.
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            quark_threshold: 0.15,
            eta_transform: 0.1,
            eta_base: 0.05,
            eta_lambda: 0.1,
            fusion_threshold: 10,
            analysis_interval: 5,
            history_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied. Unparseable values
    /// are ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(rate) = env_f64("ST_FLUX_EXPLORATION_RATE") {
            cfg.exploration_rate = rate.clamp(0.0, 1.0);
        }
        if let Some(threshold) = env_f64("ST_FLUX_QUARK_THRESHOLD") {
            cfg.quark_threshold = threshold.max(0.0);
        }
        cfg
    }
}

fn env_f64(name: &str) -> Option<f64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparseable {name}={raw}");
            None
        }
    }
}
