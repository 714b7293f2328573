// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Sensor oracle seam.
//!
//! The engine treats environmental telemetry as an external collaborator:
//! it asks for device status bundles by id and recovers locally with
//! tolerant defaults whenever a device is missing or misbehaves.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

pub const POWER_SENSOR: &str = "power_sensor_001";
pub const THERMAL_PROBE: &str = "thermal_probe_001";
pub const NETWORK_MONITOR: &str = "network_monitor_001";
pub const STORAGE_MONITOR: &str = "storage_monitor_001";

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),
    #[error("sensor transport: {0}")]
    Transport(String),
}

/// Environmental context attached to a data profile. All failures during
/// collection degrade to the `Default` values, which sit inside the
/// planner's tolerant band (no cost adjustment).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorContext {
    pub power_draw_watts: f64,
    pub temperature_celsius: f64,
    pub network_latency_ms: f64,
    pub network_bandwidth_mbps: f64,
    pub io_throughput_mbps: f64,
    /// Confidence in the telemetry itself, (0, 1] when healthy.
    pub data_quality: f64,
}

impl Default for SensorContext {
    fn default() -> Self {
        Self {
            power_draw_watts: 65.0,
            temperature_celsius: 55.0,
            network_latency_ms: 20.0,
            network_bandwidth_mbps: 1000.0,
            io_throughput_mbps: 500.0,
            data_quality: 1.0,
        }
    }
}

/// Device-id keyed status source. Implementations return a JSON bundle
/// per device, mirroring the upstream IoT status endpoints.
pub trait SensorOracle: Send {
    fn read_device(&mut self, device_id: &str) -> Result<Value, SensorError>;
}

static DEFAULT_READINGS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    HashMap::from([
        (
            POWER_SENSOR,
            json!({ "power_draw_watts": 65.0, "data_quality": 1.0 }),
        ),
        (THERMAL_PROBE, json!({ "temperature_celsius": 55.0 })),
        (
            NETWORK_MONITOR,
            json!({ "latency_ms": 20.0, "bandwidth_mbps": 1000.0 }),
        ),
        (STORAGE_MONITOR, json!({ "throughput_mbps": 500.0 })),
    ])
});

/// In-process hub that stands in for the external telemetry fleet.
#[derive(Clone, Debug, Default)]
pub struct SimulatedSensorHub {
    overrides: HashMap<String, Value>,
}

impl SimulatedSensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the status bundle a device reports.
    pub fn set_device_status(&mut self, device_id: impl Into<String>, status: Value) {
        self.overrides.insert(device_id.into(), status);
    }
}

impl SensorOracle for SimulatedSensorHub {
    fn read_device(&mut self, device_id: &str) -> Result<Value, SensorError> {
        if let Some(status) = self.overrides.get(device_id) {
            return Ok(status.clone());
        }
        DEFAULT_READINGS
            .get(device_id)
            .cloned()
            .ok_or_else(|| SensorError::DeviceNotFound(device_id.to_string()))
    }
}

fn field(bundle: &Value, key: &str, fallback: f64) -> f64 {
    bundle.get(key).and_then(Value::as_f64).unwrap_or(fallback)
}

/// Polls the oracle for the full context, falling back field by field.
pub fn gather_context(oracle: &mut dyn SensorOracle) -> SensorContext {
    let defaults = SensorContext::default();
    let mut ctx = defaults;

    match oracle.read_device(POWER_SENSOR) {
        Ok(bundle) => {
            ctx.power_draw_watts = field(&bundle, "power_draw_watts", defaults.power_draw_watts);
            ctx.data_quality = field(&bundle, "data_quality", defaults.data_quality);
        }
        Err(err) => warn!("power sensor unavailable, using defaults: {err}"),
    }

    match oracle.read_device(THERMAL_PROBE) {
        Ok(bundle) => {
            ctx.temperature_celsius =
                field(&bundle, "temperature_celsius", defaults.temperature_celsius);
        }
        Err(err) => warn!("thermal probe unavailable, using defaults: {err}"),
    }

    match oracle.read_device(NETWORK_MONITOR) {
        Ok(bundle) => {
            ctx.network_latency_ms = field(&bundle, "latency_ms", defaults.network_latency_ms);
            ctx.network_bandwidth_mbps =
                field(&bundle, "bandwidth_mbps", defaults.network_bandwidth_mbps);
        }
        Err(err) => warn!("network monitor unavailable, using defaults: {err}"),
    }

    match oracle.read_device(STORAGE_MONITOR) {
        Ok(bundle) => {
            ctx.io_throughput_mbps = field(&bundle, "throughput_mbps", defaults.io_throughput_mbps);
        }
        Err(err) => warn!("storage monitor unavailable, using defaults: {err}"),
    }

    ctx
}
