//! ==============================================================================
//! sensors.rs - bundled sensor sources
//! ==============================================================================
//!
//! the real environmental drivers (noise, light, temperature/humidity, gas)
//! live outside this crate and plug in through `SensorSource`. these two
//! ship with the unit:
//!     - MockSensor: fixed readings for bench runs
//!     - CpuTemperatureSensor: board temperature from the kernel thermal zone
//!
//! ==============================================================================

use crate::capabilities::SensorSource;
use crate::domain::{Reading, ReadingValue, Scalar};

use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct MockSensor {
    name: String,
    value: ReadingValue,
}

impl MockSensor {
    pub fn new(name: impl Into<String>, value: impl Into<ReadingValue>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    /// the multi-measurement environment board used on the bench
    pub fn environment() -> Self {
        let fields = [
            ("temperature", 21.0),
            ("humidity", 55.0),
            ("uv_level", 4.0),
            ("luminosity", 350.0),
            ("carbon_monoxide_level", 6.0),
            ("pollution_particles_ppm", 7.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Scalar::Number(v)))
        .collect::<std::collections::BTreeMap<_, _>>();
        Self::new("environment", fields)
    }
}

impl SensorSource for MockSensor {
    fn init(&mut self) -> Result<()> {
        tracing::info!("[SENSOR] Mock sensor '{}' is setting up...", self.name);
        Ok(())
    }

    fn read(&mut self) -> Reading {
        Reading::new(self.name.clone(), self.value.clone())
    }
}

pub const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// board temperature in celsius.
///
/// the thermal zone reports millidegrees (45000 = 45.0°C). a failed read
/// reports 0.0 rather than stalling the cycle.
pub struct CpuTemperatureSensor {
    path: PathBuf,
}

impl CpuTemperatureSensor {
    pub fn new() -> Self {
        Self::with_path(THERMAL_ZONE)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn sample(&self) -> Option<f64> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(|t| t / 1000.0)
    }
}

impl Default for CpuTemperatureSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for CpuTemperatureSensor {
    fn init(&mut self) -> Result<()> {
        std::fs::metadata(&self.path)
            .with_context(|| format!("thermal zone {} not available", self.path.display()))?;
        Ok(())
    }

    fn read(&mut self) -> Reading {
        let celsius = self.sample().unwrap_or_else(|| {
            tracing::warn!("[SENSOR] ⚠ Could not read {}", self.path.display());
            0.0
        });
        Reading::new("cpu_temperature", celsius)
    }
}
