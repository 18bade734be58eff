//! ==============================================================================
//! config.rs - Unit Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `bikesense.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: acquisition period.
//!     - StorageConfig / UploadConfig: retention window and upload policy.
//!     - wifi (list of [[wifi]] networks) / api / identity: optional; all
//!       three are needed to upload.
//!     - GpsConfig / SensorsConfig / LedConfig: which drivers to compose.
//!     - LoggingConfig: log level and whether to echo every record.
//!
//! ==============================================================================

use crate::network::WifiCredentials;
use crate::runtime::{DEFAULT_LED_PIN, DEFAULT_UPLOAD_THRESHOLD};
use crate::storage::DEFAULT_CAPACITY;
use crate::upload::ApiConfig;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BikeSenseConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub wifi: Vec<WifiCredentials>,
    pub api: Option<ApiConfig>,
    pub identity: Option<IdentityConfig>,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub led: LedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl PollingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub threshold: usize,
    pub timeout_ms: u64,
    pub batch_size: Option<usize>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { threshold: DEFAULT_UPLOAD_THRESHOLD, timeout_ms: 5000, batch_size: None }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct IdentityConfig {
    pub bike_id: u32,
    pub unit_id: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpsKind {
    #[default]
    Mock,
    Nmea,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GpsConfig {
    pub source: GpsKind,
    pub device: String,
    pub baud: u32,
    pub replay_file: Option<PathBuf>,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            source: GpsKind::Mock,
            device: "/dev/serial0".to_string(),
            baud: 9600,
            replay_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    pub mock: bool,
    pub cpu_temperature: bool,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { mock: true, cpu_temperature: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedConfig {
    pub gpio_pin: u8,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self { gpio_pin: DEFAULT_LED_PIN }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl BikeSenseConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: BikeSenseConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    ///
    /// runs before logging is set up, so it reports with eprintln.
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("bikesense.toml"),
            PathBuf::from("..").join("config").join("bikesense.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        eprintln!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        eprintln!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        eprintln!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        tracing::info!("[CONFIG] Poll interval: {}ms", self.polling.interval_ms);
        tracing::info!("[CONFIG] Storage window: {} records", self.storage.capacity);
        tracing::info!(
            "[CONFIG] Upload after {} records, timeout {}ms",
            self.upload.threshold,
            self.upload.timeout_ms
        );
        tracing::info!("[CONFIG] GPS: {:?}", self.gps.source);
        if self.wifi.is_empty() {
            tracing::info!("[CONFIG] WiFi: not configured");
        } else {
            let ssids: Vec<&str> = self.wifi.iter().map(|w| w.ssid.as_str()).collect();
            tracing::info!("[CONFIG] WiFi: {}", ssids.join(", "));
        }
        match &self.api {
            Some(api) => tracing::info!("[CONFIG] API: {} (token ****)", api.endpoint),
            None => tracing::info!("[CONFIG] API: not configured"),
        }
        if let Some(id) = &self.identity {
            tracing::info!("[CONFIG] Bike {} / unit {}", id.bike_id, id.unit_id);
        }
    }
}
