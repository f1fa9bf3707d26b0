//! Configuration management.
use crate::error::{AppResult, StageError};
use crate::instrument::ScanMode;
use crate::validation;
use config::Config;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub log_level: Option<String>,
    pub stage: StageSettings,
    pub timelapse: TimelapseSettings,
}

/// Serial connection parameters for the stage controller.
///
/// Framing is fixed by the controller: 9600-8-N-1, no flow control. Only the
/// port path varies between installations, so everything else carries a
/// default and the whole block may be omitted from the config file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StageSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM6")
    pub port: String,
    /// Communication speed. The controller talks at 9600 baud.
    pub baud_rate: u32,
    /// Read and write deadline, in milliseconds.
    pub timeout_ms: u64,
    /// Capacity of the response accumulation buffer, in bytes.
    pub buffer_size: usize,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
            buffer_size: 12800,
        }
    }
}

impl StageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parameters for the background timelapse scan task.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimelapseSettings {
    /// Number of scan passes to trigger.
    pub nb_timepoints: u32,
    /// Pause between consecutive scan triggers, in milliseconds.
    pub interval_ms: u64,
    /// Stage speed applied before the first scan.
    pub scan_speed: f64,
    /// Raster or serpentine scan pattern.
    pub scan_mode: ScanMode,
}

impl Default for TimelapseSettings {
    fn default() -> Self {
        Self {
            nb_timepoints: 600,
            interval_ms: 1000,
            scan_speed: 1.0,
            scan_mode: ScanMode::Raster,
        }
    }
}

impl TimelapseSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Fallback port used when neither the config file nor the caller names one.
pub fn default_port() -> &'static str {
    "COM6"
}

impl Settings {
    /// Loads settings from `config/<name>.toml`, falling back to built-in
    /// defaults when the file is absent.
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .build()
            .map_err(StageError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(StageError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks the semantic constraints that deserialization cannot express.
    pub fn validate(&self) -> AppResult<()> {
        validation::is_not_empty(&self.stage.port)
            .map_err(|e| StageError::Configuration(format!("stage.port: {}", e)))?;
        validation::is_in_range(self.stage.baud_rate, 110..=921_600)
            .map_err(|e| StageError::Configuration(format!("stage.baud_rate: {}", e)))?;
        validation::is_in_range(self.stage.timeout_ms, 1..=60_000)
            .map_err(|e| StageError::Configuration(format!("stage.timeout_ms: {}", e)))?;
        validation::is_in_range(self.timelapse.nb_timepoints, 1..=1_000_000)
            .map_err(|e| StageError::Configuration(format!("timelapse.nb_timepoints: {}", e)))?;
        if self.timelapse.scan_speed <= 0.0 {
            return Err(StageError::Configuration(
                "timelapse.scan_speed must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
