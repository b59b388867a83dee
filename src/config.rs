use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::audio::{GraphSettings, SchedulerSettings, VolumeState, SAMPLE_RATE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Output device name (None for the host default)
    pub output_device: Option<String>,
    pub safety_margin_ms: u64,
    pub min_latency_ms: u64,
    /// Look-ahead cap; None lets latency grow without bound
    pub max_horizon_ms: Option<u64>,
    pub gain_time_constant_ms: f32,
    pub lowpass_cutoff_hz: f32,
    pub lowpass_q: f32,
    pub master_gain: f32,
    pub channel_gain: [f32; 2],
    /// Buffered events per subscriber before the slowest one starts lagging
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let volume = VolumeState::default();
        Self {
            output_device: None,
            safety_margin_ms: 30,
            min_latency_ms: 20,
            max_horizon_ms: Some(500),
            gain_time_constant_ms: 10.0,
            lowpass_cutoff_hz: 7000.0,
            lowpass_q: 0.7,
            master_gain: volume.master_gain,
            channel_gain: volume.channel_gain,
            event_capacity: 64,
        }
    }
}

impl MonitorConfig {
    /// Platform config location, e.g. `~/.config/dualmic-monitor/monitor.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dualmic-monitor")
            .join("monitor.json")
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Load from `default_path()`, falling back to defaults when the file is absent
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(&path)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nyquist = SAMPLE_RATE as f32 / 2.0;
        if !(self.lowpass_cutoff_hz > 0.0 && self.lowpass_cutoff_hz < nyquist) {
            return Err(ConfigError::Invalid(format!(
                "lowpass_cutoff_hz must be in (0, {}), got {}",
                nyquist, self.lowpass_cutoff_hz
            )));
        }
        if !(self.lowpass_q > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "lowpass_q must be positive, got {}",
                self.lowpass_q
            )));
        }
        if !(self.gain_time_constant_ms >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gain_time_constant_ms must not be negative, got {}",
                self.gain_time_constant_ms
            )));
        }
        if self.min_latency_ms > self.safety_margin_ms {
            return Err(ConfigError::Invalid(format!(
                "min_latency_ms ({}) exceeds safety_margin_ms ({})",
                self.min_latency_ms, self.safety_margin_ms
            )));
        }
        if let Some(horizon) = self.max_horizon_ms {
            if horizon <= self.safety_margin_ms {
                return Err(ConfigError::Invalid(format!(
                    "max_horizon_ms ({}) must exceed safety_margin_ms ({})",
                    horizon, self.safety_margin_ms
                )));
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            safety_margin: Duration::from_millis(self.safety_margin_ms),
            min_latency: Duration::from_millis(self.min_latency_ms),
            max_horizon: self.max_horizon_ms.map(Duration::from_millis),
        }
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            lowpass_cutoff_hz: self.lowpass_cutoff_hz,
            lowpass_q: self.lowpass_q,
            gain_time_constant: Duration::from_micros((self.gain_time_constant_ms * 1000.0).round() as u64),
        }
    }

    /// Initial gains; out-of-range values are clamped by the volume controller
    pub fn volume(&self) -> VolumeState {
        VolumeState {
            master_gain: self.master_gain,
            channel_gain: self.channel_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler_settings(), SchedulerSettings::default());
        assert_eq!(config.graph_settings(), GraphSettings::default());
        assert_eq!(config.volume(), VolumeState::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = MonitorConfig::from_json_str(
            r#"{ "output_device": "USB Speakers", "master_gain": 1.0, "max_horizon_ms": null }"#,
        )
        .unwrap();
        assert_eq!(config.output_device.as_deref(), Some("USB Speakers"));
        assert_eq!(config.master_gain, 1.0);
        assert_eq!(config.max_horizon_ms, None);
        assert_eq!(config.min_latency_ms, 20);
    }

    #[test]
    fn test_rejects_cutoff_above_nyquist() {
        let err = MonitorConfig::from_json_str(r#"{ "lowpass_cutoff_hz": 8000.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_latency_above_margin() {
        let err = MonitorConfig::from_json_str(r#"{ "min_latency_ms": 50 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = MonitorConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = MonitorConfig::load(Path::new("/nonexistent/dualmic/monitor.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!("dualmic-config-{}.json", std::process::id()));
        let config = MonitorConfig {
            safety_margin_ms: 40,
            ..MonitorConfig::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
