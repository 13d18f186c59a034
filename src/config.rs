//! Configuration management for the panel bridge.
//!
//! Handles loading, saving, and validating configuration from JSON files.

use crate::display::expander::BacklightConfig;
use crate::display::memory::{DEFAULT_EXTERNAL_BYTES, DEFAULT_INTERNAL_BYTES};
use crate::display::{DisplayConfig, HEIGHT, WIDTH};
use crate::render::RenderConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rgb-panel-bridge/config.json";

/// Smallest render thread stack accepted
const MIN_TASK_STACK_BYTES: usize = 64 * 1024;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Memory pool budgets in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub internal_bytes: usize,
    pub external_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            internal_bytes: DEFAULT_INTERNAL_BYTES,
            external_bytes: DEFAULT_EXTERNAL_BYTES,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Panel geometry and timing
    pub display: DisplayConfig,

    pub memory: MemoryConfig,

    /// Render task and draw buffers
    pub render: RenderConfig,

    /// I/O expander driving backlight and reset lines
    pub backlight: BacklightConfig,

    /// Seconds between render statistics log lines
    pub status_interval_secs: u64,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            memory: MemoryConfig::default(),
            render: RenderConfig::default(),
            backlight: BacklightConfig::default(),
            status_interval_secs: 10,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file atomically
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        // Write to temporary file first
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;

        // Atomic rename - the target holds either the old or the new config
        std::fs::rename(&tmp_path, path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = std::fs::remove_file(&tmp_path);
            ConfigError::ReadError(e)
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.width != WIDTH || self.display.height != HEIGHT {
            return Err(ConfigError::ValidationError(format!(
                "display must be {}x{}, got {}x{}",
                WIDTH, HEIGHT, self.display.width, self.display.height
            )));
        }

        crate::display::rgb_panel::check_timing(&self.display)
            .map_err(ConfigError::ValidationError)?;

        if self.render.lines_per_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "render.lines_per_buffer must be at least 1".to_string(),
            ));
        }

        if self.render.task_stack_bytes < MIN_TASK_STACK_BYTES {
            return Err(ConfigError::ValidationError(format!(
                "render.task_stack_bytes must be at least {}",
                MIN_TASK_STACK_BYTES
            )));
        }

        if self.render.timer_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "render.timer_period_ms must be greater than 0".to_string(),
            ));
        }

        if self.status_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "status_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.backlight.address > 0x7f {
            return Err(ConfigError::ValidationError(format!(
                "backlight.address 0x{:02x} is not a 7-bit I2C address",
                self.backlight.address
            )));
        }

        Ok(())
    }
}
