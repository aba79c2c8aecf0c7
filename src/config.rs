//! Configuration management for the pedal bridge
//!
//! Handles loading and validation of the YAML configuration file. Every
//! field has a default, so a missing file or a partial file is fine.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub osc: OscConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

/// Controller port configuration, matched by case-insensitive substring
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_port_pattern")]
    pub input_port: String,
    #[serde(default = "default_port_pattern")]
    pub output_port: String,
}

/// Looper connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OscConfig {
    #[serde(default = "default_looper_host")]
    pub looper_host: String,
    #[serde(default = "default_looper_port")]
    pub looper_port: u16,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Namespace of the diagnostic requests (`/<prefix>/ping`, ...)
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Timing of the bridge loop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_heartbeat_budget")]
    pub heartbeat_budget: i32,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: i32,
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; console only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Emit JSON lines instead of the compact text format
    #[serde(default)]
    pub json: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: default_port_pattern(),
            output_port: default_port_pattern(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            looper_host: default_looper_host(),
            looper_port: default_looper_port(),
            listen_port: default_listen_port(),
            prefix: default_prefix(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            heartbeat_budget: default_heartbeat_budget(),
            stale_threshold: default_stale_threshold(),
        }
    }
}

/// Values given on the command line, overriding the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub midi_in: Option<String>,
    pub midi_out: Option<String>,
    pub osc_in: Option<u16>,
    pub osc_out: Option<u16>,
}

impl AppConfig {
    /// True when a configuration file exists at `path`
    pub async fn is_present(path: impl AsRef<Path>) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !Self::is_present(path).await {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.midi_in {
            self.midi.input_port = port;
        }
        if let Some(port) = overrides.midi_out {
            self.midi.output_port = port;
        }
        if let Some(port) = overrides.osc_in {
            self.osc.listen_port = port;
        }
        if let Some(port) = overrides.osc_out {
            self.osc.looper_port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge.tick_ms == 0 {
            bail!("bridge.tick_ms must be positive");
        }
        if self.bridge.heartbeat_budget <= 0 {
            bail!("bridge.heartbeat_budget must be positive");
        }
        if self.bridge.stale_threshold >= self.bridge.heartbeat_budget {
            bail!(
                "bridge.stale_threshold ({}) must be below heartbeat_budget ({})",
                self.bridge.stale_threshold,
                self.bridge.heartbeat_budget
            );
        }
        if self.osc.prefix.is_empty() || self.osc.prefix.contains('/') {
            bail!("osc.prefix must be a single non-empty path segment");
        }
        Ok(())
    }
}

// Default value functions
fn default_port_pattern() -> String { "FCB1010".to_string() }
fn default_looper_host() -> String { "127.0.0.1".to_string() }
fn default_looper_port() -> u16 { 9951 }
fn default_listen_port() -> u16 { 9000 }
fn default_prefix() -> String { "loop4r".to_string() }
fn default_tick_ms() -> u64 { 200 }
fn default_heartbeat_budget() -> i32 { 5 }
fn default_stale_threshold() -> i32 { -5 }
