// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for piezo-cli.
//!
//! Config is loaded from the `[piezo-cli]` section of `piezo-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./piezo-rs.toml`
//! 3. `~/.config/piezo-rs/piezo-rs.toml`
//! 4. `/etc/piezo-rs/piezo-rs.toml`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use piezo_app::ConfigFile;
use piezo_backend::SimSettings;
use piezo_core::{ChannelOptions, DeviceFamily, SettlePolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub general: GeneralConfig,
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub behavior: BehaviorConfig,
    /// Settings for the simulated controller backend.
    pub sim: SimSettings,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Which controller and channel to drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Backend name (e.g. "sim")
    pub backend: String,
    /// Serial number used when none is given on the command line
    pub serial: Option<String>,
    /// Serial prefix of the expected controller family
    pub family_prefix: String,
    /// Display name of the expected controller family
    pub family_name: String,
    /// Channels per controller of this family
    pub channels: u16,
    /// Channel to drive (1-based)
    pub channel: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let family = DeviceFamily::benchtop_piezo();
        Self {
            backend: "sim".to_string(),
            serial: None,
            family_prefix: family.prefix,
            family_name: family.name,
            channels: family.channels,
            channel: 1,
        }
    }
}

/// Wait and polling intervals, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long to wait for the device to push its settings
    pub settings_timeout_ms: u64,
    /// Interval between settings-loaded checks
    pub settings_check_ms: u64,
    /// Status polling period
    pub poll_ms: u64,
    /// How long to wait for the first status sample before enabling
    pub first_sample_timeout_ms: u64,
    /// Interval between enable-state checks while settling
    pub settle_check_ms: u64,
    /// Upper bound on the enable/disable settle wait
    pub settle_max_ms: u64,
    /// Settle time assumed when the device cannot report its enable state
    pub settle_min_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settings_timeout_ms: 5000,
            settings_check_ms: 25,
            poll_ms: 250,
            first_sample_timeout_ms: 1000,
            settle_check_ms: 20,
            settle_max_ms: 1000,
            settle_min_ms: 500,
        }
    }
}

/// Degraded-mode decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Continue with device-reported defaults when settings never arrive
    pub proceed_without_settings: bool,
    /// Consecutive failed status samples before polling health degrades
    pub degrade_after: u32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            proceed_without_settings: true,
            degrade_after: 3,
        }
    }
}

impl CliConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.device.backend.trim().is_empty() {
            return Err("[device].backend must not be empty".to_string());
        }
        if self.device.family_prefix.trim().is_empty() {
            return Err("[device].family_prefix must not be empty".to_string());
        }
        if self.device.channels == 0 {
            return Err("[device].channels must be > 0".to_string());
        }
        if self.device.channel == 0 || self.device.channel > self.device.channels {
            return Err(format!(
                "[device].channel must be in range 1..={}",
                self.device.channels
            ));
        }

        let t = &self.timing;
        if t.poll_ms == 0 {
            return Err("[timing].poll_ms must be > 0".to_string());
        }
        if t.settings_check_ms == 0 {
            return Err("[timing].settings_check_ms must be > 0".to_string());
        }
        if t.settle_check_ms == 0 {
            return Err("[timing].settle_check_ms must be > 0".to_string());
        }
        if t.settle_min_ms > t.settle_max_ms {
            return Err("[timing].settle_min_ms must not exceed settle_max_ms".to_string());
        }

        if self.behavior.degrade_after == 0 {
            return Err("[behavior].degrade_after must be > 0".to_string());
        }

        if !self.sim.max_output.is_finite() || self.sim.max_output <= 0.0 {
            return Err("[sim].max_output must be a positive number".to_string());
        }
        Ok(())
    }

    pub fn family(&self) -> DeviceFamily {
        DeviceFamily::new(
            self.device.family_prefix.trim(),
            self.device.family_name.clone(),
            self.device.channels,
        )
    }

    pub fn channel_options(&self) -> ChannelOptions {
        let t = &self.timing;
        ChannelOptions {
            settle: SettlePolicy::new(
                Duration::from_millis(t.settle_check_ms),
                Duration::from_millis(t.settle_max_ms),
                Duration::from_millis(t.settle_min_ms),
            ),
            ready_check_interval: Duration::from_millis(t.settings_check_ms),
            degrade_after: self.behavior.degrade_after,
        }
    }

    /// Generate an example configuration under the `[piezo-cli]` header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "piezo-cli")]
            inner: CliConfig,
        }
        let example = CliConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            device: DeviceConfig {
                serial: Some("71000123".to_string()),
                ..DeviceConfig::default()
            },
            ..CliConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for CliConfig {
    fn section_key() -> &'static str {
        "piezo-cli"
    }

    fn validate(&self) -> Result<(), String> {
        CliConfig::validate(self)
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}
