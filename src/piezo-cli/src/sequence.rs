// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The bring-up sequence: discover, open, wait for settings, poll, enable,
//! set the output and read it back. Polling is always stopped and the
//! session always closed before returning, whatever failed on the way.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use piezo_core::{
    Channel, ChannelListener, ChannelOptions, ChannelState, DeviceFamily, DeviceManager, Health,
    PiezoError, PiezoHal, PiezoResult, PollSnapshot, Session, SessionState, SettleOutcome,
};

#[derive(Debug, Clone)]
pub struct SequenceConfig {
    pub serial: String,
    pub channel: u16,
    /// Output to command once enabled; nothing is written when unset.
    pub voltage: Option<f64>,
    pub family: DeviceFamily,
    pub options: ChannelOptions,
    pub settings_timeout: Duration,
    pub poll_period: Duration,
    pub first_sample_timeout: Duration,
    pub proceed_without_settings: bool,
}

impl SequenceConfig {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            channel: 1,
            voltage: None,
            family: DeviceFamily::benchtop_piezo(),
            options: ChannelOptions::default(),
            settings_timeout: Duration::from_millis(5000),
            poll_period: Duration::from_millis(250),
            first_sample_timeout: Duration::from_millis(1000),
            proceed_without_settings: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub serial: String,
    pub device_id: String,
    pub channel: u16,
    pub device_name: Option<String>,
    pub firmware: Option<String>,
    /// False when the run continued on device defaults.
    pub settings_confirmed: bool,
    pub max_output: f64,
    pub enable: SettleOutcome,
    pub requested_output: Option<f64>,
    pub confirmed_output: Option<f64>,
    pub last_snapshot: PollSnapshot,
    pub poll_period_ms: Option<u64>,
    pub state_transitions: u64,
    pub session_state: SessionState,
}

/// Logs channel events.
struct TracingListener;

impl ChannelListener for TracingListener {
    fn on_state_change(&self, channel: u16, old: ChannelState, new: ChannelState) {
        debug!("Channel {}: {} -> {}", channel, old, new);
    }

    fn on_health_change(&self, channel: u16, _old: Health, new: Health) {
        match new {
            Health::Degraded => warn!("Channel {} status polling degraded", channel),
            Health::Healthy => info!("Channel {} status polling recovered", channel),
        }
    }

    fn on_output_command(&self, channel: u16, value: f64) {
        info!("Channel {} output commanded to {} V", channel, value);
    }
}

pub async fn run_sequence(
    hal: Arc<dyn PiezoHal>,
    config: &SequenceConfig,
) -> PiezoResult<SequenceReport> {
    let mut manager =
        DeviceManager::new(hal, config.family.clone()).with_options(config.options.clone());

    let devices = manager.discover().await?;
    for device in &devices {
        info!("Found device: {}", device);
    }

    let session = manager.open(&config.serial).await?;
    let result = drive_session(&session, config).await;
    session.close(result.is_ok()).await;

    let mut report = result?;
    report.session_state = session.state();
    info!("Session {} closed", session.identity());
    Ok(report)
}

async fn drive_session(session: &Session, config: &SequenceConfig) -> PiezoResult<SequenceReport> {
    let mut channel = session.channel(config.channel).await?;
    channel.register_listener(Arc::new(TracingListener));

    let result = drive_channel(&mut channel, config).await;
    channel.stop_polling().await;
    if let Err(ref e) = result {
        warn!("Aborting sequence on channel {}: {}", channel.index(), e);
    }
    result
}

async fn drive_channel(
    channel: &mut Channel,
    config: &SequenceConfig,
) -> PiezoResult<SequenceReport> {
    let (device_name, firmware) = match channel.device_info().await {
        Ok(info) => {
            info!(
                "Device {}: {} (firmware {})",
                info.serial_number, info.name, info.firmware
            );
            (Some(info.name), Some(info.firmware))
        }
        Err(e) => {
            debug!("No device info: {}", e);
            (None, None)
        }
    };

    let settings_confirmed = match channel.await_settings(config.settings_timeout).await {
        Ok(waited) => {
            info!("Device settings loaded after {} ms", waited.as_millis());
            true
        }
        Err(e @ PiezoError::SettingsTimeout(_)) => {
            if !config.proceed_without_settings {
                return Err(e);
            }
            warn!("{}; continuing with device defaults", e);
            channel.override_settings().await?;
            false
        }
        Err(e) => return Err(e),
    };

    channel.start_polling(config.poll_period)?;
    match channel.wait_for_sample(config.first_sample_timeout).await {
        Some(snap) => debug!(
            "First status sample: enabled {:?}, output {:?}",
            snap.enabled(),
            snap.output()
        ),
        None => warn!(
            "No status sample within {} ms",
            config.first_sample_timeout.as_millis()
        ),
    }

    let enable = channel.enable().await?;
    info!("Channel {} enabled", channel.index());

    let max_output = channel.max_output().unwrap_or_default();
    info!("Maximum output voltage: {} V", max_output);

    let mut confirmed_output = None;
    if let Some(voltage) = config.voltage {
        info!("Setting output voltage to {} V", voltage);
        channel.set_output(voltage).await?;
        let readback = channel.output().await?;
        info!("Output voltage is now {} V", readback);
        confirmed_output = Some(readback);
    }

    Ok(SequenceReport {
        serial: config.serial.clone(),
        device_id: channel.device_id(),
        channel: channel.index(),
        device_name,
        firmware,
        settings_confirmed,
        max_output,
        enable,
        requested_output: config.voltage,
        confirmed_output,
        last_snapshot: channel.snapshot(),
        poll_period_ms: channel.poll_period().map(|p| p.as_millis() as u64),
        state_transitions: channel.transition_count(),
        session_state: SessionState::Open,
    })
}
