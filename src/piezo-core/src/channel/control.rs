// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operable handle for one actuator channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::events::{ChannelEventEmitter, ChannelListener, ListenerId};
use super::gate::SettingsGate;
use super::machine::{ChannelEvent, ChannelState, ChannelStateMachine};
use super::policies::{ChannelOptions, SettleOutcome};
use super::poller::{HalSampler, Poller};
use super::snapshot::PollSnapshot;
use crate::error::{PiezoError, PiezoResult};
use crate::hal::{ChannelHandle, Configuration, DeviceInfo};
use crate::session::SessionLink;

/// One channel of an open session.
///
/// Obtained from [`Session::channel`](crate::Session::channel). Every
/// operation fails with [`PiezoError::SessionClosed`] once the owning
/// session has been closed.
pub struct Channel {
    link: Arc<SessionLink>,
    index: u16,
    handle: ChannelHandle,
    machine: ChannelStateMachine,
    gate: SettingsGate,
    poller: Poller,
    emitter: Arc<ChannelEventEmitter>,
    options: ChannelOptions,
    configuration: Option<Configuration>,
    last_output: Option<f64>,
}

impl Channel {
    pub(crate) fn new(
        link: Arc<SessionLink>,
        index: u16,
        handle: ChannelHandle,
        options: ChannelOptions,
    ) -> Self {
        let emitter = Arc::new(ChannelEventEmitter::new());
        let gate = SettingsGate::new(
            Arc::clone(&link.hal),
            handle,
            options.ready_check_interval,
        );
        let poller = Poller::new(index, options.degrade_after, Arc::clone(&emitter))
            .with_session(link.closed());
        let mut channel = Self {
            link,
            index,
            handle,
            machine: ChannelStateMachine::new(),
            gate,
            poller,
            emitter,
            options,
            configuration: None,
            last_output: None,
        };
        channel.transition(ChannelEvent::Acquired);
        channel
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    /// Device id of this channel, e.g. "71000123-1".
    pub fn device_id(&self) -> String {
        self.link.identity.channel_id(self.index)
    }

    pub fn state(&self) -> ChannelState {
        if self.link.is_open() {
            self.machine.state()
        } else {
            ChannelState::Closed
        }
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.state().is_configured()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Sampling period of the running poll loop.
    pub fn poll_period(&self) -> Option<Duration> {
        self.poller.period()
    }

    /// State changes since the channel was acquired, including the first.
    pub fn transition_count(&self) -> u64 {
        self.machine.transition_count()
    }

    /// Last setpoint successfully sent through [`set_output`](Self::set_output).
    pub fn last_output(&self) -> Option<f64> {
        self.last_output
    }

    pub fn register_listener(&self, listener: Arc<dyn ChannelListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        self.emitter.unregister(id);
    }

    /// Non-blocking check of the device's settings-loaded flag.
    pub async fn is_settings_ready(&mut self) -> PiezoResult<bool> {
        self.check_open()?;
        self.gate.is_ready().await
    }

    /// Wait for the device to push its settings, then load the configuration.
    ///
    /// On timeout the channel stays in SettingsPending; the caller may
    /// continue with [`override_settings`](Self::override_settings).
    pub async fn await_settings(&mut self, timeout: Duration) -> PiezoResult<Duration> {
        self.check_open()?;
        if self.machine.state().is_configured() {
            return Ok(Duration::ZERO);
        }
        let waited = self.gate.await_ready(timeout).await?;
        self.load_configuration().await?;
        self.transition(ChannelEvent::SettingsLoaded);
        Ok(waited)
    }

    /// Continue without confirmed settings, using whatever the device reports.
    pub async fn override_settings(&mut self) -> PiezoResult<()> {
        self.check_open()?;
        let state = self.machine.state();
        if state.is_configured() {
            return Ok(());
        }
        if state != ChannelState::SettingsPending {
            return Err(PiezoError::InvalidState {
                op: "override settings",
                state,
            });
        }
        warn!(
            "Channel {} continuing without confirmed device settings",
            self.index
        );
        self.load_configuration().await?;
        self.transition(ChannelEvent::SettingsOverridden);
        Ok(())
    }

    pub async fn reload_configuration(&mut self) -> PiezoResult<&Configuration> {
        self.check_open()?;
        let state = self.machine.state();
        if !state.is_configured() {
            return Err(PiezoError::InvalidState {
                op: "reload configuration",
                state,
            });
        }
        self.load_configuration().await
    }

    async fn load_configuration(&mut self) -> PiezoResult<&Configuration> {
        let config = self
            .link
            .hal
            .read_configuration(self.handle)
            .await
            .map_err(|e| PiezoError::device("read_configuration", e))?;
        info!(
            "Channel {} configuration: device {}, max output {} V",
            self.index, config.device_id, config.max_output
        );
        Ok(self.configuration.insert(config))
    }

    pub fn max_output(&self) -> Option<f64> {
        self.configuration.as_ref().map(|c| c.max_output)
    }

    pub fn start_polling(&mut self, period: Duration) -> PiezoResult<()> {
        self.check_open()?;
        let sampler = Arc::new(HalSampler::new(Arc::clone(&self.link.hal), self.handle));
        self.poller.start(sampler, period)
    }

    /// Stop background sampling. Safe to call when not polling.
    pub async fn stop_polling(&mut self) {
        self.poller.stop().await;
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.poller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.poller.subscribe()
    }

    pub async fn wait_for_sample(&self, timeout: Duration) -> Option<PollSnapshot> {
        self.poller.wait_for_sample(timeout).await
    }

    /// Enable the output stage and wait for the device to acknowledge it.
    pub async fn enable(&mut self) -> PiezoResult<SettleOutcome> {
        self.check_open()?;
        let state = self.machine.state();
        if !state.can_enable() {
            return Err(PiezoError::InvalidState { op: "enable", state });
        }
        self.link
            .hal
            .set_enabled(self.handle, true)
            .await
            .map_err(|e| PiezoError::device("set_enabled", e))?;
        self.transition(ChannelEvent::Enabled);

        let outcome = self.settle(true).await;
        self.log_settle("enable", outcome);
        Ok(outcome)
    }

    /// Disable the output stage. The channel returns to Ready once settled.
    pub async fn disable(&mut self) -> PiezoResult<SettleOutcome> {
        self.check_open()?;
        let state = self.machine.state();
        if !state.is_enabled() {
            return Err(PiezoError::InvalidState {
                op: "disable",
                state,
            });
        }
        self.link
            .hal
            .set_enabled(self.handle, false)
            .await
            .map_err(|e| PiezoError::device("set_enabled", e))?;
        self.transition(ChannelEvent::Disabled);

        let outcome = self.settle(false).await;
        self.log_settle("disable", outcome);
        self.transition(ChannelEvent::Settled);
        Ok(outcome)
    }

    /// Command a new output voltage.
    ///
    /// Requires Enabled and `0 <= value <= max_output`; nothing is sent to
    /// the device otherwise.
    pub async fn set_output(&mut self, value: f64) -> PiezoResult<()> {
        self.check_open()?;
        let state = self.machine.state();
        if !state.is_enabled() {
            return Err(PiezoError::NotEnabled(state));
        }
        let max = self.max_output().ok_or(PiezoError::InvalidState {
            op: "set output",
            state,
        })?;
        if !value.is_finite() || value < 0.0 || value > max {
            return Err(PiezoError::OutOfRange { value, max });
        }

        self.link
            .hal
            .write_setpoint(self.handle, value)
            .await
            .map_err(|e| PiezoError::device("write_setpoint", e))?;
        self.last_output = Some(value);
        debug!("Channel {} output set to {} V", self.index, value);
        self.emitter.notify_output_command(self.index, value);
        Ok(())
    }

    /// Read the output setpoint directly from the device.
    pub async fn output(&mut self) -> PiezoResult<f64> {
        self.check_open()?;
        self.link
            .hal
            .read_setpoint(self.handle)
            .await
            .map_err(|e| PiezoError::device("read_setpoint", e))
    }

    pub async fn device_info(&mut self) -> PiezoResult<DeviceInfo> {
        self.check_open()?;
        self.link
            .hal
            .device_info(self.handle)
            .await
            .map_err(|e| PiezoError::device("device_info", e))
    }

    fn check_open(&mut self) -> PiezoResult<()> {
        if self.link.is_open() {
            return Ok(());
        }
        self.transition(ChannelEvent::SessionClosed);
        Err(PiezoError::SessionClosed)
    }

    fn transition(&mut self, event: ChannelEvent) -> bool {
        let old = self.machine.state();
        if !self.machine.process_event(event) {
            return false;
        }
        let new = self.machine.state();
        debug!("Channel {} state {} -> {}", self.index, old, new);
        self.emitter.notify_state_change(self.index, old, new);
        true
    }

    /// Wait for the reported enabled flag to match `enabled`.
    async fn settle(&self, enabled: bool) -> SettleOutcome {
        let policy = &self.options.settle;
        let start = Instant::now();
        loop {
            match self.link.hal.read_status(self.handle).await {
                Ok(status) => match status.enabled {
                    Some(flag) if flag == enabled => {
                        return SettleOutcome::Acknowledged(start.elapsed());
                    }
                    Some(_) => {}
                    None => {
                        time::sleep(policy.min_settle).await;
                        return SettleOutcome::Assumed(start.elapsed());
                    }
                },
                Err(e) => warn!("Channel {} status read while settling: {}", self.index, e),
            }
            if start.elapsed() >= policy.max_wait {
                return SettleOutcome::TimedOut(start.elapsed());
            }
            time::sleep(policy.check_interval).await;
        }
    }

    fn log_settle(&self, op: &str, outcome: SettleOutcome) {
        match outcome {
            SettleOutcome::Acknowledged(d) => {
                debug!("Channel {} {} acknowledged after {:?}", self.index, op, d)
            }
            SettleOutcome::Assumed(d) => info!(
                "Channel {} cannot report enable state; assumed {} after {:?}",
                self.index, op, d
            ),
            SettleOutcome::TimedOut(d) => warn!(
                "Channel {} {} not confirmed by device after {:?}",
                self.index, op, d
            ),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.link.release(self.index);
    }
}
