// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-crate test doubles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::channel::{ChannelListener, ChannelState, Health, StatusSampler};
use crate::hal::{
    ChannelHandle, Configuration, HalFuture, PiezoHal, RawStatus, SessionHandle,
};

struct StubState {
    devices: Vec<String>,
    fail_enumerate: bool,
    fail_connect: bool,
    fail_disconnect: bool,
    settings_ready_at: Instant,
    reports_enabled: bool,
    stuck_disabled: bool,
    enabled: bool,
    setpoint: f64,
    connects: u32,
    disconnects: Vec<bool>,
    commands: Vec<&'static str>,
}

/// Minimal controller that answers immediately.
pub(crate) struct StubHal {
    state: Mutex<StubState>,
}

impl StubHal {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                devices: vec!["71000123".to_string(), "26000001".to_string()],
                fail_enumerate: false,
                fail_connect: false,
                fail_disconnect: false,
                settings_ready_at: Instant::now(),
                reports_enabled: true,
                stuck_disabled: false,
                enabled: false,
                setpoint: 0.0,
                connects: 0,
                disconnects: Vec::new(),
                commands: Vec::new(),
            }),
        }
    }

    pub(crate) fn set_devices(&self, devices: &[&str]) {
        self.state.lock().unwrap().devices = devices.iter().map(|d| d.to_string()).collect();
    }

    /// Settings report loaded `delay` from now.
    pub(crate) fn set_settings_delay(&self, delay: Duration) {
        self.state.lock().unwrap().settings_ready_at = Instant::now() + delay;
    }

    pub(crate) fn set_fail_enumerate(&self, fail: bool) {
        self.state.lock().unwrap().fail_enumerate = fail;
    }

    pub(crate) fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub(crate) fn set_fail_disconnect(&self, fail: bool) {
        self.state.lock().unwrap().fail_disconnect = fail;
    }

    pub(crate) fn set_reports_enabled(&self, reports: bool) {
        self.state.lock().unwrap().reports_enabled = reports;
    }

    /// Ignore enable commands.
    pub(crate) fn set_stuck_disabled(&self, stuck: bool) {
        self.state.lock().unwrap().stuck_disabled = stuck;
    }

    pub(crate) fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn disconnects(&self) -> Vec<bool> {
        self.state.lock().unwrap().disconnects.clone()
    }

    /// Device-mutating commands received so far.
    pub(crate) fn commands(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().commands.clone()
    }

    pub(crate) fn setpoint(&self) -> f64 {
        self.state.lock().unwrap().setpoint
    }
}

impl PiezoHal for StubHal {
    fn enumerate<'a>(&'a self) -> HalFuture<'a, Vec<String>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.fail_enumerate {
                return Err("bus unavailable".into());
            }
            Ok(state.devices.clone())
        })
    }

    fn connect<'a>(&'a self, _id: &'a str) -> HalFuture<'a, SessionHandle> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_connect {
                return Err("handshake failed".into());
            }
            state.connects += 1;
            Ok(SessionHandle(state.connects as u64))
        })
    }

    fn disconnect<'a>(
        &'a self,
        _session: SessionHandle,
        expected_clean: bool,
    ) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.disconnects.push(expected_clean);
            if state.fail_disconnect {
                return Err("device gone".into());
            }
            Ok(())
        })
    }

    fn channel_handle<'a>(
        &'a self,
        session: SessionHandle,
        index: u16,
    ) -> HalFuture<'a, ChannelHandle> {
        Box::pin(async move { Ok(ChannelHandle(session.0 * 16 + u64::from(index))) })
    }

    fn read_configuration<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, Configuration> {
        Box::pin(async move {
            Ok(Configuration {
                device_id: format!("71000123-{}", channel.0 % 16),
                max_output: 150.0,
            })
        })
    }

    fn is_configuration_loaded<'a>(&'a self, _channel: ChannelHandle) -> HalFuture<'a, bool> {
        Box::pin(async move { Ok(Instant::now() >= self.state.lock().unwrap().settings_ready_at) })
    }

    fn set_enabled<'a>(&'a self, _channel: ChannelHandle, enabled: bool) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.commands.push("set_enabled");
            if !state.stuck_disabled {
                state.enabled = enabled;
            }
            Ok(())
        })
    }

    fn read_status<'a>(&'a self, _channel: ChannelHandle) -> HalFuture<'a, RawStatus> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(RawStatus {
                enabled: state.reports_enabled.then_some(state.enabled),
                output: state.setpoint,
            })
        })
    }

    fn write_setpoint<'a>(&'a self, _channel: ChannelHandle, value: f64) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.commands.push("write_setpoint");
            state.setpoint = value;
            Ok(())
        })
    }

    fn read_setpoint<'a>(&'a self, _channel: ChannelHandle) -> HalFuture<'a, f64> {
        Box::pin(async move { Ok(self.state.lock().unwrap().setpoint) })
    }
}

/// Sampler with a fixed latency and injectable failures.
pub(crate) struct FakeSampler {
    delay: Duration,
    calls: AtomicU32,
    fail_remaining: AtomicU32,
}

impl FakeSampler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(0),
        }
    }

    pub(crate) fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatusSampler for FakeSampler {
    fn sample<'a>(&'a self) -> HalFuture<'a, RawStatus> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let failing = self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                .is_ok();
            if failing {
                return Err("injected sample failure".into());
            }
            Ok(RawStatus {
                enabled: Some(true),
                output: f64::from(n),
            })
        })
    }
}

#[derive(Default)]
pub(crate) struct HealthRecorder {
    changes: Mutex<Vec<Health>>,
}

impl HealthRecorder {
    pub(crate) fn changes(&self) -> Vec<Health> {
        self.changes.lock().unwrap().clone()
    }
}

impl ChannelListener for HealthRecorder {
    fn on_health_change(&self, _channel: u16, _old: Health, new: Health) {
        self.changes.lock().unwrap().push(new);
    }
}

#[derive(Default)]
pub(crate) struct StateRecorder {
    states: Mutex<Vec<ChannelState>>,
}

impl StateRecorder {
    pub(crate) fn states(&self) -> Vec<ChannelState> {
        self.states.lock().unwrap().clone()
    }
}

impl ChannelListener for StateRecorder {
    fn on_state_change(&self, _channel: u16, _old: ChannelState, new: ChannelState) {
        self.states.lock().unwrap().push(new);
    }
}
