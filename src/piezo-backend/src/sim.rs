// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated benchtop piezo controller bus for development and testing.
//!
//! Holds controller state in memory. Settings arrive a configurable delay
//! after connect and the enabled flag follows a command after another delay,
//! which is enough to exercise the readiness gate and settle waits without
//! hardware. Output values are stored as sent; range checks belong to the
//! caller.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use piezo_core::hal::HalFuture;
use piezo_core::{
    ChannelHandle, Configuration, DeviceInfo, DynResult, PiezoHal, RawStatus, SessionHandle,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Serial numbers present on the simulated bus.
    pub devices: Vec<String>,
    /// Channels per controller.
    pub channels: u16,
    /// Maximum output voltage reported in the configuration.
    pub max_output: f64,
    /// Delay between connect and settings being reported as loaded.
    pub settings_delay_ms: u64,
    /// Delay between an enable/disable command and the flag following it.
    pub enable_delay_ms: u64,
    /// Whether status reads include the enabled flag.
    pub reports_enabled: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            devices: vec!["71000123".to_string()],
            channels: 3,
            max_output: 150.0,
            settings_delay_ms: 200,
            enable_delay_ms: 100,
            reports_enabled: true,
        }
    }
}

/// Command counts, for assertions in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub enumerations: u32,
    pub connects: u32,
    pub disconnects: u32,
    pub set_enabled: u32,
    pub status_reads: u32,
    pub setpoint_writes: u32,
    pub setpoint_reads: u32,
}

#[derive(Debug, Default)]
struct SimChannel {
    enabled: bool,
    pending: Option<(bool, Instant)>,
    setpoint: f64,
}

impl SimChannel {
    fn enabled_at(&mut self, now: Instant) -> bool {
        if let Some((value, at)) = self.pending {
            if now >= at {
                self.enabled = value;
                self.pending = None;
            }
        }
        self.enabled
    }
}

struct SimSession {
    serial: String,
    connected_at: Instant,
}

struct SimState {
    settings: SimSettings,
    sessions: HashMap<u64, SimSession>,
    handles: HashMap<u64, (u64, u16)>,
    // keyed by (serial, index); survives reconnects like the real hardware
    channels: HashMap<(String, u16), SimChannel>,
    next_id: u64,
    counters: SimCounters,
    fail_enumerate: bool,
    fail_connect: bool,
    fail_status_reads: u32,
    last_disconnect_clean: Option<bool>,
}

impl SimState {
    fn session(&self, session: SessionHandle) -> DynResult<&SimSession> {
        self.sessions
            .get(&session.0)
            .ok_or_else(|| format!("session {} is not connected", session.0).into())
    }

    /// Resolve a channel handle to its serial, index and session.
    fn resolve(&self, channel: ChannelHandle) -> DynResult<(String, u16, &SimSession)> {
        let (session_id, index) = self
            .handles
            .get(&channel.0)
            .copied()
            .ok_or_else(|| format!("unknown channel handle {}", channel.0))?;
        let session = self
            .sessions
            .get(&session_id)
            .ok_or("channel handle belongs to a closed session")?;
        Ok((session.serial.clone(), index, session))
    }

    fn channel_mut(&mut self, channel: ChannelHandle) -> DynResult<&mut SimChannel> {
        let (serial, index, _) = self.resolve(channel)?;
        Ok(self.channels.entry((serial, index)).or_default())
    }
}

/// In-memory controller bus implementing [`PiezoHal`].
pub struct SimBus {
    state: Mutex<SimState>,
}

impl SimBus {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            state: Mutex::new(SimState {
                settings,
                sessions: HashMap::new(),
                handles: HashMap::new(),
                channels: HashMap::new(),
                next_id: 1,
                counters: SimCounters::default(),
                fail_enumerate: false,
                fail_connect: false,
                fail_status_reads: 0,
                last_disconnect_clean: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn counters(&self) -> SimCounters {
        self.lock().counters.clone()
    }

    pub fn set_fail_enumerate(&self, fail: bool) {
        self.lock().fail_enumerate = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Make the next `n` status reads fail.
    pub fn fail_next_status_reads(&self, n: u32) {
        self.lock().fail_status_reads = n;
    }

    pub fn is_connected(&self, serial: &str) -> bool {
        self.lock().sessions.values().any(|s| s.serial == serial)
    }

    pub fn last_disconnect_clean(&self) -> Option<bool> {
        self.lock().last_disconnect_clean
    }

    /// Stored setpoint of one channel, 0.0 if never written.
    pub fn setpoint(&self, serial: &str, index: u16) -> f64 {
        self.lock()
            .channels
            .get(&(serial.to_string(), index))
            .map(|c| c.setpoint)
            .unwrap_or(0.0)
    }
}

impl PiezoHal for SimBus {
    fn enumerate<'a>(&'a self) -> HalFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.counters.enumerations += 1;
            if state.fail_enumerate {
                return Err("simulated bus unavailable".into());
            }
            Ok(state.settings.devices.clone())
        })
    }

    fn connect<'a>(&'a self, id: &'a str) -> HalFuture<'a, SessionHandle> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail_connect {
                return Err(format!("simulated handshake with {} failed", id).into());
            }
            if !state.settings.devices.iter().any(|d| d == id) {
                return Err(format!("no device {} on bus", id).into());
            }
            if state.sessions.values().any(|s| s.serial == id) {
                return Err(format!("device {} is already open", id).into());
            }
            let session_id = state.next_id;
            state.next_id += 1;
            state.sessions.insert(
                session_id,
                SimSession {
                    serial: id.to_string(),
                    connected_at: Instant::now(),
                },
            );
            state.counters.connects += 1;
            debug!("sim: connected {} as session {}", id, session_id);
            Ok(SessionHandle(session_id))
        })
    }

    fn disconnect<'a>(
        &'a self,
        session: SessionHandle,
        expected_clean: bool,
    ) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            let removed = state
                .sessions
                .remove(&session.0)
                .ok_or_else(|| format!("session {} is not connected", session.0))?;
            state.handles.retain(|_, (sid, _)| *sid != session.0);
            state.counters.disconnects += 1;
            state.last_disconnect_clean = Some(expected_clean);
            debug!("sim: disconnected {}", removed.serial);
            Ok(())
        })
    }

    fn channel_handle<'a>(
        &'a self,
        session: SessionHandle,
        index: u16,
    ) -> HalFuture<'a, ChannelHandle> {
        Box::pin(async move {
            let mut state = self.lock();
            state.session(session)?;
            if index == 0 || index > state.settings.channels {
                return Err(format!("controller has no channel {}", index).into());
            }
            let id = state.next_id;
            state.next_id += 1;
            state.handles.insert(id, (session.0, index));
            Ok(ChannelHandle(id))
        })
    }

    fn read_configuration<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, Configuration> {
        Box::pin(async move {
            let state = self.lock();
            let (serial, index, _) = state.resolve(channel)?;
            Ok(Configuration {
                device_id: format!("{}-{}", serial, index),
                max_output: state.settings.max_output,
            })
        })
    }

    fn is_configuration_loaded<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, bool> {
        Box::pin(async move {
            let state = self.lock();
            let (_, _, session) = state.resolve(channel)?;
            let delay = Duration::from_millis(state.settings.settings_delay_ms);
            Ok(session.connected_at.elapsed() >= delay)
        })
    }

    fn set_enabled<'a>(&'a self, channel: ChannelHandle, enabled: bool) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            let delay = Duration::from_millis(state.settings.enable_delay_ms);
            let ch = state.channel_mut(channel)?;
            ch.pending = Some((enabled, Instant::now() + delay));
            state.counters.set_enabled += 1;
            trace!("sim: channel handle {} set_enabled({})", channel.0, enabled);
            Ok(())
        })
    }

    fn read_status<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, RawStatus> {
        Box::pin(async move {
            let mut state = self.lock();
            state.counters.status_reads += 1;
            if state.fail_status_reads > 0 {
                state.fail_status_reads -= 1;
                return Err("simulated status read timeout".into());
            }
            let reports = state.settings.reports_enabled;
            let ch = state.channel_mut(channel)?;
            let enabled = ch.enabled_at(Instant::now());
            Ok(RawStatus {
                enabled: reports.then_some(enabled),
                output: if enabled { ch.setpoint } else { 0.0 },
            })
        })
    }

    fn write_setpoint<'a>(&'a self, channel: ChannelHandle, value: f64) -> HalFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.channel_mut(channel)?.setpoint = value;
            state.counters.setpoint_writes += 1;
            trace!("sim: channel handle {} setpoint {} V", channel.0, value);
            Ok(())
        })
    }

    fn read_setpoint<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, f64> {
        Box::pin(async move {
            let mut state = self.lock();
            let value = state.channel_mut(channel)?.setpoint;
            state.counters.setpoint_reads += 1;
            Ok(value)
        })
    }

    fn device_info<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, DeviceInfo> {
        Box::pin(async move {
            let state = self.lock();
            let (serial, _, _) = state.resolve(channel)?;
            Ok(DeviceInfo {
                serial_number: serial,
                name: "Simulated Benchtop Piezo".to_string(),
                firmware: "sim-1.0".to_string(),
            })
        })
    }
}
