// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel event notification system.
//!
//! Listeners are told about state transitions from the foreground and about
//! health changes from the poller task, so the emitter is shared behind an
//! `Arc` and registration goes through `&self`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::machine::ChannelState;
use super::snapshot::Health;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for components that want to receive channel events.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about.
pub trait ChannelListener: Send + Sync {
    /// Called when the channel state machine transitions.
    fn on_state_change(&self, _channel: u16, _old: ChannelState, _new: ChannelState) {}

    /// Called from the poller task when sampling health changes.
    fn on_health_change(&self, _channel: u16, _old: Health, _new: Health) {}

    /// Called after an output setpoint was sent to the device.
    fn on_output_command(&self, _channel: u16, _value: f64) {}
}

type ListenerList = Vec<(ListenerId, Arc<dyn ChannelListener>)>;

#[derive(Default)]
pub struct ChannelEventEmitter {
    listeners: RwLock<ListenerList>,
}

impl ChannelEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ChannelListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unregister(&self, id: ListenerId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify_state_change(&self, channel: u16, old: ChannelState, new: ChannelState) {
        for listener in self.snapshot() {
            listener.on_state_change(channel, old, new);
        }
    }

    pub fn notify_health_change(&self, channel: u16, old: Health, new: Health) {
        for listener in self.snapshot() {
            listener.on_health_change(channel, old, new);
        }
    }

    pub fn notify_output_command(&self, channel: u16, value: f64) {
        for listener in self.snapshot() {
            listener.on_output_command(channel, value);
        }
    }

    // Listeners run without the lock held so they may register others.
    fn snapshot(&self) -> Vec<Arc<dyn ChannelListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }
}
