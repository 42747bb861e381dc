// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel state machine for lifecycle management.
//!
//! Transitions are explicit so that commands can be validated against the
//! current state before anything is sent to the device.

use std::fmt;

use serde::Serialize;

/// Events that can trigger state transitions in the channel state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel handle obtained from the session
    Acquired,
    /// Device reported its settings as loaded
    SettingsLoaded,
    /// Caller chose to continue without confirmed settings
    SettingsOverridden,
    /// Enable command issued
    Enabled,
    /// Disable command issued
    Disabled,
    /// Disable settle interval elapsed
    Settled,
    /// Owning session closed
    SessionClosed,
}

/// The current state of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ChannelState {
    #[default]
    Created,
    SettingsPending,
    Ready,
    Enabled,
    /// Transient; returns to Ready once the disable has settled.
    Disabled,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::SettingsPending => write!(f, "SettingsPending"),
            Self::Ready => write!(f, "Ready"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ChannelState {
    pub fn can_enable(&self) -> bool {
        matches!(self, Self::Ready | Self::Disabled)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Settings have been loaded or overridden.
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Ready | Self::Enabled | Self::Disabled)
    }
}

#[derive(Debug, Clone)]
pub struct ChannelStateMachine {
    state: ChannelState,
    transition_count: u64,
}

impl Default for ChannelStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStateMachine {
    /// Create a new state machine in the Created state.
    pub fn new() -> Self {
        Self {
            state: ChannelState::Created,
            transition_count: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Process an event and potentially transition to a new state.
    /// Returns true if a transition occurred.
    pub fn process_event(&mut self, event: ChannelEvent) -> bool {
        match self.next_state(event) {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: ChannelEvent) -> Option<ChannelState> {
        use ChannelEvent as E;
        use ChannelState as S;

        match (self.state, event) {
            // Closed is terminal
            (S::Closed, _) => None,
            (_, E::SessionClosed) => Some(S::Closed),

            (S::Created, E::Acquired) => Some(S::SettingsPending),
            (S::SettingsPending, E::SettingsLoaded | E::SettingsOverridden) => Some(S::Ready),
            (S::Ready | S::Disabled, E::Enabled) => Some(S::Enabled),
            (S::Enabled, E::Disabled) => Some(S::Disabled),
            (S::Disabled, E::Settled) => Some(S::Ready),

            _ => None,
        }
    }
}
