// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel lifecycle components.
//!
//! This module contains the operable lifecycle of one actuator channel:
//! the state machine, the settings readiness gate, the background poller
//! and the snapshot it publishes.

pub mod control;
pub mod events;
pub mod gate;
pub mod machine;
pub mod policies;
pub mod poller;
pub mod snapshot;

pub use control::Channel;
pub use events::{ChannelEventEmitter, ChannelListener, ListenerId};
pub use gate::SettingsGate;
pub use machine::{ChannelEvent, ChannelState, ChannelStateMachine};
pub use policies::{ChannelOptions, SettleOutcome, SettlePolicy};
pub use poller::{HalSampler, Poller, StatusSampler};
pub use snapshot::{Health, HealthChange, PollSnapshot, SnapshotPublisher};
