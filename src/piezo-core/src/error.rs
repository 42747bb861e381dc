// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy for the session and channel lifecycle.

use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelState;
use crate::BoxError;

pub type PiezoResult<T> = Result<T, PiezoError>;

#[derive(Debug, Error)]
pub enum PiezoError {
    #[error("device enumeration failed: {0}")]
    Enumeration(#[source] BoxError),

    #[error("{serial} is not a valid serial number")]
    NotFound { serial: String },

    #[error("{serial} is not a {family} controller (expected prefix {prefix})")]
    WrongFamily {
        serial: String,
        family: String,
        prefix: String,
    },

    #[error("failed to open device {serial}: {source}")]
    ConnectFailed {
        serial: String,
        #[source]
        source: BoxError,
    },

    #[error("channel {index} unavailable: {reason}")]
    ChannelUnavailable { index: u16, reason: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("settings failed to initialize within {0:?}")]
    SettingsTimeout(Duration),

    #[error("polling is already active")]
    AlreadyPolling,

    #[error("invalid polling period {0:?}")]
    InvalidPeriod(Duration),

    #[error("cannot {op} while channel is {state}")]
    InvalidState {
        op: &'static str,
        state: ChannelState,
    },

    #[error("channel is not enabled (state {0})")]
    NotEnabled(ChannelState),

    #[error("output {value} outside allowed range 0..={max}")]
    OutOfRange { value: f64, max: f64 },

    #[error("{op} failed: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("status sample failed: {0}")]
    SampleFailed(#[source] BoxError),
}

impl PiezoError {
    pub fn device(op: &'static str, source: BoxError) -> Self {
        Self::Device { op, source }
    }

    /// Whether the caller may continue the current run after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SettingsTimeout(_) | Self::SampleFailed(_))
    }

    /// Errors raised while bringing the device up; these abort the run.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Enumeration(_)
                | Self::NotFound { .. }
                | Self::WrongFamily { .. }
                | Self::ConnectFailed { .. }
                | Self::ChannelUnavailable { .. }
        )
    }
}
