// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Hardware abstraction the lifecycle core talks through.
//!
//! Bus enumeration, transport and command encoding live behind
//! [`PiezoHal`]. The core only ever holds the opaque handles returned here.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BoxError, DynResult};

/// Alias to reduce type complexity in PiezoHal.
pub type HalFuture<'a, T> = Pin<Box<dyn Future<Output = DynResult<T>> + Send + 'a>>;

/// Opaque handle for an open controller connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub u64);

/// Opaque handle for one channel of an open controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle(pub u64);

/// Parameter set the device pushes to the host after connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Per-channel device id, e.g. "71000123-1".
    pub device_id: String,
    /// Maximum output voltage the channel accepts.
    pub max_output: f64,
}

/// Live status as read from the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatus {
    /// Enabled flag, `None` when the device cannot report it.
    pub enabled: Option<bool>,
    pub output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub name: String,
    pub firmware: String,
}

#[derive(Debug, Error)]
pub enum HalError {
    #[error("{0} not supported by this backend")]
    NotSupported(&'static str),
}

impl HalError {
    pub fn not_supported(op: &'static str) -> Self {
        Self::NotSupported(op)
    }
}

/// Operations a controller backend provides to the lifecycle core.
///
/// Methods take `&self` because the poller samples status from its own task
/// while the foreground issues commands; backends serialize access internally.
pub trait PiezoHal: Send + Sync {
    fn enumerate<'a>(&'a self) -> HalFuture<'a, Vec<String>>;

    fn connect<'a>(&'a self, id: &'a str) -> HalFuture<'a, SessionHandle>;

    fn disconnect<'a>(&'a self, session: SessionHandle, expected_clean: bool)
        -> HalFuture<'a, ()>;

    fn channel_handle<'a>(
        &'a self,
        session: SessionHandle,
        index: u16,
    ) -> HalFuture<'a, ChannelHandle>;

    fn read_configuration<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, Configuration>;

    fn is_configuration_loaded<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, bool>;

    fn set_enabled<'a>(&'a self, channel: ChannelHandle, enabled: bool) -> HalFuture<'a, ()>;

    fn read_status<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, RawStatus>;

    fn write_setpoint<'a>(&'a self, channel: ChannelHandle, value: f64) -> HalFuture<'a, ()>;

    fn read_setpoint<'a>(&'a self, channel: ChannelHandle) -> HalFuture<'a, f64>;

    fn device_info<'a>(&'a self, _channel: ChannelHandle) -> HalFuture<'a, DeviceInfo> {
        let err: BoxError = Box::new(HalError::not_supported("device_info"));
        Box::pin(std::future::ready(Err::<DeviceInfo, _>(err)))
    }
}
