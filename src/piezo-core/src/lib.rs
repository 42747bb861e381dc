// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod channel;
pub mod error;
pub mod hal;
pub mod identity;
pub mod manager;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type DynResult<T> = Result<T, BoxError>;

pub use channel::{
    Channel, ChannelListener, ChannelOptions, ChannelState, Health, PollSnapshot, SettleOutcome,
    SettlePolicy,
};
pub use error::{PiezoError, PiezoResult};
pub use hal::{ChannelHandle, Configuration, DeviceInfo, PiezoHal, RawStatus, SessionHandle};
pub use identity::{DeviceFamily, DeviceIdentity};
pub use manager::DeviceManager;
pub use session::{Session, SessionState};
