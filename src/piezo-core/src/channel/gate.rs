// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Settings readiness gate.
//!
//! After connect the controller pushes its parameter set to the host
//! asynchronously. Commands issued before that completes act on defaults,
//! so callers wait here first.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::{PiezoError, PiezoResult};
use crate::hal::{ChannelHandle, PiezoHal};

pub struct SettingsGate {
    hal: Arc<dyn PiezoHal>,
    channel: ChannelHandle,
    check_interval: Duration,
}

impl SettingsGate {
    pub fn new(hal: Arc<dyn PiezoHal>, channel: ChannelHandle, check_interval: Duration) -> Self {
        Self {
            hal,
            channel,
            check_interval: check_interval.max(Duration::from_millis(1)),
        }
    }

    /// Non-blocking readiness check.
    pub async fn is_ready(&self) -> PiezoResult<bool> {
        self.hal
            .is_configuration_loaded(self.channel)
            .await
            .map_err(|e| PiezoError::device("is_configuration_loaded", e))
    }

    /// Wait until settings are loaded or `timeout` expires.
    ///
    /// Returns the time spent waiting. A zero timeout performs exactly one
    /// check.
    pub async fn await_ready(&self, timeout: Duration) -> PiezoResult<Duration> {
        let start = Instant::now();
        let deadline = start + timeout;
        loop {
            if self.is_ready().await? {
                let waited = start.elapsed();
                debug!("Settings loaded after {:?}", waited);
                return Ok(waited);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PiezoError::SettingsTimeout(timeout));
            }
            time::sleep(self.check_interval.min(deadline - now)).await;
        }
    }
}
