// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device discovery and session opening.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::ChannelOptions;
use crate::error::{PiezoError, PiezoResult};
use crate::hal::PiezoHal;
use crate::identity::{DeviceFamily, DeviceIdentity};
use crate::session::Session;

/// Owns the HAL and the result of the most recent bus enumeration.
pub struct DeviceManager {
    hal: Arc<dyn PiezoHal>,
    family: DeviceFamily,
    options: ChannelOptions,
    discovered: Vec<DeviceIdentity>,
}

impl DeviceManager {
    pub fn new(hal: Arc<dyn PiezoHal>, family: DeviceFamily) -> Self {
        Self {
            hal,
            family,
            options: ChannelOptions::default(),
            discovered: Vec::new(),
        }
    }

    /// Options applied to every channel of sessions opened from here.
    pub fn with_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn family(&self) -> &DeviceFamily {
        &self.family
    }

    /// Devices seen by the most recent [`discover`](Self::discover).
    pub fn discovered(&self) -> &[DeviceIdentity] {
        &self.discovered
    }

    /// Enumerate the bus and remember the result.
    ///
    /// Duplicate and blank identifiers are dropped; order is preserved.
    /// A failed enumeration leaves nothing to open.
    pub async fn discover(&mut self) -> PiezoResult<Vec<DeviceIdentity>> {
        self.discovered.clear();
        let ids = self.hal.enumerate().await.map_err(PiezoError::Enumeration)?;

        let mut found: Vec<DeviceIdentity> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.trim();
            if id.is_empty() || found.iter().any(|d| d.serial() == id) {
                continue;
            }
            found.push(DeviceIdentity::new(id));
        }
        for device in &found {
            debug!("Found device {}", device);
        }
        info!("Discovered {} device(s)", found.len());

        self.discovered = found.clone();
        Ok(found)
    }

    /// Open a session to a device seen by the last discovery.
    pub async fn open(&self, serial: &str) -> PiezoResult<Session> {
        let identity = self
            .discovered
            .iter()
            .find(|d| d.serial() == serial)
            .cloned()
            .ok_or_else(|| PiezoError::NotFound {
                serial: serial.to_string(),
            })?;

        if !self.family.matches(&identity) {
            return Err(PiezoError::WrongFamily {
                serial: serial.to_string(),
                family: self.family.name.clone(),
                prefix: self.family.prefix.clone(),
            });
        }

        let handle = self
            .hal
            .connect(identity.serial())
            .await
            .map_err(|source| PiezoError::ConnectFailed {
                serial: serial.to_string(),
                source,
            })?;
        info!("Opened session to {}", identity);

        Ok(Session::new(
            Arc::clone(&self.hal),
            handle,
            identity,
            self.family.clone(),
            self.options.clone(),
        ))
    }
}
