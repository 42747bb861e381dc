// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of leading serial digits that encode the device family.
const FAMILY_PREFIX_LEN: usize = 2;

/// Controller family a session is allowed to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFamily {
    pub prefix: String,
    pub name: String,
    /// Channels exposed by one controller of this family.
    pub channels: u16,
}

impl DeviceFamily {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>, channels: u16) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            channels,
        }
    }

    /// Three-channel benchtop piezo controllers (serials 71xxxxxx).
    pub fn benchtop_piezo() -> Self {
        Self::new("71", "Benchtop Piezo", 3)
    }

    pub fn matches(&self, identity: &DeviceIdentity) -> bool {
        identity.serial().starts_with(self.prefix.as_str())
    }

    pub fn has_channel(&self, index: u16) -> bool {
        (1..=self.channels).contains(&index)
    }
}

impl Default for DeviceFamily {
    fn default() -> Self {
        Self::benchtop_piezo()
    }
}

/// A device as reported by bus enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentity {
    serial: String,
    prefix: String,
}

impl DeviceIdentity {
    pub fn new(serial: impl Into<String>) -> Self {
        let serial = serial.into();
        let prefix = serial.chars().take(FAMILY_PREFIX_LEN).collect();
        Self { serial, prefix }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Id the controller uses for one of its channels ("71000123-1").
    pub fn channel_id(&self, index: u16) -> String {
        format!("{}-{}", self.serial, index)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial)
    }
}
