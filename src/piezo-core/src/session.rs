// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! An open connection to one controller.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelOptions};
use crate::error::{PiezoError, PiezoResult};
use crate::hal::{PiezoHal, SessionHandle};
use crate::identity::{DeviceFamily, DeviceIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// State shared between a session and the channels it handed out.
pub(crate) struct SessionLink {
    pub(crate) hal: Arc<dyn PiezoHal>,
    pub(crate) handle: SessionHandle,
    pub(crate) identity: DeviceIdentity,
    closed_tx: watch::Sender<bool>,
    claimed: Mutex<HashSet<u16>>,
}

impl SessionLink {
    fn new(hal: Arc<dyn PiezoHal>, handle: SessionHandle, identity: DeviceIdentity) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            hal,
            handle,
            identity,
            closed_tx,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !*self.closed_tx.borrow()
    }

    /// Receiver that flips to true when the session closes.
    pub(crate) fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Mark closed; returns whether it was already closed.
    fn mark_closed(&self) -> bool {
        self.closed_tx.send_replace(true)
    }

    fn claim(&self, index: u16) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index)
    }

    pub(crate) fn release(&self, index: u16) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index);
    }
}

pub struct Session {
    link: Arc<SessionLink>,
    family: DeviceFamily,
    options: ChannelOptions,
}

impl Session {
    pub(crate) fn new(
        hal: Arc<dyn PiezoHal>,
        handle: SessionHandle,
        identity: DeviceIdentity,
        family: DeviceFamily,
        options: ChannelOptions,
    ) -> Self {
        Self {
            link: Arc::new(SessionLink::new(hal, handle, identity)),
            family,
            options,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.link.identity
    }

    pub fn handle(&self) -> SessionHandle {
        self.link.handle
    }

    pub fn family(&self) -> &DeviceFamily {
        &self.family
    }

    pub fn state(&self) -> SessionState {
        if self.link.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Acquire channel `index` (1-based). Each index is handed out once.
    pub async fn channel(&self, index: u16) -> PiezoResult<Channel> {
        if !self.is_open() {
            return Err(PiezoError::SessionClosed);
        }
        if !self.family.has_channel(index) {
            return Err(PiezoError::ChannelUnavailable {
                index,
                reason: format!(
                    "{} controllers have channels 1..={}",
                    self.family.name, self.family.channels
                ),
            });
        }
        if !self.link.claim(index) {
            return Err(PiezoError::ChannelUnavailable {
                index,
                reason: "already in use".to_string(),
            });
        }

        match self.link.hal.channel_handle(self.link.handle, index).await {
            Ok(handle) => {
                info!(
                    "Acquired channel {} ({})",
                    index,
                    self.link.identity.channel_id(index)
                );
                Ok(Channel::new(
                    Arc::clone(&self.link),
                    index,
                    handle,
                    self.options.clone(),
                ))
            }
            Err(e) => {
                self.link.release(index);
                Err(PiezoError::ChannelUnavailable {
                    index,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Close the connection. Idempotent and infallible.
    ///
    /// Channels handed out by this session fail with `SessionClosed` from
    /// here on and their poll loops end at the next period boundary.
    pub async fn close(&self, expected_clean: bool) {
        if self.link.mark_closed() {
            debug!("Session {} already closed", self.link.identity);
            return;
        }
        info!(
            "Closing session {} (expected clean: {})",
            self.link.identity, expected_clean
        );
        if let Err(e) = self
            .link
            .hal
            .disconnect(self.link.handle, expected_clean)
            .await
        {
            warn!("Disconnect from {} failed: {}", self.link.identity, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.link.identity)
            .field("handle", &self.link.handle)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.link.mark_closed() {
            return;
        }
        warn!("Session {} dropped while open", self.link.identity);
        // Best effort; outside a runtime the handle is simply abandoned.
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            let link = Arc::clone(&self.link);
            rt.spawn(async move {
                if let Err(e) = link.hal.disconnect(link.handle, false).await {
                    warn!("Disconnect from {} failed: {}", link.identity, e);
                }
            });
        }
    }
}
