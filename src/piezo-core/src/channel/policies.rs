// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel operational policies for settling and readiness checks.
//!
//! Enable and disable commands are acknowledged asynchronously by the
//! device. These policies control how long the channel waits for the
//! acknowledgement and what it assumes when the device cannot report it.

use std::time::Duration;

use serde::Serialize;

/// How to wait for an enable/disable command to take effect.
#[derive(Debug, Clone)]
pub struct SettlePolicy {
    /// Interval between status reads while waiting.
    pub check_interval: Duration,
    /// Upper bound on the wait when the device reports its enabled flag.
    pub max_wait: Duration,
    /// Fixed wait when the device cannot report the flag at all.
    pub min_settle: Duration,
}

impl SettlePolicy {
    pub fn new(check_interval: Duration, max_wait: Duration, min_settle: Duration) -> Self {
        Self {
            check_interval,
            max_wait,
            min_settle,
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(20),
            max_wait: Duration::from_millis(1000),
            min_settle: Duration::from_millis(500),
        }
    }
}

/// How a settle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SettleOutcome {
    /// Device reported the requested enabled flag.
    Acknowledged(Duration),
    /// Device cannot report the flag; the minimum settle time elapsed.
    Assumed(Duration),
    /// Device reports the flag but never matched within `max_wait`.
    TimedOut(Duration),
}

impl SettleOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Acknowledged(d) | Self::Assumed(d) | Self::TimedOut(d) => *d,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged(_))
    }
}

/// Tunables for one channel.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub settle: SettlePolicy,
    /// Interval between "settings loaded?" checks.
    pub ready_check_interval: Duration,
    /// Consecutive sample failures before the poller reports Degraded.
    pub degrade_after: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::default(),
            ready_check_interval: Duration::from_millis(25),
            degrade_after: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_defaults() {
        let policy = SettlePolicy::default();
        assert_eq!(policy.check_interval, Duration::from_millis(20));
        assert!(policy.min_settle < policy.max_wait);
    }

    #[test]
    fn test_outcome_elapsed() {
        let outcome = SettleOutcome::Assumed(Duration::from_millis(500));
        assert_eq!(outcome.elapsed(), Duration::from_millis(500));
        assert!(!outcome.is_acknowledged());
        assert!(SettleOutcome::Acknowledged(Duration::ZERO).is_acknowledged());
    }
}
