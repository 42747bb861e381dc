// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Latest-sample state shared between the poller and foreground readers.
//!
//! The poller is the only writer. Every publish replaces the whole
//! [`PollSnapshot`] inside a `watch` channel, so readers never observe a
//! half-written sample.

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::hal::RawStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Health {
    #[default]
    Healthy,
    /// Repeated recent sampling failures; polling continues.
    Degraded,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSnapshot {
    /// Number of publishes so far; strictly increasing.
    pub sequence: u64,
    #[serde(skip)]
    pub sampled_at: Option<Instant>,
    /// Last successfully sampled status.
    pub status: Option<RawStatus>,
    pub consecutive_failures: u32,
    pub health: Health,
}

impl PollSnapshot {
    pub fn has_sample(&self) -> bool {
        self.status.is_some()
    }

    pub fn enabled(&self) -> Option<bool> {
        self.status.as_ref().and_then(|s| s.enabled)
    }

    pub fn output(&self) -> Option<f64> {
        self.status.as_ref().map(|s| s.output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthChange {
    pub old: Health,
    pub new: Health,
}

impl HealthChange {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

/// Single-slot publisher for [`PollSnapshot`].
#[derive(Debug)]
pub struct SnapshotPublisher {
    tx: watch::Sender<PollSnapshot>,
    degrade_after: u32,
}

impl SnapshotPublisher {
    /// `degrade_after` consecutive failures flip health to Degraded.
    pub fn new(degrade_after: u32) -> Self {
        let (tx, _rx) = watch::channel(PollSnapshot::default());
        Self {
            tx,
            degrade_after: degrade_after.max(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> PollSnapshot {
        self.tx.borrow().clone()
    }

    pub fn publish_sample(&self, status: RawStatus) -> HealthChange {
        let old = self.tx.borrow().health;
        self.tx.send_modify(|snap| {
            snap.sequence += 1;
            snap.sampled_at = Some(Instant::now());
            snap.status = Some(status);
            snap.consecutive_failures = 0;
            snap.health = Health::Healthy;
        });
        HealthChange {
            old,
            new: Health::Healthy,
        }
    }

    /// Record a failed sample. The last good status is kept.
    pub fn publish_failure(&self) -> HealthChange {
        let old = self.tx.borrow().health;
        let degrade_after = self.degrade_after;
        let mut new = old;
        self.tx.send_modify(|snap| {
            snap.sequence += 1;
            snap.consecutive_failures = snap.consecutive_failures.saturating_add(1);
            if snap.consecutive_failures >= degrade_after {
                snap.health = Health::Degraded;
            }
            new = snap.health;
        });
        HealthChange { old, new }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(output: f64) -> RawStatus {
        RawStatus {
            enabled: Some(true),
            output,
        }
    }

    #[test]
    fn test_sequence_increases_on_every_publish() {
        let publisher = SnapshotPublisher::new(3);
        assert_eq!(publisher.latest().sequence, 0);
        assert!(!publisher.latest().has_sample());

        publisher.publish_sample(status(10.0));
        publisher.publish_failure();
        publisher.publish_sample(status(12.5));

        let snap = publisher.latest();
        assert_eq!(snap.sequence, 3);
        assert_eq!(snap.output(), Some(12.5));
        assert_eq!(snap.enabled(), Some(true));
    }

    #[test]
    fn test_degrades_after_three_failures() {
        let publisher = SnapshotPublisher::new(3);
        publisher.publish_sample(status(1.0));

        assert!(!publisher.publish_failure().changed());
        assert!(!publisher.publish_failure().changed());
        let change = publisher.publish_failure();
        assert!(change.changed());
        assert_eq!(change.new, Health::Degraded);

        let snap = publisher.latest();
        assert_eq!(snap.consecutive_failures, 3);
        // last good sample survives the failures
        assert_eq!(snap.output(), Some(1.0));

        // further failures keep it degraded without another change
        assert!(!publisher.publish_failure().changed());
    }

    #[test]
    fn test_success_recovers_health() {
        let publisher = SnapshotPublisher::new(1);
        publisher.publish_failure();
        assert_eq!(publisher.latest().health, Health::Degraded);

        let change = publisher.publish_sample(status(3.0));
        assert_eq!(
            change,
            HealthChange {
                old: Health::Degraded,
                new: Health::Healthy
            }
        );
        assert_eq!(publisher.latest().consecutive_failures, 0);
    }

    #[test]
    fn test_subscriber_sees_latest() {
        let publisher = SnapshotPublisher::new(3);
        let rx = publisher.subscribe();
        publisher.publish_sample(status(5.0));
        publisher.publish_sample(status(6.0));
        assert_eq!(rx.borrow().output(), Some(6.0));
        assert_eq!(rx.borrow().sequence, 2);
    }
}
