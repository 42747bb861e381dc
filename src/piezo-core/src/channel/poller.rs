// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Background status sampling for one channel.
//!
//! The poller runs as its own tokio task and is the single writer of the
//! channel's [`PollSnapshot`]. Foreground commands never wait on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::events::ChannelEventEmitter;
use super::snapshot::{PollSnapshot, SnapshotPublisher};
use crate::error::{PiezoError, PiezoResult};
use crate::hal::{ChannelHandle, HalFuture, PiezoHal, RawStatus};

/// Source of status samples for the poller.
pub trait StatusSampler: Send + Sync + 'static {
    fn sample<'a>(&'a self) -> HalFuture<'a, RawStatus>;
}

/// Sampler reading the live status through the HAL.
pub struct HalSampler {
    hal: Arc<dyn PiezoHal>,
    channel: ChannelHandle,
}

impl HalSampler {
    pub fn new(hal: Arc<dyn PiezoHal>, channel: ChannelHandle) -> Self {
        Self { hal, channel }
    }
}

impl StatusSampler for HalSampler {
    fn sample<'a>(&'a self) -> HalFuture<'a, RawStatus> {
        self.hal.read_status(self.channel)
    }
}

struct PollTask {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    period: Duration,
}

pub struct Poller {
    channel: u16,
    publisher: Arc<SnapshotPublisher>,
    emitter: Arc<ChannelEventEmitter>,
    session_closed: Option<watch::Receiver<bool>>,
    running: Option<PollTask>,
    /// Snapshot sequence when the current run started.
    run_start: u64,
}

impl Poller {
    pub fn new(channel: u16, degrade_after: u32, emitter: Arc<ChannelEventEmitter>) -> Self {
        Self {
            channel,
            publisher: Arc::new(SnapshotPublisher::new(degrade_after)),
            emitter,
            session_closed: None,
            running: None,
            run_start: 0,
        }
    }

    /// End the sampling loop once the given flag turns true.
    pub fn with_session(mut self, closed: watch::Receiver<bool>) -> Self {
        self.session_closed = Some(closed);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|task| !task.join.is_finished())
    }

    pub fn period(&self) -> Option<Duration> {
        self.running
            .as_ref()
            .filter(|task| !task.join.is_finished())
            .map(|task| task.period)
    }

    pub fn start(&mut self, sampler: Arc<dyn StatusSampler>, period: Duration) -> PiezoResult<()> {
        if period.is_zero() {
            return Err(PiezoError::InvalidPeriod(period));
        }
        if self.is_running() {
            return Err(PiezoError::AlreadyPolling);
        }

        self.run_start = self.publisher.latest().sequence;
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(poll_loop(
            self.channel,
            sampler,
            period,
            Arc::clone(&self.publisher),
            Arc::clone(&self.emitter),
            stop_rx,
            self.session_closed.clone(),
        ));
        info!(
            "Polling channel {} every {} ms",
            self.channel,
            period.as_millis()
        );
        self.running = Some(PollTask {
            stop_tx,
            join,
            period,
        });
        Ok(())
    }

    /// Stop the sampling task and wait for it to finish.
    ///
    /// No snapshot is published after this returns. No-op when idle.
    pub async fn stop(&mut self) {
        let Some(task) = self.running.take() else {
            return;
        };
        let _ = task.stop_tx.send(true);
        if let Err(e) = task.join.await {
            warn!("Poll task for channel {} ended abnormally: {}", self.channel, e);
        }
        debug!("Polling channel {} stopped", self.channel);
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.publisher.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.publisher.subscribe()
    }

    /// Wait until the current run has published a successful sample.
    ///
    /// Samples left over from an earlier run do not count.
    pub async fn wait_for_sample(&self, timeout: Duration) -> Option<PollSnapshot> {
        let run_start = self.run_start;
        let mut rx = self.publisher.subscribe();
        let fresh = move |snap: &PollSnapshot| {
            snap.sequence > run_start && snap.consecutive_failures == 0 && snap.has_sample()
        };
        let waited = time::timeout(timeout, rx.wait_for(fresh)).await;
        match waited {
            Ok(Ok(snap)) => Some(snap.clone()),
            _ => None,
        }
    }
}

async fn poll_loop(
    channel: u16,
    sampler: Arc<dyn StatusSampler>,
    period: Duration,
    publisher: Arc<SnapshotPublisher>,
    emitter: Arc<ChannelEventEmitter>,
    mut stop_rx: watch::Receiver<bool>,
    session_closed: Option<watch::Receiver<bool>>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Err means the poller itself was dropped.
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        if session_closed.as_ref().is_some_and(|rx| *rx.borrow()) {
            debug!("Session closed, ending poll loop for channel {}", channel);
            break;
        }

        let change = match sampler.sample().await {
            Ok(status) => publisher.publish_sample(status),
            Err(e) => {
                let err = PiezoError::SampleFailed(e);
                warn!("Channel {}: {}", channel, err);
                publisher.publish_failure()
            }
        };
        if change.changed() {
            info!(
                "Channel {} poll health {:?} -> {:?}",
                channel, change.old, change.new
            );
            emitter.notify_health_change(channel, change.old, change.new);
        }
    }
}
