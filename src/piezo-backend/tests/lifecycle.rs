// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Session and channel lifecycle against the simulated controller bus.

use std::sync::Arc;
use std::time::Duration;

use piezo_backend::{SimBus, SimSettings};
use piezo_core::{
    ChannelState, DeviceFamily, DeviceManager, Health, PiezoError, PiezoHal, SessionState,
};

const SERIAL: &str = "71000123";

fn sim() -> Arc<SimBus> {
    Arc::new(SimBus::new(SimSettings {
        devices: vec![SERIAL.to_string(), "26000042".to_string()],
        ..SimSettings::default()
    }))
}

async fn discovered(sim: &Arc<SimBus>) -> DeviceManager {
    let hal: Arc<dyn PiezoHal> = sim.clone();
    let mut manager = DeviceManager::new(hal, DeviceFamily::benchtop_piezo());
    manager.discover().await.unwrap();
    manager
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_set_and_read_back() {
    let sim = sim();
    let manager = discovered(&sim).await;

    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();

    let waited = channel.await_settings(Duration::from_secs(5)).await.unwrap();
    assert!(waited >= Duration::from_millis(200));
    assert_eq!(channel.max_output(), Some(150.0));
    assert_eq!(channel.configuration().unwrap().device_id, "71000123-1");

    channel.start_polling(Duration::from_millis(250)).unwrap();
    let first = channel
        .wait_for_sample(Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(first.enabled(), Some(false));

    let outcome = channel.enable().await.unwrap();
    assert!(outcome.is_acknowledged());
    assert!(outcome.elapsed() >= Duration::from_millis(100));

    channel.set_output(75.0).await.unwrap();
    assert_eq!(channel.output().await.unwrap(), 75.0);

    // the poller picks the new output up on a later tick
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snap = channel.snapshot();
    assert_eq!(snap.enabled(), Some(true));
    assert_eq!(snap.output(), Some(75.0));
    assert_eq!(snap.health, Health::Healthy);

    channel.stop_polling().await;
    session.close(true).await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(!sim.is_connected(SERIAL));
    assert_eq!(sim.last_disconnect_clean(), Some(true));
    assert_eq!(sim.setpoint(SERIAL, 1), 75.0);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_leaves_output_unchanged() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();
    channel.await_settings(Duration::from_secs(5)).await.unwrap();
    channel.enable().await.unwrap();
    channel.set_output(75.0).await.unwrap();

    let err = channel.set_output(200.0).await.unwrap_err();
    assert!(matches!(err, PiezoError::OutOfRange { value, max } if value == 200.0 && max == 150.0));
    assert_eq!(channel.output().await.unwrap(), 75.0);
    assert_eq!(sim.counters().setpoint_writes, 1);

    session.close(true).await;
}

#[tokio::test(start_paused = true)]
async fn test_enable_while_settings_pending_sends_nothing() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();

    let err = channel.enable().await.unwrap_err();
    assert!(matches!(err, PiezoError::InvalidState { op: "enable", .. }));
    assert!(matches!(
        channel.set_output(10.0).await,
        Err(PiezoError::NotEnabled(ChannelState::SettingsPending))
    ));
    assert_eq!(sim.counters().set_enabled, 0);
    assert_eq!(sim.counters().setpoint_writes, 0);

    session.close(true).await;
}

#[tokio::test]
async fn test_unknown_serials_not_found() {
    let sim = sim();
    let manager = discovered(&sim).await;

    for serial in ["71999999", "", "71000123-1", "710001230"] {
        let err = manager.open(serial).await.err().unwrap();
        assert!(matches!(err, PiezoError::NotFound { .. }), "{serial}");
    }
    assert_eq!(sim.counters().connects, 0);
}

#[tokio::test]
async fn test_other_family_rejected() {
    let sim = sim();
    let manager = discovered(&sim).await;

    let err = manager.open("26000042").await.err().unwrap();
    assert!(matches!(err, PiezoError::WrongFamily { .. }));
    assert_eq!(sim.counters().connects, 0);
}

#[tokio::test]
async fn test_invalid_channel_indices_unavailable() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();

    for index in [0, 4, 100] {
        let err = session.channel(index).await.err().unwrap();
        assert!(matches!(err, PiezoError::ChannelUnavailable { .. }), "{index}");
    }
    assert!(session.channel(3).await.is_ok());

    session.close(true).await;
}

#[tokio::test]
async fn test_enumeration_failure() {
    let sim = sim();
    sim.set_fail_enumerate(true);
    let hal: Arc<dyn PiezoHal> = sim.clone();
    let mut manager = DeviceManager::new(hal, DeviceFamily::benchtop_piezo());

    assert!(matches!(
        manager.discover().await,
        Err(PiezoError::Enumeration(_))
    ));
}

#[tokio::test]
async fn test_open_after_failed_rediscovery_not_found() {
    let sim = sim();
    let mut manager = discovered(&sim).await;
    assert_eq!(manager.discovered().len(), 2);

    sim.set_fail_enumerate(true);
    assert!(manager.discover().await.is_err());

    let err = manager.open(SERIAL).await.err().unwrap();
    assert!(matches!(err, PiezoError::NotFound { .. }));
    assert_eq!(sim.counters().connects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_settings_gate_times_out_without_spinning() {
    let sim = Arc::new(SimBus::new(SimSettings {
        settings_delay_ms: 10_000,
        ..SimSettings::default()
    }));
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();

    let err = channel
        .await_settings(Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, PiezoError::SettingsTimeout(_)));
    assert_eq!(channel.state(), ChannelState::SettingsPending);
    assert!(!channel.is_settings_ready().await.unwrap());

    channel.override_settings().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Ready);

    session.close(false).await;
    assert_eq!(sim.last_disconnect_clean(), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_stop_freezes_snapshot() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();

    channel.start_polling(Duration::from_millis(50)).unwrap();
    channel.stop_polling().await;
    let frozen = channel.snapshot().sequence;
    let reads = sim.counters().status_reads;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(channel.snapshot().sequence, frozen);
    assert_eq!(sim.counters().status_reads, reads);

    // polling may be restarted after a stop
    channel.start_polling(Duration::from_millis(50)).unwrap();
    channel.stop_polling().await;
    session.close(true).await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_status_reads_degrade_health() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();

    sim.fail_next_status_reads(3);
    channel.start_polling(Duration::from_millis(100)).unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(channel.snapshot().health, Health::Degraded);
    assert!(channel.is_polling());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(channel.snapshot().health, Health::Healthy);

    channel.stop_polling().await;
    session.close(true).await;
}

#[tokio::test(start_paused = true)]
async fn test_close_ends_polling_and_invalidates_channel() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(1).await.unwrap();
    channel.start_polling(Duration::from_millis(100)).unwrap();

    session.close(true).await;
    session.close(true).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(!channel.is_polling());
    assert!(matches!(
        channel.await_settings(Duration::from_secs(1)).await,
        Err(PiezoError::SessionClosed)
    ));
    assert!(matches!(
        session.channel(2).await,
        Err(PiezoError::SessionClosed)
    ));
    assert_eq!(sim.counters().disconnects, 1);
    channel.stop_polling().await;
}

#[tokio::test]
async fn test_device_info_reported() {
    let sim = sim();
    let manager = discovered(&sim).await;
    let session = manager.open(SERIAL).await.unwrap();
    let mut channel = session.channel(2).await.unwrap();

    let info = channel.device_info().await.unwrap();
    assert_eq!(info.serial_number, SERIAL);
    session.close(true).await;
}
