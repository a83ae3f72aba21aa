//! Multi-device orchestration: isolation, shutdown and reporting.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

use blecentral::error::{ConnectError, GattError};
use blecentral::profiles::heart_rate;
use blecentral::{Address, DeviceDescriptor, Orchestrator, Outcome, SessionConfig};
use embassy_time::{Duration, Timer};
use futures::executor::block_on;

use crate::mock_adapter::*;

fn config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(100),
        discovery_timeout: Duration::from_millis(100),
    }
}

fn targets(addresses: &[Address]) -> Vec<DeviceDescriptor> {
    addresses
        .iter()
        .map(|a| DeviceDescriptor::new(*a, -60))
        .collect()
}

#[test]
fn hung_device_does_not_block_the_others() {
    let mut adapter = MockAdapter::new().with_peer(
        addr(1),
        Peer::new(sensor_profile()).behaving(ConnectBehaviour::Hang),
    );
    for n in 2..=4 {
        adapter = adapter.with_peer(addr(n), Peer::new(sensor_profile()));
        adapter.notify(addr(n), HEART_RATE_HANDLE, &[0x00, 60 + n]);
    }

    let readings = RefCell::new(BTreeMap::new());
    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run_to_completion(
        &targets(&[addr(1), addr(2), addr(3), addr(4)]),
        async |session| {
            let address = session.address();
            heart_rate::watch(session, |reading| {
                readings.borrow_mut().insert(address, reading.bpm);
                ControlFlow::Break(())
            })
            .await
        },
    ));

    assert_eq!(report.len(), 4);
    assert_eq!(report.completed(), 3);
    assert_eq!(
        report.get(&addr(1)),
        Some(&Outcome::ConnectFailed(ConnectError::Timeout))
    );
    let readings = readings.into_inner();
    assert_eq!(readings.len(), 3);
    assert_eq!(readings[&addr(3)], 63);
    // Every device that connected was disconnected again.
    for n in 2..=4 {
        assert_eq!(adapter.count(|c| *c == Call::Disconnect(addr(n))), 1);
    }
}

#[test]
fn work_failure_is_isolated() {
    let adapter = MockAdapter::new()
        .with_peer(addr(1), Peer::new(vec![]))
        .with_peer(addr(2), Peer::new(sensor_profile()));

    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run_to_completion(
        &targets(&[addr(1), addr(2)]),
        async |session| {
            session.read(blecentral::ble::uuids::DEVICE_NAME).await.map(drop)
        },
    ));

    assert_eq!(report.get(&addr(1)), Some(&Outcome::Failed(GattError::NotFound)));
    // addr(2) has the characteristic but no value scripted.
    assert!(matches!(report.get(&addr(2)), Some(Outcome::Failed(GattError::Adapter(_)))));
}

#[test]
fn link_loss_fails_only_that_device() {
    let adapter = MockAdapter::new()
        .with_peer(addr(1), Peer::new(sensor_profile()))
        .with_peer(addr(2), Peer::new(sensor_profile()));
    adapter.drop_link(addr(1));
    adapter.notify(addr(2), HEART_RATE_HANDLE, &[0x00, 80]);

    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run_to_completion(
        &targets(&[addr(1), addr(2)]),
        async |session| heart_rate::watch(session, |_| ControlFlow::Break(())).await,
    ));

    assert_eq!(report.get(&addr(1)), Some(&Outcome::Failed(GattError::Disconnected)));
    assert_eq!(report.get(&addr(2)), Some(&Outcome::Completed));
}

#[test]
fn shutdown_cancels_and_closes_every_session() {
    let mut adapter = MockAdapter::new();
    for n in 1..=3 {
        adapter = adapter.with_peer(addr(n), Peer::new(sensor_profile()));
    }

    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run(
        &targets(&[addr(1), addr(2), addr(3)]),
        async |session| heart_rate::watch(session, |_| ControlFlow::Continue(())).await,
        Timer::after(Duration::from_millis(30)),
    ));

    assert_eq!(report.len(), 3);
    assert!(report.iter().all(|(_, o)| *o == Outcome::Cancelled));
    assert_eq!(adapter.count(|c| matches!(c, Call::Disconnect(_))), 3);
}

#[test]
fn shutdown_during_close_still_disconnects() {
    let adapter = MockAdapter::new()
        .with_peer(addr(1), Peer::new(sensor_profile()).stalling_disconnects(1))
        .with_peer(addr(2), Peer::new(sensor_profile()));

    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run(
        &targets(&[addr(1), addr(2)]),
        async |_| Ok(()),
        Timer::after(Duration::from_millis(30)),
    ));

    // Work finished before shutdown; addr(1) was stuck disconnecting.
    assert_eq!(report.get(&addr(1)), Some(&Outcome::Completed));
    assert_eq!(report.get(&addr(2)), Some(&Outcome::Completed));
    assert_eq!(adapter.count(|c| *c == Call::Disconnect(addr(1))), 2);
    assert_eq!(adapter.count(|c| *c == Call::Disconnect(addr(2))), 1);
}

#[test]
fn duplicate_targets_run_once() {
    let adapter = MockAdapter::new().with_peer(addr(1), Peer::new(sensor_profile()));
    let orchestrator = Orchestrator::new(&adapter, config());
    let report = block_on(orchestrator.run_to_completion(
        &targets(&[addr(1), addr(1)]),
        async |_| Ok(()),
    ));

    assert_eq!(report.len(), 1);
    assert_eq!(report.get(&addr(1)), Some(&Outcome::Completed));
    assert_eq!(adapter.count(|c| matches!(c, Call::Connect(_))), 1);
}
