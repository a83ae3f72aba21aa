//! Session lifecycle, GATT operations and notification routing.

use std::ops::ControlFlow;

use blecentral::ble::adapter::WriteKind;
use blecentral::ble::session;
use blecentral::ble::uuids;
use blecentral::error::{AdapterError, ConnectError, Error, GattError};
use blecentral::profiles::device_info::{self, DeviceInfo};
use blecentral::profiles::telemetry::{self, Telemetry};
use blecentral::profiles::{alert_level, blink, explorer};
use blecentral::{with_session, ConnectionState, Session, SessionConfig};
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};
use futures::executor::block_on;

use crate::mock_adapter::*;

const RAW: [u8; 6] = [0x64, 0x00, 0x88, 0x13, 0x14, 0x00];

fn sensor() -> MockAdapter {
    MockAdapter::new().with_peer(
        addr(1),
        Peer::new(sensor_profile())
            .with_value(DEVICE_NAME_HANDLE, b"Thermo")
            .with_value(TELEMETRY_HANDLE, &RAW)
            .with_value(TELEMETRY_CCCD, &[0x00, 0x00])
            .with_value(IMMEDIATE_ALERT_HANDLE, &[2])
            .with_value(LINK_LOSS_ALERT_HANDLE, &[1]),
    )
}

fn quick() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(50),
        discovery_timeout: Duration::from_millis(50),
    }
}

#[test]
fn connect_discovers_and_reads() {
    let adapter = sensor();
    block_on(async {
        let s = Session::new(&adapter, addr(1), quick());
        assert_eq!(s.state(), ConnectionState::Disconnected);
        s.connect().await.unwrap();
        assert_eq!(s.state(), ConnectionState::Ready);
        assert_eq!(s.services().len(), 5);
        assert_eq!(s.read(uuids::DEVICE_NAME).await.unwrap(), b"Thermo");
        // Already ready: no second connect.
        s.connect().await.unwrap();
        s.close().await;
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert!(s.services().is_empty());
    });
    assert_eq!(adapter.count(|c| matches!(c, Call::Connect(_))), 1);
    assert_eq!(adapter.calls().last(), Some(&Call::Disconnect(addr(1))));
}

#[test]
fn operations_need_a_ready_session() {
    let adapter = sensor();
    let s = Session::new(&adapter, addr(1), quick());
    assert_eq!(
        block_on(s.read(uuids::DEVICE_NAME)),
        Err(GattError::Disconnected)
    );
    assert!(adapter.calls().is_empty());
}

#[test]
fn missing_and_unsupported_characteristics() {
    let adapter = sensor();
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        assert_eq!(s.read(uuids::MODEL_NUMBER).await, Err(GattError::NotFound));
        assert_eq!(
            s.read(uuids::HEART_RATE_MEASUREMENT).await,
            Err(GattError::Unsupported)
        );
        assert_eq!(
            s.write(uuids::DEVICE_NAME, b"x").await,
            Err(GattError::Unsupported)
        );
        assert_eq!(
            s.write_without_response(uuids::LED_BADGE_WRITE, b"x").await,
            Err(GattError::Unsupported)
        );
        assert!(matches!(
            s.subscribe(uuids::DEVICE_NAME).await,
            Err(GattError::Unsupported)
        ));
        assert_eq!(s.read_descriptor(99).await, Err(GattError::NotFound));
    });
    assert_eq!(adapter.count(|c| matches!(c, Call::Read(..) | Call::Write { .. })), 0);
}

#[test]
fn oversized_write_is_rejected_before_the_adapter() {
    let adapter = sensor().with_max_write_len(20);
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        assert_eq!(
            s.write(uuids::LED_BADGE_WRITE, &[0; 21]).await,
            Err(GattError::PayloadTooLarge { len: 21, max: 20 })
        );
        s.write(uuids::LED_BADGE_WRITE, &[0; 20]).await.unwrap();
    });
    assert_eq!(adapter.writes(addr(1)).len(), 1);
}

#[test]
fn write_kind_follows_characteristic_capabilities() {
    let adapter = sensor();
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        s.write(uuids::LED_BADGE_WRITE, &[1]).await.unwrap();
        s.write(uuids::DEVICE_MODE_CHANGE, &[2]).await.unwrap();
    });
    let kinds: Vec<_> = adapter
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Write { handle, kind, .. } => Some((handle, kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        [
            (BADGE_HANDLE, WriteKind::WithResponse),
            (BLINK_HANDLE, WriteKind::WithoutResponse)
        ]
    );
}

#[test]
fn connect_timeout_leaves_session_disconnected() {
    let adapter = MockAdapter::new().with_peer(
        addr(2),
        Peer::new(sensor_profile()).behaving(ConnectBehaviour::Hang),
    );
    block_on(async {
        let s = Session::new(&adapter, addr(2), quick());
        assert_eq!(s.connect().await, Err(ConnectError::Timeout));
        assert_eq!(s.state(), ConnectionState::Disconnected);
    });
}

#[test]
fn discovery_timeout_releases_the_link() {
    let adapter = MockAdapter::new().with_peer(
        addr(3),
        Peer::new(sensor_profile()).behaving(ConnectBehaviour::HangDiscovery),
    );
    block_on(async {
        let s = Session::new(&adapter, addr(3), quick());
        assert_eq!(
            s.connect().await,
            Err(ConnectError::DiscoveryFailed(AdapterError::Timeout))
        );
        assert_eq!(s.state(), ConnectionState::Disconnected);
    });
    assert_eq!(adapter.calls().last(), Some(&Call::Disconnect(addr(3))));
}

#[test]
fn rejected_connect_is_classified() {
    let adapter = MockAdapter::new()
        .with_peer(
            addr(4),
            Peer::new(vec![]).behaving(ConnectBehaviour::Reject(AdapterError::Unavailable)),
        )
        .with_peer(
            addr(5),
            Peer::new(vec![]).behaving(ConnectBehaviour::Reject(AdapterError::Att(0x3E))),
        );
    block_on(async {
        assert_eq!(
            Session::new(&adapter, addr(4), quick()).connect().await,
            Err(ConnectError::AdapterUnavailable)
        );
        assert_eq!(
            Session::new(&adapter, addr(5), quick()).connect().await,
            Err(ConnectError::Refused(AdapterError::Att(0x3E)))
        );
    });
}

#[test]
fn dropped_connect_reverts_state() {
    let adapter = MockAdapter::new().with_peer(
        addr(6),
        Peer::new(sensor_profile()).behaving(ConnectBehaviour::Hang),
    );
    let config = SessionConfig::default();
    block_on(async {
        let s = Session::new(&adapter, addr(6), config);
        let outcome = select(s.connect(), Timer::after(Duration::from_millis(20))).await;
        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(s.state(), ConnectionState::Disconnected);
    });
}

#[test]
fn notifications_reach_subscription_in_order() {
    let adapter = sensor();
    adapter.notify(addr(1), TELEMETRY_HANDLE, &RAW);
    adapter.notify(addr(1), TELEMETRY_HANDLE, &[0x3A, 0xFF, 0, 0, 0, 0]);

    let mut readings = Vec::new();
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let mut sub = s.subscribe(telemetry::CHARACTERISTIC).await.unwrap();
        let collect = sub.for_each(|value| {
            readings.push(Telemetry::decode(value).unwrap().temperature);
            if readings.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(matches!(select(collect, s.pump()).await, Either::First(())));
        s.unsubscribe(sub).await.unwrap();
    });

    assert_eq!(readings, [100, -198]);
    let notify: Vec<_> = adapter
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SetNotify { handle, enable, .. } => Some((handle, enable)),
            _ => None,
        })
        .collect();
    assert_eq!(notify, [(TELEMETRY_HANDLE, true), (TELEMETRY_HANDLE, false)]);
}

#[test]
fn notification_burst_is_delivered_without_loss() {
    const BURST: u8 = 200;
    let adapter = sensor();
    for bpm in 0..BURST {
        adapter.notify(addr(1), HEART_RATE_HANDLE, &[0x00, bpm]);
    }

    let mut got = Vec::new();
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let mut sub = s.subscribe(uuids::HEART_RATE_MEASUREMENT).await.unwrap();
        let collect = sub.for_each(|value| {
            got.push(value[1]);
            if got.len() == usize::from(BURST) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(matches!(select(collect, s.pump()).await, Either::First(())));
    });

    assert_eq!(got, (0..BURST).collect::<Vec<_>>());
}

#[test]
fn interrupted_close_is_finished_by_the_next_close() {
    let adapter = MockAdapter::new().with_peer(
        addr(1),
        Peer::new(sensor_profile()).stalling_disconnects(1),
    );
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let outcome = select(s.close(), Timer::after(Duration::from_millis(20))).await;
        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(s.state(), ConnectionState::Disconnecting);

        s.close().await;
        assert_eq!(s.state(), ConnectionState::Disconnected);
    });
    assert_eq!(adapter.count(|c| *c == Call::Disconnect(addr(1))), 2);
}

#[test]
fn connect_after_interrupted_close_reconnects() {
    let adapter = MockAdapter::new().with_peer(
        addr(1),
        Peer::new(sensor_profile()).stalling_disconnects(1),
    );
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        select(s.close(), Timer::after(Duration::from_millis(20))).await;

        s.connect().await.unwrap();
        assert_eq!(s.state(), ConnectionState::Ready);
        s.close().await;
    });
    // The first link is torn down before the second connect.
    let calls: Vec<_> = adapter
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Connect(_) | Call::Disconnect(_)))
        .collect();
    assert_eq!(
        calls,
        [
            Call::Connect(addr(1)),
            Call::Disconnect(addr(1)),
            Call::Disconnect(addr(1)),
            Call::Connect(addr(1)),
            Call::Disconnect(addr(1)),
        ]
    );
}

#[test]
fn shared_handle_enabled_once_and_disabled_with_last_subscriber() {
    let adapter = sensor();
    adapter.notify(addr(1), HEART_RATE_HANDLE, &[0x00, 72]);
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let mut a = s.subscribe(uuids::HEART_RATE_MEASUREMENT).await.unwrap();
        let mut b = s.subscribe(uuids::HEART_RATE_MEASUREMENT).await.unwrap();

        let both = async { (a.next().await, b.next().await) };
        match select(both, s.pump()).await {
            Either::First((x, y)) => {
                assert_eq!(x, Some(vec![0x00, 72]));
                assert_eq!(y, Some(vec![0x00, 72]));
            }
            Either::Second(r) => panic!("pump ended: {r:?}"),
        }

        s.unsubscribe(a).await.unwrap();
        assert_eq!(adapter.count(|c| matches!(c, Call::SetNotify { enable: false, .. })), 0);
        s.unsubscribe(b).await.unwrap();
    });
    assert_eq!(adapter.count(|c| matches!(c, Call::SetNotify { enable: true, .. })), 1);
    assert_eq!(adapter.count(|c| matches!(c, Call::SetNotify { enable: false, .. })), 1);
}

#[test]
fn link_loss_ends_pump_and_subscriptions() {
    let adapter = sensor();
    adapter.drop_link(addr(1));
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let mut sub = s.subscribe(telemetry::CHARACTERISTIC).await.unwrap();
        assert_eq!(s.pump().await, Err(GattError::Disconnected));
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert_eq!(sub.next().await, None);
        assert!(!sub.is_active());
        assert_eq!(s.read(uuids::DEVICE_NAME).await, Err(GattError::Disconnected));
    });
}

#[test]
fn close_is_idempotent_and_stops_pump() {
    let adapter = sensor();
    block_on(async {
        let s = session::connect(&adapter, addr(1), quick()).await.unwrap();
        let closer = async {
            Timer::after(Duration::from_millis(10)).await;
            s.close().await;
        };
        let (pumped, ()) = futures::join!(s.pump(), closer);
        assert_eq!(pumped, Ok(()));
        s.close().await;
    });
    assert_eq!(adapter.count(|c| matches!(c, Call::Disconnect(_))), 1);
}

#[test]
fn with_session_closes_after_work() {
    let adapter = sensor();
    let name = block_on(with_session(&adapter, addr(1), quick(), async |s| {
        s.read(uuids::DEVICE_NAME).await
    }))
    .unwrap();
    assert_eq!(name.unwrap(), b"Thermo");
    assert_eq!(adapter.calls().last(), Some(&Call::Disconnect(addr(1))));
}

#[test]
fn with_session_reports_connect_failure() {
    let adapter = MockAdapter::new();
    let result = block_on(with_session(&adapter, addr(9), quick(), async |_| ()));
    assert!(matches!(result, Err(ConnectError::Refused(_))));
}

#[test]
fn device_info_tolerates_missing_fields() {
    let adapter = sensor();
    let info = block_on(with_session(&adapter, addr(1), quick(), async |s| {
        DeviceInfo::read(s).await
    }))
    .unwrap();
    assert_eq!(info.device_name.as_deref(), Some("Thermo"));
    assert_eq!(info.model_number, None);
    assert_eq!(info.manufacturer, None);
    assert_eq!(info.to_string(), "Device name : Thermo");
}

#[test]
fn display_name_falls_back_to_address() {
    let adapter = sensor().with_peer(addr(2), Peer::new(vec![]));
    let named = block_on(with_session(&adapter, addr(1), quick(), async |s| {
        device_info::display_name(s).await
    }))
    .unwrap();
    let unnamed = block_on(with_session(&adapter, addr(2), quick(), async |s| {
        device_info::display_name(s).await
    }))
    .unwrap();
    assert_eq!(named, "Thermo");
    assert_eq!(unnamed, addr(2).to_string());
}

#[test]
fn alert_level_direct_and_through_link_loss() {
    let adapter = sensor();
    let (direct, link_loss) = block_on(with_session(&adapter, addr(1), quick(), async |s| {
        (alert_level::read(s).await, alert_level::read_link_loss(s).await)
    }))
    .unwrap();
    assert_eq!(direct, Ok(2));
    assert_eq!(link_loss, Ok(1));
}

#[test]
fn alert_level_missing_service() {
    let adapter = MockAdapter::new().with_peer(addr(7), Peer::new(vec![]));
    let level = block_on(with_session(&adapter, addr(7), quick(), async |s| {
        alert_level::read_link_loss(s).await
    }))
    .unwrap();
    assert_eq!(level, Err(Error::Gatt(GattError::NotFound)));
}

#[test]
fn blink_writes_mode_change_command() {
    let adapter = sensor();
    block_on(with_session(&adapter, addr(1), quick(), async |s| blink::blink(s).await))
        .unwrap()
        .unwrap();
    assert!(adapter.calls().contains(&Call::Write {
        address: addr(1),
        handle: BLINK_HANDLE,
        value: blink::BLINK_COMMAND.to_vec(),
        kind: WriteKind::WithoutResponse,
    }));
}

#[test]
fn explorer_reports_values_and_errors() {
    let adapter = MockAdapter::new().with_peer(
        addr(8),
        Peer::new(sensor_profile()).with_value(TELEMETRY_CCCD, &[0x02, 0x00]),
    );
    let report = block_on(with_session(&adapter, addr(8), quick(), async |s| {
        explorer::explore(s).await
    }))
    .unwrap();

    assert_eq!(report.len(), 5);
    let telemetry = &report[0].characteristics[0];
    // Readable but the peer has no value: the ATT error is kept.
    assert_eq!(
        telemetry.value,
        Some(Err(GattError::Adapter(AdapterError::Att(0x0A))))
    );
    assert_eq!(telemetry.descriptors[0].value, Ok(vec![0x02, 0x00]));
    // Notify-only characteristics are not read.
    assert_eq!(report[0].characteristics[1].value, None);
}
