//! Heart Rate Measurement notifications.
//!
//! Byte 0 carries flags, byte 1 the heart rate in beats per minute.  The
//! flags are not interpreted.

use core::ops::ControlFlow;

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::uuids;
use crate::codec::{self, Field, Schema};
use crate::error::{DecodeError, GattError};

pub const CHARACTERISTIC: Uuid = uuids::HEART_RATE_MEASUREMENT;

pub const SCHEMA: Schema = Schema::new(&[Field::u8("flags"), Field::u8("bpm")]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartRate {
    pub flags: u8,
    pub bpm: u8,
}

impl HeartRate {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let record = codec::decode(&SCHEMA, buf)?;
        Ok(Self {
            flags: record.unsigned("flags").unwrap_or_default() as u8,
            bpm: record.unsigned("bpm").unwrap_or_default() as u8,
        })
    }
}

/// Subscribe and hand every reading to `on_reading` until it breaks or the
/// subscription ends.  Malformed payloads are skipped.
///
/// Readings only arrive while the session is being pumped.
pub async fn watch<A, F>(session: &Session<'_, A>, mut on_reading: F) -> Result<(), GattError>
where
    A: Adapter,
    F: FnMut(HeartRate) -> ControlFlow<()>,
{
    let mut sub = session.subscribe(CHARACTERISTIC).await?;
    sub.for_each(|value| match HeartRate::decode(value) {
        Ok(reading) => on_reading(reading),
        Err(_) => ControlFlow::Continue(()),
    })
    .await;
    if session.is_ready() {
        session.unsubscribe(sub).await
    } else {
        Err(GattError::Disconnected)
    }
}
