//! Alert Level characteristic (0x2A06).
//!
//! The same characteristic appears in the Immediate Alert and Link Loss
//! services; it can be addressed by UUID alone (first match) or through a
//! specific service.

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::uuids;
use crate::codec::{self, Field, Schema};
use crate::error::{Error, GattError};

pub const CHARACTERISTIC: Uuid = uuids::ALERT_LEVEL;

pub const SCHEMA: Schema = Schema::new(&[Field::u8("level")]);

/// Alert level of the first Alert Level characteristic found.
pub async fn read<A: Adapter>(session: &Session<'_, A>) -> Result<u8, Error> {
    let value = session.read(CHARACTERISTIC).await?;
    decode(&value)
}

/// Alert level of the Link Loss service.
pub async fn read_link_loss<A: Adapter>(session: &Session<'_, A>) -> Result<u8, Error> {
    let characteristic = session
        .find(&uuids::LINK_LOSS, &CHARACTERISTIC)
        .ok_or(GattError::NotFound)?;
    let value = session.read(characteristic.handle).await?;
    decode(&value)
}

pub fn decode(value: &[u8]) -> Result<u8, Error> {
    let record = codec::decode(&SCHEMA, value)?;
    Ok(record.unsigned("level").unwrap_or_default() as u8)
}

pub fn describe(level: u8) -> &'static str {
    match level {
        0 => "no alert",
        1 => "mild alert",
        2 => "high alert",
        _ => "reserved",
    }
}
