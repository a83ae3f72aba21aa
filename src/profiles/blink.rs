//! Mi Flora LED blink.

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::uuids;
use crate::error::GattError;

pub const CHARACTERISTIC: Uuid = uuids::DEVICE_MODE_CHANGE;

pub const BLINK_COMMAND: [u8; 2] = [0xFD, 0xFF];

/// Blink the sensor's LED once.
pub async fn blink<A: Adapter>(session: &Session<'_, A>) -> Result<(), GattError> {
    session
        .write_without_response(CHARACTERISTIC, &BLINK_COMMAND)
        .await
}
