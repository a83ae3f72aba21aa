//! Exposure Notification proximity broadcasts.
//!
//! Service data under 0xFD6F: a 16-byte Rolling Proximity Identifier
//! followed by 4 bytes of Associated Encryption Metadata.  Both are opaque
//! and reported as hex.

use alloc::string::String;
use core::fmt;

use uuid::Uuid;

use crate::ble::{uuids, Address, DeviceDescriptor};
use crate::codec::{self, Field, Schema};
use crate::error::DecodeError;

pub const SERVICE: Uuid = uuids::EXPOSURE_NOTIFICATION_SERVICE;

pub const SCHEMA: Schema = Schema::new(&[
    Field::bytes("rolling_proximity_identifier", 16),
    Field::bytes("associated_encryption_metadata", 4),
]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProximityBroadcast {
    pub address: Address,
    pub identifier: [u8; 16],
    pub metadata: [u8; 4],
}

impl ProximityBroadcast {
    pub fn decode(address: Address, buf: &[u8]) -> Result<Self, DecodeError> {
        let record = codec::decode(&SCHEMA, buf)?;
        let mut identifier = [0u8; 16];
        let mut metadata = [0u8; 4];
        if let Some(b) = record.bytes("rolling_proximity_identifier") {
            identifier.copy_from_slice(b);
        }
        if let Some(b) = record.bytes("associated_encryption_metadata") {
            metadata.copy_from_slice(b);
        }
        Ok(Self {
            address,
            identifier,
            metadata,
        })
    }

    pub fn from_advertisement(device: &DeviceDescriptor) -> Option<Self> {
        Self::decode(device.address, device.service(&SERVICE)?).ok()
    }

    pub fn identifier_hex(&self) -> String {
        hex::encode(self.identifier)
    }

    pub fn metadata_hex(&self) -> String {
        hex::encode(self.metadata)
    }
}

impl fmt::Display for ProximityBroadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Address                       : {}", self.address)?;
        writeln!(f, "Rolling Proximity Identifier  : 0x{}", self.identifier_hex())?;
        write!(f, "Associated Encryption Metadata: 0x{}", self.metadata_hex())
    }
}
