//! Raw advertising-data parser.
//!
//! Walks the length/type/value AD structures of an advertisement (or scan
//! response) and fills a [`DeviceDescriptor`].  A malformed structure ends
//! the walk; whatever was parsed before it is kept.

use uuid::Uuid;

use super::uuids::{from_u16, from_u32};
use super::{truncated_name, Address, DeviceDescriptor};

const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_SERVICE_DATA_16: u8 = 0x16;
const AD_SERVICE_DATA_32: u8 = 0x20;
const AD_SERVICE_DATA_128: u8 = 0x21;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// Iterate `(ad_type, payload)` pairs of well-formed AD structures.
pub fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let payload = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, payload))
    })
}

/// Build a descriptor from raw advertising data.
pub fn parse_advertisement(address: Address, rssi: i16, data: &[u8]) -> DeviceDescriptor {
    let mut device = DeviceDescriptor::new(address, rssi);
    merge_advertisement(&mut device, data);
    device
}

/// Merge a scan response (or a second advertisement) into `device`.
pub fn merge_advertisement(device: &mut DeviceDescriptor, data: &[u8]) {
    for (ad_type, payload) in ad_structures(data) {
        match ad_type {
            AD_SHORTENED_LOCAL_NAME | AD_COMPLETE_LOCAL_NAME => {
                // A complete name wins over a shortened one; undecodable
                // names are skipped.
                if device.name.is_none() || ad_type == AD_COMPLETE_LOCAL_NAME {
                    if let Ok(name) = core::str::from_utf8(payload) {
                        device.name = Some(truncated_name(name));
                    }
                }
            }
            AD_MANUFACTURER_DATA if payload.len() >= 2 => {
                let company = u16::from_le_bytes([payload[0], payload[1]]);
                device
                    .manufacturer_data
                    .insert(company, payload[2..].to_vec());
            }
            AD_SERVICE_DATA_16 if payload.len() >= 2 => {
                let short = u16::from_le_bytes([payload[0], payload[1]]);
                device
                    .service_data
                    .insert(from_u16(short), payload[2..].to_vec());
            }
            AD_SERVICE_DATA_32 if payload.len() >= 4 => {
                let short = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                device
                    .service_data
                    .insert(from_u32(short), payload[4..].to_vec());
            }
            AD_SERVICE_DATA_128 if payload.len() >= 16 => {
                let mut le = [0u8; 16];
                le.copy_from_slice(&payload[..16]);
                device
                    .service_data
                    .insert(uuid_from_le(le), payload[16..].to_vec());
            }
            _ => {}
        }
    }
}

/// 128-bit UUIDs travel little-endian over the air.
fn uuid_from_le(mut le: [u8; 16]) -> Uuid {
    le.reverse();
    Uuid::from_bytes(le)
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
