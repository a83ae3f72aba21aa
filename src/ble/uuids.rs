//! Assigned numbers and vendor UUIDs used by the bundled profiles.

use uuid::Uuid;

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`.
const BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit assigned number onto the Base UUID.
pub const fn from_u16(short: u16) -> Uuid {
    from_u32(short as u32)
}

/// Expand a 32-bit assigned number onto the Base UUID.
pub const fn from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BASE | ((short as u128) << 96))
}

/// The 16-bit alias of `uuid`, if it sits on the Base UUID.
pub fn as_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let short = (value >> 96) as u32;
    if value & !(0xFFFF_FFFFu128 << 96) == BASE && short <= u16::MAX as u32 {
        Some(short as u16)
    } else {
        None
    }
}

// Services
pub const GENERIC_ACCESS: Uuid = from_u16(0x1800);
pub const ALERT_LEVEL_SERVICE: Uuid = from_u16(0x1802);
pub const LINK_LOSS: Uuid = from_u16(0x1803);
pub const DEVICE_INFORMATION: Uuid = from_u16(0x180A);
pub const HEART_RATE: Uuid = from_u16(0x180D);
pub const EXPOSURE_NOTIFICATION_SERVICE: Uuid = from_u16(0xFD6F);

// Characteristics
pub const DEVICE_NAME: Uuid = from_u16(0x2A00);
pub const ALERT_LEVEL: Uuid = from_u16(0x2A06);
pub const MODEL_NUMBER: Uuid = from_u16(0x2A24);
pub const MANUFACTURER_NAME: Uuid = from_u16(0x2A29);
pub const HEART_RATE_MEASUREMENT: Uuid = from_u16(0x2A37);

// Descriptors
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = from_u16(0x2902);

// Vendor
/// Mi Flora "device mode change" characteristic (blinks the LED).
pub const DEVICE_MODE_CHANGE: Uuid = from_u16(0x1A00);
/// LSLED name badge write characteristic.
pub const LED_BADGE_WRITE: Uuid = from_u16(0xFEE1);
/// Environment sensor indication characteristic.
pub const BME280_SENSOR: Uuid = Uuid::from_u128(0x63bf0b19_2b9c_473c_9e0a_2cfcaf03a771);

/// Human-readable label for well-known UUIDs.
pub fn name(uuid: &Uuid) -> Option<&'static str> {
    const KNOWN: &[(Uuid, &str)] = &[
        (GENERIC_ACCESS, "Generic Access"),
        (ALERT_LEVEL_SERVICE, "Immediate Alert"),
        (LINK_LOSS, "Link Loss"),
        (DEVICE_INFORMATION, "Device Information"),
        (HEART_RATE, "Heart Rate"),
        (EXPOSURE_NOTIFICATION_SERVICE, "Exposure Notification"),
        (DEVICE_NAME, "Device Name"),
        (ALERT_LEVEL, "Alert Level"),
        (MODEL_NUMBER, "Model Number String"),
        (MANUFACTURER_NAME, "Manufacturer Name String"),
        (HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
        (CLIENT_CHARACTERISTIC_CONFIGURATION, "Client Characteristic Configuration"),
        (BME280_SENSOR, "BME280 Sensor"),
    ];
    KNOWN.iter().find(|(u, _)| u == uuid).map(|(_, n)| *n)
}
