//! Environment sensor telemetry (temperature, pressure, humidity).
//!
//! The sensor broadcasts the record as manufacturer data under the test
//! company identifier and also indicates it on a vendor characteristic
//! once connected.
//!
//! | field       | wire   | display               |
//! |-------------|--------|-----------------------|
//! | temperature | i16 LE | raw / 100 °C          |
//! | pressure    | u16 LE | (raw + 50000) / 100 hPa |
//! | humidity    | u16 LE | raw / 100 %           |

use alloc::vec::Vec;
use core::fmt;

use uuid::Uuid;

use super::Centi;
use crate::ble::{uuids, DeviceDescriptor};
use crate::codec::{self, Field, Record, Schema, Value};
use crate::error::DecodeError;

/// Bluetooth SIG test company identifier.
pub const COMPANY_ID: u16 = 0xFFFF;

/// Characteristic carrying the record as indications.
pub const CHARACTERISTIC: Uuid = uuids::BME280_SENSOR;

pub const SCHEMA: Schema = Schema::new(&[
    Field::i16_le("temperature"),
    Field::u16_le("pressure"),
    Field::u16_le("humidity"),
]);

/// Pressure is sent as an offset from 500 hPa.
const PRESSURE_OFFSET: i32 = 50_000;

/// Raw sensor record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub temperature: i16,
    pub pressure: u16,
    pub humidity: u16,
}

impl Telemetry {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let record = codec::decode(&SCHEMA, buf)?;
        // Presence and range are guaranteed by the schema.
        Ok(Self {
            temperature: record.signed("temperature").unwrap_or_default() as i16,
            pressure: record.unsigned("pressure").unwrap_or_default() as u16,
            humidity: record.unsigned("humidity").unwrap_or_default() as u16,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SCHEMA.width());
        out.extend_from_slice(&self.temperature.to_le_bytes());
        out.extend_from_slice(&self.pressure.to_le_bytes());
        out.extend_from_slice(&self.humidity.to_le_bytes());
        out
    }

    pub fn record(&self) -> Record {
        Record::new()
            .with("temperature", Value::Signed(self.temperature.into()))
            .with("pressure", Value::Unsigned(self.pressure.into()))
            .with("humidity", Value::Unsigned(self.humidity.into()))
    }

    /// Record from the advertisement's manufacturer data, if present and
    /// long enough.
    pub fn from_advertisement(device: &DeviceDescriptor) -> Option<Self> {
        Self::decode(device.manufacturer(COMPANY_ID)?).ok()
    }

    /// Degrees Celsius.
    pub fn temperature(&self) -> Centi {
        Centi(self.temperature.into())
    }

    /// Hectopascal.
    pub fn pressure(&self) -> Centi {
        Centi(i32::from(self.pressure) + PRESSURE_OFFSET)
    }

    /// Percent relative humidity.
    pub fn humidity(&self) -> Centi {
        Centi(self.humidity.into())
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Temperature: {} °C", self.temperature())?;
        writeln!(f, "Humidity   : {} %", self.humidity())?;
        write!(f, "Pressure   : {} hPa", self.pressure())
    }
}
