//! Device Information: name, model number and manufacturer.
//!
//! Every field is optional; a missing characteristic or a failed read
//! leaves that field empty instead of failing the whole query.

use alloc::string::{String, ToString};
use core::fmt;

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::uuids;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub model_number: Option<String>,
    pub manufacturer: Option<String>,
}

impl DeviceInfo {
    pub async fn read<A: Adapter>(session: &Session<'_, A>) -> Self {
        Self {
            device_name: read_string(session, uuids::DEVICE_NAME).await,
            model_number: read_string(session, uuids::MODEL_NUMBER).await,
            manufacturer: read_string(session, uuids::MANUFACTURER_NAME).await,
        }
    }
}

/// The peer's GAP device name, or its address when it has none.
pub async fn display_name<A: Adapter>(session: &Session<'_, A>) -> String {
    match read_string(session, uuids::DEVICE_NAME).await {
        Some(name) if !name.is_empty() => name,
        _ => session.address().to_string(),
    }
}

/// UTF-8 string characteristic; invalid sequences are replaced.
pub async fn read_string<A: Adapter>(session: &Session<'_, A>, uuid: Uuid) -> Option<String> {
    match session.read(uuid).await {
        Ok(value) => Some(String::from_utf8_lossy(&value).into_owned()),
        Err(e) => {
            debug!("{}: string read skipped: {}", session.address(), e);
            None
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Device name ", &self.device_name),
            ("Model number", &self.model_number),
            ("Manufacturer", &self.manufacturer),
        ];
        let mut first = true;
        for (label, value) in rows {
            if let Some(value) = value {
                if !first {
                    writeln!(f)?;
                }
                write!(f, "{label}: {value}")?;
                first = false;
            }
        }
        Ok(())
    }
}
