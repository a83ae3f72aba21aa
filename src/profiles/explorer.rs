//! Service explorer: dump every service, characteristic and descriptor of
//! a connected peripheral, with values where they can be read.

use alloc::vec::Vec;
use core::fmt;

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::{uuids, CharProps, Handle};
use crate::error::GattError;

pub struct DescriptorReport {
    pub uuid: Uuid,
    pub handle: Handle,
    pub value: Result<Vec<u8>, GattError>,
}

pub struct CharacteristicReport {
    pub uuid: Uuid,
    pub handle: Handle,
    pub props: CharProps,
    /// `None` when the characteristic is not readable.
    pub value: Option<Result<Vec<u8>, GattError>>,
    pub descriptors: Vec<DescriptorReport>,
}

pub struct ServiceReport {
    pub uuid: Uuid,
    pub handle: Handle,
    pub characteristics: Vec<CharacteristicReport>,
}

/// Read everything readable.  Read failures are captured per attribute.
pub async fn explore<A: Adapter>(session: &Session<'_, A>) -> Vec<ServiceReport> {
    let mut reports = Vec::new();
    for service in session.services() {
        let mut characteristics = Vec::with_capacity(service.characteristics.len());
        for ch in service.characteristics {
            let value = if ch.props.contains(CharProps::READ) {
                Some(session.read(ch.handle).await)
            } else {
                None
            };
            let mut descriptors = Vec::with_capacity(ch.descriptors.len());
            for d in ch.descriptors {
                descriptors.push(DescriptorReport {
                    uuid: d.uuid,
                    handle: d.handle,
                    value: session.read_descriptor(d.handle).await,
                });
            }
            characteristics.push(CharacteristicReport {
                uuid: ch.uuid,
                handle: ch.handle,
                props: ch.props,
                value,
                descriptors,
            });
        }
        reports.push(ServiceReport {
            uuid: service.uuid,
            handle: service.handle,
            characteristics,
        });
    }
    reports
}

struct Described<'a>(&'a Uuid);

impl fmt::Display for Described<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(uuids::name(self.0).unwrap_or("Unknown"))
    }
}

struct Bytes<'a>(&'a Option<Result<Vec<u8>, GattError>>);

impl fmt::Display for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "None"),
            Some(Ok(v)) => write!(f, "0x{}", hex::encode(v)),
            Some(Err(e)) => write!(f, "error: {e}"),
        }
    }
}

impl fmt::Display for ServiceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Description: {}", Described(&self.uuid))?;
        writeln!(f, "  UUID: {}", self.uuid)?;
        write!(f, "  Handle: {}", self.handle)?;
        for ch in &self.characteristics {
            writeln!(f)?;
            writeln!(f, "  - Description: {}", Described(&ch.uuid))?;
            writeln!(f, "    UUID: {}", ch.uuid)?;
            writeln!(f, "    Handle: {}", ch.handle)?;
            write!(f, "    Properties: ")?;
            for (i, name) in ch.props.names().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
            }
            writeln!(f)?;
            write!(f, "    Value: {}", Bytes(&ch.value))?;
            for d in &ch.descriptors {
                let value = Some(d.value.clone());
                writeln!(f)?;
                writeln!(f, "    - Description: {}", Described(&d.uuid))?;
                writeln!(f, "      UUID: {}", d.uuid)?;
                writeln!(f, "      Handle: {}", d.handle)?;
                write!(f, "      Value: {}", Bytes(&value))?;
            }
        }
        Ok(())
    }
}
