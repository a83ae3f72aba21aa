//! Peripheral profiles built on the core.
//!
//! Each module pairs a wire format (described as a [`crate::codec::Schema`])
//! with the presentation rules and GATT identifiers of one kind of
//! peripheral.  Scaling and unit conversion happen here, never in the codec.

pub mod alert_level;
pub mod blink;
pub mod device_info;
pub mod explorer;
pub mod heart_rate;
pub mod led_badge;
pub mod proximity;
pub mod telemetry;

use core::fmt;

/// Fixed-point value with two decimals, printed without floating point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Centi(pub i32);

impl Centi {
    pub fn as_f32(self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl fmt::Display for Centi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
