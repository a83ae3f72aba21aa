//! Crate-wide constants and runtime configuration.
//!
//! Timing parameters, queue depths and protocol constants live here so
//! they can be tuned in one place.  The runtime structs take their
//! defaults from these constants.

use embassy_time::Duration;

// BLE scanning

/// Duration of a discovery window (seconds).
pub const BLE_SCAN_DURATION_SECS: u64 = 5;

/// Length of one scan session when scanning in restart cycles (ms).
/// Each restart clears platform and scanner de-duplication state.
pub const BLE_SCAN_CYCLE_MS: u64 = 1_000;

/// Events buffered per scan subscriber before the oldest is dropped.
pub const SCAN_QUEUE_DEPTH: usize = 16;

/// Maximum stored length of an advertised local name (bytes).
pub const MAX_NAME_LEN: usize = 32;

// Connections

/// Time allowed for the link to come up (ms).
pub const BLE_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Time allowed for service/characteristic discovery (ms).
pub const BLE_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

// Command streams

/// Size of every command chunk written to a command characteristic.
pub const COMMAND_CHUNK_LEN: usize = 16;

/// LED badge frame: 8-pixel-wide bands across the display.
pub const BADGE_BANDS: usize = 7;

/// LED badge frame: pixel rows per band.
pub const BADGE_ROWS: usize = 11;

/// Session timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for the adapter connect primitive.
    pub connect_timeout: Duration,
    /// Deadline for service/characteristic discovery.
    pub discovery_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(BLE_CONNECT_TIMEOUT_MS),
            discovery_timeout: Duration::from_millis(BLE_DISCOVERY_TIMEOUT_MS),
        }
    }
}

impl SessionConfig {
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// How the scanner suppresses repeated advertisements within one scan session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dedup {
    /// Deliver every advertisement.
    Off,
    /// Deliver each address once.
    Address,
    /// Deliver an address again only when its name, manufacturer data or
    /// service data changed.
    #[default]
    Content,
}

/// Scanner behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanConfig {
    pub dedup: Dedup,
}

/// Geometry of a banded 1-bit display (see [`crate::command::bitmap`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayGeometry {
    /// Number of 8-pixel-wide bands, left to right.
    pub bands: usize,
    /// Rows per band, top to bottom.
    pub rows: usize,
}

impl DisplayGeometry {
    pub const fn new(bands: usize, rows: usize) -> Self {
        Self { bands, rows }
    }

    /// Smallest geometry covering a `width` x `height` pixel area.
    pub const fn covering(width: usize, height: usize) -> Self {
        Self {
            bands: width.div_ceil(8),
            rows: height,
        }
    }

    /// Packed payload length in bytes.
    pub const fn packed_len(&self) -> usize {
        self.bands * self.rows
    }
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self::new(BADGE_BANDS, BADGE_ROWS)
    }
}
