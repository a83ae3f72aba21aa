//! Error taxonomy for blecentral.
//!
//! Expected outcomes (timeouts, missing characteristics, unsupported
//! capabilities) are typed results, never panics.  Each layer has its own
//! enum; [`Error`] unifies them for callers that do not care which layer
//! failed.

use alloc::string::String;
use core::fmt;

/// Failure reported by the platform adapter primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdapterError {
    /// Radio absent, powered off or not accessible.
    Unavailable,
    /// The link dropped while the operation was in flight.
    Disconnected,
    /// The value exceeds the negotiated transfer size.
    PayloadTooLarge { max: usize },
    /// The peer answered with an ATT error code.
    Att(u8),
    /// The scan could not be started or stopped.
    ScanFailed,
    /// The backend gave up waiting for the peer.
    Timeout,
    /// Backend-specific failure, described for the operator.
    Backend(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "bluetooth adapter unavailable"),
            Self::Disconnected => write!(f, "link disconnected"),
            Self::PayloadTooLarge { max } => write!(f, "payload exceeds {max} bytes"),
            Self::Att(code) => write!(f, "ATT error 0x{code:02x}"),
            Self::ScanFailed => write!(f, "scan failed"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Backend(msg) => write!(f, "{msg}"),
        }
    }
}

impl core::error::Error for AdapterError {}

/// Failure to bring a session to `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// No response to the connect primitive before the deadline.
    Timeout,
    /// The link came up but service discovery failed; the link was closed.
    DiscoveryFailed(AdapterError),
    /// The radio is absent or disabled.
    AdapterUnavailable,
    /// The adapter rejected the connection attempt.
    Refused(AdapterError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "connect timed out"),
            Self::DiscoveryFailed(e) => write!(f, "service discovery failed: {e}"),
            Self::AdapterUnavailable => write!(f, "bluetooth adapter unavailable"),
            Self::Refused(e) => write!(f, "connect failed: {e}"),
        }
    }
}

impl core::error::Error for ConnectError {}

impl From<AdapterError> for ConnectError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Unavailable => ConnectError::AdapterUnavailable,
            AdapterError::Timeout => ConnectError::Timeout,
            other => ConnectError::Refused(other),
        }
    }
}

/// Failure of a GATT operation on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattError {
    /// No discovered characteristic matches the identifier.
    NotFound,
    /// The characteristic lacks the capability the operation needs.
    Unsupported,
    /// The value exceeds the negotiated transfer size.
    PayloadTooLarge { len: usize, max: usize },
    /// Transport-level failure.
    Adapter(AdapterError),
    /// The session is not in the `Ready` state.
    Disconnected,
}

impl fmt::Display for GattError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "characteristic not found"),
            Self::Unsupported => write!(f, "operation not supported by characteristic"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds {max} bytes")
            }
            Self::Adapter(e) => write!(f, "{e}"),
            Self::Disconnected => write!(f, "not connected"),
        }
    }
}

impl core::error::Error for GattError {}

impl From<AdapterError> for GattError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Disconnected => GattError::Disconnected,
            other => GattError::Adapter(other),
        }
    }
}

/// Decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The buffer is shorter than the schema's total width.
    Truncated { needed: usize, available: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "buffer truncated: need {needed} bytes, got {available}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// Encode failure.  Each variant names the offending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The record carries a field the schema does not declare.
    UnknownField(&'static str),
    /// A schema field has no value in the record.
    MissingField(&'static str),
    /// An integer does not fit the field's width or signedness.
    OutOfRange(&'static str),
    /// A value's kind or byte length does not match the field.
    LengthMismatch(&'static str),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "field `{name}` not in schema"),
            Self::MissingField(name) => write!(f, "field `{name}` missing from record"),
            Self::OutOfRange(name) => write!(f, "value of `{name}` out of range"),
            Self::LengthMismatch(name) => write!(f, "value of `{name}` has the wrong shape"),
        }
    }
}

impl core::error::Error for EncodeError {}

/// Command sequence construction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuildError {
    /// Header command `index` is `len` bytes instead of one chunk.
    InvalidHeader { index: usize, len: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader { index, len } => {
                write!(f, "header command {index} is {len} bytes, expected 16")
            }
        }
    }
}

impl core::error::Error for BuildError {}

/// A chunk write failed; chunks before `index` were delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendError {
    pub index: usize,
    pub error: GattError,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command chunk {} failed: {}", self.index, self.error)
    }
}

impl core::error::Error for SendError {}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Adapter(AdapterError),
    Connect(ConnectError),
    Gatt(GattError),
    Decode(DecodeError),
    Encode(EncodeError),
    Build(BuildError),
    Send(SendError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter(e) => write!(f, "adapter: {e}"),
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Gatt(e) => write!(f, "gatt: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Encode(e) => write!(f, "encode: {e}"),
            Self::Build(e) => write!(f, "build: {e}"),
            Self::Send(e) => write!(f, "send: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// Convenience conversions

impl From<AdapterError> for Error {
    fn from(e: AdapterError) -> Self {
        Error::Adapter(e)
    }
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Error::Connect(e)
    }
}

impl From<GattError> for Error {
    fn from(e: GattError) -> Self {
        Error::Gatt(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Error::Build(e)
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Error::Send(e)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
