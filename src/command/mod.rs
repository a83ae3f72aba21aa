//! Command sequencer.
//!
//! Some peripherals take commands as a stream of fixed 16-byte chunks on a
//! single characteristic: a few literal header commands followed by the
//! payload, zero-padded to a whole chunk.  The chunks must arrive in order,
//! each in its own write.
//!
//! ```text
//!  headers (as given)            payload, split and padded
//! ┌────────┬────────┬──...──┬────────┬────────┬──...──┬──────────┐
//! │ hdr 0  │ hdr 1  │       │ pay 0  │ pay 1  │       │ pay n|000│
//! └────────┴────────┴──...──┴────────┴────────┴──...──┴──────────┘
//! ```

pub mod bitmap;

use alloc::vec::Vec;
use core::ops::Deref;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::CharacteristicId;
use crate::config::COMMAND_CHUNK_LEN;
use crate::error::{BuildError, SendError};

/// One 16-byte command write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandChunk([u8; COMMAND_CHUNK_LEN]);

impl CommandChunk {
    pub const fn new(bytes: [u8; COMMAND_CHUNK_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy `data` (at most one chunk) and zero-fill the rest.
    fn padded(data: &[u8]) -> Self {
        let mut bytes = [0u8; COMMAND_CHUNK_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; COMMAND_CHUNK_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CommandChunk {
    type Error = usize;

    /// Fails with the slice length unless it is exactly one chunk.
    fn try_from(bytes: &[u8]) -> Result<Self, usize> {
        <[u8; COMMAND_CHUNK_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| bytes.len())
    }
}

impl AsRef<[u8]> for CommandChunk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Ordered chunks ready to be written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSequence {
    chunks: Vec<CommandChunk>,
    headers: usize,
}

impl CommandSequence {
    /// Number of leading header chunks.
    pub fn header_count(&self) -> usize {
        self.headers
    }

    pub fn payload_chunks(&self) -> &[CommandChunk] {
        &self.chunks[self.headers..]
    }
}

impl Deref for CommandSequence {
    type Target = [CommandChunk];

    fn deref(&self) -> &[CommandChunk] {
        &self.chunks
    }
}

/// Headers unchanged, then `payload` in zero-padded chunks.
///
/// A payload of `L` bytes yields `ceil(L / 16)` chunks; an exact multiple
/// of 16 gets no extra padding chunk.
pub fn build(headers: &[&[u8]], payload: &[u8]) -> Result<CommandSequence, BuildError> {
    let mut chunks = Vec::with_capacity(headers.len() + payload.len().div_ceil(COMMAND_CHUNK_LEN));
    for (index, header) in headers.iter().enumerate() {
        let chunk = CommandChunk::try_from(*header)
            .map_err(|len| BuildError::InvalidHeader { index, len })?;
        chunks.push(chunk);
    }
    chunks.extend(payload.chunks(COMMAND_CHUNK_LEN).map(CommandChunk::padded));
    Ok(CommandSequence {
        chunks,
        headers: headers.len(),
    })
}

/// Write every chunk in order, each awaited before the next.
///
/// Stops at the first failed write; the chunks before it have been
/// delivered and the peripheral is left partially updated.
pub async fn send<A: Adapter>(
    session: &Session<'_, A>,
    characteristic: impl Into<CharacteristicId>,
    sequence: &CommandSequence,
) -> Result<(), SendError> {
    let id = characteristic.into();
    for (index, chunk) in sequence.iter().enumerate() {
        if let Err(error) = session.write(id, chunk.as_ref()).await {
            warn!(
                "{}: command chunk {}/{} failed: {}",
                session.address(),
                index + 1,
                sequence.len(),
                error
            );
            return Err(SendError { index, error });
        }
    }
    debug!("{}: {} command chunks sent", session.address(), sequence.len());
    Ok(())
}
