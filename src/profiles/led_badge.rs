//! LSLED dot-matrix name badge.
//!
//! The badge takes a message as four 16-byte header commands followed by
//! the packed bitmap, all written in order to one characteristic.  The
//! second header carries the message length in 8-pixel bands (big
//! endian).

use uuid::Uuid;

use crate::ble::adapter::Adapter;
use crate::ble::session::Session;
use crate::ble::uuids;
use crate::command::bitmap::{self, Bitmap};
use crate::command::{self, CommandSequence};
use crate::config::{DisplayGeometry, COMMAND_CHUNK_LEN};
use crate::error::{BuildError, Error};

/// Advertised name prefix.
pub const NAME_PREFIX: &str = "LSLED";

pub const CHARACTERISTIC: Uuid = uuids::LED_BADGE_WRITE;

/// Header commands for the default 7-band frame.
pub const HEADERS: [[u8; COMMAND_CHUNK_LEN]; 4] = [
    *b"wang\x00\x00\x00\x0040000000",
    [0x00, 0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0; COMMAND_CHUNK_LEN],
    [0; COMMAND_CHUNK_LEN],
];

/// Header commands for a frame of `bands` bands.
pub fn headers(bands: u16) -> [[u8; COMMAND_CHUNK_LEN]; 4] {
    let mut headers = HEADERS;
    headers[1][..2].copy_from_slice(&bands.to_be_bytes());
    headers
}

/// Full command sequence for `image` on a display of `geometry`.
pub fn sequence(image: &Bitmap, geometry: DisplayGeometry) -> Result<CommandSequence, BuildError> {
    let headers = headers(geometry.bands as u16);
    let refs: [&[u8]; 4] = [&headers[0], &headers[1], &headers[2], &headers[3]];
    command::build(&refs, &bitmap::pack(image, geometry))
}

/// Show `image` on the badge.
pub async fn show<A: Adapter>(
    session: &Session<'_, A>,
    image: &Bitmap,
    geometry: DisplayGeometry,
) -> Result<(), Error> {
    let sequence = sequence(image, geometry)?;
    info!(
        "{}: sending {} command chunks",
        session.address(),
        sequence.len()
    );
    command::send(session, CHARACTERISTIC, &sequence).await?;
    Ok(())
}
