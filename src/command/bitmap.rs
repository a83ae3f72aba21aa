//! 1-bit pixel matrices and band packing for dot-matrix displays.
//!
//! The display is addressed as vertical bands 8 pixels wide.  Packing
//! walks band by band, left to right; within a band it walks rows top to
//! bottom and emits one byte per row, the leftmost pixel in the MSB.
//!
//! ```text
//!          band 0            band 1
//!        col 0 ... col 7   col 8 ... col 15
//! row 0  [b7  ...   b0 ]  [b7  ...   b0 ]     -> bytes: b0r0, b0r1, ..., b0rN,
//! row 1  [b7  ...   b0 ]  [b7  ...   b0 ]               b1r0, b1r1, ...
//! ```

use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::config::DisplayGeometry;

/// Row-major matrix of lit/unlit pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl Bitmap {
    /// All-unlit matrix.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: alloc::vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at `(x, y)`; anything outside the matrix is unlit.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x]
    }

    /// Ignored outside the matrix.
    pub fn set(&mut self, x: usize, y: usize, lit: bool) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = lit;
        }
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|p| **p).count()
    }
}

/// Error parsing the text form of a bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidPixel {
    pub row: usize,
    pub column: usize,
}

impl fmt::Display for InvalidPixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}, column {}: expected '#' or '.'",
            self.row + 1,
            self.column + 1
        )
    }
}

impl core::error::Error for InvalidPixel {}

impl FromStr for Bitmap {
    type Err = InvalidPixel;

    /// One line per row, `#` lit and `.` (or space) unlit.  Short rows are
    /// padded unlit to the longest row.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows: Vec<&str> = s.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut bitmap = Bitmap::new(width, rows.len());
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                match c {
                    '#' => bitmap.set(x, y, true),
                    '.' | ' ' => {}
                    _ => return Err(InvalidPixel { row: y, column: x }),
                }
            }
        }
        Ok(bitmap)
    }
}

/// Pack `bitmap` into `geometry.packed_len()` bytes.
///
/// Pixels outside the bitmap read as unlit, so a bitmap smaller than the
/// display is padded and a larger one is cropped.
pub fn pack(bitmap: &Bitmap, geometry: DisplayGeometry) -> Vec<u8> {
    let mut out = Vec::with_capacity(geometry.packed_len());
    for band in 0..geometry.bands {
        for row in 0..geometry.rows {
            let mut byte = 0u8;
            for column in 0..8 {
                if bitmap.get(band * 8 + column, row) {
                    byte |= 0x80 >> column;
                }
            }
            out.push(byte);
        }
    }
    out
}
