//! Declarative binary codec for fixed-layout payloads.
//!
//! A [`Schema`] is an ordered list of fixed-width fields.  [`decode`] reads
//! the fields from the front of a buffer and yields raw values only; unit
//! scaling is left to the caller (see [`crate::profiles`]).  [`encode`] is
//! the exact inverse.
//!
//! ```text
//! TELEMETRY: | temperature i16le | pressure u16le | humidity u16le |
//!            0                   2                4                6
//! ```

use alloc::vec::Vec;

use crate::error::{DecodeError, EncodeError};

/// Byte order of an integer field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Wire representation of one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repr {
    /// Unsigned integer of `width` bytes (1..=8).
    Unsigned { width: usize, endian: Endian },
    /// Two's-complement integer of `width` bytes (1..=8).
    Signed { width: usize, endian: Endian },
    /// Opaque byte array of exactly `len` bytes.
    Bytes { len: usize },
}

impl Repr {
    pub const fn width(&self) -> usize {
        match *self {
            Repr::Unsigned { width, .. } | Repr::Signed { width, .. } => width,
            Repr::Bytes { len } => len,
        }
    }
}

/// A named field.  Built only through the constructors below, which keep
/// integer widths within 1..=8 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    name: &'static str,
    repr: Repr,
}

impl Field {
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn repr(&self) -> Repr {
        self.repr
    }

    pub const fn unsigned(name: &'static str, width: usize, endian: Endian) -> Self {
        assert!(width >= 1 && width <= 8, "integer width must be 1..=8 bytes");
        Self {
            name,
            repr: Repr::Unsigned { width, endian },
        }
    }

    pub const fn signed(name: &'static str, width: usize, endian: Endian) -> Self {
        assert!(width >= 1 && width <= 8, "integer width must be 1..=8 bytes");
        Self {
            name,
            repr: Repr::Signed { width, endian },
        }
    }

    pub const fn bytes(name: &'static str, len: usize) -> Self {
        Self {
            name,
            repr: Repr::Bytes { len },
        }
    }

    pub const fn u8(name: &'static str) -> Self {
        Self::unsigned(name, 1, Endian::Little)
    }

    pub const fn u16_le(name: &'static str) -> Self {
        Self::unsigned(name, 2, Endian::Little)
    }

    pub const fn i16_le(name: &'static str) -> Self {
        Self::signed(name, 2, Endian::Little)
    }
}

/// Ordered, fixed-width field layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Total byte width; the minimum buffer length [`decode`] accepts.
    pub const fn width(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].repr.width();
            i += 1;
        }
        total
    }

    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Raw field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Bytes(Vec<u8>),
}

/// Field values keyed by name, in schema order when produced by [`decode`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field value.
    pub fn insert(&mut self, name: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn unsigned(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn signed(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Signed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decode `buf` against `schema`.  Bytes past the schema width are ignored.
pub fn decode(schema: &Schema, buf: &[u8]) -> Result<Record, DecodeError> {
    let needed = schema.width();
    if buf.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: buf.len(),
        });
    }

    let mut record = Record {
        fields: Vec::with_capacity(schema.fields().len()),
    };
    let mut offset = 0;
    for field in schema.fields() {
        let width = field.repr.width();
        let raw = &buf[offset..offset + width];
        let value = match field.repr {
            Repr::Unsigned { endian, .. } => Value::Unsigned(read_uint(raw, endian)),
            Repr::Signed { endian, .. } => {
                let bits = 64 - 8 * width as u32;
                // Sign-extend from the field width.
                Value::Signed(((read_uint(raw, endian) << bits) as i64) >> bits)
            }
            Repr::Bytes { .. } => Value::Bytes(raw.to_vec()),
        };
        record.fields.push((field.name, value));
        offset += width;
    }
    Ok(record)
}

/// Encode `record` into a buffer of exactly `schema.width()` bytes.
pub fn encode(schema: &Schema, record: &Record) -> Result<Vec<u8>, EncodeError> {
    if let Some((name, _)) = record.iter().find(|(name, _)| schema.field(name).is_none()) {
        return Err(EncodeError::UnknownField(name));
    }

    let mut out = Vec::with_capacity(schema.width());
    for field in schema.fields() {
        let value = record
            .get(field.name)
            .ok_or(EncodeError::MissingField(field.name))?;
        match (field.repr, value) {
            (Repr::Bytes { len }, Value::Bytes(bytes)) if bytes.len() == len => {
                out.extend_from_slice(bytes);
            }
            (Repr::Bytes { .. }, _) => return Err(EncodeError::LengthMismatch(field.name)),
            (Repr::Unsigned { width, endian }, value) => {
                let v = integer(value).ok_or(EncodeError::LengthMismatch(field.name))?;
                let max = (1i128 << (8 * width)) - 1;
                if !(0..=max).contains(&v) {
                    return Err(EncodeError::OutOfRange(field.name));
                }
                write_uint(&mut out, v as u64, width, endian);
            }
            (Repr::Signed { width, endian }, value) => {
                let v = integer(value).ok_or(EncodeError::LengthMismatch(field.name))?;
                let half = 1i128 << (8 * width - 1);
                if !(-half..half).contains(&v) {
                    return Err(EncodeError::OutOfRange(field.name));
                }
                write_uint(&mut out, v as i64 as u64, width, endian);
            }
        }
    }
    Ok(out)
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Unsigned(v) => Some(*v as i128),
        Value::Signed(v) => Some(*v as i128),
        Value::Bytes(_) => None,
    }
}

fn read_uint(raw: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Little => raw
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
        Endian::Big => raw.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
    }
}

fn write_uint(out: &mut Vec<u8>, v: u64, width: usize, endian: Endian) {
    let le = v.to_le_bytes();
    match endian {
        Endian::Little => out.extend_from_slice(&le[..width]),
        Endian::Big => out.extend(le[..width].iter().rev()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
