//! Reference storage engine.
//!
//! A container file is a header followed by one section per schema node in
//! pre-order. All integers are little-endian.
//!
//! ```text
//! header   magic "FASTTRIE" | version u32 | flags u32 | format_len u32 | format
//! section  tag u8 | ordinal u32 | args_len u16 | args | body_len u64 | body
//! ```
//!
//! Build side: `section` writers and the two-phase `KeyedSink`.
//! Read side: `view::Container`, a tree of zero-copy views over the bytes.

pub mod hash;
pub mod keyed;
pub mod section;
pub mod view;

use std::io::{self, Write};

use crate::error::ReadError;

pub use keyed::{BuiltKeyed, KeyedSink, Slot};
pub use view::{Container, Entry, KeyedInstance, SectionView};

pub const MAGIC: &[u8; 8] = b"FASTTRIE";
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionTag {
    Flat = 1,
    Ragged = 2,
    Shape = 3,
    Trie = 4,
    Hash = 5,
    Pair = 6,
}

impl SectionTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => SectionTag::Flat,
            2 => SectionTag::Ragged,
            3 => SectionTag::Shape,
            4 => SectionTag::Trie,
            5 => SectionTag::Hash,
            6 => SectionTag::Pair,
            _ => return None,
        })
    }
}

pub fn write_header(out: &mut dyn Write, format: &str) -> io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&0u32.to_le_bytes())?; // flags
    out.write_all(&(format.len() as u32).to_le_bytes())?;
    out.write_all(format.as_bytes())
}

/// Returns the embedded format string and the offset of the first section.
pub fn read_header(bytes: &[u8]) -> Result<(&str, usize), ReadError> {
    let mut r = ByteReader::new(bytes);
    if r.take(MAGIC.len()).ok() != Some(MAGIC.as_slice()) {
        return Err(ReadError::InvalidMagic);
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(ReadError::UnsupportedVersion(version));
    }
    let _flags = r.u32()?;
    let len = r.u32()? as usize;
    let at = r.position();
    let format = std::str::from_utf8(r.take(len)?).map_err(|_| ReadError::Truncated(at))?;
    Ok((format, r.position()))
}

pub fn write_section(
    out: &mut dyn Write,
    tag: SectionTag,
    ordinal: u32,
    args: &[String],
    body: &[u8],
) -> io::Result<()> {
    let args = args.join(",");
    out.write_all(&[tag as u8])?;
    out.write_all(&ordinal.to_le_bytes())?;
    out.write_all(&(args.len() as u16).to_le_bytes())?;
    out.write_all(args.as_bytes())?;
    out.write_all(&(body.len() as u64).to_le_bytes())?;
    out.write_all(body)
}

pub(crate) fn put_u64s(body: &mut Vec<u8>, values: &[u64]) {
    for v in values {
        body.extend_from_slice(&v.to_le_bytes());
    }
}

/// Bounds-checked little-endian reads.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let end = self.pos.checked_add(n).ok_or(ReadError::Truncated(self.pos))?;
        let out = self.bytes.get(self.pos..end).ok_or(ReadError::Truncated(self.pos))?;
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ReadError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, ReadError> {
        let mut a = [0u8; 8];
        a.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(a))
    }

    /// `count` little-endian u64 values.
    pub fn u64s(&mut self, count: u64) -> Result<view::U64s<'a>, ReadError> {
        let n = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(8))
            .ok_or(ReadError::Truncated(self.pos))?;
        Ok(view::U64s::new(self.take(n)?))
    }

    /// Offset table for `items` items: `items + 1` values.
    pub fn offset_table(&mut self, items: u64) -> Result<view::U64s<'a>, ReadError> {
        let count = items.checked_add(1).ok_or(ReadError::Truncated(self.pos))?;
        self.u64s(count)
    }
}
