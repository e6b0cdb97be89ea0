//! Fixed-width field decoding with a byte order resolved at runtime.
//!
//! Every structure in a bbi file starts with a magic number. Comparing the
//! observed bytes with the expected constant tells us whether the numbers that
//! follow are big- or little-endian; afterwards all multi-byte fields are read
//! with that [`Endianness`].

use std::io::{Read, Seek, SeekFrom};

use byteordered::Endianness;
use bytes::Buf;

use crate::bbi::error::BBIReadError;

/// Determines the byte order of a structure by comparing its first four bytes
/// against `expected`. Returns `None` if the bytes match neither the literal
/// nor the byte-swapped constant.
pub fn detect_endianness(magic: [u8; 4], expected: u32) -> Option<Endianness> {
    if u32::from_le_bytes(magic) == expected {
        Some(Endianness::Little)
    } else if u32::from_be_bytes(magic) == expected {
        Some(Endianness::Big)
    } else {
        None
    }
}

// Lengths come from the file, so don't trust them for allocation
const MAX_PREALLOC: usize = 64 * 1024;

/// Reads exactly `len` bytes starting at the absolute `offset`.
pub fn read_at<R: Read + Seek>(
    read: &mut R,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>, BBIReadError> {
    read.seek(SeekFrom::Start(offset))?;
    let mut data = Vec::with_capacity(len.min(MAX_PREALLOC));
    Read::take(&mut *read, len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        return Err(BBIReadError::Truncated {
            offset,
            needed: len,
            available: data.len(),
        });
    }
    Ok(data)
}

/// Reads a magic number at `offset` and resolves the byte order it implies.
pub(crate) fn read_magic<R: Read + Seek>(
    read: &mut R,
    offset: u64,
    expected: u32,
    what: &'static str,
) -> Result<Endianness, BBIReadError> {
    let bytes = read_at(read, offset, 4)?;
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    detect_endianness(magic, expected).ok_or(BBIReadError::UnknownMagic {
        what,
        offset,
        expected,
        found: u32::from_be_bytes(magic),
    })
}

/// A cursor over a byte buffer that decodes fields in a fixed byte order.
///
/// `base_offset` is the absolute file offset of the first byte, used only so
/// that errors can point at the right place in the file.
#[derive(Clone, Debug)]
pub struct FieldBuf<'a> {
    bytes: &'a [u8],
    pos: usize,
    endianness: Endianness,
    base_offset: u64,
}

macro_rules! get_field {
    ($name:ident, $ty:ty, $be:ident, $le:ident) => {
        pub fn $name(&mut self) -> Result<$ty, BBIReadError> {
            let mut buf = self.bytes(std::mem::size_of::<$ty>())?;
            Ok(match self.endianness {
                Endianness::Big => buf.$be(),
                Endianness::Little => buf.$le(),
            })
        }
    };
}

impl<'a> FieldBuf<'a> {
    pub fn new(bytes: &'a [u8], endianness: Endianness) -> Self {
        FieldBuf::with_offset(bytes, endianness, 0)
    }

    pub fn with_offset(bytes: &'a [u8], endianness: Endianness, base_offset: u64) -> Self {
        FieldBuf {
            bytes,
            pos: 0,
            endianness,
            base_offset,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The absolute file offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    /// Takes the next `len` bytes as-is.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], BBIReadError> {
        if self.remaining() < len {
            return Err(BBIReadError::Truncated {
                offset: self.offset(),
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), BBIReadError> {
        self.bytes(len).map(|_| ())
    }

    pub fn get_u8(&mut self) -> Result<u8, BBIReadError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8, BBIReadError> {
        Ok(self.bytes(1)?[0] as i8)
    }

    get_field!(get_u16, u16, get_u16, get_u16_le);
    get_field!(get_i16, i16, get_i16, get_i16_le);
    get_field!(get_u32, u32, get_u32, get_u32_le);
    get_field!(get_i32, i32, get_i32, get_i32_le);
    get_field!(get_u64, u64, get_u64, get_u64_le);
    get_field!(get_i64, i64, get_i64, get_i64_le);
    get_field!(get_f32, f32, get_f32, get_f32_le);
    get_field!(get_f64, f64, get_f64, get_f64_le);
}
