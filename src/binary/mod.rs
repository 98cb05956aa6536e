//! The `bplist00` binary format.
//!
//! # Layout
//! A binary plist is four consecutive regions:
//!   1. The 8-byte ASCII magic `bplist00`.
//!   2. The object table: every object serialized once, back to back.
//!   3. The offset table: one big-endian offset per object, each
//!      `offset_int_size` bytes wide, measured from the start of the buffer.
//!   4. The fixed 32-byte trailer described by [`Trailer`].
//!
//! Objects never embed each other. A container stores `object_ref_size`-wide
//! indices into the offset table, which is how one scalar can back any number
//! of references.
//!
//! # Marker bytes
//! Every object opens with a marker: type in the high nibble, length in the
//! low nibble. A low nibble of `0xF` means the real length follows as an
//! integer object.
//!
//! | high | object        | payload                                   |
//! |------|---------------|-------------------------------------------|
//! | 0x0  | bool/null     | none (`0x08` false, `0x09` true)          |
//! | 0x1  | integer       | `2^n` bytes, big-endian                   |
//! | 0x2  | real          | 4 or 8 bytes, big-endian IEEE-754         |
//! | 0x3  | date          | 8-byte f64 seconds since the plist epoch  |
//! | 0x4  | data          | raw bytes                                 |
//! | 0x5  | ASCII string  | raw bytes                                 |
//! | 0x6  | UTF-16 string | big-endian code units, length in units    |
//! | 0xA  | array         | element references                        |
//! | 0xD  | dict          | all key references, then all value refs   |
//!
//! Everything multi-byte is big-endian. There is no padding anywhere.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Error, Result};

mod reader;
mod writer;

pub use reader::decode;
pub use writer::encode;

/// 8-byte file magic. Only format revision `00` is supported.
pub const MAGIC: &[u8; 8] = b"bplist00";

/// Fixed trailer length in bytes.
pub const TRAILER_SIZE: usize = 32;

/// Smallest structurally valid binary plist:
/// magic (8) + one object (1) + one offset entry (1) + trailer (32).
pub const MIN_SIZE: usize = 42;

// ── Marker constants ─────────────────────────────────────────────────────────

pub const KIND_PRIMITIVE: u8 = 0x0;
pub const KIND_INT: u8 = 0x1;
pub const KIND_REAL: u8 = 0x2;
pub const KIND_DATE: u8 = 0x3;
pub const KIND_DATA: u8 = 0x4;
pub const KIND_ASCII: u8 = 0x5;
pub const KIND_UTF16: u8 = 0x6;
pub const KIND_ARRAY: u8 = 0xA;
pub const KIND_DICT: u8 = 0xD;

pub const MARKER_FALSE: u8 = 0x08;
pub const MARKER_TRUE: u8 = 0x09;
/// Dates are always `0x33`: type 0x3, 8-byte payload.
pub const MARKER_DATE: u8 = 0x33;
/// Low-nibble escape: the true length follows as an integer object.
pub const LEN_EXTENDED: u8 = 0x0F;

// ── Trailer ──────────────────────────────────────────────────────────────────

/// The fixed structure closing every binary plist: 6 reserved zero bytes,
/// the two width fields, then three 8-byte big-endian counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub offset_int_size: u8,
    pub object_ref_size: u8,
    pub num_objects: u64,
    pub top_object: u64,
    pub offset_table_offset: u64,
}

impl Trailer {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&[0u8; 6])?;
        writer.write_u8(self.offset_int_size)?;
        writer.write_u8(self.object_ref_size)?;
        writer.write_u64::<BigEndian>(self.num_objects)?;
        writer.write_u64::<BigEndian>(self.top_object)?;
        writer.write_u64::<BigEndian>(self.offset_table_offset)?;
        Ok(())
    }

    /// Reads the trailer from the last 32 bytes of `buf` and validates it
    /// against the buffer it claims to describe.
    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < MIN_SIZE {
            return Err(Error::TruncatedBuffer {
                needed: MIN_SIZE,
                available: buf.len(),
            });
        }
        let start = buf.len() - TRAILER_SIZE;
        let raw = &buf[start..];
        let trailer = Trailer {
            offset_int_size: raw[6],
            object_ref_size: raw[7],
            num_objects: BigEndian::read_u64(&raw[8..16]),
            top_object: BigEndian::read_u64(&raw[16..24]),
            offset_table_offset: BigEndian::read_u64(&raw[24..32]),
        };
        trailer.validate(buf.len())?;
        Ok(trailer)
    }

    fn validate(&self, buf_len: usize) -> Result<()> {
        let trailer_start = buf_len - TRAILER_SIZE;
        if !(1..=8).contains(&self.offset_int_size) {
            return Err(Error::InvalidObject {
                what: "trailer offset width",
                offset: trailer_start + 6,
            });
        }
        if !(1..=8).contains(&self.object_ref_size) {
            return Err(Error::InvalidObject {
                what: "trailer reference width",
                offset: trailer_start + 7,
            });
        }
        if self.num_objects == 0 {
            return Err(Error::InvalidObject {
                what: "trailer object count",
                offset: trailer_start + 8,
            });
        }
        if self.top_object >= self.num_objects {
            return Err(Error::InvalidReference {
                index: self.top_object as usize,
                count: self.num_objects as usize,
            });
        }
        if self.offset_table_offset < MAGIC.len() as u64 {
            return Err(Error::InvalidObject {
                what: "offset table position",
                offset: trailer_start + 24,
            });
        }
        // The whole offset table must sit between the objects and the trailer.
        let table_end = self
            .num_objects
            .checked_mul(u64::from(self.offset_int_size))
            .and_then(|bytes| self.offset_table_offset.checked_add(bytes));
        match table_end {
            Some(end) if end <= trailer_start as u64 => Ok(()),
            _ => Err(Error::TruncatedBuffer {
                needed: table_end
                    .unwrap_or(u64::MAX)
                    .saturating_add(TRAILER_SIZE as u64)
                    .min(usize::MAX as u64) as usize,
                available: buf_len,
            }),
        }
    }
}

// ── Width helpers ────────────────────────────────────────────────────────────

/// Smallest of {1, 2, 4, 8} that holds `value` big-endian.
pub fn min_int_size(value: u64) -> u8 {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    }
}

/// Writes `value` in exactly `size` big-endian bytes (`size` in 1..=8).
pub fn write_sized_int<W: Write>(mut writer: W, value: u64, size: u8) -> io::Result<()> {
    let bytes = value.to_be_bytes();
    writer.write_all(&bytes[8 - size as usize..])
}

/// Big-endian unsigned read of an arbitrary-width slice. Slices wider than
/// 8 bytes keep their low 64 bits, which is how 16-byte integers decode.
pub fn read_sized_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_trailer() -> Trailer {
        Trailer {
            offset_int_size: 1,
            object_ref_size: 1,
            num_objects: 1,
            top_object: 0,
            offset_table_offset: 9,
        }
    }

    // Minimal one-object plist: magic + `true` marker + offset table.
    fn minimal_buffer(trailer: &Trailer) -> Vec<u8> {
        let mut buf = MAGIC.to_vec();
        buf.push(MARKER_TRUE);
        buf.push(8);
        trailer.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn trailer_write_read_roundtrip() {
        let trailer = valid_trailer();
        let buf = minimal_buffer(&trailer);
        assert_eq!(buf.len(), MIN_SIZE);
        assert_eq!(Trailer::read(&buf).unwrap(), trailer);
    }

    #[test]
    fn short_buffer_is_truncated() {
        let err = Trailer::read(&MAGIC[..]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedBuffer { needed: MIN_SIZE, available: 8 }
        ));
    }

    #[test]
    fn zero_width_fields_are_rejected() {
        let mut trailer = valid_trailer();
        trailer.offset_int_size = 0;
        let buf = minimal_buffer(&trailer);
        assert!(matches!(
            Trailer::read(&buf),
            Err(Error::InvalidObject { what: "trailer offset width", .. })
        ));

        let mut trailer = valid_trailer();
        trailer.object_ref_size = 9;
        let buf = minimal_buffer(&trailer);
        assert!(matches!(
            Trailer::read(&buf),
            Err(Error::InvalidObject { what: "trailer reference width", .. })
        ));
    }

    #[test]
    fn top_object_must_be_in_range() {
        let mut trailer = valid_trailer();
        trailer.top_object = 3;
        let buf = minimal_buffer(&trailer);
        assert!(matches!(
            Trailer::read(&buf),
            Err(Error::InvalidReference { index: 3, count: 1 })
        ));
    }

    #[test]
    fn oversized_offset_table_is_truncated() {
        let mut trailer = valid_trailer();
        trailer.num_objects = 40;
        trailer.top_object = 0;
        let buf = minimal_buffer(&trailer);
        assert!(matches!(
            Trailer::read(&buf),
            Err(Error::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn min_int_size_boundaries() {
        assert_eq!(min_int_size(0), 1);
        assert_eq!(min_int_size(0xFF), 1);
        assert_eq!(min_int_size(0x100), 2);
        assert_eq!(min_int_size(0xFFFF), 2);
        assert_eq!(min_int_size(0x1_0000), 4);
        assert_eq!(min_int_size(0xFFFF_FFFF), 4);
        assert_eq!(min_int_size(0x1_0000_0000), 8);
        assert_eq!(min_int_size(u64::MAX), 8);
    }

    #[test]
    fn sized_int_roundtrip() {
        for &(value, size) in &[(0u64, 1u8), (0xAB, 1), (0xABCD, 2), (0xAB_CDEF, 4), (u64::MAX, 8)] {
            let mut buf = Vec::new();
            write_sized_int(&mut buf, value, size).unwrap();
            assert_eq!(buf.len(), size as usize);
            assert_eq!(read_sized_uint(&buf), value);
        }
    }

    #[test]
    fn wide_reads_keep_low_bits() {
        let bytes = [
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88,
            0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00,
        ];
        assert_eq!(read_sized_uint(&bytes), 0x99AA_BBCC_DDEE_FF00);
    }
}
