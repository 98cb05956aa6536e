//! Binary plist encoder.
//!
//! Two passes. The first walks the tree in pre-order and assigns every
//! object an index: containers always get a fresh slot, scalars are
//! deduplicated so each distinct string, number, date, bool or data blob is
//! serialized exactly once no matter how often the tree repeats it. The
//! second pass serializes the table in index order, then the offset table
//! and trailer. The root is visited first, so the top object is index 0.

use std::collections::HashMap;
use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::date;
use crate::error::Result;
use crate::value::Value;

use super::{
    min_int_size, write_sized_int, Trailer, KIND_ARRAY, KIND_ASCII, KIND_DATA, KIND_DICT,
    KIND_INT, KIND_REAL, KIND_UTF16, LEN_EXTENDED, MAGIC, MARKER_DATE, MARKER_FALSE, MARKER_TRUE,
};

/// Serializes `root` into a complete `bplist00` buffer.
pub fn encode(root: &Value) -> Result<Vec<u8>> {
    let mut table = ObjectTable::default();
    table.add_value(root);
    table.serialize()
}

// ── Object collection ────────────────────────────────────────────────────────

/// Dedup key for scalar objects. Reals are keyed by bit pattern and dates by
/// whole seconds, matching what actually lands on the wire.
#[derive(PartialEq, Eq, Hash)]
enum ScalarKey<'a> {
    String(&'a str),
    Integer(i64),
    Real(u64),
    Boolean(bool),
    Date(i64),
    Data(&'a [u8]),
}

enum TableEntry<'a> {
    String(&'a str),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(&'a DateTime<Utc>),
    Data(&'a [u8]),
    Array(Vec<usize>),
    Dict { key_refs: Vec<usize>, value_refs: Vec<usize> },
}

#[derive(Default)]
struct ObjectTable<'a> {
    entries: Vec<TableEntry<'a>>,
    dedup: HashMap<ScalarKey<'a>, usize>,
}

impl<'a> ObjectTable<'a> {
    /// Assigns `value` an object index, reusing an existing slot for an
    /// already-seen scalar.
    fn add_value(&mut self, value: &'a Value) -> usize {
        match value {
            Value::String(s) => self.add_string(s),
            Value::Integer(n) => self.add_scalar(ScalarKey::Integer(*n), TableEntry::Integer(*n)),
            Value::Real(r) => self.add_scalar(ScalarKey::Real(r.to_bits()), TableEntry::Real(*r)),
            Value::Boolean(b) => self.add_scalar(ScalarKey::Boolean(*b), TableEntry::Boolean(*b)),
            Value::Date(d) => self.add_scalar(ScalarKey::Date(d.timestamp()), TableEntry::Date(d)),
            Value::Data(bytes) => self.add_scalar(ScalarKey::Data(bytes), TableEntry::Data(bytes)),
            Value::Array(items) => {
                let index = self.push(TableEntry::Array(Vec::new()));
                let refs: Vec<usize> = items.iter().map(|item| self.add_value(item)).collect();
                self.entries[index] = TableEntry::Array(refs);
                index
            }
            Value::Dict(dict) => {
                let index = self.push(TableEntry::Dict {
                    key_refs: Vec::new(),
                    value_refs: Vec::new(),
                });
                let key_refs: Vec<usize> = dict.keys().map(|key| self.add_string(key)).collect();
                let value_refs: Vec<usize> =
                    dict.values().map(|value| self.add_value(value)).collect();
                self.entries[index] = TableEntry::Dict { key_refs, value_refs };
                index
            }
        }
    }

    /// Dict keys and string values share one dedup pool.
    fn add_string(&mut self, s: &'a str) -> usize {
        self.add_scalar(ScalarKey::String(s), TableEntry::String(s))
    }

    fn add_scalar(&mut self, key: ScalarKey<'a>, entry: TableEntry<'a>) -> usize {
        if let Some(&index) = self.dedup.get(&key) {
            return index;
        }
        let index = self.push(entry);
        self.dedup.insert(key, index);
        index
    }

    fn push(&mut self, entry: TableEntry<'a>) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    // ── Serialization ────────────────────────────────────────────────────────

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_all(MAGIC)?;

        let object_ref_size = min_int_size(self.entries.len() as u64 - 1);
        let mut offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            offsets.push(buf.len() as u64);
            write_object(&mut buf, entry, object_ref_size)?;
        }

        let offset_table_offset = buf.len() as u64;
        let offset_int_size = min_int_size(offsets.last().copied().unwrap_or(0));
        for &offset in &offsets {
            write_sized_int(&mut buf, offset, offset_int_size)?;
        }

        Trailer {
            offset_int_size,
            object_ref_size,
            num_objects: self.entries.len() as u64,
            top_object: 0,
            offset_table_offset,
        }
        .write(&mut buf)?;
        Ok(buf)
    }
}

// ── Object serialization ─────────────────────────────────────────────────────

fn write_object<W: Write>(writer: &mut W, entry: &TableEntry, ref_size: u8) -> io::Result<()> {
    match entry {
        TableEntry::Boolean(false) => writer.write_u8(MARKER_FALSE),
        TableEntry::Boolean(true) => writer.write_u8(MARKER_TRUE),
        TableEntry::Integer(n) => write_integer(writer, *n),
        TableEntry::Real(r) => {
            writer.write_u8((KIND_REAL << 4) | 0x3)?;
            writer.write_f64::<BigEndian>(*r)
        }
        TableEntry::Date(d) => {
            writer.write_u8(MARKER_DATE)?;
            writer.write_f64::<BigEndian>(date::to_epoch_seconds(d) as f64)
        }
        TableEntry::Data(bytes) => {
            write_marker(writer, KIND_DATA, bytes.len())?;
            writer.write_all(bytes)
        }
        TableEntry::String(s) => write_string(writer, s),
        TableEntry::Array(refs) => {
            write_marker(writer, KIND_ARRAY, refs.len())?;
            for &reference in refs {
                write_sized_int(&mut *writer, reference as u64, ref_size)?;
            }
            Ok(())
        }
        TableEntry::Dict { key_refs, value_refs } => {
            write_marker(writer, KIND_DICT, key_refs.len())?;
            for &reference in key_refs.iter().chain(value_refs) {
                write_sized_int(&mut *writer, reference as u64, ref_size)?;
            }
            Ok(())
        }
    }
}

/// Marker byte with an inline length, or the `0xF` escape followed by an
/// integer object carrying the true length.
fn write_marker<W: Write>(writer: &mut W, kind: u8, len: usize) -> io::Result<()> {
    if len < LEN_EXTENDED as usize {
        writer.write_u8((kind << 4) | len as u8)
    } else {
        writer.write_u8((kind << 4) | LEN_EXTENDED)?;
        write_integer(writer, len as i64)
    }
}

/// Minimal-width integer object. Negative values always take the full
/// 8 bytes so the sign survives zero-extending decoders.
fn write_integer<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    if value < 0 {
        writer.write_u8((KIND_INT << 4) | 0x3)?;
        return writer.write_i64::<BigEndian>(value);
    }
    match min_int_size(value as u64) {
        1 => {
            writer.write_u8(KIND_INT << 4)?;
            writer.write_u8(value as u8)
        }
        2 => {
            writer.write_u8((KIND_INT << 4) | 0x1)?;
            writer.write_u16::<BigEndian>(value as u16)
        }
        4 => {
            writer.write_u8((KIND_INT << 4) | 0x2)?;
            writer.write_u32::<BigEndian>(value as u32)
        }
        _ => {
            writer.write_u8((KIND_INT << 4) | 0x3)?;
            writer.write_i64::<BigEndian>(value)
        }
    }
}

/// All-ASCII strings use the byte-per-character form; anything else is
/// UTF-16BE with the length counted in code units, not bytes.
fn write_string<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    if s.is_ascii() {
        write_marker(writer, KIND_ASCII, s.len())?;
        writer.write_all(s.as_bytes())
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        write_marker(writer, KIND_UTF16, units.len())?;
        for unit in units {
            writer.write_u16::<BigEndian>(unit)?;
        }
        Ok(())
    }
}
