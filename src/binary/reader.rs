//! Binary plist decoder.
//!
//! Decoding is random access: the trailer names the offset table, the
//! offset table names every object, and containers hold indices back into
//! that table. Every read is bounds-checked against the buffer, every
//! in-progress object is tracked so a buffer whose references form a cycle
//! fails instead of recursing forever, and container nesting is capped at
//! [`MAX_DEPTH`] levels.

use byteorder::{BigEndian, ByteOrder};

use crate::date;
use crate::error::{Error, Result};
use crate::value::{Dictionary, Value};

use super::{
    read_sized_uint, Trailer, KIND_ARRAY, KIND_ASCII, KIND_DATA, KIND_DATE, KIND_DICT, KIND_INT,
    KIND_PRIMITIVE, KIND_REAL, KIND_UTF16, LEN_EXTENDED, MAGIC, MARKER_FALSE, MARKER_TRUE,
};

/// Deepest accepted container nesting. References nested further fail with
/// [`Error::InvalidObject`] instead of growing the stack without bound.
const MAX_DEPTH: usize = 512;

/// Decodes a complete `bplist00` buffer into a value tree.
pub fn decode(buf: &[u8]) -> Result<Value> {
    if buf.len() < MAGIC.len() || &buf[..MAGIC.len()] != MAGIC {
        return Err(Error::MalformedHeader);
    }
    let trailer = Trailer::read(buf)?;
    let mut reader = Reader::new(buf, trailer)?;
    reader.resolve(trailer.top_object as usize)
}

struct Reader<'a> {
    buf: &'a [u8],
    trailer: Trailer,
    offsets: Vec<usize>,
    in_flight: Vec<bool>,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], trailer: Trailer) -> Result<Self> {
        let count = trailer.num_objects as usize;
        let width = trailer.offset_int_size as usize;
        let table_start = trailer.offset_table_offset as usize;

        // Trailer validation already proved the table fits the buffer.
        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let entry_start = table_start + i * width;
            let offset = read_sized_uint(&buf[entry_start..entry_start + width]) as usize;
            if offset < MAGIC.len() || offset >= table_start {
                return Err(Error::InvalidObject {
                    what: "object offset",
                    offset: entry_start,
                });
            }
            offsets.push(offset);
        }

        Ok(Reader {
            buf,
            trailer,
            offsets,
            in_flight: vec![false; count],
            depth: 0,
        })
    }

    /// Resolves the object at table index `index`, guarding against
    /// out-of-range references, cycles and excessive nesting.
    fn resolve(&mut self, index: usize) -> Result<Value> {
        let count = self.offsets.len();
        if index >= count {
            return Err(Error::InvalidReference { index, count });
        }
        if self.in_flight[index] {
            return Err(Error::CyclicReference { index });
        }
        if self.depth >= MAX_DEPTH {
            return Err(Error::InvalidObject {
                what: "nesting depth",
                offset: self.offsets[index],
            });
        }
        self.in_flight[index] = true;
        self.depth += 1;
        let value = self.read_object(self.offsets[index]);
        self.depth -= 1;
        self.in_flight[index] = false;
        value
    }

    fn read_object(&mut self, offset: usize) -> Result<Value> {
        let marker = self.byte_at(offset)?;
        let kind = marker >> 4;
        let info = marker & 0x0F;
        match kind {
            KIND_PRIMITIVE => match marker {
                MARKER_FALSE => Ok(Value::Boolean(false)),
                MARKER_TRUE => Ok(Value::Boolean(true)),
                // Null (0x00) and fill (0x0F) have no model counterpart.
                _ => Err(Error::UnsupportedMarker { marker, offset }),
            },
            KIND_INT => self.read_integer(offset, info),
            KIND_REAL => self.read_real(offset, info),
            KIND_DATE => self.read_date(offset, info),
            KIND_DATA => {
                let (len, payload) = self.read_length(offset, info)?;
                Ok(Value::Data(self.slice_at(payload, len)?.to_vec()))
            }
            KIND_ASCII => self.read_ascii_string(offset, info),
            KIND_UTF16 => self.read_utf16_string(offset, info),
            KIND_ARRAY => self.read_array(offset, info),
            KIND_DICT => self.read_dict(offset, info),
            _ => Err(Error::UnsupportedMarker { marker, offset }),
        }
    }

    // ── Scalars ──────────────────────────────────────────────────────────────

    fn read_integer(&self, offset: usize, info: u8) -> Result<Value> {
        // Widths 1/2/4/8/16; anything else is not a plist integer.
        if info > 4 {
            return Err(Error::UnsupportedMarker {
                marker: (KIND_INT << 4) | info,
                offset,
            });
        }
        let bytes = self.slice_at(offset + 1, 1usize << info)?;
        // 1/2/4-byte values are unsigned, 8-byte is two's complement and
        // 16-byte payloads keep their low 64 bits; the cast covers all three.
        Ok(Value::Integer(read_sized_uint(bytes) as i64))
    }

    fn read_real(&self, offset: usize, info: u8) -> Result<Value> {
        match info {
            2 => {
                let bytes = self.slice_at(offset + 1, 4)?;
                Ok(Value::Real(f64::from(BigEndian::read_f32(bytes))))
            }
            3 => {
                let bytes = self.slice_at(offset + 1, 8)?;
                Ok(Value::Real(BigEndian::read_f64(bytes)))
            }
            _ => Err(Error::UnsupportedMarker {
                marker: (KIND_REAL << 4) | info,
                offset,
            }),
        }
    }

    fn read_date(&self, offset: usize, info: u8) -> Result<Value> {
        if info != 3 {
            return Err(Error::UnsupportedMarker {
                marker: (KIND_DATE << 4) | info,
                offset,
            });
        }
        let seconds = BigEndian::read_f64(self.slice_at(offset + 1, 8)?);
        match date::from_epoch_seconds(seconds) {
            Some(instant) => Ok(Value::Date(instant)),
            None => Err(Error::InvalidObject { what: "date", offset }),
        }
    }

    fn read_ascii_string(&self, offset: usize, info: u8) -> Result<Value> {
        let (len, payload) = self.read_length(offset, info)?;
        let bytes = self.slice_at(payload, len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Value::String(s.to_string())),
            Err(_) => Err(Error::InvalidObject { what: "string payload", offset }),
        }
    }

    fn read_utf16_string(&self, offset: usize, info: u8) -> Result<Value> {
        let (len, payload) = self.read_length(offset, info)?;
        let byte_len = len.checked_mul(2).ok_or(Error::TruncatedBuffer {
            needed: usize::MAX,
            available: self.buf.len(),
        })?;
        let bytes = self.slice_at(payload, byte_len)?;
        let units: Vec<u16> = bytes.chunks_exact(2).map(BigEndian::read_u16).collect();
        match String::from_utf16(&units) {
            Ok(s) => Ok(Value::String(s)),
            Err(_) => Err(Error::InvalidObject { what: "string payload", offset }),
        }
    }

    // ── Containers ───────────────────────────────────────────────────────────

    fn read_array(&mut self, offset: usize, info: u8) -> Result<Value> {
        let (len, refs_start) = self.read_length(offset, info)?;
        let refs = self.read_refs(refs_start, len)?;
        let mut items = Vec::with_capacity(len);
        for index in refs {
            items.push(self.resolve(index)?);
        }
        Ok(Value::Array(items))
    }

    fn read_dict(&mut self, offset: usize, info: u8) -> Result<Value> {
        let (len, refs_start) = self.read_length(offset, info)?;
        let ref_size = self.trailer.object_ref_size as usize;
        let key_refs = self.read_refs(refs_start, len)?;
        let value_refs = self.read_refs(refs_start + len * ref_size, len)?;

        let mut dict = Dictionary::new();
        for (key_index, value_index) in key_refs.into_iter().zip(value_refs) {
            let key = match self.resolve(key_index)? {
                Value::String(s) => s,
                _ => return Err(Error::InvalidObject { what: "dict key", offset }),
            };
            let value = self.resolve(value_index)?;
            dict.insert(key, value);
        }
        Ok(Value::Dict(dict))
    }

    fn read_refs(&self, offset: usize, count: usize) -> Result<Vec<usize>> {
        let ref_size = self.trailer.object_ref_size as usize;
        let total = count.checked_mul(ref_size).ok_or(Error::TruncatedBuffer {
            needed: usize::MAX,
            available: self.buf.len(),
        })?;
        let bytes = self.slice_at(offset, total)?;
        Ok(bytes
            .chunks_exact(ref_size)
            .map(|chunk| read_sized_uint(chunk) as usize)
            .collect())
    }

    // ── Cursor primitives ────────────────────────────────────────────────────

    /// Inline nibble length, or the following integer object when the nibble
    /// is the extension escape. Returns the length and the payload offset.
    fn read_length(&self, offset: usize, info: u8) -> Result<(usize, usize)> {
        if info != LEN_EXTENDED {
            return Ok((info as usize, offset + 1));
        }
        let marker = self.byte_at(offset + 1)?;
        if marker >> 4 != KIND_INT || marker & 0x0F > 3 {
            return Err(Error::UnsupportedMarker { marker, offset: offset + 1 });
        }
        let size = 1usize << (marker & 0x0F);
        let bytes = self.slice_at(offset + 2, size)?;
        Ok((read_sized_uint(bytes) as usize, offset + 2 + size))
    }

    fn byte_at(&self, offset: usize) -> Result<u8> {
        self.buf.get(offset).copied().ok_or(Error::TruncatedBuffer {
            needed: offset + 1,
            available: self.buf.len(),
        })
    }

    fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(Error::TruncatedBuffer {
            needed: usize::MAX,
            available: self.buf.len(),
        })?;
        self.buf.get(offset..end).ok_or(Error::TruncatedBuffer {
            needed: end,
            available: self.buf.len(),
        })
    }
}
