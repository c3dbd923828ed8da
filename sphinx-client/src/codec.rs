//! # Binary Codec
//!
//! Purpose: Encode request fields and decode response fields in the searchd
//! wire format (big-endian integers, IEEE-754 floats, u32-length-prefixed
//! strings without terminator).
//!
//! ## Design Principles
//! 1. **Accumulate, Then Check**: `Encoder` keeps the first error and turns
//!    every later append into a no-op, so a long run of appends is checked once.
//! 2. **Propagate With `?`**: Every `Decoder` read returns a `Result`; the first
//!    short read aborts the caller's whole parse and nothing partial escapes.
//! 3. **Schema-Driven Values**: Attribute values are decoded by the type the
//!    schema declares for their position, never by a per-value tag.
//! 4. **Bounded Allocation**: Counts are checked against the remaining bytes
//!    before any vector is sized from them.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use sphinx_common::{
    AttrDef, AttrType, AttrValue, FieldWeight, FilterKind, FilterValue, Match, Word,
    FILTER_FLOATRANGE, FILTER_RANGE, FILTER_VALUES,
};

/// Errors raised while building a request buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A string or list is too long for its u32 length prefix.
    #[error("length {len} does not fit in a u32 prefix")]
    LengthOverflow { len: usize },
    /// A discrete-set filter was given no values.
    #[error("filter on `{attribute}` has an empty value list")]
    EmptyFilterValues { attribute: String },
}

/// Errors raised while decoding a response buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes remain than the next field needs.
    #[error("unexpected end of response: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    /// A length or count field is negative when read as a signed integer.
    #[error("invalid length field {0:#010x}")]
    InvalidLength(u32),
    /// Status code outside OK/ERROR/RETRY/WARNING.
    #[error("unknown searchd status {0}")]
    UnknownStatus(u32),
    /// Filter kind code outside values/range/float range.
    #[error("unknown filter kind {0}")]
    UnknownFilterKind(u32),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Append-only big-endian writer with write-once error semantics.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
    error: Option<EncodeError>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Encoder {
            buf: BytesMut::with_capacity(capacity),
            error: None,
        }
    }

    pub fn put_u16(&mut self, value: u16) {
        if self.error.is_none() {
            self.buf.put_u16(value);
        }
    }

    pub fn put_u32(&mut self, value: u32) {
        if self.error.is_none() {
            self.buf.put_u32(value);
        }
    }

    pub fn put_u64(&mut self, value: u64) {
        if self.error.is_none() {
            self.buf.put_u64(value);
        }
    }

    pub fn put_f32(&mut self, value: f32) {
        if self.error.is_none() {
            self.buf.put_f32(value);
        }
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u32(u32::from(value));
    }

    /// Writes a u32 length prefix followed by the raw bytes.
    pub fn put_bytes(&mut self, data: &[u8]) {
        if self.error.is_some() {
            return;
        }
        match u32::try_from(data.len()) {
            Ok(len) => {
                self.buf.put_u32(len);
                self.buf.put_slice(data);
            }
            Err(_) => self.fail(EncodeError::LengthOverflow { len: data.len() }),
        }
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    /// Writes an element count as u32.
    pub fn put_count(&mut self, count: usize) {
        match u32::try_from(count) {
            Ok(count) => self.put_u32(count),
            Err(_) => self.fail(EncodeError::LengthOverflow { len: count }),
        }
    }

    /// Writes one filter: name, kind, kind-specific payload, exclude flag.
    pub fn put_filter(&mut self, filter: &FilterValue) {
        if self.error.is_some() {
            return;
        }
        if let FilterKind::Values(values) = &filter.kind {
            if values.is_empty() {
                self.fail(EncodeError::EmptyFilterValues {
                    attribute: filter.attribute.clone(),
                });
                return;
            }
        }

        self.put_str(&filter.attribute);
        self.put_u32(filter.kind.code());
        match &filter.kind {
            FilterKind::Values(values) => {
                self.put_count(values.len());
                for &value in values {
                    self.put_u64(value);
                }
            }
            FilterKind::Range { min, max } => {
                self.put_u64(*min);
                self.put_u64(*max);
            }
            FilterKind::FloatRange { min, max } => {
                self.put_f32(*min);
                self.put_f32(*max);
            }
        }
        self.put_bool(filter.exclude);
    }

    pub fn put_weight(&mut self, weight: &FieldWeight) {
        self.put_str(&weight.name);
        self.put_u32(weight.weight);
    }

    /// Writes a count followed by each name/weight pair.
    pub fn put_weights(&mut self, weights: &[FieldWeight]) {
        self.put_count(weights.len());
        for weight in weights {
            self.put_weight(weight);
        }
    }

    /// First error recorded, if any.
    pub fn error(&self) -> Option<&EncodeError> {
        self.error.as_ref()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the buffer, or the first error if any append failed.
    pub fn finish(self) -> Result<BytesMut, EncodeError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.buf),
        }
    }

    fn fail(&mut self, err: EncodeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Big-endian reader over a fixed response buffer.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get_u16(&mut self) -> DecodeResult<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn get_u32(&mut self) -> DecodeResult<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn get_u64(&mut self) -> DecodeResult<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn get_f32(&mut self) -> DecodeResult<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn get_bool(&mut self) -> DecodeResult<bool> {
        Ok(self.get_u32()? != 0)
    }

    /// Reads a length-prefixed string. Zero length is a valid empty string.
    ///
    /// Bytes that are not UTF-8 are replaced, since indexes may use legacy
    /// single-byte charsets.
    pub fn get_string(&mut self) -> DecodeResult<String> {
        let len = self.get_len()?;
        self.ensure(len)?;
        let value = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(value)
    }

    /// Reads an element count and checks that `count * item_size` bytes
    /// can still follow.
    pub fn get_count(&mut self, item_size: usize) -> DecodeResult<usize> {
        let count = self.get_len()?;
        self.ensure(count.saturating_mul(item_size))?;
        Ok(count)
    }

    /// Reads one filter record as written by [`Encoder::put_filter`].
    pub fn get_filter(&mut self) -> DecodeResult<FilterValue> {
        let attribute = self.get_string()?;
        let kind = match self.get_u32()? {
            FILTER_VALUES => {
                let count = self.get_count(8)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(self.get_u64()?);
                }
                FilterKind::Values(values)
            }
            FILTER_RANGE => FilterKind::Range {
                min: self.get_u64()?,
                max: self.get_u64()?,
            },
            FILTER_FLOATRANGE => FilterKind::FloatRange {
                min: self.get_f32()?,
                max: self.get_f32()?,
            },
            other => return Err(DecodeError::UnknownFilterKind(other)),
        };
        let exclude = self.get_bool()?;
        Ok(FilterValue {
            attribute,
            kind,
            exclude,
        })
    }

    pub fn get_field_weight(&mut self) -> DecodeResult<FieldWeight> {
        let name = self.get_string()?;
        let weight = self.get_u32()?;
        Ok(FieldWeight { name, weight })
    }

    /// Decodes one attribute value of the declared type.
    pub fn get_attr_value(&mut self, attr_type: AttrType) -> DecodeResult<AttrValue> {
        let value = match attr_type {
            AttrType::Float => AttrValue::Float(self.get_f32()?),
            AttrType::BigInt => AttrValue::BigInt(self.get_u64()? as i64),
            AttrType::String => AttrValue::String(self.get_string()?),
            AttrType::Multi => {
                let count = self.get_count(4)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(u64::from(self.get_u32()?));
                }
                AttrValue::Multi(values)
            }
            AttrType::Multi64 => {
                // Each element travels as two words; only the first is kept.
                let count = self.get_count(8)?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let low = self.get_u32()?;
                    let _high = self.get_u32()?;
                    values.push(u64::from(low));
                }
                AttrValue::Multi(values)
            }
            AttrType::Integer
            | AttrType::Timestamp
            | AttrType::Ordinal
            | AttrType::Bool
            | AttrType::Unknown(_) => AttrValue::Int(self.get_u32()?),
        };
        Ok(value)
    }

    /// Decodes one match against the response schema.
    pub fn get_match(&mut self, schema: &[AttrDef], id64: bool) -> DecodeResult<Match> {
        let doc_id = if id64 {
            self.get_u64()?
        } else {
            u64::from(self.get_u32()?)
        };
        let weight = self.get_u32()?;
        let mut attrs = Vec::with_capacity(schema.len());
        for def in schema {
            attrs.push(self.get_attr_value(def.attr_type)?);
        }
        Ok(Match {
            doc_id,
            weight,
            attrs,
        })
    }

    pub fn get_word(&mut self) -> DecodeResult<Word> {
        let word = self.get_string()?;
        let docs = self.get_u32()?;
        let hits = self.get_u32()?;
        Ok(Word { word, docs, hits })
    }

    fn get_len(&mut self) -> DecodeResult<usize> {
        let raw = self.get_u32()?;
        if (raw as i32) < 0 {
            return Err(DecodeError::InvalidLength(raw));
        }
        Ok(raw as usize)
    }

    fn ensure(&self, needed: usize) -> DecodeResult<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(DecodeError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }
}
