//! Payload encoder and decoder.
//!
//! Encoding is two-pass: [`Encoder::encoded_len`] walks the value tree once
//! to size it (and to reject anything that cannot be sent, so nothing is
//! written for a failing value), then the tree is written behind a header
//! carrying the total length.
//!
//! Decoding walks the payload with a bounds-checked cursor. Function-like
//! payloads are consumed structurally so the cursor stays aligned even
//! though the values themselves are not represented.

use crate::error::ProtocolError;
use crate::handshake::ProtocolVersion;
use crate::header::{ByteOrder, MessageHeader, MessageKind, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::temporal;
use crate::text::TextEncoding;
use crate::types::{FunctionKind, Kind, TypeTag, DICT_TAG, LIST_TAG, TABLE_TAG};
use crate::value::{Atom, Dict, Table, Value, Vector};
use crate::COMPRESSION_THRESHOLD;
use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;

/// Type byte, attribute byte and i32 count preceding every vector and list.
const VECTOR_PREFIX: usize = 6;

/// Deepest nesting of lists, dictionaries, tables and function payloads the
/// decoder accepts.
pub const MAX_DEPTH: usize = 128;

/// Serializes values into messages.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    version: ProtocolVersion,
    encoding: TextEncoding,
    order: ByteOrder,
    compression: bool,
}

impl Encoder {
    /// Creates a big-endian, Latin-1 encoder for `version`.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            encoding: TextEncoding::default(),
            order: ByteOrder::Big,
            compression: false,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Marks messages as eligible for compression. Compression itself is
    /// not implemented, so an eligible message over the threshold fails.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Encodes `value` as a complete message into `buf`.
    ///
    /// `buf` is cleared first, so a single buffer can be reused across
    /// requests. On error `buf` is left empty.
    pub fn encode_message(
        &self,
        kind: MessageKind,
        value: &Value,
        buf: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        buf.clear();

        let total = HEADER_SIZE + self.encoded_len(value)?;
        if total > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: total,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if self.compression && total > COMPRESSION_THRESHOLD {
            return Err(ProtocolError::CompressionUnsupported { size: total });
        }

        let header = MessageHeader::build(self.order, kind, false, total as i32);
        buf.reserve(total);
        buf.put_slice(header.as_bytes());
        self.writer(buf).value(value)?;

        debug_assert_eq!(buf.len(), total);
        Ok(())
    }

    /// Encodes `value` without a header, appending to `buf`.
    pub fn encode_value(&self, value: &Value, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = self.encoded_len(value)?;
        buf.reserve(len);
        self.writer(buf).value(value)
    }

    fn writer<'a>(&self, buf: &'a mut BytesMut) -> Writer<'a> {
        Writer {
            buf,
            order: self.order,
            encoding: self.encoding,
        }
    }

    /// Exact number of payload bytes `value` encodes to.
    ///
    /// Also rejects everything [`encode_message`](Self::encode_message)
    /// would: kinds gated above the negotiated version, text the encoding
    /// cannot represent, out-of-range temporals and function values.
    pub fn encoded_len(&self, value: &Value) -> Result<usize, ProtocolError> {
        match value {
            Value::Null => Ok(2),
            Value::Atom(atom) => self.atom_len(atom),
            Value::Vector(vector) => self.vector_len(vector),
            Value::List(items) => self.list_len(items),
            Value::Dict(dict) => {
                Ok(1 + self.encoded_len(&dict.keys)? + self.encoded_len(&dict.values)?)
            }
            Value::Table(table) => {
                let names = table
                    .columns
                    .iter()
                    .map(|c| self.symbol_len(c))
                    .sum::<Result<usize, _>>()?;
                // table tag, attribute, dict tag, symbol vector, column list
                Ok(3 + VECTOR_PREFIX + names + self.list_len(&table.data)?)
            }
            Value::Function(kind) => Err(ProtocolError::Unencodable(*kind)),
        }
    }

    fn list_len(&self, items: &[Value]) -> Result<usize, ProtocolError> {
        items
            .iter()
            .try_fold(VECTOR_PREFIX, |acc, item| Ok(acc + self.encoded_len(item)?))
    }

    fn symbol_len(&self, s: &str) -> Result<usize, ProtocolError> {
        Ok(self.encoding.terminated_len(s)? + 1)
    }

    fn atom_len(&self, atom: &Atom) -> Result<usize, ProtocolError> {
        let kind = atom.kind();
        self.version.check(kind)?;
        match atom {
            Atom::Symbol(s) => return Ok(1 + self.symbol_len(s)?),
            Atom::Timestamp(ts) => {
                temporal::timestamp_to_wire(ts)?;
            }
            _ => {}
        }
        Ok(1 + kind.width())
    }

    fn vector_len(&self, vector: &Vector) -> Result<usize, ProtocolError> {
        let kind = vector.kind();
        self.version.check(kind)?;
        let body = match vector {
            Vector::Char(s) => self.encoding.encoded_len(s)?,
            Vector::Symbol(items) => items
                .iter()
                .map(|s| self.symbol_len(s))
                .sum::<Result<usize, _>>()?,
            Vector::Timestamp(items) => {
                for ts in items {
                    temporal::timestamp_to_wire(ts)?;
                }
                items.len() * kind.width()
            }
            other => other.len() * kind.width(),
        };
        Ok(VECTOR_PREFIX + body)
    }
}

/// Order-aware writer over the send buffer.
struct Writer<'a> {
    buf: &'a mut BytesMut,
    order: ByteOrder,
    encoding: TextEncoding,
}

impl Writer<'_> {
    fn i16(&mut self, v: i16) {
        match self.order {
            ByteOrder::Big => self.buf.put_i16(v),
            ByteOrder::Little => self.buf.put_i16_le(v),
        }
    }

    fn i32(&mut self, v: i32) {
        match self.order {
            ByteOrder::Big => self.buf.put_i32(v),
            ByteOrder::Little => self.buf.put_i32_le(v),
        }
    }

    fn i64(&mut self, v: i64) {
        match self.order {
            ByteOrder::Big => self.buf.put_i64(v),
            ByteOrder::Little => self.buf.put_i64_le(v),
        }
    }

    fn f32(&mut self, v: f32) {
        match self.order {
            ByteOrder::Big => self.buf.put_f32(v),
            ByteOrder::Little => self.buf.put_f32_le(v),
        }
    }

    fn f64(&mut self, v: f64) {
        match self.order {
            ByteOrder::Big => self.buf.put_f64(v),
            ByteOrder::Little => self.buf.put_f64_le(v),
        }
    }

    fn guid(&mut self, g: &Uuid) {
        // Network order regardless of the message order.
        self.buf.put_slice(g.as_bytes());
    }

    fn symbol(&mut self, s: &str) -> Result<(), ProtocolError> {
        let bytes = self.encoding.encode_terminated(s)?;
        self.buf.put_slice(&bytes);
        self.buf.put_u8(0);
        Ok(())
    }

    fn prefix(&mut self, tag: i8, count: usize) {
        self.buf.put_i8(tag);
        self.buf.put_u8(0);
        self.i32(count as i32);
    }

    fn value(&mut self, value: &Value) -> Result<(), ProtocolError> {
        match value {
            Value::Null => {
                self.buf.put_i8(FunctionKind::UnaryPrimitive.code());
                self.buf.put_u8(0);
            }
            Value::Atom(atom) => {
                self.buf.put_i8(-atom.kind().code());
                self.atom(atom)?;
            }
            Value::Vector(vector) => self.vector(vector)?,
            Value::List(items) => self.list(items)?,
            Value::Dict(dict) => {
                self.buf.put_i8(DICT_TAG);
                self.value(&dict.keys)?;
                self.value(&dict.values)?;
            }
            Value::Table(table) => {
                self.buf.put_i8(TABLE_TAG);
                self.buf.put_u8(0);
                self.buf.put_i8(DICT_TAG);
                self.prefix(Kind::Symbol.code(), table.columns.len());
                for name in &table.columns {
                    self.symbol(name)?;
                }
                self.list(&table.data)?;
            }
            Value::Function(kind) => return Err(ProtocolError::Unencodable(*kind)),
        }
        Ok(())
    }

    fn list(&mut self, items: &[Value]) -> Result<(), ProtocolError> {
        self.prefix(LIST_TAG, items.len());
        items.iter().try_for_each(|item| self.value(item))
    }

    fn atom(&mut self, atom: &Atom) -> Result<(), ProtocolError> {
        match atom {
            Atom::Boolean(b) => self.buf.put_u8(u8::from(*b)),
            Atom::Guid(g) => self.guid(g),
            Atom::Byte(b) => self.buf.put_u8(*b),
            Atom::Short(v) => self.i16(*v),
            Atom::Int(v) => self.i32(*v),
            Atom::Long(v) => self.i64(*v),
            Atom::Real(v) => self.f32(*v),
            Atom::Float(v) => self.f64(*v),
            Atom::Char(c) => self.buf.put_u8(*c),
            Atom::Symbol(s) => self.symbol(s)?,
            Atom::Timestamp(ts) => self.i64(temporal::timestamp_to_wire(ts)?),
            Atom::Month(m) => self.i32(m.0),
            Atom::Date(d) => self.i32(temporal::date_to_wire(d)),
            Atom::Datetime(dt) => self.f64(temporal::datetime_to_wire(dt)),
            Atom::Timespan(n) => self.i64(n.0),
            Atom::Minute(u) => self.i32(u.0),
            Atom::Second(v) => self.i32(v.0),
            Atom::Time(t) => self.i32(temporal::time_to_wire(t)),
        }
        Ok(())
    }

    fn vector(&mut self, vector: &Vector) -> Result<(), ProtocolError> {
        let tag = vector.kind().code();
        match vector {
            Vector::Char(s) => {
                // Count is the encoded byte length, not the char count.
                let bytes = self.encoding.encode(s)?;
                self.prefix(tag, bytes.len());
                self.buf.put_slice(&bytes);
                return Ok(());
            }
            other => self.prefix(tag, other.len()),
        }
        match vector {
            Vector::Boolean(items) => items.iter().for_each(|b| self.buf.put_u8(u8::from(*b))),
            Vector::Guid(items) => items.iter().for_each(|g| self.guid(g)),
            Vector::Byte(items) => self.buf.put_slice(items),
            Vector::Short(items) => items.iter().for_each(|v| self.i16(*v)),
            Vector::Int(items) => items.iter().for_each(|v| self.i32(*v)),
            Vector::Long(items) => items.iter().for_each(|v| self.i64(*v)),
            Vector::Real(items) => items.iter().for_each(|v| self.f32(*v)),
            Vector::Float(items) => items.iter().for_each(|v| self.f64(*v)),
            Vector::Symbol(items) => {
                for s in items {
                    self.symbol(s)?;
                }
            }
            Vector::Timestamp(items) => {
                for ts in items {
                    self.i64(temporal::timestamp_to_wire(ts)?);
                }
            }
            Vector::Month(items) => items.iter().for_each(|m| self.i32(m.0)),
            Vector::Date(items) => items.iter().for_each(|d| self.i32(temporal::date_to_wire(d))),
            Vector::Datetime(items) => items
                .iter()
                .for_each(|dt| self.f64(temporal::datetime_to_wire(dt))),
            Vector::Timespan(items) => items.iter().for_each(|n| self.i64(n.0)),
            Vector::Minute(items) => items.iter().for_each(|u| self.i32(u.0)),
            Vector::Second(items) => items.iter().for_each(|v| self.i32(v.0)),
            Vector::Time(items) => items.iter().for_each(|t| self.i32(temporal::time_to_wire(t))),
            Vector::Char(_) => {}
        }
        Ok(())
    }
}

/// Deserializes message payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    encoding: TextEncoding,
}

impl Decoder {
    pub fn new(encoding: TextEncoding) -> Self {
        Self { encoding }
    }

    /// Decodes the payload of the message described by `header`.
    ///
    /// An error atom in the payload surfaces as [`ProtocolError::Remote`].
    pub fn decode_message<B: AsRef<[u8]>>(
        &self,
        header: &MessageHeader<B>,
        payload: &[u8],
    ) -> Result<Value, ProtocolError> {
        if header.is_compressed() {
            return Err(ProtocolError::CompressionUnsupported {
                size: HEADER_SIZE + payload.len(),
            });
        }
        self.decode_value(header.byte_order(), payload)
    }

    /// Decodes one value from the front of `payload`.
    pub fn decode_value(&self, order: ByteOrder, payload: &[u8]) -> Result<Value, ProtocolError> {
        Reader {
            buf: payload,
            order,
            encoding: self.encoding,
            depth: 0,
        }
        .value()
    }
}

/// Bounds-checked cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
    encoding: TextEncoding,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        Ok(())
    }

    /// Checks that `count` elements of `width` bytes are available.
    fn ensure_elements(&self, count: usize, width: usize) -> Result<(), ProtocolError> {
        let needed = count.checked_mul(width).ok_or(ProtocolError::Truncated {
            needed: usize::MAX,
            remaining: self.buf.remaining(),
        })?;
        self.ensure(needed)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn i8(&mut self) -> Result<i8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(match self.order {
            ByteOrder::Big => self.buf.get_i16(),
            ByteOrder::Little => self.buf.get_i16_le(),
        })
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(match self.order {
            ByteOrder::Big => self.buf.get_i32(),
            ByteOrder::Little => self.buf.get_i32_le(),
        })
    }

    fn i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(match self.order {
            ByteOrder::Big => self.buf.get_i64(),
            ByteOrder::Little => self.buf.get_i64_le(),
        })
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(match self.order {
            ByteOrder::Big => self.buf.get_f32(),
            ByteOrder::Little => self.buf.get_f32_le(),
        })
    }

    fn f64(&mut self) -> Result<f64, ProtocolError> {
        self.ensure(8)?;
        Ok(match self.order {
            ByteOrder::Big => self.buf.get_f64(),
            ByteOrder::Little => self.buf.get_f64_le(),
        })
    }

    fn guid(&mut self) -> Result<Uuid, ProtocolError> {
        let raw = self.take(16)?;
        Uuid::from_slice(raw).map_err(|e| ProtocolError::Encoding(e.to_string()))
    }

    fn count(&mut self) -> Result<usize, ProtocolError> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| ProtocolError::NegativeCount(n))
    }

    /// Reads a zero-terminated string and steps past the terminator.
    fn symbol(&mut self) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::Truncated {
                needed: self.buf.len() + 1,
                remaining: self.buf.len(),
            })?;
        let text = self.encoding.decode(&self.buf[..end])?;
        self.buf.advance(end + 1);
        Ok(text)
    }

    /// Reads `count` elements with `read`, after checking they fit.
    fn elements<T>(
        &mut self,
        count: usize,
        width: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        self.ensure_elements(count, width)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }

    fn value(&mut self) -> Result<Value, ProtocolError> {
        if self.depth == MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep { max: MAX_DEPTH });
        }
        self.depth += 1;
        let value = self.tagged();
        self.depth -= 1;
        value
    }

    fn tagged(&mut self) -> Result<Value, ProtocolError> {
        match TypeTag::lookup(self.i8()?)? {
            TypeTag::Error => Err(ProtocolError::Remote(self.symbol()?)),
            TypeTag::Atom(kind) => Ok(Value::Atom(self.atom(kind)?)),
            TypeTag::Vector(kind) => {
                self.u8()?;
                let count = self.count()?;
                Ok(Value::Vector(self.vector(kind, count)?))
            }
            TypeTag::List => {
                self.u8()?;
                let count = self.count()?;
                // Every element takes at least one byte.
                self.ensure(count)?;
                self.elements(count, 1, Self::value).map(Value::List)
            }
            TypeTag::Dict => {
                let keys = self.value()?;
                let values = self.value()?;
                Ok(Value::Dict(Dict {
                    keys: Box::new(keys),
                    values: Box::new(values),
                }))
            }
            TypeTag::Table => {
                self.u8()?;
                match self.value()? {
                    Value::Dict(dict) => Table::try_from(dict).map(Value::Table),
                    _ => Err(ProtocolError::InvalidTable("table body is not a dictionary")),
                }
            }
            TypeTag::Function(kind) => self.function(kind),
        }
    }

    /// Consumes a function-like payload.
    fn function(&mut self, kind: FunctionKind) -> Result<Value, ProtocolError> {
        match kind {
            FunctionKind::Lambda => {
                // context name, then the source text
                self.symbol()?;
                self.value()?;
            }
            FunctionKind::UnaryPrimitive | FunctionKind::Operator | FunctionKind::Iterator => {
                let code = self.u8()?;
                if kind == FunctionKind::UnaryPrimitive && code == 0 {
                    return Ok(Value::Null);
                }
            }
            FunctionKind::Projection | FunctionKind::Composition => {
                let n = self.i32()?;
                for _ in 0..n.max(0) {
                    self.value()?;
                }
            }
            _ => {
                self.value()?;
            }
        }
        Ok(Value::Function(kind))
    }

    fn atom(&mut self, kind: Kind) -> Result<Atom, ProtocolError> {
        Ok(match kind {
            Kind::Boolean => Atom::Boolean(self.u8()? != 0),
            Kind::Guid => Atom::Guid(self.guid()?),
            Kind::Byte => Atom::Byte(self.u8()?),
            Kind::Short => Atom::Short(self.i16()?),
            Kind::Int => Atom::Int(self.i32()?),
            Kind::Long => Atom::Long(self.i64()?),
            Kind::Real => Atom::Real(self.f32()?),
            Kind::Float => Atom::Float(self.f64()?),
            Kind::Char => Atom::Char(self.u8()?),
            Kind::Symbol => Atom::Symbol(self.symbol()?),
            Kind::Timestamp => Atom::Timestamp(temporal::timestamp_from_wire(self.i64()?)?),
            Kind::Month => Atom::Month(temporal::Month(self.i32()?)),
            Kind::Date => Atom::Date(temporal::date_from_wire(self.i32()?)?),
            Kind::Datetime => Atom::Datetime(temporal::datetime_from_wire(self.f64()?)?),
            Kind::Timespan => Atom::Timespan(temporal::Timespan(self.i64()?)),
            Kind::Minute => Atom::Minute(temporal::Minute(self.i32()?)),
            Kind::Second => Atom::Second(temporal::Second(self.i32()?)),
            Kind::Time => Atom::Time(temporal::time_from_wire(self.i32()?)),
        })
    }

    fn vector(&mut self, kind: Kind, n: usize) -> Result<Vector, ProtocolError> {
        let w = kind.width();
        Ok(match kind {
            Kind::Char => {
                let raw = self.take(n)?;
                Vector::Char(self.encoding.decode(raw)?)
            }
            Kind::Byte => Vector::Byte(self.take(n)?.to_vec()),
            // At least the terminator per symbol.
            Kind::Symbol => Vector::Symbol(self.elements(n, 1, Self::symbol)?),
            Kind::Boolean => Vector::Boolean(self.elements(n, w, |r| Ok(r.u8()? != 0))?),
            Kind::Guid => Vector::Guid(self.elements(n, w, Self::guid)?),
            Kind::Short => Vector::Short(self.elements(n, w, Self::i16)?),
            Kind::Int => Vector::Int(self.elements(n, w, Self::i32)?),
            Kind::Long => Vector::Long(self.elements(n, w, Self::i64)?),
            Kind::Real => Vector::Real(self.elements(n, w, Self::f32)?),
            Kind::Float => Vector::Float(self.elements(n, w, Self::f64)?),
            Kind::Timestamp => Vector::Timestamp(
                self.elements(n, w, |r| temporal::timestamp_from_wire(r.i64()?))?,
            ),
            Kind::Month => Vector::Month(self.elements(n, w, |r| Ok(temporal::Month(r.i32()?)))?),
            Kind::Date => Vector::Date(self.elements(n, w, |r| temporal::date_from_wire(r.i32()?))?),
            Kind::Datetime => Vector::Datetime(
                self.elements(n, w, |r| temporal::datetime_from_wire(r.f64()?))?,
            ),
            Kind::Timespan => {
                Vector::Timespan(self.elements(n, w, |r| Ok(temporal::Timespan(r.i64()?)))?)
            }
            Kind::Minute => Vector::Minute(self.elements(n, w, |r| Ok(temporal::Minute(r.i32()?)))?),
            Kind::Second => Vector::Second(self.elements(n, w, |r| Ok(temporal::Second(r.i32()?)))?),
            Kind::Time => Vector::Time(self.elements(n, w, |r| Ok(temporal::time_from_wire(r.i32()?)))?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Frame;
    use crate::temporal::{Minute, Month, Second, Timespan, NULL_INT, NULL_LONG};
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use proptest::prelude::*;

    fn encoder() -> Encoder {
        Encoder::new(ProtocolVersion::MAX)
    }

    fn payload(value: &Value) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encoder().encode_value(value, &mut buf).unwrap();
        buf.to_vec()
    }

    fn roundtrip_with(enc: Encoder, value: &Value) -> Value {
        let mut buf = BytesMut::new();
        enc.encode_message(MessageKind::Sync, value, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + enc.encoded_len(value).unwrap());

        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        Decoder::new(enc.encoding())
            .decode_message(&frame.header, &frame.payload)
            .unwrap()
    }

    fn roundtrip(value: &Value) -> Value {
        let big = roundtrip_with(encoder(), value);
        let little = roundtrip_with(encoder().with_byte_order(ByteOrder::Little), value);
        assert_eq!(big, little);
        big
    }

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, nanos).unwrap()
    }

    #[test]
    fn test_atoms_roundtrip() {
        let atoms: Vec<Value> = vec![
            true.into(),
            false.into(),
            Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef).into(),
            0xABu8.into(),
            (-5i16).into(),
            i32::MAX.into(),
            5i64.into(),
            1.5f32.into(),
            (-2.25f64).into(),
            Value::Atom(Atom::Char(b'x')),
            "hello".into(),
            "".into(),
            ts(1_700_000_000, 123_456_789).into(),
            Month(22).into(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().into(),
            NaiveDate::from_ymd_opt(1999, 12, 31)
                .unwrap()
                .and_hms_milli_opt(23, 59, 59, 999)
                .unwrap()
                .into(),
            Timespan(-86_400_000_000_001).into(),
            Minute(61).into(),
            Second(3_601).into(),
            NaiveTime::from_hms_milli_opt(12, 10, 1, 5).unwrap().into(),
        ];
        for atom in atoms {
            assert_eq!(roundtrip(&atom), atom, "{atom:?}");
        }
    }

    #[test]
    fn test_null_sentinels_roundtrip() {
        let nulls: Vec<Value> = vec![
            NULL_LONG.into(),
            NULL_INT.into(),
            i16::MIN.into(),
            temporal::NULL_TIMESTAMP.into(),
            temporal::NULL_DATE.into(),
            temporal::NULL_DATETIME.into(),
            temporal::null_time().into(),
            Month::NULL.into(),
            Minute::NULL.into(),
            Second::NULL.into(),
            Timespan::NULL.into(),
            Uuid::nil().into(),
        ];
        for null in nulls {
            assert_eq!(roundtrip(&null), null, "{null:?}");
        }

        // NaN never compares equal, check by kind
        for v in [Value::from(f64::NAN), Value::from(f32::NAN)] {
            let atom = roundtrip(&v);
            assert!(atom.as_atom().unwrap().is_null());
        }
    }

    #[test]
    fn test_null_sentinel_bytes() {
        assert_eq!(
            payload(&NULL_LONG.into()),
            [0xF9, 0x80, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            payload(&temporal::NULL_DATE.into()),
            [0xF2, 0x80, 0, 0, 0]
        );
        assert_eq!(
            payload(&temporal::null_time().into()),
            [0xED, 0x80, 0, 0, 0]
        );
        let datetime = payload(&temporal::NULL_DATETIME.into());
        assert_eq!(datetime[0], 0xF1);
        assert!(f64::from_be_bytes(datetime[1..].try_into().unwrap()).is_nan());
        assert_eq!(payload(&Value::Null), [101, 0]);
    }

    #[test]
    fn test_vectors_roundtrip() {
        let vectors: Vec<Value> = vec![
            vec![true, false, true].into(),
            vec![Uuid::from_u128(1), Uuid::nil()].into(),
            vec![0u8, 1, 255].into(),
            vec![1i16, i16::MIN].into(),
            vec![1i32, NULL_INT, -7].into(),
            vec![1i64, NULL_LONG].into(),
            vec![0.5f32, -1.0].into(),
            vec![0.25f64, 1e300].into(),
            Value::chars("2+3"),
            Value::chars(""),
            Value::symbols(["a", "", "ccc"]),
            vec![ts(0, 0), temporal::NULL_TIMESTAMP].into(),
            vec![Month(0), Month::NULL].into(),
            vec![NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()].into(),
            vec![Timespan(1), Timespan::NULL].into(),
            vec![Minute(0), Minute(1439)].into(),
            vec![Second(0)].into(),
            vec![NaiveTime::from_hms_opt(23, 59, 59).unwrap()].into(),
            Value::Vector(Vector::empty(Kind::Long)),
            Value::Vector(Vector::empty(Kind::Symbol)),
        ];
        for vector in vectors {
            assert_eq!(roundtrip(&vector), vector, "{vector:?}");
        }
    }

    #[test]
    fn test_nested_list_roundtrip() {
        let value = Value::List(vec![
            1i64.into(),
            Value::chars("text"),
            Value::List(vec![Value::Null, "sym".into()]),
            Value::List(vec![]),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_dict_roundtrip() {
        let dict = Dict::new(
            Value::symbols(["a"]),
            Value::List(vec![vec![1i64, 2, 3].into()]),
        )
        .unwrap();
        let value = Value::Dict(dict);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_table_roundtrip() {
        let table = Table::new(
            vec!["a".into()],
            vec![vec![1i64, 2, 3].into()],
        )
        .unwrap();
        let value = Value::Table(table.clone());
        let decoded = roundtrip(&value);
        assert_eq!(decoded, value);
        let Value::Table(decoded) = decoded else {
            panic!("expected table");
        };
        assert_eq!(decoded.columns, table.columns);
        assert_eq!(decoded.data, table.data);
    }

    #[test]
    fn test_zero_row_table_roundtrip() {
        let table = Table::new(
            vec!["sym".into(), "px".into()],
            vec![
                Value::Vector(Vector::empty(Kind::Symbol)),
                Value::Vector(Vector::empty(Kind::Float)),
            ],
        )
        .unwrap();
        let value = Value::Table(table);
        let decoded = roundtrip(&value);
        assert_eq!(decoded, value);
        let Value::Table(t) = decoded else {
            panic!("expected table");
        };
        assert_eq!(t.row_count(), 0);
        assert_eq!(t.columns, vec!["sym".to_string(), "px".to_string()]);
    }

    #[test]
    fn test_table_wire_layout() {
        let table = Table::new(vec!["a".into()], vec![vec![7i32].into()]).unwrap();
        assert_eq!(
            payload(&Value::Table(table)),
            [
                98, 0, 99, // table, attribute, dict
                11, 0, 0, 0, 0, 1, b'a', 0, // column names
                0, 0, 0, 0, 0, 1, // general list of one column
                6, 0, 0, 0, 0, 1, 0, 0, 0, 7,
            ]
        );
    }

    #[test]
    fn test_guid_requires_version_3() {
        let value: Value = Uuid::from_u128(42).into();
        let v2 = Encoder::new(ProtocolVersion::new(2));
        let mut buf = BytesMut::new();
        let err = v2
            .encode_message(MessageKind::Sync, &value, &mut buf)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::VersionUnsupported {
                kind: "guid",
                required: 3,
                negotiated: 2
            }
        ));
        assert!(buf.is_empty());

        // Nested gated values are caught before anything is written.
        let nested = Value::List(vec![1i64.into(), vec![Uuid::nil()].into()]);
        assert!(v2.encode_message(MessageKind::Sync, &nested, &mut buf).is_err());
        assert!(buf.is_empty());

        assert_eq!(roundtrip_with(Encoder::new(ProtocolVersion::new(3)), &value), value);
    }

    #[test]
    fn test_timestamp_and_timespan_require_version_1() {
        let v0 = Encoder::new(ProtocolVersion::new(0));
        for value in [Value::from(ts(0, 0)), Value::from(vec![Timespan(1)])] {
            assert!(matches!(
                v0.encoded_len(&value),
                Err(ProtocolError::VersionUnsupported { required: 1, .. })
            ));
        }
        let v1 = Encoder::new(ProtocolVersion::new(1));
        assert!(v1.encoded_len(&Value::from(Timespan(1))).is_ok());
        assert!(v0.encoded_len(&Value::from(NaiveDate::MAX)).is_ok());
    }

    #[test]
    fn test_byte_order_follows_each_header() {
        let value: Value = vec![1i32, 258].into();
        let mut buf = BytesMut::new();

        encoder()
            .with_byte_order(ByteOrder::Little)
            .encode_message(MessageKind::Response, &value, &mut buf)
            .unwrap();
        let little = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(little.header.byte_order(), ByteOrder::Little);
        assert_eq!(&little.payload[2..6], &[2, 0, 0, 0]);
        assert_eq!(&little.payload[10..14], &[2, 1, 0, 0]);

        encoder()
            .encode_message(MessageKind::Response, &value, &mut buf)
            .unwrap();
        let big = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(&big.payload[10..14], &[0, 0, 1, 2]);

        let decoder = Decoder::default();
        assert_eq!(decoder.decode_message(&little.header, &little.payload).unwrap(), value);
        assert_eq!(decoder.decode_message(&big.header, &big.payload).unwrap(), value);
    }

    #[test]
    fn test_guid_is_network_order_in_little_endian_messages() {
        let g = Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        let mut buf = BytesMut::new();
        encoder()
            .with_byte_order(ByteOrder::Little)
            .encode_value(&g.into(), &mut buf)
            .unwrap();
        assert_eq!(&buf[1..], g.as_bytes());
    }

    #[test]
    fn test_embedded_nul_truncates_symbol() {
        let value: Value = "ab\0cd".into();
        let bytes = payload(&value);
        assert_eq!(bytes, [0xF5, b'a', b'b', 0]);
        assert_eq!(encoder().encoded_len(&value).unwrap(), bytes.len());

        let symbols = Value::symbols(["x\0y", "z"]);
        let bytes = payload(&symbols);
        assert_eq!(encoder().encoded_len(&symbols).unwrap(), bytes.len());
        assert_eq!(
            Decoder::default().decode_value(ByteOrder::Big, &bytes).unwrap(),
            Value::symbols(["x", "z"])
        );
    }

    #[test]
    fn test_char_vector_count_is_byte_length() {
        let enc = encoder().with_encoding(TextEncoding::Utf8);
        let mut buf = BytesMut::new();
        enc.encode_value(&Value::chars("é€"), &mut buf).unwrap();
        assert_eq!(&buf[..6], &[10, 0, 0, 0, 0, 5]);
        assert_eq!(buf.len(), enc.encoded_len(&Value::chars("é€")).unwrap());
    }

    #[test]
    fn test_latin1_rejects_unrepresentable_text() {
        let err = encoder().encoded_len(&Value::from("€")).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)));
    }

    #[test]
    fn test_request_text_payload() {
        let mut buf = BytesMut::new();
        encoder()
            .encode_message(MessageKind::Sync, &"2+3".into(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..8], &[0, 1, 0, 0, 0, 0, 0, 13]);
        assert_eq!(&buf[8..], &[0xF5, b'2', b'+', b'3', 0]);
    }

    #[test]
    fn test_long_response_decodes_to_five() {
        let header = MessageHeader::build(ByteOrder::Little, MessageKind::Response, false, 17);
        let payload = [0xF9, 5, 0, 0, 0, 0, 0, 0, 0];
        let value = Decoder::default().decode_message(&header, &payload).unwrap();
        assert_eq!(value, Value::from(5i64));
    }

    #[test]
    fn test_error_atom_is_remote_error() {
        let payload = [0x80, b't', b'y', b'p', b'e', 0];
        let err = Decoder::default()
            .decode_value(ByteOrder::Big, &payload)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Remote(ref msg) if msg == "type"));
    }

    #[test]
    fn test_function_payloads_keep_cursor_aligned() {
        let decoder = Decoder::default();
        let cases: Vec<(Vec<u8>, FunctionKind)> = vec![
            // lambda: context, then source as a char vector
            (
                vec![100, 0, 10, 0, 0, 0, 0, 3, b'{', b'x', b'}'],
                FunctionKind::Lambda,
            ),
            (vec![102, 1], FunctionKind::Operator),
            (vec![101, 7], FunctionKind::UnaryPrimitive),
            // projection of two values
            (
                vec![104, 0, 0, 0, 2, 0xF9, 0, 0, 0, 0, 0, 0, 0, 1, 101, 0],
                FunctionKind::Projection,
            ),
            // each over an operator
            (vec![106, 102, 1], FunctionKind::Each),
            (vec![107, 102, 0], FunctionKind::Over),
        ];
        for (body, kind) in cases {
            // A function followed by a long in the same list.
            let mut bytes = vec![0, 0, 0, 0, 0, 2];
            bytes.extend_from_slice(&body);
            bytes.extend_from_slice(&[0xF9, 0, 0, 0, 0, 0, 0, 0, 9]);
            let value = decoder.decode_value(ByteOrder::Big, &bytes).unwrap();
            assert_eq!(
                value,
                Value::List(vec![Value::Function(kind), 9i64.into()]),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_generic_null_decodes() {
        assert_eq!(
            Decoder::default().decode_value(ByteOrder::Big, &[101, 0]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_functions_are_unencodable() {
        let err = encoder()
            .encoded_len(&Value::Function(FunctionKind::Lambda))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unencodable(FunctionKind::Lambda)));
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let err = Decoder::default()
            .decode_value(ByteOrder::Big, &[77, 0, 0])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTypeTag(77)));
    }

    #[test]
    fn test_truncated_payloads() {
        let decoder = Decoder::default();
        for bytes in [
            &[][..],
            &[0xF9, 0, 0][..],
            &[0xF5, b'a'][..],
            &[7, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1][..],
            &[7, 0, 0x7F, 0xFF, 0xFF, 0xFF][..],
        ] {
            assert!(
                matches!(
                    decoder.decode_value(ByteOrder::Big, bytes),
                    Err(ProtocolError::Truncated { .. })
                ),
                "{bytes:?}"
            );
        }
    }

    #[test]
    fn test_negative_count() {
        let err = Decoder::default()
            .decode_value(ByteOrder::Big, &[7, 0, 0xFF, 0xFF, 0xFF, 0xFF])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NegativeCount(-1)));
    }

    #[test]
    fn test_compressed_message_rejected() {
        let header = MessageHeader::build(ByteOrder::Big, MessageKind::Response, true, 10);
        let err = Decoder::default()
            .decode_message(&header, &[0xFF, 1])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::CompressionUnsupported { .. }));
    }

    #[test]
    fn test_compression_threshold() {
        let big: Value = vec![0i64; 300].into();
        let mut buf = BytesMut::new();

        encoder()
            .with_compression(true)
            .encode_message(MessageKind::Sync, &big, &mut buf)
            .unwrap_err();
        assert!(buf.is_empty());

        // Without the opt-in, large messages go out uncompressed.
        encoder()
            .encode_message(MessageKind::Sync, &big, &mut buf)
            .unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + VECTOR_PREFIX + 300 * 8);

        // Small messages are never affected.
        encoder()
            .with_compression(true)
            .encode_message(MessageKind::Sync, &5i64.into(), &mut buf)
            .unwrap();
    }

    #[test]
    fn test_buffer_is_reset_between_messages() {
        let mut buf = BytesMut::new();
        encoder()
            .encode_message(MessageKind::Sync, &Value::chars("a long first message"), &mut buf)
            .unwrap();
        encoder()
            .encode_message(MessageKind::Sync, &1i64.into(), &mut buf)
            .unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 9);
    }

    #[test]
    fn test_malformed_table() {
        // table whose body is a long atom
        let err = Decoder::default()
            .decode_value(ByteOrder::Big, &[98, 0, 0xF9, 0, 0, 0, 0, 0, 0, 0, 1])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTable(_)));
    }

    /// `levels` big-endian one-element list headers around a long atom.
    fn nested_lists(levels: usize) -> Vec<u8> {
        let mut bytes = [0u8, 0, 0, 0, 0, 1].repeat(levels);
        bytes.extend_from_slice(&[0xF9, 0, 0, 0, 0, 0, 0, 0, 7]);
        bytes
    }

    #[test]
    fn test_temporal_infinities_decode() {
        let decoder = Decoder::default();
        let day = NaiveDate::from_ymd_opt(2000, 1, 2).unwrap();

        let dates = decoder
            .decode_value(
                ByteOrder::Big,
                &[14, 0, 0, 0, 0, 2, 0, 0, 0, 1, 0x7F, 0xFF, 0xFF, 0xFF],
            )
            .unwrap();
        assert_eq!(dates, Value::from(vec![day, temporal::INF_DATE]));

        let neg = decoder
            .decode_value(ByteOrder::Big, &[0xF2, 0x80, 0, 0, 1])
            .unwrap();
        assert_eq!(neg, Value::from(temporal::neg_inf_date()));

        let mut bytes = vec![0xF1];
        bytes.extend_from_slice(&f64::INFINITY.to_be_bytes());
        let inf = decoder.decode_value(ByteOrder::Big, &bytes).unwrap();
        assert_eq!(inf, Value::from(temporal::INF_DATETIME));

        for value in [
            Value::from(temporal::INF_DATE),
            Value::from(temporal::neg_inf_date()),
            Value::from(temporal::INF_DATETIME),
            Value::from(temporal::neg_inf_datetime()),
            Value::from(vec![day, temporal::INF_DATE, temporal::NULL_DATE]),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
        assert_eq!(
            payload(&Value::from(temporal::INF_DATE)),
            [0xF2, 0x7F, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let decoder = Decoder::default();

        let mut value = Value::from(7i64);
        for _ in 0..MAX_DEPTH - 1 {
            value = Value::List(vec![value]);
        }
        assert_eq!(
            decoder
                .decode_value(ByteOrder::Big, &nested_lists(MAX_DEPTH - 1))
                .unwrap(),
            value
        );

        let err = decoder
            .decode_value(ByteOrder::Big, &nested_lists(MAX_DEPTH))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NestingTooDeep { max } if max == MAX_DEPTH));
        assert!(err.kind().is_connection_fatal());

        // 120 KB of list headers
        let err = decoder
            .decode_value(ByteOrder::Big, &nested_lists(20_000))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NestingTooDeep { .. }));

        // one byte per level through composition-style function tags
        let mut bytes = vec![106u8; 20_000];
        bytes.extend_from_slice(&[0xF9, 0, 0, 0, 0, 0, 0, 0, 7]);
        let err = decoder.decode_value(ByteOrder::Big, &bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::NestingTooDeep { .. }));
    }

    /// Container headers that nest the next value as their first child.
    fn arb_container_header() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            Just(vec![0u8, 0, 0, 0, 0, 1]),
            Just(vec![0u8, 0, 0, 0, 0, 3]),
            Just(vec![99u8]),
            (106u8..=112).prop_map(|tag| vec![tag]),
            (104u8..=105).prop_map(|tag| vec![tag, 0, 0, 0, 2]),
        ]
    }

    fn arb_symbol() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_]{0,12}"
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            arb_symbol().prop_map(Value::from),
            prop::collection::vec(any::<i64>(), 0..32).prop_map(Value::from),
            prop::collection::vec(-1e12f64..1e12, 0..32).prop_map(Value::from),
            prop::collection::vec(arb_symbol(), 0..8).prop_map(Value::symbols),
            "[ -~]{0,40}".prop_map(Value::chars),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 32, 6, |inner| {
            prop::collection::vec(inner, 0..6).prop_map(Value::List)
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in arb_value()) {
            prop_assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn prop_encoded_len_matches(value in arb_value()) {
            let mut buf = BytesMut::new();
            encoder().encode_value(&value, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), encoder().encoded_len(&value).unwrap());
        }

        #[test]
        fn prop_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = Decoder::default().decode_value(ByteOrder::Little, &bytes);
        }

        #[test]
        fn prop_deep_or_oversized_input_is_an_error(
            headers in prop::collection::vec(arb_container_header(), 0..400),
            count in prop_oneof![Just(i32::MAX), Just(-1i32), 0..4i32],
            tail in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let levels = headers.len();
            let mut bytes: Vec<u8> = headers.concat();
            // a long vector with an arbitrary declared count
            bytes.extend_from_slice(&[7, 0]);
            bytes.extend_from_slice(&count.to_be_bytes());
            bytes.extend_from_slice(&tail);

            let result = Decoder::default().decode_value(ByteOrder::Big, &bytes);
            if levels >= MAX_DEPTH {
                prop_assert!(
                    matches!(result, Err(ProtocolError::NestingTooDeep { .. })),
                    "expected NestingTooDeep, got {:?}",
                    result
                );
            }
            if count == i32::MAX {
                prop_assert!(result.is_err());
            }
        }
    }
}
