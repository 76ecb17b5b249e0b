use super::protocol::{
    frame::{PointAddress, StringLayout, ValueKind},
    Error, Result,
};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Typed value of one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum S7Value {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl S7Value {
    /// Value kind this variant is written as.
    pub fn kind(&self) -> ValueKind {
        match self {
            S7Value::Bool(_) => ValueKind::Bit,
            S7Value::Int8(_) => ValueKind::Int8,
            S7Value::UInt8(_) => ValueKind::UInt8,
            S7Value::Int16(_) => ValueKind::Int16,
            S7Value::UInt16(_) => ValueKind::UInt16,
            S7Value::Int32(_) => ValueKind::Int32,
            S7Value::UInt32(_) => ValueKind::UInt32,
            S7Value::Int64(_) => ValueKind::Int64,
            S7Value::UInt64(_) => ValueKind::UInt64,
            S7Value::Float32(_) => ValueKind::Float32,
            S7Value::Float64(_) => ValueKind::Float64,
            S7Value::String(_) => ValueKind::String,
            S7Value::Bytes(_) => ValueKind::Bytes,
        }
    }
}

/// Placeholder for string payloads that are not valid UTF-8
const INVALID_TEXT: &str = "?";

/// Conversions between point wire bytes and typed values.
///
/// Multi-byte numerics are big-endian on the wire. Strings and byte arrays
/// occupy exactly their declared length.
pub struct S7Codec;

impl S7Codec {
    /// Decode the bytes of one point. `raw` starts at the point's first byte.
    pub fn decode(point: &PointAddress, raw: &[u8]) -> Result<S7Value> {
        let len = point.wire_len_bytes as usize;
        let Some(raw) = raw.get(..len) else {
            return Err(Error::InsufficientData {
                needed: len,
                available: raw.len(),
            });
        };
        Ok(match point.kind {
            ValueKind::Bit => S7Value::Bool((raw[0] >> point.bit_index) & 0x01 == 0x01),
            ValueKind::Int8 => S7Value::Int8(raw[0] as i8),
            ValueKind::UInt8 => S7Value::UInt8(raw[0]),
            ValueKind::Int16 => S7Value::Int16(i16::from_be_bytes(array(raw)?)),
            ValueKind::UInt16 => S7Value::UInt16(u16::from_be_bytes(array(raw)?)),
            ValueKind::Int32 => S7Value::Int32(i32::from_be_bytes(array(raw)?)),
            ValueKind::UInt32 => S7Value::UInt32(u32::from_be_bytes(array(raw)?)),
            ValueKind::Int64 => S7Value::Int64(i64::from_be_bytes(array(raw)?)),
            ValueKind::UInt64 => S7Value::UInt64(u64::from_be_bytes(array(raw)?)),
            ValueKind::Float32 => S7Value::Float32(f32::from_be_bytes(array(raw)?)),
            ValueKind::Float64 => S7Value::Float64(f64::from_be_bytes(array(raw)?)),
            ValueKind::String => S7Value::String(Self::decode_text(raw, point.layout)),
            ValueKind::Bytes => S7Value::Bytes(raw.to_vec()),
            ValueKind::Unsupported => {
                return Err(Error::UnsupportedType(format!("{:?}", point.kind)))
            }
        })
    }

    /// Encode `value` into exactly `point.wire_len_bytes` bytes.
    ///
    /// A bit point encodes as one byte holding 0 or 1.
    pub fn encode(point: &PointAddress, value: &S7Value) -> Result<Bytes> {
        if value.kind() != point.kind {
            return Err(Error::UnsupportedType(format!(
                "{:?} value for {:?} point",
                value.kind(),
                point.kind
            )));
        }
        let len = point.wire_len_bytes as usize;
        let mut buf = BytesMut::with_capacity(len);
        match value {
            S7Value::Bool(b) => buf.put_u8(u8::from(*b)),
            S7Value::Int8(v) => buf.put_i8(*v),
            S7Value::UInt8(v) => buf.put_u8(*v),
            S7Value::Int16(v) => buf.put_i16(*v),
            S7Value::UInt16(v) => buf.put_u16(*v),
            S7Value::Int32(v) => buf.put_i32(*v),
            S7Value::UInt32(v) => buf.put_u32(*v),
            S7Value::Int64(v) => buf.put_i64(*v),
            S7Value::UInt64(v) => buf.put_u64(*v),
            S7Value::Float32(v) => buf.put_f32(*v),
            S7Value::Float64(v) => buf.put_f64(*v),
            S7Value::String(s) => {
                let mut bytes = fit(s.as_bytes(), len);
                if point.layout == StringLayout::Low {
                    swap_pairs(&mut bytes);
                }
                buf.put_slice(&bytes);
            }
            S7Value::Bytes(b) => buf.put_slice(&fit(b, len)),
        }
        Ok(buf.freeze())
    }

    fn decode_text(raw: &[u8], layout: StringLayout) -> String {
        let mut bytes = raw.to_vec();
        if layout == StringLayout::Low {
            swap_pairs(&mut bytes);
        }
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        String::from_utf8(bytes).unwrap_or_else(|_| INVALID_TEXT.to_string())
    }
}

#[inline]
fn array<const N: usize>(raw: &[u8]) -> Result<[u8; N]> {
    raw.get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InsufficientData {
            needed: N,
            available: raw.len(),
        })
}

/// Truncate or zero-pad to `len` bytes.
fn fit(src: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let n = src.len().min(len);
    out[..n].copy_from_slice(&src[..n]);
    out
}

/// Swap each byte pair in place; a trailing odd byte stays.
fn swap_pairs(bytes: &mut [u8]) {
    for pair in bytes.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}
