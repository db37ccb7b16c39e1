//! Order-preserving binary codecs for row columns.
//!
//! Every encoding compares bytewise in the same order as the decoded values,
//! which is what allows the evaluator's quick-compare fast path to resolve a
//! comparison without materializing a [`Value`]. Nullable columns carry a
//! one-byte marker (0x00 null, 0x01 present) so null sorts first.

use std::cmp::Ordering;

use thiserror::Error;

use crate::{catalog::ColumnType, value::Value};

const SIGN_BIT: u64 = 1 << 63;

/// Errors raised while encoding, decoding, or skipping a single column.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the column did.
    #[error("unexpected end of buffer at offset {offset}")]
    UnexpectedEnd {
        /// Offset at which more bytes were required.
        offset: usize,
    },
    /// A nullable column carried a marker byte other than 0x00 or 0x01.
    #[error("invalid null marker {byte:#04x} at offset {offset}")]
    InvalidMarker {
        /// The offending byte.
        byte: u8,
        /// Offset of the marker.
        offset: usize,
    },
    /// A boolean column carried a byte other than 0x00 or 0x01.
    #[error("invalid boolean byte {byte:#04x} at offset {offset}")]
    InvalidBool {
        /// The offending byte.
        byte: u8,
        /// Offset of the byte.
        offset: usize,
    },
    /// A text column's bytes were not valid UTF-8.
    #[error("column bytes at offset {offset} are not valid UTF-8")]
    InvalidUtf8 {
        /// Offset of the column start.
        offset: usize,
    },
    /// A text value to encode contained an interior NUL byte.
    #[error("text value contains an interior NUL byte")]
    InteriorNul,
    /// A value's type did not match the column's declared type.
    #[error("cannot encode {got} value as {expected:?} column")]
    TypeMismatch {
        /// Declared column type.
        expected: ColumnType,
        /// Type of the supplied value.
        got: &'static str,
    },
}

/// Encodes `value` for a column of the given type, appending to `out`.
pub fn encode(
    ty: ColumnType,
    nullable: bool,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    if value.is_null() {
        if !nullable {
            return Err(CodecError::TypeMismatch {
                expected: ty,
                got: "null",
            });
        }
        out.push(0x00);
        return Ok(());
    }
    if nullable {
        out.push(0x01);
    }
    match (ty, value) {
        (ColumnType::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (ColumnType::Int64, Value::Int64(v)) => {
            out.extend_from_slice(&((*v as u64) ^ SIGN_BIT).to_be_bytes());
        }
        (ColumnType::UInt64, Value::UInt64(v)) => out.extend_from_slice(&v.to_be_bytes()),
        (ColumnType::Float64, Value::Float64(v)) => {
            let bits = v.to_bits();
            let encoded = if bits & SIGN_BIT != 0 { !bits } else { bits ^ SIGN_BIT };
            out.extend_from_slice(&encoded.to_be_bytes());
        }
        (ColumnType::Text, Value::Text(s)) => {
            if s.as_bytes().contains(&0x00) {
                return Err(CodecError::InteriorNul);
            }
            out.extend_from_slice(s.as_bytes());
            out.push(0x00);
        }
        (ColumnType::Bytes, Value::Bytes(b)) => {
            for &byte in b {
                if byte == 0x00 {
                    out.extend_from_slice(&[0x00, 0xFF]);
                } else {
                    out.push(byte);
                }
            }
            out.push(0x00);
        }
        (expected, other) => {
            return Err(CodecError::TypeMismatch {
                expected,
                got: other.type_name(),
            })
        }
    }
    Ok(())
}

/// Decodes one column starting at `offset`, returning the value and the
/// offset immediately after the column.
pub fn decode(
    ty: ColumnType,
    nullable: bool,
    buf: &[u8],
    offset: usize,
) -> Result<(Value, usize), CodecError> {
    let mut at = offset;
    if nullable {
        match marker(buf, at)? {
            false => return Ok((Value::Null, at + 1)),
            true => at += 1,
        }
    }
    match ty {
        ColumnType::Bool => {
            let byte = *buf.get(at).ok_or(CodecError::UnexpectedEnd { offset: at })?;
            let value = match byte {
                0x00 => false,
                0x01 => true,
                other => return Err(CodecError::InvalidBool { byte: other, offset: at }),
            };
            Ok((Value::Bool(value), at + 1))
        }
        ColumnType::Int64 => {
            let raw = fixed8(buf, at)?;
            Ok((Value::Int64((raw ^ SIGN_BIT) as i64), at + 8))
        }
        ColumnType::UInt64 => {
            let raw = fixed8(buf, at)?;
            Ok((Value::UInt64(raw), at + 8))
        }
        ColumnType::Float64 => {
            let raw = fixed8(buf, at)?;
            let bits = if raw & SIGN_BIT != 0 { raw ^ SIGN_BIT } else { !raw };
            Ok((Value::Float64(f64::from_bits(bits)), at + 8))
        }
        ColumnType::Text => {
            let terminator = find_nul(buf, at)?;
            let text = std::str::from_utf8(&buf[at..terminator])
                .map_err(|_| CodecError::InvalidUtf8 { offset: at })?;
            Ok((Value::Text(text.to_string()), terminator + 1))
        }
        ColumnType::Bytes => {
            let mut bytes = Vec::new();
            let mut cursor = at;
            loop {
                let byte = *buf
                    .get(cursor)
                    .ok_or(CodecError::UnexpectedEnd { offset: cursor })?;
                if byte != 0x00 {
                    bytes.push(byte);
                    cursor += 1;
                    continue;
                }
                if buf.get(cursor + 1) == Some(&0xFF) {
                    bytes.push(0x00);
                    cursor += 2;
                } else {
                    return Ok((Value::Bytes(bytes), cursor + 1));
                }
            }
        }
    }
}

/// Computes the offset immediately after the column starting at `offset`
/// without materializing a value.
pub fn skip(
    ty: ColumnType,
    nullable: bool,
    buf: &[u8],
    offset: usize,
) -> Result<usize, CodecError> {
    let mut at = offset;
    if nullable {
        match marker(buf, at)? {
            false => return Ok(at + 1),
            true => at += 1,
        }
    }
    match ty {
        ColumnType::Bool => bounded(buf, at, 1),
        ColumnType::Int64 | ColumnType::UInt64 | ColumnType::Float64 => bounded(buf, at, 8),
        ColumnType::Text => Ok(find_nul(buf, at)? + 1),
        ColumnType::Bytes => {
            let mut cursor = at;
            loop {
                let byte = *buf
                    .get(cursor)
                    .ok_or(CodecError::UnexpectedEnd { offset: cursor })?;
                if byte != 0x00 {
                    cursor += 1;
                } else if buf.get(cursor + 1) == Some(&0xFF) {
                    cursor += 2;
                } else {
                    return Ok(cursor + 1);
                }
            }
        }
    }
}

/// Compares the encoded column starting at `offset` against a fully encoded
/// operand, returning the ordering and the column's end offset.
///
/// Valid because every codec is order-preserving; this never materializes a
/// [`Value`].
pub fn quick_compare(
    ty: ColumnType,
    nullable: bool,
    buf: &[u8],
    offset: usize,
    encoded_operand: &[u8],
) -> Result<(Ordering, usize), CodecError> {
    let end = skip(ty, nullable, buf, offset)?;
    Ok((buf[offset..end].cmp(encoded_operand), end))
}

fn marker(buf: &[u8], offset: usize) -> Result<bool, CodecError> {
    match buf.get(offset) {
        Some(0x00) => Ok(false),
        Some(0x01) => Ok(true),
        Some(&byte) => Err(CodecError::InvalidMarker { byte, offset }),
        None => Err(CodecError::UnexpectedEnd { offset }),
    }
}

fn fixed8(buf: &[u8], offset: usize) -> Result<u64, CodecError> {
    let bytes: [u8; 8] = buf
        .get(offset..offset + 8)
        .ok_or(CodecError::UnexpectedEnd { offset: buf.len() })?
        .try_into()
        .expect("slice length checked");
    Ok(u64::from_be_bytes(bytes))
}

fn bounded(buf: &[u8], offset: usize, width: usize) -> Result<usize, CodecError> {
    if offset + width > buf.len() {
        return Err(CodecError::UnexpectedEnd { offset: buf.len() });
    }
    Ok(offset + width)
}

fn find_nul(buf: &[u8], offset: usize) -> Result<usize, CodecError> {
    buf[offset.min(buf.len())..]
        .iter()
        .position(|&b| b == 0x00)
        .map(|pos| offset + pos)
        .ok_or(CodecError::UnexpectedEnd { offset: buf.len() })
}
