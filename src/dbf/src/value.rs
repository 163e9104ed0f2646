//! The value codec (spec §4.3): encoding and decoding field bytes against
//! their declared type, and the per-type NULL sentinel policy.

use crate::date::Date;
use crate::error::{DbfError, DbfResult};
use crate::field::{Field, FieldType};

/// A decoded, non-NULL field value. Logical (`L`) fields are exchanged
/// through their own `bool` accessors, not through this enum — spec §3
/// calls out that the four "logical kinds" (integer, double, string, date)
/// are distinct from `L`'s boolean content.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    String(String),
    Date(Date),
}

/// Whether `field`'s raw bytes represent NULL (spec §4.3's null-detection
/// rules).
pub fn is_null(field: &Field, bytes: &[u8]) -> bool {
    if bytes.iter().all(|&b| b == b' ') {
        return true;
    }
    match field.field_type {
        FieldType::Number | FieldType::Float => bytes.first() == Some(&b'*'),
        FieldType::Date => Date::from_bytes(bytes).is_null(),
        FieldType::Logical => bytes.first() == Some(&b'?'),
        _ => bytes.is_empty(),
    }
}

/// Fills `bytes` with `field`'s NULL sentinel (spec §4.3).
pub fn write_null(field: &Field, bytes: &mut [u8]) {
    bytes.fill(field.null_fill());
}

/// Decodes a numeric (`N`/`F`) field's bytes to a `f64` using the supplied
/// locale-independent parser. Returns `None` for a NULL or unparseable
/// value.
pub fn decode_double(field: &Field, bytes: &[u8], atof: impl Fn(&str) -> Option<f64>) -> Option<f64> {
    if is_null(field, bytes) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    atof(text.trim())
}

/// Decodes a numeric field's bytes to an `i64` by parsing as a double, then
/// truncating (spec §4.3: "integer reads route through double parsing then
/// truncation").
pub fn decode_integer(field: &Field, bytes: &[u8], atof: impl Fn(&str) -> Option<f64>) -> Option<i64> {
    decode_double(field, bytes, atof).map(|d| d.trunc() as i64)
}

/// Encodes a double into a numeric field using the printf-like `"%*.*f"`
/// convention (spec §4.3). Truncates on overflow and reports truncation
/// failure iff the round-tripped truncated value no longer equals `value`.
pub fn encode_double(field: &Field, value: f64, out: &mut [u8]) -> DbfResult<()> {
    let width = field.width as usize;
    let decimals = field.decimals as usize;
    let formatted = format!("{value:width$.decimals$}");

    if formatted.len() <= width {
        let padded = format!("{formatted:>width$}");
        out.copy_from_slice(padded.as_bytes());
        return Ok(());
    }

    // Overflow: try the widest representation that fits, and fail unless it
    // round-trips to the same value.
    let truncated = truncate_numeric_text(&formatted, width);
    out.copy_from_slice(truncated.as_bytes());
    let round_tripped: f64 = truncated.trim().parse().unwrap_or(f64::NAN);
    if round_tripped == value {
        Ok(())
    } else {
        Err(DbfError::validation(format!(
            "value {value} does not fit in a field of width {width} with {decimals} decimals"
        )))
    }
}

fn truncate_numeric_text(formatted: &str, width: usize) -> String {
    if formatted.len() <= width {
        return format!("{formatted:>width$}");
    }
    let overflow = formatted.len() - width;
    formatted
        .chars()
        .skip(overflow)
        .collect::<String>()
}

/// Decodes a string (`C`/other) field's bytes, optionally trimming
/// surrounding whitespace per the `trim-strings` build feature.
pub fn decode_string(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    #[cfg(feature = "trim-strings")]
    {
        text.trim().to_string()
    }
    #[cfg(not(feature = "trim-strings"))]
    {
        text.into_owned()
    }
}

/// Encodes a string into a `C`/other field: left-aligned, space-padded,
/// truncated at width. Reports failure iff the input exceeded the width
/// (spec §4.3), while still writing the truncated bytes.
pub fn encode_string(value: &str, out: &mut [u8]) -> DbfResult<()> {
    let width = out.len();
    let bytes = value.as_bytes();
    let copy_len = bytes.len().min(width);
    out[..copy_len].copy_from_slice(&bytes[..copy_len]);
    out[copy_len..].fill(b' ');
    if bytes.len() > width {
        Err(DbfError::validation(format!(
            "string of {} bytes truncated to field width {width}",
            bytes.len()
        )))
    } else {
        Ok(())
    }
}

/// Decodes a `C`/other field's bytes through a named code page (spec §4.3,
/// feature `codepage-decode`), falling back to the plain ASCII-range mapping
/// when `label` is `None` or not a code page `encoding_rs` recognizes (e.g.
/// an `"LDID/<n>"` string with no registered `encoding_rs` label).
#[cfg(feature = "codepage-decode")]
pub fn decode_string_with_encoding(bytes: &[u8], label: Option<&str>) -> String {
    let encoding = label.and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()));
    match encoding {
        Some(encoding) => {
            let (text, _, _) = encoding.decode(bytes);
            #[cfg(feature = "trim-strings")]
            {
                text.trim().to_string()
            }
            #[cfg(not(feature = "trim-strings"))]
            {
                text.into_owned()
            }
        }
        None => decode_string(bytes),
    }
}

/// Decodes a logical (`L`) field's byte to a tri-state boolean. `None`
/// covers both NULL (`'?'`) and an unrecognized byte — the spec treats
/// anything other than a definite `T`/`F` match as unset on read.
pub fn decode_bool(bytes: &[u8]) -> Option<bool> {
    match bytes.first() {
        Some(b't' | b'T' | b'y' | b'Y') => Some(true),
        Some(b'f' | b'F' | b'n' | b'N') => Some(false),
        _ => None,
    }
}

/// Encodes a logical field. Only `'T'`/`'F'` are accepted; any other byte
/// leaves the field untouched and reports failure (spec §4.3).
pub fn encode_bool(value: bool, out: &mut [u8]) -> DbfResult<()> {
    if out.is_empty() {
        return Err(DbfError::validation("logical field has zero width"));
    }
    out[0] = if value { b'T' } else { b'F' };
    Ok(())
}
