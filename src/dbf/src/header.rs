//! The 32-byte file header and 32-byte field descriptors (spec §4.1).

use std::io::{self, Read, Write};

use crate::date::Date;
use crate::error::{DbfError, DbfResult};
use crate::field::{Field, FieldType, Schema, MAX_FIELDS};

pub const FILE_HEADER_SIZE: usize = 32;
pub const FIELD_DESCRIPTOR_SIZE: usize = 32;
pub const HEADER_TERMINATOR: u8 = 0x0D;
pub const EOF_MARKER: u8 = 0x1A;
const VERSION_BYTE: u8 = 0x03;

/// The fixed-offset fields of the 32-byte file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub update_date: Date,
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub language_driver: u8,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0] = VERSION_BYTE;
        buf[1] = self.update_date.year.saturating_sub(1900) as u8;
        buf[2] = self.update_date.month;
        buf[3] = self.update_date.day;
        buf[4..8].copy_from_slice(&self.record_count.to_le_bytes());
        buf[8..10].copy_from_slice(&self.header_length.to_le_bytes());
        buf[10..12].copy_from_slice(&self.record_length.to_le_bytes());
        buf[29] = self.language_driver;
        buf
    }

    pub fn decode(buf: &[u8; FILE_HEADER_SIZE]) -> DbfResult<FileHeader> {
        let record_count = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7] & 0x7f]);
        let header_length = u16::from_le_bytes([buf[8], buf[9]]);
        let record_length = u16::from_le_bytes([buf[10], buf[11]]);

        if record_length == 0 {
            return Err(DbfError::Open("record length is zero".to_string()));
        }
        if header_length <= FILE_HEADER_SIZE as u16 {
            return Err(DbfError::Open(format!(
                "header length {header_length} leaves no room for a field descriptor array and terminator"
            )));
        }

        Ok(FileHeader {
            update_date: Date::new(1900 + buf[1] as u16, buf[2], buf[3]),
            record_count,
            header_length,
            record_length,
            language_driver: buf[29],
        })
    }

    /// Reads the 32-byte header from any seekable, readable handle
    /// positioned at its start.
    pub fn read_from<R: Read>(reader: &mut R) -> DbfResult<FileHeader> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        reader
            .read_exact(&mut buf)
            .map_err(|e| DbfError::Open(format!("short file header: {e}")))?;
        FileHeader::decode(&buf)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }
}

/// Computes `header_length = 32 + 32*n + 1` for an `n`-field schema (spec
/// §3).
pub fn header_length_for(field_count: usize) -> DbfResult<u16> {
    let length = FILE_HEADER_SIZE + FIELD_DESCRIPTOR_SIZE * field_count + 1;
    u16::try_from(length)
        .map_err(|_| DbfError::validation(format!("header length {length} exceeds 65535 bytes")))
}

/// Encodes one field's 32-byte descriptor (spec §4.1).
pub fn encode_field_descriptor(field: &Field) -> [u8; FIELD_DESCRIPTOR_SIZE] {
    let mut buf = [0u8; FIELD_DESCRIPTOR_SIZE];
    let name_bytes = field.name.as_bytes();
    let len = name_bytes.len().min(10);
    buf[..len].copy_from_slice(&name_bytes[..len]);
    buf[11] = field.field_type.to_byte();

    if field.field_type == FieldType::Character {
        buf[16..18].copy_from_slice(&field.width.to_le_bytes());
    } else {
        buf[16] = field.width as u8;
        buf[17] = field.decimals;
    }
    buf
}

/// Decodes one field descriptor. Names are NUL-trimmed and then
/// space-trimmed, per spec §4.1, to at most 11 bytes.
pub fn decode_field_descriptor(buf: &[u8; FIELD_DESCRIPTOR_SIZE]) -> DbfResult<Field> {
    let name_raw = &buf[0..11];
    let nul_end = name_raw.iter().position(|&b| b == 0).unwrap_or(11);
    let name = String::from_utf8_lossy(&name_raw[..nul_end])
        .trim()
        .to_string();

    let field_type = FieldType::from_byte(buf[11]);
    let (width, decimals) = if field_type == FieldType::Character {
        (u16::from_le_bytes([buf[16], buf[17]]), 0)
    } else {
        (buf[16] as u16, buf[17])
    };

    Field::new(name, field_type, width.max(1), decimals)
}

/// Reads field descriptors until either `expected` have been consumed or a
/// terminator byte is seen as the first byte of a descriptor (spec §4.1's
/// truncation tolerance).
///
/// `expected` is checked against [`MAX_FIELDS`] before the `Vec::with_capacity`
/// below: a header can claim any `u16` descriptor count, and allocating for it
/// unchecked would let a malformed file drive an oversized allocation (spec
/// §7's out-of-memory case).
pub fn read_field_descriptors<R: Read>(reader: &mut R, expected: usize) -> DbfResult<Vec<Field>> {
    if expected > MAX_FIELDS {
        return Err(DbfError::OutOfMemory(format!(
            "header declares {expected} field descriptors, exceeding the {MAX_FIELDS}-field allocation ceiling"
        )));
    }
    let mut fields = Vec::with_capacity(expected);
    for _ in 0..expected {
        let mut buf = [0u8; FIELD_DESCRIPTOR_SIZE];
        let first = {
            let mut first_byte = [0u8; 1];
            match reader.read(&mut first_byte) {
                Ok(0) => break,
                Ok(_) => first_byte[0],
                Err(e) => return Err(DbfError::Open(format!("reading field descriptor: {e}"))),
            }
        };
        if first == HEADER_TERMINATOR {
            log::warn!(
                "field descriptor array truncated after {} of {} expected fields",
                fields.len(),
                expected
            );
            break;
        }
        buf[0] = first;
        reader
            .read_exact(&mut buf[1..])
            .map_err(|e| DbfError::Open(format!("short field descriptor: {e}")))?;
        fields.push(decode_field_descriptor(&buf)?);
    }
    Ok(fields)
}

pub fn write_field_descriptors<W: Write>(writer: &mut W, schema: &Schema) -> io::Result<()> {
    for field in schema.fields() {
        writer.write_all(&encode_field_descriptor(field))?;
    }
    writer.write_all(&[HEADER_TERMINATOR])
}
