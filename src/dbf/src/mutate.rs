//! Schema mutation (spec §4.4): add/delete/reorder/alter field, implemented
//! as additional `impl` blocks on [`DbfTable`].
//!
//! Every operation builds a candidate [`Schema`] without touching
//! `self.schema`, rewrites every existing record into the new layout, and
//! only then commits the schema and persists the header. A rewrite that
//! grows the record length walks records last-to-first so a record's new
//! (larger) footprint never overwrites a not-yet-moved record; a rewrite
//! that shrinks it walks first-to-last for the same reason in the other
//! direction. Reorder and same-width alter have no directional concern since
//! no record's file position moves.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{DbfError, DbfResult};
use crate::field::{Field, FieldType, Schema, MAX_RECORD_LENGTH};
use crate::header;
use crate::hooks::IoHooks;
use crate::table::DbfTable;
use crate::value;

impl<H: IoHooks> DbfTable<H> {
    /// Appends a field to the schema (spec §4.4). Width is clamped to 255
    /// even for character fields — a quirk this operation has always
    /// enforced, unlike the 65535-wide `C` fields a file can otherwise carry.
    pub fn add_field(&mut self, field: Field) -> DbfResult<()> {
        let width = field.width.min(255);
        let new_field = Field::new(field.name, field.field_type, width, field.decimals)?;
        let null_fill = new_field.null_fill();
        let new_width = new_field.width as usize;

        let mut fields = self.schema.fields().to_vec();
        fields.push(new_field);
        let new_schema = Schema::from_fields(fields)?;

        self.rewrite_for_schema(new_schema, move |old_bytes, new_buf| {
            let split = old_bytes.len();
            new_buf[..split].copy_from_slice(old_bytes);
            new_buf[split..split + new_width].fill(null_fill);
        })
    }

    /// Removes the field at `index` (spec §4.4). The spec describes this as
    /// two writes per record (the bytes before and after the removed field);
    /// here both halves are assembled into one buffer before a single write,
    /// which produces the identical on-disk layout.
    pub fn delete_field(&mut self, index: usize) -> DbfResult<()> {
        let removed = self.schema.get(index)?.clone();
        let mut fields = self.schema.fields().to_vec();
        fields.remove(index);
        let new_schema = Schema::from_fields(fields)?;

        let old_offset = removed.offset as usize;
        let old_end = old_offset + removed.width as usize;

        self.rewrite_for_schema(new_schema, move |old_bytes, new_buf| {
            new_buf[..old_offset].copy_from_slice(&old_bytes[..old_offset]);
            new_buf[old_offset..].copy_from_slice(&old_bytes[old_end..]);
        })
    }

    /// Reorders fields according to `permutation`: `permutation[old_index]`
    /// gives that field's position in the new schema (spec §4.4). Record
    /// length is unchanged by a pure reorder.
    pub fn reorder_fields(&mut self, permutation: &[usize]) -> DbfResult<()> {
        let n = self.schema.len();
        if permutation.len() != n {
            return Err(DbfError::validation(format!(
                "permutation has {} entries, schema has {n} fields",
                permutation.len()
            )));
        }
        let mut seen = vec![false; n];
        for &p in permutation {
            if p >= n || std::mem::replace(&mut seen[p], true) {
                return Err(DbfError::validation("permutation is not a bijection on the field indices"));
            }
        }
        if n == 0 {
            return Ok(());
        }

        let old_fields = self.schema.fields().to_vec();
        let mut new_fields = vec![old_fields[0].clone(); n];
        for (old_index, &new_index) in permutation.iter().enumerate() {
            new_fields[new_index] = old_fields[old_index].clone();
        }
        let new_schema = Schema::from_fields(new_fields)?;

        let moves: Vec<(usize, usize, usize)> = old_fields
            .iter()
            .enumerate()
            .map(|(old_index, f)| {
                let new_index = permutation[old_index];
                let new_offset = new_schema.get(new_index).expect("new_index in range").offset as usize;
                (f.offset as usize, f.width as usize, new_offset)
            })
            .collect();

        self.rewrite_for_schema(new_schema, move |old_bytes, new_buf| {
            new_buf[0] = old_bytes[0];
            for &(old_offset, width, new_offset) in &moves {
                new_buf[new_offset..new_offset + width].copy_from_slice(&old_bytes[old_offset..old_offset + width]);
            }
        })
    }

    /// Changes the name/type/width/decimals of the field at `index` (spec
    /// §4.4). Fields before `index` keep their offset; fields after it shift
    /// by the width delta. A NULL value re-emits as the destination type's
    /// sentinel; otherwise growing pads and shrinking truncates, with
    /// numeric/date fields padding and truncating on the left (the
    /// leading-space side of their textual representation) and all other
    /// types on the right.
    pub fn alter_field(
        &mut self,
        index: usize,
        name: impl Into<String>,
        field_type: FieldType,
        width: u16,
        decimals: u8,
    ) -> DbfResult<()> {
        let old_field = self.schema.get(index)?.clone();
        let candidate = Field::new(name, field_type, width, decimals)?;

        let mut fields = self.schema.fields().to_vec();
        fields[index] = candidate;
        let new_schema = Schema::from_fields(fields)?;
        let new_field = new_schema.get(index)?.clone();

        let old_offset = old_field.offset as usize;
        let old_width = old_field.width as usize;
        let new_offset = new_field.offset as usize;
        let new_width = new_field.width as usize;
        debug_assert_eq!(old_offset, new_offset, "fields before the altered one keep their offset");

        self.rewrite_for_schema(new_schema, move |old_bytes, new_buf| {
            new_buf[..old_offset].copy_from_slice(&old_bytes[..old_offset]);

            let old_field_bytes = &old_bytes[old_offset..old_offset + old_width];
            let new_field_bytes = &mut new_buf[new_offset..new_offset + new_width];
            transform_altered_field(old_field_bytes, new_field_bytes, &old_field, &new_field);

            let old_suffix_start = old_offset + old_width;
            let new_suffix_start = new_offset + new_width;
            new_buf[new_suffix_start..].copy_from_slice(&old_bytes[old_suffix_start..]);
        })
    }

    /// Rewrites every record from the on-disk layout implied by the current
    /// schema to the one implied by `new_schema`, applying `transform` to
    /// each record's bytes (full record, deletion flag included), then
    /// commits `new_schema` and persists the header.
    fn rewrite_for_schema(
        &mut self,
        new_schema: Schema,
        mut transform: impl FnMut(&[u8], &mut [u8]),
    ) -> DbfResult<()> {
        // Checked before any I/O: `new_schema` is caller-declared, and the
        // per-record buffers below are sized directly from it (spec §7's
        // out-of-memory case). `Schema::from_fields` already enforces this
        // same bound, so in practice this never trips, but the allocation
        // site gets its own explicit ceiling check regardless.
        let new_record_length = new_schema.record_length().max(1) as u64;
        if new_record_length as usize > MAX_RECORD_LENGTH {
            return Err(DbfError::OutOfMemory(format!(
                "new record length {new_record_length} exceeds the {MAX_RECORD_LENGTH}-byte allocation ceiling"
            )));
        }

        self.cache
            .flush(&mut self.handle, self.header_length(), self.record_length())?;

        let old_header_length = self.header_length();
        let old_record_length = self.record_length();
        let new_header_length = header::header_length_for(new_schema.len())? as u64;
        let n = self.record_count;
        let growing = new_header_length + new_record_length * n as u64
            >= old_header_length + old_record_length * n as u64;

        let mut old_buf = vec![0u8; old_record_length as usize];
        let mut new_buf = vec![0u8; new_record_length as usize];

        let indices: Vec<u32> = if growing { (0..n).rev().collect() } else { (0..n).collect() };
        for idx in indices {
            let old_target = old_header_length + idx as u64 * old_record_length;
            self.handle
                .seek(SeekFrom::Start(old_target))
                .map_err(|e| DbfError::io("seek", Some(idx), e))?;
            self.handle
                .read_exact(&mut old_buf)
                .map_err(|e| DbfError::io("read", Some(idx), e))?;

            new_buf.iter_mut().for_each(|b| *b = b' ');
            transform(&old_buf, &mut new_buf);

            let new_target = new_header_length + idx as u64 * new_record_length;
            self.handle
                .seek(SeekFrom::Start(new_target))
                .map_err(|e| DbfError::io("seek", Some(idx), e))?;
            self.handle
                .write_all(&new_buf)
                .map_err(|e| DbfError::io("write", Some(idx), e))?;
        }

        self.schema = new_schema;
        self.cache.resize(new_record_length as usize);
        self.write_full_header()?;
        let end = self.end_of_records();
        self.cache.write_eof_marker(&mut self.handle, end)?;
        log::debug!(
            "rewrote {n} record(s) for a schema change on {}",
            self.path.display()
        );
        Ok(())
    }
}

/// Converts one field's raw bytes from `old_field`'s layout to `new_field`'s
/// during `alter_field`. NULL re-emits as the destination sentinel; growing
/// pads and shrinking truncates, on the left for numeric/date fields and on
/// the right otherwise.
fn transform_altered_field(old_bytes: &[u8], new_bytes: &mut [u8], old_field: &Field, new_field: &Field) {
    if value::is_null(old_field, old_bytes) {
        new_bytes.fill(new_field.null_fill());
        return;
    }

    let old_width = old_bytes.len();
    let new_width = new_bytes.len();
    let left_aligned = matches!(
        new_field.field_type,
        FieldType::Number | FieldType::Float | FieldType::Date
    );

    if new_width >= old_width {
        let pad = new_width - old_width;
        if left_aligned {
            new_bytes[..pad].fill(b' ');
            new_bytes[pad..].copy_from_slice(old_bytes);
        } else {
            new_bytes[..old_width].copy_from_slice(old_bytes);
            new_bytes[old_width..].fill(b' ');
        }
    } else {
        let drop = old_width - new_width;
        if left_aligned {
            new_bytes.copy_from_slice(&old_bytes[drop..]);
        } else {
            new_bytes.copy_from_slice(&old_bytes[..new_width]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MemoryIoHooks;

    fn table_with_two_fields() -> DbfTable<MemoryIoHooks> {
        let mut table = DbfTable::create(MemoryIoHooks::new(), "m.dbf", None).unwrap();
        table.add_field(Field::new("A", FieldType::Character, 4, 0).unwrap()).unwrap();
        table.add_field(Field::new("B", FieldType::Number, 5, 0).unwrap()).unwrap();
        table.write_string(0, 0, "abcd").unwrap();
        table.write_int(0, 1, 42).unwrap();
        table.write_string(1, 0, "wxyz").unwrap();
        table.write_int(1, 1, 7).unwrap();
        table
    }

    #[test]
    fn add_field_preserves_existing_data_and_nulls_new_field() {
        let mut table = table_with_two_fields();
        table.add_field(Field::new("C", FieldType::Logical, 1, 0).unwrap()).unwrap();

        assert_eq!(table.read_string(0, 0).unwrap().as_deref(), Some("abcd"));
        assert_eq!(table.read_int(0, 1).unwrap(), Some(42));
        assert!(table.is_null(0, 2).unwrap());

        assert_eq!(table.read_string(1, 0).unwrap().as_deref(), Some("wxyz"));
        assert_eq!(table.read_int(1, 1).unwrap(), Some(7));
    }

    #[test]
    fn delete_field_drops_only_that_column() {
        let mut table = table_with_two_fields();
        table.delete_field(0).unwrap();

        assert_eq!(table.schema().len(), 1);
        assert_eq!(table.read_int(0, 0).unwrap(), Some(42));
        assert_eq!(table.read_int(1, 0).unwrap(), Some(7));
    }

    #[test]
    fn reorder_fields_swaps_columns_without_losing_data() {
        let mut table = table_with_two_fields();
        table.reorder_fields(&[1, 0]).unwrap();

        assert_eq!(table.schema().get(0).unwrap().name, "B");
        assert_eq!(table.schema().get(1).unwrap().name, "A");
        assert_eq!(table.read_int(0, 0).unwrap(), Some(42));
        assert_eq!(table.read_string(0, 1).unwrap().as_deref(), Some("abcd"));
        assert_eq!(table.read_int(1, 0).unwrap(), Some(7));
    }

    #[test]
    fn alter_field_widening_pads_numeric_on_the_left() {
        let mut table = table_with_two_fields();
        table.alter_field(1, "B", FieldType::Number, 9, 0).unwrap();

        assert_eq!(table.read_int(0, 1).unwrap(), Some(42));
        assert_eq!(table.read_string(0, 0).unwrap().as_deref(), Some("abcd"));
    }

    #[test]
    fn alter_field_narrowing_truncates_character_on_the_right() {
        let mut table = table_with_two_fields();
        table.alter_field(0, "A", FieldType::Character, 2, 0).unwrap();

        assert_eq!(table.read_string(0, 0).unwrap().as_deref(), Some("ab"));
        assert_eq!(table.read_int(0, 1).unwrap(), Some(42));
    }

    #[test]
    fn alter_field_preserves_null() {
        let mut table = table_with_two_fields();
        table.write_null(0, 1).unwrap();
        table.alter_field(1, "B", FieldType::Number, 8, 2).unwrap();
        assert!(table.is_null(0, 1).unwrap());
    }

    #[test]
    fn reorder_rejects_non_bijection() {
        let mut table = table_with_two_fields();
        assert!(table.reorder_fields(&[0, 0]).is_err());
        assert!(table.reorder_fields(&[0]).is_err());
    }
}
