//! The table handle (spec §3): open/create/close, typed field access, and
//! the deletion flag. Schema mutation (add/delete/reorder/alter field) lives
//! in [`crate::mutate`], as additional `impl` blocks on [`DbfTable`].

use std::path::{Path, PathBuf};

use crate::codepage;
use crate::date::Date;
use crate::error::{DbfError, DbfResult};
use crate::field::{Field, FieldType, Schema, MAX_FIELDS};
use crate::header::{self, FileHeader, FIELD_DESCRIPTOR_SIZE, FILE_HEADER_SIZE};
use crate::hooks::{IoHooks, OpenMode};
use crate::record::RecordCache;
use crate::value::{self, Value};

/// The DBF table engine handle (spec §3). Generic over the [`IoHooks`]
/// provider so the same logic runs against a real filesystem or an
/// in-memory mock.
pub struct DbfTable<H: IoHooks> {
    pub(crate) hooks: H,
    pub(crate) path: PathBuf,
    pub(crate) handle: H::Handle,
    pub(crate) schema: Schema,
    pub(crate) record_count: u32,
    pub(crate) header_length: u16,
    /// `1 + sum(width)`, tracked explicitly (rather than recomputed from
    /// `schema` on every access) so it always matches what the record cache
    /// buffer was sized for and what is physically on disk.
    pub(crate) record_length: u16,
    pub(crate) language_driver: u8,
    pub(crate) code_page: Option<String>,
    pub(crate) update_date: Date,
    pub(crate) cache: RecordCache,
    /// No header has ever been written for this handle (spec §4.1: "on
    /// create, `no_header` is true").
    pub(crate) no_header: bool,
    /// The in-memory header (date / record count / descriptors) differs
    /// from what is on disk.
    pub(crate) updated: bool,
    pub(crate) closed: bool,
}

impl<H: IoHooks> DbfTable<H> {
    /// Opens an existing `.dbf` file (spec §4.1, §6).
    pub fn open(hooks: H, path: impl AsRef<Path>, mode: &str) -> DbfResult<DbfTable<H>> {
        let open_mode = OpenMode::parse(mode)?;
        let path = path.as_ref().to_path_buf();
        let mut handle = hooks.open(&path, open_mode, false)?;

        let file_header = FileHeader::read_from(&mut handle)?;
        let descriptor_region = (file_header.header_length as usize)
            .checked_sub(FILE_HEADER_SIZE + 1)
            .ok_or_else(|| {
                DbfError::Open(format!(
                    "header length {} leaves no room for a field descriptor array",
                    file_header.header_length
                ))
            })?;
        let field_count = descriptor_region / FIELD_DESCRIPTOR_SIZE;
        if field_count > MAX_FIELDS {
            return Err(DbfError::OutOfMemory(format!(
                "header declares {field_count} field descriptors, exceeding the {MAX_FIELDS}-field allocation ceiling"
            )));
        }
        let fields = header::read_field_descriptors(&mut handle, field_count)?;
        let schema = Schema::from_fields(fields)?;

        let code_page = codepage::resolve(&hooks, &path, file_header.language_driver)?;
        let write_eof_char = true;

        Ok(DbfTable {
            hooks,
            path,
            handle,
            schema,
            record_count: file_header.record_count,
            header_length: file_header.header_length,
            record_length: file_header.record_length,
            language_driver: file_header.language_driver,
            code_page,
            update_date: file_header.update_date,
            cache: RecordCache::new(file_header.record_length as usize, write_eof_char),
            no_header: false,
            updated: false,
            closed: false,
        })
    }

    /// Creates a new, empty `.dbf` file (spec §3's "created empty" lifecycle;
    /// §4.5 for the code-page/date defaults).
    pub fn create(hooks: H, path: impl AsRef<Path>, code_page: Option<&str>) -> DbfResult<DbfTable<H>> {
        let path = path.as_ref().to_path_buf();
        let handle = hooks.open(&path, OpenMode::ReadWrite, true)?;
        let language_driver = codepage::resolve_for_create(&hooks, &path, code_page)?;

        Ok(DbfTable {
            hooks,
            path,
            handle,
            schema: Schema::new(),
            record_count: 0,
            header_length: header::header_length_for(0)?,
            record_length: 1,
            language_driver,
            code_page: code_page.map(str::to_string),
            update_date: Date::new(1995, 7, 26),
            cache: RecordCache::new(1, true),
            no_header: true,
            updated: true,
            closed: false,
        })
    }

    pub fn n_records(&self) -> u32 {
        self.record_count
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn code_page(&self) -> Option<&str> {
        self.code_page.as_deref()
    }

    pub fn update_date(&self) -> Date {
        self.update_date
    }

    pub fn set_update_date(&mut self, date: Date) {
        self.update_date = date;
        self.updated = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn record_length(&self) -> u64 {
        self.record_length as u64
    }

    pub(crate) fn header_length(&self) -> u64 {
        self.header_length as u64
    }

    pub(crate) fn end_of_records(&self) -> u64 {
        self.header_length() + self.record_count as u64 * self.record_length()
    }

    /// Writes the full header (file header + all field descriptors). Called
    /// the first time a mutating operation touches a freshly-created table,
    /// and whenever schema mutation rewrites the descriptor region (spec
    /// §4.1).
    pub(crate) fn write_full_header(&mut self) -> DbfResult<()> {
        use std::io::{Seek, SeekFrom, Write};

        self.header_length = header::header_length_for(self.schema.len())?;
        self.record_length = self.schema.record_length().max(1) as u16;
        let file_header = FileHeader {
            update_date: self.update_date,
            record_count: self.record_count,
            header_length: self.header_length,
            record_length: self.record_length,
            language_driver: self.language_driver,
        };

        self.handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| DbfError::io("seek", None, e))?;
        file_header
            .write_to(&mut self.handle)
            .map_err(|e| DbfError::io("write", None, e))?;
        header::write_field_descriptors(&mut self.handle, &self.schema)
            .map_err(|e| DbfError::io("write", None, e))?;

        self.no_header = false;
        self.updated = false;
        self.cache.invalidate();
        log::debug!(
            "wrote header for {}: {} fields, {} records",
            self.path.display(),
            self.schema.len(),
            self.record_count
        );
        Ok(())
    }

    /// Refreshes only the mutable header bytes (date + record count),
    /// leaving the descriptor region untouched (spec §4.1).
    pub(crate) fn update_header(&mut self) -> DbfResult<()> {
        use std::io::{Seek, SeekFrom, Write};

        if self.no_header {
            return self.write_full_header();
        }
        let mut date_and_count = [0u8; 7];
        date_and_count[0] = self.update_date.year.saturating_sub(1900) as u8;
        date_and_count[1] = self.update_date.month;
        date_and_count[2] = self.update_date.day;
        date_and_count[3..7].copy_from_slice(&self.record_count.to_le_bytes());

        self.handle
            .seek(SeekFrom::Start(1))
            .map_err(|e| DbfError::io("seek", None, e))?;
        self.handle
            .write_all(&date_and_count)
            .map_err(|e| DbfError::io("write", None, e))?;
        self.updated = false;
        Ok(())
    }

    fn ensure_header_written(&mut self) -> DbfResult<()> {
        if self.no_header {
            self.write_full_header()
        } else {
            Ok(())
        }
    }

    /// Flushes the record cache and, if dirty, the header — the shared tail
    /// of every mutating operation and of [`close`](Self::close).
    pub(crate) fn flush_internal(&mut self) -> DbfResult<()> {
        self.cache
            .flush(&mut self.handle, self.header_length(), self.record_length())?;
        if self.updated {
            self.update_header()?;
        }
        use std::io::Write;
        self.handle.flush().map_err(|e| DbfError::io("flush", None, e))?;
        Ok(())
    }

    /// Closes the handle: flush header if dirty, flush any dirty record,
    /// release owned buffers (spec §5's resource discipline).
    pub fn close(mut self) -> DbfResult<()> {
        let result = self.flush_internal();
        self.closed = true;
        result
    }

    fn field(&self, index: usize) -> DbfResult<&Field> {
        self.schema.get(index)
    }

    /// Loads `record` into the cache, validating the index is in range.
    fn load_record(&mut self, record: u32) -> DbfResult<()> {
        if record >= self.record_count {
            return Err(DbfError::validation(format!(
                "record {record} out of range (table has {} records)",
                self.record_count
            )));
        }
        self.cache
            .load(&mut self.handle, self.header_length(), self.record_length(), record)
    }

    /// Appends a brand-new all-space record at `self.record_count`, per spec
    /// §4.3 ("writing past the last record appends a new all-space record
    /// and sets its deletion flag to `' '`"), and returns its index.
    fn append_blank_record(&mut self) -> DbfResult<u32> {
        self.ensure_header_written()?;
        self.cache
            .flush(&mut self.handle, self.header_length(), self.record_length())?;

        let index = self.record_count;
        let record_length = self.record_length() as usize;
        let buffer = vec![b' '; record_length];

        {
            use std::io::{Seek, SeekFrom, Write};
            let target = self.header_length() + index as u64 * self.record_length();
            self.handle
                .seek(SeekFrom::Start(target))
                .map_err(|e| DbfError::io("seek", Some(index), e))?;
            self.handle
                .write_all(&buffer)
                .map_err(|e| DbfError::io("write", Some(index), e))?;
        }

        self.record_count += 1;
        self.updated = true;
        self.cache.invalidate();
        self.cache
            .write_eof_marker(&mut self.handle, self.end_of_records())?;
        log::trace!("appended blank record {index}");
        Ok(index)
    }

    /// Resolves the record to operate on for a write: the existing index, or
    /// a freshly appended blank record when `record == n_records()`.
    fn record_for_write(&mut self, record: u32) -> DbfResult<()> {
        if record == self.record_count {
            self.append_blank_record()?;
            self.load_record(record)
        } else {
            self.load_record(record)
        }
    }

    fn on_io_error(&mut self, err: DbfError) -> DbfError {
        if let DbfError::Io { ref source, .. } = err {
            self.hooks.report_error(&format!("{err}"));
            log::error!("i/o error: {source}");
        }
        self.cache.invalidate();
        err
    }

    // ---- deletion flag (Property 4) ----

    pub fn is_deleted(&mut self, record: u32) -> DbfResult<bool> {
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        Ok(self.cache.buffer()[0] == b'*')
    }

    pub fn mark_deleted(&mut self, record: u32, deleted: bool) -> DbfResult<()> {
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        self.cache.buffer_mut()[0] = if deleted { b'*' } else { b' ' };
        self.cache.mark_modified();
        Ok(())
    }

    // ---- null predicate ----

    pub fn is_null(&mut self, record: u32, field_index: usize) -> DbfResult<bool> {
        let field = self.field(field_index)?.clone();
        let (offset, width) = (field.offset as usize, field.width as usize);
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        Ok(value::is_null(&field, &self.cache.buffer()[offset..offset + width]))
    }

    // ---- typed reads ----

    pub fn read_int(&mut self, record: u32, field_index: usize) -> DbfResult<Option<i64>> {
        let field = self.require_type(field_index, FieldType::is_numeric, "numeric")?;
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let bytes = &self.cache.buffer()[offset..offset + width];
        Ok(value::decode_integer(&field, bytes, |s| self.hooks.atof(s)))
    }

    pub fn read_double(&mut self, record: u32, field_index: usize) -> DbfResult<Option<f64>> {
        let field = self.require_type(field_index, FieldType::is_numeric, "numeric")?;
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let bytes = &self.cache.buffer()[offset..offset + width];
        Ok(value::decode_double(&field, bytes, |s| self.hooks.atof(s)))
    }

    pub fn read_string(&mut self, record: u32, field_index: usize) -> DbfResult<Option<String>> {
        let field = self.field(field_index)?.clone();
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let bytes = &self.cache.buffer()[offset..offset + width];
        if value::is_null(&field, bytes) {
            return Ok(None);
        }
        Ok(Some(value::decode_string(bytes)))
    }

    pub fn read_date(&mut self, record: u32, field_index: usize) -> DbfResult<Option<Date>> {
        let field = self.require_type(field_index, |t| t == FieldType::Date, "date")?;
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let bytes = &self.cache.buffer()[offset..offset + width];
        let date = Date::from_bytes(bytes);
        Ok(if date.is_null() { None } else { Some(date) })
    }

    pub fn read_bool(&mut self, record: u32, field_index: usize) -> DbfResult<Option<bool>> {
        let field = self.require_type(field_index, |t| t == FieldType::Logical, "logical")?;
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, _width) = (field.offset as usize, field.width as usize);
        Ok(value::decode_bool(&self.cache.buffer()[offset..offset + 1]))
    }

    /// Decodes a `C`/other field through the table's resolved code page
    /// (spec §4.3, feature `codepage-decode`) instead of the default
    /// ASCII-range byte/char mapping. Falls back to lossy ASCII decoding when
    /// no code page was resolved or the label is unrecognized.
    #[cfg(feature = "codepage-decode")]
    pub fn read_string_decoded(&mut self, record: u32, field_index: usize) -> DbfResult<Option<String>> {
        let field = self.field(field_index)?.clone();
        self.load_record(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let bytes = &self.cache.buffer()[offset..offset + width];
        if value::is_null(&field, bytes) {
            return Ok(None);
        }
        Ok(Some(value::decode_string_with_encoding(bytes, self.code_page.as_deref())))
    }

    /// Generic read dispatching on the field's native type (spec §4.3's
    /// per-type "read-as" column).
    pub fn read_value(&mut self, record: u32, field_index: usize) -> DbfResult<Option<Value>> {
        let field = self.field(field_index)?.clone();
        match field.field_type {
            FieldType::Number | FieldType::Float => Ok(if field.prefers_double() {
                self.read_double(record, field_index)?.map(Value::Double)
            } else {
                self.read_int(record, field_index)?.map(Value::Integer)
            }),
            FieldType::Date => Ok(self.read_date(record, field_index)?.map(Value::Date)),
            _ => Ok(self.read_string(record, field_index)?.map(Value::String)),
        }
    }

    fn require_type(
        &self,
        field_index: usize,
        predicate: impl Fn(FieldType) -> bool,
        expected: &str,
    ) -> DbfResult<Field> {
        let field = self.field(field_index)?;
        if predicate(field.field_type) {
            Ok(field.clone())
        } else {
            Err(DbfError::validation(format!(
                "field {field_index} ({:?}) is not a {expected} field",
                field.field_type
            )))
        }
    }

    // ---- typed writes ----

    pub fn write_int(&mut self, record: u32, field_index: usize, v: i64) -> DbfResult<()> {
        self.write_double(record, field_index, v as f64)
    }

    pub fn write_double(&mut self, record: u32, field_index: usize, v: f64) -> DbfResult<()> {
        let field = self.require_type(field_index, FieldType::is_numeric, "numeric")?;
        self.record_for_write(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let result = value::encode_double(&field, v, &mut self.cache.buffer_mut()[offset..offset + width]);
        self.cache.mark_modified();
        result
    }

    pub fn write_string(&mut self, record: u32, field_index: usize, v: &str) -> DbfResult<()> {
        let field = self.field(field_index)?.clone();
        self.record_for_write(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let result = value::encode_string(v, &mut self.cache.buffer_mut()[offset..offset + width]);
        self.cache.mark_modified();
        result
    }

    pub fn write_date(&mut self, record: u32, field_index: usize, v: Date) -> DbfResult<()> {
        let field = self.require_type(field_index, |t| t == FieldType::Date, "date")?;
        self.record_for_write(record).map_err(|e| self.on_io_error(e))?;
        let (offset, _width) = (field.offset as usize, field.width as usize);
        self.cache.buffer_mut()[offset..offset + 8].copy_from_slice(&v.to_bytes());
        self.cache.mark_modified();
        Ok(())
    }

    pub fn write_null(&mut self, record: u32, field_index: usize) -> DbfResult<()> {
        let field = self.field(field_index)?.clone();
        self.record_for_write(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        value::write_null(&field, &mut self.cache.buffer_mut()[offset..offset + width]);
        self.cache.mark_modified();
        Ok(())
    }

    pub fn write_bool(&mut self, record: u32, field_index: usize, v: bool) -> DbfResult<()> {
        let field = self.require_type(field_index, |t| t == FieldType::Logical, "logical")?;
        self.record_for_write(record).map_err(|e| self.on_io_error(e))?;
        let (offset, width) = (field.offset as usize, field.width as usize);
        let result = value::encode_bool(v, &mut self.cache.buffer_mut()[offset..offset + width]);
        self.cache.mark_modified();
        result
    }
}

impl<H: IoHooks> Drop for DbfTable<H> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush_internal() {
            log::error!("error flushing dbf table {} on drop: {e}", self.path.display());
        }
    }
}
