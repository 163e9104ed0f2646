//! The record cache (spec §4.2): the single record-sized buffer that
//! represents whichever record is "current", its dirty flag, and the seek
//! elision contract.

use std::io::{Seek, SeekFrom};

use crate::error::{DbfError, DbfResult};
use crate::header::EOF_MARKER;
use crate::hooks::IoHandle;

#[derive(Debug)]
pub struct RecordCache {
    buffer: Vec<u8>,
    current_record: Option<u32>,
    current_record_modified: bool,
    require_next_write_seek: bool,
    pub write_eof_char: bool,
}

impl RecordCache {
    pub fn new(record_length: usize, write_eof_char: bool) -> RecordCache {
        RecordCache {
            buffer: vec![0u8; record_length],
            current_record: None,
            current_record_modified: false,
            require_next_write_seek: true,
            write_eof_char,
        }
    }

    pub fn current_record(&self) -> Option<u32> {
        self.current_record
    }

    pub fn is_dirty(&self) -> bool {
        self.current_record_modified
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Invalidates the cache without flushing — used after an I/O error, per
    /// spec §7 ("the record cache is invalidated").
    pub fn invalidate(&mut self) {
        self.current_record = None;
        self.current_record_modified = false;
        self.require_next_write_seek = true;
    }

    /// Resizes the record buffer (used by alter-field width changes),
    /// discarding any cached record — callers must reload after resizing.
    pub fn resize(&mut self, record_length: usize) {
        self.buffer = vec![0u8; record_length];
        self.invalidate();
    }

    /// Loads record `index`, flushing any dirty current record first.
    pub fn load<H: IoHandle>(
        &mut self,
        handle: &mut H,
        header_length: u64,
        record_length: u64,
        index: u32,
    ) -> DbfResult<()> {
        if self.current_record == Some(index) {
            return Ok(());
        }
        self.flush(handle, header_length, record_length)?;

        let target = header_length + index as u64 * record_length;
        handle
            .seek(SeekFrom::Start(target))
            .map_err(|e| DbfError::io("seek", Some(index), e))?;
        std::io::Read::read_exact(handle, &mut self.buffer)
            .map_err(|e| DbfError::io("read", Some(index), e))?;

        self.current_record = Some(index);
        self.current_record_modified = false;
        self.require_next_write_seek = true;
        log::trace!("loaded record {index}");
        Ok(())
    }

    /// Marks the current record dirty — callers mutate `buffer_mut()` first.
    pub fn mark_modified(&mut self) {
        self.current_record_modified = true;
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Writes the dirty current record back, applying seek elision (spec
    /// §4.2): the seek is skipped when the handle is already positioned at
    /// the target and no read has happened since the last write.
    pub fn flush<H: IoHandle>(
        &mut self,
        handle: &mut H,
        header_length: u64,
        record_length: u64,
    ) -> DbfResult<()> {
        if !self.current_record_modified {
            return Ok(());
        }
        let index = self.current_record.expect("modified record must have an index");
        let target = header_length + index as u64 * record_length;

        if self.require_next_write_seek {
            handle
                .seek(SeekFrom::Start(target))
                .map_err(|e| DbfError::io("seek", Some(index), e))?;
        } else {
            let position = handle
                .stream_position()
                .map_err(|e| DbfError::io("tell", Some(index), e))?;
            if position != target {
                handle
                    .seek(SeekFrom::Start(target))
                    .map_err(|e| DbfError::io("seek", Some(index), e))?;
            }
        }

        std::io::Write::write_all(handle, &self.buffer).map_err(|e| DbfError::io("write", Some(index), e))?;
        self.current_record_modified = false;
        self.require_next_write_seek = false;
        log::trace!("flushed record {index}");
        Ok(())
    }

    /// After a flush that wrote the last record, rewrites the trailing EOF
    /// marker iff `write_eof_char` is set (spec §4.2, §4.4).
    pub fn write_eof_marker<H: IoHandle>(&mut self, handle: &mut H, end_of_file: u64) -> DbfResult<()> {
        if !self.write_eof_char {
            return Ok(());
        }
        handle
            .seek(SeekFrom::Start(end_of_file))
            .map_err(|e| DbfError::io("seek", None, e))?;
        std::io::Write::write_all(handle, &[EOF_MARKER]).map_err(|e| DbfError::io("write", None, e))?;
        self.require_next_write_seek = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{IoHooks, MemoryIoHooks, OpenMode};
    use std::path::Path;

    #[test]
    fn load_then_flush_round_trips() {
        let hooks = MemoryIoHooks::new();
        let path = Path::new("cache.dbf");
        hooks.seed(path, vec![0u8; 32 + 10 * 2]);
        let mut handle = hooks.open(path, OpenMode::ReadWrite, false).unwrap();

        let mut cache = RecordCache::new(10, false);
        cache.load(&mut handle, 32, 10, 0).unwrap();
        cache.buffer_mut().copy_from_slice(b"0123456789");
        cache.mark_modified();
        cache.flush(&mut handle, 32, 10).unwrap();

        cache.invalidate();
        cache.load(&mut handle, 32, 10, 0).unwrap();
        assert_eq!(cache.buffer(), b"0123456789");
    }

    #[test]
    fn loading_flushes_prior_dirty_record() {
        let hooks = MemoryIoHooks::new();
        let path = Path::new("cache2.dbf");
        hooks.seed(path, vec![0u8; 32 + 10 * 2]);
        let mut handle = hooks.open(path, OpenMode::ReadWrite, false).unwrap();

        let mut cache = RecordCache::new(10, false);
        cache.load(&mut handle, 32, 10, 0).unwrap();
        cache.buffer_mut().copy_from_slice(b"aaaaaaaaaa");
        cache.mark_modified();

        cache.load(&mut handle, 32, 10, 1).unwrap();
        assert_eq!(cache.current_record(), Some(1));

        cache.load(&mut handle, 32, 10, 0).unwrap();
        assert_eq!(cache.buffer(), b"aaaaaaaaaa");
    }
}
