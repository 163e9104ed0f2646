//! The byte-stream collaborator (spec §6).
//!
//! The engine never touches the filesystem directly: every open/remove/parse
//! call is routed through an [`IoHooks`] implementation, and every read,
//! write, seek or flush against an already-open table goes through the
//! `Read + Write + Seek` handle that `open` returned. [`StdIoHooks`] is the
//! default provider, backed by `std::fs::File`. [`MemoryIoHooks`] is an
//! in-process alternate used by the test suite (and available to any caller
//! who wants to exercise DBF logic without touching a real filesystem).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{DbfError, DbfResult};

/// The three access modes recognized by the engine (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

impl OpenMode {
    /// Normalizes a caller-supplied mode string to one of the two internal
    /// modes, or fails for an unrecognized string.
    pub fn parse(mode: &str) -> DbfResult<OpenMode> {
        match mode {
            "r" | "rb" => Ok(OpenMode::ReadOnly),
            "r+" | "rb+" | "r+b" => Ok(OpenMode::ReadWrite),
            other => Err(DbfError::validation(format!("unknown open mode {other:?}"))),
        }
    }
}

/// A handle bounded by exactly the operations the record cache needs:
/// sequential reads and writes plus arbitrary seeking.
pub trait IoHandle: Read + Write + Seek {}
impl<T: Read + Write + Seek> IoHandle for T {}

/// Capability set a caller supplies to the engine (spec §6). An
/// implementation owns how paths are opened/removed and how the engine
/// reports errors and parses locale-independent floats; the handle itself
/// satisfies [`IoHandle`].
pub trait IoHooks {
    type Handle: IoHandle;

    /// Opens `path` in the given mode, creating it if `create` is set.
    fn open(&self, path: &Path, mode: OpenMode, create: bool) -> DbfResult<Self::Handle>;

    /// Removes a file, tolerating a missing file.
    fn remove(&self, path: &Path) -> DbfResult<()>;

    /// Reads a small sidecar file in full (e.g. `.cpg`), returning `None`
    /// when the file does not exist.
    fn read_sidecar(&self, path: &Path, max_bytes: usize) -> DbfResult<Option<Vec<u8>>>;

    /// Writes a small sidecar file, overwriting any existing content.
    fn write_sidecar(&self, path: &Path, contents: &[u8]) -> DbfResult<()>;

    /// Reports a short human-readable error string to whatever diagnostic
    /// channel the caller wants (a log, a UI, a counter). The default
    /// provider logs it at `error!`.
    fn report_error(&self, message: &str);

    /// A locale-independent string-to-float parse, `'.'` as the decimal
    /// separator. Returns `None` when the string is not a valid float.
    fn atof(&self, text: &str) -> Option<f64>;
}

/// The default [`IoHooks`] provider, backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdIoHooks;

impl IoHooks for StdIoHooks {
    type Handle = File;

    fn open(&self, path: &Path, mode: OpenMode, create: bool) -> DbfResult<Self::Handle> {
        let mut options = OpenOptions::new();
        options.read(true);
        if mode == OpenMode::ReadWrite {
            options.write(true);
        }
        if create {
            options.write(true).create(true);
        }
        options
            .open(path)
            .map_err(|e| DbfError::Open(format!("{}: {e}", path.display())))
    }

    fn remove(&self, path: &Path) -> DbfResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DbfError::io("remove", None, e)),
        }
    }

    fn read_sidecar(&self, path: &Path, max_bytes: usize) -> DbfResult<Option<Vec<u8>>> {
        match fs::File::open(path) {
            Ok(mut f) => {
                let mut buf = vec![0u8; max_bytes];
                let n = f.read(&mut buf).map_err(|e| DbfError::io("read_sidecar", None, e))?;
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DbfError::io("read_sidecar", None, e)),
        }
    }

    fn write_sidecar(&self, path: &Path, contents: &[u8]) -> DbfResult<()> {
        fs::write(path, contents).map_err(|e| DbfError::io("write_sidecar", None, e))
    }

    fn report_error(&self, message: &str) {
        log::error!("{message}");
    }

    fn atof(&self, text: &str) -> Option<f64> {
        text.trim().parse::<f64>().ok()
    }
}

/// An in-process alternate backend, storing file contents in a shared map
/// instead of on disk. Every handle cloned from the same [`MemoryIoHooks`]
/// sees the same files, mirroring how multiple opens of the same path behave
/// against a real filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryIoHooks {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryIoHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file's contents without going through [`IoHooks::open`].
    pub fn seed(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), contents.into());
    }

    /// Returns the current contents of a path, if any.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

/// A handle into [`MemoryIoHooks`]: an in-memory cursor that, on drop or
/// explicit flush, writes its buffer back into the shared store.
pub struct MemoryHandle {
    path: PathBuf,
    store: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    cursor: Cursor<Vec<u8>>,
}

impl MemoryHandle {
    fn sync(&mut self) {
        self.store
            .lock()
            .unwrap()
            .insert(self.path.clone(), self.cursor.get_ref().clone());
    }
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.cursor.write(buf)?;
        self.sync();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync();
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl IoHooks for MemoryIoHooks {
    type Handle = MemoryHandle;

    fn open(&self, path: &Path, _mode: OpenMode, create: bool) -> DbfResult<Self::Handle> {
        let mut files = self.files.lock().unwrap();
        let contents = match files.get(path) {
            Some(bytes) => bytes.clone(),
            None if create => {
                files.insert(path.to_path_buf(), Vec::new());
                Vec::new()
            }
            None => return Err(DbfError::Open(format!("{}: not found", path.display()))),
        };
        drop(files);
        Ok(MemoryHandle {
            path: path.to_path_buf(),
            store: Arc::clone(&self.files),
            cursor: Cursor::new(contents),
        })
    }

    fn remove(&self, path: &Path) -> DbfResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn read_sidecar(&self, path: &Path, max_bytes: usize) -> DbfResult<Option<Vec<u8>>> {
        Ok(self.contents(path).map(|mut bytes| {
            bytes.truncate(max_bytes);
            bytes
        }))
    }

    fn write_sidecar(&self, path: &Path, contents: &[u8]) -> DbfResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn report_error(&self, message: &str) {
        log::error!("{message}");
    }

    fn atof(&self, text: &str) -> Option<f64> {
        text.trim().parse::<f64>().ok()
    }
}
