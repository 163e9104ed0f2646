use std::io;

/// Error taxonomy for the DBF table engine (spec §7).
///
/// Every fallible public operation returns `Result<_, DbfError>`. Panics are
/// reserved for violations of the engine's own internal invariants, never for
/// caller-supplied data.
#[derive(Debug, thiserror::Error)]
pub enum DbfError {
    /// The file could not be opened, or its header was malformed. No handle
    /// is returned and no side effects occur.
    #[error("failed to open dbf table: {0}")]
    Open(String),

    /// A seek/read/write against the underlying byte stream failed. The
    /// handle remains valid but its record cache has been invalidated.
    #[error("i/o failure during {operation} (record {record:?}): {source}")]
    Io {
        operation: &'static str,
        record: Option<u32>,
        #[source]
        source: io::Error,
    },

    /// An out-of-range index, a malformed value, or a schema limit was
    /// violated. No I/O was performed.
    #[error("validation failure: {0}")]
    Validation(String),

    /// A caller-declared size (descriptor count, record length) would
    /// require an allocation beyond what the engine is willing to attempt.
    #[error("refusing to allocate: {0}")]
    OutOfMemory(String),
}

impl DbfError {
    pub(crate) fn io(operation: &'static str, record: Option<u32>, source: io::Error) -> Self {
        DbfError::Io {
            operation,
            record,
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        DbfError::Validation(message.into())
    }
}

pub type DbfResult<T> = Result<T, DbfError>;
