use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FsError>;

/// Unified error type for filesystem and store operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// A path, directory node, or page was absent where presence is required.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A write operation's bounds violate the page size. Cannot arise from
    /// splitter-produced operations; checked on every merge regardless.
    #[error("write of {len} bytes at page offset {intra_offset} exceeds page size {page_size}")]
    OversizedWrite {
        /// Offset within the page at which the write begins.
        intra_offset: usize,
        /// Payload length in bytes.
        len: usize,
        /// Configured page size.
        page_size: usize,
    },

    /// A partial write begins past the end of the existing page content.
    /// Rejected rather than zero-filled.
    #[error("write at page offset {intra_offset} lands past the {existing_len} existing bytes")]
    WriteGap {
        /// Offset within the page at which the write begins.
        intra_offset: usize,
        /// Length of the page content currently stored.
        existing_len: usize,
    },

    /// Fewer bytes were committed than requested. `written` is the exact
    /// committed prefix, so callers can retry from `offset + written`.
    #[error("short write: {written} of {requested} bytes committed: {source}")]
    ShortWrite {
        /// Bytes committed before the failure.
        written: usize,
        /// Bytes the caller asked to write.
        requested: usize,
        /// First error encountered in the operation stream.
        #[source]
        source: Box<FsError>,
    },

    /// A caller-supplied argument is out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Opaque failure from the underlying transactional store, wrapped with
    /// operation context and not interpreted further.
    #[error("store failure: {0}")]
    Store(String),
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> io::Error {
        let kind = match &err {
            FsError::NotFound(_) => io::ErrorKind::NotFound,
            FsError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
