//! Byte-addressable file semantics over an ordered transactional key-value
//! store.
//!
//! The store only offers atomic single-key sets, atomic bounded range reads,
//! and a hierarchical namespace; this crate turns those primitives into
//! ordinary file operations. Writes are split into fixed-size page
//! operations and merged read-modify-write when they miss a page boundary;
//! reads use a two-row bounded range scan that detects end-of-file without
//! any stored length field, because the tail page's existence and length are
//! the only record of how long a file is.
//!
//! Single-page writes are atomic. Multi-page writes commit page by page in
//! ascending order, so a failure mid-stream leaves a clean prefix and an
//! error reporting exactly how much was committed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fs;
pub mod namespace;
pub mod store;

pub use error::{FsError, Result};
pub use fs::file::FileHandle;
pub use fs::{FileInfo, PageFs, PageFsOptions, DEFAULT_PAGE_SIZE};
pub use store::{Database, MemoryStore};
