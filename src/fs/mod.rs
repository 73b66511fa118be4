//! Filesystem façade: paths in, file handles and directory entries out.

use std::time::SystemTime;

use tracing::trace;

use crate::error::{FsError, Result};
use crate::namespace::{self, DirectoryLayer, Subspace};
use crate::store::{Database, ReadAccess};

pub mod file;
pub mod page;

pub use file::FileHandle;
pub use page::DEFAULT_PAGE_SIZE;

/// Mode bits assumed for a node whose metadata record is absent.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Mode bits reported for the namespace root.
pub const ROOT_MODE: u32 = 0o777;

/// Construction-time options. The page size is fixed for the lifetime of the
/// namespace; changing it on an existing tree misaddresses every page.
#[derive(Clone, Copy, Debug)]
pub struct PageFsOptions {
    page_size: usize,
    file_mode: u32,
}

impl Default for PageFsOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl PageFsOptions {
    /// Options with crate defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size in bytes. Must be non-zero.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the mode bits recorded when `create` makes a new file node.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }
}

/// Directory-entry descriptor returned by [`PageFs::stat`] and
/// [`PageFs::read_dir`].
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// Node name (final path segment; `/` for the root).
    pub name: String,
    /// True when the node holds no page data and so lists as a directory.
    pub is_dir: bool,
    /// Permission bits from the metadata record, or the default when absent.
    pub mode: u32,
    /// Derived byte length; 0 for directories.
    pub size: u64,
    /// Call-time placeholder: modification times are not persisted.
    pub modified: SystemTime,
}

/// Byte-addressable file semantics over an ordered transactional store.
#[derive(Clone)]
pub struct PageFs {
    db: Database,
    dirs: DirectoryLayer,
    opts: PageFsOptions,
}

impl PageFs {
    /// Filesystem over `db` with default options.
    pub fn new(db: Database) -> Self {
        Self::with_options(db, PageFsOptions::default())
    }

    /// Filesystem over `db` with explicit options.
    pub fn with_options(db: Database, opts: PageFsOptions) -> Self {
        assert!(opts.page_size > 0, "page size must be non-zero");
        Self {
            dirs: DirectoryLayer::new(db.clone()),
            db,
            opts,
        }
    }

    /// Configured page size.
    pub fn page_size(&self) -> usize {
        self.opts.page_size
    }

    /// Opens an existing node as a file handle.
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let segments = namespace::split_path(path);
        if segments.is_empty() {
            return Err(FsError::InvalidArgument(
                "cannot open the root as a file".into(),
            ));
        }
        let subspace = self.dirs.open(&segments)?;
        Ok(self.handle(subspace, &segments))
    }

    /// Creates (or re-opens) the node at `path`, creating missing ancestors,
    /// and discards any page data it already held.
    pub fn create(&self, path: &str) -> Result<FileHandle> {
        let segments = namespace::split_path(path);
        if segments.is_empty() {
            return Err(FsError::InvalidArgument(
                "cannot open the root as a file".into(),
            ));
        }
        let (subspace, was_created) = self.dirs.create_or_open(&segments, self.opts.file_mode)?;
        if !was_created {
            // Open-with-truncate semantics for an existing file.
            let start = page::page_range_start(&subspace);
            let end = page::page_upper_bound(&subspace);
            self.db.transact(|tx| {
                tx.clear_range(&start, &end);
                Ok(())
            })?;
        }
        trace!(path, was_created, "fs.create");
        Ok(self.handle(subspace, &segments))
    }

    /// Creates the directory at `path` and every missing ancestor, recording
    /// `mode` on each segment this call creates. Re-creation of an existing
    /// node never rewrites its metadata.
    pub fn mkdir_all(&self, path: &str, mode: u32) -> Result<()> {
        let segments = namespace::split_path(path);
        self.dirs.create_or_open(&segments, mode)?;
        Ok(())
    }

    /// Describes the node at `path`.
    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        let segments = namespace::split_path(path);
        let Some(name) = segments.last().cloned() else {
            return Ok(FileInfo {
                name: "/".to_string(),
                is_dir: true,
                mode: ROOT_MODE,
                size: 0,
                modified: SystemTime::now(),
            });
        };
        let page_size = self.opts.page_size;
        self.db.read_transact(|tx| {
            let subspace = namespace::open_tx(tx, &segments)?;
            stat_tx(tx, &subspace, name, page_size)
        })
    }

    /// Describes every child of the directory at `path`, in name order, all
    /// from one consistent snapshot.
    pub fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let segments = namespace::split_path(path);
        let page_size = self.opts.page_size;
        self.db.read_transact(|tx| {
            let subspace = namespace::open_tx(tx, &segments)?;
            let names = namespace::list_tx(tx, &subspace)?;
            names
                .into_iter()
                .map(|name| {
                    let child = subspace.child(&name);
                    stat_tx(tx, &child, name, page_size)
                })
                .collect()
        })
    }

    /// Removes the node at `path` and everything beneath it.
    pub fn remove(&self, path: &str) -> Result<()> {
        self.dirs.remove(&namespace::split_path(path))
    }

    /// Joins path fragments with `/` separators.
    pub fn join(parts: &[&str]) -> String {
        parts.join("/")
    }

    fn handle(&self, subspace: Subspace, segments: &[String]) -> FileHandle {
        FileHandle::new(
            self.db.clone(),
            subspace,
            self.opts.page_size,
            format!("/{}", segments.join("/")),
        )
    }
}

/// Builds a [`FileInfo`] for one node within the caller's transaction. A
/// node without page data reports as a directory; file size is derived from
/// the tail page, never stored.
fn stat_tx(
    tx: &dyn ReadAccess,
    subspace: &Subspace,
    name: String,
    page_size: usize,
) -> Result<FileInfo> {
    let mode = namespace::node_mode_tx(tx, subspace)?.unwrap_or(DEFAULT_FILE_MODE);
    let (is_dir, size) = match file::tail_page(tx, subspace)? {
        None => (true, 0),
        Some((index, content)) => (false, index * page_size as u64 + content.len() as u64),
    };
    Ok(FileInfo {
        name,
        is_dir,
        mode,
        size,
        modified: SystemTime::now(),
    })
}
