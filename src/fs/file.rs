//! File handles: positional reads and writes over the page store.
//!
//! A handle pairs a namespace subspace with a sequential cursor. The
//! positional operations [`FileHandle::read_at`] and [`FileHandle::write_at`]
//! never touch the cursor and are safe to reuse concurrently; the sequential
//! `std::io` implementations move the cursor by the bytes transferred.
//!
//! Every page write commits synchronously in its own transaction, so there
//! is no buffered state: closing a handle is a no-op, and dropping it loses
//! nothing.

use std::io;

use bytes::Bytes;
use tracing::trace;

use crate::error::{FsError, Result};
use crate::fs::page;
use crate::namespace::Subspace;
use crate::store::{Database, RangeOptions, ReadAccess};

/// Handle to one file node.
pub struct FileHandle {
    db: Database,
    subspace: Subspace,
    page_size: usize,
    path: String,
    pos: u64,
}

impl FileHandle {
    pub(crate) fn new(db: Database, subspace: Subspace, page_size: usize, path: String) -> Self {
        Self {
            db,
            subspace,
            page_size,
            path,
            pos: 0,
        }
    }

    /// Normalized path the handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current sequential position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reads up to `buf.len()` bytes at `offset` without moving the cursor.
    ///
    /// Returns the bytes copied and whether end-of-file was reached: one
    /// bounded scan of at most two rows fetches the covering page and probes
    /// for a successor, and EOF is signaled on the call that drains the tail
    /// page from the given offset. A read that stops at a page boundary with
    /// further pages present returns `false`; the caller re-invokes at the
    /// next offset rather than this reader stitching pages together.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(usize, bool)> {
        let (page_index, intra_offset) = page::locate(offset, self.page_size);
        let begin = page::page_key(&self.subspace, page_index);
        let end = page::page_upper_bound(&self.subspace);
        let (first, has_more) = self.db.read_transact(|tx| {
            let rows = tx.get_range(&begin, &end, RangeOptions::limit(2))?;
            let has_more = rows.len() > 1;
            Ok((rows.into_iter().next().map(|kv| kv.value), has_more))
        })?;
        let Some(page) = first else {
            return Ok((0, true));
        };
        let available = page.len().saturating_sub(intra_offset);
        let copied = available.min(buf.len());
        if copied > 0 {
            buf[..copied].copy_from_slice(&page[intra_offset..intra_offset + copied]);
        }
        let eof = copied == available && !has_more;
        trace!(offset, copied, eof, "file.read_at");
        Ok((copied, eof))
    }

    /// Writes `buf` at `offset` without moving the cursor.
    ///
    /// The buffer is split into per-page operations committed in ascending
    /// page order, one transaction each. A single-page write is atomic; a
    /// multi-page write is not atomic across pages, and a failure mid-stream
    /// leaves exactly the reported prefix committed. In that case the error
    /// is [`FsError::ShortWrite`] carrying the committed byte count, so the
    /// caller can retry from `offset + written`.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let ops = page::split(buf, offset, self.page_size);
        trace!(offset, len = buf.len(), pages = ops.len(), "file.write_at");
        let mut written = 0usize;
        for op in &ops {
            match self.db.transact(|tx| page::apply(tx, &self.subspace, op)) {
                Ok(accepted) => written += accepted,
                Err(source) if written == 0 => return Err(source),
                Err(source) => {
                    return Err(FsError::ShortWrite {
                        written,
                        requested: buf.len(),
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(written)
    }

    /// Derived file length: `last page index * page size + tail page length`.
    ///
    /// Computed from a reverse bounded scan of the page range; nothing is
    /// cached or stored.
    pub fn size(&self) -> Result<u64> {
        self.db
            .read_transact(|tx| derived_size(tx, &self.subspace, self.page_size))
    }

    /// Shrinks the file to `size` bytes in one atomic transaction: every
    /// page past the new tail is dropped and the tail page is cut to the
    /// exact remaining count. A target at or beyond the current length
    /// leaves the file unchanged; the store cannot represent holes, so
    /// truncation never extends.
    pub fn truncate(&self, size: u64) -> Result<()> {
        let page_size = self.page_size;
        self.db.transact(|tx| {
            let current = derived_size(tx, &self.subspace, page_size)?;
            if size >= current {
                return Ok(());
            }
            trace!(from = current, to = size, "file.truncate");
            let start = page::page_range_start(&self.subspace);
            let end = page::page_upper_bound(&self.subspace);
            if size == 0 {
                tx.clear_range(&start, &end);
                return Ok(());
            }
            let (tail_index, _) = page::locate(size - 1, page_size);
            let keep = (size - tail_index * page_size as u64) as usize;
            tx.clear_range(&page::page_key(&self.subspace, tail_index + 1), &end);
            let tail_key = page::page_key(&self.subspace, tail_index);
            if let Some(tail) = tx.get(&tail_key)? {
                if tail.len() > keep {
                    tx.set(&tail_key, &tail[..keep]);
                }
            }
            Ok(())
        })
    }

    /// Releases the handle. Nothing is buffered, so this is a no-op kept for
    /// call-site symmetry.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Derived length of the subspace's page range within one transaction.
pub(crate) fn derived_size(
    tx: &dyn ReadAccess,
    subspace: &Subspace,
    page_size: usize,
) -> Result<u64> {
    match tail_page(tx, subspace)? {
        None => Ok(0),
        Some((index, content)) => Ok(index * page_size as u64 + content.len() as u64),
    }
}

/// Tail page of the subspace, if any: `(index, content)`.
pub(crate) fn tail_page(
    tx: &dyn ReadAccess,
    subspace: &Subspace,
) -> Result<Option<(u64, Bytes)>> {
    let start = page::page_range_start(subspace);
    let end = page::page_upper_bound(subspace);
    let rows = tx.get_range(&start, &end, RangeOptions::limit(1).reversed())?;
    match rows.first() {
        None => Ok(None),
        Some(tail) => {
            let index = page::page_index_of(subspace, &tail.key)?;
            Ok(Some((index, tail.value.clone())))
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (copied, _eof) = self.read_at(buf, self.pos).map_err(io::Error::from)?;
        self.pos += copied as u64;
        Ok(copied)
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_at(buf, self.pos) {
            Ok(written) => {
                self.pos += written as u64;
                Ok(written)
            }
            // A committed prefix is still progress: report it and leave the
            // cursor past the committed bytes, per io::Write's contract.
            Err(FsError::ShortWrite { written, .. }) if written > 0 => {
                self.pos += written as u64;
                Ok(written)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // Every write already committed in its own transaction.
        Ok(())
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            io::SeekFrom::End(delta) => self
                .size()
                .map_err(io::Error::from)?
                .checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                FsError::InvalidArgument("seek before byte 0".into()),
            )
        })?;
        Ok(self.pos)
    }
}
