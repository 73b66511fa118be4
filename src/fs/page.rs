//! Page geometry: offset/key translation, write splitting, page merging.
//!
//! A file's bytes live in fixed-size pages, each stored under one key of the
//! file's subspace. Every page except the highest-indexed one is exactly
//! `page_size` bytes; the tail page may be shorter and its length is the only
//! record of where the file ends. Pages are never padded.

use bytes::Bytes;
use smallvec::SmallVec;

use crate::error::{FsError, Result};
use crate::namespace::Subspace;
use crate::store::WriteAccess;

/// Page size fixed at filesystem construction and never varied per call.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Marker that opens every page-data key within a subspace.
const DATA_MARKER: [u8; 2] = [0xFD, 0x00];

/// Exclusive upper bound marker for page-data scans: the marker immediately
/// after [`DATA_MARKER`], so a bounded scan can never cross into another
/// node's keys.
const DATA_UPPER_MARKER: [u8; 2] = [0xFD, 0x01];

/// Maps a byte offset to its covering page index and the offset within that
/// page. Pure and total.
pub fn locate(offset: u64, page_size: usize) -> (u64, usize) {
    let page_size = page_size as u64;
    (offset / page_size, (offset % page_size) as usize)
}

/// Key of page `index` within `subspace`. For a fixed subspace, key order
/// strictly follows page index: the index is appended big-endian.
pub fn page_key(subspace: &Subspace, index: u64) -> Vec<u8> {
    let mut key = subspace.key(&DATA_MARKER);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Inclusive lower bound of the subspace's page-data range.
pub fn page_range_start(subspace: &Subspace) -> Vec<u8> {
    subspace.key(&DATA_MARKER)
}

/// Exclusive upper bound of the subspace's page-data range.
pub fn page_upper_bound(subspace: &Subspace) -> Vec<u8> {
    subspace.key(&DATA_UPPER_MARKER)
}

/// Recovers the page index from a full page key of `subspace`.
pub fn page_index_of(subspace: &Subspace, key: &[u8]) -> Result<u64> {
    let rest = key
        .strip_prefix(subspace.prefix())
        .and_then(|rest| rest.strip_prefix(&DATA_MARKER))
        .ok_or_else(|| FsError::Store("key outside the subspace page range".into()))?;
    let bytes: [u8; 8] = rest
        .try_into()
        .map_err(|_| FsError::Store("malformed page key".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// One bounded write against a single page. Produced by [`split`], consumed
/// exactly once by [`apply`].
#[derive(Clone, Copy, Debug)]
pub struct WriteOp<'a> {
    /// Bytes destined for this page.
    pub payload: &'a [u8],
    /// Index of the page being written.
    pub page_index: u64,
    /// Offset within the page at which the payload starts.
    pub intra_offset: usize,
    /// Page size the operation was split against.
    pub page_size: usize,
}

impl WriteOp<'_> {
    /// True when the operation replaces the whole page, which needs no read
    /// of the existing content.
    pub fn is_full_page(&self) -> bool {
        self.intra_offset == 0 && self.payload.len() == self.page_size
    }

    fn check_bounds(&self) -> Result<()> {
        if self.intra_offset + self.payload.len() > self.page_size {
            return Err(FsError::OversizedWrite {
                intra_offset: self.intra_offset,
                len: self.payload.len(),
                page_size: self.page_size,
            });
        }
        Ok(())
    }
}

/// Splits `buf` at byte `offset` into per-page write operations, ordered by
/// ascending page index. The first operation starts at `offset % page_size`,
/// all later ones at zero; together the payloads cover `buf` exactly. An
/// empty buffer yields no operations.
pub fn split<'a>(buf: &'a [u8], offset: u64, page_size: usize) -> SmallVec<[WriteOp<'a>; 4]> {
    let mut ops = SmallVec::new();
    let mut offset = offset;
    let mut consumed = 0;
    while consumed < buf.len() {
        let (page_index, intra_offset) = locate(offset, page_size);
        let take = (page_size - intra_offset).min(buf.len() - consumed);
        ops.push(WriteOp {
            payload: &buf[consumed..consumed + take],
            page_index,
            intra_offset,
            page_size,
        });
        consumed += take;
        offset += take as u64;
    }
    ops
}

/// Computes the new content of a page under `op`.
///
/// Bytes before `intra_offset` are preserved from the existing page; the
/// payload replaces everything from `intra_offset` on, and any existing bytes
/// past the payload's end are dropped. That tail truncation is the defined
/// partial-write policy: a mid-page overwrite means "replace from here", and
/// callers that need the old tail must issue a second overlapping write.
///
/// A write starting past the end of the existing content is rejected rather
/// than zero-filled.
pub fn merge(existing: Option<&[u8]>, op: &WriteOp<'_>) -> Result<Bytes> {
    op.check_bounds()?;
    if op.intra_offset == 0 {
        // Nothing to preserve: the payload is the page, tail dropped.
        return Ok(Bytes::copy_from_slice(op.payload));
    }
    let existing = existing.unwrap_or(&[]);
    if op.intra_offset > existing.len() {
        return Err(FsError::WriteGap {
            intra_offset: op.intra_offset,
            existing_len: existing.len(),
        });
    }
    let mut page = Vec::with_capacity(op.intra_offset + op.payload.len());
    page.extend_from_slice(&existing[..op.intra_offset]);
    page.extend_from_slice(op.payload);
    Ok(Bytes::from(page))
}

/// Applies one write operation inside the caller's transaction, returning
/// the bytes accepted.
///
/// A full-page write sets the key without reading. A partial write fetches
/// the current page in the same transaction that performs the set, so two
/// concurrent partial writers to one page can never interleave into a torn
/// page: the store serializes the read-merge-set units.
pub fn apply(tx: &mut dyn WriteAccess, subspace: &Subspace, op: &WriteOp<'_>) -> Result<usize> {
    op.check_bounds()?;
    let key = page_key(subspace, op.page_index);
    if op.is_full_page() {
        tx.set(&key, op.payload);
        return Ok(op.payload.len());
    }
    let existing = tx.get(&key)?;
    let page = merge(existing.as_deref(), op)?;
    tx.set(&key, &page);
    Ok(op.payload.len())
}
