//! Hierarchical namespace over the key-value store.
//!
//! Every file or directory is a node addressed by a [`Subspace`]: an opaque,
//! orderable key prefix built by concatenating the tuple-encoded path
//! segments. Segment encoding follows the FoundationDB tuple layer's string
//! element (type code `0x02`, embedded NUL bytes escaped as `0x00 0xFF`,
//! `0x00` terminator), so key order matches path order and a child's keys
//! always sort below its parent's marker keys.
//!
//! Each node owns a metadata record at a reserved marker key holding its
//! permission bits; the record's presence is what makes the node exist. It is
//! written only by the transaction that created the node, never overwritten
//! on a later open.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{FsError, Result};
use crate::store::{prefix_successor, Database, RangeOptions, ReadAccess};

/// Type code opening an encoded path segment.
const SEGMENT_CODE: u8 = 0x02;

/// Marker key suffix under which a node's metadata record lives. Disjoint
/// from page-data markers, which start at `0xFD`.
pub(crate) const META_MARKER: [u8; 2] = [0xFC, 0x00];

/// Opaque orderable key prefix identifying one namespace node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subspace {
    prefix: Bytes,
}

impl Subspace {
    /// The root namespace: an empty prefix.
    pub fn root() -> Self {
        Self {
            prefix: Bytes::new(),
        }
    }

    /// Subspace for a path given as normalized segments.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut prefix = BytesMut::new();
        for segment in segments {
            pack_segment(&mut prefix, segment.as_ref());
        }
        Self {
            prefix: prefix.freeze(),
        }
    }

    /// Subspace of a direct child node.
    pub fn child(&self, name: &str) -> Self {
        let mut prefix = BytesMut::with_capacity(self.prefix.len() + name.len() + 2);
        prefix.put_slice(&self.prefix);
        pack_segment(&mut prefix, name);
        Self {
            prefix: prefix.freeze(),
        }
    }

    /// Raw key prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// True for the root namespace.
    pub fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Builds a full key: prefix followed by `suffix`.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// Key of this node's metadata record.
    pub(crate) fn meta_key(&self) -> Vec<u8> {
        self.key(&META_MARKER)
    }
}

/// Encodes one path segment onto `out`.
fn pack_segment(out: &mut BytesMut, segment: &str) {
    out.put_u8(SEGMENT_CODE);
    for &byte in segment.as_bytes() {
        out.put_u8(byte);
        if byte == 0x00 {
            out.put_u8(0xFF);
        }
    }
    out.put_u8(0x00);
}

/// Decodes one segment from the front of `bytes`, returning the segment name
/// and the encoded length consumed.
fn unpack_segment(bytes: &[u8]) -> Result<(String, usize)> {
    if bytes.first() != Some(&SEGMENT_CODE) {
        return Err(FsError::Store("malformed namespace key".into()));
    }
    let mut name = Vec::new();
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            Some(0x00) if bytes.get(pos + 1) == Some(&0xFF) => {
                name.push(0x00);
                pos += 2;
            }
            Some(0x00) => {
                pos += 1;
                break;
            }
            Some(&byte) => {
                name.push(byte);
                pos += 1;
            }
            None => return Err(FsError::Store("truncated namespace key".into())),
        }
    }
    let name =
        String::from_utf8(name).map_err(|_| FsError::Store("non-utf8 segment name".into()))?;
    Ok((name, pos))
}

/// Splits and normalizes a `/`-separated path: empty segments and `.` drop
/// out, `..` pops the previous segment.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name.to_string()),
        }
    }
    segments
}

/// Directory layer: resolves paths to subspaces and maintains the node tree.
#[derive(Clone)]
pub struct DirectoryLayer {
    db: Database,
}

impl DirectoryLayer {
    /// Wraps a transaction executor.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolves an existing node. The root always resolves.
    pub fn open(&self, segments: &[String]) -> Result<Subspace> {
        self.db.read_transact(|tx| open_tx(tx, segments))
    }

    /// Creates or opens the node at `segments`, creating every missing
    /// ancestor. One transaction per segment; `mode` is recorded on exactly
    /// the segments this call created. Returns the final node's subspace and
    /// whether this call created it.
    pub fn create_or_open(&self, segments: &[String], mode: u32) -> Result<(Subspace, bool)> {
        let mut subspace = Subspace::root();
        let mut was_created = false;
        for segment in segments {
            subspace = subspace.child(segment);
            let meta_key = subspace.meta_key();
            was_created = self.db.transact(|tx| match tx.get(&meta_key)? {
                Some(_) => Ok(false),
                None => {
                    tx.set(&meta_key, &mode.to_le_bytes());
                    Ok(true)
                }
            })?;
            if was_created {
                debug!(segment = %segment, mode, "dir.create");
            }
        }
        Ok((subspace, was_created))
    }

    /// Names of the node's immediate children, in key order.
    pub fn list(&self, segments: &[String]) -> Result<Vec<String>> {
        self.db.read_transact(|tx| {
            let subspace = open_tx(tx, segments)?;
            list_tx(tx, &subspace)
        })
    }

    /// Removes the node and everything beneath it.
    pub fn remove(&self, segments: &[String]) -> Result<()> {
        if segments.is_empty() {
            return Err(FsError::InvalidArgument(
                "cannot remove the root namespace".into(),
            ));
        }
        let subspace = Subspace::from_segments(segments);
        self.db.transact(|tx| {
            if tx.get(&subspace.meta_key())?.is_none() {
                return Err(FsError::NotFound("directory entry"));
            }
            let end = prefix_successor(subspace.prefix())
                .ok_or_else(|| FsError::Store("unbounded namespace prefix".into()))?;
            tx.clear_range(subspace.prefix(), &end);
            Ok(())
        })?;
        debug!(segments = segments.len(), "dir.remove");
        Ok(())
    }
}

/// Resolves `segments` against one read transaction.
pub(crate) fn open_tx(tx: &dyn ReadAccess, segments: &[String]) -> Result<Subspace> {
    let subspace = Subspace::from_segments(segments);
    if !subspace.is_root() && tx.get(&subspace.meta_key())?.is_none() {
        return Err(FsError::NotFound("directory entry"));
    }
    Ok(subspace)
}

/// Mode bits stored on a node, when present.
pub(crate) fn node_mode_tx(tx: &dyn ReadAccess, subspace: &Subspace) -> Result<Option<u32>> {
    match tx.get(&subspace.meta_key())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw
                .as_ref()
                .try_into()
                .map_err(|_| FsError::Store("malformed metadata record".into()))?;
            Ok(Some(u32::from_le_bytes(bytes)))
        }
        None => Ok(None),
    }
}

/// Lists immediate child names within one read transaction by seeking past
/// each child's whole subtree between bounded scans.
pub(crate) fn list_tx(tx: &dyn ReadAccess, subspace: &Subspace) -> Result<Vec<String>> {
    let end = subspace.key(&[SEGMENT_CODE + 1]);
    let mut cursor = subspace.key(&[SEGMENT_CODE]);
    let mut names = Vec::new();
    loop {
        let rows = tx.get_range(&cursor, &end, RangeOptions::limit(1))?;
        let Some(row) = rows.first() else {
            break;
        };
        let encoded = &row.key[subspace.prefix().len()..];
        let (name, consumed) = unpack_segment(encoded)?;
        // Skip everything under this child: its keys all continue with a
        // marker or segment code below 0xFE.
        cursor = subspace.key(&encoded[..consumed]);
        cursor.push(0xFE);
        names.push(name);
    }
    trace!(children = names.len(), "dir.list");
    Ok(names)
}
