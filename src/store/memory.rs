//! Ordered in-memory store backend.
//!
//! A `BTreeMap` under a `parking_lot::RwLock` is the single source of truth
//! and serialization point. Read transactions hold the read half for their
//! whole scope and therefore observe one consistent snapshot; write
//! transactions hold the write half exclusively and stage mutations that are
//! applied only at commit, so an abandoned transaction leaves no trace.
//!
//! Transactions must not be nested on one thread: beginning a second
//! transaction while another is live deadlocks on the lock.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::store::{KeyValue, RangeOptions, ReadAccess, Store, WriteAccess};

type Map = BTreeMap<Vec<u8>, Bytes>;

/// In-memory ordered transactional key-value store.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<Map>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently committed.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True when no keys are committed.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn begin_read<'s>(&'s self) -> Result<Box<dyn ReadAccess + 's>> {
        Ok(Box::new(ReadTxn {
            map: self.map.read(),
        }))
    }

    fn begin_write<'s>(&'s self) -> Result<Box<dyn WriteAccess + 's>> {
        Ok(Box::new(WriteTxn {
            base: self.map.write(),
            staged: BTreeMap::new(),
        }))
    }
}

struct ReadTxn<'s> {
    map: RwLockReadGuard<'s, Map>,
}

impl ReadAccess for ReadTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.get(key).cloned())
    }

    fn get_range(&self, begin: &[u8], end: &[u8], opts: RangeOptions) -> Result<Vec<KeyValue>> {
        Ok(scan(&self.map, begin, end, opts))
    }
}

/// Staged mutation: a pending value or a pending removal.
type Pending = Option<Bytes>;

struct WriteTxn<'s> {
    base: RwLockWriteGuard<'s, Map>,
    staged: BTreeMap<Vec<u8>, Pending>,
}

impl ReadAccess for WriteTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.staged.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }

    fn get_range(&self, begin: &[u8], end: &[u8], opts: RangeOptions) -> Result<Vec<KeyValue>> {
        Ok(scan_overlay(&self.base, &self.staged, begin, end, opts))
    }
}

impl WriteAccess for WriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.staged
            .insert(key.to_vec(), Some(Bytes::copy_from_slice(value)));
    }

    fn clear(&mut self, key: &[u8]) {
        self.staged.insert(key.to_vec(), None);
    }

    fn clear_range(&mut self, begin: &[u8], end: &[u8]) {
        if begin >= end {
            return;
        }
        let staged_in_range: Vec<Vec<u8>> = self
            .staged
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in staged_in_range {
            self.staged.remove(&key);
        }
        let base_in_range: Vec<Vec<u8>> = self
            .base
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in base_in_range {
            self.staged.insert(key, None);
        }
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut txn = *self;
        for (key, pending) in txn.staged {
            match pending {
                Some(value) => {
                    txn.base.insert(key, value);
                }
                None => {
                    txn.base.remove(&key);
                }
            }
        }
        Ok(())
    }
}

fn scan(map: &Map, begin: &[u8], end: &[u8], opts: RangeOptions) -> Vec<KeyValue> {
    if begin >= end || opts.limit == 0 {
        return Vec::new();
    }
    let range = map.range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)));
    let pair = |(k, v): (&Vec<u8>, &Bytes)| KeyValue {
        key: Bytes::copy_from_slice(k),
        value: v.clone(),
    };
    if opts.reverse {
        range.rev().take(opts.limit).map(pair).collect()
    } else {
        range.take(opts.limit).map(pair).collect()
    }
}

/// Merges the committed map with a transaction's staged overlay, staged
/// entries winning and pending removals dropping out of the result.
fn scan_overlay(
    base: &Map,
    staged: &BTreeMap<Vec<u8>, Pending>,
    begin: &[u8],
    end: &[u8],
    opts: RangeOptions,
) -> Vec<KeyValue> {
    if begin >= end || opts.limit == 0 {
        return Vec::new();
    }
    let bounds = (Bound::Included(begin), Bound::Excluded(end));
    let mut base_iter = base.range::<[u8], _>(bounds).peekable();
    let mut staged_iter = staged.range::<[u8], _>(bounds).peekable();
    let mut merged: Vec<KeyValue> = Vec::new();

    loop {
        let take_staged = match (base_iter.peek(), staged_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some((bk, _)), Some((sk, _))) => sk <= bk,
        };
        if take_staged {
            let (key, pending) = staged_iter.next().expect("peeked staged entry");
            if let Some((bk, _)) = base_iter.peek() {
                if *bk == key {
                    base_iter.next();
                }
            }
            if let Some(value) = pending {
                merged.push(KeyValue {
                    key: Bytes::copy_from_slice(key),
                    value: value.clone(),
                });
            }
        } else {
            let (key, value) = base_iter.next().expect("peeked base entry");
            merged.push(KeyValue {
                key: Bytes::copy_from_slice(key),
                value: value.clone(),
            });
        }
        if !opts.reverse && merged.len() == opts.limit {
            return merged;
        }
    }

    if opts.reverse {
        merged.reverse();
        merged.truncate(opts.limit);
    }
    merged
}
