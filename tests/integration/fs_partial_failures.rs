#![allow(missing_docs)]

//! Multi-page writes are not atomic across pages: a failure mid-stream must
//! leave exactly the reported prefix committed, and nothing more.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pagefs::store::{ReadAccess, Store, WriteAccess};
use pagefs::{Database, FsError, MemoryStore, PageFs, PageFsOptions, Result};

/// Store wrapper that refuses to open new write transactions once a budget
/// is spent. Reads always pass through.
struct FlakyStore {
    inner: MemoryStore,
    writes_left: AtomicUsize,
}

impl FlakyStore {
    fn new(writes_left: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            writes_left: AtomicUsize::new(writes_left),
        }
    }
}

impl Store for FlakyStore {
    fn begin_read<'s>(&'s self) -> Result<Box<dyn ReadAccess + 's>> {
        self.inner.begin_read()
    }

    fn begin_write<'s>(&'s self) -> Result<Box<dyn WriteAccess + 's>> {
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(FsError::Store("injected write failure".into()));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        self.inner.begin_write()
    }
}

fn flaky_fs(writes_left: usize) -> PageFs {
    PageFs::with_options(
        Database::new(Arc::new(FlakyStore::new(writes_left))),
        PageFsOptions::new().page_size(2),
    )
}

#[test]
fn mid_stream_failure_reports_the_committed_prefix() -> Result<()> {
    // Budget: one transaction for create, two of the three page commits.
    let fs = flaky_fs(3);
    let file = fs.create("/f")?;

    let err = file.write_at(b"abcdef", 0).unwrap_err();
    match err {
        FsError::ShortWrite {
            written,
            requested,
            source,
        } => {
            assert_eq!(written, 4);
            assert_eq!(requested, 6);
            assert!(matches!(*source, FsError::Store(_)));
        }
        other => panic!("expected ShortWrite, got {other}"),
    }

    // Exactly the prefix is visible; the tail page was never written.
    assert_eq!(file.size()?, 4);
    let mut buf = [0u8; 2];
    let (n, _) = file.read_at(&mut buf, 2)?;
    assert_eq!((n, &buf), (2, b"cd"));
    Ok(())
}

#[test]
fn first_page_failure_surfaces_the_raw_error() -> Result<()> {
    let fs = flaky_fs(1);
    let file = fs.create("/f")?;
    let err = file.write_at(b"abcdef", 0).unwrap_err();
    assert!(matches!(err, FsError::Store(_)));
    assert_eq!(file.size()?, 0);
    Ok(())
}

#[test]
fn retry_from_the_committed_offset_completes_the_write() -> Result<()> {
    let store = Arc::new(FlakyStore::new(3));
    let fs = PageFs::with_options(
        Database::new(store.clone()),
        PageFsOptions::new().page_size(2),
    );
    let file = fs.create("/f")?;
    let payload = b"abcdef";

    let written = match file.write_at(payload, 0) {
        Err(FsError::ShortWrite { written, .. }) => written,
        other => panic!("expected a short write, got {other:?}"),
    };

    // The store recovers; the caller resumes exactly where the commit
    // stream stopped.
    store.writes_left.store(usize::MAX, Ordering::SeqCst);
    let resumed = file.write_at(&payload[written..], written as u64)?;
    assert_eq!(written + resumed, payload.len());
    assert_eq!(file.size()?, payload.len() as u64);

    let mut buf = [0u8; 6];
    let mut offset = 0u64;
    let mut copied = 0;
    loop {
        let (n, eof) = file.read_at(&mut buf[copied..], offset)?;
        copied += n;
        offset += n as u64;
        if eof {
            break;
        }
    }
    assert_eq!(&buf[..copied], payload);
    Ok(())
}
