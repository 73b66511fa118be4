#![allow(missing_docs)]

use std::io::{Read, Seek, SeekFrom, Write};

use pagefs::{Database, FsError, PageFs, PageFsOptions, Result};

fn fs(page_size: usize) -> PageFs {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    PageFs::with_options(
        Database::in_memory(),
        PageFsOptions::new().page_size(page_size),
    )
}

#[test]
fn write_then_read_roundtrip() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/docs/report")?;
    let payload = b"0123456789";
    assert_eq!(file.write_at(payload, 0)?, payload.len());

    let mut out = [0u8; 10];
    let mut offset = 0u64;
    let mut copied = 0usize;
    loop {
        let (n, eof) = file.read_at(&mut out[copied..], offset)?;
        copied += n;
        offset += n as u64;
        if eof {
            break;
        }
    }
    assert_eq!(copied, payload.len());
    assert_eq!(&out, payload);
    Ok(())
}

#[test]
fn eof_fires_on_the_call_that_drains_the_tail_page() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    file.write_at(b"0123456789", 0)?;

    // Pages: [0123][4567][89]. Full pages never signal EOF.
    let mut buf = [0u8; 8];
    let (n, eof) = file.read_at(&mut buf, 0)?;
    assert_eq!((n, eof), (4, false));
    let (n, eof) = file.read_at(&mut buf, 4)?;
    assert_eq!((n, eof), (4, false));
    let (n, eof) = file.read_at(&mut buf, 8)?;
    assert_eq!((n, eof), (2, true));
    assert_eq!(&buf[..2], b"89");

    // Past the end: nothing to copy, still EOF.
    let (n, eof) = file.read_at(&mut buf, 10)?;
    assert_eq!((n, eof), (0, true));
    Ok(())
}

#[test]
fn short_destination_buffer_does_not_signal_eof() -> Result<()> {
    let fs = fs(8);
    let file = fs.create("/f")?;
    file.write_at(b"abcdef", 0)?;

    let mut buf = [0u8; 3];
    let (n, eof) = file.read_at(&mut buf, 0)?;
    assert_eq!((n, eof), (3, false));
    let (n, eof) = file.read_at(&mut buf, 3)?;
    assert_eq!((n, eof), (3, true));
    Ok(())
}

#[test]
fn reading_midway_through_a_full_tail_page_is_eof() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    file.write_at(b"abcd", 0)?;

    let mut buf = [0u8; 4];
    let (n, eof) = file.read_at(&mut buf, 2)?;
    assert_eq!((n, eof), (2, true));
    assert_eq!(&buf[..2], b"cd");
    Ok(())
}

#[test]
fn unaligned_write_lands_exactly() -> Result<()> {
    let fs = fs(3);
    let file = fs.create("/f")?;
    file.write_at(b"x", 0)?;
    file.write_at(&[0x00, 0x01, 0x02, 0x03], 1)?;

    let mut buf = [0u8; 8];
    let (n, _) = file.read_at(&mut buf, 0)?;
    assert_eq!(n, 3);
    assert_eq!(&buf[..3], &[b'x', 0x00, 0x01]);
    let (n, eof) = file.read_at(&mut buf, 3)?;
    assert_eq!((n, eof), (2, true));
    assert_eq!(&buf[..2], &[0x02, 0x03]);
    assert_eq!(file.size()?, 5);
    Ok(())
}

#[test]
fn partial_overwrite_drops_the_page_tail() -> Result<()> {
    let fs = fs(3);
    let file = fs.create("/f")?;
    file.write_at(&[0x00, 0x01, 0x02], 0)?;
    file.write_at(&[0x05], 1)?;

    let mut buf = [0u8; 4];
    let (n, eof) = file.read_at(&mut buf, 0)?;
    assert_eq!((n, eof), (2, true));
    assert_eq!(&buf[..2], &[0x00, 0x05]);
    assert_eq!(file.size()?, 2);
    Ok(())
}

#[test]
fn write_into_a_gap_is_rejected() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    file.write_at(b"ab", 0)?;
    let err = file.write_at(b"x", 3).unwrap_err();
    assert!(matches!(err, FsError::WriteGap { .. }));
    // Nothing committed.
    assert_eq!(file.size()?, 2);
    Ok(())
}

#[test]
fn zero_length_write_commits_nothing() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    assert_eq!(file.write_at(&[], 7)?, 0);
    assert_eq!(file.size()?, 0);
    Ok(())
}

#[test]
fn derived_size_tracks_the_tail_page() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    assert_eq!(file.size()?, 0);
    file.write_at(b"ab", 0)?;
    assert_eq!(file.size()?, 2);
    file.write_at(b"abcd", 0)?;
    assert_eq!(file.size()?, 4);
    file.write_at(b"z", 4)?;
    assert_eq!(file.size()?, 5);
    Ok(())
}

#[test]
fn sequential_io_moves_the_cursor() -> Result<()> {
    let fs = fs(4);
    let mut file = fs.create("/seq")?;
    file.write_all(b"hello world").expect("write_all");
    assert_eq!(file.position(), 11);

    file.seek(SeekFrom::Start(0)).expect("seek");
    let mut out = Vec::new();
    file.read_to_end(&mut out).expect("read_to_end");
    assert_eq!(out, b"hello world");

    file.seek(SeekFrom::End(-5)).expect("seek from end");
    let mut tail = String::new();
    file.read_to_string(&mut tail).expect("read_to_string");
    assert_eq!(tail, "world");

    assert!(file.seek(SeekFrom::Current(-100)).is_err());
    Ok(())
}

#[test]
fn zero_byte_transfer_leaves_cursor_alone() -> Result<()> {
    let fs = fs(4);
    let mut file = fs.create("/f")?;
    let n = file.read(&mut [0u8; 8]).expect("read at eof");
    assert_eq!(n, 0);
    assert_eq!(file.position(), 0);
    Ok(())
}

#[test]
fn open_requires_an_existing_node() -> Result<()> {
    let fs = fs(4);
    assert!(matches!(fs.open("/missing"), Err(FsError::NotFound(_))));
    fs.create("/present")?;
    let file = fs.open("/present")?;
    assert_eq!(file.path(), "/present");
    Ok(())
}

#[test]
fn create_truncates_existing_content() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    file.write_at(b"old content", 0)?;
    let file = fs.create("/f")?;
    assert_eq!(file.size()?, 0);
    let (n, eof) = file.read_at(&mut [0u8; 4], 0)?;
    assert_eq!((n, eof), (0, true));
    Ok(())
}

#[test]
fn close_is_a_no_op() -> Result<()> {
    let fs = fs(4);
    let file = fs.create("/f")?;
    file.write_at(b"abc", 0)?;
    file.close()?;
    assert_eq!(fs.open("/f")?.size()?, 3);
    Ok(())
}

#[test]
fn root_is_not_a_file() {
    let fs = fs(4);
    assert!(matches!(fs.open("/"), Err(FsError::InvalidArgument(_))));
    assert!(matches!(fs.create("/"), Err(FsError::InvalidArgument(_))));
}
