//! Integration tests for the buffered file channel.

use chanio::{
    BufferedFileChannel, ChanIoError, ChannelOptions, CreateDisposition, FileHandle, OpenMode,
    ShareMode, TextMode,
};
use std::fs;
use std::io::{BufRead, SeekFrom, Write};
use std::path::PathBuf;

fn tmp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("chanio_test_{}_{}", name, std::process::id()));
    p
}

fn rw_binary() -> OpenMode {
    OpenMode::READ | OpenMode::WRITE | OpenMode::TRUNCATE | OpenMode::BINARY
}

fn open_with(path: &PathBuf, mode: OpenMode, opts: ChannelOptions) -> BufferedFileChannel {
    let mut ch = BufferedFileChannel::with_options(opts);
    ch.open(path, mode, CreateDisposition::Default, ShareMode::ALL)
        .expect("open");
    ch
}

#[test]
fn binary_round_trip_around_buffer_size() {
    let bs = 64;
    for len in [0, 1, bs - 1, bs, bs * 3 + 7] {
        let path = tmp_path(&format!("binary_round_trip_{len}"));
        let _ = fs::remove_file(&path);
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

        let mut ch = open_with(&path, rw_binary(), ChannelOptions::new().buffer_size(bs));
        assert_eq!(ch.write(&data), len);
        assert_eq!(ch.seek(SeekFrom::Start(0)).expect("seek"), 0);
        let mut back = vec![0u8; len + 1];
        assert_eq!(ch.read(&mut back), len, "length {len}");
        assert_eq!(&back[..len], &data[..]);
        ch.close().expect("close");

        assert_eq!(fs::read(&path).expect("read file"), data);
        let _ = fs::remove_file(&path);
    }
}

#[test]
fn text_round_trip_translates_newlines() {
    let path = tmp_path("text_round_trip");
    let _ = fs::remove_file(&path);
    let opts = ChannelOptions::new().text_mode(TextMode::Translate);

    let mut ch = open_with(&path, OpenMode::WRITE | OpenMode::TRUNCATE, opts);
    assert_eq!(ch.write(b"a\nb"), 3);
    ch.close().expect("close");
    assert_eq!(fs::read(&path).expect("read file"), b"a\r\nb");

    let mut ch = open_with(&path, OpenMode::READ, opts);
    let mut back = [0u8; 16];
    assert_eq!(ch.read(&mut back), 3);
    assert_eq!(&back[..3], b"a\nb");
    let _ = fs::remove_file(&path);
}

#[test]
fn crlf_on_refill_boundary_reads_as_one_newline() {
    let path = tmp_path("crlf_boundary");
    let bs = 8;
    // '\r' is the last byte of the first refill, '\n' the first of the next
    let mut raw = vec![b'x'; bs - 1];
    raw.extend_from_slice(b"\r\nyz");
    fs::write(&path, &raw).expect("write file");

    let opts = ChannelOptions::new()
        .buffer_size(bs)
        .text_mode(TextMode::Translate);
    let mut ch = open_with(&path, OpenMode::READ, opts);
    let mut out = Vec::new();
    while let Some(c) = ch.read_byte() {
        out.push(c);
    }
    let mut expected = vec![b'x'; bs - 1];
    expected.extend_from_slice(b"\nyz");
    assert_eq!(out, expected);
    let _ = fs::remove_file(&path);
}

#[test]
fn lone_trailing_cr_survives() {
    let path = tmp_path("trailing_cr");
    fs::write(&path, b"abc\rd\r").expect("write file");
    let opts = ChannelOptions::new()
        .buffer_size(4)
        .text_mode(TextMode::Translate);
    let mut ch = open_with(&path, OpenMode::READ, opts);
    let mut out = Vec::new();
    while let Some(c) = ch.read_byte() {
        out.push(c);
    }
    assert_eq!(out, b"abc\rd\r");
    let _ = fs::remove_file(&path);
}

#[test]
fn single_pushback() {
    let path = tmp_path("pushback");
    fs::write(&path, b"qrs").expect("write file");
    let mut ch = open_with(&path, OpenMode::READ | OpenMode::BINARY, ChannelOptions::new());
    let c = ch.read_byte().expect("first byte");
    assert!(ch.pushback(c));
    assert!(!ch.pushback(c));
    assert_eq!(ch.read_byte(), Some(b'q'));
    assert_eq!(ch.read_byte(), Some(b'r'));
    let _ = fs::remove_file(&path);
}

#[test]
fn seek_after_mixed_access_starts_at_target() {
    let path = tmp_path("seek_mixed");
    let _ = fs::remove_file(&path);
    let data: Vec<u8> = (0..200u8).collect();
    let mut ch = open_with(&path, rw_binary(), ChannelOptions::new().buffer_size(32));

    assert_eq!(ch.write(&data[..150]), 150);
    ch.seek(SeekFrom::Start(0)).expect("rewind");
    let mut some = [0u8; 20];
    assert_eq!(ch.read(&mut some), 20);
    assert_eq!(&some[..], &data[..20]);

    for target in [97u64, 3, 149, 40] {
        assert_eq!(ch.seek(SeekFrom::Start(target)).expect("seek"), target);
        assert_eq!(ch.read_byte(), Some(data[target as usize]));
    }

    // overwrite in the middle, then check nothing stale leaks
    ch.seek(SeekFrom::Start(10)).expect("seek");
    assert_eq!(ch.write(b"\xff\xff"), 2);
    assert_eq!(ch.read_byte(), Some(12));
    ch.seek(SeekFrom::Start(9)).expect("seek");
    let mut four = [0u8; 4];
    assert_eq!(ch.read(&mut four), 4);
    assert_eq!(four, [9, 0xff, 0xff, 12]);
    ch.close().expect("close");
    let _ = fs::remove_file(&path);
}

#[test]
fn append_goes_to_end() {
    let path = tmp_path("append");
    fs::write(&path, b"start").expect("write file");
    let mut ch = open_with(
        &path,
        OpenMode::APPEND | OpenMode::BINARY,
        ChannelOptions::new(),
    );
    assert_eq!(ch.tell().expect("tell"), 5);
    assert_eq!(ch.write(b"+more"), 5);
    ch.close().expect("close");
    assert_eq!(fs::read(&path).expect("read file"), b"start+more");
    let _ = fs::remove_file(&path);
}

#[test]
fn open_failures() {
    let path = tmp_path("open_failures_missing");
    let _ = fs::remove_file(&path);
    let mut ch = BufferedFileChannel::new();
    assert!(matches!(
        ch.open(&path, OpenMode::READ, CreateDisposition::Default, ShareMode::ALL),
        Err(ChanIoError::Io(_))
    ));
    assert!(!ch.is_open());

    fs::write(&path, b"x").expect("write file");
    ch.open(&path, OpenMode::READ, CreateDisposition::Default, ShareMode::ALL)
        .expect("open");
    assert!(matches!(
        ch.open(&path, OpenMode::READ, CreateDisposition::Default, ShareMode::ALL),
        Err(ChanIoError::AlreadyOpen)
    ));
    assert!(ch.file().is_some());
    ch.close().expect("close");
    assert!(matches!(ch.close(), Err(ChanIoError::NotOpen)));
    assert!(matches!(ch.seek(SeekFrom::Start(0)), Err(ChanIoError::NotOpen)));
    let _ = fs::remove_file(&path);
}

#[test]
fn adopt_open_file() {
    let path = tmp_path("adopt");
    fs::write(&path, b"adopted").expect("write file");
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .expect("open file");

    let mut ch = BufferedFileChannel::new();
    ch.attach(
        FileHandle::from_file(file, path.clone()),
        OpenMode::READ | OpenMode::WRITE | OpenMode::BINARY,
    )
    .expect("attach");
    assert_eq!(ch.backend().map(FileHandle::path), Some(path.as_path()));
    let mut head = [0u8; 5];
    assert_eq!(ch.read(&mut head), 5);
    assert_eq!(&head, b"adopt");
    assert_eq!(ch.write(b"ED"), 2);
    ch.close().expect("close");
    assert_eq!(fs::read(&path).expect("read file"), b"adoptED");
    let _ = fs::remove_file(&path);
}

#[test]
fn wide_path_open() {
    let path = tmp_path("wide_path");
    fs::write(&path, b"wide").expect("write file");
    let wide: Vec<u16> = path
        .to_str()
        .expect("utf-8 temp path")
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let mut ch = BufferedFileChannel::new();
    ch.open_wide(&wide, OpenMode::READ, CreateDisposition::Default, ShareMode::ALL)
        .expect("open wide");
    let mut buf = [0u8; 4];
    assert_eq!(ch.read(&mut buf), 4);
    assert_eq!(&buf, b"wide");
    let _ = fs::remove_file(&path);
}

#[test]
fn std_io_traits_compose() {
    let path = tmp_path("std_io");
    let _ = fs::remove_file(&path);
    let mut ch = open_with(
        &path,
        OpenMode::READ | OpenMode::WRITE | OpenMode::TRUNCATE,
        ChannelOptions::new().buffer_size(16).text_mode(TextMode::Binary),
    );
    writeln!(ch, "first line").expect("writeln");
    writeln!(ch, "second").expect("writeln");
    std::io::Seek::seek(&mut ch, SeekFrom::Start(0)).expect("seek");
    let lines: Vec<String> = BufRead::lines(&mut ch).map(|l| l.expect("line")).collect();
    assert_eq!(lines, ["first line", "second"]);
    let _ = fs::remove_file(&path);
}

#[test]
fn drop_flushes_pending_output() {
    let path = tmp_path("drop_flush");
    let _ = fs::remove_file(&path);
    {
        let mut ch = open_with(&path, rw_binary(), ChannelOptions::new());
        assert_eq!(ch.write(b"kept on drop"), 12);
    }
    assert_eq!(fs::read(&path).expect("read file"), b"kept on drop");
    let _ = fs::remove_file(&path);
}
