//! The raw I/O seam between channels and their OS backends.
//!
//! A buffered channel keeps its cursor regions to itself and only talks to
//! the backend through [`RawIo`]. The file backend is [`crate::FileHandle`];
//! `Cursor<Vec<u8>>` is provided for in-memory use.

use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

/// Unbuffered chunk-level I/O primitives.
pub trait RawIo {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of file.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Move the OS position, returning the new absolute offset.
    fn seek_raw(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Release the backend, reporting the OS close result where there is one.
    fn close_raw(self) -> io::Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<T: RawIo + ?Sized> RawIo for &mut T {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write_chunk(buf)
    }

    fn seek_raw(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek_raw(pos)
    }
}

impl RawIo for Cursor<Vec<u8>> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn seek_raw(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }
}

/// Outcome of a transfer that may stop short.
///
/// A short count is not an error by itself; `error` carries the OS failure
/// that stopped the transfer, if any.
#[derive(Debug, Default)]
pub struct Transfer {
    /// Bytes moved (logical bytes for translated transfers).
    pub done: usize,
    /// The error that ended the transfer early.
    pub error: Option<io::Error>,
}

impl Transfer {
    pub(crate) fn ok(done: usize) -> Self {
        Self { done, error: None }
    }

    /// Whether exactly `expected` bytes were moved.
    #[must_use]
    pub fn is_complete(&self, expected: usize) -> bool {
        self.done == expected
    }
}

/// Fill `buf` from the backend until it is full, end of file, or an error.
pub fn read_fully<B: RawIo + ?Sized>(io: &mut B, buf: &mut [u8]) -> Transfer {
    let mut done = 0;
    while done < buf.len() {
        match io.read_chunk(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Transfer { done, error: Some(e) },
        }
    }
    Transfer::ok(done)
}

/// Write all of `buf`, stopping early only on error.
pub fn write_fully<B: RawIo + ?Sized>(io: &mut B, buf: &[u8]) -> Transfer {
    let mut done = 0;
    while done < buf.len() {
        match io.write_chunk(&buf[done..]) {
            Ok(0) => {
                return Transfer {
                    done,
                    error: Some(io::Error::new(ErrorKind::WriteZero, "backend accepted no bytes")),
                }
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Transfer { done, error: Some(e) },
        }
    }
    Transfer::ok(done)
}
