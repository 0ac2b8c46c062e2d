//! Channel over a caller-supplied byte sequence.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::errors::{ChanIoError, Result};
use crate::mode::{OpenMode, SeekSide};
use crate::region::CursorRegion;
use crate::utils::clamp_offset;

/// Stream-style channel over any `T: AsRef<[u8]>`.
///
/// Input and output keep independent positions. Output overwrites the
/// sequence in place and needs `T: AsMut<[u8]>`; the sequence never grows.
///
/// ```
/// use chanio::{MemoryChannel, OpenMode};
///
/// let mut ch = MemoryChannel::new(vec![0u8; 4], OpenMode::READ | OpenMode::WRITE);
/// assert_eq!(ch.write(b"abcdef"), 4);
/// let mut out = [0u8; 2];
/// assert_eq!(ch.read(&mut out), 2);
/// assert_eq!(&out, b"ab");
/// ```
#[derive(Debug, Clone)]
pub struct MemoryChannel<T> {
    data: T,
    mode: OpenMode,
    get: CursorRegion,
    put: CursorRegion,
}

impl<T: AsRef<[u8]>> MemoryChannel<T> {
    /// Wrap `data`. Input is enabled by [`OpenMode::READ`], output by any
    /// writable mode.
    pub fn new(data: T, mode: OpenMode) -> Self {
        let len = data.as_ref().len();
        let get = if mode.is_readable() {
            CursorRegion::new(0, 0, len)
        } else {
            CursorRegion::EMPTY
        };
        let put = if mode.is_writable() {
            CursorRegion::new(0, 0, len)
        } else {
            CursorRegion::new(len, len, len)
        };
        Self {
            data,
            mode,
            get,
            put,
        }
    }

    /// Borrow the sequence.
    pub fn get_ref(&self) -> &T {
        &self.data
    }

    /// Unwrap the sequence.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Mode the channel was created with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Remaining input.
    pub fn gdata(&self) -> &[u8] {
        &self.data.as_ref()[self.get.next()..self.get.limit()]
    }

    /// Length of the remaining input.
    pub fn gsize(&self) -> usize {
        self.get.available()
    }

    /// Output written so far.
    pub fn pdata(&self) -> &[u8] {
        &self.data.as_ref()[self.put.base()..self.put.next()]
    }

    /// Length of the output written so far.
    pub fn psize(&self) -> usize {
        self.put.consumed()
    }

    /// Input position.
    pub fn goffset(&self) -> u64 {
        self.get.consumed() as u64
    }

    /// Output position.
    pub fn poffset(&self) -> u64 {
        self.put.consumed() as u64
    }

    /// Copy up to `dst.len()` bytes of input.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.get.available());
        let at = self.get.next();
        dst[..n].copy_from_slice(&self.data.as_ref()[at..at + n]);
        self.get.bump(n);
        n
    }

    /// Next input byte without consuming it.
    pub fn underflow(&self) -> Option<u8> {
        (self.get.available() > 0).then(|| self.data.as_ref()[self.get.next()])
    }

    /// Alias of [`underflow`](Self::underflow).
    pub fn peek(&self) -> Option<u8> {
        self.underflow()
    }

    /// Consume and return the next input byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        let c = self.underflow()?;
        self.get.bump(1);
        Some(c)
    }

    /// Step back over the previous input byte if it equals `c`.
    pub fn pushback(&mut self, c: u8) -> bool {
        let next = self.get.next();
        if next > self.get.base() && self.data.as_ref()[next - 1] == c {
            self.get.unbump()
        } else {
            false
        }
    }

    /// Move the positions selected by `side`, clamped to the sequence.
    ///
    /// `SeekFrom::Current(0)` reports the first selected position without
    /// moving anything.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::InvalidMode` if `side` selects no direction this
    /// channel was opened for.
    pub fn seek(&mut self, pos: SeekFrom, side: SeekSide) -> Result<u64> {
        let mut result = None;
        if side.includes_get() && self.mode.is_readable() {
            match Self::resolve(&mut self.get, pos) {
                Resolved::Report(cur) => return Ok(cur),
                Resolved::Moved(at) => result = Some(at),
            }
        }
        if side.includes_put() && self.mode.is_writable() {
            match Self::resolve(&mut self.put, pos) {
                Resolved::Report(cur) => return Ok(cur),
                Resolved::Moved(at) => result = Some(at),
            }
        }
        result.ok_or(ChanIoError::InvalidMode("no matching direction to seek"))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn resolve(region: &mut CursorRegion, pos: SeekFrom) -> Resolved {
        let size = region.capacity() as u64;
        let cur = region.consumed() as u64;
        let target = match pos {
            SeekFrom::Start(n) => n.min(size),
            SeekFrom::Current(0) => return Resolved::Report(cur),
            SeekFrom::Current(d) => clamp_offset(cur, d, size),
            SeekFrom::End(d) => clamp_offset(size, d, size),
        };
        region.set_position(target as usize);
        Resolved::Moved(target)
    }
}

enum Resolved {
    Report(u64),
    Moved(u64),
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> MemoryChannel<T> {
    /// Overwrite the sequence at the output position. Returns fewer bytes
    /// than given once the end of the sequence is reached.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.put.available());
        let at = self.put.next();
        self.data.as_mut()[at..at + n].copy_from_slice(&src[..n]);
        self.put.bump(n);
        n
    }

    /// Write one byte; false at the end of the sequence.
    pub fn overflow(&mut self, c: u8) -> bool {
        self.write(&[c]) == 1
    }

    /// Alias of [`overflow`](Self::overflow).
    pub fn write_byte(&mut self, c: u8) -> bool {
        self.overflow(c)
    }
}

impl<T: AsRef<[u8]>> Read for MemoryChannel<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(MemoryChannel::read(self, buf))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Write for MemoryChannel<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match MemoryChannel::write(self, buf) {
            0 if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "end of memory sequence",
            )),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: AsRef<[u8]>> Seek for MemoryChannel<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        MemoryChannel::seek(self, pos, SeekSide::Both).map_err(io::Error::from)
    }
}
