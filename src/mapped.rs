//! Channel over a memory-mapped file.
//!
//! Get and put cursors share a single [`View`] window, so bytes written are
//! visible to reads at once. The window slides along the mapping on demand;
//! the mapping itself never grows, so writes stop at the file's length.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::backend::RawIo;
use crate::errors::{ChanIoError, Result};
use crate::handle::wide_to_path;
use crate::mapping::Mapping;
use crate::mode::{MapMode, OpenMode, SeekSide};
use crate::region::CursorRegion;
use crate::utils::{clamp_offset, page_size};
use crate::view::View;

/// Stream-style channel over a [`Mapping`].
///
/// ```no_run
/// use chanio::{MappedFileChannel, OpenMode};
///
/// let mut ch = MappedFileChannel::new();
/// ch.open("data.bin", OpenMode::READ, false)?;
/// let avail = ch.greserve(16)?;
/// println!("{:?}", &ch.gdata()[..avail]);
/// # Ok::<(), chanio::ChanIoError>(())
/// ```
#[derive(Debug, Default)]
pub struct MappedFileChannel {
    mapping: Mapping,
    view: View,
    mode: OpenMode,
    // offset of the window start within the mapping
    offset: u64,
    get: CursorRegion,
    put: CursorRegion,
    error: Option<ChanIoError>,
}

impl MappedFileChannel {
    /// Closed channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `path`. Writable modes map the file shared, or copy-on-write when
    /// `private` is set.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::AlreadyOpen` if open,
    /// `ChanIoError::InvalidMode` if `mode` asks for neither input nor
    /// output, or the mapping error.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, mode: OpenMode, private: bool) -> Result<()> {
        self.check_openable(mode)?;
        let mapping = Mapping::open(path, MapMode::for_channel(mode, private))?;
        self.start(mapping, mode);
        Ok(())
    }

    /// Map a UTF-16 encoded path.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), plus `ChanIoError::InvalidPath`.
    pub fn open_wide(&mut self, path: &[u16], mode: OpenMode, private: bool) -> Result<()> {
        self.check_openable(mode)?;
        self.open(wide_to_path(path)?, mode, private)
    }

    /// Open a cursor over a mapping shared with other channels or views.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::AlreadyOpen`, `ChanIoError::Unmapped` for a
    /// closed mapping, or `ChanIoError::InvalidMode` when output is requested
    /// on a read-only mapping.
    pub fn attach(&mut self, mapping: &Mapping, mode: OpenMode) -> Result<()> {
        self.check_openable(mode)?;
        if !mapping.is_open() {
            return Err(ChanIoError::Unmapped);
        }
        if mode.is_writable() && !mapping.is_writable() {
            return Err(ChanIoError::InvalidMode("output requested on a read-only mapping"));
        }
        self.start(mapping.clone(), mode);
        Ok(())
    }

    fn check_openable(&self, mode: OpenMode) -> Result<()> {
        if self.is_open() {
            return Err(ChanIoError::AlreadyOpen);
        }
        if !mode.is_readable() && !mode.is_writable() {
            return Err(ChanIoError::InvalidMode("neither input nor output requested"));
        }
        Ok(())
    }

    fn start(&mut self, mapping: Mapping, mode: OpenMode) {
        log::debug!(
            "mapped channel opened: {} bytes, mode={:#x}",
            mapping.size(),
            mode.bits()
        );
        self.mapping = mapping;
        self.mode = mode;
        self.offset = 0;
        self.error = None;
        self.invalidate();
    }

    /// Release the window and the mapping. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        self.view.release();
        self.mapping.close();
        self.mode = OpenMode::NONE;
        self.offset = 0;
        self.get = CursorRegion::EMPTY;
        self.put = CursorRegion::EMPTY;
        log::debug!("mapped channel closed");
        true
    }

    /// Whether a mapping is attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.mapping.is_open()
    }

    /// Mode the channel was opened with.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// The mapping behind this channel.
    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Size of the mapping; 0 when closed.
    #[must_use]
    pub fn map_size(&self) -> u64 {
        self.mapping.size()
    }

    /// Minimum window size.
    #[must_use]
    pub fn page_size() -> usize {
        page_size()
    }

    /// Unread bytes of the current window.
    #[must_use]
    pub fn gdata(&self) -> &[u8] {
        &self.view.as_slice()[self.get.next()..self.get.limit()]
    }

    /// Number of unread bytes in the window.
    #[must_use]
    pub fn gsize(&self) -> usize {
        self.get.available()
    }

    /// Bytes written into the current window.
    #[must_use]
    pub fn pdata(&self) -> &[u8] {
        &self.view.as_slice()[self.put.base()..self.put.next()]
    }

    /// Number of bytes written into the window.
    #[must_use]
    pub fn psize(&self) -> usize {
        self.put.consumed()
    }

    /// Absolute position of the get cursor.
    #[must_use]
    pub fn goffset(&self) -> u64 {
        self.offset + self.get.next() as u64
    }

    /// Absolute position of the put cursor.
    #[must_use]
    pub fn poffset(&self) -> u64 {
        self.offset + self.put.next() as u64
    }

    /// Whether an operation has failed since the error was last taken.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Take the latched error.
    pub fn take_error(&mut self) -> Option<ChanIoError> {
        self.error.take()
    }

    fn latch(&mut self, err: ChanIoError) {
        log::trace!("mapped channel error: {err}");
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn readable(&self) -> bool {
        self.is_open() && self.mode.is_readable()
    }

    fn writable(&mut self) -> bool {
        if self.is_open() && self.mode.is_writable() {
            return true;
        }
        self.latch(ChanIoError::InvalidMode("channel is not open for output"));
        false
    }

    // Write back and drop the window, emptying both cursors; the next access
    // remaps at `offset`.
    fn invalidate(&mut self) {
        if let Err(e) = self.view.sync() {
            self.latch(e);
        }
        self.view.unmap();
        self.get = CursorRegion::EMPTY;
        self.put = CursorRegion::EMPTY;
    }

    fn reset(&mut self) {
        let len = self.view.len();
        self.get = CursorRegion::new(0, 0, len);
        self.put = CursorRegion::new(0, 0, len);
    }

    fn set_get(&mut self, pos: usize) {
        self.get = CursorRegion::new(0, pos, self.view.len());
    }

    fn set_put(&mut self, pos: usize) {
        self.put = CursorRegion::new(0, pos, self.view.len());
    }

    fn remap(&mut self, size: usize) -> Result<()> {
        self.invalidate();
        if self.offset >= self.mapping.size() {
            return Ok(());
        }
        let want = size.max(page_size());
        self.view.remap(&self.mapping, self.offset, want)?;
        self.reset();
        Ok(())
    }

    /// Make at least `n` unread bytes contiguous in the window, sliding it to
    /// the get cursor if needed. Returns the bytes available, which is less
    /// than `n` only near the end of the mapping.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen` or the remap error.
    pub fn greserve(&mut self, n: usize) -> Result<usize> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        if n > self.get.available() {
            self.offset += self.get.consumed() as u64;
            self.remap(n)?;
        }
        Ok(self.get.available())
    }

    /// Make room for at least `n` bytes of output at the put cursor.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen`, `ChanIoError::InvalidMode` on a
    /// channel without output, or the remap error.
    pub fn preserve(&mut self, n: usize) -> Result<usize> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        if !self.mode.is_writable() {
            return Err(ChanIoError::InvalidMode("channel is not open for output"));
        }
        if n > self.put.available() {
            self.offset += self.put.consumed() as u64;
            self.remap(n)?;
        }
        Ok(self.put.available())
    }

    /// Copy up to `dst.len()` bytes out of the mapping. Returns fewer only at
    /// the end of the mapping. Leaves the put cursor at the new position.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if !self.readable() {
            return 0;
        }
        let mut ret = self.get.available().min(dst.len());
        if ret > 0 {
            let at = self.get.next();
            dst[..ret].copy_from_slice(&self.view.as_slice()[at..at + ret]);
            self.get.bump(ret);
        }
        let rest = dst.len() - ret;
        if rest > 0 {
            match self.greserve(rest) {
                Ok(avail) => {
                    let n = rest.min(avail);
                    let at = self.get.next();
                    dst[ret..ret + n].copy_from_slice(&self.view.as_slice()[at..at + n]);
                    self.get.bump(n);
                    ret += n;
                }
                Err(e) => self.latch(e),
            }
        }
        self.set_put(self.get.next());
        ret
    }

    /// Next unread byte, sliding the window forward when it is exhausted.
    /// `None` at the end of the mapping.
    pub fn underflow(&mut self) -> Option<u8> {
        if !self.readable() {
            return None;
        }
        if self.get.available() > 0 {
            return Some(self.view.as_slice()[self.get.next()]);
        }
        let window = self.get.limit() as u64;
        if self.offset + window < self.mapping.size() {
            self.offset += window;
            if let Err(e) = self.remap(0) {
                self.latch(e);
                return None;
            }
            if self.get.available() > 0 {
                return Some(self.view.as_slice()[self.get.next()]);
            }
        }
        None
    }

    /// Alias of [`underflow`](Self::underflow).
    pub fn peek(&mut self) -> Option<u8> {
        self.underflow()
    }

    /// Consume and return the next byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        let c = self.underflow()?;
        self.get.bump(1);
        Some(c)
    }

    /// Store `c` at the put cursor, sliding the window when it is full.
    /// Fails at the end of the mapping.
    pub fn overflow(&mut self, c: u8) -> bool {
        if !self.writable() {
            return false;
        }
        if self.put.available() == 0 {
            self.offset += self.put.limit() as u64;
            if self.offset >= self.mapping.size() {
                self.offset = self.offset.min(self.mapping.size());
                self.invalidate();
                return false;
            }
            if let Err(e) = self.remap(0) {
                self.latch(e);
                return false;
            }
            if self.put.available() == 0 {
                return false;
            }
        }
        self.store(&[c]);
        true
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, c: u8) -> bool {
        self.overflow(c)
    }

    /// Copy `src` into the mapping at the put cursor. Returns fewer bytes
    /// than given when the mapping ends first; the file is never extended.
    /// Leaves the get cursor at the new position.
    pub fn write(&mut self, src: &[u8]) -> usize {
        if !self.writable() {
            return 0;
        }
        let mut n = src.len();
        if n > self.put.available() {
            if self.offset + self.put.consumed() as u64 >= self.mapping.size() {
                self.offset = self.mapping.size();
                self.invalidate();
                return 0;
            }
            match self.preserve(n) {
                Ok(avail) => n = n.min(avail),
                Err(e) => {
                    self.latch(e);
                    return 0;
                }
            }
        }
        self.store(&src[..n]);
        self.set_get(self.put.next());
        n
    }

    fn store(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let at = self.put.next();
        let stored = match self.view.as_mut_slice() {
            Some(window) => {
                window[at..at + bytes.len()].copy_from_slice(bytes);
                true
            }
            None => false,
        };
        if stored {
            self.put.bump(bytes.len());
        } else {
            self.latch(ChanIoError::InvalidMode("window is read-only"));
        }
    }

    /// Reposition the cursors selected by `side`.
    ///
    /// When the get and put cursors have drifted apart, the side being
    /// sought wins and the other is moved onto it first. The target is
    /// clamped to `[0, map_size]`. Inside the current window both cursors are
    /// moved in place; elsewhere the window is dropped and remapped lazily.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen` on a closed channel.
    pub fn seek(&mut self, pos: SeekFrom, side: SeekSide) -> Result<u64> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        if self.put.next() != self.get.next() {
            if side.includes_get() {
                self.set_put(self.get.next());
            } else if side.includes_put() {
                self.set_get(self.put.next());
            }
        }
        let size = self.mapping.size();
        let target = match pos {
            SeekFrom::Start(n) => n.min(size),
            SeekFrom::Current(0) => return Ok(self.goffset()),
            SeekFrom::Current(d) => clamp_offset(self.goffset(), d, size),
            SeekFrom::End(d) => clamp_offset(size, d, size),
        };
        match target.checked_sub(self.offset) {
            Some(pos) if self.view.is_bound() && pos <= self.view.len() as u64 => {
                #[allow(clippy::cast_possible_truncation)]
                let pos = pos as usize;
                self.set_get(pos);
                self.set_put(pos);
            }
            _ => {
                log::trace!("seek to {target} leaves the window, dropping it");
                self.offset = target;
                self.invalidate();
            }
        }
        Ok(target)
    }

    /// Write back dirty pages of a shared writable mapping. Windows left
    /// behind are written back as the channel moves off them, and a failure
    /// there is reported here.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::FlushFailed` if the OS reports a failure.
    pub fn flush(&mut self) -> Result<()> {
        self.view.sync()?;
        match self.error.take() {
            Some(e @ ChanIoError::FlushFailed(_)) => Err(e),
            other => {
                self.error = other;
                Ok(())
            }
        }
    }
}

impl Drop for MappedFileChannel {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.view.sync() {
                log::warn!("error syncing mapped channel on drop: {e}");
            }
            self.close();
        }
    }
}

impl Read for MappedFileChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen.into());
        }
        let n = MappedFileChannel::read(self, buf);
        if n == 0 && !buf.is_empty() {
            if let Some(e) = self.error.take() {
                return Err(e.into());
            }
        }
        Ok(n)
    }
}

impl Write for MappedFileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = MappedFileChannel::write(self, buf);
        if n == 0 && !buf.is_empty() {
            return Err(self.error.take().map_or_else(
                || io::Error::new(io::ErrorKind::WriteZero, "end of mapping"),
                io::Error::from,
            ));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        MappedFileChannel::flush(self).map_err(io::Error::from)
    }
}

impl Seek for MappedFileChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        MappedFileChannel::seek(self, pos, SeekSide::Both).map_err(io::Error::from)
    }
}

impl RawIo for MappedFileChannel {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn seek_raw(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn close_raw(mut self) -> io::Result<()> {
        let flushed = self.flush();
        self.close();
        flushed.map_err(io::Error::from)
    }
}
