//! Buffered channel over a [`RawIo`] backend, with optional CRLF translation.
//!
//! The channel keeps one buffer and two cursor regions over it: the get area
//! (bytes read ahead from the backend) and the put area (bytes waiting to be
//! written). At most one of them holds data at a time; crossing from reading
//! to writing or back flushes the other side first.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::backend::{read_fully, write_fully, RawIo, Transfer};
use crate::errors::{ChanIoError, Result};
use crate::handle::FileHandle;
use crate::mode::{CreateDisposition, OpenMode, ShareMode};
use crate::region::CursorRegion;
use crate::text::{count_newlines, read_translated, TextTranslator};
use crate::utils::default_buffer_size;

/// Newline handling for channels opened without [`OpenMode::BINARY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// Translate only where the platform's text files use CRLF (Windows).
    #[default]
    Native,
    /// Always translate `\n` <-> `\r\n`.
    Translate,
    /// Never translate.
    Binary,
}

impl TextMode {
    /// Whether this setting translates newlines on the current platform.
    #[must_use]
    pub fn translates(self) -> bool {
        match self {
            Self::Native => cfg!(windows),
            Self::Translate => true,
            Self::Binary => false,
        }
    }
}

/// Configuration applied when a buffered channel is opened.
///
/// ```
/// use chanio::{ChannelOptions, TextMode};
///
/// let opts = ChannelOptions::new().buffer_size(512).text_mode(TextMode::Translate);
/// assert_eq!(opts.get_buffer_size(), 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    buffer_size: usize,
    text_mode: TextMode,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            text_mode: TextMode::default(),
        }
    }
}

impl ChannelOptions {
    /// Default options: platform buffer size, native text handling.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the channel buffer; 0 makes the channel unbuffered.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Newline translation policy.
    #[must_use]
    pub fn text_mode(mut self, mode: TextMode) -> Self {
        self.text_mode = mode;
        self
    }

    /// Configured buffer size.
    #[must_use]
    pub fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Configured text mode.
    #[must_use]
    pub fn get_text_mode(&self) -> TextMode {
        self.text_mode
    }
}

/// Channel that buffers reads and writes to a raw backend.
///
/// Byte-transfer calls never fail loudly: they return short counts or
/// `None` and latch the OS error, which [`is_failed`](Self::is_failed) and
/// [`take_error`](Self::take_error) expose.
pub struct BufferedChannel<B: RawIo> {
    backend: Option<B>,
    options: ChannelOptions,
    mode: OpenMode,
    text: bool,
    buf: Vec<u8>,
    // buffer was supplied through set_buffer and survives reopening
    adopted: bool,
    get: CursorRegion,
    // get area currently addresses `cell` instead of `buf`
    get_on_cell: bool,
    put: CursorRegion,
    // bytes of `buf` filled by the last refill
    cur_gsize: usize,
    cell: u8,
    pushed_back: bool,
    translator: Option<TextTranslator>,
    error: Option<io::Error>,
}

/// Buffered channel over an OS file.
pub type BufferedFileChannel = BufferedChannel<FileHandle>;

impl<B: RawIo> std::fmt::Debug for BufferedChannel<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("open", &self.is_open())
            .field("mode", &self.mode)
            .field("text", &self.text)
            .field("buffer_size", &self.buf.len())
            .field("get", &self.get)
            .field("put", &self.put)
            .finish()
    }
}

impl<B: RawIo> Default for BufferedChannel<B> {
    fn default() -> Self {
        Self::with_options(ChannelOptions::default())
    }
}

fn read_from<B: RawIo + ?Sized>(io: &mut B, text: bool, dst: &mut [u8]) -> Transfer {
    if text {
        read_translated(io, dst)
    } else {
        read_fully(io, dst)
    }
}

fn write_to<B: RawIo + ?Sized>(
    io: &mut B,
    translator: Option<&mut TextTranslator>,
    append: bool,
    src: &[u8],
) -> Transfer {
    if append {
        if let Err(e) = io.seek_raw(SeekFrom::End(0)) {
            return Transfer {
                done: 0,
                error: Some(e),
            };
        }
    }
    match translator {
        Some(tr) => tr.translate(io, src),
        None => write_fully(io, src),
    }
}

impl<B: RawIo> BufferedChannel<B> {
    /// Closed channel with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed channel that will open with `options`.
    #[must_use]
    pub fn with_options(options: ChannelOptions) -> Self {
        Self {
            backend: None,
            options,
            mode: OpenMode::NONE,
            text: false,
            buf: Vec::new(),
            adopted: false,
            get: CursorRegion::EMPTY,
            get_on_cell: false,
            put: CursorRegion::EMPTY,
            cur_gsize: 0,
            cell: 0,
            pushed_back: false,
            translator: None,
            error: None,
        }
    }

    /// Open the channel over an already constructed backend.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::AlreadyOpen` if the channel is open, or
    /// `ChanIoError::Io` if positioning at the end for append fails.
    pub fn attach(&mut self, backend: B, mode: OpenMode) -> Result<()> {
        if self.is_open() {
            return Err(ChanIoError::AlreadyOpen);
        }
        let mut backend = backend;
        if mode.intersects(OpenMode::APPEND | OpenMode::AT_END) {
            backend.seek_raw(SeekFrom::End(0))?;
        }
        if !self.adopted {
            self.buf = vec![0u8; self.options.buffer_size];
        }
        self.text = !mode.contains(OpenMode::BINARY) && self.options.text_mode.translates();
        self.translator = (self.text && mode.is_writable()).then(TextTranslator::new);
        self.mode = mode;
        self.backend = Some(backend);
        self.error = None;
        self.pushed_back = false;
        self.init();
        log::debug!(
            "channel opened: mode={:#x} buffer={} text={}",
            mode.bits(),
            self.buf.len(),
            self.text
        );
        Ok(())
    }

    /// Whether the channel has a backend.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Mode the channel was opened with ([`OpenMode::NONE`] when closed).
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Options used on the next open.
    #[must_use]
    pub fn options(&self) -> ChannelOptions {
        self.options
    }

    /// Replace the options used on the next open.
    pub fn set_options(&mut self, options: ChannelOptions) {
        self.options = options;
    }

    /// Whether newline translation is active.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.text
    }

    /// Current buffer capacity; 0 for an unbuffered channel.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the backend.
    #[must_use]
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Whether a transfer has failed since the error was last taken.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Take the latched transfer error, clearing the fail state.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Install a caller-supplied buffer. An empty vector makes the channel
    /// unbuffered.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::InvalidMode` while unread input is buffered, or
    /// `ChanIoError::FlushFailed` if pending output cannot be written.
    pub fn set_buffer(&mut self, buf: Vec<u8>) -> Result<()> {
        if self.input_size() != 0 {
            return Err(ChanIoError::InvalidMode("buffer replaced while input is pending"));
        }
        if self.is_open() && !self.sync() {
            return Err(self.flush_error());
        }
        self.buf = buf;
        self.adopted = true;
        self.init();
        Ok(())
    }

    /// Resize the buffer; see [`set_buffer`](Self::set_buffer).
    ///
    /// # Errors
    ///
    /// Same as [`set_buffer`](Self::set_buffer).
    pub fn set_buffer_size(&mut self, size: usize) -> Result<()> {
        self.set_buffer(vec![0u8; size])
    }

    fn readable(&self) -> bool {
        self.is_open() && self.mode.is_readable()
    }

    fn writable(&self) -> bool {
        self.is_open() && self.mode.is_writable()
    }

    fn init(&mut self) {
        self.cur_gsize = 0;
        self.get = CursorRegion::EMPTY;
        self.get_on_cell = false;
        self.put = if self.mode.is_writable() {
            CursorRegion::new(0, 0, self.buf.len())
        } else {
            CursorRegion::EMPTY
        };
    }

    fn note(&mut self, t: Transfer) -> usize {
        if let Some(e) = t.error {
            log::trace!("transfer stopped after {} bytes: {e}", t.done);
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
        t.done
    }

    fn flush_error(&mut self) -> ChanIoError {
        ChanIoError::FlushFailed(
            self.error
                .take()
                .map_or_else(|| "short write".to_string(), |e| e.to_string()),
        )
    }

    fn current(&self) -> u8 {
        if self.get_on_cell {
            self.cell
        } else {
            self.buf[self.get.next()]
        }
    }

    // unread input, including a buffer parked behind the pushback cell
    fn input_size(&self) -> usize {
        let mut buffered = self.get.available();
        if self.get_on_cell {
            buffered += self.cur_gsize;
        }
        buffered
    }

    fn fill_buffer(&mut self) {
        let Some(io) = self.backend.as_mut() else {
            self.cur_gsize = 0;
            return;
        };
        let t = read_from(io, self.text, &mut self.buf);
        self.cur_gsize = self.note(t);
        log::trace!("refilled {} of {} buffer bytes", self.cur_gsize, self.buf.len());
    }

    fn read_direct(&mut self, dst: &mut [u8]) -> usize {
        let Some(io) = self.backend.as_mut() else {
            return 0;
        };
        let t = read_from(io, self.text, dst);
        self.note(t)
    }

    fn write_direct(&mut self, src: &[u8]) -> usize {
        let append = self.mode.contains(OpenMode::APPEND);
        let Some(io) = self.backend.as_mut() else {
            return 0;
        };
        let t = write_to(io, self.translator.as_mut(), append, src);
        self.note(t)
    }

    fn write_pending(&mut self) -> bool {
        let (from, to) = (self.put.base(), self.put.next());
        let append = self.mode.contains(OpenMode::APPEND);
        let Some(io) = self.backend.as_mut() else {
            return false;
        };
        let t = write_to(io, self.translator.as_mut(), append, &self.buf[from..to]);
        log::trace!("flushed {} of {} buffered bytes", t.done, to - from);
        self.note(t) == to - from
    }

    // Raw bytes behind the unread input in text mode. A lone '\n' in the
    // input is counted as if it had been "\r\n".
    fn text_input_span(&self) -> usize {
        let mut span = 0;
        let avail = self.get.available();
        if avail > 0 {
            span += avail;
            span += if self.get_on_cell {
                usize::from(self.cell == b'\n')
            } else {
                count_newlines(&self.buf[self.get.next()..self.get.limit()])
            };
        }
        if self.get_on_cell && self.cur_gsize > 0 {
            span += self.cur_gsize + count_newlines(&self.buf[..self.cur_gsize]);
        }
        span
    }

    // Discard read-ahead and move the OS position back to the logical one.
    #[allow(clippy::cast_possible_wrap)]
    fn flush_input(&mut self) {
        let buffered = self.input_size();
        if buffered > 0 {
            let back = if self.text {
                self.text_input_span()
            } else {
                buffered
            };
            if let Some(io) = self.backend.as_mut() {
                if let Err(e) = io.seek_raw(SeekFrom::Current(-(back as i64))) {
                    self.note(Transfer {
                        done: 0,
                        error: Some(e),
                    });
                }
            }
        }
        self.cur_gsize = 0;
        self.get = CursorRegion::EMPTY;
        self.get_on_cell = false;
    }

    // Bring the OS file in line with the logical position. False if
    // buffered output could not be written completely.
    fn sync(&mut self) -> bool {
        if self.put.consumed() > 0 {
            let ok = self.write_pending();
            self.init();
            ok
        } else {
            if self.mode.is_readable() {
                self.flush_input();
            }
            true
        }
    }

    /// Read up to `dst.len()` bytes. Returns fewer only at end of file or
    /// on error.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if dst.is_empty() || !self.readable() {
            return 0;
        }
        self.pushed_back = false;
        if self.put.consumed() > 0 {
            self.write_pending();
        }
        // next put will overflow
        self.put = CursorRegion::EMPTY;

        let mut ret = 0;
        if self.get_on_cell {
            if self.get.available() > 0 {
                dst[0] = self.cell;
                ret = 1;
            }
            self.get = CursorRegion::new(0, 0, self.cur_gsize);
            self.get_on_cell = false;
        }
        let buffered = (dst.len() - ret).min(self.get.available());
        if buffered > 0 {
            let from = self.get.next();
            dst[ret..ret + buffered].copy_from_slice(&self.buf[from..from + buffered]);
            self.get.bump(buffered);
            ret += buffered;
        }
        let size = dst.len() - ret;
        if size > 0 {
            if size < self.buf.len() {
                self.fill_buffer();
                let n = size.min(self.cur_gsize);
                self.get = CursorRegion::new(0, n, self.cur_gsize);
                dst[ret..ret + n].copy_from_slice(&self.buf[..n]);
                ret += n;
            } else {
                ret += self.read_direct(&mut dst[ret..]);
                self.get = CursorRegion::EMPTY;
                self.cur_gsize = 0;
            }
        }
        ret
    }

    /// Make the next input byte available without consuming it. `None` at
    /// end of file.
    pub fn underflow(&mut self) -> Option<u8> {
        if !self.readable() {
            return None;
        }
        if self.get.available() > 0 {
            return Some(self.current());
        }
        if self.get_on_cell && self.cur_gsize > 0 {
            self.get_on_cell = false;
            self.get = CursorRegion::new(0, 0, self.cur_gsize);
            return Some(self.buf[0]);
        }
        if self.buf.is_empty() {
            self.cur_gsize = 0;
            let mut cell = [0u8; 1];
            let n = self.read_direct(&mut cell);
            self.cell = cell[0];
            self.get_on_cell = true;
            self.get = CursorRegion::new(0, 0, n);
            if n > 0 {
                return Some(self.cell);
            }
        } else {
            if self.put.consumed() > 0 {
                self.write_pending();
            }
            self.put = CursorRegion::EMPTY;
            self.get_on_cell = false;
            self.fill_buffer();
            self.get = CursorRegion::new(0, 0, self.cur_gsize);
            if self.cur_gsize > 0 {
                return Some(self.buf[0]);
            }
        }
        None
    }

    /// Alias of [`underflow`](Self::underflow).
    pub fn peek(&mut self) -> Option<u8> {
        self.underflow()
    }

    /// Consume and return the next input byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        let c = self.underflow()?;
        self.get.bump(1);
        self.pushed_back = false;
        Some(c)
    }

    /// Push one byte back into the input.
    ///
    /// Succeeds only right after input (no output pending) and only once
    /// between reads.
    pub fn pushback(&mut self, c: u8) -> bool {
        if !self.readable() || self.pushed_back || !self.put.is_collapsed() {
            return false;
        }
        if self.get.unbump() {
            if self.get_on_cell {
                self.cell = c;
            } else {
                let at = self.get.next();
                self.buf[at] = c;
            }
            self.pushed_back = true;
            return true;
        }
        if !self.get_on_cell {
            self.cell = c;
            self.get = CursorRegion::new(0, 0, 1);
            self.get_on_cell = true;
            self.pushed_back = true;
            return true;
        }
        false
    }

    /// Write `src`, returning how many source bytes were accepted.
    pub fn write(&mut self, src: &[u8]) -> usize {
        if !self.writable() {
            return 0;
        }
        self.pushed_back = false;
        if src.len() > self.buf.len() {
            // too large for the buffer, write it directly
            if self.sync() {
                return self.write_direct(src);
            }
            return 0;
        }
        if self.mode.is_readable() {
            self.flush_input();
        }
        if !self.buf.is_empty() && self.put.is_collapsed() {
            self.put = CursorRegion::new(0, 0, self.buf.len());
        }
        let mut done = 0;
        while done < src.len() {
            let room = self.put.available();
            if room == 0 {
                if !self.overflow(src[done]) {
                    break;
                }
                done += 1;
                continue;
            }
            let n = room.min(src.len() - done);
            let at = self.put.next();
            self.buf[at..at + n].copy_from_slice(&src[done..done + n]);
            self.put.bump(n);
            done += n;
        }
        done
    }

    /// Flush the put area and append `c` to it; unbuffered channels write
    /// `c` straight through.
    pub fn overflow(&mut self, c: u8) -> bool {
        if !self.writable() {
            return false;
        }
        if self.buf.is_empty() {
            if self.mode.is_readable() {
                self.flush_input();
            }
            return self.write_direct(&[c]) == 1;
        }
        if self.put.is_collapsed() {
            self.put = CursorRegion::new(0, 0, self.buf.len());
        }
        if !self.sync() {
            return false;
        }
        let at = self.put.next();
        self.buf[at] = c;
        self.put.bump(1);
        true
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, c: u8) -> bool {
        if self.put.available() > 0 && self.writable() {
            let at = self.put.next();
            self.buf[at] = c;
            self.put.bump(1);
            self.pushed_back = false;
            return true;
        }
        self.overflow(c)
    }

    /// Write out pending output and drop read-ahead.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen` on a closed channel and
    /// `ChanIoError::FlushFailed` if buffered bytes could not be written.
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        if self.sync() {
            Ok(())
        } else {
            Err(self.flush_error())
        }
    }

    /// Synchronise both areas, then move the OS position.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen`, `ChanIoError::FlushFailed`, or the
    /// OS seek error.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        self.pushed_back = false;
        if !self.sync() {
            return Err(self.flush_error());
        }
        let io = self.backend.as_mut().ok_or(ChanIoError::NotOpen)?;
        Ok(io.seek_raw(pos)?)
    }

    /// Current logical position.
    ///
    /// # Errors
    ///
    /// Same as [`seek`](Self::seek).
    pub fn tell(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    /// Flush and release the backend.
    ///
    /// The backend is released even when flushing fails.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::NotOpen` if already closed,
    /// `ChanIoError::FlushFailed` if pending output was lost, or the
    /// backend's close error.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen);
        }
        let flush_err = if self.sync() {
            None
        } else {
            Some(self.flush_error())
        };
        let backend = self.backend.take();
        self.mode = OpenMode::NONE;
        self.translator = None;
        self.pushed_back = false;
        self.init();
        let closed = match backend {
            Some(b) => b.close_raw(),
            None => Ok(()),
        };
        log::debug!("channel closed");
        if let Some(e) = flush_err {
            return Err(e);
        }
        closed.map_err(ChanIoError::from)
    }
}

impl BufferedChannel<FileHandle> {
    /// Open `path` as a file channel.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::AlreadyOpen` if open, or `ChanIoError::Io` if
    /// the OS cannot create or open the file.
    pub fn open<P: AsRef<Path>>(
        &mut self,
        path: P,
        mode: OpenMode,
        disposition: CreateDisposition,
        share: ShareMode,
    ) -> Result<()> {
        if self.is_open() {
            return Err(ChanIoError::AlreadyOpen);
        }
        let handle = FileHandle::open(path.as_ref(), mode, disposition, share)?;
        log::debug!("opening file channel on {}", path.as_ref().display());
        self.attach(handle, mode)
    }

    /// Open a UTF-16 encoded path.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), plus `ChanIoError::InvalidPath`.
    pub fn open_wide(
        &mut self,
        path: &[u16],
        mode: OpenMode,
        disposition: CreateDisposition,
        share: ShareMode,
    ) -> Result<()> {
        if self.is_open() {
            return Err(ChanIoError::AlreadyOpen);
        }
        let handle = FileHandle::open_wide(path, mode, disposition, share)?;
        self.attach(handle, mode)
    }

    /// Underlying OS file while the channel is open.
    #[must_use]
    pub fn file(&self) -> Option<&std::fs::File> {
        self.backend.as_ref().map(FileHandle::file)
    }
}

impl<B: RawIo> Drop for BufferedChannel<B> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                log::warn!("error closing channel on drop: {e}");
            }
        }
    }
}

impl<B: RawIo> Read for BufferedChannel<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen.into());
        }
        let n = BufferedChannel::read(self, buf);
        if n == 0 && !buf.is_empty() {
            if let Some(e) = self.error.take() {
                return Err(e);
            }
        }
        Ok(n)
    }
}

impl<B: RawIo> BufRead for BufferedChannel<B> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.get.available() == 0 && self.underflow().is_none() {
            if let Some(e) = self.error.take() {
                return Err(e);
            }
            return Ok(&[]);
        }
        let (next, limit) = (self.get.next(), self.get.limit());
        if self.get_on_cell {
            Ok(&std::slice::from_ref(&self.cell)[next..limit])
        } else {
            Ok(&self.buf[next..limit])
        }
    }

    fn consume(&mut self, amt: usize) {
        self.get.bump(amt);
        self.pushed_back = false;
    }
}

impl<B: RawIo> Write for BufferedChannel<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(ChanIoError::NotOpen.into());
        }
        let n = BufferedChannel::write(self, buf);
        if n == 0 && !buf.is_empty() {
            return Err(self
                .error
                .take()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::WriteZero, "channel refused output")));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedChannel::flush(self).map_err(io::Error::from)
    }
}

impl<B: RawIo> Seek for BufferedChannel<B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        BufferedChannel::seek(self, pos).map_err(io::Error::from)
    }
}
