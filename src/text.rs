//! CRLF translation for text-mode channels.
//!
//! Output: every `\n` becomes `\r\n`, batched through a translation buffer.
//! Counts reported to callers are always in *source* bytes, so inserted
//! `\r` bytes never show up in them.
//!
//! Input: `\r\n` pairs collapse to `\n`. A `\r` that ends a chunk is resolved
//! with a one-byte lookahead; a `\r` at physical end of file stays literal.

use std::io::SeekFrom;

use memchr::{memchr, memchr_iter};

use crate::backend::{read_fully, write_fully, RawIo, Transfer};
use crate::utils::default_buffer_size;

pub(crate) fn count_newlines(bytes: &[u8]) -> usize {
    memchr_iter(b'\n', bytes).count()
}

/// Write-side `\n → \r\n` translator.
#[derive(Debug)]
pub struct TextTranslator {
    buf: Box<[u8]>,
    len: usize,
    // source bytes accounted for so far in the current call
    written: usize,
    // newlines expanded into `buf` since the last flush
    newline_count: usize,
    error: Option<std::io::Error>,
}

impl Default for TextTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTranslator {
    /// Translator with a buffer twice the default channel buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(default_buffer_size() * 2)
    }

    /// Translator with an explicit buffer capacity (at least 2 bytes).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(2)].into_boxed_slice(),
            len: 0,
            written: 0,
            newline_count: 0,
            error: None,
        }
    }

    /// Capacity of the translation buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Translate `src` and write it to `io`.
    ///
    /// `done` in the result counts source bytes represented in the output;
    /// it falls short of `src.len()` only if the backend failed.
    pub fn translate<B: RawIo + ?Sized>(&mut self, io: &mut B, src: &[u8]) -> Transfer {
        self.written = 0;
        self.newline_count = 0;
        self.len = 0;
        self.error = None;

        let mut rest = src;
        while let Some(at) = memchr(b'\n', rest) {
            if at > 0 && !self.append(io, &rest[..at]) {
                return self.finish();
            }
            if !self.append_newline(io) {
                return self.finish();
            }
            rest = &rest[at + 1..];
        }
        if !rest.is_empty() {
            if self.len == 0 {
                self.write_direct(io, rest);
            } else if rest.len() > self.buf.len() - self.len {
                if self.flush(io) {
                    self.write_direct(io, rest);
                }
            } else {
                self.buf[self.len..self.len + rest.len()].copy_from_slice(rest);
                self.len += rest.len();
                self.flush(io);
            }
        } else if self.len != 0 {
            self.flush(io);
        }
        self.finish()
    }

    fn finish(&mut self) -> Transfer {
        self.len = 0;
        Transfer {
            done: self.written,
            error: self.error.take(),
        }
    }

    fn write_direct<B: RawIo + ?Sized>(&mut self, io: &mut B, bytes: &[u8]) -> bool {
        let t = write_fully(io, bytes);
        self.written += t.done;
        match t.error {
            Some(e) => {
                self.error = Some(e);
                false
            }
            None => true,
        }
    }

    fn flush<B: RawIo + ?Sized>(&mut self, io: &mut B) -> bool {
        let pending = self.len;
        let t = write_fully(io, &self.buf[..pending]);
        self.len = 0;
        let newlines = std::mem::take(&mut self.newline_count);
        let inserted = if t.done == pending {
            newlines
        } else {
            // Every '\n' here has its '\r' right before it. Newlines in the
            // unwritten tail were not emitted; a pair split by the failure
            // still emitted its '\r'.
            let tail = &self.buf[t.done..pending];
            let split = t.done > 0 && tail.first() == Some(&b'\n');
            newlines - count_newlines(tail) + usize::from(split)
        };
        self.written += t.done - inserted;
        match t.error {
            Some(e) => {
                self.error = Some(e);
                false
            }
            None => true,
        }
    }

    fn append_newline<B: RawIo + ?Sized>(&mut self, io: &mut B) -> bool {
        if self.buf.len() - self.len < 2 && !self.flush(io) {
            return false;
        }
        self.buf[self.len] = b'\r';
        self.buf[self.len + 1] = b'\n';
        self.len += 2;
        self.newline_count += 1;
        true
    }

    fn append<B: RawIo + ?Sized>(&mut self, io: &mut B, mut bytes: &[u8]) -> bool {
        if bytes.len() >= self.buf.len() {
            // too large for the translation buffer, write it directly
            if self.len != 0 && !self.flush(io) {
                return false;
            }
            return self.write_direct(io, bytes);
        }
        let avail = self.buf.len() - self.len;
        if avail == 0 {
            if !self.flush(io) {
                return false;
            }
        } else if bytes.len() > avail {
            self.buf[self.len..].copy_from_slice(&bytes[..avail]);
            self.len += avail;
            if !self.flush(io) {
                return false;
            }
            bytes = &bytes[avail..];
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }
}

/// Read into `dst` from `io`, collapsing `\r\n` into `\n`.
///
/// `done` is the number of bytes left in `dst` after translation. Space freed
/// by collapsed pairs is refilled from the backend so a full chunk stays full
/// until end of file. A trailing `\r` is resolved by reading one more byte:
/// if it is `\n` the pair collapses, otherwise the byte is returned to the
/// backend with a one-byte reverse seek.
pub fn read_translated<B: RawIo + ?Sized>(io: &mut B, dst: &mut [u8]) -> Transfer {
    let first = read_fully(io, dst);
    let mut error = first.error;
    let mut eof = error.is_some() || first.done != dst.len();
    let mut end = first.done;
    let mut pos = 0;
    let mut tail = 0;

    while pos != end {
        match memchr(b'\r', &dst[pos..end]) {
            Some(at) => pos += at,
            None => {
                if eof || tail == 0 {
                    break;
                }
                let more = read_fully(io, &mut dst[end..end + tail]);
                if more.done == 0 {
                    error = error.or(more.error);
                    break;
                }
                pos = end;
                end += more.done;
                eof = more.error.is_some() || more.done != tail;
                error = error.or(more.error);
                tail = 0;
                continue;
            }
        }
        if pos + 1 == end {
            if eof {
                break;
            }
            if tail == 0 {
                resolve_trailing_cr(io, dst, pos);
                break;
            }
            let more = read_fully(io, &mut dst[end..end + tail]);
            if more.done == 0 {
                error = error.or(more.error);
                break;
            }
            end += more.done;
            eof = more.error.is_some() || more.done != tail;
            error = error.or(more.error);
            tail = 0;
        }
        pos += 1;
        if dst[pos] == b'\n' {
            dst.copy_within(pos..end, pos - 1);
            end -= 1;
            tail += 1;
        }
    }
    Transfer { done: end, error }
}

fn resolve_trailing_cr<B: RawIo + ?Sized>(io: &mut B, dst: &mut [u8], cr: usize) {
    let mut next = [0u8; 1];
    if read_fully(io, &mut next).done != 1 {
        return;
    }
    if next[0] == b'\n' {
        dst[cr] = b'\n';
    } else if let Err(e) = io.seek_raw(SeekFrom::Current(-1)) {
        log::warn!("lookahead byte {:#04x} lost, backend cannot seek back: {e}", next[0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::Trickle;
    use std::io::Cursor;

    fn translate_all(src: &[u8], capacity: usize) -> (usize, Vec<u8>) {
        let mut io = Cursor::new(Vec::new());
        let mut tr = TextTranslator::with_capacity(capacity);
        let t = tr.translate(&mut io, src);
        assert!(t.error.is_none());
        (t.done, io.into_inner())
    }

    #[test]
    fn newlines_expand_and_count_source_bytes() {
        let (done, out) = translate_all(b"a\nb", 16);
        assert_eq!(done, 3);
        assert_eq!(out, b"a\r\nb");

        let (done, out) = translate_all(b"\n\n", 16);
        assert_eq!(done, 2);
        assert_eq!(out, b"\r\n\r\n");

        let (done, out) = translate_all(b"no newline", 16);
        assert_eq!(done, 10);
        assert_eq!(out, b"no newline");
    }

    #[test]
    fn small_buffer_never_splits_pairs_wrongly() {
        let src = b"line one\nline two is longer\n\nx\ny";
        for cap in 2..12 {
            let (done, out) = translate_all(src, cap);
            assert_eq!(done, src.len(), "capacity {cap}");
            assert_eq!(out, b"line one\r\nline two is longer\r\n\r\nx\r\ny");
        }
    }

    #[test]
    fn partial_write_subtracts_unwritten_newlines() {
        // "a\nb\nc" -> "a\r\nb\r\nc"; accept 4 physical bytes: "a\r\nb"
        let mut io = Trickle::new(b"", 64);
        io.write_limit = 4;
        let mut tr = TextTranslator::with_capacity(64);
        let t = tr.translate(&mut io, b"a\nb\nc");
        assert!(t.error.is_some());
        assert_eq!(io.bytes(), b"a\r\nb");
        assert_eq!(t.done, 3);
    }

    #[test]
    fn partial_write_between_cr_and_lf() {
        // accept "a\r" only: the '\r' is an inserted byte, so one source byte
        let mut io = Trickle::new(b"", 64);
        io.write_limit = 2;
        let mut tr = TextTranslator::with_capacity(64);
        let t = tr.translate(&mut io, b"a\nb");
        assert_eq!(t.done, 1);
    }

    fn read_all(raw: &[u8], chunk: usize) -> Vec<u8> {
        let mut io = Cursor::new(raw.to_vec());
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let t = read_translated(&mut io, &mut buf);
            assert!(t.error.is_none());
            if t.done == 0 {
                break;
            }
            out.extend_from_slice(&buf[..t.done]);
        }
        out
    }

    #[test]
    fn crlf_collapses_within_chunk() {
        assert_eq!(read_all(b"a\r\nb\r\n", 64), b"a\nb\n");
        assert_eq!(read_all(b"\r\r\n", 64), b"\r\n");
        assert_eq!(read_all(b"lone\rcr", 64), b"lone\rcr");
    }

    #[test]
    fn crlf_across_chunk_boundary() {
        // '\r' is the last byte of the first 4-byte chunk
        assert_eq!(read_all(b"abc\r\nxyz", 4), b"abc\nxyz");
        for chunk in 1..10 {
            assert_eq!(
                read_all(b"ab\r\ncd\r\n\r\nef\rg", chunk),
                b"ab\ncd\n\nef\rg",
                "chunk {chunk}"
            );
        }
    }

    #[test]
    fn trailing_cr_at_eof_is_literal() {
        assert_eq!(read_all(b"abc\r", 4), b"abc\r");
        assert_eq!(read_all(b"abc\r", 64), b"abc\r");
    }

    #[test]
    fn lookahead_byte_is_pushed_back() {
        let mut io = Cursor::new(b"abc\rxy".to_vec());
        let mut buf = [0u8; 4];
        let t = read_translated(&mut io, &mut buf);
        assert_eq!(t.done, 4);
        assert_eq!(&buf, b"abc\r");
        assert_eq!(io.position(), 4);
    }

    #[test]
    fn lookahead_byte_lost_without_seek() {
        let mut io = Trickle::new(b"abc\rxy", 4);
        io.seekable = false;
        let mut buf = [0u8; 4];
        let t = read_translated(&mut io, &mut buf);
        assert_eq!(t.done, 4);
        assert!(t.error.is_none());
        assert_eq!(&buf, b"abc\r");
        assert_eq!(io.seeks, 1);

        // 'x' was consumed as lookahead and could not be returned
        let t = read_translated(&mut io, &mut buf);
        assert_eq!(t.done, 1);
        assert_eq!(&buf[..1], b"y");
    }

    #[test]
    fn collapsed_space_is_refilled() {
        let mut io = Cursor::new(b"a\r\nbcdef".to_vec());
        let mut buf = [0u8; 4];
        let t = read_translated(&mut io, &mut buf);
        assert_eq!(t.done, 4);
        assert_eq!(&buf, b"a\nbc");
    }
}
