//! Exclusively owned OS file handle.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::backend::RawIo;
use crate::errors::{ChanIoError, Result};
use crate::mode::{open_options, CreateDisposition, OpenMode, ShareMode};

/// Owned file handle. The OS handle is released when this value is dropped
/// or [`close`](FileHandle::close)d, whichever comes first.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    path: PathBuf,
}

impl FileHandle {
    /// Open `path` with the given mode, disposition, and sharing.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::Io` if the OS refuses to create or open the file
    /// (not found, permission denied, sharing violation).
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        disposition: CreateDisposition,
        share: ShareMode,
    ) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = open_options(mode, disposition, share).open(path_ref)?;
        Ok(Self {
            file,
            path: path_ref.to_path_buf(),
        })
    }

    /// Open a UTF-16 encoded path.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::InvalidPath` if `path` is not valid UTF-16, or
    /// any error from [`FileHandle::open`].
    pub fn open_wide(
        path: &[u16],
        mode: OpenMode,
        disposition: CreateDisposition,
        share: ShareMode,
    ) -> Result<Self> {
        Self::open(wide_to_path(path)?, mode, disposition, share)
    }

    /// Adopt an already open file.
    #[must_use]
    pub fn from_file(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    /// Path the handle was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying file.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Close the handle, reporting the OS result where the platform has one.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::Io` if the OS close call fails.
    pub fn close(self) -> Result<()> {
        Ok(close_file(self.file)?)
    }
}

#[cfg(unix)]
fn close_file(file: File) -> io::Result<()> {
    use std::os::unix::io::IntoRawFd;

    let fd = file.into_raw_fd();
    // SAFETY: `fd` came from `into_raw_fd`, so nothing else owns or closes it.
    let rc = unsafe { libc::close(fd) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn close_file(file: File) -> io::Result<()> {
    drop(file);
    Ok(())
}

/// Convert a UTF-16 path for the OS.
pub(crate) fn wide_to_path(path: &[u16]) -> Result<PathBuf> {
    let end = path.iter().position(|&c| c == 0).unwrap_or(path.len());
    String::from_utf16(&path[..end])
        .map(PathBuf::from)
        .map_err(|e| ChanIoError::InvalidPath(e.to_string()))
}

impl RawIo for FileHandle {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn seek_raw(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn close_raw(self) -> io::Result<()> {
        close_file(self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_path_conversion() {
        let wide: Vec<u16> = "dir/файл.txt".encode_utf16().chain([0, 65]).collect();
        assert_eq!(wide_to_path(&wide).unwrap(), PathBuf::from("dir/файл.txt"));
        assert!(matches!(
            wide_to_path(&[0xD800, 0x0041]),
            Err(ChanIoError::InvalidPath(_))
        ));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileHandle::open(
            dir.path().join("missing.bin"),
            OpenMode::READ,
            CreateDisposition::Default,
            ShareMode::ALL,
        )
        .unwrap_err();
        match err {
            ChanIoError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn create_new_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.bin");
        std::fs::write(&path, b"x").unwrap();
        let res = FileHandle::open(
            &path,
            OpenMode::WRITE,
            CreateDisposition::CreateNew,
            ShareMode::ALL,
        );
        assert!(res.is_err());
    }

    #[test]
    fn raw_io_round_trip_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.bin");
        let mut h = FileHandle::open(
            &path,
            OpenMode::READ | OpenMode::WRITE,
            CreateDisposition::CreateAlways,
            ShareMode::ALL,
        )
        .unwrap();
        assert_eq!(h.write_chunk(b"hello").unwrap(), 5);
        assert_eq!(h.seek_raw(SeekFrom::Start(1)).unwrap(), 1);
        let mut buf = [0u8; 4];
        assert_eq!(h.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ello");
        assert_eq!(h.path(), path.as_path());
        h.close().unwrap();
    }
}
