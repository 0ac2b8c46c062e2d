//! Windows into a [`Mapping`].

use std::sync::Arc;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::errors::{ChanIoError, Result};
use crate::mapping::{Mapping, MappingInner};
use crate::mode::MapMode;

enum Window {
    Unbound,
    Ro(Mmap),
    Rw(MmapMut),
}

/// A contiguous mapped range of a [`Mapping`].
///
/// A view holds a reference to its mapping while bound, so the mapping
/// cannot be released underneath it. Slices obtained from a view are valid
/// until the next `remap`/`unmap`, which the borrow checker enforces.
pub struct View {
    mapping: Option<Arc<MappingInner>>,
    window: Window,
    offset: u64,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("offset", &self.offset)
            .field("len", &self.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

impl View {
    /// Unbound view.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapping: None,
            window: Window::Unbound,
            offset: 0,
        }
    }

    /// Bind a new view of `len` bytes at `offset`; see [`remap`](Self::remap).
    ///
    /// # Errors
    ///
    /// Same as [`remap`](Self::remap).
    pub fn bind(mapping: &Mapping, offset: u64, len: usize) -> Result<Self> {
        let mut view = Self::new();
        view.remap(mapping, offset, len)?;
        Ok(view)
    }

    /// Drop the current window and map `len` bytes of `mapping` starting at
    /// `offset`. A `len` of 0, or one reaching past the end, maps the rest
    /// of the file.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::Unmapped` if `mapping` is closed,
    /// `ChanIoError::OutOfBounds` if `offset` is not inside the mapping, or
    /// `ChanIoError::Io` if the OS refuses the mapping.
    pub fn remap(&mut self, mapping: &Mapping, offset: u64, len: usize) -> Result<()> {
        let inner = mapping.shared()?;
        self.unmap();
        if offset >= inner.len {
            return Err(ChanIoError::OutOfBounds {
                offset,
                len: len as u64,
                total: inner.len,
            });
        }
        let remaining = inner.len - offset;
        let len = if len == 0 || len as u64 > remaining {
            usize::try_from(remaining).map_err(|_| ChanIoError::OutOfBounds {
                offset,
                len: remaining,
                total: inner.len,
            })?
        } else {
            len
        };

        let mut opts = MmapOptions::new();
        opts.offset(offset).len(len);
        // SAFETY: offset and len lie inside the file length recorded when the
        // mapping was opened, and the file handle lives in `inner`, which this
        // view keeps alive for as long as the window exists.
        self.window = unsafe {
            match inner.mode {
                MapMode::ReadOnly => Window::Ro(opts.map(&inner.file)?),
                MapMode::ReadWrite => Window::Rw(opts.map_mut(&inner.file)?),
                MapMode::CopyOnWrite => Window::Rw(opts.map_copy(&inner.file)?),
            }
        };
        log::trace!("mapped window [{offset}, {}) of {}", offset + len as u64, inner.len);
        self.offset = offset;
        self.mapping = Some(inner);
        Ok(())
    }

    /// Map another window of the mapping this view is already bound to.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::Unmapped` if the view was never bound, otherwise
    /// as [`remap`](Self::remap).
    pub fn move_to(&mut self, offset: u64, len: usize) -> Result<()> {
        let inner = self.mapping.clone().ok_or(ChanIoError::Unmapped)?;
        self.remap(&Mapping::from_shared(inner), offset, len)
    }

    /// Drop the current window but stay attached to the mapping.
    pub fn unmap(&mut self) {
        self.window = Window::Unbound;
    }

    /// Drop the window and the mapping reference.
    pub fn release(&mut self) {
        self.unmap();
        self.mapping = None;
        self.offset = 0;
    }

    /// Whether a window is currently mapped.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !matches!(self.window, Window::Unbound)
    }

    /// Offset of the window inside the mapping.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Window length in bytes; 0 when unbound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the mapping this view belongs to.
    #[must_use]
    pub fn max_offset(&self) -> u64 {
        self.mapping.as_ref().map_or(0, |m| m.len)
    }

    /// Mapped bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &self.window {
            Window::Unbound => &[],
            Window::Ro(m) => &m[..],
            Window::Rw(m) => &m[..],
        }
    }

    /// Mapped bytes for writing; `None` for read-only or unbound views.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match &mut self.window {
            Window::Rw(m) => Some(&mut m[..]),
            Window::Unbound | Window::Ro(_) => None,
        }
    }

    /// Write dirty pages of a shared read-write window back to the file.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::FlushFailed` if the OS reports a failure.
    pub fn sync(&self) -> Result<()> {
        let shared = self
            .mapping
            .as_ref()
            .is_some_and(|m| m.mode == MapMode::ReadWrite);
        match &self.window {
            Window::Rw(m) if shared => m
                .flush()
                .map_err(|e| ChanIoError::FlushFailed(e.to_string())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(data: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn bind_clamps_to_file_end() {
        let data: Vec<u8> = (0..=255u8).collect();
        let tmp = file_with(&data);
        let map = Mapping::open(tmp.path(), MapMode::ReadOnly).unwrap();
        let view = View::bind(&map, 250, 4096).unwrap();
        assert_eq!(view.as_slice(), &data[250..]);
        assert_eq!(view.max_offset(), 256);
        assert_eq!(map.ref_count(), 2);
        drop(view);
        assert_eq!(map.ref_count(), 1);
    }

    #[test]
    fn out_of_range_and_unopened() {
        let tmp = file_with(b"abc");
        let map = Mapping::open(tmp.path(), MapMode::ReadOnly).unwrap();
        assert!(matches!(
            View::bind(&map, 3, 1),
            Err(ChanIoError::OutOfBounds { offset: 3, total: 3, .. })
        ));
        assert!(matches!(
            View::bind(&Mapping::default(), 0, 1),
            Err(ChanIoError::Unmapped)
        ));
        let mut view = View::new();
        assert!(matches!(view.move_to(0, 1), Err(ChanIoError::Unmapped)));
    }

    #[test]
    fn view_outlives_mapping_handle() {
        let tmp = file_with(b"persist");
        let mut map = Mapping::open(tmp.path(), MapMode::ReadOnly).unwrap();
        let mut view = View::bind(&map, 0, 0).unwrap();
        map.close();
        assert_eq!(view.as_slice(), b"persist");
        view.move_to(3, 0).unwrap();
        assert_eq!(view.as_slice(), b"sist");
        view.release();
        assert!(!view.is_bound());
        assert_eq!(view.max_offset(), 0);
    }

    #[test]
    fn copy_on_write_leaves_file_alone() {
        let tmp = file_with(b"original");
        let map = Mapping::open(tmp.path(), MapMode::CopyOnWrite).unwrap();
        let mut view = View::bind(&map, 0, 0).unwrap();
        view.as_mut_slice().unwrap()[..4].copy_from_slice(b"ORIG");
        assert_eq!(&view.as_slice()[..4], b"ORIG");
        view.sync().unwrap();
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"original");
    }

    #[test]
    fn shared_write_reaches_file() {
        let tmp = file_with(b"0123456789");
        let map = Mapping::open(tmp.path(), MapMode::ReadWrite).unwrap();
        let mut view = View::bind(&map, 2, 3).unwrap();
        assert_eq!(view.len(), 3);
        view.as_mut_slice().unwrap().copy_from_slice(b"abc");
        view.sync().unwrap();
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"01abc56789");
    }

    #[test]
    fn read_only_view_has_no_mut_slice() {
        let tmp = file_with(b"ro");
        let map = Mapping::open(tmp.path(), MapMode::ReadOnly).unwrap();
        let mut view = View::bind(&map, 0, 0).unwrap();
        assert!(view.as_mut_slice().is_none());
    }
}
