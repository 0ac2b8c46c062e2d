//! Shared, reference-counted file mappings.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{ChanIoError, Result};
use crate::mode::MapMode;
use crate::utils::{ensure_in_bounds, page_size};

#[derive(Debug)]
pub(crate) struct MappingInner {
    pub(crate) file: File,
    pub(crate) path: Option<PathBuf>,
    pub(crate) len: u64,
    pub(crate) mode: MapMode,
}

/// A file opened for mapping, shared by the views and channels that use it.
///
/// Cloning is cheap and adds a reference. The file stays open until the last
/// clone and the last [`View`](crate::View) bound to it are gone.
///
/// ```no_run
/// use chanio::{MapMode, Mapping, View};
///
/// let map = Mapping::open("data.bin", MapMode::ReadOnly)?;
/// let view = View::bind(&map, 0, 0)?;
/// println!("{} bytes mapped", view.len());
/// # Ok::<(), chanio::ChanIoError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    inner: Option<Arc<MappingInner>>,
}

impl Mapping {
    /// Open `path` for mapping with the given access.
    ///
    /// The mapping size is the file length at open time; zero-length files
    /// are accepted but no view can be bound to them.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::Io` if the file cannot be opened or queried.
    pub fn open<P: AsRef<Path>>(path: P, mode: MapMode) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(matches!(mode, MapMode::ReadWrite))
            .open(path_ref)?;
        let len = file.metadata()?.len();
        log::debug!(
            "mapping {} ({} bytes, {:?})",
            path_ref.display(),
            len,
            mode
        );
        Ok(Self::from_parts(file, Some(path_ref.to_path_buf()), len, mode))
    }

    /// Map an already open file. `size` limits the mapping to a prefix of
    /// the file; `None` maps all of it.
    ///
    /// # Errors
    ///
    /// Returns `ChanIoError::OutOfBounds` if `size` exceeds the file length,
    /// since a mapping never grows its file.
    pub fn from_file(file: File, mode: MapMode, size: Option<u64>) -> Result<Self> {
        let file_len = file.metadata()?.len();
        let len = size.unwrap_or(file_len);
        ensure_in_bounds(0, len, file_len)?;
        Ok(Self::from_parts(file, None, len, mode))
    }

    fn from_parts(file: File, path: Option<PathBuf>, len: u64, mode: MapMode) -> Self {
        Self {
            inner: Some(Arc::new(MappingInner {
                file,
                path,
                len,
                mode,
            })),
        }
    }

    /// Whether this handle refers to an open mapping.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Byte length of the mapping; 0 when closed.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.as_ref().map_or(0, |i| i.len)
    }

    /// Access mode, if open.
    #[must_use]
    pub fn mode(&self) -> Option<MapMode> {
        self.inner.as_ref().map(|i| i.mode)
    }

    /// Whether views of this mapping can be written through.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.mode().is_some_and(MapMode::is_writable)
    }

    /// Path the mapping was opened from, when known.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().and_then(|i| i.path.as_deref())
    }

    /// Number of live references (handles and bound views).
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    /// Drop this handle's reference. Views bound earlier keep the file
    /// mapped until they are unbound.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// System page size.
    #[must_use]
    pub fn page_size() -> usize {
        page_size()
    }

    pub(crate) fn from_shared(inner: Arc<MappingInner>) -> Self {
        Self { inner: Some(inner) }
    }

    pub(crate) fn shared(&self) -> Result<Arc<MappingInner>> {
        self.inner.clone().ok_or(ChanIoError::Unmapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_reports_size_and_mode() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[7u8; 100]).unwrap();
        let map = Mapping::open(tmp.path(), MapMode::ReadOnly).unwrap();
        assert!(map.is_open());
        assert_eq!(map.size(), 100);
        assert!(!map.is_writable());
        assert_eq!(map.path(), Some(tmp.path()));
    }

    #[test]
    fn clones_share_one_reference_count() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut a = Mapping::open(tmp.path(), MapMode::CopyOnWrite).unwrap();
        let b = a.clone();
        assert_eq!(b.ref_count(), 2);
        a.close();
        assert!(!a.is_open());
        assert_eq!(a.size(), 0);
        assert_eq!(b.ref_count(), 1);
        assert!(b.is_writable());
    }

    #[test]
    fn from_file_refuses_to_grow() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abcdef").unwrap();
        let file = tmp.reopen().unwrap();
        assert!(matches!(
            Mapping::from_file(file, MapMode::ReadOnly, Some(10)),
            Err(ChanIoError::OutOfBounds { len: 10, total: 6, .. })
        ));
        let map = Mapping::from_file(tmp.reopen().unwrap(), MapMode::ReadOnly, Some(4)).unwrap();
        assert_eq!(map.size(), 4);
        assert_eq!(map.path(), None);
    }

    #[test]
    fn closed_mapping_is_unmapped() {
        let map = Mapping::default();
        assert!(matches!(map.shared(), Err(ChanIoError::Unmapped)));
        assert_eq!(map.ref_count(), 0);
    }
}
