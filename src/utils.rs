//! Page size, buffer size, and offset helpers.

use std::sync::OnceLock;

use crate::errors::{ChanIoError, Result};

/// Buffer size used by file channels unless configured otherwise.
/// Matches the platform C library's `BUFSIZ`.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
static GRANULARITY: OnceLock<usize> = OnceLock::new();

/// Get the system page size in bytes. Queried from the OS on first use.
#[must_use]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "windows")] {
                windows_system_info().0
            } else {
                unix_page_size()
            }
        }
    })
}

/// Granularity at which mapped windows are requested.
///
/// On Windows views must start on an allocation-granularity boundary (64K on
/// most systems); elsewhere this is the page size.
#[must_use]
pub fn allocation_granularity() -> usize {
    *GRANULARITY.get_or_init(|| {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "windows")] {
                windows_system_info().1
            } else {
                page_size()
            }
        }
    })
}

/// Default size of a file channel's buffer.
#[must_use]
pub fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

#[cfg(target_os = "windows")]
fn windows_system_info() -> (usize, usize) {
    use std::mem::MaybeUninit;
    #[allow(non_snake_case)]
    #[repr(C)]
    struct SYSTEM_INFO {
        wProcessorArchitecture: u16,
        wReserved: u16,
        dwPageSize: u32,
        lpMinimumApplicationAddress: *mut core::ffi::c_void,
        lpMaximumApplicationAddress: *mut core::ffi::c_void,
        dwActiveProcessorMask: usize,
        dwNumberOfProcessors: u32,
        dwProcessorType: u32,
        dwAllocationGranularity: u32,
        wProcessorLevel: u16,
        wProcessorRevision: u16,
    }
    extern "system" {
        fn GetSystemInfo(lpSystemInfo: *mut SYSTEM_INFO);
    }
    let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
    // SAFETY: GetSystemInfo fills the whole structure and cannot fail.
    unsafe {
        GetSystemInfo(sysinfo.as_mut_ptr());
        let s = sysinfo.assume_init();
        (s.dwPageSize as usize, s.dwAllocationGranularity as usize)
    }
}

#[cfg(not(target_os = "windows"))]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unix_page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is safe to call.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        4096
    } else {
        page_size as usize
    }
}

/// Ensure the requested [offset, offset+len) range is within [0, total).
///
/// # Errors
///
/// Returns `ChanIoError::OutOfBounds` if the range exceeds bounds.
pub fn ensure_in_bounds(offset: u64, len: u64, total: u64) -> Result<()> {
    if offset > total || offset.saturating_add(len) > total {
        return Err(ChanIoError::OutOfBounds { offset, len, total });
    }
    Ok(())
}

/// Resolve a signed displacement against `base`, clamping the result to
/// `[0, limit]`.
#[must_use]
pub fn clamp_offset(base: u64, delta: i64, limit: u64) -> u64 {
    let target = if delta.is_negative() {
        base.saturating_sub(delta.unsigned_abs())
    } else {
        base.saturating_add(delta.unsigned_abs())
    };
    target.min(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
        assert!(allocation_granularity() >= page_size());
        assert_eq!(allocation_granularity() % page_size(), 0);
    }

    #[test]
    fn bounds_checks() {
        assert!(ensure_in_bounds(0, 10, 10).is_ok());
        assert!(ensure_in_bounds(10, 0, 10).is_ok());
        assert!(matches!(
            ensure_in_bounds(5, 6, 10),
            Err(ChanIoError::OutOfBounds { offset: 5, len: 6, total: 10 })
        ));
        assert!(ensure_in_bounds(11, 0, 10).is_err());
    }

    #[test]
    fn clamp_offset_saturates() {
        assert_eq!(clamp_offset(10, -20, 100), 0);
        assert_eq!(clamp_offset(10, 5, 100), 15);
        assert_eq!(clamp_offset(90, 50, 100), 100);
        assert_eq!(clamp_offset(0, i64::MIN, 100), 0);
    }
}
