//! Open, share, and map mode descriptors and their translation to OS open options.

use std::fs::OpenOptions;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Caller-facing open mode, composed as a bit set.
///
/// ```
/// use chanio::OpenMode;
///
/// let mode = OpenMode::READ | OpenMode::WRITE | OpenMode::BINARY;
/// assert!(mode.contains(OpenMode::WRITE));
/// assert!(!mode.contains(OpenMode::APPEND));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenMode(u32);

impl OpenMode {
    /// No access requested.
    pub const NONE: Self = Self(0);
    /// Open for input.
    pub const READ: Self = Self(1);
    /// Open for output.
    pub const WRITE: Self = Self(1 << 1);
    /// Every output goes to the end of the file.
    pub const APPEND: Self = Self(1 << 2);
    /// Truncate an existing file on open.
    pub const TRUNCATE: Self = Self(1 << 3);
    /// Disable newline translation.
    pub const BINARY: Self = Self(1 << 4);
    /// Position at the end of the file right after opening.
    pub const AT_END: Self = Self(1 << 5);

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Input was requested.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READ)
    }

    /// Output was requested, explicitly or implied by append/truncate.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.intersects(Self(Self::WRITE.0 | Self::APPEND.0 | Self::TRUNCATE.0))
    }
}

impl BitOr for OpenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for OpenMode {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// What to do when the target file does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateDisposition {
    /// Derive the disposition from the [`OpenMode`].
    #[default]
    Default,
    /// Create a new file; fail if it exists.
    CreateNew,
    /// Create a new file, truncating any existing one.
    CreateAlways,
    /// Open an existing file; fail if it does not exist.
    OpenExisting,
    /// Open the file, creating it if missing.
    OpenAlways,
    /// Open an existing file and truncate it to zero length.
    TruncateExisting,
}

impl CreateDisposition {
    /// Disposition implied by an open mode: truncation creates or truncates,
    /// any other output creates when missing, input alone requires the file.
    #[must_use]
    pub fn from_mode(mode: OpenMode) -> Self {
        if mode.contains(OpenMode::TRUNCATE) {
            Self::CreateAlways
        } else if mode.is_writable() {
            Self::OpenAlways
        } else {
            Self::OpenExisting
        }
    }
}

/// Sharing flags honoured by the file channel where the OS supports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShareMode(u32);

impl ShareMode {
    /// Exclusive access.
    pub const NONE: Self = Self(0);
    /// Others may read.
    pub const READ: Self = Self(0x1);
    /// Others may write.
    pub const WRITE: Self = Self(0x2);
    /// Others may delete or rename.
    pub const DELETE: Self = Self(0x4);
    /// Share everything.
    pub const ALL: Self = Self(0x7);

    /// Raw bits, laid out as the Win32 `FILE_SHARE_*` flags.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ShareMode {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ShareMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Access mode of a memory mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Read-only mapping.
    ReadOnly,
    /// Read-write mapping shared with the file.
    ReadWrite,
    /// Copy-on-Write mapping (private). Writes affect this mapping only; the underlying file remains unchanged.
    CopyOnWrite,
}

impl MapMode {
    /// Mapping mode for a channel opened with `mode`.
    #[must_use]
    pub fn for_channel(mode: OpenMode, private: bool) -> Self {
        if mode.is_writable() {
            if private {
                Self::CopyOnWrite
            } else {
                Self::ReadWrite
            }
        } else {
            Self::ReadOnly
        }
    }

    /// Whether the mapped bytes can be modified.
    #[must_use]
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Which cursor of a channel a seek addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekSide {
    /// The get (read) cursor.
    Get,
    /// The put (write) cursor.
    Put,
    /// Both cursors.
    #[default]
    Both,
}

impl SeekSide {
    pub(crate) fn includes_get(self) -> bool {
        matches!(self, Self::Get | Self::Both)
    }

    pub(crate) fn includes_put(self) -> bool {
        matches!(self, Self::Put | Self::Both)
    }
}

/// Build OS open options for a file channel.
pub(crate) fn open_options(
    mode: OpenMode,
    disposition: CreateDisposition,
    share: ShareMode,
) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.read(mode.is_readable());
    if mode.contains(OpenMode::APPEND) {
        opts.append(true);
    } else if mode.is_writable() {
        opts.write(true);
    }
    let disposition = match disposition {
        CreateDisposition::Default => CreateDisposition::from_mode(mode),
        other => other,
    };
    match disposition {
        CreateDisposition::CreateNew => {
            opts.create_new(true);
        }
        CreateDisposition::CreateAlways => {
            opts.create(true).truncate(true);
        }
        CreateDisposition::OpenAlways => {
            opts.create(true);
        }
        CreateDisposition::TruncateExisting => {
            opts.truncate(true);
        }
        CreateDisposition::OpenExisting | CreateDisposition::Default => {}
    }
    apply_share(&mut opts, share);
    opts
}

#[cfg(windows)]
fn apply_share(opts: &mut OpenOptions, share: ShareMode) {
    use std::os::windows::fs::OpenOptionsExt;
    opts.share_mode(share.bits());
}

#[cfg(not(windows))]
fn apply_share(_opts: &mut OpenOptions, _share: ShareMode) {}
