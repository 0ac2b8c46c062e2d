//! Crate-specific error types for chanio.

use std::io;
use thiserror::Error;

/// Result alias for chanio operations.
pub type Result<T> = std::result::Result<T, ChanIoError>;

/// Error type covering opening, mapping, bounds, and flushing issues.
#[derive(Debug, Error)]
pub enum ChanIoError {
    /// Wrapper for `std::io::Error` (open failures, OS read/write/seek errors).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `open` was called on a channel that is already open.
    #[error("channel is already open")]
    AlreadyOpen,

    /// The operation requires an open channel.
    #[error("channel is not open")]
    NotOpen,

    /// Error returned when attempting an operation in an incompatible mode.
    #[error("invalid access mode: {0}")]
    InvalidMode(&'static str),

    /// Error when a requested offset/length pair is out of bounds.
    #[error("range out of bounds: offset={offset}, len={len}, total={total}")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Total size of the mapped file.
        total: u64,
    },

    /// A view was bound to a mapping that is not open.
    #[error("view of an unopened mapping")]
    Unmapped,

    /// Error when a flush operation fails; buffered bytes were lost.
    #[error("flush failed: {0}")]
    FlushFailed(String),

    /// A path could not be converted for the OS.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl From<ChanIoError> for io::Error {
    fn from(err: ChanIoError) -> Self {
        match err {
            ChanIoError::Io(e) => e,
            other => {
                let kind = match &other {
                    ChanIoError::NotOpen => io::ErrorKind::NotConnected,
                    ChanIoError::OutOfBounds { .. } | ChanIoError::InvalidPath(_) => {
                        io::ErrorKind::InvalidInput
                    }
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, other)
            }
        }
    }
}
