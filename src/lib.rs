//! # chanio: buffered and memory-mapped byte channels
//!
//! Stream-buffer style channels over files: a get area for input, a put area
//! for output, single-byte pushback, and seeking that keeps both in step with
//! the OS position.
//!
//! ## Features
//!
//! - **Buffered file channel**: one buffer shared by input and output, with
//!   direct OS transfers for requests larger than the buffer
//! - **Text mode**: `\n` <-> `\r\n` translation, including pairs split
//!   across read chunks
//! - **Mapped file channel**: a sliding [`View`] window over a shared
//!   [`Mapping`]; writes land in the file and never extend it
//! - **Memory channel**: the same cursor model over a caller-owned slice
//! - **std interop**: every channel implements `Read`, `Write` and `Seek`
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::SeekFrom;
//! use chanio::{BufferedFileChannel, CreateDisposition, OpenMode, ShareMode};
//!
//! let mut ch = BufferedFileChannel::new();
//! ch.open(
//!     "data.bin",
//!     OpenMode::READ | OpenMode::WRITE | OpenMode::TRUNCATE | OpenMode::BINARY,
//!     CreateDisposition::Default,
//!     ShareMode::ALL,
//! )?;
//! ch.write(b"hello");
//! ch.seek(SeekFrom::Start(0))?;
//! let mut buf = [0u8; 5];
//! assert_eq!(ch.read(&mut buf), 5);
//! ch.close()?;
//! # Ok::<(), chanio::ChanIoError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error type and result alias
//! - [`utils`]: Page size, buffer size and offset helpers
//! - [`mode`]: Open, share, map and seek-side descriptors
//! - [`region`]: Get/put cursor regions
//! - [`backend`]: The raw I/O trait channels are built on
//! - [`handle`]: Owned OS file handle
//! - [`text`]: CRLF translation
//! - [`buffered`]: Buffered channel
//! - [`mapping`] and [`view`]: Shared file mappings and their windows
//! - [`mapped`]: Memory-mapped channel
//! - [`memory`]: Channel over a byte sequence

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/chanio")]

pub mod errors;
pub mod utils;
pub mod mode;
pub mod region;
pub mod backend;
pub mod handle;
pub mod text;
pub mod buffered;
pub mod mapping;
pub mod view;
pub mod mapped;
pub mod memory;

pub use backend::{RawIo, Transfer};
pub use buffered::{BufferedChannel, BufferedFileChannel, ChannelOptions, TextMode};
pub use errors::{ChanIoError, Result};
pub use handle::FileHandle;
pub use mapped::MappedFileChannel;
pub use mapping::Mapping;
pub use memory::MemoryChannel;
pub use mode::{CreateDisposition, MapMode, OpenMode, SeekSide, ShareMode};
pub use region::CursorRegion;
pub use text::TextTranslator;
pub use view::View;
