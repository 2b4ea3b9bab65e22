//! Cursor-based descriptor abstraction.
//!
//! This is the primitive the file handle is built on. Key components:
//!
//! - [`Backend`] - Opens a path with a [`Disposition`]
//! - [`Descriptor`] - An exclusively owned open file with a position cursor
//! - [`LocalBackend`] - Real files via `tokio::fs`
//! - [`MemoryBackend`] - In-memory files (for scratch use, testing)
//!
//! ## Design Decisions
//!
//! - **Cursor only**: reads and writes happen at the descriptor's position.
//!   There is no positional I/O; callers move the cursor first.
//! - **Stripped lines**: [`Descriptor::read_line`] consumes the `\n` but
//!   does not return it. The handle layer restores it.
//! - **Sync close**: closing never suspends.

pub mod local;
pub mod memory;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::FileResult;
use crate::mode::Disposition;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Opens descriptors.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Acquire a descriptor for `path`.
    ///
    /// In append disposition the cursor starts at end of file; otherwise
    /// at zero.
    async fn open(&self, path: &Path, disposition: Disposition) -> FileResult<Box<dyn Descriptor>>;
}

/// An open file with a single position cursor.
#[async_trait]
pub trait Descriptor: Send + fmt::Debug {
    /// Current cursor position.
    fn position(&self) -> u64;

    /// Move the cursor to an absolute offset. Offsets past end of file are
    /// legal; reads there return nothing.
    async fn set_position(&mut self, offset: u64) -> FileResult<()>;

    /// Read up to `size` bytes, fewer only at end of file.
    async fn read(&mut self, size: usize) -> FileResult<Vec<u8>>;

    /// Read everything from the cursor to end of file.
    async fn read_all(&mut self) -> FileResult<Vec<u8>>;

    /// Read one line, consuming but not returning the `\n`.
    ///
    /// Returns an empty vec at end of file, and also for an empty line.
    /// Compare positions before and after to tell them apart.
    async fn read_line(&mut self) -> FileResult<Vec<u8>>;

    /// Write all of `data` at the cursor (at end of file when appending).
    async fn write(&mut self, data: &[u8]) -> FileResult<()>;

    /// Resize the file. The cursor does not move.
    async fn truncate(&mut self, size: u64) -> FileResult<()>;

    /// File size, if the descriptor can report it without reading.
    async fn file_size(&mut self) -> FileResult<Option<u64>> {
        Ok(None)
    }

    /// Release the descriptor. Never suspends.
    fn close(&mut self) -> FileResult<()>;
}
