//! Python-style async file handles.
//!
//! [`AsyncFile`] offers `read`, `readline`, `readlines`, `write`,
//! `writelines`, `seek`, `tell` and `close` on top of a [`Descriptor`] that
//! only knows absolute positioning, plain reads and writes, and a line read
//! that strips the terminator.
//!
//! ```no_run
//! # async fn demo() -> aiofile::FileResult<()> {
//! use aiofile::Whence;
//!
//! let f = aiofile::open("notes.txt", "w").await?;
//! f.writelines(["first\n", "second"]).await?;
//! f.close()?;
//!
//! let f = aiofile::open("notes.txt", "r").await?;
//! assert_eq!(f.readline(None).await?, b"first\n");
//! f.seek(-6, Whence::End).await?;
//! assert_eq!(f.read(None).await?, b"second");
//! f.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Key Types
//!
//! | Type              | Purpose                                        |
//! |-------------------|------------------------------------------------|
//! | [`AsyncFile`]     | The handle                                     |
//! | [`OpenMode`]      | One of the ten accepted mode strings           |
//! | [`Whence`]        | Seek reference point                           |
//! | [`Backend`]       | Opens descriptors (local disk, memory)         |
//! | [`FileConfig`]    | Chunk size, create permissions, end-seek mode  |
//! | [`FileError`]     | Everything that can go wrong                   |

pub mod config;
mod cursor;
pub mod descriptor;
mod error;
mod file;
mod lines;
pub mod mode;

use std::path::Path;

pub use config::{EndSeek, FileConfig};
pub use cursor::Whence;
pub use descriptor::{Backend, Descriptor, LocalBackend, MemoryBackend};
pub use error::{FileError, FileResult};
pub use file::AsyncFile;
pub use mode::{Disposition, OpenMode};

/// Open a local file with default settings.
pub async fn open(path: impl AsRef<Path>, mode: &str) -> FileResult<AsyncFile> {
    open_with_config(path, mode, &FileConfig::default()).await
}

/// Open a local file, taking backend settings from `config`.
pub async fn open_with_config(
    path: impl AsRef<Path>,
    mode: &str,
    config: &FileConfig,
) -> FileResult<AsyncFile> {
    let backend = LocalBackend::from_config(config);
    AsyncFile::open_with(&backend, path, mode, config).await
}
