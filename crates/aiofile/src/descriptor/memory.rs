//! In-memory backend.
//!
//! Used for scratch files and testing. All data is ephemeral and shared
//! between clones of the same backend.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::descriptor::{Backend, Descriptor};
use crate::error::{FileError, FileResult};
use crate::mode::Disposition;

type Contents = Arc<Mutex<Vec<u8>>>;

/// In-memory backend.
///
/// Thread-safe via `parking_lot::Mutex`. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    files: Arc<Mutex<HashMap<PathBuf, Contents>>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file.
    pub fn insert(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let key = Self::normalize(path.as_ref());
        self.files
            .lock()
            .insert(key, Arc::new(Mutex::new(data.into())));
    }

    /// Snapshot of a file's contents.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let key = Self::normalize(path.as_ref());
        self.files.lock().get(&key).map(|data| data.lock().clone())
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn open(&self, path: &Path, disposition: Disposition) -> FileResult<Box<dyn Descriptor>> {
        let key = Self::normalize(path);
        let data = {
            let mut files = self.files.lock();
            let existing = files.get(&key).cloned();
            match existing {
                Some(data) => data,
                None if disposition.creates() => files.entry(key.clone()).or_default().clone(),
                None => {
                    return Err(FileError::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("not found: {}", key.display()),
                    )));
                }
            }
        };

        let pos = {
            let mut bytes = data.lock();
            if disposition.truncates() {
                bytes.clear();
            }
            if disposition.appends() {
                bytes.len() as u64
            } else {
                0
            }
        };

        Ok(Box::new(MemoryDescriptor {
            path: key,
            data: Some(data),
            pos,
            disposition,
        }))
    }
}

/// Descriptor over an in-memory file.
#[derive(Debug)]
pub struct MemoryDescriptor {
    path: PathBuf,
    data: Option<Contents>,
    pos: u64,
    disposition: Disposition,
}

impl MemoryDescriptor {
    fn data(&self) -> FileResult<&Contents> {
        self.data.as_ref().ok_or(FileError::Closed)
    }

    fn readable(&self) -> FileResult<&Contents> {
        let data = self.data()?;
        if !self.disposition.readable() {
            return Err(FileError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} not open for reading", self.path.display()),
            )));
        }
        Ok(data)
    }

    fn writable(&self) -> FileResult<&Contents> {
        let data = self.data()?;
        if !self.disposition.writable() {
            return Err(FileError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} not open for writing", self.path.display()),
            )));
        }
        Ok(data)
    }

    /// Cursor as an index, clamped to the data length.
    fn start(&self, len: usize) -> usize {
        usize::try_from(self.pos).map_or(len, |pos| pos.min(len))
    }
}

#[async_trait]
impl Descriptor for MemoryDescriptor {
    fn position(&self) -> u64 {
        self.pos
    }

    async fn set_position(&mut self, offset: u64) -> FileResult<()> {
        self.data()?;
        self.pos = offset;
        Ok(())
    }

    async fn read(&mut self, size: usize) -> FileResult<Vec<u8>> {
        let out = {
            let bytes = self.readable()?.lock();
            let start = self.start(bytes.len());
            let end = start.saturating_add(size).min(bytes.len());
            bytes[start..end].to_vec()
        };
        self.pos += out.len() as u64;
        Ok(out)
    }

    async fn read_all(&mut self) -> FileResult<Vec<u8>> {
        let out = {
            let bytes = self.readable()?.lock();
            let start = self.start(bytes.len());
            bytes[start..].to_vec()
        };
        self.pos += out.len() as u64;
        Ok(out)
    }

    async fn read_line(&mut self) -> FileResult<Vec<u8>> {
        let (line, consumed) = {
            let bytes = self.readable()?.lock();
            let start = self.start(bytes.len());
            let rest = &bytes[start..];
            match rest.iter().position(|&b| b == b'\n') {
                Some(idx) => (rest[..idx].to_vec(), idx + 1),
                None => (rest.to_vec(), rest.len()),
            }
        };
        self.pos += consumed as u64;
        Ok(line)
    }

    async fn write(&mut self, data: &[u8]) -> FileResult<()> {
        let end = {
            let mut bytes = self.writable()?.lock();
            let start = if self.disposition.appends() {
                bytes.len()
            } else {
                usize::try_from(self.pos).map_err(|_| {
                    FileError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "position exceeds addressable memory",
                    ))
                })?
            };
            let end = start + data.len();
            if bytes.len() < end {
                // Writing past the end leaves a zero-filled gap, as on disk.
                bytes.resize(end, 0);
            }
            bytes[start..end].copy_from_slice(data);
            end
        };
        self.pos = end as u64;
        Ok(())
    }

    async fn truncate(&mut self, size: u64) -> FileResult<()> {
        let size = usize::try_from(size).map_err(|_| {
            FileError::Io(io::Error::new(io::ErrorKind::InvalidInput, "size too large"))
        })?;
        self.writable()?.lock().resize(size, 0);
        Ok(())
    }

    async fn file_size(&mut self) -> FileResult<Option<u64>> {
        Ok(Some(self.data()?.lock().len() as u64))
    }

    fn close(&mut self) -> FileResult<()> {
        self.data = None;
        Ok(())
    }
}
