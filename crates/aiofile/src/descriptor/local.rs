//! Local filesystem backend.
//!
//! Descriptors wrap `tokio::fs::File`. Every write is flushed before it
//! returns, so there is no pending data to lose on close.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::FileConfig;
use crate::descriptor::{Backend, Descriptor};
use crate::error::{FileError, FileResult};
use crate::mode::Disposition;

/// Local filesystem backend.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    chunk_size: usize,
    create_perm: u32,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::from_config(&FileConfig::default())
    }
}

impl LocalBackend {
    /// Create a backend with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend using the chunk size and permissions from `config`.
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            chunk_size: config.scan_chunk_size.max(1),
            create_perm: config.create_perm,
        }
    }

    fn options(&self, disposition: Disposition) -> fs::OpenOptions {
        let mut options = fs::OpenOptions::new();
        match disposition {
            Disposition::ReadOnly => {
                options.read(true);
            }
            Disposition::WriteCreateTruncate => {
                options.write(true).create(true).truncate(true);
            }
            Disposition::AppendCreate => {
                options.append(true).create(true);
            }
            Disposition::ReadWriteExisting => {
                options.read(true).write(true);
            }
            Disposition::ReadWriteCreateTruncate => {
                options.read(true).write(true).create(true).truncate(true);
            }
        }
        #[cfg(unix)]
        options.mode(self.create_perm);
        options
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn open(&self, path: &Path, disposition: Disposition) -> FileResult<Box<dyn Descriptor>> {
        let mut file = self.options(disposition).open(path).await?;

        let pos = if disposition.appends() {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };

        tracing::debug!(path = %path.display(), ?disposition, pos, "opened local descriptor");
        Ok(Box::new(LocalDescriptor {
            path: path.to_path_buf(),
            file: Some(file),
            pos,
            append: disposition.appends(),
            chunk_size: self.chunk_size,
        }))
    }
}

/// Descriptor over a local file.
#[derive(Debug)]
pub struct LocalDescriptor {
    path: PathBuf,
    file: Option<fs::File>,
    pos: u64,
    append: bool,
    chunk_size: usize,
}

impl LocalDescriptor {
    fn file(&mut self) -> FileResult<&mut fs::File> {
        self.file.as_mut().ok_or(FileError::Closed)
    }
}

#[async_trait]
impl Descriptor for LocalDescriptor {
    fn position(&self) -> u64 {
        self.pos
    }

    async fn set_position(&mut self, offset: u64) -> FileResult<()> {
        self.file()?.seek(SeekFrom::Start(offset)).await?;
        self.pos = offset;
        Ok(())
    }

    async fn read(&mut self, size: usize) -> FileResult<Vec<u8>> {
        let file = self.file()?;
        // The buffer grows with what is read, not with what was asked for.
        let mut buffer = Vec::new();
        let n = (&mut *file).take(size as u64).read_to_end(&mut buffer).await?;
        self.pos += n as u64;
        Ok(buffer)
    }

    async fn read_all(&mut self) -> FileResult<Vec<u8>> {
        let file = self.file()?;
        let mut buffer = Vec::new();
        let n = file.read_to_end(&mut buffer).await?;
        self.pos += n as u64;
        Ok(buffer)
    }

    async fn read_line(&mut self) -> FileResult<Vec<u8>> {
        let start = self.pos;
        let chunk_size = self.chunk_size;
        let file = self.file()?;

        let mut line = Vec::new();
        let mut chunk = vec![0u8; chunk_size];
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                self.pos = start + line.len() as u64;
                return Ok(line);
            }
            if let Some(idx) = chunk[..n].iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&chunk[..idx]);
                let next = start + line.len() as u64 + 1;
                // Hand back whatever was read past the newline.
                if idx + 1 < n {
                    file.seek(SeekFrom::Start(next)).await?;
                }
                self.pos = next;
                return Ok(line);
            }
            line.extend_from_slice(&chunk[..n]);
        }
    }

    async fn write(&mut self, data: &[u8]) -> FileResult<()> {
        let append = self.append;
        let file = self.file()?;
        file.write_all(data).await?;
        file.flush().await?;
        self.pos = if append {
            file.stream_position().await?
        } else {
            self.pos + data.len() as u64
        };
        Ok(())
    }

    async fn truncate(&mut self, size: u64) -> FileResult<()> {
        self.file()?.set_len(size).await?;
        Ok(())
    }

    async fn file_size(&mut self) -> FileResult<Option<u64>> {
        let meta = self.file()?.metadata().await?;
        Ok(Some(meta.len()))
    }

    fn close(&mut self) -> FileResult<()> {
        if self.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "closed local descriptor");
        }
        Ok(())
    }
}
