//! File handle error types.

use std::io;
use thiserror::Error;

/// Error type for async file handles.
#[derive(Debug, Error)]
pub enum FileError {
    /// Mode string outside the accepted set.
    #[error("invalid mode: {0:?}")]
    InvalidMode(String),

    /// Operation on a handle that has been closed.
    #[error("I/O operation on closed file")]
    Closed,

    /// Handle was not opened for reading.
    #[error("file not open for reading")]
    NotReadable,

    /// Handle was not opened for writing.
    #[error("file not open for writing")]
    NotWritable,

    /// Seek target is not a valid offset.
    #[error("invalid seek: {0}")]
    InvalidSeek(String),

    /// Another operation currently owns the handle.
    #[error("file is busy with another operation")]
    Busy,

    /// Configuration could not be parsed or is out of range.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error from the underlying descriptor.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    /// Create an InvalidMode error.
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode(mode.into())
    }

    /// Create an InvalidSeek error.
    pub fn invalid_seek(msg: impl Into<String>) -> Self {
        Self::InvalidSeek(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Convert FileError to std::io::Error for compatibility.
impl From<FileError> for io::Error {
    fn from(e: FileError) -> Self {
        match e {
            FileError::InvalidMode(mode) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("invalid mode: {mode:?}"))
            }
            FileError::Closed => {
                io::Error::new(io::ErrorKind::InvalidInput, "I/O operation on closed file")
            }
            FileError::NotReadable => {
                io::Error::new(io::ErrorKind::PermissionDenied, "file not open for reading")
            }
            FileError::NotWritable => {
                io::Error::new(io::ErrorKind::PermissionDenied, "file not open for writing")
            }
            FileError::InvalidSeek(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FileError::Busy => io::Error::new(io::ErrorKind::WouldBlock, "file is busy"),
            FileError::Config(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            FileError::Io(e) => e,
        }
    }
}

/// File handle result type.
pub type FileResult<T> = Result<T, FileError>;
