//! Python-style mode strings.
//!
//! Exactly ten mode strings are accepted: `r`, `rb`, `w`, `wb`, `a`, `ab`,
//! `r+`, `rb+`, `w+`, `wb+`. The `b` marker is accepted and ignored; there
//! is no text/binary distinction. Anything else is rejected.

use std::fmt;
use std::str::FromStr;

use strum::EnumString;

use crate::error::{FileError, FileResult};

/// Parsed open mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, EnumString)]
pub enum OpenMode {
    /// Read an existing file.
    #[default]
    #[strum(serialize = "r", serialize = "rb")]
    Read,
    /// Create or truncate, write only.
    #[strum(serialize = "w", serialize = "wb")]
    Write,
    /// Create if missing, every write lands at end of file.
    #[strum(serialize = "a", serialize = "ab")]
    Append,
    /// Read and write an existing file.
    #[strum(serialize = "r+", serialize = "rb+")]
    ReadWrite,
    /// Create or truncate, read and write.
    #[strum(serialize = "w+", serialize = "wb+")]
    ReadWriteCreate,
}

/// How the backend acquires a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Open existing, read only.
    ReadOnly,
    /// Create or truncate, write only.
    WriteCreateTruncate,
    /// Create if missing, append only.
    AppendCreate,
    /// Open existing, read and write.
    ReadWriteExisting,
    /// Create or truncate, read and write.
    ReadWriteCreateTruncate,
}

impl OpenMode {
    /// Parse a mode string, failing on anything outside the accepted set.
    pub fn parse(mode: &str) -> FileResult<Self> {
        OpenMode::from_str(mode).map_err(|_| FileError::invalid_mode(mode))
    }

    /// Canonical mode string (without the `b` marker).
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
            OpenMode::ReadWrite => "r+",
            OpenMode::ReadWriteCreate => "w+",
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            OpenMode::Read => Disposition::ReadOnly,
            OpenMode::Write => Disposition::WriteCreateTruncate,
            OpenMode::Append => Disposition::AppendCreate,
            OpenMode::ReadWrite => Disposition::ReadWriteExisting,
            OpenMode::ReadWriteCreate => Disposition::ReadWriteCreateTruncate,
        }
    }

    /// Returns true if reads are allowed.
    pub fn readable(&self) -> bool {
        self.disposition().readable()
    }

    /// Returns true if writes are allowed.
    pub fn writable(&self) -> bool {
        self.disposition().writable()
    }

    /// Returns true for append mode, where seeks are suppressed.
    pub fn is_append(&self) -> bool {
        matches!(self, OpenMode::Append)
    }
}

impl Disposition {
    pub fn readable(&self) -> bool {
        matches!(
            self,
            Disposition::ReadOnly
                | Disposition::ReadWriteExisting
                | Disposition::ReadWriteCreateTruncate
        )
    }

    pub fn writable(&self) -> bool {
        !matches!(self, Disposition::ReadOnly)
    }

    /// Returns true if a missing file is created.
    pub fn creates(&self) -> bool {
        matches!(
            self,
            Disposition::WriteCreateTruncate
                | Disposition::AppendCreate
                | Disposition::ReadWriteCreateTruncate
        )
    }

    /// Returns true if existing contents are discarded on open.
    pub fn truncates(&self) -> bool {
        matches!(
            self,
            Disposition::WriteCreateTruncate | Disposition::ReadWriteCreateTruncate
        )
    }

    pub fn appends(&self) -> bool {
        matches!(self, Disposition::AppendCreate)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
