//! Handle configuration, loaded from RON.
//!
//! ```ron
//! (
//!     scan_chunk_size: 65536,
//!     create_perm: 384,
//!     end_seek: size_query,
//! )
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FileError, FileResult};

/// How `seek(.., Whence::End)` discovers the end of file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndSeek {
    /// Read to end of file, discarding the bytes. O(remaining bytes).
    #[default]
    Scan,
    /// Ask the descriptor for its size, scanning only if it cannot say.
    SizeQuery,
}

/// Configuration for opening handles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Chunk size for line scans in the local backend.
    pub scan_chunk_size: usize,
    /// Unix permission bits for newly created files.
    pub create_perm: u32,
    /// End-of-file discovery strategy for end-relative seeks.
    pub end_seek: EndSeek,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            scan_chunk_size: 8192,
            create_perm: 0o644,
            end_seek: EndSeek::Scan,
        }
    }
}

impl FileConfig {
    /// Parse a config from RON text.
    pub fn from_ron(text: &str) -> FileResult<Self> {
        let config: FileConfig =
            ron::from_str(text).map_err(|e| FileError::config(format!("RON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk.
    pub async fn load(path: impl AsRef<Path>) -> FileResult<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_ron(&text)
    }

    fn validate(&self) -> FileResult<()> {
        if self.scan_chunk_size == 0 {
            return Err(FileError::config("scan_chunk_size must be at least 1"));
        }
        if self.create_perm > 0o7777 {
            return Err(FileError::config(format!(
                "create_perm {:#o} is not a permission mask",
                self.create_perm
            )));
        }
        Ok(())
    }
}
