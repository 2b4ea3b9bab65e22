//! Cursor arithmetic over an absolute-only descriptor.
//!
//! The descriptor can only jump to an absolute offset. Relative seeks are
//! derived from its position, end-relative seeks from a read to end of file
//! (or a size query when configured), and the EOF check from a one-byte
//! read followed by a rewind.
//!
//! A handle remembers the last *committed* cursor. Operations mark the
//! state dirty on entry and commit on success, so an operation that was
//! cancelled or failed partway leaves nothing behind: the next one starts
//! by putting the descriptor back where the last good operation left it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::EndSeek;
use crate::descriptor::Descriptor;
use crate::error::{FileError, FileResult};

/// Reference point for a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Whence {
    /// Offset from the start of the file.
    #[default]
    Start,
    /// Offset from the current cursor.
    Current,
    /// Offset from the end of the file.
    End,
}

/// Accepts the `SEEK_SET`/`SEEK_CUR`/`SEEK_END` numbering (0, 1, 2).
impl TryFrom<i32> for Whence {
    type Error = FileError;

    fn try_from(raw: i32) -> FileResult<Self> {
        match raw {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(FileError::invalid_seek(format!("invalid whence ({other})"))),
        }
    }
}

/// Apply a signed offset to `base`.
pub(crate) fn offset_from(base: u64, offset: i64) -> FileResult<u64> {
    base.checked_add_signed(offset).ok_or_else(|| {
        FileError::invalid_seek(format!("offset {offset} from {base} is out of range"))
    })
}

/// Descriptor plus the dirty flag, guarded by the handle's mutex.
#[derive(Debug)]
pub(crate) struct CursorState {
    descriptor: Option<Box<dyn Descriptor>>,
    dirty: bool,
}

impl CursorState {
    pub(crate) fn new(descriptor: Box<dyn Descriptor>) -> Self {
        Self {
            descriptor: Some(descriptor),
            dirty: false,
        }
    }

    /// Start an operation, restoring the committed cursor if the previous
    /// operation did not finish.
    pub(crate) async fn enter(&mut self, committed: &AtomicU64) -> FileResult<&mut dyn Descriptor> {
        let descriptor = self.descriptor.as_deref_mut().ok_or(FileError::Closed)?;
        if self.dirty {
            let pos = committed.load(Ordering::Acquire);
            tracing::debug!(
                from = descriptor.position(),
                to = pos,
                "restoring cursor after unfinished operation"
            );
            descriptor.set_position(pos).await?;
        }
        self.dirty = true;
        Ok(descriptor)
    }

    /// Finish an operation, publishing the descriptor's position.
    pub(crate) fn commit(&mut self, committed: &AtomicU64) -> u64 {
        let pos = self.descriptor.as_deref().map_or_else(
            || committed.load(Ordering::Acquire),
            |descriptor| descriptor.position(),
        );
        committed.store(pos, Ordering::Release);
        self.dirty = false;
        pos
    }

    /// Take the descriptor out, leaving the state closed.
    pub(crate) fn take(&mut self) -> Option<Box<dyn Descriptor>> {
        self.descriptor.take()
    }
}

/// Move the descriptor according to `whence`, returning the new offset.
///
/// `Whence::End` with [`EndSeek::Scan`] reads and discards everything up to
/// end of file, so it costs O(remaining bytes), or O(file size) when the
/// cursor starts at or past the end. [`EndSeek::SizeQuery`] asks
/// the descriptor instead. Both land on the same offset. `can_read` is false
/// for write-only descriptors, which always use the size query.
pub(crate) async fn seek(
    descriptor: &mut dyn Descriptor,
    offset: i64,
    whence: Whence,
    end_seek: EndSeek,
    can_read: bool,
) -> FileResult<u64> {
    let target = match whence {
        Whence::Start => u64::try_from(offset)
            .map_err(|_| FileError::invalid_seek(format!("negative seek position {offset}")))?,
        Whence::Current => offset_from(descriptor.position(), offset)?,
        Whence::End => offset_from(end_of_file(descriptor, end_seek, can_read).await?, offset)?,
    };
    descriptor.set_position(target).await?;
    Ok(target)
}

async fn end_of_file(
    descriptor: &mut dyn Descriptor,
    end_seek: EndSeek,
    can_read: bool,
) -> FileResult<u64> {
    if end_seek == EndSeek::SizeQuery || !can_read {
        if let Some(size) = descriptor.file_size().await? {
            return Ok(size);
        }
    }
    let mut skipped = descriptor.read_all().await?.len();
    if skipped == 0 && descriptor.position() > 0 {
        // Cursor may be past the end; only a scan from 0 is sure to reach it.
        descriptor.set_position(0).await?;
        skipped = descriptor.read_all().await?.len();
    }
    tracing::debug!(skipped, end = descriptor.position(), "scanned to end of file");
    Ok(descriptor.position())
}

/// True if the cursor sits at end of file. The cursor is unchanged either
/// way, but a byte is read and given back when not at the end.
pub(crate) async fn at_eof(descriptor: &mut dyn Descriptor) -> FileResult<bool> {
    if descriptor.read(1).await?.is_empty() {
        return Ok(true);
    }
    seek(descriptor, -1, Whence::Current, EndSeek::Scan, true).await?;
    Ok(false)
}
