//! Line decoding on top of the stripping `read_line` primitive.

use crate::config::EndSeek;
use crate::cursor::{self, Whence};
use crate::descriptor::Descriptor;
use crate::error::FileResult;

/// Read one line, restoring the `\n` the descriptor stripped.
///
/// The terminator is appended unless the read ended at end of file on a
/// line that had none. With `size`, a longer line is cut to `size` bytes
/// and the cursor is moved back so the remainder is read next.
pub(crate) async fn read_line(
    descriptor: &mut dyn Descriptor,
    size: Option<usize>,
) -> FileResult<Vec<u8>> {
    let start = descriptor.position();
    let mut line = descriptor.read_line().await?;
    let consumed = descriptor.position() - start;

    let terminated = if cursor::at_eof(descriptor).await? {
        consumed > line.len() as u64
    } else {
        true
    };
    if terminated {
        line.push(b'\n');
    }

    if let Some(limit) = size {
        if line.len() > limit {
            let excess = line.len() - limit;
            tracing::debug!(excess, limit, "rewinding past bounded line");
            let back = i64::try_from(excess).unwrap_or(i64::MAX);
            cursor::seek(descriptor, -back, Whence::Current, EndSeek::Scan, true).await?;
            line.truncate(limit);
        }
    }
    Ok(line)
}

/// Read every line from offset 0 until end of file.
///
/// With `hint`, stop once the lines read total at least `hint` bytes. The
/// line crossing the threshold is kept whole.
pub(crate) async fn read_lines(
    descriptor: &mut dyn Descriptor,
    hint: Option<usize>,
) -> FileResult<Vec<Vec<u8>>> {
    cursor::seek(descriptor, 0, Whence::Start, EndSeek::Scan, true).await?;

    let mut lines = Vec::new();
    let mut total = 0usize;
    while !cursor::at_eof(descriptor).await? {
        let line = read_line(descriptor, None).await?;
        total += line.len();
        lines.push(line);
        if hint.is_some_and(|hint| total >= hint) {
            break;
        }
    }
    Ok(lines)
}
