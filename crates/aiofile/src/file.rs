//! Python-style async file handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::Stream;
use tokio::sync::Mutex;

use crate::config::{EndSeek, FileConfig};
use crate::cursor::{self, CursorState, Whence};
use crate::descriptor::Backend;
use crate::error::{FileError, FileResult};
use crate::lines;
use crate::mode::OpenMode;

/// An open file with `read`/`readline`/`seek`/`tell` semantics.
///
/// There is no buffer: every operation goes straight to the descriptor and
/// is finished by the time it returns, so there is no `flush`.
///
/// Each operation holds the handle's lock for its whole duration. Calls made
/// concurrently from several tasks are serialized, not interleaved. A call
/// that is cancelled or fails leaves the cursor where it was before the
/// call (bytes a cancelled write already handed to the OS stay written).
///
/// Once closed, every operation except `close` returns [`FileError::Closed`].
#[derive(Debug)]
pub struct AsyncFile {
    path: PathBuf,
    mode: OpenMode,
    end_seek: EndSeek,
    state: Mutex<CursorState>,
    cursor: AtomicU64,
    closed: AtomicBool,
}

impl AsyncFile {
    /// Open `path` on the local filesystem with default settings.
    pub async fn open(path: impl AsRef<Path>, mode: &str) -> FileResult<Self> {
        crate::open(path, mode).await
    }

    /// Open `path` through `backend`.
    ///
    /// The mode string is checked before the backend is touched.
    #[tracing::instrument(skip(backend, path, config), fields(path = %path.as_ref().display()), name = "file.open")]
    pub async fn open_with(
        backend: &dyn Backend,
        path: impl AsRef<Path>,
        mode: &str,
        config: &FileConfig,
    ) -> FileResult<Self> {
        let mode = OpenMode::parse(mode)?;
        let path = path.as_ref();
        let descriptor = backend.open(path, mode.disposition()).await?;
        let pos = descriptor.position();

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            end_seek: config.end_seek,
            state: Mutex::new(CursorState::new(descriptor)),
            cursor: AtomicU64::new(pos),
            closed: AtomicBool::new(false),
        })
    }

    /// The path this handle was opened with.
    pub fn name(&self) -> &Path {
        &self.path
    }

    /// The mode the handle was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// True once `close` has run.
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True if the mode allows reads.
    pub fn readable(&self) -> bool {
        self.mode.readable()
    }

    /// True if the mode allows writes.
    pub fn writable(&self) -> bool {
        self.mode.writable()
    }

    /// False in append mode, where seeks are ignored.
    pub fn seekable(&self) -> bool {
        !self.mode.is_append()
    }

    fn check_open(&self) -> FileResult<()> {
        if self.closed() {
            Err(FileError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_readable(&self) -> FileResult<()> {
        self.check_open()?;
        if self.readable() {
            Ok(())
        } else {
            Err(FileError::NotReadable)
        }
    }

    fn check_writable(&self) -> FileResult<()> {
        self.check_open()?;
        if self.writable() {
            Ok(())
        } else {
            Err(FileError::NotWritable)
        }
    }

    /// Current cursor position. Never waits on a running operation; it
    /// reports the position as of the last completed one.
    pub fn tell(&self) -> FileResult<u64> {
        self.check_open()?;
        Ok(self.cursor.load(Ordering::Acquire))
    }

    /// Move the cursor and return the new position.
    ///
    /// `Whence::End` reads to end of file to find it unless the handle was
    /// opened with [`EndSeek::SizeQuery`]. In append mode this does nothing
    /// and returns the current position.
    #[tracing::instrument(skip(self), name = "file.seek")]
    pub async fn seek(&self, offset: i64, whence: Whence) -> FileResult<u64> {
        self.check_open()?;
        if self.mode.is_append() {
            tracing::debug!("seek ignored in append mode");
            return self.tell();
        }

        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        cursor::seek(descriptor, offset, whence, self.end_seek, self.readable()).await?;
        Ok(state.commit(&self.cursor))
    }

    /// True if the cursor is at end of file. The cursor does not move.
    #[tracing::instrument(skip(self), name = "file.is_at_eof")]
    pub async fn is_at_eof(&self) -> FileResult<bool> {
        self.check_readable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        let eof = cursor::at_eof(descriptor).await?;
        state.commit(&self.cursor);
        Ok(eof)
    }

    /// Read up to `size` bytes, or everything to end of file with `None`.
    #[tracing::instrument(skip(self), name = "file.read")]
    pub async fn read(&self, size: Option<usize>) -> FileResult<Vec<u8>> {
        self.check_readable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        let data = match size {
            Some(size) => descriptor.read(size).await?,
            None => descriptor.read_all().await?,
        };
        state.commit(&self.cursor);
        Ok(data)
    }

    /// Read one line including its `\n`, except for a last line that has
    /// none. Returns an empty vec at end of file.
    ///
    /// With `size`, at most `size` bytes are returned and the rest of the
    /// line is left for the next read.
    #[tracing::instrument(skip(self), name = "file.readline")]
    pub async fn readline(&self, size: Option<usize>) -> FileResult<Vec<u8>> {
        self.check_readable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        let line = lines::read_line(descriptor, size).await?;
        state.commit(&self.cursor);
        Ok(line)
    }

    /// Read all lines, always starting from offset 0.
    ///
    /// With `hint`, stop once at least `hint` bytes have been read; lines
    /// are never split.
    #[tracing::instrument(skip(self), name = "file.readlines")]
    pub async fn readlines(&self, hint: Option<usize>) -> FileResult<Vec<Vec<u8>>> {
        self.check_readable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        let lines = lines::read_lines(descriptor, hint).await?;
        state.commit(&self.cursor);
        Ok(lines)
    }

    /// Stream lines from the current cursor until end of file.
    pub fn lines(&self) -> impl Stream<Item = FileResult<Vec<u8>>> + '_ {
        futures::stream::try_unfold(self, |file| async move {
            let line = file.readline(None).await?;
            let next = if line.is_empty() {
                None
            } else {
                Some((line, file))
            };
            Ok::<_, FileError>(next)
        })
    }

    /// Write `data` at the cursor, which advances past it.
    #[tracing::instrument(skip(self, data), fields(len = data.as_ref().len()), name = "file.write")]
    pub async fn write(&self, data: impl AsRef<[u8]>) -> FileResult<()> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        descriptor.write(data.as_ref()).await?;
        state.commit(&self.cursor);
        Ok(())
    }

    /// Write each entry in order, with nothing added between them.
    #[tracing::instrument(skip(self, lines), name = "file.writelines")]
    pub async fn writelines<I>(&self, lines: I) -> FileResult<()>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        for line in lines {
            let descriptor = state.enter(&self.cursor).await?;
            descriptor.write(line.as_ref()).await?;
            state.commit(&self.cursor);
        }
        Ok(())
    }

    /// Resize the file to `size`, or to the cursor with `None`. The cursor
    /// does not move.
    #[tracing::instrument(skip(self), name = "file.truncate")]
    pub async fn truncate(&self, size: Option<u64>) -> FileResult<u64> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let descriptor = state.enter(&self.cursor).await?;
        let size = size.unwrap_or_else(|| descriptor.position());
        descriptor.truncate(size).await?;
        state.commit(&self.cursor);
        Ok(size)
    }

    /// Release the descriptor. Never suspends.
    ///
    /// Closing twice is a no-op. Fails with [`FileError::Busy`] while another
    /// operation is running, and with the descriptor's error if releasing it
    /// fails (the handle counts as closed either way).
    pub fn close(&self) -> FileResult<()> {
        if self.closed() {
            return Ok(());
        }
        let mut state = self.state.try_lock().map_err(|_| FileError::Busy)?;
        let Some(mut descriptor) = state.take() else {
            return Ok(());
        };
        self.closed.store(true, Ordering::Release);
        tracing::debug!(path = %self.path.display(), "closing");
        descriptor.close()
    }
}

impl Drop for AsyncFile {
    fn drop(&mut self) {
        if let Some(mut descriptor) = self.state.get_mut().take() {
            tracing::debug!(path = %self.path.display(), "dropped without close");
            if let Err(e) = descriptor.close() {
                tracing::warn!(path = %self.path.display(), "close on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, MemoryBackend};
    use crate::mode::Disposition;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    async fn open(fs: &MemoryBackend, path: &str, mode: &str) -> AsyncFile {
        AsyncFile::open_with(fs, path, mode, &FileConfig::default())
            .await
            .unwrap()
    }

    async fn with_content(content: &str, mode: &str) -> (MemoryBackend, AsyncFile) {
        let fs = MemoryBackend::new();
        fs.insert("f.txt", content);
        let file = open(&fs, "f.txt", mode).await;
        (fs, file)
    }

    #[tokio::test]
    async fn test_read_all_then_eof() {
        let (_fs, f) = with_content("Hello, World!", "r").await;
        assert_eq!(f.read(Some(13)).await.unwrap(), b"Hello, World!");
        assert!(f.is_at_eof().await.unwrap());
        assert_eq!(f.tell().unwrap(), 13);
    }

    #[tokio::test]
    async fn test_seek_start_reads_everything() {
        let (_fs, f) = with_content("abcdef", "rb").await;
        f.read(Some(4)).await.unwrap();
        assert_eq!(f.seek(0, Whence::Start).await.unwrap(), 0);
        assert_eq!(f.read(None).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_seek_current_and_end() {
        let (_fs, f) = with_content("0123456789", "r").await;
        f.seek(3, Whence::Start).await.unwrap();
        assert_eq!(f.seek(4, Whence::Current).await.unwrap(), 7);
        assert_eq!(f.tell().unwrap(), 7);
        assert_eq!(f.seek(-3, Whence::End).await.unwrap(), 7);
        assert_eq!(f.read(None).await.unwrap(), b"789");
    }

    #[tokio::test]
    async fn test_invalid_seek_keeps_cursor() {
        let (_fs, f) = with_content("abc", "r").await;
        f.seek(2, Whence::Start).await.unwrap();
        assert!(matches!(
            f.seek(-5, Whence::End).await,
            Err(FileError::InvalidSeek(_))
        ));
        assert_eq!(f.tell().unwrap(), 2);
        assert_eq!(f.read(None).await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn test_end_seek_on_write_only_handle() {
        let fs = MemoryBackend::new();
        let f = open(&fs, "w.txt", "w").await;
        f.write("12345").await.unwrap();
        f.seek(0, Whence::Start).await.unwrap();
        assert_eq!(f.seek(-2, Whence::End).await.unwrap(), 3);
        f.write("xy").await.unwrap();
        assert_eq!(fs.contents("w.txt").unwrap(), b"123xy");
    }

    #[tokio::test]
    async fn test_readline_sequence() {
        let (_fs, f) = with_content("a\nb\nc", "r").await;
        assert_eq!(f.readline(None).await.unwrap(), b"a\n");
        assert_eq!(f.readline(None).await.unwrap(), b"b\n");
        assert_eq!(f.readline(None).await.unwrap(), b"c");
        assert_eq!(f.readline(None).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_readline_bounded() {
        let (_fs, f) = with_content("hello\n", "r").await;
        assert_eq!(f.readline(Some(1)).await.unwrap(), b"h");
        assert_eq!(f.tell().unwrap(), 1);
        assert_eq!(f.readline(None).await.unwrap(), b"ello\n");
    }

    #[tokio::test]
    async fn test_readlines_ignores_cursor() {
        let (_fs, f) = with_content("a\nb\nc", "r+").await;
        f.seek(3, Whence::Start).await.unwrap();
        assert_eq!(
            f.readlines(None).await.unwrap(),
            vec![b"a\n".to_vec(), b"b\n".to_vec(), b"c".to_vec()]
        );
        assert!(f.is_at_eof().await.unwrap());
    }

    #[tokio::test]
    async fn test_lines_stream() {
        let (_fs, f) = with_content("x\ny\nz", "r").await;
        f.readline(None).await.unwrap();
        let rest: Vec<Vec<u8>> = f.lines().try_collect().await.unwrap();
        assert_eq!(rest, vec![b"y\n".to_vec(), b"z".to_vec()]);
    }

    #[tokio::test]
    async fn test_write_advances_cursor() {
        let (fs, f) = with_content("abc", "r+").await;
        f.seek(1, Whence::Start).await.unwrap();
        f.write("X").await.unwrap();
        assert_eq!(f.tell().unwrap(), 2);
        assert_eq!(fs.contents("f.txt").unwrap(), b"aXc");
    }

    #[tokio::test]
    async fn test_writelines_no_separator() {
        let fs = MemoryBackend::new();
        let f = open(&fs, "out.txt", "w").await;
        f.writelines(["one", "two\n", "three"]).await.unwrap();
        assert_eq!(f.tell().unwrap(), 12);
        assert_eq!(fs.contents("out.txt").unwrap(), b"onetwo\nthree");
    }

    #[tokio::test]
    async fn test_accessors_follow_mode() {
        let (_fs, f) = with_content("abc", "rb+").await;
        assert_eq!(f.mode(), OpenMode::ReadWrite);
        assert!(f.readable() && f.writable() && f.seekable());

        let (_fs, f) = with_content("abc", "r").await;
        assert!(f.readable() && !f.writable());
        assert!(matches!(f.write("x").await, Err(FileError::NotWritable)));

        let fs = MemoryBackend::new();
        let f = open(&fs, "w.txt", "w").await;
        assert!(!f.readable() && f.writable());
        assert!(matches!(f.read(None).await, Err(FileError::NotReadable)));
    }

    #[tokio::test]
    async fn test_append_seek_is_noop() {
        let (fs, f) = with_content("start", "a").await;
        assert_eq!(f.tell().unwrap(), 5);
        assert!(!f.seekable());

        for whence in [Whence::Start, Whence::Current, Whence::End] {
            assert_eq!(f.seek(-2, whence).await.unwrap(), 5);
            assert_eq!(f.tell().unwrap(), 5);
        }
        f.write("!").await.unwrap();
        assert_eq!(f.tell().unwrap(), 6);
        assert_eq!(fs.contents("f.txt").unwrap(), b"start!");
    }

    #[tokio::test]
    async fn test_truncate() {
        let (fs, f) = with_content("hello world", "r+").await;
        f.seek(5, Whence::Start).await.unwrap();
        assert_eq!(f.truncate(None).await.unwrap(), 5);
        assert_eq!(f.tell().unwrap(), 5);
        assert_eq!(fs.contents("f.txt").unwrap(), b"hello");

        assert_eq!(f.truncate(Some(2)).await.unwrap(), 2);
        assert_eq!(fs.contents("f.txt").unwrap(), b"he");
    }

    #[tokio::test]
    async fn test_capability_checks() {
        let (_fs, f) = with_content("data", "r").await;
        assert!(matches!(f.write("x").await, Err(FileError::NotWritable)));
        assert!(matches!(f.truncate(None).await, Err(FileError::NotWritable)));

        let fs = MemoryBackend::new();
        let f = open(&fs, "w.txt", "wb").await;
        assert!(matches!(f.read(None).await, Err(FileError::NotReadable)));
        assert!(matches!(f.readline(None).await, Err(FileError::NotReadable)));
        assert!(matches!(f.readlines(None).await, Err(FileError::NotReadable)));
        assert!(matches!(f.is_at_eof().await, Err(FileError::NotReadable)));
    }

    #[tokio::test]
    async fn test_invalid_mode_never_opens() {
        let fs = MemoryBackend::new();
        let result = AsyncFile::open_with(&fs, "new.txt", "a+", &FileConfig::default()).await;
        assert!(matches!(result, Err(FileError::InvalidMode(m)) if m == "a+"));
        assert!(fs.contents("new.txt").is_none());
    }

    #[tokio::test]
    async fn test_open_missing_propagates_not_found() {
        let fs = MemoryBackend::new();
        let result = AsyncFile::open_with(&fs, "missing.txt", "r+", &FileConfig::default()).await;
        match result {
            Err(FileError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_fs, f) = with_content("abc", "r").await;
        assert!(!f.closed());
        f.close().unwrap();
        assert!(f.closed());
        f.close().unwrap();
    }

    #[tokio::test]
    async fn test_use_after_close() {
        let (_fs, f) = with_content("a\nb", "r+").await;
        f.close().unwrap();

        assert!(matches!(f.tell(), Err(FileError::Closed)));
        assert!(matches!(f.seek(0, Whence::Start).await, Err(FileError::Closed)));
        assert!(matches!(f.read(None).await, Err(FileError::Closed)));
        assert!(matches!(f.readline(None).await, Err(FileError::Closed)));
        assert!(matches!(f.readlines(None).await, Err(FileError::Closed)));
        assert!(matches!(f.is_at_eof().await, Err(FileError::Closed)));
        assert!(matches!(f.write("x").await, Err(FileError::Closed)));
        assert!(matches!(f.writelines(["x"]).await, Err(FileError::Closed)));
        assert!(matches!(f.truncate(None).await, Err(FileError::Closed)));
    }

    #[tokio::test]
    async fn test_concurrent_readlines_are_serialized() {
        let (_fs, f) = with_content("a\nb\nc\n", "r").await;
        let f = Arc::new(f);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move { f.readlines(None).await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().len(), 3);
        }
    }

    /// Descriptor that can be told to hang after a read or fail writes.
    #[derive(Debug)]
    struct Flaky {
        inner: Box<dyn Descriptor>,
        stall_reads: Arc<AtomicBool>,
        fail_writes: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Descriptor for Flaky {
        fn position(&self) -> u64 {
            self.inner.position()
        }

        async fn set_position(&mut self, offset: u64) -> FileResult<()> {
            self.inner.set_position(offset).await
        }

        async fn read(&mut self, size: usize) -> FileResult<Vec<u8>> {
            let data = self.inner.read(size).await?;
            if self.stall_reads.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            Ok(data)
        }

        async fn read_all(&mut self) -> FileResult<Vec<u8>> {
            self.inner.read_all().await
        }

        async fn read_line(&mut self) -> FileResult<Vec<u8>> {
            self.inner.read_line().await
        }

        async fn write(&mut self, data: &[u8]) -> FileResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(FileError::Io(io::Error::other("disk full")));
            }
            self.inner.write(data).await
        }

        async fn truncate(&mut self, size: u64) -> FileResult<()> {
            self.inner.truncate(size).await
        }

        fn close(&mut self) -> FileResult<()> {
            self.inner.close()
        }
    }

    #[derive(Debug, Default)]
    struct FlakyBackend {
        fs: MemoryBackend,
        stall_reads: Arc<AtomicBool>,
        fail_writes: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn open(
            &self,
            path: &Path,
            disposition: Disposition,
        ) -> FileResult<Box<dyn Descriptor>> {
            Ok(Box::new(Flaky {
                inner: self.fs.open(path, disposition).await?,
                stall_reads: self.stall_reads.clone(),
                fail_writes: self.fail_writes.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_cancelled_eof_check_leaves_cursor() {
        let backend = FlakyBackend::default();
        backend.fs.insert("f.txt", "abcdef");
        let f = AsyncFile::open_with(&backend, "f.txt", "r", &FileConfig::default())
            .await
            .unwrap();
        f.seek(2, Whence::Start).await.unwrap();

        backend.stall_reads.store(true, Ordering::SeqCst);
        let check = tokio::time::timeout(Duration::from_millis(20), f.is_at_eof()).await;
        assert!(check.is_err(), "eof check should have been cancelled");
        backend.stall_reads.store(false, Ordering::SeqCst);

        assert_eq!(f.tell().unwrap(), 2);
        assert_eq!(f.read(None).await.unwrap(), b"cdef");
    }

    #[tokio::test]
    async fn test_failed_write_propagates() {
        let backend = FlakyBackend::default();
        let f = AsyncFile::open_with(&backend, "out.txt", "w", &FileConfig::default())
            .await
            .unwrap();
        f.write("ok").await.unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        match f.writelines(["more"]).await {
            Err(FileError::Io(e)) => assert_eq!(e.to_string(), "disk full"),
            other => panic!("expected I/O error, got {other:?}"),
        }
        assert_eq!(f.tell().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_close_while_busy() {
        let backend = FlakyBackend::default();
        backend.fs.insert("f.txt", "abc");
        let f = Arc::new(
            AsyncFile::open_with(&backend, "f.txt", "r", &FileConfig::default())
                .await
                .unwrap(),
        );

        backend.stall_reads.store(true, Ordering::SeqCst);
        let reader = {
            let f = f.clone();
            tokio::spawn(async move { f.read(Some(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(f.close(), Err(FileError::Busy)));
        assert!(!f.closed());

        reader.abort();
        let _ = reader.await;
        f.close().unwrap();
        assert!(f.closed());
    }

    #[tokio::test]
    async fn test_size_query_end_seek() {
        let fs = MemoryBackend::new();
        fs.insert("f.txt", "0123456789");
        let config = FileConfig {
            end_seek: EndSeek::SizeQuery,
            ..FileConfig::default()
        };
        let f = AsyncFile::open_with(&fs, "f.txt", "r", &config).await.unwrap();
        assert_eq!(f.seek(-4, Whence::End).await.unwrap(), 6);
        assert_eq!(f.read(None).await.unwrap(), b"6789");
    }
}
