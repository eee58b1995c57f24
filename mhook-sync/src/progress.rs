//! Progress reporting for single-object transfers.

use std::io::{self, Read, Write};

/// Progress for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Store key being transferred (no leading `/`).
    pub key: String,
    pub bytes_done: u64,
    /// Expected size, when known up front.
    pub bytes_total: Option<u64>,
}

/// Callback for progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Called as bytes move. Returns `false` to cancel the transfer.
    fn on_progress(&self, progress: &TransferProgress) -> bool;

    /// Called once when an object's transfer ends, successfully or not.
    fn on_finish(&self, _key: &str) {}
}

/// A callback that ignores updates and never cancels.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _progress: &TransferProgress) -> bool {
        true
    }
}

impl<F> ProgressCallback for F
where
    F: Fn(&TransferProgress) -> bool + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) -> bool {
        self(progress)
    }
}

// Not `ErrorKind::Interrupted`: `write_all` and `io::copy` retry on that.
fn cancelled() -> io::Error {
    io::Error::other("transfer cancelled by progress callback")
}

/// Wraps a sink and reports every write as progress.
pub(crate) struct ProgressWriter<'a, W> {
    inner: W,
    progress: TransferProgress,
    callback: &'a dyn ProgressCallback,
    pub(crate) cancelled: bool,
}

impl<'a, W: Write> ProgressWriter<'a, W> {
    pub(crate) fn new(
        inner: W,
        key: &str,
        total: Option<u64>,
        callback: &'a dyn ProgressCallback,
    ) -> Self {
        Self {
            inner,
            progress: TransferProgress {
                key: key.to_owned(),
                bytes_done: 0,
                bytes_total: total,
            },
            callback,
            cancelled: false,
        }
    }
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.progress.bytes_done += n as u64;
        if !self.callback.on_progress(&self.progress) {
            self.cancelled = true;
            return Err(cancelled());
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Wraps a source and reports every read as progress (the tee side of an
/// upload).
pub(crate) struct ProgressReader<'a, R> {
    inner: R,
    progress: TransferProgress,
    callback: &'a dyn ProgressCallback,
    pub(crate) cancelled: bool,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub(crate) fn new(
        inner: R,
        key: &str,
        total: Option<u64>,
        callback: &'a dyn ProgressCallback,
    ) -> Self {
        Self {
            inner,
            progress: TransferProgress {
                key: key.to_owned(),
                bytes_done: 0,
                bytes_total: total,
            },
            callback,
            cancelled: false,
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.bytes_done += n as u64;
        if !self.callback.on_progress(&self.progress) {
            self.cancelled = true;
            return Err(cancelled());
        }
        Ok(n)
    }
}
