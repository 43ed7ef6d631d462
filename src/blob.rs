//! Streamed blob transfer
//!
//! Bodies are copied straight from the socket to disk in fixed-size chunks.
//! [`ProgressWriter`] counts bytes as they are written and forwards the
//! running total to a [`ProgressObserver`].
//!
//! Files land on their destination by rename: the body goes to a temporary
//! file next to the destination first, so an existing destination is always
//! a complete transfer.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::error::{PullError, Result};
use crate::core::http::{Header, HttpClient};
use crate::core::progress::ProgressObserver;

const CHUNK_SIZE: usize = 8192;

/// Writer adapter that reports the number of bytes written so far.
pub struct ProgressWriter<'a, W: Write> {
    inner: W,
    written: u64,
    observer: &'a mut dyn ProgressObserver,
}

impl<'a, W: Write> ProgressWriter<'a, W> {
    pub fn new(inner: W, observer: &'a mut dyn ProgressObserver) -> Self {
        Self {
            inner,
            written: 0,
            observer,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        self.observer.advance(self.written);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams HTTP bodies to disk.
pub struct BlobStreamer {
    http: HttpClient,
}

impl BlobStreamer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// The parent directory is created if needed. On failure `dest` is left
    /// untouched and the temporary file is removed.
    pub fn stream(
        &self,
        url: &str,
        headers: &[Header<'_>],
        dest: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut staging = NamedTempFile::new_in(dir)?;
        let label = file_label(dest);
        let written = self.stream_to(url, headers, staging.as_file_mut(), &label, observer)?;
        staging.as_file().sync_all()?;
        staging.persist(dest).map_err(|e| PullError::Io(e.error))?;

        debug!(path = %dest.display(), bytes = written, "blob persisted");
        Ok(written)
    }

    /// Stream `url` into an arbitrary writer, returning the number of bytes written.
    pub fn stream_to<W: Write>(
        &self,
        url: &str,
        headers: &[Header<'_>],
        writer: W,
        label: &str,
        observer: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        let stream = self.http.open_stream(url, headers)?;
        observer.start(label, stream.content_length);
        let result = copy_body(url, stream.reader, writer, observer);
        observer.finish();
        result
    }
}

/// Copy a response body into `writer` chunk by chunk.
fn copy_body<R: Read, W: Write>(
    url: &str,
    mut reader: R,
    writer: W,
    observer: &mut dyn ProgressObserver,
) -> Result<u64> {
    let mut out = ProgressWriter::new(writer, observer);
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer).map_err(|e| PullError::Transport {
            url: url.to_string(),
            message: format!("read error: {}", e),
        })?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
    }
    out.flush()?;

    Ok(out.written())
}

fn file_label(dest: &Path) -> String {
    dest.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string())
}
