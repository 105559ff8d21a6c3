#![forbid(unsafe_code)]

//! Buffered output sink for one terminal.
//!
//! Emissions append to an in-process buffer whose flush is driven by the
//! event loop; nothing in the engine blocks on the terminal fd. A debug
//! log handle, when attached, receives a verbatim tee of every buffered
//! byte. The `raw` path bypasses the buffer for teardown sequences, where
//! the buffered path may no longer be serviced.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Retry budget for the raw teardown path.
const RAW_RETRIES: u32 = 5;
const RAW_RETRY_DELAY: Duration = Duration::from_micros(100);

/// Append-only buffered writer with an optional tee log.
#[derive(Debug)]
pub struct OutputSink<W: Write> {
    writer: W,
    buf: Vec<u8>,
    log: Option<File>,
    bytes_written: u64,
}

impl<W: Write> OutputSink<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: Vec::new(),
            log: None,
            bytes_written: 0,
        }
    }

    /// Attach a tee log. Every byte that enters the buffer is copied to
    /// it; `raw` teardown writes are not.
    pub fn set_log(&mut self, log: File) {
        self.log = Some(log);
    }

    /// Append bytes to the output buffer (and the tee log, if any).
    pub fn put(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buf.extend_from_slice(bytes);
        if let Some(log) = &self.log {
            // The log is best-effort; a full disk must not stall output.
            let _ = (&*log).write_all(bytes);
        }
    }

    /// Bytes buffered and not yet flushed.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Drain the buffer without writing it (test inspection).
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Flush the buffer through the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.writer.write_all(&self.buf)?;
            self.bytes_written += self.buf.len() as u64;
            self.buf.clear();
        }
        self.writer.flush()
    }

    /// Best-effort synchronous write bypassing the buffer.
    ///
    /// Retries partial writes and would-block errors a few times with a
    /// short sleep, then gives up silently: by the time this path runs
    /// the terminal may already be gone.
    pub fn raw(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        for _ in 0..RAW_RETRIES {
            match self.writer.write(rest) {
                Ok(n) => {
                    self.bytes_written += n as u64;
                    rest = &rest[n..];
                    if rest.is_empty() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
            std::thread::sleep(RAW_RETRY_DELAY);
        }
        let _ = self.writer.flush();
    }

    /// Bytes flushed through the writer since the last reset.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn reset_counter(&mut self) {
        self.bytes_written = 0;
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

/// Path of the default debug log for this process.
#[must_use]
pub fn default_log_path() -> PathBuf {
    PathBuf::from(format!("muxout-out-{}.log", std::process::id()))
}

/// Open the default debug log: create + truncate, mode 0644,
/// close-on-exec. Open it once per process and clone the handle into
/// each terminal's sink.
pub fn open_default_log() -> io::Result<File> {
    open_log_at(&default_log_path())
}

/// Open a debug log at an explicit path (tests use a temp directory).
pub fn open_log_at(path: &std::path::Path) -> io::Result<File> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o644);
        opts.custom_flags(libc_o_cloexec());
    }
    opts.open(path)
}

#[cfg(unix)]
fn libc_o_cloexec() -> i32 {
    nix::fcntl::OFlag::O_CLOEXEC.bits()
}
