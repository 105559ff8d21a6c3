#![forbid(unsafe_code)]

//! SIGWINCH delivery for the resize path.
//!
//! A dedicated signal thread forwards window-size changes into a bounded
//! channel; the event loop polls [`ResizeWatcher::pending`] and calls
//! [`crate::tty::Tty::resize`] when it fires. The channel holds a single
//! notification: the authoritative size comes from the ioctl at resize
//! time, so coalescing storms loses nothing.

use std::io;
use std::sync::mpsc;

use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::Signals;

/// Owns the SIGWINCH handler thread for the process.
#[derive(Debug)]
pub struct ResizeWatcher {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
    rx: mpsc::Receiver<()>,
}

impl ResizeWatcher {
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut signals = Signals::new([SIGWINCH]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                let _ = tx.try_send(());
            }
        });

        Ok(Self {
            handle,
            thread: Some(thread),
            rx,
        })
    }

    /// Whether a size change arrived since the last check.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
