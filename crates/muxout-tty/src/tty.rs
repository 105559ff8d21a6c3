#![forbid(unsafe_code)]

//! The terminal instance: shadow state and lifecycle.
//!
//! A [`Tty`] owns one output sink and a shadow of the terminal's
//! observable state: cursor, scroll region, current cell attributes,
//! mode bits, cursor colour and style. Every emission consults the
//! shadow first so redundant bytes are never sent, and updates it so the
//! next emission can do the same.
//!
//! # Shadow sentinels
//!
//! Cursor and scroll region are `Option`: `None` means the terminal's
//! state is unknown (after startup, a resize, or a raw byte string) and
//! forces the next positioning to be absolute. A known cursor column may
//! equal `sx` (the pending-wrap column), which is distinct from unknown.
//!
//! # Lifecycle
//!
//! `init → open → start` brings a terminal up; `stop → close` tears it
//! down, restoring the saved line discipline and emitting the reset
//! sequence through the unbuffered raw path (the buffered path may not
//! be serviced again). `resize` re-queries the window size and resyncs
//! cursor and region.

use std::io::{self, Write};

use bitflags::bitflags;
use thiserror::Error;
use tracing::debug;

use muxout_term::{Cap, Param, TermCaps, TermError, TermFeatures};

use crate::cell::{Attrs, GridCell};
use crate::screen::Screen;
use crate::sink::OutputSink;

bitflags! {
    /// Terminal state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TtyFlags: u16 {
        const STARTED = 0x001;
        const OPENED = 0x002;
        /// The terminal accepts UTF-8 output.
        const UTF8 = 0x004;
        /// Suppress cursor visibility while drawing.
        const NOCURSOR = 0x008;
        /// Output is frozen; the dispatcher skips this client.
        const FREEZE = 0x010;
        const TIMER = 0x020;
        /// Focus reporting was enabled at start.
        const FOCUS = 0x040;
    }
}

bitflags! {
    /// Terminal mode bits mirrored from the application screen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mode: u16 {
        const CURSOR = 0x001;
        const BLINKING = 0x002;
        const KKEYPAD = 0x004;
        const BRACKETPASTE = 0x008;
        const MOUSE_STANDARD = 0x010;
        const MOUSE_BUTTON = 0x020;
        const MOUSE_ANY = 0x040;
        const MOUSE_SGR = 0x080;
        const FOCUSON = 0x100;

        const ALL_MOUSE = Self::MOUSE_STANDARD.bits()
            | Self::MOUSE_BUTTON.bits()
            | Self::MOUSE_ANY.bits();
    }
}

/// Errors surfaced by the lifecycle entry points.
#[derive(Debug, Error)]
pub enum TtyError {
    #[error("not a terminal")]
    NotATty,
    #[error(transparent)]
    Term(#[from] TermError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Live fd state for a terminal opened on a real tty.
#[cfg(unix)]
#[derive(Debug)]
struct TtyIo {
    file: std::fs::File,
    saved: Option<nix::sys::termios::Termios>,
}

#[cfg(not(unix))]
#[derive(Debug)]
struct TtyIo {}

/// One terminal: shadow state, capability table and output sink.
#[derive(Debug)]
pub struct Tty<W: Write> {
    name: String,
    pub term: TermCaps,
    /// User-asserted feature overrides, OR'd with the entry's own.
    pub term_features: TermFeatures,
    pub(crate) sink: OutputSink<W>,
    io: Option<TtyIo>,

    pub(crate) sx: u16,
    pub(crate) sy: u16,
    pub(crate) cursor: Option<(u16, u16)>,
    pub(crate) region: Option<(u16, u16)>,
    /// Attributes the terminal is currently decorating output with.
    pub(crate) cell: GridCell,
    pub(crate) mode: Mode,
    ccolour: String,
    cstyle: u16,
    pub(crate) flags: TtyFlags,
    /// Enable focus reporting at start when the terminal supports it.
    focus_cfg: bool,
}

impl<W: Write> Tty<W> {
    /// A terminal over an arbitrary writer with a resolved capability
    /// table, already opened and started. This is how tests (and any
    /// embedder with its own fd handling) drive the engine.
    #[must_use]
    pub fn headless(writer: W, term: TermCaps, sx: u16, sy: u16) -> Self {
        Self {
            name: term.name().to_string(),
            term,
            term_features: TermFeatures::empty(),
            sink: OutputSink::new(writer),
            io: None,
            sx,
            sy,
            cursor: None,
            region: None,
            cell: GridCell::DEFAULT,
            mode: Mode::CURSOR,
            ccolour: String::new(),
            cstyle: 0,
            flags: TtyFlags::STARTED | TtyFlags::OPENED,
            focus_cfg: false,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        (self.sx, self.sy)
    }

    #[must_use]
    pub fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }

    #[must_use]
    pub fn scroll_region(&self) -> Option<(u16, u16)> {
        self.region
    }

    #[must_use]
    pub fn shadow_cell(&self) -> &GridCell {
        &self.cell
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn flags(&self) -> TtyFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: TtyFlags) {
        self.flags |= flags;
    }

    pub fn clear_flags(&mut self, flags: TtyFlags) {
        self.flags -= flags;
    }

    /// Assert features the terminfo entry does not declare (force-256
    /// and friends).
    pub fn assert_features(&mut self, features: TermFeatures) {
        self.term_features |= features;
    }

    /// Entry features plus user-asserted overrides.
    #[must_use]
    pub fn features(&self) -> TermFeatures {
        self.term.features() | self.term_features
    }

    pub fn set_focus_events(&mut self, enable: bool) {
        self.focus_cfg = enable;
    }

    /// Attach a tee log to the sink (see [`crate::sink::open_default_log`]).
    pub fn set_log(&mut self, log: std::fs::File) {
        self.sink.set_log(log);
    }

    /// Drain buffered output without flushing it (test inspection).
    pub fn take_output(&mut self) -> Vec<u8> {
        self.sink.take_buffer()
    }

    /// Flush buffered output through the writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.sink.into_inner()
    }

    /// ACS is usable when the terminal declares a map and output is not
    /// UTF-8 (the two charset models do not mix).
    #[must_use]
    pub fn use_acs(&self) -> bool {
        self.term.has(Cap::Acsc) && !self.flags.contains(TtyFlags::UTF8)
    }

    // ── Low-level emission ─────────────────────────────────────────────

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.sink.put(bytes);
    }

    pub(crate) fn puts(&mut self, s: &str) {
        self.sink.put(s.as_bytes());
    }

    pub(crate) fn putcode(&mut self, cap: Cap) {
        if let Some(bytes) = self.term.expand(cap, &[]) {
            self.sink.put(&bytes);
        }
    }

    pub(crate) fn putcode1(&mut self, cap: Cap, a: i32) {
        if a < 0 {
            return;
        }
        if let Some(bytes) = self.term.expand(cap, &[Param::Num(i64::from(a))]) {
            self.sink.put(&bytes);
        }
    }

    pub(crate) fn putcode2(&mut self, cap: Cap, a: i32, b: i32) {
        if a < 0 || b < 0 {
            return;
        }
        if let Some(bytes) =
            self.term
                .expand(cap, &[Param::Num(i64::from(a)), Param::Num(i64::from(b))])
        {
            self.sink.put(&bytes);
        }
    }

    fn rawcode(&mut self, cap: Cap) {
        if let Some(bytes) = self.term.expand(cap, &[]) {
            self.sink.raw(&bytes);
        }
    }

    fn rawcode2(&mut self, cap: Cap, a: i32, b: i32) {
        if a < 0 || b < 0 {
            return;
        }
        if let Some(bytes) =
            self.term
                .expand(cap, &[Param::Num(i64::from(a)), Param::Num(i64::from(b))])
        {
            self.sink.raw(&bytes);
        }
    }

    /// Write one byte with ACS translation and shadow column accounting.
    pub(crate) fn putc(&mut self, ch: u8) {
        if self.cell.attr.contains(Attrs::CHARSET) {
            match acs_to_utf8(ch) {
                Some(s) if !self.use_acs() => self.sink.put(s.as_bytes()),
                _ => self.sink.put(&[ch]),
            }
        } else {
            self.sink.put(&[ch]);
        }

        if ch >= 0x20 && ch != 0x7f {
            if let Some((cx, cy)) = self.cursor {
                let mut sx = self.sx;
                if self.features().contains(TermFeatures::EARLYWRAP) {
                    sx = sx.saturating_sub(1);
                }
                if cx >= sx {
                    // Pending wrap resolved: the terminal moved to the
                    // next row (staying put at the scroll margin or the
                    // screen bottom) before printing.
                    let at_margin = match self.region {
                        Some((_, lower)) => cy == lower,
                        None => cy + 1 >= self.sy,
                    };
                    let ny = if at_margin {
                        cy
                    } else {
                        (cy + 1).min(self.sy.saturating_sub(1))
                    };
                    self.cursor = Some((1, ny));
                } else {
                    self.cursor = Some((cx + 1, cy));
                }
            }
        }
    }

    /// Write pre-encoded bytes covering `width` columns.
    pub(crate) fn putn(&mut self, bytes: &[u8], width: u16) {
        self.sink.put(bytes);
        if let Some((cx, cy)) = self.cursor {
            self.cursor = Some((cx.saturating_add(width), cy));
        }
    }

    // ── Cursor movement ────────────────────────────────────────────────

    /// Move the terminal cursor to `(cx, cy)` with the cheapest sequence
    /// the capability table allows, and update the shadow.
    pub fn cursor_to(&mut self, cx: u16, cy: u16) {
        let cx = cx.min(self.sx.saturating_sub(1));

        let Some((thisx, thisy)) = self.cursor else {
            self.putcode2(Cap::Cup, i32::from(cy), i32::from(cx));
            self.cursor = Some((cx, cy));
            return;
        };

        if (cx, cy) == (thisx, thisy) {
            return;
        }

        // At or past the last column the terminal's wrap flag is
        // ambiguous; only absolute movement is safe.
        if thisx >= self.sx {
            self.putcode2(Cap::Cup, i32::from(cy), i32::from(cx));
            self.cursor = Some((cx, cy));
            return;
        }

        if cx == 0 && cy == 0 && self.term.has(Cap::Home) {
            self.putcode(Cap::Home);
            self.cursor = Some((0, 0));
            return;
        }

        // Start of the next row: CR + LF, unless a line feed would
        // scroll the region.
        let at_rlower = self.region.is_some_and(|(_, lower)| thisy == lower);
        if cx == 0 && cy == thisy + 1 && !at_rlower {
            self.put_bytes(b"\r\n");
            self.cursor = Some((cx, cy));
            return;
        }

        if cy == thisy {
            if self.move_column(cx, thisx) {
                self.cursor = Some((cx, cy));
                return;
            }
        } else if cx == thisx && self.move_row(cy, thisy) {
            self.cursor = Some((cx, cy));
            return;
        }

        self.putcode2(Cap::Cup, i32::from(cy), i32::from(cx));
        self.cursor = Some((cx, cy));
    }

    /// Same-row movement. Returns false when only absolute movement fits.
    fn move_column(&mut self, cx: u16, thisx: u16) -> bool {
        if cx == 0 {
            self.put_bytes(b"\r");
            return true;
        }
        if cx + 1 == thisx && self.term.has(Cap::Cub1) {
            self.putcode(Cap::Cub1);
            return true;
        }
        if cx == thisx + 1 && self.term.has(Cap::Cuf1) {
            self.putcode(Cap::Cuf1);
            return true;
        }

        // Positive moves right.
        let dx = i32::from(cx) - i32::from(thisx);

        if dx.unsigned_abs() > u32::from(cx) && self.term.has(Cap::Hpa) {
            self.putcode1(Cap::Hpa, i32::from(cx));
            true
        } else if dx < 0 && self.term.has(Cap::Cub) {
            if dx == -2 && self.term.has(Cap::Cub1) {
                self.putcode(Cap::Cub1);
                self.putcode(Cap::Cub1);
            } else {
                self.putcode1(Cap::Cub, -dx);
            }
            true
        } else if dx > 0 && self.term.has(Cap::Cuf) {
            self.putcode1(Cap::Cuf, dx);
            true
        } else {
            false
        }
    }

    /// Same-column movement. Returns false when only absolute movement
    /// fits.
    fn move_row(&mut self, cy: u16, thisy: u16) -> bool {
        let (rupper, rlower) = match self.region {
            Some(r) => (Some(r.0), Some(r.1)),
            None => (None, None),
        };

        if Some(thisy) != rupper && cy + 1 == thisy && self.term.has(Cap::Cuu1) {
            self.putcode(Cap::Cuu1);
            return true;
        }
        if Some(thisy) != rlower && cy == thisy + 1 && self.term.has(Cap::Cud1) {
            self.putcode(Cap::Cud1);
            return true;
        }

        // Positive moves down.
        let dy = i32::from(cy) - i32::from(thisy);

        // CUU/CUD stop at the scroll margins, so a move that would cross
        // them (or where VPA is simply shorter) must be addressed
        // absolutely by row.
        let crosses = match self.region {
            Some((upper, lower)) => (dy < 0 && cy < upper) || (dy > 0 && cy > lower),
            None => false,
        };
        if dy.unsigned_abs() > u32::from(cy) || crosses {
            if self.term.has(Cap::Vpa) {
                self.putcode1(Cap::Vpa, i32::from(cy));
                return true;
            }
        } else if dy < 0 && self.term.has(Cap::Cuu) {
            self.putcode1(Cap::Cuu, -dy);
            return true;
        } else if dy > 0 && self.term.has(Cap::Cud) {
            self.putcode1(Cap::Cud, dy);
            return true;
        }
        false
    }

    // ── Scroll region ──────────────────────────────────────────────────

    /// Program the scroll region when it differs from the shadow. CSR
    /// reparks the cursor, so this ends with an explicit move to the
    /// origin.
    pub fn region_set(&mut self, rupper: u16, rlower: u16) {
        if self.region == Some((rupper, rlower)) {
            return;
        }
        if !self.term.has(Cap::Csr) {
            return;
        }
        self.region = Some((rupper, rlower));

        // Terminals that do not clear their wrap flag on CSR (PuTTY)
        // need the cursor off the edge column first.
        if let Some((cx, cy)) = self.cursor {
            if cx >= self.sx {
                self.cursor_to(0, cy);
            }
        }

        self.putcode2(Cap::Csr, i32::from(rupper), i32::from(rlower));
        self.cursor_to(0, 0);
    }

    // ── Attribute reset ────────────────────────────────────────────────

    /// Drop the terminal back to the default cell. SGR0 is the only
    /// portable attribute-erasure primitive.
    pub fn reset(&mut self) {
        if self.cell.style_is_default() {
            return;
        }
        if self.cell.attr.contains(Attrs::CHARSET) && self.use_acs() {
            self.putcode(Cap::Rmacs);
        }
        self.putcode(Cap::Sgr0);
        self.cell = GridCell::DEFAULT;
    }

    // ── Modes, title, cursor colour ────────────────────────────────────

    /// Reconcile terminal modes with `mode`, syncing cursor colour and
    /// style from the screen when given.
    pub fn update_mode(&mut self, mode: Mode, screen: Option<&Screen>) {
        let mut mode = mode;

        if let Some(s) = screen {
            if s.ccolour != self.ccolour {
                let ccolour = s.ccolour.clone();
                self.force_cursor_colour(&ccolour);
            }
        }

        if self.flags.contains(TtyFlags::NOCURSOR) {
            mode -= Mode::CURSOR;
        }

        let mut changed = mode ^ self.mode;
        if changed.contains(Mode::BLINKING) {
            if mode.contains(Mode::BLINKING) && self.term.has(Cap::Cvvis) {
                self.putcode(Cap::Cvvis);
            } else {
                self.putcode(Cap::Cnorm);
            }
            changed |= Mode::CURSOR;
        }
        if changed.contains(Mode::CURSOR) {
            if mode.contains(Mode::CURSOR) {
                self.putcode(Cap::Cnorm);
            } else {
                self.putcode(Cap::Civis);
            }
        }

        if let Some(s) = screen {
            if self.cstyle != s.cstyle && self.term.has(Cap::Ss) {
                if s.cstyle == 0 && self.term.has(Cap::Se) {
                    self.putcode(Cap::Se);
                } else {
                    self.putcode1(Cap::Ss, i32::from(s.cstyle));
                }
                self.cstyle = s.cstyle;
            }
        }

        if changed.intersects(Mode::ALL_MOUSE) {
            if mode.intersects(Mode::ALL_MOUSE) {
                // SGR (1006) first: on terminals where the last enable
                // wins it is the decoder we want.
                self.puts("\x1b[?1006h");
                if mode.contains(Mode::MOUSE_ANY) {
                    self.puts("\x1b[?1003h");
                } else if mode.contains(Mode::MOUSE_BUTTON) {
                    self.puts("\x1b[?1002h");
                } else if mode.contains(Mode::MOUSE_STANDARD) {
                    self.puts("\x1b[?1000h");
                }
            } else {
                if self.mode.contains(Mode::MOUSE_ANY) {
                    self.puts("\x1b[?1003l");
                } else if self.mode.contains(Mode::MOUSE_BUTTON) {
                    self.puts("\x1b[?1002l");
                } else if self.mode.contains(Mode::MOUSE_STANDARD) {
                    self.puts("\x1b[?1000l");
                }
                self.puts("\x1b[?1006l");
            }
        }

        if changed.contains(Mode::KKEYPAD) {
            if mode.contains(Mode::KKEYPAD) {
                self.putcode(Cap::Smkx);
            } else {
                self.putcode(Cap::Rmkx);
            }
        }
        if changed.contains(Mode::BRACKETPASTE) {
            if mode.contains(Mode::BRACKETPASTE) {
                self.puts("\x1b[?2004h");
            } else {
                self.puts("\x1b[?2004l");
            }
        }
        if changed.contains(Mode::FOCUSON) && self.term.flag(Cap::Xt) {
            if mode.contains(Mode::FOCUSON) {
                self.puts("\x1b[?1004h");
            } else {
                self.puts("\x1b[?1004l");
            }
        }

        self.mode = mode;
    }

    /// Set the terminal title through the status line caps; a terminal
    /// without both is left alone.
    pub fn set_title(&mut self, title: &str) {
        if !self.term.has(Cap::Tsl) || !self.term.has(Cap::Fsl) {
            return;
        }
        self.putcode(Cap::Tsl);
        self.puts(title);
        self.putcode(Cap::Fsl);
    }

    /// Set or reset the cursor colour, updating the shadow.
    pub fn force_cursor_colour(&mut self, colour: &str) {
        if colour.is_empty() {
            self.putcode(Cap::Cr);
        } else if let Some(bytes) = self.term.expand(Cap::Cs, &[Param::Str(colour)]) {
            self.sink.put(&bytes);
        }
        self.ccolour = colour.to_string();
    }

    #[must_use]
    pub fn cursor_colour(&self) -> &str {
        &self.ccolour
    }

    #[must_use]
    pub fn cursor_style(&self) -> u16 {
        self.cstyle
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Resolve the capability table for the stored terminal name and
    /// start the terminal. On failure the terminal is closed and the
    /// error is surfaced for the caller to decide.
    pub fn open(&mut self) -> Result<(), TtyError> {
        let term = match TermCaps::find(&self.name).and_then(|t| {
            t.validate()?;
            Ok(t)
        }) {
            Ok(term) => term,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };
        debug!(name = %self.name, "terminal opened");
        self.term = term;
        self.flags |= TtyFlags::OPENED;
        self.flags -= TtyFlags::NOCURSOR | TtyFlags::FREEZE | TtyFlags::TIMER;

        // The read-side key consumer is installed by the caller; input
        // decoding is not this subsystem's concern.
        self.start();
        Ok(())
    }

    /// Emit the startup sequence and mark the terminal started.
    pub fn start(&mut self) {
        #[cfg(unix)]
        self.save_termios();

        self.putcode(Cap::Smcup);

        self.putcode(Cap::Sgr0);
        self.cell = GridCell::DEFAULT;

        self.putcode(Cap::Rmkx);
        if self.use_acs() {
            self.putcode(Cap::Enacs);
        }
        self.putcode(Cap::Clear);

        self.putcode(Cap::Cnorm);
        if self.term.has(Cap::Kmous) {
            self.puts("\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1006l\x1b[?1005l");
        }

        if self.term.flag(Cap::Xt) && self.focus_cfg {
            self.flags |= TtyFlags::FOCUS;
            self.puts("\x1b[?1004h");
        }

        self.cursor = None;
        self.region = None;

        self.mode = Mode::CURSOR;
        self.flags |= TtyFlags::STARTED;

        self.force_cursor_colour("");
        debug!(name = %self.name, sx = self.sx, sy = self.sy, "terminal started");
    }

    /// Tear the terminal down: restore the line discipline and emit the
    /// reset sequence through the raw path.
    pub fn stop(&mut self) {
        if !self.flags.contains(TtyFlags::STARTED) {
            return;
        }
        self.flags -= TtyFlags::STARTED;
        debug!(name = %self.name, "terminal stopping");

        let mut rows = self.sy;

        // Be flexible about errors here: a dead fd (ssh -t gone away)
        // must not take the server with it.
        #[cfg(unix)]
        if self.io.is_some() {
            match self.query_winsize() {
                Some((_, ws_rows)) => rows = ws_rows,
                None => return,
            }
            if !self.restore_termios() {
                return;
            }
        }

        self.rawcode2(Cap::Csr, 0, i32::from(rows.saturating_sub(1)));
        if self.use_acs() {
            self.rawcode(Cap::Rmacs);
        }
        self.rawcode(Cap::Sgr0);
        self.rawcode(Cap::Rmkx);
        self.rawcode(Cap::Clear);
        if self.term.has(Cap::Ss) && self.cstyle != 0 {
            if self.term.has(Cap::Se) {
                self.rawcode(Cap::Se);
            } else if let Some(bytes) = self.term.expand(Cap::Ss, &[Param::Num(0)]) {
                self.sink.raw(&bytes);
            }
        }
        if self.mode.contains(Mode::BRACKETPASTE) {
            self.sink.raw(b"\x1b[?2004l");
        }
        self.rawcode(Cap::Cr);

        self.rawcode(Cap::Cnorm);
        if self.term.has(Cap::Kmous) {
            self.sink
                .raw(b"\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1006l\x1b[?1005l");
        }

        if self.term.flag(Cap::Xt) && self.flags.contains(TtyFlags::FOCUS) {
            self.flags -= TtyFlags::FOCUS;
            self.sink.raw(b"\x1b[?1004l");
        }

        self.rawcode(Cap::Rmcup);

        #[cfg(unix)]
        self.set_blocking(true);
    }

    /// Stop and release the fd.
    pub fn close(&mut self) {
        self.stop();
        self.flags -= TtyFlags::OPENED;
        self.io = None;
    }

    /// Adopt a new size; returns whether it changed.
    pub fn set_size(&mut self, sx: u16, sy: u16) -> bool {
        if sx == self.sx && sy == self.sy {
            return false;
        }
        self.sx = sx;
        self.sy = sy;
        true
    }

    /// Resize to an explicit size, resyncing cursor and region if the
    /// terminal is started.
    pub fn resize_to(&mut self, sx: u16, sy: u16) -> bool {
        if !self.set_size(sx, sy) {
            return false;
        }
        self.cursor = None;
        self.region = None;

        // The terminal may have moved the cursor and reset the region
        // itself; resync explicitly.
        if self.flags.contains(TtyFlags::STARTED) {
            self.cursor_to(0, 0);
            self.region_set(0, self.sy.saturating_sub(1));
        }
        debug!(sx, sy, "terminal resized");
        true
    }

    /// Re-query the window size from the fd (80×24 when unavailable).
    pub fn resize(&mut self) -> bool {
        #[cfg(unix)]
        let (sx, sy) = match self.query_winsize() {
            Some((cols, rows)) => (cols, rows),
            None => (80, 24),
        };
        #[cfg(not(unix))]
        let (sx, sy) = (80, 24);

        self.resize_to(sx, sy)
    }

    // ── Unix fd plumbing ───────────────────────────────────────────────

    #[cfg(unix)]
    fn query_winsize(&self) -> Option<(u16, u16)> {
        let io = self.io.as_ref()?;
        let ws = rustix::termios::tcgetwinsize(&io.file).ok()?;
        let cols = if ws.ws_col == 0 { 80 } else { ws.ws_col };
        let rows = if ws.ws_row == 0 { 24 } else { ws.ws_row };
        Some((cols, rows))
    }

    /// Save the line discipline and switch to a raw-ish one: no flow
    /// control, no echo, no output post-processing, byte-at-a-time reads.
    #[cfg(unix)]
    fn save_termios(&mut self) {
        use nix::sys::termios::{
            InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, tcgetattr,
            tcsetattr,
        };

        let Some(io) = self.io.as_mut() else { return };
        let Ok(orig) = tcgetattr(&io.file) else { return };

        let mut tio = orig.clone();
        tio.input_flags -= InputFlags::IXON
            | InputFlags::IXOFF
            | InputFlags::ICRNL
            | InputFlags::INLCR
            | InputFlags::IGNCR
            | InputFlags::IMAXBEL
            | InputFlags::ISTRIP;
        tio.input_flags |= InputFlags::IGNBRK;
        tio.output_flags -= OutputFlags::OPOST
            | OutputFlags::ONLCR
            | OutputFlags::OCRNL
            | OutputFlags::ONLRET;
        tio.local_flags -= LocalFlags::IEXTEN
            | LocalFlags::ICANON
            | LocalFlags::ECHO
            | LocalFlags::ECHOE
            | LocalFlags::ECHONL
            | LocalFlags::ECHOCTL
            | LocalFlags::ECHOPRT
            | LocalFlags::ECHOKE
            | LocalFlags::ISIG;
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        if tcsetattr(&io.file, SetArg::TCSANOW, &tio).is_ok() {
            let _ = nix::sys::termios::tcflush(&io.file, nix::sys::termios::FlushArg::TCIOFLUSH);
            io.saved = Some(orig);
        }

        self.set_blocking(false);
    }

    #[cfg(unix)]
    fn restore_termios(&mut self) -> bool {
        use nix::sys::termios::{SetArg, tcsetattr};

        let Some(io) = self.io.as_mut() else {
            return true;
        };
        match io.saved.take() {
            Some(saved) => tcsetattr(&io.file, SetArg::TCSANOW, &saved).is_ok(),
            None => true,
        }
    }

    #[cfg(unix)]
    fn set_blocking(&mut self, blocking: bool) {
        use nix::fcntl::{FcntlArg, OFlag, fcntl};
        use std::os::fd::AsRawFd;

        let Some(io) = self.io.as_ref() else { return };
        let Ok(bits) = fcntl(io.file.as_raw_fd(), FcntlArg::F_GETFL) else {
            return;
        };
        let mut flags = OFlag::from_bits_truncate(bits);
        if blocking {
            flags -= OFlag::O_NONBLOCK;
        } else {
            flags |= OFlag::O_NONBLOCK;
        }
        let _ = fcntl(io.file.as_raw_fd(), FcntlArg::F_SETFL(flags));
    }
}

#[cfg(unix)]
impl Tty<std::fs::File> {
    /// Bind a terminal to an fd. Fails with [`TtyError::NotATty`] when
    /// the fd is not a terminal. The capability table is resolved later
    /// by [`open`](Tty::open).
    pub fn init(file: std::fs::File, termname: &str) -> Result<Self, TtyError> {
        if !rustix::termios::isatty(&file) {
            return Err(TtyError::NotATty);
        }
        let io_file = file.try_clone()?;
        let name = if termname.is_empty() { "unknown" } else { termname };

        Ok(Self {
            name: name.to_string(),
            term: TermCaps::empty(name),
            term_features: TermFeatures::empty(),
            sink: OutputSink::new(file),
            io: Some(TtyIo {
                file: io_file,
                saved: None,
            }),
            sx: 80,
            sy: 24,
            cursor: None,
            region: None,
            cell: GridCell::DEFAULT,
            mode: Mode::empty(),
            ccolour: String::new(),
            cstyle: 0,
            flags: TtyFlags::empty(),
            focus_cfg: false,
        })
    }
}

/// UTF-8 renditions of the VT100 alternate character set, for terminals
/// where real ACS is unusable (UTF-8 output mode).
fn acs_to_utf8(ch: u8) -> Option<&'static str> {
    Some(match ch {
        b'+' => "\u{2192}",
        b',' => "\u{2190}",
        b'-' => "\u{2191}",
        b'.' => "\u{2193}",
        b'0' => "\u{25ae}",
        b'`' => "\u{25c6}",
        b'a' => "\u{2592}",
        b'f' => "\u{00b0}",
        b'g' => "\u{00b1}",
        b'h' => "\u{2592}",
        b'i' => "\u{2603}",
        b'j' => "\u{2518}",
        b'k' => "\u{2510}",
        b'l' => "\u{250c}",
        b'm' => "\u{2514}",
        b'n' => "\u{253c}",
        b'o' => "\u{23ba}",
        b'p' => "\u{23bb}",
        b'q' => "\u{2500}",
        b'r' => "\u{23bc}",
        b's' => "\u{23bd}",
        b't' => "\u{251c}",
        b'u' => "\u{2524}",
        b'v' => "\u{2534}",
        b'w' => "\u{252c}",
        b'x' => "\u{2502}",
        b'y' => "\u{2264}",
        b'z' => "\u{2265}",
        b'{' => "\u{03c0}",
        b'|' => "\u{2260}",
        b'}' => "\u{00a3}",
        b'~' => "\u{00b7}",
        _ => return None,
    })
}
