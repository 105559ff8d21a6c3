#![forbid(unsafe_code)]

//! Cell emission and line painting.
//!
//! One styled cell at a time: attributes first, then content, with the
//! shadow cursor advanced to match what the terminal did. Whole lines
//! are painted cell by cell, preserving natural wrap from the previous
//! row where the terminal will land the cursor by itself.

use std::io::Write;

use muxout_term::{Cap, TermFeatures};

use crate::cell::{Attrs, GridCell};
use crate::commands::TtyCtx;
use crate::screen::{Pane, PaneFlags, Screen};
use crate::tty::{Tty, TtyFlags};

impl<W: Write> Tty<W> {
    /// Emit one styled cell at the current cursor position.
    pub fn put_cell(&mut self, gc: &GridCell, pane: Option<&Pane>) {
        // An early-wrap terminal scrolls if anything lands in the very
        // last cell; leave it blank.
        if self.features().contains(TermFeatures::EARLYWRAP) {
            if let Some((cx, cy)) = self.cursor {
                if cy == self.sy - 1 && cx == self.sx - 1 {
                    return;
                }
            }
        }

        // Wide-character continuation; the lead cell covered it.
        if gc.is_padding() {
            return;
        }

        self.attributes(gc, pane);

        // ASCII goes through putc for ACS translation.
        if gc.ch.is_ascii() {
            let b = gc.ch as u8;
            if b < 0x20 || b == 0x7f {
                return;
            }
            self.putc(b);
            return;
        }

        // Without UTF-8 the terminal cannot show this; keep the columns
        // honest with placeholders.
        if !self.flags.contains(TtyFlags::UTF8) {
            for _ in 0..gc.width {
                self.putc(b'_');
            }
            return;
        }

        let mut buf = [0u8; 4];
        let encoded = gc.ch.encode_utf8(&mut buf);
        let len = encoded.len();
        self.putn(&buf[..len], u16::from(gc.width));
    }

    /// Paint row `py` of `screen` at offset `(ox, oy)` in the terminal.
    pub fn draw_line(&mut self, pane: Option<&Pane>, screen: &Screen, py: u16, ox: u16, oy: u16) {
        let nocursor = self.flags & TtyFlags::NOCURSOR;
        self.flags |= TtyFlags::NOCURSOR;
        let mode = self.mode;
        self.update_mode(mode, Some(screen));

        let mut sx = screen.sx();
        sx = sx.min(screen.cellsize(py));
        sx = sx.min(self.sx);

        // Don't move the cursor to the start position if it will wrap
        // there itself.
        let prev_wrapped = py > 0 && screen.line(py - 1).is_some_and(|l| l.wrapped);
        let cursor_wraps_here = oy + py != 0
            && prev_wrapped
            && self.cursor.is_some_and(|(cx, _)| cx >= self.sx)
            && ox == 0
            && self.cursor.is_some_and(|(_, cy)| {
                oy + py == cy + 1 || cy == screen.rlower + oy
            });
        if !cursor_wraps_here {
            self.cursor_to(ox, oy + py);
        }

        for i in 0..sx {
            let gc = screen.cell(i, py);
            if gc.attr.contains(Attrs::SELECTED) {
                let sel = screen.select_cell(&gc);
                self.put_cell(&sel, pane);
            } else {
                self.put_cell(&gc, pane);
            }
        }

        if sx < self.sx {
            self.attributes(&GridCell::DEFAULT, pane);

            self.cursor_to(ox + sx, oy + py);
            if sx != screen.sx()
                && ox + screen.sx() >= self.sx
                && self.term.has(Cap::El)
                && !self.fake_bce(pane)
            {
                self.putcode(Cap::El);
            } else {
                self.repeat_space(screen.sx() - sx);
            }
        }

        self.flags = (self.flags - TtyFlags::NOCURSOR) | nocursor;
        let mode = self.mode;
        self.update_mode(mode, Some(screen));
    }

    /// Paint one row of a pane's screen.
    pub fn draw_pane(&mut self, pane: &Pane, py: u16, ox: u16, oy: u16) {
        self.draw_line(Some(pane), &pane.screen, py, ox, oy);
    }

    /// Is the affected region big enough that one deferred full redraw
    /// beats redrawing it now, probably several times? Currently: more
    /// than half the pane.
    pub(crate) fn large_region(&self, ctx: &TtyCtx<'_>) -> bool {
        ctx.orlower - ctx.orupper >= ctx.pane.screen.sy() / 2
    }

    /// Redraw the scroll region from the (already updated) screen. Used
    /// when CSR is unsupported or the pane is not full width.
    pub(crate) fn redraw_region(&mut self, ctx: &TtyCtx<'_>) {
        if self.large_region(ctx) {
            ctx.pane.mark(PaneFlags::REDRAW);
            return;
        }

        if ctx.ocy < ctx.orupper || ctx.ocy > ctx.orlower {
            for i in ctx.ocy..ctx.pane.screen.sy() {
                self.draw_pane(ctx.pane, i, ctx.xoff, ctx.yoff);
            }
        } else {
            for i in ctx.orupper..=ctx.orlower {
                self.draw_pane(ctx.pane, i, ctx.xoff, ctx.yoff);
            }
        }
    }

    /// Prefer the parameterized capability; otherwise repeat the
    /// single-step one.
    pub(crate) fn emulate_repeat(&mut self, code: Cap, code1: Cap, n: u16) {
        if self.term.has(code) {
            self.putcode1(code, i32::from(n));
        } else {
            for _ in 0..n {
                self.putcode(code1);
            }
        }
    }

    pub(crate) fn repeat_space(&mut self, n: u16) {
        for _ in 0..n {
            self.putc(b' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use muxout_term::TermCaps;

    use crate::colour::Colour;
    use crate::screen::Window;

    fn tty() -> Tty<Vec<u8>> {
        let mut t = Tty::headless(Vec::new(), TermCaps::xterm_256color(), 80, 24);
        t.set_flags(TtyFlags::UTF8);
        t
    }

    fn pane(sx: u16, sy: u16) -> Pane {
        Pane::new(1, Rc::new(Window::new(1)), sx, sy)
    }

    fn out(t: &mut Tty<Vec<u8>>) -> Vec<u8> {
        t.take_output()
    }

    #[test]
    fn plain_cell_with_default_style_is_one_byte() {
        let mut t = tty();
        t.cursor_to(0, 0);
        out(&mut t);
        t.put_cell(&GridCell::from_char('a'), None);
        assert_eq!(out(&mut t), b"a");
        assert_eq!(t.cursor(), Some((1, 0)));
    }

    #[test]
    fn wide_cell_advances_two_columns() {
        let mut t = tty();
        t.cursor_to(0, 0);
        out(&mut t);
        t.put_cell(&GridCell::from_char('中'), None);
        assert_eq!(out(&mut t), "中".as_bytes());
        assert_eq!(t.cursor(), Some((2, 0)));
    }

    #[test]
    fn wide_cell_without_utf8_paints_placeholders() {
        let mut t = Tty::headless(Vec::new(), TermCaps::xterm_256color(), 80, 24);
        t.cursor_to(0, 0);
        out(&mut t);
        t.put_cell(&GridCell::from_char('中'), None);
        assert_eq!(out(&mut t), b"__");
        assert_eq!(t.cursor(), Some((2, 0)));
    }

    #[test]
    fn padding_cells_are_skipped() {
        let mut t = tty();
        t.cursor_to(0, 0);
        out(&mut t);
        t.put_cell(&GridCell::padding(), None);
        assert_eq!(out(&mut t), b"");
        assert_eq!(t.cursor(), Some((0, 0)));
    }

    #[test]
    fn control_cells_are_skipped() {
        let mut t = tty();
        t.cursor_to(0, 0);
        out(&mut t);
        t.put_cell(&GridCell::from_char('\x07'), None);
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn early_wrap_terminal_skips_the_last_cell() {
        let mut t = tty();
        t.term.set_flag(muxout_term::Cap::Xenl, false);
        t.assert_features(TermFeatures::EARLYWRAP);
        t.cursor_to(79, 23);
        out(&mut t);
        t.put_cell(&GridCell::from_char('x'), None);
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn draw_line_emits_row_content() {
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.put_str(0, 3, "hello");
        t.draw_pane(&p, 3, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("hello"), "got {s:?}");
        // Only the populated cells are painted on a full-width pane.
        assert!(!s.contains("hello "), "trailing fill painted: {s:?}");
    }

    #[test]
    fn draw_line_fills_tail_for_narrow_pane_with_spaces() {
        // Pane of 10 columns inside an 80 column terminal: the pane does
        // not reach the right edge, so EL would erase too much.
        let mut t = tty();
        let mut p = pane(10, 24);
        p.screen.put_str(0, 0, "ab");
        t.draw_pane(&p, 0, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("ab        "), "tail not space-filled: {s:?}");
        assert!(!s.contains("\x1b[K"), "EL unsafe here: {s:?}");
    }

    #[test]
    fn draw_line_uses_el_when_pane_reaches_right_edge() {
        // 80-column pane, only 2 cells populated: the effective width is
        // the cellsize, and the tail may be erased with EL.
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.put_str(0, 0, "ab");
        t.draw_pane(&p, 0, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("ab\x1b[K"), "got {s:?}");
    }

    #[test]
    fn draw_line_space_fills_on_fake_bce() {
        let mut t = Tty::headless(Vec::new(), TermCaps::screen(), 80, 24);
        let mut p = pane(80, 24);
        p.style = GridCell::DEFAULT.with_bg(Colour::Base(4));
        p.screen.put_str(0, 0, "ab");
        t.draw_pane(&p, 0, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(!s.contains("\x1b[K"), "EL with wrong bg colour: {s:?}");
    }

    #[test]
    fn draw_line_skips_cursor_move_after_natural_wrap() {
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.put_str(0, 0, "x");
        p.screen.set_wrapped(0, true);
        p.screen.put_str(0, 1, "y");

        // Simulate having just written through the last column of row 0.
        t.cursor_to(0, 0);
        out(&mut t);
        t.region_set(0, 23);
        t.cursor_to(79, 0);
        out(&mut t);
        t.putc(b'q');
        assert_eq!(t.cursor(), Some((80, 0)));
        out(&mut t);

        t.draw_pane(&p, 1, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        // No cursor positioning before the row content: the terminal
        // wraps there on its own.
        assert!(
            !s.contains("\x1b[2;1H") && !s.contains("\x1b[1G"),
            "cursor move emitted despite wrap: {s:?}"
        );
        assert!(s.contains('y'));
    }

    #[test]
    fn draw_line_moves_cursor_without_wrap_flag() {
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.put_str(0, 1, "y");

        t.region_set(0, 23);
        t.cursor_to(79, 0);
        out(&mut t);
        t.putc(b'q');
        out(&mut t);

        t.draw_pane(&p, 1, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("\x1b[2;1H"), "expected absolute move: {s:?}");
    }

    #[test]
    fn selected_cells_take_the_selection_style() {
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.set_selection_style(Some(
            GridCell::DEFAULT.with_attr(Attrs::REVERSE),
        ));
        let gc = GridCell::from_char('s').with_attr(Attrs::SELECTED);
        p.screen.put_cell(0, 0, gc);
        t.draw_pane(&p, 0, 0, 0);
        let bytes = out(&mut t);
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("\x1b[7m"), "selection style missing: {s:?}");
    }

    #[test]
    fn emulate_repeat_prefers_parameterized_form() {
        let mut t = tty();
        t.emulate_repeat(muxout_term::Cap::Cud, muxout_term::Cap::Cud1, 3);
        assert_eq!(out(&mut t), b"\x1b[3B");

        t.term.remove(muxout_term::Cap::Cud);
        t.emulate_repeat(muxout_term::Cap::Cud, muxout_term::Cap::Cud1, 3);
        assert_eq!(out(&mut t), b"\n\n\n");
    }
}
