#![forbid(unsafe_code)]

//! Screen command handlers and multi-client dispatch.
//!
//! Every handler follows one pattern: validate applicability, set
//! attributes, place the cursor, then either emit the native primitive
//! or fall back to a painter. Missing capabilities are never errors;
//! the fallback matrix is part of the contract.
//!
//! A pane update enters through [`write`], which fans the command out to
//! every attached client that is ready for it, fixing up the pane offset
//! per client.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::trace;

use muxout_term::{Cap, Param, TermFeatures};

use crate::cell::GridCell;
use crate::screen::{Pane, PaneFlags, WindowFlags};
use crate::tty::{Tty, TtyFlags};

/// Per-operation context handed to a command handler.
///
/// `ocx`/`ocy` and `orupper`/`orlower` are the screen's cursor and
/// scroll region *before* the grid update was applied; `xoff`/`yoff` are
/// set per client by [`write`].
#[derive(Debug, Clone, Copy)]
pub struct TtyCtx<'a> {
    pub pane: &'a Pane,
    pub xoff: u16,
    pub yoff: u16,
    pub ocx: u16,
    pub ocy: u16,
    pub orupper: u16,
    pub orlower: u16,
    /// Repeat count; for `LineFeed` a nonzero value marks a natural
    /// wrap.
    pub num: u16,
    /// Raw payload for `RawString` and `SetSelection`.
    pub data: &'a [u8],
    pub cell: GridCell,
    /// The previously emitted cell, for the tail-of-line redraw.
    pub last_cell: GridCell,
}

impl<'a> TtyCtx<'a> {
    #[must_use]
    pub fn new(pane: &'a Pane) -> Self {
        Self {
            pane,
            xoff: pane.xoff,
            yoff: pane.yoff,
            ocx: 0,
            ocy: 0,
            orupper: pane.screen.rupper,
            orlower: pane.screen.rlower,
            num: 0,
            data: &[],
            cell: GridCell::DEFAULT,
            last_cell: GridCell::DEFAULT,
        }
    }
}

/// The logical screen operations the grid layer can replay against a
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenCommand {
    InsertCharacter,
    DeleteCharacter,
    ClearCharacter,
    InsertLine,
    DeleteLine,
    ClearLine,
    ClearEndOfLine,
    ClearStartOfLine,
    ReverseIndex,
    LineFeed,
    ClearEndOfScreen,
    ClearStartOfScreen,
    ClearScreen,
    AlignmentTest,
    Cell,
    Utf8Character,
    RawString,
    SetSelection,
}

/// A client attached to the multiplexer, as far as output is concerned.
#[derive(Debug)]
pub struct Client<W: Write> {
    pub tty: Tty<W>,
    /// The window this client currently displays.
    pub current_window: Option<u32>,
    pub suspended: bool,
    /// The status line occupies row 0, pushing panes down one row.
    pub status_at_top: bool,
}

impl<W: Write> Client<W> {
    #[must_use]
    pub fn new(tty: Tty<W>) -> Self {
        Self {
            tty,
            current_window: None,
            suspended: false,
            status_at_top: false,
        }
    }

    fn ready(&self, pane: &Pane) -> bool {
        if self.current_window != Some(pane.window.id) {
            return false;
        }
        if !self.tty.flags().contains(TtyFlags::OPENED) {
            return false;
        }
        if self.suspended {
            return false;
        }
        if self.tty.flags().contains(TtyFlags::FREEZE) {
            return false;
        }
        true
    }
}

/// Fan a pane update out to every ready client.
pub fn write<W: Write>(clients: &mut [Client<W>], cmd: ScreenCommand, ctx: &mut TtyCtx<'_>) {
    let pane = ctx.pane;

    // A pending full redraw supersedes incremental updates.
    if pane.window.flags.get().contains(WindowFlags::REDRAW)
        || pane.flags.get().contains(PaneFlags::REDRAW)
    {
        return;
    }
    if !pane.visible || pane.flags.get().contains(PaneFlags::DROP) {
        return;
    }

    for client in clients.iter_mut() {
        if !client.ready(pane) {
            continue;
        }

        ctx.xoff = pane.xoff;
        ctx.yoff = pane.yoff + u16::from(client.status_at_top);

        client.tty.write_command(cmd, ctx);
    }
}

impl<W: Write> Tty<W> {
    /// Run one screen command against this terminal.
    pub fn write_command(&mut self, cmd: ScreenCommand, ctx: &TtyCtx<'_>) {
        trace!(?cmd, ocx = ctx.ocx, ocy = ctx.ocy, "tty command");
        match cmd {
            ScreenCommand::InsertCharacter => self.cmd_insertcharacter(ctx),
            ScreenCommand::DeleteCharacter => self.cmd_deletecharacter(ctx),
            ScreenCommand::ClearCharacter => self.cmd_clearcharacter(ctx),
            ScreenCommand::InsertLine => self.cmd_insertline(ctx),
            ScreenCommand::DeleteLine => self.cmd_deleteline(ctx),
            ScreenCommand::ClearLine => self.cmd_clearline(ctx),
            ScreenCommand::ClearEndOfLine => self.cmd_clearendofline(ctx),
            ScreenCommand::ClearStartOfLine => self.cmd_clearstartofline(ctx),
            ScreenCommand::ReverseIndex => self.cmd_reverseindex(ctx),
            ScreenCommand::LineFeed => self.cmd_linefeed(ctx),
            ScreenCommand::ClearEndOfScreen => self.cmd_clearendofscreen(ctx),
            ScreenCommand::ClearStartOfScreen => self.cmd_clearstartofscreen(ctx),
            ScreenCommand::ClearScreen => self.cmd_clearscreen(ctx),
            ScreenCommand::AlignmentTest => self.cmd_alignmenttest(ctx),
            ScreenCommand::Cell => self.cmd_cell(ctx),
            ScreenCommand::Utf8Character => self.cmd_utf8character(ctx),
            ScreenCommand::RawString => self.cmd_rawstring(ctx),
            ScreenCommand::SetSelection => self.cmd_setselection(ctx),
        }
    }

    /// Whether the pane spans the terminal's full width, making
    /// line-wise primitives safe.
    fn pane_full_width(&self, ctx: &TtyCtx<'_>) -> bool {
        ctx.xoff == 0 && ctx.pane.screen.sx() >= self.sx
    }

    /// Move the cursor to pane-relative coordinates.
    fn cursor_pane(&mut self, ctx: &TtyCtx<'_>, cx: u16, cy: u16) {
        self.cursor_to(ctx.xoff + cx, ctx.yoff + cy);
    }

    /// Program a pane-relative scroll region.
    fn region_pane(&mut self, ctx: &TtyCtx<'_>, rupper: u16, rlower: u16) {
        self.region_set(ctx.yoff + rupper, ctx.yoff + rlower);
    }

    fn cmd_insertcharacter(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        if !self.pane_full_width(ctx) {
            self.draw_pane(pane, ctx.ocy, ctx.xoff, ctx.yoff);
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        if !self.fake_bce(Some(pane))
            && (self.term.has(Cap::Ich) || self.term.has(Cap::Ich1))
        {
            self.emulate_repeat(Cap::Ich, Cap::Ich1, ctx.num);
        } else {
            self.draw_pane(pane, ctx.ocy, ctx.xoff, ctx.yoff);
        }
    }

    fn cmd_deletecharacter(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        if !self.pane_full_width(ctx)
            || self.fake_bce(Some(pane))
            || (!self.term.has(Cap::Dch) && !self.term.has(Cap::Dch1))
        {
            self.draw_pane(pane, ctx.ocy, ctx.xoff, ctx.yoff);
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        self.emulate_repeat(Cap::Dch, Cap::Dch1, ctx.num);
    }

    fn cmd_clearcharacter(&mut self, ctx: &TtyCtx<'_>) {
        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));

        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        if self.term.has(Cap::Ech) && !self.fake_bce(Some(ctx.pane)) {
            self.putcode1(Cap::Ech, i32::from(ctx.num));
        } else {
            self.repeat_space(ctx.num);
        }
    }

    fn cmd_insertline(&mut self, ctx: &TtyCtx<'_>) {
        if !self.pane_full_width(ctx)
            || self.fake_bce(Some(ctx.pane))
            || !self.term.has(Cap::Csr)
            || !self.term.has(Cap::Il1)
        {
            self.redraw_region(ctx);
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));

        self.region_pane(ctx, ctx.orupper, ctx.orlower);
        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        self.emulate_repeat(Cap::Il, Cap::Il1, ctx.num);
    }

    fn cmd_deleteline(&mut self, ctx: &TtyCtx<'_>) {
        if !self.pane_full_width(ctx)
            || self.fake_bce(Some(ctx.pane))
            || !self.term.has(Cap::Csr)
            || !self.term.has(Cap::Dl1)
        {
            self.redraw_region(ctx);
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));

        self.region_pane(ctx, ctx.orupper, ctx.orlower);
        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        self.emulate_repeat(Cap::Dl, Cap::Dl1, ctx.num);
    }

    fn cmd_clearline(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.cursor_pane(ctx, 0, ctx.ocy);

        if self.pane_full_width(ctx)
            && !self.fake_bce(Some(pane))
            && self.term.has(Cap::El)
        {
            self.putcode(Cap::El);
        } else {
            self.repeat_space(pane.screen.sx());
        }
    }

    fn cmd_clearendofline(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        if self.pane_full_width(ctx)
            && self.term.has(Cap::El)
            && !self.fake_bce(Some(pane))
        {
            self.putcode(Cap::El);
        } else {
            self.repeat_space(pane.screen.sx() - ctx.ocx);
        }
    }

    fn cmd_clearstartofline(&mut self, ctx: &TtyCtx<'_>) {
        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));

        if ctx.xoff == 0 && self.term.has(Cap::El1) && !self.fake_bce(Some(ctx.pane)) {
            self.cursor_pane(ctx, ctx.ocx, ctx.ocy);
            self.putcode(Cap::El1);
        } else {
            self.cursor_pane(ctx, 0, ctx.ocy);
            self.repeat_space(ctx.ocx + 1);
        }
    }

    fn cmd_reverseindex(&mut self, ctx: &TtyCtx<'_>) {
        if ctx.ocy != ctx.orupper {
            return;
        }

        if !self.pane_full_width(ctx)
            || self.fake_bce(Some(ctx.pane))
            || !self.term.has(Cap::Csr)
            || !self.term.has(Cap::Ri)
        {
            self.redraw_region(ctx);
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));

        self.region_pane(ctx, ctx.orupper, ctx.orlower);
        self.cursor_pane(ctx, ctx.ocx, ctx.orupper);

        self.putcode(Cap::Ri);
    }

    fn cmd_linefeed(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        if ctx.ocy != ctx.orlower {
            return;
        }

        if !self.pane_full_width(ctx)
            || self.fake_bce(Some(pane))
            || !self.term.has(Cap::Csr)
        {
            if self.large_region(ctx) {
                pane.mark(PaneFlags::REDRAW);
            } else {
                self.redraw_region(ctx);
            }
            return;
        }

        // A natural wrap needs no line feed: moving the cursor into the
        // last cell wraps by itself (unless the terminal wraps early).
        if ctx.num != 0 && !self.features().contains(TermFeatures::EARLYWRAP) {
            return;
        }

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.region_pane(ctx, ctx.orupper, ctx.orlower);
        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        self.putc(b'\n');
    }

    fn cmd_clearendofscreen(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;
        let (sx, sy) = (pane.screen.sx(), pane.screen.sy());

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.region_pane(ctx, 0, sy - 1);
        self.cursor_pane(ctx, ctx.ocx, ctx.ocy);

        if self.pane_full_width(ctx)
            && self.term.has(Cap::El)
            && !self.fake_bce(Some(pane))
        {
            self.putcode(Cap::El);
            if ctx.ocy != sy - 1 {
                self.cursor_pane(ctx, 0, ctx.ocy + 1);
                for i in ctx.ocy + 1..sy {
                    self.putcode(Cap::El);
                    if i == sy - 1 {
                        continue;
                    }
                    self.emulate_repeat(Cap::Cud, Cap::Cud1, 1);
                    self.shadow_cursor_down();
                }
            }
        } else {
            self.repeat_space(sx - ctx.ocx);
            for j in ctx.ocy + 1..sy {
                self.cursor_pane(ctx, 0, j);
                self.repeat_space(sx);
            }
        }
    }

    fn cmd_clearstartofscreen(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;
        let (sx, sy) = (pane.screen.sx(), pane.screen.sy());

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.region_pane(ctx, 0, sy - 1);
        self.cursor_pane(ctx, 0, 0);

        if self.pane_full_width(ctx)
            && self.term.has(Cap::El)
            && !self.fake_bce(Some(pane))
        {
            for _ in 0..ctx.ocy {
                self.putcode(Cap::El);
                self.emulate_repeat(Cap::Cud, Cap::Cud1, 1);
                self.shadow_cursor_down();
            }
        } else {
            for j in 0..ctx.ocy {
                self.cursor_pane(ctx, 0, j);
                self.repeat_space(sx);
            }
        }
        self.repeat_space(ctx.ocx + 1);
    }

    fn cmd_clearscreen(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;
        let (sx, sy) = (pane.screen.sx(), pane.screen.sy());

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.region_pane(ctx, 0, sy - 1);
        self.cursor_pane(ctx, 0, 0);

        if self.pane_full_width(ctx)
            && self.term.has(Cap::El)
            && !self.fake_bce(Some(pane))
        {
            for i in 0..sy {
                self.putcode(Cap::El);
                if i != sy - 1 {
                    self.emulate_repeat(Cap::Cud, Cap::Cud1, 1);
                    self.shadow_cursor_down();
                }
            }
        } else {
            for j in 0..sy {
                self.cursor_pane(ctx, 0, j);
                self.repeat_space(sx);
            }
        }
    }

    fn cmd_alignmenttest(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;
        let (sx, sy) = (pane.screen.sx(), pane.screen.sy());

        self.attributes(&GridCell::DEFAULT, Some(pane));

        self.region_pane(ctx, 0, sy - 1);

        for j in 0..sy {
            self.cursor_pane(ctx, 0, j);
            for _ in 0..sx {
                self.putc(b'E');
            }
        }
    }

    fn cmd_cell(&mut self, ctx: &TtyCtx<'_>) {
        let pane = ctx.pane;

        if ctx.ocy == ctx.orlower {
            self.region_pane(ctx, ctx.orupper, ctx.orlower);
        }

        // Is the cursor in the very last position?
        let width = u16::from(ctx.cell.width.max(1));
        if ctx.ocx + width > pane.sx() {
            if ctx.xoff != 0 || pane.sx() != self.sx {
                // The pane doesn't fill the whole line: the line feed
                // has already happened, so just move the cursor.
                if ctx.ocy != pane.screen.rlower {
                    self.cursor_pane(ctx, 0, ctx.ocy + 1);
                } else {
                    self.cursor_pane(ctx, 0, ctx.ocy);
                }
            } else if self.cursor.is_some_and(|(cx, _)| cx < self.sx) {
                // Not yet at the edge: rewind and re-emit the previous
                // tail cell so the natural wrap happens on this one.
                let cx = pane
                    .screen
                    .sx()
                    .saturating_sub(u16::from(ctx.last_cell.width.max(1)));
                self.cursor_pane(ctx, cx, ctx.ocy);
                let last = ctx.last_cell;
                self.put_cell(&last, Some(pane));
            }
        } else {
            self.cursor_pane(ctx, ctx.ocx, ctx.ocy);
        }

        let cell = ctx.cell;
        self.put_cell(&cell, Some(pane));
    }

    fn cmd_utf8character(&mut self, ctx: &TtyCtx<'_>) {
        // Cannot rely on this not being a partial character; redraw the
        // whole line.
        self.draw_pane(ctx.pane, ctx.ocy, ctx.xoff, ctx.yoff);
    }

    fn cmd_rawstring(&mut self, ctx: &TtyCtx<'_>) {
        for &b in ctx.data {
            self.putc(b);
        }

        // The bytes may have done anything; distrust the whole shadow.
        self.cursor = None;
        self.region = None;

        self.attributes(&GridCell::DEFAULT, Some(ctx.pane));
        self.cursor_to(0, 0);
    }

    fn cmd_setselection(&mut self, ctx: &TtyCtx<'_>) {
        if !self.term.has(Cap::Ms) {
            return;
        }

        let buf = STANDARD.encode(ctx.data);
        if let Some(bytes) = self
            .term
            .expand(Cap::Ms, &[Param::Str(""), Param::Str(&buf)])
        {
            self.put_bytes(&bytes);
        }
    }

    fn shadow_cursor_down(&mut self) {
        if let Some((cx, cy)) = self.cursor {
            self.cursor = Some((cx, cy + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use muxout_term::TermCaps;

    use crate::cell::Attrs;
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

    fn outs(t: &mut Tty<Vec<u8>>) -> String {
        String::from_utf8(t.take_output()).unwrap()
    }

    #[test]
    fn insertcharacter_uses_ich_on_full_width_pane() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 5;
        ctx.ocy = 2;
        ctx.num = 3;
        t.cmd_insertcharacter(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1b[3@"), "got {s:?}");
    }

    #[test]
    fn insertcharacter_falls_back_to_redraw_on_narrow_pane() {
        let mut t = tty();
        let mut p = pane(40, 24);
        p.screen.put_str(0, 2, "row");
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 2;
        ctx.num = 3;
        t.cmd_insertcharacter(&ctx);
        let s = outs(&mut t);
        assert!(!s.contains('@'), "ICH leaked: {s:?}");
        assert!(s.contains("row"), "line not redrawn: {s:?}");
    }

    #[test]
    fn deletecharacter_uses_dch() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 1;
        ctx.num = 2;
        t.cmd_deletecharacter(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1b[2P"), "got {s:?}");
    }

    #[test]
    fn clearcharacter_prefers_ech() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.num = 4;
        t.cmd_clearcharacter(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1b[4X"), "got {s:?}");
    }

    #[test]
    fn clearcharacter_spaces_without_ech() {
        let mut t = Tty::headless(Vec::new(), TermCaps::screen(), 80, 24);
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.num = 4;
        t.cmd_clearcharacter(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("    "), "got {s:?}");
    }

    #[test]
    fn insertline_programs_region_then_il() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 4;
        ctx.orupper = 2;
        ctx.orlower = 10;
        ctx.num = 2;
        t.cmd_insertline(&ctx);
        let s = outs(&mut t);
        assert!(s.contains("\x1b[3;11r"), "region missing: {s:?}");
        assert!(s.ends_with("\x1b[2L"), "got {s:?}");
        assert_eq!(t.scroll_region(), Some((2, 10)));
    }

    #[test]
    fn deleteline_without_csr_redraws_region() {
        let mut t = Tty::headless(Vec::new(), TermCaps::xterm_256color(), 80, 24);
        t.term.remove(Cap::Csr);
        let mut p = pane(80, 24);
        p.screen.put_str(0, 2, "keep");
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 2;
        ctx.orupper = 2;
        ctx.orlower = 4;
        ctx.num = 1;
        t.cmd_deleteline(&ctx);
        let s = outs(&mut t);
        assert!(!s.contains("\x1b[M"), "DL leaked: {s:?}");
        assert!(s.contains("keep"), "region not redrawn: {s:?}");
    }

    #[test]
    fn clearline_uses_el_full_width() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 3;
        t.cmd_clearline(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1b[K"), "got {s:?}");
    }

    #[test]
    fn clearendofline_spaces_on_narrow_pane() {
        let mut t = tty();
        let p = pane(10, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 4;
        t.cmd_clearendofline(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("      "), "expected 6 spaces: {s:?}");
        assert!(!s.contains("\x1b[K"));
    }

    #[test]
    fn clearstartofline_uses_el1_at_left_edge() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 7;
        t.cmd_clearstartofline(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1b[1K"), "got {s:?}");
    }

    #[test]
    fn clearstartofline_spaces_when_offset() {
        let mut t = tty();
        let mut p = pane(40, 24);
        p.xoff = 10;
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 3;
        t.cmd_clearstartofline(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("    "), "expected ocx+1 spaces: {s:?}");
    }

    #[test]
    fn reverseindex_only_at_region_top() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 5;
        ctx.orupper = 2;
        ctx.orlower = 10;
        t.cmd_reverseindex(&ctx);
        assert_eq!(out(&mut t), b"");

        ctx.ocy = 2;
        t.cmd_reverseindex(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\x1bM"), "got {s:?}");
    }

    #[test]
    fn linefeed_only_at_region_bottom() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 5;
        ctx.orlower = 23;
        t.cmd_linefeed(&ctx);
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn linefeed_scrolls_with_newline() {
        // Full-width pane, CSR, BCE, cursor at the region bottom: the
        // cheap path is a literal newline.
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 0;
        ctx.ocy = 23;
        ctx.orupper = 0;
        ctx.orlower = 23;
        t.cmd_linefeed(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with("\n"), "got {s:?}");
        assert_eq!(t.cursor(), Some((0, 23)));
        assert_eq!(t.scroll_region(), Some((0, 23)));
    }

    #[test]
    fn linefeed_skipped_on_natural_wrap() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 23;
        ctx.orlower = 23;
        ctx.num = 1; // wrapped
        t.cmd_linefeed(&ctx);
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn linefeed_fallback_marks_large_region() {
        let mut t = Tty::headless(Vec::new(), TermCaps::xterm_256color(), 80, 24);
        t.term.remove(Cap::Csr);
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 23;
        ctx.orupper = 0;
        ctx.orlower = 23;
        t.cmd_linefeed(&ctx);
        assert!(p.flags.get().contains(PaneFlags::REDRAW));
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn clearscreen_emits_el_per_row() {
        let mut t = tty();
        let p = pane(80, 4);
        let ctx = TtyCtx::new(&p);
        t.cmd_clearscreen(&ctx);
        let s = outs(&mut t);
        assert_eq!(s.matches("\x1b[K").count(), 4, "got {s:?}");
        assert_eq!(s.matches("\x1b[1B").count(), 3);
    }

    #[test]
    fn clearscreen_space_paints_under_fake_bce() {
        let mut t = Tty::headless(Vec::new(), TermCaps::screen(), 80, 4);
        let mut p = pane(80, 4);
        p.style = GridCell::DEFAULT.with_bg(Colour::Base(4));
        let ctx = TtyCtx::new(&p);
        t.cmd_clearscreen(&ctx);
        let s = outs(&mut t);
        assert!(!s.contains("\x1b[K"), "EL under fake BCE: {s:?}");
        assert_eq!(s.matches(' ').count(), 4 * 80);
        assert!(s.contains("\x1b[44m"), "bg attribute missing: {s:?}");
    }

    #[test]
    fn clearendofscreen_walks_rows_below() {
        let mut t = tty();
        let p = pane(80, 6);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 10;
        ctx.ocy = 3;
        t.cmd_clearendofscreen(&ctx);
        let s = outs(&mut t);
        // Row 3 from the cursor, then rows 4 and 5.
        assert_eq!(s.matches("\x1b[K").count(), 3, "got {s:?}");
    }

    #[test]
    fn clearstartofscreen_ends_at_cursor() {
        let mut t = tty();
        let p = pane(80, 6);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 10;
        ctx.ocy = 2;
        t.cmd_clearstartofscreen(&ctx);
        let s = outs(&mut t);
        assert_eq!(s.matches("\x1b[K").count(), 2, "got {s:?}");
        assert!(s.ends_with(&" ".repeat(11)), "got {s:?}");
    }

    #[test]
    fn alignmenttest_fills_with_e() {
        let mut t = tty();
        let p = pane(80, 3);
        let ctx = TtyCtx::new(&p);
        t.cmd_alignmenttest(&ctx);
        let s = outs(&mut t);
        assert_eq!(s.matches('E').count(), 3 * 80);
    }

    #[test]
    fn cell_places_cursor_and_emits() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 4;
        ctx.ocy = 2;
        ctx.cell = GridCell::from_char('Z');
        t.cmd_cell(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with('Z'), "got {s:?}");
        assert_eq!(t.cursor(), Some((5, 2)));
    }

    #[test]
    fn cell_tail_rewind_re_emits_last_cell() {
        let mut t = tty();
        let p = pane(80, 24);

        // Cursor parked mid-line; the grid says the new cell lands past
        // the right edge.
        t.cursor_to(70, 5);
        out(&mut t);

        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 80;
        ctx.ocy = 5;
        ctx.cell = GridCell::from_char('b');
        ctx.last_cell = GridCell::from_char('a');
        t.cmd_cell(&ctx);
        let s = outs(&mut t);
        // Rewind to column 79, redraw 'a', let 'b' wrap naturally.
        assert!(s.contains('a') && s.ends_with('b'), "got {s:?}");
        assert_eq!(t.cursor(), Some((1, 6)));
    }

    #[test]
    fn cell_in_narrow_pane_moves_to_next_row() {
        let mut t = tty();
        let mut p = pane(40, 24);
        p.xoff = 5;
        let mut ctx = TtyCtx::new(&p);
        ctx.xoff = 5;
        ctx.ocx = 40;
        ctx.ocy = 2;
        ctx.cell = GridCell::from_char('c');
        t.cmd_cell(&ctx);
        let s = outs(&mut t);
        assert!(s.ends_with('c'));
        // Moved to pane column 0 on the next row: absolute (5, 3).
        assert_eq!(t.cursor(), Some((6, 3)));
    }

    #[test]
    fn rawstring_invalidates_shadow_and_rehomes() {
        let mut t = tty();
        let p = pane(80, 24);
        t.cursor_to(10, 10);
        t.region_set(2, 20);
        out(&mut t);

        let mut ctx = TtyCtx::new(&p);
        ctx.data = b"\x1b]0;title\x07";
        t.cmd_rawstring(&ctx);
        let s = outs(&mut t);
        assert!(s.contains("\x1b]0;title\x07"));
        assert!(s.ends_with("\x1b[1;1H"), "absolute re-home: {s:?}");
        assert_eq!(t.cursor(), Some((0, 0)));
        assert_eq!(t.scroll_region(), None);
    }

    #[test]
    fn setselection_emits_osc52_base64() {
        let mut t = tty();
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.data = b"hello";
        t.cmd_setselection(&ctx);
        assert_eq!(out(&mut t), b"\x1b]52;;aGVsbG8=\x07");
    }

    #[test]
    fn setselection_silent_without_ms() {
        let mut t = Tty::headless(Vec::new(), TermCaps::xterm(), 80, 24);
        let p = pane(80, 24);
        let mut ctx = TtyCtx::new(&p);
        ctx.data = b"hello";
        t.cmd_setselection(&ctx);
        assert_eq!(out(&mut t), b"");
    }

    #[test]
    fn utf8character_redraws_the_line() {
        let mut t = tty();
        let mut p = pane(80, 24);
        p.screen.put_str(0, 7, "partial");
        let mut ctx = TtyCtx::new(&p);
        ctx.ocy = 7;
        t.cmd_utf8character(&ctx);
        let s = outs(&mut t);
        assert!(s.contains("partial"));
    }

    // ── multi-client dispatch ──────────────────────────────────────────

    fn client(window: u32) -> Client<Vec<u8>> {
        let mut c = Client::new(tty());
        c.current_window = Some(window);
        c
    }

    #[test]
    fn write_reaches_only_matching_clients() {
        let p = pane(80, 24);
        let mut clients = vec![client(1), client(2)];
        let mut ctx = TtyCtx::new(&p);
        ctx.cell = GridCell::from_char('x');
        write(&mut clients, ScreenCommand::Cell, &mut ctx);

        let a = outs(&mut clients[0].tty);
        let b = outs(&mut clients[1].tty);
        assert!(a.contains('x'));
        assert!(b.is_empty());
    }

    #[test]
    fn write_skips_suspended_and_frozen_clients() {
        let p = pane(80, 24);
        let mut clients = vec![client(1), client(1), client(1)];
        clients[1].suspended = true;
        clients[2].tty.set_flags(TtyFlags::FREEZE);
        let mut ctx = TtyCtx::new(&p);
        ctx.cell = GridCell::from_char('x');
        write(&mut clients, ScreenCommand::Cell, &mut ctx);

        assert!(outs(&mut clients[0].tty).contains('x'));
        assert!(outs(&mut clients[1].tty).is_empty());
        assert!(outs(&mut clients[2].tty).is_empty());
    }

    #[test]
    fn write_applies_status_line_offset() {
        let mut p = pane(80, 23);
        p.yoff = 0;
        let mut clients = vec![client(1)];
        clients[0].status_at_top = true;
        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 0;
        ctx.ocy = 0;
        ctx.cell = GridCell::from_char('x');
        write(&mut clients, ScreenCommand::Cell, &mut ctx);

        // Pane row 0 lands on terminal row 1.
        assert_eq!(clients[0].tty.cursor(), Some((1, 1)));
    }

    #[test]
    fn write_skips_panes_pending_redraw() {
        let p = pane(80, 24);
        p.mark(PaneFlags::REDRAW);
        let mut clients = vec![client(1)];
        let mut ctx = TtyCtx::new(&p);
        ctx.cell = GridCell::from_char('x');
        write(&mut clients, ScreenCommand::Cell, &mut ctx);
        assert!(outs(&mut clients[0].tty).is_empty());
    }

    #[test]
    fn write_skips_invisible_panes() {
        let mut p = pane(80, 24);
        p.visible = false;
        let mut clients = vec![client(1)];
        let mut ctx = TtyCtx::new(&p);
        write(&mut clients, ScreenCommand::ClearLine, &mut ctx);
        assert!(outs(&mut clients[0].tty).is_empty());
    }

    #[test]
    fn selected_attr_exists_for_draw_time_mixing() {
        // SELECTED never reaches the attribute engine from handlers;
        // draw_line strips it via select_cell.
        let gc = GridCell::from_char('x').with_attr(Attrs::SELECTED);
        assert!(gc.attr.contains(Attrs::SELECTED));
    }
}
