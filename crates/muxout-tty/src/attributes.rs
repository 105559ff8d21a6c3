#![forbid(unsafe_code)]

//! Attribute and colour reconciliation.
//!
//! Before any content byte, the engine brings the terminal's SGR state
//! to the desired cell's. The order is load-bearing:
//!
//! 1. resolve default colours through the pane's style options;
//! 2. downgrade colours to the terminal's actual depth;
//! 3. if any attribute bit must *drop*, emit SGR0 (the only portable
//!    attribute-erasure primitive) and rebuild;
//! 4. emit colour changes (these may themselves fall back to SGR0);
//! 5. emit newly-set attribute bits.

use std::io::Write;

use muxout_term::{Cap, TermFeatures};

use crate::cell::{Attrs, GridCell};
use crate::colour::{self, Colour};
use crate::screen::Pane;
use crate::tty::Tty;

impl<W: Write> Tty<W> {
    /// Reconcile the terminal's attribute/colour state with `gc`,
    /// resolving default colours through `pane` when given.
    pub fn attributes(&mut self, gc: &GridCell, pane: Option<&Pane>) {
        let mut gc2 = *gc;
        if let Some(pane) = pane {
            default_colours(&mut gc2, pane);
        }

        // Without setab, reverse video is the only way to show a
        // non-default background. Harmless, and it keeps full-screen
        // applications legible on such terminals.
        if !self.term.has(Cap::Setab) {
            if gc2.attr.contains(Attrs::REVERSE) {
                if !matches!(gc2.fg, Colour::Default | Colour::Base(7)) {
                    gc2.attr -= Attrs::REVERSE;
                }
            } else if !matches!(gc2.bg, Colour::Default | Colour::Base(0)) {
                gc2.attr |= Attrs::REVERSE;
            }
        }

        self.check_fg(&mut gc2);
        self.check_bg(&mut gc2);

        // Any bit being cleared means starting over from SGR0.
        if self.cell.attr.intersects(!gc2.attr) {
            self.reset();
        }

        // Colours next: this may call reset() again, and may add (never
        // remove) attribute bits.
        self.colours(&gc2);

        let changed = gc2.attr - self.cell.attr;
        self.cell.attr = gc2.attr;

        if changed.contains(Attrs::BRIGHT) {
            self.putcode(Cap::Bold);
        }
        if changed.contains(Attrs::DIM) {
            self.putcode(Cap::Dim);
        }
        if changed.contains(Attrs::ITALICS) {
            self.set_italics();
        }
        if changed.contains(Attrs::UNDERSCORE) {
            self.putcode(Cap::Smul);
        }
        if changed.contains(Attrs::BLINK) {
            self.putcode(Cap::Blink);
        }
        if changed.contains(Attrs::REVERSE) {
            if self.term.has(Cap::Rev) {
                self.putcode(Cap::Rev);
            } else if self.term.has(Cap::Smso) {
                self.putcode(Cap::Smso);
            }
        }
        if changed.contains(Attrs::HIDDEN) {
            self.putcode(Cap::Invis);
        }
        if changed.contains(Attrs::CHARSET) && self.use_acs() {
            self.putcode(Cap::Smacs);
        }
    }

    /// Italics where the terminal really renders them; standout on the
    /// screen family, which advertises SITM but displays nothing.
    fn set_italics(&mut self) {
        if self.term.has(Cap::Sitm)
            && !self.features().contains(TermFeatures::SCREEN_LIKE)
        {
            self.putcode(Cap::Sitm);
        } else {
            self.putcode(Cap::Smso);
        }
    }

    /// Downgrade a foreground colour to the terminal's depth.
    pub fn check_fg(&self, gc: &mut GridCell) {
        if let Colour::Rgb(r, g, b) = gc.fg {
            if self.term.flag(Cap::Tc) {
                return;
            }
            gc.fg = Colour::Palette(colour::find_rgb(r, g, b));
        }
        let colours = self.term.number(Cap::Colors);

        if let Colour::Palette(n) = gc.fg {
            if !self.features().contains(TermFeatures::COLOURS_256) {
                let c = colour::p256_to_16(n);
                if c & 8 == 8 {
                    if colours >= 16 {
                        gc.fg = Colour::Bright(c & 7);
                    } else {
                        gc.fg = Colour::Base(c & 7);
                        gc.attr |= Attrs::BRIGHT;
                    }
                } else {
                    gc.fg = Colour::Base(c);
                    gc.attr -= Attrs::BRIGHT;
                }
            }
            return;
        }

        if let Colour::Bright(n) = gc.fg {
            if colours < 16 {
                gc.fg = Colour::Base(n);
                gc.attr |= Attrs::BRIGHT;
            }
        }
    }

    /// Downgrade a background colour. Brightness does not exist portably
    /// for backgrounds, so it survives only on ≥16-colour terminals and
    /// is otherwise discarded.
    pub fn check_bg(&self, gc: &mut GridCell) {
        if let Colour::Rgb(r, g, b) = gc.bg {
            if self.term.flag(Cap::Tc) {
                return;
            }
            gc.bg = Colour::Palette(colour::find_rgb(r, g, b));
        }
        let colours = self.term.number(Cap::Colors);

        if let Colour::Palette(n) = gc.bg {
            if !self.features().contains(TermFeatures::COLOURS_256) {
                let c = colour::p256_to_16(n);
                if c & 8 == 8 {
                    if colours >= 16 {
                        gc.bg = Colour::Bright(c & 7);
                    } else {
                        gc.bg = Colour::Base(c & 7);
                    }
                } else {
                    gc.bg = Colour::Base(c);
                }
            }
            return;
        }

        if let Colour::Bright(n) = gc.bg {
            if colours < 16 {
                gc.bg = Colour::Base(n);
            }
        }
    }

    /// Reconcile fg/bg with the shadow cell.
    fn colours(&mut self, gc: &GridCell) {
        if gc.fg == self.cell.fg && gc.bg == self.cell.bg {
            return;
        }

        // Default colours are special: without AX the only portable
        // reset is OP, and OP is close enough to SGR0 that going through
        // reset() is the safe rendition.
        if gc.fg.is_default() || gc.bg.is_default() {
            let have_ax = self.term.flag(Cap::Ax);
            if !have_ax && self.term.has(Cap::Op) {
                self.reset();
            } else {
                if gc.fg.is_default() && !self.cell.fg.is_default() {
                    if have_ax {
                        self.puts("\x1b[39m");
                    } else if self.cell.fg != Colour::Base(7) {
                        self.putcode1(Cap::Setaf, 7);
                    }
                    self.cell.fg = Colour::Default;
                }
                if gc.bg.is_default() && !self.cell.bg.is_default() {
                    if have_ax {
                        self.puts("\x1b[49m");
                    } else if self.cell.bg != Colour::Base(0) {
                        self.putcode1(Cap::Setab, 0);
                    }
                    self.cell.bg = Colour::Default;
                }
            }
        }

        if !gc.fg.is_default() && gc.fg != self.cell.fg {
            self.colours_fg(gc.fg);
        }

        if !gc.bg.is_default() && gc.bg != self.cell.bg {
            self.colours_bg(gc.bg);
        }
    }

    fn colours_fg(&mut self, fg: Colour) {
        match fg {
            Colour::Palette(_) | Colour::Rgb(..) => {
                // check_fg already folded anything the terminal cannot
                // express.
                if !self.try_colour(fg, false) {
                    return;
                }
            }
            Colour::Bright(n) => {
                let s = format!("\x1b[{}m", 90 + u16::from(n & 7));
                self.puts(&s);
            }
            Colour::Base(n) => self.putcode1(Cap::Setaf, i32::from(n)),
            Colour::Default => {}
        }
        self.cell.fg = fg;
    }

    fn colours_bg(&mut self, bg: Colour) {
        match bg {
            Colour::Palette(_) | Colour::Rgb(..) => {
                if !self.try_colour(bg, true) {
                    return;
                }
            }
            Colour::Bright(n) => {
                let s = format!("\x1b[{}m", 100 + u16::from(n & 7));
                self.puts(&s);
            }
            Colour::Base(n) => self.putcode1(Cap::Setab, i32::from(n)),
            Colour::Default => {}
        }
        self.cell.bg = bg;
    }

    /// Emit a palette or RGB colour, choosing between the terminfo caps
    /// and the literal SGR 38/48 forms.
    fn try_colour(&mut self, c: Colour, bg: bool) -> bool {
        match c {
            Colour::Palette(n) => {
                // A user-asserted 256 override means setaf/setab may be
                // 8-colour strings; use the literal sequence.
                if !self.term_features.contains(TermFeatures::COLOURS_256)
                    && self.term.features().contains(TermFeatures::COLOURS_256)
                {
                    let cap = if bg { Cap::Setab } else { Cap::Setaf };
                    if self.term.has(cap) {
                        self.putcode1(cap, i32::from(n));
                        return true;
                    }
                }
                let s = format!("\x1b[{};5;{}m", if bg { 48 } else { 38 }, n);
                self.puts(&s);
                true
            }
            Colour::Rgb(r, g, b) => {
                if !self.term.flag(Cap::Tc) {
                    return false;
                }
                let s = format!("\x1b[{};2;{};{};{}m", if bg { 48 } else { 38 }, r, g, b);
                self.puts(&s);
                true
            }
            _ => false,
        }
    }
}

/// Fold the pane's style options into a cell whose fg or bg is default:
/// the pane's own style wins, then the active-pane style (for the active
/// pane), then the window style.
pub fn default_colours(gc: &mut GridCell, pane: &Pane) {
    let (wgc, agc) = pane.window.styles();
    let pgc = &pane.style;

    if gc.fg.is_default() {
        if !pgc.fg.is_default() {
            gc.fg = pgc.fg;
        } else if pane.active && !agc.fg.is_default() {
            gc.fg = agc.fg;
        } else {
            gc.fg = wgc.fg;
        }
    }

    if gc.bg.is_default() {
        if !pgc.bg.is_default() {
            gc.bg = pgc.bg;
        } else if pane.active && !agc.bg.is_default() {
            gc.bg = agc.bg;
        } else {
            gc.bg = wgc.bg;
        }
    }
}

impl<W: Write> Tty<W> {
    /// Bulk-erase primitives paint the current background; when the
    /// resolved background is not the default and the terminal lacks
    /// BCE, they would paint the wrong colour and must be emulated by
    /// space-painting.
    pub(crate) fn fake_bce(&self, pane: Option<&Pane>) -> bool {
        let mut gc = GridCell::DEFAULT;
        if let Some(pane) = pane {
            default_colours(&mut gc, pane);
        }
        if gc.bg.is_default() {
            return false;
        }
        !self.term.flag(Cap::Bce)
    }
}
