#![forbid(unsafe_code)]

//! Reference terminal model for engine validation.
//!
//! A minimal emulator that understands the subset of sequences the
//! engine emits against the built-in capability profiles, so tests can
//! feed emitted bytes to it and compare the resulting cursor, region
//! and SGR state with the engine's shadow, no terminal required.
//!
//! # Scope
//!
//! This is NOT a full VT emulator. It implements:
//! - cursor addressing (CUP, CHA/HPA, VPA, relative moves, HOME, CR/LF/BS)
//! - deferred wrap (the cursor parks past the last column, like xterm)
//! - DECSTBM scroll regions, LF/RI scrolling at the margins
//! - SGR in all the colour spaces the engine can emit
//! - erase (EL/ED/ECH) and shift (ICH/DCH/IL/DL) primitives
//! - DEC private modes (tracked, not rendered) and DECSCUSR
//! - OSC strings (consumed and discarded)

use unicode_width::UnicodeWidthChar;

use crate::cell::Attrs;
use crate::colour::Colour;

/// One cell of the model grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCell {
    pub ch: char,
    pub fg: Colour,
    pub bg: Colour,
    pub attrs: Attrs,
}

impl Default for ModelCell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Colour::Default,
            bg: Colour::Default,
            attrs: Attrs::empty(),
        }
    }
}

/// Current SGR state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SgrState {
    pub fg: Colour,
    pub bg: Colour,
    pub attrs: Attrs,
}

/// DEC private modes the engine toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelModes {
    pub cursor_visible: bool,
    pub alt_screen: bool,
    pub bracketed_paste: bool,
    pub focus_events: bool,
    pub mouse: Vec<u16>,
}

impl Default for ModelModes {
    fn default() -> Self {
        Self {
            cursor_visible: true,
            alt_screen: false,
            bracketed_paste: false,
            focus_events: false,
            mouse: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Ground,
    Escape,
    EscapeCharset,
    Csi,
    Osc,
    OscEsc,
}

/// The reference terminal.
#[derive(Debug)]
pub struct TerminalModel {
    width: u16,
    height: u16,
    cells: Vec<ModelCell>,
    /// Cursor column; may equal `width` when a wrap is pending.
    cx: u16,
    cy: u16,
    rupper: u16,
    rlower: u16,
    sgr: SgrState,
    modes: ModelModes,
    cursor_style: u16,

    state: ParseState,
    params: Vec<u16>,
    param: u16,
    param_seen: bool,
    private: bool,
    intermediate: Option<u8>,
    utf8: Vec<u8>,
}

impl TerminalModel {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![ModelCell::default(); usize::from(width) * usize::from(height)],
            cx: 0,
            cy: 0,
            rupper: 0,
            rlower: height.saturating_sub(1),
            sgr: SgrState::default(),
            modes: ModelModes::default(),
            cursor_style: 0,
            state: ParseState::Ground,
            params: Vec::new(),
            param: 0,
            param_seen: false,
            private: false,
            intermediate: None,
            utf8: Vec::new(),
        }
    }

    /// Cursor position; the column may equal the width (pending wrap).
    #[must_use]
    pub fn cursor(&self) -> (u16, u16) {
        (self.cx, self.cy)
    }

    #[must_use]
    pub fn region(&self) -> (u16, u16) {
        (self.rupper, self.rlower)
    }

    #[must_use]
    pub fn sgr(&self) -> &SgrState {
        &self.sgr
    }

    #[must_use]
    pub fn modes(&self) -> &ModelModes {
        &self.modes
    }

    #[must_use]
    pub fn cursor_style(&self) -> u16 {
        self.cursor_style
    }

    #[must_use]
    pub fn cell(&self, x: u16, y: u16) -> &ModelCell {
        &self.cells[usize::from(y) * usize::from(self.width) + usize::from(x)]
    }

    fn cell_mut(&mut self, x: u16, y: u16) -> &mut ModelCell {
        &mut self.cells[usize::from(y) * usize::from(self.width) + usize::from(x)]
    }

    /// Row contents as a string, trailing blanks trimmed.
    #[must_use]
    pub fn row_text(&self, y: u16) -> String {
        let mut s: String = (0..self.width).map(|x| self.cell(x, y).ch).collect();
        while s.ends_with(' ') {
            s.pop();
        }
        s
    }

    /// Feed a byte stream to the model.
    pub fn process(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.step(b);
        }
    }

    fn step(&mut self, b: u8) {
        match self.state {
            ParseState::Ground => self.ground(b),
            ParseState::Escape => self.escape(b),
            ParseState::EscapeCharset => self.state = ParseState::Ground,
            ParseState::Csi => self.csi(b),
            ParseState::Osc => {
                if b == 0x07 {
                    self.state = ParseState::Ground;
                } else if b == 0x1b {
                    self.state = ParseState::OscEsc;
                }
            }
            ParseState::OscEsc => {
                // ESC \ terminates; anything else returns to the string.
                self.state = if b == b'\\' {
                    ParseState::Ground
                } else {
                    ParseState::Osc
                };
            }
        }
    }

    fn ground(&mut self, b: u8) {
        match b {
            0x1b => {
                self.utf8.clear();
                self.state = ParseState::Escape;
            }
            b'\r' => self.cx = 0,
            b'\n' => self.linefeed(),
            0x08 => self.cx = self.effective_cx().saturating_sub(1),
            0x07 | 0x0e | 0x0f | 0x00 => {}
            _ => {
                self.utf8.push(b);
                if let Ok(s) = std::str::from_utf8(&self.utf8) {
                    if let Some(ch) = s.chars().next() {
                        self.utf8.clear();
                        self.print(ch);
                    }
                } else if self.utf8.len() >= 4 {
                    self.utf8.clear();
                }
            }
        }
    }

    fn escape(&mut self, b: u8) {
        self.state = ParseState::Ground;
        match b {
            b'[' => {
                self.params.clear();
                self.param = 0;
                self.param_seen = false;
                self.private = false;
                self.intermediate = None;
                self.state = ParseState::Csi;
            }
            b']' => self.state = ParseState::Osc,
            b'M' => self.reverse_index(),
            b'(' | b')' => self.state = ParseState::EscapeCharset,
            b'7' | b'8' | b'=' | b'>' | b'\\' => {}
            _ => {}
        }
    }

    fn csi(&mut self, b: u8) {
        match b {
            b'0'..=b'9' => {
                self.param = self.param.saturating_mul(10) + u16::from(b - b'0');
                self.param_seen = true;
            }
            b';' => {
                self.params.push(self.param);
                self.param = 0;
                self.param_seen = false;
            }
            b'?' => self.private = true,
            0x20..=0x2f => self.intermediate = Some(b),
            _ => {
                if self.param_seen || !self.params.is_empty() {
                    self.params.push(self.param);
                }
                self.dispatch_csi(b);
                self.state = ParseState::Ground;
            }
        }
    }

    fn p(&self, i: usize, default: u16) -> u16 {
        match self.params.get(i) {
            Some(&v) if v != 0 => v,
            Some(_) => default,
            None => default,
        }
    }

    fn p0(&self, i: usize) -> u16 {
        self.params.get(i).copied().unwrap_or(0)
    }

    fn dispatch_csi(&mut self, b: u8) {
        if self.private {
            match b {
                b'h' => self.private_mode(true),
                b'l' => self.private_mode(false),
                _ => {}
            }
            return;
        }
        if self.intermediate == Some(b' ') && b == b'q' {
            self.cursor_style = self.p0(0);
            return;
        }
        match b {
            b'H' | b'f' => {
                let row = self.p(0, 1) - 1;
                let col = self.p(1, 1) - 1;
                self.cy = row.min(self.height - 1);
                self.cx = col.min(self.width - 1);
            }
            b'A' => {
                let n = self.p(0, 1);
                let top = if self.cy >= self.rupper { self.rupper } else { 0 };
                self.cy = self.cy.saturating_sub(n).max(top);
            }
            b'B' => {
                let n = self.p(0, 1);
                let bottom = if self.cy <= self.rlower {
                    self.rlower
                } else {
                    self.height - 1
                };
                self.cy = (self.cy + n).min(bottom);
            }
            b'C' => {
                let n = self.p(0, 1);
                self.cx = (self.effective_cx() + n).min(self.width - 1);
            }
            b'D' => {
                let n = self.p(0, 1);
                self.cx = self.effective_cx().saturating_sub(n);
            }
            b'G' | b'`' => self.cx = (self.p(0, 1) - 1).min(self.width - 1),
            b'd' => self.cy = (self.p(0, 1) - 1).min(self.height - 1),
            b'r' => {
                let top = self.p(0, 1) - 1;
                let bottom = self.p(1, self.height) - 1;
                if top < bottom && bottom < self.height {
                    self.rupper = top;
                    self.rlower = bottom;
                }
                self.cx = 0;
                self.cy = 0;
            }
            b'J' => self.erase_display(),
            b'K' => self.erase_line(),
            b'X' => {
                let n = self.p(0, 1);
                let (cx, cy) = (self.effective_cx(), self.cy);
                for x in cx..(cx + n).min(self.width) {
                    *self.cell_mut(x, cy) = self.blank();
                }
            }
            b'@' => self.insert_cells(),
            b'P' => self.delete_cells(),
            b'L' => self.insert_lines(),
            b'M' => self.delete_lines(),
            b'm' => self.apply_sgr(),
            _ => {}
        }
    }

    fn private_mode(&mut self, on: bool) {
        let params = self.params.clone();
        for p in params {
            match p {
                25 => self.modes.cursor_visible = on,
                1049 => self.modes.alt_screen = on,
                2004 => self.modes.bracketed_paste = on,
                1004 => self.modes.focus_events = on,
                1000 | 1002 | 1003 | 1005 | 1006 => {
                    if on {
                        if !self.modes.mouse.contains(&p) {
                            self.modes.mouse.push(p);
                        }
                    } else {
                        self.modes.mouse.retain(|&m| m != p);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_sgr(&mut self) {
        if self.params.is_empty() {
            self.sgr = SgrState::default();
            return;
        }
        let mut i = 0;
        while i < self.params.len() {
            let p = self.params[i];
            match p {
                0 => self.sgr = SgrState::default(),
                1 => self.sgr.attrs |= Attrs::BRIGHT,
                2 => self.sgr.attrs |= Attrs::DIM,
                3 => self.sgr.attrs |= Attrs::ITALICS,
                4 => self.sgr.attrs |= Attrs::UNDERSCORE,
                5 => self.sgr.attrs |= Attrs::BLINK,
                7 => self.sgr.attrs |= Attrs::REVERSE,
                8 => self.sgr.attrs |= Attrs::HIDDEN,
                22 => self.sgr.attrs -= Attrs::BRIGHT | Attrs::DIM,
                23 => self.sgr.attrs -= Attrs::ITALICS,
                24 => self.sgr.attrs -= Attrs::UNDERSCORE,
                25 => self.sgr.attrs -= Attrs::BLINK,
                27 => self.sgr.attrs -= Attrs::REVERSE,
                28 => self.sgr.attrs -= Attrs::HIDDEN,
                30..=37 => self.sgr.fg = Colour::Base((p - 30) as u8),
                39 => self.sgr.fg = Colour::Default,
                40..=47 => self.sgr.bg = Colour::Base((p - 40) as u8),
                49 => self.sgr.bg = Colour::Default,
                90..=97 => self.sgr.fg = Colour::Bright((p - 90) as u8),
                100..=107 => self.sgr.bg = Colour::Bright((p - 100) as u8),
                38 | 48 => {
                    let colour = match self.params.get(i + 1) {
                        Some(5) => {
                            let n = self.params.get(i + 2).copied().unwrap_or(0);
                            i += 2;
                            Some(Colour::Palette(n as u8))
                        }
                        Some(2) => {
                            let r = self.params.get(i + 2).copied().unwrap_or(0) as u8;
                            let g = self.params.get(i + 3).copied().unwrap_or(0) as u8;
                            let b = self.params.get(i + 4).copied().unwrap_or(0) as u8;
                            i += 4;
                            Some(Colour::Rgb(r, g, b))
                        }
                        _ => None,
                    };
                    if let Some(c) = colour {
                        if p == 38 {
                            self.sgr.fg = c;
                        } else {
                            self.sgr.bg = c;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    /// Cursor column for editing: a pending wrap acts as the last
    /// column.
    fn effective_cx(&self) -> u16 {
        self.cx.min(self.width - 1)
    }

    fn blank(&self) -> ModelCell {
        // Erased cells take the current background (BCE behaviour, which
        // is what the profiles that use erase primitives declare).
        ModelCell {
            ch: ' ',
            fg: Colour::Default,
            bg: self.sgr.bg,
            attrs: Attrs::empty(),
        }
    }

    fn print(&mut self, ch: char) {
        let w = ch.width().unwrap_or(1).max(1) as u16;

        if self.cx >= self.width {
            // Deferred wrap resolves now.
            self.cx = 0;
            self.linefeed();
        }

        let (cx, cy) = (self.cx, self.cy);
        let cell = ModelCell {
            ch,
            fg: self.sgr.fg,
            bg: self.sgr.bg,
            attrs: self.sgr.attrs,
        };
        *self.cell_mut(cx, cy) = cell;
        for x in cx + 1..(cx + w).min(self.width) {
            *self.cell_mut(x, cy) = self.blank();
        }
        // May park at self.width: pending wrap.
        self.cx = (cx + w).min(self.width);
    }

    fn linefeed(&mut self) {
        if self.cy == self.rlower {
            self.scroll_up(1);
        } else if self.cy + 1 < self.height {
            self.cy += 1;
        }
    }

    fn reverse_index(&mut self) {
        if self.cy == self.rupper {
            self.scroll_down(1);
        } else if self.cy > 0 {
            self.cy -= 1;
        }
    }

    fn scroll_up(&mut self, n: u16) {
        for _ in 0..n {
            for y in self.rupper..self.rlower {
                for x in 0..self.width {
                    *self.cell_mut(x, y) = self.cell(x, y + 1).clone();
                }
            }
            let last = self.rlower;
            for x in 0..self.width {
                *self.cell_mut(x, last) = self.blank();
            }
        }
    }

    fn scroll_down(&mut self, n: u16) {
        for _ in 0..n {
            for y in (self.rupper + 1..=self.rlower).rev() {
                for x in 0..self.width {
                    *self.cell_mut(x, y) = self.cell(x, y - 1).clone();
                }
            }
            let first = self.rupper;
            for x in 0..self.width {
                *self.cell_mut(x, first) = self.blank();
            }
        }
    }

    fn erase_line(&mut self) {
        let mode = self.p0(0);
        let (cx, cy) = (self.effective_cx(), self.cy);
        let (from, to) = match mode {
            0 => (cx, self.width),
            1 => (0, (cx + 1).min(self.width)),
            _ => (0, self.width),
        };
        for x in from..to {
            *self.cell_mut(x, cy) = self.blank();
        }
    }

    fn erase_display(&mut self) {
        let mode = self.p0(0);
        let cy = self.cy;
        match mode {
            0 => {
                self.erase_line_range(self.effective_cx(), self.width, cy);
                for y in cy + 1..self.height {
                    self.erase_line_range(0, self.width, y);
                }
            }
            1 => {
                for y in 0..cy {
                    self.erase_line_range(0, self.width, y);
                }
                self.erase_line_range(0, self.effective_cx() + 1, cy);
            }
            _ => {
                for y in 0..self.height {
                    self.erase_line_range(0, self.width, y);
                }
            }
        }
    }

    fn erase_line_range(&mut self, from: u16, to: u16, y: u16) {
        for x in from..to.min(self.width) {
            *self.cell_mut(x, y) = self.blank();
        }
    }

    fn insert_cells(&mut self) {
        let n = self.p(0, 1);
        let (cx, cy) = (self.effective_cx(), self.cy);
        for x in (cx..self.width).rev() {
            *self.cell_mut(x, cy) = if x >= cx + n {
                self.cell(x - n, cy).clone()
            } else {
                self.blank()
            };
        }
    }

    fn delete_cells(&mut self) {
        let n = self.p(0, 1);
        let (cx, cy) = (self.effective_cx(), self.cy);
        for x in cx..self.width {
            *self.cell_mut(x, cy) = if x + n < self.width {
                self.cell(x + n, cy).clone()
            } else {
                self.blank()
            };
        }
    }

    fn insert_lines(&mut self) {
        let n = self.p(0, 1);
        if self.cy < self.rupper || self.cy > self.rlower {
            return;
        }
        for _ in 0..n {
            for y in (self.cy + 1..=self.rlower).rev() {
                for x in 0..self.width {
                    *self.cell_mut(x, y) = self.cell(x, y - 1).clone();
                }
            }
            let cy = self.cy;
            for x in 0..self.width {
                *self.cell_mut(x, cy) = self.blank();
            }
        }
    }

    fn delete_lines(&mut self) {
        let n = self.p(0, 1);
        if self.cy < self.rupper || self.cy > self.rlower {
            return;
        }
        for _ in 0..n {
            for y in self.cy..self.rlower {
                for x in 0..self.width {
                    *self.cell_mut(x, y) = self.cell(x, y + 1).clone();
                }
            }
            let last = self.rlower;
            for x in 0..self.width {
                *self.cell_mut(x, last) = self.blank();
            }
        }
    }
}
