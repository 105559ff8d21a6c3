#![forbid(unsafe_code)]

//! Grid cell input type.
//!
//! A [`GridCell`] is what the grid layer hands the engine: one codepoint
//! with its display width, an attribute set, and a foreground/background
//! colour pair. The engine only reads cells; it never writes them back.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::colour::Colour;

bitflags! {
    /// Cell display attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attrs: u16 {
        const BRIGHT = 0x001;
        const DIM = 0x002;
        const ITALICS = 0x004;
        const UNDERSCORE = 0x008;
        const BLINK = 0x010;
        const REVERSE = 0x020;
        const HIDDEN = 0x040;
        /// Draw through the alternate character set.
        const CHARSET = 0x080;
        /// Continuation half of a wide character; never emitted.
        const PADDING = 0x100;
        /// Covered by the active selection; restyled at draw time.
        const SELECTED = 0x200;
    }
}

/// One styled character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub ch: char,
    /// Display width in columns (1 or 2).
    pub width: u8,
    pub attr: Attrs,
    pub fg: Colour,
    pub bg: Colour,
}

impl GridCell {
    /// The default cell: a plain space in default colours.
    pub const DEFAULT: GridCell = GridCell {
        ch: ' ',
        width: 1,
        attr: Attrs::empty(),
        fg: Colour::Default,
        bg: Colour::Default,
    };

    /// Build a cell from a character, deriving its display width.
    #[must_use]
    pub fn from_char(ch: char) -> Self {
        GridCell {
            ch,
            width: ch.width().unwrap_or(1) as u8,
            ..Self::DEFAULT
        }
    }

    #[must_use]
    pub fn with_attr(mut self, attr: Attrs) -> Self {
        self.attr = attr;
        self
    }

    #[must_use]
    pub fn with_fg(mut self, fg: Colour) -> Self {
        self.fg = fg;
        self
    }

    #[must_use]
    pub fn with_bg(mut self, bg: Colour) -> Self {
        self.bg = bg;
        self
    }

    /// Padding continuation of the preceding wide character.
    #[must_use]
    pub fn padding() -> Self {
        GridCell {
            width: 0,
            attr: Attrs::PADDING,
            ..Self::DEFAULT
        }
    }

    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.attr.contains(Attrs::PADDING)
    }

    /// Whether attributes and colours match the default cell. Content is
    /// ignored: the attribute shadow only tracks styling.
    #[must_use]
    pub fn style_is_default(&self) -> bool {
        self.attr.is_empty() && self.fg.is_default() && self.bg.is_default()
    }
}

impl Default for GridCell {
    fn default() -> Self {
        Self::DEFAULT
    }
}
