#![forbid(unsafe_code)]

//! Colour spaces and downgrade arithmetic.
//!
//! Cells arrive tagged with the colour space they were written in: the
//! classic 8-colour range, the aixterm bright range, the 256-colour
//! palette, or 24-bit RGB. The attribute engine folds these down to
//! whatever the terminal actually supports; the projection helpers live
//! here so they can be tested in isolation.

/// A cell colour in one of the spaces a grid can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colour {
    /// The terminal's default foreground or background.
    #[default]
    Default,
    /// Classic ANSI colour, 0..=7.
    Base(u8),
    /// Aixterm bright colour (SGR 90..=97 foreground, 100..=107
    /// background), 0..=7.
    Bright(u8),
    /// 256-colour palette index.
    Palette(u8),
    /// Direct 24-bit colour.
    Rgb(u8, u8, u8),
}

impl Colour {
    /// Whether this is the default colour (the only colour bulk-erase
    /// primitives are safe with on non-BCE terminals).
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Colour::Default)
    }
}

/// The xterm 16-colour palette, used as the folding target for 256→16.
const PALETTE_16: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x80, 0x00, 0x00),
    (0x00, 0x80, 0x00),
    (0x80, 0x80, 0x00),
    (0x00, 0x00, 0x80),
    (0x80, 0x00, 0x80),
    (0x00, 0x80, 0x80),
    (0xc0, 0xc0, 0xc0),
    (0x80, 0x80, 0x80),
    (0xff, 0x00, 0x00),
    (0x00, 0xff, 0x00),
    (0xff, 0xff, 0x00),
    (0x00, 0x00, 0xff),
    (0xff, 0x00, 0xff),
    (0x00, 0xff, 0xff),
    (0xff, 0xff, 0xff),
];

/// Levels of the 6×6×6 colour cube (indices 16..=231).
const Q2C: [u8; 6] = [0x00, 0x5f, 0x87, 0xaf, 0xd7, 0xff];

fn to_6cube(v: u8) -> usize {
    if v < 48 {
        0
    } else if v < 114 {
        1
    } else {
        ((v as usize) - 35) / 40
    }
}

fn dist(a: (u8, u8, u8), b: (u8, u8, u8)) -> i32 {
    let dr = i32::from(a.0) - i32::from(b.0);
    let dg = i32::from(a.1) - i32::from(b.1);
    let db = i32::from(a.2) - i32::from(b.2);
    dr * dr + dg * dg + db * db
}

/// Map 24-bit RGB onto the closest 256-palette entry (cube or greyscale
/// ramp; the 16 base entries are skipped because their values vary
/// between terminals).
#[must_use]
pub fn find_rgb(r: u8, g: u8, b: u8) -> u8 {
    let qr = to_6cube(r);
    let qg = to_6cube(g);
    let qb = to_6cube(b);
    let cube = (Q2C[qr], Q2C[qg], Q2C[qb]);

    let avg = (u32::from(r) + u32::from(g) + u32::from(b)) / 3;
    let grey_idx = if avg > 238 { 23 } else { (avg.saturating_sub(3) / 10) as usize };
    let grey_level = (8 + 10 * grey_idx) as u8;
    let grey = (grey_level, grey_level, grey_level);

    if dist((r, g, b), grey) < dist((r, g, b), cube) {
        232 + grey_idx as u8
    } else {
        16 + (36 * qr + 6 * qg + qb) as u8
    }
}

/// RGB value of a 256-palette index.
#[must_use]
pub fn palette_rgb(n: u8) -> (u8, u8, u8) {
    match n {
        0..=15 => PALETTE_16[n as usize],
        16..=231 => {
            let i = (n - 16) as usize;
            (Q2C[i / 36], Q2C[(i / 6) % 6], Q2C[i % 6])
        }
        232..=255 => {
            let level = 8 + 10 * (n - 232);
            (level, level, level)
        }
    }
}

/// Fold a 256-palette index onto the 16-colour palette (0..=15).
/// Indices 0..=15 are already 16-colour values and pass through.
#[must_use]
pub fn p256_to_16(n: u8) -> u8 {
    if n < 16 {
        return n;
    }
    let rgb = palette_rgb(n);
    let mut best = 0u8;
    let mut best_d = i32::MAX;
    for (i, &candidate) in PALETTE_16.iter().enumerate() {
        let d = dist(rgb, candidate);
        if d < best_d {
            best_d = d;
            best = i as u8;
        }
    }
    best
}
