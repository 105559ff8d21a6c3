#![forbid(unsafe_code)]

//! Terminal capability tables.
//!
//! The output engine never reads terminfo directly: every capability query
//! goes through [`TermCaps`], an array-indexed table keyed by [`Cap`]. This
//! keeps the branching surface uniform (`has`/`flag`/`number`/`expand`) and
//! lets tests substitute a fixture table for a real terminal.
//!
//! # Predefined Profiles
//!
//! | Profile | Description |
//! |---------|-------------|
//! | `modern()` | xterm-family terminal with direct colour and cursor styling |
//! | `xterm_256color()` | standard xterm with the 256-colour palette |
//! | `xterm()` | basic 8-colour xterm |
//! | `screen_256color()` | GNU screen with 256 colours (no BCE) |
//! | `screen()` | GNU screen, 8 colours (no BCE, no ECH) |
//! | `vt100()` | monochrome VT100: no colour caps, no insert/delete |
//! | `dumb()` | line printer; fails required-capability validation |
//!
//! Profiles are ordinary tables: tests mutate them with `set_string` /
//! `set_flag` / `remove` to carve out exactly the capability subset a case
//! needs.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use thiserror::Error;

use crate::params::{self, Param};

/// Capability codes used by the output engine.
///
/// Names follow the terminfo short names (`cub1`, `setaf`, `Ss`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cap {
    Acsc,
    Ax,
    Bce,
    Blink,
    Bold,
    Civis,
    Clear,
    Cnorm,
    Colors,
    /// Reset cursor colour (extended `Cr`).
    Cr,
    /// Set cursor colour (extended `Cs`).
    Cs,
    Csr,
    Cub,
    Cub1,
    Cud,
    Cud1,
    Cuf,
    Cuf1,
    Cup,
    Cuu,
    Cuu1,
    Cvvis,
    Dch,
    Dch1,
    Dim,
    Dl,
    Dl1,
    Ech,
    El,
    El1,
    Enacs,
    Fsl,
    Home,
    Hpa,
    Ich,
    Ich1,
    Il,
    Il1,
    Invis,
    Kmous,
    /// OSC 52 selection write (extended `Ms`).
    Ms,
    Op,
    Rev,
    Ri,
    Rmacs,
    Rmcup,
    Rmkx,
    /// Reset cursor style (extended `Se`).
    Se,
    Setab,
    Setaf,
    Sgr0,
    Sitm,
    Smacs,
    Smcup,
    Smkx,
    Smso,
    Smul,
    /// Set cursor style (extended `Ss`).
    Ss,
    /// Direct-colour (24-bit) support (extended `Tc`).
    Tc,
    Tsl,
    Vpa,
    Xenl,
    Xt,
}

impl Cap {
    pub const COUNT: usize = Cap::Xt as usize + 1;
}

/// A capability value: terminfo has three kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CapValue {
    Flag(bool),
    Number(u32),
    String(String),
}

bitflags! {
    /// Derived or asserted terminal features.
    ///
    /// `TermCaps` derives these from the entry itself; a `Tty` may carry a
    /// second set asserted by the user (force-256 and friends) that is OR'd
    /// in at query sites.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TermFeatures: u8 {
        /// The terminal interprets SGR 38;5 / 48;5 (256-colour palette).
        const COLOURS_256 = 0x01;
        /// The terminal wraps *at* the last column rather than after
        /// writing into it (no eat-newline glitch).
        const EARLYWRAP = 0x02;
        /// screen-style terminal: SITM is advertised but unsafe.
        const SCREEN_LIKE = 0x04;
    }
}

/// Errors from capability resolution.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("unknown terminal: {0}")]
    Unknown(String),
    #[error("terminal {name:?} missing required capability {cap:?}")]
    MissingCapability { name: String, cap: Cap },
}

/// Known terminal profiles, resolvable from a `TERM` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermProfile {
    Modern,
    Xterm256Color,
    Xterm,
    Screen256Color,
    Screen,
    Vt100,
    Dumb,
}

impl TermProfile {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Modern => "xterm-direct",
            Self::Xterm256Color => "xterm-256color",
            Self::Xterm => "xterm",
            Self::Screen256Color => "screen-256color",
            Self::Screen => "screen",
            Self::Vt100 => "vt100",
            Self::Dumb => "dumb",
        }
    }
}

impl FromStr for TermProfile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xterm-direct" | "xterm-truecolor" => Ok(Self::Modern),
            "xterm-256color" | "xterm-256" => Ok(Self::Xterm256Color),
            "xterm" | "xterm-color" | "xterm-16color" => Ok(Self::Xterm),
            "screen-256color" | "tmux-256color" => Ok(Self::Screen256Color),
            "screen" | "tmux" => Ok(Self::Screen),
            "vt100" | "vt102" => Ok(Self::Vt100),
            "dumb" => Ok(Self::Dumb),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TermProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An array-indexed capability table for one terminal type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermCaps {
    name: String,
    entries: [Option<CapValue>; Cap::COUNT],
    features: TermFeatures,
}

impl TermCaps {
    /// An inert table: every capability reads as absent.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: [const { None }; Cap::COUNT],
            features: TermFeatures::empty(),
        }
    }

    /// Resolve a `TERM` name to a capability table.
    pub fn find(name: &str) -> Result<Self, TermError> {
        let profile = TermProfile::from_str(name)
            .map_err(|()| TermError::Unknown(name.to_string()))?;
        Ok(Self::from_profile(profile))
    }

    /// Build the table for a known profile.
    #[must_use]
    pub fn from_profile(profile: TermProfile) -> Self {
        match profile {
            TermProfile::Modern => Self::modern(),
            TermProfile::Xterm256Color => Self::xterm_256color(),
            TermProfile::Xterm => Self::xterm(),
            TermProfile::Screen256Color => Self::screen_256color(),
            TermProfile::Screen => Self::screen(),
            TermProfile::Vt100 => Self::vt100(),
            TermProfile::Dumb => Self::dumb(),
        }
    }

    /// Check the capabilities the engine cannot function without.
    pub fn validate(&self) -> Result<(), TermError> {
        for cap in [Cap::Clear, Cap::Cup] {
            if !self.has(cap) {
                return Err(TermError::MissingCapability {
                    name: self.name.clone(),
                    cap,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn features(&self) -> TermFeatures {
        self.features
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Whether a string capability is present.
    #[must_use]
    pub fn has(&self, cap: Cap) -> bool {
        matches!(self.entries[cap as usize], Some(CapValue::String(_)))
    }

    /// Boolean capability; absent reads as false.
    #[must_use]
    pub fn flag(&self, cap: Cap) -> bool {
        matches!(self.entries[cap as usize], Some(CapValue::Flag(true)))
    }

    /// Numeric capability; absent reads as zero.
    #[must_use]
    pub fn number(&self, cap: Cap) -> u32 {
        match self.entries[cap as usize] {
            Some(CapValue::Number(n)) => n,
            _ => 0,
        }
    }

    /// Raw template for a string capability.
    #[must_use]
    pub fn string(&self, cap: Cap) -> Option<&str> {
        match &self.entries[cap as usize] {
            Some(CapValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Expand a string capability with parameters.
    #[must_use]
    pub fn expand(&self, cap: Cap, args: &[Param<'_>]) -> Option<Vec<u8>> {
        self.string(cap).map(|t| params::expand(t, args))
    }

    // ── Mutation (profile construction and test fixtures) ─────────────

    pub fn set_string(&mut self, cap: Cap, template: &str) -> &mut Self {
        self.entries[cap as usize] = Some(CapValue::String(template.to_string()));
        self
    }

    pub fn set_flag(&mut self, cap: Cap, value: bool) -> &mut Self {
        self.entries[cap as usize] = Some(CapValue::Flag(value));
        self
    }

    pub fn set_number(&mut self, cap: Cap, value: u32) -> &mut Self {
        self.entries[cap as usize] = Some(CapValue::Number(value));
        self
    }

    pub fn remove(&mut self, cap: Cap) -> &mut Self {
        self.entries[cap as usize] = None;
        self
    }

    pub fn set_features(&mut self, features: TermFeatures) -> &mut Self {
        self.features = features;
        self
    }

    /// Recompute derived features from the entry contents.
    fn derive_features(&mut self) {
        if !self.flag(Cap::Xenl) {
            self.features |= TermFeatures::EARLYWRAP;
        }
        if self.number(Cap::Colors) >= 256 {
            self.features |= TermFeatures::COLOURS_256;
        }
    }

    // ── Profiles ───────────────────────────────────────────────────────

    /// Shared CSI plumbing for the xterm family.
    fn xterm_base(name: &str) -> Self {
        let mut t = Self::empty(name);
        t.set_string(Cap::Acsc, ACSC_PAIRS)
            .set_string(Cap::Blink, "\x1b[5m")
            .set_string(Cap::Bold, "\x1b[1m")
            .set_string(Cap::Civis, "\x1b[?25l")
            .set_string(Cap::Clear, "\x1b[H\x1b[2J")
            .set_string(Cap::Cnorm, "\x1b[?12l\x1b[?25h")
            .set_string(Cap::Csr, "\x1b[%i%p1%d;%p2%dr")
            .set_string(Cap::Cub, "\x1b[%p1%dD")
            .set_string(Cap::Cub1, "\x08")
            .set_string(Cap::Cud, "\x1b[%p1%dB")
            .set_string(Cap::Cud1, "\n")
            .set_string(Cap::Cuf, "\x1b[%p1%dC")
            .set_string(Cap::Cuf1, "\x1b[C")
            .set_string(Cap::Cup, "\x1b[%i%p1%d;%p2%dH")
            .set_string(Cap::Cuu, "\x1b[%p1%dA")
            .set_string(Cap::Cuu1, "\x1b[A")
            .set_string(Cap::Cvvis, "\x1b[?12;25h")
            .set_string(Cap::Dch, "\x1b[%p1%dP")
            .set_string(Cap::Dch1, "\x1b[P")
            .set_string(Cap::Dim, "\x1b[2m")
            .set_string(Cap::Dl, "\x1b[%p1%dM")
            .set_string(Cap::Dl1, "\x1b[M")
            .set_string(Cap::Ech, "\x1b[%p1%dX")
            .set_string(Cap::El, "\x1b[K")
            .set_string(Cap::El1, "\x1b[1K")
            .set_string(Cap::Fsl, "\x07")
            .set_string(Cap::Home, "\x1b[H")
            .set_string(Cap::Hpa, "\x1b[%i%p1%dG")
            .set_string(Cap::Ich, "\x1b[%p1%d@")
            .set_string(Cap::Il, "\x1b[%p1%dL")
            .set_string(Cap::Il1, "\x1b[L")
            .set_string(Cap::Invis, "\x1b[8m")
            .set_string(Cap::Kmous, "\x1b[M")
            .set_string(Cap::Op, "\x1b[39;49m")
            .set_string(Cap::Rev, "\x1b[7m")
            .set_string(Cap::Ri, "\x1bM")
            .set_string(Cap::Rmacs, "\x1b(B")
            .set_string(Cap::Rmcup, "\x1b[?1049l")
            .set_string(Cap::Rmkx, "\x1b[?1l\x1b>")
            .set_string(Cap::Sgr0, "\x1b[0m")
            .set_string(Cap::Sitm, "\x1b[3m")
            .set_string(Cap::Smacs, "\x1b(0")
            .set_string(Cap::Smcup, "\x1b[?1049h")
            .set_string(Cap::Smkx, "\x1b[?1h\x1b=")
            .set_string(Cap::Smso, "\x1b[7m")
            .set_string(Cap::Smul, "\x1b[4m")
            .set_string(Cap::Tsl, "\x1b]2;")
            .set_string(Cap::Vpa, "\x1b[%i%p1%dd")
            .set_flag(Cap::Ax, true)
            .set_flag(Cap::Bce, true)
            .set_flag(Cap::Xenl, true)
            .set_flag(Cap::Xt, true);
        t
    }

    /// Basic 8-colour xterm.
    #[must_use]
    pub fn xterm() -> Self {
        let mut t = Self::xterm_base("xterm");
        t.set_string(Cap::Setaf, "\x1b[3%p1%dm")
            .set_string(Cap::Setab, "\x1b[4%p1%dm")
            .set_number(Cap::Colors, 8);
        t.derive_features();
        t
    }

    /// Standard xterm with the 256-colour palette, cursor styling and
    /// OSC 52 selection support.
    #[must_use]
    pub fn xterm_256color() -> Self {
        let mut t = Self::xterm_base("xterm-256color");
        t.set_string(Cap::Setaf, SETAF_256)
            .set_string(Cap::Setab, SETAB_256)
            .set_number(Cap::Colors, 256)
            .set_string(Cap::Ms, "\x1b]52;%p1%s;%p2%s\x07")
            .set_string(Cap::Ss, "\x1b[%p1%d q")
            .set_string(Cap::Se, "\x1b[2 q")
            .set_string(Cap::Cs, "\x1b]12;%p1%s\x07")
            .set_string(Cap::Cr, "\x1b]112\x07");
        t.derive_features();
        t
    }

    /// Direct-colour terminal (WezTerm, Alacritty, Ghostty and friends).
    #[must_use]
    pub fn modern() -> Self {
        let mut t = Self::xterm_256color();
        t.name = "xterm-direct".to_string();
        t.set_flag(Cap::Tc, true);
        t
    }

    /// GNU screen: 8 colours, no BCE, no ECH, no HPA/VPA.
    #[must_use]
    pub fn screen() -> Self {
        let mut t = Self::xterm_base("screen");
        t.remove(Cap::Ech)
            .remove(Cap::Hpa)
            .remove(Cap::Vpa)
            .remove(Cap::Sitm)
            .remove(Cap::Cvvis)
            .set_string(Cap::Cnorm, "\x1b[?25h")
            .set_string(Cap::Enacs, "\x1b(B\x1b)0")
            .set_string(Cap::Smacs, "\x0e")
            .set_string(Cap::Rmacs, "\x0f")
            .set_string(Cap::Setaf, "\x1b[3%p1%dm")
            .set_string(Cap::Setab, "\x1b[4%p1%dm")
            .set_number(Cap::Colors, 8)
            .set_flag(Cap::Bce, false);
        t.features |= TermFeatures::SCREEN_LIKE;
        t.derive_features();
        t
    }

    /// GNU screen compiled with 256-colour support. Still no BCE.
    #[must_use]
    pub fn screen_256color() -> Self {
        let mut t = Self::screen();
        t.name = "screen-256color".to_string();
        t.set_string(Cap::Setaf, SETAF_256)
            .set_string(Cap::Setab, SETAB_256)
            .set_string(Cap::Sitm, "\x1b[3m")
            .set_number(Cap::Colors, 256);
        t.derive_features();
        t
    }

    /// Monochrome VT100: cursor addressing and a scroll region, nothing
    /// colourful, no insert/delete primitives.
    #[must_use]
    pub fn vt100() -> Self {
        let mut t = Self::empty("vt100");
        t.set_string(Cap::Acsc, ACSC_PAIRS)
            .set_string(Cap::Blink, "\x1b[5m")
            .set_string(Cap::Bold, "\x1b[1m")
            .set_string(Cap::Clear, "\x1b[H\x1b[2J")
            .set_string(Cap::Csr, "\x1b[%i%p1%d;%p2%dr")
            .set_string(Cap::Cub, "\x1b[%p1%dD")
            .set_string(Cap::Cub1, "\x08")
            .set_string(Cap::Cud, "\x1b[%p1%dB")
            .set_string(Cap::Cud1, "\n")
            .set_string(Cap::Cuf, "\x1b[%p1%dC")
            .set_string(Cap::Cuf1, "\x1b[C")
            .set_string(Cap::Cup, "\x1b[%i%p1%d;%p2%dH")
            .set_string(Cap::Cuu, "\x1b[%p1%dA")
            .set_string(Cap::Cuu1, "\x1b[A")
            .set_string(Cap::El, "\x1b[K")
            .set_string(Cap::El1, "\x1b[1K")
            .set_string(Cap::Enacs, "\x1b(B\x1b)0")
            .set_string(Cap::Home, "\x1b[H")
            .set_string(Cap::Ri, "\x1bM")
            .set_string(Cap::Rmacs, "\x0f")
            .set_string(Cap::Rmkx, "\x1b[?1l\x1b>")
            .set_string(Cap::Sgr0, "\x1b[0m")
            .set_string(Cap::Smacs, "\x0e")
            .set_string(Cap::Smkx, "\x1b[?1h\x1b=")
            .set_string(Cap::Smso, "\x1b[7m")
            .set_string(Cap::Smul, "\x1b[4m")
            .set_string(Cap::Rev, "\x1b[7m")
            .set_flag(Cap::Xenl, true);
        t.derive_features();
        t
    }

    /// Line-printer terminal. Fails [`validate`](Self::validate).
    #[must_use]
    pub fn dumb() -> Self {
        let mut t = Self::empty("dumb");
        t.set_string(Cap::Cud1, "\n");
        t.derive_features();
        t
    }
}

/// The VT100 alternate character set, identity-mapped (`a` draws as the
/// terminal's checkerboard, `q` as a horizontal line, and so on).
const ACSC_PAIRS: &str = "``aaffggiijjkkllmmnnooppqqrrssttuuvvwwxxyyzz{{||}}~~";

const SETAF_256: &str =
    "\x1b[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m";
const SETAB_256: &str =
    "\x1b[%?%p1%{8}%<%t4%p1%d%e%p1%{16}%<%t10%p1%{8}%-%d%e48;5;%p1%d%;m";
