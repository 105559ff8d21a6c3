#![forbid(unsafe_code)]

//! Capability layer: terminfo-style tables and parametric string expansion.

pub mod caps;
pub mod params;

pub use caps::{Cap, TermCaps, TermError, TermFeatures, TermProfile};
pub use params::Param;
