#![forbid(unsafe_code)]

//! Terminal output engine: differential rendering of pane grids onto a
//! physical terminal through terminfo-parameterized sequences.
//!
//! The engine keeps a shadow of the terminal's observable state (cursor,
//! scroll region, SGR attributes, modes) and emits the minimum byte
//! stream needed to reconcile it with each pane's grid, selecting the
//! cheapest capability the terminal declares and falling back to
//! redraws when none applies.

pub mod attributes;
pub mod cell;
pub mod colour;
pub mod commands;
pub mod draw;
pub mod screen;
pub mod sink;
pub mod terminal_model;
pub mod tty;

#[cfg(unix)]
pub mod resize_signal;

pub use attributes::default_colours;
pub use cell::{Attrs, GridCell};
pub use colour::Colour;
pub use commands::{Client, ScreenCommand, TtyCtx, write};
pub use screen::{Line, Pane, PaneFlags, Screen, StyleOptions, Window, WindowFlags};
pub use sink::{OutputSink, open_default_log};
pub use tty::{Mode, Tty, TtyError, TtyFlags};
