#![forbid(unsafe_code)]

//! Read-only grid, pane and window views.
//!
//! The grid data model proper lives upstream; this module defines the
//! minimal shapes the output engine reads: a [`Screen`] of styled lines,
//! the [`Pane`] placing one screen inside the terminal, and the
//! [`Window`] carrying the style options panes inherit default colours
//! from. The engine's only write across this graph is the deferred-redraw
//! mark on a pane, which is interior-mutable because the engine runs
//! single-threaded inside the event loop.

use std::cell::Cell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::cell::GridCell;

bitflags! {
    /// Marks the engine may leave on a pane for the higher layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PaneFlags: u8 {
        /// The pane should be fully redrawn by the next redraw pass.
        const REDRAW = 0x01;
        /// The pane is being torn down; skip writes.
        const DROP = 0x02;
    }
}

bitflags! {
    /// Window-level marks read by the dispatch gate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowFlags: u8 {
        const REDRAW = 0x01;
    }
}

/// One row of the visible grid.
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub cells: Vec<GridCell>,
    /// The row ended in a natural wrap onto the next row.
    pub wrapped: bool,
}

/// A logical screen: the visible grid plus the cursor/region state the
/// emulation layer maintains for it.
#[derive(Debug, Clone)]
pub struct Screen {
    sx: u16,
    sy: u16,
    lines: Vec<Line>,
    /// Pane-relative scroll region.
    pub rupper: u16,
    pub rlower: u16,
    /// Cursor style requested by the application (0 = default).
    pub cstyle: u16,
    /// Cursor colour requested by the application (empty = default).
    pub ccolour: String,
    /// Style applied to selected cells, when a selection is active.
    sel_style: Option<GridCell>,
}

impl Screen {
    #[must_use]
    pub fn new(sx: u16, sy: u16) -> Self {
        Self {
            sx,
            sy,
            lines: (0..sy).map(|_| Line::default()).collect(),
            rupper: 0,
            rlower: sy.saturating_sub(1),
            cstyle: 0,
            ccolour: String::new(),
            sel_style: None,
        }
    }

    #[must_use]
    pub fn sx(&self) -> u16 {
        self.sx
    }

    #[must_use]
    pub fn sy(&self) -> u16 {
        self.sy
    }

    #[must_use]
    pub fn line(&self, py: u16) -> Option<&Line> {
        self.lines.get(py as usize)
    }

    /// Number of populated cells on a row; columns past this are blank.
    #[must_use]
    pub fn cellsize(&self, py: u16) -> u16 {
        self.line(py).map_or(0, |l| l.cells.len() as u16)
    }

    /// Read one cell; unpopulated positions read as the default cell.
    #[must_use]
    pub fn cell(&self, px: u16, py: u16) -> GridCell {
        self.line(py)
            .and_then(|l| l.cells.get(px as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Restyle a cell with the selection style, keeping its content.
    #[must_use]
    pub fn select_cell(&self, gc: &GridCell) -> GridCell {
        match &self.sel_style {
            Some(sel) => GridCell {
                ch: gc.ch,
                width: gc.width,
                attr: sel.attr,
                fg: sel.fg,
                bg: sel.bg,
            },
            None => *gc,
        }
    }

    // Construction helpers for the layers (and tests) that populate grids.

    pub fn put_cell(&mut self, px: u16, py: u16, gc: GridCell) {
        if py >= self.sy || px >= self.sx {
            return;
        }
        let line = &mut self.lines[py as usize];
        if line.cells.len() <= px as usize {
            line.cells.resize(px as usize + 1, GridCell::DEFAULT);
        }
        line.cells[px as usize] = gc;
    }

    pub fn put_str(&mut self, px: u16, py: u16, s: &str) {
        let mut x = px;
        for ch in s.chars() {
            let gc = GridCell::from_char(ch);
            let w = gc.width.max(1) as u16;
            self.put_cell(x, py, gc);
            x += w;
        }
    }

    pub fn set_wrapped(&mut self, py: u16, wrapped: bool) {
        if let Some(line) = self.lines.get_mut(py as usize) {
            line.wrapped = wrapped;
        }
    }

    pub fn set_selection_style(&mut self, style: Option<GridCell>) {
        self.sel_style = style;
    }
}

/// Style options attached to a window's option table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleOptions {
    pub window_style: GridCell,
    pub window_active_style: GridCell,
}

/// A window: shared style state for the panes it contains.
#[derive(Debug)]
pub struct Window {
    pub id: u32,
    options: std::cell::RefCell<StyleOptions>,
    style: Cell<GridCell>,
    active_style: Cell<GridCell>,
    style_changed: Cell<bool>,
    pub flags: Cell<WindowFlags>,
}

impl Window {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            options: std::cell::RefCell::new(StyleOptions::default()),
            style: Cell::new(GridCell::DEFAULT),
            active_style: Cell::new(GridCell::DEFAULT),
            style_changed: Cell::new(false),
            flags: Cell::new(WindowFlags::empty()),
        }
    }

    /// Update the option table; cached copies refresh on the next fetch.
    pub fn set_style_options(&self, options: StyleOptions) {
        *self.options.borrow_mut() = options;
        self.style_changed.set(true);
    }

    /// The cached (window, active) style pair, refetched from the option
    /// table when it changed since the last fetch.
    #[must_use]
    pub fn styles(&self) -> (GridCell, GridCell) {
        if self.style_changed.replace(false) {
            let opts = self.options.borrow();
            self.style.set(opts.window_style);
            self.active_style.set(opts.window_active_style);
        }
        (self.style.get(), self.active_style.get())
    }
}

/// A rectangular region of the terminal showing one screen.
#[derive(Debug)]
pub struct Pane {
    pub id: u32,
    pub window: Rc<Window>,
    /// Offset of the pane within the terminal.
    pub xoff: u16,
    pub yoff: u16,
    pub screen: Screen,
    /// Explicit pane style (`Colour::Default` components defer to the
    /// window styles).
    pub style: GridCell,
    /// Whether this is the window's active pane.
    pub active: bool,
    pub visible: bool,
    pub flags: Cell<PaneFlags>,
}

impl Pane {
    #[must_use]
    pub fn new(id: u32, window: Rc<Window>, sx: u16, sy: u16) -> Self {
        Self {
            id,
            window,
            xoff: 0,
            yoff: 0,
            screen: Screen::new(sx, sy),
            style: GridCell::DEFAULT,
            active: true,
            visible: true,
            flags: Cell::new(PaneFlags::empty()),
        }
    }

    #[must_use]
    pub fn sx(&self) -> u16 {
        self.screen.sx()
    }

    #[must_use]
    pub fn sy(&self) -> u16 {
        self.screen.sy()
    }

    pub fn mark(&self, flag: PaneFlags) {
        self.flags.set(self.flags.get() | flag);
    }
}
