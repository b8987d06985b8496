//! Terminal grid data model
//!
//! 2D cell array shared with the VT interpreter collaborator.
//! The interpreter mutates cells, cursor and modes between dispatch
//! iterations; this crate only reads them during render scans and
//! flips per-row dirty flags. Single-threaded by contract, so no
//! locking is involved.

use bitflags::bitflags;
use std::os::fd::BorrowedFd;
use unicode_width::UnicodeWidthChar;

bitflags! {
    /// Cell character attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellAttrs: u16 {
        const BOLD      = 0b0000_0000_0001;
        const FAINT     = 0b0000_0000_0010;
        const ITALIC    = 0b0000_0000_0100;
        const UNDERLINE = 0b0000_0000_1000;
        const BLINK     = 0b0000_0001_0000;
        const REVERSE   = 0b0000_0010_0000;
        const INVISIBLE = 0b0000_0100_0000;
        const STRIKE    = 0b0000_1000_0000;
        /// Head cell of a double-width glyph
        const WIDE      = 0b0001_0000_0000;
        /// Spacer cell following a WIDE head; never drawn
        const WDUMMY    = 0b0010_0000_0000;
    }
}

bitflags! {
    /// Terminal mode flags (DECSET/DECRST), owned by the interpreter
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TermMode: u32 {
        /// Alternate screen active (?1049)
        const ALTSCREEN  = 1 << 0;
        /// Mouse press/release reporting (?1000)
        const MOUSE_BTN  = 1 << 1;
        /// Mouse motion-while-pressed reporting (?1002)
        const MOUSE_MOTION = 1 << 2;
        /// Mouse any-motion reporting (?1003)
        const MOUSE_MANY = 1 << 3;
        /// Legacy X10 mouse reporting (?9), no modifiers in reports
        const MOUSE_X10  = 1 << 4;
        /// SGR extended mouse coordinates (?1006)
        const MOUSE_SGR  = 1 << 5;
        /// Focus in/out reporting (?1004)
        const FOCUS      = 1 << 6;
        /// Global reverse video (DECSCNM)
        const REVERSE    = 1 << 7;
        /// Cursor hidden (?25 reset)
        const HIDE       = 1 << 8;
        /// Keyboard locked (KAM)
        const KBDLOCK    = 1 << 9;
        /// Meta sets the eighth bit instead of prefixing ESC
        const EIGHT_BIT  = 1 << 10;
        /// Blink phase: set while blinking glyphs are in the "off" state
        const BLINK      = 1 << 11;
        /// Application cursor keys (DECCKM)
        const APPCURSOR  = 1 << 12;
        /// Application keypad (DECKPAM)
        const APPKEYPAD  = 1 << 13;
        /// Bracketed paste (?2004)
        const BRACKETED_PASTE = 1 << 14;

        /// Any mouse reporting variant active
        const MOUSE = Self::MOUSE_BTN.bits() | Self::MOUSE_MOTION.bits()
                    | Self::MOUSE_MANY.bits() | Self::MOUSE_X10.bits();
    }
}

/// Cell color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Default foreground/background from the palette
    #[default]
    Default,
    /// 256-color palette index
    Indexed(u8),
    /// True color (24bit RGB)
    Rgb(u8, u8, u8),
}

/// Data for one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Character code
    pub u: char,
    /// Attribute flags
    pub mode: CellAttrs,
    pub fg: Color,
    pub bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            u: ' ',
            mode: CellAttrs::empty(),
            fg: Color::Default,
            bg: Color::Default,
        }
    }
}

impl Cell {
    /// Cells are batched together while these compare equal
    pub fn attrs_eq(&self, other: &Cell) -> bool {
        self.mode == other.mode && self.fg == other.fg && self.bg == other.bg
    }

    /// Cell count occupied by this glyph (1, or 2 for WIDE heads)
    pub fn width(&self) -> usize {
        if self.mode.contains(CellAttrs::WIDE) {
            2
        } else {
            1
        }
    }
}

/// Cursor position within the grid
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

/// Outbound channel to the pty/interpreter collaborator.
///
/// The embedder implements this over its child process: `write`
/// forwards raw input byte sequences, `resize` propagates grid size
/// changes (e.g. TIOCSWINSZ plus interpreter reflow), `hangup`
/// signals the child when the compositor asks the window to close.
pub trait Tty {
    fn write(&mut self, bytes: &[u8]);
    fn resize(&mut self, cols: usize, rows: usize);
    fn hangup(&mut self);

    /// File descriptor the event loop polls for pending grid updates
    fn fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    /// Process pending updates, mutating the grid. Returns whether
    /// anything changed (triggering a redraw).
    fn drain(&mut self, _term: &mut Term) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Terminal screen state
#[derive(Debug)]
pub struct Term {
    cols: usize,
    rows: usize,
    lines: Vec<Vec<Cell>>,
    dirty: Vec<bool>,
    pub cursor: Cursor,
    pub mode: TermMode,
}

impl Term {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            lines: vec![vec![Cell::default(); cols]; rows],
            dirty: vec![true; rows],
            cursor: Cursor::default(),
            mode: TermMode::default(),
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn line(&self, y: usize) -> &[Cell] {
        &self.lines[y]
    }

    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.lines[y][x]
    }

    /// Write one glyph. Wide glyphs occupy a WIDE head plus a WDUMMY
    /// spacer; the spacer is skipped by render scans.
    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) {
        if y >= self.rows || x >= self.cols {
            return;
        }
        let wide = cell.u.width().unwrap_or(1) > 1;
        let line = &mut self.lines[y];
        line[x] = cell;
        if wide {
            line[x].mode.insert(CellAttrs::WIDE);
            if x + 1 < self.cols {
                line[x + 1] = Cell {
                    mode: CellAttrs::WDUMMY,
                    ..cell
                };
            }
        }
        self.dirty[y] = true;
    }

    pub fn is_dirty(&self, y: usize) -> bool {
        self.dirty[y]
    }

    pub fn clear_dirty(&mut self, y: usize) {
        self.dirty[y] = false;
    }

    /// Mark an inclusive row range dirty
    pub fn set_dirty(&mut self, top: usize, bot: usize) {
        let bot = bot.min(self.rows - 1);
        for y in top..=bot {
            self.dirty[y] = true;
        }
    }

    /// Mark every row dirty (full redraw)
    pub fn full_dirt(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = true);
    }

    /// Resize the grid, preserving the top-left content region.
    /// A no-op when the size is unchanged.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        if cols == self.cols && rows == self.rows {
            return;
        }
        self.lines.resize(rows, vec![Cell::default(); self.cols]);
        for line in &mut self.lines {
            line.resize(cols, Cell::default());
        }
        self.cols = cols;
        self.rows = rows;
        self.dirty = vec![true; rows];
        self.cursor.x = self.cursor.x.min(cols - 1);
        self.cursor.y = self.cursor.y.min(rows - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_preserves_content() {
        let mut term = Term::new(10, 4);
        term.set_cell(2, 1, Cell { u: 'x', ..Cell::default() });
        term.resize(6, 8);
        assert_eq!(term.cell(2, 1).u, 'x');
        assert_eq!(term.cols(), 6);
        assert_eq!(term.rows(), 8);
        assert!(term.is_dirty(7));
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let mut term = Term::new(10, 4);
        for y in 0..4 {
            term.clear_dirty(y);
        }
        term.resize(10, 4);
        assert!(!term.is_dirty(0));
    }

    #[test]
    fn test_wide_glyph_gets_spacer() {
        let mut term = Term::new(10, 2);
        term.set_cell(3, 0, Cell { u: '世', ..Cell::default() });
        assert!(term.cell(3, 0).mode.contains(CellAttrs::WIDE));
        assert!(term.cell(4, 0).mode.contains(CellAttrs::WDUMMY));
    }

    #[test]
    fn test_cursor_clamped_on_shrink() {
        let mut term = Term::new(20, 10);
        term.cursor = Cursor { x: 19, y: 9 };
        term.resize(5, 3);
        assert_eq!(term.cursor.x, 4);
        assert_eq!(term.cursor.y, 2);
    }
}
