//! Pointer input: text selection and mouse reporting
//!
//! Outside mouse-reporting mode the pointer drives the selection
//! state machine: press anchors, motion extends, release finalizes
//! into the clipboard source role. Click timing against the double/
//! triple windows upgrades snapping to word or line. With a mouse
//! mode active (and the force-select modifier up) events are instead
//! encoded as terminal mouse-protocol reports and selection is
//! bypassed entirely.

use crate::input::ModMask;
use crate::term::{CellAttrs, Term, TermMode};

/// Linux input button codes as delivered by wl_pointer
pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
pub const BTN_MIDDLE: u32 = 0x112;

/// Sentinel for "no button held" in motion reports
const NO_BUTTON: u32 = 3;

/// Largest coordinate encodable in the legacy report format
const X10_COORD_MAX: usize = 222;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelMode {
    /// No gesture in progress
    #[default]
    Idle,
    /// Anchored by a press, nothing swept yet
    Empty,
    /// Has extent; release will finalize it
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelType {
    #[default]
    Regular,
    Rectangular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelSnap {
    #[default]
    None,
    Word,
    Line,
}

/// Grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

/// Text selection state.
///
/// `nb`/`ne` are the normalized begin/end (begin <= end in reading
/// order, maintained after every mutation); `ob`/`oe` keep the raw
/// anchor and sweep positions the normalization derives from.
#[derive(Debug, Default)]
pub struct Selection {
    pub mode: SelMode,
    pub stype: SelType,
    pub snap: SelSnap,
    pub nb: Point,
    pub ne: Point,
    pub ob: Point,
    pub oe: Point,
    /// Selection was made on the alternate screen
    pub alt: bool,
    /// Owned primary text, present from finalize until cleared.
    /// The clipboard source exists exactly while this is Some.
    pub primary: Option<String>,
    exists: bool,
    tclick1: u32,
    tclick2: u32,
    double_ms: u32,
    triple_ms: u32,
    word_delims: String,
}

impl Selection {
    pub fn new(double_ms: u32, triple_ms: u32, word_delims: &str) -> Self {
        Self {
            double_ms,
            triple_ms,
            word_delims: word_delims.to_string(),
            ..Self::default()
        }
    }

    /// Row span of the current selection, for dirtying
    pub fn rows(&self) -> Option<(usize, usize)> {
        self.exists.then_some((self.nb.y, self.ne.y))
    }

    /// Drop the highlight. The primary buffer survives until the
    /// clipboard source it backs is superseded or replaced. Returns
    /// the rows that need a redraw.
    pub fn clear(&mut self) -> Option<(usize, usize)> {
        let rows = self.rows();
        self.exists = false;
        self.mode = SelMode::Idle;
        rows
    }

    /// Drop the primary buffer; paired with losing the clipboard
    /// source so the two stay coupled.
    pub fn clear_primary(&mut self) {
        self.primary = None;
    }

    /// Anchor a new selection at a pressed cell. Click timing against
    /// the stored thresholds upgrades the snap: a press within the
    /// triple window of the click before last snaps to lines, within
    /// the double window of the last click to words. Snapped
    /// selections are immediately ready.
    pub fn begin(&mut self, term: &Term, x: usize, y: usize, time: u32, rect: bool) {
        self.exists = true;
        self.mode = SelMode::Empty;
        self.stype = if rect {
            SelType::Rectangular
        } else {
            SelType::Regular
        };
        self.alt = term.mode.contains(TermMode::ALTSCREEN);
        self.ob = Point { x, y };
        self.oe = Point { x, y };

        self.snap = if time.wrapping_sub(self.tclick2) <= self.triple_ms {
            SelSnap::Line
        } else if time.wrapping_sub(self.tclick1) <= self.double_ms {
            SelSnap::Word
        } else {
            SelSnap::None
        };
        self.normalize(term);

        if self.snap != SelSnap::None {
            self.mode = SelMode::Ready;
        }
        self.tclick2 = self.tclick1;
        self.tclick1 = time;
    }

    /// Extend the sweep to a new cell. Returns the union of old and
    /// new row spans when the end point actually moved (the redraw
    /// region); None when nothing changed or no gesture is active.
    pub fn extend(&mut self, term: &Term, x: usize, y: usize, rect: bool) -> Option<(usize, usize)> {
        if self.mode == SelMode::Idle || !self.exists {
            return None;
        }
        self.mode = SelMode::Ready;
        let old_oe = self.oe;
        let (old_top, old_bot) = (self.nb.y, self.ne.y);
        self.oe = Point { x, y };
        self.stype = if rect {
            SelType::Rectangular
        } else {
            SelType::Regular
        };
        self.normalize(term);
        if old_oe != self.oe {
            Some((self.nb.y.min(old_top), self.ne.y.max(old_bot)))
        } else {
            None
        }
    }

    /// Re-derive nb/ne from ob/oe and apply snapping. Maintains the
    /// begin <= end invariant for both selection types.
    pub fn normalize(&mut self, term: &Term) {
        if self.stype == SelType::Regular && self.ob.y != self.oe.y {
            self.nb.x = if self.ob.y < self.oe.y {
                self.ob.x
            } else {
                self.oe.x
            };
            self.ne.x = if self.ob.y < self.oe.y {
                self.oe.x
            } else {
                self.ob.x
            };
        } else {
            self.nb.x = self.ob.x.min(self.oe.x);
            self.ne.x = self.ob.x.max(self.oe.x);
        }
        self.nb.y = self.ob.y.min(self.oe.y);
        self.ne.y = self.ob.y.max(self.oe.y);

        match self.snap {
            SelSnap::None => {}
            SelSnap::Line => {
                self.nb.x = 0;
                self.ne.x = term.cols() - 1;
            }
            SelSnap::Word => {
                self.snap_word(term);
            }
        }
    }

    /// Expand both ends over the run of same-class characters:
    /// non-delimiters extend across non-delimiters, a delimiter
    /// extends across copies of itself.
    fn snap_word(&mut self, term: &Term) {
        let delim = |ch: char| self.word_delims.contains(ch);

        let start = term.cell(self.nb.x, self.nb.y).u;
        let start_delim = delim(start);
        while self.nb.x > 0 {
            let prev = term.cell(self.nb.x - 1, self.nb.y).u;
            if delim(prev) != start_delim || (start_delim && prev != start) {
                break;
            }
            self.nb.x -= 1;
        }

        let end = term.cell(self.ne.x, self.ne.y).u;
        let end_delim = delim(end);
        while self.ne.x + 1 < term.cols() {
            let next = term.cell(self.ne.x + 1, self.ne.y).u;
            if delim(next) != end_delim || (end_delim && next != end) {
                break;
            }
            self.ne.x += 1;
        }
    }

    /// Whether a cell is inside the selection for rendering purposes
    pub fn selected(&self, x: usize, y: usize, term_mode: TermMode) -> bool {
        if !self.exists
            || self.mode == SelMode::Empty
            || self.alt != term_mode.contains(TermMode::ALTSCREEN)
        {
            return false;
        }
        if y < self.nb.y || y > self.ne.y {
            return false;
        }
        match self.stype {
            SelType::Rectangular => x >= self.nb.x && x <= self.ne.x,
            SelType::Regular => {
                (y != self.nb.y || x >= self.nb.x) && (y != self.ne.y || x <= self.ne.x)
            }
        }
    }

    /// Extract the selected text in reading order: per-row spans with
    /// trailing blanks trimmed, rows joined by newlines. Wide-glyph
    /// spacer cells are skipped.
    pub fn extract(&self, term: &Term) -> Option<String> {
        if !self.exists || self.mode != SelMode::Ready {
            return None;
        }
        let mut out = String::new();
        for y in self.nb.y..=self.ne.y {
            let (x0, x1) = match self.stype {
                SelType::Rectangular => (self.nb.x, self.ne.x),
                SelType::Regular => (
                    if y == self.nb.y { self.nb.x } else { 0 },
                    if y == self.ne.y {
                        self.ne.x
                    } else {
                        term.cols() - 1
                    },
                ),
            };
            let line = term.line(y);
            let mut row = String::new();
            for cell in &line[x0..=x1.min(term.cols() - 1)] {
                if cell.mode.contains(CellAttrs::WDUMMY) {
                    continue;
                }
                row.push(cell.u);
            }
            out.push_str(row.trim_end());
            if y != self.ne.y {
                out.push('\n');
            }
        }
        Some(out)
    }

    /// Finalize after release: keep the text as the primary buffer.
    /// Returns the text for clipboard-source registration; an empty
    /// gesture yields None.
    pub fn finalize(&mut self, term: &Term) -> Option<String> {
        let text = self.extract(term)?;
        self.mode = SelMode::Idle;
        self.primary = Some(text.clone());
        Some(text)
    }
}

// ============================================================================
// Mouse reporting
// ============================================================================

/// Pointer tracking for mouse-protocol reports
#[derive(Debug)]
pub struct Pointer {
    /// Last pointer position in surface pixels
    pub px: i32,
    pub py: i32,
    /// Last reported cell, for motion deduplication
    oldx: usize,
    oldy: usize,
    /// Encoded code of the held button, NO_BUTTON when none
    oldbutton: u32,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            px: 0,
            py: 0,
            oldx: 0,
            oldy: 0,
            oldbutton: NO_BUTTON,
        }
    }
}

fn button_code(button: u32) -> Option<u32> {
    match button {
        BTN_LEFT => Some(0),
        BTN_MIDDLE => Some(1),
        BTN_RIGHT => Some(2),
        _ => None,
    }
}

/// Modifier bits folded into the report code (not in X10 mode)
fn mod_bits(mods: ModMask, mode: TermMode) -> u32 {
    if mode.contains(TermMode::MOUSE_X10) {
        return 0;
    }
    let mut bits = 0;
    if mods.contains(ModMask::SHIFT) {
        bits += 4;
    }
    if mods.contains(ModMask::ALT) {
        bits += 8;
    }
    if mods.contains(ModMask::CTRL) {
        bits += 16;
    }
    bits
}

/// Encode one report in the active protocol variant
fn encode(code: u32, x: usize, y: usize, press: bool, mode: TermMode) -> Option<Vec<u8>> {
    if mode.contains(TermMode::MOUSE_SGR) {
        let end = if press { 'M' } else { 'm' };
        Some(format!("\x1b[<{};{};{}{}", code, x + 1, y + 1, end).into_bytes())
    } else if x <= X10_COORD_MAX && y <= X10_COORD_MAX {
        Some(vec![
            0x1b,
            b'[',
            b'M',
            32 + code as u8,
            32 + x as u8 + 1,
            32 + y as u8 + 1,
        ])
    } else {
        // unencodable position in the legacy format
        None
    }
}

impl Pointer {
    /// Report pointer motion at a cell. Deduplicates unchanged cells
    /// and honors the active variant: the motion variant only reports
    /// while a button is held, the any-motion variant always.
    pub fn report_motion(&mut self, mode: TermMode, x: usize, y: usize) -> Option<Vec<u8>> {
        if x == self.oldx && y == self.oldy {
            return None;
        }
        if !mode.intersects(TermMode::MOUSE_MOTION | TermMode::MOUSE_MANY) {
            return None;
        }
        if mode.contains(TermMode::MOUSE_MOTION) && self.oldbutton == NO_BUTTON {
            return None;
        }
        self.oldx = x;
        self.oldy = y;
        encode(self.oldbutton + 32, x, y, true, mode)
    }

    /// Report a button press or release
    pub fn report_button(
        &mut self,
        mode: TermMode,
        button: u32,
        press: bool,
        mods: ModMask,
        x: usize,
        y: usize,
    ) -> Option<Vec<u8>> {
        let code = button_code(button)?;
        if press {
            self.oldbutton = code;
            self.oldx = x;
            self.oldy = y;
        } else {
            self.oldbutton = NO_BUTTON;
            // X10 never reports releases
            if mode.contains(TermMode::MOUSE_X10) {
                return None;
            }
        }
        let code = if press || mode.contains(TermMode::MOUSE_SGR) {
            code
        } else {
            NO_BUTTON
        };
        encode(code + mod_bits(mods, mode), x, y, press, mode)
    }

    /// Report one scroll step. Distinct codes per axis and direction.
    pub fn report_axis(&self, mode: TermMode, vertical: bool, dir: i32) -> Option<Vec<u8>> {
        let code = 64 + if vertical { 4 } else { 6 } + if dir > 0 { 1 } else { 0 };
        encode(code, self.oldx, self.oldy, true, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Cell;

    fn term_with(text: &str, y: usize) -> Term {
        let mut term = Term::new(20, 5);
        for (i, ch) in text.chars().enumerate() {
            term.set_cell(i, y, Cell { u: ch, ..Cell::default() });
        }
        term
    }

    #[test]
    fn test_click_snap_windows() {
        let term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        // first click: no prior clicks, no snap
        sel.begin(&term, 3, 1, 10_000, false);
        assert_eq!(sel.snap, SelSnap::None);
        assert_eq!(sel.mode, SelMode::Empty);
        // second click inside the double window: word snap
        sel.begin(&term, 3, 1, 10_200, false);
        assert_eq!(sel.snap, SelSnap::Word);
        assert_eq!(sel.mode, SelMode::Ready);
        // third click inside the triple window of the first: line snap
        sel.begin(&term, 3, 1, 10_400, false);
        assert_eq!(sel.snap, SelSnap::Line);
        assert_eq!(sel.ne.x, 19);
        // a much later click reverts to no snap
        sel.begin(&term, 3, 1, 60_000, false);
        assert_eq!(sel.snap, SelSnap::None);
    }

    #[test]
    fn test_normalize_reading_order() {
        let term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        // sweep upward and to the right: begin must still precede end
        sel.begin(&term, 15, 3, 50_000, false);
        sel.extend(&term, 2, 1, false);
        assert_eq!((sel.nb.x, sel.nb.y), (2, 1));
        assert_eq!((sel.ne.x, sel.ne.y), (15, 3));
    }

    #[test]
    fn test_rectangular_normalize() {
        let term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 10, 3, 50_000, true);
        sel.extend(&term, 4, 1, true);
        assert_eq!((sel.nb.x, sel.nb.y), (4, 1));
        assert_eq!((sel.ne.x, sel.ne.y), (10, 3));
        assert!(sel.selected(7, 2, TermMode::empty()));
        assert!(!sel.selected(2, 2, TermMode::empty()));
    }

    #[test]
    fn test_extend_reports_dirty_union() {
        let term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 0, 2, 50_000, false);
        let dirty = sel.extend(&term, 5, 4, false).unwrap();
        assert_eq!(dirty, (2, 4));
        // unchanged end point reports nothing
        assert!(sel.extend(&term, 5, 4, false).is_none());
        // shrinking back still covers the previously selected rows
        let dirty = sel.extend(&term, 5, 2, false).unwrap();
        assert_eq!(dirty, (2, 4));
    }

    #[test]
    fn test_word_snap_expands_over_word() {
        let term = term_with("foo bar baz", 1);
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 5, 1, 50_000, false); // inside "bar"
        sel.snap = SelSnap::Word;
        sel.normalize(&term);
        assert_eq!(sel.nb.x, 4);
        assert_eq!(sel.ne.x, 6);
    }

    #[test]
    fn test_two_row_drag_extracts_both_rows() {
        let mut term = term_with("hello", 1);
        for (i, ch) in "world".chars().enumerate() {
            term.set_cell(i, 2, Cell { u: ch, ..Cell::default() });
        }
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 0, 1, 50_000, false);
        sel.extend(&term, 4, 2, false);
        let text = sel.finalize(&term).unwrap();
        assert_eq!(text, "hello\nworld");
        assert!(sel.primary.is_some());
        assert_eq!(sel.mode, SelMode::Idle);
    }

    #[test]
    fn test_empty_gesture_finalizes_to_none() {
        let term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 3, 1, 50_000, false);
        // no motion, no snap: still Empty, nothing to finalize
        assert!(sel.finalize(&term).is_none());
        assert!(sel.primary.is_none());
    }

    #[test]
    fn test_selected_respects_alt_screen() {
        let mut term = Term::new(20, 5);
        let mut sel = Selection::new(300, 600, " ");
        sel.begin(&term, 0, 0, 50_000, false);
        sel.extend(&term, 5, 0, false);
        assert!(sel.selected(2, 0, TermMode::empty()));
        term.mode.insert(TermMode::ALTSCREEN);
        assert!(!sel.selected(2, 0, term.mode));
    }

    #[test]
    fn test_motion_report_dedup_and_variants() {
        let mut ptr = Pointer::default();
        let many = TermMode::MOUSE_MANY;
        // moving to a new cell reports, staying put does not
        assert!(ptr.report_motion(many, 2, 3).is_some());
        assert!(ptr.report_motion(many, 2, 3).is_none());
        // motion variant requires a held button
        let motion = TermMode::MOUSE_MOTION;
        assert!(ptr.report_motion(motion, 4, 4).is_none());
        ptr.report_button(motion, BTN_LEFT, true, ModMask::empty(), 4, 4);
        assert!(ptr.report_motion(motion, 5, 4).is_some());
    }

    #[test]
    fn test_button_report_encoding() {
        let mut ptr = Pointer::default();
        let mode = TermMode::MOUSE_BTN;
        let press = ptr
            .report_button(mode, BTN_LEFT, true, ModMask::empty(), 0, 0)
            .unwrap();
        assert_eq!(press, vec![0x1b, b'[', b'M', 32, 33, 33]);
        // legacy release encodes the no-button code
        let release = ptr
            .report_button(mode, BTN_LEFT, false, ModMask::empty(), 0, 0)
            .unwrap();
        assert_eq!(release[3], 32 + 3);
    }

    #[test]
    fn test_button_report_sgr() {
        let mut ptr = Pointer::default();
        let mode = TermMode::MOUSE_BTN | TermMode::MOUSE_SGR;
        let press = ptr
            .report_button(mode, BTN_RIGHT, true, ModMask::empty(), 9, 4)
            .unwrap();
        assert_eq!(press, b"\x1b[<2;10;5M".to_vec());
        let release = ptr
            .report_button(mode, BTN_RIGHT, false, ModMask::empty(), 9, 4)
            .unwrap();
        assert_eq!(release, b"\x1b[<2;10;5m".to_vec());
    }

    #[test]
    fn test_axis_report_codes() {
        let ptr = Pointer::default();
        let mode = TermMode::MOUSE_BTN;
        // vertical up/down and horizontal get distinct codes
        assert_eq!(ptr.report_axis(mode, true, -1).unwrap()[3], 32 + 68);
        assert_eq!(ptr.report_axis(mode, true, 1).unwrap()[3], 32 + 69);
        assert_eq!(ptr.report_axis(mode, false, -1).unwrap()[3], 32 + 70);
        assert_eq!(ptr.report_axis(mode, false, 1).unwrap()[3], 32 + 71);
    }

    #[test]
    fn test_x10_skips_release_and_mods() {
        let mut ptr = Pointer::default();
        let mode = TermMode::MOUSE_X10;
        let press = ptr
            .report_button(mode, BTN_LEFT, true, ModMask::CTRL, 1, 1)
            .unwrap();
        // no modifier bits folded in
        assert_eq!(press[3], 32);
        assert!(ptr
            .report_button(mode, BTN_LEFT, false, ModMask::empty(), 1, 1)
            .is_none());
    }
}
