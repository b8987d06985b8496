//! Glyph rendering pipeline
//!
//! Runs once per dirty frame:
//! - coalesces dirty rows into maximal ranges for damage
//! - batches attribute-equal cell runs within each dirty row
//! - resolves colors (bold brightening, reverse, faint, blink,
//!   invisible) in terminal order
//! - draws glyph runs through the primary face, falling back through
//!   the bounded fallback cache on missing codepoints
//! - composites the cursor, then presents the frame

pub mod painter;

use log::warn;
use std::mem;
use unicode_width::UnicodeWidthChar;

use crate::config::Config;
use crate::font::{style_for, FontSet, GlyphCoverage};
use crate::input::pointer::Selection;
use crate::term::{Cell, CellAttrs, Color, Term, TermMode};
use crate::wayland::window::Window;
use painter::argb;

/// Byte-length cap per draw batch; longer runs are split
pub const BATCH_BYTES_CAP: usize = 1024;

// ============================================================================
// Palette
// ============================================================================

/// Parse 6-digit hex color (e.g., "ff0000"), with or without '#'
fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

fn parse_or(hex: &str, fallback: u32) -> u32 {
    match parse_hex_color(hex) {
        Some((r, g, b)) => argb(r, g, b),
        None => {
            warn!("Invalid color \"{}\"", hex);
            fallback
        }
    }
}

/// Resolved 256-entry palette plus the special colors
pub struct Palette {
    pub colors: [u32; 256],
    pub fg: u32,
    pub bg: u32,
    pub cursor: u32,
    pub reverse_cursor: u32,
    /// Degraded-fidelity foreground for bad-slant/bad-weight faces
    pub default_attr: u32,
}

impl Palette {
    pub fn from_config(cfg: &Config) -> Self {
        let mut colors = [0u32; 256];
        for (i, hex) in cfg.colors.ansi().iter().enumerate() {
            colors[i] = parse_or(hex, argb(0, 0, 0));
        }
        // 6x6x6 color cube
        for i in 16..232 {
            let idx = i - 16;
            let level = |v: u32| if v == 0 { 0 } else { (v * 40 + 55) as u8 };
            colors[i as usize] = argb(
                level(idx / 36),
                level(idx / 6 % 6),
                level(idx % 6),
            );
        }
        // grayscale ramp
        for i in 232..256u32 {
            let v = (8 + (i - 232) * 10) as u8;
            colors[i as usize] = argb(v, v, v);
        }
        Self {
            colors,
            fg: parse_or(&cfg.colors.foreground, argb(0xe5, 0xe5, 0xe5)),
            bg: parse_or(&cfg.colors.background, argb(0, 0, 0)),
            cursor: parse_or(&cfg.colors.cursor, argb(0, 0xcd, 0)),
            reverse_cursor: parse_or(&cfg.colors.reverse_cursor, argb(0xcd, 0, 0)),
            default_attr: parse_or(&cfg.colors.default_attr, argb(0xff, 0, 0)),
        }
    }

    /// Base color lookup, before any attribute transforms
    pub fn resolve(&self, color: Color, is_fg: bool) -> u32 {
        match color {
            Color::Default => {
                if is_fg {
                    self.fg
                } else {
                    self.bg
                }
            }
            Color::Indexed(i) => self.colors[i as usize],
            Color::Rgb(r, g, b) => argb(r, g, b),
        }
    }
}

/// Halve each RGB channel, leaving alpha untouched
fn faint(color: u32) -> u32 {
    (color & 0xff00_0000)
        | ((color >> 16 & 0xff) / 2) << 16
        | ((color >> 8 & 0xff) / 2) << 8
        | (color & 0xff) / 2
}

/// Apply the attribute color pipeline in terminal order: bold
/// brightening of the basic palette, global reverse video, per-glyph
/// reverse, faint, blink phase, invisible.
pub fn resolve_colors(cell: &Cell, pal: &Palette, mode: TermMode) -> (u32, u32) {
    let mut fg = pal.resolve(cell.fg, true);
    let mut bg = pal.resolve(cell.bg, false);

    if cell.mode.contains(CellAttrs::BOLD) && !cell.mode.contains(CellAttrs::FAINT) {
        // basic system colors brighten to their 8-15 counterparts
        if let Color::Indexed(i) = cell.fg {
            if i < 8 {
                fg = pal.colors[i as usize + 8];
            }
        }
    }

    if mode.contains(TermMode::REVERSE) {
        fg = if fg == pal.fg { pal.bg } else { !(fg & 0x00ff_ffff) };
        bg = if bg == pal.bg { pal.fg } else { !(bg & 0x00ff_ffff) };
    }

    if cell.mode.contains(CellAttrs::REVERSE) {
        mem::swap(&mut fg, &mut bg);
    }

    if cell.mode.contains(CellAttrs::FAINT) && !cell.mode.contains(CellAttrs::BOLD) {
        fg = faint(fg);
    }

    if cell.mode.contains(CellAttrs::BLINK) && mode.contains(TermMode::BLINK) {
        fg = bg;
    }

    if cell.mode.contains(CellAttrs::INVISIBLE) {
        fg = bg;
    }

    (fg, bg)
}

// ============================================================================
// Row batching
// ============================================================================

/// One draw batch: a maximal run of attribute-equal cells
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// First cell column
    pub x: usize,
    /// Codepoints of the run (wide spacers excluded)
    pub text: String,
    /// Cell count including wide-glyph second cells
    pub cells: usize,
    /// Shared attributes of the run
    pub base: Cell,
}

/// Split one row into draw batches. Adjacent cells merge while their
/// attributes compare equal and the accumulated byte length stays
/// under the cap; `selected` transiently inverts reverse-video for
/// highlight. Wide-glyph spacer cells extend their run silently.
pub fn batch_row(row: &[Cell], selected: impl Fn(usize) -> bool) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut run: Option<Batch> = None;

    for (x, cell) in row.iter().enumerate() {
        if cell.mode.contains(CellAttrs::WDUMMY) {
            continue;
        }
        let mut cell = *cell;
        if selected(x) {
            cell.mode.toggle(CellAttrs::REVERSE);
        }

        let split = match &run {
            Some(b) => !b.base.attrs_eq(&cell) || b.text.len() + cell.u.len_utf8() > BATCH_BYTES_CAP,
            None => true,
        };
        if split {
            if let Some(b) = run.take() {
                batches.push(b);
            }
            run = Some(Batch {
                x,
                text: String::new(),
                cells: 0,
                base: cell,
            });
        }
        let b = run.as_mut().unwrap();
        b.text.push(cell.u);
        b.cells += cell.width();
    }
    if let Some(b) = run.take() {
        batches.push(b);
    }
    batches
}

/// Coalesce dirty rows into maximal contiguous (top, bottom) ranges
pub fn dirty_ranges(term: &Term) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = None;
    for y in 0..term.rows() {
        match (term.is_dirty(y), start) {
            (true, None) => start = Some(y),
            (false, Some(s)) => {
                ranges.push((s, y - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push((s, term.rows() - 1));
    }
    ranges
}

// ============================================================================
// Renderer
// ============================================================================

/// Frame renderer: owns the palette and the previous cursor cell
pub struct Renderer {
    pub palette: Palette,
    cursor_style: u8,
    cursor_thickness: u32,
    last_cursor: (usize, usize),
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            palette: Palette::from_config(cfg),
            cursor_style: cfg.window.cursor_style,
            cursor_thickness: cfg.window.cursor_thickness.max(1),
            last_cursor: (0, 0),
        }
    }

    /// Draw one frame: damage dirty ranges, redraw dirty rows,
    /// composite the cursor, present.
    pub fn draw(
        &mut self,
        window: &mut Window,
        fonts: &mut FontSet,
        term: &mut Term,
        sel: &Selection,
    ) {
        let ch = window.ch as i32;
        for (y0, y1) in dirty_ranges(term) {
            window.damage(
                0,
                window.border as i32 + y0 as i32 * ch,
                window.w as i32,
                (y1 - y0 + 1) as i32 * ch,
            );
        }

        let mode = term.mode;
        for y in 0..term.rows() {
            if !term.is_dirty(y) {
                continue;
            }
            term.clear_dirty(y);
            let batches = batch_row(term.line(y), |x| sel.selected(x, y, mode));
            for batch in batches {
                self.draw_batch(window, fonts, &batch, y, mode, term.cols(), term.rows());
            }
        }

        self.draw_cursor(window, fonts, term, sel);
        window.present();
    }

    /// Draw one batch: border cleanup, background fill, glyph run,
    /// decoration bars. Port of the per-run half of the row scan.
    fn draw_batch(
        &mut self,
        window: &mut Window,
        fonts: &mut FontSet,
        batch: &Batch,
        y: usize,
        mode: TermMode,
        cols: usize,
        rows: usize,
    ) {
        let (border, cw, ch) = (window.border as i32, window.cw as i32, window.ch as i32);
        let (win_w, win_h) = (window.w as i32, window.h as i32);
        let winx = border + batch.x as i32 * cw;
        let winy = border + y as i32 * ch;
        let width = batch.cells as i32 * cw;

        let mut base = batch.base;
        let bold = base.mode.contains(CellAttrs::BOLD);
        let italic = base.mode.contains(CellAttrs::ITALIC);
        let style = style_for(bold, italic);

        // Degraded-fidelity tint when the native style is unavailable
        let font = fonts.font(style);
        if font.badslant || font.badweight {
            let da = self.palette.default_attr;
            base.fg = Color::Rgb((da >> 16) as u8, (da >> 8) as u8, da as u8);
        }
        let oneatatime = font.width != window.cw;
        let ascent = font.ascent;

        let (fg, bg) = resolve_colors(&base, &self.palette, mode);

        // Border cleanup whenever the batch touches an edge
        let pal_bg = if mode.contains(TermMode::REVERSE) {
            self.palette.fg
        } else {
            self.palette.bg
        };
        if batch.x == 0 {
            window.clear(
                0,
                if y == 0 { 0 } else { winy },
                border,
                if y >= rows - 1 { win_h } else { winy + ch },
                pal_bg,
            );
        }
        if batch.x + batch.cells >= cols {
            window.clear(
                winx + width,
                if y == 0 { 0 } else { winy },
                win_w,
                if y >= rows - 1 { win_h } else { winy + ch },
                pal_bg,
            );
        }
        if y == 0 {
            window.clear(winx, 0, winx + width, border, pal_bg);
        }
        if y == rows - 1 {
            window.clear(winx, winy + ch, winx + width, win_h, pal_bg);
        }

        // Background of the run
        window.fill_rect(winx, winy, width, ch, bg);

        // Glyphs, left to right. Codepoints the primary face covers
        // accumulate into a run whose draw is deferred; a face whose
        // advance differs from the cell width is flushed one glyph at
        // a time so fallback metrics cannot drift the pen.
        let mut cell_off = 0i32;
        let mut run: Vec<(char, i32)> = Vec::new();
        for chr in batch.text.chars() {
            let w = chr.width().unwrap_or(1).max(1) as i32;
            let covered = fonts.font(style).covers(chr);
            if covered {
                run.push((chr, cell_off));
                cell_off += w;
                if !oneatatime {
                    continue;
                }
            }
            // flush the pending run
            for (rc, off) in run.drain(..) {
                if let Some(glyph) = fonts.font_mut(style).raster(rc) {
                    let glyph = glyph.clone();
                    window.blit_glyph(&glyph, winx + off * cw, winy + ascent, fg);
                }
            }
            if covered {
                continue;
            }
            // fallback dance
            if let Some(font) = fonts.fallback(style, chr) {
                let fb_ascent = font.ascent;
                if let Some(glyph) = font.raster(chr) {
                    let glyph = glyph.clone();
                    window.blit_glyph(&glyph, winx + cell_off * cw, winy + fb_ascent, fg);
                }
            }
            cell_off += w;
        }
        for (rc, off) in run.drain(..) {
            if let Some(glyph) = fonts.font_mut(style).raster(rc) {
                let glyph = glyph.clone();
                window.blit_glyph(&glyph, winx + off * cw, winy + ascent, fg);
            }
        }

        // Decoration bars sit relative to the ascent
        if base.mode.contains(CellAttrs::UNDERLINE) {
            window.fill_rect(winx, winy + ascent + 1, width, 1, fg);
        }
        if base.mode.contains(CellAttrs::STRIKE) {
            window.fill_rect(winx, winy + 2 * ascent / 3, width, 1, fg);
        }
    }

    /// Composite the cursor after the row scan: restore the cell the
    /// cursor left, then draw the new cell in the configured style.
    fn draw_cursor(
        &mut self,
        window: &mut Window,
        fonts: &mut FontSet,
        term: &Term,
        sel: &Selection,
    ) {
        let (border, cw, ch) = (window.border as i32, window.cw as i32, window.ch as i32);
        let cols = term.cols();
        let rows = term.rows();
        let mode = term.mode;

        let mut oldx = self.last_cursor.0.min(cols - 1);
        let oldy = self.last_cursor.1.min(rows - 1);
        let mut curx = term.cursor.x.min(cols - 1);
        let cury = term.cursor.y.min(rows - 1);

        // step off wide-glyph spacers
        if term.cell(oldx, oldy).mode.contains(CellAttrs::WDUMMY) && oldx > 0 {
            oldx -= 1;
        }
        if term.cell(curx, cury).mode.contains(CellAttrs::WDUMMY) && curx > 0 {
            curx -= 1;
        }

        // restore the previous cursor cell
        let mut og = *term.cell(oldx, oldy);
        if sel.selected(oldx, oldy, mode) {
            og.mode.toggle(CellAttrs::REVERSE);
        }
        let old_batch = Batch {
            x: oldx,
            text: og.u.to_string(),
            cells: og.width(),
            base: og,
        };
        self.draw_batch(window, fonts, &old_batch, oldy, mode, cols, rows);
        if oldx != curx || oldy != cury {
            window.damage(border + oldx as i32 * cw, border + oldy as i32 * ch, cw, ch);
        }

        self.last_cursor = (curx, cury);
        window.damage(border + curx as i32 * cw, border + cury as i32 * ch, cw, ch);

        if mode.contains(TermMode::HIDE) {
            return;
        }

        // cursor colors, selection- and reverse-video-aware
        let selected = sel.selected(curx, cury, mode);
        let pal = &self.palette;
        let (drawcol, glyph_fg, glyph_bg) = if mode.contains(TermMode::REVERSE) {
            if selected {
                (pal.cursor, pal.fg, pal.reverse_cursor)
            } else {
                (pal.reverse_cursor, pal.fg, pal.cursor)
            }
        } else if selected {
            (pal.reverse_cursor, pal.fg, pal.reverse_cursor)
        } else {
            (pal.cursor, pal.bg, pal.cursor)
        };

        let under = *term.cell(curx, cury);
        let wide = under.mode.contains(CellAttrs::WIDE);
        let winx = border + curx as i32 * cw;
        let winy = border + cury as i32 * ch;
        let cell_w = if wide { 2 * cw } else { cw };
        let thick = self.cursor_thickness as i32;

        if window.focused {
            let mut u = under.u;
            let mut style = self.cursor_style;
            if style == 7 {
                // st extension: fixed snowman placeholder, rendered
                // through the block path
                u = '☃';
                style = 2;
            }
            match style {
                0..=2 => {
                    // solid block: reversed-color glyph
                    window.fill_rect(winx, winy, cell_w, ch, glyph_bg);
                    self.draw_cursor_glyph(window, fonts, u, winx, winy, glyph_fg);
                }
                3 | 4 => {
                    window.fill_rect(winx, winy + ch - thick, cw, thick, drawcol);
                }
                5 | 6 => {
                    window.fill_rect(winx, winy, thick, ch, drawcol);
                }
                _ => {}
            }
        } else {
            // unfocused: hollow rectangle from four thin fills
            window.fill_rect(winx, winy, cw - 1, 1, drawcol);
            window.fill_rect(winx, winy, 1, ch - 1, drawcol);
            window.fill_rect(winx + cw - 1, winy, 1, ch - 1, drawcol);
            window.fill_rect(winx, winy + ch - 1, cw, 1, drawcol);
        }
    }

    fn draw_cursor_glyph(
        &mut self,
        window: &mut Window,
        fonts: &mut FontSet,
        u: char,
        winx: i32,
        winy: i32,
        fg: u32,
    ) {
        let style = crate::font::FontStyle::Regular;
        if fonts.font(style).covers(u) {
            let ascent = fonts.font(style).ascent;
            if let Some(glyph) = fonts.font_mut(style).raster(u) {
                let glyph = glyph.clone();
                window.blit_glyph(&glyph, winx, winy + ascent, fg);
            }
        } else if let Some(font) = fonts.fallback(style, u) {
            let ascent = font.ascent;
            if let Some(glyph) = font.raster(u) {
                let glyph = glyph.clone();
                window.blit_glyph(&glyph, winx, winy + ascent, fg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(u: char, mode: CellAttrs, fg: Color, bg: Color) -> Cell {
        Cell { u, mode, fg, bg }
    }

    fn plain(u: char) -> Cell {
        cell(u, CellAttrs::empty(), Color::Default, Color::Default)
    }

    fn test_palette() -> Palette {
        Palette::from_config(&Config::default())
    }

    #[test]
    fn test_batch_count_matches_attr_runs() {
        // 3 attribute-distinct runs over 9 cells -> exactly 3 batches
        let red = Color::Indexed(1);
        let mut row = vec![plain('a'); 3];
        row.extend(vec![cell('b', CellAttrs::BOLD, red, Color::Default); 3]);
        row.extend(vec![plain('c'); 3]);
        let batches = batch_row(&row, |_| false);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].text, "aaa");
        assert_eq!(batches[1].x, 3);
        assert_eq!(batches[2].text, "ccc");
    }

    #[test]
    fn test_batch_count_independent_of_row_length() {
        let row = vec![plain('x'); 500];
        assert_eq!(batch_row(&row, |_| false).len(), 1);
    }

    #[test]
    fn test_batch_byte_cap_splits() {
        // three-byte glyphs: the cap forces a split mid-run
        let row = vec![
            cell('あ', CellAttrs::WIDE, Color::Default, Color::Default);
            400
        ];
        let batches = batch_row(&row, |_| false);
        assert!(batches.len() > 1);
        for b in &batches {
            assert!(b.text.len() <= BATCH_BYTES_CAP);
        }
        // cells account for double width
        assert_eq!(batches.iter().map(|b| b.cells).sum::<usize>(), 800);
    }

    #[test]
    fn test_batch_selection_inverts() {
        let row = vec![plain('x'); 4];
        let batches = batch_row(&row, |x| x >= 2);
        assert_eq!(batches.len(), 2);
        assert!(batches[1].base.mode.contains(CellAttrs::REVERSE));
    }

    #[test]
    fn test_wdummy_extends_run() {
        let mut row = vec![plain('a')];
        row.push(cell('世', CellAttrs::WIDE, Color::Default, Color::Default));
        row.push(cell('世', CellAttrs::WDUMMY, Color::Default, Color::Default));
        row.push(plain('b'));
        let batches = batch_row(&row, |_| false);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].text, "a世b");
        assert_eq!(batches[0].cells, 4);
    }

    #[test]
    fn test_dirty_ranges_coalesce() {
        let mut term = Term::new(4, 8);
        for y in 0..8 {
            term.clear_dirty(y);
        }
        term.set_dirty(1, 2);
        term.set_dirty(4, 4);
        term.set_dirty(6, 7);
        assert_eq!(dirty_ranges(&term), vec![(1, 2), (4, 4), (6, 7)]);
    }

    #[test]
    fn test_bold_brightens_basic_palette() {
        let pal = test_palette();
        let c = cell('x', CellAttrs::BOLD, Color::Indexed(1), Color::Default);
        let (fg, _) = resolve_colors(&c, &pal, TermMode::empty());
        assert_eq!(fg, pal.colors[9]);
        // faint suppresses the brightening
        let c = cell(
            'x',
            CellAttrs::BOLD | CellAttrs::FAINT,
            Color::Indexed(1),
            Color::Default,
        );
        let (fg, _) = resolve_colors(&c, &pal, TermMode::empty());
        assert_eq!(fg, pal.colors[1]);
    }

    #[test]
    fn test_reverse_video_swaps_defaults() {
        let pal = test_palette();
        let c = plain('x');
        let (fg, bg) = resolve_colors(&c, &pal, TermMode::REVERSE);
        assert_eq!(fg, pal.bg);
        assert_eq!(bg, pal.fg);
        // non-default colors complement instead
        let c = cell('x', CellAttrs::empty(), Color::Rgb(0x10, 0x20, 0x30), Color::Default);
        let (fg, _) = resolve_colors(&c, &pal, TermMode::REVERSE);
        assert_eq!(fg & 0xff_ffff, !argb(0x10, 0x20, 0x30) & 0xff_ffff);
    }

    #[test]
    fn test_per_glyph_reverse_swaps() {
        let pal = test_palette();
        let c = cell(
            'x',
            CellAttrs::REVERSE,
            Color::Indexed(2),
            Color::Indexed(4),
        );
        let (fg, bg) = resolve_colors(&c, &pal, TermMode::empty());
        assert_eq!(fg, pal.colors[4]);
        assert_eq!(bg, pal.colors[2]);
    }

    #[test]
    fn test_faint_halves_channels() {
        let pal = test_palette();
        let c = cell(
            'x',
            CellAttrs::FAINT,
            Color::Rgb(0x80, 0x40, 0x20),
            Color::Default,
        );
        let (fg, _) = resolve_colors(&c, &pal, TermMode::empty());
        assert_eq!(fg, argb(0x40, 0x20, 0x10));
    }

    #[test]
    fn test_blink_and_invisible_collapse() {
        let pal = test_palette();
        let blink = cell('x', CellAttrs::BLINK, Color::Indexed(2), Color::Indexed(0));
        // blink collapses only during the off phase
        let (fg, bg) = resolve_colors(&blink, &pal, TermMode::BLINK);
        assert_eq!(fg, bg);
        let (fg, bg) = resolve_colors(&blink, &pal, TermMode::empty());
        assert_ne!(fg, bg);
        let invis = cell('x', CellAttrs::INVISIBLE, Color::Indexed(2), Color::Indexed(0));
        let (fg, bg) = resolve_colors(&invis, &pal, TermMode::empty());
        assert_eq!(fg, bg);
    }

    #[test]
    fn test_palette_cube_and_grayscale() {
        let pal = test_palette();
        // 16 is cube origin (black), 231 is cube white
        assert_eq!(pal.colors[16], argb(0, 0, 0));
        assert_eq!(pal.colors[231], argb(255, 255, 255));
        // grayscale ramp endpoints
        assert_eq!(pal.colors[232], argb(8, 8, 8));
        assert_eq!(pal.colors[255], argb(238, 238, 238));
    }
}
