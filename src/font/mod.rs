//! Font loading and fallback resolution
//!
//! Handles:
//! - Family resolution through fontconfig (four style variants)
//! - FreeType face loading, pixel metrics, coverage checks
//! - Per-style sorted fallback candidate lists (fc-match --sort)
//! - Bounded FIFO fallback cache keyed by (style, codepoint)
//! - Per-face rasterized glyph cache
//!
//! The rasterizer itself is opaque to the rest of the crate: callers
//! get alpha bitmaps and metrics, never FreeType types.

use anyhow::{anyhow, Context, Result};
use fontconfig::Fontconfig;
use freetype::face::{LoadFlag, StyleFlag};
use freetype::render_mode::RenderMode;
use freetype::Library;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

/// Fallback cache capacity
pub const FALLBACK_CACHE_CAP: usize = 16;

/// Font style variants preloaded at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    /// fontconfig style name for non-regular variants
    fn fc_style(self) -> Option<&'static str> {
        match self {
            FontStyle::Regular => None,
            FontStyle::Bold => Some("Bold"),
            FontStyle::Italic => Some("Italic"),
            FontStyle::BoldItalic => Some("Bold Italic"),
        }
    }

    fn index(self) -> usize {
        match self {
            FontStyle::Regular => 0,
            FontStyle::Bold => 1,
            FontStyle::Italic => 2,
            FontStyle::BoldItalic => 3,
        }
    }
}

/// Map cell attributes to the style variant
pub fn style_for(bold: bool, italic: bool) -> FontStyle {
    match (bold, italic) {
        (false, false) => FontStyle::Regular,
        (true, false) => FontStyle::Bold,
        (false, true) => FontStyle::Italic,
        (true, true) => FontStyle::BoldItalic,
    }
}

/// One rasterized glyph: 8-bit alpha rows, tight bounding box
#[derive(Debug, Clone)]
pub struct RasterGlyph {
    pub width: u32,
    pub height: u32,
    /// Horizontal offset from the pen position
    pub left: i32,
    /// Vertical offset from the baseline to the bitmap top
    pub top: i32,
    pub advance: i32,
    pub data: Vec<u8>,
}

/// Codepoint coverage, the one question the fallback cache asks of a
/// cached handle
pub trait GlyphCoverage {
    fn covers(&self, ch: char) -> bool;
}

/// A loaded face with terminal-relevant metrics
pub struct Font {
    face: freetype::Face,
    /// fontconfig pattern the face resolved from, reused for
    /// fallback candidate queries
    pattern: String,
    /// Average advance width in pixels. When this differs from the
    /// cell width the renderer draws one glyph at a time.
    pub width: u32,
    pub height: u32,
    pub ascent: i32,
    /// Requested slant was unavailable; the renderer tints these
    pub badslant: bool,
    /// Requested weight was unavailable
    pub badweight: bool,
    /// Lazily built, pre-sorted fallback candidate paths
    candidates: Option<Vec<PathBuf>>,
    glyphs: HashMap<char, Option<RasterGlyph>>,
}

impl GlyphCoverage for Font {
    fn covers(&self, ch: char) -> bool {
        matches!(self.face.get_char_index(ch as usize), Some(i) if i > 0)
    }
}

impl Font {
    /// Load a face for `family` in the given style. A missing style
    /// variant falls back to whatever fontconfig substitutes and is
    /// flagged badslant/badweight.
    fn load(
        library: &Library,
        fc: &Fontconfig,
        family: &str,
        style: FontStyle,
        size_px: u32,
    ) -> Result<Self> {
        let matched = fc
            .find(family, style.fc_style())
            .ok_or_else(|| anyhow!("No font matches \"{}\"", family))?;
        let pattern = match style.fc_style() {
            Some(s) => format!("{}:style={}", family, s),
            None => family.to_string(),
        };
        let mut font = Self::from_path(library, &matched.path, pattern, size_px)
            .with_context(|| format!("Cannot load font {}", matched.path.display()))?;

        // Style fidelity check: fontconfig substitutes freely, so
        // verify the face actually carries the requested slant/weight
        let flags = font.face.style_flags();
        match style {
            FontStyle::Regular => {}
            FontStyle::Bold => font.badweight = !flags.contains(StyleFlag::BOLD),
            FontStyle::Italic => font.badslant = !flags.contains(StyleFlag::ITALIC),
            FontStyle::BoldItalic => {
                font.badweight = !flags.contains(StyleFlag::BOLD);
                font.badslant = !flags.contains(StyleFlag::ITALIC);
            }
        }
        if font.badslant || font.badweight {
            warn!(
                "Font \"{}\" lacks requested style {:?}, degraded rendering",
                family, style
            );
        }
        Ok(font)
    }

    fn from_path(library: &Library, path: &Path, pattern: String, size_px: u32) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| anyhow!("Failed to read font file: {} ({})", path.display(), e))?;
        let face = library
            .new_memory_face(Rc::new(data), 0)
            .map_err(|e| anyhow!("FreeType font loading failed: {:?}", e))?;
        face.set_pixel_sizes(0, size_px)
            .map_err(|e| anyhow!("FreeType size setting failed: {:?}", e))?;

        let metrics = face
            .size_metrics()
            .ok_or_else(|| anyhow!("Font has no size metrics: {}", path.display()))?;
        let ascent = (metrics.ascender >> 6) as i32;
        let height = ((metrics.ascender - metrics.descender) >> 6) as u32;

        // Advance of a representative digit; monospace faces agree on
        // this, fallback faces usually do not
        face.load_char('0' as usize, LoadFlag::DEFAULT)
            .map_err(|e| anyhow!("FreeType glyph load failed: {:?}", e))?;
        let adv = (face.glyph().metrics().horiAdvance >> 6) as u32;
        let width = if adv > 0 {
            adv
        } else {
            (metrics.max_advance >> 6) as u32
        };

        Ok(Self {
            face,
            pattern,
            width,
            height,
            ascent,
            badslant: false,
            badweight: false,
            candidates: None,
            glyphs: HashMap::new(),
        })
    }

    /// Rasterize (and cache) one glyph. A codepoint the face lacks
    /// renders as the face's notdef box; outright failures are cached
    /// as misses.
    pub fn raster(&mut self, ch: char) -> Option<&RasterGlyph> {
        if !self.glyphs.contains_key(&ch) {
            let glyph = rasterize(&self.face, ch);
            self.glyphs.insert(ch, glyph);
        }
        self.glyphs.get(&ch).and_then(|g| g.as_ref())
    }
}

fn rasterize(face: &freetype::Face, ch: char) -> Option<RasterGlyph> {
    if face.load_char(ch as usize, LoadFlag::DEFAULT).is_err() {
        return None;
    }
    let glyph = face.glyph();
    if glyph.render_glyph(RenderMode::Normal).is_err() {
        return None;
    }
    let bitmap = glyph.bitmap();
    let metrics = glyph.metrics();
    let width = bitmap.width() as u32;
    let height = bitmap.rows() as u32;
    let advance = (metrics.horiAdvance >> 6) as i32;

    if width == 0 || height == 0 {
        // Empty glyph (e.g., space)
        return Some(RasterGlyph {
            width: 0,
            height: 0,
            left: 0,
            top: 0,
            advance,
            data: Vec::new(),
        });
    }

    let buffer = bitmap.buffer();
    let pitch = bitmap.pitch().unsigned_abs() as usize;
    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            data.push(buffer[y * pitch + x]);
        }
    }

    Some(RasterGlyph {
        width,
        height,
        left: glyph.bitmap_left(),
        top: glyph.bitmap_top(),
        advance,
        data,
    })
}

/// Query fontconfig for the full sorted match list of a pattern.
/// Same mechanism as per-character charset queries: shell out to
/// fc-match, which keeps the crate decoupled from libfontconfig's
/// sort API.
fn sorted_candidates(pattern: &str) -> Vec<PathBuf> {
    let output = match Command::new("fc-match")
        .args(["--sort", "-f", "%{file}\n", pattern])
        .output()
    {
        Ok(o) if o.status.success() => o,
        _ => {
            warn!("fc-match --sort failed for \"{}\"", pattern);
            return Vec::new();
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut seen = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let path = PathBuf::from(line);
        if path.exists() && !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

/// One fallback cache entry. An entry without a covering face is a
/// placeholder keyed by its codepoint, cached so the expensive sorted
/// match is not repeated for glyphs nothing can render.
struct FallbackEntry<F> {
    style: FontStyle,
    ch: char,
    covers: bool,
    font: F,
}

/// Bounded (style, codepoint) → face cache with strict FIFO eviction
pub struct FallbackCache<F> {
    entries: Vec<FallbackEntry<F>>,
    cap: usize,
}

impl<F: GlyphCoverage> FallbackCache<F> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Probe for a usable entry: either a cached face covering the
    /// codepoint, or the placeholder recorded for exactly it
    fn probe(&self, style: FontStyle, ch: char) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.style == style && if e.covers { e.font.covers(ch) } else { e.ch == ch })
    }

    /// Insert, evicting exactly the oldest entry when full
    fn insert(&mut self, style: FontStyle, ch: char, covers: bool, font: F) -> usize {
        if self.entries.len() >= self.cap {
            self.entries.remove(0);
        }
        self.entries.push(FallbackEntry {
            style,
            ch,
            covers,
            font,
        });
        self.entries.len() - 1
    }

    fn font_mut(&mut self, idx: usize) -> &mut F {
        &mut self.entries[idx].font
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The four preloaded style variants plus the fallback machinery
pub struct FontSet {
    library: Library,
    fc: Fontconfig,
    family: String,
    /// Configured size, restored by zoom reset
    base_size: f32,
    size: f32,
    fonts: [Font; 4],
    fallback: FallbackCache<Font>,
    /// Cell width in pixels
    pub cw: u32,
    /// Cell height in pixels
    pub ch: u32,
}

impl FontSet {
    /// Initialize fontconfig + FreeType and preload the four
    /// variants. Failure here is fatal to the caller.
    pub fn load(family: &str, size: f32) -> Result<Self> {
        let fc = Fontconfig::new().ok_or_else(|| anyhow!("fontconfig initialization failed"))?;
        let library =
            Library::init().map_err(|e| anyhow!("FreeType initialization failed: {:?}", e))?;
        let fonts = Self::load_variants(&library, &fc, family, size)?;
        let cw = fonts[0].width;
        let ch = fonts[0].height;
        info!("Font loaded: \"{}\" {}px, cell {}x{}", family, size, cw, ch);
        Ok(Self {
            library,
            fc,
            family: family.to_string(),
            base_size: size,
            size,
            fonts,
            fallback: FallbackCache::new(FALLBACK_CACHE_CAP),
            cw,
            ch,
        })
    }

    fn load_variants(
        library: &Library,
        fc: &Fontconfig,
        family: &str,
        size: f32,
    ) -> Result<[Font; 4]> {
        let size_px = size.round().max(1.0) as u32;
        Ok([
            Font::load(library, fc, family, FontStyle::Regular, size_px)?,
            Font::load(library, fc, family, FontStyle::Bold, size_px)?,
            Font::load(library, fc, family, FontStyle::Italic, size_px)?,
            Font::load(library, fc, family, FontStyle::BoldItalic, size_px)?,
        ])
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn base_size(&self) -> f32 {
        self.base_size
    }

    /// Reload every variant at a new size and drop all caches
    pub fn set_size(&mut self, size: f32) -> Result<()> {
        let size = size.clamp(4.0, 128.0);
        let fonts = Self::load_variants(&self.library, &self.fc, &self.family, size)?;
        self.cw = fonts[0].width;
        self.ch = fonts[0].height;
        self.fonts = fonts;
        self.fallback.clear();
        self.size = size;
        info!("Font size {}px, cell {}x{}", size, self.cw, self.ch);
        Ok(())
    }

    pub fn font(&self, style: FontStyle) -> &Font {
        &self.fonts[style.index()]
    }

    pub fn font_mut(&mut self, style: FontStyle) -> &mut Font {
        &mut self.fonts[style.index()]
    }

    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Resolve a face for a codepoint the primary font lacks: probe
    /// the cache, else walk the style's sorted candidates and insert
    /// the result. Returns None only when no face at all could be
    /// loaded; drawing then skips the glyph (background stays).
    pub fn fallback(&mut self, style: FontStyle, ch: char) -> Option<&mut Font> {
        if let Some(idx) = self.fallback.probe(style, ch) {
            return Some(self.fallback.font_mut(idx));
        }

        let size_px = self.size.round().max(1.0) as u32;
        let (pattern, candidates) = {
            let primary = &mut self.fonts[style.index()];
            if primary.candidates.is_none() {
                let list = sorted_candidates(&primary.pattern);
                debug!(
                    "{} fallback candidates for \"{}\"",
                    list.len(),
                    primary.pattern
                );
                primary.candidates = Some(list);
            }
            (
                primary.pattern.clone(),
                primary.candidates.clone().unwrap_or_default(),
            )
        };

        let mut resolved: Option<Font> = None;
        for path in &candidates {
            match Font::from_path(&self.library, path, pattern.clone(), size_px) {
                Ok(font) if font.covers(ch) => {
                    debug!("Fallback for U+{:04X}: {}", ch as u32, path.display());
                    resolved = Some(font);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping fallback candidate {}: {}", path.display(), e);
                    continue;
                }
            }
        }

        // Nothing covers this codepoint: cache the best candidate as
        // a placeholder (its notdef box is drawn) so the sorted match
        // is not repeated. No loadable candidate at all caches
        // nothing and skips the glyph.
        let (covers, font) = match resolved {
            Some(f) => (true, f),
            None => {
                let placeholder = candidates
                    .first()
                    .and_then(|p| Font::from_path(&self.library, p, pattern.clone(), size_px).ok());
                match placeholder {
                    Some(f) => (false, f),
                    None => {
                        warn!("No fallback face for U+{:04X}", ch as u32);
                        return None;
                    }
                }
            }
        };

        let idx = self.fallback.insert(style, ch, covers, font);
        Some(self.fallback.font_mut(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test face: covers a fixed set of codepoints
    struct FakeFace(&'static [char]);

    impl GlyphCoverage for FakeFace {
        fn covers(&self, ch: char) -> bool {
            self.0.contains(&ch)
        }
    }

    #[test]
    fn test_style_for() {
        assert_eq!(style_for(false, false), FontStyle::Regular);
        assert_eq!(style_for(true, false), FontStyle::Bold);
        assert_eq!(style_for(false, true), FontStyle::Italic);
        assert_eq!(style_for(true, true), FontStyle::BoldItalic);
    }

    #[test]
    fn test_cache_never_exceeds_capacity() {
        let mut cache: FallbackCache<FakeFace> = FallbackCache::new(3);
        for (i, ch) in ['a', 'b', 'c', 'd', 'e'].into_iter().enumerate() {
            cache.insert(FontStyle::Regular, ch, false, FakeFace(&[]));
            assert!(cache.len() <= 3, "exceeded cap after {} inserts", i + 1);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_cache_evicts_oldest_first() {
        let mut cache: FallbackCache<FakeFace> = FallbackCache::new(2);
        cache.insert(FontStyle::Regular, 'a', false, FakeFace(&[]));
        cache.insert(FontStyle::Regular, 'b', false, FakeFace(&[]));
        cache.insert(FontStyle::Regular, 'c', false, FakeFace(&[]));
        // 'a' was oldest and must be gone; 'b' and 'c' remain
        assert!(cache.probe(FontStyle::Regular, 'a').is_none());
        assert!(cache.probe(FontStyle::Regular, 'b').is_some());
        assert!(cache.probe(FontStyle::Regular, 'c').is_some());
    }

    #[test]
    fn test_cache_hit_by_coverage_and_by_placeholder() {
        let mut cache: FallbackCache<FakeFace> = FallbackCache::new(4);
        // covering entry: hits for any codepoint the face covers
        cache.insert(FontStyle::Regular, 'α', true, FakeFace(&['α', 'β']));
        assert!(cache.probe(FontStyle::Regular, 'β').is_some());
        // placeholder entry: hits only for its own codepoint
        cache.insert(FontStyle::Bold, '☃', false, FakeFace(&[]));
        assert!(cache.probe(FontStyle::Bold, '☃').is_some());
        assert!(cache.probe(FontStyle::Bold, 'β').is_none());
        // style is part of the key
        assert!(cache.probe(FontStyle::Italic, 'α').is_none());
    }
}
