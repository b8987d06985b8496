//! Window surface and configure state machine
//!
//! Owns the presentable surface and its xdg-shell handshake, the shm
//! backing buffers, the frame-pacing callback state, visibility and
//! focus tracking, and the pointer cursor theme.
//!
//! The size handshake is one-way: `configured` is set by the first
//! size acknowledgment and never reverts. Later configures only take
//! effect when the proposed size differs from the current one.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use memmap2::MmapMut;
use std::fs::File;
use std::os::fd::AsFd;
use wayland_client::protocol::{
    wl_buffer::WlBuffer,
    wl_compositor::WlCompositor,
    wl_pointer::WlPointer,
    wl_shm::{Format, WlShm},
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{Connection, QueueHandle};
use wayland_cursor::{Cursor, CursorTheme};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel, xdg_wm_base::XdgWmBase,
};

use crate::app::App;
use crate::config::Config;
use crate::font::RasterGlyph;
use crate::render::painter::Painter;

/// Pointer cursor names tried in order
const CURSOR_NAMES: &[&str] = &["xterm", "ibeam", "text"];
const CURSOR_SIZE: u32 = 32;

/// A proposal is a no-op when it repeats the current pixel size
fn proposal_differs(current: (u32, u32), proposed: (i32, i32)) -> bool {
    proposed.0 as u32 != current.0 || proposed.1 as u32 != current.1
}

/// Grid dimensions for a pixel size: border on each side, then whole
/// cells
fn grid_for(w: u32, h: u32, border: u32, cw: u32, ch: u32) -> (usize, usize) {
    let cols = (w.saturating_sub(2 * border) / cw).max(1) as usize;
    let rows = (h.saturating_sub(2 * border) / ch).max(1) as usize;
    (cols, rows)
}

/// One shm-backed frame buffer
struct ShmBuffer {
    // keeps the mapping alive; the path is unlinked at creation
    _file: File,
    mmap: MmapMut,
    pool: WlShmPool,
    buffer: WlBuffer,
}

impl ShmBuffer {
    fn create(shm: &WlShm, qh: &QueueHandle<App>, w: u32, h: u32) -> Result<Self> {
        let size = (w * h * 4) as u64;
        let path = std::env::temp_dir().join(format!("wcon-shm.{}", std::process::id()));
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Cannot create shm file {}", path.display()))?;
        // anonymous once unlinked
        let _ = std::fs::remove_file(&path);
        file.set_len(size).context("Cannot size shm file")?;
        let mmap = unsafe { MmapMut::map_mut(&file) }.context("Cannot map shm file")?;

        let pool = shm.create_pool(file.as_fd(), size as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            w as i32,
            h as i32,
            (w * 4) as i32,
            Format::Argb8888,
            qh,
            (),
        );
        debug!("shm buffer {}x{} ({} bytes)", w, h, size);
        Ok(Self {
            _file: file,
            mmap,
            pool,
            buffer,
        })
    }

    fn pixels(&mut self) -> &mut [u32] {
        // the mapping is page-aligned, so the cast cannot split
        let (_, pixels, _) = unsafe { self.mmap.align_to_mut::<u32>() };
        pixels
    }

    fn destroy(self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

/// Window state
pub struct Window {
    qh: QueueHandle<App>,
    shm: WlShm,
    pub surface: WlSurface,
    pub xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    buffer: Option<ShmBuffer>,
    /// Pre-resize buffer, released only after the next commit
    retired: Option<ShmBuffer>,

    /// Window pixel size: 2*border + grid*cell
    pub w: u32,
    pub h: u32,
    pub border: u32,
    /// Cell metrics, copied from the loaded font set
    pub cw: u32,
    pub ch: u32,

    /// Set by the first size acknowledgment, never reverts
    pub configured: bool,
    pub focused: bool,
    /// Output enter/leave counter; visible while positive
    vis: i32,
    pub needs_redraw: bool,
    /// A frame callback is outstanding; draws are deferred
    pub frame_pending: bool,
    /// Size proposed by the latest toplevel configure
    pending_size: Option<(i32, i32)>,

    cursor_surface: WlSurface,
    // theme must outlive its cursors
    _cursor_theme: Option<CursorTheme>,
    cursor: Option<Cursor>,
}

impl Window {
    /// Create the surface, run the shell handshake setup and load
    /// the pointer cursor theme. Buffers are allocated on the first
    /// configure.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: &Connection,
        qh: &QueueHandle<App>,
        compositor: &WlCompositor,
        wm_base: &XdgWmBase,
        shm: &WlShm,
        cfg: &Config,
        cols: usize,
        rows: usize,
        cw: u32,
        ch: u32,
    ) -> Result<Self> {
        let border = cfg.window.border;
        let w = 2 * border + cols as u32 * cw;
        let h = 2 * border + rows as u32 * ch;

        let surface = compositor.create_surface(qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, qh, ());
        let toplevel = xdg_surface.get_toplevel(qh, ());
        toplevel.set_title(cfg.window.title.clone());
        toplevel.set_app_id(cfg.window.app_id.clone());
        surface.commit();

        let cursor_surface = compositor.create_surface(qh, ());
        let (theme, cursor) = match CursorTheme::load(conn, shm.clone(), CURSOR_SIZE) {
            Ok(mut theme) => {
                let cursor = CURSOR_NAMES.iter().find_map(|n| theme.get_cursor(n).cloned());
                if cursor.is_none() {
                    warn!("No text cursor in theme");
                }
                (Some(theme), cursor)
            }
            Err(e) => {
                warn!("Cannot load cursor theme: {}", e);
                (None, None)
            }
        };

        info!("Window created: {}x{} ({}x{} cells)", w, h, cols, rows);
        Ok(Self {
            qh: qh.clone(),
            shm: shm.clone(),
            surface,
            xdg_surface,
            toplevel,
            buffer: None,
            retired: None,
            w,
            h,
            border,
            cw,
            ch,
            configured: false,
            focused: false,
            vis: 0,
            needs_redraw: true,
            frame_pending: false,
            pending_size: None,
            cursor_surface,
            _cursor_theme: theme,
            cursor,
        })
    }

    // ---- configure ----

    /// Remember the size proposed by a toplevel configure
    pub fn propose_size(&mut self, w: i32, h: i32) {
        self.pending_size = Some((w, h));
    }

    /// Apply the pending proposal after the ack. Zero components keep
    /// the current dimension. Returns the new grid size when the
    /// pixel size actually changed; a redundant proposal is a no-op.
    pub fn apply_configure(&mut self) -> Result<Option<(usize, usize)>> {
        let Some((pw, ph)) = self.pending_size.take() else {
            return Ok(None);
        };
        if !proposal_differs((self.w, self.h), (pw, ph)) {
            return Ok(None);
        }
        if pw > 0 {
            self.w = pw as u32;
        }
        if ph > 0 {
            self.h = ph as u32;
        }
        self.realloc_buffer()?;
        Ok(Some(self.grid_size()))
    }

    /// Grid dimensions derived from the pixel size
    pub fn grid_size(&self) -> (usize, usize) {
        grid_for(self.w, self.h, self.border, self.cw, self.ch)
    }

    /// Adopt new cell metrics (font zoom) and recompute the grid
    pub fn set_cell_metrics(&mut self, cw: u32, ch: u32) -> (usize, usize) {
        self.cw = cw;
        self.ch = ch;
        self.grid_size()
    }

    /// Allocate the first buffer when the initial configure keeps
    /// the proposed size
    pub fn apply_first_buffer(&mut self) -> Result<()> {
        if self.buffer.is_none() {
            self.realloc_buffer()?;
        }
        Ok(())
    }

    fn realloc_buffer(&mut self) -> Result<()> {
        // the old buffer stays alive until the next commit
        if let Some(old) = self.buffer.take() {
            if let Some(older) = self.retired.replace(old) {
                older.destroy();
            }
        }
        self.buffer = Some(ShmBuffer::create(&self.shm, &self.qh, self.w, self.h)?);
        Ok(())
    }

    // ---- grid coordinate mapping ----

    pub fn x2col(&self, px: i32, cols: usize) -> usize {
        let x = (px - self.border as i32).max(0) / self.cw as i32;
        (x as usize).min(cols - 1)
    }

    pub fn y2row(&self, py: i32, rows: usize) -> usize {
        let y = (py - self.border as i32).max(0) / self.ch as i32;
        (y as usize).min(rows - 1)
    }

    // ---- visibility / focus ----

    pub fn enter_output(&mut self) {
        self.vis += 1;
    }

    pub fn leave_output(&mut self) {
        self.vis -= 1;
    }

    pub fn visible(&self) -> bool {
        self.vis > 0
    }

    pub fn set_title(&self, title: &str) {
        self.toplevel.set_title(title.to_string());
    }

    // ---- painting ----

    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u32) {
        let (width, height) = (self.w as usize, self.h as usize);
        if let Some(buf) = self.buffer.as_mut() {
            Painter::new(buf.pixels(), width, height).fill_rect(x, y, w, h, color);
        }
    }

    pub fn clear(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: u32) {
        let (width, height) = (self.w as usize, self.h as usize);
        if let Some(buf) = self.buffer.as_mut() {
            Painter::new(buf.pixels(), width, height).clear(x1, y1, x2, y2, color);
        }
    }

    pub fn blit_glyph(&mut self, glyph: &RasterGlyph, pen_x: i32, baseline: i32, fg: u32) {
        let (width, height) = (self.w as usize, self.h as usize);
        if let Some(buf) = self.buffer.as_mut() {
            Painter::new(buf.pixels(), width, height).blit_glyph(glyph, pen_x, baseline, fg);
        }
    }

    pub fn damage(&self, x: i32, y: i32, w: i32, h: i32) {
        self.surface.damage(x, y, w, h);
    }

    /// Submit the frame: attach, register the pacing callback,
    /// commit, then release the buffer retired by a resize.
    pub fn present(&mut self) {
        let Some(buf) = self.buffer.as_ref() else {
            return;
        };
        self.surface.attach(Some(&buf.buffer), 0, 0);
        self.surface.frame(&self.qh, ());
        self.frame_pending = true;
        self.surface.commit();
        if let Some(old) = self.retired.take() {
            old.destroy();
        }
        self.needs_redraw = false;
    }

    // ---- pointer cursor ----

    /// Show the text cursor image on pointer entry
    pub fn set_pointer_cursor(&self, pointer: &WlPointer, serial: u32) {
        let Some(cursor) = self.cursor.as_ref() else {
            return;
        };
        let img = &cursor[0];
        let (hx, hy) = img.hotspot();
        pointer.set_cursor(serial, Some(&self.cursor_surface), hx as i32, hy as i32);
        let buffer: &WlBuffer = img;
        self.cursor_surface.attach(Some(buffer), 0, 0);
        let (w, h) = img.dimensions();
        self.cursor_surface.damage(0, 0, w as i32, h as i32);
        self.cursor_surface.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundant_proposal_is_noop() {
        assert!(!proposal_differs((640, 480), (640, 480)));
        assert!(proposal_differs((640, 480), (640, 481)));
        assert!(proposal_differs((640, 480), (800, 480)));
        // the compositor's "pick your own size" proposal counts as
        // a change and re-derives from the kept dimensions
        assert!(proposal_differs((640, 480), (0, 0)));
    }

    #[test]
    fn test_grid_from_pixel_size() {
        // 2*2 border + 79*8 = 636 wide, 2*2 + 29*16 = 468 tall
        assert_eq!(grid_for(640, 480, 2, 8, 16), (79, 29));
        // exact fit
        assert_eq!(grid_for(2 * 2 + 80 * 8, 2 * 2 + 24 * 16, 2, 8, 16), (80, 24));
        // degenerate sizes clamp to one cell
        assert_eq!(grid_for(3, 3, 2, 8, 16), (1, 1));
    }
}
