//! Application context and event loop
//!
//! `App` is the one context object: it owns the connection, the bound
//! globals and every component, and is the dispatch target for all
//! protocol events. Construction performs the single blocking startup
//! roundtrip; afterwards the loop blocks on the display fd and the
//! collaborator's grid-update fd, interleaved with the key-repeat
//! timer.

use anyhow::{Context as _, Result};
use log::{debug, info, warn};
use nix::poll::{poll, PollFd, PollFlags};
use std::time::Instant;

use wayland_client::protocol::{
    wl_buffer::WlBuffer,
    wl_callback::{self, WlCallback},
    wl_compositor::WlCompositor,
    wl_data_device::{self, WlDataDevice},
    wl_data_device_manager::WlDataDeviceManager,
    wl_data_offer::{self, WlDataOffer},
    wl_data_source::{self, WlDataSource},
    wl_keyboard::{self, WlKeyboard},
    wl_output::WlOutput,
    wl_pointer::{self, WlPointer},
    wl_registry::{self, WlRegistry},
    wl_seat::{self, WlSeat},
    wl_shm::WlShm,
    wl_shm_pool::WlShmPool,
    wl_surface::{self, WlSurface},
};
use wayland_client::{event_created_child, Connection, Dispatch, EventQueue, QueueHandle, WEnum};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};

use crate::clipboard::{mime_is_plain_text, Clipboard, OfferData};
use crate::config::{Action, AxisShortcut, Config, KeyShortcut, MouseShortcut};
use crate::font::FontSet;
use crate::input::pointer::{Pointer, SelMode, Selection, BTN_LEFT, BTN_MIDDLE};
use crate::input::{compose_bytes, key_table_lookup, Keyboard, ModMask};
use crate::render::Renderer;
use crate::term::{Term, TermMode, Tty};
use crate::wayland::window::Window;
use crate::wayland::{self, Globals};

/// Font size step per zoom action, in pixels
const ZOOM_STEP: f32 = 1.0;

/// Application state: every component, owned single-threaded
pub struct App {
    conn: Connection,
    qh: QueueHandle<App>,
    pub globals: Globals,

    // protocol-derived components, present after startup
    pub window: Option<Window>,
    pub clipboard: Option<Clipboard>,
    wl_keyboard: Option<WlKeyboard>,
    wl_pointer: Option<WlPointer>,

    pub keyboard: Keyboard,
    pub pointer: Pointer,
    pub selection: Selection,
    pub fonts: FontSet,
    pub renderer: Renderer,
    pub term: Term,
    tty: Box<dyn Tty>,

    // resolved configuration
    cfg: Config,
    key_shortcuts: Vec<KeyShortcut>,
    mouse_shortcuts: Vec<MouseShortcut>,
    axis_shortcuts: Vec<AxisShortcut>,
    force_sel_mod: ModMask,
    rect_sel_mod: ModMask,

    /// Serial of the most recent input event, for selection ordering
    last_serial: u32,
    running: bool,
}

impl App {
    /// Connect, scan the registry behind one blocking roundtrip,
    /// validate required capabilities and build every component.
    /// Missing capabilities and font-system failures are fatal here.
    pub fn new(
        cfg: Config,
        tty: Box<dyn Tty>,
        cols: usize,
        rows: usize,
    ) -> Result<(Self, EventQueue<App>)> {
        let conn = wayland::connect()?;
        let mut event_queue = conn.new_event_queue();
        let qh = event_queue.handle();

        let fonts = FontSet::load(&cfg.font.family, cfg.font.size)?;
        let renderer = Renderer::new(&cfg);
        let selection = Selection::new(
            cfg.mouse.double_click_ms,
            cfg.mouse.triple_click_ms,
            &cfg.mouse.word_delimiters,
        );

        let mut app = App {
            conn: conn.clone(),
            qh: qh.clone(),
            globals: Globals::default(),
            window: None,
            clipboard: None,
            wl_keyboard: None,
            wl_pointer: None,
            keyboard: Keyboard::new(),
            pointer: Pointer::default(),
            selection,
            fonts,
            renderer,
            term: Term::new(cols, rows),
            tty,
            key_shortcuts: cfg.key_shortcuts(),
            mouse_shortcuts: cfg.mouse_shortcuts(),
            axis_shortcuts: cfg.axis_shortcuts(),
            force_sel_mod: cfg.force_select_mod(),
            rect_sel_mod: cfg.rect_select_mod(),
            cfg,
            last_serial: 0,
            running: false,
        };

        let _registry = conn.display().get_registry(&qh, ());
        // the one blocking startup barrier
        event_queue
            .roundtrip(&mut app)
            .context("startup roundtrip")?;
        let required = app.globals.require()?;

        let window = Window::new(
            &app.conn,
            &qh,
            required.compositor,
            required.wm_base,
            required.shm,
            &app.cfg,
            app.term.cols(),
            app.term.rows(),
            app.fonts.cw,
            app.fonts.ch,
        )?;
        let clipboard = Clipboard::new(required.data_device_manager, required.seat, &qh);
        app.window = Some(window);
        app.clipboard = Some(clipboard);

        info!("Session ready");
        Ok((app, event_queue))
    }

    /// Dispatch loop: blocks on the display fd and the collaborator
    /// fd, fires key repeat, and draws deferred frames. Returns when
    /// the compositor asks the window to close.
    pub fn run(&mut self, event_queue: &mut EventQueue<App>) -> Result<()> {
        self.running = true;
        while self.running {
            self.maybe_draw();
            self.conn.flush().context("connection flush")?;

            let timeout = self
                .keyboard
                .repeat_deadline()
                .map(|d| {
                    d.saturating_duration_since(Instant::now())
                        .as_millis()
                        .min(i32::MAX as u128) as i32
                })
                .unwrap_or(-1);

            let mut wl_ready = false;
            let mut tty_ready = false;
            if let Some(guard) = event_queue.prepare_read() {
                {
                    let conn_fd = guard.connection_fd();
                    let tty_fd = self.tty.fd();
                    let mut fds = vec![PollFd::new(&conn_fd, PollFlags::POLLIN)];
                    if let Some(fd) = tty_fd.as_ref() {
                        fds.push(PollFd::new(fd, PollFlags::POLLIN));
                    }
                    match poll(&mut fds, timeout) {
                        Ok(_) => {
                            let readable = PollFlags::POLLIN | PollFlags::POLLHUP;
                            wl_ready = fds[0].revents().is_some_and(|r| r.intersects(readable));
                            tty_ready = fds
                                .get(1)
                                .and_then(|f| f.revents())
                                .is_some_and(|r| r.intersects(readable));
                        }
                        Err(nix::errno::Errno::EINTR) => {}
                        Err(e) => return Err(e).context("poll"),
                    }
                }
                if wl_ready {
                    if let Err(e) = guard.read() {
                        debug!("wayland read: {}", e);
                    }
                }
                // dropping the guard otherwise cancels the read
            }

            event_queue
                .dispatch_pending(self)
                .context("event dispatch")?;

            if tty_ready {
                match self.tty.drain(&mut self.term) {
                    Ok(true) => self.request_redraw(),
                    Ok(false) => {}
                    Err(e) => warn!("grid update failed: {}", e),
                }
            }

            if let Some(bytes) = self.keyboard.repeat_tick(Instant::now()) {
                self.tty.write(&bytes);
            }
        }
        Ok(())
    }

    // ---- drawing ----

    fn request_redraw(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.needs_redraw = true;
        }
    }

    /// Draw when something is pending, the window is configured and
    /// no frame callback is outstanding. Visibility only throttles
    /// the callback path: the very first commit is what maps the
    /// surface onto an output at all.
    fn maybe_draw(&mut self) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        if !window.needs_redraw || !window.configured {
            return;
        }
        if window.frame_pending {
            // throttled: the frame callback fires the deferred draw
            return;
        }
        self.renderer
            .draw(window, &mut self.fonts, &mut self.term, &self.selection);
    }

    fn on_frame_done(&mut self) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        window.frame_pending = false;
        if window.needs_redraw && window.visible() {
            self.renderer
                .draw(window, &mut self.fonts, &mut self.term, &self.selection);
        }
    }

    // ---- surface / shell ----

    fn on_surface_configure(&mut self, serial: u32) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        window.xdg_surface.ack_configure(serial);
        let first = !window.configured;
        window.configured = true;
        match window.apply_configure() {
            Ok(Some((cols, rows))) => {
                self.term.resize(cols, rows);
                if !first {
                    self.tty.resize(cols, rows);
                }
                self.term.full_dirt();
                window.needs_redraw = true;
                debug!("configured {}x{} cells", cols, rows);
            }
            Ok(None) => {
                if first {
                    // size unchanged but now presentable
                    if let Err(e) = window.apply_first_buffer() {
                        warn!("buffer allocation failed: {}", e);
                    }
                    window.needs_redraw = true;
                }
            }
            Err(e) => warn!("configure failed: {}", e),
        }
    }

    fn on_close(&mut self) {
        info!("Close requested");
        self.tty.hangup();
        self.running = false;
    }

    // ---- focus ----

    fn on_focus_in(&mut self, serial: u32) {
        self.last_serial = serial;
        if let Some(window) = self.window.as_mut() {
            window.focused = true;
        }
        if self.term.mode.contains(TermMode::FOCUS) {
            self.tty.write(b"\x1b[I");
        }
        // the cursor region must change shape
        self.request_redraw();
    }

    fn on_focus_out(&mut self) {
        // selection offers are invalidated when we lose focus
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard.drop_offer();
        }
        if let Some(window) = self.window.as_mut() {
            window.focused = false;
        }
        if self.term.mode.contains(TermMode::FOCUS) {
            self.tty.write(b"\x1b[O");
        }
        self.keyboard.cancel_repeat();
        self.request_redraw();
    }

    // ---- keyboard ----

    fn on_key_press(&mut self, key: u32) {
        if self.term.mode.contains(TermMode::KBDLOCK) {
            return;
        }
        let Some((sym, utf8)) = self.keyboard.lookup(key) else {
            return;
        };
        let mods = self.keyboard.mods;

        // 1. configured shortcuts, exact chord match
        let lower = crate::input::keysym_to_lower(sym);
        let action = self
            .key_shortcuts
            .iter()
            .find(|s| s.keysym == lower && s.mods == mods)
            .map(|s| s.action);
        if let Some(action) = action {
            self.run_action(action);
            return;
        }

        // 2. key table, 3. composed text with transforms
        let bytes = match key_table_lookup(sym, mods, self.term.mode) {
            Some(s) => s.to_vec(),
            None => compose_bytes(&utf8, mods, self.term.mode.contains(TermMode::EIGHT_BIT)),
        };
        if bytes.is_empty() {
            return;
        }
        self.keyboard.arm_repeat(key, &bytes);
        self.tty.write(&bytes);
    }

    fn run_action(&mut self, action: Action) {
        match action {
            Action::Copy => {
                if self.selection.primary.is_some() {
                    self.own_selection();
                }
            }
            Action::Paste => self.paste(),
            Action::ZoomIn => self.zoom_abs(self.fonts.size() + ZOOM_STEP),
            Action::ZoomOut => self.zoom_abs(self.fonts.size() - ZOOM_STEP),
            Action::ZoomReset => self.zoom_abs(self.fonts.base_size()),
        }
    }

    /// Reload fonts at a new size, recompute cell metrics and the
    /// grid, notify the collaborator, redraw everything
    fn zoom_abs(&mut self, size: f32) {
        if let Err(e) = self.fonts.set_size(size) {
            warn!("font reload failed: {}", e);
            return;
        }
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let (cols, rows) = window.set_cell_metrics(self.fonts.cw, self.fonts.ch);
        self.term.resize(cols, rows);
        self.tty.resize(cols, rows);
        self.term.full_dirt();
        window.needs_redraw = true;
    }

    // ---- selection / clipboard ----

    /// Register a fresh clipboard source for the current primary
    /// buffer, under the latest input serial
    fn own_selection(&mut self) {
        let Some(clipboard) = self.clipboard.as_mut() else {
            return;
        };
        let Some(manager) = self.globals.data_device_manager.as_ref() else {
            return;
        };
        clipboard.set_selection(manager, &self.qh, true, self.last_serial);
    }

    /// Paste the current offer. Our own selection short-circuits the
    /// pipe; external offers are received and drained.
    fn paste(&mut self) {
        let Some(clipboard) = self.clipboard.as_ref() else {
            return;
        };
        let data = if clipboard.owns_selection() {
            self.selection.primary.as_ref().map(|s| s.clone().into_bytes())
        } else {
            clipboard.receive(&self.conn)
        };
        let Some(data) = data else {
            return;
        };
        if self.term.mode.contains(TermMode::BRACKETED_PASTE) {
            self.tty.write(b"\x1b[200~");
            self.tty.write(&data);
            self.tty.write(b"\x1b[201~");
        } else {
            self.tty.write(&data);
        }
    }

    fn on_source_cancelled(&mut self, source: &WlDataSource) {
        let Some(clipboard) = self.clipboard.as_mut() else {
            return;
        };
        if clipboard.source_cancelled(source) {
            // superseded by another client: drop buffer and highlight
            self.selection.clear_primary();
            if let Some((top, bot)) = self.selection.clear() {
                self.term.set_dirty(top, bot);
                self.request_redraw();
            }
        }
    }

    // ---- pointer ----

    /// Selection type from held modifiers, the force-select modifier
    /// masked out
    fn rect_requested(&self) -> bool {
        !self.rect_sel_mod.is_empty()
            && (self.keyboard.mods & !self.force_sel_mod) == self.rect_sel_mod
    }

    fn mouse_mode_active(&self) -> bool {
        self.term.mode.intersects(TermMode::MOUSE)
            && !self.keyboard.mods.contains(self.force_sel_mod)
    }

    fn pointer_cell(&self) -> Option<(usize, usize)> {
        let window = self.window.as_ref()?;
        Some((
            window.x2col(self.pointer.px, self.term.cols()),
            window.y2row(self.pointer.py, self.term.rows()),
        ))
    }

    fn on_pointer_motion(&mut self, x: f64, y: f64) {
        self.pointer.px = x as i32;
        self.pointer.py = y as i32;
        let Some((col, row)) = self.pointer_cell() else {
            return;
        };

        if self.mouse_mode_active() {
            if let Some(report) = self.pointer.report_motion(self.term.mode, col, row) {
                self.tty.write(&report);
            }
            return;
        }

        let rect = self.rect_requested();
        if let Some((top, bot)) = self.selection.extend(&self.term, col, row, rect) {
            self.term.set_dirty(top, bot);
            self.request_redraw();
        }
    }

    fn on_pointer_button(&mut self, serial: u32, time: u32, button: u32, pressed: bool) {
        self.last_serial = serial;
        let Some((col, row)) = self.pointer_cell() else {
            return;
        };

        if self.mouse_mode_active() {
            let report =
                self.pointer
                    .report_button(self.term.mode, button, pressed, self.keyboard.mods, col, row);
            if let Some(report) = report {
                self.tty.write(&report);
            }
            return;
        }

        if pressed {
            // the shortcut table short-circuits selection handling
            let send = self
                .mouse_shortcuts
                .iter()
                .find(|m| {
                    m.button == button && m.mods.map_or(true, |mm| mm == self.keyboard.mods)
                })
                .map(|m| m.send.clone());
            if let Some(send) = send {
                self.tty.write(&send);
                return;
            }

            if button == BTN_LEFT {
                // clear the previous selection, logically and visually
                if let Some((top, bot)) = self.selection.clear() {
                    self.term.set_dirty(top, bot);
                }
                let rect = self.rect_requested();
                self.selection.begin(&self.term, col, row, time, rect);
                if let Some((top, bot)) = self.selection.rows() {
                    self.term.set_dirty(top, bot);
                }
                self.request_redraw();
            }
        } else if button == BTN_MIDDLE {
            self.paste();
        } else if button == BTN_LEFT {
            if self.selection.mode == SelMode::Ready {
                let rect = self.rect_requested();
                self.selection.extend(&self.term, col, row, rect);
                if self.selection.finalize(&self.term).is_some() {
                    self.own_selection();
                }
            } else if let Some((top, bot)) = self.selection.clear() {
                self.term.set_dirty(top, bot);
            }
            if let Some((top, bot)) = self.selection.rows() {
                self.term.set_dirty(top, bot);
            }
            self.request_redraw();
        }
    }

    fn on_pointer_axis(&mut self, vertical: bool, value: f64) {
        let dir = if value > 0.0 { 1 } else { -1 };
        if self.mouse_mode_active() {
            if let Some(report) = self.pointer.report_axis(self.term.mode, vertical, dir) {
                self.tty.write(&report);
            }
            return;
        }
        let send = self
            .axis_shortcuts
            .iter()
            .find(|a| {
                a.vertical == vertical
                    && a.dir == dir
                    && a.mods.map_or(true, |mm| mm == self.keyboard.mods)
            })
            .map(|a| a.send.clone());
        if let Some(send) = send {
            self.tty.write(&send);
        }
    }
}

// ============================================================================
// Protocol dispatch
// ============================================================================

impl Dispatch<WlRegistry, ()> for App {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name, interface, ..
        } = event
        {
            state.globals.register(registry, name, &interface, qh);
        }
    }
}

impl Dispatch<WlSeat, ()> for App {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(caps),
        } = event
        {
            if caps.contains(wl_seat::Capability::Keyboard) && state.wl_keyboard.is_none() {
                state.wl_keyboard = Some(seat.get_keyboard(qh, ()));
            }
            if caps.contains(wl_seat::Capability::Pointer) && state.wl_pointer.is_none() {
                state.wl_pointer = Some(seat.get_pointer(qh, ()));
            }
        }
    }
}

impl Dispatch<WlKeyboard, ()> for App {
    fn event(
        state: &mut Self,
        _: &WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format == WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
                    state.keyboard.load_keymap(fd, size);
                }
                // other formats drop the fd
            }
            wl_keyboard::Event::Enter { serial, .. } => state.on_focus_in(serial),
            wl_keyboard::Event::Leave { .. } => state.on_focus_out(),
            wl_keyboard::Event::Key {
                serial, key, state: key_state, ..
            } => {
                state.last_serial = serial;
                if key_state == WEnum::Value(wl_keyboard::KeyState::Pressed) {
                    state.on_key_press(key);
                } else {
                    state.keyboard.release(key);
                }
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                state
                    .keyboard
                    .update_mods(mods_depressed, mods_latched, mods_locked, group);
            }
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                state.keyboard.set_repeat_info(rate, delay);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlPointer, ()> for App {
    fn event(
        state: &mut Self,
        pointer: &WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface_x,
                surface_y,
                ..
            } => {
                state.last_serial = serial;
                state.pointer.px = surface_x as i32;
                state.pointer.py = surface_y as i32;
                if let Some(window) = state.window.as_ref() {
                    window.set_pointer_cursor(pointer, serial);
                }
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => state.on_pointer_motion(surface_x, surface_y),
            wl_pointer::Event::Button {
                serial,
                time,
                button,
                state: btn_state,
            } => {
                let pressed = btn_state == WEnum::Value(wl_pointer::ButtonState::Pressed);
                state.on_pointer_button(serial, time, button, pressed);
            }
            wl_pointer::Event::Axis { axis, value, .. } => {
                if let WEnum::Value(axis) = axis {
                    let vertical = axis == wl_pointer::Axis::VerticalScroll;
                    state.on_pointer_axis(vertical, value);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSurface, ()> for App {
    fn event(
        state: &mut Self,
        surface: &WlSurface,
        event: wl_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // only the main surface participates in visibility tracking
        let is_main = state
            .window
            .as_ref()
            .is_some_and(|w| w.surface == *surface);
        if !is_main {
            return;
        }
        match event {
            wl_surface::Event::Enter { .. } => {
                if let Some(window) = state.window.as_mut() {
                    window.enter_output();
                }
            }
            wl_surface::Event::Leave { .. } => {
                if let Some(window) = state.window.as_mut() {
                    window.leave_output();
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlCallback, ()> for App {
    fn event(
        state: &mut Self,
        _: &WlCallback,
        event: wl_callback::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.on_frame_done();
        }
    }
}

impl Dispatch<XdgWmBase, ()> for App {
    fn event(
        _: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for App {
    fn event(
        state: &mut Self,
        _: &XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.on_surface_configure(serial);
        }
    }
}

impl Dispatch<XdgToplevel, ()> for App {
    fn event(
        state: &mut Self,
        _: &XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                if let Some(window) = state.window.as_mut() {
                    window.propose_size(width, height);
                }
            }
            xdg_toplevel::Event::Close => state.on_close(),
            _ => {}
        }
    }
}

impl Dispatch<WlDataDevice, ()> for App {
    fn event(
        state: &mut Self,
        _: &WlDataDevice,
        event: wl_data_device::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_device::Event::DataOffer { .. } => {
                // mime tagging happens on the offer's own events
            }
            wl_data_device::Event::Selection { id } => {
                if let Some(clipboard) = state.clipboard.as_mut() {
                    clipboard.select_offer(id);
                }
            }
            // drag-and-drop is not handled
            _ => {}
        }
    }

    event_created_child!(App, WlDataDevice, [
        wl_data_device::EVT_DATA_OFFER_OPCODE => (WlDataOffer, OfferData::default()),
    ]);
}

impl Dispatch<WlDataOffer, OfferData> for App {
    fn event(
        _: &mut Self,
        _: &WlDataOffer,
        event: wl_data_offer::Event,
        data: &OfferData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_data_offer::Event::Offer { mime_type } = event {
            // tag once; never downgraded for this offer's lifetime
            if mime_is_plain_text(&mime_type) {
                data.mark_plain_text();
            }
        }
    }
}

impl Dispatch<WlDataSource, ()> for App {
    fn event(
        state: &mut Self,
        source: &WlDataSource,
        event: wl_data_source::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_source::Event::Send { fd, .. } => {
                if let Some(text) = state.selection.primary.as_ref() {
                    Clipboard::send(text, fd);
                }
            }
            wl_data_source::Event::Cancelled => state.on_source_cancelled(source),
            _ => {}
        }
    }
}

// capability objects without interesting events
impl Dispatch<WlCompositor, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlCompositor,
        _: wayland_client::protocol::wl_compositor::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlShm, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlShm,
        _: wayland_client::protocol::wl_shm::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlShmPool, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlShmPool,
        _: wayland_client::protocol::wl_shm_pool::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlBuffer, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlBuffer,
        _: wayland_client::protocol::wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlOutput, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlOutput,
        _: wayland_client::protocol::wl_output::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlDataDeviceManager, ()> for App {
    fn event(
        _: &mut Self,
        _: &WlDataDeviceManager,
        _: wayland_client::protocol::wl_data_device_manager::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}
