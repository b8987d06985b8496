//! wcon - Wayland presentation and input layer for terminal emulators
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Event Loop                   │
//! ├──────────────────────────────────────────────┤
//! │  Seat input (xkb/pointer)  →  Tty bytes out  │
//! │  Grid updates (collaborator)      ↓          │
//! │            Renderer (shm canvas)             │
//! │                     ↓                        │
//! │       Compositor surface (xdg shell)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The crate binds a terminal character grid to a Wayland compositor:
//! it owns the window surface and its configure handshake, renders
//! glyphs incrementally into shared-memory buffers, and translates
//! seat input and clipboard traffic into terminal-level actions. The
//! VT escape-sequence interpreter and the child process live on the
//! other side of the [`term::Tty`] trait: the embedder drains its pty
//! into the [`term::Term`] grid and this crate draws it.
//!
//! ```no_run
//! use wcon::{App, Config, Tty};
//!
//! struct Shell;
//! impl Tty for Shell {
//!     fn write(&mut self, _bytes: &[u8]) { /* feed the pty */ }
//!     fn resize(&mut self, _cols: usize, _rows: usize) { /* TIOCSWINSZ */ }
//!     fn hangup(&mut self) { /* SIGHUP the child */ }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!     let cfg = Config::load()?;
//!     let (mut app, mut queue) = App::new(cfg, Box::new(Shell), 80, 24)?;
//!     app.run(&mut queue)
//! }
//! ```

pub mod app;
pub mod clipboard;
pub mod config;
pub mod font;
pub mod input;
pub mod render;
pub mod term;
pub mod wayland;

pub use app::App;
pub use config::Config;
pub use term::{Cell, CellAttrs, Color, Term, TermMode, Tty};
pub use wayland::SessionError;
