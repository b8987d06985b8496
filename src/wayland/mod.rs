//! Session/protocol client
//!
//! Connection to the display server plus the set of bound global
//! capabilities. Globals are collected during registry dispatch and
//! validated once after the startup roundtrip barrier; a missing
//! required capability is fatal and non-retryable.

pub mod window;

use log::{debug, info};
use thiserror::Error;
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_data_device_manager::WlDataDeviceManager,
    wl_output::WlOutput, wl_registry::WlRegistry, wl_seat::WlSeat, wl_shm::WlShm,
};
use wayland_client::{Connection, Dispatch, QueueHandle};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

/// Fatal startup failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open display: {0}")]
    Connect(#[from] wayland_client::ConnectError),
    #[error("display has no {0}")]
    MissingGlobal(&'static str),
}

/// Bound versions. The protocol errors out a bind above what the
/// compositor advertises; these are the minimums this crate needs.
const COMPOSITOR_VERSION: u32 = 3;
const SHM_VERSION: u32 = 1;
/// v4 carries keyboard repeat-info
const SEAT_VERSION: u32 = 4;
const DATA_DEVICE_MANAGER_VERSION: u32 = 1;
const WM_BASE_VERSION: u32 = 1;
/// v2 so surfaces report enter/leave per output
const OUTPUT_VERSION: u32 = 2;

/// Connect to the display named by the environment
pub fn connect() -> Result<Connection, SessionError> {
    let conn = Connection::connect_to_env()?;
    info!("Connected to wayland display");
    Ok(conn)
}

/// Global capabilities recognized during registry scan
#[derive(Default)]
pub struct Globals {
    pub compositor: Option<WlCompositor>,
    pub shm: Option<WlShm>,
    pub seat: Option<WlSeat>,
    pub data_device_manager: Option<WlDataDeviceManager>,
    pub wm_base: Option<XdgWmBase>,
    /// Bound so surface enter/leave events carry them
    pub outputs: Vec<WlOutput>,
}

impl Globals {
    /// Bind one advertised global if it is a recognized capability
    pub fn register<D>(
        &mut self,
        registry: &WlRegistry,
        name: u32,
        interface: &str,
        qh: &QueueHandle<D>,
    ) where
        D: Dispatch<WlCompositor, ()>
            + Dispatch<WlShm, ()>
            + Dispatch<WlSeat, ()>
            + Dispatch<WlDataDeviceManager, ()>
            + Dispatch<XdgWmBase, ()>
            + Dispatch<WlOutput, ()>
            + 'static,
    {
        match interface {
            "wl_compositor" => {
                self.compositor = Some(registry.bind(name, COMPOSITOR_VERSION, qh, ()));
            }
            "wl_shm" => {
                self.shm = Some(registry.bind(name, SHM_VERSION, qh, ()));
            }
            "wl_seat" => {
                self.seat = Some(registry.bind(name, SEAT_VERSION, qh, ()));
            }
            "wl_data_device_manager" => {
                self.data_device_manager =
                    Some(registry.bind(name, DATA_DEVICE_MANAGER_VERSION, qh, ()));
            }
            "xdg_wm_base" => {
                self.wm_base = Some(registry.bind(name, WM_BASE_VERSION, qh, ()));
            }
            "wl_output" => {
                self.outputs.push(registry.bind(name, OUTPUT_VERSION, qh, ()));
            }
            other => debug!("Ignoring global {}", other),
        }
    }

    /// Validate the required capability set after the roundtrip
    /// barrier. Missing globals are fatal.
    pub fn require(&self) -> Result<Required<'_>, SessionError> {
        Ok(Required {
            compositor: self
                .compositor
                .as_ref()
                .ok_or(SessionError::MissingGlobal("compositor"))?,
            shm: self.shm.as_ref().ok_or(SessionError::MissingGlobal("SHM"))?,
            seat: self
                .seat
                .as_ref()
                .ok_or(SessionError::MissingGlobal("seat"))?,
            data_device_manager: self
                .data_device_manager
                .as_ref()
                .ok_or(SessionError::MissingGlobal("data device manager"))?,
            wm_base: self
                .wm_base
                .as_ref()
                .ok_or(SessionError::MissingGlobal("xdg shell"))?,
        })
    }
}

/// Non-optional view of the required globals
pub struct Required<'a> {
    pub compositor: &'a WlCompositor,
    pub shm: &'a WlShm,
    pub seat: &'a WlSeat,
    pub data_device_manager: &'a WlDataDeviceManager,
    pub wm_base: &'a XdgWmBase,
}
