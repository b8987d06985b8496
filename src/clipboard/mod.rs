//! Clipboard/data-transfer handling
//!
//! Dual role over the seat's data device:
//! - source: a fresh data source per primary-selection assignment,
//!   advertising exactly one plain-text mime type and delivering the
//!   buffer in bounded chunks on request
//! - sink: external offers tagged usable once a plain-text mime type
//!   is advertised (set once, never downgraded), adopted on the
//!   selection signal and invalidated on focus loss

use log::debug;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use wayland_client::protocol::{
    wl_data_device::WlDataDevice, wl_data_device_manager::WlDataDeviceManager,
    wl_data_offer::WlDataOffer, wl_data_source::WlDataSource, wl_seat::WlSeat,
};
use wayland_client::{Connection, Proxy, QueueHandle};

use crate::app::App;

/// The one mime type offered and requested
pub const MIME_TEXT: &str = "text/plain; charset=utf-8";

/// Delivery chunk size
const WRITE_CHUNK: usize = 8192;

/// Per-offer state: the plain-text tag, set once when a compatible
/// mime type is advertised and never cleared for the offer's lifetime
#[derive(Debug, Default)]
pub struct OfferData {
    plain_text: AtomicBool,
}

impl OfferData {
    pub fn mark_plain_text(&self) {
        self.plain_text.store(true, Ordering::Relaxed);
    }

    pub fn is_plain_text(&self) -> bool {
        self.plain_text.load(Ordering::Relaxed)
    }
}

/// Whether an advertised mime type satisfies the plain-text tag
pub fn mime_is_plain_text(mime: &str) -> bool {
    mime.starts_with("text/plain")
}

/// Clipboard state over one data device
pub struct Clipboard {
    pub data_device: WlDataDevice,
    /// Outgoing source; present exactly while we own the selection
    source: Option<WlDataSource>,
    /// Adopted external offer, usable for pasting
    offer: Option<WlDataOffer>,
}

impl Clipboard {
    pub fn new(manager: &WlDataDeviceManager, seat: &WlSeat, qh: &QueueHandle<App>) -> Self {
        Self {
            data_device: manager.get_data_device(seat, qh, ()),
            source: None,
            offer: None,
        }
    }

    // ---- source role ----

    /// Register (or withdraw) selection ownership with the event
    /// serial that justifies it. Any previous source is dropped; at
    /// most one outgoing source exists at a time.
    pub fn set_selection(
        &mut self,
        manager: &WlDataDeviceManager,
        qh: &QueueHandle<App>,
        own: bool,
        serial: u32,
    ) {
        if let Some(old) = self.source.take() {
            old.destroy();
        }
        let source = own.then(|| {
            let source = manager.create_data_source(qh, ());
            source.offer(MIME_TEXT.to_string());
            source
        });
        self.data_device.set_selection(source.as_ref(), serial);
        self.source = source;
    }

    pub fn owns_selection(&self) -> bool {
        self.source.is_some()
    }

    /// Another client superseded our source. Returns true when it was
    /// the live one, in which case the caller clears selection state.
    pub fn source_cancelled(&mut self, source: &WlDataSource) -> bool {
        let was_live = self.source.as_ref() == Some(source);
        if was_live {
            self.source = None;
        }
        source.destroy();
        debug!("Data source cancelled (live: {})", was_live);
        was_live
    }

    /// Deliver the buffer to a requester's channel in bounded chunks.
    /// A prematurely closed channel truncates delivery without error.
    pub fn send(text: &str, fd: OwnedFd) {
        let mut file = File::from(fd);
        for chunk in text.as_bytes().chunks(WRITE_CHUNK) {
            if file.write_all(chunk).is_err() {
                break;
            }
        }
        // channel released on drop
    }

    // ---- sink role ----

    /// The compositor announced the current selection. Adopt the
    /// offer only if it was tagged plain-text-compatible; anything
    /// else leaves us with no paste source.
    pub fn select_offer(&mut self, offer: Option<WlDataOffer>) {
        if let Some(old) = self.offer.take() {
            old.destroy();
        }
        match offer {
            Some(o) => {
                let usable = o
                    .data::<OfferData>()
                    .is_some_and(|d| d.is_plain_text());
                if usable {
                    self.offer = Some(o);
                } else {
                    debug!("Selection offer without plain text, ignoring");
                    o.destroy();
                }
            }
            None => {}
        }
    }

    /// Keyboard focus loss invalidates the tracked offer
    pub fn drop_offer(&mut self) {
        if let Some(offer) = self.offer.take() {
            offer.destroy();
        }
    }

    pub fn has_offer(&self) -> bool {
        self.offer.is_some()
    }

    /// Request the current offer's content: open a pipe, hand the
    /// write end to the source client, flush, and drain the read end.
    pub fn receive(&self, conn: &Connection) -> Option<Vec<u8>> {
        let offer = self.offer.as_ref()?;
        let (read_fd, write_fd) = nix::unistd::pipe().ok()?;
        let read_fd = unsafe { OwnedFd::from_raw_fd(read_fd) };
        let write_fd = unsafe { OwnedFd::from_raw_fd(write_fd) };
        offer.receive(MIME_TEXT.to_string(), write_fd.as_fd());
        drop(write_fd);
        let _ = conn.flush();
        let mut buf = Vec::new();
        File::from(read_fd).read_to_end(&mut buf).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_plain_text_prefix() {
        assert!(mime_is_plain_text("text/plain"));
        assert!(mime_is_plain_text("text/plain; charset=utf-8"));
        assert!(!mime_is_plain_text("image/png"));
        assert!(!mime_is_plain_text("TEXT"));
    }

    #[test]
    fn test_offer_tag_is_sticky() {
        let data = OfferData::default();
        assert!(!data.is_plain_text());
        data.mark_plain_text();
        assert!(data.is_plain_text());
        // later incompatible mime types never downgrade the tag
        if !mime_is_plain_text("image/png") {
            // nothing to do: the tag is only ever set
        }
        assert!(data.is_plain_text());
    }
}
