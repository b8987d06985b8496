//! Input handling
//!
//! Keyboard state for the compositor seat:
//! - keymap compilation from the compositor-supplied descriptor
//! - modifier serialization into an application-level mask
//! - key-repeat record for timer-driven replay
//! - key to byte-sequence resolution (key table + composition
//!   transforms; the shortcut table is matched by the caller first)

pub mod pointer;

use bitflags::bitflags;
use log::{debug, info, warn};
use memmap2::MmapOptions;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};
use xkbcommon::xkb;
use xkbcommon::xkb::keysyms;

use crate::term::TermMode;

bitflags! {
    /// Application-level modifier mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModMask: u32 {
        const CTRL  = 1 << 0;
        const ALT   = 1 << 1;
        const SHIFT = 1 << 2;
        const LOGO  = 1 << 3;
    }
}

/// Resolved xkb modifier indices, cached once per keymap
#[derive(Debug, Clone, Copy)]
struct ModIndices {
    ctrl: u32,
    alt: u32,
    shift: u32,
    logo: u32,
}

/// Serialize an effective-mods bitset into the application mask.
/// Only the four recognized indices contribute, so released modifiers
/// can never leave stale bits behind.
fn mask_from_bits(bits: u32, idx: &ModIndices) -> ModMask {
    let mut mods = ModMask::empty();
    let test = |i: u32| i != xkb::MOD_INVALID && bits & (1 << i) != 0;
    if test(idx.ctrl) {
        mods |= ModMask::CTRL;
    }
    if test(idx.alt) {
        mods |= ModMask::ALT;
    }
    if test(idx.shift) {
        mods |= ModMask::SHIFT;
    }
    if test(idx.logo) {
        mods |= ModMask::LOGO;
    }
    mods
}

/// Pending key repeat: the last resolved press, replayed after the
/// initial delay at a fixed interval until release or focus loss
#[derive(Debug, Clone)]
pub struct RepeatRecord {
    pub key: u32,
    pub bytes: Vec<u8>,
    /// False until the initial delay has elapsed once
    pub started: bool,
    pub last: Instant,
}

/// Keyboard input state
pub struct Keyboard {
    context: xkb::Context,
    state: Option<xkb::State>,
    indices: Option<ModIndices>,
    /// Currently held recognized modifiers
    pub mods: ModMask,
    repeat: Option<RepeatRecord>,
    repeat_delay: Duration,
    repeat_interval: Duration,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            state: None,
            indices: None,
            mods: ModMask::empty(),
            repeat: None,
            // Compositor repeat-info overrides these
            repeat_delay: Duration::from_millis(660),
            repeat_interval: Duration::from_millis(40),
        }
    }

    /// Compile the compositor-supplied keymap. The fd carries the
    /// keymap text; a descriptor that fails to compile leaves any
    /// previous keymap in place.
    pub fn load_keymap(&mut self, fd: OwnedFd, size: u32) {
        let file = File::from(fd);
        let map = match unsafe { MmapOptions::new().len(size as usize).map_copy_read_only(&file) } {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot map keymap fd: {}", e);
                return;
            }
        };
        let text = match std::str::from_utf8(&map) {
            // The descriptor is NUL-terminated
            Ok(s) => s.trim_end_matches('\0').to_string(),
            Err(e) => {
                warn!("Keymap is not valid UTF-8: {}", e);
                return;
            }
        };
        let keymap = match xkb::Keymap::new_from_string(
            &self.context,
            text,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        ) {
            Some(k) => k,
            None => {
                warn!("Keymap failed to compile, keeping previous");
                return;
            }
        };

        self.indices = Some(ModIndices {
            ctrl: keymap.mod_get_index(xkb::MOD_NAME_CTRL),
            alt: keymap.mod_get_index(xkb::MOD_NAME_ALT),
            shift: keymap.mod_get_index(xkb::MOD_NAME_SHIFT),
            logo: keymap.mod_get_index(xkb::MOD_NAME_LOGO),
        });
        // the state holds its own reference to the keymap
        self.state = Some(xkb::State::new(&keymap));
        self.mods = ModMask::empty();
        info!("Keymap compiled");
    }

    pub fn has_keymap(&self) -> bool {
        self.state.is_some()
    }

    /// Apply a modifiers event and re-serialize the mask
    pub fn update_mods(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        let (Some(state), Some(indices)) = (self.state.as_mut(), self.indices.as_ref()) else {
            return;
        };
        state.update_mask(depressed, latched, locked, 0, 0, group);
        let bits = state.serialize_mods(xkb::STATE_MODS_EFFECTIVE);
        self.mods = mask_from_bits(bits, indices);
    }

    /// Keysym and composed text for a wayland keycode (evdev + 8)
    pub fn lookup(&self, key: u32) -> Option<(u32, String)> {
        let state = self.state.as_ref()?;
        let keycode = xkb::Keycode::new(key + 8);
        let sym = state.key_get_one_sym(keycode);
        let utf8 = xkb::keysym_to_utf8(sym)
            .trim_end_matches('\0')
            .to_string();
        Some((sym.raw(), utf8))
    }

    // ---- key repeat ----

    /// Capture the resolved bytes of a press for periodic replay
    pub fn arm_repeat(&mut self, key: u32, bytes: &[u8]) {
        self.repeat = Some(RepeatRecord {
            key,
            bytes: bytes.to_vec(),
            started: false,
            last: Instant::now(),
        });
    }

    /// A release clears the record only when it matches the tracked
    /// key
    pub fn release(&mut self, key: u32) {
        if self.repeat.as_ref().is_some_and(|r| r.key == key) {
            self.repeat = None;
        }
    }

    /// Cancel outright (focus loss)
    pub fn cancel_repeat(&mut self) {
        self.repeat = None;
    }

    pub fn set_repeat_info(&mut self, rate: i32, delay: i32) {
        self.repeat_delay = Duration::from_millis(delay.max(0) as u64);
        self.repeat_interval = if rate > 0 {
            Duration::from_millis((1000 / rate).max(1) as u64)
        } else {
            // rate 0 disables repeat per the protocol
            Duration::from_secs(3600)
        };
        debug!(
            "Key repeat: delay {:?}, interval {:?}",
            self.repeat_delay, self.repeat_interval
        );
    }

    /// Next instant the repeat timer should fire, if armed
    pub fn repeat_deadline(&self) -> Option<Instant> {
        self.repeat.as_ref().map(|r| {
            r.last
                + if r.started {
                    self.repeat_interval
                } else {
                    self.repeat_delay
                }
        })
    }

    /// Advance the repeat timer; returns bytes to replay when due
    pub fn repeat_tick(&mut self, now: Instant) -> Option<Vec<u8>> {
        let deadline = self.repeat_deadline()?;
        if now < deadline {
            return None;
        }
        let rec = self.repeat.as_mut()?;
        rec.started = true;
        rec.last = now;
        Some(rec.bytes.clone())
    }
}

/// Lowercase a latin keysym so shifted chords ("ctrl+shift+c", which
/// the keymap reports as keysym C) match their parsed lowercase form.
/// ASCII keysyms equal their character codes.
pub fn keysym_to_lower(sym: u32) -> u32 {
    if (0x41..=0x5a).contains(&sym) {
        sym + 0x20
    } else {
        sym
    }
}

// ============================================================================
// Key table
// ============================================================================

/// Screening against a terminal mode: 0 ignores the mode, +1 requires
/// it set, -1 requires it clear
type ModeReq = i8;

/// One built-in key table entry
struct KeyEntry {
    sym: u32,
    /// None matches any modifier state
    mods: Option<ModMask>,
    appcursor: ModeReq,
    appkey: ModeReq,
    s: &'static [u8],
}

const fn key(sym: u32, mods: Option<ModMask>, appcursor: ModeReq, appkey: ModeReq, s: &'static [u8]) -> KeyEntry {
    KeyEntry {
        sym,
        mods,
        appcursor,
        appkey,
        s,
    }
}

/// Fixed strings per (keysym, modifiers), screened by the application
/// cursor/keypad modes
#[rustfmt::skip]
static KEY_TABLE: &[KeyEntry] = &[
    key(keysyms::KEY_Up,          None, -1, 0, b"\x1b[A"),
    key(keysyms::KEY_Up,          None,  1, 0, b"\x1bOA"),
    key(keysyms::KEY_Down,        None, -1, 0, b"\x1b[B"),
    key(keysyms::KEY_Down,        None,  1, 0, b"\x1bOB"),
    key(keysyms::KEY_Right,       None, -1, 0, b"\x1b[C"),
    key(keysyms::KEY_Right,       None,  1, 0, b"\x1bOC"),
    key(keysyms::KEY_Left,        None, -1, 0, b"\x1b[D"),
    key(keysyms::KEY_Left,        None,  1, 0, b"\x1bOD"),
    key(keysyms::KEY_Home,        None, -1, 0, b"\x1b[H"),
    key(keysyms::KEY_Home,        None,  1, 0, b"\x1b[1~"),
    key(keysyms::KEY_End,         None,  0, 0, b"\x1b[F"),
    key(keysyms::KEY_Insert,      None,  0, 0, b"\x1b[2~"),
    key(keysyms::KEY_Delete,      None,  0, 0, b"\x1b[3~"),
    key(keysyms::KEY_Page_Up,     None,  0, 0, b"\x1b[5~"),
    key(keysyms::KEY_Page_Down,   None,  0, 0, b"\x1b[6~"),
    key(keysyms::KEY_BackSpace,   None,  0, 0, b"\x7f"),
    key(keysyms::KEY_Tab,         None,  0, 0, b"\t"),
    key(keysyms::KEY_ISO_Left_Tab, Some(ModMask::SHIFT), 0, 0, b"\x1b[Z"),
    key(keysyms::KEY_Return,      Some(ModMask::ALT), 0, 0, b"\x1b\r"),
    key(keysyms::KEY_Return,      None,  0, 0, b"\r"),
    key(keysyms::KEY_KP_Enter,    None,  0,  1, b"\x1bOM"),
    key(keysyms::KEY_KP_Enter,    None,  0, -1, b"\r"),
    key(keysyms::KEY_F1,          None,  0, 0, b"\x1bOP"),
    key(keysyms::KEY_F2,          None,  0, 0, b"\x1bOQ"),
    key(keysyms::KEY_F3,          None,  0, 0, b"\x1bOR"),
    key(keysyms::KEY_F4,          None,  0, 0, b"\x1bOS"),
    key(keysyms::KEY_F5,          None,  0, 0, b"\x1b[15~"),
    key(keysyms::KEY_F6,          None,  0, 0, b"\x1b[17~"),
    key(keysyms::KEY_F7,          None,  0, 0, b"\x1b[18~"),
    key(keysyms::KEY_F8,          None,  0, 0, b"\x1b[19~"),
    key(keysyms::KEY_F9,          None,  0, 0, b"\x1b[20~"),
    key(keysyms::KEY_F10,         None,  0, 0, b"\x1b[21~"),
    key(keysyms::KEY_F11,         None,  0, 0, b"\x1b[23~"),
    key(keysyms::KEY_F12,         None,  0, 0, b"\x1b[24~"),
];

fn mode_req_ok(req: ModeReq, set: bool) -> bool {
    match req {
        0 => true,
        r if r > 0 => set,
        _ => !set,
    }
}

/// Look up the fixed string for a key, honoring modifier and
/// application-mode screening. First match wins.
pub fn key_table_lookup(sym: u32, mods: ModMask, mode: TermMode) -> Option<&'static [u8]> {
    KEY_TABLE
        .iter()
        .find(|e| {
            e.sym == sym
                && e.mods.map_or(true, |m| m == mods)
                && mode_req_ok(e.appcursor, mode.contains(TermMode::APPCURSOR))
                && mode_req_ok(e.appkey, mode.contains(TermMode::APPKEYPAD))
        })
        .map(|e| e.s)
}

// ============================================================================
// Composition transforms
// ============================================================================

/// Transform composed input-method text by held modifiers:
/// Alt either sets the eighth bit (8-bit mode) or prefixes ESC;
/// Ctrl maps single bytes onto control codes the keymap does not
/// produce by itself.
pub fn compose_bytes(utf8: &str, mods: ModMask, eight_bit: bool) -> Vec<u8> {
    let bytes = utf8.as_bytes();
    if bytes.is_empty() {
        return Vec::new();
    }

    if bytes.len() == 1 && mods.contains(ModMask::ALT) {
        let c = bytes[0];
        if eight_bit {
            if c < 0x7f {
                // set the meta bit and re-encode
                let mut buf = [0u8; 4];
                let ch = char::from_u32(c as u32 | 0x80).unwrap_or('\u{fffd}');
                return ch.encode_utf8(&mut buf).as_bytes().to_vec();
            }
        } else {
            return vec![0x1b, c];
        }
    } else if bytes.len() == 1 && mods.contains(ModMask::CTRL) {
        let c = bytes[0];
        let mapped = match c {
            b'@'..=0x7e | b' ' => c & 0x1f,
            b'2' => 0x00,
            b'3'..=b'7' => c - (b'3' - 0x1b),
            b'8' => 0x7f,
            b'/' => b'_' & 0x1f,
            _ => c,
        };
        return vec![mapped];
    }

    bytes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDX: ModIndices = ModIndices {
        ctrl: 2,
        alt: 3,
        shift: 0,
        logo: 6,
    };

    #[test]
    fn test_mask_from_bits_exact() {
        assert_eq!(mask_from_bits(0, &IDX), ModMask::empty());
        assert_eq!(mask_from_bits(1 << 2, &IDX), ModMask::CTRL);
        assert_eq!(
            mask_from_bits(1 << 2 | 1 << 0, &IDX),
            ModMask::CTRL | ModMask::SHIFT
        );
        // unrecognized bits contribute nothing
        assert_eq!(mask_from_bits(1 << 5, &IDX), ModMask::empty());
        // releasing everything clears everything
        assert_eq!(mask_from_bits(0, &IDX), ModMask::empty());
    }

    #[test]
    fn test_mask_invalid_index_ignored() {
        let idx = ModIndices {
            ctrl: xkb::MOD_INVALID,
            ..IDX
        };
        assert_eq!(mask_from_bits(!0, &idx) & ModMask::CTRL, ModMask::empty());
    }

    #[test]
    fn test_keysym_to_lower() {
        assert_eq!(keysym_to_lower(0x43), 0x63); // C -> c
        assert_eq!(keysym_to_lower(0x63), 0x63);
        assert_eq!(keysym_to_lower(keysyms::KEY_Return), keysyms::KEY_Return);
    }

    #[test]
    fn test_ctrl_compose() {
        assert_eq!(compose_bytes("a", ModMask::CTRL, false), vec![0x01]);
        assert_eq!(compose_bytes(" ", ModMask::CTRL, false), vec![0x00]);
        assert_eq!(compose_bytes("2", ModMask::CTRL, false), vec![0x00]);
        assert_eq!(compose_bytes("3", ModMask::CTRL, false), vec![0x1b]);
        assert_eq!(compose_bytes("7", ModMask::CTRL, false), vec![0x1f]);
        assert_eq!(compose_bytes("8", ModMask::CTRL, false), vec![0x7f]);
        assert_eq!(compose_bytes("/", ModMask::CTRL, false), vec![0x1f]);
    }

    #[test]
    fn test_alt_compose_seven_bit() {
        assert_eq!(compose_bytes("a", ModMask::ALT, false), vec![0x1b, b'a']);
    }

    #[test]
    fn test_alt_compose_eight_bit() {
        // 'a' | 0x80 = U+00E1, UTF-8 C3 A1
        assert_eq!(compose_bytes("a", ModMask::ALT, true), vec![0xc3, 0xa1]);
    }

    #[test]
    fn test_compose_passthrough() {
        assert_eq!(compose_bytes("x", ModMask::empty(), false), vec![b'x']);
        assert_eq!(
            compose_bytes("あ", ModMask::CTRL, false),
            "あ".as_bytes().to_vec()
        );
    }

    #[test]
    fn test_key_table_appcursor_screening() {
        let normal = key_table_lookup(keysyms::KEY_Up, ModMask::empty(), TermMode::empty());
        assert_eq!(normal, Some(b"\x1b[A".as_ref()));
        let app = key_table_lookup(keysyms::KEY_Up, ModMask::empty(), TermMode::APPCURSOR);
        assert_eq!(app, Some(b"\x1bOA".as_ref()));
    }

    #[test]
    fn test_key_table_mods() {
        // exact-modifier entries only match their chord
        let shift_tab =
            key_table_lookup(keysyms::KEY_ISO_Left_Tab, ModMask::SHIFT, TermMode::empty());
        assert_eq!(shift_tab, Some(b"\x1b[Z".as_ref()));
        // Alt+Return precedes the any-mod Return entry
        let alt_ret = key_table_lookup(keysyms::KEY_Return, ModMask::ALT, TermMode::empty());
        assert_eq!(alt_ret, Some(b"\x1b\r".as_ref()));
        let ret = key_table_lookup(keysyms::KEY_Return, ModMask::empty(), TermMode::empty());
        assert_eq!(ret, Some(b"\r".as_ref()));
    }

    #[test]
    fn test_repeat_record_lifecycle() {
        let mut kbd = Keyboard::new();
        kbd.set_repeat_info(25, 400);
        kbd.arm_repeat(30, b"a");
        // a release of a different key leaves the record armed
        kbd.release(31);
        assert!(kbd.repeat_deadline().is_some());
        // matching release clears it
        kbd.release(30);
        assert!(kbd.repeat_deadline().is_none());
    }

    #[test]
    fn test_repeat_delay_then_interval() {
        let mut kbd = Keyboard::new();
        kbd.set_repeat_info(25, 400);
        kbd.arm_repeat(30, b"a");
        let armed = kbd.repeat.as_ref().unwrap().last;
        // not due before the initial delay
        assert!(kbd.repeat_tick(armed + Duration::from_millis(100)).is_none());
        // due after the delay, then repeats at the interval
        let first = armed + Duration::from_millis(401);
        assert_eq!(kbd.repeat_tick(first), Some(b"a".to_vec()));
        assert!(kbd.repeat_tick(first + Duration::from_millis(10)).is_none());
        assert_eq!(
            kbd.repeat_tick(first + Duration::from_millis(41)),
            Some(b"a".to_vec())
        );
    }
}
