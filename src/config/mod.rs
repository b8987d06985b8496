//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/wcon/config.toml
//!
//! Shortcut tables are parsed here into the typed forms the input
//! layer consumes; keysym names resolve through xkbcommon.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use xkbcommon::xkb;

use crate::input::ModMask;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Font settings
    pub font: FontConfig,
    /// Window settings
    pub window: WindowConfig,
    /// Color scheme settings
    pub colors: ColorsConfig,
    /// Mouse and selection settings
    pub mouse: MouseConfig,
    /// Keybind settings
    pub keybinds: KeybindConfig,
}

/// Font settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Font family name or file path
    pub family: String,
    /// Font size in pixels
    pub size: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: "monospace".to_string(),
            size: 16.0,
        }
    }
}

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Border thickness in pixels
    pub border: u32,
    /// Cursor shape (DECSCUSR-style): 0-2 block, 3-4 underline,
    /// 5-6 bar, 7 block with the st snowman extension
    pub cursor_style: u8,
    /// Thickness of underline/bar cursors in pixels
    pub cursor_thickness: u32,
    /// Window title
    pub title: String,
    /// Application id reported to the compositor
    pub app_id: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            border: 2,
            cursor_style: 2,
            cursor_thickness: 2,
            title: "wcon".to_string(),
            app_id: "wcon".to_string(),
        }
    }
}

/// Color scheme settings (ANSI 16 colors plus specials, RRGGBB hex)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub black: String,
    pub red: String,
    pub green: String,
    pub yellow: String,
    pub blue: String,
    pub magenta: String,
    pub cyan: String,
    pub white: String,
    pub bright_black: String,
    pub bright_red: String,
    pub bright_green: String,
    pub bright_yellow: String,
    pub bright_blue: String,
    pub bright_magenta: String,
    pub bright_cyan: String,
    pub bright_white: String,
    /// Default foreground
    pub foreground: String,
    /// Default background
    pub background: String,
    /// Focused cursor fill
    pub cursor: String,
    /// Cursor fill over selected cells
    pub reverse_cursor: String,
    /// Foreground used when a styled variant falls back to the
    /// regular face (missing italic/bold)
    pub default_attr: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            black: "000000".into(),
            red: "cd0000".into(),
            green: "00cd00".into(),
            yellow: "cdcd00".into(),
            blue: "0000ee".into(),
            magenta: "cd00cd".into(),
            cyan: "00cdcd".into(),
            white: "e5e5e5".into(),
            bright_black: "7f7f7f".into(),
            bright_red: "ff0000".into(),
            bright_green: "00ff00".into(),
            bright_yellow: "ffff00".into(),
            bright_blue: "5c5cff".into(),
            bright_magenta: "ff00ff".into(),
            bright_cyan: "00ffff".into(),
            bright_white: "ffffff".into(),
            foreground: "e5e5e5".into(),
            background: "000000".into(),
            cursor: "00cd00".into(),
            reverse_cursor: "cd0000".into(),
            default_attr: "ff0000".into(),
        }
    }
}

impl ColorsConfig {
    /// The sixteen ANSI entries in palette order
    pub fn ansi(&self) -> [&str; 16] {
        [
            &self.black,
            &self.red,
            &self.green,
            &self.yellow,
            &self.blue,
            &self.magenta,
            &self.cyan,
            &self.white,
            &self.bright_black,
            &self.bright_red,
            &self.bright_green,
            &self.bright_yellow,
            &self.bright_blue,
            &self.bright_magenta,
            &self.bright_cyan,
            &self.bright_white,
        ]
    }
}

/// Mouse and selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    /// Double-click window in milliseconds
    pub double_click_ms: u32,
    /// Triple-click window in milliseconds
    pub triple_click_ms: u32,
    /// Modifier that forces selection while mouse reporting is active
    pub force_select_mod: String,
    /// Modifier that switches to rectangular selection
    pub rect_select_mod: String,
    /// Characters that terminate a word snap
    pub word_delimiters: String,
    /// Raw byte strings sent on mouse buttons (outside mouse mode)
    pub shortcuts: Vec<MouseShortcutConfig>,
    /// Raw byte strings sent on scroll (outside mouse mode)
    pub axis_shortcuts: Vec<AxisShortcutConfig>,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            double_click_ms: 300,
            triple_click_ms: 600,
            force_select_mod: "shift".to_string(),
            rect_select_mod: "alt".to_string(),
            word_delimiters: " ".to_string(),
            shortcuts: Vec::new(),
            // Scroll feeds ^Y / ^E, the classic line-scroll chords
            axis_shortcuts: vec![
                AxisShortcutConfig {
                    axis: "up".into(),
                    mods: "any".into(),
                    send: "\x19".into(),
                },
                AxisShortcutConfig {
                    axis: "down".into(),
                    mods: "any".into(),
                    send: "\x05".into(),
                },
            ],
        }
    }
}

/// One mouse-button shortcut entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MouseShortcutConfig {
    /// "left" | "middle" | "right"
    pub button: String,
    /// Modifier chord, "any" matches every state
    pub mods: String,
    /// Bytes written to the terminal
    pub send: String,
}

/// One scroll shortcut entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AxisShortcutConfig {
    /// "up" | "down" | "left" | "right"
    pub axis: String,
    /// Modifier chord, "any" matches every state
    pub mods: String,
    /// Bytes written to the terminal
    pub send: String,
}

/// Keybind settings
/// Each keybind can be a single key ("ctrl+shift+c") or multiple keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindConfig {
    /// Copy selection (default: "ctrl+shift+c")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub copy: Vec<String>,
    /// Paste (default: "ctrl+shift+v")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub paste: Vec<String>,
    /// Font increase (default: "ctrl+shift+plus")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_increase: Vec<String>,
    /// Font decrease (default: "ctrl+shift+minus")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_decrease: Vec<String>,
    /// Font reset (default: "ctrl+shift+0")
    #[serde(deserialize_with = "deserialize_keybind")]
    pub font_reset: Vec<String>,
}

impl Default for KeybindConfig {
    fn default() -> Self {
        Self {
            copy: vec!["ctrl+shift+c".to_string()],
            paste: vec!["ctrl+shift+v".to_string()],
            font_increase: vec!["ctrl+shift+plus".to_string()],
            font_decrease: vec!["ctrl+shift+minus".to_string()],
            font_reset: vec!["ctrl+shift+0".to_string()],
        }
    }
}

/// Accept either a single string or a list of strings
fn deserialize_keybind<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Shortcut actions dispatched before any byte translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Copy,
    Paste,
    ZoomIn,
    ZoomOut,
    ZoomReset,
}

/// One resolved key shortcut: exact modifier chord + keysym
#[derive(Debug, Clone, Copy)]
pub struct KeyShortcut {
    pub mods: ModMask,
    pub keysym: u32,
    pub action: Action,
}

/// One resolved mouse-button shortcut
#[derive(Debug, Clone)]
pub struct MouseShortcut {
    pub mods: Option<ModMask>,
    pub button: u32,
    pub send: Vec<u8>,
}

/// One resolved axis shortcut
#[derive(Debug, Clone)]
pub struct AxisShortcut {
    pub mods: Option<ModMask>,
    pub vertical: bool,
    /// +1 scrolls down/right, -1 up/left
    pub dir: i32,
    pub send: Vec<u8>,
}

impl Config {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wcon").join("config.toml"))
    }

    /// Load configuration. Missing file falls back to defaults;
    /// a malformed file is an error.
    pub fn load() -> Result<Self> {
        let path = match Self::default_path() {
            Some(p) if p.exists() => p,
            _ => {
                info!("No config file, using defaults");
                return Ok(Self::default());
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&text)
            .with_context(|| format!("Cannot parse config: {}", path.display()))?;
        info!("Config loaded: {}", path.display());
        Ok(cfg)
    }

    /// Resolve the keybind table into (mods, keysym, action) entries.
    /// Unparseable binds are skipped with a warning.
    pub fn key_shortcuts(&self) -> Vec<KeyShortcut> {
        let mut out = Vec::new();
        let groups: [(&[String], Action); 5] = [
            (&self.keybinds.copy, Action::Copy),
            (&self.keybinds.paste, Action::Paste),
            (&self.keybinds.font_increase, Action::ZoomIn),
            (&self.keybinds.font_decrease, Action::ZoomOut),
            (&self.keybinds.font_reset, Action::ZoomReset),
        ];
        for (binds, action) in groups {
            for bind in binds {
                match parse_keybind(bind) {
                    Some((mods, keysym)) => out.push(KeyShortcut { mods, keysym, action }),
                    None => warn!("Ignoring unparseable keybind \"{}\"", bind),
                }
            }
        }
        out
    }

    /// Resolve the mouse-button shortcut table
    pub fn mouse_shortcuts(&self) -> Vec<MouseShortcut> {
        self.mouse
            .shortcuts
            .iter()
            .filter_map(|s| {
                let button = parse_button(&s.button)?;
                Some(MouseShortcut {
                    mods: parse_mods_opt(&s.mods),
                    button,
                    send: s.send.clone().into_bytes(),
                })
            })
            .collect()
    }

    /// Resolve the axis shortcut table
    pub fn axis_shortcuts(&self) -> Vec<AxisShortcut> {
        self.mouse
            .axis_shortcuts
            .iter()
            .filter_map(|s| {
                let (vertical, dir) = match s.axis.as_str() {
                    "up" => (true, -1),
                    "down" => (true, 1),
                    "left" => (false, -1),
                    "right" => (false, 1),
                    other => {
                        warn!("Ignoring axis shortcut with axis \"{}\"", other);
                        return None;
                    }
                };
                Some(AxisShortcut {
                    mods: parse_mods_opt(&s.mods),
                    vertical,
                    dir,
                    send: s.send.clone().into_bytes(),
                })
            })
            .collect()
    }

    /// Modifier that forces selection over mouse reporting
    pub fn force_select_mod(&self) -> ModMask {
        parse_mods(&self.mouse.force_select_mod)
    }

    /// Modifier that selects rectangular mode
    pub fn rect_select_mod(&self) -> ModMask {
        parse_mods(&self.mouse.rect_select_mod)
    }
}

/// Parse "ctrl+shift+c" into (mods, keysym)
fn parse_keybind(spec: &str) -> Option<(ModMask, u32)> {
    let mut mods = ModMask::empty();
    let mut keysym = None;
    for token in spec.split('+') {
        let token = token.trim();
        match token.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => mods |= ModMask::CTRL,
            "alt" | "meta" => mods |= ModMask::ALT,
            "shift" => mods |= ModMask::SHIFT,
            "logo" | "super" => mods |= ModMask::LOGO,
            name => {
                let sym = xkb::keysym_from_name(name, xkb::KEYSYM_CASE_INSENSITIVE);
                let raw = sym.raw();
                if raw == 0 {
                    return None;
                }
                keysym = Some(raw);
            }
        }
    }
    keysym.map(|k| (mods, k))
}

/// Parse a modifier chord; "any" (or empty) matches every state
fn parse_mods_opt(spec: &str) -> Option<ModMask> {
    let spec = spec.trim();
    if spec.is_empty() || spec.eq_ignore_ascii_case("any") {
        return None;
    }
    Some(parse_mods(spec))
}

fn parse_mods(spec: &str) -> ModMask {
    let mut mods = ModMask::empty();
    for token in spec.split('+') {
        match token.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => mods |= ModMask::CTRL,
            "alt" | "meta" => mods |= ModMask::ALT,
            "shift" => mods |= ModMask::SHIFT,
            "logo" | "super" => mods |= ModMask::LOGO,
            "" | "none" => {}
            other => warn!("Unknown modifier \"{}\"", other),
        }
    }
    mods
}

fn parse_button(name: &str) -> Option<u32> {
    // Linux input button codes, as delivered by wl_pointer
    match name.to_ascii_lowercase().as_str() {
        "left" => Some(crate::input::pointer::BTN_LEFT),
        "middle" => Some(crate::input::pointer::BTN_MIDDLE),
        "right" => Some(crate::input::pointer::BTN_RIGHT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keybind() {
        let (mods, sym) = parse_keybind("ctrl+shift+c").unwrap();
        assert_eq!(mods, ModMask::CTRL | ModMask::SHIFT);
        assert_eq!(
            sym,
            xkb::keysym_from_name("c", xkb::KEYSYM_CASE_INSENSITIVE).raw()
        );
        assert!(parse_keybind("ctrl+shift+notakey").is_none());
    }

    #[test]
    fn test_parse_mods_any() {
        assert!(parse_mods_opt("any").is_none());
        assert!(parse_mods_opt("").is_none());
        assert_eq!(parse_mods_opt("shift"), Some(ModMask::SHIFT));
    }

    #[test]
    fn test_default_axis_shortcuts() {
        let cfg = Config::default();
        let axis = cfg.axis_shortcuts();
        assert_eq!(axis.len(), 2);
        assert_eq!(axis[0].send, b"\x19");
        assert_eq!(axis[1].send, b"\x05");
        assert!(axis[0].mods.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [font]
            family = "DejaVu Sans Mono"
            size = 14.0

            [window]
            border = 4

            [keybinds]
            copy = ["ctrl+shift+c", "ctrl+insert"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.font.family, "DejaVu Sans Mono");
        assert_eq!(cfg.window.border, 4);
        assert_eq!(cfg.keybinds.copy.len(), 2);
        // untouched sections keep defaults
        assert_eq!(cfg.mouse.double_click_ms, 300);
    }
}
