//! Viewer input events and their translation into native injection calls.

use crate::capture::CaptureSizeTracker;
use crate::error::{HostError, Result};
use crate::utils::clamp_ratio;
use enigo::{
    Button, Coordinate, Direction, Enigo, InputError, Key, Keyboard, Mouse, Settings,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// `right` and `middle` are recognized; anything else is the primary button.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("right") => Self::Right,
            Some("middle") => Self::Middle,
            _ => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    #[default]
    Down,
    Up,
}

impl<'de> Deserialize<'de> for KeyAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) if s == "up" => KeyAction::Up,
            _ => KeyAction::Down,
        })
    }
}

// Viewers are not trusted to send well-typed fields: a null or mistyped value
// decodes to the field's empty value instead of failing the whole event.

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_label<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

fn lenient_ratio<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_f64().unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub alt: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ctrl: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub shift: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub meta: bool,
}

/// Input event as sent by a viewer, over signaling or a control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    MouseMove {
        #[serde(rename = "xRatio", default, deserialize_with = "lenient_ratio")]
        x_ratio: f64,
        #[serde(rename = "yRatio", default, deserialize_with = "lenient_ratio")]
        y_ratio: f64,
    },
    MouseClick {
        #[serde(default, deserialize_with = "lenient_label")]
        button: Option<String>,
    },
    Key {
        #[serde(default)]
        action: KeyAction,
        #[serde(default, deserialize_with = "lenient_string")]
        key: String,
        #[serde(default, deserialize_with = "lenient_string")]
        code: String,
        #[serde(flatten)]
        mods: Modifiers,
    },
}

/// Native input backend. Implementations are platform specific.
pub trait InputInjector: Send + Sync {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()>;
    fn click(&self, button: MouseButton) -> Result<()>;
    fn key(&self, action: KeyAction, key: &str, code: &str, mods: Modifiers) -> Result<()>;
}

/// Backend that only records what it would inject.
#[derive(Debug, Default)]
pub struct LoggingInjector;

impl InputInjector for LoggingInjector {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        debug!(x, y, "inject mouse move");
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        debug!(?button, "inject mouse click");
        Ok(())
    }

    fn key(&self, action: KeyAction, key: &str, code: &str, mods: Modifiers) -> Result<()> {
        debug!(?action, key, code, ?mods, "inject key");
        Ok(())
    }
}

/// Injects through the desktop session with `enigo`. A connection is opened
/// per call, so the injector itself holds no platform handle.
#[derive(Debug, Default)]
pub struct EnigoInjector;

impl EnigoInjector {
    fn connect() -> Result<Enigo> {
        Enigo::new(&Settings::default())
            .map_err(|e| HostError::Injection(format!("no input connection: {e}")))
    }
}

fn injection_error(e: InputError) -> HostError {
    HostError::Injection(e.to_string())
}

impl From<MouseButton> for Button {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }
}

impl From<KeyAction> for Direction {
    fn from(action: KeyAction) -> Self {
        match action {
            KeyAction::Down => Direction::Press,
            KeyAction::Up => Direction::Release,
        }
    }
}

/// Map a DOM `KeyboardEvent.key` value onto an enigo key. Printable labels
/// map to their character; `None` for labels with no single key.
pub fn enigo_key(key: &str) -> Option<Key> {
    let named = match key {
        "Enter" => Key::Return,
        "Backspace" => Key::Backspace,
        "Tab" => Key::Tab,
        "Escape" => Key::Escape,
        "Delete" => Key::Delete,
        "Home" => Key::Home,
        "End" => Key::End,
        "PageUp" => Key::PageUp,
        "PageDown" => Key::PageDown,
        "ArrowUp" => Key::UpArrow,
        "ArrowDown" => Key::DownArrow,
        "ArrowLeft" => Key::LeftArrow,
        "ArrowRight" => Key::RightArrow,
        "CapsLock" => Key::CapsLock,
        "Shift" => Key::Shift,
        "Control" => Key::Control,
        "Alt" => Key::Alt,
        "Meta" => Key::Meta,
        " " | "Spacebar" => Key::Space,
        _ => {
            let mut chars = key.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::Unicode(c)),
                _ => None,
            };
        }
    };
    Some(named)
}

impl InputInjector for EnigoInjector {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        Self::connect()?
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(injection_error)
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        Self::connect()?
            .button(button.into(), Direction::Click)
            .map_err(injection_error)
    }

    fn key(&self, action: KeyAction, key: &str, code: &str, mods: Modifiers) -> Result<()> {
        let mut enigo = Self::connect()?;
        let held: Vec<Key> = [
            (mods.ctrl, Key::Control),
            (mods.shift, Key::Shift),
            (mods.alt, Key::Alt),
            (mods.meta, Key::Meta),
        ]
        .into_iter()
        .filter_map(|(on, key)| on.then_some(key))
        .collect();

        for modifier in &held {
            enigo
                .key(*modifier, Direction::Press)
                .map_err(injection_error)?;
        }

        let result = match enigo_key(key) {
            Some(k) => enigo.key(k, action.into()),
            // multi-character labels are typed as text on key down
            None if action == KeyAction::Down && !key.is_empty() => enigo.text(key),
            None => {
                debug!(key, code, "No native key for label, skipped");
                Ok(())
            }
        };

        // release in reverse even when the key itself failed
        for modifier in held.iter().rev() {
            if let Err(e) = enigo.key(*modifier, Direction::Release) {
                warn!(error = %e, ?modifier, "Failed to release modifier");
            }
        }
        result.map_err(injection_error)
    }
}

/// Map a ratio onto `[0, dimension - 1]`; a zero dimension maps to 0.
pub fn ratio_to_pixel(ratio: f64, dimension: u32) -> i32 {
    let span = f64::from(dimension.max(1) - 1);
    (clamp_ratio(ratio) * span).round() as i32
}

pub struct InputSynthesizer {
    capture_size: Arc<CaptureSizeTracker>,
    injector: Arc<dyn InputInjector>,
}

impl InputSynthesizer {
    pub fn new(capture_size: Arc<CaptureSizeTracker>, injector: Arc<dyn InputInjector>) -> Self {
        Self {
            capture_size,
            injector,
        }
    }

    /// Pixel position for a pair of ratios against the current capture size.
    pub fn map_position(&self, x_ratio: f64, y_ratio: f64) -> (i32, i32) {
        let (width, height) = self.capture_size.get();
        (ratio_to_pixel(x_ratio, width), ratio_to_pixel(y_ratio, height))
    }

    /// Issue exactly one injection call. Failures are logged and swallowed.
    pub fn apply(&self, event: &InputEvent) {
        let result = match event {
            InputEvent::MouseMove { x_ratio, y_ratio } => {
                let (x, y) = self.map_position(*x_ratio, *y_ratio);
                self.injector.move_pointer(x, y)
            }
            InputEvent::MouseClick { button } => self
                .injector
                .click(MouseButton::from_label(button.as_deref())),
            InputEvent::Key {
                action,
                key,
                code,
                mods,
            } => self.injector.key(*action, key, code, *mods),
        };
        if let Err(e) = result {
            warn!(error = %e, ?event, "input injection failed");
        }
    }
}
