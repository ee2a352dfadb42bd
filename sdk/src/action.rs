//! Action vocabulary and the dispatcher contract
//!
//! An [`Action`] is produced by the engine's Actor role and consumed by an
//! [`ActionDispatcher`] implementation. Actions are immutable once emitted and
//! always carry fully resolved parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Hardware / navigation keys the agent may press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Back,
    Home,
    Enter,
    AppSwitch,
}

impl KeyCode {
    /// Parse a key name as a model would spell it
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "back" => Some(Self::Back),
            "home" => Some(Self::Home),
            "enter" | "return" => Some(Self::Enter),
            "app_switch" | "recent" | "recents" => Some(Self::AppSwitch),
            _ => None,
        }
    }
}

/// A single concrete UI command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Tap {
        x: u32,
        y: u32,
    },
    LongPress {
        x: u32,
        y: u32,
    },
    Swipe {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u32,
    },
    Type {
        text: String,
    },
    PressKey {
        key: KeyCode,
    },
    OpenApp {
        package: String,
    },
    DeepLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package: Option<String>,
    },
    Wait {
        ms: u64,
    },
}

/// Longest pause a single `wait` action may request
pub const MAX_WAIT_MS: u64 = 30_000;

fn default_swipe_ms() -> u32 {
    400
}

impl Action {
    /// Short, stable name of the action kind
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Tap { .. } => "tap",
            Action::LongPress { .. } => "long_press",
            Action::Swipe { .. } => "swipe",
            Action::Type { .. } => "type",
            Action::PressKey { .. } => "press_key",
            Action::OpenApp { .. } => "open_app",
            Action::DeepLink { .. } => "deep_link",
            Action::Wait { .. } => "wait",
        }
    }

    /// Package the action is aimed at, if any
    pub fn target_app(&self) -> Option<&str> {
        match self {
            Action::OpenApp { package } => Some(package),
            Action::DeepLink { package, .. } => package.as_deref(),
            _ => None,
        }
    }

    /// Check that every parameter is usable as-is by a backend.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::Type { text } if text.is_empty() => Err("type: empty text".to_string()),
            Action::OpenApp { package } if package.trim().is_empty() => {
                Err("open_app: empty package".to_string())
            }
            Action::DeepLink { uri, .. } if !uri.contains(':') || uri.contains('{') => {
                Err(format!("deep_link: malformed uri '{}'", uri))
            }
            Action::Swipe {
                x1, y1, x2, y2, ..
            } if x1 == x2 && y1 == y2 => Err("swipe: start equals end".to_string()),
            Action::Wait { ms } if *ms > MAX_WAIT_MS => Err(format!(
                "wait: {}ms exceeds the {}ms limit",
                ms, MAX_WAIT_MS
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap { x, y } => write!(f, "tap({}, {})", x, y),
            Action::LongPress { x, y } => write!(f, "long_press({}, {})", x, y),
            Action::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => write!(f, "swipe({}, {} -> {}, {}, {}ms)", x1, y1, x2, y2, duration_ms),
            Action::Type { text } => write!(f, "type({:?})", text),
            Action::PressKey { key } => write!(f, "press_key({:?})", key),
            Action::OpenApp { package } => write!(f, "open_app({})", package),
            Action::DeepLink { uri, package } => match package {
                Some(p) => write!(f, "deep_link({} via {})", uri, p),
                None => write!(f, "deep_link({})", uri),
            },
            Action::Wait { ms } => write!(f, "wait({}ms)", ms),
        }
    }
}

/// Opaque handle to the screen state after an action
///
/// The engine never inspects pixels itself; it forwards the screenshot to the
/// model gateway and compares handles by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique id of this capture
    pub id: String,

    /// Path to a PNG screenshot, when the backend captured one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    /// Package in the foreground, when the backend can tell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_app: Option<String>,

    /// Free-text description for backends without screenshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Observation {
    /// Create an observation with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            screenshot: None,
            foreground_app: None,
            description: None,
        }
    }

    pub fn with_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot = Some(path.into());
        self
    }

    pub fn with_foreground_app(mut self, package: impl Into<String>) -> Self {
        self.foreground_app = Some(package.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Failure reported by a device backend
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ActionError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Action timed out")]
    Timeout,

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Device backend that performs actions and captures the screen
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Name of the backend (e.g., "adb", "dry-run")
    fn name(&self) -> &str;

    /// Capture the current screen without acting
    async fn observe(&self) -> Result<Observation, ActionError>;

    /// Perform an action and return the resulting observation
    async fn execute(&self, action: &Action) -> Result<Observation, ActionError>;
}
