//! Command and state payload encodings
//!
//! Inbound command payloads are plain strings; the helpers here turn them into
//! typed requests. Outbound state payloads are either the `ON`/`OFF` and
//! `pressed` literals or JSON documents built from control-API results.

use crate::control::{CurrentWallpaper, WallpaperEntry};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const PAYLOAD_ON: &str = "ON";
pub const PAYLOAD_OFF: &str = "OFF";
pub const PAYLOAD_PRESSED: &str = "pressed";
pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Separates the wallpaper reference from the monitor selector
pub const MONITOR_SEPARATOR: char = '|';
pub const ALL_MONITORS: &str = "all";

static LABEL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(?s)(?P<title>.*) \((?P<id>[^()]+)\)$").ok());

/// Malformed command payloads
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("Payload is empty")]
    Empty,
    #[error("Payload is not valid UTF-8")]
    NotUtf8,
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Decode a raw broker payload as text
pub fn payload_text(payload: &[u8]) -> Result<&str, PayloadError> {
    std::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)
}

/// Toggle payloads: `true` in any case, `ON` or `1` mean on; anything else is off.
pub fn parse_toggle(payload: &str) -> bool {
    payload.eq_ignore_ascii_case("true") || payload == PAYLOAD_ON || payload == "1"
}

pub fn on_off(value: bool) -> &'static str {
    if value {
        PAYLOAD_ON
    } else {
        PAYLOAD_OFF
    }
}

/// Render a catalog entry the way it appears in the select options: `title (id)`
pub fn option_label(entry: &WallpaperEntry) -> String {
    format!("{} ({})", entry.title, entry.id)
}

/// Options for the wallpaper select
///
/// One `title (id)` option per entry; with `expand_monitors`, also one option
/// per monitor selector (`|all` and `|N` for each configured monitor).
pub fn wallpaper_options(
    catalog: &[WallpaperEntry],
    monitors: &[u32],
    expand_monitors: bool,
) -> Vec<String> {
    let mut options = Vec::new();
    for entry in catalog {
        let label = option_label(entry);
        if expand_monitors {
            options.push(format!("{label}{MONITOR_SEPARATOR}{ALL_MONITORS}"));
            for monitor in monitors {
                options.push(format!("{label}{MONITOR_SEPARATOR}{monitor}"));
            }
        }
        options.push(label);
    }
    options
}

/// Which monitors a wallpaper load addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTarget {
    /// No selector given, the engine decides
    Default,
    /// Every configured monitor
    All,
    Single(u32),
}

impl MonitorTarget {
    /// `all` or a monitor index; anything else is not a selector
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.eq_ignore_ascii_case(ALL_MONITORS) {
            return Some(MonitorTarget::All);
        }
        selector.parse::<u32>().ok().map(MonitorTarget::Single)
    }

    /// Expand into the monitor argument of each load call
    pub fn monitors(&self, configured: &[u32]) -> Vec<Option<u32>> {
        match self {
            MonitorTarget::Default => vec![None],
            MonitorTarget::All => configured.iter().copied().map(Some).collect(),
            MonitorTarget::Single(index) => vec![Some(*index)],
        }
    }
}

/// A wallpaper select command, covering both the bare identifier/path form
/// and the `title (id)|monitor` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallpaperRequest {
    /// Reference text with any monitor selector removed
    pub reference: String,
    /// Identifier extracted from a `title (id)` reference
    pub id_hint: Option<String>,
    pub target: MonitorTarget,
}

impl WallpaperRequest {
    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(PayloadError::Empty);
        }

        // titles may contain the separator themselves
        let (reference, target) = payload
            .rsplit_once(MONITOR_SEPARATOR)
            .and_then(|(reference, selector)| {
                MonitorTarget::parse(selector).map(|target| (reference.trim(), target))
            })
            .unwrap_or((payload, MonitorTarget::Default));
        if reference.is_empty() {
            return Err(PayloadError::Empty);
        }

        let id_hint = LABEL_PATTERN
            .as_ref()
            .and_then(|pattern| pattern.captures(reference))
            .and_then(|caps| caps.name("id"))
            .map(|id| id.as_str().to_string());

        Ok(Self {
            reference: reference.to_string(),
            id_hint,
            target,
        })
    }

    /// Find the catalog entry this request names
    ///
    /// Exact `title (id)` match first, then the embedded id, then the raw
    /// reference as an identifier or project path.
    pub fn resolve<'a>(&self, catalog: &'a [WallpaperEntry]) -> Option<&'a WallpaperEntry> {
        catalog
            .iter()
            .find(|entry| option_label(entry) == self.reference)
            .or_else(|| {
                self.id_hint
                    .as_deref()
                    .and_then(|id| catalog.iter().find(|entry| entry.id == id))
            })
            .or_else(|| {
                catalog
                    .iter()
                    .find(|entry| entry.id == self.reference || entry.path == self.reference)
            })
    }
}

/// Parse a properties command; only JSON objects are accepted
pub fn parse_properties(payload: &str) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PayloadError::NotAnObject(json_kind(&other))),
        Err(e) => Err(PayloadError::InvalidJson(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Compact current-wallpaper state consumed by the informational sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWallpaperState<'a> {
    pub id: &'a str,
    pub title: &'a str,
}

impl<'a> From<&'a CurrentWallpaper> for CurrentWallpaperState<'a> {
    fn from(current: &'a CurrentWallpaper) -> Self {
        Self {
            id: &current.id,
            title: &current.title,
        }
    }
}
