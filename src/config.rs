//! Runtime configuration.
//!
//! Two layers:
//! - process settings from the environment (`Config::from_env`),
//! - the dashboard file listing widget instances and their options (`DashboardConfig`).

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_API_SERVER;

pub const DEFAULT_DASHBOARD_CONFIG: &str = "dashboard.json";
pub const DEFAULT_OUTPUT_DIR: &str = "rendered";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const MODULE_NAME: &str = "nest-status";

#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard JSON listing the widget instances.
    pub dashboard_config: PathBuf,
    /// API server the first poll goes to; redirects may move it later.
    pub api_server: String,
    /// Directory receiving one rendered HTML fragment per widget.
    pub output_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let dashboard_config = non_empty_var("NEST_DASHBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DASHBOARD_CONFIG));
        let api_server = non_empty_var("NEST_API_SERVER").unwrap_or_else(|| DEFAULT_API_SERVER.to_string());
        let output_dir = non_empty_var("NEST_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let http_timeout_secs = match non_empty_var("NEST_HTTP_TIMEOUT_SECS") {
            Some(s) => s
                .parse::<u64>()
                .map_err(|_| format!("NEST_HTTP_TIMEOUT_SECS must be a whole number of seconds, got {:?}", s))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Config {
            dashboard_config,
            api_server,
            output_dir,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

// =====================
// Option enums
// =====================
//
// The string-valued options are lenient: an unrecognised value falls back to the
// default instead of rejecting the whole dashboard.

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl From<String> for Units {
    fn from(value: String) -> Self {
        match value.as_str() {
            "imperial" => Units::Imperial,
            _ => Units::Metric,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DisplayType {
    #[default]
    Grid,
    List,
    /// List view with a leading index column.
    ListWithIds,
}

impl From<String> for DisplayType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "list" => DisplayType::List,
            "list-id" | "list-with-ids" => DisplayType::ListWithIds,
            _ => DisplayType::Grid,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DisplayMode {
    #[default]
    All,
    ThermostatOnly,
    ProtectOnly,
}

impl From<String> for DisplayMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "thermostat-only" | "thermostat" => DisplayMode::ThermostatOnly,
            "protect-only" | "protect" => DisplayMode::ProtectOnly,
            _ => DisplayMode::All,
        }
    }
}

impl DisplayMode {
    pub fn shows_thermostats(self) -> bool {
        self != DisplayMode::ProtectOnly
    }

    pub fn shows_alarms(self) -> bool {
        self != DisplayMode::ThermostatOnly
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Alignment {
    #[default]
    Center,
    Left,
    Right,
}

impl From<String> for Alignment {
    fn from(value: String) -> Self {
        match value.as_str() {
            "left" => Alignment::Left,
            "right" => Alignment::Right,
            _ => Alignment::Center,
        }
    }
}

impl Alignment {
    pub fn as_class(self) -> &'static str {
        match self {
            Alignment::Center => "center",
            Alignment::Left => "left",
            Alignment::Right => "right",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Size {
    Small,
    Medium,
    Large,
}

impl Size {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "small" => Some(Size::Small),
            "medium" => Some(Size::Medium),
            "large" => Some(Size::Large),
            _ => None,
        }
    }

    pub fn as_class(self) -> &'static str {
        match self {
            Size::Small => "size-small",
            Size::Medium => "size-medium",
            Size::Large => "size-large",
        }
    }
}

// Each size option has its own default, so an unrecognised value falls back per field.
fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D, fallback: Size) -> Result<Size, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(Size::parse(&value).unwrap_or(fallback))
}

fn thermostat_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Size, D::Error> {
    lenient_size(deserializer, Size::Large)
}

fn protect_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Size, D::Error> {
    lenient_size(deserializer, Size::Small)
}

// =====================
// Device selection
// =====================

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Name(String),
    List(Vec<serde_json::Value>),
    Other(serde_json::Value),
}

/// Which devices of one category a widget shows.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "SelectionRepr")]
pub enum Selection {
    First,
    #[default]
    All,
    /// Explicit positions; entries are kept raw and validated against the
    /// collection at render time.
    Indices(Vec<serde_json::Value>),
}

impl From<SelectionRepr> for Selection {
    fn from(value: SelectionRepr) -> Self {
        match value {
            SelectionRepr::Name(s) if s == "first" => Selection::First,
            SelectionRepr::Name(_) => Selection::All,
            SelectionRepr::List(values) => Selection::Indices(values),
            SelectionRepr::Other(_) => Selection::Indices(Vec::new()),
        }
    }
}

impl Selection {
    /// Positions to render from a collection of `len` items. Index entries that
    /// are not finite whole numbers inside `0..len` are skipped.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        match self {
            Selection::First => (0..len.min(1)).collect(),
            Selection::All => (0..len).collect(),
            Selection::Indices(values) => values
                .iter()
                .filter_map(|v| v.as_f64())
                .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n < len as f64)
                .map(|n| n as usize)
                .collect(),
        }
    }
}

// =====================
// Widget and dashboard
// =====================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WidgetConfig {
    pub token: String,
    pub display_type: DisplayType,
    pub display_mode: DisplayMode,
    pub show_names: bool,
    pub thermostats_to_show: Selection,
    pub protects_to_show: Selection,
    pub alignment: Alignment,
    pub group_together: bool,
    #[serde(deserialize_with = "thermostat_size")]
    pub thermostat_size: Size,
    pub thermostat_classic: bool,
    #[serde(deserialize_with = "protect_size")]
    pub protect_size: Size,
    pub protect_dark: bool,
    pub protect_show_ok: bool,
    pub motion_sleep: bool,
    pub motion_sleep_seconds: u64,
    /// Overrides the dashboard-wide units for this widget.
    pub units: Option<Units>,
    /// Milliseconds between polls.
    pub update_interval: u64,
    /// Milliseconds the host spends animating a redraw.
    pub animation_speed: u64,
    /// Milliseconds before the first poll.
    pub initial_load_delay: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        WidgetConfig {
            token: String::new(),
            display_type: DisplayType::Grid,
            display_mode: DisplayMode::All,
            show_names: true,
            thermostats_to_show: Selection::All,
            protects_to_show: Selection::All,
            alignment: Alignment::Center,
            group_together: false,
            thermostat_size: Size::Large,
            thermostat_classic: true,
            protect_size: Size::Small,
            protect_dark: false,
            protect_show_ok: true,
            motion_sleep: false,
            motion_sleep_seconds: 300,
            units: None,
            update_interval: 120 * 1000,
            animation_speed: 2 * 1000,
            initial_load_delay: 0,
        }
    }
}

impl WidgetConfig {
    /// Apply start-up adjustments: thermostats and alarms of different sizes
    /// never share one container.
    pub fn adjusted(mut self) -> Self {
        if self.display_mode == DisplayMode::All && self.protect_size != self.thermostat_size {
            self.group_together = false;
        }
        self
    }

    /// Thermostats and alarms go into separate containers.
    pub fn splits_containers(&self) -> bool {
        self.display_mode == DisplayMode::All && !self.group_together
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval)
    }

    pub fn animation_speed(&self) -> Duration {
        Duration::from_millis(self.animation_speed)
    }

    pub fn initial_load_delay(&self) -> Duration {
        Duration::from_millis(self.initial_load_delay)
    }

    pub fn motion_sleep_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_sleep_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModuleEntry {
    pub identifier: Option<String>,
    pub config: WidgetConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub units: Units,
    pub modules: Vec<ModuleEntry>,
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let de = &mut serde_json::Deserializer::from_str(json);
        serde_path_to_error::deserialize(de).map_err(|e| format!("invalid dashboard config at {}: {}", e.path(), e.inner()))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let json =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_json_str(&json).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Identifier of the module at `index`, generated when the file leaves it out.
    pub fn identifier(&self, index: usize) -> String {
        self.modules
            .get(index)
            .and_then(|m| m.identifier.clone())
            .unwrap_or_else(|| format!("module_{}_{}", index, MODULE_NAME))
    }
}
