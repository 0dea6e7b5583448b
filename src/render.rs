//! HTML rendering of a widget's state.
//!
//! Markup lives in `templates/` and is filled by `minijinja`; this module only
//! decides which view to show and computes the flat records the templates consume.

use minijinja::Environment;
use serde::Serialize;

use crate::config::{DisplayType, Size, WidgetConfig};
use crate::models::nest::{AlarmState, AwayState, BatteryHealth, HvacMode, UiColor};
use crate::normalize::{AlarmStatus, TargetTemperature, ThermostatStatus};
use crate::utils::{format_reading, serde_enum_name};
use crate::widget::ModuleState;

const GRID_THERMOSTAT: &str = "grid_thermostat.html";
const GRID_PROTECT: &str = "grid_protect.html";
const LIST_TABLE: &str = "list_table.html";
const STATUS: &str = "status.html";

pub const LOADING_MESSAGE: &str = "... loading ...";

#[derive(Debug)]
pub struct RenderError(minijinja::Error);

impl core::fmt::Display for RenderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "template error: {}", self.0)
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(value: minijinja::Error) -> Self {
        RenderError(value)
    }
}

// =====================
// Template records
// =====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridThermostat {
    pub classes: String,
    pub name: String,
    pub show_names: bool,
    pub ambient_temp: String,
    pub target_temp: String,
    pub target_temp_low: String,
    pub target_temp_high: String,
    pub is_heat_cool: bool,
    pub status_classes: String,
    pub humidity: String,
    pub fan_on: bool,
    pub leaf_on: bool,
    pub is_classic: bool,
    pub is_away: bool,
    pub show_temp_status: bool,
    pub temp_status_text: &'static str,
}

/// Alarm status line: optional icon, plain text, a bold part, then trailing text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusText {
    pub icon: Option<&'static str>,
    pub before: &'static str,
    pub strong: &'static str,
    pub after: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProtect {
    pub classes: String,
    pub name: String,
    pub show_names: bool,
    pub move_title: bool,
    pub status: StatusText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub id: usize,
    pub name: String,
    pub c2_text: String,
    pub c2_class: Option<String>,
    pub c3_text: String,
    pub c3_class: Option<String>,
    pub c4_text: String,
    pub c4_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTable {
    pub r#type: &'static str,
    pub show_id: bool,
    pub c2_title: &'static str,
    pub c3_title: &'static str,
    pub c4_title: &'static str,
    pub table_class: &'static str,
    pub rows: Vec<ListRow>,
}

#[derive(Serialize)]
struct StatusView<'a> {
    classes: &'static str,
    message: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Thermostat,
    Protect,
}

pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.add_template(GRID_THERMOSTAT, include_str!("../templates/grid_thermostat.html"))?;
        env.add_template(GRID_PROTECT, include_str!("../templates/grid_protect.html"))?;
        env.add_template(LIST_TABLE, include_str!("../templates/list_table.html"))?;
        env.add_template(STATUS, include_str!("../templates/status.html"))?;
        Ok(Renderer { env })
    }

    /// Render the whole widget: error view, loading view, or the configured layout.
    pub fn render(&self, state: &ModuleState, config: &WidgetConfig) -> Result<String, RenderError> {
        if !state.error.is_empty() {
            return self.status_view("normal regular small", &state.error);
        }
        if !state.loaded {
            return self.status_view("bright light small", LOADING_MESSAGE);
        }
        match config.display_type {
            DisplayType::Grid => self.grid_view(state, config),
            DisplayType::List | DisplayType::ListWithIds => self.list_view(state, config),
        }
    }

    fn status_view(&self, classes: &'static str, message: &str) -> Result<String, RenderError> {
        let tmpl = self.env.get_template(STATUS)?;
        Ok(tmpl.render(StatusView { classes, message })?)
    }

    fn grid_view(&self, state: &ModuleState, config: &WidgetConfig) -> Result<String, RenderError> {
        let wrapper_class = format!("nest-wrapper {}", config.alignment.as_class());

        let mut thermostat_cells = None;
        if config.display_mode.shows_thermostats() && !state.thermostats.is_empty() {
            let tmpl = self.env.get_template(GRID_THERMOSTAT)?;
            let mut cells = Vec::new();
            for i in config.thermostats_to_show.indices(state.thermostats.len()) {
                if let Some(t) = state.thermostats.get(i) {
                    cells.push(tmpl.render(grid_thermostat(t, state.away, config))?);
                }
            }
            thermostat_cells = Some(cells);
        }

        let mut protect_cells = None;
        if config.display_mode.shows_alarms() && !state.alarms.is_empty() {
            let tmpl = self.env.get_template(GRID_PROTECT)?;
            let mut cells = Vec::new();
            for i in config.protects_to_show.indices(state.alarms.len()) {
                if let Some(p) = state.alarms.get(i) {
                    cells.push(tmpl.render(grid_protect(p, config))?);
                }
            }
            protect_cells = Some(cells);
        }

        if config.splits_containers() {
            let mut html = String::from("<div>\n");
            for cells in [thermostat_cells, protect_cells].into_iter().flatten() {
                html.push_str(&container(&wrapper_class, &cells));
            }
            html.push_str("</div>\n");
            Ok(html)
        } else {
            let cells = thermostat_cells
                .into_iter()
                .chain(protect_cells)
                .flatten()
                .collect::<Vec<_>>();
            Ok(container(&wrapper_class, &cells))
        }
    }

    fn list_view(&self, state: &ModuleState, config: &WidgetConfig) -> Result<String, RenderError> {
        let tmpl = self.env.get_template(LIST_TABLE)?;
        let mut tables = Vec::new();
        if config.display_mode.shows_thermostats() && !state.thermostats.is_empty() {
            tables.push(tmpl.render(list_table(Category::Thermostat, state, config))?);
        }
        if config.display_mode.shows_alarms() && !state.alarms.is_empty() {
            tables.push(tmpl.render(list_table(Category::Protect, state, config))?);
        }
        Ok(container("nest-wrapper list", &tables))
    }
}

fn container(class: &str, children: &[String]) -> String {
    let mut html = format!("<div class=\"{}\">\n", class);
    for child in children {
        html.push_str(child);
        html.push('\n');
    }
    html.push_str("</div>\n");
    html
}

fn class_names(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Arrow next to the ambient temperature: left when warming up to the target,
/// right when cooling down to it, hidden when there.
fn ambient_status_class(t: &ThermostatStatus) -> Option<&'static str> {
    if t.is_eco_mode() || t.is_off_mode() {
        return None;
    }
    let ambient = t.ambient_temp?.trunc();
    let (low, high) = match t.target {
        TargetTemperature::Single(target) => {
            let target = target?.trunc();
            (target, target)
        }
        TargetTemperature::Range { low, high } => (low?.trunc(), high?.trunc()),
    };
    if ambient < low {
        Some("status-left")
    } else if ambient > high {
        Some("status-right")
    } else {
        Some("hidden")
    }
}

pub fn grid_thermostat(t: &ThermostatStatus, away: AwayState, config: &WidgetConfig) -> GridThermostat {
    let is_classic = config.thermostat_classic;

    let target_temp = if t.is_eco_mode() {
        "ECO".to_string()
    } else if t.is_off_mode() {
        "OFF".to_string()
    } else {
        format_reading(t.target_temp())
    };

    let mut temp_status_text = "";
    if config.thermostat_size != Size::Small && is_classic && !t.is_eco_mode() {
        if t.is_heating() {
            temp_status_text = "HEATING";
        } else if t.is_cooling() {
            temp_status_text = "COOLING";
        } else if t.hvac_mode == HvacMode::Heat {
            temp_status_text = "HEAT SET TO";
        } else if t.hvac_mode == HvacMode::Cool {
            temp_status_text = "COOL SET TO";
        }
    }

    let state_class = (t.is_heating() || t.is_cooling())
        .then(|| serde_enum_name(&t.hvac_state))
        .flatten();
    let mode_class = serde_enum_name(&t.hvac_mode);
    let classes = class_names(&[
        Some("thermostat"),
        state_class.as_deref(),
        Some(config.thermostat_size.as_class()),
        mode_class.as_deref(),
        is_classic.then_some("classic"),
    ]);

    GridThermostat {
        classes,
        name: t.name.clone(),
        show_names: config.show_names,
        ambient_temp: format_reading(t.ambient_temp),
        target_temp,
        target_temp_low: format_reading(t.target_temp_low()),
        target_temp_high: format_reading(t.target_temp_high()),
        is_heat_cool: t.is_heat_cool_mode(),
        status_classes: class_names(&[Some("status"), ambient_status_class(t)]),
        humidity: format!("{}%", format_reading(t.humidity)),
        fan_on: t.fan_on,
        // the classic dial draws its own leaf
        leaf_on: !is_classic && t.leaf_on,
        is_classic,
        is_away: away == AwayState::Away,
        show_temp_status: !temp_status_text.is_empty(),
        temp_status_text,
    }
}

/// Most severe condition wins: emergencies, then warnings, then battery, then connectivity.
pub fn protect_status(p: &AlarmStatus, config: &WidgetConfig) -> StatusText {
    let small = config.protect_size == Size::Small;
    let ok = StatusText {
        before: if config.protect_show_ok && p.ui_color != UiColor::Gray {
            "OK"
        } else {
            ""
        },
        ..StatusText::default()
    };
    if p.ui_color == UiColor::Green {
        return ok;
    }

    let alert = |strong: &'static str, level: &'static str| StatusText {
        strong,
        after: if small { "" } else { level },
        ..StatusText::default()
    };

    use AlarmState::{Emergency, Warning};
    match (p.co_state, p.smoke_state) {
        (Emergency, Emergency) => alert("Smoke & CO2", "Emergency"),
        (Emergency, _) => alert("CO2", "Emergency"),
        (_, Emergency) => alert("Smoke", "Emergency"),
        (Warning, Warning) => alert("Smoke & CO2", "Warning"),
        (Warning, _) => alert("CO2", "Warning"),
        (_, Warning) => alert("Smoke", "Warning"),
        _ if p.battery_health == BatteryHealth::Replace => StatusText {
            icon: Some("battery"),
            before: if small { "" } else { "Replace " },
            strong: if small { "" } else { "Battery" },
            after: "",
        },
        _ if !p.online => StatusText {
            before: if small { "" } else { "Protect " },
            strong: "Offline",
            ..StatusText::default()
        },
        _ => ok,
    }
}

pub fn grid_protect(p: &AlarmStatus, config: &WidgetConfig) -> GridProtect {
    // with separate containers the alarm title moves below the ring
    let move_title = config.splits_containers();
    let color_class = serde_enum_name(&p.ui_color);

    GridProtect {
        classes: class_names(&[
            Some("protect"),
            color_class.as_deref(),
            move_title.then_some("title-bot"),
            Some(config.protect_size.as_class()),
            config.protect_dark.then_some("dark"),
        ]),
        name: p.name.clone(),
        show_names: config.show_names,
        move_title,
        status: protect_status(p, config),
    }
}

fn degrees(value: Option<f64>) -> String {
    format!("{}°", format_reading(value))
}

fn band(low: Option<f64>, high: Option<f64>) -> String {
    format!("{} • {}", degrees(low), degrees(high))
}

fn upper_name<T: Serialize>(value: &T) -> String {
    serde_enum_name(value).unwrap_or_default().to_uppercase()
}

fn thermostat_row(id: usize, t: &ThermostatStatus) -> ListRow {
    let c3_text = if t.is_heat_cool_mode() {
        band(t.target_temp_low(), t.target_temp_high())
    } else if t.is_eco_mode() {
        band(t.eco_temp_low, t.eco_temp_high)
    } else {
        degrees(t.target_temp())
    };
    let c3_class = if t.is_heating() {
        Some("heating".to_string())
    } else if t.is_cooling() {
        Some("cooling".to_string())
    } else {
        None
    };

    ListRow {
        id,
        name: t.name.clone(),
        c2_text: if t.is_eco_mode() {
            "ECO".to_string()
        } else {
            degrees(t.ambient_temp)
        },
        c2_class: None,
        c3_text,
        c3_class,
        c4_text: format!("{}%", format_reading(t.humidity)),
        c4_class: None,
    }
}

fn protect_row(id: usize, p: &AlarmStatus) -> ListRow {
    let needs_attention = p.battery_health == BatteryHealth::Replace || !p.online;
    ListRow {
        id,
        name: p.name.clone(),
        c2_text: if p.online {
            upper_name(&p.battery_health)
        } else {
            "OFFLINE".to_string()
        },
        c2_class: needs_attention.then(|| "warning".to_string()),
        c3_text: upper_name(&p.co_state),
        c3_class: serde_enum_name(&p.co_state),
        c4_text: upper_name(&p.smoke_state),
        c4_class: serde_enum_name(&p.smoke_state),
    }
}

fn list_table(category: Category, state: &ModuleState, config: &WidgetConfig) -> ListTable {
    let is_thermostat = category == Category::Thermostat;
    let rows = if is_thermostat {
        config
            .thermostats_to_show
            .indices(state.thermostats.len())
            .into_iter()
            .filter_map(|i| state.thermostats.get(i).map(|t| thermostat_row(i, t)))
            .collect()
    } else {
        config
            .protects_to_show
            .indices(state.alarms.len())
            .into_iter()
            .filter_map(|i| state.alarms.get(i).map(|p| protect_row(i, p)))
            .collect()
    };

    let with_protects = is_thermostat && config.display_mode.shows_alarms() && !state.alarms.is_empty();
    ListTable {
        r#type: if is_thermostat { "thermostat" } else { "protect" },
        show_id: config.display_type == DisplayType::ListWithIds,
        c2_title: if is_thermostat { "Current" } else { "Battery" },
        c3_title: if is_thermostat { "Target" } else { "CO2" },
        c4_title: if is_thermostat { "Humidity" } else { "Smoke" },
        table_class: if with_protects { "with-protects" } else { "" },
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisplayMode, Selection, Units};
    use crate::models::nest::{HvacState, NestSnapshot};
    use crate::normalize::normalize;
    use serde_json::json;

    fn loaded_state(mode: DisplayMode) -> ModuleState {
        let json = std::fs::read_to_string("tests/data/snapshot.json").expect("fixture present");
        let snapshot: NestSnapshot = serde_json::from_str(&json).expect("parse snapshot");
        let n = normalize(&snapshot, mode, Units::Metric);
        ModuleState {
            loaded: true,
            thermostats: n.thermostats,
            alarms: n.alarms,
            away: n.away,
            ..ModuleState::default()
        }
    }

    fn alarm(ui_color: UiColor, co: AlarmState, smoke: AlarmState) -> AlarmStatus {
        AlarmStatus {
            name: "Hall".to_string(),
            battery_health: BatteryHealth::Ok,
            co_state: co,
            smoke_state: smoke,
            ui_color,
            online: true,
        }
    }

    #[test]
    fn error_beats_loading_and_data() {
        let renderer = Renderer::new().expect("templates compile");
        let mut state = loaded_state(DisplayMode::All);
        state.error = "Nest API Error: http 401".to_string();
        let html = renderer.render(&state, &WidgetConfig::default()).expect("render");
        assert!(html.contains("Nest API Error: http 401"));
        assert!(html.contains("normal regular small"));
        assert!(!html.contains("thermostat"));

        let html = renderer
            .render(&ModuleState::default(), &WidgetConfig::default())
            .expect("render");
        assert!(html.contains(LOADING_MESSAGE));
    }

    #[test]
    fn error_messages_are_escaped() {
        let renderer = Renderer::new().expect("templates compile");
        let state = ModuleState {
            error: "<script>".to_string(),
            ..ModuleState::default()
        };
        let html = renderer.render(&state, &WidgetConfig::default()).expect("render");
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn split_grid_uses_two_containers() {
        let renderer = Renderer::new().expect("templates compile");
        let config = WidgetConfig::default().adjusted();
        let html = renderer.render(&loaded_state(DisplayMode::All), &config).expect("render");
        assert_eq!(html.matches("class=\"nest-wrapper center\"").count(), 2);
        assert_eq!(html.matches("class=\"thermostat").count(), 2);
        assert_eq!(html.matches("class=\"protect").count(), 2);
        assert!(html.contains("title-bot"));
    }

    #[test]
    fn grouped_grid_shares_one_container() {
        let renderer = Renderer::new().expect("templates compile");
        let config = WidgetConfig {
            group_together: true,
            thermostat_size: Size::Small,
            protect_size: Size::Small,
            alignment: crate::config::Alignment::Left,
            ..WidgetConfig::default()
        }
        .adjusted();
        let html = renderer.render(&loaded_state(DisplayMode::All), &config).expect("render");
        assert_eq!(html.matches("class=\"nest-wrapper left\"").count(), 1);
        assert_eq!(html.matches("class=\"thermostat").count(), 2);
        assert!(!html.contains("title-bot"));
    }

    #[test]
    fn selection_limits_rendered_cells() {
        let renderer = Renderer::new().expect("templates compile");
        let config = WidgetConfig {
            thermostats_to_show: Selection::First,
            protects_to_show: Selection::Indices(vec![json!(1), json!(5)]),
            ..WidgetConfig::default()
        };
        let html = renderer.render(&loaded_state(DisplayMode::All), &config).expect("render");
        assert_eq!(html.matches("class=\"thermostat").count(), 1);
        assert_eq!(html.matches("class=\"protect").count(), 1);
        assert!(html.contains("Kitchen"));
        assert!(!html.contains("Hallway"));
    }

    #[test]
    fn thermostat_cell_records() {
        let state = loaded_state(DisplayMode::All);
        let config = WidgetConfig::default();

        let heating = grid_thermostat(&state.thermostats[0], state.away, &config);
        assert_eq!(heating.classes, "thermostat heating size-large heat classic");
        assert_eq!(heating.target_temp, "21.5");
        assert_eq!(heating.status_classes, "status status-left");
        assert_eq!(heating.temp_status_text, "HEATING");
        assert_eq!(heating.humidity, "40%");
        assert!(!heating.leaf_on);

        let heat_cool = grid_thermostat(&state.thermostats[1], AwayState::Away, &config);
        assert_eq!(heat_cool.classes, "thermostat size-large heat-cool classic");
        assert!(heat_cool.is_heat_cool);
        assert_eq!(heat_cool.target_temp_low, "18");
        assert_eq!(heat_cool.target_temp_high, "22.5");
        assert_eq!(heat_cool.status_classes, "status hidden");
        assert!(!heat_cool.show_temp_status);
        assert!(heat_cool.is_away);
    }

    #[test]
    fn eco_and_off_show_labels() {
        let mut t = loaded_state(DisplayMode::All).thermostats[0].clone();
        let modern = WidgetConfig {
            thermostat_classic: false,
            ..WidgetConfig::default()
        };
        t.hvac_mode = HvacMode::Eco;
        t.hvac_state = HvacState::Off;
        let eco = grid_thermostat(&t, AwayState::Home, &modern);
        assert_eq!(eco.target_temp, "ECO");
        assert_eq!(eco.status_classes, "status");
        assert!(eco.leaf_on);
        assert!(!eco.show_temp_status);

        t.hvac_mode = HvacMode::Off;
        assert_eq!(grid_thermostat(&t, AwayState::Home, &modern).target_temp, "OFF");

        t.hvac_mode = HvacMode::Cool;
        let cool = grid_thermostat(&t, AwayState::Home, &WidgetConfig::default());
        assert_eq!(cool.temp_status_text, "COOL SET TO");
        assert_eq!(cool.status_classes, "status status-left");
    }

    #[test]
    fn protect_status_precedence() {
        let config = WidgetConfig {
            protect_size: Size::Large,
            ..WidgetConfig::default()
        };
        let ok = protect_status(&alarm(UiColor::Green, AlarmState::Ok, AlarmState::Ok), &config);
        assert_eq!(ok.before, "OK");

        let both = protect_status(
            &alarm(UiColor::Red, AlarmState::Emergency, AlarmState::Emergency),
            &config,
        );
        assert_eq!((both.strong, both.after), ("Smoke & CO2", "Emergency"));

        let mixed = protect_status(
            &alarm(UiColor::Red, AlarmState::Warning, AlarmState::Emergency),
            &config,
        );
        assert_eq!((mixed.strong, mixed.after), ("Smoke", "Emergency"));

        let mut battery = alarm(UiColor::Yellow, AlarmState::Ok, AlarmState::Ok);
        battery.battery_health = BatteryHealth::Replace;
        battery.online = false;
        let s = protect_status(&battery, &config);
        assert_eq!((s.icon, s.before, s.strong), (Some("battery"), "Replace ", "Battery"));

        let mut offline = alarm(UiColor::Gray, AlarmState::Ok, AlarmState::Ok);
        offline.online = false;
        let s = protect_status(&offline, &config);
        assert_eq!((s.before, s.strong), ("Protect ", "Offline"));

        let small = WidgetConfig::default();
        let s = protect_status(&alarm(UiColor::Yellow, AlarmState::Warning, AlarmState::Ok), &small);
        assert_eq!((s.strong, s.after), ("CO2", ""));

        let hidden_ok = WidgetConfig {
            protect_show_ok: false,
            ..WidgetConfig::default()
        };
        assert_eq!(
            protect_status(&alarm(UiColor::Green, AlarmState::Ok, AlarmState::Ok), &hidden_ok),
            StatusText::default()
        );
    }

    #[test]
    fn list_view_rows() {
        let renderer = Renderer::new().expect("templates compile");
        let config = WidgetConfig {
            display_type: DisplayType::ListWithIds,
            ..WidgetConfig::default()
        };
        let state = loaded_state(DisplayMode::All);
        let html = renderer.render(&state, &config).expect("render");
        assert!(html.contains("nest-wrapper list"));
        assert!(html.contains("with-protects"));
        assert!(html.contains("<td class=\"id\">1</td>"));

        let thermostats = list_table(Category::Thermostat, &state, &config);
        assert_eq!(thermostats.rows[0].c3_text, "21.5°");
        assert_eq!(thermostats.rows[0].c3_class.as_deref(), Some("heating"));
        assert_eq!(thermostats.rows[1].c3_text, "18° • 22.5°");

        let protects = list_table(Category::Protect, &state, &config);
        assert_eq!(protects.table_class, "");
        assert_eq!(protects.rows[1].c2_text, "REPLACE");
        assert_eq!(protects.rows[1].c2_class.as_deref(), Some("warning"));
        assert_eq!(protects.rows[1].c4_text, "WARNING");
        assert_eq!(protects.rows[1].c4_class.as_deref(), Some("warning"));
    }

    #[test]
    fn protect_only_list_has_single_table() {
        let renderer = Renderer::new().expect("templates compile");
        let config = WidgetConfig {
            display_type: DisplayType::List,
            display_mode: DisplayMode::ProtectOnly,
            ..WidgetConfig::default()
        };
        let html = renderer
            .render(&loaded_state(DisplayMode::ProtectOnly), &config)
            .expect("render");
        assert_eq!(html.matches("<table").count(), 1);
        assert!(html.contains("nest-list protect"));
    }
}
