//! Flattening of a [`NestSnapshot`] into the status records a widget displays.

use crate::config::{DisplayMode, Units};
use crate::models::nest::{
    AlarmState, AwayState, BatteryHealth, HvacMode, HvacState, NestSnapshot, SmokeCoAlarm, Thermostat, UiColor,
};
use crate::utils::strip_parenthesized;

/// Target set on a thermostat: one value, or a band while in heat-cool mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetTemperature {
    Single(Option<f64>),
    Range { low: Option<f64>, high: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatStatus {
    pub name: String,
    pub humidity: Option<f64>,
    pub fan_on: bool,
    pub leaf_on: bool,
    pub hvac_mode: HvacMode,
    pub hvac_state: HvacState,
    pub ambient_temp: Option<f64>,
    pub target: TargetTemperature,
    pub eco_temp_low: Option<f64>,
    pub eco_temp_high: Option<f64>,
}

impl ThermostatStatus {
    pub fn is_heating(&self) -> bool {
        self.hvac_state == HvacState::Heating
    }

    pub fn is_cooling(&self) -> bool {
        self.hvac_state == HvacState::Cooling
    }

    pub fn is_eco_mode(&self) -> bool {
        self.hvac_mode == HvacMode::Eco
    }

    pub fn is_off_mode(&self) -> bool {
        self.hvac_mode == HvacMode::Off
    }

    pub fn is_heat_cool_mode(&self) -> bool {
        self.hvac_mode == HvacMode::HeatCool
    }

    pub fn target_temp(&self) -> Option<f64> {
        match self.target {
            TargetTemperature::Single(t) => t,
            TargetTemperature::Range { .. } => None,
        }
    }

    pub fn target_temp_low(&self) -> Option<f64> {
        match self.target {
            TargetTemperature::Range { low, .. } => low,
            TargetTemperature::Single(_) => None,
        }
    }

    pub fn target_temp_high(&self) -> Option<f64> {
        match self.target {
            TargetTemperature::Range { high, .. } => high,
            TargetTemperature::Single(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmStatus {
    pub name: String,
    pub battery_health: BatteryHealth,
    pub co_state: AlarmState,
    pub smoke_state: AlarmState,
    pub ui_color: UiColor,
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub thermostats: Vec<ThermostatStatus>,
    pub alarms: Vec<AlarmStatus>,
    pub away: AwayState,
    /// Devices in the account, including categories the display mode filtered out.
    pub device_count: usize,
}

pub fn normalize(snapshot: &NestSnapshot, mode: DisplayMode, units: Units) -> Normalized {
    let mut out = Normalized {
        device_count: snapshot.device_count(),
        ..Normalized::default()
    };

    // away state comes from the first structure, and only when devices were sent too
    if let (Some(_), Some(structures)) = (&snapshot.devices, &snapshot.structures) {
        out.away = structures
            .values()
            .next()
            .and_then(|s| s.away)
            .unwrap_or_default();
    }

    let Some(devices) = &snapshot.devices else {
        return out;
    };

    if mode.shows_thermostats() {
        out.thermostats = devices
            .thermostats
            .values()
            .map(|t| thermostat_status(t, units))
            .collect();
    }

    if mode.shows_alarms() {
        out.alarms = devices.smoke_co_alarms.values().map(alarm_status).collect();
    }

    out
}

fn thermostat_status(raw: &Thermostat, units: Units) -> ThermostatStatus {
    let pick = |c: Option<f64>, f: Option<f64>| match units {
        Units::Imperial => f,
        Units::Metric => c,
    };

    let hvac_mode = raw.hvac_mode.unwrap_or(HvacMode::Unknown);
    let target = if hvac_mode == HvacMode::HeatCool {
        TargetTemperature::Range {
            low: pick(raw.target_temperature_low_c, raw.target_temperature_low_f),
            high: pick(raw.target_temperature_high_c, raw.target_temperature_high_f),
        }
    } else {
        TargetTemperature::Single(pick(raw.target_temperature_c, raw.target_temperature_f))
    };

    ThermostatStatus {
        name: display_name(raw.name.as_deref()),
        humidity: raw.humidity,
        fan_on: raw.fan_timer_active.unwrap_or(false),
        leaf_on: raw.has_leaf.unwrap_or(false),
        hvac_mode,
        hvac_state: raw.hvac_state.unwrap_or(HvacState::Unknown),
        ambient_temp: pick(raw.ambient_temperature_c, raw.ambient_temperature_f),
        target,
        eco_temp_low: pick(raw.eco_temperature_low_c, raw.eco_temperature_low_f),
        eco_temp_high: pick(raw.eco_temperature_high_c, raw.eco_temperature_high_f),
    }
}

fn alarm_status(raw: &SmokeCoAlarm) -> AlarmStatus {
    AlarmStatus {
        name: display_name(raw.name.as_deref()),
        battery_health: raw.battery_health.unwrap_or(BatteryHealth::Unknown),
        co_state: raw.co_alarm_state.unwrap_or(AlarmState::Unknown),
        smoke_state: raw.smoke_alarm_state.unwrap_or(AlarmState::Unknown),
        ui_color: raw.ui_color_state.unwrap_or(UiColor::Unknown),
        online: raw.is_online.unwrap_or(false),
    }
}

fn display_name(name: Option<&str>) -> String {
    name.map(strip_parenthesized).unwrap_or_default()
}
