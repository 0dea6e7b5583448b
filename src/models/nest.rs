//! Models for the Nest developer API snapshot returned by `GET /?auth=<token>`.
//!
//! Notes
//! - Device and structure maps are keyed by opaque IDs. `IndexMap` keeps them in the
//!   order the server sent them, which the widget relies on for "first" selection.
//! - Every device field is optional; the API omits whatever a device does not report.
//! - Unknown enum strings map to an `Unknown` variant instead of failing the whole poll.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(pub String);

// =====================
// String enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HvacMode {
    Heat,
    Cool,
    HeatCool,
    Eco,
    Off,
    #[serde(other)]
    Unknown,
}

/// What the HVAC system is doing right now; `Off` means dormant, not switched off.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacState {
    Heating,
    Cooling,
    Off,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryHealth {
    Ok,
    Replace,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    Ok,
    Warning,
    Emergency,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiColor {
    Gray,
    Green,
    Yellow,
    Red,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwayState {
    Home,
    Away,
    #[default]
    #[serde(other)]
    Unknown,
}

// =====================
// Devices
// =====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thermostat {
    pub device_id: Option<DeviceId>,
    pub structure_id: Option<StructureId>,
    pub name: Option<String>,
    pub name_long: Option<String>,
    pub is_online: Option<bool>,
    pub humidity: Option<f64>,
    /// Set while the fan or the humidifier is running.
    pub fan_timer_active: Option<bool>,
    /// Set while the thermostat holds an energy-saving temperature.
    pub has_leaf: Option<bool>,
    pub hvac_mode: Option<HvacMode>,
    pub hvac_state: Option<HvacState>,
    pub ambient_temperature_c: Option<f64>,
    pub ambient_temperature_f: Option<f64>,
    pub target_temperature_c: Option<f64>,
    pub target_temperature_f: Option<f64>,
    pub target_temperature_low_c: Option<f64>,
    pub target_temperature_low_f: Option<f64>,
    pub target_temperature_high_c: Option<f64>,
    pub target_temperature_high_f: Option<f64>,
    pub eco_temperature_low_c: Option<f64>,
    pub eco_temperature_low_f: Option<f64>,
    pub eco_temperature_high_c: Option<f64>,
    pub eco_temperature_high_f: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmokeCoAlarm {
    pub device_id: Option<DeviceId>,
    pub structure_id: Option<StructureId>,
    pub name: Option<String>,
    pub name_long: Option<String>,
    pub is_online: Option<bool>,
    pub battery_health: Option<BatteryHealth>,
    pub co_alarm_state: Option<AlarmState>,
    pub smoke_alarm_state: Option<AlarmState>,
    pub ui_color_state: Option<UiColor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub thermostats: IndexMap<DeviceId, Thermostat>,
    #[serde(default)]
    pub smoke_co_alarms: IndexMap<DeviceId, SmokeCoAlarm>,
}

// =====================
// Structures
// =====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub structure_id: Option<StructureId>,
    pub name: Option<String>,
    pub away: Option<AwayState>,
}

/// Full account snapshot as delivered by the REST endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestSnapshot {
    pub devices: Option<Devices>,
    pub structures: Option<IndexMap<StructureId, Structure>>,
}

impl NestSnapshot {
    pub fn thermostat_count(&self) -> usize {
        self.devices.as_ref().map_or(0, |d| d.thermostats.len())
    }

    pub fn alarm_count(&self) -> usize {
        self.devices.as_ref().map_or(0, |d| d.smoke_co_alarms.len())
    }

    pub fn device_count(&self) -> usize {
        self.thermostat_count() + self.alarm_count()
    }

    /// True when the response carried neither devices nor structures.
    pub fn is_empty(&self) -> bool {
        let no_structures = self.structures.as_ref().is_none_or(|s| s.is_empty());
        self.device_count() == 0 && no_structures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_server_key_order() {
        let json = r#"{"devices":{"thermostats":{"zz":{"name":"Z"},"aa":{"name":"A"},"mm":{"name":"M"}}}}"#;
        let snapshot: NestSnapshot = serde_json::from_str(json).expect("parse");
        let names = snapshot
            .devices
            .expect("devices")
            .thermostats
            .keys()
            .map(|k| k.0.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zz", "aa", "mm"]);
    }

    #[test]
    fn unknown_enum_values_do_not_fail_parsing() {
        let json = r#"{"devices":{"thermostats":{"t":{"hvac_mode":"turbo","hvac_state":"venting"}}},
                       "structures":{"s":{"away":"auto-away"}}}"#;
        let snapshot: NestSnapshot = serde_json::from_str(json).expect("parse");
        let devices = snapshot.devices.as_ref().expect("devices");
        let t = devices.thermostats.values().next().expect("thermostat");
        assert_eq!(t.hvac_mode, Some(HvacMode::Unknown));
        assert_eq!(t.hvac_state, Some(HvacState::Unknown));
        let s = snapshot.structures.as_ref().and_then(|s| s.values().next()).expect("structure");
        assert_eq!(s.away, Some(AwayState::Unknown));
        assert_eq!(AwayState::default(), AwayState::Unknown);
    }

    #[test]
    fn emptiness_considers_devices_and_structures() {
        let empty: NestSnapshot = serde_json::from_str("{}").expect("parse");
        assert!(empty.is_empty());

        let empty_maps: NestSnapshot = serde_json::from_str(r#"{"devices":{},"structures":{}}"#).expect("parse");
        assert!(empty_maps.is_empty());

        let structure_only: NestSnapshot =
            serde_json::from_str(r#"{"structures":{"s":{"away":"home"}}}"#).expect("parse");
        assert!(!structure_only.is_empty());
        assert_eq!(structure_only.device_count(), 0);
    }
}
