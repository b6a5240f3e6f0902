use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Module types the bridge tracks. Everything else in a home (relays,
/// thermostats of other generations) is ignored.
pub const SUPPORTED_MODULE_TYPES: &[&str] = &["NRV"];

/// Standard response envelope wrapping every API payload.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub body: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HomesData {
    #[serde(default)]
    pub homes: Vec<Home>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HomeStatusData {
    pub home: HomeStatus,
}

/// A top-level account-owned location containing rooms and modules.
#[derive(Debug, Clone, Deserialize)]
pub struct Home {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// A heating zone within a home, mapped 1:1 to a local device.
#[derive(Debug, Clone, Deserialize)]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A physical radio module. Valves carry a `room_id` naming the room they
/// heat; gateway-type modules do not.
#[derive(Debug, Clone, Deserialize)]
pub struct Module {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Live status snapshot for one home.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeStatus {
    #[serde(default)]
    pub rooms: Vec<RoomStatus>,
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomStatus {
    pub id: String,
    pub therm_measured_temperature: Option<f64>,
    pub therm_setpoint_temperature: Option<f64>,
    pub heating_power_request: Option<f64>,
    pub therm_setpoint_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub battery_level: Option<i32>,
    pub rf_strength: Option<i32>,
}

/// How a property cell responds to writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadOnly,
    TargetTemperature,
    Mode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Last-known-value cell with change suppression.
#[derive(Debug, Clone)]
pub struct PropertyCell {
    pub name: String,
    pub capability: Capability,
    value: Option<PropertyValue>,
}

impl PropertyCell {
    pub(crate) fn new(name: &str, capability: Capability) -> Self {
        Self {
            name: name.to_string(),
            capability,
            value: None,
        }
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    /// Store `value`; true iff it differed from the cached one.
    pub(crate) fn update(&mut self, value: PropertyValue) -> bool {
        if self.value.as_ref() == Some(&value) {
            return false;
        }
        self.value = Some(value);
        true
    }
}

/// One thermostat-equipped room exposed to the device layer.
///
/// Created during discovery and kept for the process lifetime; room removal
/// on the cloud side is not tracked.
#[derive(Debug, Clone)]
pub struct ThermostatDevice {
    pub id: String,
    pub home_id: String,
    pub room_id: String,
    pub name: String,
    properties: BTreeMap<String, PropertyCell>,
}

impl ThermostatDevice {
    pub(crate) fn new(home_id: &str, room_id: &str, name: &str) -> Self {
        let mut properties = BTreeMap::new();
        for (prop, capability) in [
            ("temperature", Capability::ReadOnly),
            ("targetTemperature", Capability::TargetTemperature),
            ("heating", Capability::ReadOnly),
            ("mode", Capability::Mode),
        ] {
            properties.insert(prop.to_string(), PropertyCell::new(prop, capability));
        }
        Self {
            id: format!("netatmo-{home_id}-{room_id}"),
            home_id: home_id.to_string(),
            room_id: room_id.to_string(),
            name: name.to_string(),
            properties,
        }
    }

    /// Add the valve telemetry cells. Idempotent.
    pub(crate) fn attach_valve_telemetry(&mut self) {
        for prop in ["battery", "signal"] {
            self.properties
                .entry(prop.to_string())
                .or_insert_with(|| PropertyCell::new(prop, Capability::ReadOnly));
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyCell> {
        self.properties.get(name)
    }

    pub(crate) fn property_mut(&mut self, name: &str) -> Option<&mut PropertyCell> {
        self.properties.get_mut(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyCell> {
        self.properties.values()
    }
}
