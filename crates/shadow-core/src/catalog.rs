//! Initial signal catalog.
//!
//! The catalog declares each known signal (type, role, unit) and gives it
//! a starting value. The store loads it at construction time as ordinary
//! writes, so catalog signals start at version 1.

use serde::{Deserialize, Serialize};

use crate::model::{LeafType, SignalConfig, Value, ValueType};
use crate::path::SignalPath;

/// One declared signal with its starting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub path: SignalPath,

    pub data_type: ValueType,

    #[serde(default)]
    pub leaf_type: LeafType,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    pub default: Value,
}

impl CatalogEntry {
    /// The declaration part of this entry.
    pub fn config(&self) -> SignalConfig {
        SignalConfig {
            path: self.path.clone(),
            data_type: self.data_type,
            leaf_type: self.leaf_type,
            unit: self.unit.clone(),
            description: self.description.clone(),
        }
    }
}

fn entry(
    path: &str,
    leaf_type: LeafType,
    unit: Option<&str>,
    default: Value,
) -> CatalogEntry {
    CatalogEntry {
        // Built-in paths are literals known to be well formed.
        path: SignalPath::parse(path).expect("built-in catalog path is valid"),
        data_type: default.value_type(),
        leaf_type,
        unit: unit.map(String::from),
        description: Some(format!("Simulator signal for {}", path)),
        default,
    }
}

/// Signals fed by the driving simulator.
pub fn default_catalog() -> Vec<CatalogEntry> {
    use LeafType::{Actuator, Sensor};

    vec![
        entry("Vehicle.Speed", Sensor, Some("km/h"), Value::Float(0.0)),
        entry("Vehicle.Engine.RPM", Sensor, Some("RPM"), Value::Uint32(0)),
        entry("Vehicle.Battery.Voltage", Sensor, Some("V"), Value::Float(12.0)),
        entry("Vehicle.Doors.FrontLeft", Actuator, None, Value::Bool(false)),
        entry("Vehicle.Lights.Headlights", Actuator, None, Value::Bool(false)),
        entry("Vehicle.Temperature.Engine", Sensor, Some("°C"), Value::Float(85.0)),
        entry("Vehicle.Position.X", Sensor, Some("m"), Value::Float(0.0)),
        entry("Vehicle.Position.Y", Sensor, Some("m"), Value::Float(0.0)),
        entry("Vehicle.Position.Z", Sensor, Some("m"), Value::Float(0.0)),
        entry("Vehicle.Orientation.Yaw", Sensor, Some("degrees"), Value::Float(0.0)),
    ]
}
