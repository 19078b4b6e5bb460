//! Producer side of the store.
//!
//! A producer writes without a lock token, exactly like a client Set with no
//! token: it succeeds on unlocked paths and reports a lock conflict on paths
//! a client currently holds.

use std::sync::Arc;

use shadow_core::{
    SetResult, SetStatus, ShadowError, ShadowResult, SignalPath, SignalStore, SignalValue, Value,
};
use tracing::debug;

/// Paths of the simulator signals.
pub mod vehicle {
    pub const SPEED: &str = "Vehicle.Speed";
    pub const ENGINE_RPM: &str = "Vehicle.Engine.RPM";
    pub const BATTERY_VOLTAGE: &str = "Vehicle.Battery.Voltage";
    pub const DOOR_FRONT_LEFT: &str = "Vehicle.Doors.FrontLeft";
    pub const HEADLIGHTS: &str = "Vehicle.Lights.Headlights";
    pub const ENGINE_TEMPERATURE: &str = "Vehicle.Temperature.Engine";
    pub const POSITION_X: &str = "Vehicle.Position.X";
    pub const POSITION_Y: &str = "Vehicle.Position.Y";
    pub const POSITION_Z: &str = "Vehicle.Position.Z";
    pub const ORIENTATION_YAW: &str = "Vehicle.Orientation.Yaw";
}

/// Writes vehicle telemetry into a shared store.
#[derive(Debug, Clone)]
pub struct Producer {
    store: Arc<SignalStore>,
}

impl Producer {
    pub fn new(store: Arc<SignalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SignalStore> {
        &self.store
    }

    /// Write one value without a token. Returns the new version.
    pub fn push_value(&self, path: &SignalPath, value: SignalValue) -> ShadowResult<u64> {
        let results = self.store.set(vec![(path.clone(), value)], None);
        match results.first() {
            Some(SetResult {
                status: SetStatus::Committed { version },
                ..
            }) => Ok(*version),
            Some(result) => Err(result.error().unwrap_or(ShadowError::Internal {
                reason: format!("unexpected set status for {}", path),
            })),
            None => Err(ShadowError::Internal {
                reason: "set returned no result".to_string(),
            }),
        }
    }

    /// Write several values as one all-or-nothing batch.
    ///
    /// On failure the error of the first entry that caused the rejection is
    /// returned.
    pub fn push_values(&self, values: Vec<(SignalPath, SignalValue)>) -> ShadowResult<()> {
        let results = self.store.set(values, None);
        match results
            .iter()
            .filter(|r| r.status != SetStatus::Aborted)
            .find_map(SetResult::error)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn update_vehicle_speed(&self, kmh: f32) -> ShadowResult<u64> {
        self.push(vehicle::SPEED, Value::Float(kmh))
    }

    pub fn update_engine_rpm(&self, rpm: u32) -> ShadowResult<u64> {
        self.push(vehicle::ENGINE_RPM, Value::Uint32(rpm))
    }

    /// Write X, Y and Z together so readers never see a mixed position.
    pub fn update_vehicle_position(&self, x: f32, y: f32, z: f32) -> ShadowResult<()> {
        self.push_values(vec![
            (path(vehicle::POSITION_X)?, SignalValue::new(x)),
            (path(vehicle::POSITION_Y)?, SignalValue::new(y)),
            (path(vehicle::POSITION_Z)?, SignalValue::new(z)),
        ])
    }

    pub fn update_vehicle_orientation(&self, yaw_degrees: f32) -> ShadowResult<u64> {
        self.push(vehicle::ORIENTATION_YAW, Value::Float(yaw_degrees))
    }

    /// Switch the headlights on or off. Returns the new version.
    pub fn toggle_headlights(&self, on: bool) -> ShadowResult<u64> {
        debug!("Headlights {}", if on { "on" } else { "off" });
        self.push(vehicle::HEADLIGHTS, Value::Bool(on))
    }

    /// Open or close the door at `door`, e.g. [`vehicle::DOOR_FRONT_LEFT`].
    /// Returns the new version.
    pub fn toggle_door(&self, door: &str, open: bool) -> ShadowResult<u64> {
        debug!("Door {} {}", door, if open { "open" } else { "closed" });
        self.push(door, Value::Bool(open))
    }

    /// Current value of a signal, if it has one.
    pub fn signal_value(&self, raw: &str) -> Option<SignalValue> {
        let path = SignalPath::parse(raw).ok()?;
        self.store.get_one(&path).map(|record| record.value)
    }

    fn push(&self, raw: &str, value: Value) -> ShadowResult<u64> {
        self.push_value(&path(raw)?, SignalValue::new(value))
    }
}

fn path(raw: &str) -> ShadowResult<SignalPath> {
    SignalPath::parse(raw).map_err(|e| ShadowError::InvalidRequest {
        reason: e.to_string(),
    })
}
