//! Vehicle shadow data model types.
//!
//! These types describe what the store holds and what it hands out:
//! - Typed signal values with unit and timestamp metadata
//! - Per-path declarations from the signal catalog
//! - Records returned by reads
//! - Change notifications delivered to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::SignalPath;

/// The kind of value a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
    Bytes,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Uint32 => "uint32",
            ValueType::Uint64 => "uint64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A signal value, tagged with its kind.
///
/// Serialized as `{"type": "float", "value": 42.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// The kind of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Uint32(_) => ValueType::Uint32,
            Value::Uint64(_) => ValueType::Uint64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }

    /// Numeric view of any integer or floating point value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Uint32(v) => Some(f64::from(*v)),
            Value::Uint64(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A value plus its metadata. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalValue {
    value: Value,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    unit: Option<String>,

    /// ISO 8601 timestamp (UTC) of the sample
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl SignalValue {
    /// A value sampled now, without a unit.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            unit: None,
            timestamp: Utc::now(),
        }
    }

    /// A value sampled at an explicit time.
    pub fn at(value: impl Into<Value>, unit: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            unit,
            timestamp,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Copy of this value carrying `unit` when it has none of its own.
    pub(crate) fn or_unit(self, unit: Option<&str>) -> Self {
        match (&self.unit, unit) {
            (None, Some(u)) => Self {
                unit: Some(u.to_string()),
                ..self
            },
            _ => self,
        }
    }
}

/// Role of a signal in the vehicle model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafType {
    /// Measured by the vehicle (speed, temperature, ...)
    #[default]
    Sensor,
    /// Commanded by clients (doors, lights, ...)
    Actuator,
    /// Static property of the vehicle
    Attribute,
}

/// Declaration of a signal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    pub path: SignalPath,

    pub data_type: ValueType,

    #[serde(default)]
    pub leaf_type: LeafType,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// The current state of one signal, as returned by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub path: SignalPath,

    pub value: SignalValue,

    /// Starts at 1 on the first write and grows by one per committed write.
    pub version: u64,

    /// Whether a live lock token held this path at read time.
    pub locked: bool,

    /// Commit time of the latest write
    pub last_updated: DateTime<Utc>,
}

/// A change notification delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalUpdate {
    pub path: SignalPath,

    /// `None` marks a path with no record (only sent as an initial update).
    pub value: Option<SignalValue>,

    /// 0 when `value` is `None`.
    pub version: u64,

    /// True for the baseline updates queued at subscribe time.
    pub initial: bool,
}

impl SignalUpdate {
    pub(crate) fn committed(path: SignalPath, value: SignalValue, version: u64) -> Self {
        Self {
            path,
            value: Some(value),
            version,
            initial: false,
        }
    }

    pub(crate) fn baseline(path: SignalPath, record: Option<&SignalRecord>) -> Self {
        match record {
            Some(r) => Self {
                path,
                value: Some(r.value.clone()),
                version: r.version,
                initial: true,
            },
            None => Self {
                path,
                value: None,
                version: 0,
                initial: true,
            },
        }
    }

    /// True when this update reports an unknown path.
    pub fn is_not_found(&self) -> bool {
        self.value.is_none()
    }
}
