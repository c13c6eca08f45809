//! Greenhouse state carried by protocol messages.
//!
//! These are plain values: the node registry owns the authoritative copy and
//! hands out clones, so nothing here is shared across connections.

use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a sensor/actuator node.
pub type NodeId = i32;

/// Identifier of an actuator, unique within its node.
pub type ActuatorId = i32;

/// One sensor reading (value plus what it measures and in which unit).
///
/// Equality compares `value` with [`f64::total_cmp`] and treats every `NaN`
/// as equal, so a reading holding `NaN` equals itself and survives an
/// encode/decode cycle unchanged. `0.0` and `-0.0` stay distinct.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    /// What is measured, e.g. `temperature`
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub sensor_type: String,
    /// Current value
    pub value: f64,
    /// Unit, e.g. `°C`, `%`, `lux`
    pub unit: String,
}

impl SensorReading {
    /// Create a new sensor reading.
    pub fn new(sensor_type: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            value,
            unit: unit.into(),
        }
    }

    /// Overwrite the value in place.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Human-readable value with its unit appended, e.g. `21.5°C`.
    pub fn formatted(&self) -> String {
        format!("{}{}", self.value, self.unit)
    }
}

impl PartialEq for SensorReading {
    fn eq(&self, other: &Self) -> bool {
        let same_value = (self.value.is_nan() && other.value.is_nan())
            || self.value.total_cmp(&other.value).is_eq();
        same_value && self.sensor_type == other.sensor_type
            && self.unit == other.unit
    }
}

impl Eq for SensorReading {}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.sensor_type, self.formatted())
    }
}

/// State of a single actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorState {
    /// Kind of actuator, e.g. `window`, `fan`, `heater`
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub actuator_type: String,
    /// Whether the actuator is currently on
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_on: bool,
}

impl ActuatorState {
    /// Create an actuator state.
    pub fn new(actuator_type: impl Into<String>, is_on: bool) -> Self {
        Self {
            actuator_type: actuator_type.into(),
            is_on,
        }
    }
}

/// Point-in-time copy of one node: its readings and its actuators.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSnapshot {
    /// Node identifier
    pub id: NodeId,
    /// Sensor readings in the node's own order
    #[cfg_attr(feature = "serde", serde(default))]
    pub sensors: Vec<SensorReading>,
    /// Actuators keyed by their id
    #[cfg_attr(feature = "serde", serde(default))]
    pub actuators: BTreeMap<ActuatorId, ActuatorState>,
}

impl NodeSnapshot {
    /// Create an empty node with no sensors and no actuators.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            sensors: Vec::new(),
            actuators: BTreeMap::new(),
        }
    }

    /// Builder-style: append a sensor reading.
    pub fn with_sensor(mut self, reading: SensorReading) -> Self {
        self.sensors.push(reading);
        self
    }

    /// Builder-style: add (or replace) an actuator.
    pub fn with_actuator(mut self, id: ActuatorId, state: ActuatorState) -> Self {
        self.actuators.insert(id, state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_equality_covers_all_fields() {
        let a = SensorReading::new("humidity", 25.0, "%");
        assert_eq!(a, SensorReading::new("humidity", 25.0, "%"));
        assert_ne!(a, SensorReading::new("humidity", 25.5, "%"));
        assert_ne!(a, SensorReading::new("temperature", 25.0, "%"));
        assert_ne!(a, SensorReading::new("humidity", 25.0, "g/m3"));
    }

    #[test]
    fn nan_reading_equals_itself() {
        let a = SensorReading::new("light", f64::NAN, "lux");
        assert_eq!(a, a.clone());
    }

    #[test]
    fn set_value_mutates_in_place() {
        let mut reading = SensorReading::new("temperature", 20.0, "°C");
        reading.set_value(21.5);
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.formatted(), "21.5°C");
        assert_eq!(reading.to_string(), "temperature=21.5°C");
    }

    #[test]
    fn snapshot_builder_keeps_actuator_ids_unique() {
        let node = NodeSnapshot::new(1)
            .with_sensor(SensorReading::new("temperature", 21.5, "C"))
            .with_actuator(2, ActuatorState::new("window", false))
            .with_actuator(2, ActuatorState::new("window", true));

        assert_eq!(node.sensors.len(), 1);
        assert_eq!(node.actuators.len(), 1);
        assert!(node.actuators[&2].is_on);
    }
}
