//! Greenhouse layout: the nodes the simulator starts with.
//!
//! The built-in layout holds three nodes assembled from sensor and actuator
//! counts. A JSON file can replace it:
//!
//! ```json
//! {
//!   "nodes": [
//!     {
//!       "id": 1,
//!       "sensors": [{ "type": "temperature", "value": 27.0, "unit": "°C" }],
//!       "actuators": { "1": { "type": "window", "is_on": false } }
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use greenhouse_protocol::{ActuatorId, ActuatorState, NodeId, NodeSnapshot, SensorReading};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::registry::{ActuatorPolicy, NodeRegistry};

/// Starting value of a temperature sensor, in °C.
pub const DEFAULT_TEMPERATURE: f64 = 27.0;
/// Starting value of a humidity sensor, in %.
pub const DEFAULT_HUMIDITY: f64 = 80.0;
/// Starting value of a light sensor, in lux.
pub const DEFAULT_LIGHT_LEVEL: f64 = 1000.0;

/// Set of nodes to load into a fresh registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub nodes: Vec<NodeSnapshot>,
}

/// Sensor and actuator counts for one node of the built-in layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeSpec {
    pub temperature: usize,
    pub humidity: usize,
    pub light: usize,
    pub windows: usize,
    pub fans: usize,
    pub heaters: usize,
}

impl NodeSpec {
    /// Build a node with these counts. Actuators are numbered from 1 in the
    /// order windows, fans, heaters.
    pub fn build(&self, id: NodeId) -> NodeSnapshot {
        let mut node = NodeSnapshot::new(id);

        let sensors = [
            (self.temperature, "temperature", DEFAULT_TEMPERATURE, "°C"),
            (self.humidity, "humidity", DEFAULT_HUMIDITY, "%"),
            (self.light, "light", DEFAULT_LIGHT_LEVEL, "lux"),
        ];
        for (count, sensor_type, value, unit) in sensors {
            for _ in 0..count {
                node.sensors.push(SensorReading::new(sensor_type, value, unit));
            }
        }

        let actuators = [
            (self.windows, "window"),
            (self.fans, "fan"),
            (self.heaters, "heater"),
        ];
        let mut next_id: ActuatorId = 1;
        for (count, actuator_type) in actuators {
            for _ in 0..count {
                node.actuators
                    .insert(next_id, ActuatorState::new(actuator_type, false));
                next_id += 1;
            }
        }

        node
    }
}

impl Layout {
    /// The built-in three-node greenhouse.
    pub fn builtin() -> Self {
        let specs = [
            NodeSpec {
                temperature: 1,
                humidity: 2,
                light: 1,
                windows: 1,
                ..Default::default()
            },
            NodeSpec {
                temperature: 1,
                light: 1,
                fans: 2,
                heaters: 1,
                ..Default::default()
            },
            NodeSpec {
                temperature: 2,
                ..Default::default()
            },
        ];

        let nodes = specs
            .iter()
            .zip(1..)
            .map(|(spec, id)| spec.build(id))
            .collect();
        Self { nodes }
    }

    /// Parse a layout from JSON, rejecting duplicate node ids.
    pub fn from_json(json: &str) -> Result<Self> {
        let layout: Layout = serde_json::from_str(json)?;

        let mut seen = BTreeSet::new();
        for node in &layout.nodes {
            if !seen.insert(node.id) {
                return Err(Error::Layout(format!("duplicate node id {}", node.id)));
            }
        }
        Ok(layout)
    }

    /// Read a layout from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Layout(format!("{}: {}", path.display(), e)))?;
        let layout = Self::from_json(&json)?;
        info!(
            "Loaded layout with {} nodes from {}",
            layout.nodes.len(),
            path.display()
        );
        Ok(layout)
    }

    /// The layout file if one is given, the built-in layout otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build a registry holding these nodes.
    pub fn into_registry(self, policy: ActuatorPolicy) -> NodeRegistry {
        NodeRegistry::with_nodes(self.nodes, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layout_has_three_nodes() {
        let layout = Layout::builtin();
        let ids: Vec<NodeId> = layout.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let first = &layout.nodes[0];
        assert_eq!(first.sensors.len(), 4);
        assert_eq!(first.actuators.len(), 1);
        assert_eq!(first.actuators[&1].actuator_type, "window");

        let second = &layout.nodes[1];
        let types: Vec<&str> = second
            .actuators
            .values()
            .map(|a| a.actuator_type.as_str())
            .collect();
        assert_eq!(types, vec!["fan", "fan", "heater"]);

        let third = &layout.nodes[2];
        assert_eq!(third.sensors.len(), 2);
        assert!(third.actuators.is_empty());
    }

    #[test]
    fn builtin_actuators_start_off() {
        let layout = Layout::builtin();
        assert!(layout
            .nodes
            .iter()
            .flat_map(|n| n.actuators.values())
            .all(|a| !a.is_on));
    }

    #[test]
    fn loads_json_layout() {
        let json = r#"{
            "nodes": [
                {
                    "id": 7,
                    "sensors": [{ "type": "temp", "value": 21.5, "unit": "C" }],
                    "actuators": { "2": { "type": "window" } }
                },
                { "id": 8 }
            ]
        }"#;

        let layout = Layout::from_json(json).unwrap();
        assert_eq!(layout.nodes.len(), 2);
        assert_eq!(
            layout.nodes[0],
            NodeSnapshot::new(7)
                .with_sensor(SensorReading::new("temp", 21.5, "C"))
                .with_actuator(2, ActuatorState::new("window", false))
        );
        assert_eq!(layout.nodes[1], NodeSnapshot::new(8));
    }

    #[test]
    fn json_round_trips() {
        let layout = Layout::builtin();
        let json = layout.to_json().unwrap();
        assert_eq!(Layout::from_json(&json).unwrap(), layout);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert!(matches!(
            Layout::from_json(r#"{ "nodes": [{ "id": 1 }, { "id": 1 }] }"#),
            Err(Error::Layout(_))
        ));
        assert!(matches!(Layout::from_json("not json"), Err(Error::Layout(_))));
        assert!(matches!(
            Layout::load(Path::new("/nonexistent/greenhouse.json")),
            Err(Error::Layout(_))
        ));
    }

    #[tokio::test]
    async fn registry_from_layout() {
        let registry = Layout::builtin().into_registry(ActuatorPolicy::RejectUnknown);
        assert_eq!(registry.node_count().await, 3);
        assert!(!registry.is_actuator_on(2, 3).await);
        assert!(registry.set_actuator_state(2, 3, true).await.unwrap());
        assert_eq!(registry.policy(), ActuatorPolicy::RejectUnknown);
    }
}
