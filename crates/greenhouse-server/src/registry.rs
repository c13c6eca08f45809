//! Node registry: the single source of truth for greenhouse node state.
//!
//! All access goes through the methods below, each of which takes the lock
//! once. A read-modify-write (such as switching an actuator and reporting its
//! new state) happens inside one write guard, so concurrent sessions always
//! observe some serial order of their commands.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use greenhouse_protocol::{ActuatorId, ActuatorState, NodeId, NodeSnapshot};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Actuator type recorded for actuators created on first use.
pub const UNKNOWN_ACTUATOR_TYPE: &str = "unknown";

/// What to do when a command targets a node or actuator that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorPolicy {
    /// Create the missing node and actuator, then apply the change.
    #[default]
    CreateMissing,
    /// Refuse with [`Error::UnknownNode`] or [`Error::UnknownActuator`].
    RejectUnknown,
}

impl FromStr for ActuatorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "create-missing" => Ok(ActuatorPolicy::CreateMissing),
            "reject" | "reject-unknown" => Ok(ActuatorPolicy::RejectUnknown),
            other => Err(Error::Config(format!(
                "unknown actuator policy {other:?} (expected create or reject)"
            ))),
        }
    }
}

impl fmt::Display for ActuatorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorPolicy::CreateMissing => write!(f, "create"),
            ActuatorPolicy::RejectUnknown => write!(f, "reject"),
        }
    }
}

/// In-memory map of node id to node state.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<NodeId, NodeSnapshot>>,
    policy: ActuatorPolicy,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new(policy: ActuatorPolicy) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            policy,
        }
    }

    /// Create a registry holding the given nodes. A later node replaces an
    /// earlier one with the same id.
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeSnapshot>, policy: ActuatorPolicy) -> Self {
        let nodes = nodes.into_iter().map(|node| (node.id, node)).collect();
        Self {
            nodes: RwLock::new(nodes),
            policy,
        }
    }

    /// Policy applied to unknown ids.
    pub fn policy(&self) -> ActuatorPolicy {
        self.policy
    }

    /// Whether an actuator is on; unknown nodes and actuators read as off.
    pub async fn is_actuator_on(&self, node_id: NodeId, actuator_id: ActuatorId) -> bool {
        let nodes = self.nodes.read().await;
        nodes
            .get(&node_id)
            .and_then(|node| node.actuators.get(&actuator_id))
            .is_some_and(|actuator| actuator.is_on)
    }

    /// Switch an actuator and return its state as stored afterwards.
    pub async fn set_actuator_state(
        &self,
        node_id: NodeId,
        actuator_id: ActuatorId,
        is_on: bool,
    ) -> Result<bool> {
        let mut nodes = self.nodes.write().await;

        let node = match (nodes.contains_key(&node_id), self.policy) {
            (true, _) | (false, ActuatorPolicy::CreateMissing) => nodes
                .entry(node_id)
                .or_insert_with(|| {
                    info!("Creating node {} on first use", node_id);
                    NodeSnapshot::new(node_id)
                }),
            (false, ActuatorPolicy::RejectUnknown) => return Err(Error::UnknownNode(node_id)),
        };

        let actuator = match (node.actuators.contains_key(&actuator_id), self.policy) {
            (true, _) | (false, ActuatorPolicy::CreateMissing) => node
                .actuators
                .entry(actuator_id)
                .or_insert_with(|| ActuatorState::new(UNKNOWN_ACTUATOR_TYPE, false)),
            (false, ActuatorPolicy::RejectUnknown) => {
                return Err(Error::UnknownActuator {
                    node_id,
                    actuator_id,
                })
            }
        };

        actuator.is_on = is_on;
        debug!(
            "Actuator {} on node {} is now {}",
            actuator_id,
            node_id,
            if actuator.is_on { "on" } else { "off" }
        );
        Ok(actuator.is_on)
    }

    /// Copy of every node, keyed by id.
    pub async fn snapshot_all(&self) -> BTreeMap<NodeId, NodeSnapshot> {
        self.nodes.read().await.clone()
    }

    /// Copy of one node.
    pub async fn snapshot(&self, node_id: NodeId) -> Option<NodeSnapshot> {
        self.nodes.read().await.get(&node_id).cloned()
    }

    /// Remove a node, returning its last state.
    pub async fn remove_node(&self, node_id: NodeId) -> Result<NodeSnapshot> {
        let removed = self.nodes.write().await.remove(&node_id);
        match removed {
            Some(node) => {
                info!("Removed node {}", node_id);
                Ok(node)
            }
            None => Err(Error::UnknownNode(node_id)),
        }
    }

    /// Add or replace a node, returning the node it replaced.
    pub async fn insert_node(&self, node: NodeSnapshot) -> Option<NodeSnapshot> {
        self.nodes.write().await.insert(node.id, node)
    }

    /// Overwrite the value of every reading of `sensor_type` on a node.
    pub async fn set_sensor_value(
        &self,
        node_id: NodeId,
        sensor_type: &str,
        value: f64,
    ) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.get_mut(&node_id).ok_or(Error::UnknownNode(node_id))?;

        let mut found = false;
        for reading in node.sensors.iter_mut().filter(|r| r.sensor_type == sensor_type) {
            reading.set_value(value);
            found = true;
        }

        if found {
            Ok(())
        } else {
            Err(Error::UnknownSensor {
                node_id,
                sensor_type: sensor_type.to_string(),
            })
        }
    }

    /// Number of nodes.
    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }
}
