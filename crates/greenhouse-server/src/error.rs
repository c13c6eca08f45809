//! Error types for the greenhouse server.

use greenhouse_protocol::{ActuatorId, NodeId};
use thiserror::Error;

/// Result type for greenhouse server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in greenhouse server operations.
///
/// `UnknownNode`, `UnknownActuator` and `UnknownSensor` are application
/// errors: a session renders their text into an error reply and carries on.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Greenhouse layout could not be loaded
    #[error("Invalid layout: {0}")]
    Layout(String),

    /// No node with this id
    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    /// No actuator with this id on the node
    #[error("Actuator {actuator_id} not found on node {node_id}")]
    UnknownActuator {
        node_id: NodeId,
        actuator_id: ActuatorId,
    },

    /// No sensor of this type on the node
    #[error("Sensor {sensor_type} not found on node {node_id}")]
    UnknownSensor { node_id: NodeId, sensor_type: String },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Layout(e.to_string())
    }
}
