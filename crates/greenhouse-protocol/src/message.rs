//! Protocol message vocabulary.
//!
//! [`Message`] is the closed set of everything that travels over a
//! connection. The client-to-server requests form their own enum,
//! [`Command`], wrapped by [`Message::Command`]: a decoded line is a command
//! exactly when it matches that arm. How a command is executed against node
//! state is up to the server; this crate only names the requests.
//!
//! Every message also knows its [`Delivery`]: state changes are broadcast to
//! every connected panel, replies and errors go back only to the requester.

use std::collections::BTreeMap;

use crate::types::{ActuatorId, NodeId, NodeSnapshot, SensorReading};

/// Requests a control panel can send to the greenhouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch an actuator on.
    TurnOnActuator {
        node_id: NodeId,
        actuator_id: ActuatorId,
    },
    /// Switch an actuator off.
    TurnOffActuator {
        node_id: NodeId,
        actuator_id: ActuatorId,
    },
    /// Ask for a snapshot of every node.
    RequestNodeInfo,
    /// Remove a node from the greenhouse.
    RemoveNode { node_id: NodeId },
    /// End this connection.
    Disconnect,
}

impl Command {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::TurnOnActuator { .. } => "turn_on_actuator",
            Command::TurnOffActuator { .. } => "turn_off_actuator",
            Command::RequestNodeInfo => "request_node_info",
            Command::RemoveNode { .. } => "remove_node",
            Command::Disconnect => "disconnect",
        }
    }
}

/// Everything that can be sent over a greenhouse connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A client request.
    Command(Command),
    /// An actuator's state after a change.
    ActuatorState {
        node_id: NodeId,
        actuator_id: ActuatorId,
        is_on: bool,
    },
    /// Current sensor readings of one node.
    SensorData {
        node_id: NodeId,
        readings: Vec<SensorReading>,
    },
    /// Snapshot of all nodes, keyed by node id.
    NodeInfo {
        nodes: BTreeMap<NodeId, NodeSnapshot>,
    },
    /// A node has been removed.
    NodeRemoved { node_id: NodeId },
    /// A request failed; the text says why.
    Error { text: String },
}

/// Who receives a message produced on behalf of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Only the session whose request produced the message.
    Unicast,
    /// Every live session, the originator included.
    Broadcast,
}

impl Message {
    /// Build an error reply.
    pub fn error(text: impl Into<String>) -> Self {
        Message::Error { text: text.into() }
    }

    /// Routing class of this message.
    pub fn delivery(&self) -> Delivery {
        match self {
            Message::ActuatorState { .. }
            | Message::SensorData { .. }
            | Message::NodeRemoved { .. } => Delivery::Broadcast,
            Message::Command(_) | Message::NodeInfo { .. } | Message::Error { .. } => {
                Delivery::Unicast
            }
        }
    }

    /// Whether this message is a client request.
    pub fn is_command(&self) -> bool {
        matches!(self, Message::Command(_))
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Command(cmd) => cmd.name(),
            Message::ActuatorState { .. } => "actuator_state",
            Message::SensorData { .. } => "sensor_data",
            Message::NodeInfo { .. } => "node_info",
            Message::NodeRemoved { .. } => "node_removed",
            Message::Error { .. } => "error",
        }
    }
}

impl From<Command> for Message {
    fn from(cmd: Command) -> Self {
        Message::Command(cmd)
    }
}
