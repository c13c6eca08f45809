//! Control panel side of the connection.
//!
//! [`PanelClient`] sends commands and reads decoded server lines.
//! [`PanelView`] folds those lines into the panel's picture of the greenhouse.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use greenhouse_protocol::{
    codec, ActuatorId, Command, Message, NodeId, NodeSnapshot, SensorReading,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// TCP connection to a greenhouse server.
pub struct PanelClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    line: String,
}

impl PanelClient {
    /// Connect to a greenhouse server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        debug!("Connected to greenhouse at {}", peer);

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            peer,
            line: String::new(),
        })
    }

    /// Address of the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send a command.
    pub async fn send(&mut self, command: Command) -> Result<()> {
        let message = Message::from(command);
        let line = codec::encode(&message).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "command cannot be encoded",
            ))
        })?;
        self.send_line(&line).await
    }

    /// Send one raw line; a newline is appended.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Turn an actuator on.
    pub async fn turn_on(&mut self, node_id: NodeId, actuator_id: ActuatorId) -> Result<()> {
        self.send(Command::TurnOnActuator {
            node_id,
            actuator_id,
        })
        .await
    }

    /// Turn an actuator off.
    pub async fn turn_off(&mut self, node_id: NodeId, actuator_id: ActuatorId) -> Result<()> {
        self.send(Command::TurnOffActuator {
            node_id,
            actuator_id,
        })
        .await
    }

    /// Ask for a snapshot of every node.
    pub async fn request_node_info(&mut self) -> Result<()> {
        self.send(Command::RequestNodeInfo).await
    }

    /// Ask the server to remove a node.
    pub async fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        self.send(Command::RemoveNode { node_id }).await
    }

    /// Ask the server to close this connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Next decodable message from the server, or `None` once it closed the
    /// connection. Lines that do not decode are logged and skipped.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            match codec::try_decode(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!("Ignoring line from {}: {}", self.peer, e),
            }
        }
    }
}

/// What a control panel knows about the greenhouse.
///
/// Actuator states are recorded for any node or actuator mentioned, known or
/// not; unknown actuators read as off.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelView {
    nodes: BTreeMap<NodeId, NodeSnapshot>,
    actuator_states: BTreeMap<NodeId, BTreeMap<ActuatorId, bool>>,
    last_error: Option<String>,
}

impl PanelView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server message into the view.
    pub fn apply(&mut self, message: &Message) {
        match message {
            Message::NodeInfo { nodes } => {
                for (node_id, node) in nodes {
                    let states = self.actuator_states.entry(*node_id).or_default();
                    for (actuator_id, actuator) in &node.actuators {
                        states.insert(*actuator_id, actuator.is_on);
                    }
                    self.nodes.insert(*node_id, node.clone());
                }
            }
            Message::ActuatorState {
                node_id,
                actuator_id,
                is_on,
            } => {
                self.actuator_states
                    .entry(*node_id)
                    .or_default()
                    .insert(*actuator_id, *is_on);
                if let Some(actuator) = self
                    .nodes
                    .get_mut(node_id)
                    .and_then(|node| node.actuators.get_mut(actuator_id))
                {
                    actuator.is_on = *is_on;
                }
            }
            Message::SensorData { node_id, readings } => {
                if let Some(node) = self.nodes.get_mut(node_id) {
                    node.sensors = readings.clone();
                }
            }
            Message::NodeRemoved { node_id } => {
                self.nodes.remove(node_id);
                self.actuator_states.remove(node_id);
            }
            Message::Error { text } => self.last_error = Some(text.clone()),
            Message::Command(_) => {}
        }
    }

    /// Whether an actuator was last reported on.
    pub fn is_actuator_on(&self, node_id: NodeId, actuator_id: ActuatorId) -> bool {
        self.actuator_states
            .get(&node_id)
            .and_then(|states| states.get(&actuator_id))
            .copied()
            .unwrap_or(false)
    }

    /// Known nodes.
    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeSnapshot> {
        &self.nodes
    }

    /// Latest readings of a node.
    pub fn sensors(&self, node_id: NodeId) -> Option<&[SensorReading]> {
        self.nodes.get(&node_id).map(|node| node.sensors.as_slice())
    }

    /// Text of the most recent error reply.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
