//! Command execution against the node registry.

use std::future::Future;

use greenhouse_protocol::{ActuatorId, Command, Message, NodeId};
use tracing::info;

use crate::error::Result;
use crate::registry::NodeRegistry;

/// Behavior of a client request on the server side.
///
/// `Ok(Some(m))` is a reply to route, `Ok(None)` ends the session and `Err`
/// is an application error the session turns into an error reply.
pub trait Execute {
    /// Run the request against the registry.
    fn execute(
        &self,
        registry: &NodeRegistry,
    ) -> impl Future<Output = Result<Option<Message>>> + Send;
}

impl Execute for Command {
    async fn execute(&self, registry: &NodeRegistry) -> Result<Option<Message>> {
        match *self {
            Command::TurnOnActuator {
                node_id,
                actuator_id,
            } => switch(registry, node_id, actuator_id, true).await.map(Some),
            Command::TurnOffActuator {
                node_id,
                actuator_id,
            } => switch(registry, node_id, actuator_id, false).await.map(Some),
            Command::RequestNodeInfo => Ok(Some(Message::NodeInfo {
                nodes: registry.snapshot_all().await,
            })),
            Command::RemoveNode { node_id } => {
                registry.remove_node(node_id).await?;
                Ok(Some(Message::NodeRemoved { node_id }))
            }
            Command::Disconnect => Ok(None),
        }
    }
}

async fn switch(
    registry: &NodeRegistry,
    node_id: NodeId,
    actuator_id: ActuatorId,
    is_on: bool,
) -> Result<Message> {
    let is_on = registry.set_actuator_state(node_id, actuator_id, is_on).await?;
    info!(
        "Actuator {} on node {} turned {}",
        actuator_id,
        node_id,
        if is_on { "on" } else { "off" }
    );
    Ok(Message::ActuatorState {
        node_id,
        actuator_id,
        is_on,
    })
}
