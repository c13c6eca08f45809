//! Line codec: one protocol line to one [`Message`] and back.
//!
//! # Wire format
//!
//! ```text
//! on:<node>:<actuator>                 turn actuator on        (command)
//! off:<node>:<actuator>                turn actuator off       (command)
//! REQUEST_NODE_INFO                    ask for a snapshot      (command)
//! REMOVE_NODE:<node>                   remove a node           (command)
//! DISCONNECT                           close the session       (command)
//! ACTUATOR_ON:<node>:<actuator>        actuator is now on
//! ACTUATOR_OFF:<node>:<actuator>       actuator is now off
//! SENSOR_DATA:<node>;<type>=<value> <unit>,...
//! NODE_INFO|<node>:<readings>:<actuator>_<type>=on|off,...|...
//! NODE_REMOVED:<node>
//! e<text>                              error, rest of the line is the text
//! ```
//!
//! # Unknown input
//!
//! Decoding is permissive by contract: a line that matches no token, or a
//! known token with a broken body, decodes to `None` and never panics. The
//! caller logs it and moves on; nothing about an unknown line is fatal.
//! [`try_decode`] returns the reason instead, for callers that want to log it.
//!
//! # Prefix matching
//!
//! The structured tokens are compared against the line's head (everything
//! before the first `:` or `|`), so `ACTUATOR_ON` can never be mistaken for a
//! prefix of something else. The single-letter error prefix `e` has no
//! delimiter; it is only tried after every structured token failed, and no
//! structured token starts with a lowercase `e`.
//!
//! # Encoding
//!
//! [`encode`] returns `None` when a message cannot be written as one line that
//! decodes back to the same message: error text with a line break, or sensor
//! and actuator names that contain protocol delimiters. Everything it does
//! encode satisfies `decode(&encode(m)?) == Some(m)`.

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::message::{Command, Message};
use crate::types::{ActuatorId, ActuatorState, NodeId, NodeSnapshot, SensorReading};

/// Client request: switch an actuator on.
pub const TURN_ON: &str = "on";
/// Client request: switch an actuator off.
pub const TURN_OFF: &str = "off";
/// Notice: an actuator is now on.
pub const ACTUATOR_ON: &str = "ACTUATOR_ON";
/// Notice: an actuator is now off.
pub const ACTUATOR_OFF: &str = "ACTUATOR_OFF";
/// Periodic sensor readings of one node.
pub const SENSOR_DATA: &str = "SENSOR_DATA";
/// Client request: snapshot of every node.
pub const REQUEST_NODE_INFO: &str = "REQUEST_NODE_INFO";
/// Snapshot of every node.
pub const NODE_INFO: &str = "NODE_INFO";
/// Client request: remove a node.
pub const REMOVE_NODE: &str = "REMOVE_NODE";
/// Notice: a node was removed.
pub const NODE_REMOVED: &str = "NODE_REMOVED";
/// Client request: close this connection.
pub const DISCONNECT: &str = "DISCONNECT";
/// Error reply; the rest of the line is free text.
pub const ERROR_PREFIX: &str = "e";

const FIELD_SEP: char = ':';
const BLOCK_SEP: char = '|';
const READINGS_SEP: char = ';';
const LIST_SEP: char = ',';
const KV_SEP: char = '=';
const UNIT_SEP: char = ' ';
const ACTUATOR_ID_SEP: char = '_';

const STATE_ON: &str = "on";
const STATE_OFF: &str = "off";

/// Characters that may not appear in sensor or actuator type names.
const RESERVED: [char; 8] = [
    FIELD_SEP,
    BLOCK_SEP,
    READINGS_SEP,
    LIST_SEP,
    KV_SEP,
    '\n',
    '\r',
    '\0',
];

/// Decode one line (without its line terminator).
///
/// Returns `None` for empty, unknown or malformed lines.
pub fn decode(line: &str) -> Option<Message> {
    try_decode(line).ok()
}

/// Decode one line, reporting why it was rejected.
pub fn try_decode(line: &str) -> Result<Message, DecodeError> {
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let head = line.split([FIELD_SEP, BLOCK_SEP]).next().unwrap_or(line);
    match head {
        TURN_ON => {
            let (node_id, actuator_id) = parse_actuator_fields(line, TURN_ON)?;
            Ok(Command::TurnOnActuator {
                node_id,
                actuator_id,
            }
            .into())
        }
        TURN_OFF => {
            let (node_id, actuator_id) = parse_actuator_fields(line, TURN_OFF)?;
            Ok(Command::TurnOffActuator {
                node_id,
                actuator_id,
            }
            .into())
        }
        ACTUATOR_ON | ACTUATOR_OFF => {
            let token = if head == ACTUATOR_ON { ACTUATOR_ON } else { ACTUATOR_OFF };
            let (node_id, actuator_id) = parse_actuator_fields(line, token)?;
            Ok(Message::ActuatorState {
                node_id,
                actuator_id,
                is_on: token == ACTUATOR_ON,
            })
        }
        SENSOR_DATA => parse_sensor_data(line),
        NODE_INFO => parse_node_info(line),
        REQUEST_NODE_INFO => expect_bare(line, REQUEST_NODE_INFO, Command::RequestNodeInfo.into()),
        DISCONNECT => expect_bare(line, DISCONNECT, Command::Disconnect.into()),
        REMOVE_NODE => {
            let node_id = parse_node_field(line, REMOVE_NODE)?;
            Ok(Command::RemoveNode { node_id }.into())
        }
        NODE_REMOVED => {
            let node_id = parse_node_field(line, NODE_REMOVED)?;
            Ok(Message::NodeRemoved { node_id })
        }
        _ => match line.strip_prefix(ERROR_PREFIX) {
            Some(text) => Ok(Message::error(text)),
            None => Err(DecodeError::UnknownPrefix(head.to_string())),
        },
    }
}

/// Encode a message as one line (without a line terminator).
///
/// Returns `None` if the message cannot be represented losslessly.
pub fn encode(message: &Message) -> Option<String> {
    match message {
        Message::Command(cmd) => Some(encode_command(cmd)),
        Message::ActuatorState {
            node_id,
            actuator_id,
            is_on,
        } => {
            let token = if *is_on { ACTUATOR_ON } else { ACTUATOR_OFF };
            Some(format!("{token}{FIELD_SEP}{node_id}{FIELD_SEP}{actuator_id}"))
        }
        Message::SensorData { node_id, readings } => Some(format!(
            "{SENSOR_DATA}{FIELD_SEP}{node_id}{READINGS_SEP}{}",
            encode_readings(readings)?
        )),
        Message::NodeInfo { nodes } => {
            let mut line = String::from(NODE_INFO);
            for (id, node) in nodes {
                if *id != node.id {
                    return None;
                }
                line.push(BLOCK_SEP);
                line.push_str(&encode_node_block(node)?);
            }
            Some(line)
        }
        Message::NodeRemoved { node_id } => Some(format!("{NODE_REMOVED}{FIELD_SEP}{node_id}")),
        Message::Error { text } => {
            if text.contains(['\n', '\r']) {
                None
            } else {
                Some(format!("{ERROR_PREFIX}{text}"))
            }
        }
    }
}

fn encode_command(cmd: &Command) -> String {
    match cmd {
        Command::TurnOnActuator {
            node_id,
            actuator_id,
        } => format!("{TURN_ON}{FIELD_SEP}{node_id}{FIELD_SEP}{actuator_id}"),
        Command::TurnOffActuator {
            node_id,
            actuator_id,
        } => format!("{TURN_OFF}{FIELD_SEP}{node_id}{FIELD_SEP}{actuator_id}"),
        Command::RequestNodeInfo => REQUEST_NODE_INFO.to_string(),
        Command::RemoveNode { node_id } => format!("{REMOVE_NODE}{FIELD_SEP}{node_id}"),
        Command::Disconnect => DISCONNECT.to_string(),
    }
}

fn encode_readings(readings: &[SensorReading]) -> Option<String> {
    let mut parts = Vec::with_capacity(readings.len());
    for reading in readings {
        if !is_safe_name(&reading.sensor_type) || !is_safe_unit(&reading.unit) {
            return None;
        }
        parts.push(format!(
            "{}{KV_SEP}{}{UNIT_SEP}{}",
            reading.sensor_type, reading.value, reading.unit
        ));
    }
    Some(parts.join(&LIST_SEP.to_string()))
}

fn encode_node_block(node: &NodeSnapshot) -> Option<String> {
    let sensors = encode_readings(&node.sensors)?;

    let mut actuators = Vec::with_capacity(node.actuators.len());
    for (id, actuator) in &node.actuators {
        if !is_safe_name(&actuator.actuator_type) {
            return None;
        }
        let state = if actuator.is_on { STATE_ON } else { STATE_OFF };
        actuators.push(format!(
            "{id}{ACTUATOR_ID_SEP}{}{KV_SEP}{state}",
            actuator.actuator_type
        ));
    }

    Some(format!(
        "{}{FIELD_SEP}{sensors}{FIELD_SEP}{}",
        node.id,
        actuators.join(&LIST_SEP.to_string())
    ))
}

fn is_safe_name(name: &str) -> bool {
    !name.contains(RESERVED)
}

fn is_safe_unit(unit: &str) -> bool {
    is_safe_name(unit) && !unit.contains(UNIT_SEP)
}

/// `<token>:<node>:<actuator>`; extra trailing fields are ignored.
fn parse_actuator_fields(
    line: &str,
    token: &'static str,
) -> Result<(NodeId, ActuatorId), DecodeError> {
    let mut fields = line.split(FIELD_SEP).skip(1);
    match (fields.next(), fields.next()) {
        (Some(node), Some(actuator)) => Ok((
            parse_int(token, "node id", node)?,
            parse_int(token, "actuator id", actuator)?,
        )),
        _ => Err(DecodeError::malformed(
            token,
            format!("expected {token}:<nodeId>:<actuatorId>"),
        )),
    }
}

/// `<token>:<node>`; extra trailing fields are ignored.
fn parse_node_field(line: &str, token: &'static str) -> Result<NodeId, DecodeError> {
    match line.split(FIELD_SEP).nth(1) {
        Some(node) => parse_int(token, "node id", node),
        None => Err(DecodeError::malformed(
            token,
            format!("expected {token}:<nodeId>"),
        )),
    }
}

fn expect_bare(line: &str, token: &'static str, message: Message) -> Result<Message, DecodeError> {
    if line == token {
        Ok(message)
    } else {
        Err(DecodeError::malformed(token, "unexpected payload"))
    }
}

fn parse_int(token: &'static str, field: &str, text: &str) -> Result<i32, DecodeError> {
    text.parse()
        .map_err(|_| DecodeError::malformed(token, format!("{field} {text:?} is not an integer")))
}

fn parse_sensor_data(line: &str) -> Result<Message, DecodeError> {
    let body = line
        .strip_prefix(SENSOR_DATA)
        .and_then(|rest| rest.strip_prefix(FIELD_SEP))
        .ok_or_else(|| DecodeError::malformed(SENSOR_DATA, "expected ':' after token"))?;
    let (node, readings) = body
        .split_once(READINGS_SEP)
        .ok_or_else(|| DecodeError::malformed(SENSOR_DATA, "missing ';' before readings"))?;

    Ok(Message::SensorData {
        node_id: parse_int(SENSOR_DATA, "node id", node)?,
        readings: parse_readings(SENSOR_DATA, readings)?,
    })
}

fn parse_readings(token: &'static str, text: &str) -> Result<Vec<SensorReading>, DecodeError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(LIST_SEP)
        .map(|segment| parse_reading(token, segment))
        .collect()
}

/// `<type>=<value> <unit>`
fn parse_reading(token: &'static str, segment: &str) -> Result<SensorReading, DecodeError> {
    let parts: Vec<&str> = segment.split(KV_SEP).collect();
    let &[sensor_type, value_unit] = parts.as_slice() else {
        return Err(DecodeError::malformed(
            token,
            format!("reading {segment:?} is not <type>=<value> <unit>"),
        ));
    };

    let parts: Vec<&str> = value_unit.split(UNIT_SEP).collect();
    let &[value, unit] = parts.as_slice() else {
        return Err(DecodeError::malformed(
            token,
            format!("reading value {value_unit:?} is not <value> <unit>"),
        ));
    };

    let value: f64 = value
        .parse()
        .map_err(|_| DecodeError::malformed(token, format!("reading value {value:?} is not a number")))?;

    Ok(SensorReading::new(sensor_type, value, unit))
}

fn parse_node_info(line: &str) -> Result<Message, DecodeError> {
    let mut blocks = line.split(BLOCK_SEP);
    if blocks.next() != Some(NODE_INFO) {
        return Err(DecodeError::malformed(NODE_INFO, "expected '|' after token"));
    }

    let mut nodes = BTreeMap::new();
    for block in blocks {
        let node = parse_node_block(block)?;
        let id = node.id;
        if nodes.insert(id, node).is_some() {
            return Err(DecodeError::malformed(NODE_INFO, format!("duplicate node {id}")));
        }
    }
    Ok(Message::NodeInfo { nodes })
}

/// `<node>:<readings>:<actuators>`
fn parse_node_block(block: &str) -> Result<NodeSnapshot, DecodeError> {
    let mut fields = block.splitn(3, FIELD_SEP);
    let (Some(id), Some(sensors), Some(actuators)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(DecodeError::malformed(
            NODE_INFO,
            format!("node block {block:?} is not <nodeId>:<sensors>:<actuators>"),
        ));
    };

    let mut node = NodeSnapshot::new(parse_int(NODE_INFO, "node id", id)?);
    node.sensors = parse_readings(NODE_INFO, sensors)?;
    if !actuators.is_empty() {
        for entry in actuators.split(LIST_SEP) {
            let (actuator_id, state) = parse_actuator_entry(entry)?;
            if node.actuators.insert(actuator_id, state).is_some() {
                return Err(DecodeError::malformed(
                    NODE_INFO,
                    format!("duplicate actuator {actuator_id} on node {}", node.id),
                ));
            }
        }
    }
    Ok(node)
}

/// `<actuator>_<type>=on|off`
fn parse_actuator_entry(entry: &str) -> Result<(ActuatorId, ActuatorState), DecodeError> {
    let malformed = || {
        DecodeError::malformed(
            NODE_INFO,
            format!("actuator {entry:?} is not <actuatorId>_<type>=on|off"),
        )
    };

    let (left, state) = entry.split_once(KV_SEP).ok_or_else(malformed)?;
    let (id, actuator_type) = left.split_once(ACTUATOR_ID_SEP).ok_or_else(malformed)?;
    let is_on = match state {
        STATE_ON => true,
        STATE_OFF => false,
        _ => return Err(malformed()),
    };

    Ok((
        parse_int(NODE_INFO, "actuator id", id)?,
        ActuatorState::new(actuator_type, is_on),
    ))
}
