//! Greenhouse Protocol: the line-oriented wire format spoken between
//! greenhouse nodes and control panels.
//!
//! Every message is one UTF-8 line. The first token of the line names the
//! message kind; the rest is a small, delimiter-separated body.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   on:1:2 / REQUEST_NODE_INFO / ...   ┌──────────────────┐
//! │ control panel │ ───────────────────────────────────► │ greenhouse server│
//! │               │ ◄─────────────────────────────────── │                  │
//! └───────────────┘   ACTUATOR_ON / SENSOR_DATA / e...   └──────────────────┘
//! ```
//!
//! - [`types`]: sensor readings, actuator states, node snapshots
//! - [`message`]: the closed [`Message`] vocabulary and its [`Delivery`] class
//! - [`codec`]: [`decode`] and [`encode`] between a line and a [`Message`]
//!
//! The crate does no I/O. Framing (splitting a byte stream into lines) and
//! command execution live in the server.

pub mod codec;
pub mod error;
pub mod message;
pub mod types;

pub use codec::{decode, encode, try_decode};
pub use error::DecodeError;
pub use message::{Command, Delivery, Message};
pub use types::{ActuatorId, ActuatorState, NodeId, NodeSnapshot, SensorReading};
