//! Greenhouse Server: a simulated greenhouse of sensor/actuator nodes served
//! to remote control panels over line-oriented TCP.
//!
//! # Architecture
//!
//! - **Registry**: internally synchronized node state, the single source of truth
//! - **Command**: execution of client requests against the registry
//! - **Router**: live session set; unicast replies, broadcast state changes
//! - **Session**: one task per connection plus its writer task
//! - **Publisher**: periodic `SENSOR_DATA` broadcast
//! - **Server**: TCP accept loop and shutdown handle
//! - **Layout / Config**: starting nodes and environment configuration
//! - **Client**: the control panel side of the protocol
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use greenhouse_server::{GreenhouseServer, Layout, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env()?;
//!     let registry = Layout::builtin().into_registry(config.actuator_policy);
//!     let server = GreenhouseServer::bind(config, Arc::new(registry)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod layout;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use client::{PanelClient, PanelView};
pub use command::Execute;
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use layout::{Layout, NodeSpec};
pub use publisher::Publisher;
pub use registry::{ActuatorPolicy, NodeRegistry};
pub use router::{Router, SessionId};
pub use server::{GreenhouseServer, ServerHandle};
pub use session::{CloseReason, Session};
