//! Periodic sensor publisher.
//!
//! On every tick, snapshot all nodes and broadcast one `SENSOR_DATA` line per
//! node to every live session.

use std::sync::Arc;
use std::time::Duration;

use greenhouse_protocol::Message;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::registry::NodeRegistry;
use crate::router::Router;

/// Broadcasts sensor readings on a fixed interval.
pub struct Publisher {
    registry: Arc<NodeRegistry>,
    router: Arc<Router>,
    interval: Duration,
}

impl Publisher {
    /// Create a publisher.
    pub fn new(registry: Arc<NodeRegistry>, router: Arc<Router>, interval: Duration) -> Self {
        Self {
            registry,
            router,
            interval,
        }
    }

    /// Broadcast the current readings of every node once.
    ///
    /// Returns the number of messages published.
    pub async fn publish_once(&self) -> usize {
        // A node removed mid-publish must not be published after its NODE_REMOVED.
        let _commit = self.router.commit_lock().await;
        let nodes = self.registry.snapshot_all().await;
        let count = nodes.len();
        for (node_id, node) in nodes {
            let message = Message::SensorData {
                node_id,
                readings: node.sensors,
            };
            self.router.broadcast(&message).await;
        }
        count
    }

    /// Publish every interval, starting one interval from now, until
    /// `shutdown` turns true or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // tokio intervals reject a zero period
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Publishing sensor data every {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let published = self.publish_once().await;
                    debug!("Published sensor data for {} nodes", published);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Sensor publisher stopped");
    }
}
