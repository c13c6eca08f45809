//! Broadcast router: delivers messages to one session or to all of them.
//!
//! # Architecture
//!
//! Each live session registers a bounded outbound queue here and gets back the
//! receiving end, which its writer task drains onto the socket. The router
//! never touches a socket itself:
//!
//! ```text
//! route(origin, msg) ──encode once──┬─► queue[origin]            (unicast)
//!                                   └─► queue[s] for every s     (broadcast)
//! ```
//!
//! A queue that is closed or full marks its session as failed. Delivery to
//! the remaining sessions continues, and failed sessions are dropped from the
//! live set once the delivery loop is done. A dropped session is told through
//! its [`Eviction`] receiver and closes its connection.
//!
//! Registry changes and the routing of their notifications happen under
//! [`Router::commit_lock`], so every queue sees changes in the order the
//! registry applied them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use greenhouse_protocol::{codec, Delivery, Message};
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

/// Identifier of a registered session.
pub type SessionId = u64;

/// One encoded protocol line, newline included.
pub type Line = Arc<str>;

/// Resolves when the router drops the session from its live set.
pub type Eviction = oneshot::Receiver<()>;

struct SessionSink {
    peer: String,
    tx: mpsc::Sender<Line>,
    evict: oneshot::Sender<()>,
}

/// Live set of sessions and their outbound queues.
pub struct Router {
    sessions: RwLock<HashMap<SessionId, SessionSink>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    commit: Mutex<()>,
}

impl Router {
    /// Create a router whose per-session queues hold `queue_capacity` lines.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            commit: Mutex::new(()),
        }
    }

    /// Add a session to the live set.
    ///
    /// Returns its id, the receiving end of its outbound queue and the
    /// signal that fires if the router drops it.
    pub async fn register(
        &self,
        peer: impl Into<String>,
    ) -> (SessionId, mpsc::Receiver<Line>, Eviction) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let (evict, eviction) = oneshot::channel();
        let peer = peer.into();
        debug!("Registered session {} ({})", id, peer);
        self.sessions
            .write()
            .await
            .insert(id, SessionSink { peer, tx, evict });
        (id, rx, eviction)
    }

    /// Remove a session from the live set. Returns false if it was already gone.
    pub async fn deregister(&self, id: SessionId) -> bool {
        match self.sessions.write().await.remove(&id) {
            Some(sink) => {
                debug!("Deregistered session {} ({})", id, sink.peer);
                true
            }
            None => false,
        }
    }

    /// Serialize a registry change with the routing of its notification.
    ///
    /// Hold the guard from before the registry is touched until the
    /// resulting message has been routed.
    pub async fn commit_lock(&self) -> MutexGuard<'_, ()> {
        self.commit.lock().await
    }

    /// Whether a session is still live.
    pub async fn is_live(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver a message produced on behalf of `origin` according to its
    /// [`Delivery`] class. Returns how many sessions it was queued for.
    pub async fn route(&self, origin: SessionId, message: &Message) -> usize {
        match message.delivery() {
            Delivery::Unicast => usize::from(self.unicast(origin, message).await),
            Delivery::Broadcast => self.broadcast(message).await,
        }
    }

    /// Queue a message for one session.
    pub async fn unicast(&self, to: SessionId, message: &Message) -> bool {
        let Some(line) = encode_line(message) else {
            return false;
        };

        let delivered = {
            let sessions = self.sessions.read().await;
            match sessions.get(&to) {
                Some(sink) => deliver(to, sink, &line),
                None => {
                    debug!("Dropping {} for departed session {}", message.kind(), to);
                    return false;
                }
            }
        };

        if !delivered {
            self.remove_failed(&[to]).await;
        }
        delivered
    }

    /// Queue a message for every live session.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let Some(line) = encode_line(message) else {
            return 0;
        };

        let mut failed = Vec::new();
        let mut delivered = 0;
        {
            let sessions = self.sessions.read().await;
            for (id, sink) in sessions.iter() {
                if deliver(*id, sink, &line) {
                    delivered += 1;
                } else {
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            self.remove_failed(&failed).await;
        }
        delivered
    }

    async fn remove_failed(&self, ids: &[SessionId]) {
        let mut sessions = self.sessions.write().await;
        for id in ids {
            if let Some(sink) = sessions.remove(id) {
                warn!("Dropped session {} ({}) after failed delivery", id, sink.peer);
                // The session may already be on its way out.
                let _ = sink.evict.send(());
            }
        }
    }
}

fn encode_line(message: &Message) -> Option<Line> {
    match codec::encode(message) {
        Some(mut line) => {
            line.push('\n');
            Some(Arc::from(line))
        }
        None => {
            warn!("Dropping unencodable {} message", message.kind());
            None
        }
    }
}

fn deliver(id: SessionId, sink: &SessionSink, line: &Line) -> bool {
    match sink.tx.try_send(Arc::clone(line)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Outbound queue full for session {} ({})", id, sink.peer);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
