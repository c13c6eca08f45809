// Test-only harness for greenhouse end-to-end tests.
//
// `TestGreenhouse` runs the real server on an ephemeral localhost port and
// `TestPanel` wraps the real `PanelClient` with timeouts, so every scenario
// goes through the same sockets, sessions and router as production.
//
// See also: `tests/end_to_end.rs` for the scenarios.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use greenhouse_protocol::Message;
use greenhouse_server::{
    ActuatorPolicy, GreenhouseServer, Layout, NodeRegistry, PanelClient, PanelView, Router,
    ServerConfig, ServerHandle,
};
use tokio::task::JoinHandle;

/// Default timeout for waiting on a server line.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long "nothing arrives" is observed for.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Publish interval long enough that no tick lands during a test.
pub const NO_PUBLISH: Duration = Duration::from_secs(3600);

/// Route server logs to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A greenhouse server running in the background.
pub struct TestGreenhouse {
    pub addr: SocketAddr,
    pub registry: Arc<NodeRegistry>,
    pub router: Arc<Router>,
    handle: ServerHandle,
    task: JoinHandle<greenhouse_server::Result<()>>,
}

impl TestGreenhouse {
    /// Start a server with the built-in layout and no periodic publishing.
    pub async fn start() -> Self {
        Self::start_with(Layout::builtin(), ActuatorPolicy::CreateMissing, NO_PUBLISH).await
    }

    /// Start a server with the given layout, policy and publish interval.
    pub async fn start_with(
        layout: Layout,
        policy: ActuatorPolicy,
        publish_interval: Duration,
    ) -> Self {
        init_tracing();
        let config = ServerConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            publish_interval,
            actuator_policy: policy,
            ..ServerConfig::default()
        };
        let registry = Arc::new(layout.into_registry(policy));
        let server = GreenhouseServer::bind(config, Arc::clone(&registry))
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let router = server.router();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        Self {
            addr,
            registry,
            router,
            handle,
            task,
        }
    }

    /// Connect a new panel.
    pub async fn panel(&self) -> TestPanel {
        TestPanel::connect(self.addr).await
    }

    /// Wait until the router has exactly `count` live sessions.
    pub async fn wait_for_sessions(&self, count: usize) {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.router.session_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} sessions"));
    }

    /// Stop accepting connections and wait for the accept loop to return.
    pub async fn shutdown(self) {
        self.handle.shutdown();
        tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("server stops within timeout")
            .expect("server task joined")
            .expect("server returned cleanly");
    }
}

/// A control panel connection with test-friendly, time-bounded receives.
pub struct TestPanel {
    pub client: PanelClient,
    pub view: PanelView,
}

impl TestPanel {
    /// Connect to a running server.
    pub async fn connect(addr: SocketAddr) -> Self {
        let client = PanelClient::connect(addr).await.expect("connect panel");
        Self {
            client,
            view: PanelView::new(),
        }
    }

    /// Send one raw protocol line.
    pub async fn send(&mut self, line: &str) {
        self.client.send_line(line).await.expect("send line");
    }

    /// Next message from the server; `None` if the server closed the
    /// connection. Every message is also folded into `view`.
    pub async fn recv(&mut self) -> Option<Message> {
        let message = tokio::time::timeout(RECV_TIMEOUT, self.client.recv())
            .await
            .expect("timed out waiting for a server line")
            .expect("read from server");
        if let Some(message) = &message {
            self.view.apply(message);
        }
        message
    }

    /// Next message that is not a periodic sensor broadcast.
    pub async fn recv_reply(&mut self) -> Message {
        loop {
            match self.recv().await {
                Some(Message::SensorData { .. }) => continue,
                Some(message) => return message,
                None => panic!("connection closed while waiting for a reply"),
            }
        }
    }

    /// Assert that nothing arrives for [`QUIET_PERIOD`].
    pub async fn expect_silence(&mut self) {
        if let Ok(result) = tokio::time::timeout(QUIET_PERIOD, self.client.recv()).await {
            panic!("expected no message, got {result:?}");
        }
    }

    /// Request a snapshot and return the reply.
    pub async fn node_info(&mut self) -> Message {
        self.client.request_node_info().await.expect("send request");
        self.recv_reply().await
    }
}
