//! Per-connection session.
//!
//! A session reads one line at a time, decodes it, runs commands against the
//! registry and hands every resulting message to the [`Router`]. It never
//! writes to its socket directly: its own writer task drains the outbound
//! queue the router gave it.
//!
//! ```text
//! Reading ──line──► Executing ──reply──► Responding ──► Reading
//!    │                  │
//!    └─ EOF / error     └─ DISCONNECT ──────────────► Closed
//! ```
//!
//! On the way out the session leaves the router's live set first, then lets
//! the writer flush what is still queued and shut the write side down. A
//! session the router evicts as too slow does not wait for its writer: the
//! writer is aborted and the connection dropped.
//!
//! Lines longer than [`MAX_LINE_BYTES`] close the session.

use std::sync::Arc;

use greenhouse_protocol::{codec, Message};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::Execute;
use crate::registry::NodeRegistry;
use crate::router::{Line, Router, SessionId};

/// Longest accepted line, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side of the connection.
    Eof,
    /// The peer sent a disconnect command.
    Disconnect,
    /// Reading from the connection failed.
    ReadFailed,
    /// The writer stopped, because a write failed or the router dropped the
    /// session.
    WriterClosed,
    /// The peer sent a line longer than [`MAX_LINE_BYTES`].
    LineTooLong,
}

enum Flow {
    Continue,
    Close,
}

/// One connected control panel.
pub struct Session {
    id: SessionId,
    peer: String,
    registry: Arc<NodeRegistry>,
    router: Arc<Router>,
}

impl Session {
    /// Serve one connection until it closes.
    pub async fn run<S>(
        stream: S,
        peer: impl Into<String>,
        registry: Arc<NodeRegistry>,
        router: Arc<Router>,
    ) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (reader, writer) = tokio::io::split(stream);
        let (id, outbound, mut evicted) = router.register(peer.clone()).await;
        info!("Session {} opened for {}", id, peer);

        let session = Session {
            id,
            peer,
            registry,
            router,
        };

        let mut writer_task = tokio::spawn(write_lines(writer, outbound));
        let mut writer_done = false;
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        let reason = loop {
            buf.clear();
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
            let read = tokio::select! {
                biased;
                _ = &mut evicted => {
                    warn!("Session {} dropped by the router; closing", session.id);
                    writer_task.abort();
                    break CloseReason::WriterClosed;
                }
                result = &mut writer_task => {
                    writer_done = true;
                    session.log_writer_exit(result);
                    break CloseReason::WriterClosed;
                }
                read = limited.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => break CloseReason::Eof,
                Ok(n) if n == MAX_LINE_BYTES && buf.last() != Some(&b'\n') => {
                    warn!(
                        "Session {} sent a line over {} bytes; closing",
                        session.id, MAX_LINE_BYTES
                    );
                    break CloseReason::LineTooLong;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Session {} read error: {}", session.id, e);
                    break CloseReason::ReadFailed;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Flow::Close = session.handle_line(line).await {
                break CloseReason::Disconnect;
            }
        };

        session.router.deregister(session.id).await;
        if !writer_done {
            let result = writer_task.await;
            if !matches!(&result, Err(e) if e.is_cancelled()) {
                session.log_writer_exit(result);
            }
        }

        info!(
            "Session {} for {} closed: {:?}",
            session.id, session.peer, reason
        );
        reason
    }

    async fn handle_line(&self, line: &str) -> Flow {
        let command = match codec::try_decode(line) {
            Ok(Message::Command(command)) => command,
            Ok(other) => {
                warn!(
                    "Session {} sent a {} message, which is not a command; ignoring",
                    self.id,
                    other.kind()
                );
                return Flow::Continue;
            }
            Err(e) => {
                warn!("Session {} sent an undecodable line ({}); ignoring", self.id, e);
                return Flow::Continue;
            }
        };

        debug!("Session {} executing {}", self.id, command.name());
        let _commit = self.router.commit_lock().await;
        let reply = match command.execute(&self.registry).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Flow::Close,
            Err(e) => {
                debug!("Session {} {} failed: {}", self.id, command.name(), e);
                Message::error(e.to_string())
            }
        };

        self.router.route(self.id, &reply).await;
        Flow::Continue
    }

    fn log_writer_exit(&self, result: Result<std::io::Result<()>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Session {} write error: {}", self.id, e),
            Err(e) => warn!("Session {} writer task failed: {}", self.id, e),
        }
    }
}

async fn write_lines<W>(mut writer: W, mut outbound: mpsc::Receiver<Line>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
