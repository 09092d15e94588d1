use crate::auth::TokenVerifier;
use crate::container_management::types::ExecStream;
use crate::container_management::ContainerManager;
use crate::session_management::{Session, SessionManager, SessionStatus};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

/// Auth or ownership failure.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// PTY attach failure.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Normal teardown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Query parameters of the upgrade request.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalQuery {
    pub token: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Per-socket registry entry.
///
/// `cleaned_up` is a single-shot latch: the first path to flip it owns
/// the teardown, every other path observes it and returns. The epoch
/// ties a relay to its own entry, so a relay replaced by a reconnect
/// cannot tear down its successor.
struct TerminalConnection {
    epoch: u64,
    outbound: mpsc::UnboundedSender<Message>,
    notify: Arc<Notify>,
    cleaned_up: bool,
}

/// Relays bytes between authenticated WebSockets and container PTYs.
pub struct TerminalGateway {
    sessions: Arc<SessionManager>,
    containers: Arc<ContainerManager>,
    verifier: TokenVerifier,
    connections: Mutex<HashMap<Uuid, TerminalConnection>>,
    next_epoch: std::sync::atomic::AtomicU64,
}

impl TerminalGateway {
    pub fn new(
        sessions: Arc<SessionManager>,
        containers: Arc<ContainerManager>,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            sessions,
            containers,
            verifier,
            connections: Mutex::new(HashMap::new()),
            next_epoch: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Consumes close requests queued by the session manager when a
    /// session reaches a terminal status. Idempotent per session.
    pub async fn run_close_listener(self: Arc<Self>, mut close_rx: mpsc::UnboundedReceiver<Uuid>) {
        while let Some(session_id) = close_rx.recv().await {
            self.teardown(session_id);
        }
        debug!("close listener stopped");
    }

    /// Token, session and ownership checks for an upgrade request.
    fn authorize(&self, query: &TerminalQuery) -> Result<Session, (u16, String)> {
        let user_id = self
            .verifier
            .verify(&query.token)
            .map_err(|_| (CLOSE_POLICY_VIOLATION, "Invalid token".to_string()))?;
        let session_id = Uuid::parse_str(&query.session_id)
            .map_err(|_| (CLOSE_POLICY_VIOLATION, "Invalid session id".to_string()))?;
        let session = self
            .sessions
            .get(session_id)
            .ok_or((CLOSE_POLICY_VIOLATION, "Unknown session".to_string()))?;
        if session.user_id != user_id {
            return Err((
                CLOSE_POLICY_VIOLATION,
                "Session belongs to another user".to_string(),
            ));
        }
        if session.status != SessionStatus::Active {
            return Err((CLOSE_POLICY_VIOLATION, "Session is not active".to_string()));
        }
        Ok(session)
    }

    /// Entry point for an upgraded socket.
    pub async fn handle_socket(self: Arc<Self>, mut socket: WebSocket, query: TerminalQuery) {
        let session = match self.authorize(&query) {
            Ok(session) => session,
            Err((code, reason)) => {
                warn!("terminal upgrade rejected: {}", reason);
                let _ = socket.send(Message::close_with(code, reason)).await;
                return;
            }
        };

        let pty = match self.containers.attach_pty(&session.container_id).await {
            Ok(pty) => pty,
            Err(e) => {
                error!("PTY attach failed for session {}: {}", session.id, e);
                let _ = socket
                    .send(Message::close_with(
                        CLOSE_INTERNAL_ERROR,
                        "Terminal attach failed".to_string(),
                    ))
                    .await;
                return;
            }
        };

        self.stream_session(socket, session.id, pty).await;
    }

    /// Runs both relay directions until either side closes, a relay
    /// errors, or a teardown is requested from outside.
    async fn stream_session(&self, socket: WebSocket, session_id: Uuid, pty: ExecStream) {
        let (ws_tx, mut ws_rx) = socket.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
        let notify = Arc::new(Notify::new());

        // A reconnect replaces the previous socket for this session.
        self.teardown(session_id);
        let epoch = self
            .next_epoch
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        {
            let mut connections = self.connections.lock().unwrap();
            connections.insert(
                session_id,
                TerminalConnection {
                    epoch,
                    outbound: out_tx.clone(),
                    notify: notify.clone(),
                    cleaned_up: false,
                },
            );
        }
        info!("terminal attached for session {}", session_id);

        let writer = tokio::spawn(forward_outbound(out_rx, ws_tx));

        let ExecStream {
            mut output,
            mut input,
        } = pty;

        let pump_tx = out_tx.clone();
        let pty_to_ws = async move {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(bytes) => {
                        // Send fails once the writer stopped (socket no
                        // longer open); drop the bytes silently.
                        if pump_tx.send(Message::binary(bytes)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("pty stream for session {} ended: {}", session_id, e);
                        break;
                    }
                }
            }
        };

        let sessions = self.sessions.clone();
        let ws_to_pty = async move {
            while let Some(next) = ws_rx.next().await {
                match next {
                    Ok(msg) if msg.is_close() => break,
                    Ok(msg) if msg.is_binary() || msg.is_text() => {
                        if input.write_all(msg.as_bytes()).await.is_err() {
                            break;
                        }
                        if input.flush().await.is_err() {
                            break;
                        }
                        sessions.update_activity(session_id);
                    }
                    // Pings and pongs are answered by the framework.
                    Ok(_) => {}
                    Err(e) => {
                        debug!("socket error on session {}: {}", session_id, e);
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = pty_to_ws => {}
            _ = ws_to_pty => {}
            _ = notify.notified() => {}
        }

        self.teardown_entry(session_id, Some(epoch));
        drop(out_tx);
        let _ = writer.await;
        debug!("terminal relay for session {} finished", session_id);
    }

    /// Idempotent teardown of whatever connection the session has.
    /// Returns whether this call performed it.
    pub fn teardown(&self, session_id: Uuid) -> bool {
        self.teardown_entry(session_id, None)
    }

    /// Teardown gated on the epoch: a relay only ever removes its own
    /// entry, external closers (`epoch = None`) remove the current one.
    fn teardown_entry(&self, session_id: Uuid, epoch: Option<u64>) -> bool {
        let connection = {
            let mut connections = self.connections.lock().unwrap();
            match connections.get_mut(&session_id) {
                Some(entry)
                    if !entry.cleaned_up && epoch.map_or(true, |e| e == entry.epoch) =>
                {
                    entry.cleaned_up = true;
                    connections.remove(&session_id)
                }
                _ => return false,
            }
        };

        if let Some(connection) = connection {
            let _ = connection
                .outbound
                .send(Message::close_with(CLOSE_NORMAL, "Session ended".to_string()));
            connection.notify.notify_waiters();
            debug!("terminal for session {} torn down", session_id);
            true
        } else {
            false
        }
    }

    /// Tears down every live connection (shutdown path).
    pub fn close_all(&self) {
        let ids: Vec<Uuid> = self.connections.lock().unwrap().keys().copied().collect();
        for id in ids {
            self.teardown(id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

/// Drains the outbound queue into the socket; stops after a close frame
/// or a send failure.
async fn forward_outbound(
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(msg) = out_rx.recv().await {
        let closing = msg.is_close();
        if ws_tx.send(msg).await.is_err() {
            break;
        }
        if closing {
            break;
        }
    }
    let _ = ws_tx.close().await;
}
