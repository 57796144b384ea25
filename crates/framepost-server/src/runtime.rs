//! Tokio runtime glue: real sockets around the pure driver.
//!
//! This module owns everything the driver must not touch: the per-session
//! write halves, the read loops, the heartbeat supervisor task, and the
//! executor that turns [`ServerAction`]s into socket writes, queue pushes,
//! file rewrites, and log records.
//!
//! Socket ownership: the session task owns its read half for the session's
//! lifetime; write halves live in [`Connections`] so the dispatcher and the
//! executor can borrow them by session id. A `CloseConnection` action shuts
//! the write half and wakes the session task; the read loop is the sole
//! place that reports `ConnectionClosed` back to the driver, so nothing is
//! ever torn down twice.

use std::{collections::HashMap, sync::Arc};

use framepost_proto::{command::reply, frame, ProtocolError};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::{Mutex, Notify, RwLock},
};

use crate::{
    banlist,
    driver::{LogLevel, ServerAction, ServerEvent},
    ServerHandle,
};

/// Lines of the server log returned by GET_LOG.
const LOG_TAIL_LINES: usize = 50;

/// Shared per-session connection state.
///
/// Mirrors the registry keyed by session id instead of username: every
/// accepted socket has an entry here from accept to teardown, whether or not
/// it ever authenticates.
pub struct Connections {
    /// Session id → write half, serialized per session
    writers: RwLock<HashMap<u64, Mutex<OwnedWriteHalf>>>,
    /// Session id → wakeup used to break the session's read loop
    closers: RwLock<HashMap<u64, Arc<Notify>>>,
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

impl Connections {
    /// Create an empty connection table.
    pub fn new() -> Self {
        Self { writers: RwLock::new(HashMap::new()), closers: RwLock::new(HashMap::new()) }
    }

    pub(crate) async fn insert(&self, session_id: u64, writer: OwnedWriteHalf, closer: Arc<Notify>) {
        self.writers.write().await.insert(session_id, Mutex::new(writer));
        self.closers.write().await.insert(session_id, closer);
    }

    /// Write one framed payload to a session.
    ///
    /// Holds only that session's writer lock for the duration of the single
    /// frame write; the registry/driver lock is never held here.
    pub(crate) async fn send_payload(
        &self,
        session_id: u64,
        payload: &str,
    ) -> Result<(), ProtocolError> {
        let writers = self.writers.read().await;
        let Some(writer) = writers.get(&session_id) else {
            return Err(ProtocolError::ConnectionClosed);
        };

        let mut writer = writer.lock().await;
        frame::write_frame(&mut *writer, payload.as_bytes()).await
    }

    /// Close one session: shut the write half and wake its read loop.
    ///
    /// Idempotent; the session task calls this again on its own way out.
    pub(crate) async fn close_session(&self, session_id: u64) {
        if let Some(writer) = self.writers.write().await.remove(&session_id) {
            use tokio::io::AsyncWriteExt;
            let mut writer = writer.into_inner();
            let _ = writer.shutdown().await;
        }

        if let Some(closer) = self.closers.read().await.get(&session_id) {
            closer.notify_one();
        }
    }

    pub(crate) async fn remove(&self, session_id: u64) {
        self.writers.write().await.remove(&session_id);
        self.closers.write().await.remove(&session_id);
    }

    /// Close every session (server shutdown path).
    pub(crate) async fn close_all(&self) {
        let ids: Vec<u64> = self.writers.read().await.keys().copied().collect();
        for session_id in ids {
            self.close_session(session_id).await;
        }
    }
}

/// Execute driver actions against the real world.
///
/// Called after the driver lock is released; the only lock re-taken here is
/// the brief one for reading queue capacity on an enqueue.
pub(crate) async fn execute_actions(handle: &ServerHandle, actions: Vec<ServerAction>) {
    for action in actions {
        match action {
            ServerAction::SendFrame { session_id, payload } => {
                if let Err(err) = handle.connections.send_payload(session_id, &payload).await {
                    tracing::debug!("write to session {session_id} failed: {err}");
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::debug!("closing session {session_id}: {reason}");
                handle.connections.close_session(session_id).await;
            },

            ServerAction::Enqueue { message, reply_to } => {
                let capacity = handle.driver.lock().await.config().max_queue_size();
                let outcome = handle.dispatcher.enqueue(message, capacity);

                if let Some(sender) = reply_to {
                    let payload = if outcome.accepted() {
                        reply::ok("Message sent")
                    } else {
                        reply::error("Failed to send message: queue full or dispatcher error")
                    };
                    if let Err(err) = handle.connections.send_payload(sender, &payload).await {
                        tracing::debug!("send reply to session {sender} failed: {err}");
                    }
                }
            },

            ServerAction::PersistBanlist { users } => {
                if let Err(err) = banlist::save(&handle.banlist_path, &users) {
                    tracing::error!("Cannot write banlist file: {err}");
                }
            },

            ServerAction::SendLogTail { session_id } => {
                let payload = log_tail_payload(&handle.log_path).await;
                if let Err(err) = handle.connections.send_payload(session_id, &payload).await {
                    tracing::debug!("log tail write to session {session_id} failed: {err}");
                }
            },

            ServerAction::Shutdown { reason } => {
                tracing::info!("Shutdown requested: {reason}");
                let _ = handle.shutdown.send(true);
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

/// Build the GET_LOG reply: the last [`LOG_TAIL_LINES`] lines of the log.
async fn log_tail_payload(path: &std::path::Path) -> String {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!("Cannot open log file {}: {err}", path.display());
            return reply::error("Log file not available");
        },
    };

    let lines: Vec<&str> = contents.lines().collect();
    if lines.is_empty() {
        return reply::log("Log file is empty");
    }

    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    reply::log(&lines[start..].join("\n"))
}

/// Run one session: feed frames to the driver until the socket dies or the
/// server closes it.
pub(crate) async fn run_session(
    handle: ServerHandle,
    session_id: u64,
    stream: TcpStream,
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string());
    let (mut reader, writer) = stream.into_split();

    let closer = Arc::new(Notify::new());
    handle.connections.insert(session_id, writer, Arc::clone(&closer)).await;

    tracing::info!("New connection accepted (session: {session_id}, peer: {peer})");

    let actions = handle
        .driver
        .lock()
        .await
        .process_event(ServerEvent::ConnectionAccepted { session_id });
    execute_actions(&handle, actions).await;

    let mut reason = "connection closed".to_string();

    loop {
        tokio::select! {
            _ = closer.notified() => {
                reason = "closed by server".to_string();
                break;
            },
            result = frame::read_frame(&mut reader) => match result {
                Ok(payload) => {
                    let actions = handle
                        .driver
                        .lock()
                        .await
                        .process_event(ServerEvent::FrameReceived { session_id, payload });
                    execute_actions(&handle, actions).await;
                },
                Err(err) if err.is_disconnect() => {
                    if err != ProtocolError::ConnectionClosed {
                        tracing::warn!("session {session_id} read error: {err}");
                        reason = format!("read error: {err}");
                    }
                    break;
                },
                Err(err) => {
                    // The codec left the stream aligned on the next frame;
                    // drop this one, keep the session.
                    tracing::warn!("session {session_id} sent an invalid frame: {err}");
                },
            },
        }
    }

    handle.connections.close_session(session_id).await;
    handle.connections.remove(session_id).await;

    let actions = handle
        .driver
        .lock()
        .await
        .process_event(ServerEvent::ConnectionClosed { session_id, reason });
    execute_actions(&handle, actions).await;
}

/// Heartbeat supervisor: PING round, grace delay, eviction sweep, repeat.
///
/// Both driver calls only snapshot and mutate state; every socket write
/// happens here, after the driver lock is back down.
pub(crate) async fn heartbeat_loop(
    handle: ServerHandle,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tracing::info!("Heartbeat supervisor started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let interval = handle.driver.lock().await.config().heartbeat_interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = shutdown.changed() => break,
        }

        let actions = handle.driver.lock().await.process_event(ServerEvent::HeartbeatPing);
        execute_actions(&handle, actions).await;

        let delay = handle.driver.lock().await.config().heartbeat_check_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown.changed() => break,
        }

        let actions = handle.driver.lock().await.process_event(ServerEvent::HeartbeatSweep);
        execute_actions(&handle, actions).await;
    }

    tracing::info!("Heartbeat supervisor stopped");
}
