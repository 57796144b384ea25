//! Client connection: handshake, then a sender/listener split.
//!
//! [`connect`] performs the TCP connect and the CONNECT handshake inline, so
//! a rejection (taken username, ban) surfaces as an error from the call
//! rather than an event. After the handshake one I/O task owns the socket:
//! outgoing commands arrive over a channel, inbound frames are decoded into
//! [`ServerEvent`]s, heartbeat PINGs are answered in place without reaching
//! the application.

use std::sync::{Arc, Mutex};

use framepost_proto::{
    command::{self, DEFAULT_MAX_SUBJECT_LENGTH, DEFAULT_MAX_USERNAME_LENGTH},
    frame, ProtocolError,
};
use tokio::{net::TcpStream, sync::mpsc};

use crate::{
    error::ClientError,
    event::{self, Inbound, ServerEvent},
    store::{self, MessageStore, StoredMessage},
};

/// Connect to a server and claim a username.
///
/// # Errors
///
/// - [`ClientError::Connect`] if the TCP connect fails
/// - [`ClientError::Rejected`] if the server answers the handshake with an
///   ERROR (invalid/taken username, banned)
/// - [`ClientError::Transport`] / [`ClientError::Protocol`] for wire trouble
pub async fn connect(addr: &str, username: &str) -> Result<Connection, ClientError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|err| ClientError::Connect(format!("cannot reach {addr}: {err}")))?;

    let hello = command::build("CONNECT", &[username]);
    frame::write_frame(&mut stream, hello.as_bytes()).await?;

    let reply = frame::read_frame(&mut stream).await?;
    let cmd = command::parse(&reply)
        .ok_or_else(|| ClientError::Protocol("empty handshake reply".to_string()))?;

    match cmd.name.as_str() {
        "OK" => {},
        "ERROR" => {
            return Err(ClientError::Rejected {
                reason: cmd
                    .args
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "Connection refused".to_string()),
            });
        },
        other => {
            return Err(ClientError::Protocol(format!("unexpected handshake reply: {other}")));
        },
    }

    let (to_server, outgoing) = mpsc::channel::<String>(32);
    let (events_tx, events) = mpsc::channel::<ServerEvent>(64);
    let store = Arc::new(Mutex::new(MessageStore::new()));

    tokio::spawn(run_connection(stream, outgoing, events_tx, Arc::clone(&store)));

    tracing::info!("Connected as {username}");

    Ok(Connection { username: username.to_string(), to_server, events, store })
}

/// A live, authenticated connection.
#[derive(Debug)]
pub struct Connection {
    username: String,
    to_server: mpsc::Sender<String>,
    events: mpsc::Receiver<ServerEvent>,
    store: Arc<Mutex<MessageStore>>,
}

impl Connection {
    /// Username this connection authenticated as.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Next server event. `None` after [`ServerEvent::Closed`] has been
    /// delivered and the channel drained.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Send a message. Validated locally before anything hits the wire.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidMessage`] for a bad recipient, overlong
    ///   subject, or empty body
    /// - [`ClientError::NotConnected`] once the connection is gone
    pub async fn send_message(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ClientError> {
        if to != command::BROADCAST_RECIPIENT
            && !command::is_valid_username(to, DEFAULT_MAX_USERNAME_LENGTH)
        {
            return Err(ClientError::InvalidMessage("invalid recipient"));
        }

        if !command::is_valid_subject(subject, DEFAULT_MAX_SUBJECT_LENGTH) {
            return Err(ClientError::InvalidMessage("invalid subject"));
        }

        if !command::is_valid_body(body) {
            return Err(ClientError::InvalidMessage("empty body"));
        }

        self.send_command(command::build("SEND", &[to, subject, body])).await
    }

    /// Ask for the roster; the answer arrives as [`ServerEvent::Users`].
    pub async fn list_users(&self) -> Result<(), ClientError> {
        self.send_command(command::build("LIST_USERS", &[])).await
    }

    /// Ask for the server log tail; the answer arrives as
    /// [`ServerEvent::Log`].
    pub async fn get_log(&self) -> Result<(), ClientError> {
        self.send_command(command::build("GET_LOG", &[])).await
    }

    /// Reply to a stored message by index: goes back to its sender with a
    /// `Re: ` subject.
    pub async fn reply(&self, index: u64, body: &str) -> Result<(), ClientError> {
        let (to, subject) = {
            let store = self.store.lock().expect("store lock poisoned");
            let message = store.get(index).ok_or(ClientError::UnknownMessage(index))?;
            (message.from.clone(), store::reply_subject(&message.subject))
        };

        self.send_message(&to, &subject, body).await
    }

    /// Number of unread messages.
    pub fn unread_count(&self) -> usize {
        self.store.lock().expect("store lock poisoned").unread_count()
    }

    /// Snapshot of the unread messages, oldest first.
    pub fn unread(&self) -> Vec<StoredMessage> {
        self.store.lock().expect("store lock poisoned").unread().to_vec()
    }

    /// Read a stored message by index, marking it read.
    pub fn read_message(&self, index: u64) -> Option<StoredMessage> {
        self.store.lock().expect("store lock poisoned").read_message(index)
    }

    /// Announce departure and close the connection.
    pub async fn disconnect(self) {
        let _ = self.to_server.send(command::build("DISCONNECT", &[])).await;
        // Dropping self closes the command channel; the I/O task flushes the
        // DISCONNECT already queued ahead of the close, then exits.
    }

    async fn send_command(&self, payload: String) -> Result<(), ClientError> {
        self.to_server.send(payload).await.map_err(|_| ClientError::NotConnected)
    }
}

/// Bridge the socket and the channels until either side goes away.
///
/// The read half gets its own task: a frame read must never be cancelled
/// mid-frame by an outgoing command, or the stream desynchronizes. Auto-PONGs
/// cross from the reader to the writer over a small internal channel.
async fn run_connection(
    stream: TcpStream,
    mut outgoing: mpsc::Receiver<String>,
    events: mpsc::Sender<ServerEvent>,
    store: Arc<Mutex<MessageStore>>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (pong_tx, mut pongs) = mpsc::channel::<String>(4);

    let reader_events = events.clone();
    let mut reader_task = tokio::spawn(async move {
        loop {
            match frame::read_frame(&mut reader).await {
                Ok(payload) => match event::decode(&payload) {
                    Some(Inbound::Ping) => {
                        tracing::debug!("PING received, PONG queued");
                        if pong_tx.send(command::build("PONG", &[])).await.is_err() {
                            break;
                        }
                    },
                    Some(Inbound::Event(event)) => {
                        if let ServerEvent::Message(message) = &event {
                            store.lock().expect("store lock poisoned").insert(message.clone());
                        }
                        if reader_events.send(event).await.is_err() {
                            break;
                        }
                    },
                    None => tracing::debug!("unrecognized frame dropped"),
                },
                Err(err) if err.is_disconnect() => {
                    if err != ProtocolError::ConnectionClosed {
                        tracing::warn!("read failed: {err}");
                    }
                    let _ = reader_events.send(ServerEvent::Closed).await;
                    break;
                },
                Err(err) => {
                    // Stream is still aligned; drop the frame and keep
                    // listening.
                    tracing::warn!("invalid frame dropped: {err}");
                },
            }
        }
    });

    loop {
        let payload = tokio::select! {
            // Reader finished: the server closed on us (Closed already
            // delivered) or the application hung up on the event stream.
            _ = &mut reader_task => break,
            payload = pongs.recv() => payload,
            payload = outgoing.recv() => payload,
        };

        let Some(payload) = payload else {
            // Connection handle dropped; nobody is listening anymore.
            reader_task.abort();
            break;
        };

        if let Err(err) = frame::write_frame(&mut writer, payload.as_bytes()).await {
            tracing::warn!("write failed: {err}");
            reader_task.abort();
            let _ = events.send(ServerEvent::Closed).await;
            break;
        }
    }

    tracing::info!("Connection closed");
}
