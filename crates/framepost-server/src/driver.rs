//! Server driver.
//!
//! Pure event→action orchestrator tying together the session table, the user
//! registry (with its heartbeat bookkeeping), the ban set, and the runtime
//! configuration. No I/O happens here: the runtime feeds events in, the
//! driver hands actions back, and the runtime executes them against real
//! sockets. Tests drive the same surface with a virtual clock.
//!
//! One driver instance sits behind one async mutex in the runtime. That
//! single point of serialization is what the registry invariants lean on:
//! CONNECT's uniqueness check and insert happen under the same lock, and a
//! PONG is visible to the next heartbeat sweep as soon as its handler
//! returns.

use std::collections::{HashMap, HashSet};

use framepost_core::{
    env::Environment,
    message::Message,
    registry::UserRegistry,
    session::Session,
    RuntimeConfig,
};
use framepost_proto::command::{
    self, reply, BROADCAST_RECIPIENT,
};

/// Driver-level configuration fixed at startup.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections; further accepts are closed immediately
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 100 }
    }
}

/// Events the runtime feeds into the driver.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Session id assigned by the runtime
        session_id: u64,
    },

    /// A frame payload arrived from a connection
    FrameReceived {
        /// Session that sent the frame
        session_id: u64,
        /// Raw frame payload (codec already stripped the length prefix)
        payload: bytes::Bytes,
    },

    /// A connection's read loop ended (peer close or I/O failure)
    ConnectionClosed {
        /// Session that went away
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Heartbeat step one: PING everyone, mark waiting
    HeartbeatPing,

    /// Heartbeat step two: evict sessions whose last PONG is too old
    HeartbeatSweep,
}

/// Actions the driver produces for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Write a frame payload to a session's socket
    SendFrame {
        /// Target session
        session_id: u64,
        /// Command payload (framing applied by the transport)
        payload: String,
    },

    /// Close a session's socket and wake its read loop
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason, for the log
        reason: String,
    },

    /// Hand a message to the routing dispatcher
    Enqueue {
        /// The message to queue
        message: Message,
        /// For a direct SEND, the sender session awaiting OK or queue-full
        /// ERROR. `None` for broadcast fan-out (the OK was already sent).
        reply_to: Option<u64>,
    },

    /// Rewrite the ban list file from this snapshot
    PersistBanlist {
        /// Complete ban set at the time of the mutation
        users: Vec<String>,
    },

    /// Send the server log tail to a session
    SendLogTail {
        /// Session that asked for the log
        session_id: u64,
    },

    /// Initiate cooperative server shutdown
    Shutdown {
        /// Reason, for the log
        reason: String,
    },

    /// Emit a log record
    Log {
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

fn log(level: LogLevel, message: impl Into<String>) -> ServerAction {
    ServerAction::Log { level, message: message.into() }
}

/// Action-based server driver.
pub struct ServerDriver<E: Environment> {
    /// Environment (time)
    env: E,
    /// Runtime-tunable configuration
    config: RuntimeConfig,
    /// Fixed limits
    driver_config: DriverConfig,
    /// Per-connection state (session id → session)
    sessions: HashMap<u64, Session>,
    /// Authoritative username → session mapping with heartbeat state
    registry: UserRegistry<E::Instant>,
    /// Usernames forbidden to connect
    banned: HashSet<String>,
    /// SEND commands accepted from authenticated sessions
    messages_received: u64,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver. `banned` is the ban list loaded at startup.
    pub fn new(
        env: E,
        config: RuntimeConfig,
        driver_config: DriverConfig,
        banned: HashSet<String>,
    ) -> Self {
        Self {
            env,
            config,
            driver_config,
            sessions: HashMap::new(),
            registry: UserRegistry::new(),
            banned,
            messages_received: 0,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the single entry point for the runtime's event sources
    /// (accept loop, session read loops, heartbeat supervisor).
    pub fn process_event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, payload } => {
                self.handle_frame_received(session_id, &payload)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, &reason)
            },
            ServerEvent::HeartbeatPing => self.handle_heartbeat_ping(),
            ServerEvent::HeartbeatSweep => self.handle_heartbeat_sweep(),
        }
    }

    fn handle_connection_accepted(&mut self, session_id: u64) -> Vec<ServerAction> {
        if self.sessions.len() >= self.driver_config.max_connections {
            return vec![
                ServerAction::CloseConnection {
                    session_id,
                    reason: "max connections exceeded".to_string(),
                },
                log(LogLevel::Warn, format!("connection {session_id} rejected: server full")),
            ];
        }

        self.sessions.insert(session_id, Session::new());

        vec![log(LogLevel::Debug, format!("connection {session_id} accepted"))]
    }

    fn handle_frame_received(&mut self, session_id: u64, payload: &[u8]) -> Vec<ServerAction> {
        if !self.sessions.contains_key(&session_id) {
            // Frame raced with a disconnect; nothing to answer to.
            return vec![log(
                LogLevel::Debug,
                format!("frame from unknown session {session_id} dropped"),
            )];
        }

        let Some(cmd) = command::parse(payload) else {
            // Empty payload: drop the frame with no response.
            return vec![log(
                LogLevel::Debug,
                format!("empty frame from session {session_id} dropped"),
            )];
        };

        use framepost_proto::Verb;

        match cmd.verb() {
            Some(Verb::Connect) => self.handle_connect(session_id, &cmd.args),
            Some(Verb::Disconnect) => self.disconnect(session_id, "client disconnect"),
            Some(Verb::Send) => self.handle_send(session_id, &cmd.args),
            Some(Verb::Ping) => {
                // Liveness probe; answered regardless of authentication.
                vec![ServerAction::SendFrame { session_id, payload: reply::pong() }]
            },
            Some(Verb::Pong) => self.handle_pong(session_id),
            Some(Verb::ListUsers) => self.handle_list_users(session_id),
            Some(Verb::GetLog) => self.handle_get_log(session_id),
            None => vec![
                log(LogLevel::Warn, format!("Unknown command: {}", cmd.name)),
                ServerAction::SendFrame {
                    session_id,
                    payload: reply::error(&format!("Unknown command: {}", cmd.name)),
                },
            ],
        }
    }

    fn handle_connect(&mut self, session_id: u64, args: &[String]) -> Vec<ServerAction> {
        // Malformed CONNECT is dropped silently.
        let Some(raw_username) = args.first() else {
            return vec![log(
                LogLevel::Warn,
                format!("malformed CONNECT from session {session_id} dropped"),
            )];
        };

        let username = command::sanitize(raw_username);

        if self.sessions.get(&session_id).is_some_and(Session::is_authenticated) {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Already connected"),
            }];
        }

        if !command::is_valid_username(&username, self.config.max_username_length()) {
            return vec![
                log(LogLevel::Warn, format!("invalid username rejected: {username}")),
                ServerAction::SendFrame { session_id, payload: reply::error("Invalid username") },
            ];
        }

        if self.banned.contains(&username) {
            let mut actions = vec![
                log(LogLevel::Warn, format!("banned user tried to connect: {username}")),
                ServerAction::SendFrame {
                    session_id,
                    payload: reply::error("You are banned from this server"),
                },
            ];
            actions.extend(self.disconnect(session_id, "banned user"));
            return actions;
        }

        // Uniqueness check and insert are one operation under the driver
        // lock: two racing CONNECTs for the same name get exactly one winner.
        if !self.registry.register(&username, session_id, self.env.now()) {
            return vec![
                log(LogLevel::Warn, format!("username already taken: {username}")),
                ServerAction::SendFrame {
                    session_id,
                    payload: reply::error("Username already exists"),
                },
            ];
        }

        let bound = self
            .sessions
            .get_mut(&session_id)
            .is_some_and(|session| session.bind(username.clone()).is_ok());

        if !bound {
            // Unreachable given the authenticated check above; back out the
            // registry entry rather than leave the two views disagreeing.
            self.registry.unregister(&username);
            return vec![log(
                LogLevel::Error,
                format!("session {session_id} rejected bind for {username}"),
            )];
        }

        vec![
            log(LogLevel::Info, format!("New client: {username}")),
            ServerAction::SendFrame {
                session_id,
                payload: reply::ok(&format!("Connected as {username}")),
            },
        ]
    }

    fn handle_send(&mut self, session_id: u64, args: &[String]) -> Vec<ServerAction> {
        let Some(from) = self.sessions.get(&session_id).and_then(|s| s.username()) else {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Not authenticated"),
            }];
        };
        let from = from.to_string();

        if args.len() < 3 {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Malformed message: missing fields"),
            }];
        }

        // Counts every SEND from an authenticated session, validated or not.
        self.messages_received += 1;

        let to = command::sanitize(&args[0]);
        let subject = command::sanitize(&args[1]);
        let body = command::sanitize(&args[2]);

        let max_subject = self.config.max_subject_length();
        if !command::is_valid_subject(&subject, max_subject) {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error(&format!("Subject too long (max {max_subject} chars)")),
            }];
        }

        if !command::is_valid_body(&body) {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Body is empty"),
            }];
        }

        let timestamp_secs = self.env.wall_clock_secs();

        if to == BROADCAST_RECIPIENT {
            let mut actions = vec![log(LogLevel::Info, format!("Broadcast from {from}"))];

            // One message per registered user except the sender; each enqueue
            // stands alone, and the reply does not depend on them.
            for recipient in self.registry.usernames() {
                if recipient != from {
                    actions.push(ServerAction::Enqueue {
                        message: Message {
                            from: from.clone(),
                            to: recipient,
                            subject: subject.clone(),
                            body: body.clone(),
                            timestamp_secs,
                        },
                        reply_to: None,
                    });
                }
            }

            actions.push(ServerAction::SendFrame {
                session_id,
                payload: reply::ok("Broadcast sent"),
            });
            return actions;
        }

        if self.registry.session_for(&to).is_none() {
            return vec![
                log(LogLevel::Warn, format!("unknown recipient {to} (from {from})")),
                ServerAction::SendFrame {
                    session_id,
                    payload: reply::error(&format!(
                        "User '{to}' does not exist or is offline"
                    )),
                },
            ];
        }

        vec![ServerAction::Enqueue {
            message: Message { from, to, subject, body, timestamp_secs },
            reply_to: Some(session_id),
        }]
    }

    fn handle_pong(&mut self, session_id: u64) -> Vec<ServerAction> {
        let Some(username) = self.registry.username_for(session_id).map(str::to_string) else {
            // PONG from an unauthenticated socket is a no-op.
            return Vec::new();
        };

        self.registry.record_pong(&username, self.env.now());

        vec![log(LogLevel::Debug, format!("PONG received from {username}"))]
    }

    fn handle_list_users(&self, session_id: u64) -> Vec<ServerAction> {
        if !self.is_authenticated(session_id) {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Not authenticated"),
            }];
        }

        vec![ServerAction::SendFrame { session_id, payload: reply::users(&self.usernames()) }]
    }

    fn handle_get_log(&self, session_id: u64) -> Vec<ServerAction> {
        if !self.is_authenticated(session_id) {
            return vec![ServerAction::SendFrame {
                session_id,
                payload: reply::error("Not authenticated"),
            }];
        }

        vec![ServerAction::SendLogTail { session_id }]
    }

    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        if !self.sessions.contains_key(&session_id) {
            // Already torn down by a kick, ban, or timeout.
            return Vec::new();
        }

        self.disconnect(session_id, reason)
    }

    fn handle_heartbeat_ping(&mut self) -> Vec<ServerAction> {
        let pinged = self.registry.mark_all_waiting();
        let mut actions = Vec::with_capacity(pinged.len() + 1);

        actions.push(log(LogLevel::Debug, format!("PING sent to {} client(s)", pinged.len())));

        // Snapshot taken above; the runtime performs the writes after this
        // returns, outside the driver lock.
        for (_, session_id) in pinged {
            actions.push(ServerAction::SendFrame { session_id, payload: reply::ping() });
        }

        actions
    }

    fn handle_heartbeat_sweep(&mut self) -> Vec<ServerAction> {
        let timeout = self.config.heartbeat_timeout();
        let expired = self.registry.expired(self.env.now(), timeout);
        let mut actions = Vec::new();

        for (username, session_id) in expired {
            actions.push(log(
                LogLevel::Warn,
                format!("Client timeout: {username} (no PONG within {}s)", timeout.as_secs()),
            ));
            actions.extend(self.disconnect(session_id, "heartbeat timeout"));
        }

        actions
    }

    /// Run the disconnect path for a session: close the session state, remove
    /// the registry entry, close the socket. Safe to call twice.
    fn disconnect(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        if let Some(mut session) = self.sessions.remove(&session_id) {
            session.close();
        }

        let username = self.registry.unregister_session(session_id);

        let mut actions = Vec::new();

        if let Some(username) = &username {
            actions.push(log(LogLevel::Info, format!("Client disconnected: {username}")));
        }

        actions.push(ServerAction::CloseConnection {
            session_id,
            reason: reason.to_string(),
        });

        if username.is_some()
            && self.config.auto_stop_when_no_clients()
            && self.registry.is_empty()
        {
            actions.push(ServerAction::Shutdown {
                reason: "last client disconnected".to_string(),
            });
        }

        actions
    }

    // === Operator console surface ===

    /// Kick a user: error frame, then the disconnect path.
    ///
    /// Returns `None` if the user is not connected.
    pub fn kick(&mut self, username: &str) -> Option<Vec<ServerAction>> {
        let session_id = self.registry.session_for(username)?;

        let mut actions = vec![ServerAction::SendFrame {
            session_id,
            payload: reply::error("You have been kicked by admin"),
        }];
        actions.extend(self.disconnect(session_id, "kicked by admin"));

        Some(actions)
    }

    /// Ban a connected user: error frame, disconnect, persist the ban.
    ///
    /// Returns `None` if the user is not connected (nothing is banned then;
    /// the ban path always pairs with the kick).
    pub fn ban(&mut self, username: &str) -> Option<Vec<ServerAction>> {
        let session_id = self.registry.session_for(username)?;

        self.banned.insert(username.to_string());

        let mut actions = vec![ServerAction::SendFrame {
            session_id,
            payload: reply::error("You have been banned by admin"),
        }];
        actions.extend(self.disconnect(session_id, "banned by admin"));
        actions.push(ServerAction::PersistBanlist { users: self.ban_snapshot() });

        Some(actions)
    }

    /// Remove a user from the ban list.
    ///
    /// Returns `(false, [])` for a user who was not banned; the file is not
    /// rewritten in that case.
    pub fn unban(&mut self, username: &str) -> (bool, Vec<ServerAction>) {
        if !self.banned.remove(username) {
            return (false, Vec::new());
        }

        (true, vec![ServerAction::PersistBanlist { users: self.ban_snapshot() }])
    }

    /// Immediate operator broadcast, bypassing the dispatcher queue.
    pub fn admin_broadcast(&self, text: &str) -> Vec<ServerAction> {
        let payload = reply::message("SERVER", "Announcement", text, 0);

        self.registry
            .sessions()
            .into_iter()
            .map(|(_, session_id)| ServerAction::SendFrame {
                session_id,
                payload: payload.clone(),
            })
            .collect()
    }

    /// Immediate operator direct message. `None` if the user is offline.
    pub fn admin_send(&self, username: &str, text: &str) -> Option<ServerAction> {
        let session_id = self.registry.session_for(username)?;

        Some(ServerAction::SendFrame {
            session_id,
            payload: reply::message("SERVER", "Private Message", text, 0),
        })
    }

    // === Shared queries ===

    /// Resolve a recipient for delivery: their session id, if registered.
    pub fn session_for(&self, username: &str) -> Option<u64> {
        self.registry.session_for(username)
    }

    /// Registered usernames, sorted.
    pub fn usernames(&self) -> Vec<String> {
        let mut names = self.registry.usernames();
        names.sort();
        names
    }

    /// Number of registered users.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// SEND commands accepted so far.
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Check the ban set.
    pub fn is_banned(&self, username: &str) -> bool {
        self.banned.contains(username)
    }

    /// Runtime configuration, read side.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runtime configuration, write side (operator `/set` and `/reset`).
    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    fn is_authenticated(&self, session_id: u64) -> bool {
        self.sessions.get(&session_id).is_some_and(Session::is_authenticated)
    }

    fn ban_snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.banned.iter().cloned().collect();
        users.sort();
        users
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("sessions", &self.sessions.len())
            .field("registered", &self.registry.len())
            .field("banned", &self.banned.len())
            .finish()
    }
}
