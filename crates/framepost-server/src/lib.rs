//! Framepost production server.
//!
//! TCP messaging server: length-prefixed frames carry a delimited command
//! grammar; authenticated users exchange store-and-forward messages through a
//! bounded queue; a heartbeat supervisor evicts dead peers; an operator
//! console drives kicks, bans, and runtime configuration.
//!
//! # Architecture
//!
//! The crate wraps the pure, action-based [`ServerDriver`] with Tokio glue:
//!
//! - [`ServerDriver`]: event→action orchestrator (no I/O, unit-testable with
//!   a virtual clock)
//! - [`Server`]: accept loop, session tasks, and cooperative shutdown
//! - [`Dispatcher`]: bounded queue plus the single delivery worker
//! - the heartbeat supervisor and the operator console, one task each
//!
//! Concurrent tasks at runtime: one accept loop, one dispatcher worker, one
//! heartbeat supervisor, one operator console, and one session task per
//! connection (bounded by a semaphore sized from `THREAD_POOL_SIZE`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod admin;
pub mod banlist;
mod dispatcher;
mod driver;
mod error;
mod runtime;
mod system_env;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
use framepost_core::{ConfigError, RuntimeConfig};
use runtime::Connections;
pub use system_env::SystemEnv;
use tokio::{
    net::TcpSocket,
    sync::{watch, Notify},
};

/// Server lifecycle state, observable through [`ServerHandle::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not started
    Off,
    /// Binding the listen socket, loading the ban list
    Starting,
    /// Accepting connections
    Running,
    /// Shutdown in progress: sockets closing, workers draining
    Stopping,
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Listen port (0 picks an ephemeral port, useful in tests)
    pub port: u16,
    /// Connection cap; also the listen backlog
    pub max_connections: usize,
    /// Server log file, also served by GET_LOG
    pub log_path: PathBuf,
    /// Ban list file
    pub banlist_path: PathBuf,
    /// Delivery worker settings
    pub dispatcher: DispatcherConfig,
    /// Initial runtime-tunable configuration
    pub config: RuntimeConfig,
    /// Run the operator console on stdin
    pub console: bool,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_connections: 100,
            log_path: PathBuf::from("server.log"),
            banlist_path: PathBuf::from("banlist"),
            dispatcher: DispatcherConfig::default(),
            config: RuntimeConfig::new(),
            console: true,
        }
    }
}

/// Cloneable handle to a running server.
///
/// The operator console is built entirely on this surface, and integration
/// tests use the same one, so everything the console can do is testable
/// without stdin.
#[derive(Clone)]
pub struct ServerHandle {
    pub(crate) driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) connections: Arc<Connections>,
    pub(crate) shutdown: Arc<watch::Sender<bool>>,
    /// Nudges the accept loop to re-read THREAD_POOL_SIZE
    pool_changed: Arc<Notify>,
    lifecycle: watch::Receiver<LifecycleState>,
    started_at: Instant,
    port: u16,
    pub(crate) log_path: Arc<PathBuf>,
    pub(crate) banlist_path: Arc<PathBuf>,
}

/// Snapshot for the operator's `/stats`.
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// Listen port
    pub port: u16,
    /// Time since the server started
    pub uptime: Duration,
    /// Registered usernames, sorted
    pub clients: Vec<String>,
    /// SEND commands accepted
    pub messages_received: u64,
    /// Messages delivered by the dispatcher
    pub messages_sent: u64,
    /// Messages waiting in the queue
    pub queued: usize,
}

impl ServerStats {
    /// Messages (received + sent) per minute of uptime.
    pub fn messages_per_minute(&self) -> f64 {
        let secs = self.uptime.as_secs();
        if secs == 0 {
            return 0.0;
        }
        (self.messages_received + self.messages_sent) as f64 / (secs as f64 / 60.0)
    }
}

impl ServerHandle {
    /// Request cooperative shutdown. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Registered usernames, sorted.
    pub async fn usernames(&self) -> Vec<String> {
        self.driver.lock().await.usernames()
    }

    /// Number of registered users.
    pub async fn client_count(&self) -> usize {
        self.driver.lock().await.client_count()
    }

    /// Kick a user. Returns `false` if they are not connected.
    pub async fn kick(&self, username: &str) -> bool {
        let actions = self.driver.lock().await.kick(username);
        match actions {
            Some(actions) => {
                runtime::execute_actions(self, actions).await;
                true
            },
            None => false,
        }
    }

    /// Ban a connected user (kick + persist). Returns `false` if they are not
    /// connected; nothing is banned then.
    pub async fn ban(&self, username: &str) -> bool {
        let actions = self.driver.lock().await.ban(username);
        match actions {
            Some(actions) => {
                runtime::execute_actions(self, actions).await;
                true
            },
            None => false,
        }
    }

    /// Remove a user from the ban list. Returns `false` if they were not
    /// banned (the file is left untouched).
    pub async fn unban(&self, username: &str) -> bool {
        let (removed, actions) = self.driver.lock().await.unban(username);
        runtime::execute_actions(self, actions).await;
        removed
    }

    /// Operator broadcast, delivered immediately. Returns the client count.
    pub async fn broadcast(&self, text: &str) -> usize {
        let actions = self.driver.lock().await.admin_broadcast(text);
        let count = actions.len();
        runtime::execute_actions(self, actions).await;
        count
    }

    /// Operator direct message. Returns `false` if the user is offline.
    pub async fn send_direct(&self, username: &str, text: &str) -> bool {
        let action = self.driver.lock().await.admin_send(username, text);
        match action {
            Some(action) => {
                runtime::execute_actions(self, vec![action]).await;
                true
            },
            None => false,
        }
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> ServerStats {
        let (clients, messages_received) = {
            let driver = self.driver.lock().await;
            (driver.usernames(), driver.messages_received())
        };

        ServerStats {
            port: self.port,
            uptime: self.started_at.elapsed(),
            clients,
            messages_received,
            messages_sent: self.dispatcher.messages_sent(),
            queued: self.dispatcher.len(),
        }
    }

    /// Write one runtime config key.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.driver.lock().await.config_mut().set(key, value)?;

        if key == "THREAD_POOL_SIZE" {
            // Wake the accept loop even if it is parked waiting for a
            // session slot; it re-reads the key before the next accept.
            self.pool_changed.notify_one();
        }

        Ok(())
    }

    /// All runtime config keys with current values.
    pub async fn config_entries(&self) -> Vec<(&'static str, String)> {
        self.driver.lock().await.config().list_all()
    }

    /// Reset the runtime config to defaults.
    pub async fn reset_config(&self) {
        self.driver.lock().await.config_mut().reset();
        self.pool_changed.notify_one();
    }
}

/// Production server: listen socket plus the shared runtime state.
pub struct Server {
    listener: tokio::net::TcpListener,
    handle: ServerHandle,
    lifecycle_tx: watch::Sender<LifecycleState>,
    console: bool,
}

impl Server {
    /// Bind the listen socket and assemble the runtime.
    ///
    /// Loads the ban list, binds with address reuse, and builds the driver.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] if the ban list file exists but is unreadable
    /// - [`ServerError::Transport`] if bind or listen fails
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let (lifecycle_tx, lifecycle_rx) = watch::channel(LifecycleState::Starting);

        tracing::info!("Starting server on port {}", config.port);

        let banned = banlist::load(&config.banlist_path)
            .map_err(|err| ServerError::Config(format!("failed to load banlist: {err}")))?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .map_err(|err| ServerError::Transport(format!("Failed to bind on port {}: {err}", config.port)))?;

        let backlog = config.max_connections.clamp(1, 1024) as u32;
        let listener = socket
            .listen(backlog)
            .map_err(|err| ServerError::Transport(format!("Failed to listen: {err}")))?;

        let port = listener.local_addr()?.port();

        let driver = ServerDriver::new(
            SystemEnv::new(),
            config.config.clone(),
            DriverConfig { max_connections: config.max_connections },
            banned,
        );

        let (shutdown_tx, _) = watch::channel(false);

        let handle = ServerHandle {
            driver: Arc::new(tokio::sync::Mutex::new(driver)),
            dispatcher: Arc::new(Dispatcher::new(config.dispatcher.clone())),
            connections: Arc::new(Connections::new()),
            shutdown: Arc::new(shutdown_tx),
            pool_changed: Arc::new(Notify::new()),
            lifecycle: lifecycle_rx,
            started_at: Instant::now(),
            port,
            log_path: Arc::new(config.log_path),
            banlist_path: Arc::new(config.banlist_path),
        };

        Ok(Self { listener, handle, lifecycle_tx, console: config.console })
    }

    /// Address the listen socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for the operator console, tests, and shutdown.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Run until shutdown is requested, then tear down cooperatively.
    ///
    /// Shutdown sequence: stop accepting, close the listen socket, close all
    /// session sockets (their read loops exit), wake and join the dispatcher
    /// and the heartbeat supervisor, return. No process exit happens here;
    /// `main` observes the clean return.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self { listener, handle, lifecycle_tx, console } = self;

        lifecycle_tx.send_replace(LifecycleState::Running);
        tracing::info!("Server started successfully");

        let dispatcher_task = tokio::spawn(Arc::clone(&handle.dispatcher).run(
            Arc::clone(&handle.driver),
            Arc::clone(&handle.connections),
            SystemEnv::new(),
            handle.shutdown.subscribe(),
        ));

        let heartbeat_task =
            tokio::spawn(runtime::heartbeat_loop(handle.clone(), handle.shutdown.subscribe()));

        if console {
            tokio::spawn(admin::command_loop(handle.clone()));
        }

        let session_slots = Arc::new(tokio::sync::Semaphore::new(0));
        let mut granted_permits = 0usize;
        let next_session_id = AtomicU64::new(1);

        let mut shutdown_rx = handle.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // THREAD_POOL_SIZE is runtime-tunable like its siblings: re-read
            // it every pass. Growth adds permits immediately; shrinking
            // retires permits as running sessions release them (a permit in
            // use is never revoked).
            let desired = handle.driver.lock().await.config().thread_pool_size();
            if desired > granted_permits {
                session_slots.add_permits(desired - granted_permits);
                granted_permits = desired;
            } else if desired < granted_permits {
                granted_permits -= session_slots.forget_permits(granted_permits - desired);
            }

            // Bound concurrent session tasks before accepting; beyond this,
            // backpressure is the OS accept backlog.
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = handle.pool_changed.notified() => continue,
                permit = Arc::clone(&session_slots).acquire_owned() => {
                    permit.expect("session semaphore is never closed")
                },
            };

            let accepted = tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _addr)) => {
                    let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(runtime::run_session(handle.clone(), session_id, stream, permit));
                },
                Err(err) => {
                    tracing::error!("Failed to accept a client: {err}");
                },
            }
        }

        lifecycle_tx.send_replace(LifecycleState::Stopping);
        tracing::info!("Stopping server...");

        drop(listener);
        handle.connections.close_all().await;

        let _ = dispatcher_task.await;
        let _ = heartbeat_task.await;

        lifecycle_tx.send_replace(LifecycleState::Off);
        tracing::info!("Server stopped");

        Ok(())
    }
}
