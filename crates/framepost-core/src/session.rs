//! Per-connection session state machine.
//!
//! Every accepted socket gets a `Session`. Only CONNECT moves it forward;
//! everything else either requires the Authenticated state or is a
//! session-layer no-op.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────┐  CONNECT ok   ┌───────────────┐  any handler  ┌───────────────┐
//! │ Accepted │──────────────>│ Authenticated │──────────────>│ Authenticated │
//! └──────────┘               └───────────────┘               └───────────────┘
//!      │                            │
//!      │ CONNECT fail (ban) / close │ DISCONNECT / I/O fail / kick / timeout
//!      ▼                            ▼
//!  ┌────────┐                  ┌────────┐
//!  │ Closed │                  │ Closed │
//!  └────────┘                  └────────┘
//! ```
//!
//! The heartbeat bookkeeping (last-pong, waiting-for-pong) intentionally does
//! NOT live here: it belongs to the registry entry so a single registry lock
//! covers it.

use crate::error::SessionError;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, no username bound yet
    Accepted,
    /// CONNECT succeeded; username is bound and registered
    Authenticated,
    /// Session over (disconnect, I/O failure, kick, ban, or timeout)
    Closed,
}

/// State for one TCP connection on the server side.
///
/// Pure data, no I/O. The driver owns one per live socket and consults it
/// before dispatching verbs.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    username: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session in [`SessionState::Accepted`].
    pub fn new() -> Self {
        Self { state: SessionState::Accepted, username: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bound username. `None` until CONNECT succeeds.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// True once CONNECT has succeeded and the session is still open.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Bind a username, transitioning Accepted → Authenticated.
    ///
    /// The caller is responsible for having already won the registry insert;
    /// invariant: a session with a bound username appears exactly once in the
    /// registry.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] unless the session is in Accepted
    pub fn bind(&mut self, username: String) -> Result<(), SessionError> {
        if self.state != SessionState::Accepted {
            return Err(SessionError::InvalidState { state: self.state, operation: "bind" });
        }

        self.username = Some(username);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Mark the session closed. Idempotent.
    ///
    /// Keeps the username so cleanup paths can still name the user in logs.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}
