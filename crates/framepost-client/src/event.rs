//! Server events: the client's user-facing surface.
//!
//! The listener task decodes every inbound frame into a [`ServerEvent`] and
//! hands it to the application over a channel. PING never reaches the
//! application; the listener answers it itself.

use framepost_proto::command::{self, Command};

/// A message delivered to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Sender username (or `SERVER` for operator messages)
    pub from: String,
    /// Subject line
    pub subject: String,
    /// Message body
    pub body: String,
    /// Server-side unix-seconds timestamp (0 for operator messages)
    pub timestamp_secs: u64,
}

/// Events the server can produce, as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Positive acknowledgment of the last command
    Ok(String),
    /// Error reply, or an unsolicited error (kick, ban, undeliverable)
    Error(String),
    /// A message addressed to this client
    Message(IncomingMessage),
    /// Roster reply to LIST_USERS
    Users(Vec<String>),
    /// Server log tail reply to GET_LOG
    Log(String),
    /// The connection is gone; no further events will arrive
    Closed,
}

/// Everything a frame can decode to, including the session-layer PING the
/// listener consumes internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
    Event(ServerEvent),
    Ping,
}

/// Decode a frame payload. `None` for frames the client does not understand
/// (they are dropped, matching the server's treatment of unknown verbs).
pub(crate) fn decode(payload: &[u8]) -> Option<Inbound> {
    let Command { name, args } = command::parse(payload)?;

    let inbound = match name.as_str() {
        "MESSAGE" if args.len() >= 4 => {
            // A body containing the delimiter was split across fields;
            // reassemble everything between subject and timestamp.
            let timestamp_secs =
                command::parse_unix_secs(args.last().expect("len checked")).unwrap_or(0);
            let body = args[2..args.len() - 1].join(";");

            Inbound::Event(ServerEvent::Message(IncomingMessage {
                from: args[0].clone(),
                subject: args[1].clone(),
                body,
                timestamp_secs,
            }))
        },
        "OK" => Inbound::Event(ServerEvent::Ok(
            args.first().cloned().unwrap_or_else(|| "Operation successful".to_string()),
        )),
        "ERROR" => Inbound::Event(ServerEvent::Error(
            args.first().cloned().unwrap_or_else(|| "Unknown error".to_string()),
        )),
        "USERS" if !args.is_empty() => {
            let users = args[0]
                .split(',')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            Inbound::Event(ServerEvent::Users(users))
        },
        "LOG" if !args.is_empty() => {
            // Log lines may legitimately contain the delimiter
            Inbound::Event(ServerEvent::Log(args.join(";")))
        },
        "PING" => Inbound::Ping,
        _ => return None,
    };

    Some(inbound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message() {
        let inbound = decode(b"MESSAGE;alice;Hi;hello there;1726000042\n").unwrap();

        assert_eq!(
            inbound,
            Inbound::Event(ServerEvent::Message(IncomingMessage {
                from: "alice".to_string(),
                subject: "Hi".to_string(),
                body: "hello there".to_string(),
                timestamp_secs: 1_726_000_042,
            }))
        );
    }

    #[test]
    fn decode_message_reassembles_delimited_body() {
        let inbound = decode(b"MESSAGE;alice;Hi;a;b;c;1726000042\n").unwrap();

        match inbound {
            Inbound::Event(ServerEvent::Message(msg)) => {
                assert_eq!(msg.body, "a;b;c");
                assert_eq!(msg.timestamp_secs, 1_726_000_042);
            },
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decode_ok_and_error_with_defaults() {
        assert_eq!(
            decode(b"OK;Message sent\n"),
            Some(Inbound::Event(ServerEvent::Ok("Message sent".to_string())))
        );
        assert_eq!(
            decode(b"OK\n"),
            Some(Inbound::Event(ServerEvent::Ok("Operation successful".to_string())))
        );
        assert_eq!(
            decode(b"ERROR\n"),
            Some(Inbound::Event(ServerEvent::Error("Unknown error".to_string())))
        );
    }

    #[test]
    fn decode_users_handles_empty_roster() {
        assert_eq!(
            decode(b"USERS;alice,bob\n"),
            Some(Inbound::Event(ServerEvent::Users(vec![
                "alice".to_string(),
                "bob".to_string()
            ])))
        );
        assert_eq!(decode(b"USERS;\n"), Some(Inbound::Event(ServerEvent::Users(Vec::new()))));
    }

    #[test]
    fn decode_log_keeps_delimiters() {
        assert_eq!(
            decode(b"LOG;line one\nline;two\n"),
            Some(Inbound::Event(ServerEvent::Log("line one\nline;two".to_string())))
        );
    }

    #[test]
    fn decode_ping_is_internal() {
        assert_eq!(decode(b"PING\n"), Some(Inbound::Ping));
    }

    #[test]
    fn unknown_frames_are_dropped() {
        assert_eq!(decode(b"WAT;x\n"), None);
        assert_eq!(decode(b"MESSAGE;too;few\n"), None);
        assert_eq!(decode(b""), None);
    }
}
