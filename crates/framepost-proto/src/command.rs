//! Delimited command grammar.
//!
//! Frame payloads carry text commands of the form:
//!
//! ```text
//! VERB;arg1;arg2;…\n
//! ```
//!
//! A trailing newline is tolerated and stripped on parse, and always present
//! on build. Arguments may not themselves contain the delimiter; user-supplied
//! text goes through [`sanitize`] before it is stored or forwarded.
//!
//! The grammar is shared verbatim by both peers: the client builds the same
//! shapes the server parses, and vice versa.

/// Field delimiter within a command payload.
pub const DELIMITER: char = ';';

/// Recipient name that fans a SEND out to every registered user.
pub const BROADCAST_RECIPIENT: &str = "all";

/// Default username length limit (the server's is runtime-tunable).
pub const DEFAULT_MAX_USERNAME_LENGTH: usize = 32;

/// Default subject length limit (the server's is runtime-tunable).
pub const DEFAULT_MAX_SUBJECT_LENGTH: usize = 100;

/// Inbound verbs the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Claim a username and authenticate the session
    Connect,
    /// Leave; the server unregisters and closes the socket
    Disconnect,
    /// Store-and-forward a message (or broadcast with recipient `all`)
    Send,
    /// Liveness probe; answered with a PONG frame
    Ping,
    /// Heartbeat answer; refreshes the session's last-pong instant
    Pong,
    /// Ask for the roster of registered usernames
    ListUsers,
    /// Ask for the tail of the server log
    GetLog,
}

impl Verb {
    /// Wire name of the verb.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Send => "SEND",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::ListUsers => "LIST_USERS",
            Self::GetLog => "GET_LOG",
        }
    }

    /// Look a verb up by its wire name. Case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CONNECT" => Some(Self::Connect),
            "DISCONNECT" => Some(Self::Disconnect),
            "SEND" => Some(Self::Send),
            "PING" => Some(Self::Ping),
            "PONG" => Some(Self::Pong),
            "LIST_USERS" => Some(Self::ListUsers),
            "GET_LOG" => Some(Self::GetLog),
            _ => None,
        }
    }
}

/// A parsed command: raw verb plus its arguments.
///
/// The verb stays a string so an unknown verb can be echoed back in the
/// `Unknown command` reply; [`Command::verb`] resolves the known ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Raw verb field (first delimited segment)
    pub name: String,
    /// Remaining delimited segments
    pub args: Vec<String>,
}

impl Command {
    /// Resolve the verb, if it is one the server knows.
    pub fn verb(&self) -> Option<Verb> {
        Verb::from_name(&self.name)
    }
}

/// Parse a frame payload into a command.
///
/// Returns `None` for an empty payload (the frame is dropped with no
/// response). Payload bytes are decoded lossily as UTF-8; one trailing
/// newline is stripped.
pub fn parse(payload: &[u8]) -> Option<Command> {
    let text = String::from_utf8_lossy(payload);
    let cleaned = text.strip_suffix('\n').unwrap_or(&text);

    if cleaned.is_empty() {
        return None;
    }

    let mut parts = cleaned.split(DELIMITER);
    let name = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();

    Some(Command { name, args })
}

/// Build a command payload: verb, delimited args, trailing newline.
pub fn build(verb: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(
        verb.len() + args.iter().map(|a| a.len() + 1).sum::<usize>() + 1,
    );

    out.push_str(verb);
    for arg in args {
        out.push(DELIMITER);
        out.push_str(arg);
    }
    out.push('\n');

    out
}

/// Server reply constructors.
///
/// One function per reply shape keeps the exact wire strings in one place.
pub mod reply {
    use super::build;

    /// `OK;<message>`
    pub fn ok(message: &str) -> String {
        build("OK", &[message])
    }

    /// `ERROR;<message>`
    pub fn error(message: &str) -> String {
        build("ERROR", &[message])
    }

    /// `MESSAGE;<from>;<subject>;<body>;<unix-seconds>`
    pub fn message(from: &str, subject: &str, body: &str, timestamp_secs: u64) -> String {
        build("MESSAGE", &[from, subject, body, &timestamp_secs.to_string()])
    }

    /// `USERS;u1,u2,…`
    pub fn users(names: &[String]) -> String {
        build("USERS", &[&names.join(",")])
    }

    /// `LOG;<text>`
    pub fn log(text: &str) -> String {
        build("LOG", &[text])
    }

    /// `PING` (framed like every other message)
    pub fn ping() -> String {
        build("PING", &[])
    }

    /// `PONG`
    pub fn pong() -> String {
        build("PONG", &[])
    }
}

/// Replace control characters (except newline and tab) with a single space.
///
/// Applied to user-supplied text before storage or forwarding. Never
/// truncates; length limits are the validators' concern.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() && c != '\n' && c != '\t' { ' ' } else { c })
        .collect()
}

/// Username: nonempty, at most `max_len` chars, `[A-Za-z0-9_]` only.
pub fn is_valid_username(username: &str, max_len: usize) -> bool {
    !username.is_empty()
        && username.chars().count() <= max_len
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Subject: nonempty, at most `max_len` chars.
pub fn is_valid_subject(subject: &str, max_len: usize) -> bool {
    !subject.is_empty() && subject.chars().count() <= max_len
}

/// Body: nonempty. Size is otherwise bounded only by the frame cap.
pub fn is_valid_body(body: &str) -> bool {
    !body.is_empty()
}

/// Render a unix-seconds timestamp for the wire.
pub fn format_unix_secs(secs: u64) -> String {
    secs.to_string()
}

/// Parse a wire timestamp back to unix seconds.
pub fn parse_unix_secs(s: &str) -> Option<u64> {
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_trailing_newline() {
        let cmd = parse(b"CONNECT;alice\n").unwrap();
        assert_eq!(cmd.name, "CONNECT");
        assert_eq!(cmd.args, vec!["alice"]);
        assert_eq!(cmd.verb(), Some(Verb::Connect));
    }

    #[test]
    fn parse_without_newline_is_tolerated() {
        let cmd = parse(b"PONG").unwrap();
        assert_eq!(cmd.name, "PONG");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn parse_empty_payload_drops_frame() {
        assert_eq!(parse(b""), None);
        assert_eq!(parse(b"\n"), None);
    }

    #[test]
    fn parse_keeps_empty_fields() {
        let cmd = parse(b"SEND;;subject;\n").unwrap();
        assert_eq!(cmd.args, vec!["", "subject", ""]);
    }

    #[test]
    fn unknown_verb_keeps_its_name() {
        let cmd = parse(b"FROBNICATE;x\n").unwrap();
        assert_eq!(cmd.verb(), None);
        assert_eq!(cmd.name, "FROBNICATE");
    }

    #[test]
    fn build_appends_newline_after_last_arg() {
        assert_eq!(build("OK", &["Connected as alice"]), "OK;Connected as alice\n");
        assert_eq!(build("PING", &[]), "PING\n");
    }

    #[test]
    fn build_then_parse_round_trips() {
        let payload = build("SEND", &["bob", "Hi", "hello there"]);
        let cmd = parse(payload.as_bytes()).unwrap();

        assert_eq!(cmd.name, "SEND");
        assert_eq!(cmd.args, vec!["bob", "Hi", "hello there"]);
    }

    #[test]
    fn verb_names_round_trip() {
        for verb in [
            Verb::Connect,
            Verb::Disconnect,
            Verb::Send,
            Verb::Ping,
            Verb::Pong,
            Verb::ListUsers,
            Verb::GetLog,
        ] {
            assert_eq!(Verb::from_name(verb.name()), Some(verb));
        }
    }

    #[test]
    fn verb_lookup_is_case_sensitive() {
        assert_eq!(Verb::from_name("connect"), None);
    }

    #[test]
    fn sanitize_replaces_control_chars_keeps_newline_and_tab() {
        assert_eq!(sanitize("a\x00b\x1bc"), "a b c");
        assert_eq!(sanitize("line\nnext\ttab"), "line\nnext\ttab");
        assert_eq!(sanitize("clean text"), "clean text");
    }

    #[test]
    fn username_validation_boundaries() {
        assert!(is_valid_username("alice_99", 32));
        assert!(is_valid_username(&"a".repeat(32), 32));
        assert!(!is_valid_username(&"a".repeat(33), 32));
        assert!(!is_valid_username("", 32));
        assert!(!is_valid_username("al ice", 32));
        assert!(!is_valid_username("al;ce", 32));
        assert!(!is_valid_username("alicé", 32));
    }

    #[test]
    fn subject_validation_boundaries() {
        assert!(is_valid_subject(&"s".repeat(100), 100));
        assert!(!is_valid_subject(&"s".repeat(101), 100));
        assert!(!is_valid_subject("", 100));
    }

    #[test]
    fn body_must_be_nonempty() {
        assert!(is_valid_body("x"));
        assert!(!is_valid_body(""));
    }

    #[test]
    fn timestamp_round_trips_at_second_precision() {
        let t = 1_726_000_042;
        assert_eq!(parse_unix_secs(&format_unix_secs(t)), Some(t));
        assert_eq!(parse_unix_secs("not a number"), None);
    }

    #[test]
    fn reply_shapes() {
        assert_eq!(reply::ok("Message sent"), "OK;Message sent\n");
        assert_eq!(reply::error("Not authenticated"), "ERROR;Not authenticated\n");
        assert_eq!(
            reply::message("alice", "Hi", "hello there", 7),
            "MESSAGE;alice;Hi;hello there;7\n"
        );
        assert_eq!(
            reply::users(&["alice".to_string(), "bob".to_string()]),
            "USERS;alice,bob\n"
        );
        assert_eq!(reply::users(&[]), "USERS;\n");
        assert_eq!(reply::ping(), "PING\n");
        assert_eq!(reply::pong(), "PONG\n");
    }
}
