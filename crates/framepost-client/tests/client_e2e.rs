//! Client library against a real server on loopback.

use std::time::Duration;

use framepost_client::{connect, ClientError, ServerEvent};
use framepost_server::{Server, ServerHandle, ServerRuntimeConfig};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (String, ServerHandle, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let config = ServerRuntimeConfig {
        port: 0,
        console: false,
        log_path: dir.path().join("server.log"),
        banlist_path: dir.path().join("banlist"),
        ..Default::default()
    };

    let server = Server::bind(config).await.unwrap();
    let addr = format!("127.0.0.1:{}", server.local_addr().unwrap().port());
    let handle = server.handle();
    tokio::spawn(server.run());

    (addr, handle, dir)
}

async fn next_event(connection: &mut framepost_client::Connection) -> ServerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, connection.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

#[tokio::test]
async fn handshake_success_and_rejection() {
    let (addr, _handle, _dir) = start_server().await;

    let alice = connect(&addr, "alice").await.unwrap();
    assert_eq!(alice.username(), "alice");

    // Same username again is rejected at connect time
    let err = connect(&addr, "alice").await.unwrap_err();
    match err {
        ClientError::Rejected { reason } => assert_eq!(reason, "Username already exists"),
        other => panic!("expected rejection, got {other}"),
    }
}

#[tokio::test]
async fn send_receive_and_reply_round_trip() {
    let (addr, _handle, _dir) = start_server().await;

    let mut alice = connect(&addr, "alice").await.unwrap();
    let mut bob = connect(&addr, "bob").await.unwrap();

    alice.send_message("bob", "Hi", "hello there").await.unwrap();
    assert_eq!(next_event(&mut alice).await, ServerEvent::Ok("Message sent".to_string()));

    match next_event(&mut bob).await {
        ServerEvent::Message(message) => {
            assert_eq!(message.from, "alice");
            assert_eq!(message.subject, "Hi");
            assert_eq!(message.body, "hello there");
            assert!(message.timestamp_secs > 0);
        },
        other => panic!("expected delivery, got {other:?}"),
    }

    // The delivery landed in bob's store; reply by index
    assert_eq!(bob.unread_count(), 1);
    let stored = bob.read_message(0).unwrap();
    assert_eq!(stored.subject, "Hi");

    bob.reply(0, "hi back").await.unwrap();
    assert_eq!(next_event(&mut bob).await, ServerEvent::Ok("Message sent".to_string()));

    match next_event(&mut alice).await {
        ServerEvent::Message(message) => {
            assert_eq!(message.from, "bob");
            assert_eq!(message.subject, "Re: Hi");
            assert_eq!(message.body, "hi back");
        },
        other => panic!("expected reply delivery, got {other:?}"),
    }

    assert!(matches!(bob.reply(42, "x").await, Err(ClientError::UnknownMessage(42))));
}

#[tokio::test]
async fn roster_and_log_queries() {
    let (addr, _handle, dir) = start_server().await;

    std::fs::write(dir.path().join("server.log"), "line one\nline two\n").unwrap();

    let mut alice = connect(&addr, "alice").await.unwrap();
    let _bob = connect(&addr, "bob").await.unwrap();

    alice.list_users().await.unwrap();
    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::Users(vec!["alice".to_string(), "bob".to_string()])
    );

    alice.get_log().await.unwrap();
    assert_eq!(next_event(&mut alice).await, ServerEvent::Log("line one\nline two".to_string()));
}

#[tokio::test]
async fn local_validation_rejects_before_sending() {
    let (addr, _handle, _dir) = start_server().await;

    let alice = connect(&addr, "alice").await.unwrap();

    assert!(matches!(
        alice.send_message("no spaces allowed", "s", "b").await,
        Err(ClientError::InvalidMessage("invalid recipient"))
    ));
    assert!(matches!(
        alice.send_message("bob", "", "b").await,
        Err(ClientError::InvalidMessage("invalid subject"))
    ));
    assert!(matches!(
        alice.send_message("bob", "s", "").await,
        Err(ClientError::InvalidMessage("empty body"))
    ));
}

#[tokio::test]
async fn kick_surfaces_error_then_closed() {
    let (addr, handle, _dir) = start_server().await;

    let mut bob = connect(&addr, "bob").await.unwrap();

    assert!(handle.kick("bob").await);

    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::Error("You have been kicked by admin".to_string())
    );
    assert_eq!(next_event(&mut bob).await, ServerEvent::Closed);
}

#[tokio::test]
async fn disconnect_unregisters_on_the_server() {
    let (addr, handle, _dir) = start_server().await;

    let alice = connect(&addr, "alice").await.unwrap();
    assert_eq!(handle.client_count().await, 1);

    alice.disconnect().await;

    // The server processes the DISCONNECT shortly after
    for _ in 0..50 {
        if handle.client_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server still lists the client after disconnect");
}
