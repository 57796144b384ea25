//! Property tests for the frame codec and command grammar.

use bytes::BytesMut;
use framepost_proto::{command, frame};
use proptest::prelude::*;

proptest! {
    #[test]
    fn frame_round_trip(payload in proptest::collection::vec(any::<u8>(), 1..4096)) {
        let mut wire = BytesMut::new();
        frame::encode(&payload, &mut wire).expect("should encode");

        let decoded = frame::decode(&wire).expect("should decode");
        prop_assert_eq!(&decoded[..], &payload[..]);
    }

    #[test]
    fn grammar_round_trip(
        verb in "[A-Z_]{1,12}",
        args in proptest::collection::vec("[^;\n\u{0}-\u{8}]{0,64}", 0..6),
    ) {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let payload = command::build(&verb, &arg_refs);

        let parsed = command::parse(payload.as_bytes()).expect("nonempty payload parses");
        prop_assert_eq!(parsed.name, verb);
        prop_assert_eq!(parsed.args, args);
    }

    #[test]
    fn sanitize_is_idempotent(input in any::<String>()) {
        let once = command::sanitize(&input);
        prop_assert_eq!(command::sanitize(&once), once.clone());
        prop_assert_eq!(once.chars().count(), input.chars().count());
    }

    #[test]
    fn timestamp_round_trip(secs in any::<u64>()) {
        let wire = command::format_unix_secs(secs);
        prop_assert_eq!(command::parse_unix_secs(&wire), Some(secs));
    }
}

#[tokio::test]
async fn framed_grammar_end_to_end() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    let payload = command::build("CONNECT", &["alice"]);
    frame::write_frame(&mut client, payload.as_bytes()).await.unwrap();

    let received = frame::read_frame(&mut server).await.unwrap();
    let cmd = command::parse(&received).unwrap();

    assert_eq!(cmd.verb(), Some(command::Verb::Connect));
    assert_eq!(cmd.args, vec!["alice"]);
}
