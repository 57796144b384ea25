//! Length-prefixed frame codec.
//!
//! Every application-level message travels on the wire as:
//!
//! ```text
//! [length: 4 bytes, big endian, unsigned] + [payload: length bytes]
//! ```
//!
//! The codec never interprets payload bytes; the command grammar on top of it
//! lives in [`crate::command`]. Both directions of both peers use this one
//! codec - server-to-client heartbeat PINGs included.
//!
//! # Invariants
//!
//! - Payload length is in `1..=MAX_FRAME_SIZE`. A zero length or a length
//!   above the cap is rejected before any payload allocation.
//! - Writes are all-or-nothing: either the prefix and the whole payload reach
//!   the transport buffer, or the caller gets an error. Partial writes are
//!   never reported as success.
//! - A peer close at any point in a read surfaces as
//!   [`ProtocolError::ConnectionClosed`], never as a partial payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::ProtocolError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Hard cap on a single frame payload (10 MiB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Encode a payload into `dst` as a length-prefixed frame.
///
/// # Errors
///
/// - [`ProtocolError::EmptyPayload`] for a zero-length payload
/// - [`ProtocolError::FrameTooLarge`] above [`MAX_FRAME_SIZE`]
pub fn encode(payload: &[u8], dst: &mut impl BufMut) -> Result<(), ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: payload.len(), max: MAX_FRAME_SIZE });
    }

    // INVARIANT: MAX_FRAME_SIZE (10 MiB) << u32::MAX, so the cast cannot
    // truncate after the cap check above.
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);

    Ok(())
}

/// Decode one frame from a buffer, returning the payload.
///
/// Trailing bytes after the frame are ignored. This is the synchronous
/// counterpart of [`read_frame`] for buffer-level use and tests.
///
/// # Errors
///
/// - [`ProtocolError::FrameTruncated`] if the buffer is shorter than the
///   prefix claims
/// - [`ProtocolError::EmptyPayload`] / [`ProtocolError::FrameTooLarge`] for
///   an invalid length prefix
pub fn decode(mut buf: &[u8]) -> Result<Bytes, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::FrameTruncated { expected: LENGTH_PREFIX_SIZE, actual: buf.len() });
    }

    let len = buf.get_u32() as usize;
    check_length(len)?;

    if buf.len() < len {
        return Err(ProtocolError::FrameTruncated { expected: len, actual: buf.len() });
    }

    Ok(Bytes::copy_from_slice(&buf[..len]))
}

/// Read exactly one frame from `reader`.
///
/// Reads the 4-byte prefix, validates the length, then reads exactly that
/// many payload bytes.
///
/// Invalid-length errors leave the stream aligned on the next frame
/// boundary: a zero length has no payload, and an oversized payload is
/// drained (through a fixed scratch buffer, never allocated whole) before
/// the error returns. Callers may drop the bad frame and keep reading.
///
/// # Errors
///
/// - [`ProtocolError::ConnectionClosed`] on EOF or reset, whether between
///   frames or mid-frame (draining included)
/// - [`ProtocolError::EmptyPayload`] / [`ProtocolError::FrameTooLarge`] for
///   an invalid length prefix; the session can continue
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as usize;

    if len == 0 {
        return Err(ProtocolError::EmptyPayload);
    }

    if len > MAX_FRAME_SIZE {
        drain(reader, len).await?;
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;

    Ok(payload.freeze())
}

/// Discard exactly `remaining` payload bytes to resynchronize the stream.
async fn drain<R>(reader: &mut R, mut remaining: usize) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 8192];

    while remaining > 0 {
        let n = remaining.min(scratch.len());
        reader.read_exact(&mut scratch[..n]).await?;
        remaining -= n;
    }

    Ok(())
}

/// Write one frame to `writer`, all-or-nothing.
///
/// The prefix and payload are staged in one buffer and flushed with a single
/// `write_all`, so a slow peer never observes a prefix without its payload.
/// A broken pipe surfaces as [`ProtocolError::ConnectionClosed`]; no signal
/// is ever raised (Tokio sockets do not deliver SIGPIPE).
///
/// # Errors
///
/// - [`ProtocolError::EmptyPayload`] / [`ProtocolError::FrameTooLarge`] from
///   encoding
/// - [`ProtocolError::ConnectionClosed`] if the peer went away
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    encode(payload, &mut buf)?;

    writer.write_all(&buf).await?;
    writer.flush().await?;

    Ok(())
}

fn check_length(len: usize) -> Result<(), ProtocolError> {
    if len == 0 {
        return Err(ProtocolError::EmptyPayload);
    }

    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let payload = b"CONNECT;alice\n";

        let mut wire = BytesMut::new();
        encode(payload, &mut wire).unwrap();

        assert_eq!(wire.len(), LENGTH_PREFIX_SIZE + payload.len());
        assert_eq!(&wire[..4], &(payload.len() as u32).to_be_bytes());

        let decoded = decode(&wire).unwrap();
        assert_eq!(&decoded[..], payload);
    }

    #[test]
    fn encode_rejects_empty_payload() {
        let mut wire = BytesMut::new();
        assert_eq!(encode(b"", &mut wire), Err(ProtocolError::EmptyPayload));
        assert!(wire.is_empty());
    }

    #[test]
    fn frame_at_cap_accepted_one_over_rejected() {
        let payload = vec![b'x'; MAX_FRAME_SIZE];
        let mut wire = BytesMut::new();
        assert!(encode(&payload, &mut wire).is_ok());

        let payload = vec![b'x'; MAX_FRAME_SIZE + 1];
        let mut wire = BytesMut::new();
        assert_eq!(
            encode(&payload, &mut wire),
            Err(ProtocolError::FrameTooLarge { size: MAX_FRAME_SIZE + 1, max: MAX_FRAME_SIZE })
        );
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut wire = BytesMut::new();
        wire.put_u32(100);
        wire.put_slice(b"short");

        assert_eq!(
            decode(&wire),
            Err(ProtocolError::FrameTruncated { expected: 100, actual: 5 })
        );
    }

    #[test]
    fn decode_rejects_oversized_prefix_without_payload() {
        let mut wire = BytesMut::new();
        wire.put_u32((MAX_FRAME_SIZE + 1) as u32);

        assert_eq!(
            decode(&wire),
            Err(ProtocolError::FrameTooLarge { size: MAX_FRAME_SIZE + 1, max: MAX_FRAME_SIZE })
        );
    }

    #[tokio::test]
    async fn read_frame_from_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"SEND;bob;Hi;hello there\n").await.unwrap();

        let payload = read_frame(&mut server).await.unwrap();
        assert_eq!(&payload[..], b"SEND;bob;Hi;hello there\n");
    }

    #[tokio::test]
    async fn read_frame_reports_close_between_frames() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);

        assert_eq!(read_frame(&mut server).await, Err(ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn read_frame_reports_close_mid_frame() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        // Prefix claims 64 bytes but the peer hangs up after 3.
        client.write_all(&64u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await, Err(ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn read_frame_drains_oversized_payload_and_resyncs() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let oversized = MAX_FRAME_SIZE + 1;
        let writer = tokio::spawn(async move {
            client.write_all(&(oversized as u32).to_be_bytes()).await.unwrap();
            client.write_all(&vec![0u8; oversized]).await.unwrap();
            write_frame(&mut client, b"PING\n").await.unwrap();
        });

        assert_eq!(
            read_frame(&mut server).await,
            Err(ProtocolError::FrameTooLarge { size: oversized, max: MAX_FRAME_SIZE })
        );

        // The stream is aligned on the next frame
        assert_eq!(&read_frame(&mut server).await.unwrap()[..], b"PING\n");

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn read_frame_zero_length_leaves_stream_aligned() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        write_frame(&mut client, b"PONG\n").await.unwrap();

        assert_eq!(read_frame(&mut server).await, Err(ProtocolError::EmptyPayload));
        assert_eq!(&read_frame(&mut server).await.unwrap()[..], b"PONG\n");
    }

    #[tokio::test]
    async fn read_frame_reports_close_while_draining() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        // Oversized claim, then the peer hangs up mid-payload.
        client.write_all(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes()).await.unwrap();
        client.write_all(b"partial").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await, Err(ProtocolError::ConnectionClosed));
    }
}
