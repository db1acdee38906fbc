//! Wire protocol utilities
//!
//! Framed reads and writes over any async byte stream. Reads tell a clean
//! close between frames apart from a close in the middle of one.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::{Message, MAX_FRAME_LEN};
use crate::error::{Result, TorrentError};

/// Reading side of the wire protocol
#[allow(async_fn_in_trait)]
pub trait WireReader {
    /// Read one frame body (without the length prefix). Empty for keep-alives.
    async fn read_frame(&mut self) -> Result<Vec<u8>>;

    /// Read and decode one message
    async fn read_message(&mut self) -> Result<Message>;

    /// Read the 68-byte handshake reply
    async fn read_handshake(&mut self) -> Result<Handshake>;
}

/// Writing side of the wire protocol
#[allow(async_fn_in_trait)]
pub trait WireWriter {
    /// Write a message to the stream
    async fn write_message(&mut self, message: &Message) -> Result<()>;

    /// Write a handshake to the stream
    async fn write_handshake(&mut self, handshake: &Handshake) -> Result<()>;
}

/// Read until `buf` is full or the stream ends, returning the bytes read
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| TorrentError::network_error(format!("Read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

impl<R: AsyncRead + Unpin> WireReader for R {
    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut length_buf = [0u8; 4];
        match fill(self, &mut length_buf).await? {
            0 => return Err(TorrentError::network_error("Connection closed by peer")),
            4 => {}
            n => return Err(TorrentError::truncated(4, n)),
        }

        let length = u32::from_be_bytes(length_buf) as usize;
        if length > MAX_FRAME_LEN {
            warn!("Peer sent oversized frame: {} bytes", length);
            return Err(TorrentError::protocol_error(format!(
                "Frame of {} bytes exceeds limit of {}",
                length, MAX_FRAME_LEN
            )));
        }

        let mut payload = vec![0u8; length];
        let received = fill(self, &mut payload).await?;
        if received < length {
            debug!("Stream closed after {} of {} frame bytes", received, length);
            return Err(TorrentError::truncated(length, received));
        }

        trace!("Read frame of {} bytes", length);
        Ok(payload)
    }

    async fn read_message(&mut self) -> Result<Message> {
        let frame = self.read_frame().await?;
        Message::from_frame(&frame)
    }

    async fn read_handshake(&mut self) -> Result<Handshake> {
        let mut buf = [0u8; HANDSHAKE_LEN];
        let received = fill(self, &mut buf).await?;
        if received < HANDSHAKE_LEN {
            return Err(TorrentError::handshake_error(format!(
                "Short handshake: received {} of {} bytes",
                received, HANDSHAKE_LEN
            )));
        }
        Handshake::deserialize(&buf)
    }
}

impl<W: AsyncWrite + Unpin> WireWriter for W {
    async fn write_message(&mut self, message: &Message) -> Result<()> {
        trace!("Sending {} message", message.name());
        write_all_flush(self, &message.serialize()).await
    }

    async fn write_handshake(&mut self, handshake: &Handshake) -> Result<()> {
        write_all_flush(self, &handshake.serialize()).await
    }
}

async fn write_all_flush<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer
        .write_all(data)
        .await
        .map_err(|e| TorrentError::network_error(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TorrentError::network_error(format!("Flush failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_messages_in_sequence() {
        let mut data = Vec::new();
        data.extend_from_slice(&Message::KeepAlive.serialize());
        data.extend_from_slice(&Message::Unchoke.serialize());
        data.extend_from_slice(&Message::Have { piece_index: 7 }.serialize());

        let mut reader = data.as_slice();
        assert_eq!(reader.read_message().await.unwrap(), Message::KeepAlive);
        assert_eq!(reader.read_message().await.unwrap(), Message::Unchoke);
        assert_eq!(reader.read_message().await.unwrap(), Message::Have { piece_index: 7 });
        assert!(matches!(
            reader.read_message().await,
            Err(TorrentError::NetworkError { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        // Piece frame declaring 16393 bytes, closed after 100
        let mut data = (16393u32).to_be_bytes().to_vec();
        data.push(7);
        data.extend_from_slice(&[0u8; 99]);

        let mut reader = data.as_slice();
        match reader.read_frame().await {
            Err(TorrentError::TruncatedMessage { expected, received }) => {
                assert_eq!(expected, 16393);
                assert_eq!(received, 100);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_length_prefix() {
        let mut reader: &[u8] = &[0, 0];
        assert!(matches!(
            reader.read_frame().await,
            Err(TorrentError::TruncatedMessage { expected: 4, received: 2 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let data = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut reader = &data[..];
        assert!(matches!(
            reader.read_frame().await,
            Err(TorrentError::ProtocolError { .. })
        ));
    }

    #[tokio::test]
    async fn test_short_handshake() {
        let bytes = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        let mut reader = &bytes[..40];
        assert!(matches!(
            reader.read_handshake().await,
            Err(TorrentError::HandshakeError { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_handshake() {
        let mut out: Vec<u8> = Vec::new();
        let handshake = Handshake::new([3u8; 20], [4u8; 20]);
        out.write_handshake(&handshake).await.unwrap();
        out.write_message(&Message::Interested).await.unwrap();
        assert_eq!(out.len(), HANDSHAKE_LEN + 5);

        let mut reader = out.as_slice();
        assert_eq!(reader.read_handshake().await.unwrap(), handshake);
        assert_eq!(reader.read_message().await.unwrap(), Message::Interested);
    }
}
