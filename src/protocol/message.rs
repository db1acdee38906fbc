//! BitTorrent protocol messages
//!
//! Defines all message types used in the BitTorrent protocol.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, error, trace};

use crate::error::{Result, TorrentError};

/// Largest block we request
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Largest frame accepted from a peer, excluding the length prefix.
/// Covers a full block plus header and bitfields of very large torrents.
pub const MAX_FRAME_LEN: usize = 1024 * 1024 + 9;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            _ => {
                error!("Invalid message ID: {}", value);
                Err(TorrentError::protocol_error(format!("Invalid message ID: {}", value)))
            }
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Port { listen_port: u16 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::Port { .. } => Some(MessageId::Port),
            Message::KeepAlive => None,
        }
    }

    /// Human readable name, for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "keep-alive",
            Message::Choke => "choke",
            Message::Unchoke => "unchoke",
            Message::Interested => "interested",
            Message::NotInterested => "not interested",
            Message::Have { .. } => "have",
            Message::Bitfield { .. } => "bitfield",
            Message::Request { .. } => "request",
            Message::Piece { .. } => "piece",
            Message::Cancel { .. } => "cancel",
            Message::Port { .. } => "port",
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
            Message::Port { .. } => 3,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing {} message", self.name());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        if let Some(id) = self.message_id() {
            buf.put_u8(id as u8);
        }

        match self {
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Port { listen_port } => buf.put_u16(*listen_port),
            _ => {}
        }

        buf.to_vec()
    }

    /// Decode a frame body, i.e. everything after the length prefix.
    /// An empty body is a keep-alive.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let Some((&id, payload)) = frame.split_first() else {
            return Ok(Message::KeepAlive);
        };

        let message_id = MessageId::try_from(id)?;
        let mut buf = payload;

        let expect_len = |len: usize| -> Result<()> {
            if payload.len() == len {
                Ok(())
            } else {
                Err(TorrentError::protocol_error(format!(
                    "{:?} payload must be {} bytes, got {}",
                    message_id,
                    len,
                    payload.len()
                )))
            }
        };

        let message = match message_id {
            MessageId::Choke => {
                expect_len(0)?;
                Message::Choke
            }
            MessageId::Unchoke => {
                expect_len(0)?;
                Message::Unchoke
            }
            MessageId::Interested => {
                expect_len(0)?;
                Message::Interested
            }
            MessageId::NotInterested => {
                expect_len(0)?;
                Message::NotInterested
            }
            MessageId::Have => {
                expect_len(4)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: payload.to_vec() },
            MessageId::Request | MessageId::Cancel => {
                expect_len(12)?;
                let index = buf.get_u32();
                let begin = buf.get_u32();
                let length = buf.get_u32();
                if message_id == MessageId::Request {
                    Message::Request { index, begin, length }
                } else {
                    Message::Cancel { index, begin, length }
                }
            }
            MessageId::Piece => {
                if payload.len() < 8 {
                    return Err(TorrentError::protocol_error(format!(
                        "Piece payload must be at least 8 bytes, got {}",
                        payload.len()
                    )));
                }
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf.to_vec() }
            }
            MessageId::Port => {
                expect_len(2)?;
                Message::Port { listen_port: buf.get_u16() }
            }
        };

        debug!("Decoded {} message ({} byte frame)", message.name(), frame.len());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interested_wire_form() {
        assert_eq!(Message::Interested.serialize(), vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_keepalive_wire_form() {
        assert_eq!(Message::KeepAlive.serialize(), vec![0, 0, 0, 0]);
        assert_eq!(Message::from_frame(&[]).unwrap(), Message::KeepAlive);
    }

    #[test]
    fn test_request_wire_form() {
        let bytes = Message::Request { index: 1, begin: 16384, length: 16384 }.serialize();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]
        );
    }

    #[test]
    fn test_piece_from_frame() {
        let frame = [7, 0, 0, 0, 3, 0, 0, 0x40, 0, 0xaa, 0xbb];
        match Message::from_frame(&frame).unwrap() {
            Message::Piece { index, begin, block } => {
                assert_eq!(index, 3);
                assert_eq!(begin, 16384);
                assert_eq!(block, vec![0xaa, 0xbb]);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_piece_frame_too_short() {
        assert!(matches!(
            Message::from_frame(&[7, 0, 0, 0, 3, 0, 0]),
            Err(TorrentError::ProtocolError { .. })
        ));
    }

    #[test]
    fn test_bitfield_from_frame() {
        assert_eq!(
            Message::from_frame(&[5, 0b1010_0000, 0xff]).unwrap(),
            Message::Bitfield { bitfield: vec![0b1010_0000, 0xff] }
        );
    }

    #[test]
    fn test_fixed_size_payloads_checked() {
        assert!(Message::from_frame(&[1, 0]).is_err());
        assert!(Message::from_frame(&[4, 0, 0, 1]).is_err());
        assert!(Message::from_frame(&[6, 0, 0, 0, 1]).is_err());
        assert!(Message::from_frame(&[9, 0x1a]).is_err());
    }

    #[test]
    fn test_serialized_frames_decode() {
        let messages = vec![
            Message::Unchoke,
            Message::Have { piece_index: 42 },
            Message::Cancel { index: 1, begin: 2, length: 3 },
            Message::Port { listen_port: 6881 },
            Message::Piece { index: 10, begin: 0, block: vec![1, 2, 3] },
        ];
        for message in messages {
            let bytes = message.serialize();
            assert_eq!(bytes.len(), 4 + message.length() as usize);
            assert_eq!(Message::from_frame(&bytes[4..]).unwrap(), message);
        }
    }

    #[test]
    fn test_message_id_from_u8() {
        assert_eq!(MessageId::try_from(0).unwrap(), MessageId::Choke);
        assert_eq!(MessageId::try_from(7).unwrap(), MessageId::Piece);
        assert!(matches!(
            MessageId::try_from(20),
            Err(TorrentError::ProtocolError { .. })
        ));
    }
}
