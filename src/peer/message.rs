use crate::error::{Result, SwarmError};
use bytes::{Buf, BufMut, BytesMut};

/// Address of one block request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub piece_index: u32,
    /// Byte offset within the piece
    pub offset: u32,
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// Framed messages exchanged after the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Zero-length frame
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { block: BlockInfo },
    Piece {
        piece_index: u32,
        offset: u32,
        data: Vec<u8>,
    },
    Cancel { block: BlockInfo },
}

fn protocol_error(msg: impl Into<String>) -> SwarmError {
    SwarmError::ProtocolError(msg.into())
}

impl PeerMessage {
    const CHOKE: u8 = 0;
    const UNCHOKE: u8 = 1;
    const INTERESTED: u8 = 2;
    const NOT_INTERESTED: u8 = 3;
    const HAVE: u8 = 4;
    const BITFIELD: u8 = 5;
    const REQUEST: u8 = 6;
    const PIECE: u8 = 7;
    const CANCEL: u8 = 8;

    /// Serialize with the 4-byte big-endian length prefix
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        match self {
            PeerMessage::KeepAlive => buf.put_u32(0),
            PeerMessage::Choke => Self::put_header(&mut buf, Self::CHOKE, 0),
            PeerMessage::Unchoke => Self::put_header(&mut buf, Self::UNCHOKE, 0),
            PeerMessage::Interested => Self::put_header(&mut buf, Self::INTERESTED, 0),
            PeerMessage::NotInterested => Self::put_header(&mut buf, Self::NOT_INTERESTED, 0),
            PeerMessage::Have { piece_index } => {
                Self::put_header(&mut buf, Self::HAVE, 4);
                buf.put_u32(*piece_index);
            }
            PeerMessage::Bitfield { bitfield } => {
                Self::put_header(&mut buf, Self::BITFIELD, bitfield.len());
                buf.put_slice(bitfield);
            }
            PeerMessage::Request { block } => {
                Self::put_header(&mut buf, Self::REQUEST, 12);
                Self::put_block(&mut buf, block);
            }
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => {
                Self::put_header(&mut buf, Self::PIECE, 8 + data.len());
                buf.put_u32(*piece_index);
                buf.put_u32(*offset);
                buf.put_slice(data);
            }
            PeerMessage::Cancel { block } => {
                Self::put_header(&mut buf, Self::CANCEL, 12);
                Self::put_block(&mut buf, block);
            }
        }

        buf.to_vec()
    }

    fn put_header(buf: &mut BytesMut, id: u8, payload_len: usize) {
        buf.put_u32((1 + payload_len) as u32);
        buf.put_u8(id);
    }

    fn put_block(buf: &mut BytesMut, block: &BlockInfo) {
        buf.put_u32(block.piece_index);
        buf.put_u32(block.offset);
        buf.put_u32(block.length);
    }

    /// Parse the body of one frame (message id + payload, length prefix already stripped)
    pub fn from_frame(mut frame: &[u8]) -> Result<Self> {
        if frame.is_empty() {
            return Ok(PeerMessage::KeepAlive);
        }

        let message_id = frame.get_u8();

        let expect_len = |frame: &[u8], len: usize, name: &str| {
            if frame.len() == len {
                Ok(())
            } else {
                Err(protocol_error(format!(
                    "{} payload of {} bytes, expected {}",
                    name,
                    frame.len(),
                    len
                )))
            }
        };

        match message_id {
            Self::CHOKE => expect_len(frame, 0, "Choke").map(|_| PeerMessage::Choke),
            Self::UNCHOKE => expect_len(frame, 0, "Unchoke").map(|_| PeerMessage::Unchoke),
            Self::INTERESTED => {
                expect_len(frame, 0, "Interested").map(|_| PeerMessage::Interested)
            }
            Self::NOT_INTERESTED => {
                expect_len(frame, 0, "NotInterested").map(|_| PeerMessage::NotInterested)
            }
            Self::HAVE => {
                expect_len(frame, 4, "Have")?;
                Ok(PeerMessage::Have {
                    piece_index: frame.get_u32(),
                })
            }
            Self::BITFIELD => Ok(PeerMessage::Bitfield {
                bitfield: frame.to_vec(),
            }),
            Self::REQUEST => {
                expect_len(frame, 12, "Request")?;
                Ok(PeerMessage::Request {
                    block: BlockInfo::new(frame.get_u32(), frame.get_u32(), frame.get_u32()),
                })
            }
            Self::PIECE => {
                if frame.len() < 8 {
                    return Err(protocol_error("Piece payload shorter than its header"));
                }
                let piece_index = frame.get_u32();
                let offset = frame.get_u32();
                Ok(PeerMessage::Piece {
                    piece_index,
                    offset,
                    data: frame.to_vec(),
                })
            }
            Self::CANCEL => {
                expect_len(frame, 12, "Cancel")?;
                Ok(PeerMessage::Cancel {
                    block: BlockInfo::new(frame.get_u32(), frame.get_u32(), frame.get_u32()),
                })
            }
            other => Err(protocol_error(format!("unknown message id {}", other))),
        }
    }
}
