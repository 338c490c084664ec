use crate::error::{Result, SwarmError};

pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// 1 + 19 + 8 + 20 + 20
pub const HANDSHAKE_LEN: usize = 68;

/// Handshake message for peer wire protocol
/// Format: <pstrlen><pstr><reserved><info_hash><peer_id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_LEN);
        buf.push(PROTOCOL_STRING.len() as u8);
        buf.extend_from_slice(PROTOCOL_STRING);
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&self.info_hash);
        buf.extend_from_slice(&self.peer_id);
        buf
    }

    /// Parse a handshake, rejecting anything that is not the BitTorrent protocol
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != HANDSHAKE_LEN {
            return Err(SwarmError::HandshakeFailed(format!(
                "expected {} bytes, got {}",
                HANDSHAKE_LEN,
                data.len()
            )));
        }

        if data[0] as usize != PROTOCOL_STRING.len() || &data[1..20] != PROTOCOL_STRING {
            return Err(SwarmError::HandshakeFailed(
                "unknown protocol string".to_string(),
            ));
        }

        // data[20..28] are reserved extension bits, ignored
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Handshake { info_hash, peer_id })
    }
}
