use super::{PieceHash, Pieces};
use crate::bencode::{encode, Bencode};
use crate::error::{Result, SwarmError};

fn corrupt(msg: impl Into<String>) -> SwarmError {
    SwarmError::CorruptMetadata(msg.into())
}

/// Contents of the `info` dictionary of a single-file torrent
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Suggested name of the target file
    pub name: String,
    /// Number of bytes in each piece (the last one may be shorter)
    pub piece_length: u64,
    /// Total length of the target file
    pub length: u64,
    /// SHA1 digests of all pieces, in order
    pub pieces: Pieces,
}

impl TorrentInfo {
    fn from_bencode(value: &Bencode) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(corrupt("'info' must be a dictionary"));
        }

        let name = value
            .get_str(b"name")
            .ok_or_else(|| corrupt("missing 'name' field"))?
            .to_string();

        let piece_length = value
            .get_int(b"piece length")
            .ok_or_else(|| corrupt("missing 'piece length' field"))?;
        if piece_length <= 0 {
            return Err(corrupt(format!("invalid piece length {}", piece_length)));
        }

        let length = value
            .get_int(b"length")
            .ok_or_else(|| corrupt("missing 'length' field"))?;
        if length < 0 {
            return Err(corrupt(format!("invalid length {}", length)));
        }

        let pieces = Pieces::from_bytes(
            value
                .get_bytes(b"pieces")
                .ok_or_else(|| corrupt("missing 'pieces' field"))?,
        )?;

        let (piece_length, length) = (piece_length as u64, length as u64);
        let expected = length.div_ceil(piece_length);
        if pieces.len() as u64 != expected {
            return Err(corrupt(format!(
                "{} piece hashes for {} bytes in pieces of {} (expected {})",
                pieces.len(),
                length,
                piece_length,
                expected
            )));
        }

        Ok(TorrentInfo {
            name,
            piece_length,
            length,
            pieces,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Length of piece `index`; the final piece holds the remainder
    pub fn piece_size(&self, index: usize) -> u64 {
        let start = index as u64 * self.piece_length;
        self.length.saturating_sub(start).min(self.piece_length)
    }
}

/// Top-level metadata loaded from a .torrent file. Never mutated after load.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// URL of the tracker
    pub announce: String,
    /// Free-text comment, if the file carries one
    pub comment: Option<String>,
    pub info: TorrentInfo,
    /// SHA1 of the canonical re-encoding of the info dictionary
    pub info_hash: [u8; 20],
}

impl Metainfo {
    pub fn from_bencode(value: &Bencode) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(corrupt("torrent must be a dictionary"));
        }

        let announce = value
            .get_str(b"announce")
            .ok_or_else(|| corrupt("missing 'announce' field"))?
            .to_string();

        let comment = value.get_str(b"comment").map(String::from);

        let info_value = value
            .get(b"info")
            .ok_or_else(|| corrupt("missing 'info' field"))?;
        let info = TorrentInfo::from_bencode(info_value)?;

        // Hashed over our own encoding, which is byte-exact for canonical input
        let info_hash = *PieceHash::of(&encode(info_value)).as_bytes();

        Ok(Metainfo {
            announce,
            comment,
            info,
            info_hash,
        })
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}
