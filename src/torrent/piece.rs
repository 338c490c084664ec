use crate::error::{Result, SwarmError};
use sha1::{Digest, Sha1};

pub const HASH_LEN: usize = 20;

/// A 20-byte SHA1 digest of one piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceHash([u8; HASH_LEN]);

impl PieceHash {
    pub fn new(hash: [u8; HASH_LEN]) -> Self {
        Self(hash)
    }

    /// Digest of `data`
    pub fn of(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Ordered per-piece digests, parsed from the concatenated `pieces` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pieces {
    hashes: Vec<PieceHash>,
}

impl Pieces {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() % HASH_LEN != 0 {
            return Err(SwarmError::CorruptMetadata(format!(
                "'pieces' length {} is not a multiple of {}",
                data.len(),
                HASH_LEN
            )));
        }

        let hashes = data
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(chunk);
                PieceHash(hash)
            })
            .collect();

        Ok(Self { hashes })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn get(&self, index: usize) -> Option<&PieceHash> {
        self.hashes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PieceHash> {
        self.hashes.iter()
    }
}
