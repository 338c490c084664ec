use super::BLOCK_SIZE;
use crate::error::{Result, SwarmError};
use crate::torrent::PieceHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Missing,
    /// Requested from a peer, answer outstanding
    Pending,
    Retrieved,
}

/// One request-sized slice of a piece
#[derive(Debug, Clone)]
pub struct Block {
    pub piece_index: usize,
    /// Byte offset within the piece
    pub offset: usize,
    pub length: usize,
    pub status: BlockStatus,
    pub data: Vec<u8>,
}

/// Reassembles one piece from its blocks and checks it against the expected digest
#[derive(Debug, Clone)]
pub struct Piece {
    index: usize,
    length: usize,
    hash: PieceHash,
    blocks: Vec<Block>,
}

impl Piece {
    pub fn new(index: usize, length: usize, hash: PieceHash) -> Self {
        Self::with_block_size(index, length, hash, BLOCK_SIZE)
    }

    /// Partition `length` into `block_size` blocks, the last one holding the remainder
    pub fn with_block_size(index: usize, length: usize, hash: PieceHash, block_size: usize) -> Self {
        let blocks = (0..length)
            .step_by(block_size.max(1))
            .map(|offset| Block {
                piece_index: index,
                offset,
                length: block_size.min(length - offset),
                status: BlockStatus::Missing,
                data: Vec::new(),
            })
            .collect();

        Self {
            index,
            length,
            hash,
            blocks,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// First block still missing, scanning in offset order
    pub fn first_missing_block(&mut self) -> Option<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|block| block.status == BlockStatus::Missing)
    }

    /// Put a pending block back to missing, e.g. when its request was dropped
    pub fn release_block(&mut self, offset: usize) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.offset == offset) {
            if block.status == BlockStatus::Pending {
                block.status = BlockStatus::Missing;
            }
        }
    }

    /// Store the payload for the block starting at `offset`. The payload must fill the block exactly.
    pub fn save_block(&mut self, offset: usize, data: Vec<u8>) -> Result<()> {
        let index = self.index;
        let block = self
            .blocks
            .iter_mut()
            .find(|b| b.offset == offset)
            .ok_or_else(|| {
                SwarmError::ProtocolError(format!(
                    "piece {} has no block at offset {}",
                    index, offset
                ))
            })?;

        if data.len() != block.length {
            return Err(SwarmError::ProtocolError(format!(
                "block {}:{} carries {} bytes, expected {}",
                index,
                offset,
                data.len(),
                block.length
            )));
        }

        block.data = data;
        block.status = BlockStatus::Retrieved;
        Ok(())
    }

    pub fn all_blocks_retrieved(&self) -> bool {
        self.blocks
            .iter()
            .all(|block| block.status == BlockStatus::Retrieved)
    }

    /// Block payloads concatenated in offset order
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length);
        for block in &self.blocks {
            out.extend_from_slice(&block.data);
        }
        out
    }

    pub fn verify_digest(&self) -> bool {
        self.all_blocks_retrieved() && PieceHash::of(&self.data()) == self.hash
    }

    /// Drop all received data so the piece can be downloaded again
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.status = BlockStatus::Missing;
            block.data = Vec::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece_of(content: &[u8], block_size: usize) -> Piece {
        Piece::with_block_size(3, content.len(), PieceHash::of(content), block_size)
    }

    #[test]
    fn test_block_partition() {
        let piece = piece_of(&[0u8; 20], 14);
        let lengths: Vec<usize> = piece.blocks().iter().map(|b| b.length).collect();
        let offsets: Vec<usize> = piece.blocks().iter().map(|b| b.offset).collect();
        assert_eq!(lengths, vec![14, 6]);
        assert_eq!(offsets, vec![0, 14]);
        assert!(piece.blocks().iter().all(|b| b.piece_index == 3));
    }

    #[test]
    fn test_default_block_size() {
        let piece = Piece::new(0, 2 * BLOCK_SIZE + 100, PieceHash::new([0; 20]));
        let lengths: Vec<usize> = piece.blocks().iter().map(|b| b.length).collect();
        assert_eq!(lengths, vec![BLOCK_SIZE, BLOCK_SIZE, 100]);
    }

    #[test]
    fn test_assemble_and_verify() {
        let content: Vec<u8> = (0..20u8).collect();
        let mut piece = piece_of(&content, 14);

        assert_eq!(piece.first_missing_block().map(|b| b.offset), Some(0));
        piece.save_block(0, content[..14].to_vec()).unwrap();
        assert!(!piece.all_blocks_retrieved());
        assert!(!piece.verify_digest());

        assert_eq!(piece.first_missing_block().map(|b| b.offset), Some(14));
        piece.save_block(14, content[14..].to_vec()).unwrap();
        assert!(piece.all_blocks_retrieved());
        assert!(piece.first_missing_block().is_none());
        assert_eq!(piece.data(), content);
        assert!(piece.verify_digest());

        piece.reset();
        assert!(piece
            .blocks()
            .iter()
            .all(|b| b.status == BlockStatus::Missing && b.data.is_empty()));
        assert!(!piece.all_blocks_retrieved());
    }

    #[test]
    fn test_wrong_content_fails_digest() {
        let content = [7u8; 20];
        let mut piece = piece_of(&content, 14);
        piece.save_block(0, vec![7u8; 14]).unwrap();
        piece.save_block(14, vec![8u8; 6]).unwrap();
        assert!(piece.all_blocks_retrieved());
        assert!(!piece.verify_digest());
    }

    #[test]
    fn test_save_block_rejects_bad_length_and_offset() {
        let mut piece = piece_of(&[0u8; 20], 14);
        assert!(matches!(
            piece.save_block(0, vec![0u8; 13]),
            Err(SwarmError::ProtocolError(_))
        ));
        assert!(matches!(
            piece.save_block(5, vec![0u8; 14]),
            Err(SwarmError::ProtocolError(_))
        ));
        assert_eq!(piece.blocks()[0].status, BlockStatus::Missing);
    }

    #[test]
    fn test_release_pending_block() {
        let mut piece = piece_of(&[0u8; 20], 14);
        if let Some(block) = piece.first_missing_block() {
            block.status = BlockStatus::Pending;
        }
        assert_eq!(piece.first_missing_block().map(|b| b.offset), Some(14));

        piece.release_block(0);
        assert_eq!(piece.first_missing_block().map(|b| b.offset), Some(0));
    }
}
