use super::Piece;
use crate::error::{Result, SwarmError};
use crate::storage::StorageManager;
use crate::torrent::{PieceHash, TorrentInfo};
use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// What happened to a fully assembled piece handed to [`PieceStore::complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Digest matched and the piece is on disk
    Saved,
    /// Digest mismatch; the piece was reset and queued again
    Rejected,
}

#[derive(Default)]
struct Ledger {
    queue: VecDeque<Piece>,
    /// Saved indices in save order
    saved: Vec<usize>,
    saved_set: HashSet<usize>,
}

/// Work queue and saved-piece ledger shared by all peer sessions.
///
/// Queue and ledger live behind one reader/writer lock. Verification and the
/// disk write run under a separate mutex that also owns the output file, so a
/// slow write never blocks other sessions from taking work.
pub struct PieceStore {
    hashes: Vec<PieceHash>,
    piece_length: u64,
    total_length: u64,
    ledger: RwLock<Ledger>,
    storage: Mutex<StorageManager>,
}

impl PieceStore {
    /// Seed the queue with every piece, in index order
    pub fn new(info: &TorrentInfo, storage: StorageManager) -> Self {
        let hashes: Vec<PieceHash> = info.pieces.iter().copied().collect();
        let queue = hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| Piece::new(index, info.piece_size(index) as usize, *hash))
            .collect();

        Self {
            hashes,
            piece_length: info.piece_length,
            total_length: info.length,
            ledger: RwLock::new(Ledger {
                queue,
                ..Ledger::default()
            }),
            storage: Mutex::new(storage),
        }
    }

    /// Pop the head of the queue without waiting
    pub async fn take_next(&self) -> Option<Piece> {
        self.ledger.write().await.queue.pop_front()
    }

    /// Remove the first queued piece whose index satisfies `wanted`, leaving the rest in order
    pub async fn take_next_where<F>(&self, mut wanted: F) -> Option<Piece>
    where
        F: FnMut(usize) -> bool,
    {
        let mut ledger = self.ledger.write().await;
        let position = ledger.queue.iter().position(|piece| wanted(piece.index()))?;
        ledger.queue.remove(position)
    }

    /// Re-queue a piece a session could not finish
    pub async fn return_piece(&self, piece: Piece) {
        debug!("Piece {} returned to queue", piece.index());
        self.ledger.write().await.queue.push_back(piece);
    }

    /// Verify a fully assembled piece and persist it, or reset and re-queue it.
    ///
    /// Saving the same index twice is an error: it means two sessions held the same piece.
    pub async fn complete(&self, mut piece: Piece) -> Result<Completion> {
        let index = piece.index();
        let mut storage = self.storage.lock().await;

        if !piece.verify_digest() {
            warn!("Piece {} failed verification, re-queueing", index);
            drop(storage);
            piece.reset();
            self.return_piece(piece).await;
            return Ok(Completion::Rejected);
        }

        if self.ledger.read().await.saved_set.contains(&index) {
            error!("Piece {} completed twice", index);
            return Err(SwarmError::AlreadySaved(index));
        }

        if let Err(e) = storage.write_piece(index, &piece.data()).await {
            error!("Failed to write piece {}: {}", index, e);
            drop(storage);
            piece.reset();
            self.return_piece(piece).await;
            return Err(SwarmError::StorageError(format!("piece {}: {}", index, e)));
        }

        let mut ledger = self.ledger.write().await;
        ledger.saved.push(index);
        ledger.saved_set.insert(index);
        info!(
            "Piece {} verified and saved ({}/{})",
            index,
            ledger.saved.len(),
            self.hashes.len()
        );

        Ok(Completion::Saved)
    }

    pub async fn saved_count(&self) -> usize {
        self.ledger.read().await.saved.len()
    }

    pub async fn queue_depth(&self) -> usize {
        self.ledger.read().await.queue.len()
    }

    pub fn total_pieces(&self) -> usize {
        self.hashes.len()
    }

    /// Pieces currently held by sessions: neither queued nor saved
    pub async fn in_progress_count(&self) -> usize {
        let ledger = self.ledger.read().await;
        self.hashes
            .len()
            .saturating_sub(ledger.saved.len() + ledger.queue.len())
    }

    pub async fn is_complete(&self) -> bool {
        self.saved_count().await == self.hashes.len()
    }

    pub async fn saved_indices(&self) -> Vec<usize> {
        self.ledger.read().await.saved.clone()
    }

    /// Bytes of the target file not yet saved
    pub async fn remaining_bytes(&self) -> u64 {
        let ledger = self.ledger.read().await;
        let saved: u64 = ledger
            .saved
            .iter()
            .map(|&index| self.piece_size(index) as u64)
            .sum();
        self.total_length.saturating_sub(saved)
    }

    /// Flush the output file and check its size
    pub async fn close(&self) -> Result<()> {
        self.storage.lock().await.sync().await
    }

    /// Re-read every saved piece from disk and return the indices whose digest no longer matches
    pub async fn verify_saved(&self) -> Result<Vec<usize>> {
        let mut indices = self.saved_indices().await;
        indices.sort_unstable();

        let mut storage = self.storage.lock().await;
        let mut failed = Vec::new();
        for index in indices {
            let data = storage.read_piece(index, self.piece_size(index)).await?;
            if PieceHash::of(&data) != self.hashes[index] {
                error!(
                    "Saved piece {} at offset {} has wrong hash, expected {}",
                    index,
                    index as u64 * self.piece_length,
                    self.hashes[index].to_hex()
                );
                failed.push(index);
            }
        }
        Ok(failed)
    }

    fn piece_size(&self, index: usize) -> usize {
        let start = index as u64 * self.piece_length;
        self.total_length
            .saturating_sub(start)
            .min(self.piece_length) as usize
    }
}
