mod assembler;
mod store;

pub use assembler::{BlockStatus, Piece};
pub use store::{Completion, PieceStore};

/// Standard block size (16 KiB)
pub const BLOCK_SIZE: usize = 16 * 1024;
