/// Which pieces one remote peer claims to hold. Bit 0 is the high bit of byte 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    num_pieces: usize,
}

impl Bitfield {
    /// An empty set sized for `num_pieces`
    pub fn new(num_pieces: usize) -> Self {
        Self {
            bits: vec![0u8; num_pieces.div_ceil(8)],
            num_pieces,
        }
    }

    /// Adopt a peer-supplied bitfield. Short input is zero-extended and
    /// spare bits past `num_pieces` are cleared.
    pub fn from_bytes(bytes: &[u8], num_pieces: usize) -> Self {
        let mut field = Self::new(num_pieces);
        let n = field.bits.len().min(bytes.len());
        field.bits[..n].copy_from_slice(&bytes[..n]);

        let spare = field.bits.len() * 8 - num_pieces;
        if spare > 0 {
            if let Some(last) = field.bits.last_mut() {
                *last &= 0xFFu8 << spare;
            }
        }
        field
    }

    pub fn has(&self, index: usize) -> bool {
        index < self.num_pieces && self.bits[index / 8] & (0x80 >> (index % 8)) != 0
    }

    /// Returns false when `index` is out of range
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.num_pieces {
            return false;
        }
        self.bits[index / 8] |= 0x80 >> (index % 8);
        true
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn len(&self) -> usize {
        self.num_pieces
    }

    /// Wire form, as sent in a bitfield message
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}
