//! The piece-presence set: a compact, MSB-first bit-packed array.
//!
//! Bit *k* (most significant bit first within byte `k / 8`) is set iff piece
//! *k* is present and verified. This mirrors the wire representation of the
//! `bitfield` peer message directly, so no transformation is needed between
//! the in-memory and on-the-wire forms.

use bitvec::prelude::{BitVec, Msb0};

use crate::PieceIndex;

/// The piece availability of a peer, or of our own torrent.
///
/// A truthy boolean value of a piece's position in this vector means the
/// piece is present, a falsy value means it isn't.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitfield {
    inner: BitVec<u8, Msb0>,
}

impl Bitfield {
    /// Creates a new bitfield with room for `piece_count` pieces, with no
    /// piece marked as present.
    pub fn new(piece_count: usize) -> Self {
        Self {
            inner: BitVec::repeat(false, piece_count),
        }
    }

    /// Builds a bitfield from raw wire bytes, truncating or zero-extending it
    /// to exactly `piece_count` bits so that trailing padding bits from the
    /// wire (when `piece_count` is not a multiple of 8) are dropped.
    pub fn from_wire_bytes(bytes: &[u8], piece_count: usize) -> Self {
        let mut inner = BitVec::<u8, Msb0>::from_slice(bytes);
        inner.resize(piece_count, false);
        Self { inner }
    }

    /// Returns the raw bytes of this bitfield, MSB-first, for sending on the
    /// wire. Trailing bits in the last byte beyond `len()` are always zero.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut bytes = self.inner.clone();
        bytes.set_uninitialized(false);
        bytes.into_vec()
    }

    /// The number of pieces this bitfield tracks.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether this bitfield tracks zero pieces.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns whether piece `index` is marked present.
    ///
    /// Out of range indices return `false` rather than panicking.
    pub fn has(&self, index: PieceIndex) -> bool {
        self.inner.get(index).as_deref().copied().unwrap_or(false)
    }

    /// Marks piece `index` as present.
    ///
    /// Out of range indices are a no-op.
    pub fn set(&mut self, index: PieceIndex) {
        if let Some(mut bit) = self.inner.get_mut(index) {
            *bit = true;
        }
    }

    /// Returns whether every piece in this bitfield is present.
    pub fn is_all_set(&self) -> bool {
        self.inner.all()
    }

    /// Returns the number of pieces marked present.
    pub fn count_ones(&self) -> usize {
        self.inner.count_ones()
    }
}
