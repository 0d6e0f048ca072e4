//! Piece integrity verification (§4.5).

use sha1::{Digest, Sha1};

use crate::Sha1Hash;

/// Returns whether `data`'s SHA-1 matches `expected`.
pub(crate) fn verify_piece(data: &[u8], expected: &Sha1Hash) -> bool {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.as_slice() == expected
}
