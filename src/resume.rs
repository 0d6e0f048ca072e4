//! The startup integrity scan (§4.9): hash every piece already on disk and
//! build the bitfield of what's actually present. A persisted state
//! snapshot (§4.9 ambient expansion, [`crate::state`]) can be supplied as a
//! hint to skip re-hashing pieces it already confirms; anything the hint
//! doesn't vouch for is still hashed, since files may have been touched
//! outside the engine since the snapshot was written.

use crate::{disk::DiskHandle, metainfo::Descriptor, verify::verify_piece, Bitfield};

/// Reads and hashes every piece of a torrent's files and returns the
/// bitfield of which ones verify against the descriptor's expected hashes.
///
/// A short read (file missing or truncated) is treated the same as a hash
/// mismatch: the piece is simply not marked present, to be re-downloaded.
pub(crate) async fn scan(descriptor: &Descriptor, disk: &DiskHandle) -> Bitfield {
    scan_with_hint(descriptor, disk, None).await
}

/// Like [`scan`], but pieces `hint` already marks present are trusted as-is
/// and not re-read or re-hashed. `hint` is ignored (treated as absent) if
/// its piece count doesn't match the descriptor, since that means it was
/// persisted for a different torrent layout and can't be trusted at all.
pub(crate) async fn scan_with_hint(
    descriptor: &Descriptor,
    disk: &DiskHandle,
    hint: Option<&Bitfield>,
) -> Bitfield {
    let piece_count = descriptor.piece_count();
    let hint = hint.filter(|h| h.len() == piece_count);

    let mut have = Bitfield::new(piece_count);
    for (index, hash) in descriptor.piece_hashes.iter().enumerate() {
        if hint.is_some_and(|h| h.has(index)) {
            have.set(index);
            continue;
        }
        match disk.read_piece(index).await {
            Ok(data) if verify_piece(&data, hash) => have.set(index),
            _ => {}
        }
    }
    have
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_info::{FileInfo, StorageInfo};
    use sha1::{Digest, Sha1};
    use std::path::PathBuf;

    fn hash_of(data: &[u8]) -> crate::Sha1Hash {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&hasher.finalize());
        hash
    }

    #[tokio::test]
    async fn marks_matching_pieces_present_and_leaves_rest_unset() {
        let dir = tempfile::tempdir().unwrap();
        let piece_a = vec![1u8; 4];
        let piece_b = vec![2u8; 4];

        let storage = StorageInfo {
            piece_count: 2,
            piece_len: 4,
            last_piece_len: 4,
            download_len: 8,
            download_dir: dir.path().to_path_buf(),
            structure: crate::storage_info::FsStructure::File(FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }),
        };
        let disk = crate::disk::spawn(storage);
        // only the first piece is written; the second is left as zero bytes
        // from the file's preallocation, so it won't match its hash.
        disk.write_piece(0, piece_a.clone()).await.unwrap();

        let descriptor = Descriptor {
            announce: String::new(),
            info_hash: [0u8; 20],
            piece_length: 4,
            piece_hashes: vec![hash_of(&piece_a), hash_of(&piece_b)],
            files: vec![FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }],
            name: "t".into(),
        };

        let have = scan(&descriptor, &disk).await;
        assert!(have.has(0));
        assert!(!have.has(1));
    }

    #[tokio::test]
    async fn hint_skips_rehashing_pieces_it_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let piece_a = vec![1u8; 4];
        // never written to disk; only present because the hint vouches for it
        let piece_b = vec![2u8; 4];

        let storage = StorageInfo {
            piece_count: 2,
            piece_len: 4,
            last_piece_len: 4,
            download_len: 8,
            download_dir: dir.path().to_path_buf(),
            structure: crate::storage_info::FsStructure::File(FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }),
        };
        let disk = crate::disk::spawn(storage);
        disk.write_piece(0, piece_a.clone()).await.unwrap();

        let descriptor = Descriptor {
            announce: String::new(),
            info_hash: [0u8; 20],
            piece_length: 4,
            piece_hashes: vec![hash_of(&piece_a), hash_of(&piece_b)],
            files: vec![FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }],
            name: "t".into(),
        };

        let mut hint = Bitfield::new(2);
        hint.set(1);
        let have = scan_with_hint(&descriptor, &disk, Some(&hint)).await;
        assert!(have.has(0));
        assert!(have.has(1));
    }

    #[tokio::test]
    async fn hint_with_mismatched_piece_count_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let piece_a = vec![1u8; 4];
        let piece_b = vec![2u8; 4];

        let storage = StorageInfo {
            piece_count: 2,
            piece_len: 4,
            last_piece_len: 4,
            download_len: 8,
            download_dir: dir.path().to_path_buf(),
            structure: crate::storage_info::FsStructure::File(FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }),
        };
        let disk = crate::disk::spawn(storage);
        disk.write_piece(0, piece_a.clone()).await.unwrap();

        let descriptor = Descriptor {
            announce: String::new(),
            info_hash: [0u8; 20],
            piece_length: 4,
            piece_hashes: vec![hash_of(&piece_a), hash_of(&piece_b)],
            files: vec![FileInfo {
                path: PathBuf::from("data.bin"),
                len: 8,
                torrent_offset: 0,
            }],
            name: "t".into(),
        };

        // stale hint from a torrent with a different piece count: must be
        // ignored entirely rather than indexed out of bounds or trusted.
        let stale_hint = Bitfield::new(5);
        let have = scan_with_hint(&descriptor, &disk, Some(&stale_hint)).await;
        assert!(have.has(0));
        assert!(!have.has(1));
    }
}
