//! Maps a piece's byte range onto the file(s) it spans (§4.2).
//!
//! A piece never straddles more than a handful of files in practice, but
//! nothing here assumes that: [`segments_for_piece`] walks exactly the files
//! [`StorageInfo::files_intersecting_piece`] says overlap the piece and
//! yields one [`FileSegment`] per file, in file order.

use crate::{
    error::Result,
    storage_info::{FileInfo, StorageInfo},
    FileIndex, PieceIndex,
};

/// A contiguous slice of a piece that lands inside a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSegment {
    /// The index of the file this segment belongs to, in the descriptor's
    /// file list.
    pub file_index: FileIndex,
    /// The byte offset within the file at which this segment starts.
    pub file_offset: u64,
    /// The byte offset within the piece at which this segment starts.
    pub piece_offset: u32,
    /// The length of the segment, in bytes.
    pub len: u32,
}

/// Splits piece `index`'s byte range into the ordered list of file segments
/// it spans.
///
/// # Invariants
///
/// The returned segments are ordered by ascending piece offset, contiguous
/// (no gaps, no overlap), and their lengths sum to the piece's length.
pub fn segments_for_piece(
    storage: &StorageInfo,
    index: PieceIndex,
) -> Result<Vec<FileSegment>> {
    let piece_len = storage.piece_len(index)?;
    let piece_torrent_offset = index as u64 * storage.piece_len as u64;
    let file_range = storage.files_intersecting_piece(index)?;

    let files: &[FileInfo] = match &storage.structure {
        crate::storage_info::FsStructure::File(file) => {
            std::slice::from_ref(file)
        }
        crate::storage_info::FsStructure::Archive { files } => files,
    };

    let mut segments = Vec::with_capacity(file_range.len().max(1));
    let mut piece_offset: u32 = 0;
    for file_index in file_range {
        let file = &files[file_index];
        let slice = file.get_slice(piece_torrent_offset + piece_offset as u64, (piece_len - piece_offset) as u64);
        segments.push(FileSegment {
            file_index,
            file_offset: slice.offset,
            piece_offset,
            len: slice.len as u32,
        });
        piece_offset += slice.len as u32;
        if piece_offset >= piece_len {
            break;
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_info::FsStructure;
    use std::path::PathBuf;

    fn archive_storage() -> StorageInfo {
        let files = vec![
            FileInfo { path: PathBuf::from("/0"), torrent_offset: 0, len: 9 },
            FileInfo { path: PathBuf::from("/1"), torrent_offset: 9, len: 11 },
            FileInfo { path: PathBuf::from("/2"), torrent_offset: 20, len: 7 },
        ];
        StorageInfo {
            piece_count: 2,
            piece_len: 16,
            last_piece_len: 11,
            download_len: 27,
            download_dir: PathBuf::from("/"),
            structure: FsStructure::Archive { files },
        }
    }

    #[test]
    fn segments_cover_the_whole_piece_with_no_gaps() {
        let storage = archive_storage();
        let segments = segments_for_piece(&storage, 0).unwrap();
        let total: u32 = segments.iter().map(|s| s.len).sum();
        assert_eq!(total, storage.piece_len(0).unwrap());

        let mut expected_offset = 0u32;
        for segment in &segments {
            assert_eq!(segment.piece_offset, expected_offset);
            expected_offset += segment.len;
        }
    }

    #[test]
    fn last_piece_spans_the_final_two_files() {
        let storage = archive_storage();
        let segments = segments_for_piece(&storage, 1).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].file_index, 1);
        assert_eq!(segments[1].file_index, 2);
        assert_eq!(segments[1].len, 7);
    }
}
