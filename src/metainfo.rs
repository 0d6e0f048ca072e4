//! Bencode `.torrent` metainfo parsing.
//!
//! This is a thin collaborator adapter (§1 Purpose & Scope): the core never
//! parses bencode itself, it only ever sees the immutable [`Descriptor`] this
//! module produces. Kept here, rather than in a separate crate, purely so
//! this crate is buildable and runnable standalone.

use std::path::PathBuf;

use sha1::{Digest, Sha1};

use crate::{
    error::{Error, Result},
    storage_info::FileInfo,
    Sha1Hash,
};

/// The raw bencoded top-level metainfo dictionary.
#[derive(Debug, Serialize, Deserialize)]
pub struct Metainfo {
    pub announce: Option<String>,
    pub info: Info,
}

impl Metainfo {
    /// Parses a `.torrent` file's raw bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        Ok(serde_bencode::from_bytes(buf)?)
    }

    /// Computes the info hash: the SHA-1 of the bencoded `info` dictionary.
    pub fn info_hash(&self) -> Result<Sha1Hash> {
        let info = serde_bencode::to_bytes(&self.info)?;
        let mut hasher = Sha1::new();
        hasher.update(&info);
        let digest = hasher.finalize();
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&digest);
        Ok(info_hash)
    }

    /// Converts the raw metainfo into the immutable [`Descriptor`] the core
    /// consumes.
    pub fn into_descriptor(self) -> Result<Descriptor> {
        let info_hash = self.info_hash()?;
        let piece_length = self.info.piece_length as u32;

        if self.info.pieces.len() % 20 != 0 {
            return Err(Error::DescriptorInvalid(
                "pieces field is not a multiple of 20 bytes".into(),
            ));
        }
        let piece_hashes: Vec<Sha1Hash> = self
            .info
            .pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        if piece_hashes.is_empty() {
            return Err(Error::DescriptorInvalid("torrent has no pieces".into()));
        }

        let files = match (&self.info.length, &self.info.files) {
            (Some(len), None) => {
                vec![FileInfo {
                    path: PathBuf::from(&self.info.name),
                    len: *len,
                    torrent_offset: 0,
                }]
            }
            (None, Some(files)) => {
                let mut entries = Vec::with_capacity(files.len());
                let mut offset = 0u64;
                for file in files {
                    if file.length < 0 {
                        return Err(Error::DescriptorInvalid(
                            "negative file length".into(),
                        ));
                    }
                    let len = file.length as u64;
                    let path: PathBuf = file.path.iter().collect();
                    entries.push(FileInfo {
                        path,
                        len,
                        torrent_offset: offset,
                    });
                    offset += len;
                }
                entries
            }
            _ => {
                return Err(Error::DescriptorInvalid(
                    "metainfo must declare exactly one of length/files".into(),
                ))
            }
        };

        let total_len: u64 = files
            .last()
            .map(|f| f.torrent_offset + f.len)
            .unwrap_or(0);
        let min_len = piece_length as u64 * (piece_hashes.len() as u64 - 1);
        if total_len < min_len {
            return Err(Error::DescriptorInvalid(
                "declared file lengths are shorter than the piece layout implies".into(),
            ));
        }

        Ok(Descriptor {
            announce: self.announce.unwrap_or_default(),
            info_hash,
            piece_length,
            piece_hashes,
            files,
            name: self.info.name,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub pieces: ByteBufCompat,
    #[serde(rename = "piece length")]
    pub piece_length: u64,
    pub length: Option<u64>,
    pub files: Option<Vec<File>>,
    pub private: Option<u8>,
}

/// `serde_bytes` wants a type it knows how to borrow/own bytes as; using
/// `Vec<u8>` directly with the `with = "serde_bytes"` attribute works the
/// same as wrapping in `serde_bytes::ByteBuf`, we keep the alias for
/// readability at call sites that build an `Info` by hand (e.g. in tests).
pub type ByteBufCompat = Vec<u8>;

#[derive(Debug, Serialize, Deserialize)]
pub struct File {
    pub path: Vec<String>,
    pub length: i64,
}

/// The immutable torrent descriptor the core operates on (§3 Data Model).
///
/// Produced once by [`Metainfo::into_descriptor`] and never mutated
/// afterwards.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// The tracker announce URL.
    pub announce: String,
    /// The 20-byte SHA-1 of the bencoded info dictionary.
    pub info_hash: Sha1Hash,
    /// The nominal length of a piece; the last piece may be shorter.
    pub piece_length: u32,
    /// One 20-byte SHA-1 hash per piece, in piece order.
    pub piece_hashes: Vec<Sha1Hash>,
    /// The files in this torrent, in order, with cumulative
    /// `torrent_offset`/length giving each file's `begin`/`end` in the
    /// concatenated virtual stream.
    pub files: Vec<FileInfo>,
    /// The suggested root directory (multi-file) or file name (single-file).
    pub name: String,
}

impl Descriptor {
    /// The number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// The total length of the torrent, summed over all files.
    pub fn total_len(&self) -> u64 {
        self.files
            .last()
            .map(|f| f.torrent_offset + f.len)
            .unwrap_or(0)
    }

    /// Whether this torrent has more than one file.
    pub fn is_multi_file(&self) -> bool {
        self.files.len() > 1
    }
}
