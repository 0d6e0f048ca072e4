//! Durable per-torrent state: which pieces are present, and progress
//! counters, persisted so a restart can resume without rescanning from
//! scratch unless the resume scan finds the file contents disagree (§4.9
//! ambient expansion).
//!
//! Grounded on the original implementation's gob-encoded `TorrentFile.Save`/
//! `Load`; bincode is this crate's analogue of gob as a compact Rust-native
//! binary serde format.

use std::path::{Path, PathBuf};

use crate::{
    error::Result,
    Bitfield, Sha1Hash,
};

/// A snapshot of a torrent's download state, serialized to disk between
/// runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StateSnapshot {
    pub info_hash: Sha1Hash,
    pub have: SerializableBitfield,
    pub downloaded: u64,
    pub uploaded: u64,
}

/// `Bitfield` wraps a `bitvec::BitVec` which doesn't implement `serde`
/// traits the way we'd want for a stable on-disk format, so state snapshots
/// store the plain wire bytes plus the bit count instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SerializableBitfield {
    bytes: Vec<u8>,
    piece_count: usize,
}

impl From<&Bitfield> for SerializableBitfield {
    fn from(bf: &Bitfield) -> Self {
        Self { bytes: bf.to_wire_bytes(), piece_count: bf.len() }
    }
}

impl From<&SerializableBitfield> for Bitfield {
    fn from(s: &SerializableBitfield) -> Self {
        Bitfield::from_wire_bytes(&s.bytes, s.piece_count)
    }
}

/// Persists and loads [`StateSnapshot`]s. A trait so callers (tests, future
/// backends) aren't tied to the filesystem implementation.
pub(crate) trait StateStore: Send + Sync {
    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
    fn load(&self, info_hash: &Sha1Hash) -> Result<Option<StateSnapshot>>;
    fn delete(&self, info_hash: &Sha1Hash) -> Result<()>;
}

/// Stores one state file per torrent, named by its info hash, in a
/// directory. Writes are atomic: encoded to a temp file, then renamed over
/// the destination, so a crash mid-write never corrupts the previous state.
pub(crate) struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, info_hash: &Sha1Hash) -> PathBuf {
        self.dir.join(format!("{}.state", hex::encode(info_hash)))
    }
}

impl StateStore for FileStateStore {
    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&snapshot.info_hash);
        let tmp_path = tmp_path_for(&path);
        let encoded = bincode::serialize(snapshot)?;
        std::fs::write(&tmp_path, &encoded)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn load(&self, info_hash: &Sha1Hash) -> Result<Option<StateSnapshot>> {
        let path = self.path_for(info_hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let snapshot = bincode::deserialize(&bytes)?;
        Ok(Some(snapshot))
    }

    fn delete(&self, info_hash: &Sha1Hash) -> Result<()> {
        let path = self.path_for(info_hash);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
