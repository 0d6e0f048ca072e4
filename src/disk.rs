//! The disk actor: the only part of the engine that touches the filesystem
//! (§4.5, §4.9 ambient expansion).
//!
//! A single blocking task owns every open file handle for a torrent and
//! serves [`Command`]s sent over an unbounded channel. Positional
//! reads/writes (`FileExt::write_at`/`read_at`) mean concurrent segments of
//! the same file never need a shared cursor or a lock around the handle.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    os::unix::fs::FileExt,
};

use tokio::sync::{mpsc, oneshot};

use crate::{
    error::{Error, Result},
    piece_mapper::segments_for_piece,
    storage_info::StorageInfo,
    FileIndex, PieceIndex,
};

/// A request sent to the disk actor.
pub(crate) enum Command {
    /// Writes an entire verified piece to disk, splitting it across however
    /// many files it spans.
    WritePiece {
        index: PieceIndex,
        data: Vec<u8>,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Reads a single block of a piece back from disk, for serving to a
    /// downloading peer (§4.6).
    ReadBlock {
        index: PieceIndex,
        offset: u32,
        len: u32,
        result_tx: oneshot::Sender<Result<Vec<u8>>>,
    },
    /// Reads an entire piece back from disk, for the startup integrity scan
    /// (§4.9).
    ReadPiece {
        index: PieceIndex,
        result_tx: oneshot::Sender<Result<Vec<u8>>>,
    },
    Shutdown,
}

/// A handle to a running disk actor; cheaply cloneable, shared by every peer
/// session of a torrent.
#[derive(Clone)]
pub(crate) struct DiskHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl DiskHandle {
    pub async fn write_piece(&self, index: PieceIndex, data: Vec<u8>) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::WritePiece { index, data, result_tx })
            .map_err(|_| Error::ChannelClosed)?;
        result_rx.await?
    }

    pub async fn read_block(
        &self,
        index: PieceIndex,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ReadBlock { index, offset, len, result_tx })
            .map_err(|_| Error::ChannelClosed)?;
        result_rx.await?
    }

    pub async fn read_piece(&self, index: PieceIndex) -> Result<Vec<u8>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ReadPiece { index, result_tx })
            .map_err(|_| Error::ChannelClosed)?;
        result_rx.await?
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// Spawns the disk actor as a blocking task and returns a handle to it.
pub(crate) fn spawn(storage: StorageInfo) -> DiskHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || run(storage, cmd_rx));
    DiskHandle { cmd_tx }
}

fn run(storage: StorageInfo, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let mut files: HashMap<FileIndex, File> = HashMap::new();
    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            Command::WritePiece { index, data, result_tx } => {
                let result = write_piece(&storage, &mut files, index, &data);
                let _ = result_tx.send(result);
            }
            Command::ReadBlock { index, offset, len, result_tx } => {
                let result = read_range(&storage, &mut files, index, offset, len);
                let _ = result_tx.send(result);
            }
            Command::ReadPiece { index, result_tx } => {
                let result = storage
                    .piece_len(index)
                    .map_err(Error::from)
                    .and_then(|len| read_range(&storage, &mut files, index, 0, len));
                let _ = result_tx.send(result);
            }
            Command::Shutdown => break,
        }
    }
    log::debug!("disk actor for {:?} shutting down", storage.download_dir);
}

fn write_piece(
    storage: &StorageInfo,
    files: &mut HashMap<FileIndex, File>,
    index: PieceIndex,
    data: &[u8],
) -> Result<()> {
    for segment in segments_for_piece(storage, index)? {
        let file = open_file(storage, files, segment.file_index)?;
        let chunk = &data[segment.piece_offset as usize
            ..segment.piece_offset as usize + segment.len as usize];
        file.write_at(chunk, segment.file_offset)?;
    }
    Ok(())
}

fn read_range(
    storage: &StorageInfo,
    files: &mut HashMap<FileIndex, File>,
    index: PieceIndex,
    offset: u32,
    len: u32,
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len as usize];
    for segment in segments_for_piece(storage, index)? {
        let segment_end = segment.piece_offset + segment.len;
        if segment_end <= offset || segment.piece_offset >= offset + len {
            continue;
        }
        let start = segment.piece_offset.max(offset);
        let end = segment_end.min(offset + len);
        let file_offset = segment.file_offset + (start - segment.piece_offset) as u64;
        let file = open_file(storage, files, segment.file_index)?;
        file.read_exact_at(
            &mut out[(start - offset) as usize..(end - offset) as usize],
            file_offset,
        )?;
    }
    Ok(out)
}

fn open_file<'a>(
    storage: &StorageInfo,
    files: &'a mut HashMap<FileIndex, File>,
    file_index: FileIndex,
) -> Result<&'a File> {
    if !files.contains_key(&file_index) {
        let info = file_info(storage, file_index);
        let path = storage.download_dir.join(&info.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.set_len(info.len)?;
        files.insert(file_index, file);
    }
    Ok(files.get(&file_index).expect("just inserted"))
}

fn file_info(storage: &StorageInfo, file_index: FileIndex) -> crate::storage_info::FileInfo {
    match &storage.structure {
        crate::storage_info::FsStructure::File(file) => file.clone(),
        crate::storage_info::FsStructure::Archive { files } => files[file_index].clone(),
    }
}
