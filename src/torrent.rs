//! A single torrent's lifecycle: resume, announce, run peer sessions to
//! completion, persist state, and register with the seeder (§4.8, §4.9).
//!
//! Start/stop is a cancel-then-join handshake, the idiomatic-async
//! equivalent of the original's `Done`/`Out` channel pair: stopping sends on
//! a `watch` cancellation flag and then awaits the run loop's join handle,
//! which only resolves once every peer session has actually wound down.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    conf::TorrentConf,
    disk,
    metainfo::Descriptor,
    peer::{session::PeerSession, SeedEntry, Seeder},
    progress::{ProgressEvent, ProgressSender},
    resume,
    scheduler::Scheduler,
    state::{FileStateStore, StateSnapshot, StateStore as _},
    storage_info::StorageInfo,
    tracker::{AnnounceStats, HttpTrackerClient},
    Bitfield, PeerId, Sha1Hash, TorrentId,
};

/// A running (or stopped) torrent and everything needed to control it.
pub(crate) struct TorrentHandle {
    pub id: TorrentId,
    pub info_hash: Sha1Hash,
    cancel_tx: watch::Sender<bool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl TorrentHandle {
    /// Spawns the torrent's run loop and returns a handle to control it.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: TorrentId,
        descriptor: Arc<Descriptor>,
        conf: TorrentConf,
        client_id: PeerId,
        listen_port: u16,
        seeder: Seeder,
        state_store: Arc<FileStateStore>,
        progress: ProgressSender,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let info_hash = descriptor.info_hash;
        let join = tokio::spawn(run(
            id,
            descriptor,
            conf,
            client_id,
            listen_port,
            seeder,
            state_store,
            progress,
            cancel_rx,
        ));
        Self { id, info_hash, cancel_tx, join: Some(join) }
    }

    /// Signals the run loop to stop and waits for it to actually exit.
    pub async fn stop(&mut self) {
        let _ = self.cancel_tx.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    id: TorrentId,
    descriptor: Arc<Descriptor>,
    conf: TorrentConf,
    client_id: PeerId,
    listen_port: u16,
    seeder: Seeder,
    state_store: Arc<FileStateStore>,
    progress: ProgressSender,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let storage = StorageInfo::new(&descriptor, conf.download_dir.clone());
    let piece_count = descriptor.piece_count();
    let disk = disk::spawn(storage);

    let snapshot_hint = match state_store.load(&descriptor.info_hash) {
        Ok(Some(snapshot)) if snapshot.info_hash == descriptor.info_hash => {
            Some(Bitfield::from(&snapshot.have))
        }
        Ok(_) => None,
        Err(err) => {
            log::warn!("failed to load persisted state for torrent {}: {}", id, err);
            None
        }
    };
    let have = resume::scan_with_hint(&descriptor, &disk, snapshot_hint.as_ref()).await;
    let already_complete = have.is_all_set();
    let (scheduler, _completed_rx, mut results_rx) = Scheduler::new(&descriptor, &have);
    let scheduler = Arc::new(scheduler);

    let tracker = HttpTrackerClient::new(client_id, listen_port);
    let stats = AnnounceStats {
        downloaded: have.count_ones() as u64 * descriptor.piece_length as u64,
        uploaded: 0,
        left: descriptor.total_len(),
    };

    // always announce, even when already complete: a finished torrent still
    // needs to advertise itself to the tracker as a seeder.
    let announced = tracker
        .announce(&descriptor, stats)
        .await
        .unwrap_or_else(|err| {
            log::warn!("torrent {} announce failed: {}", id, err);
            Vec::new()
        });
    let peer_addrs = if already_complete { Vec::new() } else { announced };

    let mut sessions = Vec::new();
    for addr in peer_addrs.into_iter().take(conf.max_connected_peer_count) {
        let session = PeerSession::new(
            addr,
            descriptor.info_hash,
            client_id,
            Arc::clone(&scheduler),
            disk.clone(),
            cancel_rx.clone(),
            piece_count,
        );
        progress.send(ProgressEvent::PeerConnected { torrent: id, addr });
        let progress = progress.clone();
        sessions.push(tokio::spawn(async move {
            if let Err(err) = session.run().await {
                log::debug!("session with {} ended: {}", addr, err);
            }
            progress.send(ProgressEvent::PeerDisconnected { torrent: id, addr });
        }));
    }

    // once every piece is accounted for, the torrent doesn't exit: it
    // registers with the seeder and parks, continuing to serve the pieces
    // it holds until the caller stops it (§4.8 Start/Stop).
    let mut seeding = false;
    if already_complete {
        seeder
            .register(
                descriptor.info_hash,
                SeedEntry { disk: disk.clone(), piece_count },
            )
            .await;
        seeding = true;
    }

    loop {
        if !seeding && scheduler.is_complete() {
            progress.send(ProgressEvent::TorrentCompleted { torrent: id });
            seeder
                .register(
                    descriptor.info_hash,
                    SeedEntry { disk: disk.clone(), piece_count },
                )
                .await;
            seeding = true;
        }

        tokio::select! {
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    break;
                }
            }
            result = results_rx.recv(), if !seeding => {
                match result {
                    Some(piece) => {
                        progress.send(ProgressEvent::PieceCompleted { torrent: id, index: piece.index });
                    }
                    None => break,
                }
            }
        }
    }

    for session in sessions {
        let _ = session.await;
    }

    let snapshot = StateSnapshot {
        info_hash: descriptor.info_hash,
        have: (&scheduler.completed()).into(),
        downloaded: scheduler.completed().count_ones() as u64 * descriptor.piece_length as u64,
        uploaded: 0,
    };
    if let Err(err) = state_store.save(&snapshot) {
        log::warn!("failed to persist state for torrent {}: {}", id, err);
    }

    if seeding {
        seeder.unregister(&descriptor.info_hash).await;
    }
    disk.shutdown();
}
