//! The piece scheduler: a shared work queue handed out to one worker task
//! per peer, and a results channel the workers report back on (§4.4).
//!
//! The original design's per-piece work queue is realized here as a
//! `Mutex`-protected `VecDeque` rather than a channel, since several workers
//! need to both take work from it and push failed work back onto it; a
//! `tokio::sync::watch` broadcasts the completed-pieces bitfield so sessions
//! can build `have` announcements without polling the scheduler.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use tokio::sync::{mpsc, watch};

use crate::{metainfo::Descriptor, Bitfield, PieceIndex, Sha1Hash};

/// A unit of work: download and verify the piece at `index`.
#[derive(Clone, Debug)]
pub(crate) struct PieceWork {
    pub index: PieceIndex,
    pub hash: Sha1Hash,
    pub len: u32,
}

/// Reported by a worker after it finishes (successfully or not) with a
/// piece, for progress tracking (§6).
#[derive(Clone, Debug)]
pub(crate) struct PieceResult {
    pub index: PieceIndex,
    pub len: u32,
}

/// The shared scheduler state for a single torrent's download.
pub(crate) struct Scheduler {
    queue: Mutex<VecDeque<PieceWork>>,
    completed_tx: watch::Sender<Bitfield>,
    result_tx: mpsc::UnboundedSender<PieceResult>,
}

impl Scheduler {
    /// Builds a scheduler with one work item per piece not already marked
    /// present in `have`.
    pub fn new(
        descriptor: &Descriptor,
        have: &Bitfield,
    ) -> (Self, watch::Receiver<Bitfield>, mpsc::UnboundedReceiver<PieceResult>) {
        let mut queue = VecDeque::with_capacity(descriptor.piece_count());
        for (index, hash) in descriptor.piece_hashes.iter().enumerate() {
            if have.has(index) {
                continue;
            }
            let len = piece_len(descriptor, index);
            queue.push_back(PieceWork { index, hash: *hash, len });
        }
        let (completed_tx, completed_rx) = watch::channel(have.clone());
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        (
            Self { queue: Mutex::new(queue), completed_tx, result_tx },
            completed_rx,
            result_rx,
        )
    }

    /// Takes the next piece of work off the queue, if any remains.
    pub fn next_work(&self) -> Option<PieceWork> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Puts a piece of work back on the queue, e.g. after a peer disconnects
    /// mid-download or the piece failed its integrity check.
    pub fn requeue(&self, work: PieceWork) {
        self.queue.lock().unwrap().push_back(work);
    }

    /// Marks a piece as completed and reports it on the results channel.
    pub fn mark_done(&self, index: PieceIndex, len: u32) {
        self.completed_tx.send_modify(|bitfield| bitfield.set(index));
        let _ = self.result_tx.send(PieceResult { index, len });
    }

    /// Whether every piece has been accounted for (queue empty and every bit
    /// in the completed bitfield set).
    pub fn is_complete(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
            && self.completed_tx.borrow().is_all_set()
    }

    /// The current snapshot of completed pieces.
    pub fn completed(&self) -> Bitfield {
        self.completed_tx.borrow().clone()
    }
}

fn piece_len(descriptor: &Descriptor, index: PieceIndex) -> u32 {
    let piece_count = descriptor.piece_count();
    if index == piece_count - 1 {
        let total = descriptor.total_len();
        (total - descriptor.piece_length as u64 * (piece_count as u64 - 1)) as u32
    } else {
        descriptor.piece_length
    }
}
