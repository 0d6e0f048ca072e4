//! Progress reporting: a broadcast channel of [`ProgressEvent`]s any number
//! of observers (a UI, a log sink, a test) can subscribe to (§6 ambient
//! expansion).

use tokio::sync::broadcast;

use crate::{PieceIndex, TorrentId};

const CHANNEL_CAPACITY: usize = 256;

/// An event describing a change in a torrent's download/seed progress.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    PieceCompleted { torrent: TorrentId, index: PieceIndex },
    TorrentCompleted { torrent: TorrentId },
    PeerConnected { torrent: TorrentId, addr: std::net::SocketAddr },
    PeerDisconnected { torrent: TorrentId, addr: std::net::SocketAddr },
}

/// The sending half of the progress channel, held by whatever produces
/// events (scheduler, peer sessions, the torrent controller).
#[derive(Clone)]
pub(crate) struct ProgressSender {
    inner: broadcast::Sender<ProgressEvent>,
}

impl ProgressSender {
    pub fn new() -> (Self, broadcast::Receiver<ProgressEvent>) {
        let (inner, rx) = broadcast::channel(CHANNEL_CAPACITY);
        (Self { inner }, rx)
    }

    /// Sends an event to all current subscribers. A closed channel (no
    /// subscribers left) is not an error: progress events are best-effort.
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.inner.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.subscribe()
    }
}
