//! A single outbound leecher session: dial a peer, exchange a handshake,
//! and pull pieces off the shared scheduler until none remain or the
//! connection dies (§4.3, §4.4).

use std::{net::SocketAddr, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::watch};
use tokio_util::codec::Framed;

use crate::{
    conf::{
        BITFIELD_TIMEOUT, CONNECT_TIMEOUT, MAX_BACKLOG, MAX_BLOCK_SIZE,
        STEADY_STATE_TIMEOUT, TIMEOUT_RETRY_LIMIT,
    },
    disk::DiskHandle,
    error::{Error, Result},
    scheduler::{PieceWork, Scheduler},
    verify::verify_piece,
    wire::{Handshake, Message, MessageCodec},
    Bitfield, PeerId, Sha1Hash,
};

/// Tracks whether the remote peer is choking us.
#[derive(Clone, Copy, Debug)]
struct Status {
    choked: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self { choked: true }
    }
}

/// An outbound session with a single peer, downloading pieces from the
/// shared scheduler's work queue.
pub(crate) struct PeerSession {
    addr: SocketAddr,
    info_hash: Sha1Hash,
    client_id: PeerId,
    scheduler: Arc<Scheduler>,
    disk: DiskHandle,
    cancel: watch::Receiver<bool>,
    peer_choking: Status,
    peer_pieces: Bitfield,
}

impl PeerSession {
    pub fn new(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        client_id: PeerId,
        scheduler: Arc<Scheduler>,
        disk: DiskHandle,
        cancel: watch::Receiver<bool>,
        piece_count: usize,
    ) -> Self {
        Self {
            addr,
            info_hash,
            client_id,
            scheduler,
            disk,
            cancel,
            peer_choking: Status::default(),
            peer_pieces: Bitfield::new(piece_count),
        }
    }

    /// Runs the session to completion: connects, handshakes, and downloads
    /// pieces until the scheduler is drained, the peer disconnects, or
    /// cancellation is requested.
    ///
    /// A piece-local integrity failure does not end the session; a
    /// connection-level error does.
    pub async fn run(mut self) -> Result<()> {
        let mut socket = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(self.addr))
            .await
            .map_err(|_| Error::Timeout)??;

        let handshake = Handshake::new(self.info_hash, self.client_id);
        let peer_handshake = handshake.exchange(&mut socket).await?;
        if peer_handshake.info_hash != self.info_hash {
            return Err(Error::InvalidPeerInfoHash);
        }

        let mut stream = Framed::new(socket, MessageCodec);

        let first = tokio::time::timeout(BITFIELD_TIMEOUT, stream.next())
            .await
            .map_err(|_| Error::Timeout)?
            .ok_or(Error::ChannelClosed)??;
        match first {
            Message::Bitfield { bytes } => {
                self.peer_pieces = Bitfield::from_wire_bytes(&bytes, self.peer_pieces.len());
            }
            Message::KeepAlive => {}
            _ => return Err(Error::PeerNotSeed),
        }

        stream.send(Message::Unchoke).await?;
        stream.send(Message::Interested).await?;

        self.download_loop(&mut stream).await
    }

    async fn download_loop(
        &mut self,
        stream: &mut Framed<TcpStream, MessageCodec>,
    ) -> Result<()> {
        loop {
            if *self.cancel.borrow() {
                return Ok(());
            }

            let work = loop {
                match self.scheduler.next_work() {
                    Some(work) => break work,
                    None => return Ok(()),
                }
            };

            if !self.peer_pieces.has(work.index) {
                // this peer can't serve this piece; give another worker a
                // chance at it and try again with the next one
                self.scheduler.requeue(work);
                tokio::task::yield_now().await;
                continue;
            }

            match self.attempt_download_piece(stream, &work).await {
                Ok(data) => {
                    if verify_piece(&data, &work.hash) {
                        stream.send(Message::Have { piece_index: work.index }).await?;
                        self.disk.write_piece(work.index, data).await?;
                        self.scheduler.mark_done(work.index, work.len);
                    } else {
                        log::warn!(
                            "piece {} from {} failed integrity check",
                            work.index,
                            self.addr
                        );
                        self.scheduler.requeue(work);
                    }
                }
                Err(err) => {
                    self.scheduler.requeue(work);
                    return Err(err);
                }
            }
        }
    }

    /// Downloads a single piece, pipelining up to [`MAX_BACKLOG`] outstanding
    /// block requests at a time (§4.4).
    async fn attempt_download_piece(
        &mut self,
        stream: &mut Framed<TcpStream, MessageCodec>,
        work: &PieceWork,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; work.len as usize];
        let mut requested = 0u32;
        let mut downloaded = 0u32;
        let mut backlog = 0usize;
        let mut timeouts = 0u32;

        while downloaded < work.len {
            if *self.cancel.borrow() {
                return Err(Error::Cancelled);
            }

            if !self.peer_choking.choked {
                while backlog < MAX_BACKLOG && requested < work.len {
                    let block_len = MAX_BLOCK_SIZE.min(work.len - requested);
                    stream
                        .send(Message::Request {
                            piece_index: work.index,
                            offset: requested,
                            len: block_len,
                        })
                        .await?;
                    requested += block_len;
                    backlog += 1;
                }
            }

            let msg = match tokio::time::timeout(STEADY_STATE_TIMEOUT, stream.next()).await {
                Ok(Some(msg)) => msg?,
                Ok(None) => return Err(Error::ChannelClosed),
                Err(_) => {
                    timeouts += 1;
                    if timeouts > TIMEOUT_RETRY_LIMIT {
                        return Err(Error::Timeout);
                    }
                    continue;
                }
            };
            timeouts = 0;

            match msg {
                Message::Choke => self.peer_choking.choked = true,
                Message::Unchoke => self.peer_choking.choked = false,
                Message::Have { piece_index } => self.peer_pieces.set(piece_index),
                Message::Bitfield { .. } => {
                    return Err(Error::BitfieldNotAfterHandshake)
                }
                Message::Piece { piece_index, offset, data } => {
                    if piece_index != work.index {
                        return Err(Error::MalformedMessage(
                            "piece index mismatch".into(),
                        ));
                    }
                    if offset as usize + data.len() > buf.len() {
                        return Err(Error::MalformedMessage(
                            "piece block out of bounds".into(),
                        ));
                    }
                    buf[offset as usize..offset as usize + data.len()]
                        .copy_from_slice(&data);
                    downloaded += data.len() as u32;
                    backlog = backlog.saturating_sub(1);
                }
                Message::KeepAlive
                | Message::Interested
                | Message::NotInterested
                | Message::Request { .. }
                | Message::Cancel { .. } => {}
            }
        }

        Ok(buf)
    }
}
