//! The seeding server: a TCP listener that serves `request`s for any
//! torrent this engine has fully downloaded (§4.6).

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::RwLock};
use tokio_util::codec::Framed;

use crate::{
    disk::DiskHandle,
    error::{Error, Result},
    wire::{Handshake, Message, MessageCodec},
    Bitfield, PeerId, Sha1Hash,
};

/// Everything the seeder needs to serve requests for one completed torrent.
#[derive(Clone)]
pub(crate) struct SeedEntry {
    pub disk: DiskHandle,
    pub piece_count: usize,
}

type Registry = Arc<RwLock<HashMap<Sha1Hash, SeedEntry>>>;

/// Listens for inbound peer connections and serves whichever registered,
/// completed torrents they ask for.
#[derive(Clone)]
pub(crate) struct Seeder {
    registry: Registry,
    client_id: PeerId,
}

impl Seeder {
    pub fn new(client_id: PeerId) -> Self {
        Self { registry: Arc::new(RwLock::new(HashMap::new())), client_id }
    }

    /// Registers a torrent as servable. Called once its last piece has been
    /// verified and written to disk.
    pub async fn register(&self, info_hash: Sha1Hash, entry: SeedEntry) {
        self.registry.write().await.insert(info_hash, entry);
    }

    pub async fn unregister(&self, info_hash: &Sha1Hash) {
        self.registry.write().await.remove(info_hash);
    }

    /// Binds `addr` and serves connections until the process exits. Each
    /// connection is handled on its own task so one slow or malicious peer
    /// can't stall the others.
    pub async fn listen(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("seeder listening on {}", addr);
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let registry = self.registry.clone();
            let client_id = self.client_id;
            tokio::spawn(async move {
                if let Err(err) = serve_connection(socket, registry, client_id).await {
                    log::debug!("seeding session with {} ended: {}", peer_addr, err);
                }
            });
        }
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    registry: Registry,
    client_id: PeerId,
) -> Result<()> {
    // we don't know the info hash yet, so we can't validate it before
    // reading; the peer sends theirs first in a well-formed handshake
    let peer_handshake = Handshake::read(&mut socket).await?;

    let entry = {
        let registry = registry.read().await;
        registry
            .get(&peer_handshake.info_hash)
            .cloned()
            .ok_or(Error::InvalidPeerInfoHash)?
    };

    let reply = Handshake::new(peer_handshake.info_hash, client_id);
    reply.reply(&mut socket).await?;

    let mut stream = Framed::new(socket, MessageCodec);
    let mut have = Bitfield::new(entry.piece_count);
    for index in 0..entry.piece_count {
        have.set(index);
    }
    stream.send(Message::Bitfield { bytes: have.to_wire_bytes() }).await?;

    let mut choked = true;
    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Interested => {
                choked = false;
                stream.send(Message::Unchoke).await?;
            }
            Message::NotInterested => choked = true,
            Message::Request { piece_index, offset, len } => {
                if choked {
                    continue;
                }
                let data = entry.disk.read_block(piece_index, offset, len).await?;
                stream
                    .send(Message::Piece { piece_index, offset, data })
                    .await?;
            }
            Message::Cancel { .. } | Message::KeepAlive | Message::Have { .. } => {}
            Message::Choke | Message::Unchoke | Message::Bitfield { .. } => {
                return Err(Error::UnexpectedMessage(
                    "unexpected message in seeding session".into(),
                ))
            }
            Message::Piece { .. } => {
                return Err(Error::UnexpectedMessage(
                    "leecher sent a piece message".into(),
                ))
            }
        }
    }

    Ok(())
}
