//! The fixed 68-byte handshake that precedes the message stream (§4.1).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    conf::HANDSHAKE_TIMEOUT,
    error::{Error, Result},
    PeerId, Sha1Hash,
};

const PROTOCOL: &[u8] = b"BitTorrent protocol";
const HANDSHAKE_LEN: usize = 1 + PROTOCOL.len() + 8 + 20 + 20;

/// A peer handshake: protocol identification, an info hash, and a peer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        Self { info_hash, peer_id }
    }

    fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        let mut pos = 0;
        buf[pos] = PROTOCOL.len() as u8;
        pos += 1;
        buf[pos..pos + PROTOCOL.len()].copy_from_slice(PROTOCOL);
        pos += PROTOCOL.len();
        // 8 reserved bytes, left zeroed: no extension bits are set.
        pos += 8;
        buf[pos..pos + 20].copy_from_slice(&self.info_hash);
        pos += 20;
        buf[pos..pos + 20].copy_from_slice(&self.peer_id);
        buf
    }

    fn decode(buf: &[u8; HANDSHAKE_LEN]) -> Result<Self> {
        let pstrlen = buf[0] as usize;
        if pstrlen != PROTOCOL.len() || &buf[1..1 + pstrlen] != PROTOCOL {
            return Err(Error::HandshakeFailure(
                "unrecognized protocol string".into(),
            ));
        }
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[1 + pstrlen + 8..1 + pstrlen + 8 + 20]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[1 + pstrlen + 28..1 + pstrlen + 48]);
        Ok(Self { info_hash, peer_id })
    }

    /// Writes this handshake to `socket` and reads back the peer's, enforcing
    /// the handshake timeout on the whole exchange. Used by the dialing side
    /// of a connection.
    pub async fn exchange<S>(&self, socket: &mut S) -> Result<Handshake>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            socket.write_all(&self.encode()).await?;
            socket.flush().await?;
            let mut buf = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut buf).await?;
            Handshake::decode(&buf)
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Reads a handshake off `socket` without writing one first. Used by the
    /// accepting side of a connection, which must validate the dialing
    /// peer's info hash before replying.
    pub async fn read<S>(socket: &mut S) -> Result<Handshake>
    where
        S: tokio::io::AsyncRead + Unpin,
    {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            let mut buf = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut buf).await?;
            Handshake::decode(&buf)
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Writes this handshake to `socket` without reading one back. Used by
    /// the accepting side, after it has already read and validated the
    /// dialing peer's handshake via [`Handshake::read`].
    pub async fn reply<S>(&self, socket: &mut S) -> Result<()>
    where
        S: tokio::io::AsyncWrite + Unpin,
    {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            socket.write_all(&self.encode()).await?;
            socket.flush().await?;
            Ok(())
        })
        .await
        .map_err(|_| Error::Timeout)?
    }
}
