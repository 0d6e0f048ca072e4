//! Shared scaffolding for the end-to-end scenario tests: a hand-rolled
//! tracker stub (the crate has no test-mode tracker trait to swap in, so the
//! real `HttpTrackerClient` talks to this over a loopback socket) and
//! metainfo-bytes builders so each scenario can construct a `Descriptor`
//! through the same public `Engine::add_torrent` entry point production code
//! uses.

use std::net::SocketAddr;

use cratetorrent_core::metainfo::{File, Info, Metainfo};
use sha1::{Digest, Sha1};

/// Grabs a currently-free loopback port by binding to port 0 and releasing
/// it immediately. Good enough for tests: the window between releasing it
/// here and the engine's own listener binding it is vanishingly small.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Encodes a list of IPv4 peer addresses in the BitTorrent compact peer
/// format (6 bytes each: 4-byte address, 2-byte big-endian port).
pub fn compact_peers(addrs: &[SocketAddr]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addrs.len() * 6);
    for addr in addrs {
        match addr {
            SocketAddr::V4(v4) => {
                out.extend_from_slice(&v4.ip().octets());
                out.extend_from_slice(&v4.port().to_be_bytes());
            }
            SocketAddr::V6(_) => panic!("test helper only supports ipv4 peers"),
        }
    }
    out
}

/// Bencodes a bencoded tracker announce response dict with a compact peers
/// string, the same shape `HttpTrackerClient` expects back.
fn bencode_tracker_response(peers: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"d8:intervali1800e5:peers");
    out.extend_from_slice(peers.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(peers);
    out.push(b'e');
    out
}

/// Starts a minimal HTTP/1.1 server on a loopback port that always answers
/// every request with a bencoded compact-peers response body, and returns
/// its base announce URL. Good enough to stand in for a tracker: the
/// `HttpTrackerClient` only ever issues a single unauthenticated GET.
pub async fn spawn_tracker_stub(peers: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = bencode_tracker_response(&peers);

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let body = body.clone();
            tokio::spawn(async move {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 4096];
                // drain (at least some of) the request; we don't parse it,
                // every request gets the same canned response.
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/announce", addr)
}

/// Builds valid bencoded `.torrent` metainfo bytes for a single-file
/// torrent, the way [`cratetorrent_core::engine::Engine::add_torrent`]
/// expects to receive them.
pub fn single_file_metainfo(
    announce: &str,
    name: &str,
    len: u64,
    piece_length: u64,
    piece_hashes: &[[u8; 20]],
) -> Vec<u8> {
    let mut pieces = Vec::with_capacity(piece_hashes.len() * 20);
    for hash in piece_hashes {
        pieces.extend_from_slice(hash);
    }
    let metainfo = Metainfo {
        announce: Some(announce.to_string()),
        info: Info {
            name: name.to_string(),
            pieces,
            piece_length,
            length: Some(len),
            files: None,
            private: None,
        },
    };
    serde_bencode::to_bytes(&metainfo).unwrap()
}

/// Builds valid bencoded `.torrent` metainfo bytes for a multi-file torrent.
pub fn multi_file_metainfo(
    announce: &str,
    name: &str,
    files: &[(&str, u64)],
    piece_length: u64,
    piece_hashes: &[[u8; 20]],
) -> Vec<u8> {
    let mut pieces = Vec::with_capacity(piece_hashes.len() * 20);
    for hash in piece_hashes {
        pieces.extend_from_slice(hash);
    }
    let metainfo = Metainfo {
        announce: Some(announce.to_string()),
        info: Info {
            name: name.to_string(),
            pieces,
            piece_length,
            length: None,
            files: Some(
                files
                    .iter()
                    .map(|(path, length)| File { path: vec![path.to_string()], length: *length as i64 })
                    .collect(),
            ),
            private: None,
        },
    };
    serde_bencode::to_bytes(&metainfo).unwrap()
}
