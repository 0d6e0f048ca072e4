//! S6: cancellation while downloading from a peer that unchokes, advertises
//! every piece, and then never answers another request. Stopping the
//! torrent must make the peer session wind down within a few seconds rather
//! than waiting out its full timeout-retry budget.

mod common;

use std::time::Duration;

use cratetorrent_core::{conf::Conf, engine::Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const PROTOCOL: &[u8] = b"BitTorrent protocol";
const HANDSHAKE_LEN: usize = 1 + 20 /* "BitTorrent protocol" */ + 8 + 20 + 20;

fn handshake_reply(info_hash: [u8; 20]) -> [u8; HANDSHAKE_LEN] {
    let mut buf = [0u8; HANDSHAKE_LEN];
    let mut pos = 0;
    buf[pos] = PROTOCOL.len() as u8;
    pos += 1;
    buf[pos..pos + PROTOCOL.len()].copy_from_slice(PROTOCOL);
    pos += PROTOCOL.len();
    pos += 8; // reserved
    buf[pos..pos + 20].copy_from_slice(&info_hash);
    pos += 20;
    buf[pos..pos + 20].copy_from_slice(&[0x42u8; 20]);
    buf
}

/// Accepts a single connection, completes the handshake, claims to have
/// every piece and unchokes the leecher, then goes silent forever (never
/// answers a single block request).
async fn run_stalling_peer(listener: tokio::net::TcpListener, info_hash: [u8; 20]) {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut their_handshake = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut their_handshake).await.unwrap();
    socket.write_all(&handshake_reply(info_hash)).await.unwrap();

    // bitfield: claims all 3 pieces present (one byte is enough for 3 bits).
    socket.write_all(&[0, 0, 0, 2, 5, 0xFFu8]).await.unwrap();
    // unchoke: the leecher is now free to issue requests we'll never answer.
    socket.write_all(&[0, 0, 0, 1, 1]).await.unwrap();

    // hold the connection open and go quiet; the leecher's requests pile up
    // unanswered until the torrent is stopped.
    tokio::time::sleep(Duration::from_secs(30)).await;
}

#[tokio::test]
async fn stopping_a_torrent_with_a_stalled_peer_exits_promptly() {
    let piece_length = 4u64;
    let piece_hashes: Vec<[u8; 20]> = vec![[0u8; 20]; 3];
    let total_len = piece_length * piece_hashes.len() as u64;

    let leech_dir = tempfile::tempdir().unwrap();
    let mut leech_conf = Conf::new(leech_dir.path());
    leech_conf.engine.listen_port = common::free_port();
    let leech_state_dir = tempfile::tempdir().unwrap();
    let leech_engine = Engine::new(leech_conf, leech_state_dir.path());

    let metainfo_probe = common::single_file_metainfo(
        "unused",
        "file.bin",
        total_len,
        piece_length,
        &piece_hashes,
    );
    let info_hash = cratetorrent_core::metainfo::Metainfo::from_bytes(&metainfo_probe)
        .unwrap()
        .info_hash()
        .unwrap();

    let peer_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer_listener.local_addr().unwrap();
    tokio::spawn(run_stalling_peer(peer_listener, info_hash));

    let tracker_url = common::spawn_tracker_stub(common::compact_peers(&[peer_addr])).await;
    let metainfo = common::single_file_metainfo(
        &tracker_url,
        "file.bin",
        total_len,
        piece_length,
        &piece_hashes,
    );
    let id = leech_engine.add_torrent(&metainfo).await.unwrap();
    leech_engine.start_torrent(id).await.unwrap();

    // let the session dial, handshake, and start waiting on block requests.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(3), leech_engine.stop_torrent(id)).await;
    assert!(
        stopped.is_ok(),
        "stop_torrent did not return within 3s of a stalled peer session"
    );
}
