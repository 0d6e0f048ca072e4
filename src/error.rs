//! The crate's error type and the `Result` alias used throughout.
//!
//! Every error kind named in the design's error handling section is a
//! variant here rather than its own type, so call sites can match on the
//! specific failure they care about (e.g. [`Error::IntegrityFailure`] is
//! piece-local and non-fatal, while [`Error::InvalidPeerInfoHash`] is
//! session-fatal) while adapter code (metainfo, tracker, state) can still use
//! `?` freely via the `#[from]` conversions.

use crate::{PieceIndex, TorrentId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to establish a TCP connection to a peer within the connect
    /// timeout.
    #[error("connect failure: {0}")]
    ConnectFailure(#[source] std::io::Error),

    /// The peer handshake could not be completed (malformed, or timed out).
    #[error("handshake failure: {0}")]
    HandshakeFailure(String),

    /// The peer's advertised info hash doesn't match ours.
    #[error("peer info hash mismatch")]
    InvalidPeerInfoHash,

    /// A peer that we expect to be a seed did not send a bitfield as its
    /// first post-handshake message.
    #[error("peer did not send bitfield after handshake")]
    PeerNotSeed,

    /// A bitfield message arrived outside of the availability-exchange
    /// state.
    #[error("bitfield message received outside of handshake")]
    BitfieldNotAfterHandshake,

    /// A message's payload was shorter than its fixed part, or otherwise
    /// violated the wire format (§4.1).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A message was well-formed but not valid in the session's current
    /// state.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A read or write did not complete within its deadline, after
    /// exhausting the retry budget.
    #[error("i/o timed out")]
    Timeout,

    /// An assembled piece's SHA-1 did not match the expected hash. Piece
    /// local, not session-fatal.
    #[error("piece {0} failed integrity check")]
    IntegrityFailure(PieceIndex),

    /// The piece index is outside of `0..piece_count`.
    #[error("invalid piece index")]
    InvalidPieceIndex,

    /// Announcing to the tracker failed.
    #[error("tracker request failed: {0}")]
    TrackerFailure(String),

    /// The torrent descriptor (from the metainfo parser) is invalid.
    #[error("invalid torrent descriptor: {0}")]
    DescriptorInvalid(String),

    /// Referenced an unknown torrent id.
    #[error("unknown torrent id {0}")]
    InvalidTorrentId(TorrentId),

    /// A file write or read failed. Fatal for the torrent.
    #[error("disk i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decode error: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("state snapshot (de)serialization error: {0}")]
    State(#[from] Box<bincode::ErrorKind>),

    #[error("tracker http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The disk actor, scheduler, or session's channel peer has gone away.
    #[error("internal channel closed")]
    ChannelClosed,

    /// The torrent's stop signal fired while a block request was in flight.
    #[error("session cancelled")]
    Cancelled,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}
