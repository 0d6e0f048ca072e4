//! The length-prefixed message stream that follows the handshake (§4.1).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::{Error, Result},
    PieceIndex,
};

const CHOKE: u8 = 0;
const UNCHOKE: u8 = 1;
const INTERESTED: u8 = 2;
const NOT_INTERESTED: u8 = 3;
const HAVE: u8 = 4;
const BITFIELD: u8 = 5;
const REQUEST: u8 = 6;
const PIECE: u8 = 7;
const CANCEL: u8 = 8;

/// A peer wire message, sans handshake (§4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Message {
    /// The zero-length keep-alive message (no message id).
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: PieceIndex },
    Bitfield { bytes: Vec<u8> },
    Request { piece_index: PieceIndex, offset: u32, len: u32 },
    Piece { piece_index: PieceIndex, offset: u32, data: Vec<u8> },
    Cancel { piece_index: PieceIndex, offset: u32, len: u32 },
}

/// Decodes/encodes the `u32` length-prefixed framing of the peer message
/// stream.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }
            let len = u32::from_be_bytes(src[0..4].try_into().unwrap()) as usize;
            if len == 0 {
                src.advance(4);
                return Ok(Some(Message::KeepAlive));
            }
            if src.len() < 4 + len {
                src.reserve(4 + len - src.len());
                return Ok(None);
            }

            src.advance(4);
            let mut payload = src.split_to(len);
            let id = payload.get_u8();

            let msg = match id {
                CHOKE => Message::Choke,
                UNCHOKE => Message::Unchoke,
                INTERESTED => Message::Interested,
                NOT_INTERESTED => Message::NotInterested,
                HAVE => {
                    if payload.len() != 4 {
                        return Err(Error::MalformedMessage(
                            "have payload must be 4 bytes".into(),
                        ));
                    }
                    Message::Have {
                        piece_index: payload.get_u32() as PieceIndex,
                    }
                }
                BITFIELD => Message::Bitfield {
                    bytes: payload.to_vec(),
                },
                REQUEST | CANCEL => {
                    if payload.len() != 12 {
                        return Err(Error::MalformedMessage(
                            "request/cancel payload must be 12 bytes".into(),
                        ));
                    }
                    let piece_index = payload.get_u32() as PieceIndex;
                    let offset = payload.get_u32();
                    let len = payload.get_u32();
                    if id == REQUEST {
                        Message::Request { piece_index, offset, len }
                    } else {
                        Message::Cancel { piece_index, offset, len }
                    }
                }
                PIECE => {
                    if payload.len() < 8 {
                        return Err(Error::MalformedMessage(
                            "piece payload must be at least 8 bytes".into(),
                        ));
                    }
                    let piece_index = payload.get_u32() as PieceIndex;
                    let offset = payload.get_u32();
                    Message::Piece {
                        piece_index,
                        offset,
                        data: payload.to_vec(),
                    }
                }
                other => {
                    // unknown or extension message id: the frame is already
                    // fully consumed above, just skip it and decode the next
                    // one rather than tearing down the session over it.
                    log::debug!("ignoring message with unknown id {}", other);
                    continue;
                }
            };

            return Ok(Some(msg));
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        match msg {
            Message::KeepAlive => {
                dst.put_u32(0);
            }
            Message::Choke => put_id_only(dst, CHOKE),
            Message::Unchoke => put_id_only(dst, UNCHOKE),
            Message::Interested => put_id_only(dst, INTERESTED),
            Message::NotInterested => put_id_only(dst, NOT_INTERESTED),
            Message::Have { piece_index } => {
                dst.put_u32(1 + 4);
                dst.put_u8(HAVE);
                dst.put_u32(piece_index as u32);
            }
            Message::Bitfield { bytes } => {
                dst.put_u32(1 + bytes.len() as u32);
                dst.put_u8(BITFIELD);
                dst.extend_from_slice(&bytes);
            }
            Message::Request { piece_index, offset, len } => {
                dst.put_u32(1 + 12);
                dst.put_u8(REQUEST);
                dst.put_u32(piece_index as u32);
                dst.put_u32(offset);
                dst.put_u32(len);
            }
            Message::Cancel { piece_index, offset, len } => {
                dst.put_u32(1 + 12);
                dst.put_u8(CANCEL);
                dst.put_u32(piece_index as u32);
                dst.put_u32(offset);
                dst.put_u32(len);
            }
            Message::Piece { piece_index, offset, data } => {
                dst.put_u32(1 + 8 + data.len() as u32);
                dst.put_u8(PIECE);
                dst.put_u32(piece_index as u32);
                dst.put_u32(offset);
                dst.extend_from_slice(&data);
            }
        }
        Ok(())
    }
}

fn put_id_only(dst: &mut BytesMut, id: u8) {
    dst.put_u32(1);
    dst.put_u8(id);
}
