use super::frame::tpkt::{Tpkt, MIN_FRAME_LEN, TPKT_HEADER_LEN, TPKT_VERSION};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Splits a byte stream into complete TPKT frames. Frames are passed up
/// undecoded; layer parsing happens in the session.
#[derive(Debug, Default, Clone)]
pub struct Codec;

impl Decoder for Codec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(length) = Tpkt::peek_length(src) else {
            return Ok(None);
        };
        if src[0] != TPKT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid TPKT version",
            ));
        }
        if length < MIN_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid TPKT length",
            ));
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for Codec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() < TPKT_HEADER_LEN || item[0] != TPKT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "outbound frame lacks a TPKT header",
            ));
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}
