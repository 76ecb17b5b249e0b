use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

/// RFC1006 version byte
pub const TPKT_VERSION: u8 = 0x03;
/// Header size; the shortest legal frame also carries a 3-byte COTP header.
pub const TPKT_HEADER_LEN: usize = 4;
pub const MIN_FRAME_LEN: usize = 7;

/// TPKT (RFC1006) header
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tpkt {
    pub version: u8,
    pub reserved: u8,
    /// Total frame length, header included
    pub length: u16,
}

impl Tpkt {
    pub fn for_payload(payload_len: usize) -> Self {
        Self {
            version: TPKT_VERSION,
            reserved: 0x00,
            length: (TPKT_HEADER_LEN + payload_len) as u16,
        }
    }

    /// Peek the declared frame length from a buffer that may hold a partial frame.
    #[inline]
    pub fn peek_length(buf: &[u8]) -> Option<usize> {
        if buf.len() < TPKT_HEADER_LEN {
            return None;
        }
        Some(u16::from_be_bytes([buf[2], buf[3]]) as usize)
    }
}

impl WireEncode for Tpkt {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        TPKT_HEADER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(self.version);
        dst.put_u8(self.reserved);
        dst.put_u16(self.length);
        Ok(())
    }
}

impl WireDecode for Tpkt {
    type Error = Error;
    type Context = ();

    /// Parses the header and returns the bytes that follow it up to the declared length.
    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < TPKT_HEADER_LEN {
            return Err(Error::InsufficientData {
                needed: TPKT_HEADER_LEN,
                available: input.len(),
            });
        }
        if input[0] != TPKT_VERSION {
            return Err(Error::frame("tpkt version"));
        }
        let length = u16::from_be_bytes([input[2], input[3]]) as usize;
        if length < MIN_FRAME_LEN {
            return Err(Error::frame("tpkt length"));
        }
        if length != input.len() {
            return Err(Error::frame("tpkt length does not match frame"));
        }
        Ok((
            &input[TPKT_HEADER_LEN..length],
            Tpkt {
                version: input[0],
                reserved: input[1],
                length: length as u16,
            },
        ))
    }
}
