use super::{
    super::error::{Error, ErrorClass, Result},
    types::S7PduType,
};
use bytes::BufMut;

pub const S7_PROTOCOL_ID: u8 = 0x32;
pub const S7_HEADER_LEN: usize = 10;
pub const S7_ACK_HEADER_LEN: usize = 12;

/// Error field of an Ack/AckData header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderError {
    pub class: ErrorClass,
    pub code: u8,
}

impl HeaderError {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.class == ErrorClass::NoError && self.code == 0
    }
}

/// S7 Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Header {
    pub pdu_type: S7PduType,
    pub pdu_ref: u16,
    pub param_len: u16,
    pub payload_len: u16,
    /// Present on Ack/AckData only
    pub error: Option<HeaderError>,
}

impl S7Header {
    pub fn job(pdu_ref: u16, param_len: usize, payload_len: usize) -> Self {
        Self {
            pdu_type: S7PduType::Job,
            pdu_ref,
            param_len: param_len as u16,
            payload_len: payload_len as u16,
            error: None,
        }
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        if self.pdu_type.has_error_field() {
            S7_ACK_HEADER_LEN
        } else {
            S7_HEADER_LEN
        }
    }

    /// Parse the 10-byte header, plus the 2-byte error field on Ack/AckData.
    pub fn parse(input: &[u8]) -> Result<(S7Header, &[u8])> {
        if input.len() < S7_HEADER_LEN {
            return Err(Error::InsufficientData {
                needed: S7_HEADER_LEN,
                available: input.len(),
            });
        }
        if input[0] != S7_PROTOCOL_ID {
            return Err(Error::frame("s7 protocol id"));
        }
        let pdu_type = S7PduType::try_from(input[1]).map_err(|_| Error::frame("s7 pdu type"))?;
        let pdu_ref = u16::from_be_bytes([input[4], input[5]]);
        let param_len = u16::from_be_bytes([input[6], input[7]]);
        let payload_len = u16::from_be_bytes([input[8], input[9]]);

        let mut rest = &input[S7_HEADER_LEN..];
        let error = if pdu_type.has_error_field() {
            if rest.len() < 2 {
                return Err(Error::InsufficientData {
                    needed: 2,
                    available: rest.len(),
                });
            }
            let err = HeaderError {
                class: ErrorClass::from(rest[0]),
                code: rest[1],
            };
            rest = &rest[2..];
            Some(err)
        } else {
            None
        };
        Ok((
            S7Header {
                pdu_type,
                pdu_ref,
                param_len,
                payload_len,
                error,
            },
            rest,
        ))
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(S7_PROTOCOL_ID);
        dst.put_u8(self.pdu_type as u8);
        dst.put_u16(0x0000);
        dst.put_u16(self.pdu_ref);
        dst.put_u16(self.param_len);
        dst.put_u16(self.payload_len);
        if self.pdu_type.has_error_field() {
            let err = self.error.unwrap_or(HeaderError {
                class: ErrorClass::NoError,
                code: 0,
            });
            dst.put_u8(err.class.into());
            dst.put_u8(err.code);
        }
    }
}

/// Per-connection PDU reference counter. Starts at 1 and wraps 0xFFFF -> 0.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u16,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceCounter {
    /// Returns the reference for the next outbound request.
    #[inline]
    pub fn next(&mut self) -> u16 {
        let v = self.next;
        self.next = self.next.wrapping_add(1);
        v
    }
}
