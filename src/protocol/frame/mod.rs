pub mod addr;
mod builder;
pub mod comm;
pub mod cotp;
pub mod iter;
mod pdu;
pub mod tpkt;
pub mod tsap;
pub mod types;

use super::error::{Error, Result};
use bytes::{BufMut, Bytes};

/// Types that serialize onto the wire.
pub trait WireEncode {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    fn encoded_len(&self, ctx: &Self::Context) -> usize;
    fn encode_to<B: BufMut>(
        &self,
        dst: &mut B,
        ctx: &Self::Context,
    ) -> std::result::Result<(), Self::Error>;
}

/// Types parsed from the wire. `parent` is the owning buffer of `input`, so
/// implementations can hand out zero-copy `Bytes` slices.
pub trait WireDecode: Sized {
    type Error: std::fmt::Debug + Send + Sync + 'static;
    type Context;

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        ctx: &Self::Context,
    ) -> std::result::Result<(&'a [u8], Self), Self::Error>;
}

/// One TPKT frame: TPKT header, COTP TPDU and, for DT TPDUs, the S7 PDU.
#[derive(Debug, Clone)]
pub struct S7Message {
    pub tpkt: Tpkt,
    pub cotp: Cotp,
    pub pdu: Option<S7Pdu>,
}

impl S7Message {
    /// Decode a complete frame as delivered by the stream codec.
    pub fn decode(frame: &Bytes) -> Result<S7Message> {
        let (cotp_bytes, tpkt) = Tpkt::parse(frame, frame, &())?;
        let (user, cotp) = Cotp::parse(cotp_bytes, frame, &())?;
        let pdu = match &cotp {
            Cotp::D(params) if !params.eot => {
                return Err(Error::frame("segmented cotp data"));
            }
            Cotp::D(_) => {
                let (_, pdu) = S7Pdu::parse(user, frame, &())?;
                Some(pdu)
            }
            _ => None,
        };
        Ok(S7Message { tpkt, cotp, pdu })
    }

    pub fn encoded_len(&self) -> usize {
        self.tpkt.encoded_len(&())
            + self.cotp.encoded_len(&())
            + self.pdu.as_ref().map_or(0, |p| p.encoded_len(&()))
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) -> Result<()> {
        Tpkt::for_payload(self.encoded_len() - tpkt::TPKT_HEADER_LEN).encode_to(dst, &())?;
        self.cotp.encode_to(dst, &())?;
        if let Some(pdu) = &self.pdu {
            pdu.encode_to(dst, &())?;
        }
        Ok(())
    }
}

pub use addr::{
    parse_address, BytesOptions, PointAddress, StringLayout, StringOptions, TagOptions, ValueKind,
};
pub use builder::{
    build_cotp_cr_message, build_cotp_data_message, build_read_var, build_setup_comm,
    build_write_var,
};
pub use comm::{HeaderError, S7Header, SequenceCounter};
pub use cotp::{ConnectParams, Cotp, DataParams, DisconnectParams};
pub use iter::{
    parse_ack_param, S7VarSpec, SetupParam, VarPayloadDataItemIter, VarPayloadStatusItemIter,
};
pub use pdu::S7Pdu;
pub use tpkt::Tpkt;
pub use tsap::{ConnectionType, Tsap, TsapPair};
pub use types::{
    CotpType, S7Area, S7DataVariableType, S7Function, S7PduType, S7ReturnCode, S7SyntaxId,
    S7TransportSize,
};
