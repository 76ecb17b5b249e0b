use super::{
    super::error::{Error, Result},
    types::CotpType,
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

const PARAM_TPDU_SIZE: u8 = 0xC0;
const PARAM_SRC_TSAP: u8 = 0xC1;
const PARAM_DST_TSAP: u8 = 0xC2;

/// Fixed part of a CR/CC body: dst_ref(2) src_ref(2) class(1)
const CONNECT_FIXED_LEN: usize = 5;

/// Parameters shared by Connection Request and Connection Confirm TPDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    /// Class/option byte; class 0 for ISO-on-TCP
    pub class: u8,
    /// TPDU size code (2^n bytes)
    pub tpdu_size: u8,
    pub src_tsap: u16,
    pub dst_tsap: u16,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            dst_ref: 0x0000,
            src_ref: 0x0001,
            class: 0x00,
            tpdu_size: 0x0A,
            src_tsap: 0x0100,
            dst_tsap: 0x0100,
        }
    }
}

impl ConnectParams {
    pub fn with_tsap(src_tsap: u16, dst_tsap: u16) -> Self {
        Self {
            src_tsap,
            dst_tsap,
            ..Default::default()
        }
    }

    /// Parse the body after LI and type. Missing TLVs keep their defaults and
    /// unknown TLVs are skipped; peers differ in what they echo back.
    fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() < CONNECT_FIXED_LEN {
            return Err(Error::frame("cotp connect body"));
        }
        let mut params = ConnectParams {
            dst_ref: u16::from_be_bytes([body[0], body[1]]),
            src_ref: u16::from_be_bytes([body[2], body[3]]),
            class: body[4],
            ..Default::default()
        };
        let mut pos = CONNECT_FIXED_LEN;
        while pos + 2 <= body.len() {
            let code = body[pos];
            let len = body[pos + 1] as usize;
            pos += 2;
            if pos + len > body.len() {
                return Err(Error::frame("cotp parameter overruns body"));
            }
            let value = &body[pos..pos + len];
            match (code, len) {
                (PARAM_TPDU_SIZE, 1) => params.tpdu_size = value[0],
                (PARAM_SRC_TSAP, 2) => params.src_tsap = u16::from_be_bytes([value[0], value[1]]),
                (PARAM_DST_TSAP, 2) => params.dst_tsap = u16::from_be_bytes([value[0], value[1]]),
                _ => {}
            }
            pos += len;
        }
        Ok(params)
    }

    fn body_len(&self) -> usize {
        CONNECT_FIXED_LEN + 3 + 4 + 4
    }

    fn encode_body<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16(self.dst_ref);
        dst.put_u16(self.src_ref);
        dst.put_u8(self.class);
        put_tlv(dst, PARAM_TPDU_SIZE, &[self.tpdu_size]);
        put_tlv(dst, PARAM_SRC_TSAP, &self.src_tsap.to_be_bytes());
        put_tlv(dst, PARAM_DST_TSAP, &self.dst_tsap.to_be_bytes());
    }
}

#[inline]
fn put_tlv<B: BufMut>(dst: &mut B, code: u8, value: &[u8]) {
    dst.put_u8(code);
    dst.put_u8(value.len() as u8);
    dst.put_slice(value);
}

/// Disconnect request/confirm references. Trailing reason bytes are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectParams {
    pub dst_ref: u16,
    pub src_ref: u16,
}

impl DisconnectParams {
    fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() < 4 {
            return Err(Error::frame("cotp disconnect body"));
        }
        Ok(Self {
            dst_ref: u16::from_be_bytes([body[0], body[1]]),
            src_ref: u16::from_be_bytes([body[2], body[3]]),
        })
    }
}

/// Data TPDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataParams {
    /// Last data unit of the message
    pub eot: bool,
    pub tpdu_nr: u8,
}

impl Default for DataParams {
    fn default() -> Self {
        Self {
            eot: true,
            tpdu_nr: 0,
        }
    }
}

/// COTP TPDU (subset used by ISO-on-TCP)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cotp {
    Cr(ConnectParams),
    Cc(ConnectParams),
    Dr(DisconnectParams),
    Dc(DisconnectParams),
    D(DataParams),
}

impl Cotp {
    pub fn tpdu_type(&self) -> CotpType {
        match self {
            Cotp::Cr(_) => CotpType::Cr,
            Cotp::Cc(_) => CotpType::Cc,
            Cotp::Dr(_) => CotpType::Dr,
            Cotp::Dc(_) => CotpType::Dc,
            Cotp::D(_) => CotpType::D,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Cotp::Cr(p) | Cotp::Cc(p) => p.body_len(),
            Cotp::Dr(_) => 5,
            Cotp::Dc(_) => 4,
            Cotp::D(_) => 1,
        }
    }
}

impl WireEncode for Cotp {
    type Error = Error;
    type Context = ();

    /// LI + type + body
    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        2 + self.body_len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        // LI counts every header byte after itself
        dst.put_u8((1 + self.body_len()) as u8);
        dst.put_u8(self.tpdu_type() as u8);
        match self {
            Cotp::Cr(p) | Cotp::Cc(p) => p.encode_body(dst),
            Cotp::Dr(p) => {
                dst.put_u16(p.dst_ref);
                dst.put_u16(p.src_ref);
                dst.put_u8(0x00);
            }
            Cotp::Dc(p) => {
                dst.put_u16(p.dst_ref);
                dst.put_u16(p.src_ref);
            }
            Cotp::D(p) => {
                let eot: u8 = if p.eot { 0x80 } else { 0x00 };
                dst.put_u8(eot | (p.tpdu_nr & 0x7F));
            }
        }
        Ok(())
    }
}

impl WireDecode for Cotp {
    type Error = Error;
    type Context = ();

    /// Consumes LI + header; the remainder is user data (non-empty only for DT).
    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < 2 {
            return Err(Error::InsufficientData {
                needed: 2,
                available: input.len(),
            });
        }
        let li = input[0] as usize;
        if li < 1 || 1 + li > input.len() {
            return Err(Error::frame("cotp length indicator"));
        }
        let tpdu_type =
            CotpType::try_from(input[1] & 0xF0).map_err(|_| Error::frame("cotp tpdu type"))?;
        let body = &input[2..1 + li];
        let rest = &input[1 + li..];
        let cotp = match tpdu_type {
            CotpType::Cr => Cotp::Cr(ConnectParams::parse_body(body)?),
            CotpType::Cc => Cotp::Cc(ConnectParams::parse_body(body)?),
            CotpType::Dr => Cotp::Dr(DisconnectParams::parse_body(body)?),
            CotpType::Dc => Cotp::Dc(DisconnectParams::parse_body(body)?),
            CotpType::D => {
                let b = *body.first().ok_or(Error::frame("cotp data header"))?;
                Cotp::D(DataParams {
                    eot: b & 0x80 != 0,
                    tpdu_nr: b & 0x7F,
                })
            }
        };
        Ok((rest, cotp))
    }
}
