use super::{
    super::error::{DeviceFault, Error, Result},
    comm::S7Header,
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes, BytesMut};

/// S7 PDU with zero-copy parameter and payload slices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Pdu {
    pub header: S7Header,
    pub param: Bytes,
    pub payload: Bytes,
}

impl S7Pdu {
    /// Job PDU; header lengths follow the given sections.
    pub fn job(pdu_ref: u16, param: Bytes, payload: Bytes) -> Self {
        Self {
            header: S7Header::job(pdu_ref, param.len(), payload.len()),
            param,
            payload,
        }
    }

    /// Fail with the header error of an Ack/AckData, if any.
    pub fn validate_response(&self) -> Result<()> {
        match self.header.error {
            Some(err) if !err.is_ok() => Err(Error::DeviceError(DeviceFault::Header {
                class: err.class,
                code: err.code,
            })),
            _ => Ok(()),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len(&()));
        self.header.encode_to(&mut buf);
        buf.put_slice(&self.param);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl WireEncode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        self.header.encoded_len() + self.param.len() + self.payload.len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        self.header.encode_to(dst);
        dst.put_slice(&self.param);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

impl WireDecode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let (header, rest) = S7Header::parse(input)?;
        let param_len = header.param_len as usize;
        let payload_len = header.payload_len as usize;
        if rest.len() < param_len + payload_len {
            return Err(Error::InsufficientData {
                needed: param_len + payload_len,
                available: rest.len(),
            });
        }
        let (param, tail) = rest.split_at(param_len);
        let (payload, remain) = tail.split_at(payload_len);
        Ok((
            remain,
            S7Pdu {
                header,
                param: parent.slice_ref(param),
                payload: parent.slice_ref(payload),
            },
        ))
    }
}
