use super::{
    super::error::{DeviceFault, Error, Result},
    types::{S7Area, S7DataVariableType, S7Function, S7ReturnCode, S7SyntaxId, S7TransportSize},
};
use bytes::BufMut;
use nom::number::complete::{be_u16, be_u32, u8 as nom_u8};

/// Encoded size of one S7ANY item specification
pub const VAR_SPEC_LEN: usize = 12;

type NomError<'a> = nom::error::Error<&'a [u8]>;

/// S7ANY variable specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7VarSpec {
    pub transport_size: S7TransportSize,
    /// Number of `transport_size` elements
    pub count: u16,
    /// DB number if area is DB, else 0
    pub db_number: u16,
    pub area: S7Area,
    pub byte_address: u32,
    /// Bit index for bit access
    pub bit_index: u8,
}

impl S7VarSpec {
    /// 24-bit bit address as carried on the wire
    #[inline]
    pub fn bit_address(&self) -> u32 {
        ((self.byte_address << 3) | (self.bit_index as u32 & 0x07)) & 0x00FF_FFFF
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(0x12);
        dst.put_u8((VAR_SPEC_LEN - 2) as u8);
        dst.put_u8(S7SyntaxId::S7Any as u8);
        dst.put_u8(self.transport_size as u8);
        dst.put_u16(self.count);
        dst.put_u16(if self.area == S7Area::DataBlock {
            self.db_number
        } else {
            0
        });
        dst.put_u8(self.area as u8);
        let addr = self.bit_address();
        dst.put_u8((addr >> 16) as u8);
        dst.put_u8((addr >> 8) as u8);
        dst.put_u8(addr as u8);
    }

    /// Parse one specification including its 0x12/length head.
    pub fn parse(input: &[u8]) -> Result<(&[u8], S7VarSpec)> {
        let bad = |_| Error::frame("s7any item specification");
        let (i, _head) = nom_u8::<_, NomError>(input).map_err(bad)?;
        let (i, _len) = nom_u8::<_, NomError>(i).map_err(bad)?;
        let (i, syntax) = nom_u8::<_, NomError>(i).map_err(bad)?;
        if syntax != S7SyntaxId::S7Any as u8 {
            return Err(Error::frame("s7any syntax id"));
        }
        let (i, ts) = nom_u8::<_, NomError>(i).map_err(bad)?;
        let transport_size =
            S7TransportSize::try_from(ts).map_err(|_| Error::frame("s7any transport size"))?;
        let (i, count) = be_u16::<_, NomError>(i).map_err(bad)?;
        let (i, db_number) = be_u16::<_, NomError>(i).map_err(bad)?;
        // area code and the 24-bit address share one 32-bit read
        let (i, area_addr) = be_u32::<_, NomError>(i).map_err(bad)?;
        let area = S7Area::try_from((area_addr >> 24) as u8)
            .map_err(|_| Error::frame("s7any area"))?;
        let addr = area_addr & 0x00FF_FFFF;
        Ok((
            i,
            S7VarSpec {
                transport_size,
                count,
                db_number,
                area,
                byte_address: addr >> 3,
                bit_index: (addr & 0x07) as u8,
            },
        ))
    }
}

/// Parameter of a ReadVar/WriteVar AckData: function and item count.
pub fn parse_ack_param(param: &[u8]) -> Result<(S7Function, u8)> {
    let (i, function) =
        nom_u8::<_, NomError>(param).map_err(|_| Error::decode("ack parameter"))?;
    let function = S7Function::try_from(function).map_err(|_| Error::decode("ack function"))?;
    let (_, count) = nom_u8::<_, NomError>(i).map_err(|_| Error::decode("ack item count"))?;
    Ok((function, count))
}

/// Negotiated communication parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupParam {
    pub amq_caller: u16,
    pub amq_callee: u16,
    pub pdu_len: u16,
}

impl SetupParam {
    pub const ENCODED_LEN: usize = 8;

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(S7Function::SetupCommunication as u8);
        dst.put_u8(0x00);
        dst.put_u16(self.amq_caller);
        dst.put_u16(self.amq_callee);
        dst.put_u16(self.pdu_len);
    }

    /// Parse the 8-byte SetupCommunication parameter.
    pub fn parse(param: &[u8]) -> Result<SetupParam> {
        let bad = |_| Error::decode("setup communication parameter");
        let (i, function) = nom_u8::<_, NomError>(param).map_err(bad)?;
        if function != S7Function::SetupCommunication as u8 {
            return Err(Error::decode("setup communication function"));
        }
        let (i, _reserved) = nom_u8::<_, NomError>(i).map_err(bad)?;
        let (i, amq_caller) = be_u16::<_, NomError>(i).map_err(bad)?;
        let (i, amq_callee) = be_u16::<_, NomError>(i).map_err(bad)?;
        let (_, pdu_len) = be_u16::<_, NomError>(i).map_err(bad)?;
        Ok(SetupParam {
            amq_caller,
            amq_callee,
            pdu_len,
        })
    }
}

/// One ReadVar response data item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarPayloadDataItemRef<'a> {
    pub return_code: S7ReturnCode,
    pub variable_type: S7DataVariableType,
    pub data: &'a [u8],
}

/// Walks ReadVar response items, skipping the pad byte after odd-length data.
///
/// A failed item is yielded as an error and the walk continues. Once the
/// payload is truncated or malformed, every remaining item yields a decode
/// error since its boundaries are lost.
#[derive(Debug, Clone, Copy)]
pub struct VarPayloadDataItemIter<'a> {
    remaining: &'a [u8],
    left: u8,
    broken: bool,
}

impl<'a> VarPayloadDataItemIter<'a> {
    pub fn new(item_count: u8, raw: &'a [u8]) -> Self {
        Self {
            remaining: raw,
            left: item_count,
            broken: false,
        }
    }
}

impl<'a> Iterator for VarPayloadDataItemIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;
        if self.broken {
            return Some(Err(Error::decode("read item after truncated payload")));
        }
        let item = match parse_var_payload_data_item(self.remaining) {
            Ok((rest, item)) => {
                self.remaining = rest;
                item
            }
            Err(e) => {
                self.broken = true;
                return Some(Err(e));
            }
        };
        if self.left > 0 && item.data.len() % 2 == 1 && !self.remaining.is_empty() {
            self.remaining = &self.remaining[1..];
        }
        if item.return_code != S7ReturnCode::Success {
            return Some(Err(Error::DeviceError(DeviceFault::Item(item.return_code))));
        }
        Some(Ok(item.data))
    }
}

/// Parse rc, variable type, length and data. A failing return code carries
/// no data, so nothing beyond the 4-byte head is consumed for it.
fn parse_var_payload_data_item(input: &[u8]) -> Result<(&[u8], VarPayloadDataItemRef<'_>)> {
    let bad = |_| Error::decode("read item header");
    let (i, rc) = nom_u8::<_, NomError>(input).map_err(bad)?;
    let return_code = S7ReturnCode::from(rc);
    if return_code != S7ReturnCode::Success {
        // some devices send only the return code byte
        let skip = i.len().min(3);
        return Ok((
            &i[skip..],
            VarPayloadDataItemRef {
                return_code,
                variable_type: S7DataVariableType::Null,
                data: &[],
            },
        ));
    }
    let (i, ts) = nom_u8::<_, NomError>(i).map_err(bad)?;
    let variable_type =
        S7DataVariableType::try_from(ts).map_err(|_| Error::decode("read item data class"))?;
    let (i, len_field) = be_u16::<_, NomError>(i).map_err(bad)?;
    let data_len = variable_type.payload_len(len_field);
    if i.len() < data_len {
        return Err(Error::decode("read item data truncated"));
    }
    let (data, rest) = i.split_at(data_len);
    Ok((
        rest,
        VarPayloadDataItemRef {
            return_code,
            variable_type,
            data,
        },
    ))
}

/// Walks WriteVar response return codes, one byte per item.
#[derive(Debug, Clone, Copy)]
pub struct VarPayloadStatusItemIter<'a> {
    remaining: &'a [u8],
    left: u8,
}

impl<'a> VarPayloadStatusItemIter<'a> {
    pub fn new(item_count: u8, raw: &'a [u8]) -> Self {
        Self {
            remaining: raw,
            left: item_count,
        }
    }
}

impl<'a> Iterator for VarPayloadStatusItemIter<'a> {
    type Item = Result<()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;
        match nom_u8::<_, NomError>(self.remaining) {
            Ok((rest, rc)) => {
                self.remaining = rest;
                match S7ReturnCode::from(rc) {
                    S7ReturnCode::Success => Some(Ok(())),
                    other => Some(Err(Error::DeviceError(DeviceFault::Item(other)))),
                }
            }
            Err(_) => Some(Err(Error::decode("write status truncated"))),
        }
    }
}
