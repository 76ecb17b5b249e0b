use super::{
    cotp::{ConnectParams, Cotp, DataParams},
    iter::{S7VarSpec, SetupParam, VAR_SPEC_LEN},
    types::S7Function,
    S7Message, S7Pdu, Tpkt, WireEncode,
};
use bytes::{BufMut, Bytes, BytesMut};

/// COTP Connection Request frame
pub fn build_cotp_cr_message(params: ConnectParams) -> S7Message {
    message_for(Cotp::Cr(params), None)
}

/// COTP DT frame carrying one complete S7 PDU
pub fn build_cotp_data_message(pdu: S7Pdu) -> S7Message {
    message_for(Cotp::D(DataParams::default()), Some(pdu))
}

fn message_for(cotp: Cotp, pdu: Option<S7Pdu>) -> S7Message {
    let payload_len = cotp.encoded_len(&()) + pdu.as_ref().map_or(0, |p| p.encoded_len(&()));
    S7Message {
        tpkt: Tpkt::for_payload(payload_len),
        cotp,
        pdu,
    }
}

/// SetupCommunication job
pub fn build_setup_comm(pdu_ref: u16, setup: &SetupParam) -> S7Pdu {
    let mut param = BytesMut::with_capacity(SetupParam::ENCODED_LEN);
    setup.encode_to(&mut param);
    S7Pdu::job(pdu_ref, param.freeze(), Bytes::new())
}

/// ReadVar job with one S7ANY specification per item
pub fn build_read_var(pdu_ref: u16, specs: &[S7VarSpec]) -> S7Pdu {
    S7Pdu::job(
        pdu_ref,
        encode_var_param(S7Function::ReadVar, specs.iter()),
        Bytes::new(),
    )
}

/// WriteVar job. Each data record is `00 | class | length | data`, with a pad
/// byte after odd-length data unless it is the last record.
pub fn build_write_var(pdu_ref: u16, items: &[(S7VarSpec, &[u8])]) -> S7Pdu {
    let param = encode_var_param(S7Function::WriteVar, items.iter().map(|(s, _)| s));

    let payload_len: usize = items
        .iter()
        .enumerate()
        .map(|(idx, (_, d))| 4 + d.len() + pad_len(d.len(), idx + 1 == items.len()))
        .sum();
    let mut payload = BytesMut::with_capacity(payload_len);
    for (idx, (spec, data)) in items.iter().enumerate() {
        let class = spec.transport_size.data_variable_type();
        payload.put_u8(0x00);
        payload.put_u8(class as u8);
        payload.put_u16(class.length_field(data.len()));
        payload.put_slice(data);
        if pad_len(data.len(), idx + 1 == items.len()) == 1 {
            payload.put_u8(0x00);
        }
    }
    S7Pdu::job(pdu_ref, param, payload.freeze())
}

#[inline]
fn pad_len(data_len: usize, last: bool) -> usize {
    usize::from(!last && data_len % 2 == 1)
}

fn encode_var_param<'a>(
    function: S7Function,
    specs: impl ExactSizeIterator<Item = &'a S7VarSpec>,
) -> Bytes {
    let count = specs.len();
    let mut param = BytesMut::with_capacity(2 + count * VAR_SPEC_LEN);
    param.put_u8(function as u8);
    param.put_u8(count as u8);
    for spec in specs {
        spec.encode_to(&mut param);
    }
    param.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::types::{S7Area, S7TransportSize};

    fn db_spec(ts: S7TransportSize, count: u16, byte: u32, bit: u8) -> S7VarSpec {
        S7VarSpec {
            transport_size: ts,
            count,
            db_number: 1,
            area: S7Area::DataBlock,
            byte_address: byte,
            bit_index: bit,
        }
    }

    #[test]
    fn test_cr_frame_is_22_bytes() {
        let mut buf = BytesMut::new();
        build_cotp_cr_message(ConnectParams::default())
            .encode_to(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 22);
        assert_eq!(&buf[..6], &[0x03, 0x00, 0x00, 0x16, 0x11, 0xE0]);
    }

    #[test]
    fn test_negotiate_frame() {
        let pdu = build_setup_comm(
            1,
            &SetupParam {
                amq_caller: 1,
                amq_callee: 1,
                pdu_len: 960,
            },
        );
        let mut buf = BytesMut::new();
        build_cotp_data_message(pdu).encode_to(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[
                0x03, 0x00, 0x00, 0x19, 0x02, 0xF0, 0x80, 0x32, 0x01, 0x00, 0x00, 0x00, 0x01,
                0x00, 0x08, 0x00, 0x00, 0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, 0x03, 0xC0
            ]
        );
    }

    #[test]
    fn test_read_var_param() {
        let pdu = build_read_var(
            9,
            &[
                db_spec(S7TransportSize::Byte, 4, 0, 0),
                db_spec(S7TransportSize::Byte, 2, 10, 0),
            ],
        );
        assert_eq!(pdu.header.param_len, 26);
        assert_eq!(pdu.header.payload_len, 0);
        assert_eq!(&pdu.param[..2], &[0x04, 0x02]);
    }

    #[test]
    fn test_write_var_padding_and_units() {
        let odd = [0x01u8];
        let word = [0x12u8, 0x34];
        let bit = [0x01u8];
        let pdu = build_write_var(
            2,
            &[
                (db_spec(S7TransportSize::Byte, 1, 0, 0), &odd[..]),
                (db_spec(S7TransportSize::Byte, 2, 4, 0), &word[..]),
                (db_spec(S7TransportSize::Bit, 1, 6, 3), &bit[..]),
            ],
        );
        assert_eq!(
            &pdu.payload[..],
            &[
                0x00, 0x04, 0x00, 0x08, 0x01, 0x00, // byte data, length in bits, padded
                0x00, 0x04, 0x00, 0x10, 0x12, 0x34, // even, no pad
                0x00, 0x03, 0x00, 0x01, 0x01 // bit data, length in bytes, last
            ]
        );
        assert_eq!(pdu.header.payload_len as usize, pdu.payload.len());
        assert_eq!(&pdu.param[..2], &[0x05, 0x03]);
    }
}
