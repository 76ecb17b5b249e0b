#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use ng_driver_s7::protocol::{
    error::ErrorClass,
    frame::{
        build_cotp_data_message, iter::VAR_SPEC_LEN, ConnectParams, Cotp, HeaderError,
        S7Function, S7Message, S7Pdu, S7PduType, S7TransportSize, S7VarSpec, SetupParam, Tpkt,
    },
    session::{Session, SessionConfig},
    transport::Transport,
};
use ng_driver_s7::{CyclePolicy, S7Driver};
use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::Once,
    time::Duration,
};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .with_test_writer()
            .try_init();
    });
}

/// How the fake device answers the next ReadVar/WriteVar job.
#[derive(Debug, Clone)]
pub enum Action {
    /// Answer from the memory image
    Serve,
    /// Swallow the request
    Silent,
    /// Serve, but fail the listed items with `rc`
    FailItems(Vec<usize>, u8),
    /// AckData with a non-zero header error and no parameter
    HeaderError(u8, u8),
    /// AckData whose parameter is cut short
    Malformed,
    /// Drop the connection
    Hangup,
    /// A late reply with an older reference, then serve normally
    Stale,
    /// A truncated AckData with an older reference, then serve normally
    StaleMalformed,
    /// A data TPDU too short to carry an S7 header
    Garbage,
}

/// In-memory S7 device behind the `Transport` trait.
///
/// Handshake requests are always confirmed. Jobs consume `script` front to
/// back and fall back to `Action::Serve` when it runs dry.
#[derive(Debug)]
pub struct MockTransport {
    pub memory: HashMap<u16, Vec<u8>>,
    pub script: VecDeque<Action>,
    /// PDU size granted in the negotiate reply
    pub pdu_size: u16,
    /// Ignore connect requests while set
    pub refuse_connect: bool,
    /// Confirm the COTP connect but ignore PDU negotiation while set
    pub refuse_setup: bool,
    /// Decoded jobs received, in order
    pub jobs: Vec<S7Pdu>,
    pub connects: usize,
    pub reconnects: usize,
    inbox: VecDeque<Bytes>,
    closed: bool,
}

impl MockTransport {
    pub fn new(pdu_size: u16) -> Self {
        Self {
            memory: HashMap::new(),
            script: VecDeque::new(),
            pdu_size,
            refuse_connect: false,
            refuse_setup: false,
            jobs: Vec::new(),
            connects: 0,
            reconnects: 0,
            inbox: VecDeque::new(),
            closed: false,
        }
    }

    pub fn with_db(mut self, db: u16, bytes: Vec<u8>) -> Self {
        self.memory.insert(db, bytes);
        self
    }

    pub fn with_script(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.script.extend(actions);
        self
    }

    /// ReadVar/WriteVar jobs only, handshake excluded.
    pub fn data_jobs(&self) -> Vec<&S7Pdu> {
        self.jobs
            .iter()
            .filter(|p| p.param.first() != Some(&(S7Function::SetupCommunication as u8)))
            .collect()
    }

    /// Frames queued for the client, for serving over a real socket.
    pub fn take_replies(&mut self) -> Vec<Bytes> {
        self.inbox.drain(..).collect()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn reply(&mut self, msg: S7Message) {
        let mut buf = BytesMut::new();
        msg.encode_to(&mut buf).expect("encode reply");
        self.inbox.push_back(buf.freeze());
    }

    fn ack(&mut self, pdu_ref: u16, param: Bytes, payload: Bytes) {
        let mut pdu = S7Pdu::job(pdu_ref, param, payload);
        pdu.header.pdu_type = S7PduType::AckData;
        pdu.header.error = Some(HeaderError {
            class: ErrorClass::NoError,
            code: 0,
        });
        self.reply(build_cotp_data_message(pdu));
    }

    fn handle_job(&mut self, job: S7Pdu) {
        let pdu_ref = job.header.pdu_ref;
        let function = job.param.first().copied();
        self.jobs.push(job.clone());

        if function == Some(S7Function::SetupCommunication as u8) {
            if self.refuse_setup {
                return;
            }
            let mut param = BytesMut::new();
            SetupParam {
                amq_caller: 1,
                amq_callee: 1,
                pdu_len: self.pdu_size,
            }
            .encode_to(&mut param);
            self.ack(pdu_ref, param.freeze(), Bytes::new());
            return;
        }

        let action = self.script.pop_front().unwrap_or(Action::Serve);
        match action {
            Action::Silent => {}
            Action::Hangup => self.closed = true,
            Action::HeaderError(class, code) => {
                let mut pdu = S7Pdu::job(pdu_ref, Bytes::new(), Bytes::new());
                pdu.header.pdu_type = S7PduType::AckData;
                pdu.header.error = Some(HeaderError {
                    class: ErrorClass::from(class),
                    code,
                });
                self.reply(build_cotp_data_message(pdu));
            }
            Action::Malformed => {
                self.ack(pdu_ref, Bytes::from_static(&[0x04]), Bytes::new());
            }
            Action::Stale => {
                self.serve(pdu_ref.wrapping_sub(1), &job, &[], 0xFF);
                self.serve(pdu_ref, &job, &[], 0xFF);
            }
            Action::StaleMalformed => {
                let [hi, lo] = pdu_ref.wrapping_sub(1).to_be_bytes();
                // header announces 16 parameter bytes that never follow
                self.inbox.push_back(Bytes::copy_from_slice(&[
                    0x03, 0x00, 0x00, 0x13, 0x02, 0xF0, 0x80, 0x32, 0x03, 0x00, 0x00, hi, lo,
                    0x00, 0x10, 0x00, 0x00, 0x00, 0x00,
                ]));
                self.serve(pdu_ref, &job, &[], 0xFF);
            }
            Action::Garbage => {
                self.inbox.push_back(Bytes::from_static(&[
                    0x03, 0x00, 0x00, 0x09, 0x02, 0xF0, 0x80, 0x32, 0x03,
                ]));
            }
            Action::FailItems(items, rc) => self.serve(pdu_ref, &job, &items, rc),
            Action::Serve => self.serve(pdu_ref, &job, &[], 0xFF),
        }
    }

    fn serve(&mut self, pdu_ref: u16, job: &S7Pdu, failed: &[usize], rc: u8) {
        let function = job.param[0];
        let count = job.param[1] as usize;
        let specs: Vec<S7VarSpec> = (0..count)
            .map(|i| {
                let at = 2 + i * VAR_SPEC_LEN;
                S7VarSpec::parse(&job.param[at..at + VAR_SPEC_LEN])
                    .expect("item spec")
                    .1
            })
            .collect();

        let mut payload = BytesMut::new();
        if function == S7Function::ReadVar as u8 {
            for (idx, spec) in specs.iter().enumerate() {
                let start = spec.byte_address as usize;
                let end = start + spec.count as usize;
                let data = self
                    .memory
                    .get(&spec.db_number)
                    .and_then(|m| m.get(start..end));
                match data {
                    Some(data) if !failed.contains(&idx) => {
                        payload.put_u8(0xFF);
                        payload.put_u8(0x04);
                        payload.put_u16((data.len() * 8) as u16);
                        payload.put_slice(data);
                        if data.len() % 2 == 1 && idx + 1 < specs.len() {
                            payload.put_u8(0x00);
                        }
                    }
                    Some(_) => payload.put_slice(&[rc, 0x00, 0x00, 0x00]),
                    None => payload.put_slice(&[0x05, 0x00, 0x00, 0x00]),
                }
            }
        } else {
            let mut data = &job.payload[..];
            for (idx, spec) in specs.iter().enumerate() {
                let class = data[1];
                let field = u16::from_be_bytes([data[2], data[3]]) as usize;
                let len = if matches!(class, 0x03 | 0x07 | 0x09) {
                    field
                } else {
                    field.div_ceil(8)
                };
                let value = data[4..4 + len].to_vec();
                let pad = usize::from(len % 2 == 1 && idx + 1 < specs.len());
                data = &data[4 + len + pad..];

                if failed.contains(&idx) {
                    payload.put_u8(rc);
                    continue;
                }
                let Some(mem) = self.memory.get_mut(&spec.db_number) else {
                    payload.put_u8(0x0A);
                    continue;
                };
                let start = spec.byte_address as usize;
                if spec.transport_size == S7TransportSize::Bit {
                    let mask = 1u8 << spec.bit_index;
                    if value[0] & 0x01 == 1 {
                        mem[start] |= mask;
                    } else {
                        mem[start] &= !mask;
                    }
                } else {
                    mem[start..start + value.len()].copy_from_slice(&value);
                }
                payload.put_u8(0xFF);
            }
        }
        let param = Bytes::copy_from_slice(&[function, count as u8]);
        self.ack(pdu_ref, param, payload.freeze());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        let msg = S7Message::decode(&frame).expect("client frame decodes");
        match (msg.cotp, msg.pdu) {
            (Cotp::Cr(_), _) => {
                self.connects += 1;
                if !self.refuse_connect {
                    self.reply(S7Message {
                        tpkt: Tpkt::for_payload(0),
                        cotp: Cotp::Cc(ConnectParams::default()),
                        pdu: None,
                    });
                }
            }
            (Cotp::D(_), Some(job)) => self.handle_job(job),
            _ => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        if let Some(frame) = self.inbox.pop_front() {
            return Ok(Some(frame));
        }
        if self.closed {
            return Ok(None);
        }
        std::future::pending::<io::Result<Option<Bytes>>>().await
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        self.reconnects += 1;
        self.closed = false;
        self.inbox.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        read_timeout: Duration::from_millis(200),
        handshake_timeout: Duration::from_millis(1_000),
        ..Default::default()
    }
}

pub fn policy() -> CyclePolicy {
    CyclePolicy {
        interval: Duration::ZERO,
        retry_interval: Duration::from_millis(50),
        max_retries: 2,
        await_write_ack: true,
    }
}

pub fn driver(transport: MockTransport) -> S7Driver<MockTransport> {
    S7Driver::new(Session::new(transport, session_config()), policy())
}
