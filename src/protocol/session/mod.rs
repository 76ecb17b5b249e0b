mod handshake;
mod state;

pub use handshake::{Handshake, HandshakeStep};
pub use state::{ConnectionState, SessionConfig, SessionStats};

use super::{
    error::{Error, Result},
    frame::{
        build_cotp_data_message, comm::S7_PROTOCOL_ID, Cotp, CotpType, S7Message, S7Pdu,
        SequenceCounter,
    },
    transport::Transport,
};
use bytes::{Bytes, BytesMut};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

const SCRATCH_CAPACITY: usize = 1024;

/// One S7 connection: transport, handshake progress, sequence counter and a
/// reusable encode buffer. Strictly one request in flight.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    handshake: Handshake,
    seq: SequenceCounter,
    scratch: BytesMut,
    stats: SessionStats,
    /// Stream must be re-established before the next handshake
    broken: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let handshake = Handshake::new(config.tsap, config.setup_param());
        Self {
            transport,
            config,
            handshake,
            seq: SequenceCounter::default(),
            scratch: BytesMut::with_capacity(SCRATCH_CAPACITY),
            stats: SessionStats::default(),
            broken: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.handshake.state()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state(), ConnectionState::Negotiated { .. })
    }

    #[inline]
    pub fn negotiated_pdu_size(&self) -> Option<u16> {
        self.state().negotiated_pdu_size()
    }

    #[inline]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Forget the handshake; the next `handshake()` re-establishes the stream.
    pub fn mark_disconnected(&mut self) {
        if self.is_active() {
            warn!("S7 session marked disconnected");
        }
        self.handshake.reset();
        self.broken = true;
    }

    /// Run COTP connect and PDU negotiation within the handshake timeout.
    ///
    /// Each wait is bounded by the read timeout; on a timeout or an ignored
    /// frame the request for the current stage is sent again. Returns the
    /// negotiated PDU size.
    pub async fn handshake(&mut self) -> Result<u16> {
        if self.broken || !self.transport.is_open() {
            if let Err(e) = self.transport.reconnect().await {
                error!(error = %e, "S7 transport reconnect failed");
                return Err(Error::Disconnected);
            }
            self.broken = false;
        }
        self.handshake.reset();

        let started = Instant::now();
        let deadline = started + self.config.handshake_timeout;
        loop {
            let Some(request) = self.handshake.next_request(&mut self.seq) else {
                break;
            };
            let now = Instant::now();
            if now >= deadline {
                warn!(state = ?self.state(), "S7 handshake timed out");
                // state kept for inspection; the stream is torn down on the next attempt
                self.broken = true;
                return Err(Error::HandshakeTimeout);
            }
            self.send_message(&request).await?;

            let wait = self.config.read_timeout.min(deadline - now);
            match timeout(wait, self.transport.recv()).await {
                Err(_) => debug!(wait_ms = wait.as_millis() as u64, "S7 handshake reply timeout"),
                Ok(Ok(Some(frame))) => {
                    self.stats.bytes_received += frame.len() as u64;
                    match self.handshake.on_frame(&frame) {
                        HandshakeStep::Advanced(state) => debug!(?state, "S7 handshake advanced"),
                        HandshakeStep::Ignored(reason) => {
                            debug!(reason, len = frame.len(), "S7 handshake frame ignored")
                        }
                    }
                }
                Ok(Ok(None)) => return Err(self.fail_transport("peer closed during handshake")),
                Ok(Err(e)) => {
                    error!(error = %e, "S7 handshake receive failed");
                    return Err(self.fail_transport("receive failed"));
                }
            }
        }

        match self.state() {
            ConnectionState::Negotiated {
                pdu_size,
                amq_caller,
                amq_callee,
            } => {
                info!(
                    pdu_size,
                    amq_caller,
                    amq_callee,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "S7 handshake complete"
                );
                Ok(pdu_size)
            }
            _ => Err(Error::HandshakeTimeout),
        }
    }

    /// Send one job and wait for its reply.
    ///
    /// The PDU reference is assigned here. `Ok(None)` means no reply arrived
    /// within the read timeout. Replies carrying another reference are stale
    /// answers to earlier timed-out requests and are dropped. Transport
    /// failures reset the session and surface as `Disconnected`.
    pub async fn round_trip(&mut self, pdu: S7Pdu) -> Result<Option<S7Pdu>> {
        let sent_at = Instant::now();
        let pdu_ref = self.send_job(pdu).await?;
        self.await_reply(pdu_ref, sent_at).await
    }

    /// Send one job without waiting. Returns the assigned PDU reference; a
    /// reply arriving later is dropped by the next `round_trip`.
    pub async fn send_job(&mut self, mut pdu: S7Pdu) -> Result<u16> {
        if !self.is_active() {
            return Err(Error::Disconnected);
        }
        let pdu_ref = self.seq.next();
        pdu.header.pdu_ref = pdu_ref;
        self.send_message(&build_cotp_data_message(pdu)).await?;
        Ok(pdu_ref)
    }

    async fn await_reply(&mut self, pdu_ref: u16, sent_at: Instant) -> Result<Option<S7Pdu>> {
        let deadline = sent_at + self.config.read_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let frame = match timeout(remaining, self.transport.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => return Err(self.fail_transport("peer closed")),
                Ok(Err(e)) => {
                    error!(error = %e, pdu_ref, "S7 receive failed");
                    return Err(self.fail_transport("receive failed"));
                }
            };
            self.stats.bytes_received += frame.len() as u64;

            let reply = match self.decode_reply(&frame) {
                Ok(reply) => reply,
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => match frame_pdu_ref(&frame) {
                    Some(got) if got != pdu_ref => {
                        warn!(
                            expected = pdu_ref,
                            got,
                            error = %e,
                            "S7 dropping stale malformed reply"
                        );
                        continue;
                    }
                    _ => {
                        error!(error = %e, pdu_ref, len = frame.len(), "S7 reply decode failed");
                        return Err(e);
                    }
                },
            };
            if reply.header.pdu_ref != pdu_ref {
                warn!(
                    expected = pdu_ref,
                    got = reply.header.pdu_ref,
                    "S7 dropping stale reply"
                );
                continue;
            }
            let rtt = sent_at.elapsed();
            self.stats.last_rtt = Some(rtt);
            debug!(
                pdu_ref,
                rtt_us = rtt.as_micros() as u64,
                param_len = reply.param.len(),
                payload_len = reply.payload.len(),
                "S7 reply"
            );
            reply.validate_response()?;
            return Ok(Some(reply));
        }
    }

    fn decode_reply(&mut self, frame: &Bytes) -> Result<S7Pdu> {
        let msg = S7Message::decode(frame)?;
        match (msg.cotp, msg.pdu) {
            (Cotp::D(_), Some(pdu)) => Ok(pdu),
            (Cotp::Dr(_), _) => Err(self.fail_transport("peer sent disconnect request")),
            _ => Err(Error::decode("reply is not a data TPDU")),
        }
    }

    async fn send_message(&mut self, msg: &S7Message) -> Result<()> {
        self.scratch.clear();
        msg.encode_to(&mut self.scratch)?;
        let frame = self.scratch.split().freeze();
        let len = frame.len();
        debug!(len, cotp = ?msg.cotp.tpdu_type(), "S7 send");
        if let Err(e) = self.transport.send(frame).await {
            error!(error = %e, "S7 send failed");
            return Err(self.fail_transport("send failed"));
        }
        self.stats.bytes_sent += len as u64;
        self.stats.requests_sent += 1;
        Ok(())
    }

    fn fail_transport(&mut self, reason: &'static str) -> Error {
        warn!(reason, "S7 transport failure");
        self.handshake.reset();
        self.broken = true;
        Error::Disconnected
    }
}

/// Reference of a COTP DT frame carrying an S7 header, read without decoding
/// the rest of the frame.
fn frame_pdu_ref(frame: &[u8]) -> Option<u16> {
    let li = *frame.get(4)? as usize;
    if frame.get(5) != Some(&(CotpType::D as u8)) {
        return None;
    }
    let s7 = frame.get(5 + li..)?;
    if s7.first() != Some(&S7_PROTOCOL_ID) {
        return None;
    }
    Some(u16::from_be_bytes([*s7.get(4)?, *s7.get(5)?]))
}
