use super::{
    super::frame::{
        build_cotp_cr_message, build_cotp_data_message, build_setup_comm, ConnectParams, Cotp,
        S7Message, S7PduType, SequenceCounter, SetupParam, TsapPair,
    },
    state::ConnectionState,
};
use bytes::Bytes;

/// Outcome of feeding one inbound frame to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Advanced(ConnectionState),
    /// Frame dropped, state unchanged
    Ignored(&'static str),
}

/// Two-stage connect: COTP CR/CC, then SetupCommunication.
///
/// Pure with respect to I/O; the session sends what `next_request` returns
/// and feeds replies to `on_frame`.
#[derive(Debug, Clone)]
pub struct Handshake {
    state: ConnectionState,
    tsap: TsapPair,
    setup: SetupParam,
}

impl Handshake {
    pub fn new(tsap: TsapPair, setup: SetupParam) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            tsap,
            setup,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Frame to send for the current state; None once negotiated.
    pub fn next_request(&self, seq: &mut SequenceCounter) -> Option<S7Message> {
        match self.state {
            ConnectionState::Disconnected => Some(build_cotp_cr_message(ConnectParams::with_tsap(
                self.tsap.local.into(),
                self.tsap.remote.into(),
            ))),
            ConnectionState::CotpConnected => Some(build_cotp_data_message(build_setup_comm(
                seq.next(),
                &self.setup,
            ))),
            ConnectionState::Negotiated { .. } => None,
        }
    }

    pub fn on_frame(&mut self, frame: &Bytes) -> HandshakeStep {
        let Ok(msg) = S7Message::decode(frame) else {
            return HandshakeStep::Ignored("malformed frame");
        };
        match (self.state, msg.cotp, msg.pdu) {
            (ConnectionState::Disconnected, Cotp::Cc(_), _) => {
                self.state = ConnectionState::CotpConnected;
            }
            (ConnectionState::CotpConnected, Cotp::D(_), Some(pdu)) => {
                if pdu.header.pdu_type != S7PduType::AckData {
                    return HandshakeStep::Ignored("negotiate reply is not AckData");
                }
                if pdu.validate_response().is_err() {
                    return HandshakeStep::Ignored("negotiate rejected by device");
                }
                let Ok(setup) = SetupParam::parse(&pdu.param) else {
                    return HandshakeStep::Ignored("malformed negotiate parameter");
                };
                if setup.pdu_len == 0 {
                    return HandshakeStep::Ignored("zero PDU size");
                }
                self.state = ConnectionState::Negotiated {
                    pdu_size: setup.pdu_len,
                    amq_caller: setup.amq_caller,
                    amq_callee: setup.amq_callee,
                };
            }
            (_, Cotp::Dr(_), _) => return HandshakeStep::Ignored("disconnect request"),
            _ => return HandshakeStep::Ignored("unexpected frame"),
        }
        HandshakeStep::Advanced(self.state)
    }
}
