use super::super::frame::{SetupParam, TsapPair};
use std::time::Duration;

/// Handshake progress of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// COTP connection confirmed, PDU size not yet agreed
    CotpConnected,
    /// Ready for ReadVar/WriteVar
    Negotiated {
        pdu_size: u16,
        amq_caller: u16,
        amq_callee: u16,
    },
}

impl ConnectionState {
    #[inline]
    pub fn negotiated_pdu_size(&self) -> Option<u16> {
        match self {
            ConnectionState::Negotiated { pdu_size, .. } => Some(*pdu_size),
            _ => None,
        }
    }
}

/// Protocol-level settings of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tsap: TsapPair,
    /// Requested PDU size
    pub pdu_size: u16,
    pub amq_caller: u16,
    pub amq_callee: u16,
    /// Wait for a single response
    pub read_timeout: Duration,
    /// Overall bound on CR + negotiate
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    pub fn setup_param(&self) -> SetupParam {
        SetupParam {
            amq_caller: self.amq_caller,
            amq_callee: self.amq_callee,
            pdu_len: self.pdu_size,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tsap: TsapPair::default(),
            pdu_size: 960,
            amq_caller: 1,
            amq_callee: 1,
            read_timeout: Duration::from_millis(3_000),
            handshake_timeout: Duration::from_millis(3_000),
        }
    }
}

/// Traffic counters of one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests_sent: u64,
    pub last_rtt: Option<Duration>,
}
