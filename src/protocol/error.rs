use super::frame::S7ReturnCode;
use serde::{Deserialize, Serialize};
use std::{fmt, result::Result as StdResult};
use thiserror::Error as ThisError;

/// Unified S7 result type
pub type Result<T> = StdResult<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Response bytes could not be mapped onto the expected S7 structure
    #[error("protocol decode failure: {context}")]
    ProtocolDecodeFailure { context: &'static str },

    /// Structural violation in one of the framing layers (TPKT/COTP/S7 header)
    #[error("invalid frame: {context}")]
    InvalidFrame { context: &'static str },

    /// Input does not have enough bytes to complete the operation
    #[error("insufficient data: needed {needed} bytes, available {available} bytes")]
    InsufficientData { needed: usize, available: usize },

    /// Device answered with a non-success header error or item return code
    #[error("device error: {0}")]
    DeviceError(DeviceFault),

    #[error("no response from device")]
    NoResponse,

    #[error("disconnected")]
    Disconnected,

    #[error("handshake timeout")]
    HandshakeTimeout,

    /// Encoded job does not fit the negotiated PDU size; never sent
    #[error("request of {len} bytes exceeds negotiated pdu size {pdu_size}")]
    RequestTooLarge { len: usize, pdu_size: u16 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// TSAP-specific: Rack value is out of allowed range (0..=15)
    #[error("rack value {0} is out of range (0..=15)")]
    InvalidRack(u8),

    /// TSAP-specific: Slot value is out of allowed range (0..=31)
    #[error("slot value {0} is out of range (0..=31)")]
    InvalidSlot(u8),
}

impl Error {
    /// Project onto the error taxonomy delivered to value sinks.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddressFormat(_)
            | Error::InvalidConfiguration(_)
            | Error::InvalidRack(_)
            | Error::InvalidSlot(_) => ErrorKind::InvalidAddressFormat,
            Error::UnsupportedType(_) | Error::RequestTooLarge { .. } => {
                ErrorKind::UnsupportedType
            }
            Error::ProtocolDecodeFailure { .. }
            | Error::InvalidFrame { .. }
            | Error::InsufficientData { .. } => ErrorKind::ProtocolDecodeFailure,
            Error::DeviceError(_) => ErrorKind::DeviceError,
            Error::NoResponse => ErrorKind::NoResponse,
            Error::Io(_) | Error::Disconnected => ErrorKind::Disconnected,
            Error::HandshakeTimeout => ErrorKind::HandshakeTimeout,
        }
    }

    /// True when the failure means the byte stream can no longer be trusted.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Disconnected)
    }

    #[inline]
    pub(crate) fn decode(context: &'static str) -> Self {
        Error::ProtocolDecodeFailure { context }
    }

    #[inline]
    pub(crate) fn frame(context: &'static str) -> Self {
        Error::InvalidFrame { context }
    }
}

/// Error kinds surfaced per point and per write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidAddressFormat,
    UnsupportedType,
    ProtocolDecodeFailure,
    DeviceError,
    NoResponse,
    Disconnected,
    HandshakeTimeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidAddressFormat => "invalid address format",
            ErrorKind::UnsupportedType => "unsupported type",
            ErrorKind::ProtocolDecodeFailure => "protocol decode failure",
            ErrorKind::DeviceError => "device error",
            ErrorKind::NoResponse => "no response",
            ErrorKind::Disconnected => "disconnected",
            ErrorKind::HandshakeTimeout => "handshake timeout",
        };
        f.write_str(s)
    }
}

/// What the device rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// Non-zero error in an Ack/AckData header
    Header { class: ErrorClass, code: u8 },
    /// Non-success return code of a single read/write item
    Item(S7ReturnCode),
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFault::Header { class, code } => {
                write!(f, "header error class {:?} code 0x{:02X}", class, code)
            }
            DeviceFault::Item(rc) => write!(f, "item return code 0x{:02X}", u8::from(*rc)),
        }
    }
}

/// High byte of the Ack/AckData error field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NoError,
    ApplicationRelationship,
    ObjectDefinition,
    NoResourcesAvailable,
    ServiceProcessing,
    Supplies,
    AccessError,
    Unknown(u8),
}

impl From<u8> for ErrorClass {
    fn from(v: u8) -> Self {
        match v {
            0x00 => ErrorClass::NoError,
            0x81 => ErrorClass::ApplicationRelationship,
            0x82 => ErrorClass::ObjectDefinition,
            0x83 => ErrorClass::NoResourcesAvailable,
            0x84 => ErrorClass::ServiceProcessing,
            0x85 => ErrorClass::Supplies,
            0x87 => ErrorClass::AccessError,
            other => ErrorClass::Unknown(other),
        }
    }
}

impl From<ErrorClass> for u8 {
    fn from(v: ErrorClass) -> Self {
        match v {
            ErrorClass::NoError => 0x00,
            ErrorClass::ApplicationRelationship => 0x81,
            ErrorClass::ObjectDefinition => 0x82,
            ErrorClass::NoResourcesAvailable => 0x83,
            ErrorClass::ServiceProcessing => 0x84,
            ErrorClass::Supplies => 0x85,
            ErrorClass::AccessError => 0x87,
            ErrorClass::Unknown(v) => v,
        }
    }
}
