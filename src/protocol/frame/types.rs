use serde::{Deserialize, Serialize};

/// COTP TPDU type values (subset)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CotpType {
    /// Connection Request
    Cr = 0xE0,
    /// Connection Confirm
    Cc = 0xD0,
    /// Disconnection Request
    Dr = 0x80,
    /// Disconnection Confirm
    Dc = 0xC0,
    /// Data
    D = 0xF0,
}

impl TryFrom<u8> for CotpType {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0xE0 => Ok(CotpType::Cr),
            0xD0 => Ok(CotpType::Cc),
            0x80 => Ok(CotpType::Dr),
            0xC0 => Ok(CotpType::Dc),
            0xF0 => Ok(CotpType::D),
            _ => Err(()),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7PduType {
    Job = 0x01,
    Ack = 0x02,
    AckData = 0x03,
    UserData = 0x07,
}

impl TryFrom<u8> for S7PduType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x01 => Ok(S7PduType::Job),
            0x02 => Ok(S7PduType::Ack),
            0x03 => Ok(S7PduType::AckData),
            0x07 => Ok(S7PduType::UserData),
            _ => Err(()),
        }
    }
}

impl S7PduType {
    /// Response PDUs carry a 2-byte error field after the common header.
    #[inline]
    pub fn has_error_field(self) -> bool {
        matches!(self, S7PduType::Ack | S7PduType::AckData)
    }
}

/// S7 Function codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Function {
    /// Read Variable
    ReadVar = 0x04,
    /// Write Variable
    WriteVar = 0x05,
    /// Setup communication (PDU size negotiation)
    SetupCommunication = 0xF0,
}

impl TryFrom<u8> for S7Function {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x04 => Ok(S7Function::ReadVar),
            0x05 => Ok(S7Function::WriteVar),
            0xF0 => Ok(S7Function::SetupCommunication),
            _ => Err(()),
        }
    }
}

/// Item specification syntax id
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7SyntaxId {
    S7Any = 0x10,
}

/// Controller memory areas reachable through ReadVar/WriteVar.
///
/// Ordered by declaration, not by wire code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum S7Area {
    /// Process inputs
    ProcessInput = 0x81,
    /// Process outputs
    ProcessOutput = 0x82,
    /// Markers
    Marker = 0x83,
    /// Data blocks
    DataBlock = 0x84,
    /// Counters
    Counter = 0x1C,
    /// Timers
    Timer = 0x1D,
}

impl Ord for S7Area {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for S7Area {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<u8> for S7Area {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x1C => Ok(S7Area::Counter),
            0x1D => Ok(S7Area::Timer),
            0x81 => Ok(S7Area::ProcessInput),
            0x82 => Ok(S7Area::ProcessOutput),
            0x83 => Ok(S7Area::Marker),
            0x84 => Ok(S7Area::DataBlock),
            _ => Err(()),
        }
    }
}

impl S7Area {
    #[inline]
    fn rank(self) -> u8 {
        match self {
            S7Area::ProcessInput => 0,
            S7Area::ProcessOutput => 1,
            S7Area::Marker => 2,
            S7Area::DataBlock => 3,
            S7Area::Counter => 4,
            S7Area::Timer => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            S7Area::ProcessInput => "PE",
            S7Area::ProcessOutput => "PA",
            S7Area::Marker => "MK",
            S7Area::DataBlock => "DB",
            S7Area::Counter => "CT",
            S7Area::Timer => "TM",
        }
    }
}

/// Transport size codes used in item specifications
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7TransportSize {
    Bit = 0x01,
    Byte = 0x02,
    Char = 0x03,
    Word = 0x04,
    Int = 0x05,
    DWord = 0x06,
    DInt = 0x07,
    Real = 0x08,
    Counter = 0x1C,
    Timer = 0x1D,
}

impl TryFrom<u8> for S7TransportSize {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        use S7TransportSize::*;
        Ok(match v {
            0x01 => Bit,
            0x02 => Byte,
            0x03 => Char,
            0x04 => Word,
            0x05 => Int,
            0x06 => DWord,
            0x07 => DInt,
            0x08 => Real,
            0x1C => Counter,
            0x1D => Timer,
            _ => Err(())?,
        })
    }
}

impl S7TransportSize {
    /// Data sub-record class used when this transport size carries write data.
    pub fn data_variable_type(self) -> S7DataVariableType {
        match self {
            S7TransportSize::Bit => S7DataVariableType::Bit,
            S7TransportSize::Int | S7TransportSize::DInt => S7DataVariableType::Integer,
            S7TransportSize::Real => S7DataVariableType::Real,
            S7TransportSize::Char | S7TransportSize::Counter | S7TransportSize::Timer => {
                S7DataVariableType::OctetString
            }
            S7TransportSize::Byte | S7TransportSize::Word | S7TransportSize::DWord => {
                S7DataVariableType::ByteWordDWord
            }
        }
    }
}

/// Return code present in AckData data items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7ReturnCode {
    Reserved,
    Success,
    HardwareFault,
    AccessDenied,
    AddressOutOfRange,
    DataTypeNotSupported,
    DataTypeInconsistent,
    ObjectDoesNotExist,
    ObjectNotAvailable,
    Unknown(u8),
}

impl From<u8> for S7ReturnCode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => S7ReturnCode::Reserved,
            0xFF => S7ReturnCode::Success,
            0x01 => S7ReturnCode::HardwareFault,
            0x03 => S7ReturnCode::AccessDenied,
            0x05 => S7ReturnCode::AddressOutOfRange,
            0x06 => S7ReturnCode::DataTypeNotSupported,
            0x07 => S7ReturnCode::DataTypeInconsistent,
            0x0A => S7ReturnCode::ObjectDoesNotExist,
            0x0B => S7ReturnCode::ObjectNotAvailable,
            other => S7ReturnCode::Unknown(other),
        }
    }
}

impl From<S7ReturnCode> for u8 {
    fn from(value: S7ReturnCode) -> Self {
        match value {
            S7ReturnCode::Reserved => 0x00,
            S7ReturnCode::Success => 0xFF,
            S7ReturnCode::HardwareFault => 0x01,
            S7ReturnCode::AccessDenied => 0x03,
            S7ReturnCode::AddressOutOfRange => 0x05,
            S7ReturnCode::DataTypeNotSupported => 0x06,
            S7ReturnCode::DataTypeInconsistent => 0x07,
            S7ReturnCode::ObjectDoesNotExist => 0x0A,
            S7ReturnCode::ObjectNotAvailable => 0x0B,
            S7ReturnCode::Unknown(v) => v,
        }
    }
}

/// Data sub-record class carried in read responses and write requests
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7DataVariableType {
    /// No data
    Null = 0x00,
    /// Bit access, length field in bytes
    Bit = 0x03,
    /// Byte/Word/DWord access, length field in bits
    ByteWordDWord = 0x04,
    /// Integer access, length field in bits
    Integer = 0x05,
    /// DInteger access, length field in bits
    DInteger = 0x06,
    /// Real access, length field in bytes
    Real = 0x07,
    /// Octet string, length field in bytes
    OctetString = 0x09,
}

impl TryFrom<u8> for S7DataVariableType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match v {
            0x00 => S7DataVariableType::Null,
            0x03 => S7DataVariableType::Bit,
            0x04 => S7DataVariableType::ByteWordDWord,
            0x05 => S7DataVariableType::Integer,
            0x06 => S7DataVariableType::DInteger,
            0x07 => S7DataVariableType::Real,
            0x09 => S7DataVariableType::OctetString,
            _ => Err(())?,
        })
    }
}

impl S7DataVariableType {
    /// Whether the 16-bit length field counts bytes rather than bits.
    #[inline]
    pub fn length_in_bytes(self) -> bool {
        matches!(
            self,
            S7DataVariableType::Bit | S7DataVariableType::Real | S7DataVariableType::OctetString
        )
    }

    /// Length field value for a payload of `bytes` bytes.
    #[inline]
    pub fn length_field(self, bytes: usize) -> u16 {
        if self.length_in_bytes() {
            bytes as u16
        } else {
            (bytes as u16).saturating_mul(8)
        }
    }

    /// Payload byte count announced by a length field.
    #[inline]
    pub fn payload_len(self, field: u16) -> usize {
        if self.length_in_bytes() {
            field as usize
        } else {
            (field as usize).div_ceil(8)
        }
    }
}
