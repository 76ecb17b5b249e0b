use super::{
    super::error::{Error, Result},
    types::S7Area,
};
use serde::{Deserialize, Serialize};

/// Highest byte offset that fits the 24-bit bit address of an item.
pub const MAX_BYTE_OFFSET: u32 = 0x1F_FFFF;
/// Longest string or byte array a single point may declare.
pub const MAX_VAR_LEN: u16 = 127;

/// Declared value type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    Bit,
    Int8,
    #[serde(alias = "uint8")]
    UInt8,
    Int16,
    #[serde(alias = "uint16")]
    UInt16,
    Int32,
    #[serde(alias = "uint32")]
    UInt32,
    Int64,
    #[serde(alias = "uint64")]
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
    /// Any kind name this driver does not carry
    #[serde(other)]
    Unsupported,
}

impl ValueKind {
    /// Fixed wire width, None for declared-length kinds.
    pub fn fixed_len(self) -> Option<u16> {
        match self {
            ValueKind::Bit | ValueKind::Int8 | ValueKind::UInt8 => Some(1),
            ValueKind::Int16 | ValueKind::UInt16 => Some(2),
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => Some(4),
            ValueKind::Int64 | ValueKind::UInt64 | ValueKind::Float64 => Some(8),
            ValueKind::String | ValueKind::Bytes | ValueKind::Unsupported => None,
        }
    }
}

/// Byte order of string payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StringLayout {
    /// Bytes as stored. The `d` and `e` string types read the same way.
    #[default]
    #[serde(alias = "H", alias = "d", alias = "D", alias = "e", alias = "E")]
    High,
    /// Each byte pair swapped
    #[serde(alias = "L")]
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringOptions {
    pub length: u16,
    #[serde(default)]
    pub layout: StringLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytesOptions {
    pub length: u16,
}

/// Kind-specific tag options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOptions {
    /// Bit index for `Bit` points
    pub bit: Option<u8>,
    pub string: Option<StringOptions>,
    pub bytes: Option<BytesOptions>,
}

/// Fully resolved location and width of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointAddress {
    pub area: S7Area,
    /// Block number; non-zero for data blocks
    pub block_number: u16,
    /// Zero-based byte offset
    pub byte_offset: u32,
    /// Bit index for `Bit` points, else 0
    pub bit_index: u8,
    pub wire_len_bytes: u16,
    pub kind: ValueKind,
    /// String byte order; `High` for every other kind
    pub layout: StringLayout,
}

impl PointAddress {
    /// Exclusive end offset
    #[inline]
    pub fn end(&self) -> u32 {
        self.byte_offset + self.wire_len_bytes as u32
    }
}

/// Parse `DB<n>.DBW<m>` into a point address.
///
/// `m` is a 1-based offset, so the point starts at byte `m - 1`. Both numbers
/// must be positive. The wire length comes from `kind`, or from the declared
/// length in `options` for strings and byte arrays.
pub fn parse_address(address: &str, kind: ValueKind, options: &TagOptions) -> Result<PointAddress> {
    let invalid = || Error::InvalidAddressFormat(address.to_string());

    let s = address.trim();
    let rest = s.strip_prefix("DB").ok_or_else(invalid)?;
    let (block, offset) = rest.split_once(".DBW").ok_or_else(invalid)?;
    let block_number = parse_positive::<u16>(block).ok_or_else(invalid)?;
    let word = parse_positive::<u32>(offset).ok_or_else(invalid)?;
    let byte_offset = word - 1;
    if byte_offset > MAX_BYTE_OFFSET {
        return Err(invalid());
    }

    let (wire_len_bytes, bit_index, layout) = match kind {
        ValueKind::Bit => {
            let bit = options.bit.unwrap_or(0);
            if bit > 7 {
                return Err(Error::InvalidAddressFormat(format!(
                    "{address}: bit index {bit} out of range 0..=7"
                )));
            }
            (1, bit, StringLayout::High)
        }
        ValueKind::String => {
            let opts = options.string.ok_or_else(|| {
                Error::InvalidAddressFormat(format!("{address}: string length not declared"))
            })?;
            (declared_len(address, opts.length)?, 0, opts.layout)
        }
        ValueKind::Bytes => {
            let opts = options.bytes.ok_or_else(|| {
                Error::InvalidAddressFormat(format!("{address}: byte length not declared"))
            })?;
            (declared_len(address, opts.length)?, 0, StringLayout::High)
        }
        ValueKind::Unsupported => {
            return Err(Error::UnsupportedType(address.to_string()));
        }
        fixed => match fixed.fixed_len() {
            Some(len) => (len, 0, StringLayout::High),
            None => return Err(Error::UnsupportedType(format!("{fixed:?}"))),
        },
    };

    Ok(PointAddress {
        area: S7Area::DataBlock,
        block_number,
        byte_offset,
        bit_index,
        wire_len_bytes,
        kind,
        layout,
    })
}

#[inline]
fn declared_len(address: &str, len: u16) -> Result<u16> {
    if len == 0 || len > MAX_VAR_LEN {
        return Err(Error::InvalidAddressFormat(format!(
            "{address}: declared length {len} out of range 1..={MAX_VAR_LEN}"
        )));
    }
    Ok(len)
}

/// Digits only, no sign, strictly positive.
#[inline]
fn parse_positive<N>(s: &str) -> Option<N>
where
    N: std::str::FromStr + Default + PartialEq,
{
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = s.parse::<N>().ok()?;
    (n != N::default()).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(addr: &str, kind: ValueKind) -> Result<PointAddress> {
        parse_address(addr, kind, &TagOptions::default())
    }

    #[test]
    fn test_word_offset_is_one_based() {
        let p = parse("DB100.DBW4", ValueKind::UInt16).unwrap();
        assert_eq!(p.area, S7Area::DataBlock);
        assert_eq!(p.block_number, 100);
        assert_eq!(p.byte_offset, 3);
        assert_eq!(p.wire_len_bytes, 2);
        assert_eq!(p.end(), 5);
    }

    #[test]
    fn test_zero_numbers_rejected() {
        assert!(matches!(
            parse("DB1.DBW0", ValueKind::UInt16),
            Err(Error::InvalidAddressFormat(_))
        ));
        assert!(matches!(
            parse("DB0.DBW1", ValueKind::UInt16),
            Err(Error::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_malformed_rejected() {
        for addr in ["", "DB", "DB1", "DB1.DBX1", "MW10", "DB-1.DBW2", "DB1.DBW+2", "DB1.DBWx"] {
            assert!(
                matches!(
                    parse(addr, ValueKind::Int16),
                    Err(Error::InvalidAddressFormat(_))
                ),
                "{addr}"
            );
        }
    }

    #[test]
    fn test_width_table() {
        let cases = [
            (ValueKind::Bit, 1),
            (ValueKind::Int8, 1),
            (ValueKind::UInt8, 1),
            (ValueKind::Int16, 2),
            (ValueKind::Int32, 4),
            (ValueKind::Float32, 4),
            (ValueKind::UInt64, 8),
            (ValueKind::Float64, 8),
        ];
        for (kind, len) in cases {
            assert_eq!(parse("DB2.DBW10", kind).unwrap().wire_len_bytes, len);
        }
    }

    #[test]
    fn test_declared_lengths() {
        let opts = TagOptions {
            string: Some(StringOptions {
                length: 20,
                layout: StringLayout::Low,
            }),
            ..Default::default()
        };
        let p = parse_address("DB3.DBW1", ValueKind::String, &opts).unwrap();
        assert_eq!(p.wire_len_bytes, 20);
        assert_eq!(p.layout, StringLayout::Low);

        let too_long = TagOptions {
            bytes: Some(BytesOptions { length: 128 }),
            ..Default::default()
        };
        assert!(matches!(
            parse_address("DB3.DBW1", ValueKind::Bytes, &too_long),
            Err(Error::InvalidAddressFormat(_))
        ));
        assert!(parse("DB3.DBW1", ValueKind::String).is_err());
    }

    #[test]
    fn test_bit_index() {
        let opts = TagOptions {
            bit: Some(5),
            ..Default::default()
        };
        let p = parse_address("DB1.DBW2", ValueKind::Bit, &opts).unwrap();
        assert_eq!((p.byte_offset, p.bit_index), (1, 5));

        let opts = TagOptions {
            bit: Some(8),
            ..Default::default()
        };
        assert!(parse_address("DB1.DBW2", ValueKind::Bit, &opts).is_err());
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let kind: ValueKind = serde_json::from_str("\"dateAndTime\"").unwrap();
        assert_eq!(kind, ValueKind::Unsupported);
        assert!(matches!(
            parse("DB1.DBW1", kind),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_string_layout_letters() {
        for name in ["\"high\"", "\"H\"", "\"d\"", "\"E\""] {
            let layout: StringLayout = serde_json::from_str(name).unwrap();
            assert_eq!(layout, StringLayout::High, "{name}");
        }
        let layout: StringLayout = serde_json::from_str("\"L\"").unwrap();
        assert_eq!(layout, StringLayout::Low);

        let opts: StringOptions = serde_json::from_str(r#"{"length":8,"layout":"e"}"#).unwrap();
        assert_eq!(opts.layout, StringLayout::High);
    }
}
