/*!
Conversion of owned protocol values (`SnmpValue`) into native values that can be
stored in a snapshot.

Octet strings become text when they are valid UTF-8 and the caller asked for
normalization, otherwise they stay raw bytes (rendered as hex when serialized).
Counters, gauges, timeticks and enumerations become integers. Exception values
and NULL have no native form.
*/

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::core::SnmpValue;

/// A decoded value as it appears in a `MibRecord`.
///
/// Serialized without a tag, so snapshot files hold plain JSON scalars. Reading
/// a file back keeps every value but not always its variant: `Bytes` comes back
/// as `Text` holding the same hex string, and `Unsigned` values that fit in an
/// `i64` come back as `Integer`. MIB modules decide the type, not the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeValue {
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Text(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
}

/// A value was present but could not be read as the type a MIB module required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{len} bytes are not valid UTF-8 text")]
    NotText { len: usize },
    #[error("expected text, got {0}")]
    ExpectedText(String),
    #[error("expected an integer, got {0}")]
    ExpectedInteger(String),
    #[error("expected an octet string, got {0}")]
    ExpectedBytes(String),
}

impl NativeValue {
    /// Requires a text value, decoding raw bytes as UTF-8 if needed.
    pub fn into_text(self) -> Result<String, DecodeError> {
        match self {
            NativeValue::Text(text) => Ok(text),
            NativeValue::Bytes(bytes) => {
                let len = bytes.len();
                String::from_utf8(bytes).map_err(|_| DecodeError::NotText { len })
            }
            other => Err(DecodeError::ExpectedText(other.to_string())),
        }
    }

    /// Requires an octet string and returns its bytes, undoing text decoding.
    pub fn into_bytes(self) -> Result<Vec<u8>, DecodeError> {
        match self {
            NativeValue::Bytes(bytes) => Ok(bytes),
            NativeValue::Text(text) => Ok(text.into_bytes()),
            other => Err(DecodeError::ExpectedBytes(other.to_string())),
        }
    }

    /// Requires an integer value. Unsigned values beyond `i64` are rejected.
    pub fn into_integer(self) -> Result<i64, DecodeError> {
        match self {
            NativeValue::Integer(i) => Ok(i),
            NativeValue::Unsigned(u) => {
                i64::try_from(u).map_err(|_| DecodeError::ExpectedInteger(u.to_string()))
            }
            other => Err(DecodeError::ExpectedInteger(other.to_string())),
        }
    }
}

impl Display for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeValue::Boolean(b) => write!(f, "{b}"),
            NativeValue::Integer(i) => write!(f, "{i}"),
            NativeValue::Unsigned(u) => write!(f, "{u}"),
            NativeValue::Text(s) => write!(f, "{s:?}"),
            NativeValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

/// Converts a protocol value into its native form.
///
/// With `decode_text` unset, octet strings are returned as raw bytes.
/// Returns `None` for values that carry no data.
pub fn normalize(value: SnmpValue, decode_text: bool) -> Option<NativeValue> {
    let native = match value {
        SnmpValue::Integer(i) => NativeValue::Integer(i),
        SnmpValue::Counter32(c) | SnmpValue::Unsigned32(c) | SnmpValue::Timeticks(c) => {
            NativeValue::Unsigned(u64::from(c))
        }
        SnmpValue::Counter64(c) => NativeValue::Unsigned(c),
        SnmpValue::Boolean(b) => NativeValue::Boolean(b),
        SnmpValue::ObjectIdentifier(oid) => NativeValue::Text(oid),
        SnmpValue::IpAddress(ip) => NativeValue::Text(ip.to_string()),
        SnmpValue::OctetString(bytes) if decode_text => match String::from_utf8(bytes) {
            Ok(text) => NativeValue::Text(text),
            Err(e) => NativeValue::Bytes(e.into_bytes()),
        },
        SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => NativeValue::Bytes(bytes),
        SnmpValue::Null
        | SnmpValue::NoSuchObject
        | SnmpValue::NoSuchInstance
        | SnmpValue::EndOfMibView
        | SnmpValue::Unknown => return None,
    };
    Some(native)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
