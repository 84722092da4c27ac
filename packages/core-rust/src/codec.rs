//! Self-describing wire encodings for bus payloads.
//!
//! Two encodings are supported: JSON and `MsgPack` with named fields
//! (`rmp_serde::to_vec_named`). Both carry field names, so a payload can be
//! decoded without out-of-band schema information.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encoding used for every message a process publishes and consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    MsgPack,
}

impl WireFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    /// Serializes `value` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| CodecError::Encode {
                format: self,
                reason: e.to_string(),
            }),
            Self::MsgPack => rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode {
                format: self,
                reason: e.to_string(),
            }),
        }
    }

    /// Deserializes a `T` from `bytes` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is malformed or does not
    /// match the shape of `T`.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
                format: self,
                reason: e.to_string(),
            }),
            Self::MsgPack => rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode {
                format: self,
                reason: e.to_string(),
            }),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::MsgPack),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

/// Errors from encoding or decoding a bus payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode {format} payload: {reason}")]
    Encode { format: WireFormat, reason: String },
    #[error("failed to decode {format} payload: {reason}")]
    Decode { format: WireFormat, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{PredictionRequest, PredictionResult, TaskStatus};

    #[test]
    fn json_request_is_plain_object() {
        let request = PredictionRequest::new("req-1", "great product");
        let bytes = WireFormat::Json.encode(&request).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["text"], "great product");
    }

    #[test]
    fn msgpack_result_decodes_back() {
        let result = PredictionResult::failed("req-9", "lexicon-v1");
        let bytes = WireFormat::MsgPack.encode(&result).unwrap();
        let decoded: PredictionResult = WireFormat::MsgPack.decode(&bytes).unwrap();
        assert_eq!(decoded, result);
        assert_eq!(decoded.status, TaskStatus::Failed);
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let err = WireFormat::Json
            .decode::<PredictionRequest>(b"{not json")
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode { format: WireFormat::Json, .. }));

        let err = WireFormat::MsgPack
            .decode::<PredictionRequest>(&[0xc1])
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode { format: WireFormat::MsgPack, .. }));
    }

    #[test]
    fn missing_field_is_decode_error() {
        let err = WireFormat::Json
            .decode::<PredictionRequest>(br#"{"request_id":"r"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("text"));
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("msgpack".parse::<WireFormat>().unwrap(), WireFormat::MsgPack);
        assert!("avro".parse::<WireFormat>().is_err());
    }
}
