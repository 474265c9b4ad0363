//! Report codec trait definitions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use testtrace_core::TracerError;

/// Report codec trait.
///
/// Every persisted artifact goes through a codec. The codec fixes both the
/// byte encoding and the file extension, so a cache directory written with
/// one codec is only readable with the same codec.
pub trait ReportCodec: Send + Sync {
    /// Encode a value into bytes.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError>;

    /// Unique codec identifier, as accepted by [`get_codec`](super::get_codec).
    fn codec_id(&self) -> &'static str;

    /// File extension of artifacts written with this codec (without the dot).
    fn extension(&self) -> &'static str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("Encode error (codec={codec_id}): {detail}")]
    EncodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the encode
        codec_id: String,
    },

    /// Decoding failed (invalid format, schema mismatch).
    ///
    /// Carries the codec identity and data length so callers can
    /// distinguish a wrong-codec error from data corruption.
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}

impl CodecError {
    /// Create an encode error.
    pub fn encode(detail: impl Into<String>, codec_id: impl Into<String>) -> Self {
        CodecError::EncodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
        }
    }

    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }
}

impl From<CodecError> for TracerError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnknownCodec(_) => TracerError::config(e.to_string()),
            _ => TracerError::serialization(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::decode("test error", "json", 42);
        let msg = err.to_string();
        assert!(msg.contains("test error"));
        assert!(msg.contains("json"));
        assert!(msg.contains("42"));

        let err = CodecError::UnknownCodec("yaml".to_string());
        assert!(err.to_string().contains("yaml"));
    }

    #[test]
    fn test_unknown_codec_is_config_error() {
        let err: TracerError = CodecError::UnknownCodec("yaml".to_string()).into();
        assert!(matches!(err, TracerError::Config(_)));

        let err: TracerError = CodecError::decode("bad", "json", 1).into();
        assert!(matches!(err, TracerError::Serialization(_)));
    }
}
