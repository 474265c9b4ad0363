//! Plain-text JSON codec.

use super::traits::{CodecError, ReportCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON codec (pretty-printed, human-readable artifacts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl ReportCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec_pretty(value).map_err(|e| CodecError::encode(e.to_string(), self.codec_id()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(data)
            .map_err(|e| CodecError::decode(e.to_string(), self.codec_id(), data.len()))
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
