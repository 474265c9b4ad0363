//! Compact binary MessagePack codec.

use super::traits::{CodecError, ReportCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// MessagePack codec.
///
/// Structs are encoded as maps (`to_vec_named`) so artifacts stay readable
/// after fields are added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePackCodec;

impl ReportCodec for MessagePackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::encode(e.to_string(), self.codec_id()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(data)
            .map_err(|e| CodecError::decode(e.to_string(), self.codec_id(), data.len()))
    }

    fn codec_id(&self) -> &'static str {
        "msgpack"
    }

    fn extension(&self) -> &'static str {
        "msgpack"
    }
}
