//! Report codecs
//!
//! Two codecs are built in:
//!
//! | Id | Type | Extension |
//! |----|------|-----------|
//! | `json` | [`JsonCodec`] | `.json` |
//! | `msgpack` | [`MessagePackCodec`] | `.msgpack` |
//!
//! [`Codec`] is the runtime-selected codec; it dispatches to one of the
//! built-in implementations.

mod json;
mod msgpack;
mod traits;

pub use json::JsonCodec;
pub use msgpack::MessagePackCodec;
pub use traits::{CodecError, ReportCodec};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A built-in codec selected at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// JSON
    Json(JsonCodec),
    /// MessagePack
    MessagePack(MessagePackCodec),
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Json(JsonCodec)
    }
}

impl ReportCodec for Codec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json(c) => c.encode(value),
            Codec::MessagePack(c) => c.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        match self {
            Codec::Json(c) => c.decode(data),
            Codec::MessagePack(c) => c.decode(data),
        }
    }

    fn codec_id(&self) -> &'static str {
        match self {
            Codec::Json(c) => c.codec_id(),
            Codec::MessagePack(c) => c.codec_id(),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Codec::Json(c) => c.extension(),
            Codec::MessagePack(c) => c.extension(),
        }
    }
}

/// Resolve a codec by identifier
pub fn get_codec(codec_id: &str) -> Result<Codec, CodecError> {
    match codec_id {
        "json" => Ok(Codec::Json(JsonCodec)),
        "msgpack" | "messagepack" => Ok(Codec::MessagePack(MessagePackCodec)),
        other => Err(CodecError::UnknownCodec(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_get_codec() {
        assert_eq!(get_codec("json").unwrap().extension(), "json");
        assert_eq!(get_codec("msgpack").unwrap().codec_id(), "msgpack");
        assert!(matches!(get_codec("yaml"), Err(CodecError::UnknownCodec(_))));
    }

    #[test]
    fn test_integer_keyed_maps_survive_both_codecs() {
        let mut hits: BTreeMap<usize, u64> = BTreeMap::new();
        hits.insert(0, 2);
        hits.insert(14, 1);

        for codec in [get_codec("json").unwrap(), get_codec("msgpack").unwrap()] {
            let bytes = codec.encode(&hits).unwrap();
            let back: BTreeMap<usize, u64> = codec.decode(&bytes).unwrap();
            assert_eq!(back, hits, "codec {}", codec.codec_id());
        }
    }

    #[test]
    fn test_wrong_codec_is_decode_error() {
        let bytes = get_codec("msgpack").unwrap().encode(&vec!["a", "b"]).unwrap();
        let err = get_codec("json").unwrap().decode::<Vec<String>>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::DecodeError { .. }));
    }
}
