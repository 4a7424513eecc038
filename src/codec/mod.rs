//! Message codecs
//!
//! A `Codec` turns a structured message value into the bytes carried by the
//! broker and back. The codec is chosen once per `PubSub` service (see
//! `DispatchSettings::codec`); publishers and subscribers of a topic must
//! agree on it, the payload itself carries no codec marker.
//!
//! - `Bincode` (default): compact binary encoding via `bincode`.
//! - `Json`: `serde_json`, handy when other tools read the channel.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::error::CodecError;

/// Marker for values that can travel through a topic.
///
/// Implemented for every `Serialize + DeserializeOwned + Send + Sync + 'static`
/// type; the Rust type is the message's schema identity.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Bincode,
    Json,
}

impl Codec {
    pub fn encode<M: Serialize + ?Sized>(&self, message: &M) -> Result<Bytes, CodecError> {
        let bytes = match self {
            Codec::Bincode => bincode::serialize(message)?,
            Codec::Json => serde_json::to_vec(message)?,
        };
        Ok(Bytes::from(bytes))
    }

    pub fn decode<M: DeserializeOwned>(&self, payload: &[u8]) -> Result<M, CodecError> {
        match self {
            Codec::Bincode => Ok(bincode::deserialize(payload)?),
            Codec::Json => Ok(serde_json::from_slice(payload)?),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Bincode => "bincode",
            Codec::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Codec;
    use crate::utils::error::CodecError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct HelloWorld {
        name: String,
    }

    #[test]
    fn bincode_is_the_default() {
        assert_eq!(Codec::default(), Codec::Bincode);
        assert_eq!(Codec::default().name(), "bincode");
    }

    #[test]
    fn json_payload_is_readable() {
        let bytes = Codec::Json
            .encode(&HelloWorld {
                name: "test-one".into(),
            })
            .unwrap();
        assert_eq!(&bytes[..], br#"{"name":"test-one"}"#);
    }

    #[test]
    fn bincode_decode_rejects_truncated_payload() {
        let err = Codec::Bincode
            .decode::<HelloWorld>(&[0xff, 0x01])
            .unwrap_err();
        assert!(matches!(err, CodecError::Bincode(_)));
    }

    #[test]
    fn json_decode_rejects_wrong_shape() {
        let err = Codec::Json
            .decode::<HelloWorld>(br#"{"title":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn codec_parses_from_lowercase_names() {
        let codec: Codec = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(codec, Codec::Json);
    }
}
