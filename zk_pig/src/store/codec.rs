//! Turning artifacts into stored bytes and back.

use std::io::{Read as _, Write as _};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use super::{ContentEncoding, ContentType, Headers};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid json")]
    Json(#[from] serde_path_to_error::Error<serde_json::Error>),
    #[error("cannot encode json")]
    JsonEncode(#[source] serde_json::Error),
    #[error("cannot encode cbor")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("invalid cbor")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),
    #[error("gzip stream")]
    Gzip(#[from] std::io::Error),
}

pub fn encode<T: Serialize>(value: &T, headers: Headers) -> Result<Vec<u8>, CodecError> {
    let bytes = match headers.content_type {
        ContentType::Json => serde_json::to_vec(value).map_err(CodecError::JsonEncode)?,
        ContentType::Cbor => {
            let mut bytes = Vec::new();
            ciborium::into_writer(value, &mut bytes)?;
            bytes
        }
    };
    match headers.content_encoding {
        ContentEncoding::Plain => Ok(bytes),
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8], headers: Headers) -> Result<T, CodecError> {
    let mut decompressed = Vec::new();
    let bytes = match headers.content_encoding {
        ContentEncoding::Plain => bytes,
        ContentEncoding::Gzip => {
            GzDecoder::new(bytes).read_to_end(&mut decompressed)?;
            decompressed.as_slice()
        }
    };
    match headers.content_type {
        ContentType::Json => Ok(serde_path_to_error::deserialize(
            &mut serde_json::Deserializer::from_slice(bytes),
        )?),
        ContentType::Cbor => Ok(ciborium::from_reader(bytes)?),
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Artifact {
        name: String,
        nodes: Vec<u32>,
    }

    #[test]
    fn every_header_combination_decodes() {
        let artifact = Artifact {
            name: "block".into(),
            nodes: (0..100).collect(),
        };
        for content_type in [ContentType::Json, ContentType::Cbor] {
            for content_encoding in [ContentEncoding::Plain, ContentEncoding::Gzip] {
                let headers = Headers {
                    content_type,
                    content_encoding,
                };
                let bytes = encode(&artifact, headers).unwrap();
                check!(decode::<Artifact>(&bytes, headers).unwrap() == artifact);
            }
        }
    }

    #[test]
    fn json_errors_name_the_field() {
        let_assert!(
            Err(CodecError::Json(e)) =
                decode::<Artifact>(br#"{"name":"b","nodes":[1,"x"]}"#, Headers::default())
        );
        check!(e.path().to_string() == "nodes[1]");
    }
}
