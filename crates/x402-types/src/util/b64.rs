//! Base64 transport for protocol documents in HTTP headers.
//!
//! Challenges, proofs and receipts travel as base64 (standard alphabet, padded)
//! JSON in `PAYMENT-REQUIRED`, `PAYMENT-SIGNATURE` and `PAYMENT-RESPONSE`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt::Display;

/// Base64 text held as bytes, borrowed from a header value or owned after encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

/// A header that is not base64 or whose content is not the expected JSON document.
#[derive(Debug, thiserror::Error)]
pub enum Base64JsonError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Base64Bytes<'_> {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        Base64Bytes(Cow::Owned(b64.encode(input.as_ref()).into_bytes()))
    }

    /// Serializes `value` to JSON and encodes it.
    pub fn encode_json<T: Serialize>(value: &T) -> Result<Base64Bytes<'static>, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Base64Bytes::encode(json))
    }

    /// Decodes and parses the JSON document inside.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, Base64JsonError> {
        let bytes = self.decode()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}
