//! Base64url (no padding) and hex helpers shared by the token issuer,
//! wire frame codec, and crypto primitives.

use crate::error::{Error, ErrorKind, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[inline]
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[inline]
pub fn base64url_decode(text: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| Error::new(ErrorKind::InvalidBinaryData, e.to_string()))
}

#[inline]
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[inline]
pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| Error::new(ErrorKind::InvalidBinaryData, e.to_string()))
}
