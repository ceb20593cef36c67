//! Resource value encoding: fixed-width big-endian numbers and raw text bytes, wrapped in base64.
//!
//! Edge Core reads these bytes verbatim, so the widths are part of the wire contract:
//! f64 = 8 bytes, f32 = 4 bytes, i32 = 4 bytes, all big-endian.

use crate::rpc::RpcError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("value is not valid UTF-8")]
    Utf8,
}

impl From<CodecError> for RpcError {
    fn from(e: CodecError) -> Self {
        RpcError::invalid_params(e.to_string())
    }
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(encoded.trim())?)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

pub fn encode_f64(value: f64) -> String {
    encode_bytes(&value.to_be_bytes())
}

pub fn decode_f64(encoded: &str) -> Result<f64, CodecError> {
    let bytes = decode_bytes(encoded)?;
    Ok(f64::from_be_bytes(fixed(&bytes)?))
}

pub fn encode_f32(value: f32) -> String {
    encode_bytes(&value.to_be_bytes())
}

pub fn decode_f32(encoded: &str) -> Result<f32, CodecError> {
    let bytes = decode_bytes(encoded)?;
    Ok(f32::from_be_bytes(fixed(&bytes)?))
}

pub fn encode_i32(value: i32) -> String {
    encode_bytes(&value.to_be_bytes())
}

pub fn decode_i32(encoded: &str) -> Result<i32, CodecError> {
    let bytes = decode_bytes(encoded)?;
    Ok(i32::from_be_bytes(fixed(&bytes)?))
}

pub fn encode_str(value: &str) -> String {
    encode_bytes(value.as_bytes())
}

pub fn decode_str(encoded: &str) -> Result<String, CodecError> {
    String::from_utf8(decode_bytes(encoded)?).map_err(|_| CodecError::Utf8)
}

/// base64(SHA-256(data)), the digest form the crypto sign/verify calls expect.
pub fn sha256_base64(data: &[u8]) -> String {
    encode_bytes(&Sha256::digest(data))
}
