//! HMAC-SHA256 helpers shared by SAS minting and shared-key request signing.

use crate::error::{FileShareError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Decode a base64 account key.
pub fn decode_account_key(key: &str) -> Result<Zeroizing<Vec<u8>>> {
    STANDARD
        .decode(key.trim())
        .map(Zeroizing::new)
        .map_err(|e| FileShareError::invalid_argument(format!("Account key is not valid base64: {e}")))
}

/// `base64(HMAC-SHA256(key, data))`
pub fn sign_base64(key: &[u8], data: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| FileShareError::invalid_argument(format!("Invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Compare two signatures without short-circuiting on the first mismatch.
pub fn signatures_match(expected: &str, actual: &str) -> bool {
    expected.len() == actual.len()
        && expected
            .bytes()
            .zip(actual.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
