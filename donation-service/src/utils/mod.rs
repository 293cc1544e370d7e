//! Small helpers shared by handlers and services.

mod date_range;

pub use date_range::DateRange;

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of the concatenated `parts`.
pub fn hmac_sha256_hex(secret: &[u8], parts: &[&[u8]]) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| anyhow!("Invalid key length"))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex HMAC-SHA256 signature over `payload`.
pub fn verify_hmac_sha256_hex(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
