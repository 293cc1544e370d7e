//! Per-donation purchase keys.
//!
//! A key only has to look unique; it is not an authentication token.

use crate::utils::hmac_sha256_hex;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;

#[derive(Clone)]
pub struct PurchaseKeyGenerator {
    secret: Secret<String>,
}

impl PurchaseKeyGenerator {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    /// A fresh key for `email`, salted with the current time and a random
    /// nonce.
    pub fn generate(&self, email: &str) -> Result<String, AppError> {
        let nonce: [u8; 16] = rand::random();
        self.generate_with(email, Utc::now(), &nonce)
    }

    fn generate_with(
        &self,
        email: &str,
        at: DateTime<Utc>,
        nonce: &[u8],
    ) -> Result<String, AppError> {
        let timestamp = at.format("%Y-%m-%d %H:%M:%S%.f").to_string();
        hmac_sha256_hex(
            self.secret.expose_secret().as_bytes(),
            &[email.to_lowercase().as_bytes(), timestamp.as_bytes(), nonce],
        )
        .map_err(AppError::InternalError)
    }
}
