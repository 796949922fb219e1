use std::sync::Arc;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 16;
const PAYLOAD_BYTES: usize = 8 + NONCE_BYTES;

/// Stateless CSRF tokens: `base64(issued_at ‖ nonce).base64(hmac)`.
///
/// A token is valid if it carries a correct signature and is younger than `max_age`.
#[derive(Clone)]
pub struct CsrfGuard {
    secret: Arc<[u8]>,
    max_age: chrono::Duration,
}

impl CsrfGuard {
    pub fn new(secret: &[u8], max_age: chrono::Duration) -> Self {
        CsrfGuard { secret: secret.into(), max_age }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> String {
        let mut payload = [0u8; PAYLOAD_BYTES];
        payload[..8].copy_from_slice(&now.timestamp().to_be_bytes());
        OsRng.fill_bytes(&mut payload[8..]);

        // an empty signature never verifies
        let signature = self.sign(&payload).unwrap_or_default();
        format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), URL_SAFE_NO_PAD.encode(signature))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> bool {
        let (payload, signature) = match token.split_once('.') {
            Some(parts) => parts,
            None => return false,
        };

        let (payload, signature) = match (URL_SAFE_NO_PAD.decode(payload), URL_SAFE_NO_PAD.decode(signature)) {
            (Ok(payload), Ok(signature)) => (payload, signature),
            _ => return false,
        };

        if payload.len() != PAYLOAD_BYTES {
            return false;
        }

        let expected = match self.sign(&payload) {
            Some(expected) => expected,
            None => return false,
        };
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            return false;
        }

        let mut issued_at = [0u8; 8];
        issued_at.copy_from_slice(&payload[..8]);
        let age = now.timestamp() - i64::from_be_bytes(issued_at);

        0 <= age && age <= self.max_age.num_seconds()
    }

    fn sign(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(payload);
        Some(mac.finalize().into_bytes().to_vec())
    }
}
