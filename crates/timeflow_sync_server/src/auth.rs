//! Bearer token authentication.
//!
//! Tokens are the lowercase hex HMAC-SHA256 of the user id under the
//! server secret. A token therefore authorizes exactly one account and
//! never expires; rotating the secret revokes every token at once.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Creates a signer with the given secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Returns the bearer token for a user.
    pub fn token_for(&self, user_id: &str) -> ServerResult<String> {
        let mac = self.mac(user_id)?;
        let digest = mac.finalize().into_bytes();
        Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Verifies that `token` was issued for `user_id`.
    ///
    /// The signature comparison runs in constant time.
    pub fn verify(&self, user_id: &str, token: &str) -> ServerResult<()> {
        let signature =
            decode_hex(token).ok_or_else(|| ServerError::unauthorized("malformed token"))?;

        self.mac(user_id)?
            .verify_slice(&signature)
            .map_err(|_| ServerError::unauthorized("invalid token"))
    }

    fn mac(&self, user_id: &str) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(user_id.as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }

    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}
