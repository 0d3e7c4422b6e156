use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Session id; deleting the session revokes the token.
    pub sid: Uuid,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and checks `<claims>.<signature>` bearer tokens, both parts
/// base64url without padding and the signature an HMAC-SHA256 over the
/// encoded claims.
#[derive(Clone)]
pub struct TokenIssuer {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, claims: &Claims) -> AppResult<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AppError::InternalServerError(format!("Failed to encode claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Checks signature and expiry. Session liveness is checked by the caller.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AppResult<Claims> {
        let invalid = || AppError::AuthError("Invalid token".to_string());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;

        if claims.exp <= now.timestamp() {
            return Err(AppError::AuthError("Token has expired".to_string()));
        }

        Ok(claims)
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::InternalServerError(format!("Invalid token key: {e}")))
    }
}
