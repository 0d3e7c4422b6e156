use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::utils::error::{AppError, AppResult};

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 8;

/// PBKDF2-HMAC-SHA256 hasher producing self-describing
/// `pbkdf2-sha256$<iterations>$<salt>$<hash>` strings.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let hash = derive(password, &salt, self.iterations);
        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        )
    }

    /// Iterations are read from the stored hash, so raising the configured
    /// cost does not invalidate existing credentials.
    pub fn verify(&self, password: &str, stored: &str) -> AppResult<bool> {
        let malformed = || AppError::InternalServerError("Stored password hash is malformed".into());

        let mut parts = stored.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed());
        };

        let iterations: u32 = iterations.parse().map_err(|_| malformed())?;
        let salt = STANDARD_NO_PAD.decode(salt).map_err(|_| malformed())?;
        let expected = STANDARD_NO_PAD.decode(expected).map_err(|_| malformed())?;

        let actual = derive(password, &salt, iterations);
        Ok(constant_time_eq::constant_time_eq(&actual, &expected))
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}
