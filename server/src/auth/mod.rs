//! Credentials, bearer tokens and the request extractors built on them.

use uuid::Uuid;

mod extractor;
pub mod password;
pub mod token;

pub use extractor::OptionalAuthUser;
pub use password::PasswordHasher;
pub use token::{Claims, TokenIssuer};

/// The resolved actor behind a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}
