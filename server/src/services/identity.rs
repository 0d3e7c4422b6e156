use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::password::MIN_PASSWORD_LEN;
use crate::auth::{AuthUser, Claims, PasswordHasher, TokenIssuer};
use crate::models::{NewUser, ProfileChanges, User};
use crate::repository::{SessionRepository, UserRepository};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{normalize_email, optional_text, required_text, MAX_NAME_LEN};

const MAX_PROFILE_FIELD_LEN: usize = 500;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignUpRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

/// Returned by sign-up and sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            tokens,
        }
    }

    pub async fn signup(&self, req: SignUpRequest) -> AppResult<AuthSession> {
        let name = required_text("name", req.name.as_deref().unwrap_or_default(), MAX_NAME_LEN)?;
        let email = normalize_email("email", req.email.as_deref().unwrap_or_default())?;
        let password = validate_password(req.password.unwrap_or_default())?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }

        let password_hash = self.hash(password).await?;
        let user = self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
            })
            .await?;
        info!(user_id = %user.id, "User signed up");

        self.start_session(user).await
    }

    pub async fn signin(&self, req: SignInRequest) -> AppResult<AuthSession> {
        let user_id = self
            .verify_credential(
                req.email.as_deref().unwrap_or_default(),
                req.password.as_deref().unwrap_or_default(),
            )
            .await?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(invalid_credentials)?;
        info!(user_id = %user.id, "User signed in");

        self.start_session(user).await
    }

    /// The same error is returned for an unknown email and a wrong password.
    pub async fn verify_credential(&self, email: &str, password: &str) -> AppResult<Uuid> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(invalid_credentials());
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        let hasher = self.hasher;
        let password = password.to_string();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| AppError::InternalServerError(format!("Password check panicked: {e}")))??;

        if matches {
            Ok(user.id)
        } else {
            Err(invalid_credentials())
        }
    }

    /// Resolves a bearer token to its user. The token must carry a valid
    /// signature, be unexpired, and name a session that still exists.
    pub async fn authenticate(&self, token: &str) -> AppResult<AuthUser> {
        let now = Utc::now();
        let claims = self.tokens.verify(token, now)?;

        let session = self
            .sessions
            .find(claims.sid)
            .await?
            .filter(|s| s.user_id == claims.sub && !s.is_expired(now))
            .ok_or_else(|| AppError::AuthError("Session has ended".to_string()))?;

        Ok(AuthUser {
            user_id: session.user_id,
            session_id: session.id,
        })
    }

    pub async fn me(&self, actor: AuthUser) -> AppResult<User> {
        self.users
            .find_by_id(actor.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn update_profile(&self, actor: AuthUser, req: UpdateProfileRequest) -> AppResult<User> {
        let changes = ProfileChanges {
            name: req
                .name
                .map(|v| required_text("name", &v, MAX_NAME_LEN))
                .transpose()?,
            avatar: optional_text("avatar", req.avatar.as_deref(), MAX_PROFILE_FIELD_LEN)?,
            bio: optional_text("bio", req.bio.as_deref(), MAX_PROFILE_FIELD_LEN)?,
            location: optional_text("location", req.location.as_deref(), MAX_PROFILE_FIELD_LEN)?,
            website: optional_text("website", req.website.as_deref(), MAX_PROFILE_FIELD_LEN)?,
        };
        self.users.update_profile(actor.user_id, changes).await
    }

    pub async fn signout(&self, actor: AuthUser) -> AppResult<()> {
        self.sessions.delete(actor.session_id).await?;
        info!(user_id = %actor.user_id, session_id = %actor.session_id, "User signed out");
        Ok(())
    }

    async fn start_session(&self, user: User) -> AppResult<AuthSession> {
        let expires_at = Utc::now() + self.tokens.ttl();
        let session = self.sessions.create(user.id, expires_at).await?;
        let token = self.tokens.sign(&Claims {
            sub: user.id,
            sid: session.id,
            exp: session.expires_at.timestamp(),
        })?;

        Ok(AuthSession {
            user,
            token,
            expires_at: session.expires_at,
        })
    }

    async fn hash(&self, password: String) -> AppResult<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::InternalServerError(format!("Password hashing panicked: {e}")))
    }
}

fn invalid_credentials() -> AppError {
    AppError::AuthError("Invalid email or password".to_string())
}

fn validate_password(password: String) -> AppResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::invalid("password", "password is too long"));
    }
    Ok(password)
}
