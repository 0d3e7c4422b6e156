use axum::extract::State;
use axum::response::Response;

use crate::auth::AuthUser;
use crate::services::identity::{SignInRequest, SignUpRequest, UpdateProfileRequest};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::extract::ApiJson;
use crate::utils::response::{created, empty_success, success};

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> AppResult<Response> {
    let session = state.identity.signup(req).await?;
    Ok(created(session, "Account created"))
}

pub async fn signin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> AppResult<Response> {
    let session = state.identity.signin(req).await?;
    Ok(success(session, "Signed in"))
}

pub async fn signout(State(state): State<AppState>, actor: AuthUser) -> AppResult<Response> {
    state.identity.signout(actor).await?;
    Ok(empty_success("Signed out"))
}

pub async fn me(State(state): State<AppState>, actor: AuthUser) -> AppResult<Response> {
    let user = state.identity.me(actor).await?;
    Ok(success(user, "Current user"))
}

pub async fn update_me(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> AppResult<Response> {
    let user = state.identity.update_profile(actor, req).await?;
    Ok(success(user, "Profile updated"))
}
