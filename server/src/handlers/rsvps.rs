use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::services::ledger::{RsvpRequest, RsvpSubmission, StatusRequest, SubmitOutcome};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::extract::{ApiJson, ApiPath};
use crate::utils::response::{csv, success, with_status};

pub async fn submit_rsvp(
    State(state): State<AppState>,
    OptionalAuthUser(actor): OptionalAuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RsvpRequest>,
) -> AppResult<Response> {
    let submission = RsvpSubmission::from_request(actor.map(|a| a.user_id), req);
    let response = match state.ledger.submit(event_id, submission).await? {
        SubmitOutcome::Created(rsvp) => with_status(StatusCode::CREATED, rsvp, "RSVP created"),
        SubmitOutcome::Updated(rsvp) => success(rsvp, "RSVP updated"),
    };
    Ok(response)
}

pub async fn list_rsvps(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let rsvps = state.ledger.list(event_id, actor.user_id).await?;
    Ok(success(rsvps, "RSVPs retrieved"))
}

pub async fn export_rsvps(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let (filename, body) = state.ledger.export_csv(event_id, actor.user_id).await?;
    Ok(csv(&filename, body))
}

pub async fn rsvp_stats(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let stats = state.ledger.stats(event_id, actor.user_id).await?;
    Ok(success(stats, "RSVP stats retrieved"))
}

pub async fn update_rsvp_status(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath((event_id, rsvp_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> AppResult<Response> {
    let status = req.parse()?;
    let rsvp = state
        .ledger
        .update_status(event_id, rsvp_id, actor.user_id, status)
        .await?;
    Ok(success(rsvp, "RSVP status updated"))
}
