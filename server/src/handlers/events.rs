use axum::extract::{Query, State};
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::services::catalog::{CreateEventRequest, EventQuery, UpdateEventRequest};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::extract::{ApiJson, ApiPath};
use crate::utils::response::{created, empty_success, success};

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> AppResult<Response> {
    let events = state.catalog.list(query).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiJson(req): ApiJson<CreateEventRequest>,
) -> AppResult<Response> {
    let event = state.catalog.create(actor.user_id, req).await?;
    Ok(created(event, "Event created"))
}

pub async fn my_events(State(state): State<AppState>, actor: AuthUser) -> AppResult<Response> {
    let events = state.catalog.list_for_owner(actor.user_id).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn get_event(
    State(state): State<AppState>,
    OptionalAuthUser(actor): OptionalAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let event = state.catalog.get(id, actor.map(|a| a.user_id)).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn update_event(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateEventRequest>,
) -> AppResult<Response> {
    let event = state.catalog.update(id, actor.user_id, req).await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Response> {
    state.catalog.delete(id, actor.user_id).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn dashboard(State(state): State<AppState>, actor: AuthUser) -> AppResult<Response> {
    let stats = state.catalog.dashboard(actor.user_id).await?;
    Ok(success(stats, "Dashboard stats retrieved"))
}
