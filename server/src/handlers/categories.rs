use axum::extract::State;
use axum::response::Response;

use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::success;

pub async fn list_categories(State(state): State<AppState>) -> AppResult<Response> {
    let categories = state.repos.categories.list().await?;
    Ok(success(categories, "Categories retrieved"))
}
