use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{auth, categories, events, health_check, rsvps};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/signin", post(auth::signin))
        .route("/auth/signout", post(auth::signout))
        .route("/auth/me", get(auth::me).patch(auth::update_me))
        .route("/categories", get(categories::list_categories))
        .route("/dashboard", get(events::dashboard))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/user", get(events::my_events))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/stats", get(rsvps::rsvp_stats))
        .route(
            "/events/:id/rsvp",
            post(rsvps::submit_rsvp).get(rsvps::list_rsvps),
        )
        .route("/events/:id/rsvp/export", get(rsvps::export_rsvps))
        .route("/events/:id/rsvp/:rsvp_id", patch(rsvps::update_rsvp_status))
}
