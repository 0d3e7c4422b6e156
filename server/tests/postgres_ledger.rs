//! Runs against a real database when `DATABASE_URL` is set; otherwise each
//! test returns early.

mod common;

use axum::http::StatusCode;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use common::{attendee_count, create_event, guest_rsvp, signup, test_config};
use venu_server::repository::Repositories;
use venu_server::routes::create_routes;
use venu_server::state::AppState;

async fn postgres_app() -> Option<Router> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    let config = test_config();
    Some(create_routes(
        AppState::new(Repositories::postgres(pool), &config),
        &config,
    ))
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn row_lock_prevents_overbooking() {
    const CAPACITY: i64 = 5;
    const ATTEMPTS: usize = 25;

    let Some(app) = postgres_app().await else {
        return;
    };
    let (token, _) = signup(&app, &unique_email("organizer")).await;
    let event_id = create_event(&app, &token, Some(CAPACITY), false).await;

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let app = app.clone();
            let event_id = event_id.clone();
            let email = unique_email("guest");
            tokio::spawn(async move { guest_rsvp(&app, &event_id, &email, 1).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::UNPROCESSABLE_ENTITY => {
                assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED")
            }
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    assert_eq!(created, CAPACITY as usize);
    assert_eq!(attendee_count(&app, &event_id, &token).await, CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_guests_race_to_one_row() {
    let Some(app) = postgres_app().await else {
        return;
    };
    let (token, _) = signup(&app, &unique_email("organizer")).await;
    let event_id = create_event(&app, &token, None, false).await;
    let email = unique_email("same");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let app = app.clone();
            let event_id = event_id.clone();
            let email = email.clone();
            tokio::spawn(async move { guest_rsvp(&app, &event_id, &email, 1).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
        }
    }
    assert_eq!(created, 1);
    assert_eq!(attendee_count(&app, &event_id, &token).await, 1);
}
