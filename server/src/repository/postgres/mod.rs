use sqlx::{PgPool, Postgres, Transaction};

use crate::utils::error::AppResult;

mod category;
mod event;
mod rsvp;
mod session;
mod user;

pub use category::PgCategoryRepository;
pub use event::PgEventRepository;
pub use rsvp::PgRsvpRepository;
pub use session::PgSessionRepository;
pub use user::PgUserRepository;

/// Event columns plus the confirmed ticket total, aliased for `EventSummary`.
const EVENT_SUMMARY_SELECT: &str = r#"
    SELECT
        e.*,
        COALESCE((
            SELECT SUM(r.ticket_count)
            FROM rsvps AS r
            WHERE r.event_id = e.id AND r.status = 'confirmed'
        ), 0)::BIGINT AS attendee_count
    FROM events AS e
"#;

#[derive(Clone)]
pub struct ConnectionPool(PgPool);

impl ConnectionPool {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }

    pub fn inner_ref(&self) -> &PgPool {
        &self.0
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        Ok(self.0.begin().await?)
    }
}
