use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::ConnectionPool;
use crate::models::{
    AttendeeKey, BookingChanges, BookingEvent, NewRsvp, Rsvp, RsvpStats, RsvpStatus,
};
use crate::repository::{RsvpRepository, RsvpTransaction};
use crate::utils::error::{AppError, AppResult};

pub struct PgRsvpRepository {
    db: ConnectionPool,
}

impl PgRsvpRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RsvpRepository for PgRsvpRepository {
    async fn begin(&self, event_id: Uuid) -> AppResult<Box<dyn RsvpTransaction>> {
        let mut tx = self.db.begin().await?;

        // Row lock on the event serializes every booking and status change for
        // it; later reads in this transaction see rows committed before the lock
        // was granted.
        let event = sqlx::query_as::<_, BookingEvent>(
            r#"
            SELECT id, creator_id, title, max_attendees, requires_approval
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

        debug!(%event_id, "Acquired event booking lock");

        Ok(Box::new(PgRsvpTransaction { tx, event }))
    }

    async fn find_by_event(&self, event_id: Uuid) -> AppResult<Vec<Rsvp>> {
        let rsvps = sqlx::query_as::<_, Rsvp>(
            r#"
            SELECT * FROM rsvps
            WHERE event_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(event_id)
        .fetch_all(self.db.inner_ref())
        .await?;
        Ok(rsvps)
    }

    async fn sum_confirmed_tickets(&self, event_id: Uuid) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ticket_count), 0)::BIGINT
            FROM rsvps
            WHERE event_id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(event_id)
        .fetch_one(self.db.inner_ref())
        .await?;
        Ok(total)
    }

    async fn stats(&self, event_id: Uuid) -> AppResult<RsvpStats> {
        let stats = sqlx::query_as::<_, RsvpStats>(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total,
                COUNT(*) FILTER (WHERE status = 'pending')::BIGINT AS pending,
                COUNT(*) FILTER (WHERE status = 'confirmed')::BIGINT AS confirmed,
                COUNT(*) FILTER (WHERE status = 'cancelled')::BIGINT AS cancelled,
                COALESCE(SUM(ticket_count) FILTER (WHERE status = 'confirmed'), 0)::BIGINT
                    AS confirmed_tickets
            FROM rsvps
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(self.db.inner_ref())
        .await?;
        Ok(stats)
    }
}

struct PgRsvpTransaction {
    tx: Transaction<'static, Postgres>,
    event: BookingEvent,
}

impl PgRsvpTransaction {
    fn not_found(&self, rsvp_id: Uuid) -> AppError {
        AppError::NotFound(format!(
            "RSVP '{rsvp_id}' was not found for event '{}'",
            self.event.id
        ))
    }
}

#[async_trait]
impl RsvpTransaction for PgRsvpTransaction {
    fn event(&self) -> &BookingEvent {
        &self.event
    }

    async fn find(&mut self, rsvp_id: Uuid) -> AppResult<Option<Rsvp>> {
        let rsvp = sqlx::query_as::<_, Rsvp>("SELECT * FROM rsvps WHERE id = $1 AND event_id = $2")
            .bind(rsvp_id)
            .bind(self.event.id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(rsvp)
    }

    async fn find_active(&mut self, key: &AttendeeKey) -> AppResult<Option<Rsvp>> {
        let rsvp = sqlx::query_as::<_, Rsvp>(
            r#"
            SELECT * FROM rsvps
            WHERE event_id = $1
              AND status <> 'cancelled'
              AND (email = $2 OR ($3::UUID IS NOT NULL AND user_id = $3))
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(self.event.id)
        .bind(&key.email)
        .bind(key.user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(rsvp)
    }

    async fn sum_confirmed_tickets(&mut self) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(ticket_count), 0)::BIGINT
            FROM rsvps
            WHERE event_id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(self.event.id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn insert(&mut self, rsvp: NewRsvp) -> AppResult<Rsvp> {
        let rsvp = Rsvp::from_new(rsvp, Utc::now());
        let inserted = sqlx::query_as::<_, Rsvp>(
            r#"
            INSERT INTO rsvps (
                id, event_id, user_id, name, email, phone, notes,
                ticket_count, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(rsvp.id)
        .bind(rsvp.event_id)
        .bind(rsvp.user_id)
        .bind(&rsvp.name)
        .bind(&rsvp.email)
        .bind(&rsvp.phone)
        .bind(&rsvp.notes)
        .bind(rsvp.ticket_count)
        .bind(rsvp.status.as_str())
        .bind(rsvp.created_at)
        .bind(rsvp.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(inserted)
    }

    async fn update_status(&mut self, rsvp_id: Uuid, status: RsvpStatus) -> AppResult<Rsvp> {
        let updated = sqlx::query_as::<_, Rsvp>(
            r#"
            UPDATE rsvps SET status = $3, updated_at = $4
            WHERE id = $1 AND event_id = $2
            RETURNING *
            "#,
        )
        .bind(rsvp_id)
        .bind(self.event.id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await?;

        updated.ok_or_else(|| self.not_found(rsvp_id))
    }

    async fn update_booking(&mut self, rsvp_id: Uuid, changes: BookingChanges) -> AppResult<Rsvp> {
        let updated = sqlx::query_as::<_, Rsvp>(
            r#"
            UPDATE rsvps SET
                ticket_count = $3,
                notes = $4,
                phone = $5,
                updated_at = $6,
                name = CASE WHEN user_id IS NULL THEN $8 ELSE name END,
                user_id = COALESCE(user_id, $7)
            WHERE id = $1 AND event_id = $2
            RETURNING *
            "#,
        )
        .bind(rsvp_id)
        .bind(self.event.id)
        .bind(changes.ticket_count)
        .bind(changes.notes)
        .bind(changes.phone)
        .bind(Utc::now())
        .bind(changes.user_id)
        .bind(changes.name)
        .fetch_optional(&mut *self.tx)
        .await?;

        updated.ok_or_else(|| self.not_found(rsvp_id))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
