use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{ConnectionPool, EVENT_SUMMARY_SELECT};
use crate::models::{DashboardStats, Event, EventChanges, EventFilter, EventSummary, NewEvent};
use crate::repository::{pending_approvals, EventRepository};
use crate::utils::error::{AppError, AppResult};

pub struct PgEventRepository {
    db: ConnectionPool,
}

impl PgEventRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

/// Wraps a search term for ILIKE, escaping the pattern metacharacters.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn create(&self, event: NewEvent) -> AppResult<Event> {
        let event = Event::from_new(event, Utc::now());
        let created = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                id, creator_id, title, description, starts_at, time, location, category,
                image, max_attendees, is_online, is_public, requires_approval,
                price, currency, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.creator_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(&event.time)
        .bind(&event.location)
        .bind(&event.category)
        .bind(&event.image)
        .bind(event.max_attendees)
        .bind(event.is_online)
        .bind(event.is_public)
        .bind(event.requires_approval)
        .bind(event.price)
        .bind(&event.currency)
        .bind(event.metadata.as_ref().map(Json))
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(self.db.inner_ref())
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EventSummary>> {
        let query = format!("{EVENT_SUMMARY_SELECT} WHERE e.id = $1");
        let event = sqlx::query_as::<_, EventSummary>(&query)
            .bind(id)
            .fetch_optional(self.db.inner_ref())
            .await?;
        Ok(event)
    }

    async fn list_public(&self, filter: &EventFilter) -> AppResult<Vec<EventSummary>> {
        let query = format!(
            r#"{EVENT_SUMMARY_SELECT}
            WHERE e.is_public = TRUE
              AND ($1::TEXT IS NULL OR e.category = $1)
              AND ($2::TEXT IS NULL
                   OR e.title ILIKE $2
                   OR e.description ILIKE $2
                   OR e.location ILIKE $2)
            ORDER BY e.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let events = sqlx::query_as::<_, EventSummary>(&query)
            .bind(filter.category.as_deref())
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(self.db.inner_ref())
            .await?;
        Ok(events)
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> AppResult<Vec<EventSummary>> {
        let query = format!("{EVENT_SUMMARY_SELECT} WHERE e.creator_id = $1 ORDER BY e.starts_at ASC");
        let events = sqlx::query_as::<_, EventSummary>(&query)
            .bind(creator_id)
            .fetch_all(self.db.inner_ref())
            .await?;
        Ok(events)
    }

    async fn update(&self, id: Uuid, changes: EventChanges) -> AppResult<Event> {
        let mut tx = self.db.begin().await?;

        // Same row lock the RSVP ledger takes before booking.
        let mut event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{id}' was not found")))?;

        if let Some(Some(limit)) = changes.max_attendees {
            let confirmed: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(ticket_count), 0)::BIGINT
                FROM rsvps
                WHERE event_id = $1 AND status = 'confirmed'
                "#,
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if i64::from(limit) < confirmed {
                return Err(AppError::invalid(
                    "maxAttendees",
                    format!("Capacity cannot be lower than the {confirmed} tickets already confirmed"),
                ));
            }
        }

        if changes.requires_approval == Some(false) && event.requires_approval {
            let pending: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM rsvps WHERE event_id = $1 AND status = 'pending'",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if pending > 0 {
                return Err(pending_approvals(pending));
            }
        }

        event.apply(changes, Utc::now());

        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events SET
                title = $2,
                description = $3,
                starts_at = $4,
                time = $5,
                location = $6,
                category = $7,
                image = $8,
                max_attendees = $9,
                is_online = $10,
                is_public = $11,
                requires_approval = $12,
                price = $13,
                currency = $14,
                metadata = $15,
                updated_at = $16
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(&event.time)
        .bind(&event.location)
        .bind(&event.category)
        .bind(&event.image)
        .bind(event.max_attendees)
        .bind(event.is_online)
        .bind(event.is_public)
        .bind(event.requires_approval)
        .bind(event.price)
        .bind(&event.currency)
        .bind(event.metadata.as_ref().map(Json))
        .bind(event.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(self.db.inner_ref())
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn dashboard(&self, creator_id: Uuid, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total_events,
                (
                    SELECT COUNT(*)
                    FROM rsvps AS r
                    INNER JOIN events AS re ON r.event_id = re.id
                    WHERE re.creator_id = $1 AND r.status <> 'cancelled'
                )::BIGINT AS total_rsvps,
                COUNT(*) FILTER (WHERE e.starts_at >= $2)::BIGINT AS upcoming_events,
                COUNT(*) FILTER (WHERE e.starts_at < $2)::BIGINT AS past_events
            FROM events AS e
            WHERE e.creator_id = $1
            "#,
        )
        .bind(creator_id)
        .bind(now)
        .fetch_one(self.db.inner_ref())
        .await?;

        Ok(stats)
    }
}
