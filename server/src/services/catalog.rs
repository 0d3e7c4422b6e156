use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::models::{DashboardStats, Event, EventChanges, EventFilter, EventSummary, NewEvent};
use crate::repository::EventRepository;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{optional_text, required_text};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

const MAX_TITLE_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_TIME_LEN: usize = 50;
const MAX_LOCATION_LEN: usize = 255;
const MAX_CATEGORY_LEN: usize = 100;
const MAX_IMAGE_LEN: usize = 2048;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub max_attendees: Option<i64>,
    pub is_online: Option<bool>,
    pub is_public: Option<bool>,
    pub requires_approval: Option<bool>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<Value>,
}

/// Absent fields are left alone; `null` clears the nullable ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_attendees: Option<Option<i64>>,
    pub is_online: Option<bool>,
    pub is_public: Option<bool>,
    pub requires_approval: Option<bool>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub metadata: Option<Option<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
}

impl EventCatalog {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub async fn create(&self, actor: Uuid, req: CreateEventRequest) -> AppResult<EventSummary> {
        let new = NewEvent {
            creator_id: actor,
            title: required_text("title", req.title.as_deref().unwrap_or_default(), MAX_TITLE_LEN)?,
            description: required_text(
                "description",
                req.description.as_deref().unwrap_or_default(),
                MAX_DESCRIPTION_LEN,
            )?,
            starts_at: parse_date(req.date.as_deref().unwrap_or_default())?,
            time: required_text("time", req.time.as_deref().unwrap_or_default(), MAX_TIME_LEN)?,
            location: required_text(
                "location",
                req.location.as_deref().unwrap_or_default(),
                MAX_LOCATION_LEN,
            )?,
            category: required_text(
                "category",
                req.category.as_deref().unwrap_or_default(),
                MAX_CATEGORY_LEN,
            )?,
            image: optional_text("image", req.image.as_deref(), MAX_IMAGE_LEN)?,
            max_attendees: req.max_attendees.map(validate_capacity).transpose()?,
            is_online: req.is_online.unwrap_or(false),
            is_public: req.is_public.unwrap_or(true),
            requires_approval: req.requires_approval.unwrap_or(false),
            price: validate_price(req.price.unwrap_or(0))?,
            currency: validate_currency(req.currency.as_deref().unwrap_or("USD"))?,
            metadata: req.metadata.filter(|m| !m.is_null()),
        };

        let event = self.events.create(new).await?;
        info!(event_id = %event.id, creator_id = %actor, "Event created");

        Ok(EventSummary {
            event,
            attendee_count: 0,
        })
    }

    /// Private events are only visible to their owner; anyone else gets
    /// `NotFound` so their existence is not revealed.
    pub async fn get(&self, id: Uuid, actor: Option<Uuid>) -> AppResult<EventSummary> {
        let summary = self.events.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        if !summary.event.is_public && actor != Some(summary.event.creator_id) {
            return Err(not_found(id));
        }
        Ok(summary)
    }

    pub async fn list(&self, query: EventQuery) -> AppResult<Vec<EventSummary>> {
        let filter = EventFilter {
            category: query
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all")),
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: query.offset.unwrap_or(0).max(0),
        };
        self.events.list_public(&filter).await
    }

    pub async fn list_for_owner(&self, actor: Uuid) -> AppResult<Vec<EventSummary>> {
        self.events.list_by_creator(actor).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        actor: Uuid,
        req: UpdateEventRequest,
    ) -> AppResult<EventSummary> {
        self.owned(id, actor).await?;

        let changes = EventChanges {
            title: req
                .title
                .map(|v| required_text("title", &v, MAX_TITLE_LEN))
                .transpose()?,
            description: req
                .description
                .map(|v| required_text("description", &v, MAX_DESCRIPTION_LEN))
                .transpose()?,
            starts_at: req.date.as_deref().map(parse_date).transpose()?,
            time: req
                .time
                .map(|v| required_text("time", &v, MAX_TIME_LEN))
                .transpose()?,
            location: req
                .location
                .map(|v| required_text("location", &v, MAX_LOCATION_LEN))
                .transpose()?,
            category: req
                .category
                .map(|v| required_text("category", &v, MAX_CATEGORY_LEN))
                .transpose()?,
            image: req
                .image
                .map(|v| optional_text("image", v.as_deref(), MAX_IMAGE_LEN))
                .transpose()?,
            max_attendees: req
                .max_attendees
                .map(|v| v.map(validate_capacity).transpose())
                .transpose()?,
            is_online: req.is_online,
            is_public: req.is_public,
            requires_approval: req.requires_approval,
            price: req.price.map(validate_price).transpose()?,
            currency: req.currency.as_deref().map(validate_currency).transpose()?,
            metadata: req.metadata.map(|m| m.filter(|v| !v.is_null())),
        };

        let event = self.events.update(id, changes).await?;
        info!(event_id = %id, "Event updated");

        // Re-read for a fresh attendee count.
        self.events.find_by_id(id).await?.ok_or_else(|| not_found(event.id))
    }

    pub async fn delete(&self, id: Uuid, actor: Uuid) -> AppResult<()> {
        self.owned(id, actor).await?;
        if !self.events.delete(id).await? {
            return Err(not_found(id));
        }
        info!(event_id = %id, "Event deleted");
        Ok(())
    }

    pub async fn dashboard(&self, actor: Uuid) -> AppResult<DashboardStats> {
        self.events.dashboard(actor, Utc::now()).await
    }

    async fn owned(&self, id: Uuid, actor: Uuid) -> AppResult<Event> {
        let summary = self.events.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        if summary.event.creator_id != actor {
            return Err(AppError::Forbidden(
                "Only the event organizer can modify this event".to_string(),
            ));
        }
        Ok(summary.event)
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Event '{id}' was not found"))
}

fn parse_date(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::invalid("date", "date is required"));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| AppError::invalid("date", "date must be YYYY-MM-DD or an RFC 3339 timestamp"))
}

fn validate_capacity(value: i64) -> AppResult<i32> {
    if value < 1 {
        return Err(AppError::invalid("maxAttendees", "maxAttendees must be positive"));
    }
    i32::try_from(value).map_err(|_| AppError::invalid("maxAttendees", "maxAttendees is too large"))
}

fn validate_price(value: i64) -> AppResult<i32> {
    if value < 0 {
        return Err(AppError::invalid("price", "price cannot be negative"));
    }
    i32::try_from(value).map_err(|_| AppError::invalid("price", "price is too large"))
}

fn validate_currency(value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.len() != 3 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::invalid("currency", "currency must be a 3-letter ISO code"));
    }
    Ok(value.to_ascii_uppercase())
}
