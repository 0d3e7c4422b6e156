use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub time: String,
    pub location: String,
    pub category: String,
    pub image: Option<String>,
    pub max_attendees: Option<i32>,
    pub is_online: bool,
    pub is_public: bool,
    pub requires_approval: bool,
    pub price: i32,
    pub currency: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event together with its confirmed ticket total.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub event: Event,
    pub attendee_count: i64,
}

/// The slice of an event the RSVP ledger decides on, read under the event lock.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookingEvent {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub max_attendees: Option<i32>,
    pub requires_approval: bool,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub time: String,
    pub location: String,
    pub category: String,
    pub image: Option<String>,
    pub max_attendees: Option<i32>,
    pub is_online: bool,
    pub is_public: bool,
    pub requires_approval: bool,
    pub price: i32,
    pub currency: String,
    pub metadata: Option<Value>,
}

/// Partial update. Outer `None` keeps the stored value; for nullable columns
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub image: Option<Option<String>>,
    pub max_attendees: Option<Option<i32>>,
    pub is_online: Option<bool>,
    pub is_public: Option<bool>,
    pub requires_approval: Option<bool>,
    pub price: Option<i32>,
    pub currency: Option<String>,
    pub metadata: Option<Option<Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_events: i64,
    pub total_rsvps: i64,
    pub upcoming_events: i64,
    pub past_events: i64,
}

impl Event {
    pub fn from_new(new: NewEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id: new.creator_id,
            title: new.title,
            description: new.description,
            starts_at: new.starts_at,
            time: new.time,
            location: new.location,
            category: new.category,
            image: new.image,
            max_attendees: new.max_attendees,
            is_online: new.is_online,
            is_public: new.is_public,
            requires_approval: new.requires_approval,
            price: new.price,
            currency: new.currency,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: EventChanges, now: DateTime<Utc>) {
        let EventChanges {
            title,
            description,
            starts_at,
            time,
            location,
            category,
            image,
            max_attendees,
            is_online,
            is_public,
            requires_approval,
            price,
            currency,
            metadata,
        } = changes;

        if let Some(v) = title {
            self.title = v;
        }
        if let Some(v) = description {
            self.description = v;
        }
        if let Some(v) = starts_at {
            self.starts_at = v;
        }
        if let Some(v) = time {
            self.time = v;
        }
        if let Some(v) = location {
            self.location = v;
        }
        if let Some(v) = category {
            self.category = v;
        }
        if let Some(v) = image {
            self.image = v;
        }
        if let Some(v) = max_attendees {
            self.max_attendees = v;
        }
        if let Some(v) = is_online {
            self.is_online = v;
        }
        if let Some(v) = is_public {
            self.is_public = v;
        }
        if let Some(v) = requires_approval {
            self.requires_approval = v;
        }
        if let Some(v) = price {
            self.price = v;
        }
        if let Some(v) = currency {
            self.currency = v;
        }
        if let Some(v) = metadata {
            self.metadata = v;
        }
        self.updated_at = now;
    }

    pub fn booking_view(&self) -> BookingEvent {
        BookingEvent {
            id: self.id,
            creator_id: self.creator_id,
            title: self.title.clone(),
            max_attendees: self.max_attendees,
            requires_approval: self.requires_approval,
        }
    }

    /// Case-insensitive substring match over title, description and location.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.title, &self.description, &self.location]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}
