//! Storage ports and their adapters.
//!
//! Services depend only on the traits in this module. [`postgres`] backs them
//! with sqlx; [`memory`] keeps everything in process for tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AttendeeKey, BookingChanges, BookingEvent, Category, DashboardStats, Event, EventChanges,
    EventFilter, EventSummary, NewEvent, NewRsvp, NewUser, ProfileChanges, Rsvp, RsvpStats,
    RsvpStatus, Session, User,
};
use crate::utils::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> AppResult<User>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> AppResult<User>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Session>;
    async fn find(&self, id: Uuid) -> AppResult<Option<Session>>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Category>>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: NewEvent) -> AppResult<Event>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EventSummary>>;
    async fn list_public(&self, filter: &EventFilter) -> AppResult<Vec<EventSummary>>;
    async fn list_by_creator(&self, creator_id: Uuid) -> AppResult<Vec<EventSummary>>;
    /// Applies `changes` while holding the event lock, so a capacity change
    /// cannot interleave with a booking. Lowering `max_attendees` below the
    /// confirmed ticket total is rejected, as is turning approval off while
    /// RSVPs are still pending.
    async fn update(&self, id: Uuid, changes: EventChanges) -> AppResult<Event>;
    /// Deletes the event and, by cascade, its RSVPs. Returns false when absent.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn dashboard(&self, creator_id: Uuid, now: DateTime<Utc>) -> AppResult<DashboardStats>;
}

/// RSVP persistence. Every mutation goes through an [`RsvpTransaction`]
/// obtained from [`RsvpRepository::begin`].
#[async_trait]
pub trait RsvpRepository: Send + Sync {
    /// Opens a unit of work that holds the event's booking lock until it is
    /// committed or dropped. Fails with `NotFound` when the event is absent.
    async fn begin(&self, event_id: Uuid) -> AppResult<Box<dyn RsvpTransaction>>;
    /// Newest first.
    async fn find_by_event(&self, event_id: Uuid) -> AppResult<Vec<Rsvp>>;
    async fn sum_confirmed_tickets(&self, event_id: Uuid) -> AppResult<i64>;
    async fn stats(&self, event_id: Uuid) -> AppResult<RsvpStats>;
}

/// All reads see the latest committed state plus this unit's own writes.
/// Nothing becomes visible to others until [`RsvpTransaction::commit`];
/// dropping the unit rolls it back.
#[async_trait]
pub trait RsvpTransaction: Send {
    fn event(&self) -> &BookingEvent;
    async fn find(&mut self, rsvp_id: Uuid) -> AppResult<Option<Rsvp>>;
    async fn find_active(&mut self, key: &AttendeeKey) -> AppResult<Option<Rsvp>>;
    async fn sum_confirmed_tickets(&mut self) -> AppResult<i64>;
    async fn insert(&mut self, rsvp: NewRsvp) -> AppResult<Rsvp>;
    async fn update_status(&mut self, rsvp_id: Uuid, status: RsvpStatus) -> AppResult<Rsvp>;
    async fn update_booking(&mut self, rsvp_id: Uuid, changes: BookingChanges) -> AppResult<Rsvp>;
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Bundle of storage adapters handed to the services at start-up.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub events: Arc<dyn EventRepository>,
    pub rsvps: Arc<dyn RsvpRepository>,
}

impl Repositories {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let db = postgres::ConnectionPool::new(pool);
        Self {
            users: Arc::new(postgres::PgUserRepository::new(db.clone())),
            sessions: Arc::new(postgres::PgSessionRepository::new(db.clone())),
            categories: Arc::new(postgres::PgCategoryRepository::new(db.clone())),
            events: Arc::new(postgres::PgEventRepository::new(db.clone())),
            rsvps: Arc::new(postgres::PgRsvpRepository::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::seeded();
        Self {
            users: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            categories: Arc::new(store.clone()),
            events: Arc::new(store.clone()),
            rsvps: Arc::new(store),
        }
    }
}

pub(crate) fn pending_approvals(pending: i64) -> AppError {
    AppError::invalid(
        "requiresApproval",
        format!("Approval cannot be turned off while {pending} RSVPs are pending"),
    )
}
