//! In-process storage adapter.
//!
//! Mirrors the Postgres adapter's guarantees: every booking unit of work holds
//! a per-event async mutex (the stand-in for `SELECT ... FOR UPDATE`) and
//! stages its writes on a private copy of the event's RSVPs, published only on
//! commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    AttendeeKey, BookingChanges, BookingEvent, Category, DashboardStats, Event, EventChanges,
    EventFilter, EventSummary, NewEvent, NewRsvp, NewUser, ProfileChanges, Rsvp, RsvpStats,
    RsvpStatus, Session, User,
};
use crate::repository::{
    pending_approvals, CategoryRepository, EventRepository, RsvpRepository, RsvpTransaction, SessionRepository,
    UserRepository,
};
use crate::utils::error::{AppError, AppResult};

const SEED_CATEGORIES: [(&str, &str, &str, &str, &str); 6] = [
    ("Technology", "technology", "Tech meetups, conferences, and workshops", "#3B82F6", "laptop"),
    ("Design", "design", "UI/UX design, graphic design, and creative workshops", "#8B5CF6", "palette"),
    ("Business", "business", "Networking, entrepreneurship, and business events", "#10B981", "briefcase"),
    ("Education", "education", "Learning, courses, and educational workshops", "#F59E0B", "book"),
    ("Health", "health", "Fitness, wellness, and health-related events", "#EF4444", "heart"),
    ("Entertainment", "entertainment", "Music, art, and entertainment events", "#EC4899", "music"),
];

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    categories: Vec<Category>,
    events: HashMap<Uuid, Event>,
    rsvps: HashMap<Uuid, Vec<Rsvp>>,
}

impl State {
    fn confirmed_tickets(&self, event_id: Uuid) -> i64 {
        self.rsvps
            .get(&event_id)
            .map(|rsvps| rsvps.iter().map(Rsvp::confirmed_tickets).sum())
            .unwrap_or(0)
    }

    fn summary(&self, event: &Event) -> EventSummary {
        EventSummary {
            event: event.clone(),
            attendee_count: self.confirmed_tickets(event.id),
        }
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    event_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the default categories.
    pub fn seeded() -> Self {
        let store = Self::new();
        let now = Utc::now();
        store.state().categories = SEED_CATEGORIES
            .iter()
            .map(|(name, slug, description, color, icon)| Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: slug.to_string(),
                description: Some(description.to_string()),
                color: Some(color.to_string()),
                icon: Some(icon.to_string()),
                created_at: now,
                updated_at: now,
            })
            .collect();
        store
    }

    // Never held across an await.
    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` when the event does not exist; no lock entry is created for it.
    async fn lock_event(&self, event_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .inner
                .event_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.state().events.contains_key(&event_id) {
                return None;
            }
            locks.entry(event_id).or_default().clone()
        };
        Some(lock.lock_owned().await)
    }

    fn forget_event_lock(&self, event_id: Uuid) {
        self.inner
            .event_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event_id);
    }
}

fn event_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Event '{id}' was not found"))
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }
        let user = User::from_new(user, Utc::now());
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.state().users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> AppResult<User> {
        let mut state = self.state();
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User '{id}' was not found")))?;
        user.apply(changes, Utc::now());
        Ok(user.clone())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at,
            created_at: Utc::now(),
        };
        self.state().sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(self.state().sessions.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.state().sessions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list(&self) -> AppResult<Vec<Category>> {
        let mut categories = self.state().categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn create(&self, event: NewEvent) -> AppResult<Event> {
        let event = Event::from_new(event, Utc::now());
        let mut state = self.state();
        state.events.insert(event.id, event.clone());
        state.rsvps.insert(event.id, Vec::new());
        Ok(event)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EventSummary>> {
        let state = self.state();
        Ok(state.events.get(&id).map(|event| state.summary(event)))
    }

    async fn list_public(&self, filter: &EventFilter) -> AppResult<Vec<EventSummary>> {
        let state = self.state();
        let mut events: Vec<&Event> = state
            .events
            .values()
            .filter(|e| e.is_public)
            .filter(|e| filter.category.as_ref().map_or(true, |c| &e.category == c))
            .filter(|e| filter.search.as_deref().map_or(true, |s| e.matches_search(s)))
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        Ok(events
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| state.summary(e))
            .collect())
    }

    async fn list_by_creator(&self, creator_id: Uuid) -> AppResult<Vec<EventSummary>> {
        let state = self.state();
        let mut events: Vec<&Event> = state
            .events
            .values()
            .filter(|e| e.creator_id == creator_id)
            .collect();
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(events.into_iter().map(|e| state.summary(e)).collect())
    }

    async fn update(&self, id: Uuid, changes: EventChanges) -> AppResult<Event> {
        let _guard = self.lock_event(id).await.ok_or_else(|| event_not_found(id))?;
        let mut state = self.state();

        let confirmed = state.confirmed_tickets(id);
        let pending = state
            .rsvps
            .get(&id)
            .map(|rsvps| rsvps.iter().filter(|r| r.status == RsvpStatus::Pending).count())
            .unwrap_or(0);
        let event = state.events.get_mut(&id).ok_or_else(|| event_not_found(id))?;

        if changes.requires_approval == Some(false) && event.requires_approval && pending > 0 {
            return Err(pending_approvals(pending as i64));
        }

        if let Some(Some(limit)) = changes.max_attendees {
            if i64::from(limit) < confirmed {
                return Err(AppError::invalid(
                    "maxAttendees",
                    format!("Capacity cannot be lower than the {confirmed} tickets already confirmed"),
                ));
            }
        }

        event.apply(changes, Utc::now());
        Ok(event.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let Some(guard) = self.lock_event(id).await else {
            return Ok(false);
        };
        let removed = {
            let mut state = self.state();
            state.rsvps.remove(&id);
            state.events.remove(&id).is_some()
        };
        drop(guard);
        self.forget_event_lock(id);
        Ok(removed)
    }

    async fn dashboard(&self, creator_id: Uuid, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let state = self.state();
        let mut stats = DashboardStats::default();
        for event in state.events.values().filter(|e| e.creator_id == creator_id) {
            stats.total_events += 1;
            if event.starts_at >= now {
                stats.upcoming_events += 1;
            } else {
                stats.past_events += 1;
            }
            stats.total_rsvps += state
                .rsvps
                .get(&event.id)
                .map(|rsvps| rsvps.iter().filter(|r| r.status.is_active()).count() as i64)
                .unwrap_or(0);
        }
        Ok(stats)
    }
}

#[async_trait]
impl RsvpRepository for MemoryStore {
    async fn begin(&self, event_id: Uuid) -> AppResult<Box<dyn RsvpTransaction>> {
        let guard = self
            .lock_event(event_id)
            .await
            .ok_or_else(|| event_not_found(event_id))?;

        let (event, rsvps) = {
            let state = self.state();
            let event = state
                .events
                .get(&event_id)
                .ok_or_else(|| event_not_found(event_id))?
                .booking_view();
            let rsvps = state.rsvps.get(&event_id).cloned().unwrap_or_default();
            (event, rsvps)
        };

        Ok(Box::new(MemoryRsvpTransaction {
            store: self.clone(),
            _guard: guard,
            event,
            rsvps,
        }))
    }

    async fn find_by_event(&self, event_id: Uuid) -> AppResult<Vec<Rsvp>> {
        let mut rsvps = self.state().rsvps.get(&event_id).cloned().unwrap_or_default();
        rsvps.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rsvps)
    }

    async fn sum_confirmed_tickets(&self, event_id: Uuid) -> AppResult<i64> {
        Ok(self.state().confirmed_tickets(event_id))
    }

    async fn stats(&self, event_id: Uuid) -> AppResult<RsvpStats> {
        let state = self.state();
        Ok(state
            .rsvps
            .get(&event_id)
            .map(|rsvps| RsvpStats::from_rsvps(rsvps))
            .unwrap_or_default())
    }
}

struct MemoryRsvpTransaction {
    store: MemoryStore,
    _guard: OwnedMutexGuard<()>,
    event: BookingEvent,
    rsvps: Vec<Rsvp>,
}

impl MemoryRsvpTransaction {
    fn get_mut(&mut self, rsvp_id: Uuid) -> AppResult<&mut Rsvp> {
        let event_id = self.event.id;
        self.rsvps
            .iter_mut()
            .find(|r| r.id == rsvp_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "RSVP '{rsvp_id}' was not found for event '{event_id}'"
                ))
            })
    }
}

#[async_trait]
impl RsvpTransaction for MemoryRsvpTransaction {
    fn event(&self) -> &BookingEvent {
        &self.event
    }

    async fn find(&mut self, rsvp_id: Uuid) -> AppResult<Option<Rsvp>> {
        Ok(self.rsvps.iter().find(|r| r.id == rsvp_id).cloned())
    }

    async fn find_active(&mut self, key: &AttendeeKey) -> AppResult<Option<Rsvp>> {
        Ok(self.rsvps.iter().find(|r| r.is_active_for(key)).cloned())
    }

    async fn sum_confirmed_tickets(&mut self) -> AppResult<i64> {
        // Yield as a database round-trip would.
        tokio::task::yield_now().await;
        Ok(self.rsvps.iter().map(Rsvp::confirmed_tickets).sum())
    }

    async fn insert(&mut self, rsvp: NewRsvp) -> AppResult<Rsvp> {
        let rsvp = Rsvp::from_new(rsvp, Utc::now());
        let key = AttendeeKey {
            user_id: rsvp.user_id,
            email: rsvp.email.clone(),
        };
        if self.rsvps.iter().any(|r| r.is_active_for(&key)) {
            return Err(AppError::Conflict(
                "You have already RSVP'd for this event".to_string(),
            ));
        }
        self.rsvps.push(rsvp.clone());
        Ok(rsvp)
    }

    async fn update_status(&mut self, rsvp_id: Uuid, status: RsvpStatus) -> AppResult<Rsvp> {
        let rsvp = self.get_mut(rsvp_id)?;
        rsvp.status = status;
        rsvp.updated_at = Utc::now();
        Ok(rsvp.clone())
    }

    async fn update_booking(&mut self, rsvp_id: Uuid, changes: BookingChanges) -> AppResult<Rsvp> {
        let rsvp = self.get_mut(rsvp_id)?;
        if rsvp.user_id.is_none() {
            rsvp.user_id = Some(changes.user_id);
            rsvp.name = changes.name;
        }
        rsvp.ticket_count = changes.ticket_count;
        rsvp.notes = changes.notes;
        rsvp.phone = changes.phone;
        rsvp.updated_at = Utc::now();
        Ok(rsvp.clone())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryRsvpTransaction {
            store,
            _guard,
            event,
            rsvps,
        } = *self;

        let mut state = store.state();
        if !state.events.contains_key(&event.id) {
            return Err(event_not_found(event.id));
        }
        state.rsvps.insert(event.id, rsvps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event(creator_id: Uuid, max_attendees: Option<i32>) -> NewEvent {
        NewEvent {
            creator_id,
            title: "Rust meetup".into(),
            description: "Talks and pizza".into(),
            starts_at: Utc::now(),
            time: "6:00 PM".into(),
            location: "Berlin".into(),
            category: "Technology".into(),
            image: None,
            max_attendees,
            is_online: false,
            is_public: true,
            requires_approval: false,
            price: 0,
            currency: "USD".into(),
            metadata: None,
        }
    }

    fn guest_rsvp(event_id: Uuid, email: &str) -> NewRsvp {
        NewRsvp {
            event_id,
            user_id: None,
            name: "Guest".into(),
            email: email.into(),
            phone: None,
            notes: None,
            ticket_count: 1,
            status: RsvpStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), None))
            .await
            .unwrap();

        {
            let mut tx = store.begin(event.id).await.unwrap();
            tx.insert(guest_rsvp(event.id, "a@example.com")).await.unwrap();
            // dropped without commit
        }

        assert!(store.find_by_event(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_committed_writes_are_visible() {
        let store = MemoryStore::new();
        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), None))
            .await
            .unwrap();

        let mut tx = store.begin(event.id).await.unwrap();
        tx.insert(guest_rsvp(event.id, "a@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.sum_confirmed_tickets(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_begin_on_missing_event_is_not_found() {
        let store = MemoryStore::new();
        let err = store.begin(Uuid::new_v4()).await.err().unwrap();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_events_leave_no_lock_entries() {
        let store = MemoryStore::new();
        for _ in 0..100 {
            assert!(store.begin(Uuid::new_v4()).await.is_err());
            assert!(!EventRepository::delete(&store, Uuid::new_v4()).await.unwrap());
            assert!(EventRepository::update(&store, Uuid::new_v4(), EventChanges::default())
                .await
                .is_err());
        }
        assert!(store.inner.event_locks.lock().unwrap().is_empty());

        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), None))
            .await
            .unwrap();
        drop(store.begin(event.id).await.unwrap());
        assert_eq!(store.inner.event_locks.lock().unwrap().len(), 1);

        EventRepository::delete(&store, event.id).await.unwrap();
        assert!(store.inner.event_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_active_insert_conflicts() {
        let store = MemoryStore::new();
        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), None))
            .await
            .unwrap();

        let mut tx = store.begin(event.id).await.unwrap();
        tx.insert(guest_rsvp(event.id, "a@example.com")).await.unwrap();
        let err = tx
            .insert(guest_rsvp(event.id, "a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_capacity_cannot_drop_below_confirmed() {
        let store = MemoryStore::new();
        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), Some(5)))
            .await
            .unwrap();

        let mut tx = store.begin(event.id).await.unwrap();
        tx.insert(guest_rsvp(event.id, "a@example.com")).await.unwrap();
        tx.insert(guest_rsvp(event.id, "b@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        let changes = EventChanges {
            max_attendees: Some(Some(1)),
            ..Default::default()
        };
        let err = EventRepository::update(&store, event.id, changes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "maxAttendees", .. }));
    }

    #[tokio::test]
    async fn test_approval_stays_on_while_rsvps_are_pending() {
        let store = MemoryStore::new();
        let mut new = new_event(Uuid::new_v4(), None);
        new.requires_approval = true;
        let event = EventRepository::create(&store, new).await.unwrap();

        let mut pending = guest_rsvp(event.id, "a@example.com");
        pending.status = RsvpStatus::Pending;
        let mut tx = store.begin(event.id).await.unwrap();
        let rsvp = tx.insert(pending).await.unwrap();
        tx.commit().await.unwrap();

        let disable = || EventChanges {
            requires_approval: Some(false),
            ..Default::default()
        };
        let err = EventRepository::update(&store, event.id, disable())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "requiresApproval", .. }));

        let mut tx = store.begin(event.id).await.unwrap();
        tx.update_status(rsvp.id, RsvpStatus::Confirmed).await.unwrap();
        tx.commit().await.unwrap();

        let updated = EventRepository::update(&store, event.id, disable()).await.unwrap();
        assert!(!updated.requires_approval);
    }

    #[tokio::test]
    async fn test_delete_cascades_rsvps() {
        let store = MemoryStore::new();
        let event = EventRepository::create(&store, new_event(Uuid::new_v4(), None))
            .await
            .unwrap();
        let mut tx = store.begin(event.id).await.unwrap();
        tx.insert(guest_rsvp(event.id, "a@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        assert!(EventRepository::delete(&store, event.id).await.unwrap());
        assert!(store.find_by_event(event.id).await.unwrap().is_empty());
        assert!(!EventRepository::delete(&store, event.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_seeded_categories_sorted_by_name() {
        let store = MemoryStore::seeded();
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names.first().map(String::as_str), Some("Business"));
        assert_eq!(names.len(), 6);
    }
}
