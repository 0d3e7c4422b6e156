//! RSVP ledger: bookings, capacity and duplicate enforcement, status changes.
//!
//! Every read-check-write sequence for an event runs inside one
//! [`RsvpTransaction`], which holds that event's booking lock until it is
//! committed or dropped. Concurrent bookings for the same event therefore
//! behave as if they ran one after another.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AttendeeIdentity, AttendeeKey, BookingChanges, EventSummary, NewRsvp, Rsvp, RsvpStats,
    RsvpStatus,
};
use crate::repository::{EventRepository, RsvpRepository, RsvpTransaction, UserRepository};
use crate::services::notifier::BookingNotifier;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{
    normalize_email, optional_text, required_text, MAX_NAME_LEN, MAX_PHONE_LEN,
};

pub const DEFAULT_NOTES_MAX_BYTES: usize = 2048;

/// Body of `POST /events/{id}/rsvp`. Contact fields are ignored for
/// signed-in attendees except `phone`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ticket_count: Option<i64>,
    pub notes: Option<String>,
}

/// Body of `PATCH /events/{id}/rsvp/{rsvpId}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

impl StatusRequest {
    pub fn parse(&self) -> AppResult<RsvpStatus> {
        let raw = self
            .status
            .as_deref()
            .ok_or_else(|| AppError::invalid("status", "status is required"))?;
        raw.trim()
            .to_lowercase()
            .parse()
            .map_err(|e| AppError::invalid("status", format!("{e}")))
    }
}

/// An unvalidated booking attempt.
#[derive(Debug, Clone)]
pub struct RsvpSubmission {
    pub attendee: AttendeeIdentity,
    pub ticket_count: Option<i64>,
    pub notes: Option<String>,
}

impl RsvpSubmission {
    /// Books as the signed-in user when there is one, otherwise as a guest.
    pub fn from_request(actor: Option<Uuid>, request: RsvpRequest) -> Self {
        let attendee = match actor {
            Some(user_id) => AttendeeIdentity::Registered {
                user_id,
                phone: request.phone,
            },
            None => AttendeeIdentity::Guest {
                name: request.name.unwrap_or_default(),
                email: request.email.unwrap_or_default(),
                phone: request.phone,
            },
        };
        Self {
            attendee,
            ticket_count: request.ticket_count,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Created(Rsvp),
    /// A registered attendee booked again; their active RSVP was overwritten.
    Updated(Rsvp),
}

impl SubmitOutcome {
    pub fn rsvp(&self) -> &Rsvp {
        match self {
            SubmitOutcome::Created(rsvp) | SubmitOutcome::Updated(rsvp) => rsvp,
        }
    }
}

/// Attendee details after validation and profile lookup.
struct ResolvedAttendee {
    user_id: Option<Uuid>,
    name: String,
    email: String,
    phone: Option<String>,
}

impl ResolvedAttendee {
    fn key(&self) -> AttendeeKey {
        AttendeeKey {
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }
}

pub struct RsvpLedger {
    events: Arc<dyn EventRepository>,
    rsvps: Arc<dyn RsvpRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn BookingNotifier>,
    notes_max_bytes: usize,
}

impl RsvpLedger {
    pub fn new(
        events: Arc<dyn EventRepository>,
        rsvps: Arc<dyn RsvpRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn BookingNotifier>,
        notes_max_bytes: usize,
    ) -> Self {
        Self {
            events,
            rsvps,
            users,
            notifier,
            notes_max_bytes,
        }
    }

    pub async fn submit(&self, event_id: Uuid, submission: RsvpSubmission) -> AppResult<SubmitOutcome> {
        self.existing_event(event_id).await?;

        let attendee = self.resolve_attendee(submission.attendee).await?;
        let ticket_count = validate_ticket_count(submission.ticket_count)?;
        let notes = self.validate_notes(submission.notes)?;

        let mut tx = self.rsvps.begin(event_id).await?;
        let event = tx.event().clone();

        let existing = tx.find_active(&attendee.key()).await?;
        let outcome = match (existing, attendee.user_id) {
            (Some(_), None) => {
                return Err(AppError::Conflict(
                    "An RSVP with this email already exists for this event".to_string(),
                ));
            }
            (Some(existing), Some(user_id)) => {
                check_capacity(&mut *tx, ticket_count, existing.confirmed_tickets()).await?;
                let changes = BookingChanges {
                    user_id,
                    name: attendee.name,
                    ticket_count,
                    notes,
                    phone: attendee.phone,
                };
                SubmitOutcome::Updated(tx.update_booking(existing.id, changes).await?)
            }
            (None, _) => {
                check_capacity(&mut *tx, ticket_count, 0).await?;
                let rsvp = NewRsvp {
                    event_id,
                    user_id: attendee.user_id,
                    name: attendee.name,
                    email: attendee.email,
                    phone: attendee.phone,
                    notes,
                    ticket_count,
                    status: RsvpStatus::initial(event.requires_approval),
                };
                SubmitOutcome::Created(tx.insert(rsvp).await?)
            }
        };

        tx.commit().await?;

        let rsvp = outcome.rsvp();
        info!(
            %event_id,
            rsvp_id = %rsvp.id,
            status = %rsvp.status,
            tickets = rsvp.ticket_count,
            updated = matches!(outcome, SubmitOutcome::Updated(_)),
            "RSVP recorded"
        );
        self.notifier.on_submitted(rsvp, &event.title);

        Ok(outcome)
    }

    /// The owner may make any legal transition; an attendee may only cancel
    /// their own RSVP.
    pub async fn update_status(
        &self,
        event_id: Uuid,
        rsvp_id: Uuid,
        actor: Uuid,
        status: RsvpStatus,
    ) -> AppResult<Rsvp> {
        let mut tx = self.rsvps.begin(event_id).await?;
        let event = tx.event().clone();

        let rsvp = tx.find(rsvp_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("RSVP '{rsvp_id}' was not found for event '{event_id}'"))
        })?;

        let is_owner = event.creator_id == actor;
        let is_attendee = rsvp.user_id == Some(actor);
        if !is_owner && !(is_attendee && status == RsvpStatus::Cancelled) {
            return Err(AppError::Forbidden(
                "You are not allowed to change this RSVP".to_string(),
            ));
        }

        if !rsvp.status.can_transition_to(status, event.requires_approval) {
            return Err(AppError::IllegalTransition(format!(
                "Cannot change RSVP from '{}' to '{}'",
                rsvp.status, status
            )));
        }

        if status == RsvpStatus::Confirmed {
            check_capacity(&mut *tx, rsvp.ticket_count, 0).await?;
        }

        let updated = tx.update_status(rsvp_id, status).await?;
        tx.commit().await?;

        info!(%event_id, %rsvp_id, from = %rsvp.status, to = %status, "RSVP status changed");
        self.notifier.on_status_changed(&updated, rsvp.status);

        Ok(updated)
    }

    /// Newest first. Owner only.
    pub async fn list(&self, event_id: Uuid, actor: Uuid) -> AppResult<Vec<Rsvp>> {
        self.owned_event(event_id, actor).await?;
        self.rsvps.find_by_event(event_id).await
    }

    /// Confirmed tickets, recomputed from the ledger on every call.
    pub async fn attendee_count(&self, event_id: Uuid) -> AppResult<i64> {
        self.existing_event(event_id).await?;
        self.rsvps.sum_confirmed_tickets(event_id).await
    }

    pub async fn stats(&self, event_id: Uuid, actor: Uuid) -> AppResult<RsvpStats> {
        self.owned_event(event_id, actor).await?;
        self.rsvps.stats(event_id).await
    }

    /// Returns the download file name and the CSV body.
    pub async fn export_csv(&self, event_id: Uuid, actor: Uuid) -> AppResult<(String, String)> {
        self.owned_event(event_id, actor).await?;
        let rsvps = self.rsvps.find_by_event(event_id).await?;
        Ok((format!("rsvps-{event_id}.csv"), render_csv(&rsvps)))
    }

    async fn existing_event(&self, event_id: Uuid) -> AppResult<EventSummary> {
        self.events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))
    }

    async fn owned_event(&self, event_id: Uuid, actor: Uuid) -> AppResult<EventSummary> {
        let event = self.existing_event(event_id).await?;
        if event.event.creator_id != actor {
            return Err(AppError::Forbidden(
                "Only the event organizer can view its RSVPs".to_string(),
            ));
        }
        Ok(event)
    }

    async fn resolve_attendee(&self, attendee: AttendeeIdentity) -> AppResult<ResolvedAttendee> {
        match attendee {
            AttendeeIdentity::Registered { user_id, phone } => {
                let user = self
                    .users
                    .find_by_id(user_id)
                    .await?
                    .ok_or_else(|| AppError::invalid("userId", "Attendee account no longer exists"))?;
                Ok(ResolvedAttendee {
                    user_id: Some(user.id),
                    name: user.name,
                    email: user.email,
                    phone: optional_text("phone", phone.as_deref(), MAX_PHONE_LEN)?,
                })
            }
            AttendeeIdentity::Guest { name, email, phone } => Ok(ResolvedAttendee {
                user_id: None,
                name: required_text("name", &name, MAX_NAME_LEN)?,
                email: normalize_email("email", &email)?,
                phone: optional_text("phone", phone.as_deref(), MAX_PHONE_LEN)?,
            }),
        }
    }

    fn validate_notes(&self, notes: Option<String>) -> AppResult<Option<String>> {
        let Some(notes) = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        if notes.len() > self.notes_max_bytes {
            return Err(AppError::invalid(
                "notes",
                format!("notes must be at most {} bytes", self.notes_max_bytes),
            ));
        }
        Ok(Some(notes))
    }
}

fn validate_ticket_count(requested: Option<i64>) -> AppResult<i32> {
    let requested = requested.unwrap_or(1);
    if requested < 1 {
        return Err(AppError::invalid("ticketCount", "ticketCount must be at least 1"));
    }
    i32::try_from(requested).map_err(|_| AppError::invalid("ticketCount", "ticketCount is too large"))
}

/// `already_held` is the confirmed tickets of the RSVP being replaced, which
/// do not count against the new request.
async fn check_capacity(
    tx: &mut dyn RsvpTransaction,
    requested: i32,
    already_held: i64,
) -> AppResult<()> {
    let Some(limit) = tx.event().max_attendees else {
        return Ok(());
    };

    let held_by_others = tx.sum_confirmed_tickets().await? - already_held;
    let remaining = i64::from(limit) - held_by_others;
    if i64::from(requested) > remaining {
        return Err(AppError::CapacityExceeded {
            requested,
            remaining: remaining.max(0),
        });
    }
    Ok(())
}

const CSV_HEADER: &str = "Name,Email,Phone,Tickets,Status,RSVP Date";

fn render_csv(rsvps: &[Rsvp]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for rsvp in rsvps {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            csv_field(&rsvp.name),
            csv_field(&rsvp.email),
            csv_field(rsvp.phone.as_deref().unwrap_or("")),
            rsvp.ticket_count,
            rsvp.status,
            rsvp.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{NewEvent, NewUser};
    use crate::repository::Repositories;
    use crate::services::notifier::LogNotifier;

    struct Fixture {
        repos: Repositories,
        ledger: RsvpLedger,
        organizer: Uuid,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        let ledger = RsvpLedger::new(
            repos.events.clone(),
            repos.rsvps.clone(),
            repos.users.clone(),
            Arc::new(LogNotifier),
            DEFAULT_NOTES_MAX_BYTES,
        );
        Fixture {
            repos,
            ledger,
            organizer: Uuid::new_v4(),
        }
    }

    impl Fixture {
        async fn event(&self, max_attendees: Option<i32>, requires_approval: bool) -> Uuid {
            self.repos
                .events
                .create(NewEvent {
                    creator_id: self.organizer,
                    title: "Launch party".into(),
                    description: "Drinks".into(),
                    starts_at: Utc::now(),
                    time: "7:00 PM".into(),
                    location: "Lisbon".into(),
                    category: "Business".into(),
                    image: None,
                    max_attendees,
                    is_online: false,
                    is_public: true,
                    requires_approval,
                    price: 0,
                    currency: "USD".into(),
                    metadata: None,
                })
                .await
                .unwrap()
                .id
        }

        async fn user(&self, email: &str) -> Uuid {
            self.repos
                .users
                .create(NewUser {
                    name: "Member".into(),
                    email: email.into(),
                    password_hash: "unused".into(),
                })
                .await
                .unwrap()
                .id
        }
    }

    fn guest(email: &str, tickets: i64) -> RsvpSubmission {
        RsvpSubmission {
            attendee: AttendeeIdentity::Guest {
                name: "Guest".into(),
                email: email.into(),
                phone: None,
            },
            ticket_count: Some(tickets),
            notes: None,
        }
    }

    fn member(user_id: Uuid, tickets: i64, notes: &str) -> RsvpSubmission {
        RsvpSubmission {
            attendee: AttendeeIdentity::Registered {
                user_id,
                phone: None,
            },
            ticket_count: Some(tickets),
            notes: Some(notes.into()),
        }
    }

    #[tokio::test]
    async fn test_missing_event_is_reported_before_bad_input() {
        let f = fixture();
        let err = f
            .ledger
            .submit(Uuid::new_v4(), guest("not-an-email", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_guest_input_is_validated() {
        let f = fixture();
        let event_id = f.event(None, false).await;

        let err = f.ledger.submit(event_id, guest("nope", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "email", .. }));

        let err = f
            .ledger
            .submit(event_id, guest("a@example.com", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "ticketCount", .. }));

        let mut blank_name = guest("a@example.com", 1);
        blank_name.attendee = AttendeeIdentity::Guest {
            name: "   ".into(),
            email: "a@example.com".into(),
            phone: None,
        };
        let err = f.ledger.submit(event_id, blank_name).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "name", .. }));
    }

    #[tokio::test]
    async fn test_notes_are_capped() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        let mut submission = guest("a@example.com", 1);
        submission.notes = Some("x".repeat(DEFAULT_NOTES_MAX_BYTES + 1));

        let err = f.ledger.submit(event_id, submission).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "notes", .. }));
    }

    #[tokio::test]
    async fn test_guest_email_is_normalized_for_duplicates() {
        let f = fixture();
        let event_id = f.event(None, false).await;

        f.ledger.submit(event_id, guest("Ann@Example.com", 1)).await.unwrap();
        let err = f
            .ledger
            .submit(event_id, guest(" ann@example.COM ", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_member_rebooking_excludes_own_tickets_from_capacity() {
        let f = fixture();
        let event_id = f.event(Some(4), false).await;
        let user_id = f.user("member@example.com").await;

        let first = f.ledger.submit(event_id, member(user_id, 3, "first")).await.unwrap();
        assert!(matches!(first, SubmitOutcome::Created(_)));

        // 3 held by this member; raising to 4 only needs one more seat.
        let second = f.ledger.submit(event_id, member(user_id, 4, "second")).await.unwrap();
        let SubmitOutcome::Updated(rsvp) = second else {
            panic!("expected an in-place update");
        };
        assert_eq!(rsvp.id, first.rsvp().id);
        assert_eq!(rsvp.ticket_count, 4);
        assert_eq!(rsvp.notes.as_deref(), Some("second"));
        assert_eq!(f.ledger.attendee_count(event_id).await.unwrap(), 4);

        let err = f
            .ledger
            .submit(event_id, member(user_id, 5, "third"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded {
                requested: 5,
                remaining: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_member_rebooking_keeps_pending_status() {
        let f = fixture();
        let event_id = f.event(None, true).await;
        let user_id = f.user("member@example.com").await;

        f.ledger.submit(event_id, member(user_id, 1, "a")).await.unwrap();
        let outcome = f.ledger.submit(event_id, member(user_id, 2, "b")).await.unwrap();
        assert_eq!(outcome.rsvp().status, RsvpStatus::Pending);
        assert_eq!(f.repos.rsvps.find_by_event(event_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_member_claims_guest_booking_with_same_email() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        let guest_rsvp = f
            .ledger
            .submit(event_id, guest("member@example.com", 1))
            .await
            .unwrap();
        let user_id = f.user("member@example.com").await;

        let outcome = f.ledger.submit(event_id, member(user_id, 2, "mine now")).await.unwrap();
        let SubmitOutcome::Updated(rsvp) = outcome else {
            panic!("expected an in-place update");
        };
        assert_eq!(rsvp.id, guest_rsvp.rsvp().id);
        assert_eq!(rsvp.user_id, Some(user_id));
        assert_eq!(rsvp.name, "Member");

        let cancelled = f
            .ledger
            .update_status(event_id, rsvp.id, user_id, RsvpStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, RsvpStatus::Cancelled);
        assert_eq!(f.ledger.attendee_count(event_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_member_is_invalid() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        let err = f
            .ledger
            .submit(event_id, member(Uuid::new_v4(), 1, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "userId", .. }));
    }

    #[tokio::test]
    async fn test_approval_rechecks_capacity() {
        let f = fixture();
        let event_id = f.event(Some(2), true).await;

        let a = f.ledger.submit(event_id, guest("a@example.com", 2)).await.unwrap();
        let b = f.ledger.submit(event_id, guest("b@example.com", 1)).await.unwrap();
        assert_eq!(f.ledger.attendee_count(event_id).await.unwrap(), 0);

        f.ledger
            .update_status(event_id, a.rsvp().id, f.organizer, RsvpStatus::Confirmed)
            .await
            .unwrap();
        let err = f
            .ledger
            .update_status(event_id, b.rsvp().id, f.organizer, RsvpStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn test_attendee_may_only_cancel_own_rsvp() {
        let f = fixture();
        let event_id = f.event(None, true).await;
        let user_id = f.user("member@example.com").await;
        let rsvp_id = f
            .ledger
            .submit(event_id, member(user_id, 1, ""))
            .await
            .unwrap()
            .rsvp()
            .id;

        let err = f
            .ledger
            .update_status(event_id, rsvp_id, user_id, RsvpStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = f
            .ledger
            .update_status(event_id, rsvp_id, Uuid::new_v4(), RsvpStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let cancelled = f
            .ledger
            .update_status(event_id, rsvp_id, user_id, RsvpStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, RsvpStatus::Cancelled);

        let err = f
            .ledger
            .update_status(event_id, rsvp_id, f.organizer, RsvpStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn test_approval_requires_approval_workflow() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        let rsvp = f.ledger.submit(event_id, guest("a@example.com", 1)).await.unwrap();

        let err = f
            .ledger
            .update_status(event_id, rsvp.rsvp().id, f.organizer, RsvpStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn test_owner_only_views() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        f.ledger.submit(event_id, guest("a@example.com", 2)).await.unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            f.ledger.list(event_id, stranger).await.unwrap_err(),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            f.ledger.export_csv(event_id, stranger).await.unwrap_err(),
            AppError::Forbidden(_)
        ));

        let stats = f.ledger.stats(event_id, f.organizer).await.unwrap();
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.confirmed_tickets, 2);
    }

    #[tokio::test]
    async fn test_export_lists_attendees() {
        let f = fixture();
        let event_id = f.event(None, false).await;
        let mut submission = guest("a@example.com", 2);
        submission.attendee = AttendeeIdentity::Guest {
            name: "Doe, Jane".into(),
            email: "a@example.com".into(),
            phone: Some("555-0100".into()),
        };
        f.ledger.submit(event_id, submission).await.unwrap();

        let (filename, body) = f.ledger.export_csv(event_id, f.organizer).await.unwrap();
        assert_eq!(filename, format!("rsvps-{event_id}.csv"));

        let mut lines = body.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Doe, Jane\",a@example.com,555-0100,2,confirmed,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_status_request_parsing() {
        let req = StatusRequest {
            status: Some("Cancelled".into()),
        };
        assert_eq!(req.parse().unwrap(), RsvpStatus::Cancelled);

        let err = StatusRequest { status: None }.parse().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "status", .. }));
        assert!(StatusRequest {
            status: Some("maybe".into())
        }
        .parse()
        .is_err());
    }
}
