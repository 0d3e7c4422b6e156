use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Decode, FromRow, Postgres, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RsvpStatus::Pending => "pending",
            RsvpStatus::Confirmed => "confirmed",
            RsvpStatus::Cancelled => "cancelled",
        }
    }

    /// Status a fresh booking starts in.
    pub fn initial(requires_approval: bool) -> Self {
        if requires_approval {
            RsvpStatus::Pending
        } else {
            RsvpStatus::Confirmed
        }
    }

    pub fn is_active(self) -> bool {
        self != RsvpStatus::Cancelled
    }

    /// `cancelled` is terminal and approval only exists for events that require it.
    pub fn can_transition_to(self, next: RsvpStatus, requires_approval: bool) -> bool {
        match (self, next) {
            (RsvpStatus::Pending, RsvpStatus::Confirmed) => requires_approval,
            (RsvpStatus::Pending, RsvpStatus::Cancelled) => true,
            (RsvpStatus::Confirmed, RsvpStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown RSVP status '{0}'")]
pub struct UnknownStatus(String);

impl FromStr for RsvpStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RsvpStatus::Pending),
            "confirmed" => Ok(RsvpStatus::Confirmed),
            "cancelled" => Ok(RsvpStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// Stored as VARCHAR guarded by a CHECK constraint rather than a Postgres enum.
impl Type<Postgres> for RsvpStatus {
    fn type_info() -> PgTypeInfo {
        <&str as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for RsvpStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as Decode<Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Rsvp {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub ticket_count: i32,
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rsvp {
    /// Tickets this RSVP holds against the event's capacity.
    pub fn confirmed_tickets(&self) -> i64 {
        if self.status == RsvpStatus::Confirmed {
            i64::from(self.ticket_count)
        } else {
            0
        }
    }

    /// Whether this RSVP occupies the attendee slot described by `key`.
    pub fn is_active_for(&self, key: &AttendeeKey) -> bool {
        if !self.status.is_active() {
            return false;
        }
        let same_user = matches!((key.user_id, self.user_id), (Some(a), Some(b)) if a == b);
        same_user || self.email == key.email
    }
}

/// Who is booking. Registered users are resolved to their stored profile by
/// the ledger; guests bring their own contact details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeIdentity {
    Registered {
        user_id: Uuid,
        phone: Option<String>,
    },
    Guest {
        name: String,
        email: String,
        phone: Option<String>,
    },
}

/// Duplicate-detection key: normalized email, plus the user id for registered
/// attendees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeKey {
    pub user_id: Option<Uuid>,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewRsvp {
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub ticket_count: i32,
    pub status: RsvpStatus,
}

impl Rsvp {
    pub fn from_new(new: NewRsvp, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            user_id: new.user_id,
            name: new.name,
            email: new.email,
            phone: new.phone,
            notes: new.notes,
            ticket_count: new.ticket_count,
            status: new.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Overwrites applied when a registered attendee books again. A matched
/// guest row is claimed for `user_id` and takes the profile `name`; rows
/// already owned by an account keep their owner.
#[derive(Debug, Clone)]
pub struct BookingChanges {
    pub user_id: Uuid,
    pub name: String,
    pub ticket_count: i32,
    pub notes: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct RsvpStats {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
    pub confirmed_tickets: i64,
}

impl RsvpStats {
    pub fn from_rsvps<'a>(rsvps: impl IntoIterator<Item = &'a Rsvp>) -> Self {
        rsvps.into_iter().fold(Self::default(), |mut stats, rsvp| {
            stats.total += 1;
            match rsvp.status {
                RsvpStatus::Pending => stats.pending += 1,
                RsvpStatus::Confirmed => stats.confirmed += 1,
                RsvpStatus::Cancelled => stats.cancelled += 1,
            }
            stats.confirmed_tickets += rsvp.confirmed_tickets();
            stats
        })
    }
}
