pub mod category;
pub mod event;
pub mod rsvp;
pub mod session;
pub mod user;

pub use category::Category;
pub use event::{BookingEvent, DashboardStats, Event, EventChanges, EventFilter, EventSummary, NewEvent};
pub use rsvp::{
    AttendeeIdentity, AttendeeKey, BookingChanges, NewRsvp, Rsvp, RsvpStats, RsvpStatus,
};
pub use session::Session;
pub use user::{NewUser, ProfileChanges, User};
