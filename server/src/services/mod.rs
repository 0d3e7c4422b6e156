//! Application services. Each owns its validation and authorization rules
//! and talks to storage only through the repository ports.

pub mod catalog;
pub mod identity;
pub mod ledger;
pub mod notifier;

pub use catalog::EventCatalog;
pub use identity::IdentityService;
pub use ledger::RsvpLedger;
pub use notifier::{BookingNotifier, LogNotifier};
