use tracing::info;

use crate::models::{Rsvp, RsvpStatus};

/// Receives booking events once they are committed. Implementations must not
/// fail the request; delivery problems are theirs to log.
pub trait BookingNotifier: Send + Sync {
    fn on_submitted(&self, rsvp: &Rsvp, event_title: &str);
    fn on_status_changed(&self, rsvp: &Rsvp, from: RsvpStatus);
}

/// Writes the would-be confirmation emails to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl BookingNotifier for LogNotifier {
    fn on_submitted(&self, rsvp: &Rsvp, event_title: &str) {
        let subject = match rsvp.status {
            RsvpStatus::Pending => format!("RSVP received for {event_title}"),
            _ => format!("You're going to {event_title}"),
        };
        info!(
            rsvp_id = %rsvp.id,
            event_id = %rsvp.event_id,
            to = %rsvp.email,
            tickets = rsvp.ticket_count,
            %subject,
            "Sending RSVP confirmation email"
        );
    }

    fn on_status_changed(&self, rsvp: &Rsvp, from: RsvpStatus) {
        info!(
            rsvp_id = %rsvp.id,
            event_id = %rsvp.event_id,
            to = %rsvp.email,
            %from,
            to_status = %rsvp.status,
            "Sending RSVP status update email"
        );
    }
}
