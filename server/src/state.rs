use std::sync::Arc;

use chrono::Duration;

use crate::auth::{PasswordHasher, TokenIssuer};
use crate::config::Config;
use crate::repository::Repositories;
use crate::services::{BookingNotifier, EventCatalog, IdentityService, LogNotifier, RsvpLedger};

/// Shared by every handler; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub catalog: Arc<EventCatalog>,
    pub ledger: Arc<RsvpLedger>,
    pub repos: Repositories,
}

impl AppState {
    pub fn new(repos: Repositories, config: &Config) -> Self {
        Self::with_notifier(repos, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        repos: Repositories,
        config: &Config,
        notifier: Arc<dyn BookingNotifier>,
    ) -> Self {
        let identity = IdentityService::new(
            repos.users.clone(),
            repos.sessions.clone(),
            PasswordHasher::new(config.password_hash_iterations),
            TokenIssuer::new(&config.token_secret, Duration::hours(config.token_ttl_hours)),
        );
        let catalog = EventCatalog::new(repos.events.clone());
        let ledger = RsvpLedger::new(
            repos.events.clone(),
            repos.rsvps.clone(),
            repos.users.clone(),
            notifier,
            config.notes_max_bytes,
        );

        Self {
            identity: Arc::new(identity),
            catalog: Arc::new(catalog),
            ledger: Arc::new(ledger),
            repos,
        }
    }
}
