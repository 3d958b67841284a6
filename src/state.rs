//! Shared application state for Axum handlers.
//!
//! Cloned into every request. All members are `Arc`s or `Copy`, so a clone is
//! a handful of reference-count increments.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ConfigStore;
use crate::data_source::DataSource;

#[derive(Clone)]
pub struct AppState {
    /// Validated configuration, shared with the rest of the gateway.
    pub config: ConfigStore,
    /// Downstream connection, already initialized.
    pub data_source: Arc<dyn DataSource>,
    /// When the server started accepting requests.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ConfigStore, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            config,
            data_source,
            started_at: Instant::now(),
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("data_source", &self.data_source.name())
            .field("started_at", &self.started_at)
            .finish()
    }
}
