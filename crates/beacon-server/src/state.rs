//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use beacon_core::{BeaconScanner, Config, Monitor, SharedMonitor};

/// Scanner type the server runs with, chosen at startup.
pub type DynScanner = Box<dyn BeaconScanner>;

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// State handed to every handler.
///
/// The monitor carries its own lock; it is the same lock the event pump
/// takes, so HTTP lifecycle calls and scanner events never interleave.
pub struct AppState {
    /// Configuration the process was started with.
    pub config: Config,

    /// The monitoring pipeline.
    pub monitor: SharedMonitor<DynScanner>,

    started_at: Instant,
}

impl AppState {
    /// Build state around an idle monitor using `scanner`.
    pub fn new(config: Config, scanner: DynScanner) -> Self {
        let monitor = Monitor::from_config(scanner, &config).into_shared();
        Self::with_monitor(config, monitor)
    }

    /// Build state around an existing monitor handle.
    pub fn with_monitor(config: Config, monitor: SharedMonitor<DynScanner>) -> Self {
        Self {
            config,
            monitor,
            started_at: Instant::now(),
        }
    }

    /// Wrap for sharing with the router.
    #[must_use]
    pub fn into_shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
