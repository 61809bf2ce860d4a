//! Region monitoring state machine.
//!
//! ```text
//!            activate                 entered region
//!   Idle ─────────────────▶ Monitoring ─────────────────▶ Ranging
//!    ▲                        │    ▲                        │
//!    │       deactivate       │    │     exited region      │
//!    └────────────────────────┘    └────────────────────────┘
//!    ▲                                                      │
//!    └──────────────────────── deactivate ──────────────────┘
//! ```
//!
//! Activation opens the session file and registers the region with the
//! scanner. While ranging, every non-empty snapshot goes through
//! selection, formatting and the session append. Events that do not fit
//! the current state are reported as [`EventOutcome::Ignored`].
//!
//! Failed scanner commands leave the state unchanged, so the next matching
//! event retries the transition.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::{BeaconError, Result};
use crate::record::{format_record, LogRecord};
use crate::scanner::{BeaconScanner, EventReceiver, Region, ScanEvent};
use crate::selector::{select, MAX_LOGGED_BEACONS};
use crate::session::{Session, SessionLog};
use crate::types::BeaconReading;

/// Identity written when neither configuration nor radio provides one.
pub const UNKNOWN_DEVICE_IDENTITY: &str = "null";

/// State of the monitoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    /// Not activated.
    Idle,
    /// Region registered, no beacon in range.
    Monitoring,
    /// In range, sampling snapshots.
    Ranging,
}

impl MonitoringState {
    /// Whether the pipeline is activated.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Result of handling one scanner event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The state changed.
    Transitioned {
        /// Previous state.
        from: MonitoringState,
        /// New state.
        to: MonitoringState,
    },

    /// A row was appended to the session.
    Recorded(LogRecord),

    /// Empty snapshot, nothing written.
    Skipped,

    /// The event does not apply in the current state.
    Ignored {
        /// Why it was ignored.
        reason: &'static str,
    },
}

/// Shared handle serializing events and lifecycle calls on one monitor.
pub type SharedMonitor<S> = Arc<Mutex<Monitor<S>>>;

/// The monitoring pipeline for one region.
pub struct Monitor<S> {
    scanner: S,
    region: Region,
    session_log: SessionLog,
    timezone: Tz,
    configured_identity: Option<String>,
    device_identity: String,
    state: MonitoringState,
    session: Option<Session>,
}

impl<S: BeaconScanner> Monitor<S> {
    /// Create an idle monitor.
    pub fn new(scanner: S, region: Region, session_log: SessionLog, timezone: Tz) -> Self {
        Self {
            scanner,
            region,
            session_log,
            timezone,
            configured_identity: None,
            device_identity: UNKNOWN_DEVICE_IDENTITY.to_string(),
            state: MonitoringState::Idle,
            session: None,
        }
    }

    /// Create an idle monitor from configuration.
    pub fn from_config(scanner: S, config: &Config) -> Self {
        Self::new(
            scanner,
            config.region.to_region(),
            SessionLog::new(&config.logging.directory),
            config.logging.timezone,
        )
        .with_device_identity(config.device.identity.clone())
    }

    /// Pin the identity written to the PHONE column.
    #[must_use]
    pub fn with_device_identity(mut self, identity: Option<String>) -> Self {
        self.configured_identity = identity;
        self
    }

    /// Current state.
    pub const fn state(&self) -> MonitoringState {
        self.state
    }

    /// Monitored region.
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Scanner the monitor drives.
    pub const fn scanner(&self) -> &S {
        &self.scanner
    }

    /// Identity used for the current (or last) session.
    pub fn device_identity(&self) -> &str {
        &self.device_identity
    }

    /// File of the open session.
    pub fn session_path(&self) -> Option<&Path> {
        self.session.as_ref().map(Session::path)
    }

    /// Rows written in the open session.
    pub fn records_written(&self) -> u64 {
        self.session.as_ref().map_or(0, Session::records_written)
    }

    /// Wrap the monitor for sharing between tasks.
    pub fn into_shared(self) -> SharedMonitor<S> {
        Arc::new(Mutex::new(self))
    }

    /// Activate the pipeline now. See [`activate_at`](Self::activate_at).
    ///
    /// # Errors
    ///
    /// See [`activate_at`](Self::activate_at).
    pub fn activate(&mut self) -> Result<()> {
        self.activate_at(Utc::now())
    }

    /// Open a new session started at `now` and register the region.
    ///
    /// Does nothing if already active.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::StorageUnavailable`] if the session cannot be
    /// opened and [`BeaconError::RadioCommunication`] if the region cannot
    /// be registered. The monitor stays idle in both cases.
    pub fn activate_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state.is_active() {
            debug!(state = ?self.state, "Monitor already active");
            return Ok(());
        }

        let started_at = now.with_timezone(&self.timezone);
        let mut session = self.session_log.open(&started_at).map_err(|e| {
            error!(error = %e, "Cannot open session log, staying idle");
            BeaconError::from(e)
        })?;

        if let Err(e) = self.scanner.start_monitoring(&self.region) {
            error!(region = %self.region, error = %e, "Failed to register region");
            session.close();
            return Err(e.into());
        }

        self.device_identity = self
            .configured_identity
            .clone()
            .or_else(|| self.scanner.device_identity())
            .unwrap_or_else(|| UNKNOWN_DEVICE_IDENTITY.to_string());
        self.session = Some(session);
        self.transition(MonitoringState::Monitoring);
        Ok(())
    }

    /// Stop ranging, unregister the region and close the session.
    ///
    /// Always ends idle, even if scanner commands fail.
    ///
    /// # Errors
    ///
    /// Returns the first scanner error, after cleanup has completed.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.state.is_active() {
            debug!("Monitor already idle");
            return Ok(());
        }

        let mut first_error = None;

        if self.state == MonitoringState::Ranging {
            if let Err(e) = self.scanner.stop_ranging(&self.region) {
                warn!(region = %self.region, error = %e, "Failed to stop ranging");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.scanner.stop_monitoring(&self.region) {
            warn!(region = %self.region, error = %e, "Failed to unregister region");
            first_error.get_or_insert(e);
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }

        self.transition(MonitoringState::Idle);
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Handle one scanner event at the current time.
    ///
    /// # Errors
    ///
    /// See [`handle_event_at`](Self::handle_event_at).
    pub fn handle_event(&mut self, event: ScanEvent) -> Result<EventOutcome> {
        self.handle_event_at(event, Utc::now())
    }

    /// Handle one scanner event, stamping any row with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::RadioCommunication`] if a ranging command
    /// fails and [`BeaconError::WriteFailure`] if a row cannot be appended.
    /// The state is unchanged in both cases.
    pub fn handle_event_at(&mut self, event: ScanEvent, now: DateTime<Utc>) -> Result<EventOutcome> {
        if event.region() != self.region.name {
            return Ok(EventOutcome::Ignored {
                reason: "event for another region",
            });
        }

        match event {
            ScanEvent::EnteredRegion { .. } => self.on_entered_region(),
            ScanEvent::ExitedRegion { .. } => self.on_exited_region(),
            ScanEvent::Ranged { readings, .. } => self.on_ranged(&readings, now),
        }
    }

    fn on_entered_region(&mut self) -> Result<EventOutcome> {
        if self.state != MonitoringState::Monitoring {
            return Ok(EventOutcome::Ignored {
                reason: "entered region while not monitoring",
            });
        }

        info!(region = %self.region, "Entered region");
        if let Err(e) = self.scanner.start_ranging(&self.region) {
            warn!(region = %self.region, error = %e, "Failed to start ranging");
            return Err(e.into());
        }
        Ok(self.transition(MonitoringState::Ranging))
    }

    fn on_exited_region(&mut self) -> Result<EventOutcome> {
        if self.state != MonitoringState::Ranging {
            return Ok(EventOutcome::Ignored {
                reason: "exited region while not ranging",
            });
        }

        info!(region = %self.region, "Exited region");
        if let Err(e) = self.scanner.stop_ranging(&self.region) {
            warn!(region = %self.region, error = %e, "Failed to stop ranging");
            return Err(e.into());
        }
        Ok(self.transition(MonitoringState::Monitoring))
    }

    fn on_ranged(&mut self, readings: &[BeaconReading], now: DateTime<Utc>) -> Result<EventOutcome> {
        if self.state != MonitoringState::Ranging {
            return Ok(EventOutcome::Ignored {
                reason: "snapshot while not ranging",
            });
        }
        if readings.is_empty() {
            trace!("Empty snapshot, nothing to record");
            return Ok(EventOutcome::Skipped);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(EventOutcome::Ignored {
                reason: "no open session",
            });
        };

        let selected = select(readings, MAX_LOGGED_BEACONS);
        let record = format_record(
            &now.with_timezone(&self.timezone),
            &self.device_identity,
            &selected,
        );

        session.append(&record).map_err(|e| {
            warn!(error = %e, "Dropped log row");
            BeaconError::from(e)
        })?;

        debug!(
            detected = readings.len(),
            logged = selected.len(),
            row = %record,
            "Recorded ranging cycle"
        );
        Ok(EventOutcome::Recorded(record))
    }

    fn transition(&mut self, to: MonitoringState) -> EventOutcome {
        let from = self.state;
        self.state = to;
        info!(?from, ?to, "Monitoring state changed");
        EventOutcome::Transitioned { from, to }
    }
}

/// Feed scanner events into `monitor` until the event channel closes.
///
/// Each event is handled under the monitor lock, so rows from concurrent
/// producers never interleave and lifecycle calls never observe a
/// half-finished transition. Handling writes to the session file, so it
/// runs on the blocking pool with the lock guard moved along.
pub async fn run_event_loop<S>(monitor: SharedMonitor<S>, mut events: EventReceiver)
where
    S: BeaconScanner + 'static,
{
    while let Some(event) = events.recv().await {
        let mut guard = Arc::clone(&monitor).lock_owned().await;
        let result = match tokio::task::spawn_blocking(move || guard.handle_event(event)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Scanner event handler panicked");
                continue;
            }
        };
        match result {
            Ok(EventOutcome::Transitioned { from, to }) => {
                debug!(?from, ?to, "Event changed monitoring state");
            }
            Ok(EventOutcome::Recorded(_) | EventOutcome::Skipped) => {}
            Ok(EventOutcome::Ignored { reason }) => debug!(reason, "Ignored scanner event"),
            Err(e) => warn!(error = %e, code = e.error_code(), "Scanner event failed"),
        }
    }
    info!("Scanner event stream closed");
}
