//! Interface to the radio layer that discovers beacons.
//!
//! The monitor never touches the radio directly. It issues commands through
//! a [`BeaconScanner`] and receives [`ScanEvent`]s from whoever drives it:
//! - region monitoring: a low-frequency watch for entering/leaving a region
//! - ranging: periodic snapshots of the beacons currently in range
//!
//! The BlueZ implementation lives in [`bluez`] behind the `bluetooth`
//! feature.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::BeaconReading;

#[cfg(feature = "bluetooth")]
pub mod bluez;

/// A named filter selecting which beacons belong to a monitoring session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Region {
    /// Region name, used to match events to this region.
    #[schema(example = "myBeacon")]
    pub name: String,

    /// Proximity UUID every beacon of the region advertises.
    pub proximity_uuid: Uuid,

    /// Restrict to one major value.
    pub major: Option<u16>,

    /// Restrict to one minor value.
    pub minor: Option<u16>,
}

impl Region {
    /// Region matching every beacon advertising `proximity_uuid`.
    pub fn new(name: impl Into<String>, proximity_uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            proximity_uuid,
            major: None,
            minor: None,
        }
    }

    /// Whether an advertisement with these identifiers belongs to the region.
    #[must_use]
    pub fn matches(&self, uuid: Uuid, major: u16, minor: u16) -> bool {
        self.proximity_uuid == uuid
            && self.major.map_or(true, |m| m == major)
            && self.minor.map_or(true, |m| m == minor)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.proximity_uuid)
    }
}

/// Events delivered by the scanner, serialized per region.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A beacon of the region came into range.
    EnteredRegion {
        /// Region name.
        region: String,
    },

    /// No beacon of the region has been seen for the exit period.
    ExitedRegion {
        /// Region name.
        region: String,
    },

    /// Periodic ranging snapshot, possibly empty.
    Ranged {
        /// Region name.
        region: String,
        /// Beacons currently detected, in scanner order.
        readings: Vec<BeaconReading>,
    },
}

impl ScanEvent {
    /// Name of the region the event refers to.
    #[must_use]
    pub fn region(&self) -> &str {
        match self {
            Self::EnteredRegion { region }
            | Self::ExitedRegion { region }
            | Self::Ranged { region, .. } => region,
        }
    }
}

/// Sending half of a scanner event stream.
pub type EventSender = mpsc::UnboundedSender<ScanEvent>;

/// Receiving half of a scanner event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<ScanEvent>;

/// Create the channel a scanner delivers its events on.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Errors raised while talking to the radio layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// No usable radio adapter.
    #[error("Bluetooth radio unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A command was rejected by the radio layer.
    #[error("Bluetooth command '{operation}' failed: {message}")]
    CommandFailed {
        /// Command that failed.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The scanner task is gone.
    #[error("Bluetooth scanner disconnected")]
    Disconnected,
}

/// Result type for scanner commands.
pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// Commands the monitor issues to the radio layer.
///
/// Implementations deliver the matching [`ScanEvent`]s on their own
/// channel, one at a time per region.
pub trait BeaconScanner: Send {
    /// Start watching for entry into and exit from `region`.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the command cannot be delivered.
    fn start_monitoring(&mut self, region: &Region) -> RadioResult<()>;

    /// Stop watching `region`.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the command cannot be delivered.
    fn stop_monitoring(&mut self, region: &Region) -> RadioResult<()>;

    /// Start emitting periodic snapshots for `region`.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the command cannot be delivered.
    fn start_ranging(&mut self, region: &Region) -> RadioResult<()>;

    /// Stop emitting snapshots for `region`.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] if the command cannot be delivered.
    fn stop_ranging(&mut self, region: &Region) -> RadioResult<()>;

    /// Name of the local radio, if it has one.
    fn device_identity(&self) -> Option<String> {
        None
    }
}

impl<S: BeaconScanner + ?Sized> BeaconScanner for Box<S> {
    fn start_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        (**self).start_monitoring(region)
    }

    fn stop_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        (**self).stop_monitoring(region)
    }

    fn start_ranging(&mut self, region: &Region) -> RadioResult<()> {
        (**self).start_ranging(region)
    }

    fn stop_ranging(&mut self, region: &Region) -> RadioResult<()> {
        (**self).stop_ranging(region)
    }

    fn device_identity(&self) -> Option<String> {
        (**self).device_identity()
    }
}
