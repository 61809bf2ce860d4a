//! # beacon-core
//!
//! Core logic of the beacon-logger proximity monitoring system.
//!
//! This crate provides:
//! - Proximity classification of beacon distance estimates
//! - Selection of the closest beacons in each ranging cycle
//! - Fixed-width, semicolon-delimited session log rows
//! - Append-only session files, one per monitoring activation
//! - The region monitoring state machine driving all of the above
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`proximity`] - Distance to proximity zone classification
//! - [`selector`] - Top-N closest beacon selection
//! - [`record`] - Log row assembly and text conventions
//! - [`session`] - Session file lifecycle
//! - [`monitor`] - Region monitoring state machine and event loop
//! - [`scanner`] - Interface to the radio layer (BlueZ behind `bluetooth`)
//! - [`ibeacon`] - iBeacon decoding and distance estimation
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod ibeacon;
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub mod mock;
pub mod monitor;
pub mod proximity;
pub mod record;
pub mod scanner;
pub mod selector;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    default_config_path, default_log_dir, is_valid_device_identity, is_valid_region_name, Config,
    ConfigError, ConfigResult, DeviceConfig, LoggingConfig, RegionConfig, ScanConfig,
    ServerConfig,
};
pub use error::{BeaconError, Error, Result};
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use mock::{MockScanner, ScannerCommand};
pub use monitor::{run_event_loop, EventOutcome, Monitor, MonitoringState, SharedMonitor};
pub use proximity::classify;
pub use record::{format_distance, format_record, LogRecord, LogSlot, FIELD_COUNT, HEADER};
#[cfg(feature = "bluetooth")]
pub use scanner::bluez::BluezScanner;
pub use scanner::{
    event_channel, BeaconScanner, EventReceiver, EventSender, RadioError, RadioResult, Region,
    ScanEvent,
};
pub use selector::{select, MAX_LOGGED_BEACONS};
pub use session::{Session, SessionError, SessionLog};
pub use types::{BeaconId, BeaconReading, ProximityZone};
