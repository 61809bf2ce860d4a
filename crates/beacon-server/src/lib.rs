//! # beacon-server
//!
//! Host process library for beacon-logger.
//!
//! Provides the API handlers, the shared state around the monitor and the
//! logging setup used by the `beacon-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
