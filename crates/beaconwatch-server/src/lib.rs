//! # beaconwatch-server
//!
//! HTTP server library for beaconwatch.
//!
//! This library provides the API handlers and state management wrapped
//! around the `beaconwatch-core` engine.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
