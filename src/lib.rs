//! visionsnap library crate.
//!
//! This module exposes the internal components for integration testing.

pub mod camera;
pub mod cli;
pub mod config;
pub mod log_sink;
pub mod logging;
pub mod snapshot;
pub mod ui;
pub mod vision;
