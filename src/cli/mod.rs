//! Command-line interface definitions and helpers.
//!
//! This module contains CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    build_service, create_project, handle_config_action, list_cameras, predict, snapshot, train,
    upload, CommandError,
};
