//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the streambot binary.

mod commands;
mod flags;

pub use commands::{Cli, Commands, FlagCommand, OutputFormat};
pub use flags::handle_flags_command;
