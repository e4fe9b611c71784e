//! Command-line argument definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Streambot feature flag tool.
#[derive(Parser, Debug)]
#[command(name = "streambot")]
#[command(about = "Inspect and edit streambot runtime feature flags")]
#[command(version)]
pub struct Cli {
    /// Path to the application configuration file
    #[arg(short, long, default_value = "streambot.toml", env = "STREAMBOT_CONFIG")]
    pub config: PathBuf,

    /// Feature flag file, overriding `[flags] path` from the config
    #[arg(long, env = "STREAMBOT_FLAGS_FILE")]
    pub flags_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work with feature flags
    Flags {
        #[command(subcommand)]
        command: FlagCommand,
    },
}

/// Feature flag subcommands.
#[derive(Subcommand, Debug)]
pub enum FlagCommand {
    /// List every flag with its value and description
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },

    /// Print the value of one flag
    Get {
        /// Flag name
        name: String,

        /// Module to read as (defaults to `[flags] module`)
        #[arg(long)]
        module: Option<String>,
    },

    /// Set the value of one flag
    ///
    /// The value is read as JSON when it parses (`true`, `42`, `["a"]`),
    /// otherwise as a plain string.
    Set {
        /// Flag name
        name: String,

        /// New value
        value: String,

        /// Module to write as (defaults to `[flags] module`)
        #[arg(long)]
        module: Option<String>,
    },

    /// Print changes to the given flags until interrupted
    Watch {
        /// Flag names
        #[arg(required = true)]
        names: Vec<String>,

        /// Module to observe as (defaults to `[flags] module`)
        #[arg(long)]
        module: Option<String>,
    },

    /// Show which module owns each flag
    Ownership,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text
    Human,
    /// Pretty JSON
    Json,
}
