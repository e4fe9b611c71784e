//! Streambot flag tool.
//!
//! Lists, reads, edits and watches the runtime feature flags shared by the
//! streambot modules.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, handle_flags_command};
use streambot::StreambotConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!(config_file = ?cli.config, "Loading configuration");
    let mut config = StreambotConfig::from_file(&cli.config)?;
    if let Some(path) = cli.flags_file {
        config = config.with_flags_path(path);
    }

    match cli.command {
        Commands::Flags { command } => handle_flags_command(&config, command).await?,
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
