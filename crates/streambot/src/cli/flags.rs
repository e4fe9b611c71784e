//! Feature flag command handlers.

use super::{FlagCommand, OutputFormat};
use anyhow::{Context, anyhow};
use serde::Serialize;
use std::collections::BTreeMap;
use streambot::{
    FeatureFlag, FeatureFlagManager, FlagValue, ManagerRegistry, PermissionLevel, StreambotConfig,
};
use tracing::{info, warn};

/// One row of `flags list --format json`.
#[derive(Debug, Serialize)]
struct FlagRow<'a> {
    value: &'a FlagValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_permissions: Option<PermissionLevel>,
}

/// Handles the `flags` command.
///
/// Every subcommand goes through a [`FeatureFlagManager`] acting as the
/// configured module (or `--module`), so the usual permission rules apply.
#[tracing::instrument(skip_all, fields(path = %config.flags().path().display()))]
pub async fn handle_flags_command(
    config: &StreambotConfig,
    command: FlagCommand,
) -> anyhow::Result<()> {
    let flags = config.flags();
    let mut settings = flags.store_settings();
    if matches!(command, FlagCommand::Watch { .. }) {
        settings = settings.with_watch(true);
    }

    let registry = ManagerRegistry::new(settings);
    let open = |module: Option<String>| {
        registry.open(flags.path(), module.as_deref().unwrap_or(flags.module()))
    };

    match command {
        FlagCommand::List { format } => list(&open(None), format)?,
        FlagCommand::Get { name, module } => get(&open(module), &name)?,
        FlagCommand::Set {
            name,
            value,
            module,
        } => set(&open(module), &name, &value)?,
        FlagCommand::Watch { names, module } => watch(&open(module), &names).await?,
        FlagCommand::Ownership => ownership(&open(None)),
    }

    registry.shutdown();
    Ok(())
}

fn list(manager: &FeatureFlagManager, format: OutputFormat) -> anyhow::Result<()> {
    let summaries = manager.all_flags_with_descriptions();
    let ownership = manager.ownership_info();

    match format {
        OutputFormat::Json => {
            let rows: BTreeMap<&str, FlagRow<'_>> = summaries
                .iter()
                .map(|(name, summary)| {
                    let record = ownership.get(name);
                    let row = FlagRow {
                        value: summary.value(),
                        description: Some(summary.description().as_str())
                            .filter(|d| !d.is_empty()),
                        owner_module: record.map(|o| o.owner_module().as_str()),
                        access_permissions: record.map(|o| *o.access_permissions()),
                    };
                    (name.as_str(), row)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Human => {
            if summaries.is_empty() {
                println!("No flags in {}", manager.config_path().display());
                return Ok(());
            }
            let width = summaries.keys().map(String::len).max().unwrap_or(0);
            for (name, summary) in &summaries {
                let owner = ownership
                    .get(name)
                    .map(|o| format!("  [{} / {}]", o.owner_module(), o.access_permissions()))
                    .unwrap_or_default();
                println!("{name:<width$}  {}{owner}", summary.value());
                if !summary.description().is_empty() {
                    println!("{:<width$}    {}", "", summary.description());
                }
            }
        }
    }
    Ok(())
}

fn get(manager: &FeatureFlagManager, name: &str) -> anyhow::Result<()> {
    let flag = FeatureFlag::new(name)?;
    manager.use_flag(&flag)?;
    println!("{}", render(manager.get(&flag, None)?.as_ref()));
    Ok(())
}

fn set(manager: &FeatureFlagManager, name: &str, raw: &str) -> anyhow::Result<()> {
    let flag = FeatureFlag::new(name)?;
    let value = FlagValue::parse_input(raw).ok_or_else(|| anyhow!("null is not a flag value"))?;
    manager.use_flag(&flag)?;
    manager.set(&flag, value.clone())?;
    info!(flag = %flag, module = manager.module(), "Flag updated from CLI");
    println!("{flag} = {value}");
    Ok(())
}

async fn watch(manager: &FeatureFlagManager, names: &[String]) -> anyhow::Result<()> {
    for name in names {
        let flag = FeatureFlag::new(name.as_str())?;
        manager.use_flag(&flag)?;
        manager.on_change(&flag, |flag, old, new| {
            println!("{flag}: {} -> {}", render(old), render(new));
        })?;
        println!("{flag} = {}", render(manager.get(&flag, None)?.as_ref()));
    }

    if !manager.store().is_watching() {
        warn!("File watcher unavailable; external edits will not be noticed");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    manager.shutdown();
    Ok(())
}

fn ownership(manager: &FeatureFlagManager) {
    let records: BTreeMap<_, _> = manager.ownership_info().into_iter().collect();
    if records.is_empty() {
        println!("No flags have been declared");
        return;
    }
    let width = records.keys().map(String::len).max().unwrap_or(0);
    for (name, record) in &records {
        println!(
            "{name:<width$}  {}  {}",
            record.owner_module(),
            record.access_permissions()
        );
    }
}

fn render(value: Option<&FlagValue>) -> String {
    value.map_or_else(|| "(unset)".to_string(), ToString::to_string)
}
