//! `hivemind` command-line driver.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hivemind_agents::{Collective, HiveServices};
use hivemind_capabilities::CapabilityRegistry;
use hivemind_core::{AgentId, HiveConfig};
use hivemind_orchestrator::PatternCatalog;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "hivemind", version, about = "Drive a HIVEMIND agent collective")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "HIVEMIND_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Wire the rich capabilities (circuit oracle, scripted group chat)
    #[arg(long, global = true)]
    rich: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run evolution epochs and print each epoch report
    Evolve {
        #[arg(long, default_value_t = 1)]
        epochs: u64,
        /// Write the final snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run one collaboration pattern and print its status
    Collaborate {
        #[arg(long)]
        pattern: String,
        /// Initiating context entries; values are parsed as JSON when possible
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context_entry)]
        context: Vec<(String, Value)>,
    },
    /// List the collaboration patterns in the catalog
    Patterns,
    /// Run one epoch and export the resulting memories
    MemoryExport {
        #[arg(long)]
        path: PathBuf,
        /// Only export fragments owned by this agent
        #[arg(long)]
        agent: Option<AgentId>,
    },
}

fn parse_context_entry(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hivemind=info"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.context("failed to install tracing subscriber")
}

fn load_config(path: Option<&Path>) -> Result<HiveConfig> {
    let config = match path {
        Some(path) => HiveConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => HiveConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn capabilities(config: &HiveConfig, rich: bool) -> CapabilityRegistry {
    if rich {
        CapabilityRegistry::rich(
            config.evolution.seed,
            config.evolution.oracle_shots,
            config.memory.embedding_dimensions,
        )
    } else {
        CapabilityRegistry::new()
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let registry = capabilities(&config, cli.rich);

    match cli.command {
        Command::Evolve { epochs, snapshot } => {
            let services = HiveServices::from_config(&config, &registry)?;
            let mut collective = Collective::genesis(&config, services)?;
            for _ in 0..epochs {
                let report = collective.evolve().await?;
                print_json(&report)?;
            }
            if let Some(path) = snapshot {
                collective.persist_snapshot(&path)?;
                info!(path = %path.display(), "Snapshot written");
            }
        }
        Command::Collaborate { pattern, context } => {
            let services = HiveServices::from_config(&config, &registry)?;
            let collective = Collective::genesis(&config, services)?;
            let context: HashMap<String, Value> = context.into_iter().collect();
            let orchestrator = &collective.services().orchestrator;
            let id = orchestrator.initiate(&pattern, context).await?;
            match orchestrator.status(&id)? {
                Some(status) => print_json(&status)?,
                None => bail!("conversation {id} vanished"),
            }
        }
        Command::Patterns => {
            let mut catalog = PatternCatalog::builtin();
            if let Some(path) = &config.orchestrator.pattern_catalog {
                catalog.extend_from_file(path)?;
            }
            for pattern in catalog.iter() {
                println!(
                    "{:<28} {} steps  {}",
                    pattern.name,
                    pattern.step_count(),
                    pattern.description
                );
            }
        }
        Command::MemoryExport { path, agent } => {
            let services = HiveServices::from_config(&config, &registry)?;
            let mut collective = Collective::genesis(&config, services)?;
            collective.evolve().await?;
            collective.services().memory.export(&path, agent).await?;
            let stats = collective.services().memory.statistics().await?;
            info!(path = %path.display(), total = stats.total, "Memories exported");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_context_entry() {
        assert_eq!(
            parse_context_entry("capacity_kw=9.6").unwrap(),
            ("capacity_kw".to_string(), json!(9.6))
        );
        assert_eq!(
            parse_context_entry("site=Test Site").unwrap(),
            ("site".to_string(), json!("Test Site"))
        );
        assert!(parse_context_entry("novalue").is_err());
        assert!(parse_context_entry("=x").is_err());
    }

    #[test]
    fn test_parse_collaborate_command() {
        let cli = Cli::try_parse_from([
            "hivemind",
            "--json-logs",
            "collaborate",
            "--pattern",
            "solar_design_review",
            "--context",
            "site=Roof A",
            "--context",
            "capacity_kw=6",
        ])
        .unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Command::Collaborate { pattern, context } => {
                assert_eq!(pattern, "solar_design_review");
                assert_eq!(context.len(), 2);
                assert_eq!(context[1].1, json!(6));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_evolve_defaults() {
        let cli = Cli::try_parse_from(["hivemind", "evolve"]).unwrap();
        match cli.command {
            Command::Evolve { epochs, snapshot } => {
                assert_eq!(epochs, 1);
                assert!(snapshot.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
