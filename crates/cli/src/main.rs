//! `stowage`: aggregate the containers of a JSON scenario and sort them.

mod scenario;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use stowage_core::OwnerId;
use stowage_events::TracingCommandChannel;
use stowage_inventory::{Organizer, OrganizerConfig, SortKey, Span};

use crate::scenario::Scenario;

#[derive(Debug, Parser)]
#[command(name = "stowage")]
#[command(about = "Merge containers into one inventory and sort it")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sort every container of the scenario as one inventory and print the report.
    Sort {
        /// Scenario file (JSON)
        #[arg(value_name = "PATH")]
        scenario: PathBuf,

        /// Sort preset: name, code or type
        #[arg(short, long)]
        key: Option<SortKey>,

        /// Do not fold compatible stacks together
        #[arg(long)]
        no_merge: bool,
    },
    /// Print the partition layout of the merged inventory.
    Layout {
        #[arg(value_name = "PATH")]
        scenario: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        stowage_observability::init();
    } else {
        stowage_observability::init_pretty();
    }

    let output = match cli.command {
        Command::Sort { scenario, key, no_merge } => {
            let mut config = OrganizerConfig::from_env();
            if let Some(key) = key {
                config = config.with_sort_key(key);
            }
            if no_merge {
                config = config.with_merge_after_sort(false);
            }
            sort(&scenario, config)?
        }
        Command::Layout { scenario } => layout(&scenario)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn organizer(config: OrganizerConfig) -> Organizer {
    Organizer::new(config, OwnerId::new(), Arc::new(TracingCommandChannel))
}

fn sort(path: &Path, config: OrganizerConfig) -> anyhow::Result<serde_json::Value> {
    let loaded = Scenario::load(path)?.build();
    let key = config.sort_key;
    let mut organizer = organizer(config);
    organizer.merge(loaded.handles())?;

    tracing::info!(containers = loaded.containers.len(), %key, "sorting scenario");
    let report = organizer
        .sort_session()?
        .context("no containers were aggregated")?;

    let contents = loaded
        .containers
        .iter()
        .map(|c| c.contents())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "key": key,
        "report": report,
        "containers": contents,
    }))
}

fn layout(path: &Path) -> anyhow::Result<serde_json::Value> {
    let loaded = Scenario::load(path)?.build();
    let mut organizer = organizer(OrganizerConfig::from_env());
    organizer.merge(loaded.handles())?;

    let session = organizer.session().context("no containers were aggregated")?;
    let partitions: Vec<_> = session
        .partitions()
        .map(|p| {
            json!({
                "container": p.container_id(),
                "kind": p.kind(),
                "title": p.meta().title,
                "columns": p.meta().columns,
                "start": p.start(),
                "count": p.count(),
            })
        })
        .collect();

    Ok(json!({
        "total": session.total_count(),
        "boundaries": session.boundaries(),
        "partitions": partitions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sort_flags() {
        let cli = Cli::try_parse_from(["stowage", "sort", "scene.json", "--key", "code", "--no-merge"]).unwrap();

        match cli.command {
            Command::Sort { scenario, key, no_merge } => {
                assert_eq!(scenario, PathBuf::from("scene.json"));
                assert_eq!(key, Some(SortKey::Code));
                assert!(no_merge);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn json_logs_flag_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["stowage", "layout", "scene.json", "--json-logs"]).unwrap();
        assert!(cli.json_logs);

        let cli = Cli::try_parse_from(["stowage", "layout", "scene.json"]).unwrap();
        assert!(!cli.json_logs);
    }

    #[test]
    fn rejects_unknown_sort_key() {
        assert!(Cli::try_parse_from(["stowage", "sort", "scene.json", "--key", "weight"]).is_err());
    }
}
