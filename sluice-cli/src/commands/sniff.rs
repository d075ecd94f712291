//! Sniff command
//!
//! Asks the cluster for its nodes and prints the resulting pool.

use crate::error::{CliError, CliResult};
use colored::Colorize;
use sluice_config::Settings;
use sluice_transport::{NodeState, RequestPipeline};

/// Sniff command
pub async fn run(settings: &Settings, quiet: bool) -> CliResult<()> {
    let pipeline = RequestPipeline::http(settings.transport_config()?)?;
    let delta = pipeline
        .sniff()
        .await
        .map_err(|e| CliError::Transport(e.to_string()))?;

    if !quiet {
        eprintln!(
            "  {} {} added, {} kept, {} removed",
            "→".green(),
            delta.added,
            delta.retained,
            delta.removed + delta.retired
        );
    }

    for node in pipeline.pool().snapshot() {
        let state = match node.state() {
            NodeState::Alive => "alive".green(),
            NodeState::Dead => "dead".red(),
            NodeState::Unknown => "unknown".dimmed(),
        };
        let roles = node.roles();
        let mut tags = Vec::new();
        if roles.master_eligible {
            tags.push("master");
        }
        if roles.data {
            tags.push("data");
        }
        if roles.ingest {
            tags.push("ingest");
        }
        println!(
            "{}\t{}\t{}\t{}",
            node.url(),
            node.name().unwrap_or("-"),
            state,
            tags.join(",")
        );
    }
    Ok(())
}
