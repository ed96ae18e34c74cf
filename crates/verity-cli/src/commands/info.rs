//! Info command - show version and effective configuration
//!
//! Usage:
//! ```bash
//! VERITY_MAX_ROUNDS=5 verity info
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use verity_core::{AgentType, SystemConfig};

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Print the configuration as JSON
    #[arg(long)]
    json: bool,
}

/// Run the info command
pub fn run(args: InfoArgs) -> Result<()> {
    let config = SystemConfig::from_env().context("Invalid VERITY_* environment")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("{}", "Verity - Multi-Agent Debate Engine".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();
    println!("  {} {}", "CLI Version:".dimmed(), env!("CARGO_PKG_VERSION").green());
    println!();

    let d = &config.debate;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
            Cell::new("Environment").fg(Color::Cyan),
        ]);
    let rows = [
        ("max_rounds", d.max_rounds.to_string(), "VERITY_MAX_ROUNDS"),
        ("consensus_threshold", d.consensus_threshold.to_string(), "VERITY_CONSENSUS_THRESHOLD"),
        ("confidence_threshold", d.confidence_threshold.to_string(), "VERITY_CONFIDENCE_THRESHOLD"),
        ("timeout_per_round_ms", d.timeout_per_round_ms.to_string(), "VERITY_ROUND_TIMEOUT_MS"),
        ("minimum_evidence", d.minimum_evidence.to_string(), "VERITY_MIN_EVIDENCE"),
        ("allow_partial_consensus", d.allow_partial_consensus.to_string(), "VERITY_ALLOW_PARTIAL"),
        ("max_concurrent_debates", config.max_concurrent_debates.to_string(), "VERITY_MAX_CONCURRENT"),
        (
            "maintenance_interval_secs",
            config.maintenance_interval_secs.to_string(),
            "VERITY_MAINTENANCE_INTERVAL_SECS",
        ),
    ];
    for (name, value, env) in rows {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(value).fg(Color::Green),
            Cell::new(env).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");
    println!();

    println!("{}", "Voting Weights:".bold());
    for agent in AgentType::ALL {
        println!(
            "  {} {:<12} {:.2}",
            "•".cyan(),
            agent.as_str(),
            d.voting_weights.expertise(agent)
        );
    }
    println!();

    println!(
        "  {} {}",
        "Repository:".dimmed(),
        "https://github.com/verity-rs/verity".underline()
    );
    Ok(())
}
