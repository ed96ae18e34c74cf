//! Debate command - run a claim fixture through a full debate
//!
//! Usage:
//! ```bash
//! verity debate demos/reservoir.json
//! verity debate demos/reservoir.json --max-rounds 5 --threshold 0.8
//! verity debate demos/reservoir.json --json
//! ```

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use verity_adversarial::{DebateStatus, Veracity};
use verity_core::{AgentType, Claim, Conclusion, Evidence, Investigation, SystemConfig};
use verity_runtime::{DebateResult, SystemCoordinator};

use crate::{print_error, print_success, print_warning};

/// Arguments for the debate command
#[derive(Args)]
pub struct DebateArgs {
    /// Claim fixture (JSON with `claim` and `investigations`)
    #[arg(value_name = "FILE")]
    fixture: PathBuf,

    /// Maximum number of rounds
    #[arg(long, env = "VERITY_MAX_ROUNDS")]
    max_rounds: Option<u32>,

    /// Agreement (0.0 - 1.0) needed to conclude
    #[arg(long, short = 't')]
    threshold: Option<f64>,

    /// Time out instead of accepting a best-effort verdict
    #[arg(long)]
    strict: bool,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Append the Prometheus exposition of the run's metrics
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    claim: ClaimFixture,
    investigations: Vec<InvestigationFixture>,
}

#[derive(Debug, Deserialize)]
struct ClaimFixture {
    #[serde(default = "default_request")]
    request_id: String,
    text: String,
    #[serde(default = "default_extraction_confidence")]
    extraction_confidence: f64,
}

fn default_request() -> String {
    "cli".to_string()
}

fn default_extraction_confidence() -> f64 {
    100.0
}

#[derive(Debug, Deserialize)]
struct InvestigationFixture {
    agent: AgentType,
    conclusion: Conclusion,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    evidence: Vec<Evidence>,
}

fn load_fixture(path: &PathBuf) -> Result<(Claim, Vec<Investigation>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&content).context("Failed to parse fixture JSON")?;

    let claim = Claim::new(
        &fixture.claim.request_id,
        &fixture.claim.text,
        fixture.claim.extraction_confidence,
    );
    let investigations = fixture
        .investigations
        .into_iter()
        .map(|i| {
            Investigation::new(&claim.id, i.agent, i.conclusion, i.confidence)
                .with_reasoning(&i.reasoning)
                .with_evidence(i.evidence.into_iter().map(Arc::new).collect())
        })
        .collect();
    Ok((claim, investigations))
}

/// Run the debate command
pub async fn run(args: DebateArgs) -> Result<()> {
    let (claim, investigations) = load_fixture(&args.fixture)?;
    tracing::debug!(
        fixture = %args.fixture.display(),
        claim_id = %claim.id,
        investigations = investigations.len(),
        "Fixture loaded"
    );

    let mut config = SystemConfig::from_env().context("Invalid VERITY_* environment")?;
    if let Some(rounds) = args.max_rounds {
        config.debate.max_rounds = rounds;
    }
    if let Some(threshold) = args.threshold {
        config.debate.consensus_threshold = threshold;
    }
    if args.strict {
        config.debate.allow_partial_consensus = false;
    }

    let coordinator = SystemCoordinator::new(config)?;
    let result = match coordinator.process_claim(&claim, &investigations, None).await {
        Ok(result) => result,
        Err(e) => {
            print_error(&e.to_string());
            bail!("debate did not complete");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        render(&claim, &result);
    }
    if args.metrics {
        print!("{}", coordinator.metrics_snapshot().to_prometheus());
    }
    Ok(())
}

fn header(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        title
            .split('|')
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn veracity_color(v: Veracity) -> Color {
    match v {
        Veracity::VerifiedTrue => Color::Green,
        Veracity::VerifiedFalse | Veracity::Misleading => Color::Red,
        Veracity::PartiallyTrue => Color::Yellow,
        Veracity::InsufficientEvidence => Color::DarkGrey,
    }
}

fn render(claim: &Claim, result: &DebateResult) {
    println!("{}", "Verity Debate".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();
    println!("  {} {}", "Claim:".dimmed(), claim.claim_text);
    println!("  {} {}", "Session:".dimmed(), result.session_id);
    println!(
        "  {} {}",
        "Agents:".dimmed(),
        result
            .participating_agents
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let mut rounds = header("Round|Agreement|Conflicts|Manual review|Interim verdict");
    for round in &result.debate_rounds {
        let manual = round.resolutions.iter().filter(|r| r.needs_review()).count();
        let (verdict, color) = round
            .interim_consensus
            .as_ref()
            .map_or(("-", Color::DarkGrey), |c| {
                (c.final_veracity.as_str(), veracity_color(c.final_veracity))
            });
        rounds.add_row(vec![
            Cell::new(round.round_number),
            Cell::new(format!("{:.1}%", round.agreement())),
            Cell::new(round.conflicts.len()),
            Cell::new(manual),
            Cell::new(verdict).fg(color),
        ]);
    }
    println!("{rounds}");

    if !result.conflict_resolutions.is_empty() {
        println!();
        let mut resolutions = header("Conflict|Strategy|Kept|Discarded|Confidence");
        for r in &result.conflict_resolutions {
            let strategy = if r.needs_review() {
                Cell::new(r.method.as_str()).fg(Color::Yellow)
            } else {
                Cell::new(r.method.as_str()).fg(Color::Green)
            };
            resolutions.add_row(vec![
                Cell::new(r.conflict_id.trim_start_matches("conflict-").chars().take(8).collect::<String>()),
                strategy,
                Cell::new(r.resolved_evidence.len()),
                Cell::new(r.discarded_evidence.len()),
                Cell::new(format!("{:.0}", r.confidence)),
            ]);
        }
        println!("{resolutions}");
    }

    println!();
    let consensus = &result.final_consensus;
    let verdict = format!(
        "{} ({:.1}% confidence, {:.1}% agreement{})",
        consensus.final_veracity,
        consensus.confidence,
        consensus.agreement_level,
        consensus
            .method
            .map(|m| format!(", {m}"))
            .unwrap_or_default()
    );
    match result.status {
        DebateStatus::ConsensusReached if !consensus.forced => print_success(&verdict),
        DebateStatus::ConsensusReached => print_warning(&format!("Best effort: {verdict}")),
        status => print_warning(&format!("Debate ended as {status}: {verdict}")),
    }
    if !consensus.minority_opinions.is_empty() {
        println!(
            "  {} {}",
            "Dissent:".dimmed(),
            consensus
                .minority_opinions
                .iter()
                .map(|a| format!("{} ({})", a.agent_type, a.position))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!(
        "  {} {} ms, {} rounds",
        "Processed in".dimmed(),
        result.processing_time_ms,
        result.debate_rounds.len()
    );
}
