//! The `ask` command

use clap::Args;
use colored::Colorize;
use parliament_chorus::{AskRequest, Chorus, ChorusResponse};
use parliament_constitution::Constitution;
use parliament_types::{Decision, Mode, SubsystemId};
use serde_json::Value;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// What to ask
    pub text: String,

    /// Force a mode (inquiry, creation, execution) instead of detecting it
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Context as a JSON object, e.g. '{"task": {"type": "echo", "message": "hi"}}'
    #[arg(short, long)]
    pub context: Option<String>,

    /// Gather extra perspectives and compute a consensus score
    #[arg(long)]
    pub consensus: bool,
}

pub async fn execute(
    args: AskArgs,
    constitution: Constitution,
    format: OutputFormat,
) -> CliResult<()> {
    let request = request(args)?;
    let chorus = Chorus::in_memory(constitution).await?;
    let response = chorus.ask(request).await;
    chorus.shutdown().await;
    let response = response?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => print_text(&response),
    }
    Ok(())
}

fn request(args: AskArgs) -> CliResult<AskRequest> {
    let mut request = AskRequest::new(args.text);
    if let Some(mode) = args.mode {
        request = request.with_mode(mode);
    }
    if let Some(raw) = args.context {
        let context: Value = serde_json::from_str(&raw)?;
        if !context.is_object() {
            return Err(CliError::InvalidArgument(
                "--context must be a JSON object".to_string(),
            ));
        }
        request = request.with_context(context);
    }
    if args.consensus {
        request = request.with_consensus();
    }
    Ok(request)
}

fn names(ids: &[SubsystemId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn print_text(response: &ChorusResponse) {
    println!("{} {}", "Mode:".bold(), response.mode_used.to_string().cyan());
    println!(
        "{} {} (confidence {:.2})",
        "Routed to:".bold(),
        response.routing.target_subsystem,
        response.routing.confidence
    );
    println!("{} {}", "Involved:".bold(), names(&response.involved));
    println!("{} {}", "Dominant:".bold(), names(&response.dominant));

    if let Some(strategist) = &response.outputs.strategist {
        println!(
            "{} {}",
            "Primary approach:".bold(),
            strategist.strategy.primary_approach
        );
    }
    if let Some(artisan) = &response.outputs.artisan {
        println!("{} {}", "Creation:".bold(), artisan.creation.title);
    }
    if let Some(ledger) = &response.outputs.ledger {
        println!(
            "{} {:.2}",
            "Risk score:".bold(),
            ledger.analysis.risk_score
        );
    }
    if let Some(result) = &response.outputs.executor {
        println!("{} {:?}", "Execution:".bold(), result.status);
    }
    if let Some(consensus) = &response.consensus {
        let verdict = if consensus.threshold_met {
            "met".green()
        } else {
            "not met".yellow()
        };
        println!(
            "{} {:.2} / {:.2} ({})",
            "Consensus:".bold(),
            consensus.score,
            consensus.threshold,
            verdict
        );
    }
    if let Some(halt) = &response.halt {
        print_withheld("Halted:", halt);
    }
    if let Some(escalation) = &response.escalation {
        print_withheld("Escalated:", escalation);
    }

    let reflection = &response.reflection;
    println!();
    println!("{}", "Reflection".bold().cyan());
    println!("  coherence: {:.2}", reflection.coherence_score);
    println!("  load: {:?}", reflection.emotional_load_estimate);
    println!("  progress: {}", reflection.progress_assessment);
    println!("  aligned: {}", reflection.philosophical_alignment);
}

fn print_withheld(label: &str, decision: &Decision) {
    println!(
        "{} {} [{}]",
        label.red().bold(),
        decision.reason().unwrap_or_default(),
        decision
            .fault_code()
            .map(|code| code.to_string())
            .unwrap_or_default()
    );
}
