use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reengage::config::AppConfig;
use reengage::engagement::{evaluate, CustomerSnapshot, EnvelopeBatch, ScoreCalculator};
use reengage::error::AppError;
use reengage::telemetry;
use serde_json::json;

use crate::infra::{build_dispatcher, parse_instant, seed_store};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "reengage-worker",
    about = "Score customers and send re-engagement emails from lifecycle events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP ingestion service (default command)
    Serve(ServeArgs),
    /// Process a batch file offline and print the batch report
    Process(ProcessArgs),
    /// Print the score breakdown and send decision for one customer snapshot
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Customer CSV export loaded into the store before serving
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// JSON file holding a `{ "Records": [...] }` batch
    pub(crate) batch: PathBuf,
    /// Customer CSV export loaded into the store first
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
    /// Evaluate as of this instant (RFC 3339 or YYYY-MM-DD) instead of now
    #[arg(long, value_parser = parse_instant)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// JSON file holding one customer snapshot
    pub(crate) customer: PathBuf,
    /// Evaluate as of this instant (RFC 3339 or YYYY-MM-DD) instead of now
    #[arg(long, value_parser = parse_instant)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Process(args) => run_process(args).await,
        Command::Score(args) => run_score(args),
    }
}

async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let batch: EnvelopeBatch = serde_json::from_str(&fs::read_to_string(&args.batch)?)?;
    let dispatcher = build_dispatcher(&config, args.as_of);
    if let Some(seed) = &args.seed {
        seed_store(dispatcher.orchestrator().store().as_ref(), seed).await?;
    }

    let report = dispatcher.dispatch_batch(&batch).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let snapshot: CustomerSnapshot = serde_json::from_str(&fs::read_to_string(&args.customer)?)?;
    let now = args.as_of.unwrap_or_else(Utc::now);

    let score = ScoreCalculator::new(config.engagement.scoring.clone()).compute(&snapshot, now);
    let decision_score = snapshot.engagement_score.unwrap_or(score.value);
    let decision = evaluate(
        decision_score,
        snapshot.last_email_date.as_deref(),
        &config.engagement.decision,
        now,
    );

    let output = json!({
        "score": score,
        "decision_score": decision_score,
        "decision": decision,
        "summary": decision.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
