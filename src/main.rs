//! betforge - betting strategy discovery pipeline
//!
//! Coordinates strategy generation, evaluation, feedback submission and
//! retraining against an external ML prediction service.
//!
//! # Usage
//! ```sh
//! betforge                    # one discovery run (same as `betforge discover`)
//! betforge submit -b 100      # push one feedback batch
//! betforge retrain            # trigger retraining for all model families
//! betforge status             # gateway health and cache statistics
//! ```

use anyhow::Result;
use betforge::application::cached_client::CachedPredictionClient;
use betforge::application::evaluator::StrategyEvaluator;
use betforge::application::feedback::FeedbackSubmitter;
use betforge::application::generator::StrategyGenerator;
use betforge::application::orchestrator::DiscoveryOrchestrator;
use betforge::config::{Config, Mode};
use betforge::domain::ports::{BacktestRunner, PredictionGateway};
use betforge::domain::repositories::{
    BacktestRepository, PredictionRepository, StrategyRepository,
};
use betforge::domain::scoring::WeightedScorer;
use betforge::domain::types::{DiscoveryReport, TrainingConfig};
use betforge::infrastructure::gateway::PredictionServiceClient;
use betforge::infrastructure::mock::{
    InMemoryBacktestRepository, InMemoryPredictionRepository, InMemoryStrategyRepository,
    MockBacktestRunner, MockPredictionGateway,
};
use betforge::infrastructure::persistence::Database;
use betforge::infrastructure::persistence::repositories::{
    SqliteBacktestRepository, SqlitePredictionRepository, SqliteStrategyRepository,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Betting strategy discovery pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one discovery run (generate, evaluate, feedback, retrain)
    Discover,
    /// Submit one batch of backtest results as training feedback
    Submit {
        /// Maximum number of results to submit
        #[arg(short, long, default_value = "100")]
        batch_size: usize,
    },
    /// Trigger retraining for the standard model families
    Retrain,
    /// Print gateway health and cache statistics
    Status,
}

/// Explicit dependency set built once and passed into each service
/// constructor. No process-wide globals.
struct Dependencies {
    client: Arc<CachedPredictionClient>,
    strategies: Arc<dyn StrategyRepository>,
    backtests: Arc<dyn BacktestRepository>,
    #[allow(dead_code)]
    predictions: Arc<dyn PredictionRepository>,
    runner: Option<Arc<dyn BacktestRunner>>,
}

impl Dependencies {
    async fn build(config: &Config) -> Result<Self> {
        match config.mode {
            Mode::Mock => {
                info!("Running in mock mode (in-process gateway, in-memory storage)");
                let gateway: Arc<dyn PredictionGateway> = Arc::new(MockPredictionGateway::new());
                let client = Arc::new(CachedPredictionClient::new(gateway, config.cache.clone()));
                let predictions: Arc<dyn PredictionRepository> =
                    Arc::new(InMemoryPredictionRepository::new());
                let runner: Arc<dyn BacktestRunner> =
                    Arc::new(MockBacktestRunner::new(client.clone(), predictions.clone()));
                Ok(Self {
                    client,
                    strategies: Arc::new(InMemoryStrategyRepository::new()),
                    backtests: Arc::new(InMemoryBacktestRepository::new()),
                    predictions,
                    runner: Some(runner),
                })
            }
            Mode::Live => {
                let db = Database::new(&config.database_url).await?;
                let gateway: Arc<dyn PredictionGateway> =
                    Arc::new(PredictionServiceClient::new(&config.gateway));
                let client = Arc::new(CachedPredictionClient::new(gateway, config.cache.clone()));
                Ok(Self {
                    client,
                    strategies: Arc::new(SqliteStrategyRepository::new(db.pool.clone())),
                    backtests: Arc::new(SqliteBacktestRepository::new(db.pool.clone())),
                    predictions: Arc::new(SqlitePredictionRepository::new(db.pool.clone())),
                    runner: None,
                })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        "betforge {} starting (mode: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.mode
    );

    let deps = Dependencies::build(&config).await?;

    // OS interrupt cancels in-flight remote calls and stops the pipeline.
    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run...");
                token.cancel();
            }
        });
    }

    match cli.command.unwrap_or(Commands::Discover) {
        Commands::Discover => run_discovery(&config, &deps, &token).await?,
        Commands::Submit { batch_size } => run_submit(&deps, &token, batch_size).await?,
        Commands::Retrain => run_retrain(&deps, &token).await?,
        Commands::Status => run_status(&deps).await?,
    }

    if let Err(e) = deps.client.close().await {
        warn!("Client close reported: {}", e);
    }
    Ok(())
}

async fn run_discovery(
    config: &Config,
    deps: &Dependencies,
    token: &CancellationToken,
) -> Result<()> {
    let scorer = Arc::new(WeightedScorer::default());
    let generator = StrategyGenerator::new(deps.client.clone(), deps.strategies.clone());
    let evaluator = StrategyEvaluator::new(
        deps.strategies.clone(),
        deps.backtests.clone(),
        deps.runner.clone(),
        scorer,
        config.discovery.top_n,
    );
    let feedback = FeedbackSubmitter::new(deps.client.clone(), deps.backtests.clone());
    let orchestrator = DiscoveryOrchestrator::new(
        generator,
        evaluator,
        feedback,
        deps.strategies.clone(),
        config.discovery.clone(),
    );

    let report = orchestrator.run(token).await?;
    print_report(&report);
    Ok(())
}

async fn run_submit(deps: &Dependencies, token: &CancellationToken, batch_size: usize) -> Result<()> {
    let submitter = FeedbackSubmitter::new(deps.client.clone(), deps.backtests.clone());
    let outcome = submitter.submit_batch(token, batch_size).await?;
    println!("Submitted {} backtest results as feedback", outcome.submitted);
    if let Some(reason) = outcome.failure {
        anyhow::bail!("Batch stopped early: {}", reason);
    }
    Ok(())
}

async fn run_retrain(deps: &Dependencies, token: &CancellationToken) -> Result<()> {
    let submitter = FeedbackSubmitter::new(deps.client.clone(), deps.backtests.clone());
    for training in TrainingConfig::standard_set() {
        match submitter.trigger_retraining(token, &training).await {
            Ok(job) => println!("{}: job {} ({:?})", training.model, job.job_id, job.status),
            Err(e) => println!("{}: failed to trigger ({:#})", training.model, e),
        }
    }
    Ok(())
}

async fn run_status(deps: &Dependencies) -> Result<()> {
    match deps.client.health().await {
        Ok(health) => println!(
            "Gateway: {} (model loaded: {})",
            health.status, health.model_loaded
        ),
        Err(e) => println!("Gateway: unreachable ({})", e),
    }

    let stats = deps.client.stats();
    println!(
        "Cache: {} hits / {} misses (ratio {:.2})",
        stats.hits, stats.misses, stats.ratio
    );
    Ok(())
}

fn print_report(report: &DiscoveryReport) {
    println!("\nDiscovery run {}", report.run_id);
    println!("{}", "-".repeat(72));
    println!("Generated:          {}", report.generated_count);
    println!("Activated:          {}", report.activated_count);
    println!("Deactivated:        {}", report.deactivated_count);
    println!("Feedback submitted: {}", report.feedback_submitted_count);
    println!("Retraining:         {}", if report.retraining_triggered { "triggered" } else { "skipped" });
    println!("Duration:           {:.1}s", report.duration.as_secs_f64());
    println!("Completed at:       {}", report.completed_at.to_rfc3339());

    if !report.top_strategies.is_empty() {
        println!("\nTop strategies:");
        for entry in &report.top_strategies {
            println!(
                "  #{:<3} {:<40} score {:.3}  {}",
                entry.rank,
                entry.name,
                entry.composite_score,
                if entry.active { "active" } else { "inactive" }
            );
        }
    }
}
