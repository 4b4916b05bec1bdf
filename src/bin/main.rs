use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trading_agent_orchestrator::{
    agent::Orchestrator,
    config::{AgentConfig, ExchangeCredentials},
    decision::OllamaProvider,
    exchange::CoinbaseClient,
    models::SessionReport,
    Result,
};

const EXCHANGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Autonomous LLM-directed crypto trading agent", long_about = None)]
struct Cli {
    /// Name of the Ollama model to use
    #[arg(long, default_value = "llama3")]
    model: String,

    /// Seconds to wait between decision cycles
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Directory where journal files are stored
    #[arg(long, default_value = "journals")]
    journal_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!("\n=== SESSION REPORT ===");
            println!("Session ID: {}", report.session_id);
            println!("Termination: {}", report.termination_reason);
            println!("Filled Trades: {}", report.trade_count);
            println!("Realized Profit (USDC): {}", report.realized_profit);
            println!("Journal Entries: {}", report.journal_entries);
        }
        Err(e) => {
            eprintln!("Session failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<SessionReport> {
    let mut config = AgentConfig::default();
    config.llm.model = cli.model;
    config.poll_interval = Duration::from_secs(cli.poll_interval);
    config.journal.directory = cli.journal_dir;

    // Credentials are required before any cycle runs.
    let credentials = ExchangeCredentials::from_env()?;

    let decision_provider = OllamaProvider::new(config.llm.clone(), config.constraints.clone())?;
    let execution_provider = CoinbaseClient::new(credentials, EXCHANGE_REQUEST_TIMEOUT)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop signal received, finishing the current cycle");
            let _ = stop_tx.send(true);
        }
    });

    info!(model = %config.llm.model, "Trading agent starting");

    let mut orchestrator = Orchestrator::new(
        config,
        Box::new(decision_provider),
        Box::new(execution_provider),
        stop_rx,
    )?;

    orchestrator.run().await
}
