use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;

use optionbot::api::{PaperBroker, RestBrokerClient};
use optionbot::config::Settings;
use optionbot::engine::Engine;
use optionbot::persistence::StateStore;
use optionbot::{summary, BrokerGateway, Result};

#[derive(Debug, Parser)]
#[command(name = "optionbot", about = "RSI-threshold binary options trading loop")]
struct Args {
    /// Configuration file (defaults to ./optionbot.{toml,yaml,json} if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trade against the built-in simulated broker instead of a live one
    #[arg(long)]
    paper: bool,

    /// Override the state snapshot path
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Print the summary from the persisted state and exit
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(path) = args.state_file {
        settings.state_file = path;
    }

    if args.summary {
        return print_stored_summary(&settings).await;
    }

    tracing::info!("optionbot starting");
    tracing::info!(
        "thresholds: PUT/CALL at {:.0}/{:.0} ({:?} polarity), {} assets, {}m expiry",
        settings.oversold_level,
        settings.overbought_level,
        settings.polarity,
        settings.assets.len(),
        settings.expiry_minutes
    );

    if args.paper {
        let starting_balance = std::env::var("PAPER_BALANCE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(10_000.0);
        tracing::info!("paper mode: simulated broker with {:.2}", starting_balance);
        let gateway = PaperBroker::new(settings.assets.clone(), starting_balance);
        run(settings, gateway).await
    } else {
        let base_url =
            std::env::var("BROKER_API_URL").expect("BROKER_API_URL not found in environment");
        let api_key =
            std::env::var("BROKER_API_KEY").expect("BROKER_API_KEY not found in environment");
        let gateway = RestBrokerClient::new(base_url, api_key)?;
        run(settings, gateway).await
    }
}

async fn run<G: BrokerGateway>(settings: Settings, gateway: G) -> Result<()> {
    let mut engine = Engine::bootstrap(&settings, gateway).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("press ctrl-c to stop");
    let result = engine.run(shutdown_rx).await;

    summary::log_summary(engine.state());
    result
}

async fn print_stored_summary(settings: &Settings) -> Result<()> {
    let store = StateStore::new(&settings.state_file);
    match store.load().await? {
        Some(state) => summary::log_summary(&state),
        None => tracing::warn!(
            "no state file at {}, nothing to summarize",
            settings.state_file.display()
        ),
    }
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optionbot=info".into()),
        )
        .init();
}
