use anyhow::{Context, Result};
use chatrelay::cli::{Cli, Commands};
use chatrelay::config::{BackendKind, Settings};
use chatrelay::ingest::Ingestor;
use chatrelay::{init_with_settings, shutdown, utils};
use clap::Parser;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{self, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::new().context("Failed to load settings")?;
    if let Some(backend) = cli.backend {
        settings.store.backend = backend;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = init_with_settings(&settings).await {
        utils::display::print_error(&format!("Failed to initialize store: {:#}", e));
        return Err(e);
    }

    let result = match cli.command {
        Commands::Ingest { file } => handle_ingest(file).await,
        Commands::Info => handle_info(&settings),
    };

    shutdown().await?;

    result
}

async fn handle_ingest(file: Option<PathBuf>) -> Result<()> {
    let ingestor = Ingestor::new(chatrelay::store()?);

    let report = match file {
        Some(path) => {
            utils::display::print_info(&format!("Reading events from {:?}", path));
            let file = File::open(&path)
                .await
                .with_context(|| format!("Failed to open event file {:?}", path))?;
            ingestor.ingest_lines(BufReader::new(file)).await?
        }
        None => {
            utils::display::print_info("Reading events from stdin (Ctrl+D to finish)");
            ingestor.ingest_lines(BufReader::new(io::stdin())).await?
        }
    };

    utils::display::print_report(&report);
    Ok(())
}

fn handle_info(settings: &Settings) -> Result<()> {
    let store = chatrelay::store()?;

    utils::display::print_header("Store");
    utils::display::print_field("backend", store.backend());
    utils::display::print_field(
        "reads",
        if store.supports_reads() {
            "supported"
        } else {
            "unsupported (write-only backend)"
        },
    );

    match settings.store.backend {
        BackendKind::Remote => {
            utils::display::print_field("channel", &settings.remote.channel);
            utils::display::print_field(
                "timeout",
                &format!("{}s", settings.remote.timeout_secs),
            );
        }
        BackendKind::Local => {
            utils::display::print_field("path", &settings.local.path.display().to_string());
        }
    }

    Ok(())
}
