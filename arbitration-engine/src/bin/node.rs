//! Arbitration Node Binary
//!
//! Reads JSON triggers from stdin, one per line, and writes one JSON outcome
//! per line to stdout. Logs go to stderr.

use anyhow::Context;
use arbitration_engine::{ArbitrationEngine, Config, Outcome, Trigger};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Starting {} v{}", config.service_name, config.service_version);

    let mut engine = ArbitrationEngine::new(config)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = match Trigger::from_json(line) {
            Ok(trigger) => engine.process(&trigger),
            Err(err) => {
                warn!("Skipping unreadable trigger: {}", err);
                Outcome::from(Err(err))
            }
        };
        handled += 1;

        let mut encoded = serde_json::to_vec(&outcome)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    if let Err(err) = engine.check_invariants() {
        error!("Invariant check failed at shutdown: {}", err);
    }

    match engine.metrics().render() {
        Ok(text) => info!("Metrics at shutdown:\n{}", text),
        Err(err) => warn!("Failed to render metrics: {}", err),
    }

    info!("Shutting down after {} triggers", handled);
    Ok(())
}
