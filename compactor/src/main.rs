use std::path::PathBuf;
use std::process::ExitCode;

use compactor::{CompactConfig, compact_file};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: compactor <path>";

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compactor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let path = PathBuf::from(path);

    // Load configuration from environment variables
    let config = match CompactConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };

    tracing::info!(
        "Loaded configuration: chunk_threshold={}, sort_block_size={}, merge_fan_in={}",
        config.chunk_threshold,
        config.sort_block_size,
        config.merge_fan_in
    );

    match compact_file(&path, &config) {
        Ok(report) => {
            tracing::info!(
                documents = report.documents,
                local_documents = report.local_documents,
                "compacted {}",
                path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(phase = %e.phase, "{e}");
            ExitCode::FAILURE
        }
    }
}
