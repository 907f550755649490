use std::path::PathBuf;

use anyhow::{Context, Result};
use soultrigger_policy_center::{load_snapshot_with_options, LoadOptions, PolicySnapshot};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` wins over `level`; output goes
/// to stderr so stdout stays machine-readable.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub fn load_policy(paths: &[PathBuf]) -> Result<PolicySnapshot> {
    let options = LoadOptions {
        paths: paths.to_vec(),
        include_env: true,
        include_cli_env: true,
    };
    let snapshot = load_snapshot_with_options(&options).context("Failed to load policy")?;
    debug!(rev = snapshot.rev, files = paths.len(), "policy loaded");
    Ok(snapshot)
}
