use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use soultrigger_cli::cli::{dispatch, runtime::init_logging, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.debug)?;

    match dispatch(cli).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}
