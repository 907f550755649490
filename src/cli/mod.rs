use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod policy;
pub mod run;
pub mod runtime;

pub use policy::{cmd_policy, PolicyArgs};
pub use run::{cmd_run, RunArgs};

/// soultrigger - deliver synthetic events once their target is actionable
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Policy file layered over the built-in defaults (repeatable)
    #[arg(short, long = "policy", value_name = "FILE", global = true)]
    pub policy: Vec<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one trigger against a scripted page scenario
    Run(RunArgs),
    /// Inspect the effective trigger policy
    Policy(PolicyArgs),
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let snapshot = runtime::load_policy(&cli.policy)?;
    match cli.command {
        Commands::Run(args) => cmd_run(args, &snapshot).await,
        Commands::Policy(args) => cmd_policy(args, &snapshot),
    }
}
