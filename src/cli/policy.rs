use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;
use soultrigger_policy_center::{PolicySnapshot, PolicySource};

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PolicyCommand {
    /// Print the effective policy and where each value came from
    Show(PolicyShowArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PolicyShowArgs {
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_policy(args: PolicyArgs, snapshot: &PolicySnapshot) -> Result<()> {
    match args.command {
        PolicyCommand::Show(show_args) => {
            if show_args.json {
                let payload = json!({ "policy": snapshot });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }
            let trigger = &snapshot.trigger;
            println!("Policy Revision: {}", snapshot.rev);
            println!();
            let rows = [
                ("trigger.enabled", trigger.enabled.to_string()),
                (
                    "trigger.wait_for_animations",
                    trigger.wait_for_animations.to_string(),
                ),
                (
                    "trigger.animation_distance_threshold",
                    trigger.animation_distance_threshold.to_string(),
                ),
                ("trigger.timeout_ms", trigger.timeout_ms.to_string()),
                ("trigger.retry_interval_ms", trigger.retry_interval_ms.to_string()),
                ("trigger.frame_interval_ms", trigger.frame_interval_ms.to_string()),
                (
                    "trigger.max_scroll_corrections",
                    trigger.max_scroll_corrections.to_string(),
                ),
            ];
            for (path, value) in rows {
                println!(
                    "{:<40} {:<8} ({})",
                    path,
                    value,
                    source_label(snapshot.source_of(path))
                );
            }
            Ok(())
        }
    }
}

fn source_label(source: Option<PolicySource>) -> &'static str {
    match source {
        Some(PolicySource::Builtin) | None => "builtin",
        Some(PolicySource::File) => "file",
        Some(PolicySource::Env) => "env",
        Some(PolicySource::Cli) => "cli",
    }
}
