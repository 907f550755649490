use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::json;
use soultrigger_core_types::ExecRoute;
use soultrigger_policy_center::PolicySnapshot;
use tool_trigger::events::RecordingEvents;
use tool_trigger::metrics::InMemoryMetrics;
use tool_trigger::policy::TriggerPolicyView;
use tool_trigger::ports::PagePort;
use tool_trigger::{ExecCtx, TriggerToolBuilder};
use tracing::info;

use crate::scenario::Scenario;

/// Scheduler-side ceiling; the command timeout normally ends the run first.
const SCHEDULER_BUDGET: Duration = Duration::from_secs(300);

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML)
    pub scenario: PathBuf,

    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_run(args: RunArgs, snapshot: &PolicySnapshot) -> Result<()> {
    let prepared = Scenario::load(&args.scenario)?.prepare()?;
    info!(
        scenario = %args.scenario.display(),
        event = %prepared.params.event_name,
        "running scenario"
    );

    let page = Arc::new(prepared.page);
    let events = Arc::new(RecordingEvents::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let tool = TriggerToolBuilder::new(
        TriggerPolicyView::from(snapshot),
        page.clone() as Arc<dyn PagePort>,
    )
    .with_events(events.clone())
    .with_metrics(metrics.clone())
    .build();

    let ctx = ExecCtx::with_budget(ExecRoute::detached(), SCHEDULER_BUDGET);
    let outcome = tool.run(ctx, prepared.params, prepared.opt).await;

    if args.json {
        let payload = match &outcome {
            Ok(report) => json!({
                "ok": true,
                "report": report,
                "hooks": events.events(),
                "delivered": page.delivered(),
                "metrics": metrics.snapshot(),
            }),
            Err(err) => json!({
                "ok": false,
                "error": {"kind": err.kind(), "message": err.to_string()},
                "hooks": events.events(),
                "delivered": page.delivered(),
                "metrics": metrics.snapshot(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }

    let report = outcome.map_err(|err| anyhow!("trigger failed ({}): {}", err.kind(), err))?;
    if !args.json {
        println!(
            "Delivered '{}' to {} (not_cancelled={})",
            report.dispatched.event_name, report.dispatched.target, report.dispatched.not_cancelled
        );
        if let Some(coords) = &report.coords {
            println!(
                "  client=({}, {}) page=({}, {})",
                coords.from_viewport.x,
                coords.from_viewport.y,
                coords.from_window.x,
                coords.from_window.y
            );
        }
        if let Some(trace) = &report.actionability {
            println!(
                "  actionability: attempts={} scrolls={}",
                trace.attempts, trace.scrolls
            );
        } else {
            println!("  actionability: skipped ({} target)", report.dispatched.target.kind());
        }
        println!(
            "  assertions: checked={} attempts={}",
            report.assertions.checked, report.assertions.attempts
        );
        println!("  latency: {}ms", report.latency_ms);
    }
    Ok(())
}
