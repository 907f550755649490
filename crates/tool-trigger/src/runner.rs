use chrono::Utc;
use soultrigger_core_types::{ActionId, ExecRoute, NodeId};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::actionability::{self, ActionabilityCallbacks, BlockReason, VerifyOptions};
use crate::assertions;
use crate::coords::ResolvedCoordinates;
use crate::dispatch;
use crate::errors::TriggerError;
use crate::model::{
    ActionabilityTrace, DispatchSummary, EventInit, EventTarget, ExecCtx, ScrollBehavior,
    TriggerOpt, TriggerParams, TriggerReport,
};
use crate::policy::TriggerPolicyView;
use crate::ports::{EventsPort, MetricsPort, PagePort, RetryPhase, SnapshotPhase};

pub struct RuntimeDeps<'a> {
    pub page: &'a dyn PagePort,
    pub events: &'a dyn EventsPort,
    pub metrics: &'a dyn MetricsPort,
    pub policy: &'a TriggerPolicyView,
}

#[instrument(skip_all, fields(action = %ctx.action_id.0, event = %params.event_name))]
pub async fn execute(
    ctx: &ExecCtx,
    params: TriggerParams,
    opt: TriggerOpt,
    deps: RuntimeDeps<'_>,
) -> Result<TriggerReport, TriggerError> {
    let started = Instant::now();
    let result = run(ctx, &params, &opt, &deps, started).await;
    match &result {
        Ok(report) => {
            deps.metrics.record_ok(report.latency_ms);
            deps.events.emit_finished(&ctx.action_id, true, None);
            info!(
                target_kind = report.dispatched.target.kind(),
                latency_ms = report.latency_ms,
                not_cancelled = report.dispatched.not_cancelled,
                "trigger completed"
            );
        }
        Err(err) => {
            deps.metrics.record_fail(err.kind());
            deps.events.emit_finished(&ctx.action_id, false, Some(err));
            warn!(kind = err.kind(), error = %err, "trigger failed");
        }
    }
    result
}

async fn run(
    ctx: &ExecCtx,
    params: &TriggerParams,
    opt: &TriggerOpt,
    deps: &RuntimeDeps<'_>,
    started: Instant,
) -> Result<TriggerReport, TriggerError> {
    if !deps.policy.enabled() {
        return Err(TriggerError::Disabled);
    }
    let target = params.target.resolve()?;
    if ctx.cancel.is_cancelled() {
        return Err(TriggerError::Cancelled);
    }

    let settings = deps.policy.effective(opt);
    let deadline = ctx.deadline.min(started + settings.timeout);
    let timeout_ms = settings.timeout.as_millis() as u64;
    let started_at = Utc::now();

    if opt.log {
        deps.events
            .emit_snapshot(&ctx.action_id, &target, SnapshotPhase::Before);
    }

    let (dispatched, coords, trace) = match &target {
        EventTarget::Window | EventTarget::Document => {
            debug!(subject = %target, "dispatching without actionability checks");
            let event = dispatch::build_event(&params.event_name, &params.init, None);
            let summary = dispatch::dispatch(deps.page, &ctx.route, &target, &event)?;
            (summary, None, None)
        }
        EventTarget::Element(node) => {
            let options = VerifyOptions {
                position: params.position,
                wait_for_animations: settings.wait_for_animations,
                animation_distance_threshold: settings.animation_distance_threshold,
                retry_interval: settings.retry_interval,
                frame_interval: settings.frame_interval,
                max_scroll_corrections: settings.max_scroll_corrections,
                scroll_behavior: opt.scroll_behavior,
                deadline,
                timeout_ms,
            };
            let mut on_ready = DispatchOnReady {
                page: deps.page,
                route: &ctx.route,
                action: &ctx.action_id,
                events: deps.events,
                metrics: deps.metrics,
                event_name: &params.event_name,
                init: &params.init,
                log: opt.log,
            };
            let verified = actionability::verify(
                deps.page,
                &ctx.route,
                node,
                &options,
                &ctx.cancel,
                &mut on_ready,
            )
            .await?;
            let trace = ActionabilityTrace {
                attempts: verified.attempts,
                scrolls: verified.scrolls,
            };
            (verified.output, Some(verified.coords), Some(trace))
        }
    };
    deps.events.emit_dispatched(&ctx.action_id, &dispatched);

    let assertions = assertions::verify_assertions(
        deps.page,
        &ctx.route,
        &target,
        &opt.expect,
        settings.retry_interval,
        deadline,
        &ctx.cancel,
    )
    .await?;
    for _ in 1..assertions.attempts {
        deps.metrics.record_retry(RetryPhase::Assertions);
    }

    if opt.log {
        deps.events
            .emit_snapshot(&ctx.action_id, &target, SnapshotPhase::After);
    }

    Ok(TriggerReport {
        ok: true,
        action_id: ctx.action_id.0.clone(),
        started_at,
        finished_at: Utc::now(),
        latency_ms: started.elapsed().as_millis() as u64,
        fast_path: coords.is_none(),
        coords,
        actionability: trace,
        dispatched,
        assertions,
    })
}

/// Delivers the event the moment the target is confirmed actionable.
struct DispatchOnReady<'a> {
    page: &'a dyn PagePort,
    route: &'a ExecRoute,
    action: &'a ActionId,
    events: &'a dyn EventsPort,
    metrics: &'a dyn MetricsPort,
    event_name: &'a str,
    init: &'a EventInit,
    log: bool,
}

impl ActionabilityCallbacks for DispatchOnReady<'_> {
    type Output = DispatchSummary;

    fn on_scroll(&mut self, node: &NodeId, behavior: ScrollBehavior) {
        self.metrics.record_scroll();
        self.events.emit_scrolled(self.action, node, behavior);
    }

    fn on_ready(
        &mut self,
        node: &NodeId,
        coords: &ResolvedCoordinates,
    ) -> Result<DispatchSummary, TriggerError> {
        if self.log {
            self.events.emit_marker(self.action, coords.from_window);
        }
        let event = dispatch::build_event(self.event_name, self.init, Some(coords));
        dispatch::dispatch(
            self.page,
            self.route,
            &EventTarget::Element(node.clone()),
            &event,
        )
    }

    fn on_retry(&mut self, _reason: &BlockReason) {
        self.metrics.record_retry(RetryPhase::Actionability);
    }
}
