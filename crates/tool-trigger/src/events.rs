use parking_lot::Mutex;
use serde::Serialize;
use soultrigger_core_types::{ActionId, NodeId, Point};
use tracing::{debug, info};

use crate::errors::TriggerError;
use crate::model::{DispatchSummary, EventTarget, ScrollBehavior};
use crate::ports::{EventsPort, SnapshotPhase};

/// Writes every hook to the tracing pipeline.
#[derive(Clone, Debug, Default)]
pub struct TracingEvents;

impl EventsPort for TracingEvents {
    fn emit_snapshot(&self, action: &ActionId, target: &EventTarget, phase: SnapshotPhase) {
        debug!(action_id = %action.0, subject = %target, ?phase, "snapshot");
    }

    fn emit_scrolled(&self, action: &ActionId, node: &NodeId, behavior: ScrollBehavior) {
        debug!(action_id = %action.0, %node, ?behavior, "scrolled into view");
    }

    fn emit_marker(&self, action: &ActionId, from_window: Point) {
        debug!(action_id = %action.0, x = from_window.x, y = from_window.y, "hit marker");
    }

    fn emit_dispatched(&self, action: &ActionId, summary: &DispatchSummary) {
        info!(
            action_id = %action.0,
            event = %summary.event_name,
            subject = %summary.target,
            not_cancelled = summary.not_cancelled,
            "event delivered"
        );
    }

    fn emit_finished(&self, action: &ActionId, ok: bool, error: Option<&TriggerError>) {
        match error {
            Some(err) => debug!(action_id = %action.0, ok, error = %err, "trigger finished"),
            None => debug!(action_id = %action.0, ok, "trigger finished"),
        }
    }
}

/// One observed hook, in call order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum ObservedEvent {
    Snapshot { phase: SnapshotPhase },
    Scrolled { node: NodeId, behavior: ScrollBehavior },
    Marker { at: Point },
    Dispatched { event: String, target: EventTarget, not_cancelled: bool },
    Finished { ok: bool, error: Option<String> },
}

/// Keeps hooks in memory for inspection after a run.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    log: Mutex<Vec<ObservedEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.log.lock().clone()
    }

    pub fn scroll_count(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|event| matches!(event, ObservedEvent::Scrolled { .. }))
            .count()
    }

    fn push(&self, event: ObservedEvent) {
        self.log.lock().push(event);
    }
}

impl EventsPort for RecordingEvents {
    fn emit_snapshot(&self, _action: &ActionId, _target: &EventTarget, phase: SnapshotPhase) {
        self.push(ObservedEvent::Snapshot { phase });
    }

    fn emit_scrolled(&self, _action: &ActionId, node: &NodeId, behavior: ScrollBehavior) {
        self.push(ObservedEvent::Scrolled {
            node: node.clone(),
            behavior,
        });
    }

    fn emit_marker(&self, _action: &ActionId, from_window: Point) {
        self.push(ObservedEvent::Marker { at: from_window });
    }

    fn emit_dispatched(&self, _action: &ActionId, summary: &DispatchSummary) {
        self.push(ObservedEvent::Dispatched {
            event: summary.event_name.clone(),
            target: summary.target.clone(),
            not_cancelled: summary.not_cancelled,
        });
    }

    fn emit_finished(&self, _action: &ActionId, ok: bool, error: Option<&TriggerError>) {
        self.push(ObservedEvent::Finished {
            ok,
            error: error.map(ToString::to_string),
        });
    }
}
