use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soultrigger_core_types::{ActionId, ExecRoute, NodeId, Point, Rect, ScrollOffset, ViewportSize};

use crate::dispatch::SyntheticEvent;
use crate::errors::TriggerError;
use crate::model::{DispatchSummary, EventTarget, ScrollBehavior};

/// Read and write access to the page under automation.
///
/// Geometry is viewport-relative unless stated otherwise. `dispatch_event` is
/// synchronous so a readiness decision and the delivery it gates happen without
/// yielding to the page in between.
#[async_trait]
pub trait PagePort: Send + Sync {
    async fn visibility(&self, route: &ExecRoute, node: &NodeId) -> Result<Visibility, TriggerError>;
    async fn bounding_box(&self, route: &ExecRoute, node: &NodeId) -> Result<Rect, TriggerError>;
    async fn viewport(&self, route: &ExecRoute) -> Result<ViewportState, TriggerError>;
    async fn scroll_into_view(
        &self,
        route: &ExecRoute,
        node: &NodeId,
        behavior: ScrollBehavior,
    ) -> Result<(), TriggerError>;
    /// Topmost node painted at `point`, if any.
    async fn element_at_point(
        &self,
        route: &ExecRoute,
        point: Point,
    ) -> Result<Option<NodeId>, TriggerError>;
    /// How `other` sits in the tree relative to `node`.
    async fn relation(
        &self,
        route: &ExecRoute,
        node: &NodeId,
        other: &NodeId,
    ) -> Result<HitRelation, TriggerError>;
    async fn attribute(
        &self,
        route: &ExecRoute,
        target: &EventTarget,
        name: &str,
    ) -> Result<Option<String>, TriggerError>;
    /// Delivers the event and returns `false` when a handler cancelled it.
    fn dispatch_event(
        &self,
        route: &ExecRoute,
        target: &EventTarget,
        event: &SyntheticEvent,
    ) -> Result<bool, TriggerError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub size: ViewportSize,
    pub scroll: ScrollOffset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Visibility {
    Visible,
    Hidden(HiddenReason),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HiddenReason {
    ZeroSize,
    DisplayNone,
    VisibilityHidden,
    HiddenAncestor { ancestor: NodeId },
    ZeroSizeAncestor { ancestor: NodeId },
    Detached,
}

impl fmt::Display for HiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiddenReason::ZeroSize => f.write_str("it has an effective width or height of 0"),
            HiddenReason::DisplayNone => f.write_str("it has CSS property: display: none"),
            HiddenReason::VisibilityHidden => {
                f.write_str("it has CSS property: visibility: hidden")
            }
            HiddenReason::HiddenAncestor { ancestor } => {
                write!(f, "its ancestor {ancestor} is hidden")
            }
            HiddenReason::ZeroSizeAncestor { ancestor } => {
                write!(f, "its ancestor {ancestor} has an effective width or height of 0")
            }
            HiddenReason::Detached => f.write_str("it is detached from the document"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HitRelation {
    Same,
    Descendant,
    Ancestor,
    Unrelated,
}

impl HitRelation {
    /// Whether a hit with this relation still reaches the target.
    pub fn reaches_target(&self) -> bool {
        !matches!(self, HitRelation::Unrelated)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPhase {
    Before,
    After,
}

/// Observation hooks. Calls may happen inside the dispatch critical section,
/// so implementations must not block.
pub trait EventsPort: Send + Sync {
    fn emit_snapshot(&self, action: &ActionId, target: &EventTarget, phase: SnapshotPhase);
    fn emit_scrolled(&self, action: &ActionId, node: &NodeId, behavior: ScrollBehavior);
    fn emit_marker(&self, action: &ActionId, from_window: Point);
    fn emit_dispatched(&self, action: &ActionId, summary: &DispatchSummary);
    fn emit_finished(&self, action: &ActionId, ok: bool, error: Option<&TriggerError>);
}

pub trait MetricsPort: Send + Sync {
    fn record_ok(&self, latency_ms: u64);
    fn record_fail(&self, kind: &str);
    fn record_scroll(&self);
    fn record_retry(&self, phase: RetryPhase);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryPhase {
    Actionability,
    Assertions,
}

impl RetryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryPhase::Actionability => "actionability",
            RetryPhase::Assertions => "assertions",
        }
    }
}
