//! Polls an element until it can receive an interaction, then hands control
//! to the caller's `on_ready` without yielding.

use std::fmt;
use std::time::Duration;

use soultrigger_core_types::{ExecRoute, NodeId, Point, Rect};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::coords::{self, PositionSpec, ResolvedCoordinates};
use crate::errors::TriggerError;
use crate::model::ScrollBehavior;
use crate::ports::{HiddenReason, PagePort, Visibility};

/// Why the latest probe did not reach readiness.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockReason {
    OutOfView { point: Point },
    Animating { distance: f64 },
    Covered { by: Option<NodeId> },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::OutOfView { point } => write!(
                f,
                "point ({}, {}) is outside the viewport after scrolling",
                point.x, point.y
            ),
            BlockReason::Animating { distance } => {
                write!(f, "element is animating (moved {distance:.1}px in one frame)")
            }
            BlockReason::Covered { by: Some(node) } => {
                write!(f, "element is covered by another element: {node}")
            }
            BlockReason::Covered { by: None } => {
                f.write_str("no element is painted at the interaction point")
            }
        }
    }
}

/// Tunables for one verification run.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    pub position: PositionSpec,
    pub wait_for_animations: bool,
    pub animation_distance_threshold: f64,
    pub retry_interval: Duration,
    pub frame_interval: Duration,
    pub max_scroll_corrections: u32,
    pub scroll_behavior: ScrollBehavior,
    pub deadline: Instant,
    /// Budget reported on timeout.
    pub timeout_ms: u64,
}

/// Hooks invoked while verifying. `on_ready` runs at most once per run.
pub trait ActionabilityCallbacks {
    type Output;

    fn on_scroll(&mut self, node: &NodeId, behavior: ScrollBehavior);

    fn on_ready(
        &mut self,
        node: &NodeId,
        coords: &ResolvedCoordinates,
    ) -> Result<Self::Output, TriggerError>;

    fn on_retry(&mut self, _reason: &BlockReason) {}
}

#[derive(Debug)]
pub struct Verified<T> {
    pub output: T,
    pub coords: ResolvedCoordinates,
    pub attempts: u32,
    pub scrolls: u32,
}

enum Probe {
    Ready(ResolvedCoordinates),
    NeedsScroll(ResolvedCoordinates),
    Blocked(BlockReason, ResolvedCoordinates),
}

/// Retries until `node` is actionable, then returns what `on_ready` produced.
///
/// Hidden or zero-size elements fail immediately. Scrolling, animation and
/// coverage are retried until the deadline; the last wait is shortened so one
/// final probe lands on the deadline itself.
pub async fn verify<C>(
    page: &dyn PagePort,
    route: &ExecRoute,
    node: &NodeId,
    options: &VerifyOptions,
    cancel: &CancellationToken,
    callbacks: &mut C,
) -> Result<Verified<C::Output>, TriggerError>
where
    C: ActionabilityCallbacks + Send,
{
    let mut attempts = 0u32;
    let mut scrolls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(TriggerError::Cancelled);
        }
        attempts += 1;

        let (reason, last_coords) = match probe(page, route, node, options, cancel).await? {
            Probe::Ready(coords) => {
                debug!(%node, attempts, scrolls, "element actionable");
                let output = callbacks.on_ready(node, &coords)?;
                return Ok(Verified {
                    output,
                    coords,
                    attempts,
                    scrolls,
                });
            }
            Probe::NeedsScroll(_) if scrolls < options.max_scroll_corrections => {
                page.scroll_into_view(route, node, options.scroll_behavior)
                    .await?;
                scrolls += 1;
                callbacks.on_scroll(node, options.scroll_behavior);
                debug!(%node, scrolls, "scrolled element into view");
                continue;
            }
            Probe::NeedsScroll(coords) => (
                BlockReason::OutOfView {
                    point: coords.from_viewport,
                },
                coords,
            ),
            Probe::Blocked(reason, coords) => (reason, coords),
        };

        trace!(%node, attempts, %reason, "element not actionable yet");
        callbacks.on_retry(&reason);

        let now = Instant::now();
        if now >= options.deadline {
            return Err(TriggerError::ActionabilityTimeout {
                reason,
                timeout_ms: options.timeout_ms,
                last_coords: Some(last_coords),
            });
        }
        let pause = options.retry_interval.min(options.deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(TriggerError::Cancelled),
            _ = sleep(pause) => {}
        }
    }
}

async fn probe(
    page: &dyn PagePort,
    route: &ExecRoute,
    node: &NodeId,
    options: &VerifyOptions,
    cancel: &CancellationToken,
) -> Result<Probe, TriggerError> {
    if let Visibility::Hidden(reason) = page.visibility(route, node).await? {
        return Err(TriggerError::NotVisible { reason });
    }
    let mut rect = page.bounding_box(route, node).await?;
    if rect.is_empty() {
        return Err(TriggerError::NotVisible {
            reason: HiddenReason::ZeroSize,
        });
    }
    let viewport = page.viewport(route).await?;
    let mut coords = coords::resolve(&rect, &viewport.scroll, &options.position)?;
    if !viewport.size.bounds().contains(&coords.from_viewport) {
        return Ok(Probe::NeedsScroll(coords));
    }

    if options.wait_for_animations {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TriggerError::Cancelled),
            _ = sleep(options.frame_interval) => {}
        }
        let next = page.bounding_box(route, node).await?;
        let distance = travel(&rect, &next);
        if distance > options.animation_distance_threshold {
            return Ok(Probe::Blocked(BlockReason::Animating { distance }, coords));
        }
        rect = next;
        coords = coords::resolve(&rect, &viewport.scroll, &options.position)?;
    }

    let hit = page.element_at_point(route, coords.from_viewport).await?;
    let Some(hit) = hit else {
        return Ok(Probe::Blocked(BlockReason::Covered { by: None }, coords));
    };
    if &hit != node && !page.relation(route, node, &hit).await?.reaches_target() {
        return Ok(Probe::Blocked(BlockReason::Covered { by: Some(hit) }, coords));
    }
    Ok(Probe::Ready(coords))
}

fn travel(before: &Rect, after: &Rect) -> f64 {
    before.origin().distance_to(&after.origin())
}
