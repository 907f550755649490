//! Scripted in-memory page.
//!
//! Backs the scenario runner and the test suite. Geometry is kept in document
//! coordinates and projected through the current scroll offset, nodes paint in
//! `(z_index, depth, insertion)` order, and handler effects run synchronously
//! inside `dispatch_event`. Delayed effects are keyed on tokio time so paused
//! clocks drive them.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use soultrigger_core_types::{ExecRoute, NodeId, Point, Rect, ScrollOffset, ViewportSize};
use tokio::time::{Duration, Instant};
use tracing::trace;

use crate::dispatch::SyntheticEvent;
use crate::errors::TriggerError;
use crate::model::{EventTarget, ScrollBehavior};
use crate::ports::{HiddenReason, HitRelation, PagePort, ViewportState, Visibility};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStyle {
    #[default]
    Visible,
    DisplayNone,
    VisibilityHidden,
}

/// Handler side effect, run when the owning node receives the event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum HandlerEffect {
    /// Writes an attribute on `node`, or on the handler's owner when unset.
    SetAttr {
        #[serde(default)]
        node: Option<NodeId>,
        name: String,
        value: String,
        #[serde(default)]
        delay_ms: u64,
    },
    RemoveAttr {
        #[serde(default)]
        node: Option<NodeId>,
        name: String,
    },
    PreventDefault,
    Throw { message: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    /// Document coordinates, or viewport coordinates when `fixed`.
    pub rect: Rect,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub style: NodeStyle,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub fixed: bool,
    /// Successive boxes returned by geometry samples; the last one sticks.
    #[serde(default)]
    pub frames: Vec<Rect>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub handlers: BTreeMap<String, Vec<HandlerEffect>>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: NodeId::new(id),
            rect,
            parent: None,
            style: NodeStyle::Visible,
            z_index: 0,
            fixed: false,
            frames: Vec::new(),
            attrs: BTreeMap::new(),
            handlers: BTreeMap::new(),
        }
    }

    pub fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(NodeId::new(parent));
        self
    }

    pub fn styled(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn z(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn animated(mut self, frames: Vec<Rect>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, effect: HandlerEffect) -> Self {
        self.handlers.entry(event.into()).or_default().push(effect);
        self
    }

    fn rect_at(&self, sample: usize) -> Rect {
        self.frames
            .get(sample)
            .or_else(|| self.frames.last())
            .copied()
            .unwrap_or(self.rect)
    }
}

/// Viewport-fixed box that covers whatever is beneath it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub id: NodeId,
    pub rect: Rect,
    /// Number of hit tests the overlay survives; forever when unset.
    #[serde(default)]
    pub covers_for_probes: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSpec {
    pub attrs: BTreeMap<String, String>,
    pub handlers: BTreeMap<String, Vec<HandlerEffect>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PageScenario {
    pub viewport: ViewportSize,
    pub scroll: ScrollOffset,
    pub scrollable: bool,
    pub nodes: Vec<NodeSpec>,
    pub overlays: Vec<OverlaySpec>,
    pub window: GlobalSpec,
    pub document: GlobalSpec,
}

impl Default for PageScenario {
    fn default() -> Self {
        Self {
            viewport: ViewportSize::default(),
            scroll: ScrollOffset::default(),
            scrollable: true,
            nodes: Vec::new(),
            overlays: Vec::new(),
            window: GlobalSpec::default(),
            document: GlobalSpec::default(),
        }
    }
}

/// An event as the page received it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeliveredEvent {
    pub target: EventTarget,
    pub event: SyntheticEvent,
    pub not_cancelled: bool,
}

struct NodeState {
    spec: NodeSpec,
    samples: usize,
}

impl NodeState {
    fn current_rect(&self) -> Rect {
        self.spec.rect_at(self.samples.saturating_sub(1))
    }
}

struct PendingWrite {
    due: Instant,
    owner: EventTarget,
    name: String,
    value: String,
}

struct PageState {
    viewport: ViewportSize,
    scroll: ScrollOffset,
    scrollable: bool,
    nodes: Vec<NodeState>,
    overlays: Vec<OverlaySpec>,
    window: GlobalSpec,
    document: GlobalSpec,
    probes: u32,
    pending: Vec<PendingWrite>,
    delivered: Vec<DeliveredEvent>,
}

pub struct ScriptedPage {
    state: Mutex<PageState>,
}

impl ScriptedPage {
    pub fn new(viewport: ViewportSize) -> Self {
        Self::build(PageScenario {
            viewport,
            ..PageScenario::default()
        })
    }

    /// Builds a page after checking ids are unique and parents exist.
    pub fn from_scenario(scenario: PageScenario) -> Result<Self, TriggerError> {
        let mut seen = BTreeSet::new();
        for node in &scenario.nodes {
            if !seen.insert(&node.id) {
                return Err(TriggerError::Page(format!("duplicate node {}", node.id)));
            }
        }
        for node in &scenario.nodes {
            if let Some(parent) = &node.parent {
                if !seen.contains(parent) {
                    return Err(TriggerError::Page(format!(
                        "node {} names unknown parent {}",
                        node.id, parent
                    )));
                }
            }
        }
        Ok(Self::build(scenario))
    }

    fn build(scenario: PageScenario) -> Self {
        let nodes = scenario
            .nodes
            .into_iter()
            .map(|spec| NodeState { spec, samples: 0 })
            .collect();
        Self {
            state: Mutex::new(PageState {
                viewport: scenario.viewport,
                scroll: scenario.scroll,
                scrollable: scenario.scrollable,
                nodes,
                overlays: scenario.overlays,
                window: scenario.window,
                document: scenario.document,
                probes: 0,
                pending: Vec::new(),
                delivered: Vec::new(),
            }),
        }
    }

    pub fn with_node(self, node: NodeSpec) -> Self {
        self.state.lock().nodes.push(NodeState {
            spec: node,
            samples: 0,
        });
        self
    }

    pub fn with_overlay(self, overlay: OverlaySpec) -> Self {
        self.state.lock().overlays.push(overlay);
        self
    }

    pub fn with_scroll(self, scroll: ScrollOffset) -> Self {
        self.state.lock().scroll = scroll;
        self
    }

    /// Page ignores scroll requests.
    pub fn locked_scroll(self) -> Self {
        self.state.lock().scrollable = false;
        self
    }

    pub fn on_window(self, event: impl Into<String>, effect: HandlerEffect) -> Self {
        self.state
            .lock()
            .window
            .handlers
            .entry(event.into())
            .or_default()
            .push(effect);
        self
    }

    pub fn on_document(self, event: impl Into<String>, effect: HandlerEffect) -> Self {
        self.state
            .lock()
            .document
            .handlers
            .entry(event.into())
            .or_default()
            .push(effect);
        self
    }

    pub fn delivered(&self) -> Vec<DeliveredEvent> {
        self.state.lock().delivered.clone()
    }

    /// Number of hit tests performed so far.
    pub fn probe_count(&self) -> u32 {
        self.state.lock().probes
    }

    pub fn scroll_offset(&self) -> ScrollOffset {
        self.state.lock().scroll
    }
}

impl PageState {
    fn node(&self, id: &NodeId) -> Option<&NodeState> {
        self.nodes.iter().find(|node| &node.spec.id == id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeState> {
        self.nodes.iter_mut().find(|node| &node.spec.id == id)
    }

    fn require(&self, id: &NodeId) -> Result<&NodeState, TriggerError> {
        self.node(id)
            .ok_or_else(|| TriggerError::Page(format!("no node {id}")))
    }

    fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id).and_then(|node| node.spec.parent.clone());
        while let Some(parent) = cursor {
            if chain.contains(&parent) {
                break;
            }
            cursor = self.node(&parent).and_then(|node| node.spec.parent.clone());
            chain.push(parent);
        }
        chain
    }

    fn visibility_of(&self, id: &NodeId) -> Visibility {
        let Some(node) = self.node(id) else {
            return Visibility::Hidden(HiddenReason::Detached);
        };
        match node.spec.style {
            NodeStyle::DisplayNone => return Visibility::Hidden(HiddenReason::DisplayNone),
            NodeStyle::VisibilityHidden => {
                return Visibility::Hidden(HiddenReason::VisibilityHidden)
            }
            NodeStyle::Visible => {}
        }
        for ancestor in self.ancestors(id) {
            let Some(parent) = self.node(&ancestor) else {
                continue;
            };
            if parent.spec.style != NodeStyle::Visible {
                return Visibility::Hidden(HiddenReason::HiddenAncestor { ancestor });
            }
            if parent.spec.rect.is_empty() {
                return Visibility::Hidden(HiddenReason::ZeroSizeAncestor { ancestor });
            }
        }
        if node.spec.rect.is_empty() {
            return Visibility::Hidden(HiddenReason::ZeroSize);
        }
        Visibility::Visible
    }

    fn to_viewport(&self, fixed: bool, rect: Rect) -> Rect {
        if fixed {
            rect
        } else {
            rect.translate(-self.scroll.x, -self.scroll.y)
        }
    }

    fn flush_pending(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|write| write.due <= now);
        self.pending = waiting;
        for write in due {
            self.write_attr(&write.owner, write.name, Some(write.value));
        }
    }

    fn attrs_mut(&mut self, owner: &EventTarget) -> Option<&mut BTreeMap<String, String>> {
        match owner {
            EventTarget::Window => Some(&mut self.window.attrs),
            EventTarget::Document => Some(&mut self.document.attrs),
            EventTarget::Element(id) => self.node_mut(id).map(|node| &mut node.spec.attrs),
        }
    }

    fn write_attr(&mut self, owner: &EventTarget, name: String, value: Option<String>) {
        if let Some(attrs) = self.attrs_mut(owner) {
            match value {
                Some(value) => {
                    attrs.insert(name, value);
                }
                None => {
                    attrs.remove(&name);
                }
            }
        }
    }

    fn propagation_path(&self, target: &EventTarget, bubbles: bool) -> Vec<EventTarget> {
        let mut path = vec![target.clone()];
        if !bubbles {
            return path;
        }
        match target {
            EventTarget::Element(id) => {
                path.extend(self.ancestors(id).into_iter().map(EventTarget::Element));
                path.push(EventTarget::Document);
                path.push(EventTarget::Window);
            }
            EventTarget::Document => path.push(EventTarget::Window),
            EventTarget::Window => {}
        }
        path
    }

    fn handlers_for(&self, owner: &EventTarget, event: &str) -> Vec<HandlerEffect> {
        let handlers = match owner {
            EventTarget::Window => Some(&self.window.handlers),
            EventTarget::Document => Some(&self.document.handlers),
            EventTarget::Element(id) => self.node(id).map(|node| &node.spec.handlers),
        };
        handlers
            .and_then(|map| map.get(event))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PagePort for ScriptedPage {
    async fn visibility(&self, _route: &ExecRoute, node: &NodeId) -> Result<Visibility, TriggerError> {
        Ok(self.state.lock().visibility_of(node))
    }

    async fn bounding_box(&self, _route: &ExecRoute, node: &NodeId) -> Result<Rect, TriggerError> {
        let mut state = self.state.lock();
        let (fixed, rect) = {
            let entry = state
                .node_mut(node)
                .ok_or_else(|| TriggerError::Page(format!("no node {node}")))?;
            let rect = entry.spec.rect_at(entry.samples);
            entry.samples += 1;
            (entry.spec.fixed, rect)
        };
        Ok(state.to_viewport(fixed, rect))
    }

    async fn viewport(&self, _route: &ExecRoute) -> Result<ViewportState, TriggerError> {
        let state = self.state.lock();
        Ok(ViewportState {
            size: state.viewport,
            scroll: state.scroll,
        })
    }

    async fn scroll_into_view(
        &self,
        _route: &ExecRoute,
        node: &NodeId,
        behavior: ScrollBehavior,
    ) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        let entry = state.require(node)?;
        if !state.scrollable || entry.spec.fixed {
            trace!(%node, "scroll request ignored");
            return Ok(());
        }
        let rect = entry.current_rect();
        let viewport = state.viewport;
        let scroll = state.scroll;
        let y = match behavior {
            ScrollBehavior::Top => rect.y,
            ScrollBehavior::Center => rect.y + rect.height / 2.0 - viewport.height / 2.0,
            ScrollBehavior::Bottom => rect.y + rect.height - viewport.height,
            ScrollBehavior::Nearest => nearest(scroll.y, rect.y, rect.height, viewport.height),
        };
        let x = nearest(scroll.x, rect.x, rect.width, viewport.width);
        state.scroll = ScrollOffset::new(x.max(0.0), y.max(0.0));
        Ok(())
    }

    async fn element_at_point(
        &self,
        _route: &ExecRoute,
        point: Point,
    ) -> Result<Option<NodeId>, TriggerError> {
        let mut state = self.state.lock();
        state.probes += 1;
        let probes = state.probes;
        let overlay = state.overlays.iter().rev().find(|overlay| {
            overlay.covers_for_probes.map_or(true, |limit| probes <= limit)
                && overlay.rect.contains(&point)
        });
        if let Some(overlay) = overlay {
            return Ok(Some(overlay.id.clone()));
        }
        let top = state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(state.visibility_of(&node.spec.id), Visibility::Visible))
            .filter(|(_, node)| {
                state
                    .to_viewport(node.spec.fixed, node.current_rect())
                    .contains(&point)
            })
            .max_by_key(|(index, node)| {
                (
                    node.spec.z_index,
                    state.ancestors(&node.spec.id).len(),
                    *index,
                )
            })
            .map(|(_, node)| node.spec.id.clone());
        Ok(top)
    }

    async fn relation(
        &self,
        _route: &ExecRoute,
        node: &NodeId,
        other: &NodeId,
    ) -> Result<HitRelation, TriggerError> {
        if node == other {
            return Ok(HitRelation::Same);
        }
        let state = self.state.lock();
        if state.ancestors(other).contains(node) {
            return Ok(HitRelation::Descendant);
        }
        if state.ancestors(node).contains(other) {
            return Ok(HitRelation::Ancestor);
        }
        Ok(HitRelation::Unrelated)
    }

    async fn attribute(
        &self,
        _route: &ExecRoute,
        target: &EventTarget,
        name: &str,
    ) -> Result<Option<String>, TriggerError> {
        let mut state = self.state.lock();
        state.flush_pending(Instant::now());
        let value = match target {
            EventTarget::Window => state.window.attrs.get(name).cloned(),
            EventTarget::Document => state.document.attrs.get(name).cloned(),
            EventTarget::Element(id) => state.require(id)?.spec.attrs.get(name).cloned(),
        };
        Ok(value)
    }

    fn dispatch_event(
        &self,
        _route: &ExecRoute,
        target: &EventTarget,
        event: &SyntheticEvent,
    ) -> Result<bool, TriggerError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.flush_pending(now);

        let mut not_cancelled = true;
        let mut failure = None;
        'path: for owner in state.propagation_path(target, event.bubbles) {
            for effect in state.handlers_for(&owner, &event.name) {
                match effect {
                    HandlerEffect::SetAttr {
                        node,
                        name,
                        value,
                        delay_ms,
                    } => {
                        let write_to = node.map(EventTarget::Element).unwrap_or(owner.clone());
                        if delay_ms == 0 {
                            state.write_attr(&write_to, name, Some(value));
                        } else {
                            state.pending.push(PendingWrite {
                                due: now + Duration::from_millis(delay_ms),
                                owner: write_to,
                                name,
                                value,
                            });
                        }
                    }
                    HandlerEffect::RemoveAttr { node, name } => {
                        let write_to = node.map(EventTarget::Element).unwrap_or(owner.clone());
                        state.write_attr(&write_to, name, None);
                    }
                    HandlerEffect::PreventDefault => {
                        if event.cancelable {
                            not_cancelled = false;
                        }
                    }
                    HandlerEffect::Throw { message } => {
                        failure = Some(message);
                        break 'path;
                    }
                }
            }
        }

        state.delivered.push(DeliveredEvent {
            target: target.clone(),
            event: event.clone(),
            not_cancelled,
        });
        match failure {
            Some(message) => Err(TriggerError::HandlerFailed(message)),
            None => Ok(not_cancelled),
        }
    }
}

fn nearest(current: f64, start: f64, extent: f64, visible: f64) -> f64 {
    if start < current {
        start
    } else if start + extent > current + visible {
        start + extent - visible
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> ExecRoute {
        ExecRoute::detached()
    }

    #[tokio::test]
    async fn descendants_paint_over_parents() {
        let page = ScriptedPage::new(ViewportSize::new(800.0, 600.0))
            .with_node(NodeSpec::new("form", Rect::new(0.0, 0.0, 400.0, 400.0)))
            .with_node(NodeSpec::new("label", Rect::new(10.0, 10.0, 50.0, 20.0)).child_of("form"));
        let hit = page
            .element_at_point(&route(), Point::new(20.0, 15.0))
            .await
            .unwrap();
        assert_eq!(hit, Some(NodeId::new("label")));
        let relation = page
            .relation(&route(), &NodeId::new("form"), &NodeId::new("label"))
            .await
            .unwrap();
        assert_eq!(relation, HitRelation::Descendant);
    }

    #[tokio::test]
    async fn hidden_ancestor_hides_children() {
        let page = ScriptedPage::new(ViewportSize::default())
            .with_node(
                NodeSpec::new("menu", Rect::new(0.0, 0.0, 100.0, 100.0))
                    .styled(NodeStyle::DisplayNone),
            )
            .with_node(NodeSpec::new("item", Rect::new(0.0, 0.0, 100.0, 20.0)).child_of("menu"));
        let visibility = page.visibility(&route(), &NodeId::new("item")).await.unwrap();
        assert_eq!(
            visibility,
            Visibility::Hidden(HiddenReason::HiddenAncestor {
                ancestor: NodeId::new("menu")
            })
        );
    }

    #[tokio::test]
    async fn collapsed_ancestor_hides_children() {
        let page = ScriptedPage::new(ViewportSize::default())
            .with_node(NodeSpec::new("drawer", Rect::new(0.0, 0.0, 240.0, 0.0)))
            .with_node(NodeSpec::new("entry", Rect::new(0.0, 0.0, 240.0, 24.0)).child_of("drawer"));
        let visibility = page.visibility(&route(), &NodeId::new("entry")).await.unwrap();
        assert_eq!(
            visibility,
            Visibility::Hidden(HiddenReason::ZeroSizeAncestor {
                ancestor: NodeId::new("drawer")
            })
        );
    }

    #[tokio::test]
    async fn scroll_projects_document_geometry() {
        let page = ScriptedPage::new(ViewportSize::new(800.0, 600.0))
            .with_node(NodeSpec::new("footer", Rect::new(0.0, 1500.0, 800.0, 100.0)));
        page.scroll_into_view(&route(), &NodeId::new("footer"), ScrollBehavior::Top)
            .await
            .unwrap();
        assert_eq!(page.scroll_offset(), ScrollOffset::new(0.0, 1500.0));
        let rect = page
            .bounding_box(&route(), &NodeId::new("footer"))
            .await
            .unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 800.0, 100.0));
    }

    #[test]
    fn scenario_rejects_unknown_parent() {
        let scenario = PageScenario {
            nodes: vec![NodeSpec::new("a", Rect::new(0.0, 0.0, 1.0, 1.0)).child_of("ghost")],
            ..PageScenario::default()
        };
        assert!(matches!(
            ScriptedPage::from_scenario(scenario),
            Err(TriggerError::Page(_))
        ));
    }
}
