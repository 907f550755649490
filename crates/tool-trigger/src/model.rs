use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use soultrigger_core_types::{ActionId, ExecRoute, NodeId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::assertions::{AssertionTrace, ExpectationSet};
use crate::coords::{PositionArg, PositionSpec, ResolvedCoordinates};
use crate::errors::TriggerError;

/// Execution context delivered by the scheduler.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    pub action_id: ActionId,
    pub route: ExecRoute,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl ExecCtx {
    pub fn new(
        action_id: ActionId,
        route: ExecRoute,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            action_id,
            route,
            deadline,
            cancel,
        }
    }

    /// Context whose scheduler deadline is `budget` from now.
    pub fn with_budget(route: ExecRoute, budget: Duration) -> Self {
        Self::new(
            ActionId::new(),
            route,
            Instant::now() + budget,
            CancellationToken::new(),
        )
    }
}

/// Subject of a trigger as classified by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelection {
    Window,
    Document,
    Elements(Vec<NodeId>),
}

impl TargetSelection {
    pub fn element(node: impl Into<String>) -> Self {
        TargetSelection::Elements(vec![NodeId::new(node)])
    }

    /// Narrows the selection to the one node the event will be delivered to.
    pub fn resolve(&self) -> Result<EventTarget, TriggerError> {
        match self {
            TargetSelection::Window => Ok(EventTarget::Window),
            TargetSelection::Document => Ok(EventTarget::Document),
            TargetSelection::Elements(nodes) => match nodes.as_slice() {
                [] => Err(TriggerError::EmptyTarget),
                [only] => Ok(EventTarget::Element(only.clone())),
                many => Err(TriggerError::AmbiguousTarget { count: many.len() }),
            },
        }
    }
}

/// Concrete node an event is delivered to.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTarget {
    Window,
    Document,
    Element(NodeId),
}

impl EventTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            EventTarget::Window => "window",
            EventTarget::Document => "document",
            EventTarget::Element(_) => "element",
        }
    }
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTarget::Window => f.write_str("window"),
            EventTarget::Document => f.write_str("document"),
            EventTarget::Element(node) => write!(f, "{node}"),
        }
    }
}

/// Event payload supplied by the caller. Recognized fields are typed; anything
/// else passes through to the event untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bubbles: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_y: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventInit {
    pub fn with_client(mut self, x: f64, y: f64) -> Self {
        self.client_x = Some(x);
        self.client_y = Some(y);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Parameters for executing a trigger.
#[derive(Clone, Debug)]
pub struct TriggerParams {
    pub target: TargetSelection,
    pub event_name: String,
    pub position: PositionSpec,
    pub init: EventInit,
}

impl TriggerParams {
    pub fn new(target: TargetSelection, event_name: impl Into<String>) -> Self {
        Self {
            target,
            event_name: event_name.into(),
            position: PositionSpec::Default,
            init: EventInit::default(),
        }
    }

    pub fn at(mut self, position: PositionSpec) -> Self {
        self.position = position;
        self
    }

    pub fn with_init(mut self, init: EventInit) -> Self {
        self.init = init;
        self
    }

    /// Builds parameters from an untyped request, rejecting a non-string event name.
    pub fn from_value(raw: &Value) -> Result<Self, TriggerError> {
        let request: RawTriggerRequest = serde_json::from_value(raw.clone())
            .map_err(|err| TriggerError::InvalidArgument {
                got: format!("malformed request ({err})"),
            })?;
        let event_name = match request.event {
            Value::String(name) => name,
            other => return Err(TriggerError::InvalidArgument { got: other.to_string() }),
        };
        Ok(Self {
            target: request.target,
            event_name,
            position: position_from_request(request.position, request.y)?,
            init: request.fields,
        })
    }
}

/// Accepts `position` as an anchor name, an `{x, y}` object, or a bare x
/// paired with a sibling `y`.
fn position_from_request(
    position: Option<Value>,
    y: Option<f64>,
) -> Result<PositionSpec, TriggerError> {
    let first = match position {
        None => None,
        Some(Value::String(name)) => Some(PositionArg::Name(name)),
        Some(Value::Number(x)) => Some(PositionArg::X(
            x.as_f64()
                .ok_or_else(|| TriggerError::InvalidPosition(x.to_string()))?,
        )),
        Some(offset @ Value::Object(_)) if y.is_none() => {
            return serde_json::from_value(offset)
                .map_err(|err| TriggerError::InvalidPosition(err.to_string()));
        }
        Some(other) => return Err(TriggerError::InvalidPosition(other.to_string())),
    };
    PositionSpec::from_arguments(first, y)
}

#[derive(Debug, Deserialize)]
struct RawTriggerRequest {
    target: TargetSelection,
    #[serde(default)]
    event: Value,
    #[serde(default)]
    position: Option<Value>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    fields: EventInit,
}

/// Scroll alignment used when the target has to be brought into view.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    #[default]
    Top,
    Center,
    Bottom,
    Nearest,
}

/// Per-call control options. Unset fields fall back to the policy.
#[derive(Clone, Debug)]
pub struct TriggerOpt {
    pub timeout_ms: Option<u64>,
    pub wait_for_animations: Option<bool>,
    pub animation_distance_threshold: Option<f64>,
    pub scroll_behavior: ScrollBehavior,
    /// Emit snapshot and marker hooks.
    pub log: bool,
    pub expect: ExpectationSet,
}

impl Default for TriggerOpt {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            wait_for_animations: None,
            animation_distance_threshold: None,
            scroll_behavior: ScrollBehavior::default(),
            log: true,
            expect: ExpectationSet::default(),
        }
    }
}

/// What was delivered, for observers and the report.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchSummary {
    pub event_name: String,
    pub target: EventTarget,
    pub fields: Map<String, Value>,
    pub not_cancelled: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ActionabilityTrace {
    pub attempts: u32,
    pub scrolls: u32,
}

/// Outcome of the trigger execution.
#[derive(Clone, Debug, Serialize)]
pub struct TriggerReport {
    pub ok: bool,
    pub action_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub fast_path: bool,
    pub coords: Option<ResolvedCoordinates>,
    pub actionability: Option<ActionabilityTrace>,
    pub dispatched: DispatchSummary,
    pub assertions: AssertionTrace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selection_cardinality() {
        assert!(matches!(
            TargetSelection::Elements(vec![]).resolve(),
            Err(TriggerError::EmptyTarget)
        ));
        assert!(matches!(
            TargetSelection::Elements(vec![NodeId::new("a"), NodeId::new("b")]).resolve(),
            Err(TriggerError::AmbiguousTarget { count: 2 })
        ));
        assert_eq!(
            TargetSelection::element("a").resolve().unwrap(),
            EventTarget::Element(NodeId::new("a"))
        );
        assert_eq!(
            TargetSelection::Document.resolve().unwrap(),
            EventTarget::Document
        );
    }

    #[test]
    fn event_init_splits_known_and_extra_fields() {
        let init: EventInit = serde_json::from_value(json!({
            "clientX": 10,
            "bubbles": false,
            "detail": {"source": "test"},
            "key": "Enter"
        }))
        .unwrap();
        assert_eq!(init.client_x, Some(10.0));
        assert_eq!(init.bubbles, Some(false));
        assert_eq!(init.extra.len(), 2);
        assert_eq!(init.extra["key"], json!("Enter"));
    }

    #[test]
    fn untyped_request_requires_string_event() {
        let err = TriggerParams::from_value(&json!({
            "target": {"elements": ["btn"]},
            "event": 42
        }))
        .unwrap_err();
        assert!(matches!(err, TriggerError::InvalidArgument { got } if got == "42"));

        let params = TriggerParams::from_value(&json!({
            "target": "window",
            "event": "resize",
            "position": "topLeft",
            "fields": {"detail": 1}
        }))
        .unwrap();
        assert_eq!(params.target, TargetSelection::Window);
        assert_eq!(params.event_name, "resize");
        assert_eq!(params.init.extra["detail"], json!(1));
    }

    #[test]
    fn position_arguments_are_normalized() {
        let request = |extra: Value| {
            let mut raw = json!({"target": "window", "event": "click"});
            if let (Value::Object(raw), Value::Object(extra)) = (&mut raw, extra) {
                raw.extend(extra);
            }
            TriggerParams::from_value(&raw)
        };

        assert_eq!(request(json!({})).unwrap().position, PositionSpec::Default);
        assert_eq!(
            request(json!({"position": 3, "y": 4})).unwrap().position,
            PositionSpec::Offset { x: 3.0, y: 4.0 }
        );
        assert_eq!(
            request(json!({"position": {"x": 1, "y": 2}})).unwrap().position,
            PositionSpec::Offset { x: 1.0, y: 2.0 }
        );
        assert!(matches!(
            request(json!({"position": "middle"})),
            Err(TriggerError::InvalidPosition(name)) if name == "middle"
        ));
        assert!(matches!(
            request(json!({"position": 3})),
            Err(TriggerError::InvalidPosition(_))
        ));
        assert!(matches!(
            request(json!({"position": "top", "y": 4})),
            Err(TriggerError::InvalidPosition(_))
        ));
    }

    #[test]
    fn missing_event_is_invalid_argument() {
        let err = TriggerParams::from_value(&json!({"target": "document"})).unwrap_err();
        assert!(matches!(err, TriggerError::InvalidArgument { got } if got == "null"));
    }
}
