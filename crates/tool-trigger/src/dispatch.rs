//! Synthetic event construction and delivery.

use serde::Serialize;
use serde_json::{Map, Value};
use soultrigger_core_types::ExecRoute;
use tracing::debug;

use crate::coords::ResolvedCoordinates;
use crate::errors::TriggerError;
use crate::model::{DispatchSummary, EventInit, EventTarget};
use crate::ports::PagePort;

pub const CLIENT_X: &str = "clientX";
pub const CLIENT_Y: &str = "clientY";
pub const SCREEN_X: &str = "screenX";
pub const SCREEN_Y: &str = "screenY";
pub const PAGE_X: &str = "pageX";
pub const PAGE_Y: &str = "pageY";

/// Fully merged event handed to the page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyntheticEvent {
    pub name: String,
    pub bubbles: bool,
    pub cancelable: bool,
    pub fields: Map<String, Value>,
}

impl SyntheticEvent {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }
}

/// Merges event fields. Caller values beat coordinate-derived values, which
/// beat the defaults (`bubbles` and `cancelable` both true).
pub fn build_event(
    name: &str,
    init: &EventInit,
    coords: Option<&ResolvedCoordinates>,
) -> SyntheticEvent {
    let mut fields = Map::new();
    if let Some(coords) = coords {
        // Screen coordinates mirror the viewport frame.
        let viewport = coords.from_viewport;
        let window = coords.from_window;
        for (key, value) in [
            (CLIENT_X, viewport.x),
            (CLIENT_Y, viewport.y),
            (SCREEN_X, viewport.x),
            (SCREEN_Y, viewport.y),
            (PAGE_X, window.x),
            (PAGE_Y, window.y),
        ] {
            fields.insert(key.to_string(), number(value));
        }
    }

    for (key, value) in [
        (CLIENT_X, init.client_x),
        (CLIENT_Y, init.client_y),
        (SCREEN_X, init.screen_x),
        (SCREEN_Y, init.screen_y),
        (PAGE_X, init.page_x),
        (PAGE_Y, init.page_y),
    ] {
        if let Some(value) = value {
            fields.insert(key.to_string(), number(value));
        }
    }
    for (key, value) in &init.extra {
        fields.insert(key.clone(), value.clone());
    }

    SyntheticEvent {
        name: name.to_string(),
        bubbles: init.bubbles.unwrap_or(true),
        cancelable: init.cancelable.unwrap_or(true),
        fields,
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Delivers `event` to `target` and summarizes the outcome.
pub fn dispatch(
    page: &dyn PagePort,
    route: &ExecRoute,
    target: &EventTarget,
    event: &SyntheticEvent,
) -> Result<DispatchSummary, TriggerError> {
    let not_cancelled = page.dispatch_event(route, target, event)?;
    debug!(
        event = %event.name,
        subject = %target,
        bubbles = event.bubbles,
        cancelable = event.cancelable,
        not_cancelled,
        "event dispatched"
    );
    let mut fields = event.fields.clone();
    fields.insert("bubbles".into(), Value::Bool(event.bubbles));
    fields.insert("cancelable".into(), Value::Bool(event.cancelable));
    Ok(DispatchSummary {
        event_name: event.name.clone(),
        target: target.clone(),
        fields,
        not_cancelled,
    })
}
