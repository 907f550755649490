use serde_json::Value;
use tracing::debug;

use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};

/// Applies one dot-path override and bumps the revision when the value changed.
pub fn apply_override(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<bool, PolicyError> {
    let changed = apply_override_to_snapshot(snapshot, path, value, source)?;
    if changed {
        snapshot.rev = snapshot.rev.saturating_add(1);
    }
    Ok(changed)
}

pub(crate) fn apply_override_to_snapshot(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<bool, PolicyError> {
    let trigger = &mut snapshot.trigger;
    let changed = match path {
        "trigger.enabled" => merge(&mut trigger.enabled, to_bool(value)?),
        "trigger.wait_for_animations" => merge(&mut trigger.wait_for_animations, to_bool(value)?),
        "trigger.animation_distance_threshold" => merge(
            &mut trigger.animation_distance_threshold,
            to_f64(value)?,
        ),
        "trigger.timeout_ms" => merge(&mut trigger.timeout_ms, to_u64(value)?),
        "trigger.retry_interval_ms" => merge(&mut trigger.retry_interval_ms, to_u64(value)?),
        "trigger.frame_interval_ms" => merge(&mut trigger.frame_interval_ms, to_u64(value)?),
        "trigger.max_scroll_corrections" => {
            merge(&mut trigger.max_scroll_corrections, to_u32(value)?)
        }
        path => return Err(PolicyError::UnsupportedPath(path.to_string())),
    };
    // Recorded for no-op writes too: the last layer that named a path owns it.
    snapshot.set_provenance(path, source);
    debug!(path, ?source, changed, "policy overlay applied");
    Ok(changed)
}

fn merge<T: PartialEq>(target: &mut T, candidate: T) -> bool {
    if *target == candidate {
        return false;
    }
    *target = candidate;
    true
}

fn to_u64(value: &Value) -> Result<u64, PolicyError> {
    value
        .as_u64()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected unsigned integer, got {value}")))
}

fn to_u32(value: &Value) -> Result<u32, PolicyError> {
    to_u64(value).and_then(|v| {
        u32::try_from(v).map_err(|_| PolicyError::InvalidValue(format!("value {v} exceeds u32")))
    })
}

fn to_f64(value: &Value) -> Result<f64, PolicyError> {
    value
        .as_f64()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected number, got {value}")))
}

fn to_bool(value: &Value) -> Result<bool, PolicyError> {
    value
        .as_bool()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected bool, got {value}")))
}
