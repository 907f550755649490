use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::apply_override_to_snapshot;
use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};

const ENV_PREFIX: &str = "SOUL_POLICY__";
const ENV_JSON: &str = "SOUL_POLICY_OVERRIDE_JSON";
const ENV_CLI_OVERRIDES: &str = "SOUL_POLICY_CLI_OVERRIDES";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    load_snapshot_from_vars(options, env::vars())
}

/// Same layering as [`load_snapshot_with_options`] with an explicit variable set.
pub fn load_snapshot_from_vars(
    options: &LoadOptions,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<PolicySnapshot, PolicyError> {
    let vars: HashMap<String, String> = vars.into_iter().collect();
    let mut snapshot = default_snapshot();
    bootstrap_builtin_provenance(&mut snapshot)?;

    for path in &options.paths {
        if path.exists() {
            let overlay = overlays_from_file(path)?;
            apply_overlays(&mut snapshot, overlay)?;
        } else {
            warn!(path = %path.display(), "policy file not found; skipping");
        }
    }

    if options.include_env {
        let env_overlays = overlays_from_env(&vars)?;
        apply_overlays(&mut snapshot, env_overlays)?;
    }

    if options.include_cli_env {
        let cli_overlays = overlays_from_cli_env(&vars);
        apply_overlays(&mut snapshot, cli_overlays)?;
    }

    snapshot.validate()?;
    Ok(snapshot)
}

struct PolicyOverlay {
    path: String,
    value: Value,
    source: PolicySource,
}

fn apply_overlays(
    snapshot: &mut PolicySnapshot,
    overlays: Vec<PolicyOverlay>,
) -> Result<(), PolicyError> {
    for overlay in overlays {
        if apply_override_to_snapshot(snapshot, &overlay.path, &overlay.value, overlay.source)? {
            snapshot.rev = snapshot.rev.saturating_add(1);
        }
    }
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<PolicyOverlay>, PolicyError> {
    let content = fs::read_to_string(path).map_err(|err| PolicyError::Io(format!("{}", err)))?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
    debug!(path = %path.display(), "loaded policy file");
    Ok(flatten_value(json_value, None, PolicySource::File))
}

fn overlays_from_env(vars: &HashMap<String, String>) -> Result<Vec<PolicyOverlay>, PolicyError> {
    let mut overlays = Vec::new();
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(PolicyOverlay {
                path,
                value: parse_env_value(&vars[key]),
                source: PolicySource::Env,
            });
        }
    }

    if let Some(raw_json) = vars.get(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(raw_json)
                .map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
            overlays.extend(flatten_value(json_value, None, PolicySource::Env));
        }
    }

    Ok(overlays)
}

fn overlays_from_cli_env(vars: &HashMap<String, String>) -> Vec<PolicyOverlay> {
    let mut overlays = Vec::new();
    let Some(raw) = vars.get(ENV_CLI_OVERRIDES) else {
        return overlays;
    };
    for token in raw.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (path, value_raw) = trimmed.split_once('=').unwrap_or((trimmed, ""));
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        overlays.push(PolicyOverlay {
            path: path.to_string(),
            value: parse_env_value(value_raw.trim()),
            source: PolicySource::Cli,
        });
    }
    overlays
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>, source: PolicySource) -> Vec<PolicyOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix), source));
            }
            result
        }
        other => match prefix {
            Some(prefix) => vec![PolicyOverlay {
                path: prefix,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}

fn bootstrap_builtin_provenance(snapshot: &mut PolicySnapshot) -> Result<(), PolicyError> {
    let overlays = flatten_value(
        serde_json::to_value(&snapshot.trigger)
            .map_err(|err| PolicyError::Invalid(format!("{}", err)))?,
        Some("trigger".into()),
        PolicySource::Builtin,
    );
    for overlay in overlays {
        snapshot.set_provenance(&overlay.path, overlay.source);
    }
    Ok(())
}
