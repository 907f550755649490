use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub trigger: TriggerPolicy,
    #[serde(default)]
    pub provenance: BTreeMap<String, PolicyProvenance>,
}

/// Knobs consumed by the trigger tool. Field names double as the dot-path
/// suffix used by overlays (`trigger.<field>`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TriggerPolicy {
    pub enabled: bool,
    pub wait_for_animations: bool,
    /// Pixel displacement between two frame samples above which the target counts as animating.
    pub animation_distance_threshold: f64,
    pub timeout_ms: u64,
    pub retry_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub max_scroll_corrections: u32,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_for_animations: true,
            animation_distance_threshold: 5.0,
            timeout_ms: 4_000,
            retry_interval_ms: 50,
            frame_interval_ms: 16,
            max_scroll_corrections: 3,
        }
    }
}

impl TriggerPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
}

impl PolicySnapshot {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }

    pub fn source_of(&self, path: &str) -> Option<PolicySource> {
        self.provenance.get(path).map(|entry| entry.source)
    }

    /// Rejects combinations the retry loops cannot make progress with.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let trigger = &self.trigger;
        if trigger.timeout_ms == 0 {
            return Err(PolicyError::Invalid("trigger.timeout_ms must be > 0".into()));
        }
        if trigger.retry_interval_ms == 0 {
            return Err(PolicyError::Invalid(
                "trigger.retry_interval_ms must be > 0".into(),
            ));
        }
        if trigger.frame_interval_ms == 0 {
            return Err(PolicyError::Invalid(
                "trigger.frame_interval_ms must be > 0".into(),
            ));
        }
        if !trigger.animation_distance_threshold.is_finite()
            || trigger.animation_distance_threshold < 0.0
        {
            return Err(PolicyError::Invalid(format!(
                "trigger.animation_distance_threshold must be a non-negative number, got {}",
                trigger.animation_distance_threshold
            )));
        }
        if trigger.max_scroll_corrections == 0 {
            return Err(PolicyError::Invalid(
                "trigger.max_scroll_corrections must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
