use serde::{Deserialize, Serialize};
use std::time::Duration;

use soultrigger_policy_center::{default_snapshot, PolicySnapshot, TriggerPolicy};

use crate::model::TriggerOpt;

/// Slice of the policy snapshot the trigger tool reads, pinned at build time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerPolicyView {
    pub rev: u64,
    pub settings: TriggerPolicy,
}

impl Default for TriggerPolicyView {
    fn default() -> Self {
        Self::from(&default_snapshot())
    }
}

impl From<&PolicySnapshot> for TriggerPolicyView {
    fn from(snapshot: &PolicySnapshot) -> Self {
        Self {
            rev: snapshot.rev,
            settings: snapshot.trigger.clone(),
        }
    }
}

/// Policy defaults with per-call options layered on top.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveSettings {
    pub timeout: Duration,
    pub wait_for_animations: bool,
    pub animation_distance_threshold: f64,
    pub retry_interval: Duration,
    pub frame_interval: Duration,
    pub max_scroll_corrections: u32,
}

impl TriggerPolicyView {
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn effective(&self, opt: &TriggerOpt) -> EffectiveSettings {
        EffectiveSettings {
            timeout: opt
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.settings.timeout()),
            wait_for_animations: opt
                .wait_for_animations
                .unwrap_or(self.settings.wait_for_animations),
            animation_distance_threshold: opt
                .animation_distance_threshold
                .unwrap_or(self.settings.animation_distance_threshold),
            retry_interval: self.settings.retry_interval(),
            frame_interval: self.settings.frame_interval(),
            max_scroll_corrections: self.settings.max_scroll_corrections,
        }
    }
}
