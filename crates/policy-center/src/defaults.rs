use crate::model::{PolicySnapshot, TriggerPolicy};

pub fn default_snapshot() -> PolicySnapshot {
    PolicySnapshot {
        rev: 1,
        trigger: TriggerPolicy::default(),
        provenance: Default::default(),
    }
}
