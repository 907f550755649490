use crate::api::apply_override;
use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::loader::{load_snapshot_from_vars, LoadOptions};
use crate::model::PolicySource;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn default_snapshot_matches_command_defaults() {
    let snapshot = default_snapshot();
    assert_eq!(snapshot.trigger.timeout_ms, 4_000);
    assert!(snapshot.trigger.wait_for_animations);
    assert_eq!(snapshot.trigger.animation_distance_threshold, 5.0);
    assert_eq!(snapshot.trigger.max_scroll_corrections, 3);
    assert!(snapshot.validate().is_ok());
}

#[test]
fn file_overlay_replaces_values_and_records_source() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(
        &file_path,
        r#"trigger:
  timeout_ms: 1500
  wait_for_animations: false
  animation_distance_threshold: 2.5
"#,
    )
    .unwrap();

    let options = LoadOptions {
        paths: vec![file_path],
        include_env: false,
        include_cli_env: false,
    };
    let snapshot = load_snapshot_from_vars(&options, Vec::new()).unwrap();
    assert_eq!(snapshot.trigger.timeout_ms, 1500);
    assert!(!snapshot.trigger.wait_for_animations);
    assert_eq!(snapshot.trigger.animation_distance_threshold, 2.5);
    assert_eq!(
        snapshot.source_of("trigger.timeout_ms"),
        Some(PolicySource::File)
    );
    assert_eq!(
        snapshot.source_of("trigger.retry_interval_ms"),
        Some(PolicySource::Builtin)
    );
    assert_eq!(snapshot.rev, 4);
}

#[test]
fn env_then_cli_layers_win_in_order() {
    let options = LoadOptions {
        paths: Vec::new(),
        include_env: true,
        include_cli_env: true,
    };
    let snapshot = load_snapshot_from_vars(
        &options,
        vars(&[
            ("SOUL_POLICY__TRIGGER__TIMEOUT_MS", "900"),
            ("SOUL_POLICY__TRIGGER__RETRY_INTERVAL_MS", "20"),
            ("SOUL_POLICY_CLI_OVERRIDES", "trigger.timeout_ms=250, trigger.enabled=false"),
        ]),
    )
    .unwrap();
    assert_eq!(snapshot.trigger.timeout_ms, 250);
    assert_eq!(snapshot.trigger.retry_interval_ms, 20);
    assert!(!snapshot.trigger.enabled);
    assert_eq!(
        snapshot.source_of("trigger.timeout_ms"),
        Some(PolicySource::Cli)
    );
    assert_eq!(
        snapshot.source_of("trigger.retry_interval_ms"),
        Some(PolicySource::Env)
    );
}

#[test]
fn json_env_overlay_is_flattened() {
    let options = LoadOptions {
        paths: Vec::new(),
        include_env: true,
        include_cli_env: false,
    };
    let snapshot = load_snapshot_from_vars(
        &options,
        vars(&[(
            "SOUL_POLICY_OVERRIDE_JSON",
            r#"{"trigger": {"max_scroll_corrections": 5}}"#,
        )]),
    )
    .unwrap();
    assert_eq!(snapshot.trigger.max_scroll_corrections, 5);
}

#[test]
fn unknown_path_is_rejected() {
    let options = LoadOptions {
        paths: Vec::new(),
        include_env: true,
        include_cli_env: false,
    };
    let err = load_snapshot_from_vars(&options, vars(&[("SOUL_POLICY__TRIGGER__FORCE", "true")]))
        .unwrap_err();
    assert!(matches!(err, PolicyError::UnsupportedPath(path) if path == "trigger.force"));
}

#[test]
fn zero_timeout_fails_validation() {
    let options = LoadOptions {
        paths: Vec::new(),
        include_env: false,
        include_cli_env: true,
    };
    let err = load_snapshot_from_vars(
        &options,
        vars(&[("SOUL_POLICY_CLI_OVERRIDES", "trigger.timeout_ms=0")]),
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::Invalid(_)));
}

#[test]
fn apply_override_bumps_revision_only_on_change() {
    let mut snapshot = default_snapshot();
    let rev = snapshot.rev;
    let changed = apply_override(
        &mut snapshot,
        "trigger.timeout_ms",
        &serde_json::json!(4_000),
        PolicySource::Cli,
    )
    .unwrap();
    assert!(!changed);
    assert_eq!(snapshot.rev, rev);

    let changed = apply_override(
        &mut snapshot,
        "trigger.animation_distance_threshold",
        &serde_json::json!(12),
        PolicySource::Cli,
    )
    .unwrap();
    assert!(changed);
    assert_eq!(snapshot.rev, rev + 1);
    assert_eq!(snapshot.trigger.animation_distance_threshold, 12.0);
}

#[test]
fn wrong_value_type_is_reported() {
    let mut snapshot = default_snapshot();
    let err = apply_override(
        &mut snapshot,
        "trigger.wait_for_animations",
        &serde_json::json!("sometimes"),
        PolicySource::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidValue(_)));
}
