//! Scenario files: a scripted page, one trigger request and its expectations.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tool_trigger::assertions::{ExpectationSet, ExpectationSpec};
use tool_trigger::fixture::{PageScenario, ScriptedPage};
use tool_trigger::{ScrollBehavior, TriggerOpt, TriggerParams};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub page: PageScenario,
    /// Untyped request: `{target, event, position?, fields?}`.
    pub trigger: Value,
    #[serde(default)]
    pub options: ScenarioOptions,
    #[serde(default)]
    pub expect: Vec<ExpectationSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScenarioOptions {
    pub timeout_ms: Option<u64>,
    pub wait_for_animations: Option<bool>,
    pub animation_distance_threshold: Option<f64>,
    pub scroll_behavior: ScrollBehavior,
    pub log: bool,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            wait_for_animations: None,
            animation_distance_threshold: None,
            scroll_behavior: ScrollBehavior::default(),
            log: true,
        }
    }
}

/// Everything needed to run one trigger.
pub struct Prepared {
    pub page: ScriptedPage,
    pub params: TriggerParams,
    pub opt: TriggerOpt,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn prepare(self) -> Result<Prepared> {
        let page = ScriptedPage::from_scenario(self.page).context("Invalid page description")?;
        let params = TriggerParams::from_value(&self.trigger).context("Invalid trigger request")?;
        let opt = TriggerOpt {
            timeout_ms: self.options.timeout_ms,
            wait_for_animations: self.options.wait_for_animations,
            animation_distance_threshold: self.options.animation_distance_threshold,
            scroll_behavior: self.options.scroll_behavior,
            log: self.options.log,
            expect: self.expect.into_iter().collect::<ExpectationSet>(),
        };
        Ok(Prepared { page, params, opt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tool_trigger::TargetSelection;

    #[test]
    fn parses_minimal_scenario() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
page:
  nodes:
    - id: submit
      rect: {x: 10, y: 10, width: 100, height: 30}
trigger:
  target: {elements: [submit]}
  event: click
expect:
  - kind: attr_equals
    name: data-clicked
    value: "yes"
"#,
        )
        .unwrap();
        let prepared = scenario.prepare().unwrap();
        assert_eq!(prepared.params.target, TargetSelection::element("submit"));
        assert_eq!(prepared.params.event_name, "click");
        assert_eq!(prepared.opt.expect.len(), 1);
        assert!(prepared.opt.log);
    }

    #[test]
    fn numeric_event_name_is_rejected() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
trigger:
  target: window
  event: 7
"#,
        )
        .unwrap();
        let err = scenario.prepare().err().unwrap();
        assert!(format!("{err:#}").contains("event name must be a string"));
    }
}
