//! Post-dispatch expectations and the loop that retries them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soultrigger_core_types::{ExecRoute, NodeId};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::TriggerError;
use crate::model::EventTarget;
use crate::ports::PagePort;

#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[error("expected {expectation}: {message}")]
pub struct AssertionFailure {
    pub expectation: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl AssertionFailure {
    pub fn new(expectation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expectation: expectation.into(),
            message: message.into(),
            actual: None,
        }
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

/// A condition chained after a command. `subject` is what the command acted on.
#[async_trait]
pub trait Expectation: Send + Sync {
    fn describe(&self) -> String;

    async fn check(
        &self,
        page: &dyn PagePort,
        route: &ExecRoute,
        subject: &EventTarget,
    ) -> Result<(), AssertionFailure>;
}

#[derive(Clone, Default)]
pub struct ExpectationSet {
    items: Vec<Arc<dyn Expectation>>,
}

impl ExpectationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expectation: impl Expectation + 'static) -> Self {
        self.items.push(Arc::new(expectation));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Expectation>> {
        self.items.iter()
    }
}

impl fmt::Debug for ExpectationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.items.iter().map(|item| item.describe()))
            .finish()
    }
}

/// Attribute of the subject (or of `node`) equals `value`.
#[derive(Clone, Debug)]
pub struct AttributeEquals {
    pub node: Option<NodeId>,
    pub name: String,
    pub value: String,
}

impl AttributeEquals {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            node: None,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn on(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

#[async_trait]
impl Expectation for AttributeEquals {
    fn describe(&self) -> String {
        format!("{} [{}='{}']", scope(&self.node), self.name, self.value)
    }

    async fn check(
        &self,
        page: &dyn PagePort,
        route: &ExecRoute,
        subject: &EventTarget,
    ) -> Result<(), AssertionFailure> {
        let actual = read_attribute(page, route, subject, self.node.as_ref(), &self.name)
            .await
            .map_err(|err| AssertionFailure::new(self.describe(), err.to_string()))?;
        match actual {
            Some(found) if found == self.value => Ok(()),
            Some(found) => Err(AssertionFailure::new(
                self.describe(),
                format!("attribute '{}' was '{}'", self.name, found),
            )
            .with_actual(found)),
            None => Err(AssertionFailure::new(
                self.describe(),
                format!("attribute '{}' is not set", self.name),
            )),
        }
    }
}

/// Attribute of the subject (or of `node`) is absent.
#[derive(Clone, Debug)]
pub struct AttributeMissing {
    pub node: Option<NodeId>,
    pub name: String,
}

impl AttributeMissing {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: None,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Expectation for AttributeMissing {
    fn describe(&self) -> String {
        format!("{} without [{}]", scope(&self.node), self.name)
    }

    async fn check(
        &self,
        page: &dyn PagePort,
        route: &ExecRoute,
        subject: &EventTarget,
    ) -> Result<(), AssertionFailure> {
        let actual = read_attribute(page, route, subject, self.node.as_ref(), &self.name)
            .await
            .map_err(|err| AssertionFailure::new(self.describe(), err.to_string()))?;
        match actual {
            None => Ok(()),
            Some(found) => Err(AssertionFailure::new(
                self.describe(),
                format!("attribute '{}' is set to '{}'", self.name, found),
            )
            .with_actual(found)),
        }
    }
}

/// Expectation backed by a synchronous closure.
pub struct Predicate<F> {
    description: String,
    check: F,
}

pub fn predicate<F>(description: impl Into<String>, check: F) -> Predicate<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    Predicate {
        description: description.into(),
        check,
    }
}

#[async_trait]
impl<F> Expectation for Predicate<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn check(
        &self,
        _page: &dyn PagePort,
        _route: &ExecRoute,
        _subject: &EventTarget,
    ) -> Result<(), AssertionFailure> {
        (self.check)().map_err(|message| AssertionFailure::new(self.describe(), message))
    }
}

/// Data form of the built-in expectations, as written in scenario files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectationSpec {
    AttrEquals {
        #[serde(default)]
        node: Option<NodeId>,
        name: String,
        value: String,
    },
    AttrMissing {
        #[serde(default)]
        node: Option<NodeId>,
        name: String,
    },
}

impl ExpectationSpec {
    pub fn into_expectation(self) -> Arc<dyn Expectation> {
        match self {
            ExpectationSpec::AttrEquals { node, name, value } => {
                Arc::new(AttributeEquals { node, name, value })
            }
            ExpectationSpec::AttrMissing { node, name } => {
                Arc::new(AttributeMissing { node, name })
            }
        }
    }
}

impl FromIterator<ExpectationSpec> for ExpectationSet {
    fn from_iter<I: IntoIterator<Item = ExpectationSpec>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(ExpectationSpec::into_expectation).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AssertionTrace {
    pub checked: usize,
    pub attempts: u32,
}

/// Re-evaluates `set` until every expectation holds or the deadline passes.
/// The last evaluation happens at the deadline itself; its failure is returned.
pub async fn verify_assertions(
    page: &dyn PagePort,
    route: &ExecRoute,
    subject: &EventTarget,
    set: &ExpectationSet,
    retry_interval: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<AssertionTrace, TriggerError> {
    let mut trace = AssertionTrace {
        checked: set.len(),
        attempts: 0,
    };
    if set.is_empty() {
        return Ok(trace);
    }

    loop {
        if cancel.is_cancelled() {
            return Err(TriggerError::Cancelled);
        }
        trace.attempts += 1;
        let failure = match evaluate(page, route, subject, set).await {
            Ok(()) => {
                debug!(attempts = trace.attempts, checked = trace.checked, "assertions passed");
                return Ok(trace);
            }
            Err(failure) => failure,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(TriggerError::Assertion(failure));
        }
        trace!(attempts = trace.attempts, %failure, "assertion not yet satisfied");
        let wait = retry_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(TriggerError::Cancelled),
            _ = sleep(wait) => {}
        }
    }
}

async fn evaluate(
    page: &dyn PagePort,
    route: &ExecRoute,
    subject: &EventTarget,
    set: &ExpectationSet,
) -> Result<(), AssertionFailure> {
    for expectation in set.iter() {
        expectation.check(page, route, subject).await?;
    }
    Ok(())
}

async fn read_attribute(
    page: &dyn PagePort,
    route: &ExecRoute,
    subject: &EventTarget,
    node: Option<&NodeId>,
    name: &str,
) -> Result<Option<String>, TriggerError> {
    match node {
        Some(node) => {
            page.attribute(route, &EventTarget::Element(node.clone()), name)
                .await
        }
        None => page.attribute(route, subject, name).await,
    }
}

fn scope(node: &Option<NodeId>) -> String {
    node.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "subject".to_string())
}
