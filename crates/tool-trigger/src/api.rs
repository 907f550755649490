use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TriggerError;
use crate::events::TracingEvents;
use crate::metrics::NullMetrics;
use crate::model::{ExecCtx, TriggerOpt, TriggerParams, TriggerReport};
use crate::policy::TriggerPolicyView;
use crate::ports::{EventsPort, MetricsPort, PagePort};
use crate::runner::{execute, RuntimeDeps};

#[async_trait]
pub trait TriggerTool: Send + Sync {
    async fn run(
        &self,
        ctx: ExecCtx,
        params: TriggerParams,
        opt: TriggerOpt,
    ) -> Result<TriggerReport, TriggerError>;
}

pub struct TriggerToolBuilder {
    policy: TriggerPolicyView,
    page: Arc<dyn PagePort>,
    events: Option<Arc<dyn EventsPort>>,
    metrics: Option<Arc<dyn MetricsPort>>,
}

impl TriggerToolBuilder {
    pub fn new(policy: TriggerPolicyView, page: Arc<dyn PagePort>) -> Self {
        Self {
            policy,
            page,
            events: None,
            metrics: None,
        }
    }

    pub fn with_events(mut self, port: Arc<dyn EventsPort>) -> Self {
        self.events = Some(port);
        self
    }

    pub fn with_metrics(mut self, port: Arc<dyn MetricsPort>) -> Self {
        self.metrics = Some(port);
        self
    }

    pub fn build(self) -> Arc<dyn TriggerTool> {
        Arc::new(TriggerToolImpl {
            policy: self.policy,
            page: self.page,
            events: self.events.unwrap_or_else(|| Arc::new(TracingEvents)),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NullMetrics)),
        })
    }
}

pub struct TriggerToolImpl {
    policy: TriggerPolicyView,
    page: Arc<dyn PagePort>,
    events: Arc<dyn EventsPort>,
    metrics: Arc<dyn MetricsPort>,
}

#[async_trait]
impl TriggerTool for TriggerToolImpl {
    async fn run(
        &self,
        ctx: ExecCtx,
        params: TriggerParams,
        opt: TriggerOpt,
    ) -> Result<TriggerReport, TriggerError> {
        if ctx.cancel.is_cancelled() {
            return Err(TriggerError::Cancelled);
        }
        let runtime = RuntimeDeps {
            page: self.page.as_ref(),
            events: self.events.as_ref(),
            metrics: self.metrics.as_ref(),
            policy: &self.policy,
        };
        execute(&ctx, params, opt, runtime).await
    }
}
