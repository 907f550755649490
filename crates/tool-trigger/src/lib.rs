//! `trigger`: deliver an arbitrary named event to a page target once the
//! target is actionable, then wait for chained expectations.

pub mod actionability;
pub mod api;
pub mod assertions;
pub mod coords;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod fixture;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod ports;

mod runner;

pub use api::{TriggerTool, TriggerToolBuilder};
pub use errors::TriggerError;
pub use model::{
    EventInit, EventTarget, ExecCtx, ScrollBehavior, TargetSelection, TriggerOpt, TriggerParams,
    TriggerReport,
};
