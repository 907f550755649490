use thiserror::Error;

use soultrigger_core_types::SoulError;

use crate::actionability::BlockReason;
use crate::assertions::AssertionFailure;
use crate::coords::ResolvedCoordinates;
use crate::ports::HiddenReason;

#[derive(Debug, Error, Clone)]
pub enum TriggerError {
    #[error("tool disabled by policy")]
    Disabled,
    #[error("event name must be a string, got {got}")]
    InvalidArgument { got: String },
    #[error("trigger requires a subject but the selection is empty")]
    EmptyTarget,
    #[error("trigger can only be called on a single element, got {count}")]
    AmbiguousTarget { count: usize },
    #[error("invalid position '{0}'")]
    InvalidPosition(String),
    #[error("target has a zero-area bounding box ({width}x{height})")]
    ZeroSizeTarget { width: f64, height: f64 },
    #[error("target is not visible: {reason}")]
    NotVisible { reason: HiddenReason },
    #[error("timed out after {timeout_ms}ms waiting for actionability: {reason}")]
    ActionabilityTimeout {
        reason: BlockReason,
        timeout_ms: u64,
        last_coords: Option<ResolvedCoordinates>,
    },
    /// Last expectation failure, surfaced as-is.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error("event handler failed: {0}")]
    HandlerFailed(String),
    #[error("page error: {0}")]
    Page(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl TriggerError {
    /// Whether a later, independent attempt could succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TriggerError::ActionabilityTimeout { .. }
                | TriggerError::Assertion(_)
                | TriggerError::Page(_)
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerError::Disabled => "disabled",
            TriggerError::InvalidArgument { .. } => "invalid_argument",
            TriggerError::EmptyTarget => "empty_target",
            TriggerError::AmbiguousTarget { .. } => "ambiguous_target",
            TriggerError::InvalidPosition(_) => "invalid_position",
            TriggerError::ZeroSizeTarget { .. } => "zero_size_target",
            TriggerError::NotVisible { .. } => "not_visible",
            TriggerError::ActionabilityTimeout { .. } => "actionability_timeout",
            TriggerError::Assertion(_) => "assertion",
            TriggerError::HandlerFailed(_) => "handler_failed",
            TriggerError::Page(_) => "page",
            TriggerError::Cancelled => "cancelled",
        }
    }
}

impl From<TriggerError> for SoulError {
    fn from(err: TriggerError) -> Self {
        SoulError::new(err.to_string())
    }
}
