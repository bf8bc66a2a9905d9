//! Structured error taxonomy for the recovery engine.
//!
//! Every error the engine can surface carries a stable dotted code
//! (`load.cycle`, `action.exec-timeout`, ...) alongside the usual
//! thiserror-derived variant, so tooling downstream of a run (CI,
//! dashboards, on-call paging) can match on the code rather than parsing
//! message text. The codes are grouped by the stage that raised them,
//! mirroring the four error categories a run can fail in: loading a
//! configuration, evaluating an action, running a plan, and driving the
//! engine itself.

use std::fmt;

/// Which pipeline stage raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Load,
    Action,
    Plan,
    Engine,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Action => write!(f, "action"),
            Self::Plan => write!(f, "plan"),
            Self::Engine => write!(f, "engine"),
        }
    }
}

/// Errors raised while parsing, materialising, or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("configuration has no plans")]
    Empty,

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("plan `{plan}` action `{action}` references unknown exec `{exec}`")]
    UnknownExec {
        plan: String,
        action: String,
        exec: String,
    },

    #[error("plan `{plan}` has a cycle reachable from its critical actions: {cycle}")]
    Cycle { plan: String, cycle: String },

    #[error("plan_order references plan `{0}`, which has no entry in `plans`")]
    UnknownPlan(String),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "load.empty",
            Self::Parse(_) => "load.parse",
            Self::UnknownExec { .. } => "load.unknown-exec",
            Self::Cycle { .. } => "load.cycle",
            Self::UnknownPlan(_) => "load.unknown-plan",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Load
    }
}

/// Errors raised while evaluating a single action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action `{0}` failed: a dependency did not pass")]
    DependencyFailed(String),

    #[error("action `{0}` exec `{exec}` failed: {source}", exec = .1)]
    ExecFailed(String, String, #[source] anyhow::Error),

    #[error("action `{0}` exec `{1}` timed out after {2:?}")]
    ExecTimeout(String, String, std::time::Duration),

    #[error("action `{0}` exhausted its recovery actions without recovering")]
    RecoveryExhausted(String),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DependencyFailed(_) => "action.dependency-failed",
            Self::ExecFailed(..) => "action.exec-failed",
            Self::ExecTimeout(..) => "action.exec-timeout",
            Self::RecoveryExhausted(_) => "action.recovery-exhausted",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Action
    }
}

/// Errors raised while running a plan's critical actions.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan `{0}` failed: critical action `{1}` did not pass")]
    Failed(String, String),
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        "plan.failed"
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Plan
    }
}

/// Errors raised by the engine driver itself, outside of any single plan.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("run was cancelled")]
    Cancelled,

    #[error("failed to read inventory for unit `{0}`: {1}")]
    InventoryRead(String, #[source] anyhow::Error),

    #[error("failed to write inventory for unit `{0}`: {1}")]
    InventoryWrite(String, #[source] anyhow::Error),

    #[error("no built-in plan mapping for resource `{0}`")]
    NoPlanMapping(String),

    #[error("configuration for resource `{0}` failed validation: {1:?}")]
    ConfigurationInvalid(String, Vec<LoadError>),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "engine.cancelled",
            Self::InventoryRead(..) => "engine.inventory-read",
            Self::InventoryWrite(..) => "engine.inventory-write",
            Self::NoPlanMapping(_) => "engine.no-plan-mapping",
            Self::ConfigurationInvalid(..) => "engine.configuration-invalid",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Engine
    }
}
