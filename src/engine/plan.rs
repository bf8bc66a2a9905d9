//! The plan runner (C5): walks a plan's `critical_actions` in declared
//! order, honours `allow_fail`, and owns one [`ActionRunner`] for the
//! plan's whole lifetime so `RUN_ONCE` caching spans every critical
//! action in the plan.

use crate::context::ExecContext;
use crate::engine::action::ActionRunner;
use crate::model::Plan;
use crate::registry::Registry;
use std::sync::Arc;

/// Outcome of running one plan against one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Passed,
    /// A critical action failed, but `plan.allow_fail` suppressed it.
    AllowFailed,
    Failed,
}

impl PlanOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, PlanOutcome::Failed)
    }
}

pub async fn run_plan(
    plan_name: &str,
    plan: &Plan,
    registry: Arc<Registry>,
    recovery_enabled: bool,
    exec_ctx: &ExecContext,
) -> PlanOutcome {
    let runner = ActionRunner::new(plan.actions.clone(), registry, recovery_enabled);

    for action_name in &plan.critical_actions {
        runner.begin_critical_action();

        if exec_ctx.cancellation.is_cancelled() {
            exec_ctx
                .logger
                .warn(&format!("plan `{plan_name}`: cancelled before `{action_name}`"));
            return PlanOutcome::Failed;
        }

        if !runner.evaluate(action_name, exec_ctx).await {
            if plan.allow_fail {
                exec_ctx.logger.warn(&format!(
                    "plan `{plan_name}`: critical action `{action_name}` failed, allow_fail suppresses it"
                ));
                return PlanOutcome::AllowFailed;
            }
            exec_ctx
                .logger
                .error(&format!("plan `{plan_name}`: critical action `{action_name}` failed"));
            return PlanOutcome::Failed;
        }
    }

    PlanOutcome::Passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::inventory::DeviceRecord;
    use crate::model::Action;
    use crate::telemetry::Logger;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    fn exec_ctx() -> ExecContext {
        ExecContext::new(
            Arc::new(RwLock::new(DeviceRecord::default())),
            Logger::new(),
            CancellationToken::new(),
        )
    }

    fn action(exec_name: &str) -> Action {
        Action {
            exec_name: Some(exec_name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn all_critical_actions_pass() {
        let mut actions = HashMap::new();
        actions.insert("a".to_string(), action("sample_pass"));
        actions.insert("b".to_string(), action("sample_pass"));
        let plan = Plan {
            critical_actions: vec!["a".to_string(), "b".to_string()],
            actions,
            allow_fail: false,
        };
        let outcome = run_plan("p", &plan, Arc::new(Registry::with_builtins()), true, &exec_ctx()).await;
        assert_eq!(outcome, PlanOutcome::Passed);
    }

    #[tokio::test]
    async fn failing_critical_action_fails_the_plan() {
        let mut actions = HashMap::new();
        actions.insert("a".to_string(), action("sample_fail"));
        actions.insert("b".to_string(), action("sample_pass"));
        let plan = Plan {
            critical_actions: vec!["a".to_string(), "b".to_string()],
            actions,
            allow_fail: false,
        };
        let outcome = run_plan("p", &plan, Arc::new(Registry::with_builtins()), true, &exec_ctx()).await;
        assert_eq!(outcome, PlanOutcome::Failed);
    }

    #[tokio::test]
    async fn allow_fail_plan_reports_allow_failed_not_failed() {
        let mut actions = HashMap::new();
        actions.insert("a".to_string(), action("sample_fail"));
        let plan = Plan {
            critical_actions: vec!["a".to_string()],
            actions,
            allow_fail: true,
        };
        let outcome = run_plan("p", &plan, Arc::new(Registry::with_builtins()), true, &exec_ctx()).await;
        assert_eq!(outcome, PlanOutcome::AllowFailed);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn already_cancelled_plan_fails_without_invoking_execs() {
        let mut actions = HashMap::new();
        actions.insert("a".to_string(), action("sample_fail"));
        let plan = Plan {
            critical_actions: vec!["a".to_string()],
            actions,
            allow_fail: false,
        };
        let ctx = exec_ctx();
        ctx.cancellation.cancel();
        let outcome = run_plan("p", &plan, Arc::new(Registry::with_builtins()), true, &ctx).await;
        assert_eq!(outcome, PlanOutcome::Failed);
    }
}
