//! The action runner (C4) — the heart of the engine.
//!
//! Evaluates a single action through cache lookup, conditions,
//! dependencies, exec invocation, and the recovery loop, in that fixed
//! order. Cyclic references are handled by name indirection into the
//! plan's action map rather than pointer cycles (see the design note on
//! cyclic reference handling); the loader's cycle check is what keeps
//! this recursion from diverging.

use crate::context::ExecContext;
use crate::model::{Action, RunControl};
use crate::registry::Registry;
use crate::telemetry::StepSpan;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A future boxed for recursion without requiring `Send` — the action
/// runner's internal state (the caches) is plain `RefCell`, which matches
/// the engine's single-threaded-per-unit scheduling model: nothing here
/// is ever polled from more than one task concurrently.
type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Evaluates actions within one plan run. Owns the `RUN_ONCE` cache for
/// the plan's entire lifetime; the `RERUN_AFTER_RECOVERY` cache is reset
/// at the start of each top-level critical-action evaluation via
/// [`ActionRunner::begin_critical_action`].
pub struct ActionRunner {
    actions: HashMap<String, Action>,
    registry: Arc<Registry>,
    recovery_enabled: bool,
    once_cache: RefCell<HashMap<String, bool>>,
    scoped_cache: RefCell<HashMap<String, bool>>,
}

impl ActionRunner {
    pub fn new(actions: HashMap<String, Action>, registry: Arc<Registry>, recovery_enabled: bool) -> Self {
        Self {
            actions,
            registry,
            recovery_enabled,
            once_cache: RefCell::new(HashMap::new()),
            scoped_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resets the scope for `RERUN_AFTER_RECOVERY` caching. Call once
    /// before evaluating each entry in a plan's `critical_actions`.
    pub fn begin_critical_action(&self) {
        self.scoped_cache.borrow_mut().clear();
    }

    /// Evaluates action `name`, returning pass (`true`) or fail (`false`).
    /// Never surfaces an error payload to the caller — per the return
    /// discipline, only pass/fail crosses this boundary.
    pub fn evaluate<'a>(&'a self, name: &'a str, exec_ctx: &'a ExecContext) -> LocalBoxFuture<'a, bool> {
        Box::pin(async move {
            let action = match self.actions.get(name) {
                Some(a) => a,
                None => {
                    exec_ctx
                        .logger
                        .warn(&format!("action `{name}` has no body; treating as pass"));
                    return true;
                }
            };

            if let Some(cached) = self.cache_lookup(name, action.run_control) {
                exec_ctx.logger.debug(&format!("{name}: cache hit ({cached})"));
                return cached;
            }

            let step = StepSpan::start(&exec_ctx.logger, name);
            let passed = self.evaluate_uncached(name, action, exec_ctx).await;
            step.close(&exec_ctx.logger, (!passed).then_some("failed"));

            self.cache_store(name, action.run_control, passed);
            passed
        })
    }

    async fn evaluate_uncached(&self, name: &str, action: &Action, exec_ctx: &ExecContext) -> bool {
        // Conditions: a failing condition is not an error of this action —
        // it just means this action does not apply, so it passes as a
        // no-op. Conditions are still allowed to run their own recovery.
        for condition in &action.conditions {
            if !self.evaluate(condition, exec_ctx).await {
                exec_ctx
                    .logger
                    .debug(&format!("{name}: condition `{condition}` false, not applicable"));
                return true;
            }
        }

        // Dependencies: fatal. First failure stops evaluation and fails A.
        for dependency in &action.dependencies {
            if !self.evaluate(dependency, exec_ctx).await {
                exec_ctx
                    .logger
                    .warn(&format!("{name}: dependency `{dependency}` failed"));
                return false;
            }
        }

        let exec_name = action
            .exec_name
            .clone()
            .unwrap_or_else(|| name.to_string());

        let mut passed = self.invoke_exec(&exec_name, action, exec_ctx).await;

        if !passed && self.recovery_enabled && !action.recovery_actions.is_empty() {
            for recovery in &action.recovery_actions {
                // Outcome of the recovery action itself is not inspected —
                // only whether the retried exec then passes matters.
                self.evaluate(recovery, exec_ctx).await;
                passed = self.invoke_exec(&exec_name, action, exec_ctx).await;
                if passed {
                    break;
                }
            }

            if !passed {
                if action.allow_fail_after_recovery {
                    exec_ctx.logger.warn(&format!(
                        "{name}: recovery exhausted, allow_fail_after_recovery suppresses failure"
                    ));
                    passed = true;
                } else {
                    exec_ctx
                        .logger
                        .error(&format!("{name}: recovery exhausted, action fails"));
                }
            }
        }

        passed
    }

    async fn invoke_exec(&self, exec_name: &str, action: &Action, exec_ctx: &ExecContext) -> bool {
        let invocation = self.registry.invoke(exec_name, exec_ctx, &action.exec_extra_args);
        let cancelled = exec_ctx.cancellation.cancelled();

        let result = match action.exec_timeout {
            Some(timeout) => {
                tokio::select! {
                    res = invocation => res,
                    _ = tokio::time::sleep(timeout) => Err(timeout_error(exec_name, timeout)),
                    _ = cancelled => Err(anyhow::anyhow!("exec `{exec_name}` cancelled")),
                }
            }
            None => {
                tokio::select! {
                    res = invocation => res,
                    _ = cancelled => Err(anyhow::anyhow!("exec `{exec_name}` cancelled")),
                }
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                exec_ctx.logger.warn(&format!("exec `{exec_name}` failed: {e}"));
                false
            }
        }
    }

    fn cache_lookup(&self, name: &str, run_control: RunControl) -> Option<bool> {
        match run_control {
            RunControl::AlwaysRun => None,
            RunControl::RunOnce => self.once_cache.borrow().get(name).copied(),
            RunControl::RerunAfterRecovery => self.scoped_cache.borrow().get(name).copied(),
        }
    }

    fn cache_store(&self, name: &str, run_control: RunControl, passed: bool) {
        match run_control {
            RunControl::AlwaysRun => {}
            RunControl::RunOnce => {
                self.once_cache.borrow_mut().insert(name.to_string(), passed);
            }
            RunControl::RerunAfterRecovery => {
                self.scoped_cache.borrow_mut().insert(name.to_string(), passed);
            }
        }
    }
}

fn timeout_error(exec_name: &str, timeout: Duration) -> anyhow::Error {
    anyhow::anyhow!("exec `{exec_name}` timed out after {timeout:?}")
}
