//! End-to-end scenarios driving the whole engine — inventory, registry,
//! loader, and the action/plan/driver chain together — rather than any
//! single module in isolation.

use crate::catalog::Task;
use crate::context::CancellationToken;
use crate::engine::{Engine, EngineArgs};
use crate::inventory::{DeviceRecord, MemoryInventory, SetupType};
use crate::registry::{Exec, Registry};
use crate::telemetry::Logger;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn device(name: &str) -> DeviceRecord {
    DeviceRecord {
        id: format!("id-{name}"),
        name: name.to_string(),
        setup_type: Some(SetupType::Cros),
        ..Default::default()
    }
}

async fn run_custom(config_text: &str, registry: Registry) -> crate::engine::EngineOutcome {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.seed("unit-1", "dut-1", device("dut-1")).await;

    let engine = Engine::new(inventory, Arc::new(registry), Logger::new());
    let mut args = EngineArgs::new("unit-1", Task::Custom);
    args.config_text = Some(config_text.to_string());

    engine.run(args).await.expect("run should succeed for a valid configuration")
}

#[tokio::test]
async fn trivial_pass() {
    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "sample_pass" } }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, Registry::with_builtins()).await;
    assert!(outcome.passed);
}

#[tokio::test]
async fn trivial_fail_without_recovery() {
    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "sample_fail" } }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, Registry::with_builtins()).await;
    assert!(!outcome.passed);
}

#[tokio::test]
async fn cyclic_configuration_reachable_from_a_critical_action_is_rejected() {
    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["A"],
                "actions": {
                    "A": { "dependencies": ["B"] },
                    "B": { "conditions": ["A"] }
                }
            }
        }
    })
    .to_string();

    let inventory = Arc::new(MemoryInventory::new());
    inventory.seed("unit-1", "dut-1", device("dut-1")).await;
    let engine = Engine::new(inventory, Arc::new(Registry::with_builtins()), Logger::new());
    let mut args = EngineArgs::new("unit-1", Task::Custom);
    args.config_text = Some(config);

    let err = engine.run(args).await.unwrap_err();
    assert!(matches!(err, crate::errors::EngineError::ConfigurationInvalid(..)));
}

#[tokio::test]
async fn cycle_unreachable_from_any_critical_action_is_tolerated() {
    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["A"],
                "actions": {
                    "A": { "dependencies": ["B"], "exec_name": "sample_pass" },
                    "B": { "exec_name": "sample_pass" },
                    "C": { "recovery_actions": ["D"], "exec_name": "sample_pass" },
                    "D": { "dependencies": ["C"], "exec_name": "sample_pass" }
                }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, Registry::with_builtins()).await;
    assert!(outcome.passed);
}

struct FlakyThenPass {
    calls: AtomicU32,
}

#[async_trait]
impl Exec for FlakyThenPass {
    async fn invoke(&self, _ctx: &crate::context::ExecContext, _args: &[String]) -> anyhow::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(anyhow::anyhow!("first attempt fails"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn recovery_action_runs_then_exec_is_retried_and_passes() {
    let mut registry = Registry::with_builtins();
    registry.register("flaky", Arc::new(FlakyThenPass { calls: AtomicU32::new(0) }));

    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["a"],
                "actions": {
                    "a": { "exec_name": "flaky", "recovery_actions": ["r"] },
                    "r": { "exec_name": "sample_pass" }
                }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, registry).await;
    assert!(outcome.passed);
}

#[tokio::test]
async fn allow_fail_plan_does_not_fail_the_overall_run() {
    let config = serde_json::json!({
        "plan_order": ["p1", "p2"],
        "plans": {
            "p1": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "sample_fail" } },
                "allow_fail": true
            },
            "p2": {
                "critical_actions": ["b"],
                "actions": { "b": { "exec_name": "sample_pass" } }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, Registry::with_builtins()).await;
    assert!(outcome.passed);
    assert_eq!(outcome.plan_runs.len(), 2);
}

#[derive(Default)]
struct CountingPass {
    calls: AtomicU32,
}

#[async_trait]
impl Exec for CountingPass {
    async fn invoke(&self, _ctx: &crate::context::ExecContext, _args: &[String]) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn run_once_action_referenced_twice_executes_a_single_time() {
    let mut registry = Registry::with_builtins();
    let counter = Arc::new(CountingPass::default());
    registry.register("counted", counter.clone());

    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["a", "b"],
                "actions": {
                    "a": { "exec_name": "counted", "run_control": "RUN_ONCE" },
                    "b": { "dependencies": ["a"], "exec_name": "sample_pass" }
                }
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, registry).await;
    assert!(outcome.passed);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_before_the_run_starts_reports_cancelled() {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.seed("unit-1", "dut-1", device("dut-1")).await;
    inventory.seed("unit-1", "dut-2", device("dut-2")).await;

    let config = serde_json::json!({
        "plan_order": ["p"],
        "plans": {
            "p": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "sample_pass" } }
            }
        }
    })
    .to_string();

    let engine = Engine::new(inventory, Arc::new(Registry::with_builtins()), Logger::new());
    let mut args = EngineArgs::new("unit-1", Task::Custom);
    args.config_text = Some(config);
    let cancellation = CancellationToken::new();
    cancellation.cancel();
    args.cancellation = Some(cancellation);

    let err = engine.run(args).await.unwrap_err();
    assert!(matches!(err, crate::errors::EngineError::Cancelled));
}

struct CancelThenFail;

#[async_trait]
impl Exec for CancelThenFail {
    async fn invoke(&self, ctx: &crate::context::ExecContext, _args: &[String]) -> anyhow::Result<()> {
        ctx.cancellation.cancel();
        Err(anyhow::anyhow!("cancelled mid-action"))
    }
}

#[tokio::test]
async fn closing_plan_still_executes_its_actions_after_a_mid_run_cancellation() {
    let mut registry = Registry::with_builtins();
    registry.register("cancel_then_fail", Arc::new(CancelThenFail));

    let config = serde_json::json!({
        "plan_order": ["p1", "close"],
        "plans": {
            "p1": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "cancel_then_fail" } }
            },
            "close": {
                "critical_actions": ["cleanup"],
                "actions": { "cleanup": { "exec_name": "sample_pass" } },
                "allow_fail": true
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, registry).await;
    assert!(!outcome.passed);
    let close_outcome = outcome
        .plan_runs
        .iter()
        .find(|r| r.plan_name == "close")
        .expect("close plan must still have run after mid-run cancellation");
    assert_eq!(close_outcome.outcome, crate::engine::PlanOutcome::Passed);
}

#[tokio::test]
async fn closing_plan_runs_even_after_an_earlier_plan_fails() {
    let config = serde_json::json!({
        "plan_order": ["p1", "close"],
        "plans": {
            "p1": {
                "critical_actions": ["a"],
                "actions": { "a": { "exec_name": "sample_fail" } }
            },
            "close": {
                "critical_actions": ["cleanup"],
                "actions": { "cleanup": { "exec_name": "sample_pass" } },
                "allow_fail": true
            }
        }
    })
    .to_string();

    let outcome = run_custom(&config, Registry::with_builtins()).await;
    assert!(!outcome.passed);
    let plan_names: Vec<&str> = outcome.plan_runs.iter().map(|r| r.plan_name.as_str()).collect();
    assert!(plan_names.contains(&"close"));
}
