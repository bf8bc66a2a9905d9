//! The built-in task/setup-type catalog (C7): a pure lookup table from
//! `(Task, SetupType)` to a default [`Configuration`], mirroring the
//! plan-list table. Combinations outside the table are a load-time error
//! rather than a silent empty run.
//!
//! Only `close`'s body uses a core exec (`sample_pass`): every other
//! built-in plan names a peripheral-facing exec (`verify_servo`,
//! `cold_reset`, ...) that ships externally, never in the core registry.
//! Running a built-in recovery/deploy configuration against the core's
//! sample registry alone is expected to fail validation on those plans —
//! that failure mode is itself part of what the catalog promises: a
//! caller who wants them working has to register the real execs.

use crate::model::{Action, Configuration, Plan};
use std::collections::HashMap;

use crate::inventory::SetupType;

/// The task family a run is being asked to perform. `Custom` carries no
/// built-in mapping: the caller must supply a configuration directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Recovery,
    Deploy,
    Custom,
    DownloadToUsb,
    Reserve,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("task/setup combination (task={task:?}, setup_type={setup_type:?}) has no built-in mapping")]
    NoMapping { task: Task, setup_type: SetupType },

    #[error("custom task requires a caller-supplied configuration")]
    CustomRequiresCallerConfig,
}

/// Looks up the default configuration for a task/setup-type pair. `Custom`
/// always errors — callers must supply their own configuration for it.
pub fn builtin_configuration(task: Task, setup_type: SetupType) -> Result<Configuration, CatalogError> {
    match (task, setup_type) {
        (Task::Custom, _) => Err(CatalogError::CustomRequiresCallerConfig),
        (Task::Recovery, SetupType::Cros) => Ok(cros_recovery_configuration()),
        (Task::Deploy, SetupType::Cros) => Ok(cros_deploy_configuration()),
        (Task::Recovery, SetupType::Labstation) | (Task::Deploy, SetupType::Labstation) => {
            Ok(labstation_configuration())
        }
        (Task::Recovery, SetupType::Android) | (Task::Deploy, SetupType::Android) => {
            Ok(android_configuration())
        }
        (task, setup_type) => Err(CatalogError::NoMapping { task, setup_type }),
    }
}

fn single_action_plan(action_name: &str, exec_name: &str, allow_fail: bool) -> Plan {
    let mut actions = HashMap::new();
    actions.insert(
        action_name.to_string(),
        Action {
            exec_name: Some(exec_name.to_string()),
            ..Default::default()
        },
    );
    Plan {
        critical_actions: vec![action_name.to_string()],
        actions,
        allow_fail,
    }
}

fn close_plan() -> Plan {
    single_action_plan("close_resource", "sample_pass", true)
}

/// `servo` carries the allow-fail marker for recovery, per the plan-list
/// table.
fn servo_plan_recovery() -> Plan {
    single_action_plan("verify_servo", "verify_servo", true)
}

/// `servo` carries no allow-fail marker for deploy: servo is critical
/// there, so a servo failure must fail the deploy outright.
fn servo_plan_deploy() -> Plan {
    single_action_plan("verify_servo", "verify_servo", false)
}

fn chameleon_plan() -> Plan {
    single_action_plan("verify_chameleon", "verify_chameleon", true)
}

fn bluetooth_peer_plan() -> Plan {
    single_action_plan("verify_bluetooth_peer", "verify_bluetooth_peer", true)
}

fn wifi_router_plan() -> Plan {
    single_action_plan("verify_wifi_router", "verify_wifi_router", true)
}

fn cros_plan(action_name: &str, exec_name: &str) -> Plan {
    single_action_plan(action_name, exec_name, false)
}

fn configuration_from(plan_order: Vec<&str>, plans: Vec<(&str, Plan)>) -> Configuration {
    Configuration {
        plan_order: plan_order.into_iter().map(str::to_string).collect(),
        plans: plans
            .into_iter()
            .map(|(name, plan)| (name.to_string(), plan))
            .collect(),
    }
}

fn cros_recovery_configuration() -> Configuration {
    configuration_from(
        vec!["servo", "cros", "chameleon", "bluetooth_peer", "wifi_router", "close"],
        vec![
            ("servo", servo_plan_recovery()),
            ("cros", cros_plan("repair_dut", "repair_dut")),
            ("chameleon", chameleon_plan()),
            ("bluetooth_peer", bluetooth_peer_plan()),
            ("wifi_router", wifi_router_plan()),
            ("close", close_plan()),
        ],
    )
}

fn cros_deploy_configuration() -> Configuration {
    configuration_from(
        vec!["servo", "cros", "chameleon", "bluetooth_peer", "wifi_router", "close"],
        vec![
            ("servo", servo_plan_deploy()),
            ("cros", cros_plan("provision_dut", "provision_dut")),
            ("chameleon", chameleon_plan()),
            ("bluetooth_peer", bluetooth_peer_plan()),
            ("wifi_router", wifi_router_plan()),
            ("close", close_plan()),
        ],
    )
}

fn labstation_configuration() -> Configuration {
    configuration_from(
        vec!["cros", "close"],
        vec![
            ("cros", cros_plan("repair_labstation", "repair_labstation")),
            ("close", close_plan()),
        ],
    )
}

fn android_configuration() -> Configuration {
    configuration_from(
        vec!["cros", "close"],
        vec![
            ("cros", cros_plan("repair_android", "repair_android")),
            ("close", close_plan()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::validate;

    #[test]
    fn recovery_cros_lists_expected_plans_in_order() {
        let cfg = builtin_configuration(Task::Recovery, SetupType::Cros).unwrap();
        assert_eq!(
            cfg.plan_order,
            vec!["servo", "cros", "chameleon", "bluetooth_peer", "wifi_router", "close"]
        );
    }

    #[test]
    fn custom_task_has_no_built_in_mapping() {
        let err = builtin_configuration(Task::Custom, SetupType::Cros).unwrap_err();
        assert!(matches!(err, CatalogError::CustomRequiresCallerConfig));
    }

    #[test]
    fn jetstream_has_no_built_in_mapping() {
        let err = builtin_configuration(Task::Recovery, SetupType::Jetstream).unwrap_err();
        assert!(matches!(err, CatalogError::NoMapping { .. }));
    }

    #[test]
    fn download_to_usb_has_no_built_in_mapping_for_any_setup() {
        let err = builtin_configuration(Task::DownloadToUsb, SetupType::Cros).unwrap_err();
        assert!(matches!(err, CatalogError::NoMapping { .. }));
    }

    #[test]
    fn close_plan_validates_against_the_core_registry_alone() {
        let mut cfg = configuration_from(vec!["close"], vec![("close", close_plan())]);
        let exists = |name: &str| matches!(name, "sample_pass" | "sample_fail" | "sample_sleep");
        assert!(validate(&mut cfg, &exists).is_ok());
    }

    #[test]
    fn peripheral_plans_fail_validation_against_the_core_registry_alone() {
        let mut cfg = cros_recovery_configuration();
        let exists = |name: &str| matches!(name, "sample_pass" | "sample_fail" | "sample_sleep");
        let errs = validate(&mut cfg, &exists).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, crate::errors::LoadError::UnknownExec { exec, .. } if exec == "verify_servo")));
    }

    #[test]
    fn deploy_cros_lists_the_same_peripheral_plans_as_recovery() {
        let cfg = builtin_configuration(Task::Deploy, SetupType::Cros).unwrap();
        assert_eq!(
            cfg.plan_order,
            vec!["servo", "cros", "chameleon", "bluetooth_peer", "wifi_router", "close"]
        );
    }

    #[test]
    fn deploy_servo_plan_does_not_allow_fail_but_recovery_servo_plan_does() {
        let deploy = builtin_configuration(Task::Deploy, SetupType::Cros).unwrap();
        let recovery = builtin_configuration(Task::Recovery, SetupType::Cros).unwrap();
        assert!(!deploy.plans["servo"].allow_fail);
        assert!(recovery.plans["servo"].allow_fail);
    }
}
