//! The engine driver (C6): resolves a unit to its resources, fetches
//! device records, selects a configuration, loads/validates it, runs its
//! plans per resource in order, and always runs the closing plan.

use crate::catalog::{builtin_configuration, CatalogError, Task};
use crate::context::{CancellationToken, ExecContext};
use crate::engine::plan::{run_plan, PlanOutcome};
use crate::errors::EngineError;
use crate::inventory::{DeviceRecord, InventoryClient, SetupType};
use crate::loader::{load_and_validate, validate};
use crate::model::{Configuration, Plan};
use crate::registry::Registry;
use crate::telemetry::Logger;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Engine {
    inventory: Arc<dyn InventoryClient>,
    registry: Arc<Registry>,
    logger: Logger,
}

/// Inputs to one engine run: which unit, which task, and where the
/// configuration comes from.
pub struct EngineArgs {
    pub unit_name: String,
    pub task: Task,
    /// Raw configuration text for `Task::Custom`; ignored for built-in
    /// tasks, which always resolve through the catalog.
    pub config_text: Option<String>,
    pub recovery_enabled: bool,
    pub update_inventory: bool,
    pub cancellation: Option<CancellationToken>,
}

impl EngineArgs {
    pub fn new(unit_name: impl Into<String>, task: Task) -> Self {
        Self {
            unit_name: unit_name.into(),
            task,
            config_text: None,
            recovery_enabled: true,
            update_inventory: false,
            cancellation: None,
        }
    }
}

/// One plan's outcome against one resource, surfaced for reporting.
#[derive(Debug, Clone)]
pub struct PlanRunRecord {
    pub resource_name: String,
    pub plan_name: String,
    pub outcome: PlanOutcome,
}

#[derive(Debug)]
pub struct EngineOutcome {
    pub passed: bool,
    pub plan_runs: Vec<PlanRunRecord>,
}

impl Engine {
    pub fn new(inventory: Arc<dyn InventoryClient>, registry: Arc<Registry>, logger: Logger) -> Self {
        Self {
            inventory,
            registry,
            logger,
        }
    }

    pub async fn run(&self, args: EngineArgs) -> Result<EngineOutcome, EngineError> {
        let cancellation = args.cancellation.clone().unwrap_or_default();

        let resources = self
            .inventory
            .list_resources_for_unit(&args.unit_name)
            .await
            .map_err(|e| EngineError::InventoryRead(args.unit_name.clone(), e))?;

        let mut plan_runs = Vec::new();
        let mut passed = true;

        for resource_name in &resources {
            if cancellation.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let outcome = self
                .run_for_resource(resource_name, &args, &cancellation)
                .await?;
            passed &= outcome.0;
            plan_runs.extend(outcome.1);
        }

        Ok(EngineOutcome { passed, plan_runs })
    }

    async fn run_for_resource(
        &self,
        resource_name: &str,
        args: &EngineArgs,
        cancellation: &CancellationToken,
    ) -> Result<(bool, Vec<PlanRunRecord>), EngineError> {
        let device = self
            .inventory
            .get_dut(resource_name)
            .await
            .map_err(|e| EngineError::InventoryRead(resource_name.to_string(), e))?;
        let setup_type = device.setup_type.unwrap_or(SetupType::Other);

        let configuration = self.select_configuration(resource_name, args, setup_type)?;
        let device = Arc::new(RwLock::new(device));
        let exec_ctx = ExecContext::new(device.clone(), self.logger.clone(), cancellation.clone());

        let mut records = Vec::new();
        let mut resource_failed = false;

        for (plan_name, plan) in configuration.plans_in_order() {
            let Some(plan) = plan else { continue };

            if plan_name == "close" {
                continue;
            }

            if resource_failed || cancellation.is_cancelled() {
                self.logger
                    .info(&format!("skipping plan `{plan_name}` on `{resource_name}` after earlier failure"));
                continue;
            }

            for outcome in self
                .run_plan_for_kind(plan_name, plan, &device, &exec_ctx, args.recovery_enabled)
                .await
            {
                if outcome.is_failure() {
                    resource_failed = true;
                }
                records.push(PlanRunRecord {
                    resource_name: resource_name.to_string(),
                    plan_name: plan_name.to_string(),
                    outcome,
                });
            }
        }

        // The closing plan always runs, regardless of earlier failures or of
        // the run's own cancellation — it gets a fresh cancellation token so
        // only a cancellation of the close plan itself could abort it.
        if let Some(close_plan) = configuration.plans.get("close") {
            let close_ctx = ExecContext::new(device.clone(), self.logger.clone(), CancellationToken::new());
            let outcome = run_plan("close", close_plan, self.registry.clone(), args.recovery_enabled, &close_ctx).await;
            records.push(PlanRunRecord {
                resource_name: resource_name.to_string(),
                plan_name: "close".to_string(),
                outcome,
            });
        }

        if args.update_inventory {
            let record = device.read().await.clone();
            self.inventory
                .update_dut(&record)
                .await
                .map_err(|e| EngineError::InventoryWrite(resource_name.to_string(), e))?;
        }

        Ok((!resource_failed, records))
    }

    /// Peripheral plans (`servo`, `chameleon`, `bluetooth_peer`,
    /// `wifi_router`) only apply when the device record carries the
    /// matching peripheral, and `bluetooth_peer`/`wifi_router` run once
    /// per entry rather than once for the whole plan.
    async fn run_plan_for_kind(
        &self,
        plan_name: &str,
        plan: &Plan,
        device: &Arc<RwLock<DeviceRecord>>,
        exec_ctx: &ExecContext,
        recovery_enabled: bool,
    ) -> Vec<PlanOutcome> {
        let repeats = {
            let d = device.read().await;
            match plan_name {
                "servo" => usize::from(d.servo_host.is_some()),
                "chameleon" => usize::from(d.chameleon_host.is_some()),
                "bluetooth_peer" => d.bluetooth_peers.len(),
                "wifi_router" => d.wifi_routers.len(),
                _ => 1,
            }
        };

        if repeats == 0 {
            self.logger
                .debug(&format!("plan `{plan_name}`: no matching resource, skipped"));
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(repeats);
        for _ in 0..repeats {
            outcomes.push(run_plan(plan_name, plan, self.registry.clone(), recovery_enabled, exec_ctx).await);
        }
        outcomes
    }

    fn select_configuration(
        &self,
        resource_name: &str,
        args: &EngineArgs,
        setup_type: SetupType,
    ) -> Result<Configuration, EngineError> {
        let exists = |name: &str| self.registry.exists(name);

        match (&args.task, &args.config_text) {
            (Task::Custom, Some(text)) => load_and_validate(text, &exists)
                .map_err(|errs| EngineError::ConfigurationInvalid(resource_name.to_string(), errs)),
            (Task::Custom, None) => Err(EngineError::ConfigurationInvalid(
                resource_name.to_string(),
                vec![crate::errors::LoadError::Empty],
            )),
            (task, _) => {
                let mut cfg = builtin_configuration(*task, setup_type).map_err(|e| match e {
                    CatalogError::NoMapping { .. } => EngineError::NoPlanMapping(resource_name.to_string()),
                    CatalogError::CustomRequiresCallerConfig => {
                        EngineError::ConfigurationInvalid(resource_name.to_string(), vec![crate::errors::LoadError::Empty])
                    }
                })?;
                validate(&mut cfg, &exists)
                    .map_err(|errs| EngineError::ConfigurationInvalid(resource_name.to_string(), errs))?;
                Ok(cfg)
            }
        }
    }
}
