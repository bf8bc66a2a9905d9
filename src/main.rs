//! Entry point: parses CLI arguments, wires up telemetry, an in-memory
//! inventory seeded from a device-record file, and the exec registry,
//! then drives one engine run and reports the outcome.
//!
//! A live inventory client (talking to a real fleet-management backend)
//! and a task-submission/queueing surface are both out of scope here —
//! this binary always seeds a local [`inventory::MemoryInventory`] from a
//! file and runs exactly one unit synchronously.

mod catalog;
mod context;
mod engine;
mod errors;
mod inventory;
mod loader;
mod model;
mod registry;
mod telemetry;

#[cfg(test)]
mod integration_tests;

use catalog::Task;
use clap::{Parser, Subcommand, ValueEnum};
use engine::{Engine, EngineArgs};
use inventory::{DeviceRecord, MemoryInventory};
use registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::{init_telemetry, shutdown_telemetry, Logger, TelemetryConfig};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "recoveryd")]
#[command(about = "Fleet device recovery engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a single task against a single unit.
    Run {
        /// Unit name to resolve against the inventory.
        #[arg(long)]
        unit: String,

        #[arg(long, value_enum)]
        task: TaskArg,

        /// JSON `DeviceRecord` used to seed the in-memory inventory that
        /// stands in for a live fleet-management backend.
        #[arg(long)]
        device_record: PathBuf,

        /// Configuration JSON, required when `--task custom`.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Writes the (possibly exec-mutated) device record back to the
        /// inventory after the run completes.
        #[arg(long, default_value_t = false)]
        update_inventory: bool,

        /// Disables the recovery-action loop; a failing action fails
        /// immediately instead of attempting its recovery actions.
        #[arg(long, default_value_t = false)]
        no_recovery: bool,

        #[arg(long, default_value_t = false)]
        otel: bool,

        #[arg(long)]
        otel_endpoint: Option<String>,

        #[arg(long, short = 's', default_value_t = false)]
        silent: bool,

        #[arg(long, short = 'v', default_value_t = false)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TaskArg {
    Recovery,
    Deploy,
    Custom,
    DownloadToUsb,
    Reserve,
}

impl From<TaskArg> for Task {
    fn from(value: TaskArg) -> Self {
        match value {
            TaskArg::Recovery => Task::Recovery,
            TaskArg::Deploy => Task::Deploy,
            TaskArg::Custom => Task::Custom,
            TaskArg::DownloadToUsb => Task::DownloadToUsb,
            TaskArg::Reserve => Task::Reserve,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            unit,
            task,
            device_record,
            config,
            update_inventory,
            no_recovery,
            otel,
            otel_endpoint,
            silent,
            verbose,
        } => {
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if silent {
                Level::ERROR
            } else if verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };
            if otel {
                telemetry_config.otlp_endpoint =
                    otel_endpoint.or(telemetry_config.otlp_endpoint).or(Some("http://localhost:4317".to_string()));
            }

            if let Err(e) = init_telemetry(telemetry_config) {
                if !silent {
                    eprintln!("warning: failed to initialize telemetry: {e}");
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let exit_code = run(unit, task.into(), device_record, config, update_inventory, !no_recovery, silent).await;

            shutdown_telemetry();
            std::process::exit(exit_code);
        }
    }
}

async fn run(
    unit: String,
    task: Task,
    device_record_path: PathBuf,
    config_path: Option<PathBuf>,
    update_inventory: bool,
    recovery_enabled: bool,
    silent: bool,
) -> i32 {
    let record_text = match std::fs::read_to_string(&device_record_path) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %device_record_path.display(), error = %e, "failed to read device record");
            return 1;
        }
    };
    let device: DeviceRecord = match serde_json::from_str(&record_text) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to parse device record");
            return 1;
        }
    };

    let config_text = match &config_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read configuration");
                return 1;
            }
        },
        None => None,
    };

    let inventory = Arc::new(MemoryInventory::new());
    let resource_name = device.name.clone();
    inventory.seed(unit.clone(), resource_name, device).await;

    let registry = Arc::new(Registry::with_builtins());
    let engine = Engine::new(inventory, registry, Logger::new());

    let mut args = EngineArgs::new(unit.clone(), task);
    args.config_text = config_text;
    args.recovery_enabled = recovery_enabled;
    args.update_inventory = update_inventory;

    match engine.run(args).await {
        Ok(outcome) => {
            if !silent {
                info!(unit = %unit, passed = outcome.passed, "run finished");
                for record in &outcome.plan_runs {
                    info!(
                        resource = %record.resource_name,
                        plan = %record.plan_name,
                        outcome = ?record.outcome,
                        "plan outcome"
                    );
                }
            }
            if outcome.passed {
                0
            } else {
                1
            }
        }
        Err(e) => {
            error!(unit = %unit, error = %e, code = e.code(), "run failed");
            1
        }
    }
}
