//! Structured logging and tracing setup.
//!
//! `TelemetryConfig`/`init_telemetry`/`shutdown_telemetry` wire `tracing`
//! up to an optional OpenTelemetry OTLP exporter; this is the ambient
//! observability layer every run gets, independent of whether a caller
//! asked for it. `Logger` and `StepSpan` implement the narrower logger
//! and step-reporter contracts the action runner threads through its
//! execution context.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Telemetry configuration, overridable via the standard `OTEL_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub sampling_ratio: f64,
    pub enable_console_logging: bool,
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "fleet-recovery-engine".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }
        if let Ok(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
            if let Ok(r) = ratio.parse::<f64>() {
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }

        config
    }
}

/// Initializes the global `tracing` subscriber, optionally layering in an
/// OTLP exporter. Returns the `Tracer` handle when OTLP was configured, so
/// the caller can decide whether a shutdown flush is needed.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(endpoint) = &config.otlp_endpoint {
        let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;
        let telemetry_layer = OpenTelemetryLayer::new(tracer.clone());
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(telemetry_layer);

        if config.enable_console_logging {
            subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
        } else {
            subscriber.init();
        }

        tracing::info!(
            service_name = %config.service_name,
            endpoint = %endpoint,
            sampling_ratio = config.sampling_ratio,
            "telemetry initialized with OTLP export"
        );
        Ok(Some(tracer))
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter);
        if config.enable_console_logging {
            subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
        } else {
            subscriber.init();
        }
        tracing::info!("telemetry initialized (console only, no OTLP)");
        Ok(None)
    }
}

fn init_otlp_tracer(service_name: &str, endpoint: &str, sampling_ratio: f64) -> anyhow::Result<Tracer> {
    let sampler = if sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_ratio)
    };

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);
    Ok(tracer)
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    tracing::info!("telemetry shut down");
}

/// The logger contract the action runner threads through its execution
/// context: four levels, and indent/dedent so nested action evaluation
/// reads as nested log output.
#[derive(Clone, Default)]
pub struct Logger {
    depth: Arc<AtomicUsize>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix(&self) -> String {
        "  ".repeat(self.depth.load(Ordering::Relaxed))
    }

    pub fn debug(&self, msg: &str) {
        tracing::debug!("{}{}", self.prefix(), msg);
    }

    pub fn info(&self, msg: &str) {
        tracing::info!("{}{}", self.prefix(), msg);
    }

    pub fn warn(&self, msg: &str) {
        tracing::warn!("{}{}", self.prefix(), msg);
    }

    pub fn error(&self, msg: &str) {
        tracing::error!("{}{}", self.prefix(), msg);
    }

    /// Increments the nesting depth for the lifetime of the returned
    /// guard; dropping it restores the previous depth, even on unwind.
    pub fn indent(&self) -> IndentGuard {
        self.depth.fetch_add(1, Ordering::Relaxed);
        IndentGuard { depth: self.depth.clone() }
    }

    /// No-op hook point for a future sink flush; present so callers that
    /// expect a `close()` on the logger contract have one to call.
    pub fn close(&self) {}
}

pub struct IndentGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for IndentGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The step-reporter contract: `StartStep(name) -> (step, ctx)`,
/// `step.Close(ctx, err)`. Steps nest (by virtue of each holding its own
/// `Logger::indent` guard) and may be no-ops when nobody reads them.
pub struct StepSpan {
    name: String,
    start: Instant,
    _indent: IndentGuard,
}

impl StepSpan {
    pub fn start(logger: &Logger, name: impl Into<String>) -> Self {
        let name = name.into();
        logger.debug(&format!("-> {name}"));
        Self {
            name,
            start: Instant::now(),
            _indent: logger.indent(),
        }
    }

    pub fn close(self, logger: &Logger, err: Option<&str>) {
        let elapsed_ms = self.start.elapsed().as_millis();
        match err {
            Some(e) => logger.warn(&format!("<- {} failed after {elapsed_ms}ms: {e}", self.name)),
            None => logger.debug(&format!("<- {} ({elapsed_ms}ms)", self.name)),
        }
    }
}
