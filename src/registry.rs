//! The exec registry: a process-wide, name-keyed table of repair/verify
//! primitives.
//!
//! Modelled as a capability table rather than virtual dispatch through
//! inheritance, per the design note on dynamic exec dispatch: a plain
//! `HashMap<String, Arc<dyn Exec>>` is the lookup structure, and new execs
//! register by name once at process init. After construction the registry
//! is read-only — the core never mutates it mid-run.

use crate::context::ExecContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A named repair/verify primitive: `(ctx, execCtx, extraArgs) -> error`.
#[async_trait]
pub trait Exec: Send + Sync {
    async fn invoke(&self, ctx: &ExecContext, args: &[String]) -> anyhow::Result<()>;
}

/// Maps exec name to callable. `exists` backs the loader's `execExists`
/// callback; `invoke` backs the action runner's exec step.
#[derive(Clone, Default)]
pub struct Registry {
    execs: HashMap<String, Arc<dyn Exec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The core's built-in sample execs, required by the closing plan and
    /// by the testable-property scenarios: `sample_pass`, `sample_fail`,
    /// `sample_sleep`. All device-facing execs are external and must be
    /// registered by the caller.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sample_pass", Arc::new(SamplePass));
        registry.register("sample_fail", Arc::new(SampleFail));
        registry.register("sample_sleep", Arc::new(SampleSleep));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, exec: Arc<dyn Exec>) {
        self.execs.insert(name.into(), exec);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.execs.contains_key(name)
    }

    pub async fn invoke(&self, name: &str, ctx: &ExecContext, args: &[String]) -> anyhow::Result<()> {
        let exec = self
            .execs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("exec `{name}` is not registered"))?
            .clone();
        exec.invoke(ctx, args).await
    }
}

struct SamplePass;

#[async_trait]
impl Exec for SamplePass {
    async fn invoke(&self, ctx: &ExecContext, _args: &[String]) -> anyhow::Result<()> {
        ctx.logger.debug("sample_pass: ok");
        Ok(())
    }
}

struct SampleFail;

#[async_trait]
impl Exec for SampleFail {
    async fn invoke(&self, ctx: &ExecContext, _args: &[String]) -> anyhow::Result<()> {
        ctx.logger.debug("sample_fail: synthetic failure");
        Err(anyhow::anyhow!("sample_fail: synthetic failure"))
    }
}

/// Interprets a `sleep:<seconds>` entry in `extraArgs`; sleeps that many
/// seconds and passes. Absent the arg, it is a zero-duration no-op.
struct SampleSleep;

#[async_trait]
impl Exec for SampleSleep {
    async fn invoke(&self, ctx: &ExecContext, args: &[String]) -> anyhow::Result<()> {
        let secs = args
            .iter()
            .find_map(|arg| arg.strip_prefix("sleep:"))
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        ctx.logger.debug(&format!("sample_sleep: sleeping {secs}s"));
        tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::inventory::DeviceRecord;
    use crate::telemetry::Logger;
    use tokio::sync::RwLock;

    fn ctx() -> ExecContext {
        ExecContext::new(
            Arc::new(RwLock::new(DeviceRecord::default())),
            Logger::new(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert!(registry.exists("sample_pass"));
        assert!(registry.exists("sample_fail"));
        assert!(registry.exists("sample_sleep"));
        assert!(!registry.exists("flash_firmware"));
    }

    #[tokio::test]
    async fn sample_pass_always_succeeds() {
        let registry = Registry::with_builtins();
        assert!(registry.invoke("sample_pass", &ctx(), &[]).await.is_ok());
    }

    #[tokio::test]
    async fn sample_fail_always_fails() {
        let registry = Registry::with_builtins();
        assert!(registry.invoke("sample_fail", &ctx(), &[]).await.is_err());
    }

    #[tokio::test]
    async fn sample_sleep_parses_seconds_argument() {
        let registry = Registry::with_builtins();
        let start = std::time::Instant::now();
        registry
            .invoke("sample_sleep", &ctx(), &["sleep:0".to_string()])
            .await
            .unwrap();
        assert!(start.elapsed() < std::time::Duration::from_millis(200));
    }

    #[tokio::test]
    async fn invoking_unregistered_exec_errors() {
        let registry = Registry::with_builtins();
        assert!(registry.invoke("flash_firmware", &ctx(), &[]).await.is_err());
    }
}
