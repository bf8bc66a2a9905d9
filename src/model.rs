//! Typed representation of configurations, plans, and actions.
//!
//! This is the data the loader produces and the engine walks. Nothing in
//! here talks to a device, a registry, or an inventory — it is a pure,
//! serializable description of what the engine should do, mirroring the
//! wire format described for the loader.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::time::Duration;

/// An ordered list of plan names plus the plan bodies that back them.
///
/// The list fixes execution order; the map provides bodies. A name present
/// in `plan_order` but absent from `plans` is a load-time error, caught by
/// [`crate::loader::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub plan_order: Vec<String>,
    pub plans: HashMap<String, Plan>,
}

impl Configuration {
    pub fn plans_in_order(&self) -> impl Iterator<Item = (&str, Option<&Plan>)> {
        self.plan_order
            .iter()
            .map(|name| (name.as_str(), self.plans.get(name)))
    }
}

/// An ordered execution unit: critical actions plus the action map they
/// draw from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Action names that must each succeed (subject to `allow_fail`) for
    /// the plan to pass. Evaluated strictly in this order.
    pub critical_actions: Vec<String>,

    /// All actions reachable from this plan, keyed by name. Populated by
    /// the loader's auto-materialisation pass so every name referenced by
    /// `critical_actions`/`conditions`/`dependencies`/`recovery_actions`
    /// resolves here.
    pub actions: HashMap<String, Action>,

    /// If true, a failure of this plan is logged as a warning but does not
    /// fail the overall unit run.
    #[serde(default)]
    pub allow_fail: bool,
}

/// An edge-labeled node in the action graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    /// Name of the exec function to invoke. Empty/absent defaults to the
    /// action's own name — the loader fills this in at materialisation
    /// time, so by the time the engine sees an `Action` this is always set.
    #[serde(default)]
    pub exec_name: Option<String>,

    /// Ordered `key:value` strings passed opaquely to the exec.
    #[serde(default)]
    pub exec_extra_args: Vec<String>,

    /// Per-invocation timeout. `None` means no enforced bound.
    #[serde(default, with = "duration_spec_opt")]
    pub exec_timeout: Option<Duration>,

    /// Evaluated in non-fatal mode: a failing condition makes this action
    /// report pass as a no-op, it never fails the action outright.
    #[serde(default)]
    pub conditions: Vec<String>,

    /// Evaluated in fatal mode: a failing dependency fails this action and
    /// stops evaluation of any later dependency.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Tried, in order, only after this action's own exec has failed.
    #[serde(default)]
    pub recovery_actions: Vec<String>,

    /// If true, exhausting `recovery_actions` without success is still
    /// reported as a pass (with a warning), rather than a failure.
    #[serde(default)]
    pub allow_fail_after_recovery: bool,

    /// Cache policy consulted before re-running this action.
    #[serde(default)]
    pub run_control: RunControl,
}

impl Action {
    /// An auto-materialised stand-in for a referenced-but-undefined action:
    /// an empty body whose exec name defaults to its own name.
    pub fn materialised() -> Self {
        Self::default()
    }

    /// The name the loader should bind `exec_name` to when it is unset —
    /// the action's own name.
    pub fn resolved_exec_name<'a>(&'a self, own_name: &'a str) -> &'a str {
        self.exec_name.as_deref().unwrap_or(own_name)
    }
}

/// Per-action cache policy, consulted by the plan runner's action cache
/// (see `engine::cache`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunControl {
    /// Cached for the duration of a single top-level critical-action
    /// evaluation; a fresh critical action gets a fresh cache scope.
    #[default]
    RerunAfterRecovery,
    /// Cached for the entire plan run; first result wins.
    RunOnce,
    /// Never cached; every textual reference re-executes.
    AlwaysRun,
}

/// Legacy configurations encoded `run_control` as a bare integer, and the
/// value `1` was overloaded across revisions between "run once" and
/// "always run". We treat the enum as the source of truth: an integer `1`
/// resolves to `RunOnce` with a migration warning; `AlwaysRun` must be
/// requested by name. Integer `0` is the unambiguous default.
impl<'de> Deserialize<'de> for RunControl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(0) => Ok(RunControl::RerunAfterRecovery),
            Repr::Int(1) => {
                tracing::warn!(
                    "run_control encoded as legacy integer 1; treating as RUN_ONCE — \
                     request ALWAYS_RUN by name if that was intended"
                );
                Ok(RunControl::RunOnce)
            }
            Repr::Int(other) => Err(de::Error::custom(format!(
                "unrecognised legacy run_control integer {other}"
            ))),
            Repr::Name(s) => match s.to_ascii_uppercase().as_str() {
                "RERUN_AFTER_RECOVERY" | "" => Ok(RunControl::RerunAfterRecovery),
                "RUN_ONCE" => Ok(RunControl::RunOnce),
                "ALWAYS_RUN" => Ok(RunControl::AlwaysRun),
                other => Err(de::Error::custom(format!("unknown run_control `{other}`"))),
            },
        }
    }
}

/// `{secs, nanos}` wire encoding for `Duration`, per the configuration
/// wire format's duration sub-fields.
mod duration_spec {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct DurationSpec {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DurationSpec {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let spec = DurationSpec::deserialize(d)?;
        Ok(Duration::new(spec.secs, spec.nanos))
    }
}

mod duration_spec_opt {
    use super::*;

    pub fn serialize<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => super::duration_spec::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct DurationSpec {
            secs: u64,
            #[serde(default)]
            nanos: u32,
        }
        let spec: Option<DurationSpec> = Option::deserialize(d)?;
        Ok(spec.map(|s| Duration::new(s.secs, s.nanos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_control_default_is_rerun_after_recovery() {
        assert_eq!(RunControl::default(), RunControl::RerunAfterRecovery);
    }

    #[test]
    fn run_control_legacy_integer_zero() {
        let v: RunControl = serde_json::from_str("0").unwrap();
        assert_eq!(v, RunControl::RerunAfterRecovery);
    }

    #[test]
    fn run_control_legacy_integer_one_resolves_to_run_once() {
        let v: RunControl = serde_json::from_str("1").unwrap();
        assert_eq!(v, RunControl::RunOnce);
    }

    #[test]
    fn run_control_named_always_run() {
        let v: RunControl = serde_json::from_str("\"ALWAYS_RUN\"").unwrap();
        assert_eq!(v, RunControl::AlwaysRun);
    }

    #[test]
    fn action_resolved_exec_name_defaults_to_own_name() {
        let a = Action::default();
        assert_eq!(a.resolved_exec_name("cold_reset"), "cold_reset");
    }

    #[test]
    fn action_exec_timeout_round_trips_through_duration_spec() {
        let json = serde_json::json!({
            "exec_timeout": { "secs": 30, "nanos": 500 }
        });
        let a: Action = serde_json::from_value(json).unwrap();
        assert_eq!(a.exec_timeout, Some(Duration::new(30, 500)));
    }

    #[test]
    fn configuration_plans_in_order_preserves_plan_order() {
        let mut plans = HashMap::new();
        plans.insert("servo".to_string(), Plan::default());
        plans.insert("cros".to_string(), Plan::default());
        let cfg = Configuration {
            plan_order: vec!["servo".to_string(), "cros".to_string()],
            plans,
        };
        let names: Vec<&str> = cfg.plans_in_order().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["servo", "cros"]);
    }
}
