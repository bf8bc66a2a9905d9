//! Parses configuration text, materialises implied actions, and validates
//! the result before the engine ever touches it.
//!
//! `load` and `validate` are kept separate, mirroring the two operations
//! the config loader exposes: a caller that already trusts a configuration
//! (e.g. one freshly materialised from the built-in catalog and known to
//! reference only core execs) can skip straight to `load`, while anything
//! arriving from outside the process should go through
//! [`load_and_validate`].

use crate::errors::LoadError;
use crate::model::{Action, Configuration, Plan};
use std::collections::HashMap;

/// Parses `text` into a [`Configuration`] and auto-materialises any action
/// name referenced by `critical_actions`, `conditions`, `dependencies`, or
/// `recovery_actions` that has no entry in the plan's action map.
pub fn load(text: &str) -> Result<Configuration, LoadError> {
    if text.trim().is_empty() {
        return Err(LoadError::Empty);
    }

    let mut cfg: Configuration = serde_json::from_str(text)?;

    if cfg.plan_order.is_empty() {
        return Err(LoadError::Empty);
    }

    for plan in cfg.plans.values_mut() {
        materialise_plan(plan);
    }

    Ok(cfg)
}

/// Fills in any action referenced but not defined with an empty,
/// auto-materialised body. A single pass suffices: a materialised action
/// has no edges of its own, so it cannot introduce a further reference.
fn materialise_plan(plan: &mut Plan) {
    let mut referenced: Vec<String> = plan.critical_actions.clone();
    for action in plan.actions.values() {
        referenced.extend(action.conditions.iter().cloned());
        referenced.extend(action.dependencies.iter().cloned());
        referenced.extend(action.recovery_actions.iter().cloned());
    }
    for name in referenced {
        plan.actions.entry(name).or_insert_with(Action::materialised);
    }
}

/// Validates a materialised configuration against the exec registry's
/// `Exists` predicate: checks that every plan's reachable action subgraph
/// is acyclic, and that every action's resolved exec name is registered.
/// Fills in `exec_name` defaults along the way.
///
/// Returns every violation found rather than stopping at the first, so a
/// caller gets the complete picture of a broken configuration in one pass.
pub fn validate(
    cfg: &mut Configuration,
    exec_exists: &dyn Fn(&str) -> bool,
) -> Result<(), Vec<LoadError>> {
    let mut errors = Vec::new();

    for plan_name in &cfg.plan_order {
        if !cfg.plans.contains_key(plan_name) {
            errors.push(LoadError::UnknownPlan(plan_name.clone()));
        }
    }

    for (plan_name, plan) in cfg.plans.iter_mut() {
        if let Err(e) = check_plan_cycles(plan_name, plan) {
            errors.push(e);
        }

        let mut names: Vec<String> = plan.actions.keys().cloned().collect();
        names.sort();
        for name in names {
            let action = plan.actions.get_mut(&name).expect("name came from this map");
            if action.exec_name.as_deref().map_or(true, |s| s.is_empty()) {
                action.exec_name = Some(name.clone());
            }
            let exec_name = action.exec_name.clone().expect("just set above");
            if !exec_exists(&exec_name) {
                errors.push(LoadError::UnknownExec {
                    plan: plan_name.clone(),
                    action: name,
                    exec: exec_name,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Convenience wrapper combining [`load`] and [`validate`] for the common
/// case of a configuration arriving from outside the process.
pub fn load_and_validate(
    text: &str,
    exec_exists: &dyn Fn(&str) -> bool,
) -> Result<Configuration, Vec<LoadError>> {
    let mut cfg = load(text).map_err(|e| vec![e])?;
    validate(&mut cfg, exec_exists)?;
    Ok(cfg)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first cycle detection over `conditions ∪ dependencies ∪
/// recovery_actions`, started only from each critical action. Colors are
/// shared across all starts within a plan so work already proven acyclic
/// is not repeated; a node currently on the recursion stack (gray) being
/// revisited is the cycle.
fn check_plan_cycles(plan_name: &str, plan: &Plan) -> Result<(), LoadError> {
    let mut colors: HashMap<&str, Color> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    for start in &plan.critical_actions {
        if let Some(chain) = dfs(plan, start.as_str(), &mut colors, &mut stack) {
            return Err(LoadError::Cycle {
                plan: plan_name.to_string(),
                cycle: chain.join(" -> "),
            });
        }
    }
    Ok(())
}

fn dfs<'a>(
    plan: &'a Plan,
    node: &'a str,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match colors.get(node) {
        Some(Color::Black) => return None,
        Some(Color::Gray) => {
            let start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let mut chain: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            chain.push(node.to_string());
            return Some(chain);
        }
        _ => {}
    }

    colors.insert(node, Color::Gray);
    stack.push(node);

    if let Some(action) = plan.actions.get(node) {
        let edges = action
            .conditions
            .iter()
            .chain(action.dependencies.iter())
            .chain(action.recovery_actions.iter());
        for next in edges {
            if let Some(chain) = dfs(plan, next.as_str(), colors, stack) {
                return Some(chain);
            }
        }
    }

    stack.pop();
    colors.insert(node, Color::Black);
    None
}
