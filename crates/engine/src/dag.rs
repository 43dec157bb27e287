//! Dependency-graph queries over a [`Workflow`].
//!
//! - [`ready_steps`] computes the dispatchable frontier for the execution loop.
//! - [`plan_frontiers`] simulates the loop up front (every step assumed to
//!   succeed) and reports the rounds it would run, or the steps that would
//!   deadlock.
//!
//! A dependency on a step id that is not part of the workflow is never
//! satisfied.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::models::{Step, StepStatus, Workflow};
use crate::EngineError;

/// Steps that are `Pending` and whose dependencies are all in `completed`,
/// in insertion order.
pub fn ready_steps<'a>(workflow: &'a Workflow, completed: &HashSet<String>) -> Vec<&'a Step> {
    workflow
        .steps
        .values()
        .filter(|step| step.status == StepStatus::Pending)
        .filter(|step| step.dependencies.iter().all(|dep| completed.contains(dep)))
        .collect()
}

/// Level-order plan of the workflow: one entry per round the execution loop
/// would dispatch if nothing failed.
///
/// # Errors
/// - [`EngineError::Deadlock`] if some steps can never become ready (cycle,
///   self-dependency, or dependency on a missing step).
pub fn plan_frontiers(workflow: &Workflow) -> Result<Vec<Vec<String>>, EngineError> {
    // -----------------------------------------------------------------------
    // Build in-degree and reverse adjacency (dependency → dependents).
    // -----------------------------------------------------------------------
    let mut in_degree: IndexMap<&str, usize> = IndexMap::with_capacity(workflow.steps.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in workflow.steps.values() {
        let deps: HashSet<&str> = step.dependencies.iter().map(String::as_str).collect();
        in_degree.insert(step.step_id.as_str(), deps.len());

        for dep in deps {
            // Missing dependencies keep their dependent's in-degree above zero.
            if workflow.steps.contains_key(dep) {
                dependents.entry(dep).or_default().push(step.step_id.as_str());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Kahn's algorithm, one frontier at a time.
    // -----------------------------------------------------------------------
    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut plan: Vec<Vec<String>> = Vec::new();
    let mut planned = 0usize;

    while !frontier.is_empty() {
        planned += frontier.len();

        let mut next: Vec<&str> = Vec::new();
        for &step_id in &frontier {
            for &dependent in dependents.get(step_id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(dependent);
                    }
                }
            }
        }
        next.sort_by_key(|id| in_degree.get_index_of(id));

        plan.push(frontier.iter().map(|&id| id.to_owned()).collect());
        frontier = next;
    }

    if planned != workflow.steps.len() {
        let stuck = in_degree
            .iter()
            .filter(|(_, &d)| d > 0)
            .map(|(&id, _)| id.to_owned())
            .collect();
        return Err(EngineError::Deadlock { stuck });
    }

    Ok(plan)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn make_workflow(steps: &[(&str, &[&str])]) -> Workflow {
        let mut wf = Workflow::new("test");
        for (id, deps) in steps {
            let deps = deps.iter().map(|d| d.to_string()).collect();
            wf.add_step(Step::new(*id, id.to_uppercase(), "noop", deps))
                .expect("unique ids");
        }
        wf
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn ids(steps: Vec<&Step>) -> Vec<&str> {
        steps.into_iter().map(|s| s.step_id.as_str()).collect()
    }

    #[test]
    fn roots_are_ready_first() {
        let wf = make_workflow(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        assert_eq!(ids(ready_steps(&wf, &completed(&[]))), vec!["a", "c"]);
    }

    #[test]
    fn dependents_become_ready_once_dependencies_complete() {
        let mut wf = make_workflow(&[("a", &[]), ("b", &["a"])]);
        wf.steps["a"].status = StepStatus::Completed;

        assert_eq!(ids(ready_steps(&wf, &completed(&["a"]))), vec!["b"]);
    }

    #[test]
    fn running_and_terminal_steps_are_never_ready() {
        let mut wf = make_workflow(&[("a", &[]), ("b", &[]), ("c", &[])]);
        wf.steps["a"].status = StepStatus::Running;
        wf.steps["b"].status = StepStatus::Failed;

        assert_eq!(ids(ready_steps(&wf, &completed(&[]))), vec!["c"]);
    }

    #[test]
    fn missing_dependency_is_never_ready() {
        let wf = make_workflow(&[("a", &["ghost"])]);
        assert!(ready_steps(&wf, &completed(&[])).is_empty());
    }

    #[test]
    fn diamond_plans_three_rounds() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let wf = make_workflow(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]);

        let plan = plan_frontiers(&wf).expect("should be a valid DAG");
        assert_eq!(plan, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn plan_keeps_insertion_order_and_allows_forward_references() {
        // "late" is referenced before it is added.
        let wf = make_workflow(&[("x", &["late"]), ("late", &[]), ("y", &["late"])]);

        let plan = plan_frontiers(&wf).expect("should be a valid DAG");
        assert_eq!(plan, vec![vec!["late"], vec!["x", "y"]]);
    }

    #[test]
    fn repeated_dependency_counts_once() {
        let wf = make_workflow(&[("a", &[]), ("b", &["a", "a"])]);
        assert_eq!(plan_frontiers(&wf).unwrap(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn cycle_is_reported_as_deadlock() {
        let wf = make_workflow(&[("ok", &[]), ("x", &["y"]), ("y", &["x"])]);

        assert!(matches!(
            plan_frontiers(&wf),
            Err(EngineError::Deadlock { stuck }) if stuck == vec!["x", "y"]
        ));
    }

    #[test]
    fn self_dependency_and_dangling_reference_deadlock() {
        let wf = make_workflow(&[("me", &["me"]), ("orphan", &["ghost"]), ("after", &["orphan"])]);

        let err = plan_frontiers(&wf).unwrap_err();
        assert!(matches!(
            &err,
            EngineError::Deadlock { stuck } if stuck == &vec!["me", "orphan", "after"]
        ));
        assert_eq!(
            err.to_string(),
            "deadlock: steps can never become ready: me, orphan, after"
        );
    }

    #[test]
    fn empty_workflow_has_empty_plan() {
        let wf = make_workflow(&[]);
        assert!(plan_frontiers(&wf).unwrap().is_empty());
    }
}
