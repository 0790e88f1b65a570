//! Phase 3: multi-objective registration.
//!
//! Registers the objective dimensions (makespan, lateness, cost,
//! utilization) and the caller's scalarization: a lexicographic priority
//! list when supplied, otherwise the weighted sum. Due-date groups are
//! created here so lateness is defined per instance over its last task.

use tracing::debug;

use crate::cp::{CpModel, DueDate, ObjectiveKind, Scalarization};
use crate::models::{Objective, Problem};

use super::vars::VarTable;

/// Family 12: objective registration.
pub fn register_objectives(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let mut dues = 0usize;
    for (instance_idx, instance) in problem.instances.iter().enumerate() {
        let Some(due) = instance.due_unit else {
            continue;
        };
        let members = (0..problem.template.tasks.len())
            .map(|task_idx| vars.interval_at(instance_idx, task_idx))
            .collect();
        model.add_due_date(DueDate {
            owner: instance.id.clone(),
            members,
            due,
        });
        dues += 1;
    }

    let params = problem.effective_parameters();
    let scalarization = match &params.objective_lex_order {
        Some(order) if !order.is_empty() => {
            Scalarization::Lexicographic(order.iter().map(|&o| kind_of(o)).collect())
        }
        _ => {
            let weights = &params.objective_weights;
            let terms: Vec<(ObjectiveKind, f64)> = [
                (ObjectiveKind::Makespan, weights.makespan),
                (ObjectiveKind::TotalLateness, weights.total_lateness),
                (ObjectiveKind::MaxLateness, weights.max_lateness),
                (ObjectiveKind::TotalCost, weights.total_cost),
                (ObjectiveKind::Utilization, weights.utilization),
            ]
            .into_iter()
            .filter(|&(_, w)| w > 0.0)
            .collect();
            Scalarization::Weighted(terms)
        }
    };
    model.set_scalarization(scalarization);
    debug!(dues, "objectives registered");
}

/// Maps the wire objective name onto the engine dimension.
fn kind_of(objective: Objective) -> ObjectiveKind {
    match objective {
        Objective::Makespan => ObjectiveKind::Makespan,
        Objective::TotalLateness => ObjectiveKind::TotalLateness,
        Objective::MaxLateness => ObjectiveKind::MaxLateness,
        Objective::TotalCost => ObjectiveKind::TotalCost,
        Objective::Utilization => ObjectiveKind::Utilization,
    }
}
