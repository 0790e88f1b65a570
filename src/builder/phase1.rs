//! Phase 1 constraint families: timing and capacity.
//!
//! Mode selection with the duration link, precedence with min/max delays,
//! machine capacity with fixed setup/teardown pads, work-cell WIP limits,
//! and sequence-resource exclusivity. These are the families every solve
//! applies; phase 2 and 3 build on the variables and memberships they
//! establish.

use tracing::debug;

use crate::cp::{CpModel, ModeArm, SequenceDecl, Span, WipGroup};
use crate::models::Problem;

use super::vars::VarTable;

/// Families 1 and 2: exactly-one mode per (instance, task) and the
/// duration-from-mode link.
///
/// Each mode becomes an arm of the pair's interval: selecting the arm is
/// the mode boolean, the arm's duration is the linked duration, and the
/// arm's resource is the machine-assignment boolean.
pub fn apply_mode_alternatives(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let mut arms = 0usize;
    for instance_idx in 0..problem.instances.len() {
        for (task_idx, task) in problem.template.tasks.iter().enumerate() {
            let interval = vars.interval_at(instance_idx, task_idx);
            for mode in &task.modes {
                let resource = vars
                    .machine(&mode.machine_id)
                    .expect("validated machine reference");
                model.intervals[interval].arms.push(ModeArm {
                    name: mode.id.clone(),
                    resource,
                    duration: mode.duration_units,
                });
                arms += 1;
            }
        }
    }
    debug!(arms, "mode alternatives applied");
}

/// Family 3: precedence edges with min/max delays, replayed per instance.
pub fn apply_precedence(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let mut edges = 0usize;
    for instance_idx in 0..problem.instances.len() {
        for precedence in &problem.template.precedences {
            let pred = problem
                .template
                .task_index(&precedence.predecessor_id)
                .expect("validated precedence endpoint");
            let succ = problem
                .template
                .task_index(&precedence.successor_id)
                .expect("validated precedence endpoint");
            model.add_precedence(
                vars.interval_at(instance_idx, pred),
                vars.interval_at(instance_idx, succ),
                precedence.min_delay_units,
                precedence.max_delay_units,
            );
            edges += 1;
        }
    }
    debug!(edges, "precedence applied");
}

/// Family 4: machine capacity.
///
/// The resource declarations carry the cumulative capacity; this family
/// contributes the fixed setup/teardown pads that widen each occupation.
/// Phase 2 replaces the pads with sequence-dependent changeovers on
/// machines covered by a setup table.
pub fn apply_machine_capacity(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    for machine in &problem.machines {
        let resource = vars.machine(&machine.id).expect("registered machine");
        let decl = &mut model.resources[resource];
        decl.pre_pad = machine.setup_units;
        decl.post_pad = machine.teardown_units;
    }
    debug!(machines = problem.machines.len(), "machine capacity applied");
}

/// Family 5: work-cell WIP limits.
///
/// One cumulative group per cell with a limit; member machines point at
/// it. Setup tasks do not count (their intervals opt out at creation).
pub fn apply_cell_wip(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let mut groups = 0usize;
    for cell in &problem.cells {
        let Some(limit) = cell.wip_limit else {
            continue;
        };
        let group = model.add_wip_group(WipGroup {
            name: cell.id.clone(),
            capacity: limit,
        });
        for machine in problem.machines.iter().filter(|m| m.cell_id == cell.id) {
            let resource = vars.machine(&machine.id).expect("registered machine");
            model.resources[resource].wip_group = Some(group);
        }
        groups += 1;
    }
    debug!(groups, "cell wip applied");
}

/// Family 6: sequence-resource exclusivity with setup/teardown.
///
/// Per (sequence resource, instance): one span over the instance's
/// intervals that use the resource, padded by the resource's setup and
/// teardown. Spans of one resource obey its `max_concurrent`.
pub fn apply_sequence_exclusivity(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let mut spans = 0usize;
    for resource in &problem.sequence_resources {
        let sequence = model.add_sequence(SequenceDecl {
            name: resource.id.clone(),
            capacity: resource.max_concurrent,
            pre_pad: resource.setup_units,
            post_pad: resource.teardown_units,
        });
        for (instance_idx, instance) in problem.instances.iter().enumerate() {
            let members: Vec<_> = problem
                .template
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| task.sequence_id.as_deref() == Some(resource.id.as_str()))
                .map(|(task_idx, _)| vars.interval_at(instance_idx, task_idx))
                .collect();
            if members.is_empty() {
                continue;
            }
            model.add_span(Span {
                sequence,
                owner: instance.id.clone(),
                members,
            });
            spans += 1;
        }
    }
    debug!(spans, "sequence exclusivity applied");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::vars::create_variables;
    use crate::models::{
        Instance, Machine, Mode, Precedence, SequenceResource, Template, TemplateTask, WorkCell,
    };
    use crate::time::DomainOffsets;

    fn setup() -> (Problem, CpModel, VarTable) {
        let template = Template::new("P1", "pattern")
            .with_task(
                TemplateTask::new("T1", 0)
                    .with_mode(Mode::new("T1M1", "M1", 4))
                    .with_mode(Mode::new("T1M2", "M2", 6))
                    .with_sequence("Q1"),
            )
            .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
            .with_precedence(Precedence::new("T1", "T2").with_min_delay(1).with_max_delay(5));
        let problem = Problem::new(template)
            .with_machine(Machine::new("M1", "C1").with_pads(1, 1))
            .with_machine(Machine::new("M2", "C1"))
            .with_cell(WorkCell::new("C1").with_wip_limit(1))
            .with_sequence_resource(SequenceResource::exclusive("Q1").with_pads(1, 1))
            .with_instance(Instance::new("J1", "P1"))
            .with_instance(Instance::new("J2", "P1"));
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 200);
        let vars = create_variables(&problem, &mut model, 200, &offsets);
        (problem, model, vars)
    }

    #[test]
    fn test_mode_alternatives() {
        let (problem, mut model, vars) = setup();
        apply_mode_alternatives(&problem, &mut model, &vars);

        let t1 = &model.intervals[vars.interval_at(0, 0)];
        assert_eq!(t1.arms.len(), 2);
        assert_eq!(t1.arms[0].name, "T1M1");
        assert_eq!(t1.arms[0].duration, 4);
        assert_eq!(t1.arms[1].resource, vars.machine("M2").unwrap());
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_precedence_replayed_per_instance() {
        let (problem, mut model, vars) = setup();
        apply_precedence(&problem, &mut model, &vars);
        assert_eq!(model.constraint_count(), 2); // one edge x two instances
    }

    #[test]
    fn test_machine_pads() {
        let (problem, mut model, vars) = setup();
        apply_machine_capacity(&problem, &mut model, &vars);
        let m1 = &model.resources[vars.machine("M1").unwrap()];
        assert_eq!((m1.pre_pad, m1.post_pad), (1, 1));
        let m2 = &model.resources[vars.machine("M2").unwrap()];
        assert_eq!((m2.pre_pad, m2.post_pad), (0, 0));
    }

    #[test]
    fn test_cell_wip_links_members() {
        let (problem, mut model, vars) = setup();
        apply_cell_wip(&problem, &mut model, &vars);
        assert_eq!(model.wip_groups.len(), 1);
        assert_eq!(model.wip_groups[0].capacity, 1);
        assert_eq!(
            model.resources[vars.machine("M1").unwrap()].wip_group,
            Some(0)
        );
        assert_eq!(
            model.resources[vars.machine("M2").unwrap()].wip_group,
            Some(0)
        );
    }

    #[test]
    fn test_sequence_spans_per_instance() {
        let (problem, mut model, vars) = setup();
        apply_sequence_exclusivity(&problem, &mut model, &vars);
        assert_eq!(model.sequences.len(), 1);
        assert_eq!(model.spans.len(), 2); // one span per instance
        assert_eq!(model.spans[0].members, vec![vars.interval_at(0, 0)]);
        assert_eq!(model.spans[1].owner, "J2");
        assert_eq!(model.sequences[0].pre_pad, 1);
    }
}
