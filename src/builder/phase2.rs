//! Phase 2 constraint families: skills, shifts, changeovers, calendars.
//!
//! Applied only when `enable_phase2` is set. Operator assignment uses the
//! machine-assignment structure from phase 1; skill matching attaches
//! demands to the crews operator assignment created; sequence-dependent
//! setup tables replace the fixed machine pads; calendars expand into
//! concrete downtime windows on each resource.

use tracing::debug;

use crate::cp::{CpModel, CrewReq, OperatorDecl, SkillNeed, TransitionTable};
use crate::models::Problem;

use super::vars::VarTable;

/// Family 7: operator assignment and shift windows.
///
/// Declares every operator (skills, shifts, daily caps) and requires a
/// crew per (instance, task): `min_operators` assigned from the full
/// operator pool, covering the task interval. Unattended tasks waive
/// shift containment. Problems without operators skip the family.
pub fn apply_operator_assignment(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    if problem.operators.is_empty() {
        debug!("no operators declared; operator assignment skipped");
        return;
    }
    for operator in &problem.operators {
        model.add_operator(OperatorDecl {
            name: operator.id.clone(),
            skills: operator
                .skills
                .iter()
                .map(|(skill, level)| (skill.clone(), level.rank()))
                .collect(),
            shifts: operator
                .shifts
                .iter()
                .map(|w| (w.start_unit, w.end_unit))
                .collect(),
            max_units_per_day: operator.max_units_per_day,
            overtime_allowed: operator.overtime_allowed,
            cost_per_unit: operator.cost_per_unit(),
        });
    }
    let eligible: Vec<usize> = (0..problem.operators.len()).collect();
    let mut crews = 0usize;
    for instance_idx in 0..problem.instances.len() {
        for (task_idx, task) in problem.template.tasks.iter().enumerate() {
            model.add_crew(CrewReq {
                interval: vars.interval_at(instance_idx, task_idx),
                size: task.min_operators as usize,
                max_size: task.max_operators as usize,
                eligible: eligible.clone(),
                needs: Vec::new(),
                shift_exempt: task.is_unattended,
            });
            crews += 1;
        }
    }
    debug!(operators = problem.operators.len(), crews, "operator assignment applied");
}

/// Family 8: skill proficiency requirements.
///
/// Attaches each task's skill demands to the crew created by family 7.
/// Tasks with empty requirement lists are left untouched.
pub fn apply_skill_requirements(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    if problem.operators.is_empty() {
        return;
    }
    let mut needs = 0usize;
    for instance_idx in 0..problem.instances.len() {
        for (task_idx, task) in problem.template.tasks.iter().enumerate() {
            if task.skill_requirements.is_empty() {
                continue;
            }
            let interval = vars.interval_at(instance_idx, task_idx);
            let crew = model
                .crews
                .iter_mut()
                .find(|c| c.interval == interval)
                .expect("family 7 created the crew");
            for requirement in &task.skill_requirements {
                crew.needs.push(SkillNeed {
                    skill: requirement.skill_id.clone(),
                    min_rank: requirement.required_level.rank(),
                    count: requirement.count as usize,
                });
                needs += 1;
            }
        }
    }
    debug!(needs, "skill requirements applied");
}

/// Family 9: sequence-dependent setup times.
///
/// Machines covered by the setup table get a changeover table keyed by
/// template task; it supersedes their fixed pads. Applies to unary
/// machines — cumulative machines keep fixed pads.
pub fn apply_setup_transitions(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    if problem.setup_times.is_empty() {
        return;
    }
    let mut machines = 0usize;
    for machine in &problem.machines {
        if !problem.setup_times.covers_machine(&machine.id) {
            continue;
        }
        let mut table = TransitionTable {
            default_units: problem.setup_times.default_units,
            entries: Default::default(),
        };
        for edge in problem.setup_times.edges() {
            if edge.machine_id == machine.id {
                table
                    .entries
                    .insert((edge.from_task.clone(), edge.to_task.clone()), edge.setup_units);
            }
        }
        let resource = vars.machine(&machine.id).expect("registered machine");
        model.resources[resource].transitions = Some(table);
        machines += 1;
    }
    debug!(machines, "setup transitions applied");
}

/// Family 10: calendar unavailability.
///
/// Expands each machine's downtime into concrete forbidden windows:
/// maintenance windows, the machine's own calendar, and its cell's
/// calendar, merged per machine.
pub fn apply_calendar_windows(problem: &Problem, model: &mut CpModel, vars: &VarTable) {
    let horizon = model.horizon;
    let mut windows = 0usize;
    for machine in &problem.machines {
        let resource = vars.machine(&machine.id).expect("registered machine");
        let mut forbidden: Vec<(i64, i64)> = machine
            .maintenance_windows
            .iter()
            .map(|w| (w.start_unit, w.end_unit))
            .collect();
        if let Some(calendar) = machine
            .calendar_id
            .as_deref()
            .and_then(|id| problem.calendar(id))
        {
            forbidden.extend(
                calendar
                    .unavailable_windows(horizon)
                    .iter()
                    .map(|w| (w.start_unit, w.end_unit)),
            );
        }
        if let Some(calendar) = problem
            .cell(&machine.cell_id)
            .and_then(|c| c.calendar_id.as_deref())
            .and_then(|id| problem.calendar(id))
        {
            forbidden.extend(
                calendar
                    .unavailable_windows(horizon)
                    .iter()
                    .map(|w| (w.start_unit, w.end_unit)),
            );
        }
        forbidden.sort_unstable();
        forbidden.dedup();
        windows += forbidden.len();
        model.resources[resource].forbidden = forbidden;
    }
    debug!(windows, "calendar windows applied");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::phase1::apply_mode_alternatives;
    use crate::builder::vars::create_variables;
    use crate::models::{
        Calendar, Instance, Machine, Mode, Operator, Proficiency, SetupTimeTable, Skill,
        SkillRequirement, Template, TemplateTask, WorkCell,
    };
    use crate::time::DomainOffsets;

    fn setup() -> (Problem, CpModel, VarTable) {
        let template = Template::new("P1", "pattern").with_task(
            TemplateTask::new("T1", 0)
                .with_mode(Mode::new("T1M1", "M1", 4))
                .with_skill_requirement(SkillRequirement::new("SX", Proficiency::Proficient)),
        );
        let problem = Problem::new(template)
            .with_machine(Machine::new("M1", "C1").with_calendar("weekdays"))
            .with_cell(WorkCell::new("C1"))
            .with_skill(Skill::new("SX", "assembly"))
            .with_operator(
                Operator::new("O1")
                    .with_skill("SX", Proficiency::Competent)
                    .with_shift(0, 32),
            )
            .with_operator(Operator::new("O2").with_skill("SX", Proficiency::Expert))
            .with_calendar(Calendar::new("weekdays").with_day_window(0, 64))
            .with_setup_times(SetupTimeTable::new().with_edge("M1", "T1", "T1", 2))
            .with_instance(Instance::new("J1", "P1"));
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 192);
        let vars = create_variables(&problem, &mut model, 192, &offsets);
        apply_mode_alternatives(&problem, &mut model, &vars);
        (problem, model, vars)
    }

    #[test]
    fn test_operator_assignment_declares_and_crews() {
        let (problem, mut model, vars) = setup();
        apply_operator_assignment(&problem, &mut model, &vars);

        assert_eq!(model.operators.len(), 2);
        assert_eq!(model.operators[0].shifts, vec![(0, 32)]);
        assert_eq!(model.crews.len(), 1);
        assert_eq!(model.crews[0].size, 1);
        assert_eq!(model.crews[0].eligible, vec![0, 1]);
    }

    #[test]
    fn test_skill_requirements_attach_to_crews() {
        let (problem, mut model, vars) = setup();
        apply_operator_assignment(&problem, &mut model, &vars);
        apply_skill_requirements(&problem, &mut model, &vars);

        let needs = &model.crews[0].needs;
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].skill, "SX");
        assert_eq!(needs[0].min_rank, Proficiency::Proficient.rank());
    }

    #[test]
    fn test_empty_requirement_list_skipped() {
        let (mut problem, mut model, vars) = setup();
        problem.template.tasks[0].skill_requirements.clear();
        apply_operator_assignment(&problem, &mut model, &vars);
        apply_skill_requirements(&problem, &mut model, &vars);
        assert!(model.crews[0].needs.is_empty());
    }

    #[test]
    fn test_setup_transitions_replace_pads() {
        let (problem, mut model, vars) = setup();
        apply_setup_transitions(&problem, &mut model, &vars);
        let decl = &model.resources[vars.machine("M1").unwrap()];
        let table = decl.transitions.as_ref().unwrap();
        assert_eq!(table.get("T1", "T1"), 2);
    }

    #[test]
    fn test_calendar_windows_expand() {
        let (problem, mut model, vars) = setup();
        apply_calendar_windows(&problem, &mut model, &vars);
        let decl = &model.resources[vars.machine("M1").unwrap()];
        // Day window 0..64 over a 192-unit horizon: two overnight gaps.
        assert_eq!(decl.forbidden, vec![(64, 96), (160, 192)]);
    }

    #[test]
    fn test_no_operators_skips_family() {
        let (mut problem, mut model, vars) = setup();
        problem.operators.clear();
        apply_operator_assignment(&problem, &mut model, &vars);
        apply_skill_requirements(&problem, &mut model, &vars);
        assert!(model.crews.is_empty());
    }
}
