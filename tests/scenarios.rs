//! End-to-end scheduling scenarios.
//!
//! Each scenario builds a problem, solves it through the driver, checks
//! the expected schedule shape, and re-verifies every scheduling
//! invariant against the raw problem via `Solution::verify`.

use patternshop::models::{
    Calendar, Instance, Machine, Mode, Objective, Operator, Precedence, Proficiency,
    SequenceResource, SetupTimeTable, Skill, SkillRequirement, SolveStatus, Template, TemplateTask,
    WorkCell,
};
use patternshop::{Problem, SolveDriver, SolverParameters};

fn chain_template() -> Template {
    Template::new("P1", "two-task chain")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)))
        .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
        .with_precedence(Precedence::new("T1", "T2"))
}

fn machine_only(problem: Problem) -> Problem {
    problem
        .with_machine(Machine::new("M1", "C1"))
        .with_cell(WorkCell::new("C1"))
}

#[test]
fn two_task_chain_single_machine_single_instance() {
    let problem = machine_only(Problem::new(chain_template()))
        .with_instance(Instance::new("J1", "P1").with_due(6));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    let t2 = solution.task("J1", "T2").unwrap();
    assert_eq!((t1.start_unit, t1.end_unit), (0, 4));
    assert_eq!((t2.start_unit, t2.end_unit), (4, 6));
    assert_eq!(outcome.metrics.makespan_units, 6);
    assert_eq!(outcome.metrics.total_lateness_units, 0);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn two_identical_instances_serialize_on_one_machine() {
    let problem = machine_only(Problem::new(chain_template()))
        .with_instance(Instance::new("J1", "P1"))
        .with_instance(Instance::new("J2", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let solution = outcome.solution.unwrap();
    // 12 units of work on a unary machine: the optimum packs it solid.
    assert_eq!(outcome.metrics.makespan_units, 12);
    assert!(solution.verify(&problem).is_empty());

    // Symmetry breaking: anchor starts in instance order.
    let a1 = solution.task("J1", "T1").unwrap();
    let a2 = solution.task("J2", "T1").unwrap();
    assert!(a1.start_unit <= a2.start_unit);
}

#[test]
fn mode_choice_picks_faster_machine() {
    let template = Template::new("P1", "mode choice").with_task(
        TemplateTask::new("T1", 0)
            .with_mode(Mode::new("T1M1", "M1", 4))
            .with_mode(Mode::new("T1M2", "M2", 6)),
    );
    let problem = machine_only(Problem::new(template))
        .with_machine(Machine::new("M2", "C1"))
        .with_instance(Instance::new("J1", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    assert_eq!(t1.machine_id, "M1");
    assert_eq!(t1.mode_id, "T1M1");
    assert_eq!(outcome.metrics.makespan_units, 4);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn sequence_exclusive_resource_separates_reservations() {
    let template = Template::new("P1", "sequence hold").with_task(
        TemplateTask::new("T1", 0)
            .with_mode(Mode::new("T1M1", "M1", 4))
            .with_sequence("Q"),
    );
    let problem = machine_only(Problem::new(template))
        .with_sequence_resource(SequenceResource::exclusive("Q").with_pads(1, 1))
        .with_instance(Instance::new("J1", "P1"))
        .with_instance(Instance::new("J2", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert!(outcome.status.has_solution());

    let solution = outcome.solution.unwrap();
    assert_eq!(solution.reservations.len(), 2);
    let (a, b) = (&solution.reservations[0], &solution.reservations[1]);
    // Reservations disjoint, total span at least 2 x (1 + 4 + 1).
    assert!(a.end_unit <= b.start_unit || b.end_unit <= a.start_unit);
    let span = a.end_unit.max(b.end_unit) - a.start_unit.min(b.start_unit);
    assert!(span >= 12, "span {span} too short");
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn infeasible_due_date_returns_no_assignments() {
    let template = Template::new("P1", "tight chain")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)))
        .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 4)))
        .with_precedence(Precedence::new("T1", "T2"));
    let problem =
        machine_only(Problem::new(template)).with_instance(Instance::new("J1", "P1").with_due(5));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.solution.is_none());
    let report = outcome.infeasibility.unwrap();
    assert!(!report.families.is_empty());
}

#[test]
fn skill_gated_assignment_selects_qualified_operator() {
    let template = Template::new("P1", "skill gate").with_task(
        TemplateTask::new("T1", 0)
            .with_mode(Mode::new("T1M1", "M1", 4))
            .with_operators(1, 1)
            .with_skill_requirement(SkillRequirement::new("SX", Proficiency::Proficient)),
    );
    let problem = machine_only(Problem::new(template))
        .with_skill(Skill::new("SX", "test"))
        .with_operator(Operator::new("O1").with_skill("SX", Proficiency::Competent))
        .with_operator(Operator::new("O2").with_skill("SX", Proficiency::Expert))
        .with_instance(Instance::new("J1", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    assert_eq!(t1.operator_ids, vec!["O2".to_string()]);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn operator_shift_contains_task() {
    let template = Template::new("P1", "shifted").with_task(
        TemplateTask::new("T1", 0)
            .with_mode(Mode::new("T1M1", "M1", 4))
            .with_operators(1, 1),
    );
    let problem = machine_only(Problem::new(template))
        .with_operator(Operator::new("O1").with_shift(8, 16))
        .with_instance(Instance::new("J1", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    assert!(t1.start_unit >= 8 && t1.end_unit <= 16);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn machine_calendar_blocks_overnight() {
    // Working units 0..8 each day; a 4-unit task released at 6 must wait
    // for the next working day.
    let template = Template::new("P1", "calendared")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)));
    let problem = Problem::new(template)
        .with_machine(Machine::new("M1", "C1").with_calendar("days"))
        .with_cell(WorkCell::new("C1"))
        .with_calendar(Calendar::new("days").with_day_window(0, 8))
        .with_instance(Instance::new("J1", "P1").with_earliest_start(6));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    assert_eq!(t1.start_unit, 96);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn wip_limit_serializes_cell() {
    // Two machines in one cell with WIP 1: tasks cannot run concurrently
    // even though machines are free.
    let template = Template::new("P1", "wip").with_task(
        TemplateTask::new("T1", 0)
            .with_mode(Mode::new("T1M1", "M1", 4))
            .with_mode(Mode::new("T1M2", "M2", 4)),
    );
    let problem = Problem::new(template)
        .with_machine(Machine::new("M1", "C1"))
        .with_machine(Machine::new("M2", "C1"))
        .with_cell(WorkCell::new("C1").with_wip_limit(1))
        .with_instance(Instance::new("J1", "P1"))
        .with_instance(Instance::new("J2", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    let solution = outcome.solution.unwrap();
    let a = solution.task("J1", "T1").unwrap();
    let b = solution.task("J2", "T1").unwrap();
    assert!(a.end_unit <= b.start_unit || b.end_unit <= a.start_unit);
    assert_eq!(outcome.metrics.makespan_units, 8);
}

#[test]
fn sequence_dependent_setup_spaces_machine() {
    let template = Template::new("P1", "changeover")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 2)))
        .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
        .with_precedence(Precedence::new("T1", "T2"));
    let mut setups = SetupTimeTable::new();
    setups.set("M1", "T1", "T2", 3);
    let problem = machine_only(Problem::new(template))
        .with_setup_times(setups)
        .with_instance(Instance::new("J1", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    let t2 = solution.task("J1", "T2").unwrap();
    assert!(t2.start_unit >= t1.end_unit + 3);
    assert_eq!(outcome.metrics.makespan_units, 7);
}

#[test]
fn max_delay_window_respected() {
    let template = Template::new("P1", "window")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 2)))
        .with_task(
            TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)),
        )
        .with_precedence(Precedence::new("T1", "T2").with_min_delay(1).with_max_delay(3));
    let problem =
        machine_only(Problem::new(template)).with_instance(Instance::new("J1", "P1"));

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    let solution = outcome.solution.unwrap();
    let t1 = solution.task("J1", "T1").unwrap();
    let t2 = solution.task("J1", "T2").unwrap();
    assert!(t2.start_unit >= t1.end_unit + 1);
    assert!(t2.start_unit <= t1.end_unit + 3);
    assert!(solution.verify(&problem).is_empty());
}

#[test]
fn lexicographic_objective_orders_priorities() {
    // Lateness first, makespan second: the dated job must come first even
    // though the undated one is shorter.
    let template = Template::new("P1", "lex")
        .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)));
    let params = SolverParameters::new()
        .with_lex_order(vec![Objective::TotalLateness, Objective::Makespan]);
    let problem = machine_only(Problem::new(template))
        .with_instance(Instance::new("J1", "P1").with_due(4))
        .with_instance(Instance::new("J2", "P1"))
        .with_parameters(params);

    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let solution = outcome.solution.unwrap();
    assert_eq!(solution.task("J1", "T1").unwrap().end_unit, 4);
    assert_eq!(outcome.metrics.total_lateness_units, 0);
}

#[test]
fn extraction_is_deterministic_across_runs() {
    let problem = machine_only(Problem::new(chain_template()))
        .with_instance(Instance::new("J1", "P1"))
        .with_instance(Instance::new("J2", "P1"))
        .with_instance(Instance::new("J3", "P1"));

    let first = SolveDriver::new(&problem).solve().unwrap();
    let second = SolveDriver::new(&problem).solve().unwrap();
    let a = serde_json::to_string(&first.solution.unwrap()).unwrap();
    let b = serde_json::to_string(&second.solution.unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn due_date_equal_to_earliest_feasible_end_has_zero_lateness() {
    let problem = machine_only(Problem::new(chain_template()))
        .with_instance(Instance::new("J1", "P1").with_due(6));
    let outcome = SolveDriver::new(&problem).solve().unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.metrics.total_lateness_units, 0);
    assert_eq!(outcome.metrics.max_lateness_units, 0);
}
