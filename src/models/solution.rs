//! Solution model: scheduled tasks, sequence reservations, and metrics.
//!
//! A [`Solution`] is owned by the caller after extraction. It carries the
//! per-(instance, task) assignments and the held sequence windows, plus
//! query helpers and an independent [`verify`](Solution::verify) checker
//! that re-validates every scheduling invariant against the raw problem —
//! the test suite runs it on every solved scenario.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{Problem, UnitWindow};

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// Feasible, optimality not proven.
    Feasible,
    /// No solution exists within the horizon.
    Infeasible,
    /// Budget exhausted; best feasible returned if any.
    TimeLimit,
    /// Nothing proven.
    Unknown,
}

impl SolveStatus {
    /// Whether a usable schedule accompanies this status.
    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// One task of one instance, placed in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Owning instance.
    pub instance_id: String,
    /// Template task this placement realizes.
    pub template_task_id: String,
    /// Machine chosen by the selected mode.
    pub machine_id: String,
    /// Operators assigned for the task's duration.
    pub operator_ids: Vec<String>,
    /// Start, in units.
    pub start_unit: i64,
    /// End, in units.
    pub end_unit: i64,
    /// Selected mode.
    pub mode_id: String,
}

impl ScheduledTask {
    /// Duration in units.
    #[inline]
    pub fn duration_units(&self) -> i64 {
        self.end_unit - self.start_unit
    }

    /// Whether this placement overlaps [start, end).
    #[inline]
    pub fn overlaps(&self, start_unit: i64, end_unit: i64) -> bool {
        self.start_unit < end_unit && start_unit < self.end_unit
    }
}

/// A held sequence-resource window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReservation {
    /// Sequence resource held.
    pub sequence_id: String,
    /// Holding instance.
    pub instance_id: String,
    /// Reservation start (first use minus setup), in units.
    pub start_unit: i64,
    /// Reservation end (last use plus teardown), in units.
    pub end_unit: i64,
}

/// Performance record of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    /// Terminal status.
    pub status: SolveStatus,
    /// Wall-clock solve time in seconds.
    pub solve_time_seconds: f64,
    /// Latest end across all tasks, in units.
    pub makespan_units: i64,
    /// Sum of per-instance lateness, in units.
    pub total_lateness_units: i64,
    /// Largest per-instance lateness, in units.
    pub max_lateness_units: i64,
    /// Scalarized objective value.
    pub objective_value: f64,
    /// Instances scheduled.
    pub instance_count: usize,
    /// Baseline solve time divided by this solve time, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedup_vs_baseline: Option<f64>,
    /// Whether the solve ended by cooperative cancellation.
    #[serde(default)]
    pub canceled: bool,
    /// Busy fraction per machine over the makespan.
    pub machine_utilization: BTreeMap<String, f64>,
}

/// A violated scheduling invariant, found by [`Solution::verify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Violation classification.
    pub violation_type: ViolationType,
    /// Related entity (instance, machine, operator, or sequence).
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of solution violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    PrecedenceViolation,
    CapacityExceeded,
    ModeMismatch,
    SequenceOverlap,
    SkillMismatch,
    OffShift,
    CalendarOverlap,
    OperatorOverlap,
    UnknownReference,
}

impl Violation {
    fn new(
        violation_type: ViolationType,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }
}

/// A complete schedule: assignments plus sequence reservations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Per-(instance, task) placements.
    pub tasks: Vec<ScheduledTask>,
    /// Held sequence windows.
    pub reservations: Vec<SequenceReservation>,
}

impl Solution {
    /// Creates an empty solution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest end across all tasks (units).
    pub fn makespan_units(&self) -> i64 {
        self.tasks.iter().map(|t| t.end_unit).max().unwrap_or(0)
    }

    /// All placements of one instance.
    pub fn tasks_for_instance(&self, instance_id: &str) -> Vec<&ScheduledTask> {
        self.tasks
            .iter()
            .filter(|t| t.instance_id == instance_id)
            .collect()
    }

    /// All placements on one machine.
    pub fn tasks_on_machine(&self, machine_id: &str) -> Vec<&ScheduledTask> {
        self.tasks
            .iter()
            .filter(|t| t.machine_id == machine_id)
            .collect()
    }

    /// The placement of one (instance, task), if present.
    pub fn task(&self, instance_id: &str, template_task_id: &str) -> Option<&ScheduledTask> {
        self.tasks
            .iter()
            .find(|t| t.instance_id == instance_id && t.template_task_id == template_task_id)
    }

    /// Completion of an instance: latest end among its tasks.
    pub fn instance_completion(&self, instance_id: &str) -> Option<i64> {
        self.tasks_for_instance(instance_id)
            .iter()
            .map(|t| t.end_unit)
            .max()
    }

    /// Lateness of an instance against a due unit: max(0, completion - due).
    pub fn instance_lateness(&self, instance_id: &str, due_unit: i64) -> i64 {
        self.instance_completion(instance_id)
            .map(|c| (c - due_unit).max(0))
            .unwrap_or(0)
    }

    /// Busy fraction of a machine over the makespan.
    pub fn machine_utilization(&self, machine_id: &str) -> f64 {
        let horizon = self.makespan_units();
        if horizon <= 0 {
            return 0.0;
        }
        let busy: i64 = self
            .tasks_on_machine(machine_id)
            .iter()
            .map(|t| t.duration_units())
            .sum();
        busy as f64 / horizon as f64
    }

    /// Number of placements.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Re-checks every scheduling invariant against the problem.
    ///
    /// Returns all violations found; an empty vector means the solution
    /// honors precedences, capacities, mode links, sequence exclusivity,
    /// skills, shifts, and calendars.
    pub fn verify(&self, problem: &Problem) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check_modes(problem, &mut violations);
        self.check_precedences(problem, &mut violations);
        self.check_machine_capacity(problem, &mut violations);
        self.check_sequence_reservations(problem, &mut violations);
        self.check_operators(problem, &mut violations);
        self.check_calendars(problem, &mut violations);
        violations
    }

    fn check_modes(&self, problem: &Problem, out: &mut Vec<Violation>) {
        for task in &self.tasks {
            let Some(template_task) = problem
                .template
                .tasks
                .iter()
                .find(|t| t.id == task.template_task_id)
            else {
                out.push(Violation::new(
                    ViolationType::UnknownReference,
                    &task.template_task_id,
                    format!("placement references unknown template task '{}'", task.template_task_id),
                ));
                continue;
            };
            match template_task.modes.iter().find(|m| m.id == task.mode_id) {
                None => out.push(Violation::new(
                    ViolationType::ModeMismatch,
                    &task.instance_id,
                    format!(
                        "task '{}' uses unknown mode '{}'",
                        task.template_task_id, task.mode_id
                    ),
                )),
                Some(mode) => {
                    if mode.machine_id != task.machine_id
                        || mode.duration_units != task.duration_units()
                    {
                        out.push(Violation::new(
                            ViolationType::ModeMismatch,
                            &task.instance_id,
                            format!(
                                "task '{}' placement disagrees with mode '{}'",
                                task.template_task_id, task.mode_id
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_precedences(&self, problem: &Problem, out: &mut Vec<Violation>) {
        for instance in &problem.instances {
            for edge in &problem.template.precedences {
                let (Some(pred), Some(succ)) = (
                    self.task(&instance.id, &edge.predecessor_id),
                    self.task(&instance.id, &edge.successor_id),
                ) else {
                    continue;
                };
                if pred.end_unit + edge.min_delay_units > succ.start_unit {
                    out.push(Violation::new(
                        ViolationType::PrecedenceViolation,
                        &instance.id,
                        format!(
                            "'{}' ends at {} but '{}' starts at {} (min delay {})",
                            edge.predecessor_id,
                            pred.end_unit,
                            edge.successor_id,
                            succ.start_unit,
                            edge.min_delay_units
                        ),
                    ));
                }
                if let Some(max_delay) = edge.max_delay_units {
                    if succ.start_unit > pred.end_unit + max_delay {
                        out.push(Violation::new(
                            ViolationType::PrecedenceViolation,
                            &instance.id,
                            format!(
                                "'{}' starts at {} beyond max delay {} after '{}'",
                                edge.successor_id, succ.start_unit, max_delay, edge.predecessor_id
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_machine_capacity(&self, problem: &Problem, out: &mut Vec<Violation>) {
        for machine in &problem.machines {
            let on_machine = self.tasks_on_machine(&machine.id);
            for a in &on_machine {
                // Count placements overlapping a's start; every maximal
                // overlap set has a latest-starting member, so this finds
                // any capacity breach.
                let concurrent = on_machine
                    .iter()
                    .filter(|b| b.overlaps(a.start_unit, a.start_unit + 1))
                    .count();
                if concurrent as i32 > machine.capacity {
                    out.push(Violation::new(
                        ViolationType::CapacityExceeded,
                        &machine.id,
                        format!(
                            "{} concurrent tasks at unit {} exceed capacity {}",
                            concurrent, a.start_unit, machine.capacity
                        ),
                    ));
                }
            }
        }
    }

    fn check_sequence_reservations(&self, problem: &Problem, out: &mut Vec<Violation>) {
        for resource in &problem.sequence_resources {
            let held: Vec<&SequenceReservation> = self
                .reservations
                .iter()
                .filter(|r| r.sequence_id == resource.id)
                .collect();
            for a in &held {
                let concurrent = held
                    .iter()
                    .filter(|b| {
                        UnitWindow::new(b.start_unit, b.end_unit)
                            .contains(a.start_unit)
                    })
                    .count();
                if concurrent as i32 > resource.max_concurrent {
                    out.push(Violation::new(
                        ViolationType::SequenceOverlap,
                        &resource.id,
                        format!(
                            "{} concurrent reservations at unit {} exceed limit {}",
                            concurrent, a.start_unit, resource.max_concurrent
                        ),
                    ));
                }
            }
        }
    }

    fn check_operators(&self, problem: &Problem, out: &mut Vec<Violation>) {
        // Skill and shift requirements per placement.
        for task in &self.tasks {
            let Some(template_task) = problem
                .template
                .tasks
                .iter()
                .find(|t| t.id == task.template_task_id)
            else {
                continue;
            };
            for req in &template_task.skill_requirements {
                let qualified = task
                    .operator_ids
                    .iter()
                    .filter_map(|id| problem.operator(id))
                    .filter(|op| op.satisfies(&req.skill_id, req.required_level))
                    .count();
                if (qualified as i32) < req.count {
                    out.push(Violation::new(
                        ViolationType::SkillMismatch,
                        &task.instance_id,
                        format!(
                            "task '{}' needs {} operators with '{}' at {:?}+, has {}",
                            task.template_task_id,
                            req.count,
                            req.skill_id,
                            req.required_level,
                            qualified
                        ),
                    ));
                }
            }
            if !template_task.is_unattended {
                for op_id in &task.operator_ids {
                    if let Some(op) = problem.operator(op_id) {
                        if !op.on_shift(task.start_unit, task.end_unit) {
                            out.push(Violation::new(
                                ViolationType::OffShift,
                                op_id,
                                format!(
                                    "operator '{}' covers [{}, {}) outside shift windows",
                                    op_id, task.start_unit, task.end_unit
                                ),
                            ));
                        }
                    }
                }
            }
        }

        // Operator double-booking.
        let mut per_operator: HashMap<&str, Vec<&ScheduledTask>> = HashMap::new();
        for task in &self.tasks {
            for op_id in &task.operator_ids {
                per_operator.entry(op_id).or_default().push(task);
            }
        }
        for (op_id, assigned) in per_operator {
            for (i, a) in assigned.iter().enumerate() {
                for b in assigned.iter().skip(i + 1) {
                    if a.overlaps(b.start_unit, b.end_unit) {
                        out.push(Violation::new(
                            ViolationType::OperatorOverlap,
                            op_id,
                            format!(
                                "operator '{}' double-booked on '{}' and '{}'",
                                op_id, a.template_task_id, b.template_task_id
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_calendars(&self, problem: &Problem, out: &mut Vec<Violation>) {
        let horizon = self.makespan_units() + 1;
        for machine in &problem.machines {
            let mut down: Vec<UnitWindow> = machine.maintenance_windows.clone();
            if let Some(cal) = machine
                .calendar_id
                .as_deref()
                .and_then(|id| problem.calendar(id))
            {
                down.extend(cal.unavailable_windows(horizon));
            }
            if let Some(cal) = problem
                .cell(&machine.cell_id)
                .and_then(|c| c.calendar_id.as_deref())
                .and_then(|id| problem.calendar(id))
            {
                down.extend(cal.unavailable_windows(horizon));
            }
            if down.is_empty() {
                continue;
            }
            for task in self.tasks_on_machine(&machine.id) {
                for window in &down {
                    if task.overlaps(window.start_unit, window.end_unit) {
                        out.push(Violation::new(
                            ViolationType::CalendarOverlap,
                            &machine.id,
                            format!(
                                "task '{}' [{}, {}) overlaps downtime [{}, {})",
                                task.template_task_id,
                                task.start_unit,
                                task.end_unit,
                                window.start_unit,
                                window.end_unit
                            ),
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Instance, Machine, Mode, Precedence, Template, TemplateTask, WorkCell};

    fn chain_problem() -> Problem {
        let template = Template::new("P1", "chain")
            .with_task(
                TemplateTask::new("T1", 0)
                    .unattended()
                    .with_mode(Mode::new("T1M1", "M1", 4)),
            )
            .with_task(
                TemplateTask::new("T2", 1)
                    .unattended()
                    .with_mode(Mode::new("T2M1", "M1", 2)),
            )
            .with_precedence(Precedence::new("T1", "T2"));
        Problem::new(template)
            .with_machine(Machine::new("M1", "C1"))
            .with_cell(WorkCell::new("C1"))
            .with_instance(Instance::new("J1", "P1"))
    }

    fn placed(
        instance: &str,
        task: &str,
        machine: &str,
        start: i64,
        end: i64,
        mode: &str,
    ) -> ScheduledTask {
        ScheduledTask {
            instance_id: instance.into(),
            template_task_id: task.into(),
            machine_id: machine.into(),
            operator_ids: vec![],
            start_unit: start,
            end_unit: end,
            mode_id: mode.into(),
        }
    }

    #[test]
    fn test_queries() {
        let mut s = Solution::new();
        s.tasks.push(placed("J1", "T1", "M1", 0, 4, "T1M1"));
        s.tasks.push(placed("J1", "T2", "M1", 4, 6, "T2M1"));

        assert_eq!(s.makespan_units(), 6);
        assert_eq!(s.tasks_for_instance("J1").len(), 2);
        assert_eq!(s.tasks_on_machine("M1").len(), 2);
        assert_eq!(s.instance_completion("J1"), Some(6));
        assert_eq!(s.instance_lateness("J1", 6), 0);
        assert_eq!(s.instance_lateness("J1", 5), 1);
        // M1 busy all 6 units
        assert!((s.machine_utilization("M1") - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_verify_clean_solution() {
        let problem = chain_problem();
        let mut s = Solution::new();
        s.tasks.push(placed("J1", "T1", "M1", 0, 4, "T1M1"));
        s.tasks.push(placed("J1", "T2", "M1", 4, 6, "T2M1"));
        assert!(s.verify(&problem).is_empty());
    }

    #[test]
    fn test_verify_precedence_violation() {
        let problem = chain_problem();
        let mut s = Solution::new();
        s.tasks.push(placed("J1", "T1", "M1", 0, 4, "T1M1"));
        s.tasks.push(placed("J1", "T2", "M1", 3, 5, "T2M1"));
        let violations = s.verify(&problem);
        assert!(violations
            .iter()
            .any(|v| v.violation_type == ViolationType::PrecedenceViolation));
    }

    #[test]
    fn test_verify_capacity_violation() {
        let problem = chain_problem().with_instance(Instance::new("J2", "P1"));
        let mut s = Solution::new();
        s.tasks.push(placed("J1", "T1", "M1", 0, 4, "T1M1"));
        s.tasks.push(placed("J2", "T1", "M1", 2, 6, "T1M1"));
        let violations = s.verify(&problem);
        assert!(violations
            .iter()
            .any(|v| v.violation_type == ViolationType::CapacityExceeded));
    }

    #[test]
    fn test_verify_mode_mismatch() {
        let problem = chain_problem();
        let mut s = Solution::new();
        // Wrong duration for the declared mode.
        s.tasks.push(placed("J1", "T1", "M1", 0, 3, "T1M1"));
        let violations = s.verify(&problem);
        assert!(violations
            .iter()
            .any(|v| v.violation_type == ViolationType::ModeMismatch));
    }

    #[test]
    fn test_verify_sequence_overlap() {
        let mut problem = chain_problem();
        problem = problem.with_sequence_resource(
            crate::models::SequenceResource::exclusive("Q1"),
        );
        let mut s = Solution::new();
        s.reservations.push(SequenceReservation {
            sequence_id: "Q1".into(),
            instance_id: "J1".into(),
            start_unit: 0,
            end_unit: 6,
        });
        s.reservations.push(SequenceReservation {
            sequence_id: "Q1".into(),
            instance_id: "J2".into(),
            start_unit: 4,
            end_unit: 10,
        });
        let violations = s.verify(&problem);
        assert!(violations
            .iter()
            .any(|v| v.violation_type == ViolationType::SequenceOverlap));
    }

    #[test]
    fn test_status_has_solution() {
        assert!(SolveStatus::Optimal.has_solution());
        assert!(SolveStatus::Feasible.has_solution());
        assert!(!SolveStatus::Infeasible.has_solution());
        assert!(!SolveStatus::TimeLimit.has_solution());
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&SolveStatus::TimeLimit).unwrap(),
            "\"TIME_LIMIT\""
        );
    }
}
