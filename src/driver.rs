//! Solve driver.
//!
//! Runs the full pipeline for one problem: build the model, configure
//! the engine search, solve, translate the engine status, extract the
//! domain solution, and compute metrics. All performance tracking lives
//! in the per-solve [`ScheduleMetrics`] returned to the caller; the
//! driver holds no global state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn};

use crate::builder::{BuiltModel, ConstraintFamily, ModelBuilder};
use crate::cp::{
    BranchAndBoundSolver, Branching, CancelToken, CpSolution, CpSolver, ProgressReporter,
    SearchConfig, SolverStatus,
};
use crate::error::SolveError;
use crate::models::{
    Problem, ScheduleMetrics, ScheduledTask, SearchBranching, SequenceReservation, Solution,
    SolveStatus,
};

/// Why a solve came back infeasible: the constraint families present in
/// the model, ranked most-likely-restrictive first, for iterative
/// bisection by the caller.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InfeasibilityReport {
    /// Families present, most suspicious first.
    pub families: Vec<ConstraintFamily>,
    /// Human-readable observations about the problem.
    pub hints: Vec<String>,
}

/// Everything a solve run produces.
#[derive(Debug)]
pub struct SolveOutcome {
    /// Terminal status.
    pub status: SolveStatus,
    /// The schedule, when one exists.
    pub solution: Option<Solution>,
    /// Per-solve performance record.
    pub metrics: ScheduleMetrics,
    /// Present only on INFEASIBLE.
    pub infeasibility: Option<InfeasibilityReport>,
}

/// Configures and runs solves over one problem.
///
/// One driver owns one solve at a time; models are not shared across
/// threads. The cancellation token may be cloned to other threads.
pub struct SolveDriver<'a> {
    problem: &'a Problem,
    cancel: CancelToken,
    reporter: Option<Arc<dyn ProgressReporter>>,
    baseline_seconds: Option<f64>,
}

impl<'a> SolveDriver<'a> {
    /// Creates a driver over a problem.
    pub fn new(problem: &'a Problem) -> Self {
        Self {
            problem,
            cancel: CancelToken::new(),
            reporter: None,
            baseline_seconds: None,
        }
    }

    /// Uses an external cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Installs a progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Supplies a baseline solve time for the speedup metric.
    pub fn with_baseline_seconds(mut self, seconds: f64) -> Self {
        self.baseline_seconds = Some(seconds);
        self
    }

    /// The driver's cancellation token, cloneable across threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Solves with the bundled engine.
    pub fn solve(&self) -> Result<SolveOutcome, SolveError> {
        self.solve_with(&BranchAndBoundSolver::new())
    }

    /// Solves with a caller-provided engine.
    pub fn solve_with<S: CpSolver>(&self, solver: &S) -> Result<SolveOutcome, SolveError> {
        let _span = info_span!("solve", template = %self.problem.template.id).entered();

        let built = ModelBuilder::new(self.problem).build()?;
        let config = self.search_config();
        let cp = solver.solve(&built.model, &config);

        if cp.status == SolverStatus::ModelInvalid {
            return Err(SolveError::Internal(
                "engine rejected a validated model".to_string(),
            ));
        }
        let status = translate_status(cp.status);

        let solution = cp
            .is_solution_found()
            .then(|| extract_solution(self.problem, &built, &cp));
        if let Some(solution) = &solution {
            debug_assert!(
                solution.verify(self.problem).is_empty(),
                "extracted solution violates problem invariants"
            );
        }

        let metrics = self.compute_metrics(status, &cp, solution.as_ref());
        let infeasibility = (status == SolveStatus::Infeasible)
            .then(|| infeasibility_report(self.problem, &built.families));

        if status == SolveStatus::TimeLimit && solution.is_none() {
            warn!(template = %self.problem.template.id, "time limit reached with no feasible solution");
        }
        debug!(?status, nodes = cp.nodes, "solve finished");
        Ok(SolveOutcome {
            status,
            solution,
            metrics,
            infeasibility,
        })
    }

    fn search_config(&self) -> SearchConfig {
        let params = self.problem.effective_parameters();
        SearchConfig {
            time_limit: Duration::from_secs_f64(params.max_time_seconds.max(0.001)),
            branching: match params.search_branching {
                SearchBranching::Automatic => Branching::Automatic,
                SearchBranching::FixedSearch => Branching::FixedOrder,
            },
            num_workers: params.num_search_workers.max(1) as usize,
            linearization_level: params.linearization_level,
            cancel: self.cancel.clone(),
            reporter: self.reporter.clone(),
            ..SearchConfig::default()
        }
    }

    fn compute_metrics(
        &self,
        status: SolveStatus,
        cp: &CpSolution,
        solution: Option<&Solution>,
    ) -> ScheduleMetrics {
        let solve_time_seconds = cp.solve_time.as_secs_f64();
        let (makespan, lateness) = match solution {
            Some(solution) => {
                let mut total = 0i64;
                let mut max = 0i64;
                for instance in &self.problem.instances {
                    if let Some(due) = instance.due_unit {
                        let lateness = solution.instance_lateness(&instance.id, due);
                        total += lateness;
                        max = max.max(lateness);
                    }
                }
                (solution.makespan_units(), (total, max))
            }
            None => (0, (0, 0)),
        };
        let machine_utilization: BTreeMap<String, f64> = match solution {
            Some(solution) => self
                .problem
                .machines
                .iter()
                .map(|m| (m.id.clone(), solution.machine_utilization(&m.id)))
                .collect(),
            None => BTreeMap::new(),
        };
        let speedup_vs_baseline = self
            .baseline_seconds
            .filter(|_| solve_time_seconds > 0.0)
            .map(|baseline| baseline / solve_time_seconds);

        ScheduleMetrics {
            status,
            solve_time_seconds,
            makespan_units: makespan,
            total_lateness_units: lateness.0,
            max_lateness_units: lateness.1,
            objective_value: cp.objective.unwrap_or(0.0),
            instance_count: self.problem.instances.len(),
            speedup_vs_baseline,
            canceled: cp.canceled,
            machine_utilization,
        }
    }
}

fn translate_status(status: SolverStatus) -> SolveStatus {
    match status {
        SolverStatus::Optimal => SolveStatus::Optimal,
        SolverStatus::Feasible => SolveStatus::Feasible,
        SolverStatus::Infeasible => SolveStatus::Infeasible,
        SolverStatus::Timeout => SolveStatus::TimeLimit,
        SolverStatus::ModelInvalid | SolverStatus::Unknown => SolveStatus::Unknown,
    }
}

/// Builds the domain solution from engine values.
///
/// Iterates the dense variable table in key order, so two extractions of
/// the same engine solution are identical record for record.
fn extract_solution(problem: &Problem, built: &BuiltModel, cp: &CpSolution) -> Solution {
    let mut solution = Solution::new();
    for dense in 0..built.vars.len() {
        let (instance_idx, task_idx) = built.vars.key(dense);
        let interval = built.vars.interval(dense);
        let values = &cp.intervals[interval];
        let arm = &built.model.intervals[interval].arms[values.arm];
        solution.tasks.push(ScheduledTask {
            instance_id: problem.instances[instance_idx].id.clone(),
            template_task_id: problem.template.tasks[task_idx].id.clone(),
            machine_id: built.model.resources[values.resource].name.clone(),
            operator_ids: values
                .operators
                .iter()
                .map(|&o| built.model.operators[o].name.clone())
                .collect(),
            start_unit: values.start,
            end_unit: values.end,
            mode_id: arm.name.clone(),
        });
    }
    for span in &built.model.spans {
        let sequence = &built.model.sequences[span.sequence];
        let start = span
            .members
            .iter()
            .map(|&m| cp.intervals[m].start)
            .min()
            .unwrap_or(0);
        let end = span
            .members
            .iter()
            .map(|&m| cp.intervals[m].end)
            .max()
            .unwrap_or(0);
        solution.reservations.push(SequenceReservation {
            sequence_id: sequence.name.clone(),
            instance_id: span.owner.clone(),
            start_unit: (start - sequence.pre_pad).max(0),
            end_unit: end + sequence.post_pad,
        });
    }
    solution
}

/// Ranks the families present in the model by how often they cause
/// infeasibility: tight due dates first, then sequence exclusivity,
/// narrow shift windows, calendars, and the timing core last.
fn infeasibility_report(
    problem: &Problem,
    families: &[ConstraintFamily],
) -> InfeasibilityReport {
    let mut hints = Vec::new();
    if let Ok(cpub) =
        crate::time::critical_path_upper_bound(&problem.template, problem)
    {
        for instance in &problem.instances {
            if let Some(due) = instance.due_unit {
                if due - instance.earliest_start_unit < cpub {
                    hints.push(format!(
                        "instance '{}' allows {} units but the critical path needs {}",
                        instance.id,
                        due - instance.earliest_start_unit,
                        cpub
                    ));
                }
            }
        }
    }
    if !problem.sequence_resources.is_empty() {
        hints.push(format!(
            "{} sequence resource(s) serialize instance spans",
            problem.sequence_resources.len()
        ));
    }
    if problem.operators.iter().any(|o| !o.shifts.is_empty()) {
        hints.push("operator shift windows restrict task placement".to_string());
    }

    let ranking = [
        ConstraintFamily::ObjectiveRegistration, // carries the due-date groups
        ConstraintFamily::SequenceExclusivity,
        ConstraintFamily::OperatorAssignment,
        ConstraintFamily::SkillMatching,
        ConstraintFamily::CalendarWindows,
        ConstraintFamily::SetupTimes,
        ConstraintFamily::CellWip,
        ConstraintFamily::MachineCapacity,
        ConstraintFamily::Precedence,
        ConstraintFamily::ModeSelection,
        ConstraintFamily::DurationLink,
        ConstraintFamily::SymmetryBreaking,
    ];
    let families = ranking
        .into_iter()
        .filter(|f| families.contains(f))
        .collect();
    InfeasibilityReport { families, hints }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Instance, Machine, Mode, Precedence, Template, TemplateTask, WorkCell};

    fn chain_problem() -> Problem {
        let template = Template::new("P1", "chain")
            .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)))
            .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
            .with_precedence(Precedence::new("T1", "T2"));
        Problem::new(template)
            .with_machine(Machine::new("M1", "C1"))
            .with_cell(WorkCell::new("C1"))
    }

    #[test]
    fn test_single_instance_chain() {
        let problem = chain_problem().with_instance(Instance::new("J1", "P1").with_due(6));
        let outcome = SolveDriver::new(&problem).solve().unwrap();

        assert_eq!(outcome.status, SolveStatus::Optimal);
        let solution = outcome.solution.unwrap();
        let t1 = solution.task("J1", "T1").unwrap();
        let t2 = solution.task("J1", "T2").unwrap();
        assert_eq!((t1.start_unit, t1.end_unit), (0, 4));
        assert_eq!((t2.start_unit, t2.end_unit), (4, 6));
        assert_eq!(outcome.metrics.makespan_units, 6);
        assert_eq!(outcome.metrics.total_lateness_units, 0);
        assert_eq!(outcome.metrics.instance_count, 1);
    }

    #[test]
    fn test_infeasible_reports_families_and_hints() {
        let problem = chain_problem().with_instance(Instance::new("J1", "P1").with_due(5));
        let outcome = SolveDriver::new(&problem).solve().unwrap();

        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.solution.is_none());
        let report = outcome.infeasibility.unwrap();
        assert_eq!(report.families[0], ConstraintFamily::ObjectiveRegistration);
        assert!(report.hints.iter().any(|h| h.contains("critical path")));
    }

    #[test]
    fn test_metrics_utilization() {
        let problem = chain_problem()
            .with_machine(Machine::new("M2", "C1"))
            .with_instance(Instance::new("J1", "P1"));
        let outcome = SolveDriver::new(&problem).solve().unwrap();
        let utilization = &outcome.metrics.machine_utilization;
        assert!((utilization["M1"] - 1.0).abs() < 1e-10);
        assert_eq!(utilization["M2"], 0.0);
    }

    #[test]
    fn test_speedup_metric() {
        let problem = chain_problem().with_instance(Instance::new("J1", "P1"));
        let outcome = SolveDriver::new(&problem)
            .with_baseline_seconds(10.0)
            .solve()
            .unwrap();
        let speedup = outcome.metrics.speedup_vs_baseline.unwrap();
        assert!(speedup > 0.0);
    }

    #[test]
    fn test_extraction_deterministic() {
        let problem = chain_problem()
            .with_instance(Instance::new("J1", "P1"))
            .with_instance(Instance::new("J2", "P1"));
        let first = SolveDriver::new(&problem).solve().unwrap();
        let second = SolveDriver::new(&problem).solve().unwrap();
        assert_eq!(first.solution, second.solution);
    }

    #[test]
    fn test_reporter_sees_incumbents() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(AtomicUsize);
        impl crate::cp::ProgressReporter for Counter {
            fn report(&self, event: &crate::cp::ProgressEvent) {
                assert!(event.best_objective >= 0.0);
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let problem = chain_problem().with_instance(Instance::new("J1", "P1"));
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let outcome = SolveDriver::new(&problem)
            .with_reporter(counter.clone())
            .solve()
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!(counter.0.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_malformed_problem_is_an_error() {
        let mut problem = chain_problem().with_instance(Instance::new("J1", "P1"));
        problem.template.tasks[0].modes.clear();
        let err = SolveDriver::new(&problem).solve().unwrap_err();
        assert!(matches!(err, SolveError::Malformed(_)));
    }
}
