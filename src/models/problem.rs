//! Problem container and solver parameters.
//!
//! A [`Problem`] is one template, its instances, the resource catalog, and
//! the solver parameters — everything a solve needs, read-only. This is
//! the stable ingestion contract: loaders assemble it, the model builder
//! consumes it.

use serde::{Deserialize, Serialize};

use super::{
    Calendar, Instance, Machine, Operator, SequenceResource, SetupTimeTable, Skill, Template,
    WorkCell,
};

/// An optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Makespan,
    TotalLateness,
    MaxLateness,
    TotalCost,
    Utilization,
}

/// Search branching strategy of the underlying engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchBranching {
    Automatic,
    FixedSearch,
}

/// Non-negative weights for the weighted-sum scalarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub makespan: f64,
    pub total_lateness: f64,
    pub max_lateness: f64,
    pub total_cost: f64,
    pub utilization: f64,
}

impl ObjectiveWeights {
    /// Makespan-only weights.
    pub fn makespan_only() -> Self {
        Self {
            makespan: 1.0,
            total_lateness: 0.0,
            max_lateness: 0.0,
            total_cost: 0.0,
            utilization: 0.0,
        }
    }

    /// Weight for a given objective.
    pub fn weight(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Makespan => self.makespan,
            Objective::TotalLateness => self.total_lateness,
            Objective::MaxLateness => self.max_lateness,
            Objective::TotalCost => self.total_cost,
            Objective::Utilization => self.utilization,
        }
    }

    /// Whether every weight is zero.
    pub fn is_zero(&self) -> bool {
        [
            self.makespan,
            self.total_lateness,
            self.max_lateness,
            self.total_cost,
            self.utilization,
        ]
        .iter()
        .all(|w| *w == 0.0)
    }
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self::makespan_only()
    }
}

/// Search configuration recognized by the solve driver.
///
/// `objective_lex_order`, when present, overrides the weighted sum with
/// lexicographic optimization in the listed priority order. The caller
/// always chooses the scalarization; with phase 3 enabled, all-zero
/// weights and no lexicographic order is a malformed problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParameters {
    /// Worker threads requested from the engine. >= 1.
    pub num_search_workers: i32,
    /// Wall-clock budget in seconds. > 0.
    pub max_time_seconds: f64,
    /// Engine linearization level: 0, 1, or 2.
    pub linearization_level: i32,
    /// Branching strategy.
    pub search_branching: SearchBranching,
    /// Enables skills, shifts, setup transitions, and calendars.
    pub enable_phase2: bool,
    /// Enables objective registration and scalarization.
    pub enable_phase3: bool,
    /// Weighted-sum weights.
    pub objective_weights: ObjectiveWeights,
    /// Lexicographic priority list; overrides the weighted sum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_lex_order: Option<Vec<Objective>>,
}

impl SolverParameters {
    /// Parameters for a quick makespan-minimizing solve.
    pub fn new() -> Self {
        Self {
            num_search_workers: 4,
            max_time_seconds: 60.0,
            linearization_level: 1,
            search_branching: SearchBranching::Automatic,
            enable_phase2: true,
            enable_phase3: true,
            objective_weights: ObjectiveWeights::makespan_only(),
            objective_lex_order: None,
        }
    }

    /// Sets the time budget.
    pub fn with_max_time(mut self, seconds: f64) -> Self {
        self.max_time_seconds = seconds;
        self
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: i32) -> Self {
        self.num_search_workers = workers;
        self
    }

    /// Sets the branching strategy.
    pub fn with_branching(mut self, branching: SearchBranching) -> Self {
        self.search_branching = branching;
        self
    }

    /// Disables phase 2 families.
    pub fn without_phase2(mut self) -> Self {
        self.enable_phase2 = false;
        self
    }

    /// Disables phase 3 objective registration.
    pub fn without_phase3(mut self) -> Self {
        self.enable_phase3 = false;
        self
    }

    /// Sets weighted-sum weights.
    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.objective_weights = weights;
        self
    }

    /// Sets a lexicographic priority order.
    pub fn with_lex_order(mut self, order: Vec<Objective>) -> Self {
        self.objective_lex_order = Some(order);
        self
    }
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete scheduling problem: one template, its instances, and the
/// resource catalog they compete for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// The shared job structure.
    pub template: Template,
    /// Jobs to schedule.
    pub instances: Vec<Instance>,
    /// Machines.
    pub machines: Vec<Machine>,
    /// Work cells.
    pub cells: Vec<WorkCell>,
    /// Operators.
    pub operators: Vec<Operator>,
    /// Skill definitions.
    pub skills: Vec<Skill>,
    /// Sequence resources.
    pub sequence_resources: Vec<SequenceResource>,
    /// Calendars.
    pub calendars: Vec<Calendar>,
    /// Sequence-dependent changeovers.
    pub setup_times: SetupTimeTable,
    /// Search configuration.
    pub parameters: SolverParameters,
}

impl Problem {
    /// Creates a problem around a template with empty catalogs and
    /// default parameters.
    pub fn new(template: Template) -> Self {
        Self {
            template,
            instances: Vec::new(),
            machines: Vec::new(),
            cells: Vec::new(),
            operators: Vec::new(),
            skills: Vec::new(),
            sequence_resources: Vec::new(),
            calendars: Vec::new(),
            setup_times: SetupTimeTable::new(),
            parameters: SolverParameters::new(),
        }
    }

    /// Adds an instance.
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    /// Adds a machine.
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machines.push(machine);
        self
    }

    /// Adds a work cell.
    pub fn with_cell(mut self, cell: WorkCell) -> Self {
        self.cells.push(cell);
        self
    }

    /// Adds an operator.
    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operators.push(operator);
        self
    }

    /// Adds a skill definition.
    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Adds a sequence resource.
    pub fn with_sequence_resource(mut self, resource: SequenceResource) -> Self {
        self.sequence_resources.push(resource);
        self
    }

    /// Adds a calendar.
    pub fn with_calendar(mut self, calendar: Calendar) -> Self {
        self.calendars.push(calendar);
        self
    }

    /// Sets the setup-time table.
    pub fn with_setup_times(mut self, table: SetupTimeTable) -> Self {
        self.setup_times = table;
        self
    }

    /// Sets solver parameters.
    pub fn with_parameters(mut self, parameters: SolverParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Looks up a machine by id.
    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    /// Looks up a cell by id.
    pub fn cell(&self, id: &str) -> Option<&WorkCell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Looks up a calendar by id.
    pub fn calendar(&self, id: &str) -> Option<&Calendar> {
        self.calendars.iter().find(|c| c.id == id)
    }

    /// Looks up a sequence resource by id.
    pub fn sequence_resource(&self, id: &str) -> Option<&SequenceResource> {
        self.sequence_resources.iter().find(|s| s.id == id)
    }

    /// Looks up an operator by id.
    pub fn operator(&self, id: &str) -> Option<&Operator> {
        self.operators.iter().find(|o| o.id == id)
    }

    /// Looks up an instance by id.
    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// The problem epoch: the minimum earliest start across instances.
    pub fn epoch_unit(&self) -> i64 {
        self.instances
            .iter()
            .map(|i| i.earliest_start_unit)
            .min()
            .unwrap_or(0)
    }

    /// Effective parameters: the problem's own, unless the template
    /// carries promoted ones and the problem still has defaults.
    pub fn effective_parameters(&self) -> &SolverParameters {
        match &self.template.solver_parameters {
            Some(promoted) if self.parameters == SolverParameters::default() => promoted,
            _ => &self.parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mode, TemplateTask};

    fn sample_problem() -> Problem {
        let template = Template::new("P1", "pattern")
            .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("m1", "M1", 4)));
        Problem::new(template)
            .with_machine(Machine::new("M1", "C1"))
            .with_cell(WorkCell::new("C1"))
            .with_instance(Instance::new("J1", "P1").with_earliest_start(4))
            .with_instance(Instance::new("J2", "P1").with_earliest_start(2))
    }

    #[test]
    fn test_lookups() {
        let p = sample_problem();
        assert!(p.machine("M1").is_some());
        assert!(p.machine("M9").is_none());
        assert!(p.cell("C1").is_some());
        assert!(p.instance("J2").is_some());
    }

    #[test]
    fn test_epoch_is_min_release() {
        let p = sample_problem();
        assert_eq!(p.epoch_unit(), 2);
        assert_eq!(Problem::new(Template::new("P", "p")).epoch_unit(), 0);
    }

    #[test]
    fn test_promoted_parameters_used_when_defaults() {
        let mut p = sample_problem();
        let promoted = SolverParameters::new().with_max_time(5.0).with_workers(8);
        p.template.solver_parameters = Some(promoted.clone());
        assert_eq!(p.effective_parameters(), &promoted);

        // Explicit problem parameters win over promoted ones.
        p.parameters = SolverParameters::new().with_max_time(1.0);
        assert_eq!(p.effective_parameters().max_time_seconds, 1.0);
    }

    #[test]
    fn test_weights() {
        let w = ObjectiveWeights::makespan_only();
        assert_eq!(w.weight(Objective::Makespan), 1.0);
        assert_eq!(w.weight(Objective::TotalCost), 0.0);
        assert!(!w.is_zero());
    }

    #[test]
    fn test_parameter_serde_names() {
        let params = SolverParameters::new().with_branching(SearchBranching::FixedSearch);
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"num_search_workers\""));
        assert!(json.contains("\"max_time_seconds\""));
        assert!(json.contains("\"FIXED_SEARCH\""));
    }

    #[test]
    fn test_objective_serde_names() {
        let order = vec![Objective::TotalLateness, Objective::Makespan];
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"["total_lateness","makespan"]"#);
    }
}
