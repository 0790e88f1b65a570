//! Template (pattern) model.
//!
//! A template is a reusable structural description of a job: its tasks,
//! their modes, and the precedence relation between them. A problem
//! instantiates one template N times; the model builder generates
//! constraints once per template element and replays them per instance,
//! which is where the pattern speedup comes from.
//!
//! Templates are immutable within a solve.

use serde::{Deserialize, Serialize};

use super::{Proficiency, SolverParameters};

/// One allowable (machine, duration) option for a task.
///
/// A task selects exactly one of its modes in a solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mode {
    /// Unique mode identifier.
    pub id: String,
    /// Machine this mode runs on.
    pub machine_id: String,
    /// Processing time in units. Must be >= 1.
    pub duration_units: i64,
}

impl Mode {
    /// Creates a new mode.
    pub fn new(id: impl Into<String>, machine_id: impl Into<String>, duration_units: i64) -> Self {
        Self {
            id: id.into(),
            machine_id: machine_id.into(),
            duration_units,
        }
    }

    /// Creates a mode from a duration in minutes (ceiling conversion).
    pub fn from_minutes(
        id: impl Into<String>,
        machine_id: impl Into<String>,
        duration_minutes: i64,
    ) -> Self {
        Self::new(
            id,
            machine_id,
            crate::time::minutes_to_units(duration_minutes),
        )
    }
}

/// A skill demanded by a task: at least `count` of the assigned operators
/// must hold `skill_id` at `required_level` or higher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRequirement {
    /// Required skill.
    pub skill_id: String,
    /// Minimum proficiency level.
    pub required_level: Proficiency,
    /// How many assigned operators must satisfy it.
    pub count: i32,
}

impl SkillRequirement {
    /// Creates a new skill requirement for one operator.
    pub fn new(skill_id: impl Into<String>, required_level: Proficiency) -> Self {
        Self {
            skill_id: skill_id.into(),
            required_level,
            count: 1,
        }
    }

    /// Sets the required operator count.
    pub fn with_count(mut self, count: i32) -> Self {
        self.count = count;
        self
    }
}

/// A task within a template.
///
/// `position` orders tasks within the template; positions are unique and
/// strictly increasing. The task at the lowest position is the default
/// symmetry-breaking anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTask {
    /// Unique task identifier (within the template).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Ordering position within the template.
    pub position: i32,
    /// Whether the task runs without operator attendance.
    pub is_unattended: bool,
    /// Whether the task is a changeover/setup operation.
    pub is_setup: bool,
    /// Sequence resource held across this task, if any.
    pub sequence_id: Option<String>,
    /// Minimum operators required. 1 <= min <= max.
    pub min_operators: i32,
    /// Maximum operators allowed.
    pub max_operators: i32,
    /// Machine/duration options. Non-empty.
    pub modes: Vec<Mode>,
    /// Skill demands on the assigned operator set.
    pub skill_requirements: Vec<SkillRequirement>,
}

impl TemplateTask {
    /// Creates a new task at the given position.
    pub fn new(id: impl Into<String>, position: i32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            position,
            is_unattended: false,
            is_setup: false,
            sequence_id: None,
            min_operators: 1,
            max_operators: 1,
            modes: Vec::new(),
            skill_requirements: Vec::new(),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks the task as unattended (no operator presence once started).
    pub fn unattended(mut self) -> Self {
        self.is_unattended = true;
        self
    }

    /// Marks the task as a setup operation.
    pub fn setup(mut self) -> Self {
        self.is_setup = true;
        self
    }

    /// Binds the task to a sequence resource.
    pub fn with_sequence(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }

    /// Sets the operator range.
    pub fn with_operators(mut self, min: i32, max: i32) -> Self {
        self.min_operators = min;
        self.max_operators = max;
        self
    }

    /// Adds a mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.modes.push(mode);
        self
    }

    /// Adds a skill requirement.
    pub fn with_skill_requirement(mut self, req: SkillRequirement) -> Self {
        self.skill_requirements.push(req);
        self
    }

    /// Minimum duration across modes (units).
    pub fn min_duration_units(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_units)
            .min()
            .unwrap_or(0)
    }

    /// Maximum duration across modes (units).
    pub fn max_duration_units(&self) -> i64 {
        self.modes
            .iter()
            .map(|m| m.duration_units)
            .max()
            .unwrap_or(0)
    }
}

/// A precedence edge between two template tasks.
///
/// The successor starts at least `min_delay_units` after the predecessor
/// ends; with `max_delay_units` present, no later than that bound either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precedence {
    /// Task that must finish first.
    pub predecessor_id: String,
    /// Task that follows.
    pub successor_id: String,
    /// Minimum units between predecessor end and successor start.
    pub min_delay_units: i64,
    /// Maximum units between predecessor end and successor start.
    pub max_delay_units: Option<i64>,
}

impl Precedence {
    /// Creates a zero-delay precedence.
    pub fn new(predecessor_id: impl Into<String>, successor_id: impl Into<String>) -> Self {
        Self {
            predecessor_id: predecessor_id.into(),
            successor_id: successor_id.into(),
            min_delay_units: 0,
            max_delay_units: None,
        }
    }

    /// Sets the minimum delay.
    pub fn with_min_delay(mut self, units: i64) -> Self {
        self.min_delay_units = units;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, units: i64) -> Self {
        self.max_delay_units = Some(units);
        self
    }
}

/// A reusable job structure: the unit of constraint reuse across
/// identical instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique template identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Tasks, ordered by position.
    pub tasks: Vec<TemplateTask>,
    /// Precedence edges over tasks.
    pub precedences: Vec<Precedence>,
    /// Best-known solver parameters for this template, if promoted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_parameters: Option<SolverParameters>,
}

impl Template {
    /// Creates an empty template.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks: Vec::new(),
            precedences: Vec::new(),
            solver_parameters: None,
        }
    }

    /// Adds a task.
    pub fn with_task(mut self, task: TemplateTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Adds a precedence edge.
    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedences.push(precedence);
        self
    }

    /// Sets promoted solver parameters.
    pub fn with_solver_parameters(mut self, params: SolverParameters) -> Self {
        self.solver_parameters = Some(params);
        self
    }

    /// Index of a task by id.
    pub fn task_index(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    /// The symmetry-breaking anchor: the task at the lowest position.
    pub fn anchor_task_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.position)
            .map(|(i, _)| i)
    }

    /// Number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_builder() {
        let template = Template::new("P1", "widget run")
            .with_task(
                TemplateTask::new("T1", 0)
                    .with_name("cut")
                    .with_mode(Mode::new("T1M1", "M1", 4))
                    .with_mode(Mode::new("T1M2", "M2", 6)),
            )
            .with_task(
                TemplateTask::new("T2", 1)
                    .unattended()
                    .with_sequence("Q1")
                    .with_mode(Mode::new("T2M1", "M1", 2)),
            )
            .with_precedence(Precedence::new("T1", "T2").with_min_delay(1));

        assert_eq!(template.task_count(), 2);
        assert_eq!(template.task_index("T2"), Some(1));
        assert_eq!(template.task_index("T9"), None);
        assert_eq!(template.tasks[0].min_duration_units(), 4);
        assert_eq!(template.tasks[0].max_duration_units(), 6);
        assert!(template.tasks[1].is_unattended);
        assert_eq!(template.tasks[1].sequence_id.as_deref(), Some("Q1"));
        assert_eq!(template.precedences[0].min_delay_units, 1);
    }

    #[test]
    fn test_anchor_is_lowest_position() {
        let template = Template::new("P1", "p")
            .with_task(TemplateTask::new("B", 5).with_mode(Mode::new("m1", "M1", 1)))
            .with_task(TemplateTask::new("A", 2).with_mode(Mode::new("m2", "M1", 1)));
        assert_eq!(template.anchor_task_index(), Some(1));
    }

    #[test]
    fn test_mode_from_minutes_rounds_up() {
        let mode = Mode::from_minutes("m", "M1", 20);
        assert_eq!(mode.duration_units, 2);
    }

    #[test]
    fn test_skill_requirement_builder() {
        let req = SkillRequirement::new("welding", Proficiency::Proficient).with_count(2);
        assert_eq!(req.skill_id, "welding");
        assert_eq!(req.required_level, Proficiency::Proficient);
        assert_eq!(req.count, 2);
    }

    #[test]
    fn test_precedence_delays() {
        let p = Precedence::new("T1", "T2").with_min_delay(2).with_max_delay(8);
        assert_eq!(p.min_delay_units, 2);
        assert_eq!(p.max_delay_units, Some(8));
    }
}
