//! Model builder: problem to constraint model.
//!
//! Orchestrates the variable factory and the constraint library in the
//! fixed family order — later families depend on variables and
//! memberships introduced by earlier ones:
//!
//! 1. mode selection (exactly-one), 2. duration-from-mode link,
//! 3. precedence, 4. machine capacity, 5. cell WIP,
//! 6. sequence-resource exclusivity, 7. operator assignment and shifts,
//! 8. skill requirements, 9. sequence-dependent setups, 10. calendars
//! (7-10 with phase 2 enabled), 11. symmetry breaking,
//! 12. objective registration (phase 3).
//!
//! Constraint generation walks the template once per family and replays
//! the result across instances, keeping model building at
//! O(template × instances) instead of O(total_tasks²) and better.

use tracing::{debug, info_span};

use crate::cp::CpModel;
use crate::error::SolveError;
use crate::models::Problem;
use crate::time::{horizon_units, DomainOffsets};
use crate::validate;

pub mod phase1;
pub mod phase2;
pub mod phase3;
pub mod vars;

pub use vars::VarTable;

/// The constraint families, in application order. The solve driver uses
/// this list for infeasibility hinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFamily {
    ModeSelection,
    DurationLink,
    Precedence,
    MachineCapacity,
    CellWip,
    SequenceExclusivity,
    OperatorAssignment,
    SkillMatching,
    SetupTimes,
    CalendarWindows,
    SymmetryBreaking,
    ObjectiveRegistration,
}

impl std::fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConstraintFamily::ModeSelection => "mode selection",
            ConstraintFamily::DurationLink => "duration link",
            ConstraintFamily::Precedence => "precedence",
            ConstraintFamily::MachineCapacity => "machine capacity",
            ConstraintFamily::CellWip => "cell wip",
            ConstraintFamily::SequenceExclusivity => "sequence exclusivity",
            ConstraintFamily::OperatorAssignment => "operator assignment",
            ConstraintFamily::SkillMatching => "skill matching",
            ConstraintFamily::SetupTimes => "setup times",
            ConstraintFamily::CalendarWindows => "calendar windows",
            ConstraintFamily::SymmetryBreaking => "symmetry breaking",
            ConstraintFamily::ObjectiveRegistration => "objective registration",
        };
        f.write_str(name)
    }
}

/// A built model with its variable table and family audit trail.
#[derive(Debug)]
pub struct BuiltModel {
    pub model: CpModel,
    pub vars: VarTable,
    pub horizon: i64,
    pub families: Vec<ConstraintFamily>,
}

/// Translates a [`Problem`] into a [`CpModel`].
#[derive(Debug, Clone, Copy)]
pub struct ModelBuilder<'a> {
    problem: &'a Problem,
}

impl<'a> ModelBuilder<'a> {
    /// Creates a builder over a problem.
    pub fn new(problem: &'a Problem) -> Self {
        Self { problem }
    }

    /// Validates the problem and applies all constraint families.
    pub fn build(&self) -> Result<BuiltModel, SolveError> {
        let problem = self.problem;
        let _span = info_span!("build_model", template = %problem.template.id).entered();

        validate::validate(problem)?;
        let offsets = DomainOffsets::compute(&problem.template)?;
        let horizon = horizon_units(problem)?;

        let mut model = CpModel::new(format!("pattern:{}", problem.template.id), horizon);
        let vars = vars::create_variables(problem, &mut model, horizon, &offsets);
        let mut families = Vec::new();

        phase1::apply_mode_alternatives(problem, &mut model, &vars);
        families.push(ConstraintFamily::ModeSelection);
        families.push(ConstraintFamily::DurationLink);
        phase1::apply_precedence(problem, &mut model, &vars);
        families.push(ConstraintFamily::Precedence);
        phase1::apply_machine_capacity(problem, &mut model, &vars);
        families.push(ConstraintFamily::MachineCapacity);
        phase1::apply_cell_wip(problem, &mut model, &vars);
        families.push(ConstraintFamily::CellWip);
        phase1::apply_sequence_exclusivity(problem, &mut model, &vars);
        families.push(ConstraintFamily::SequenceExclusivity);

        let params = problem.effective_parameters();
        if params.enable_phase2 {
            phase2::apply_operator_assignment(problem, &mut model, &vars);
            families.push(ConstraintFamily::OperatorAssignment);
            phase2::apply_skill_requirements(problem, &mut model, &vars);
            families.push(ConstraintFamily::SkillMatching);
            phase2::apply_setup_transitions(problem, &mut model, &vars);
            families.push(ConstraintFamily::SetupTimes);
            phase2::apply_calendar_windows(problem, &mut model, &vars);
            families.push(ConstraintFamily::CalendarWindows);
        }

        self.apply_symmetry_breaking(&mut model, &vars);
        families.push(ConstraintFamily::SymmetryBreaking);

        if params.enable_phase3 {
            phase3::register_objectives(problem, &mut model, &vars);
            families.push(ConstraintFamily::ObjectiveRegistration);
        }

        model
            .validate()
            .map_err(|reason| SolveError::Internal(format!("built an invalid model: {reason}")))?;
        debug!(
            intervals = model.interval_count(),
            constraints = model.constraint_count(),
            families = families.len(),
            "model built"
        );
        Ok(BuiltModel {
            model,
            vars,
            horizon,
            families,
        })
    }

    /// Family 11: lexicographic anchor ordering over indistinguishable
    /// instances.
    ///
    /// Instances sharing template, priority, release, and due date are
    /// interchangeable; ordering their anchor-task starts removes the
    /// factorial relabeling symmetry at no feasibility cost.
    fn apply_symmetry_breaking(&self, model: &mut CpModel, vars: &VarTable) {
        let problem = self.problem;
        let Some(anchor) = problem.template.anchor_task_index() else {
            return;
        };
        let mut chained = 0usize;
        let mut grouped: Vec<usize> = (0..problem.instances.len()).collect();
        // Stable partition into interchangeability groups, in input order.
        while let Some(&leader) = grouped.first() {
            let (group, rest): (Vec<usize>, Vec<usize>) = grouped.iter().copied().partition(|&i| {
                problem.instances[i].interchangeable_with(&problem.instances[leader])
            });
            for pair in group.windows(2) {
                model.add_start_order(
                    vars.interval_at(pair[0], anchor),
                    vars.interval_at(pair[1], anchor),
                );
                chained += 1;
            }
            grouped = rest;
        }
        debug!(chained, "symmetry breaking applied");
    }
}
