//! Constraint model for scheduling problems.
//!
//! A [`CpModel`] is the engine-facing form of a problem: interval
//! variables with mode alternatives, resource declarations, cumulative
//! groups, sequence spans, operator crews, precedence edges, and
//! objective scalarization. The model builder fills it; a
//! [`CpSolver`](super::CpSolver) interprets it.
//!
//! Variables are addressed by dense indices. Every interval also carries
//! a human-readable name for diagnostics; nothing in the engine keys on
//! those names.

use std::collections::HashMap;

/// Dense interval variable index.
pub type IntervalId = usize;
/// Dense resource (machine) index.
pub type ResourceId = usize;
/// Dense operator index.
pub type OperatorId = usize;
/// Dense sequence declaration index.
pub type SequenceId = usize;

/// One mode alternative of an interval: run on `resource` for `duration`.
///
/// Exactly one arm is selected per interval in a solution. Arm selection
/// is the engine's mode-selection boolean; the arm's resource membership
/// is its machine-assignment boolean.
#[derive(Debug, Clone)]
pub struct ModeArm {
    /// Diagnostic name (the domain mode id).
    pub name: String,
    /// Resource this arm occupies.
    pub resource: ResourceId,
    /// Processing duration in units.
    pub duration: i64,
}

/// An interval variable with tightened bounds and mode alternatives.
#[derive(Debug, Clone)]
pub struct Interval {
    /// Diagnostic name, e.g. `"J1/T2"`.
    pub name: String,
    /// Transition class (the template task id); shared across instances.
    pub class: String,
    /// Owning group (the instance id).
    pub group: String,
    /// Earliest start.
    pub start_min: i64,
    /// Latest start.
    pub start_max: i64,
    /// Latest end.
    pub end_max: i64,
    /// Mode alternatives. Non-empty.
    pub arms: Vec<ModeArm>,
    /// Whether the interval counts against its cell's WIP limit.
    pub counts_wip: bool,
}

/// Sequence-dependent changeover table for one resource, keyed by
/// interval class.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    /// Fallback for unlisted pairs.
    pub default_units: i64,
    /// (from_class, to_class) -> units.
    pub entries: HashMap<(String, String), i64>,
}

impl TransitionTable {
    /// Changeover from one class to another. Same-class transitions are
    /// free unless explicitly listed.
    pub fn get(&self, from: &str, to: &str) -> i64 {
        if let Some(&units) = self.entries.get(&(from.to_string(), to.to_string())) {
            return units;
        }
        if from == to {
            0
        } else {
            self.default_units
        }
    }
}

/// A declared resource: capacity, fixed occupation pads, downtime, and an
/// optional changeover table (which supersedes the pads for sequencing).
#[derive(Debug, Clone)]
pub struct ResourceDecl {
    /// Diagnostic name (the machine id).
    pub name: String,
    /// Simultaneous interval capacity. >= 1.
    pub capacity: i32,
    /// Fixed occupation before each interval.
    pub pre_pad: i64,
    /// Fixed occupation after each interval.
    pub post_pad: i64,
    /// Downtime windows [start, end); intervals may not overlap them.
    pub forbidden: Vec<(i64, i64)>,
    /// WIP group this resource belongs to, if any.
    pub wip_group: Option<usize>,
    /// Cost per busy unit, for the cost objective.
    pub cost_per_unit: f64,
    /// Sequence-dependent changeovers. Only honored on unary resources.
    pub transitions: Option<TransitionTable>,
}

/// A cumulative work-in-progress group over resources.
#[derive(Debug, Clone)]
pub struct WipGroup {
    /// Diagnostic name (the cell id).
    pub name: String,
    /// Simultaneous in-progress interval cap.
    pub capacity: i32,
}

/// A sequence resource declaration.
#[derive(Debug, Clone)]
pub struct SequenceDecl {
    /// Diagnostic name (the sequence resource id).
    pub name: String,
    /// Simultaneous holder cap.
    pub capacity: i32,
    /// Units prepended to each reservation.
    pub pre_pad: i64,
    /// Units appended to each reservation.
    pub post_pad: i64,
}

/// One instance's hold on a sequence resource: a span from its first
/// member interval to its last, extended by the declaration's pads.
#[derive(Debug, Clone)]
pub struct Span {
    /// Sequence declaration held.
    pub sequence: SequenceId,
    /// Owning group (instance id), for extraction.
    pub owner: String,
    /// Member intervals.
    pub members: Vec<IntervalId>,
}

/// A declared operator.
#[derive(Debug, Clone)]
pub struct OperatorDecl {
    /// Diagnostic name (the operator id).
    pub name: String,
    /// Skill ranks by skill id.
    pub skills: HashMap<String, u8>,
    /// Shift windows [start, end). Empty = always available.
    pub shifts: Vec<(i64, i64)>,
    /// Daily workload cap in units.
    pub max_units_per_day: Option<i64>,
    /// Whether the daily cap is soft.
    pub overtime_allowed: bool,
    /// Cost per assigned unit.
    pub cost_per_unit: f64,
}

/// A skill demand on a crew: at least `count` members at `min_rank`+.
#[derive(Debug, Clone)]
pub struct SkillNeed {
    pub skill: String,
    pub min_rank: u8,
    pub count: usize,
}

/// Operator crew requirement of one interval.
#[derive(Debug, Clone)]
pub struct CrewReq {
    /// Interval the crew covers.
    pub interval: IntervalId,
    /// Crew size to assign.
    pub size: usize,
    /// Upper bound on crew size, for diagnostics.
    pub max_size: usize,
    /// Operators allowed on this crew.
    pub eligible: Vec<OperatorId>,
    /// Skill demands the crew must satisfy.
    pub needs: Vec<SkillNeed>,
    /// Whether shift containment is waived (unattended task).
    pub shift_exempt: bool,
}

/// A temporal constraint between intervals.
#[derive(Debug, Clone)]
pub enum CpConstraint {
    /// `after` starts in [end(before) + min_delay, end(before) + max_delay].
    Precedence {
        before: IntervalId,
        after: IntervalId,
        min_delay: i64,
        max_delay: Option<i64>,
    },
    /// start(first) <= start(second). Symmetry breaking.
    StartOrder {
        first: IntervalId,
        second: IntervalId,
    },
}

/// An objective dimension. All are minimized; utilization is encoded as
/// total idle time, so minimizing it maximizes utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectiveKind {
    Makespan,
    TotalLateness,
    MaxLateness,
    TotalCost,
    Utilization,
}

/// A due date over a group of intervals: lateness is
/// max(0, max end of members - due).
#[derive(Debug, Clone)]
pub struct DueDate {
    /// Owning group (instance id).
    pub owner: String,
    /// Member intervals.
    pub members: Vec<IntervalId>,
    /// Due unit.
    pub due: i64,
}

/// Reduction of the objective vector to a search order.
#[derive(Debug, Clone)]
pub enum Scalarization {
    /// Minimize the weighted sum of the listed dimensions.
    Weighted(Vec<(ObjectiveKind, f64)>),
    /// Minimize dimensions lexicographically in the listed order.
    Lexicographic(Vec<ObjectiveKind>),
}

/// The complete constraint model handed to a solver.
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    /// Model name, for diagnostics.
    pub name: String,
    /// Scheduling horizon in units.
    pub horizon: i64,
    pub intervals: Vec<Interval>,
    pub resources: Vec<ResourceDecl>,
    pub wip_groups: Vec<WipGroup>,
    pub sequences: Vec<SequenceDecl>,
    pub spans: Vec<Span>,
    pub operators: Vec<OperatorDecl>,
    pub crews: Vec<CrewReq>,
    pub constraints: Vec<CpConstraint>,
    pub due_dates: Vec<DueDate>,
    pub scalarization: Option<Scalarization>,
}

impl CpModel {
    /// Creates an empty model with the given horizon.
    pub fn new(name: impl Into<String>, horizon: i64) -> Self {
        Self {
            name: name.into(),
            horizon,
            ..Self::default()
        }
    }

    /// Adds a resource declaration, returning its id.
    pub fn add_resource(&mut self, decl: ResourceDecl) -> ResourceId {
        self.resources.push(decl);
        self.resources.len() - 1
    }

    /// Adds a WIP group, returning its index.
    pub fn add_wip_group(&mut self, group: WipGroup) -> usize {
        self.wip_groups.push(group);
        self.wip_groups.len() - 1
    }

    /// Adds a sequence declaration, returning its id.
    pub fn add_sequence(&mut self, decl: SequenceDecl) -> SequenceId {
        self.sequences.push(decl);
        self.sequences.len() - 1
    }

    /// Adds an operator declaration, returning its id.
    pub fn add_operator(&mut self, decl: OperatorDecl) -> OperatorId {
        self.operators.push(decl);
        self.operators.len() - 1
    }

    /// Adds an interval variable, returning its id.
    pub fn add_interval(&mut self, interval: Interval) -> IntervalId {
        self.intervals.push(interval);
        self.intervals.len() - 1
    }

    /// Adds a sequence span.
    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Adds a crew requirement.
    pub fn add_crew(&mut self, crew: CrewReq) {
        self.crews.push(crew);
    }

    /// Adds a precedence edge.
    pub fn add_precedence(
        &mut self,
        before: IntervalId,
        after: IntervalId,
        min_delay: i64,
        max_delay: Option<i64>,
    ) {
        self.constraints.push(CpConstraint::Precedence {
            before,
            after,
            min_delay,
            max_delay,
        });
    }

    /// Adds a start-order (symmetry breaking) edge.
    pub fn add_start_order(&mut self, first: IntervalId, second: IntervalId) {
        self.constraints
            .push(CpConstraint::StartOrder { first, second });
    }

    /// Adds a due date group.
    pub fn add_due_date(&mut self, due: DueDate) {
        self.due_dates.push(due);
    }

    /// Sets the objective scalarization.
    pub fn set_scalarization(&mut self, scalarization: Scalarization) {
        self.scalarization = Some(scalarization);
    }

    /// Number of interval variables.
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    /// Number of explicit temporal constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Checks referential integrity of the model.
    ///
    /// A failure here is a programmer error in the builder, not a
    /// property of the problem; solvers report it as `ModelInvalid`.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.intervals.len();
        for (id, interval) in self.intervals.iter().enumerate() {
            if interval.arms.is_empty() {
                return Err(format!("interval {} '{}' has no arms", id, interval.name));
            }
            for arm in &interval.arms {
                if arm.resource >= self.resources.len() {
                    return Err(format!(
                        "interval '{}' arm '{}' references resource {}",
                        interval.name, arm.name, arm.resource
                    ));
                }
                if arm.duration < 1 {
                    return Err(format!(
                        "interval '{}' arm '{}' has duration {}",
                        interval.name, arm.name, arm.duration
                    ));
                }
            }
            // An empty start domain (start_min > start_max) is a tightened
            // infeasibility, not a malformed model; solvers prove it.
        }
        for resource in &self.resources {
            if let Some(group) = resource.wip_group {
                if group >= self.wip_groups.len() {
                    return Err(format!(
                        "resource '{}' references wip group {}",
                        resource.name, group
                    ));
                }
            }
        }
        for span in &self.spans {
            if span.sequence >= self.sequences.len() {
                return Err(format!("span '{}' references sequence {}", span.owner, span.sequence));
            }
            if span.members.iter().any(|&m| m >= n) {
                return Err(format!("span '{}' references unknown interval", span.owner));
            }
        }
        for crew in &self.crews {
            if crew.interval >= n {
                return Err(format!("crew references interval {}", crew.interval));
            }
            if crew.eligible.iter().any(|&o| o >= self.operators.len()) {
                return Err(format!(
                    "crew on interval {} references unknown operator",
                    crew.interval
                ));
            }
        }
        for constraint in &self.constraints {
            let (a, b) = match constraint {
                CpConstraint::Precedence { before, after, .. } => (*before, *after),
                CpConstraint::StartOrder { first, second } => (*first, *second),
            };
            if a >= n || b >= n {
                return Err(format!("constraint references interval {}/{}", a, b));
            }
        }
        for due in &self.due_dates {
            if due.members.iter().any(|&m| m >= n) {
                return Err(format!("due date '{}' references unknown interval", due.owner));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unary_resource(name: &str) -> ResourceDecl {
        ResourceDecl {
            name: name.into(),
            capacity: 1,
            pre_pad: 0,
            post_pad: 0,
            forbidden: Vec::new(),
            wip_group: None,
            cost_per_unit: 0.0,
            transitions: None,
        }
    }

    fn interval_on(name: &str, resource: ResourceId, duration: i64, horizon: i64) -> Interval {
        Interval {
            name: name.into(),
            class: name.into(),
            group: "J1".into(),
            start_min: 0,
            start_max: horizon - duration,
            end_max: horizon,
            arms: vec![ModeArm {
                name: format!("{name}-arm"),
                resource,
                duration,
            }],
            counts_wip: true,
        }
    }

    #[test]
    fn test_build_and_validate() {
        let mut model = CpModel::new("test", 100);
        let m1 = model.add_resource(unary_resource("M1"));
        let a = model.add_interval(interval_on("a", m1, 4, 100));
        let b = model.add_interval(interval_on("b", m1, 2, 100));
        model.add_precedence(a, b, 0, None);

        assert_eq!(model.interval_count(), 2);
        assert_eq!(model.constraint_count(), 1);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_arms() {
        let mut model = CpModel::new("test", 100);
        let mut iv = interval_on("a", 0, 4, 100);
        iv.arms.clear();
        model.add_resource(unary_resource("M1"));
        model.add_interval(iv);
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_resource() {
        let mut model = CpModel::new("test", 100);
        model.add_interval(interval_on("a", 3, 4, 100));
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_empty_start_domain() {
        // Tight due dates can empty a domain; that is infeasibility,
        // not an invalid model.
        let mut model = CpModel::new("test", 100);
        let m1 = model.add_resource(unary_resource("M1"));
        let mut iv = interval_on("a", m1, 4, 100);
        iv.start_min = 50;
        iv.start_max = 10;
        model.add_interval(iv);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_transition_table() {
        let mut table = TransitionTable {
            default_units: 2,
            entries: HashMap::new(),
        };
        table.entries.insert(("T1".into(), "T2".into()), 5);
        assert_eq!(table.get("T1", "T2"), 5);
        assert_eq!(table.get("T2", "T1"), 2);
        assert_eq!(table.get("T1", "T1"), 0);
    }
}
