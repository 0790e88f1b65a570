//! Constraint-programming layer.
//!
//! Splits into the declarative [`model`] (interval variables, resource
//! declarations, constraints, objectives) and the [`solver`] seam with
//! the bundled branch-and-bound engine. The model builder in
//! [`crate::builder`] produces a [`CpModel`]; the solve driver in
//! [`crate::driver`] runs a [`CpSolver`] over it and extracts domain
//! solutions.
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling"

pub mod model;
pub mod solver;

pub use model::{
    CpConstraint, CpModel, CrewReq, DueDate, Interval, IntervalId, ModeArm, ObjectiveKind,
    OperatorDecl, OperatorId, ResourceDecl, ResourceId, Scalarization, SequenceDecl, SequenceId,
    SkillNeed, Span, TransitionTable, WipGroup,
};
pub use solver::{
    BranchAndBoundSolver, Branching, CancelToken, CpSolution, CpSolver, IntervalSolution,
    ProgressEvent, ProgressReporter, SearchConfig, SolverStatus,
};
