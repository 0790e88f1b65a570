//! CP solver interface and the bundled branch-and-bound engine.
//!
//! [`CpSolver`] is the seam: implementations may wrap external engines or
//! provide custom search. The bundled [`BranchAndBoundSolver`] runs a
//! chronological schedule-generation branch-and-bound: it branches over
//! (ready interval, mode arm, operator crew) decisions, places each
//! candidate at its earliest feasible time, and prunes on an admissible
//! bound of the scalarized objective. Exhausted search proves optimality
//! (or infeasibility, where earliest-start placement is a complete
//! scheme); a time budget or cancellation makes it an anytime solver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::model::{
    CpConstraint, CpModel, IntervalId, ObjectiveKind, OperatorId, ResourceId, Scalarization,
};
use crate::time::UNITS_PER_DAY;

/// Status of the solver after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Proven optimal solution found.
    Optimal,
    /// Feasible solution found, optimality not proven.
    Feasible,
    /// Proven: no feasible solution exists.
    Infeasible,
    /// Model failed referential validation.
    ModelInvalid,
    /// Budget exhausted; a feasible incumbent may accompany this.
    Timeout,
    /// Nothing proven.
    Unknown,
}

/// Solution values for one interval variable.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSolution {
    /// Assigned start.
    pub start: i64,
    /// Assigned end.
    pub end: i64,
    /// Selected arm index.
    pub arm: usize,
    /// Resource of the selected arm.
    pub resource: ResourceId,
    /// Assigned operator crew.
    pub operators: Vec<OperatorId>,
}

/// Solution from a CP solver.
#[derive(Debug, Clone)]
pub struct CpSolution {
    /// Solver status.
    pub status: SolverStatus,
    /// Scalarized objective value, if any solution was found.
    pub objective: Option<f64>,
    /// Raw objective values: makespan, total lateness, max lateness,
    /// total cost, idle time. Empty when no solution was found.
    pub objective_values: Vec<(ObjectiveKind, f64)>,
    /// Per-interval assignments, indexed like `model.intervals`.
    /// Empty when no solution was found.
    pub intervals: Vec<IntervalSolution>,
    /// Wall-clock solve time.
    pub solve_time: Duration,
    /// Search nodes expanded.
    pub nodes: u64,
    /// Whether the run ended by cooperative cancellation.
    pub canceled: bool,
}

impl CpSolution {
    /// Creates an empty solution with the given status.
    pub fn empty(status: SolverStatus) -> Self {
        Self {
            status,
            objective: None,
            objective_values: Vec::new(),
            intervals: Vec::new(),
            solve_time: Duration::ZERO,
            nodes: 0,
            canceled: false,
        }
    }

    /// Whether a feasible solution accompanies the status.
    pub fn is_solution_found(&self) -> bool {
        !self.intervals.is_empty()
    }

    /// Maximum end across all intervals.
    pub fn max_end(&self) -> i64 {
        self.intervals.iter().map(|s| s.end).max().unwrap_or(0)
    }

    /// Raw value of one objective dimension, if recorded.
    pub fn objective_value(&self, kind: ObjectiveKind) -> Option<f64> {
        self.objective_values
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
    }
}

/// Cooperative cancellation token.
///
/// Cloneable and thread-safe; the caller keeps one end, the search polls
/// the other. A canceled solve returns its best incumbent, if any.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-canceled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A search progress event: a new incumbent was accepted.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Scalarized objective of the new incumbent.
    pub best_objective: f64,
    /// Time since search start.
    pub elapsed: Duration,
    /// Nodes expanded so far.
    pub nodes: u64,
}

/// Receives search progress events.
///
/// The single reporting capability of the engine; there is no other
/// callback registration.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Candidate ordering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branching {
    /// Earliest-start-first with shortest-duration tie-break.
    Automatic,
    /// Deterministic variable order: interval index, then arm, then crew.
    FixedOrder,
}

/// Engine search configuration.
///
/// `num_workers` and `linearization_level` are recorded for parity with
/// external engines; the bundled solver is single-threaded and ignores
/// them.
#[derive(Clone)]
pub struct SearchConfig {
    /// Wall-clock budget.
    pub time_limit: Duration,
    /// Node expansion cap.
    pub node_limit: u64,
    /// Candidate ordering.
    pub branching: Branching,
    /// Requested worker threads.
    pub num_workers: usize,
    /// Requested linearization level.
    pub linearization_level: i32,
    /// Cooperative cancellation.
    pub cancel: CancelToken,
    /// Incumbent progress sink.
    pub reporter: Option<Arc<dyn ProgressReporter>>,
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("time_limit", &self.time_limit)
            .field("node_limit", &self.node_limit)
            .field("branching", &self.branching)
            .field("num_workers", &self.num_workers)
            .field("linearization_level", &self.linearization_level)
            .finish()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            node_limit: 50_000_000,
            branching: Branching::Automatic,
            num_workers: 1,
            linearization_level: 1,
            cancel: CancelToken::new(),
            reporter: None,
        }
    }
}

/// Trait for CP solver implementations.
///
/// Implementors provide the actual constraint solving logic. This can
/// wrap external engines or provide custom search.
pub trait CpSolver {
    /// Solves the model and returns a solution.
    fn solve(&self, model: &CpModel, config: &SearchConfig) -> CpSolution;
}

/// The bundled chronological branch-and-bound solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBoundSolver;

impl BranchAndBoundSolver {
    pub fn new() -> Self {
        Self
    }
}

impl CpSolver for BranchAndBoundSolver {
    fn solve(&self, model: &CpModel, config: &SearchConfig) -> CpSolution {
        let started = Instant::now();
        if let Err(reason) = model.validate() {
            debug!(model = %model.name, %reason, "model rejected");
            return CpSolution::empty(SolverStatus::ModelInvalid);
        }
        if model.intervals.is_empty() {
            let mut solution = CpSolution::empty(SolverStatus::Optimal);
            solution.objective = Some(0.0);
            solution.solve_time = started.elapsed();
            return solution;
        }

        let mut search = Search::new(model, config, started);
        search.run();
        search.into_solution()
    }
}

const EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Placement {
    start: i64,
    end: i64,
    arm: usize,
    resource: ResourceId,
    operators: Vec<OperatorId>,
}

struct Incumbent {
    intervals: Vec<IntervalSolution>,
    values: [f64; 5],
    scalar: f64,
}

/// Undo record for one placement.
struct Frame {
    interval: IntervalId,
    resource: ResourceId,
    wip_group: Option<usize>,
    crew: Vec<OperatorId>,
    day_deltas: Vec<(OperatorId, i64, i64)>,
    span_prev: Vec<(usize, Option<(i64, i64)>)>,
    cost_delta: f64,
}

struct Search<'a> {
    model: &'a CpModel,
    config: &'a SearchConfig,
    started: Instant,
    deadline: Instant,

    // Static structure.
    preds: Vec<Vec<(IntervalId, i64, Option<i64>)>>,
    succs: Vec<Vec<IntervalId>>,
    order_prereq: Vec<Vec<IntervalId>>,
    arm_order: Vec<Vec<usize>>,
    crew_of: Vec<Option<usize>>,
    crew_choices: Vec<Vec<Vec<OperatorId>>>,
    span_of: Vec<Vec<usize>>,
    min_duration: Vec<i64>,
    min_arm_cost: Vec<f64>,
    satisfy_only: bool,
    proof_complete: bool,

    // Dynamic state.
    placed: Vec<Option<Placement>>,
    placed_count: usize,
    pred_remaining: Vec<usize>,
    res_busy: Vec<Vec<(i64, i64, IntervalId)>>,
    wip_active: Vec<Vec<(i64, i64)>>,
    op_busy: Vec<Vec<(i64, i64)>>,
    op_day_units: Vec<HashMap<i64, i64>>,
    span_state: Vec<Option<(i64, i64)>>,
    current_cost: f64,

    // Outcome.
    best: Option<Incumbent>,
    nodes: u64,
    stopped: bool,
    canceled: bool,
    exhausted: bool,
}

impl<'a> Search<'a> {
    fn new(model: &'a CpModel, config: &'a SearchConfig, started: Instant) -> Self {
        let n = model.intervals.len();

        let mut preds: Vec<Vec<(IntervalId, i64, Option<i64>)>> = vec![Vec::new(); n];
        let mut succs: Vec<Vec<IntervalId>> = vec![Vec::new(); n];
        let mut order_prereq: Vec<Vec<IntervalId>> = vec![Vec::new(); n];
        let mut has_max_delay = false;
        for constraint in &model.constraints {
            match *constraint {
                CpConstraint::Precedence {
                    before,
                    after,
                    min_delay,
                    max_delay,
                } => {
                    preds[after].push((before, min_delay, max_delay));
                    succs[before].push(after);
                    has_max_delay |= max_delay.is_some();
                }
                CpConstraint::StartOrder { first, second } => {
                    order_prereq[second].push(first);
                }
            }
        }

        // Arms ordered by resource name: ties between equal-duration modes
        // resolve to the lower machine id.
        let arm_order: Vec<Vec<usize>> = model
            .intervals
            .iter()
            .map(|iv| {
                let mut order: Vec<usize> = (0..iv.arms.len()).collect();
                order.sort_by(|&a, &b| {
                    model.resources[iv.arms[a].resource]
                        .name
                        .cmp(&model.resources[iv.arms[b].resource].name)
                        .then(a.cmp(&b))
                });
                order
            })
            .collect();

        let mut crew_of: Vec<Option<usize>> = vec![None; n];
        for (idx, crew) in model.crews.iter().enumerate() {
            crew_of[crew.interval] = Some(idx);
        }
        let crew_choices: Vec<Vec<Vec<OperatorId>>> = (0..n)
            .map(|i| match crew_of[i] {
                None => vec![Vec::new()],
                Some(c) => enumerate_crews(model, c),
            })
            .collect();

        let mut span_of: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, span) in model.spans.iter().enumerate() {
            for &member in &span.members {
                span_of[member].push(idx);
            }
        }

        let min_duration: Vec<i64> = model
            .intervals
            .iter()
            .map(|iv| iv.arms.iter().map(|a| a.duration).min().unwrap_or(0))
            .collect();
        let min_arm_cost: Vec<f64> = model
            .intervals
            .iter()
            .map(|iv| {
                iv.arms
                    .iter()
                    .map(|a| a.duration as f64 * model.resources[a.resource].cost_per_unit)
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        // Earliest-start placement is a complete scheme unless a constraint
        // could be satisfied only by delaying an already-placed interval.
        let day_capped = model.crews.iter().any(|crew| {
            crew.eligible.iter().any(|&o| {
                model.operators[o].max_units_per_day.is_some()
                    && !model.operators[o].overtime_allowed
            })
        });
        let proof_complete = !has_max_delay && model.spans.is_empty() && !day_capped;

        let pred_remaining: Vec<usize> = preds.iter().map(|p| p.len()).collect();

        Self {
            deadline: started + config.time_limit,
            started,
            satisfy_only: model.scalarization.is_none(),
            proof_complete,
            placed: vec![None; n],
            placed_count: 0,
            pred_remaining,
            res_busy: vec![Vec::new(); model.resources.len()],
            wip_active: vec![Vec::new(); model.wip_groups.len()],
            op_busy: vec![Vec::new(); model.operators.len()],
            op_day_units: vec![HashMap::new(); model.operators.len()],
            span_state: vec![None; model.spans.len()],
            current_cost: 0.0,
            best: None,
            nodes: 0,
            stopped: false,
            canceled: false,
            exhausted: false,
            model,
            config,
            preds,
            succs,
            order_prereq,
            arm_order,
            crew_of,
            crew_choices,
            span_of,
            min_duration,
            min_arm_cost,
        }
    }

    fn run(&mut self) {
        self.expand();
        self.exhausted = !self.stopped;
    }

    fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.nodes >= self.config.node_limit {
            self.stopped = true;
        } else if self.nodes % 64 == 0 {
            if self.config.cancel.is_canceled() {
                self.stopped = true;
                self.canceled = true;
            } else if Instant::now() >= self.deadline {
                self.stopped = true;
            }
        }
        self.stopped
    }

    fn expand(&mut self) {
        self.nodes += 1;
        if self.should_stop() {
            return;
        }
        if self.placed_count == self.model.intervals.len() {
            self.accept_leaf();
            return;
        }
        if self.prunable() {
            return;
        }

        let candidates = self.candidates();
        for (start, interval, arm, crew_idx) in candidates {
            if self.stopped {
                return;
            }
            let crew = self.crew_choices[interval][crew_idx].clone();
            let frame = self.place(interval, arm, &crew, start);
            self.expand();
            self.unplace(frame);
        }
    }

    /// All (est, interval, arm, crew) decisions available at this node,
    /// in branching order.
    fn candidates(&self) -> Vec<(i64, IntervalId, usize, usize)> {
        let mut out = Vec::new();
        for i in 0..self.model.intervals.len() {
            if self.placed[i].is_some()
                || self.pred_remaining[i] > 0
                || self.order_prereq[i].iter().any(|&f| self.placed[f].is_none())
            {
                continue;
            }
            for (arm_pos, &arm) in self.arm_order[i].iter().enumerate() {
                for crew_idx in 0..self.crew_choices[i].len() {
                    if let Some(start) =
                        self.earliest_feasible(i, arm, &self.crew_choices[i][crew_idx])
                    {
                        out.push((start, i, arm, crew_idx, arm_pos));
                    }
                }
            }
        }
        match self.config.branching {
            Branching::Automatic => out.sort_by_key(|&(start, i, arm, crew_idx, _)| {
                (
                    start,
                    self.model.intervals[i].arms[arm].duration,
                    i,
                    arm,
                    crew_idx,
                )
            }),
            Branching::FixedOrder => {
                out.sort_by_key(|&(_, i, _, crew_idx, arm_pos)| (i, arm_pos, crew_idx))
            }
        }
        out.into_iter()
            .map(|(start, i, arm, crew_idx, _)| (start, i, arm, crew_idx))
            .collect()
    }

    /// Earliest start for (interval, arm, crew) against current state, or
    /// `None` when no start within bounds exists.
    fn earliest_feasible(&self, i: IntervalId, arm_idx: usize, crew: &[OperatorId]) -> Option<i64> {
        let iv = &self.model.intervals[i];
        let arm = &iv.arms[arm_idx];
        let dur = arm.duration;
        let res = &self.model.resources[arm.resource];
        let transitions_active = res.transitions.is_some() && res.capacity == 1;
        let (pre, post) = if transitions_active {
            (0, 0)
        } else {
            (res.pre_pad, res.post_pad)
        };

        let mut t = iv.start_min;
        for &(p, min_delay, _) in &self.preds[i] {
            let pl = self.placed[p].as_ref()?;
            t = t.max(pl.end + min_delay);
        }
        for &f in &self.order_prereq[i] {
            let pl = self.placed[f].as_ref()?;
            t = t.max(pl.start);
        }
        for &s in &self.span_of[i] {
            // Reservations cannot reach before the epoch.
            t = t.max(self.model.sequences[self.model.spans[s].sequence].pre_pad);
        }

        let limit = iv
            .start_max
            .min(iv.end_max - dur)
            .min(self.model.horizon - dur);

        'scan: while t <= limit {
            // Resource occupation.
            if transitions_active {
                let table = res.transitions.as_ref().expect("transitions checked");
                let busy = &self.res_busy[arm.resource];
                let mut next = t;
                for &(bs, be, bi) in busy {
                    if bs < t + dur && t < be {
                        let b_class = &self.model.intervals[bi].class;
                        next = next.max(be + table.get(b_class, &iv.class));
                    }
                }
                if next > t {
                    t = next;
                    continue 'scan;
                }
                // Changeover from the nearest finished occupant.
                if let Some(&(_, be, bi)) = busy
                    .iter()
                    .filter(|&&(_, be, _)| be <= t)
                    .max_by_key(|&&(_, be, _)| be)
                {
                    let need = be + table.get(&self.model.intervals[bi].class, &iv.class);
                    if need > t {
                        t = need;
                        continue 'scan;
                    }
                }
                // Changeover into the nearest upcoming occupant.
                if let Some(&(bs, be, bi)) = busy
                    .iter()
                    .filter(|&&(bs, _, _)| bs >= t + dur)
                    .min_by_key(|&&(bs, _, _)| bs)
                {
                    let b_class = &self.model.intervals[bi].class;
                    if t + dur + table.get(&iv.class, b_class) > bs {
                        t = be + table.get(b_class, &iv.class);
                        continue 'scan;
                    }
                }
            } else {
                let occ = (t - pre, t + dur + post);
                let overlapping: Vec<i64> = self.res_busy[arm.resource]
                    .iter()
                    .filter(|&&(bs, be, _)| bs < occ.1 && occ.0 < be)
                    .map(|&(_, be, _)| be)
                    .collect();
                if overlapping.len() as i32 >= res.capacity {
                    let min_end = overlapping.iter().copied().min().expect("non-empty");
                    t = (min_end + pre).max(t + 1);
                    continue 'scan;
                }
            }

            // Resource downtime.
            for &(ws, we) in &res.forbidden {
                if ws < t + dur && t < we {
                    t = we;
                    continue 'scan;
                }
            }

            // Cell WIP.
            if iv.counts_wip {
                if let Some(g) = res.wip_group {
                    let cap = self.model.wip_groups[g].capacity;
                    let overlapping: Vec<i64> = self.wip_active[g]
                        .iter()
                        .filter(|&&(bs, be)| bs < t + dur && t < be)
                        .map(|&(_, be)| be)
                        .collect();
                    if overlapping.len() as i32 >= cap {
                        let min_end = overlapping.iter().copied().min().expect("non-empty");
                        t = min_end.max(t + 1);
                        continue 'scan;
                    }
                }
            }

            // Sequence span capacity.
            for &s in &self.span_of[i] {
                let span = &self.model.spans[s];
                let seq = &self.model.sequences[span.sequence];
                let tentative = match self.span_state[s] {
                    Some((a, b)) => (a.min(t - seq.pre_pad), b.max(t + dur + seq.post_pad)),
                    None => (t - seq.pre_pad, t + dur + seq.post_pad),
                };
                let conflicts: Vec<i64> = (0..self.model.spans.len())
                    .filter(|&j| j != s && self.model.spans[j].sequence == span.sequence)
                    .filter_map(|j| self.span_state[j])
                    .filter(|&(a, b)| a < tentative.1 && tentative.0 < b)
                    .map(|(_, b)| b)
                    .collect();
                if conflicts.len() as i32 + 1 > seq.capacity {
                    if self.span_state[s].is_some() {
                        // Extent pinned by placed members; delay cannot help.
                        return None;
                    }
                    let min_end = conflicts.iter().copied().min().expect("non-empty");
                    t = (min_end + seq.pre_pad).max(t + 1);
                    continue 'scan;
                }
            }

            // Crew availability.
            let shift_exempt = self
                .crew_of[i]
                .map(|c| self.model.crews[c].shift_exempt)
                .unwrap_or(true);
            for &o in crew {
                let op = &self.model.operators[o];
                if !shift_exempt && !op.shifts.is_empty() {
                    let covered = op.shifts.iter().any(|&(a, b)| t >= a && t + dur <= b);
                    if !covered {
                        let next = op
                            .shifts
                            .iter()
                            .filter_map(|&(a, b)| {
                                let nt = a.max(t);
                                (b - nt >= dur).then_some(nt)
                            })
                            .min();
                        match next {
                            Some(nt) if nt > t => {
                                t = nt;
                                continue 'scan;
                            }
                            Some(_) => {}
                            None => return None,
                        }
                    }
                }
                let overlapping: Vec<i64> = self.op_busy[o]
                    .iter()
                    .filter(|&&(bs, be)| bs < t + dur && t < be)
                    .map(|&(_, be)| be)
                    .collect();
                if let Some(&min_end) = overlapping.iter().min() {
                    t = min_end.max(t + 1);
                    continue 'scan;
                }
                if let Some(cap) = op.max_units_per_day {
                    if !op.overtime_allowed {
                        let first_day = t.div_euclid(UNITS_PER_DAY);
                        let last_day = (t + dur - 1).div_euclid(UNITS_PER_DAY);
                        for day in first_day..=last_day {
                            let day_start = day * UNITS_PER_DAY;
                            let day_end = day_start + UNITS_PER_DAY;
                            let segment = (t + dur).min(day_end) - t.max(day_start);
                            let used = self.op_day_units[o].get(&day).copied().unwrap_or(0);
                            if used + segment > cap {
                                t = day_end;
                                continue 'scan;
                            }
                        }
                    }
                }
            }

            // Feasible start; max-delay edges are checked non-monotonically.
            for &(p, _, max_delay) in &self.preds[i] {
                if let Some(max_delay) = max_delay {
                    let pl = self.placed[p].as_ref()?;
                    if t > pl.end + max_delay {
                        return None;
                    }
                }
            }
            return Some(t);
        }
        None
    }

    fn place(&mut self, i: IntervalId, arm_idx: usize, crew: &[OperatorId], start: i64) -> Frame {
        let iv = &self.model.intervals[i];
        let arm = &iv.arms[arm_idx];
        let dur = arm.duration;
        let end = start + dur;
        let res = &self.model.resources[arm.resource];
        let transitions_active = res.transitions.is_some() && res.capacity == 1;
        let (pre, post) = if transitions_active {
            (0, 0)
        } else {
            (res.pre_pad, res.post_pad)
        };

        self.res_busy[arm.resource].push((start - pre, end + post, i));

        let wip_group = if iv.counts_wip { res.wip_group } else { None };
        if let Some(g) = wip_group {
            self.wip_active[g].push((start, end));
        }

        let mut day_deltas = Vec::new();
        for &o in crew {
            self.op_busy[o].push((start, end));
            let first_day = start.div_euclid(UNITS_PER_DAY);
            let last_day = (end - 1).div_euclid(UNITS_PER_DAY);
            for day in first_day..=last_day {
                let day_start = day * UNITS_PER_DAY;
                let segment = end.min(day_start + UNITS_PER_DAY) - start.max(day_start);
                *self.op_day_units[o].entry(day).or_insert(0) += segment;
                day_deltas.push((o, day, segment));
            }
        }

        let mut span_prev = Vec::new();
        for &s in &self.span_of[i] {
            let seq = &self.model.sequences[self.model.spans[s].sequence];
            let prev = self.span_state[s];
            let next = match prev {
                Some((a, b)) => (a.min(start - seq.pre_pad), b.max(end + seq.post_pad)),
                None => (start - seq.pre_pad, end + seq.post_pad),
            };
            span_prev.push((s, prev));
            self.span_state[s] = Some(next);
        }

        let mut cost_delta = dur as f64 * res.cost_per_unit;
        for &o in crew {
            cost_delta += dur as f64 * self.model.operators[o].cost_per_unit;
        }
        self.current_cost += cost_delta;

        self.placed[i] = Some(Placement {
            start,
            end,
            arm: arm_idx,
            resource: arm.resource,
            operators: crew.to_vec(),
        });
        self.placed_count += 1;
        for &succ in &self.succs[i] {
            self.pred_remaining[succ] -= 1;
        }

        Frame {
            interval: i,
            resource: arm.resource,
            wip_group,
            crew: crew.to_vec(),
            day_deltas,
            span_prev,
            cost_delta,
        }
    }

    fn unplace(&mut self, frame: Frame) {
        let i = frame.interval;
        for &succ in &self.succs[i] {
            self.pred_remaining[succ] += 1;
        }
        self.placed_count -= 1;
        self.placed[i] = None;
        self.current_cost -= frame.cost_delta;
        for (s, prev) in frame.span_prev.into_iter().rev() {
            self.span_state[s] = prev;
        }
        for (o, day, segment) in frame.day_deltas.into_iter().rev() {
            if let Some(units) = self.op_day_units[o].get_mut(&day) {
                *units -= segment;
                if *units == 0 {
                    self.op_day_units[o].remove(&day);
                }
            }
        }
        for &o in frame.crew.iter().rev() {
            self.op_busy[o].pop();
        }
        if let Some(g) = frame.wip_group {
            self.wip_active[g].pop();
        }
        self.res_busy[frame.resource].pop();
    }

    /// Admissible lower bounds on [makespan, lateness sum, lateness max,
    /// cost] given the current partial schedule.
    fn lower_bounds(&self) -> (i64, i64, i64, f64) {
        let mut makespan = 0i64;
        for placement in self.placed.iter().flatten() {
            makespan = makespan.max(placement.end);
        }
        let mut cost = self.current_cost;
        for i in 0..self.model.intervals.len() {
            if self.placed[i].is_some() {
                continue;
            }
            let mut est = self.model.intervals[i].start_min;
            for &(p, min_delay, _) in &self.preds[i] {
                if let Some(pl) = &self.placed[p] {
                    est = est.max(pl.end + min_delay);
                }
            }
            makespan = makespan.max(est + self.min_duration[i]);
            cost += self.min_arm_cost[i];
        }

        let mut lateness_sum = 0i64;
        let mut lateness_max = 0i64;
        for due in &self.model.due_dates {
            if due.members.iter().all(|&m| self.placed[m].is_some()) {
                let completion = due
                    .members
                    .iter()
                    .map(|&m| self.placed[m].as_ref().expect("checked").end)
                    .max()
                    .unwrap_or(0);
                let lateness = (completion - due.due).max(0);
                lateness_sum += lateness;
                lateness_max = lateness_max.max(lateness);
            }
        }
        (makespan, lateness_sum, lateness_max, cost)
    }

    fn bound_value(&self, kind: ObjectiveKind, bounds: &(i64, i64, i64, f64)) -> f64 {
        match kind {
            ObjectiveKind::Makespan => bounds.0 as f64,
            ObjectiveKind::TotalLateness => bounds.1 as f64,
            ObjectiveKind::MaxLateness => bounds.2 as f64,
            ObjectiveKind::TotalCost => bounds.3,
            // Idle time can shrink as placements fill gaps; only the
            // trivial bound is admissible.
            ObjectiveKind::Utilization => 0.0,
        }
    }

    fn prunable(&self) -> bool {
        let Some(best) = &self.best else {
            return false;
        };
        let bounds = self.lower_bounds();
        match self.model.scalarization.as_ref() {
            None => true, // satisfaction mode: first solution ends the search
            Some(Scalarization::Weighted(weights)) => {
                let bound: f64 = weights
                    .iter()
                    .map(|&(kind, w)| w * self.bound_value(kind, &bounds))
                    .sum();
                bound >= best.scalar - EPS
            }
            Some(Scalarization::Lexicographic(order)) => match order.first() {
                None => true,
                Some(&first) => {
                    self.bound_value(first, &bounds) > value_of(&best.values, first) + EPS
                }
            },
        }
    }

    fn accept_leaf(&mut self) {
        let values = self.evaluate();
        let scalar = match self.model.scalarization.as_ref() {
            None => values[0],
            Some(Scalarization::Weighted(weights)) => weights
                .iter()
                .map(|&(kind, w)| w * value_of(&values, kind))
                .sum(),
            Some(Scalarization::Lexicographic(order)) => order
                .first()
                .map(|&k| value_of(&values, k))
                .unwrap_or(values[0]),
        };

        let better = match (&self.best, self.model.scalarization.as_ref()) {
            (None, _) => true,
            (Some(best), Some(Scalarization::Lexicographic(order))) => {
                lex_less(&values, &best.values, order)
            }
            (Some(best), _) => scalar < best.scalar - EPS,
        };
        if !better {
            return;
        }

        let intervals: Vec<IntervalSolution> = self
            .placed
            .iter()
            .map(|p| {
                let p = p.as_ref().expect("leaf is fully placed");
                IntervalSolution {
                    start: p.start,
                    end: p.end,
                    arm: p.arm,
                    resource: p.resource,
                    operators: p.operators.clone(),
                }
            })
            .collect();
        debug!(
            model = %self.model.name,
            objective = scalar,
            nodes = self.nodes,
            "new incumbent"
        );
        if let Some(reporter) = &self.config.reporter {
            reporter.report(&ProgressEvent {
                best_objective: scalar,
                elapsed: self.started.elapsed(),
                nodes: self.nodes,
            });
        }
        self.best = Some(Incumbent {
            intervals,
            values,
            scalar,
        });
        if self.satisfy_only {
            self.stopped = true;
        }
    }

    /// Raw objective vector of the complete schedule:
    /// [makespan, total lateness, max lateness, total cost, idle].
    fn evaluate(&self) -> [f64; 5] {
        let makespan = self
            .placed
            .iter()
            .flatten()
            .map(|p| p.end)
            .max()
            .unwrap_or(0);

        let mut lateness_sum = 0i64;
        let mut lateness_max = 0i64;
        for due in &self.model.due_dates {
            let completion = due
                .members
                .iter()
                .filter_map(|&m| self.placed[m].as_ref().map(|p| p.end))
                .max()
                .unwrap_or(0);
            let lateness = (completion - due.due).max(0);
            lateness_sum += lateness;
            lateness_max = lateness_max.max(lateness);
        }

        let mut busy = vec![0i64; self.model.resources.len()];
        for placement in self.placed.iter().flatten() {
            busy[placement.resource] += placement.end - placement.start;
        }
        let idle: i64 = busy.iter().map(|b| (makespan - b).max(0)).sum();

        [
            makespan as f64,
            lateness_sum as f64,
            lateness_max as f64,
            self.current_cost,
            idle as f64,
        ]
    }

    fn into_solution(self) -> CpSolution {
        let solve_time = self.started.elapsed();
        let status = match (&self.best, self.stopped, self.exhausted) {
            (Some(_), true, _) => SolverStatus::Timeout,
            (Some(_), false, true) => {
                // Optimality is only proven where earliest-start placement
                // is a complete scheme; otherwise the incumbent is the best
                // found, reported as feasible.
                if self.satisfy_only || !self.proof_complete {
                    SolverStatus::Feasible
                } else {
                    SolverStatus::Optimal
                }
            }
            (Some(_), false, false) => SolverStatus::Feasible,
            (None, true, _) => SolverStatus::Unknown,
            (None, false, _) => {
                if self.proof_complete {
                    SolverStatus::Infeasible
                } else {
                    SolverStatus::Unknown
                }
            }
        };
        // A satisfaction-mode stop is a deliberate early exit, not a budget
        // stop; report it as Feasible.
        let status = if self.satisfy_only && self.best.is_some() && !self.canceled {
            SolverStatus::Feasible
        } else {
            status
        };

        let (objective, objective_values, intervals) = match self.best {
            Some(incumbent) => (
                Some(incumbent.scalar),
                vec![
                    (ObjectiveKind::Makespan, incumbent.values[0]),
                    (ObjectiveKind::TotalLateness, incumbent.values[1]),
                    (ObjectiveKind::MaxLateness, incumbent.values[2]),
                    (ObjectiveKind::TotalCost, incumbent.values[3]),
                    (ObjectiveKind::Utilization, incumbent.values[4]),
                ],
                incumbent.intervals,
            ),
            None => (None, Vec::new(), Vec::new()),
        };

        CpSolution {
            status,
            objective,
            objective_values,
            intervals,
            solve_time,
            nodes: self.nodes,
            canceled: self.canceled,
        }
    }
}

fn value_of(values: &[f64; 5], kind: ObjectiveKind) -> f64 {
    match kind {
        ObjectiveKind::Makespan => values[0],
        ObjectiveKind::TotalLateness => values[1],
        ObjectiveKind::MaxLateness => values[2],
        ObjectiveKind::TotalCost => values[3],
        ObjectiveKind::Utilization => values[4],
    }
}

fn lex_less(candidate: &[f64; 5], best: &[f64; 5], order: &[ObjectiveKind]) -> bool {
    for &kind in order {
        let (c, b) = (value_of(candidate, kind), value_of(best, kind));
        if c < b - EPS {
            return true;
        }
        if c > b + EPS {
            return false;
        }
    }
    false
}

/// All operator subsets of the crew's size, drawn from its eligible list
/// in declaration order, that satisfy every skill need.
fn enumerate_crews(model: &CpModel, crew_idx: usize) -> Vec<Vec<OperatorId>> {
    let crew = &model.crews[crew_idx];
    if crew.size == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    let mut current = Vec::new();
    combinations(&crew.eligible, crew.size, 0, &mut current, &mut out);
    out.retain(|subset| {
        crew.needs.iter().all(|need| {
            subset
                .iter()
                .filter(|&&o| {
                    model.operators[o]
                        .skills
                        .get(&need.skill)
                        .map(|&rank| rank >= need.min_rank)
                        .unwrap_or(false)
                })
                .count()
                >= need.count
        })
    });
    out
}

fn combinations(
    pool: &[OperatorId],
    size: usize,
    from: usize,
    current: &mut Vec<OperatorId>,
    out: &mut Vec<Vec<OperatorId>>,
) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }
    let needed = size - current.len();
    for idx in from..pool.len() {
        if pool.len() - idx < needed {
            break;
        }
        current.push(pool[idx]);
        combinations(pool, size, idx + 1, current, out);
        current.pop();
    }
}
