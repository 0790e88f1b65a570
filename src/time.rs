//! Time and domain utilities.
//!
//! The core works in discrete **15-minute units**. Database and API surfaces
//! speak minutes (and ISO-8601 for absolute timestamps); every conversion
//! funnels through this module so rounding policy lives in one place:
//!
//! - durations round **up** ([`minutes_to_units`]) — a 20-minute operation
//!   occupies two units;
//! - absolute times round **down** ([`minutes_to_unit_floor`]) — an 8:10
//!   release becomes the 8:00 unit boundary.
//!
//! The module also computes the scheduling horizon and per-template domain
//! tightening offsets used by the variable factory.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::models::{Problem, Template};
use crate::validate;

/// Minutes per internal time unit.
pub const UNIT_MINUTES: i64 = 15;

/// Units per 24-hour day.
pub const UNITS_PER_DAY: i64 = 96;

/// Slack multiplier applied to the critical-path horizon estimate.
///
/// Policy constant: 20% headroom guarantees feasibility slack for
/// calendar gaps and setup chains without bloating variable domains.
const HORIZON_BUFFER_NUM: i64 = 12;
const HORIZON_BUFFER_DEN: i64 = 10;

/// Timestamp parsing failure at the wire boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeError {
    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),
    #[error("timestamp '{timestamp}' precedes the problem epoch '{epoch}'")]
    BeforeEpoch { timestamp: String, epoch: String },
}

/// Converts a duration in minutes to units, rounding up.
///
/// Ceiling semantics: a task can never be shorter than its stated duration.
pub fn minutes_to_units(minutes: i64) -> i64 {
    debug_assert!(minutes >= 0);
    (minutes + UNIT_MINUTES - 1) / UNIT_MINUTES
}

/// Converts an absolute time in minutes to its unit index, rounding down.
pub fn minutes_to_unit_floor(minutes: i64) -> i64 {
    minutes.div_euclid(UNIT_MINUTES)
}

/// Converts units back to minutes.
pub fn units_to_minutes(units: i64) -> i64 {
    units * UNIT_MINUTES
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, TimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(TimeError::BadTimestamp(s.to_string()))
}

/// Converts an ISO-8601 timestamp to a minute offset from the problem epoch.
///
/// Both arguments accept RFC 3339 or the common naive `YYYY-MM-DDTHH:MM[:SS]`
/// forms. Timestamps before the epoch are rejected rather than clamped.
pub fn timestamp_to_minutes(timestamp: &str, epoch: &str) -> Result<i64, TimeError> {
    let ts = parse_timestamp(timestamp)?;
    let ep = parse_timestamp(epoch)?;
    let minutes = (ts - ep).num_minutes();
    if minutes < 0 {
        return Err(TimeError::BeforeEpoch {
            timestamp: timestamp.to_string(),
            epoch: epoch.to_string(),
        });
    }
    Ok(minutes)
}

/// Converts an ISO-8601 timestamp to an absolute unit offset from the epoch.
pub fn timestamp_to_units(timestamp: &str, epoch: &str) -> Result<i64, TimeError> {
    Ok(minutes_to_unit_floor(timestamp_to_minutes(timestamp, epoch)?))
}

/// Worst-case occupation of each template task, in units: maximum mode
/// duration plus that mode machine's fixed pads, plus sequence-resource
/// setup/teardown and the largest changeover leading into the task.
fn task_weights(template: &Template, problem: &Problem) -> Vec<i64> {
    template
        .tasks
        .iter()
        .map(|task| {
            let processing = task
                .modes
                .iter()
                .map(|m| {
                    let pad = problem
                        .machine(&m.machine_id)
                        .map(|k| k.setup_units + k.teardown_units)
                        .unwrap_or(0);
                    m.duration_units + pad
                })
                .max()
                .unwrap_or(0);
            let sequence_pads = task
                .sequence_id
                .as_deref()
                .and_then(|id| problem.sequence_resource(id))
                .map(|q| q.setup_units + q.teardown_units)
                .unwrap_or(0);
            let changeover = problem
                .setup_times
                .edges()
                .iter()
                .filter(|e| e.to_task == task.id)
                .map(|e| e.setup_units)
                .max()
                .unwrap_or(0);
            processing + sequence_pads + changeover
        })
        .collect()
}

/// Upper bound on the completion of one instance, in units.
///
/// Longest precedence path through the template, weighting each task by
/// its worst-case occupation ([`task_weights`]) and each edge by its
/// minimum delay.
///
/// Requires an acyclic template; cyclic templates are a malformed-problem
/// condition and yield an error before any model is built.
pub fn critical_path_upper_bound(
    template: &Template,
    problem: &Problem,
) -> Result<i64, crate::error::MalformedProblem> {
    let dag = validate::TemplateDag::build(template)?;
    Ok(dag.longest_path(&task_weights(template, problem)))
}

fn buffered(units: i64) -> i64 {
    (units * HORIZON_BUFFER_NUM + HORIZON_BUFFER_DEN - 1) / HORIZON_BUFFER_DEN
}

/// Schedule horizon in units.
///
/// Starts from the latest release plus the larger of the critical path
/// and the fully-serialized workload (every instance's tasks back to
/// back), with 20% buffer. Calendars stretch the result by the inverse
/// of their availability ratio; operator shifts and maintenance windows
/// push it past their latest end. The slack guarantees a feasible
/// problem stays feasible within the horizon.
pub fn horizon_units(problem: &Problem) -> Result<i64, crate::error::MalformedProblem> {
    let template = &problem.template;
    let weights = task_weights(template, problem);
    let dag = validate::TemplateDag::build(template)?;
    let cpub = dag.longest_path(&weights);
    let per_instance: i64 = weights.iter().sum();
    let latest = problem
        .instances
        .iter()
        .map(|i| i.earliest_start_unit)
        .max()
        .unwrap_or(0);
    let instance_count = problem.instances.len().max(1) as i64;
    let base = latest + cpub.max(per_instance * instance_count);
    let mut horizon = buffered(base);

    let ratio = problem
        .calendars
        .iter()
        .map(availability_ratio)
        .fold(1.0f64, f64::min);
    if ratio > 0.0 && ratio < 1.0 {
        horizon = (horizon as f64 / ratio).ceil() as i64;
    }

    let latest_window = problem
        .operators
        .iter()
        .flat_map(|o| o.shifts.iter().map(|w| w.end_unit))
        .chain(
            problem
                .machines
                .iter()
                .flat_map(|m| m.maintenance_windows.iter().map(|w| w.end_unit)),
        )
        .max()
        .unwrap_or(0);
    Ok(horizon.max(latest_window + buffered(base)))
}

/// Fraction of the week a calendar is available.
fn availability_ratio(calendar: &crate::models::Calendar) -> f64 {
    let working_days = (0..7).filter(|&d| calendar.is_working_day(d)).count() as f64;
    let day_fraction =
        (calendar.day_end_unit - calendar.day_start_unit).max(0) as f64 / UNITS_PER_DAY as f64;
    (working_days / 7.0) * day_fraction
}

/// Per-template domain tightening offsets, computed once and applied to
/// every instance (the pattern advantage: O(template), not O(instances)).
#[derive(Debug, Clone)]
pub struct DomainOffsets {
    /// Earliest start offset of each task relative to the instance release:
    /// longest predecessor chain of minimum durations and minimum delays.
    pub head: Vec<i64>,
    /// Minimum units between a task's start and the instance completion:
    /// its own minimum duration plus the longest successor chain.
    pub tail: Vec<i64>,
    /// Minimum mode duration per task.
    pub min_duration: Vec<i64>,
}

impl DomainOffsets {
    /// Computes head/tail offsets over the template DAG.
    pub fn compute(template: &Template) -> Result<Self, crate::error::MalformedProblem> {
        let dag = validate::TemplateDag::build(template)?;
        let min_duration: Vec<i64> = template
            .tasks
            .iter()
            .map(|t| t.modes.iter().map(|m| m.duration_units).min().unwrap_or(0))
            .collect();

        let n = template.tasks.len();
        let mut head = vec![0i64; n];
        for &idx in dag.topo_order() {
            for (pred, delay) in dag.predecessors(idx) {
                head[idx] = head[idx].max(head[pred] + min_duration[pred] + delay);
            }
        }
        let mut tail = vec![0i64; n];
        for &idx in dag.topo_order().iter().rev() {
            tail[idx] = min_duration[idx];
            for (succ, delay) in dag.successors(idx) {
                tail[idx] = tail[idx].max(min_duration[idx] + delay + tail[succ]);
            }
        }
        Ok(Self {
            head,
            tail,
            min_duration,
        })
    }
}
