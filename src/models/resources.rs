//! Resource catalog models.
//!
//! The entities tasks compete for: machines grouped into work cells,
//! operators with skills and shift windows, and sequence resources held
//! across a contiguous span of an instance (e.g., an optical test
//! station). All read-only during a solve.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::UnitWindow;

/// Ordered operator skill rank.
///
/// `Expert` satisfies every lower requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Proficiency {
    Novice,
    Competent,
    Proficient,
    Expert,
}

impl Proficiency {
    /// Numeric rank, NOVICE = 0 .. EXPERT = 3.
    pub fn rank(self) -> u8 {
        match self {
            Proficiency::Novice => 0,
            Proficiency::Competent => 1,
            Proficiency::Proficient => 2,
            Proficiency::Expert => 3,
        }
    }

    /// Whether this level satisfies a requirement at `required`.
    pub fn satisfies(self, required: Proficiency) -> bool {
        self >= required
    }
}

/// A skill definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill identifier.
    pub id: String,
    /// Grouping category (e.g., "assembly", "inspection").
    pub category: String,
    /// Relative complexity, for reporting.
    pub complexity_level: i32,
}

impl Skill {
    /// Creates a new skill.
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            complexity_level: 1,
        }
    }

    /// Sets the complexity level.
    pub fn with_complexity(mut self, level: i32) -> Self {
        self.complexity_level = level;
        self
    }
}

/// A processing machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Unique machine identifier.
    pub id: String,
    /// Work cell this machine belongs to. Exactly one.
    pub cell_id: String,
    /// Simultaneous task capacity. >= 1; 1 = disjunctive machine.
    pub capacity: i32,
    /// Economic cost per hour of busy time.
    pub cost_per_hour: f64,
    /// Fixed setup occupation before each task (units).
    pub setup_units: i64,
    /// Fixed teardown occupation after each task (units).
    pub teardown_units: i64,
    /// Planned downtime windows.
    pub maintenance_windows: Vec<UnitWindow>,
    /// Availability calendar, if any.
    pub calendar_id: Option<String>,
}

impl Machine {
    /// Creates a unary machine with no cost and no pads.
    pub fn new(id: impl Into<String>, cell_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cell_id: cell_id.into(),
            capacity: 1,
            cost_per_hour: 0.0,
            setup_units: 0,
            teardown_units: 0,
            maintenance_windows: Vec::new(),
            calendar_id: None,
        }
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: i32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the hourly cost.
    pub fn with_cost(mut self, cost_per_hour: f64) -> Self {
        self.cost_per_hour = cost_per_hour;
        self
    }

    /// Sets fixed setup/teardown occupation pads.
    pub fn with_pads(mut self, setup_units: i64, teardown_units: i64) -> Self {
        self.setup_units = setup_units;
        self.teardown_units = teardown_units;
        self
    }

    /// Adds a maintenance window.
    pub fn with_maintenance(mut self, start_unit: i64, end_unit: i64) -> Self {
        self.maintenance_windows
            .push(UnitWindow::new(start_unit, end_unit));
        self
    }

    /// Binds an availability calendar.
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// Cost per unit of busy time.
    pub fn cost_per_unit(&self) -> f64 {
        self.cost_per_hour * crate::time::UNIT_MINUTES as f64 / 60.0
    }
}

/// A work cell: a capacity-limited group of machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCell {
    /// Unique cell identifier.
    pub id: String,
    /// Number of machines that may run simultaneously. >= 1.
    pub capacity: i32,
    /// Cap on jobs in progress within the cell, if any.
    pub wip_limit: Option<i32>,
    /// Availability calendar, if any.
    pub calendar_id: Option<String>,
}

impl WorkCell {
    /// Creates a new cell.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: 1,
            wip_limit: None,
            calendar_id: None,
        }
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: i32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the WIP limit.
    pub fn with_wip_limit(mut self, limit: i32) -> Self {
        self.wip_limit = Some(limit);
        self
    }

    /// Binds an availability calendar.
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }
}

/// A human operator with skills and shift windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    /// Unique operator identifier.
    pub id: String,
    /// Held skills with proficiency levels.
    pub skills: HashMap<String, Proficiency>,
    /// Shift windows. Empty = always on shift.
    pub shifts: Vec<UnitWindow>,
    /// Daily workload cap in units. `None` = uncapped.
    pub max_units_per_day: Option<i64>,
    /// Whether the daily cap may be exceeded.
    pub overtime_allowed: bool,
    /// Economic cost per hour of assigned time.
    pub cost_per_hour: f64,
}

impl Operator {
    /// Creates a new operator with no skills and open availability.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            skills: HashMap::new(),
            shifts: Vec::new(),
            max_units_per_day: None,
            overtime_allowed: false,
            cost_per_hour: 0.0,
        }
    }

    /// Adds a skill at a proficiency level.
    pub fn with_skill(mut self, skill_id: impl Into<String>, level: Proficiency) -> Self {
        self.skills.insert(skill_id.into(), level);
        self
    }

    /// Adds a shift window.
    pub fn with_shift(mut self, start_unit: i64, end_unit: i64) -> Self {
        self.shifts.push(UnitWindow::new(start_unit, end_unit));
        self
    }

    /// Sets the daily workload cap from hours.
    pub fn with_max_hours_per_day(mut self, hours: i64) -> Self {
        self.max_units_per_day = Some(hours * 60 / crate::time::UNIT_MINUTES);
        self
    }

    /// Allows overtime beyond the daily cap.
    pub fn with_overtime(mut self) -> Self {
        self.overtime_allowed = true;
        self
    }

    /// Sets the hourly cost.
    pub fn with_cost(mut self, cost_per_hour: f64) -> Self {
        self.cost_per_hour = cost_per_hour;
        self
    }

    /// Proficiency in a skill, if held.
    pub fn skill_level(&self, skill_id: &str) -> Option<Proficiency> {
        self.skills.get(skill_id).copied()
    }

    /// Whether the operator satisfies a skill at the required level.
    pub fn satisfies(&self, skill_id: &str, required: Proficiency) -> bool {
        self.skill_level(skill_id)
            .map(|l| l.satisfies(required))
            .unwrap_or(false)
    }

    /// Whether [start, end) lies inside some shift window.
    /// Operators without shifts are always available.
    pub fn on_shift(&self, start_unit: i64, end_unit: i64) -> bool {
        self.shifts.is_empty()
            || self
                .shifts
                .iter()
                .any(|w| w.covers(start_unit, end_unit))
    }

    /// Cost per unit of assigned time.
    pub fn cost_per_unit(&self) -> f64 {
        self.cost_per_hour * crate::time::UNIT_MINUTES as f64 / 60.0
    }
}

/// Declared variant of a sequence resource.
///
/// `Shared` and `Pooled` are both cumulative with `max_concurrent`; the
/// variant is kept for diagnostics. Unit-level pool assignment is a
/// future extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Exclusive,
    Shared,
    Pooled,
}

/// A capacity-limited resource held across a contiguous interval by an
/// instance: from its first task using the resource to its last, extended
/// by setup and teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceResource {
    /// Unique sequence resource identifier.
    pub id: String,
    /// Declared variant.
    pub kind: SequenceKind,
    /// Instances that may hold the resource simultaneously. >= 1.
    pub max_concurrent: i32,
    /// Units added before each reservation.
    pub setup_units: i64,
    /// Units added after each reservation.
    pub teardown_units: i64,
    /// Contention priority, for diagnostics.
    pub priority: i32,
}

impl SequenceResource {
    /// Creates an exclusive (max_concurrent = 1) sequence resource.
    pub fn exclusive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SequenceKind::Exclusive,
            max_concurrent: 1,
            setup_units: 0,
            teardown_units: 0,
            priority: 0,
        }
    }

    /// Creates a shared sequence resource with the given concurrency.
    pub fn shared(id: impl Into<String>, max_concurrent: i32) -> Self {
        Self {
            id: id.into(),
            kind: SequenceKind::Shared,
            max_concurrent,
            setup_units: 0,
            teardown_units: 0,
            priority: 0,
        }
    }

    /// Sets setup/teardown extensions.
    pub fn with_pads(mut self, setup_units: i64, teardown_units: i64) -> Self {
        self.setup_units = setup_units;
        self.teardown_units = teardown_units;
        self
    }

    /// Sets the contention priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
