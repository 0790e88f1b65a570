//! Calendar and unit-window models.
//!
//! A calendar describes resource availability as a weekly pattern: a
//! working-day bitmask plus a default daily working window. From that
//! pattern it expands the concrete *unavailable* intervals within a
//! horizon, which is what the constraint library consumes.
//!
//! # Time Model
//! All values are in 15-minute units relative to the problem epoch.
//! Day 0 is the epoch day; day-of-week cycles modulo 7 from there.
//! Timezone handling happens at the wire boundary — by the time a
//! calendar exists, offsets are already folded into the epoch.

use serde::{Deserialize, Serialize};

use crate::time::UNITS_PER_DAY;

/// A half-open interval [start, end) in units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitWindow {
    /// Interval start (inclusive).
    pub start_unit: i64,
    /// Interval end (exclusive).
    pub end_unit: i64,
}

impl UnitWindow {
    /// Creates a new window.
    pub fn new(start_unit: i64, end_unit: i64) -> Self {
        Self {
            start_unit,
            end_unit,
        }
    }

    /// Window length in units.
    #[inline]
    pub fn duration_units(&self) -> i64 {
        self.end_unit - self.start_unit
    }

    /// Whether a unit falls within this window.
    #[inline]
    pub fn contains(&self, unit: i64) -> bool {
        unit >= self.start_unit && unit < self.end_unit
    }

    /// Whether two windows overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_unit < other.end_unit && other.start_unit < self.end_unit
    }

    /// Whether this window fully contains [start, end).
    #[inline]
    pub fn covers(&self, start: i64, end: i64) -> bool {
        start >= self.start_unit && end <= self.end_unit
    }
}

/// Weekly availability calendar.
///
/// `working_days_mask` bit `d` set means day-of-week `d` is a working day,
/// where day-of-week 0 is the epoch day. On working days the resource is
/// available during [`day_start_unit`, `day_end_unit`) within the day;
/// non-working days are fully unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    /// Calendar identifier.
    pub id: String,
    /// Bit `d` (0..7) set = day-of-week `d` is a working day.
    pub working_days_mask: u8,
    /// Working window start within a day, in units (0..96).
    pub day_start_unit: i64,
    /// Working window end within a day, in units (0..=96).
    pub day_end_unit: i64,
    /// IANA timezone name, informational at this layer.
    pub timezone: String,
}

impl Calendar {
    /// Creates a calendar working every day, around the clock.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            working_days_mask: 0x7f,
            day_start_unit: 0,
            day_end_unit: UNITS_PER_DAY,
            timezone: "UTC".to_string(),
        }
    }

    /// Sets the working-day bitmask.
    pub fn with_working_days(mut self, mask: u8) -> Self {
        self.working_days_mask = mask;
        self
    }

    /// Sets the daily working window (units within a day).
    pub fn with_day_window(mut self, start_unit: i64, end_unit: i64) -> Self {
        self.day_start_unit = start_unit;
        self.day_end_unit = end_unit;
        self
    }

    /// Sets the timezone name.
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Whether the given day index (from epoch) is a working day.
    #[inline]
    pub fn is_working_day(&self, day: i64) -> bool {
        let dow = day.rem_euclid(7) as u8;
        self.working_days_mask & (1 << dow) != 0
    }

    /// Whether a unit falls inside working time.
    pub fn is_working_unit(&self, unit: i64) -> bool {
        let day = unit.div_euclid(UNITS_PER_DAY);
        if !self.is_working_day(day) {
            return false;
        }
        let within = unit - day * UNITS_PER_DAY;
        within >= self.day_start_unit && within < self.day_end_unit
    }

    /// Expands the unavailable intervals within [0, horizon), merged and
    /// sorted. This is the form the calendar constraint family consumes.
    pub fn unavailable_windows(&self, horizon_units: i64) -> Vec<UnitWindow> {
        let mut windows: Vec<UnitWindow> = Vec::new();
        let mut push = |start: i64, end: i64| {
            let (start, end) = (start.max(0), end.min(horizon_units));
            if start >= end {
                return;
            }
            match windows.last_mut() {
                Some(last) if last.end_unit == start => last.end_unit = end,
                _ => windows.push(UnitWindow::new(start, end)),
            }
        };

        let days = horizon_units.div_euclid(UNITS_PER_DAY) + 1;
        for day in 0..days {
            let base = day * UNITS_PER_DAY;
            if !self.is_working_day(day) {
                push(base, base + UNITS_PER_DAY);
            } else {
                push(base, base + self.day_start_unit);
                push(base + self.day_end_unit, base + UNITS_PER_DAY);
            }
        }
        windows
    }
}
