//! Minute-based wire records.
//!
//! The stable solution output contract: internally everything runs in
//! 15-minute units, but the wire speaks minutes. These records are what
//! the CLI emits and what the thin API layer serves; conversion goes
//! through [`crate::time`] only.

use serde::{Deserialize, Serialize};

use crate::models::{ScheduleMetrics, Solution, SolveStatus};
use crate::time::units_to_minutes;

/// One task assignment, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTaskRecord {
    pub instance_id: String,
    pub template_task_id: String,
    pub machine_id: String,
    pub operator_ids: Vec<String>,
    pub start_minute: i64,
    pub end_minute: i64,
    pub mode_id: String,
}

/// One held sequence window, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReservationRecord {
    pub sequence_id: String,
    pub instance_id: String,
    pub start_minute: i64,
    pub end_minute: i64,
}

/// Solve metrics, in wire units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub status: SolveStatus,
    pub solve_time_seconds: f64,
    pub makespan_minutes: i64,
    pub total_lateness_minutes: i64,
    pub max_lateness_minutes: i64,
    pub objective_value: f64,
    pub instance_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedup_vs_baseline: Option<f64>,
}

/// A complete solved schedule on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Opaque schedule identifier.
    pub schedule_id: String,
    pub tasks: Vec<ScheduledTaskRecord>,
    pub reservations: Vec<SequenceReservationRecord>,
    pub metrics: MetricsRecord,
}

impl ScheduleRecord {
    /// Converts a solved schedule into wire form.
    pub fn new(
        schedule_id: impl Into<String>,
        solution: &Solution,
        metrics: &ScheduleMetrics,
    ) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            tasks: solution
                .tasks
                .iter()
                .map(|task| ScheduledTaskRecord {
                    instance_id: task.instance_id.clone(),
                    template_task_id: task.template_task_id.clone(),
                    machine_id: task.machine_id.clone(),
                    operator_ids: task.operator_ids.clone(),
                    start_minute: units_to_minutes(task.start_unit),
                    end_minute: units_to_minutes(task.end_unit),
                    mode_id: task.mode_id.clone(),
                })
                .collect(),
            reservations: solution
                .reservations
                .iter()
                .map(|reservation| SequenceReservationRecord {
                    sequence_id: reservation.sequence_id.clone(),
                    instance_id: reservation.instance_id.clone(),
                    start_minute: units_to_minutes(reservation.start_unit),
                    end_minute: units_to_minutes(reservation.end_unit),
                })
                .collect(),
            metrics: MetricsRecord::from(metrics),
        }
    }
}

impl From<&ScheduleMetrics> for MetricsRecord {
    fn from(metrics: &ScheduleMetrics) -> Self {
        Self {
            status: metrics.status,
            solve_time_seconds: metrics.solve_time_seconds,
            makespan_minutes: units_to_minutes(metrics.makespan_units),
            total_lateness_minutes: units_to_minutes(metrics.total_lateness_units),
            max_lateness_minutes: units_to_minutes(metrics.max_lateness_units),
            objective_value: metrics.objective_value,
            instance_count: metrics.instance_count,
            speedup_vs_baseline: metrics.speedup_vs_baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduledTask;
    use std::collections::BTreeMap;

    #[test]
    fn test_units_become_minutes() {
        let mut solution = Solution::new();
        solution.tasks.push(ScheduledTask {
            instance_id: "J1".into(),
            template_task_id: "T1".into(),
            machine_id: "M1".into(),
            operator_ids: vec!["O1".into()],
            start_unit: 4,
            end_unit: 6,
            mode_id: "T1M1".into(),
        });
        let metrics = ScheduleMetrics {
            status: SolveStatus::Optimal,
            solve_time_seconds: 0.5,
            makespan_units: 6,
            total_lateness_units: 1,
            max_lateness_units: 1,
            objective_value: 6.0,
            instance_count: 1,
            speedup_vs_baseline: Some(5.5),
            canceled: false,
            machine_utilization: BTreeMap::new(),
        };

        let record = ScheduleRecord::new("sch-000001", &solution, &metrics);
        assert_eq!(record.tasks[0].start_minute, 60);
        assert_eq!(record.tasks[0].end_minute, 90);
        assert_eq!(record.metrics.makespan_minutes, 90);
        assert_eq!(record.metrics.total_lateness_minutes, 15);
        assert_eq!(record.metrics.speedup_vs_baseline, Some(5.5));
    }

    #[test]
    fn test_wire_json_shape() {
        let record = ScheduleRecord::new(
            "sch-000001",
            &Solution::new(),
            &ScheduleMetrics {
                status: SolveStatus::TimeLimit,
                solve_time_seconds: 1.0,
                makespan_units: 0,
                total_lateness_units: 0,
                max_lateness_units: 0,
                objective_value: 0.0,
                instance_count: 0,
                speedup_vs_baseline: None,
                canceled: false,
                machine_utilization: BTreeMap::new(),
            },
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"schedule_id\":\"sch-000001\""));
        assert!(json.contains("\"TIME_LIMIT\""));
        assert!(!json.contains("speedup_vs_baseline"));
    }
}
