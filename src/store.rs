//! Pattern loader and schedule persister.
//!
//! [`PatternLoader`] assembles a [`Problem`] from storage;
//! [`SchedulePersister`] writes a solved schedule back. Both are traits
//! so the thin API layer can bind them to a real database; the bundled
//! [`MemoryStore`] keeps the same logical layout — one table per entity,
//! foreign keys between them — in memory, with JSON file round-trips for
//! fixtures and the CLI.
//!
//! Schedule writes are atomic: rows are fully built before the store is
//! touched, and the store mutates under one lock.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::models::{
    Calendar, Instance, Machine, Mode, Operator, Precedence, Problem, ScheduleMetrics,
    ScheduledTask, SequenceReservation, SequenceResource, SetupTimeTable, Skill, Solution,
    SolverParameters, Template, TemplateTask, WorkCell,
};

/// Fetches a complete problem by pattern id.
pub trait PatternLoader {
    /// Assembles the template, its tasks/modes/precedences, the resource
    /// catalog, and all instances flagged for scheduling.
    fn load_pattern(&self, pattern_id: &str) -> Result<Problem, StorageError>;
}

/// Stores a solved schedule.
pub trait SchedulePersister {
    /// Writes one schedule row, one row per scheduled task, and one row
    /// per sequence reservation. All-or-nothing.
    fn store_schedule(
        &self,
        problem: &Problem,
        solution: &Solution,
        metrics: &ScheduleMetrics,
    ) -> Result<String, StorageError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateRow {
    id: String,
    name: String,
    solver_parameters: Option<SolverParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRow {
    template_id: String,
    task: TemplateTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModeRow {
    template_id: String,
    task_id: String,
    mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrecedenceRow {
    template_id: String,
    precedence: Precedence,
}

/// A persisted schedule with its rows reassembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSchedule {
    pub id: String,
    pub template_id: String,
    pub metrics: ScheduleMetrics,
    pub tasks: Vec<ScheduledTask>,
    pub reservations: Vec<SequenceReservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleRow {
    id: String,
    template_id: String,
    metrics: ScheduleMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduledTaskRow {
    schedule_id: String,
    task: ScheduledTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReservationRow {
    schedule_id: String,
    reservation: SequenceReservation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    templates: BTreeMap<String, TemplateRow>,
    template_tasks: Vec<TaskRow>,
    template_task_modes: Vec<ModeRow>,
    template_precedences: Vec<PrecedenceRow>,
    machines: BTreeMap<String, Machine>,
    cells: BTreeMap<String, WorkCell>,
    operators: BTreeMap<String, Operator>,
    skills: BTreeMap<String, Skill>,
    sequence_resources: BTreeMap<String, SequenceResource>,
    calendars: BTreeMap<String, Calendar>,
    setup_times: SetupTimeTable,
    instances: BTreeMap<String, Instance>,
    solved_schedules: BTreeMap<String, ScheduleRow>,
    scheduled_tasks: Vec<ScheduledTaskRow>,
    sequence_reservations: Vec<ReservationRow>,
    next_schedule_seq: u64,
}

/// In-memory store with the persisted logical layout.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decomposes a problem into rows and inserts them.
    ///
    /// The template, catalog, and instances land in their tables; solver
    /// parameters go with the template row.
    pub fn insert_problem(&self, problem: &Problem) {
        let mut tables = self.lock();
        let template = &problem.template;
        tables.templates.insert(
            template.id.clone(),
            TemplateRow {
                id: template.id.clone(),
                name: template.name.clone(),
                solver_parameters: Some(problem.parameters.clone()),
            },
        );
        for task in &template.tasks {
            let mut stripped = task.clone();
            stripped.modes = Vec::new();
            tables.template_tasks.push(TaskRow {
                template_id: template.id.clone(),
                task: stripped,
            });
            for mode in &task.modes {
                tables.template_task_modes.push(ModeRow {
                    template_id: template.id.clone(),
                    task_id: task.id.clone(),
                    mode: mode.clone(),
                });
            }
        }
        for precedence in &template.precedences {
            tables.template_precedences.push(PrecedenceRow {
                template_id: template.id.clone(),
                precedence: precedence.clone(),
            });
        }
        for machine in &problem.machines {
            tables.machines.insert(machine.id.clone(), machine.clone());
        }
        for cell in &problem.cells {
            tables.cells.insert(cell.id.clone(), cell.clone());
        }
        for operator in &problem.operators {
            tables.operators.insert(operator.id.clone(), operator.clone());
        }
        for skill in &problem.skills {
            tables.skills.insert(skill.id.clone(), skill.clone());
        }
        for resource in &problem.sequence_resources {
            tables
                .sequence_resources
                .insert(resource.id.clone(), resource.clone());
        }
        for calendar in &problem.calendars {
            tables.calendars.insert(calendar.id.clone(), calendar.clone());
        }
        tables.setup_times = problem.setup_times.clone();
        for instance in &problem.instances {
            tables.instances.insert(instance.id.clone(), instance.clone());
        }
    }

    /// Replaces the promoted solver parameters of a template.
    pub fn update_template_parameters(
        &self,
        template_id: &str,
        parameters: SolverParameters,
    ) -> Result<(), StorageError> {
        let mut tables = self.lock();
        let row = tables
            .templates
            .get_mut(template_id)
            .ok_or_else(|| StorageError::UnknownPattern(template_id.to_string()))?;
        row.solver_parameters = Some(parameters);
        Ok(())
    }

    /// Reassembles a stored schedule by id.
    pub fn schedule(&self, schedule_id: &str) -> Option<StoredSchedule> {
        let tables = self.lock();
        let row = tables.solved_schedules.get(schedule_id)?;
        Some(StoredSchedule {
            id: row.id.clone(),
            template_id: row.template_id.clone(),
            metrics: row.metrics.clone(),
            tasks: tables
                .scheduled_tasks
                .iter()
                .filter(|r| r.schedule_id == schedule_id)
                .map(|r| r.task.clone())
                .collect(),
            reservations: tables
                .sequence_reservations
                .iter()
                .filter(|r| r.schedule_id == schedule_id)
                .map(|r| r.reservation.clone())
                .collect(),
        })
    }

    /// Number of stored schedules.
    pub fn schedule_count(&self) -> usize {
        self.lock().solved_schedules.len()
    }

    /// Serializes the full store to JSON.
    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    /// Restores a store from JSON.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let mut tables: Tables = serde_json::from_str(json)?;
        tables.setup_times.reindex();
        Ok(Self {
            inner: Mutex::new(tables),
        })
    }

    /// Loads a store from a JSON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Writes the store to a JSON file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PatternLoader for MemoryStore {
    fn load_pattern(&self, pattern_id: &str) -> Result<Problem, StorageError> {
        let tables = self.lock();
        let row = tables
            .templates
            .get(pattern_id)
            .ok_or_else(|| StorageError::UnknownPattern(pattern_id.to_string()))?;

        let mut template = Template::new(row.id.clone(), row.name.clone());
        template.solver_parameters = row.solver_parameters.clone();

        let mut tasks: Vec<TemplateTask> = tables
            .template_tasks
            .iter()
            .filter(|r| r.template_id == pattern_id)
            .map(|r| r.task.clone())
            .collect();
        tasks.sort_by_key(|t| t.position);
        for task in &mut tasks {
            for mode_row in tables
                .template_task_modes
                .iter()
                .filter(|r| r.template_id == pattern_id && r.task_id == task.id)
            {
                if !tables.machines.contains_key(&mode_row.mode.machine_id) {
                    return Err(StorageError::MissingRow {
                        table: "machines",
                        id: mode_row.mode.machine_id.clone(),
                    });
                }
                task.modes.push(mode_row.mode.clone());
            }
            if let Some(sequence_id) = &task.sequence_id {
                if !tables.sequence_resources.contains_key(sequence_id) {
                    return Err(StorageError::MissingRow {
                        table: "sequence_resources",
                        id: sequence_id.clone(),
                    });
                }
            }
        }
        template.tasks = tasks;
        template.precedences = tables
            .template_precedences
            .iter()
            .filter(|r| r.template_id == pattern_id)
            .map(|r| r.precedence.clone())
            .collect();

        for machine in tables.machines.values() {
            if !tables.cells.contains_key(&machine.cell_id) {
                return Err(StorageError::MissingRow {
                    table: "cells",
                    id: machine.cell_id.clone(),
                });
            }
            if let Some(calendar_id) = &machine.calendar_id {
                if !tables.calendars.contains_key(calendar_id) {
                    return Err(StorageError::MissingRow {
                        table: "calendars",
                        id: calendar_id.clone(),
                    });
                }
            }
        }

        let parameters = row.solver_parameters.clone().unwrap_or_default();
        let problem = Problem {
            template,
            instances: tables
                .instances
                .values()
                .filter(|i| i.template_id == pattern_id && i.active)
                .cloned()
                .collect(),
            machines: tables.machines.values().cloned().collect(),
            cells: tables.cells.values().cloned().collect(),
            operators: tables.operators.values().cloned().collect(),
            skills: tables.skills.values().cloned().collect(),
            sequence_resources: tables.sequence_resources.values().cloned().collect(),
            calendars: tables.calendars.values().cloned().collect(),
            setup_times: {
                let mut table = tables.setup_times.clone();
                table.reindex();
                table
            },
            parameters,
        };
        debug!(pattern = pattern_id, instances = problem.instances.len(), "pattern loaded");
        Ok(problem)
    }
}

impl SchedulePersister for MemoryStore {
    fn store_schedule(
        &self,
        problem: &Problem,
        solution: &Solution,
        metrics: &ScheduleMetrics,
    ) -> Result<String, StorageError> {
        if solution.tasks.is_empty() {
            return Err(StorageError::WriteRejected(
                "schedule has no assignments".to_string(),
            ));
        }
        let mut tables = self.lock();
        tables.next_schedule_seq += 1;
        let schedule_id = format!("sch-{:06}", tables.next_schedule_seq);

        // Build every row before touching any table.
        let schedule_row = ScheduleRow {
            id: schedule_id.clone(),
            template_id: problem.template.id.clone(),
            metrics: metrics.clone(),
        };
        let task_rows: Vec<ScheduledTaskRow> = solution
            .tasks
            .iter()
            .map(|task| ScheduledTaskRow {
                schedule_id: schedule_id.clone(),
                task: task.clone(),
            })
            .collect();
        let reservation_rows: Vec<ReservationRow> = solution
            .reservations
            .iter()
            .map(|reservation| ReservationRow {
                schedule_id: schedule_id.clone(),
                reservation: reservation.clone(),
            })
            .collect();

        tables
            .solved_schedules
            .insert(schedule_id.clone(), schedule_row);
        tables.scheduled_tasks.extend(task_rows);
        tables.sequence_reservations.extend(reservation_rows);
        debug!(schedule = %schedule_id, tasks = solution.tasks.len(), "schedule stored");
        Ok(schedule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SolveStatus, TemplateTask};

    fn sample_problem() -> Problem {
        let template = Template::new("P1", "pattern")
            .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)))
            .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
            .with_precedence(Precedence::new("T1", "T2"));
        Problem::new(template)
            .with_machine(Machine::new("M1", "C1"))
            .with_cell(WorkCell::new("C1"))
            .with_instance(Instance::new("J1", "P1"))
            .with_instance(Instance::new("J2", "P1").inactive())
    }

    fn sample_metrics() -> ScheduleMetrics {
        ScheduleMetrics {
            status: SolveStatus::Optimal,
            solve_time_seconds: 0.1,
            makespan_units: 6,
            total_lateness_units: 0,
            max_lateness_units: 0,
            objective_value: 6.0,
            instance_count: 1,
            speedup_vs_baseline: None,
            canceled: false,
            machine_utilization: BTreeMap::new(),
        }
    }

    #[test]
    fn test_round_trip_pattern() {
        let store = MemoryStore::new();
        store.insert_problem(&sample_problem());

        let problem = store.load_pattern("P1").unwrap();
        assert_eq!(problem.template.tasks.len(), 2);
        assert_eq!(problem.template.tasks[0].modes.len(), 1);
        assert_eq!(problem.template.precedences.len(), 1);
        // Only active instances load.
        assert_eq!(problem.instances.len(), 1);
        assert_eq!(problem.instances[0].id, "J1");
        assert!(crate::validate::validate(&problem).is_ok());
    }

    #[test]
    fn test_unknown_pattern() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_pattern("P9"),
            Err(StorageError::UnknownPattern(_))
        ));
    }

    #[test]
    fn test_missing_foreign_row() {
        let store = MemoryStore::new();
        store.insert_problem(&sample_problem());
        store.lock().machines.clear();
        assert!(matches!(
            store.load_pattern("P1"),
            Err(StorageError::MissingRow {
                table: "machines",
                ..
            })
        ));
    }

    #[test]
    fn test_store_and_reassemble_schedule() {
        let store = MemoryStore::new();
        let problem = sample_problem();
        store.insert_problem(&problem);

        let mut solution = Solution::new();
        solution.tasks.push(ScheduledTask {
            instance_id: "J1".into(),
            template_task_id: "T1".into(),
            machine_id: "M1".into(),
            operator_ids: vec![],
            start_unit: 0,
            end_unit: 4,
            mode_id: "T1M1".into(),
        });
        let id = store
            .store_schedule(&problem, &solution, &sample_metrics())
            .unwrap();

        let stored = store.schedule(&id).unwrap();
        assert_eq!(stored.template_id, "P1");
        assert_eq!(stored.tasks.len(), 1);
        assert_eq!(stored.metrics.status, SolveStatus::Optimal);
        assert_eq!(store.schedule_count(), 1);
    }

    #[test]
    fn test_empty_schedule_rejected() {
        let store = MemoryStore::new();
        let problem = sample_problem();
        let err = store
            .store_schedule(&problem, &Solution::new(), &sample_metrics())
            .unwrap_err();
        assert!(matches!(err, StorageError::WriteRejected(_)));
        assert_eq!(store.schedule_count(), 0);
    }

    #[test]
    fn test_json_round_trip() {
        let store = MemoryStore::new();
        store.insert_problem(&sample_problem());
        let json = store.to_json().unwrap();

        let restored = MemoryStore::from_json(&json).unwrap();
        let problem = restored.load_pattern("P1").unwrap();
        assert_eq!(problem.template.id, "P1");
        assert_eq!(problem.machines.len(), 1);
    }

    #[test]
    fn test_parameter_promotion_roundtrip() {
        let store = MemoryStore::new();
        store.insert_problem(&sample_problem());
        let promoted = SolverParameters::new().with_max_time(3.5);
        store.update_template_parameters("P1", promoted.clone()).unwrap();

        let problem = store.load_pattern("P1").unwrap();
        assert_eq!(problem.template.solver_parameters, Some(promoted));
    }
}
