//! Variable factory.
//!
//! Creates one interval variable per (instance, template task) pair with
//! tightened initial bounds, plus the machine resource declarations the
//! arms will reference. Keys are dense integers — pair `k` is instance
//! `k / task_count`, task `k % task_count` — with a small id-keyed map
//! retained for diagnostics and cross-family lookups.
//!
//! Bounds come from the per-template [`DomainOffsets`]: computed once,
//! applied per instance, which keeps variable creation at
//! O(template × instances).

use std::collections::HashMap;

use crate::cp::{CpModel, Interval, IntervalId, ResourceDecl, ResourceId};
use crate::models::Problem;
use crate::time::DomainOffsets;

/// Keyed container over all (instance, task) decision variables.
///
/// Stable across constraint families: every family addresses variables
/// through this table, so cross-references never depend on insertion
/// order inside a family.
#[derive(Debug, Clone)]
pub struct VarTable {
    task_count: usize,
    intervals: Vec<IntervalId>,
    by_id: HashMap<(String, String), usize>,
    machines: HashMap<String, ResourceId>,
}

impl VarTable {
    /// Number of (instance, task) pairs.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Dense key for an (instance, task) index pair.
    pub fn dense(&self, instance: usize, task: usize) -> usize {
        instance * self.task_count + task
    }

    /// Decomposes a dense key into (instance, task) indices.
    pub fn key(&self, dense: usize) -> (usize, usize) {
        (dense / self.task_count, dense % self.task_count)
    }

    /// Model interval for a dense key.
    pub fn interval(&self, dense: usize) -> IntervalId {
        self.intervals[dense]
    }

    /// Model interval for an (instance, task) index pair.
    pub fn interval_at(&self, instance: usize, task: usize) -> IntervalId {
        self.intervals[self.dense(instance, task)]
    }

    /// Model interval by domain ids, for diagnostics.
    pub fn interval_for(&self, instance_id: &str, task_id: &str) -> Option<IntervalId> {
        self.by_id
            .get(&(instance_id.to_string(), task_id.to_string()))
            .map(|&dense| self.intervals[dense])
    }

    /// Resource id of a machine.
    pub fn machine(&self, machine_id: &str) -> Option<ResourceId> {
        self.machines.get(machine_id).copied()
    }
}

/// Creates machine declarations and all interval variables.
///
/// Intervals are created arm-less; the mode-selection family fills the
/// alternatives. Structural defects (empty modes, bad references) are the
/// validator's job and are assumed absent here.
pub fn create_variables(
    problem: &Problem,
    model: &mut CpModel,
    horizon: i64,
    offsets: &DomainOffsets,
) -> VarTable {
    let mut machines = HashMap::new();
    for machine in &problem.machines {
        let id = model.add_resource(ResourceDecl {
            name: machine.id.clone(),
            capacity: machine.capacity,
            pre_pad: 0,
            post_pad: 0,
            forbidden: Vec::new(),
            wip_group: None,
            cost_per_unit: machine.cost_per_unit(),
            transitions: None,
        });
        machines.insert(machine.id.clone(), id);
    }

    let task_count = problem.template.tasks.len();
    let mut intervals = Vec::with_capacity(problem.instances.len() * task_count);
    let mut by_id = HashMap::new();

    for instance in &problem.instances {
        for (task_idx, task) in problem.template.tasks.iter().enumerate() {
            let start_min = instance.earliest_start_unit + offsets.head[task_idx];
            let end_max = match instance.due_unit {
                Some(due) => {
                    horizon.min(due - (offsets.tail[task_idx] - offsets.min_duration[task_idx]))
                }
                None => horizon,
            };
            let start_max = end_max - offsets.min_duration[task_idx];

            let interval = model.add_interval(Interval {
                name: format!("{}/{}", instance.id, task.id),
                class: task.id.clone(),
                group: instance.id.clone(),
                start_min,
                start_max,
                end_max,
                arms: Vec::new(),
                counts_wip: !task.is_setup,
            });
            by_id.insert((instance.id.clone(), task.id.clone()), intervals.len());
            intervals.push(interval);
        }
    }

    VarTable {
        task_count,
        intervals,
        by_id,
        machines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Instance, Machine, Mode, Precedence, Template, TemplateTask, WorkCell};

    fn sample_problem() -> Problem {
        let template = Template::new("P1", "pattern")
            .with_task(TemplateTask::new("T1", 0).with_mode(Mode::new("T1M1", "M1", 4)))
            .with_task(TemplateTask::new("T2", 1).with_mode(Mode::new("T2M1", "M1", 2)))
            .with_precedence(Precedence::new("T1", "T2"));
        Problem::new(template)
            .with_machine(Machine::new("M1", "C1"))
            .with_cell(WorkCell::new("C1"))
            .with_instance(Instance::new("J1", "P1"))
            .with_instance(Instance::new("J2", "P1").with_earliest_start(4).with_due(20))
    }

    #[test]
    fn test_dense_keys_are_stable() {
        let problem = sample_problem();
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 100);
        let vars = create_variables(&problem, &mut model, 100, &offsets);

        assert_eq!(vars.len(), 4);
        assert_eq!(vars.dense(1, 1), 3);
        assert_eq!(vars.key(3), (1, 1));
        assert_eq!(vars.interval_at(1, 1), vars.interval(3));
        assert_eq!(
            vars.interval_for("J2", "T2"),
            Some(vars.interval_at(1, 1))
        );
        assert_eq!(vars.interval_for("J9", "T1"), None);
    }

    #[test]
    fn test_bounds_tightened_by_offsets() {
        let problem = sample_problem();
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 100);
        let vars = create_variables(&problem, &mut model, 100, &offsets);

        // J2/T2: release 4 + head 4 = 8; due 20 -> end_max 20, start_max 18.
        let iv = &model.intervals[vars.interval_at(1, 1)];
        assert_eq!(iv.start_min, 8);
        assert_eq!(iv.end_max, 20);
        assert_eq!(iv.start_max, 18);

        // J1/T1: no due -> horizon bounds.
        let iv = &model.intervals[vars.interval_at(0, 0)];
        assert_eq!(iv.start_min, 0);
        assert_eq!(iv.end_max, 100);
    }

    #[test]
    fn test_machines_registered_in_order() {
        let problem = sample_problem().with_machine(Machine::new("M2", "C1"));
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 100);
        let vars = create_variables(&problem, &mut model, 100, &offsets);

        assert_eq!(vars.machine("M1"), Some(0));
        assert_eq!(vars.machine("M2"), Some(1));
        assert_eq!(model.resources.len(), 2);
    }

    #[test]
    fn test_setup_tasks_do_not_count_wip() {
        let mut problem = sample_problem();
        problem.template.tasks[0].is_setup = true;
        let offsets = DomainOffsets::compute(&problem.template).unwrap();
        let mut model = CpModel::new("t", 100);
        let vars = create_variables(&problem, &mut model, 100, &offsets);

        assert!(!model.intervals[vars.interval_at(0, 0)].counts_wip);
        assert!(model.intervals[vars.interval_at(0, 1)].counts_wip);
    }
}
