//! Sequence-dependent setup times.
//!
//! A directed weighted graph keyed by machine: the changeover incurred on
//! machine `k` when task `b` immediately follows task `a`. Edges are keyed
//! by *template* task ids — every instance of the pattern reuses the same
//! table, so the table stays O(template²) regardless of instance count.
//!
//! When a machine has entries here, they replace its fixed setup/teardown
//! pads for sequencing purposes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One changeover edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupEdge {
    /// Machine the changeover happens on.
    pub machine_id: String,
    /// Template task just finished.
    pub from_task: String,
    /// Template task about to start.
    pub to_task: String,
    /// Changeover time in units.
    pub setup_units: i64,
}

/// Sequence-dependent setup table for all machines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupTimeTable {
    edges: Vec<SetupEdge>,
    /// Fallback for machine/task pairs without an explicit edge.
    pub default_units: i64,
    #[serde(skip)]
    index: HashMap<(String, String, String), i64>,
}

impl SetupTimeTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default changeover for listed machines.
    pub fn with_default(mut self, units: i64) -> Self {
        self.default_units = units;
        self
    }

    /// Adds a changeover edge.
    pub fn set(
        &mut self,
        machine_id: impl Into<String>,
        from_task: impl Into<String>,
        to_task: impl Into<String>,
        setup_units: i64,
    ) {
        let edge = SetupEdge {
            machine_id: machine_id.into(),
            from_task: from_task.into(),
            to_task: to_task.into(),
            setup_units,
        };
        self.index.insert(
            (
                edge.machine_id.clone(),
                edge.from_task.clone(),
                edge.to_task.clone(),
            ),
            edge.setup_units,
        );
        self.edges.push(edge);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_edge(
        mut self,
        machine_id: impl Into<String>,
        from_task: impl Into<String>,
        to_task: impl Into<String>,
        setup_units: i64,
    ) -> Self {
        self.set(machine_id, from_task, to_task, setup_units);
        self
    }

    /// Rebuilds the lookup index. Call after deserializing.
    pub fn reindex(&mut self) {
        self.index = self
            .edges
            .iter()
            .map(|e| {
                (
                    (
                        e.machine_id.clone(),
                        e.from_task.clone(),
                        e.to_task.clone(),
                    ),
                    e.setup_units,
                )
            })
            .collect();
    }

    /// Changeover on `machine_id` from `from_task` to `to_task`.
    ///
    /// Same-task transitions are free unless an explicit edge says
    /// otherwise; unlisted pairs fall back to the default.
    pub fn get(&self, machine_id: &str, from_task: &str, to_task: &str) -> i64 {
        if let Some(&units) = self.index.get(&(
            machine_id.to_string(),
            from_task.to_string(),
            to_task.to_string(),
        )) {
            return units;
        }
        if from_task == to_task {
            0
        } else {
            self.default_units
        }
    }

    /// Whether any edge mentions this machine.
    pub fn covers_machine(&self, machine_id: &str) -> bool {
        self.edges.iter().any(|e| e.machine_id == machine_id)
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[SetupEdge] {
        &self.edges
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
