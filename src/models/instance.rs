//! Instance model.
//!
//! An instance is a concrete job derived from a template: same structure,
//! its own release date, due date, and priority. Problems carry many
//! instances of one template; that multiplicity is what the pattern
//! expansion exploits.

use serde::{Deserialize, Serialize};

/// A concrete job instantiated from a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Unique instance identifier.
    pub id: String,
    /// Template this instance is derived from.
    pub template_id: String,
    /// Scheduling priority (higher = more important).
    pub priority: i32,
    /// Earliest start, in units from the epoch. Non-negative.
    pub earliest_start_unit: i64,
    /// Due date, in units from the epoch. When present, >= earliest start.
    pub due_unit: Option<i64>,
    /// Whether this instance is flagged for scheduling.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Instance {
    /// Creates a new instance released at the epoch.
    pub fn new(id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            priority: 0,
            earliest_start_unit: 0,
            due_unit: None,
            active: true,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the earliest start (units).
    pub fn with_earliest_start(mut self, unit: i64) -> Self {
        self.earliest_start_unit = unit;
        self
    }

    /// Sets the due date (units).
    pub fn with_due(mut self, unit: i64) -> Self {
        self.due_unit = Some(unit);
        self
    }

    /// Unflags the instance from scheduling.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether two instances are indistinguishable for symmetry breaking:
    /// same template, priority, release, and due date.
    pub fn interchangeable_with(&self, other: &Self) -> bool {
        self.template_id == other.template_id
            && self.priority == other.priority
            && self.earliest_start_unit == other.earliest_start_unit
            && self.due_unit == other.due_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_builder() {
        let inst = Instance::new("J1", "P1")
            .with_priority(10)
            .with_earliest_start(4)
            .with_due(40);
        assert_eq!(inst.id, "J1");
        assert_eq!(inst.template_id, "P1");
        assert_eq!(inst.priority, 10);
        assert_eq!(inst.earliest_start_unit, 4);
        assert_eq!(inst.due_unit, Some(40));
        assert!(inst.active);
    }

    #[test]
    fn test_interchangeable() {
        let a = Instance::new("J1", "P1").with_due(20);
        let b = Instance::new("J2", "P1").with_due(20);
        let c = Instance::new("J3", "P1").with_due(30);
        assert!(a.interchangeable_with(&b));
        assert!(!a.interchangeable_with(&c));
    }

    #[test]
    fn test_active_default_on_deserialize() {
        let inst: Instance =
            serde_json::from_str(r#"{"id":"J1","template_id":"P1","priority":0,"earliest_start_unit":0,"due_unit":null}"#)
                .unwrap();
        assert!(inst.active);
    }
}
