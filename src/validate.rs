//! Structural validation of scheduling problems.
//!
//! Every malformed-problem condition is detected here, before any variable
//! or constraint exists: duplicate ids and positions, empty mode lists,
//! non-positive durations, dangling references, inconsistent release/due
//! pairs, and precedence cycles. All defects are collected in one pass so
//! the caller can fix the input wholesale.
//!
//! Cycle detection never relies on the solver: the template precedence
//! relation is built as a petgraph DAG and topologically sorted up front.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{MalformedProblem, ProblemIssue};
use crate::models::{Problem, Template};

/// The template precedence relation as a DAG over task indices.
///
/// Node weight = task index into `template.tasks`; edge weight = minimum
/// delay in units. Built once per template and reused by domain
/// tightening, critical-path bounds, and the model builder.
#[derive(Debug, Clone)]
pub struct TemplateDag {
    graph: DiGraph<usize, i64>,
    nodes: Vec<NodeIndex>,
    topo: Vec<usize>,
}

impl TemplateDag {
    /// Builds the DAG, reporting dangling references, self-edges, and
    /// cycles as malformed-problem issues.
    pub fn build(template: &Template) -> Result<Self, MalformedProblem> {
        let mut issues = Vec::new();
        let n = template.tasks.len();
        let mut graph: DiGraph<usize, i64> = DiGraph::with_capacity(n, template.precedences.len());
        let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();

        for edge in &template.precedences {
            if edge.predecessor_id == edge.successor_id {
                issues.push(ProblemIssue::SelfPrecedence {
                    task_id: edge.predecessor_id.clone(),
                });
                continue;
            }
            let pred = template.task_index(&edge.predecessor_id);
            let succ = template.task_index(&edge.successor_id);
            match (pred, succ) {
                (Some(p), Some(s)) => {
                    graph.add_edge(nodes[p], nodes[s], edge.min_delay_units);
                }
                _ => {
                    let (owner, reference) = if pred.is_none() {
                        (&edge.successor_id, &edge.predecessor_id)
                    } else {
                        (&edge.predecessor_id, &edge.successor_id)
                    };
                    issues.push(ProblemIssue::DanglingReference {
                        entity: "precedence",
                        owner_id: owner.clone(),
                        target: "task",
                        reference: reference.clone(),
                    });
                }
            }
        }

        let topo = match toposort(&graph, None) {
            Ok(order) => order.iter().map(|&ni| graph[ni]).collect(),
            Err(cycle) => {
                let idx = graph[cycle.node_id()];
                issues.push(ProblemIssue::CyclicPrecedence {
                    task_id: template.tasks[idx].id.clone(),
                });
                Vec::new()
            }
        };

        if issues.is_empty() {
            Ok(Self { graph, nodes, topo })
        } else {
            Err(MalformedProblem::new(issues))
        }
    }

    /// Task indices in topological order.
    pub fn topo_order(&self) -> &[usize] {
        &self.topo
    }

    /// Direct predecessors of a task with their minimum delays.
    pub fn predecessors(&self, task: usize) -> Vec<(usize, i64)> {
        self.graph
            .edges_directed(self.nodes[task], Direction::Incoming)
            .map(|e| (self.graph[e.source()], *e.weight()))
            .collect()
    }

    /// Direct successors of a task with their minimum delays.
    pub fn successors(&self, task: usize) -> Vec<(usize, i64)> {
        self.graph
            .edges_directed(self.nodes[task], Direction::Outgoing)
            .map(|e| (self.graph[e.target()], *e.weight()))
            .collect()
    }

    /// Longest path through the DAG: sum of node weights plus edge
    /// delays along the heaviest chain.
    pub fn longest_path(&self, weights: &[i64]) -> i64 {
        let n = weights.len();
        let mut dist = vec![0i64; n];
        for &idx in &self.topo {
            dist[idx] = weights[idx];
            for (pred, delay) in self.predecessors(idx) {
                dist[idx] = dist[idx].max(dist[pred] + delay + weights[idx]);
            }
        }
        dist.into_iter().max().unwrap_or(0)
    }
}

/// Validates a problem, collecting every structural defect.
///
/// Checks, in order: template tasks (ids, positions, modes, operator
/// ranges, references), precedences (delay windows, dangling edges,
/// cycles), the resource catalog (capacities, references), instances
/// (release/due windows, template binding), the setup table, and the
/// phase-3 scalarization choice.
pub fn validate(problem: &Problem) -> Result<(), MalformedProblem> {
    let mut issues = Vec::new();
    let template = &problem.template;

    check_unique(
        template.tasks.iter().map(|t| t.id.as_str()),
        "template task",
        &mut issues,
    );
    check_unique(
        problem.machines.iter().map(|m| m.id.as_str()),
        "machine",
        &mut issues,
    );
    check_unique(
        problem.cells.iter().map(|c| c.id.as_str()),
        "work cell",
        &mut issues,
    );
    check_unique(
        problem.operators.iter().map(|o| o.id.as_str()),
        "operator",
        &mut issues,
    );
    check_unique(
        problem.sequence_resources.iter().map(|s| s.id.as_str()),
        "sequence resource",
        &mut issues,
    );
    check_unique(
        problem.instances.iter().map(|i| i.id.as_str()),
        "instance",
        &mut issues,
    );

    // Position collisions.
    let mut positions: Vec<(i32, &str)> = template
        .tasks
        .iter()
        .map(|t| (t.position, t.id.as_str()))
        .collect();
    positions.sort();
    for pair in positions.windows(2) {
        if pair[0].0 == pair[1].0 {
            issues.push(ProblemIssue::DuplicatePosition {
                template_id: template.id.clone(),
                task_id: pair[1].1.to_string(),
                position: pair[1].0,
            });
        }
    }

    for task in &template.tasks {
        if task.modes.is_empty() {
            issues.push(ProblemIssue::EmptyModes {
                task_id: task.id.clone(),
            });
        }
        for mode in &task.modes {
            if mode.duration_units < 1 {
                issues.push(ProblemIssue::NonPositiveDuration {
                    task_id: task.id.clone(),
                    mode_id: mode.id.clone(),
                    duration_units: mode.duration_units,
                });
            }
            if problem.machine(&mode.machine_id).is_none() {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "mode",
                    owner_id: mode.id.clone(),
                    target: "machine",
                    reference: mode.machine_id.clone(),
                });
            }
        }
        if task.min_operators < 1 || task.min_operators > task.max_operators {
            issues.push(ProblemIssue::InvalidOperatorRange {
                task_id: task.id.clone(),
                min_operators: task.min_operators,
                max_operators: task.max_operators,
            });
        }
        if let Some(seq) = &task.sequence_id {
            if problem.sequence_resource(seq).is_none() {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "template task",
                    owner_id: task.id.clone(),
                    target: "sequence resource",
                    reference: seq.clone(),
                });
            }
        }
        for req in &task.skill_requirements {
            if !problem.skills.iter().any(|s| s.id == req.skill_id) {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "skill requirement",
                    owner_id: task.id.clone(),
                    target: "skill",
                    reference: req.skill_id.clone(),
                });
            }
        }
    }

    for edge in &template.precedences {
        if let Some(max_delay) = edge.max_delay_units {
            if max_delay < edge.min_delay_units {
                issues.push(ProblemIssue::InvertedDelayWindow {
                    predecessor_id: edge.predecessor_id.clone(),
                    successor_id: edge.successor_id.clone(),
                    min_delay: edge.min_delay_units,
                    max_delay,
                });
            }
        }
    }
    if let Err(dag_issues) = TemplateDag::build(template) {
        issues.extend(dag_issues.issues);
    }

    for machine in &problem.machines {
        if machine.capacity < 1 {
            issues.push(ProblemIssue::NonPositiveCapacity {
                entity: "machine",
                id: machine.id.clone(),
                capacity: machine.capacity,
            });
        }
        if problem.cell(&machine.cell_id).is_none() {
            issues.push(ProblemIssue::DanglingReference {
                entity: "machine",
                owner_id: machine.id.clone(),
                target: "work cell",
                reference: machine.cell_id.clone(),
            });
        }
        if let Some(cal) = &machine.calendar_id {
            if problem.calendar(cal).is_none() {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "machine",
                    owner_id: machine.id.clone(),
                    target: "calendar",
                    reference: cal.clone(),
                });
            }
        }
    }

    for cell in &problem.cells {
        if cell.capacity < 1 {
            issues.push(ProblemIssue::NonPositiveCapacity {
                entity: "work cell",
                id: cell.id.clone(),
                capacity: cell.capacity,
            });
        }
        if let Some(limit) = cell.wip_limit {
            if limit < 1 {
                issues.push(ProblemIssue::NonPositiveCapacity {
                    entity: "work cell wip limit",
                    id: cell.id.clone(),
                    capacity: limit,
                });
            }
        }
        if let Some(cal) = &cell.calendar_id {
            if problem.calendar(cal).is_none() {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "work cell",
                    owner_id: cell.id.clone(),
                    target: "calendar",
                    reference: cal.clone(),
                });
            }
        }
    }

    for operator in &problem.operators {
        for skill_id in operator.skills.keys() {
            if !problem.skills.iter().any(|s| s.id == *skill_id) {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "operator",
                    owner_id: operator.id.clone(),
                    target: "skill",
                    reference: skill_id.clone(),
                });
            }
        }
    }

    for resource in &problem.sequence_resources {
        if resource.max_concurrent < 1 {
            issues.push(ProblemIssue::NonPositiveCapacity {
                entity: "sequence resource",
                id: resource.id.clone(),
                capacity: resource.max_concurrent,
            });
        }
    }

    for instance in &problem.instances {
        if instance.template_id != template.id {
            issues.push(ProblemIssue::DanglingReference {
                entity: "instance",
                owner_id: instance.id.clone(),
                target: "template",
                reference: instance.template_id.clone(),
            });
        }
        if instance.earliest_start_unit < 0 {
            issues.push(ProblemIssue::NegativeEarliestStart {
                instance_id: instance.id.clone(),
                earliest_start_unit: instance.earliest_start_unit,
            });
        }
        if let Some(due) = instance.due_unit {
            if due < instance.earliest_start_unit {
                issues.push(ProblemIssue::DueBeforeRelease {
                    instance_id: instance.id.clone(),
                    earliest_start_unit: instance.earliest_start_unit,
                    due_unit: due,
                });
            }
        }
    }

    for edge in problem.setup_times.edges() {
        if problem.machine(&edge.machine_id).is_none() {
            issues.push(ProblemIssue::DanglingReference {
                entity: "setup edge",
                owner_id: format!("{}->{}", edge.from_task, edge.to_task),
                target: "machine",
                reference: edge.machine_id.clone(),
            });
        }
        for task_id in [&edge.from_task, &edge.to_task] {
            if template.task_index(task_id).is_none() {
                issues.push(ProblemIssue::DanglingReference {
                    entity: "setup edge",
                    owner_id: edge.machine_id.clone(),
                    target: "task",
                    reference: task_id.clone(),
                });
            }
        }
    }

    let params = problem.effective_parameters();
    if params.enable_phase3
        && params.objective_weights.is_zero()
        && params
            .objective_lex_order
            .as_ref()
            .map(|o| o.is_empty())
            .unwrap_or(true)
    {
        issues.push(ProblemIssue::MissingScalarization);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MalformedProblem::new(issues))
    }
}

fn check_unique<'a>(
    ids: impl Iterator<Item = &'a str>,
    entity: &'static str,
    issues: &mut Vec<ProblemIssue>,
) {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            issues.push(ProblemIssue::DuplicateId {
                entity,
                id: id.to_string(),
            });
        }
    }
}
