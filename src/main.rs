//! Command-line runner for the scheduling core.
//!
//! Loads a pattern from a JSON problem store, solves it, persists the
//! schedule back into the store, and emits the minute-based wire record.
//!
//! Exit codes: 0 optimal/feasible solution, 2 infeasible, 3 time limit
//! without a feasible solution, 4 malformed problem, 1 unexpected error.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use patternshop::wire::ScheduleRecord;
use patternshop::{
    MemoryStore, PatternLoader, SchedulePersister, SolveDriver, SolveError, SolveStatus,
};

#[derive(Parser)]
#[command(
    name = "patternshop",
    version,
    about = "Template-based job-shop scheduling runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a pattern from a problem store.
    Solve {
        /// Pattern (template) id to solve.
        #[arg(long)]
        pattern: String,
        /// Path to the JSON problem store.
        #[arg(long)]
        data: PathBuf,
        /// Comma-separated instance ids; default: all flagged instances.
        #[arg(long)]
        instances: Option<String>,
        /// Wall-clock budget in seconds.
        #[arg(long)]
        max_time: Option<f64>,
        /// Engine worker threads.
        #[arg(long)]
        workers: Option<i32>,
        /// Write the schedule JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            match err {
                SolveError::Malformed(_) => 4,
                SolveError::Storage(_) | SolveError::Internal(_) => 1,
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, SolveError> {
    match cli.command {
        Commands::Solve {
            pattern,
            data,
            instances,
            max_time,
            workers,
            out,
        } => {
            let store = MemoryStore::load_file(&data).map_err(SolveError::Storage)?;
            let mut problem = store.load_pattern(&pattern).map_err(SolveError::Storage)?;

            if let Some(list) = instances {
                let keep: HashSet<&str> = list.split(',').map(str::trim).collect();
                problem.instances.retain(|i| keep.contains(i.id.as_str()));
            }
            if let Some(seconds) = max_time {
                problem.parameters.max_time_seconds = seconds;
            }
            if let Some(count) = workers {
                problem.parameters.num_search_workers = count;
            }

            let outcome = SolveDriver::new(&problem).solve()?;
            match (&outcome.solution, outcome.status) {
                (Some(solution), _) => {
                    let schedule_id = store
                        .store_schedule(&problem, solution, &outcome.metrics)
                        .map_err(SolveError::Storage)?;
                    store.save_file(&data).map_err(SolveError::Storage)?;

                    let record = ScheduleRecord::new(schedule_id, solution, &outcome.metrics);
                    let json = serde_json::to_string_pretty(&record)
                        .map_err(|e| SolveError::Internal(e.to_string()))?;
                    match out {
                        Some(path) => std::fs::write(path, json)
                            .map_err(|e| SolveError::Internal(e.to_string()))?,
                        None => println!("{json}"),
                    }
                    Ok(0)
                }
                (None, SolveStatus::Infeasible) => {
                    eprintln!("infeasible: no schedule exists within the horizon");
                    if let Some(report) = &outcome.infeasibility {
                        for hint in &report.hints {
                            eprintln!("  hint: {hint}");
                        }
                        for family in &report.families {
                            eprintln!("  suspect family: {family}");
                        }
                    }
                    Ok(2)
                }
                (None, SolveStatus::TimeLimit) => {
                    eprintln!("time limit reached with no feasible solution");
                    Ok(3)
                }
                (None, status) => {
                    eprintln!("solve ended without a schedule: {status:?}");
                    Ok(1)
                }
            }
        }
    }
}
