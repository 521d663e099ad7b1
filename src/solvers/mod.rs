pub mod branch_and_bound;
pub mod iterative_deepening;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Serialize;

pub use branch_and_bound::{
    BranchAndBound, BranchAndBoundConfig, BranchPriority, BlockFindingMode, BlockFindingStrategy,
    JobsJoiningOnGcd,
};

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoSolution,
    Optimal,
    Infeasible,
    Heuristic,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NoSolution => "NoSolution",
            Status::Optimal => "Optimal",
            Status::Infeasible => "Infeasible",
            Status::Heuristic => "Heuristic",
        };
        f.write_str(name)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "NoSolution" => Ok(Status::NoSolution),
            "Optimal" => Ok(Status::Optimal),
            "Infeasible" => Ok(Status::Infeasible),
            "Heuristic" => Ok(Status::Heuristic),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Everything a solver reports back, including the search statistics of the
/// result-file format. Fields that a solver does not track stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveResult {
    pub status: Status,
    pub objective: Option<i64>,
    pub time_limit_reached: bool,
    /// Start interval per job, indexed by job index; `None` without an
    /// incumbent.
    pub start_times: Option<Vec<i64>>,
    pub nodes_count: Option<i64>,
    pub block_detection_found_solution: Option<i64>,
    pub pack_to_blocks_found_solution: Option<i64>,
    pub jobs_joined_on_larger_gcd: Option<i64>,
    pub root_lower_bound: Option<i64>,
    pub lower_bound_total_duration: Option<Duration>,
    pub block_detection_total_duration: Option<Duration>,
    pub pack_to_blocks_total_duration: Option<Duration>,
    pub block_finding_total_duration: Option<Duration>,
}

impl SolveResult {
    /// A result without solution data; statistics can be filled in with
    /// struct update syntax.
    pub fn new(status: Status, time_limit_reached: bool) -> Self {
        Self {
            status,
            objective: None,
            time_limit_reached,
            start_times: None,
            nodes_count: None,
            block_detection_found_solution: None,
            pack_to_blocks_found_solution: None,
            jobs_joined_on_larger_gcd: None,
            root_lower_bound: None,
            lower_bound_total_duration: None,
            block_detection_total_duration: None,
            pack_to_blocks_total_duration: None,
            block_finding_total_duration: None,
        }
    }
}

/// Common solver parameters; the specialized knobs of the search live in
/// [BranchAndBoundConfig].
pub struct SolverConfig {
    /// Deterministic stream behind branching decisions and child-solver
    /// seeds.
    pub rng: Pcg64,
    /// `None` means unlimited.
    pub time_limit: Option<Duration>,
    pub num_workers: usize,
    /// Warm-start start times indexed by job index; empty means none.
    pub initial_start_times: Vec<i64>,
    /// Intervals the machine may be on in; set by the caller.
    pub processable_intervals: Vec<bool>,
}

impl SolverConfig {
    pub fn new(
        random_seed: u64,
        time_limit: Option<Duration>,
        num_workers: usize,
        initial_start_times: Vec<i64>,
    ) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(random_seed),
            time_limit,
            num_workers,
            initial_start_times,
            processable_intervals: Vec::new(),
        }
    }
}

/// One CSV row of solve telemetry, appended by the binary per run.
#[derive(Debug, Serialize)]
pub struct SolveMeasurement {
    pub instance: String,
    pub status: String,
    pub objective: Option<i64>,
    /// The total wall time in ms
    pub total_time_ms: u64,
    pub nodes_count: Option<i64>,
    pub root_lower_bound: Option<i64>,
}
