use std::path::PathBuf;

use clap::Parser;
use rand::Rng;

use energy_scheduling::data_structures::Instance;
use energy_scheduling::io;
use energy_scheduling::solvers::{
    iterative_deepening, BranchAndBound, BranchAndBoundConfig, SolveMeasurement, SolveResult,
    SolverConfig, Status,
};
use energy_scheduling::stopwatch::Stopwatch;

#[derive(Parser, Debug)]
#[command(about = "Energy-aware single-machine scheduling by exact branch and bound.")]
#[command(next_line_help = true)]
struct Args {
    /// The common solver config: seed, time limit, workers, warm start.
    solver_config_path: PathBuf,

    /// The specialized branch-and-bound config.
    specialized_solver_config_path: PathBuf,

    /// The instance to solve.
    instance_path: PathBuf,

    /// Where the result file is written.
    result_path: PathBuf,

    /// Append a telemetry row for this run to the given CSV file.
    #[arg(long)]
    measurements: Option<PathBuf>,
}

fn main() -> Result<(), io::IOError> {
    simple_logger::init_with_level(log::Level::Info).unwrap();

    let args = Args::parse();

    let mut solver_config = io::config::read_solver_config(&args.solver_config_path)?;
    let bab_config =
        io::config::read_branch_and_bound_config(&args.specialized_solver_config_path)?;
    let instance = io::instance::read(&args.instance_path)?;

    // Deepening and the plain search both start from the fully processable
    // horizon.
    solver_config.processable_intervals = vec![true; instance.num_intervals()];

    let mut stopwatch = Stopwatch::new();
    stopwatch.start();
    let result = run_solver(&instance, solver_config, &bab_config);
    stopwatch.stop();

    io::result::write(&args.result_path, &result)?;

    if let Some(measurements_path) = &args.measurements {
        let measurement = SolveMeasurement {
            instance: args.instance_path.display().to_string(),
            status: result.status.to_string(),
            objective: result.objective,
            total_time_ms: stopwatch.total_duration().as_millis() as u64,
            nodes_count: result.nodes_count,
            root_lower_bound: result.root_lower_bound,
        };
        io::csv::append_to_file(measurements_path, std::slice::from_ref(&measurement))?;
    }

    Ok(())
}

fn run_solver(
    instance: &Instance,
    mut solver_config: SolverConfig,
    bab_config: &BranchAndBoundConfig,
) -> SolveResult {
    if !bab_config.use_iterative_deepening {
        let mut solver = BranchAndBound::new(instance, solver_config, bab_config);
        solver.solve();
        return solver.result();
    }

    // The node budget only applies to the full-horizon search.
    let deepening_bab_config = BranchAndBoundConfig {
        nodes_count_limit: None,
        ..bab_config.clone()
    };

    let Some(deepening_time_limit) = bab_config.iterative_deepening_time_limit else {
        return iterative_deepening::solve(instance, &mut solver_config, &deepening_bab_config);
    };

    // Deepening under its own budget; if it cannot settle the full horizon,
    // the remaining budget goes to a warm-started full-horizon search.
    let time_limit = solver_config.time_limit;
    let mut deepening_config = SolverConfig::new(
        solver_config.rng.gen(),
        Some(deepening_time_limit),
        solver_config.num_workers,
        Vec::new(),
    );
    deepening_config.processable_intervals = solver_config.processable_intervals.clone();

    let deepening_result =
        iterative_deepening::solve(instance, &mut deepening_config, &deepening_bab_config);
    if deepening_result.status == Status::Optimal {
        // Optimal from deepening means the final mask covered the horizon.
        return deepening_result;
    }

    let warm_start = match deepening_result.status {
        Status::Heuristic => deepening_result.start_times.clone().unwrap_or_default(),
        _ => Vec::new(),
    };
    let remaining_time_limit =
        time_limit.map(|limit| limit.saturating_sub(deepening_time_limit));
    let mut full_horizon_config = SolverConfig::new(
        solver_config.rng.gen(),
        remaining_time_limit,
        solver_config.num_workers,
        warm_start,
    );
    full_horizon_config.processable_intervals = solver_config.processable_intervals;

    let mut solver = BranchAndBound::new(instance, full_horizon_config, bab_config);
    solver.solve();
    solver.result()
}
