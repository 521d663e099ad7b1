//! Outer loop growing the processable-interval mask from a relaxed block
//! layout.
//!
//! The relaxed blocks of the unconstrained DP say where an optimal schedule
//! wants the machine on. Each iteration puffs those blocks outward, solves
//! the restricted problem with the branch-and-bound search, and doubles the
//! puff radius until the mask covers the whole allowed horizon or the time
//! budget runs out.

use std::time::Duration;

use rand::Rng;

use crate::data_structures::{Block, FixedPermCostComputation, GcdTable, Instance, NO_VALUE};
use crate::parallel::Workers;
use crate::stopwatch::Stopwatch;

use super::{
    BranchAndBound, BranchAndBoundConfig, JobsJoiningOnGcd, SolveResult, SolverConfig, Status,
};

/// Mark the intervals of every block, enlarged by `puff_size` on both sides
/// and clipped to the allowed on-horizon, as processable.
pub fn puff_blocks_to_processable_intervals(
    instance: &Instance,
    blocks: &[Block],
    puff_size: i64,
) -> Vec<bool> {
    let mut processable_intervals = vec![false; instance.num_intervals()];
    for block in blocks {
        let left = (block.start - puff_size).max(instance.earliest_on_interval_idx as i64);
        let right = (block.completion + puff_size).min(instance.latest_on_interval_idx as i64 + 1);
        for interval_idx in left..right {
            processable_intervals[interval_idx as usize] = true;
        }
    }

    processable_intervals
}

#[derive(Default)]
struct AggregatedStatistics {
    nodes_count: i64,
    block_detection_found_solution: i64,
    pack_to_blocks_found_solution: i64,
    jobs_joined_on_larger_gcd: i64,
    lower_bound_total_duration: Duration,
    block_detection_total_duration: Duration,
    pack_to_blocks_total_duration: Duration,
    block_finding_total_duration: Duration,
}

impl AggregatedStatistics {
    fn absorb(&mut self, result: &SolveResult) {
        self.nodes_count += result.nodes_count.unwrap_or(0);
        self.block_detection_found_solution +=
            result.block_detection_found_solution.unwrap_or(0);
        self.pack_to_blocks_found_solution += result.pack_to_blocks_found_solution.unwrap_or(0);
        self.jobs_joined_on_larger_gcd += result.jobs_joined_on_larger_gcd.unwrap_or(0);
        self.lower_bound_total_duration +=
            result.lower_bound_total_duration.unwrap_or(Duration::ZERO);
        self.block_detection_total_duration += result
            .block_detection_total_duration
            .unwrap_or(Duration::ZERO);
        self.pack_to_blocks_total_duration += result
            .pack_to_blocks_total_duration
            .unwrap_or(Duration::ZERO);
        self.block_finding_total_duration += result
            .block_finding_total_duration
            .unwrap_or(Duration::ZERO);
    }

    fn into_result(
        self,
        status: Status,
        time_limit_reached: bool,
        objective: Option<i64>,
        start_times: Option<Vec<i64>>,
        root_lower_bound: Option<i64>,
    ) -> SolveResult {
        SolveResult {
            status,
            objective,
            time_limit_reached,
            start_times,
            nodes_count: Some(self.nodes_count),
            block_detection_found_solution: Some(self.block_detection_found_solution),
            pack_to_blocks_found_solution: Some(self.pack_to_blocks_found_solution),
            jobs_joined_on_larger_gcd: Some(self.jobs_joined_on_larger_gcd),
            root_lower_bound,
            lower_bound_total_duration: Some(self.lower_bound_total_duration),
            block_detection_total_duration: Some(self.block_detection_total_duration),
            pack_to_blocks_total_duration: Some(self.pack_to_blocks_total_duration),
            block_finding_total_duration: Some(self.block_finding_total_duration),
        }
    }
}

pub fn solve(
    instance: &Instance,
    solver_config: &mut SolverConfig,
    config: &BranchAndBoundConfig,
) -> SolveResult {
    // The relaxed block layout seeding the first mask.
    let mut initial_relaxed_blocks_computation = FixedPermCostComputation::new(
        instance,
        solver_config.processable_intervals.clone(),
        Workers::new(solver_config.num_workers),
    );
    if config.jobs_joining_on_gcd != JobsJoiningOnGcd::Off && instance.total_proc_time() > 0 {
        let all_proc_times: Vec<i64> = instance
            .jobs
            .iter()
            .map(|job| job.processing_time)
            .collect();
        let joined_gcd = GcdTable::new(&all_proc_times).gcd(&all_proc_times);
        if joined_gcd != 1 {
            initial_relaxed_blocks_computation.set_proc_times(0, joined_gcd);
        }
    }

    let relaxed_bound = initial_relaxed_blocks_computation.recompute_cost();
    if relaxed_bound == NO_VALUE {
        return SolveResult::new(Status::Infeasible, false);
    }

    if instance.total_proc_time() == 0 {
        // Nothing to place, no blocks to puff; a single search settles it.
        let mut child_config = SolverConfig::new(
            solver_config.rng.gen(),
            solver_config.time_limit,
            solver_config.num_workers,
            Vec::new(),
        );
        child_config.processable_intervals = solver_config.processable_intervals.clone();
        let mut solver = BranchAndBound::new(instance, child_config, config);
        solver.solve();
        return solver.result();
    }

    let relaxed_proc_blocks = Block::proc_blocks(&mut initial_relaxed_blocks_computation, 0);

    let mut stopwatch = Stopwatch::new();
    stopwatch.start();

    let mut totals = AggregatedStatistics::default();

    let mut curr_puff_size: i64 = 2;
    let mut curr_obj: Option<i64> = None;
    let mut curr_start_times: Vec<i64> = Vec::new();
    while !stopwatch.time_limit_reached(solver_config.time_limit) {
        let curr_processable_intervals =
            puff_blocks_to_processable_intervals(instance, &relaxed_proc_blocks, curr_puff_size);
        let all_intervals_processable = (instance.earliest_on_interval_idx
            ..=instance.latest_on_interval_idx)
            .all(|interval_idx| curr_processable_intervals[interval_idx]);
        log::info!(
            "current puff size: {curr_puff_size}, all intervals processable: {all_intervals_processable}"
        );

        // Fresh seed, remaining budget and the previous incumbent as warm
        // start for this iteration.
        let mut curr_solver_config = SolverConfig::new(
            solver_config.rng.gen(),
            stopwatch.remaining_time(solver_config.time_limit),
            solver_config.num_workers,
            curr_start_times.clone(),
        );
        curr_solver_config.processable_intervals = curr_processable_intervals;

        let mut solver = BranchAndBound::new(instance, curr_solver_config, config);
        solver.solve();
        let curr_result = solver.result();

        totals.absorb(&curr_result);

        match curr_result.status {
            Status::Infeasible => {
                if all_intervals_processable {
                    // The whole problem is infeasible.
                    return totals.into_result(Status::Infeasible, false, None, None, None);
                }
                // Cannot decide under a partial mask, puff further.
            }

            Status::Heuristic => {
                return totals.into_result(
                    Status::Heuristic,
                    true,
                    curr_result.objective,
                    curr_result.start_times,
                    Some(relaxed_bound),
                );
            }

            Status::Optimal => {
                if all_intervals_processable {
                    // Optimal under the full mask is optimal overall.
                    return totals.into_result(
                        Status::Optimal,
                        false,
                        curr_result.objective,
                        curr_result.start_times,
                        Some(relaxed_bound),
                    );
                }
                // Optimal only for this mask, keep as incumbent.
                curr_obj = curr_result.objective;
                curr_start_times = curr_result.start_times.unwrap_or_default();
            }

            Status::NoSolution => {
                let status = if curr_obj.is_some() {
                    Status::Heuristic
                } else {
                    Status::NoSolution
                };
                let start_times = (!curr_start_times.is_empty()).then(|| curr_start_times);
                return totals.into_result(status, true, curr_obj, start_times, Some(relaxed_bound));
            }
        }

        curr_puff_size *= 2;
    }

    let status = if curr_obj.is_some() {
        Status::Heuristic
    } else {
        Status::NoSolution
    };
    let start_times = (!curr_start_times.is_empty()).then(|| curr_start_times);
    totals.into_result(status, true, curr_obj, start_times, Some(relaxed_bound))
}

#[cfg(test)]
mod test {
    use crate::data_structures::instance::test_support::uniform_instance;

    use super::*;

    fn solver_config(instance: &Instance) -> SolverConfig {
        let mut config = SolverConfig::new(42, None, 0, Vec::new());
        config.processable_intervals = vec![true; instance.num_intervals()];
        config
    }

    #[test]
    fn test_puffing_clips_to_horizon() {
        let instance = uniform_instance(&[4], 12);
        let blocks = vec![Block::new(3, 7)];

        let processable = puff_blocks_to_processable_intervals(&instance, &blocks, 2);
        let expected: Vec<bool> = (0..12).map(|idx| (1..9).contains(&idx)).collect();
        assert_eq!(processable, expected);

        // a huge radius covers exactly the allowed horizon
        let processable = puff_blocks_to_processable_intervals(&instance, &blocks, 100);
        assert_eq!(processable, vec![true; 12]);
    }

    #[test]
    fn test_converges_by_doubling_puffs() {
        let instance = uniform_instance(&[4], 12);
        let mut config = solver_config(&instance);
        let bab_config = BranchAndBoundConfig::default();

        let result = solve(&instance, &mut config, &bab_config);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, Some(4));
        assert_eq!(result.start_times, Some(vec![0]));
        assert!(!result.time_limit_reached);
        // puff sizes 2 and 4 leave part of the horizon off, 8 covers it
        assert!(result.nodes_count.unwrap() >= 3);
        assert_eq!(result.root_lower_bound, Some(4));
    }

    #[test]
    fn test_single_iteration_when_first_puff_covers() {
        let instance = uniform_instance(&[4], 6);
        let mut config = solver_config(&instance);
        let bab_config = BranchAndBoundConfig::default();

        let result = solve(&instance, &mut config, &bab_config);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, Some(4));
    }

    #[test]
    fn test_empty_mask_is_infeasible() {
        let instance = uniform_instance(&[2], 6);
        let mut config = SolverConfig::new(42, None, 0, Vec::new());
        config.processable_intervals = vec![false; 6];
        let bab_config = BranchAndBoundConfig::default();

        let result = solve(&instance, &mut config, &bab_config);
        assert_eq!(result.status, Status::Infeasible);
        assert_eq!(result.start_times, None);
        assert_eq!(result.objective, None);
    }

    #[test]
    fn test_gcd_coarsening_in_relaxation() {
        let instance = uniform_instance(&[4, 6], 16);
        let mut config = solver_config(&instance);
        let bab_config = BranchAndBoundConfig {
            jobs_joining_on_gcd: JobsJoiningOnGcd::Root,
            ..BranchAndBoundConfig::default()
        };

        let result = solve(&instance, &mut config, &bab_config);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, Some(10));
        assert!(result.jobs_joined_on_larger_gcd.unwrap() >= 1);
    }

    #[test]
    fn test_zero_jobs() {
        let instance = uniform_instance(&[], 6);
        let mut config = solver_config(&instance);
        let bab_config = BranchAndBoundConfig::default();

        let result = solve(&instance, &mut config, &bab_config);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, Some(0));
    }
}
