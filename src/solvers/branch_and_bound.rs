//! Exact branch-and-bound search over job orderings organized as blocks.
//!
//! A node fixes a prefix of the permutation, one processing-time class at a
//! time; every class is tried with and without a forced off-space before the
//! next fixing, which is what decides whether the next job opens a new block
//! or extends the current one. The fixed-permutation DP serves as lower
//! bound on the partial order and as exact cost at the leaves. All DP
//! mutations are undone exactly on backtrack.

use std::collections::BTreeMap;
use std::time::Duration;

use itertools::Itertools;
use rand::Rng;

use crate::algorithms::{
    BinPacker, BlockAssigner, BlockAssignment, ExactBinPacker, MinLengthDifferenceAssigner,
};
use crate::data_structures::{Block, FixedPermCostComputation, GcdTable, Instance, Job, NO_VALUE};
use crate::parallel::Workers;
use crate::stopwatch::Stopwatch;

use super::{SolveResult, SolverConfig, Status};

/// Granularity at which idle positions are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobsJoiningOnGcd {
    Off,
    /// Compute the gcd of all processing times once at the root.
    Root,
    /// Recompute the gcd of the remaining multiset at every node.
    WholeTree,
}

/// When the block-finding primal heuristic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFindingMode {
    Off,
    Root,
    WholeTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFindingStrategy {
    MinimizeLengthDifference,
}

/// Order in which the two branch types of a processing-time class are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchPriority {
    Random,
    ForcedSpace,
    JoinToPrev,
    /// Try "no forced space" first whenever the tail of the remaining blocks
    /// is long enough to host the processing time.
    DynamicByBlockFitting,
}

/// The specialized knobs of the branch-and-bound search.
#[derive(Debug, Clone)]
pub struct BranchAndBoundConfig {
    pub use_block_detection: bool,
    pub use_pack_to_blocks: bool,
    /// Pack all jobs instead of only the remaining ones.
    pub pack_to_blocks_all_jobs: bool,
    pub use_iterative_deepening: bool,
    pub block_finding: BlockFindingMode,
    pub block_finding_strategy: BlockFindingStrategy,
    pub jobs_joining_on_gcd: JobsJoiningOnGcd,
    pub branch_priority: BranchPriority,
    pub iterative_deepening_time_limit: Option<Duration>,
    /// Node budget of the full-horizon search; `None` means unlimited.
    pub nodes_count_limit: Option<i64>,
}

impl Default for BranchAndBoundConfig {
    fn default() -> Self {
        Self {
            use_block_detection: false,
            use_pack_to_blocks: false,
            pack_to_blocks_all_jobs: false,
            use_iterative_deepening: false,
            block_finding: BlockFindingMode::Off,
            block_finding_strategy: BlockFindingStrategy::MinimizeLengthDifference,
            jobs_joining_on_gcd: JobsJoiningOnGcd::Off,
            branch_priority: BranchPriority::ForcedSpace,
            iterative_deepening_time_limit: None,
            nodes_count_limit: None,
        }
    }
}

/// Hard cap on a single block-finding call, independent of the global budget.
const BLOCK_FINDING_TIME_CAP: Duration = Duration::from_secs(5);

pub struct BranchAndBound<'a> {
    instance: &'a Instance,
    solver_config: SolverConfig,
    config: &'a BranchAndBoundConfig,
    bin_packer: Box<dyn BinPacker>,
    block_assigner: Box<dyn BlockAssigner>,

    stopwatch: Stopwatch,
    block_finding_stopwatch: Stopwatch,
    block_detection_stopwatch: Stopwatch,
    pack_to_blocks_stopwatch: Stopwatch,

    status: Status,
    curr_best_obj: Option<i64>,
    curr_best_perm_proc_times: Vec<i64>,
    curr_best_perm_start_times: Vec<i64>,

    // second DP used to verify block layouts proposed by block finding
    fixed_blocks_computation: Option<FixedPermCostComputation<'a>>,

    lower_bound_total_duration: Duration,

    nodes_count: i64,
    block_detection_found_solution: i64,
    pack_to_blocks_found_solution: i64,
    jobs_joined_on_larger_gcd: i64,
    root_lower_bound: Option<i64>,
    nodes_count_limit_reached: bool,
}

impl<'a> BranchAndBound<'a> {
    pub fn new(
        instance: &'a Instance,
        solver_config: SolverConfig,
        config: &'a BranchAndBoundConfig,
    ) -> Self {
        Self {
            instance,
            solver_config,
            config,
            bin_packer: Box::new(ExactBinPacker),
            block_assigner: Box::new(MinLengthDifferenceAssigner),
            stopwatch: Stopwatch::new(),
            block_finding_stopwatch: Stopwatch::new(),
            block_detection_stopwatch: Stopwatch::new(),
            pack_to_blocks_stopwatch: Stopwatch::new(),
            status: Status::NoSolution,
            curr_best_obj: None,
            curr_best_perm_proc_times: Vec::new(),
            curr_best_perm_start_times: Vec::new(),
            fixed_blocks_computation: None,
            lower_bound_total_duration: Duration::ZERO,
            nodes_count: 0,
            block_detection_found_solution: 0,
            pack_to_blocks_found_solution: 0,
            jobs_joined_on_larger_gcd: 0,
            root_lower_bound: None,
            nodes_count_limit_reached: false,
        }
    }

    pub fn solve(&mut self) -> Status {
        self.stopwatch.start();
        self.solve_internal();
        self.stopwatch.stop();

        let limits_hit = self
            .stopwatch
            .time_limit_reached(self.solver_config.time_limit)
            || self.nodes_count_limit_reached;
        self.status = match (limits_hit, self.curr_best_obj.is_some()) {
            (true, true) => Status::Heuristic,
            (true, false) => Status::NoSolution,
            (false, true) => Status::Optimal,
            (false, false) => Status::Infeasible,
        };

        self.status
    }

    fn solve_internal(&mut self) {
        self.nodes_count_limit_reached = false;
        self.nodes_count = 0;
        self.block_detection_found_solution = 0;
        self.pack_to_blocks_found_solution = 0;
        self.jobs_joined_on_larger_gcd = 0;
        self.root_lower_bound = None;
        self.curr_best_obj = None;
        self.status = Status::NoSolution;

        let workers = Workers::new(self.solver_config.num_workers);

        let mut all_proc_times = Vec::with_capacity(self.instance.jobs.len());
        let mut remaining_proc_time_counts: BTreeMap<i64, i64> = BTreeMap::new();
        for job in &self.instance.jobs {
            all_proc_times.push(job.processing_time);
            *remaining_proc_time_counts
                .entry(job.processing_time)
                .or_insert(0) += 1;
        }

        let mut computation = FixedPermCostComputation::new(
            self.instance,
            self.solver_config.processable_intervals.clone(),
            workers.clone(),
        );

        if !self.solver_config.initial_start_times.is_empty() {
            self.seed_incumbent_from_start_times(&mut computation);
        }

        self.fixed_blocks_computation = Some(FixedPermCostComputation::new(
            self.instance,
            self.solver_config.processable_intervals.clone(),
            workers,
        ));

        let mut gcd_of_values = GcdTable::new(&all_proc_times);

        let mut curr_joined_gcd = 1;
        if self.config.jobs_joining_on_gcd != JobsJoiningOnGcd::Off
            && self.instance.total_proc_time() > 0
        {
            curr_joined_gcd = gcd_of_values.gcd(&all_proc_times);
            if curr_joined_gcd != 1 {
                self.jobs_joined_on_larger_gcd += 1;
                computation.set_proc_times(0, curr_joined_gcd);
            }
        }

        let mut fixed_proc_times_blocks: Vec<Vec<i64>> = Vec::new();
        self.enter_node(
            &mut fixed_proc_times_blocks,
            &mut remaining_proc_time_counts,
            self.instance.total_proc_time(),
            &mut computation,
            &mut gcd_of_values,
            curr_joined_gcd,
            None,
            Vec::new(),
            false,
        );

        self.lower_bound_total_duration = computation.cost_computation_total_duration();
    }

    /// Turn given start times into an initial incumbent: the implied job
    /// order is evaluated by the DP, which may improve the starts but keeps
    /// the order.
    fn seed_incumbent_from_start_times(&mut self, computation: &mut FixedPermCostComputation<'a>) {
        let proc_time_with_start: Vec<(i64, i64)> = self
            .instance
            .jobs
            .iter()
            .map(|job| {
                (
                    job.processing_time,
                    self.solver_config.initial_start_times[job.index],
                )
            })
            .sorted_by_key(|&(_, start_time)| start_time)
            .collect();

        for (position, &(proc_time, _)) in proc_time_with_start.iter().enumerate() {
            computation.join(position, proc_time as usize);
        }

        let objective = computation.recompute_cost();
        if objective == NO_VALUE {
            log::warn!("initial start times are infeasible under the current mask, ignoring them");
            computation.reset();
            return;
        }

        self.curr_best_obj = Some(objective);
        self.curr_best_perm_start_times = computation.reconstruct_start_times();
        self.curr_best_perm_proc_times = proc_time_with_start
            .iter()
            .map(|&(proc_time, _)| proc_time)
            .collect();

        computation.reset();

        log::info!("search initialized with objective {objective}");
    }

    fn stop_searching(&self) -> bool {
        self.nodes_count_limit_reached
            || self
                .stopwatch
                .time_limit_reached(self.solver_config.time_limit)
    }

    #[allow(clippy::too_many_arguments)]
    fn enter_node(
        &mut self,
        fixed_proc_times_blocks: &mut Vec<Vec<i64>>,
        remaining_proc_time_counts: &mut BTreeMap<i64, i64>,
        remaining_proc_time: i64,
        computation: &mut FixedPermCostComputation<'a>,
        gcd_of_values: &mut GcdTable,
        curr_joined_gcd: i64,
        inherited_lower_bound: Option<i64>,
        mut rem_proc_blocks_reversed: Vec<Block>,
        join_to_prev_block: bool,
    ) {
        if let Some(limit) = self.config.nodes_count_limit {
            if self.nodes_count >= limit {
                self.nodes_count_limit_reached = true;
                return;
            }
        }

        self.nodes_count += 1;
        let curr_node = self.nodes_count;

        let curr_node_lower_bound = match inherited_lower_bound {
            Some(bound) => bound,
            None => {
                let bound = computation.recompute_cost();
                if bound == NO_VALUE {
                    return; // infeasible subtree
                }
                rem_proc_blocks_reversed =
                    Block::proc_blocks(computation, fixed_proc_times_blocks.len());
                rem_proc_blocks_reversed.reverse();
                bound
            }
        };

        if curr_node == 1 {
            self.root_lower_bound = Some(curr_node_lower_bound);
        }

        if let Some(best) = self.curr_best_obj {
            if best <= curr_node_lower_bound {
                return;
            }
        }

        // Everything scheduled? The bound of a complete order is its exact
        // cost.
        if remaining_proc_time == 0 {
            if self
                .curr_best_obj
                .map_or(true, |best| curr_node_lower_bound < best)
            {
                self.curr_best_obj = Some(curr_node_lower_bound);
                self.curr_best_perm_proc_times = flatten(fixed_proc_times_blocks);
                self.curr_best_perm_start_times = start_times_from_block_proc_times(
                    &computation.reconstruct_start_times(),
                    fixed_proc_times_blocks,
                );
                log::info!(
                    "new incumbent (leaf): {}, time {} ms",
                    curr_node_lower_bound,
                    self.stopwatch.total_duration().as_millis()
                );
            }

            return;
        }

        // Primal heuristics; pointless on an inherited bound, the DP state
        // has not changed since the parent ran them.
        if inherited_lower_bound.is_none() {
            if self.config.use_block_detection
                && self.perform_block_detection(
                    fixed_proc_times_blocks,
                    remaining_proc_time_counts,
                    remaining_proc_time,
                    computation,
                )
            {
                return;
            }

            if self.config.use_pack_to_blocks
                && self.perform_pack_to_blocks(
                    fixed_proc_times_blocks,
                    remaining_proc_time_counts,
                    computation,
                )
            {
                return;
            }

            let run_block_finding = match self.config.block_finding {
                BlockFindingMode::Off => false,
                BlockFindingMode::Root => curr_node == 1,
                BlockFindingMode::WholeTree => true,
            };
            if run_block_finding && self.perform_block_finding(computation) {
                return;
            }
        }

        // Branching over the unused processing-time classes.
        let proc_time_classes: Vec<i64> = remaining_proc_time_counts.keys().copied().collect();
        for proc_time in proc_time_classes {
            if remaining_proc_time_counts[&proc_time] == 0 {
                continue;
            }

            if join_to_prev_block {
                let last_fixed = *fixed_proc_times_blocks
                    .last()
                    .and_then(|block| block.last())
                    .expect("a joined node has a fixed block");
                if last_fixed > proc_time {
                    // only non-decreasing proc times inside a block
                    continue;
                }
            }

            let random_branch_type: i64 = self.solver_config.rng.gen_range(0..=1);
            for branch_type in 0..=1 {
                let forced_space = match self.config.branch_priority {
                    BranchPriority::Random => random_branch_type == branch_type,
                    BranchPriority::ForcedSpace => branch_type == 0,
                    BranchPriority::JoinToPrev => branch_type != 0,
                    BranchPriority::DynamicByBlockFitting => {
                        let tail_fits = rem_proc_blocks_reversed
                            .last()
                            .map_or(false, |block| block.length() >= proc_time);
                        if tail_fits {
                            branch_type == 1
                        } else {
                            branch_type == 0
                        }
                    }
                };

                // Fix the processing time.
                if join_to_prev_block {
                    fixed_proc_times_blocks
                        .last_mut()
                        .expect("a joined node has a fixed block")
                        .push(proc_time);
                } else {
                    fixed_proc_times_blocks.push(vec![proc_time]);
                }
                *remaining_proc_time_counts.get_mut(&proc_time).expect("class exists") -= 1;
                let new_remaining_proc_time = remaining_proc_time - proc_time;

                let last_block_position = fixed_proc_times_blocks.len() - 1;
                if join_to_prev_block {
                    computation.join(
                        last_block_position,
                        1 + (proc_time / curr_joined_gcd) as usize,
                    );
                } else {
                    computation.join(last_block_position, (proc_time / curr_joined_gcd) as usize);
                }
                computation.set_forced_space(last_block_position, i64::from(forced_space));

                let mut new_joined_gcd = curr_joined_gcd;
                if self.config.jobs_joining_on_gcd == JobsJoiningOnGcd::WholeTree
                    && new_remaining_proc_time > 0
                {
                    let remaining_proc_times: Vec<i64> = remaining_proc_time_counts
                        .iter()
                        .flat_map(|(&pt, &count)| std::iter::repeat(pt).take(count as usize))
                        .collect();
                    new_joined_gcd = gcd_of_values.gcd(&remaining_proc_times);
                    if new_joined_gcd != curr_joined_gcd {
                        if new_joined_gcd > curr_joined_gcd {
                            self.jobs_joined_on_larger_gcd += 1;
                        }
                        computation.set_proc_times(fixed_proc_times_blocks.len(), new_joined_gcd);
                    }
                }

                // Lower bound inheritance: absorbing the proc time into the
                // tail of the remaining blocks leaves the relaxation's cost
                // unchanged. Never when forcing a space.
                let mut child_inherited_lower_bound = None;
                let mut child_rem_proc_blocks_reversed = Vec::new();
                if !forced_space {
                    if let Some(tail) = rem_proc_blocks_reversed.last() {
                        if tail.length() >= proc_time {
                            child_inherited_lower_bound = Some(curr_node_lower_bound);
                            child_rem_proc_blocks_reversed = rem_proc_blocks_reversed.clone();
                            let tail = child_rem_proc_blocks_reversed
                                .last_mut()
                                .expect("cloned non-empty");
                            tail.start += proc_time;
                            if tail.length() == 0 {
                                child_rem_proc_blocks_reversed.pop();
                            }
                        }
                    }
                }

                self.enter_node(
                    fixed_proc_times_blocks,
                    remaining_proc_time_counts,
                    new_remaining_proc_time,
                    computation,
                    gcd_of_values,
                    new_joined_gcd,
                    child_inherited_lower_bound,
                    child_rem_proc_blocks_reversed,
                    !forced_space,
                );

                // Undo the gcd coarsening.
                if self.config.jobs_joining_on_gcd == JobsJoiningOnGcd::WholeTree
                    && new_remaining_proc_time > 0
                    && new_joined_gcd != curr_joined_gcd
                {
                    computation.set_proc_times(fixed_proc_times_blocks.len(), curr_joined_gcd);
                }

                // Undo the forced space; the boundary before the last block
                // returns to its pre-branch state.
                computation.set_forced_space(fixed_proc_times_blocks.len() - 1, 0);
                if fixed_proc_times_blocks.len() >= 2 {
                    computation.set_forced_space(
                        fixed_proc_times_blocks.len() - 2,
                        i64::from(!join_to_prev_block),
                    );
                }

                // Undo the join.
                if join_to_prev_block {
                    let last_block_total: i64 = fixed_proc_times_blocks
                        .last()
                        .expect("a joined node has a fixed block")
                        .iter()
                        .sum();
                    let mut splits = vec![last_block_total - proc_time];
                    splits.extend(
                        std::iter::repeat(curr_joined_gcd)
                            .take((proc_time / curr_joined_gcd) as usize),
                    );
                    computation.split_into(fixed_proc_times_blocks.len() - 1, &splits);
                } else {
                    computation.split(
                        fixed_proc_times_blocks.len() - 1,
                        (proc_time / curr_joined_gcd) as usize,
                    );
                }

                *remaining_proc_time_counts.get_mut(&proc_time).expect("class exists") += 1;
                if join_to_prev_block {
                    fixed_proc_times_blocks
                        .last_mut()
                        .expect("a joined node has a fixed block")
                        .pop();
                } else {
                    fixed_proc_times_blocks.pop();
                }

                // An incumbent found in the subtree may close this node.
                if let Some(best) = self.curr_best_obj {
                    if best <= curr_node_lower_bound {
                        return;
                    }
                }

                if self.stop_searching() {
                    return;
                }
            }
        }
    }

    /// Block detection: if the relaxed schedule squeezes all remaining
    /// positions into a span of exactly the remaining processing time, the
    /// remaining jobs pack into that single span and the bound is attained.
    fn perform_block_detection(
        &mut self,
        fixed_proc_times_blocks: &[Vec<i64>],
        remaining_proc_time_counts: &BTreeMap<i64, i64>,
        remaining_proc_time: i64,
        computation: &mut FixedPermCostComputation<'a>,
    ) -> bool {
        self.block_detection_stopwatch.start();

        let opt_cost = computation.recompute_cost();
        if let Some(best) = self.curr_best_obj {
            if best <= opt_cost {
                self.block_detection_stopwatch.stop();
                return false;
            }
        }

        let start_times = computation.reconstruct_start_times();
        let block_start = start_times[fixed_proc_times_blocks.len()];
        let block_completion = start_times.last().expect("positions remain")
            + computation.perm_proc_times().last().expect("positions remain");

        let mut block_detected = false;
        if block_completion - block_start == remaining_proc_time {
            block_detected = true;

            if self.curr_best_obj.map_or(true, |best| opt_cost < best) {
                self.curr_best_obj = Some(opt_cost);
                self.curr_best_perm_proc_times = flatten(fixed_proc_times_blocks);
                self.curr_best_perm_start_times =
                    start_times_from_block_proc_times(&start_times, fixed_proc_times_blocks);

                let mut next_start_time = block_start;
                for (&proc_time, &count) in remaining_proc_time_counts {
                    for _ in 0..count {
                        self.curr_best_perm_start_times.push(next_start_time);
                        self.curr_best_perm_proc_times.push(proc_time);
                        next_start_time += proc_time;
                    }
                }

                log::info!(
                    "new incumbent (block detection): {}, time {} ms",
                    opt_cost,
                    self.stopwatch.total_duration().as_millis()
                );
                self.block_detection_found_solution += 1;
            }
        }

        self.block_detection_stopwatch.stop();
        block_detected
    }

    /// Pack the (remaining or all) processing times into the current merged
    /// processable blocks; a feasible packing attains the bound.
    fn perform_pack_to_blocks(
        &mut self,
        fixed_proc_times_blocks: &[Vec<i64>],
        remaining_proc_time_counts: &BTreeMap<i64, i64>,
        computation: &mut FixedPermCostComputation<'a>,
    ) -> bool {
        self.pack_to_blocks_stopwatch.start();

        let opt_cost = computation.recompute_cost();
        if let Some(best) = self.curr_best_obj {
            if best <= opt_cost {
                self.pack_to_blocks_stopwatch.stop();
                return false;
            }
        }

        let from_position = if self.config.pack_to_blocks_all_jobs {
            0
        } else {
            fixed_proc_times_blocks.len()
        };
        let blocks = Block::proc_blocks(computation, from_position);
        let bin_capacities: Vec<i64> = blocks.iter().map(Block::length).collect();

        let item_sizes: Vec<i64> = if self.config.pack_to_blocks_all_jobs {
            self.instance
                .jobs
                .iter()
                .map(|job| job.processing_time)
                .collect()
        } else {
            remaining_proc_time_counts
                .iter()
                .flat_map(|(&proc_time, &count)| {
                    std::iter::repeat(proc_time).take(count as usize)
                })
                .collect()
        };

        let time_limit = self.stopwatch.remaining_time(self.solver_config.time_limit);
        let Some(assignment) = self.bin_packer.pack(&bin_capacities, &item_sizes, time_limit)
        else {
            self.pack_to_blocks_stopwatch.stop();
            return false;
        };

        self.pack_to_blocks_found_solution += 1;
        self.curr_best_obj = Some(opt_cost);

        let mut block_next_starts: Vec<i64> = blocks.iter().map(|block| block.start).collect();
        let mut proc_time_with_start: Vec<(i64, i64)> = Vec::with_capacity(item_sizes.len());
        for (item, &bin) in assignment.iter().enumerate() {
            let start_time = block_next_starts[bin];
            proc_time_with_start.push((item_sizes[item], start_time));
            block_next_starts[bin] = start_time + item_sizes[item];
        }
        proc_time_with_start.sort_by_key(|&(_, start_time)| start_time);

        self.curr_best_perm_proc_times = Vec::new();
        self.curr_best_perm_start_times = Vec::new();
        if !self.config.pack_to_blocks_all_jobs {
            self.curr_best_perm_proc_times = flatten(fixed_proc_times_blocks);
            self.curr_best_perm_start_times = start_times_from_block_proc_times(
                &computation.reconstruct_start_times(),
                fixed_proc_times_blocks,
            );
        }
        for (proc_time, start_time) in proc_time_with_start {
            self.curr_best_perm_proc_times.push(proc_time);
            self.curr_best_perm_start_times.push(start_time);
        }

        log::info!(
            "new incumbent (pack to blocks): {}, time {} ms",
            opt_cost,
            self.stopwatch.total_duration().as_millis()
        );

        self.pack_to_blocks_stopwatch.stop();
        true
    }

    /// Block finding: assign every job to one of the relaxed blocks, check
    /// the proposed layout with the second DP and take it as incumbent if it
    /// improves. When the assignment reproduces the relaxed blocks exactly,
    /// the bound is tight and the node is done.
    fn perform_block_finding(&mut self, computation: &mut FixedPermCostComputation<'a>) -> bool {
        self.block_finding_stopwatch.start();

        let relaxed_blocks = Block::proc_blocks(computation, 0);
        let block_lengths: Vec<i64> = relaxed_blocks.iter().map(Block::length).collect();
        let proc_times: Vec<i64> = self
            .instance
            .jobs
            .iter()
            .map(|job| job.processing_time)
            .collect();

        let time_limit = Some(
            self.stopwatch
                .remaining_time(self.solver_config.time_limit)
                .map_or(BLOCK_FINDING_TIME_CAP, |remaining| {
                    remaining.min(BLOCK_FINDING_TIME_CAP)
                }),
        );

        let BlockFindingStrategy::MinimizeLengthDifference = self.config.block_finding_strategy;
        let Some(BlockAssignment {
            assignments,
            same_as_blocks,
        }) = self
            .block_assigner
            .assign(&proc_times, &block_lengths, time_limit)
        else {
            self.block_finding_stopwatch.stop();
            return false;
        };

        // Evaluate the proposed layout.
        let mut new_block_lengths: Vec<i64> = Vec::new();
        for (job_idx, &block_idx) in assignments.iter().enumerate() {
            if new_block_lengths.len() <= block_idx {
                new_block_lengths.resize(block_idx + 1, 0);
            }
            new_block_lengths[block_idx] += self.instance.jobs[job_idx].processing_time;
        }

        let check_computation = self
            .fixed_blocks_computation
            .as_mut()
            .expect("created at solve start");
        check_computation.reset();
        for (position, &length) in new_block_lengths.iter().enumerate() {
            check_computation.join(position, length as usize);
        }
        let new_upper_bound = check_computation.recompute_cost();

        if new_upper_bound != NO_VALUE
            && self.curr_best_obj.map_or(true, |best| best > new_upper_bound)
        {
            self.curr_best_obj = Some(new_upper_bound);

            let mut new_block_start_times = check_computation.reconstruct_start_times();

            let mut proc_time_with_start: Vec<(i64, i64)> =
                Vec::with_capacity(assignments.len());
            for (job_idx, &block_idx) in assignments.iter().enumerate() {
                let proc_time = self.instance.jobs[job_idx].processing_time;
                let start_time = new_block_start_times[block_idx];
                proc_time_with_start.push((proc_time, start_time));
                new_block_start_times[block_idx] = start_time + proc_time;
            }
            proc_time_with_start.sort_by_key(|&(_, start_time)| start_time);

            self.curr_best_perm_proc_times = Vec::with_capacity(proc_time_with_start.len());
            self.curr_best_perm_start_times = Vec::with_capacity(proc_time_with_start.len());
            for (proc_time, start_time) in proc_time_with_start {
                self.curr_best_perm_proc_times.push(proc_time);
                self.curr_best_perm_start_times.push(start_time);
            }

            log::info!(
                "new incumbent (block finding): {}, time {} ms",
                new_upper_bound,
                self.stopwatch.total_duration().as_millis()
            );

            if same_as_blocks {
                self.block_finding_stopwatch.stop();
                return true;
            }
        }

        self.block_finding_stopwatch.stop();
        false
    }

    /// Map the incumbent permutation back to per-job start times. Jobs of
    /// equal processing time are interchangeable, so any pairing inside a
    /// class is valid.
    pub fn start_times(&self) -> Option<Vec<i64>> {
        self.curr_best_obj?;

        let mut jobs_by_proc_time: BTreeMap<i64, Vec<&Job>> = BTreeMap::new();
        for job in &self.instance.jobs {
            jobs_by_proc_time
                .entry(job.processing_time)
                .or_default()
                .push(job);
        }

        let mut start_times = vec![NO_VALUE; self.instance.jobs.len()];
        for (position, &proc_time) in self.curr_best_perm_proc_times.iter().enumerate() {
            let job = jobs_by_proc_time
                .get_mut(&proc_time)
                .and_then(Vec::pop)
                .expect("incumbent permutation matches the job multiset");
            start_times[job.index] = self.curr_best_perm_start_times[position];
        }

        Some(start_times)
    }

    pub fn result(&self) -> SolveResult {
        SolveResult {
            status: self.status,
            objective: self.curr_best_obj,
            time_limit_reached: self
                .stopwatch
                .time_limit_reached(self.solver_config.time_limit),
            start_times: self.start_times(),
            nodes_count: Some(self.nodes_count),
            block_detection_found_solution: Some(self.block_detection_found_solution),
            pack_to_blocks_found_solution: Some(self.pack_to_blocks_found_solution),
            jobs_joined_on_larger_gcd: Some(self.jobs_joined_on_larger_gcd),
            root_lower_bound: self.root_lower_bound,
            lower_bound_total_duration: Some(self.lower_bound_total_duration),
            block_detection_total_duration: Some(self.block_detection_stopwatch.total_duration()),
            pack_to_blocks_total_duration: Some(self.pack_to_blocks_stopwatch.total_duration()),
            block_finding_total_duration: Some(self.block_finding_stopwatch.total_duration()),
        }
    }
}

fn flatten(blocks: &[Vec<i64>]) -> Vec<i64> {
    blocks.iter().flatten().copied().collect()
}

/// Expand per-block start times into per-position start times by walking the
/// processing times inside each block.
fn start_times_from_block_proc_times(
    block_start_times: &[i64],
    proc_time_blocks: &[Vec<i64>],
) -> Vec<i64> {
    let mut start_times = Vec::new();
    for (block_idx, proc_times_block) in proc_time_blocks.iter().enumerate() {
        let mut next_start_time = block_start_times[block_idx];
        for &proc_time in proc_times_block {
            start_times.push(next_start_time);
            next_start_time += proc_time;
        }
    }

    start_times
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

    /// Recompute the objective of a result independently (the order given by
    /// the start times, evaluated by a fresh DP).
    fn recomputed_objective(instance: &Instance, start_times: &[i64]) -> i64 {
        let proc_times: Vec<i64> = instance
            .jobs
            .iter()
            .map(|job| (job.processing_time, start_times[job.index]))
            .sorted_by_key(|&(_, start_time)| start_time)
            .map(|(proc_time, _)| proc_time)
            .collect();

        let mut computation = FixedPermCostComputation::new(
            instance,
            vec![true; instance.num_intervals()],
            Workers::sequential(),
        );
        for (position, &proc_time) in proc_times.iter().enumerate() {
            computation.join(position, proc_time as usize);
        }
        computation.recompute_cost()
    }

    #[test]
    fn test_single_job() {
        let instance = uniform_instance(&[3], 10);
        let config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(3));
        assert_eq!(result.start_times, Some(vec![0]));
        assert_eq!(result.root_lower_bound, Some(3));
        assert!(!result.time_limit_reached);
    }

    #[test]
    fn test_equal_proc_times_explore_one_ordering() {
        let instance = uniform_instance(&[2, 2], 10);
        let config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(4));
        // the {2, 2} multiset is one class: root, its forced-space child and
        // the leaf, everything else is pruned by the matching bound
        assert_eq!(result.nodes_count, Some(3));

        let start_times = result.start_times.unwrap();
        assert_eq!(
            recomputed_objective(&instance, &start_times),
            result.objective.unwrap()
        );
    }

    #[test]
    fn test_join_to_prev_priority_finds_same_objective() {
        let instance = uniform_instance(&[2, 2], 10);
        let config = BranchAndBoundConfig {
            branch_priority: BranchPriority::JoinToPrev,
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        assert_eq!(solver.result().objective, Some(4));
    }

    #[test]
    fn test_two_jobs_distinct_proc_times() {
        let instance = uniform_instance(&[2, 3], 12);
        let config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(5));

        let start_times = result.start_times.unwrap();
        assert_eq!(start_times.len(), 2);
        assert_eq!(
            recomputed_objective(&instance, &start_times),
            result.objective.unwrap()
        );
    }

    #[test]
    fn test_root_gcd_coarsening() {
        let instance = uniform_instance(&[4, 6, 8], 20);
        let config = BranchAndBoundConfig {
            jobs_joining_on_gcd: JobsJoiningOnGcd::Root,
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(18));
        assert!(result.jobs_joined_on_larger_gcd.unwrap() >= 1);

        let start_times = result.start_times.unwrap();
        assert_eq!(
            recomputed_objective(&instance, &start_times),
            result.objective.unwrap()
        );
    }

    #[test]
    fn test_whole_tree_gcd_matches_off_on_equal_proc_times() {
        let instance = uniform_instance(&[2, 2, 2], 12);

        let mut objectives = Vec::new();
        for jobs_joining_on_gcd in [JobsJoiningOnGcd::Off, JobsJoiningOnGcd::WholeTree] {
            let config = BranchAndBoundConfig {
                jobs_joining_on_gcd,
                ..BranchAndBoundConfig::default()
            };
            let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);
            assert_eq!(solver.solve(), Status::Optimal);
            objectives.push(solver.result().objective);
        }

        assert_eq!(objectives[0], Some(6));
        assert_eq!(objectives[0], objectives[1]);
    }

    #[test]
    fn test_random_priority_is_reproducible() {
        let instance = uniform_instance(&[2, 3, 2], 16);
        let config = BranchAndBoundConfig {
            branch_priority: BranchPriority::Random,
            ..BranchAndBoundConfig::default()
        };

        let mut results = Vec::new();
        for _ in 0..2 {
            let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);
            solver.solve();
            results.push(solver.result());
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(results[0].status, Status::Optimal);
        assert_eq!(results[0].objective, Some(7));
    }

    #[test]
    fn test_block_detection_fires_at_root() {
        let instance = uniform_instance(&[2, 3], 10);
        let config = BranchAndBoundConfig {
            use_block_detection: true,
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(5));
        assert_eq!(result.block_detection_found_solution, Some(1));
        // the relaxed root schedule is one contiguous span, so the heuristic
        // settles the whole search at the root
        assert_eq!(result.nodes_count, Some(1));

        let start_times = result.start_times.unwrap();
        assert_eq!(start_times, vec![0, 2]);
        assert_eq!(recomputed_objective(&instance, &start_times), 5);
    }

    #[test]
    fn test_pack_to_blocks_fires_at_root() {
        let instance = uniform_instance(&[2, 3], 10);
        let config = BranchAndBoundConfig {
            use_pack_to_blocks: true,
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(5));
        assert_eq!(result.pack_to_blocks_found_solution, Some(1));

        let start_times = result.start_times.unwrap();
        assert_eq!(recomputed_objective(&instance, &start_times), 5);
    }

    #[test]
    fn test_block_finding_at_root_confirms_relaxed_blocks() {
        let instance = uniform_instance(&[2, 3], 10);
        let config = BranchAndBoundConfig {
            block_finding: BlockFindingMode::Root,
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(5));
        // the relaxed layout is a single block of length 5, which the
        // assignment reproduces exactly
        assert_eq!(result.nodes_count, Some(1));
    }

    #[test]
    fn test_zero_jobs_is_optimal_with_empty_schedule() {
        let instance = uniform_instance(&[], 6);
        let config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::Optimal);
        let result = solver.result();
        assert_eq!(result.objective, Some(0));
        assert_eq!(result.start_times, Some(Vec::new()));
    }

    #[test]
    fn test_tight_mask_forces_unique_start() {
        let instance = uniform_instance(&[3], 10);
        let bab_config = BranchAndBoundConfig::default();

        // a window of exactly the processing time leaves one start
        let mut config = SolverConfig::new(42, None, 0, Vec::new());
        config.processable_intervals = (0..10).map(|idx| (2..5).contains(&idx)).collect();
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);
        assert_eq!(solver.solve(), Status::Optimal);
        assert_eq!(solver.result().start_times, Some(vec![2]));

        // any narrower window is infeasible
        let mut config = SolverConfig::new(42, None, 0, Vec::new());
        config.processable_intervals = (0..10).map(|idx| (2..4).contains(&idx)).collect();
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);
        assert_eq!(solver.solve(), Status::Infeasible);
    }

    #[test]
    fn test_infeasible_mask() {
        let instance = uniform_instance(&[2], 6);
        let mut config = SolverConfig::new(42, None, 0, Vec::new());
        config.processable_intervals = vec![false; 6];
        let bab_config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);

        assert_eq!(solver.solve(), Status::Infeasible);
        let result = solver.result();
        assert_eq!(result.objective, None);
        assert_eq!(result.start_times, None);
        assert!(!result.time_limit_reached);
    }

    #[test]
    fn test_nodes_count_limit_zero_without_warm_start() {
        let instance = uniform_instance(&[2], 10);
        let config = BranchAndBoundConfig {
            nodes_count_limit: Some(0),
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, solver_config(&instance), &config);

        assert_eq!(solver.solve(), Status::NoSolution);
        assert_eq!(solver.result().nodes_count, Some(0));
    }

    #[test]
    fn test_nodes_count_limit_zero_with_warm_start() {
        let instance = uniform_instance(&[2], 10);
        let mut config = SolverConfig::new(42, None, 0, vec![4]);
        config.processable_intervals = vec![true; 10];
        let bab_config = BranchAndBoundConfig {
            nodes_count_limit: Some(0),
            ..BranchAndBoundConfig::default()
        };
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);

        assert_eq!(solver.solve(), Status::Heuristic);
        let result = solver.result();
        assert_eq!(result.objective, Some(2));
        assert!(result.start_times.is_some());
    }

    #[test]
    fn test_warm_start_from_initial_start_times() {
        let instance = uniform_instance(&[2, 3], 12);
        let mut config = SolverConfig::new(42, None, 0, vec![5, 0]);
        config.processable_intervals = vec![true; 12];
        let bab_config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);

        assert_eq!(solver.solve(), Status::Optimal);
        assert_eq!(solver.result().objective, Some(5));
    }

    #[test]
    fn test_infeasible_warm_start_is_ignored() {
        let instance = uniform_instance(&[2], 6);
        let mut config = SolverConfig::new(42, None, 0, vec![0]);
        config.processable_intervals = vec![false; 6];
        let bab_config = BranchAndBoundConfig::default();
        let mut solver = BranchAndBound::new(&instance, config, &bab_config);

        assert_eq!(solver.solve(), Status::Infeasible);
    }

    #[test]
    fn test_branch_undo_restores_computation_state() {
        let instance = uniform_instance(&[2, 3], 10);
        let mut computation = FixedPermCostComputation::new(
            &instance,
            vec![true; instance.num_intervals()],
            Workers::sequential(),
        );
        // fixed prefix: one block holding proc time 2
        computation.join(0, 2);
        computation.recompute_cost();

        let proc_times_before = computation.perm_proc_times().to_vec();
        let levels_before = computation.perm_levels().to_vec();
        let forced_spaces_before = computation.perm_forced_spaces().to_vec();

        // branch: join proc time 3 into the block, then backtrack
        computation.join(0, 1 + 3);
        computation.set_forced_space(0, 1);
        computation.set_forced_space(0, 0);
        computation.split_into(0, &[2, 1, 1, 1]);

        assert_eq!(computation.perm_proc_times(), proc_times_before);
        assert_eq!(computation.perm_levels(), levels_before);
        assert_eq!(computation.perm_forced_spaces(), forced_spaces_before);
        assert_eq!(computation.recompute_cost(), 5);
    }
}
