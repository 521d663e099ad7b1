use std::time::Duration;

use rayon::prelude::*;

use crate::parallel::Workers;
use crate::stopwatch::Stopwatch;

use super::{Instance, Matrix, NO_VALUE};

/// Dynamic program computing the optimal cost of a fixed permutation of
/// processing-time positions.
///
/// The permutation starts as one position per unit of total processing time
/// and is coarsened and refined in place by [join](Self::join) /
/// [split](Self::split) and friends; the search drives these mutations and
/// undoes them exactly on backtrack. Costs are kept per (level, start
/// interval), where a level is the total processing time scheduled before the
/// position, and stay valid up to the first mutated position, so a
/// recomputation resumes where the last one left off.
///
/// Infeasibility is a value: [recompute_cost](Self::recompute_cost) returns
/// [NO_VALUE] instead of failing.
pub struct FixedPermCostComputation<'a> {
    total_proc_time: i64,

    opt_cost: i64,
    last_level_opt_start: i64,
    opt_path: Matrix<i64>,
    costs_on_levels: Matrix<i64>,
    perm_proc_times: Vec<i64>,
    perm_levels: Vec<i64>,
    // indexed by position, fixed length (never resized by join/split)
    perm_forced_spaces: Vec<i64>,
    // length of the maximal processable run starting at each interval
    max_processable_intervals: Vec<i64>,
    // highest level/position for which costs_on_levels is still consistent
    costs_valid_level: i64,
    costs_valid_position: i64,

    num_intervals: i64,
    earliest_on_interval_idx: i64,
    latest_on_interval_idx: i64,

    opt_switching_costs: &'a Matrix<i64>,
    // transposed for column-stride access in the transition sweep
    opt_switching_costs_trans: Matrix<i64>,
    // [proc_time][start] = cumulative on-energy of running proc_time
    // intervals from start
    cumul_on_energy_cost_per_proc_time: Matrix<i64>,
    processable_intervals: Vec<bool>,

    workers: Workers,
    stopwatch: Stopwatch,
}

impl<'a> FixedPermCostComputation<'a> {
    pub fn new(instance: &'a Instance, processable_intervals: Vec<bool>, workers: Workers) -> Self {
        let total_proc_time = instance.total_proc_time();
        let num_intervals = instance.num_intervals();
        assert_eq!(processable_intervals.len(), num_intervals);

        let opt_switching_costs = &instance.optimal_switching_costs;
        let rows = opt_switching_costs.num_rows();
        let cols = opt_switching_costs.num_cols();
        let mut opt_switching_costs_trans = Matrix::new_filled(cols, rows, NO_VALUE);
        for row in 0..rows {
            for col in 0..cols {
                opt_switching_costs_trans[(col, row)] = opt_switching_costs[(row, col)];
            }
        }

        let mut cumul_on_energy_cost_per_proc_time =
            Matrix::new_filled(total_proc_time as usize + 1, num_intervals, NO_VALUE);
        for proc_time in 1..=total_proc_time as usize {
            for start in 0..num_intervals {
                let end = start + proc_time - 1;
                if end >= num_intervals {
                    continue;
                }
                cumul_on_energy_cost_per_proc_time[(proc_time, start)] =
                    instance.cumulative_energy_cost[(start, end)] * instance.on_power_consumption;
            }
        }

        let mut computation = Self {
            total_proc_time,
            opt_cost: NO_VALUE,
            last_level_opt_start: NO_VALUE,
            opt_path: Matrix::new_filled(total_proc_time as usize, num_intervals, NO_VALUE),
            costs_on_levels: Matrix::new_filled(total_proc_time as usize, num_intervals, NO_VALUE),
            perm_proc_times: Vec::new(),
            perm_levels: Vec::new(),
            perm_forced_spaces: Vec::new(),
            max_processable_intervals: Vec::new(),
            costs_valid_level: -1,
            costs_valid_position: -1,
            num_intervals: num_intervals as i64,
            earliest_on_interval_idx: instance.earliest_on_interval_idx as i64,
            latest_on_interval_idx: instance.latest_on_interval_idx as i64,
            opt_switching_costs,
            opt_switching_costs_trans,
            cumul_on_energy_cost_per_proc_time,
            processable_intervals,
            workers,
            stopwatch: Stopwatch::new(),
        };
        computation.reset();
        computation
    }

    /// Back to the unit-granular baseline: one position per processing-time
    /// unit, no forced spaces.
    pub fn reset(&mut self) {
        self.perm_proc_times = vec![1; self.total_proc_time as usize];
        self.perm_levels = (0..self.total_proc_time).collect();
        self.perm_forced_spaces = vec![0; self.total_proc_time as usize];

        self.max_processable_intervals = vec![0; self.num_intervals as usize];
        let mut from_idx = 0;
        while let Some(run_start) = self.find_next_processable_interval(from_idx) {
            let mut run_end = run_start;
            while run_end < self.processable_intervals.len() && self.processable_intervals[run_end]
            {
                run_end += 1;
            }

            for idx in run_start..run_end {
                self.max_processable_intervals[idx] = (run_end - idx) as i64;
            }

            from_idx = run_end + 1;
        }

        self.invalidate_costs(0);
    }

    fn find_next_processable_interval(&self, from_idx: usize) -> Option<usize> {
        (from_idx..self.processable_intervals.len()).find(|&idx| self.processable_intervals[idx])
    }

    /// Replace positions `[from_position, from_position + positions_count)`
    /// by a single position carrying their summed processing time.
    pub fn join(&mut self, from_position: usize, positions_count: usize) {
        let joined: i64 = self.perm_proc_times[from_position..from_position + positions_count]
            .iter()
            .sum();
        self.perm_proc_times[from_position] = joined;
        self.perm_proc_times
            .drain(from_position + 1..from_position + positions_count);
        self.perm_levels
            .drain(from_position + 1..from_position + positions_count);

        self.invalidate_costs(from_position);
    }

    /// Inverse of [join](Self::join): split the position into
    /// `positions_count` equal parts.
    pub fn split(&mut self, from_position: usize, positions_count: usize) {
        let split_proc_time = self.perm_proc_times[from_position] / positions_count as i64;

        let base_level = if from_position == 0 {
            0
        } else {
            self.perm_levels[from_position]
        };
        self.perm_proc_times.splice(
            from_position..from_position + 1,
            std::iter::repeat(split_proc_time).take(positions_count),
        );
        self.perm_levels.splice(
            from_position..from_position + 1,
            (0..positions_count as i64).map(|i| base_level + i * split_proc_time),
        );

        self.invalidate_costs(from_position);
    }

    /// Split the position into parts with the given processing times.
    pub fn split_into(&mut self, from_position: usize, proc_times: &[i64]) {
        let base_level = if from_position == 0 {
            0
        } else {
            self.perm_levels[from_position]
        };
        let mut curr_level = base_level;
        let mut levels = Vec::with_capacity(proc_times.len());
        for &proc_time in proc_times {
            levels.push(curr_level);
            curr_level += proc_time;
        }

        self.perm_proc_times
            .splice(from_position..from_position + 1, proc_times.iter().copied());
        self.perm_levels.splice(from_position..from_position + 1, levels);

        self.invalidate_costs(from_position);
    }

    /// From `from_position` onward, collapse the tail into positions of
    /// `proc_time` each, covering the remaining total processing time.
    pub fn set_proc_times(&mut self, from_position: usize, proc_time: i64) {
        let base_level = if from_position == 0 {
            0
        } else {
            self.perm_levels[from_position]
        };
        let num_new_positions = ((self.total_proc_time - base_level) / proc_time) as usize;

        self.perm_proc_times.truncate(from_position);
        self.perm_proc_times
            .resize(from_position + num_new_positions, proc_time);

        self.perm_levels.truncate(from_position);
        for i in 0..num_new_positions as i64 {
            self.perm_levels.push(base_level + i * proc_time);
        }

        self.invalidate_costs(from_position);
    }

    /// Minimum number of off-intervals required between this position and the
    /// next.
    pub fn set_forced_space(&mut self, position: usize, space: i64) {
        self.perm_forced_spaces[position] = space;
        self.invalidate_costs(position);
    }

    /// Drop cached DP rows at or above the level of `from_position`.
    pub fn invalidate_costs(&mut self, from_position: usize) {
        if from_position == 0 {
            self.costs_valid_level = -1;
            self.costs_valid_position = -1;
        } else if self.perm_levels[from_position - 1] < self.costs_valid_level {
            self.costs_valid_level = self.perm_levels[from_position - 1];
            self.costs_valid_position = from_position as i64 - 1;
        }

        self.opt_cost = NO_VALUE;
    }

    pub fn perm_proc_times(&self) -> &[i64] {
        &self.perm_proc_times
    }

    pub fn perm_levels(&self) -> &[i64] {
        &self.perm_levels
    }

    pub fn perm_forced_spaces(&self) -> &[i64] {
        &self.perm_forced_spaces
    }

    pub fn total_proc_time(&self) -> i64 {
        self.total_proc_time
    }

    pub fn has_opt_cost(&mut self) -> bool {
        self.recompute_cost() != NO_VALUE
    }

    /// Time spent inside [recompute_cost](Self::recompute_cost) so far.
    pub fn cost_computation_total_duration(&self) -> Duration {
        self.stopwatch.total_duration()
    }

    /// Recompute the optimal cost, resuming from the last level whose cached
    /// row is still valid. Returns [NO_VALUE] if no feasible schedule exists.
    pub fn recompute_cost(&mut self) -> i64 {
        if self.opt_cost != NO_VALUE {
            return self.opt_cost;
        }

        self.stopwatch.start();

        if self.total_proc_time == 0 {
            // The machine never switches on; the initial off state bridges
            // the whole horizon.
            self.opt_cost = self.never_on_cost();
            self.last_level_opt_start = NO_VALUE;
            self.stopwatch.stop();
            return self.opt_cost;
        }

        let mut curr_level = if self.costs_valid_level < 0 {
            0
        } else {
            self.costs_valid_level + self.perm_proc_times[self.costs_valid_position as usize]
        };

        // From the initial off state.
        if curr_level == 0 {
            let curr_proc_time = self.perm_proc_times[0];
            let min_start = self.earliest_on_interval_idx;
            let max_start = self.latest_on_interval_idx - self.total_proc_time + 1;

            self.costs_on_levels.row_mut(0).fill(NO_VALUE);
            let mut curr_start = min_start;
            while curr_start <= max_start {
                let switching_cost = self.opt_switching_costs[(1, curr_start as usize)];
                self.costs_on_levels[(0, curr_start as usize)] = if switching_cost == NO_VALUE {
                    NO_VALUE
                } else {
                    switching_cost
                        + self.cumul_on_energy_cost_per_proc_time
                            [(curr_proc_time as usize, curr_start as usize)]
                };
                curr_start += 1;
            }

            self.costs_valid_level = 0;
            self.costs_valid_position = 0;
            curr_level += curr_proc_time;
        }

        // Level transitions.
        while curr_level < self.total_proc_time {
            let prev_proc_time = self.perm_proc_times[self.costs_valid_position as usize];
            let curr_proc_time = self.perm_proc_times[self.costs_valid_position as usize + 1];
            let forced_space = self.perm_forced_spaces[self.costs_valid_position as usize];
            let prev_level = curr_level - prev_proc_time;

            let min_start = self.earliest_on_interval_idx + curr_level;
            let max_start =
                self.latest_on_interval_idx - (self.total_proc_time - curr_level) + 1;
            let prev_min_start = self.earliest_on_interval_idx + prev_level;

            let Self {
                costs_on_levels,
                opt_path,
                opt_switching_costs_trans,
                cumul_on_energy_cost_per_proc_time,
                max_processable_intervals,
                workers,
                ..
            } = self;
            // shared views for the worker threads
            let opt_switching_costs_trans: &Matrix<i64> = opt_switching_costs_trans;
            let cumul_on_energy_cost_per_proc_time: &Matrix<i64> =
                cumul_on_energy_cost_per_proc_time;
            let max_processable_intervals: &[i64] = max_processable_intervals;
            let workers: &Workers = workers;

            let (prev_costs, curr_costs) =
                costs_on_levels.row_pair_mut(prev_level as usize, curr_level as usize);
            let path_row = opt_path.row_mut(curr_level as usize);
            curr_costs.fill(NO_VALUE);

            if min_start <= max_start {
                let window = &mut curr_costs[min_start as usize..=max_start as usize];
                let path_window = &mut path_row[min_start as usize..=max_start as usize];

                // Each cell minimizes over the predecessor row independently.
                let transition_cell = |offset: usize, cost_cell: &mut i64, path_cell: &mut i64| {
                    let curr_start = min_start + offset as i64;
                    let prev_max_start = curr_start - prev_proc_time - forced_space;
                    let curr_cumul_cost = cumul_on_energy_cost_per_proc_time
                        [(curr_proc_time as usize, curr_start as usize)];

                    let mut min_cost = NO_VALUE;
                    let mut min_path = -1;

                    let mut prev_start = prev_min_start;
                    while prev_start <= prev_max_start {
                        let prev_cost = prev_costs[prev_start as usize];
                        let switching_cost = opt_switching_costs_trans
                            [(curr_start as usize, (prev_start + prev_proc_time) as usize)];
                        if prev_cost != NO_VALUE
                            && switching_cost != NO_VALUE
                            && max_processable_intervals[prev_start as usize] >= prev_proc_time
                        {
                            let cost = prev_cost + switching_cost + curr_cumul_cost;
                            if cost < min_cost {
                                min_cost = cost;
                                min_path = prev_start;
                            }
                        }
                        prev_start += 1;
                    }

                    *cost_cell = min_cost;
                    *path_cell = min_path;
                };

                if workers.is_parallel() {
                    workers.install(|| {
                        window
                            .par_iter_mut()
                            .zip(path_window.par_iter_mut())
                            .enumerate()
                            .for_each(|(offset, (cost_cell, path_cell))| {
                                transition_cell(offset, cost_cell, path_cell)
                            });
                    });
                } else {
                    for (offset, (cost_cell, path_cell)) in
                        window.iter_mut().zip(path_window.iter_mut()).enumerate()
                    {
                        transition_cell(offset, cost_cell, path_cell);
                    }
                }
            }

            self.costs_valid_level = curr_level;
            self.costs_valid_position += 1;
            curr_level += curr_proc_time;
        }

        // To the final off state.
        let prev_level = self.costs_valid_level;
        let prev_proc_time = self.perm_proc_times[self.costs_valid_position as usize];
        let prev_min_start = self.earliest_on_interval_idx + prev_level;
        let prev_max_start = self.latest_on_interval_idx - prev_proc_time + 1;

        self.opt_cost = NO_VALUE;
        self.last_level_opt_start = NO_VALUE;
        let mut prev_start = prev_min_start;
        while prev_start <= prev_max_start {
            let prev_cost = self.costs_on_levels[(prev_level as usize, prev_start as usize)];
            let switching_cost = self.opt_switching_costs_trans
                [(self.num_intervals as usize, (prev_start + prev_proc_time) as usize)];
            if prev_cost != NO_VALUE
                && switching_cost != NO_VALUE
                && self.max_processable_intervals[prev_start as usize] >= prev_proc_time
            {
                let cost = prev_cost + switching_cost;
                if cost < self.opt_cost {
                    self.opt_cost = cost;
                    self.last_level_opt_start = prev_start;
                }
            }
            prev_start += 1;
        }

        self.stopwatch.stop();

        self.opt_cost
    }

    fn never_on_cost(&self) -> i64 {
        if self.opt_switching_costs.num_rows() > 1
            && self.opt_switching_costs.num_cols() > self.num_intervals as usize
        {
            self.opt_switching_costs[(1, self.num_intervals as usize)]
        } else {
            NO_VALUE
        }
    }

    /// Walk the DP predecessors back from the optimal final start and return
    /// the start interval of every position.
    ///
    /// # Panics
    ///
    /// Panics if there is no feasible schedule.
    pub fn reconstruct_start_times(&mut self) -> Vec<i64> {
        let cost = self.recompute_cost();
        assert!(
            cost != NO_VALUE,
            "cannot reconstruct start times, no feasible schedule exists"
        );

        let mut start_times = vec![NO_VALUE; self.perm_levels.len()];
        if start_times.is_empty() {
            return start_times;
        }
        let last_position = start_times.len() - 1;
        start_times[last_position] = self.last_level_opt_start;

        for position in (1..self.perm_levels.len()).rev() {
            start_times[position - 1] = self.opt_path[(
                self.perm_levels[position] as usize,
                start_times[position] as usize,
            )];
        }

        start_times
    }
}
