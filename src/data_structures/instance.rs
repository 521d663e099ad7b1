use super::Matrix;

/// Sentinel for "no value": any cost at or above it is treated as infeasible.
pub const NO_VALUE: i64 = i64::MAX;

/// A job to be scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub index: usize,
    pub machine_idx: usize,
    pub processing_time: i64,
}

/// One unit-length time interval of the energy horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub index: usize,
    pub start: i64,
    pub end: i64,
    pub energy_cost: i64,
}

/// A scheduling instance.
///
/// One machine, jobs with integer processing times, and a horizon of
/// unit-length intervals with per-interval energy costs. The switching-cost
/// matrices are precomputed inputs: `optimal_switching_costs[r][c]` is the
/// cheapest way to bridge the off-gap between interval `r` (first off
/// interval) and interval `c` (next on interval), with column
/// `intervals.len()` meaning "stay off until the end of the horizon";
/// `NO_VALUE` entries are forbidden transitions.
/// `cumulative_energy_cost[i][j]` is the sum of interval energy costs over
/// `[i, j]`, giving O(1) range sums.
#[derive(Debug, Clone)]
pub struct Instance {
    pub machines_count: usize,
    pub jobs: Vec<Job>,
    pub intervals: Vec<Interval>,
    pub length_interval: i64,
    pub on_power_consumption: i64,
    pub earliest_on_interval_idx: usize,
    pub latest_on_interval_idx: usize,
    pub optimal_switching_costs: Matrix<i64>,
    /// Variant of the switching costs consumed by solvers outside the exact
    /// core; kept for on-disk compatibility, never read by the search.
    pub full_optimal_switching_costs: Matrix<i64>,
    pub cumulative_energy_cost: Matrix<i64>,

    total_proc_time: i64,
}

impl Instance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        machines_count: usize,
        jobs: Vec<Job>,
        intervals: Vec<Interval>,
        length_interval: i64,
        on_power_consumption: i64,
        earliest_on_interval_idx: usize,
        latest_on_interval_idx: usize,
        optimal_switching_costs: Matrix<i64>,
        full_optimal_switching_costs: Matrix<i64>,
        cumulative_energy_cost: Matrix<i64>,
    ) -> Self {
        let total_proc_time = jobs.iter().map(|job| job.processing_time).sum();
        Self {
            machines_count,
            jobs,
            intervals,
            length_interval,
            on_power_consumption,
            earliest_on_interval_idx,
            latest_on_interval_idx,
            optimal_switching_costs,
            full_optimal_switching_costs,
            cumulative_energy_cost,
            total_proc_time,
        }
    }

    /// Sum of all processing times.
    pub fn total_proc_time(&self) -> i64 {
        self.total_proc_time
    }

    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn test_total_proc_time() {
        let instance = crate::data_structures::instance::test_support::uniform_instance(&[2, 3], 8);
        assert_eq!(instance.total_proc_time(), 5);
        assert_eq!(instance.num_intervals(), 8);
    }
}
