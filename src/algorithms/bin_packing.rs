//! Exact bin packing into fixed-capacity bins.
//!
//! The pack-to-blocks primal heuristic needs an item-to-bin assignment that
//! fills every bin exactly (the item sizes always sum to the bin capacities
//! at the call sites). The backend is swappable behind [BinPacker].

use std::time::{Duration, Instant};

use binary_heap_plus::{BinaryHeap, MaxComparator};

/// Assigns items to bins under fixed capacities within a time limit.
pub trait BinPacker {
    /// Returns for each item the index of its bin, or `None` when no exact
    /// packing exists (or was found within the time limit).
    fn pack(
        &self,
        bin_capacities: &[i64],
        item_sizes: &[i64],
        time_limit: Option<Duration>,
    ) -> Option<Vec<usize>>;
}

/// Exact packer: worst-fit-decreasing first, depth-first completion search
/// with residual symmetry pruning as fallback.
#[derive(Debug, Default)]
pub struct ExactBinPacker;

impl BinPacker for ExactBinPacker {
    fn pack(
        &self,
        bin_capacities: &[i64],
        item_sizes: &[i64],
        time_limit: Option<Duration>,
    ) -> Option<Vec<usize>> {
        if item_sizes.is_empty() {
            return if bin_capacities.iter().all(|&capacity| capacity == 0) {
                Some(Vec::new())
            } else {
                None
            };
        }
        if bin_capacities.is_empty()
            || item_sizes.iter().sum::<i64>() != bin_capacities.iter().sum::<i64>()
        {
            return None;
        }

        // largest items first
        let mut order: Vec<usize> = (0..item_sizes.len()).collect();
        order.sort_unstable_by_key(|&item| std::cmp::Reverse(item_sizes[item]));

        if let Some(assignment) = worst_fit_decreasing(bin_capacities, item_sizes, &order) {
            return Some(assignment);
        }

        let deadline = time_limit.map(|limit| Instant::now() + limit);
        let mut search = PackingSearch {
            item_sizes,
            order: &order,
            residuals: bin_capacities.to_vec(),
            assignment: vec![0; item_sizes.len()],
            deadline,
            nodes: 0,
            aborted: false,
        };

        if search.descend(0) {
            Some(search.assignment)
        } else {
            None
        }
    }
}

/// Greedy seed: place each item (in decreasing size) into the bin with the
/// largest residual capacity. Since sizes and capacities have equal sums,
/// a full placement fills every bin exactly.
fn worst_fit_decreasing(
    bin_capacities: &[i64],
    item_sizes: &[i64],
    order: &[usize],
) -> Option<Vec<usize>> {
    let mut residuals: BinaryHeap<(i64, usize), MaxComparator> =
        BinaryHeap::with_capacity(bin_capacities.len());
    for (bin, &capacity) in bin_capacities.iter().enumerate() {
        residuals.push((capacity, bin));
    }

    let mut assignment = vec![0; item_sizes.len()];
    for &item in order {
        let (residual, bin) = residuals.pop().expect("at least one bin exists");
        if residual < item_sizes[item] {
            return None;
        }
        assignment[item] = bin;
        residuals.push((residual - item_sizes[item], bin));
    }

    Some(assignment)
}

struct PackingSearch<'a> {
    item_sizes: &'a [i64],
    order: &'a [usize],
    residuals: Vec<i64>,
    assignment: Vec<usize>,
    deadline: Option<Instant>,
    nodes: u64,
    aborted: bool,
}

impl PackingSearch<'_> {
    fn descend(&mut self, depth: usize) -> bool {
        if depth == self.order.len() {
            return true;
        }

        self.nodes += 1;
        if self.nodes % 1024 == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() > deadline {
                    self.aborted = true;
                }
            }
        }
        if self.aborted {
            return false;
        }

        let item = self.order[depth];
        let size = self.item_sizes[item];

        // Bins with equal residuals are interchangeable for this item.
        let mut tried_residuals: Vec<i64> = Vec::new();
        for bin in 0..self.residuals.len() {
            let residual = self.residuals[bin];
            if residual < size || tried_residuals.contains(&residual) {
                continue;
            }
            tried_residuals.push(residual);

            self.residuals[bin] -= size;
            self.assignment[item] = bin;
            if self.descend(depth + 1) {
                return true;
            }
            self.residuals[bin] += size;
        }

        false
    }
}
