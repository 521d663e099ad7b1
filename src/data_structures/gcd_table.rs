use std::collections::BTreeSet;

use super::Matrix;

/// Pairwise-cached gcd over a fixed value universe.
///
/// The branch-and-bound search asks for the gcd of the remaining
/// processing-time multiset in every node, so all pairwise gcds over the
/// universe are precomputed once, memoizing the intermediate results of the
/// Euclidean recursion along the way. Later lookups fold over the cache.
#[derive(Debug)]
pub struct GcdTable {
    // table[(a, b)] == -1 means not computed yet
    table: Matrix<i64>,
}

impl GcdTable {
    /// Build the table for a value universe (duplicates are ignored).
    /// All values passed to [Self::gcd] later must come from this universe.
    pub fn new(all_values: &[i64]) -> Self {
        let unique: BTreeSet<i64> = all_values.iter().copied().collect();
        let max_value = unique.iter().next_back().copied().unwrap_or(0);

        let mut table = Self {
            table: Matrix::new_filled(max_value as usize + 1, max_value as usize + 1, -1),
        };

        let unique: Vec<i64> = unique.into_iter().collect();
        for (i, &a) in unique.iter().enumerate() {
            table.table[(a as usize, a as usize)] = a;

            for &b in &unique[i + 1..] {
                if a >= b {
                    table.gcd_traced(a, b);
                } else {
                    table.gcd_traced(b, a);
                }
            }
        }

        table
    }

    /// Euclidean recursion with caching of every intermediate pair.
    /// Expects `a >= b`.
    fn gcd_traced(&mut self, a: i64, b: i64) -> i64 {
        let cached = self.table[(a as usize, b as usize)];
        if cached >= 1 {
            return cached;
        }

        if b == 0 {
            self.table[(a as usize, 0)] = a;
            self.table[(0, a as usize)] = a;
            return a;
        }

        let gcd = self.gcd_traced(b, a % b);
        self.table[(a as usize, b as usize)] = gcd;
        self.table[(b as usize, a as usize)] = gcd;
        gcd
    }

    /// Fold gcd over the values, short-circuiting once the running gcd is 1.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn gcd(&mut self, values: &[i64]) -> i64 {
        let mut curr_gcd = values[0];
        for &value in &values[1..] {
            if curr_gcd == 1 {
                return curr_gcd;
            }

            if curr_gcd >= value {
                curr_gcd = self.gcd_traced(curr_gcd, value);
            } else {
                curr_gcd = self.gcd_traced(value, curr_gcd);
            }
        }

        curr_gcd
    }
}
