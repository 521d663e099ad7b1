use super::FixedPermCostComputation;

/// A maximal contiguous run of on-intervals, possibly holding several
/// positions back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: i64,
    pub completion: i64,
}

impl Block {
    pub fn new(start: i64, completion: i64) -> Self {
        Self { start, completion }
    }

    pub fn length(&self) -> i64 {
        self.completion - self.start
    }

    /// Merge consecutive `(start, proc_time)` positions into blocks: a
    /// position starting at or before the previous completion extends the
    /// block, a later one opens a new block.
    pub fn from_positions(start_times: &[i64], proc_times: &[i64], from_position: usize) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        for position in from_position..proc_times.len() {
            let start = start_times[position];
            let completion = start + proc_times[position];

            match blocks.last_mut() {
                Some(last) if last.completion >= start => last.completion = completion,
                _ => blocks.push(Block::new(start, completion)),
            }
        }

        blocks
    }

    /// Blocks of the optimal schedule of `computation`, restricted to
    /// positions at or after `from_position`.
    ///
    /// # Panics
    ///
    /// Panics if the computation has no feasible schedule.
    pub fn proc_blocks(
        computation: &mut FixedPermCostComputation,
        from_position: usize,
    ) -> Vec<Block> {
        let start_times = computation.reconstruct_start_times();
        Self::from_positions(&start_times, computation.perm_proc_times(), from_position)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_merges_adjacent_positions() {
        // positions: [0,2) [2,3) gap [5,7)
        let blocks = Block::from_positions(&[0, 2, 5], &[2, 1, 2], 0);
        assert_eq!(blocks, vec![Block::new(0, 3), Block::new(5, 7)]);
    }

    #[test]
    fn test_from_position_skips_prefix() {
        let blocks = Block::from_positions(&[0, 2, 5], &[2, 1, 2], 2);
        assert_eq!(blocks, vec![Block::new(5, 7)]);
    }

    #[test]
    fn test_empty_positions() {
        assert_eq!(Block::from_positions(&[], &[], 0), vec![]);
    }

    #[test]
    fn test_lengths() {
        let block = Block::new(3, 7);
        assert_eq!(block.length(), 4);
    }
}
