//! The whitespace-separated solver-config formats.
//!
//! Solver config: `randomSeed timeLimitMs numWorkers initStartTimesCount
//! [jobIndex startTime]*`. Specialized branch-and-bound config: ten integers
//! in the order of [read_branch_and_bound_config]. Non-positive time limits
//! and negative count limits mean unlimited.

use std::path::Path;
use std::time::Duration;

use crate::solvers::{
    BranchAndBoundConfig, BranchPriority, BlockFindingMode, BlockFindingStrategy,
    JobsJoiningOnGcd, SolverConfig,
};

use super::{IOError, TokenReader};

pub fn read_solver_config(file_path: impl AsRef<Path>) -> Result<SolverConfig, IOError> {
    let file_path = file_path.as_ref();
    let display = file_path.display().to_string();
    let mut reader = TokenReader::from_path(file_path)?;

    let random_seed = reader.next_i64()? as u64;
    let time_limit = positive_millis(reader.next_i64()?);
    let num_workers = reader.next_usize()?;

    let init_start_times_count = reader.next_i64()?;
    let mut initial_start_times = Vec::new();
    if init_start_times_count > 0 {
        initial_start_times = vec![0; init_start_times_count as usize];
        for _ in 0..init_start_times_count {
            let job_index = reader.next_usize()?;
            let start_time = reader.next_i64()?;
            let slot = initial_start_times.get_mut(job_index).ok_or_else(|| {
                IOError::CannotParse(display.clone(), format!("job index {job_index} out of range"))
            })?;
            *slot = start_time;
        }
    }

    Ok(SolverConfig::new(
        random_seed,
        time_limit,
        num_workers,
        initial_start_times,
    ))
}

pub fn read_branch_and_bound_config(
    file_path: impl AsRef<Path>,
) -> Result<BranchAndBoundConfig, IOError> {
    let file_path = file_path.as_ref();
    let display = file_path.display().to_string();
    let mut reader = TokenReader::from_path(file_path)?;

    let use_block_detection = reader.next_i64()? != 0;
    let use_pack_to_blocks = reader.next_i64()? != 0;
    let pack_to_blocks_all_jobs = reader.next_i64()? != 0;
    let use_iterative_deepening = reader.next_i64()? != 0;

    let block_finding = match reader.next_i64()? {
        0 => BlockFindingMode::Off,
        1 => BlockFindingMode::Root,
        2 => BlockFindingMode::WholeTree,
        code => {
            return Err(IOError::CannotParse(
                display,
                format!("unknown block finding mode: {code}"),
            ))
        }
    };

    let block_finding_strategy = match reader.next_i64()? {
        0 => BlockFindingStrategy::MinimizeLengthDifference,
        code => {
            return Err(IOError::CannotParse(
                display,
                format!("unknown block finding strategy: {code}"),
            ))
        }
    };

    let jobs_joining_on_gcd = match reader.next_i64()? {
        0 => JobsJoiningOnGcd::Off,
        1 => JobsJoiningOnGcd::Root,
        2 => JobsJoiningOnGcd::WholeTree,
        code => {
            return Err(IOError::CannotParse(
                display,
                format!("unknown jobs joining mode: {code}"),
            ))
        }
    };

    let branch_priority = match reader.next_i64()? {
        0 => BranchPriority::Random,
        1 => BranchPriority::ForcedSpace,
        2 => BranchPriority::JoinToPrev,
        3 => BranchPriority::DynamicByBlockFitting,
        code => {
            return Err(IOError::CannotParse(
                display,
                format!("unknown branch priority: {code}"),
            ))
        }
    };

    let iterative_deepening_time_limit = positive_millis(reader.next_i64()?);

    let nodes_count_limit_raw = reader.next_i64()?;
    let nodes_count_limit = (nodes_count_limit_raw >= 0).then_some(nodes_count_limit_raw);

    Ok(BranchAndBoundConfig {
        use_block_detection,
        use_pack_to_blocks,
        pack_to_blocks_all_jobs,
        use_iterative_deepening,
        block_finding,
        block_finding_strategy,
        jobs_joining_on_gcd,
        branch_priority,
        iterative_deepening_time_limit,
        nodes_count_limit,
    })
}

fn positive_millis(millis: i64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis as u64))
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let file_path = std::env::temp_dir().join(name);
        std::fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_read_solver_config() {
        let file_path = write_temp(
            "energy-scheduling-solver-config.txt",
            "42 1500 4 2  1 7  0 3",
        );
        let config = read_solver_config(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(config.time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.initial_start_times, vec![3, 7]);
        assert!(config.processable_intervals.is_empty());
    }

    #[test]
    fn test_unlimited_time_limit() {
        let file_path = write_temp("energy-scheduling-solver-config-unlimited.txt", "7 -1 0 0");
        let config = read_solver_config(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(config.time_limit, None);
        assert!(config.initial_start_times.is_empty());
    }

    #[test]
    fn test_read_branch_and_bound_config() {
        let file_path = write_temp(
            "energy-scheduling-bab-config.txt",
            "1 0 1 1  2 0 1 3  5000 -1",
        );
        let config = read_branch_and_bound_config(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert!(config.use_block_detection);
        assert!(!config.use_pack_to_blocks);
        assert!(config.pack_to_blocks_all_jobs);
        assert!(config.use_iterative_deepening);
        assert_eq!(config.block_finding, BlockFindingMode::WholeTree);
        assert_eq!(
            config.block_finding_strategy,
            BlockFindingStrategy::MinimizeLengthDifference
        );
        assert_eq!(config.jobs_joining_on_gcd, JobsJoiningOnGcd::Off);
        assert_eq!(config.branch_priority, BranchPriority::DynamicByBlockFitting);
        assert_eq!(
            config.iterative_deepening_time_limit,
            Some(Duration::from_secs(5))
        );
        assert_eq!(config.nodes_count_limit, None);
    }

    #[test]
    fn test_rejects_unknown_enum_code() {
        let file_path = write_temp(
            "energy-scheduling-bab-config-bad.txt",
            "0 0 0 0  9 0 0 0  -1 -1",
        );
        let result = read_branch_and_bound_config(&file_path);
        std::fs::remove_file(&file_path).ok();

        assert!(result.is_err());
    }

    #[test]
    fn test_whole_tree_gcd_and_zero_nodes_limit() {
        let file_path = write_temp(
            "energy-scheduling-bab-config-gcd.txt",
            "0 0 0 0  0 0 2 1  -1 0",
        );
        let config = read_branch_and_bound_config(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(config.jobs_joining_on_gcd, JobsJoiningOnGcd::WholeTree);
        assert_eq!(config.branch_priority, BranchPriority::ForcedSpace);
        assert_eq!(config.iterative_deepening_time_limit, None);
        assert_eq!(config.nodes_count_limit, Some(0));
    }
}
