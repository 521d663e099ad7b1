//! The whitespace-separated instance format.
//!
//! In order: machines count; jobs count and per-job (id, index, machine
//! index, processing time); intervals count and per-interval (index, start,
//! end, energy cost); interval length; on-power consumption;
//! earliest/latest allowed on-interval; the two switching-cost matrices and
//! the cumulative energy-cost matrix, each as `rows cols` followed by the
//! row-major values. `-1` in the switching matrices encodes a forbidden
//! transition.

use std::fmt::Write as _;
use std::path::Path;

use crate::data_structures::{Instance, Interval, Job, Matrix, NO_VALUE};

use super::{IOError, TokenReader};

pub fn read(file_path: impl AsRef<Path>) -> Result<Instance, IOError> {
    let mut reader = TokenReader::from_path(file_path)?;

    let machines_count = reader.next_usize()?;

    let jobs_count = reader.next_usize()?;
    let mut jobs = Vec::with_capacity(jobs_count);
    for _ in 0..jobs_count {
        jobs.push(Job {
            id: reader.next_i64()?,
            index: reader.next_usize()?,
            machine_idx: reader.next_usize()?,
            processing_time: reader.next_i64()?,
        });
    }

    let intervals_count = reader.next_usize()?;
    let mut intervals = Vec::with_capacity(intervals_count);
    for _ in 0..intervals_count {
        intervals.push(Interval {
            index: reader.next_usize()?,
            start: reader.next_i64()?,
            end: reader.next_i64()?,
            energy_cost: reader.next_i64()?,
        });
    }

    let length_interval = reader.next_i64()?;
    let on_power_consumption = reader.next_i64()?;
    let earliest_on_interval_idx = reader.next_usize()?;
    let latest_on_interval_idx = reader.next_usize()?;

    let optimal_switching_costs = read_matrix(&mut reader, true)?;
    let full_optimal_switching_costs = read_matrix(&mut reader, true)?;
    let cumulative_energy_cost = read_matrix(&mut reader, false)?;

    Ok(Instance::new(
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
    ))
}

/// Negative entries mean "no value" in the switching-cost matrices.
fn read_matrix(reader: &mut TokenReader, negative_is_no_value: bool) -> Result<Matrix<i64>, IOError> {
    let rows_count = reader.next_usize()?;
    let cols_count = reader.next_usize()?;

    let mut matrix = Matrix::new_filled(rows_count, cols_count, NO_VALUE);
    for row in 0..rows_count {
        for col in 0..cols_count {
            let value = reader.next_i64()?;
            if negative_is_no_value && value < 0 {
                continue;
            }
            matrix[(row, col)] = value;
        }
    }

    Ok(matrix)
}

pub fn write(file_path: impl AsRef<Path>, instance: &Instance) -> Result<(), IOError> {
    let mut content = String::new();

    let _ = writeln!(content, "{}", instance.machines_count);

    let _ = writeln!(content, "{}", instance.jobs.len());
    for job in &instance.jobs {
        let _ = writeln!(
            content,
            "{} {} {} {}",
            job.id, job.index, job.machine_idx, job.processing_time
        );
    }

    let _ = writeln!(content, "{}", instance.intervals.len());
    for interval in &instance.intervals {
        let _ = writeln!(
            content,
            "{} {} {} {}",
            interval.index, interval.start, interval.end, interval.energy_cost
        );
    }

    let _ = writeln!(content, "{}", instance.length_interval);
    let _ = writeln!(content, "{}", instance.on_power_consumption);
    let _ = writeln!(content, "{}", instance.earliest_on_interval_idx);
    let _ = writeln!(content, "{}", instance.latest_on_interval_idx);

    write_matrix(&mut content, &instance.optimal_switching_costs, true);
    write_matrix(&mut content, &instance.full_optimal_switching_costs, true);
    write_matrix(&mut content, &instance.cumulative_energy_cost, false);

    let file_path = file_path.as_ref();
    std::fs::write(file_path, content)
        .map_err(|why| IOError::CannotWrite(file_path.display().to_string(), why.to_string()))
}

fn write_matrix(content: &mut String, matrix: &Matrix<i64>, no_value_is_negative: bool) {
    let _ = writeln!(content, "{} {}", matrix.num_rows(), matrix.num_cols());
    for row in 0..matrix.num_rows() {
        for col in 0..matrix.num_cols() {
            let value = matrix[(row, col)];
            let value = if no_value_is_negative && value == NO_VALUE {
                -1
            } else {
                value
            };
            if col > 0 {
                content.push(' ');
            }
            let _ = write!(content, "{value}");
        }
        content.push('\n');
    }
}

#[cfg(test)]
mod test {
    use crate::data_structures::instance::test_support::uniform_instance;

    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let mut instance = uniform_instance(&[2, 3], 4);
        // a forbidden transition survives the roundtrip
        instance.optimal_switching_costs[(2, 1)] = NO_VALUE;

        let file_path = std::env::temp_dir().join("energy-scheduling-instance-roundtrip.txt");
        write(&file_path, &instance).unwrap();
        let read_back = read(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(read_back.machines_count, instance.machines_count);
        assert_eq!(read_back.jobs, instance.jobs);
        assert_eq!(read_back.intervals, instance.intervals);
        assert_eq!(read_back.length_interval, instance.length_interval);
        assert_eq!(read_back.on_power_consumption, instance.on_power_consumption);
        assert_eq!(
            read_back.earliest_on_interval_idx,
            instance.earliest_on_interval_idx
        );
        assert_eq!(
            read_back.latest_on_interval_idx,
            instance.latest_on_interval_idx
        );
        assert_eq!(
            read_back.optimal_switching_costs,
            instance.optimal_switching_costs
        );
        assert_eq!(
            read_back.full_optimal_switching_costs,
            instance.full_optimal_switching_costs
        );
        assert_eq!(
            read_back.cumulative_energy_cost,
            instance.cumulative_energy_cost
        );
        assert_eq!(read_back.total_proc_time(), instance.total_proc_time());
    }

    #[test]
    fn test_read_rejects_truncated_file() {
        let file_path = std::env::temp_dir().join("energy-scheduling-instance-truncated.txt");
        std::fs::write(&file_path, "1 2 0 0").unwrap();
        let result = read(&file_path);
        std::fs::remove_file(&file_path).ok();

        assert!(result.is_err());
    }
}
