//! The line-oriented result format.
//!
//! Thirteen lines: status, objective, time-limit flag, start times (or the
//! `NoSolution` marker), and the nine search statistics. Absent values are
//! written as `-1`.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use itertools::Itertools;

use crate::solvers::{SolveResult, Status};

use super::IOError;

pub fn write(file_path: impl AsRef<Path>, result: &SolveResult) -> Result<(), IOError> {
    let mut content = String::new();

    let _ = writeln!(content, "{}", result.status);
    let _ = writeln!(content, "{}", result.objective.unwrap_or(-1));
    let _ = writeln!(content, "{}", i64::from(result.time_limit_reached));

    match &result.start_times {
        Some(start_times) if !start_times.is_empty() => {
            let line = start_times
                .iter()
                .enumerate()
                .map(|(job_idx, start_time)| format!("{job_idx} {start_time}"))
                .join(" ");
            let _ = writeln!(content, "{line}");
        }
        _ => {
            let _ = writeln!(content, "NoSolution");
        }
    }

    for count in [
        result.nodes_count,
        result.block_detection_found_solution,
        result.pack_to_blocks_found_solution,
        result.jobs_joined_on_larger_gcd,
        result.root_lower_bound,
    ] {
        let _ = writeln!(content, "{}", count.unwrap_or(-1));
    }

    for duration in [
        result.lower_bound_total_duration,
        result.block_detection_total_duration,
        result.pack_to_blocks_total_duration,
        result.block_finding_total_duration,
    ] {
        let _ = writeln!(
            content,
            "{}",
            duration.map_or(-1, |duration| duration.as_millis() as i64)
        );
    }

    let file_path = file_path.as_ref();
    super::ensure_parent_folder_exists(file_path)?;
    std::fs::write(file_path, content)
        .map_err(|why| IOError::CannotWrite(file_path.display().to_string(), why.to_string()))
}

pub fn read(file_path: impl AsRef<Path>) -> Result<SolveResult, IOError> {
    let file_path = file_path.as_ref();
    let display = file_path.display().to_string();
    let content = std::fs::read_to_string(file_path)
        .map_err(|why| IOError::CannotRead(display.clone(), why.to_string()))?;

    let mut lines = content.lines();
    let mut next_line = || {
        lines
            .next()
            .ok_or_else(|| IOError::CannotParse(display.clone(), String::from("missing line")))
    };

    let status: Status = next_line()?
        .trim()
        .parse()
        .map_err(|why| IOError::CannotParse(display.clone(), why))?;
    let objective = parse_optional_i64(next_line()?, &display)?;
    let time_limit_reached = next_line()?.trim() == "1";

    let start_times_line = next_line()?.trim().to_string();
    let start_times = if start_times_line == "NoSolution" {
        None
    } else {
        let values: Vec<i64> = start_times_line
            .split_whitespace()
            .map(|token| {
                token.parse::<i64>().map_err(|_| {
                    IOError::CannotParse(
                        display.clone(),
                        format!("expected an integer, got '{token}'"),
                    )
                })
            })
            .collect::<Result<_, _>>()?;
        if values.len() % 2 != 0 {
            return Err(IOError::CannotParse(
                display.clone(),
                String::from("odd number of start-time tokens"),
            ));
        }

        let mut start_times = vec![0; values.len() / 2];
        for (job_idx, start_time) in values.into_iter().tuples() {
            let job_idx = job_idx as usize;
            if job_idx >= start_times.len() {
                return Err(IOError::CannotParse(
                    display.clone(),
                    format!("job index {job_idx} out of range"),
                ));
            }
            start_times[job_idx] = start_time;
        }
        Some(start_times)
    };

    let nodes_count = parse_optional_i64(next_line()?, &display)?;
    let block_detection_found_solution = parse_optional_i64(next_line()?, &display)?;
    let pack_to_blocks_found_solution = parse_optional_i64(next_line()?, &display)?;
    let jobs_joined_on_larger_gcd = parse_optional_i64(next_line()?, &display)?;
    let root_lower_bound = parse_optional_i64(next_line()?, &display)?;

    let lower_bound_total_duration = parse_optional_duration(next_line()?, &display)?;
    let block_detection_total_duration = parse_optional_duration(next_line()?, &display)?;
    let pack_to_blocks_total_duration = parse_optional_duration(next_line()?, &display)?;
    let block_finding_total_duration = parse_optional_duration(next_line()?, &display)?;

    Ok(SolveResult {
        status,
        objective,
        time_limit_reached,
        start_times,
        nodes_count,
        block_detection_found_solution,
        pack_to_blocks_found_solution,
        jobs_joined_on_larger_gcd,
        root_lower_bound,
        lower_bound_total_duration,
        block_detection_total_duration,
        pack_to_blocks_total_duration,
        block_finding_total_duration,
    })
}

fn parse_optional_i64(line: &str, display: &str) -> Result<Option<i64>, IOError> {
    let value: i64 = line.trim().parse().map_err(|_| {
        IOError::CannotParse(
            display.to_string(),
            format!("expected an integer, got '{line}'"),
        )
    })?;
    Ok((value != -1).then_some(value))
}

fn parse_optional_duration(line: &str, display: &str) -> Result<Option<Duration>, IOError> {
    Ok(parse_optional_i64(line, display)?.map(|millis| Duration::from_millis(millis as u64)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip_with_solution() {
        let result = SolveResult {
            status: Status::Optimal,
            objective: Some(42),
            time_limit_reached: false,
            start_times: Some(vec![3, 0, 7]),
            nodes_count: Some(17),
            block_detection_found_solution: Some(1),
            pack_to_blocks_found_solution: Some(0),
            jobs_joined_on_larger_gcd: Some(2),
            root_lower_bound: Some(40),
            lower_bound_total_duration: Some(Duration::from_millis(12)),
            block_detection_total_duration: Some(Duration::from_millis(1)),
            pack_to_blocks_total_duration: Some(Duration::ZERO),
            block_finding_total_duration: Some(Duration::from_millis(3)),
        };

        let file_path = std::env::temp_dir().join("energy-scheduling-result-roundtrip.txt");
        write(&file_path, &result).unwrap();
        let read_back = read(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(read_back, result);
    }

    #[test]
    fn test_roundtrip_without_solution() {
        let result = SolveResult {
            time_limit_reached: true,
            ..SolveResult::new(Status::NoSolution, true)
        };

        let file_path = std::env::temp_dir().join("energy-scheduling-result-nosolution.txt");
        write(&file_path, &result).unwrap();
        let read_back = read(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        assert_eq!(read_back, result);
    }

    #[test]
    fn test_written_format_lines() {
        let result = SolveResult {
            objective: Some(5),
            start_times: Some(vec![0, 2]),
            nodes_count: Some(1),
            ..SolveResult::new(Status::Heuristic, true)
        };

        let file_path = std::env::temp_dir().join("energy-scheduling-result-format.txt");
        write(&file_path, &result).unwrap();
        let content = std::fs::read_to_string(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "Heuristic");
        assert_eq!(lines[1], "5");
        assert_eq!(lines[2], "1");
        assert_eq!(lines[3], "0 0 1 2");
        assert_eq!(lines[4], "1");
        assert_eq!(lines[5], "-1");
    }
}
