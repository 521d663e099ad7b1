//! CSV append for solve telemetry rows.

use std::{fs::OpenOptions, io::ErrorKind, path::Path};

use serde::Serialize;

use super::{ensure_parent_folder_exists, IOError};

/// Append serialized rows to a CSV file; the header line is written only
/// when this call creates the file.
pub fn append_to_file<T: Serialize>(
    file_path: impl AsRef<Path>,
    objects: &[T],
) -> Result<(), IOError> {
    let file_path = file_path.as_ref();
    ensure_parent_folder_exists(file_path)?;

    let display: String = file_path.display().to_string();

    let (file, is_new_file) = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(file_path)
    {
        Ok(file) => (file, true),
        Err(why) if why.kind() == ErrorKind::AlreadyExists => {
            match OpenOptions::new().append(true).open(file_path) {
                Ok(file) => (file, false),
                Err(why) => return Result::Err(IOError::CannotWrite(display, why.to_string())),
            }
        }
        Err(why) => return Result::Err(IOError::CannotWrite(display, why.to_string())),
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new_file)
        .from_writer(file);
    for object in objects {
        writer
            .serialize(object)
            .map_err(|why| IOError::CannotWrite(display.clone(), why.to_string()))?;
    }
    writer
        .flush()
        .map_err(|why| IOError::CannotWrite(display, why.to_string()))
}

#[cfg(test)]
mod test {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        value: Option<i64>,
    }

    #[test]
    fn test_append_writes_header_once() {
        let file_path = std::env::temp_dir().join("energy-scheduling-csv-append.csv");
        std::fs::remove_file(&file_path).ok();

        append_to_file(
            &file_path,
            &[Row {
                name: "first",
                value: Some(1),
            }],
        )
        .unwrap();
        append_to_file(
            &file_path,
            &[Row {
                name: "second",
                value: None,
            }],
        )
        .unwrap();

        let content = std::fs::read_to_string(&file_path).unwrap();
        std::fs::remove_file(&file_path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["name,value", "first,1", "second,"]);
    }
}
