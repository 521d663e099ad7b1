pub mod config;
pub mod csv;
pub mod instance;
pub mod result;

use std::fmt;
use std::fs::create_dir_all;
use std::path::Path;

#[derive(Debug)]
pub enum IOError {
    CannotWrite(String, String),
    CannotRead(String, String),
    CannotParse(String, String),
}

impl fmt::Display for IOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err = match self {
            IOError::CannotWrite(what, why) => format!("Couldn't write to {}: {}", what, why),
            IOError::CannotRead(what, why) => format!("Couldn't read from {}: {}", what, why),
            IOError::CannotParse(what, why) => format!("Couldn't parse {}: {}", what, why),
        };

        write!(f, "{err}",)
    }
}
impl std::error::Error for IOError {}

fn ensure_parent_folder_exists(file_path: &Path) -> Result<(), IOError> {
    let display: String = file_path.display().to_string();

    let parent = match file_path.parent() {
        None => return Result::Err(IOError::CannotWrite(display, String::from("Not a file."))),
        Some(p) => p,
    };
    // ensure folder exists
    if let Err(why) = create_dir_all(parent) {
        Result::Err(IOError::CannotWrite(display, why.to_string()))
    } else {
        Ok(())
    }
}

/// Reader for the whitespace-separated on-disk formats: one flat token
/// stream, consumed value by value.
pub struct TokenReader {
    content: String,
    pos: usize,
    display: String,
}

impl TokenReader {
    pub fn from_path(file_path: impl AsRef<Path>) -> Result<Self, IOError> {
        let file_path = file_path.as_ref();
        let display = file_path.display().to_string();
        match std::fs::read_to_string(file_path) {
            Err(why) => Result::Err(IOError::CannotRead(display, why.to_string())),
            Ok(content) => Ok(Self {
                content,
                pos: 0,
                display,
            }),
        }
    }

    #[cfg(test)]
    pub fn from_string(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            pos: 0,
            display: String::from("<string>"),
        }
    }

    fn next_token(&mut self) -> Result<&str, IOError> {
        let bytes = self.content.as_bytes();
        let mut start = self.pos;
        while start < bytes.len() && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        if start == bytes.len() {
            return Err(IOError::CannotParse(
                self.display.clone(),
                String::from("unexpected end of file"),
            ));
        }

        let mut end = start;
        while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        self.pos = end;

        Ok(&self.content[start..end])
    }

    pub fn next_i64(&mut self) -> Result<i64, IOError> {
        let display = self.display.clone();
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| IOError::CannotParse(display, format!("expected an integer, got '{token}'")))
    }

    pub fn next_usize(&mut self) -> Result<usize, IOError> {
        let display = self.display.clone();
        let token = self.next_token()?;
        token.parse().map_err(|_| {
            IOError::CannotParse(display, format!("expected a non-negative integer, got '{token}'"))
        })
    }
}
