use std::{fmt, io, num::ParseIntError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ViewNavError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Malformed value: {0}")]
    Format(String),
    #[error("Unsupported combination: {0}")]
    Unsupported(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Object has been disposed: {0}")]
    Disposed(String),
    #[error("No more elements in this traversal")]
    NoSuchElement,
    #[error("Index changed and traversal was stopped: {0}")]
    IndexChanged(String),
    #[error("Collection source error: {0}")]
    Engine(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Custom error: {0}")]
    Custom(String),
}

impl ViewNavError {
    /// True for errors caused by the caller's input rather than by the source or the cursor.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ViewNavError::InvalidArgument(_)
                | ViewNavError::Format(_)
                | ViewNavError::Unsupported(_)
                | ViewNavError::NoSuchElement
        )
    }
}

impl From<toml::de::Error> for ViewNavError {
    fn from(src: toml::de::Error) -> ViewNavError {
        ViewNavError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ViewNavError {
    fn from(src: toml::ser::Error) -> ViewNavError {
        ViewNavError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ViewNavError {
    fn from(src: JsonError) -> ViewNavError {
        ViewNavError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for ViewNavError {
    fn from(src: uuid::Error) -> ViewNavError {
        ViewNavError::Format(format!("UNID conversion failed: {src}"))
    }
}

impl From<ParseIntError> for ViewNavError {
    fn from(src: ParseIntError) -> ViewNavError {
        ViewNavError::Format(format!("Integer parse failed: {src}"))
    }
}

impl From<io::Error> for ViewNavError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ViewNavError::NotFound(format!("{x}")),
            _ => ViewNavError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for ViewNavError {
    fn from(x: fmt::Error) -> Self {
        ViewNavError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for ViewNavError {
    fn from(x: RegexError) -> Self {
        ViewNavError::Serialization(format!("Regex parse failed: {x}"))
    }
}
