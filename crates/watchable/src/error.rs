#![forbid(unsafe_code)]

//! Error types for path parsing and conditional waits.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// A property path that could not be parsed.
///
/// Offsets are byte offsets into the original path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("property path is empty")]
    Empty,

    #[error("empty path segment at offset {offset}")]
    EmptySegment { offset: usize },

    #[error("unterminated bracket starting at offset {offset}")]
    UnterminatedBracket { offset: usize },

    #[error("unterminated quote starting at offset {offset}")]
    UnterminatedQuote { offset: usize },

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// A path-based wait was requested while the root value is not an
    /// object or array.
    #[error("cannot watch path `{path}`: root value is {found}, not an object or array")]
    NotAnObject { path: String, found: &'static str },

    #[error("invalid property path: {0}")]
    InvalidPath(#[from] PathError),

    /// The listener backing a pending wait was removed before it fired.
    #[error("wait abandoned: its listener was removed before the condition held")]
    Abandoned,
}

impl WatchError {
    #[must_use]
    pub fn not_an_object(path: impl Into<String>, found: &'static str) -> Self {
        Self::NotAnObject {
            path: path.into(),
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_converts_into_watch_error() {
        let err: WatchError = PathError::UnterminatedQuote { offset: 3 }.into();
        assert_eq!(
            err,
            WatchError::InvalidPath(PathError::UnterminatedQuote { offset: 3 })
        );
        assert!(err.to_string().contains("offset 3"));
    }

    #[test]
    fn not_an_object_names_path_and_kind() {
        let err = WatchError::not_an_object("a.b", "number");
        let msg = err.to_string();
        assert!(msg.contains("`a.b`"));
        assert!(msg.contains("number"));
    }
}
