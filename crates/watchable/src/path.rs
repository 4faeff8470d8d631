#![forbid(unsafe_code)]

//! Property paths: `a.b["c d"]['e'][0]`.
//!
//! A path is a leading segment followed by any mix of `.ident`,
//! `['quoted']`, `["quoted"]` and `[digits]`. Identifiers are runs of
//! characters other than `.`, `[` and `]`. Inside quotes a backslash escapes
//! the next character.
//!
//! Resolution never fails: a missing key reads as `Undefined`, and stepping
//! into a value that cannot be indexed is logged and also reads as
//! `Undefined`. Conditions are routinely registered on paths that do not
//! exist yet.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::str::FromStr;

use crate::container::Container;
use crate::error::PathError;
use crate::value::Value;

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    keys: Vec<String>,
}

/// The outcome of walking a path.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The leaf value, or `Undefined` if the walk could not reach it.
    pub value: Value,
    /// The last container the walk stepped through.
    pub parent: Option<Container>,
}

impl PropertyPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let keys = Parser::new(path).parse()?;
        Ok(Self {
            raw: path.to_owned(),
            keys,
        })
    }

    /// Build a path from raw keys, choosing dot or bracket notation per key.
    ///
    /// Returns `None` for an empty key list.
    pub fn from_keys<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Option<Self> {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return None;
        }
        let mut raw = String::new();
        for (i, key) in keys.iter().enumerate() {
            let plain = !key.is_empty() && !key.contains(['.', '[', ']']);
            if plain {
                if i > 0 {
                    raw.push('.');
                }
                raw.push_str(key);
            } else {
                raw.push_str("[\"");
                for ch in key.chars() {
                    if ch == '"' || ch == '\\' {
                        raw.push('\\');
                    }
                    raw.push(ch);
                }
                raw.push_str("\"]");
            }
        }
        Some(Self { raw, keys })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The final key, naming the resolved slot within its parent.
    #[must_use]
    pub fn leaf_key(&self) -> Option<&str> {
        self.keys.last().map(String::as_str)
    }

    /// Walk the path from `root`.
    #[must_use]
    pub fn resolve(&self, root: &Value) -> Resolution {
        let mut parent = None;
        let mut current = root.clone();
        for (depth, key) in self.keys.iter().enumerate() {
            current = match &current {
                Value::Container(container) => {
                    parent = Some(container.clone());
                    container.get(key)
                }
                Value::String(s) if key == "length" => {
                    Value::Number(s.encode_utf16().count() as f64)
                }
                Value::String(_) => Value::Undefined,
                other => {
                    tracing::debug!(
                        message = "watchable.path_unresolved",
                        path = %self.raw,
                        key = %key,
                        depth,
                        found = other.type_name()
                    );
                    return Resolution {
                        value: Value::Undefined,
                        parent,
                    };
                }
            };
        }
        Resolution {
            value: current,
            parent,
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn parse(mut self) -> Result<Vec<String>, PathError> {
        let mut keys = Vec::new();
        match self.chars.peek() {
            None => return Err(PathError::Empty),
            Some(&(_, '[')) => {}
            Some(_) => keys.push(self.identifier(0)?),
        }
        while let Some((offset, ch)) = self.chars.next() {
            match ch {
                '.' => keys.push(self.identifier(offset + 1)?),
                '[' => keys.push(self.bracket(offset)?),
                other => return Err(PathError::UnexpectedCharacter { ch: other, offset }),
            }
        }
        Ok(keys)
    }

    fn identifier(&mut self, start: usize) -> Result<String, PathError> {
        let mut end = start;
        while let Some(&(offset, ch)) = self.chars.peek() {
            if matches!(ch, '.' | '[' | ']') {
                break;
            }
            end = offset + ch.len_utf8();
            self.chars.next();
        }
        if end == start {
            return Err(PathError::EmptySegment { offset: start });
        }
        Ok(self.src[start..end].to_owned())
    }

    fn bracket(&mut self, open: usize) -> Result<String, PathError> {
        let key = match self.chars.next() {
            None => return Err(PathError::UnterminatedBracket { offset: open }),
            Some((offset, quote @ ('\'' | '"'))) => self.quoted(offset, quote)?,
            Some((_, first)) if first.is_ascii_digit() => {
                let mut key = String::from(first);
                while let Some(&(_, digit)) = self.chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    key.push(digit);
                    self.chars.next();
                }
                key
            }
            Some((offset, ']')) => return Err(PathError::EmptySegment { offset }),
            Some((offset, ch)) => return Err(PathError::UnexpectedCharacter { ch, offset }),
        };
        match self.chars.next() {
            Some((_, ']')) => Ok(key),
            Some((offset, ch)) => Err(PathError::UnexpectedCharacter { ch, offset }),
            None => Err(PathError::UnterminatedBracket { offset: open }),
        }
    }

    fn quoted(&mut self, open: usize, quote: char) -> Result<String, PathError> {
        let mut key = String::new();
        loop {
            match self.chars.next() {
                None => return Err(PathError::UnterminatedQuote { offset: open }),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => key.push(escaped),
                    None => return Err(PathError::UnterminatedQuote { offset: open }),
                },
                Some((_, ch)) if ch == quote => return Ok(key),
                Some((_, ch)) => key.push(ch),
            }
        }
    }
}
