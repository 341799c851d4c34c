//! Pattern matching for `search` and `match_label`
//!
//! Patterns without regex metacharacters are matched by plain byte
//! containment; anything else is compiled as a regular expression. Callers
//! cannot tell the difference except by speed.

use memchr::memmem::Finder;
use regex::Regex;

use crate::error::{FlatDocError, Result};

/// Compiled pattern
#[derive(Debug)]
pub enum Matcher {
    Literal(Finder<'static>),
    Pattern(Regex),
}

impl Matcher {
    pub fn new(pattern: &str) -> Result<Self> {
        if regex::escape(pattern) == pattern {
            return Ok(Matcher::Literal(Finder::new(pattern.as_bytes()).into_owned()));
        }
        Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|e| FlatDocError::InvalidPattern(e.to_string()))
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Literal(finder) => finder.find(text.as_bytes()).is_some(),
            Matcher::Pattern(regex) => regex.is_match(text),
        }
    }

    /// True if the byte-containment fast path is in use
    pub fn is_literal(&self) -> bool {
        matches!(self, Matcher::Literal(_))
    }
}
