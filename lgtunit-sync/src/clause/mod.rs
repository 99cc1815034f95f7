// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locating clauses in Logtalk source text.
//!
//! - [`ClauseIndicator::resolve`] reads the head of the clause starting at a line and returns its
//!   `Name/Arity` or `Name//Arity` indicator.
//! - A [`ClauseExtents`] implementation finds the line range of each clause.
//! - [`ConsecutiveClauseGrouper`] combines the two to find all the clauses of a predicate that
//!   follow its first clause.

mod extent;
mod group;
mod indicator;
pub(crate) mod lexer;

pub use extent::*;
pub use group::*;
pub use indicator::*;

/// Source text split into lines.
#[derive(Clone, Debug)]
pub struct SourceText<'a> {
    lines: Vec<&'a str>,
}

impl<'a> SourceText<'a> {
    /// Splits `text` into lines. `\r\n` and `\n` are both accepted.
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
        }
    }

    /// Returns the 0-based line `line`, if it exists.
    pub fn line(&self, line: u32) -> Option<&'a str> {
        self.lines.get(line as usize).copied()
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }
}

/// An inclusive range of 0-based lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineRange {
    /// The first line.
    pub start: u32,

    /// The last line, inclusive.
    pub end: u32,
}
