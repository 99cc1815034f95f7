// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ClauseExtents, ClauseIndicator, LineRange, SourceText};

/// Collects the consecutive clauses of one predicate or grammar rule.
#[derive(Clone, Copy, Debug)]
pub struct ConsecutiveClauseGrouper<'e, E: ?Sized> {
    extents: &'e E,
}

impl<'e, E: ClauseExtents + ?Sized> ConsecutiveClauseGrouper<'e, E> {
    /// Creates a grouper that finds clause extents with `extents`.
    pub fn new(extents: &'e E) -> Self {
        Self { extents }
    }

    /// Returns the ranges of the clauses of `indicator`, starting with the clause at `start`.
    ///
    /// Grouping stops at the first clause with a different indicator, at a clause whose
    /// indicator can't be resolved, and at the end of the enclosing entity. Index `i` in the
    /// result is clause number `i + 1`.
    pub fn group(
        &self,
        source: &SourceText<'_>,
        indicator: &ClauseIndicator,
        start: u32,
    ) -> Vec<LineRange> {
        let mut ranges = Vec::new();
        let mut from = start;
        while let Some(range) = self.extents.next_clause(source, from) {
            if ClauseIndicator::resolve(source, range.start).as_ref() != Some(indicator) {
                break;
            }
            ranges.push(range);
            from = range.end + 1;
        }
        ranges
    }
}
