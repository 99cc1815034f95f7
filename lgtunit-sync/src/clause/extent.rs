// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    LineRange, SourceText,
    lexer::{ends_with_full_stop, strip_line_comment},
};

/// Finds the line extent of single clauses.
pub trait ClauseExtents {
    /// Returns the lines of the next clause at or after the 0-based line `from`.
    ///
    /// Blank lines and comments before the clause are skipped. Returns `None` at the end of the
    /// enclosing entity or of the source.
    fn next_clause(&self, source: &SourceText<'_>, from: u32) -> Option<LineRange>;
}

/// A [`ClauseExtents`] that reads Logtalk source text directly.
///
/// A clause ends on the first line whose code ends with a full stop.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceClauseExtents;

impl SourceClauseExtents {
    fn is_entity_end(code: &str) -> bool {
        code.strip_prefix(":-").is_some_and(|directive| {
            let directive = directive.trim_start();
            ["end_object", "end_category", "end_protocol"]
                .iter()
                .any(|end| directive.starts_with(end))
        })
    }
}

impl ClauseExtents for SourceClauseExtents {
    fn next_clause(&self, source: &SourceText<'_>, from: u32) -> Option<LineRange> {
        let mut line = from;
        let mut in_block_comment = false;
        let start = loop {
            let code = source.line(line)?.trim();
            if in_block_comment {
                in_block_comment = !code.contains("*/");
            } else if code.starts_with("/*") {
                in_block_comment = !code.contains("*/");
            } else if !strip_line_comment(code).trim().is_empty() {
                break line;
            }
            line += 1;
        };

        if Self::is_entity_end(strip_line_comment(source.line(start)?).trim()) {
            return None;
        }
        for end in start..source.line_count() {
            if ends_with_full_stop(strip_line_comment(source.line(end)?)) {
                return Some(LineRange { start, end });
            }
        }
        None
    }
}
