// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Clause coverage.
//!
//! The runner reports coverage per predicate: the line of its first clause, a count of covered
//! clauses and which clause numbers were covered. [`CoverageMap`] holds those records per file,
//! and [`CoverageProjector`] maps them onto the source ranges of individual clauses on request.

use crate::{
    clause::{ClauseExtents, ClauseIndicator, ConsecutiveClauseGrouper, LineRange, SourceText},
    helpers::{normalize_path, plural, zero_based},
};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use lgtunit_metadata::CoverageRecord;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A 0-based line and character offset.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Position {
    /// The line.
    pub line: u32,
    /// The character within the line.
    pub character: u32,
}

/// A range of source text, end exclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SourceRange {
    /// The start of the range.
    pub start: Position,
    /// The end of the range.
    pub end: Position,
}

impl SourceRange {
    fn from_lines(source: &SourceText<'_>, lines: LineRange) -> Self {
        let end_character = source
            .line(lines.end)
            .map_or(0, |line| u32::try_from(line.chars().count()).unwrap_or(u32::MAX));
        Self {
            start: Position {
                line: lines.start,
                character: 0,
            },
            end: Position {
                line: lines.end,
                character: end_character,
            },
        }
    }
}

/// Coverage of a single clause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClauseCoverage {
    /// The predicate or grammar rule the clause belongs to.
    pub indicator: ClauseIndicator,
    /// The 1-based clause number within its predicate.
    pub clause_index: u32,
    /// The source range of the clause.
    pub range: SourceRange,
    /// 1 if the clause was covered, otherwise 0.
    pub execution_count: u32,
}

/// Per-clause coverage for one file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileCoverage {
    /// The file.
    pub file: Utf8PathBuf,
    /// Clauses in record order.
    pub clauses: Vec<ClauseCoverage>,
    /// 1-based lines of records that couldn't be mapped to source.
    pub unresolved: Vec<u32>,
}

impl FileCoverage {
    /// Returns the number of covered clauses.
    pub fn covered(&self) -> usize {
        self.clauses
            .iter()
            .filter(|clause| clause.execution_count > 0)
            .count()
    }
}

/// Covered and total clause counts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoverageSummary {
    /// Covered clauses.
    pub covered: u32,
    /// Total clauses.
    pub total: u32,
}

/// Coverage records by file.
#[derive(Clone, Debug, Default)]
pub struct CoverageMap {
    files: BTreeMap<Utf8PathBuf, Vec<CoverageRecord>>,
}

impl CoverageMap {
    /// Replaces the records of every file that `records` has coverage for.
    ///
    /// Files without records in this pass keep their previous records. Returns the new summary
    /// of each replaced file.
    pub fn replace_from<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a CoverageRecord>,
    ) -> Vec<(Utf8PathBuf, CoverageSummary)> {
        let by_file = records
            .into_iter()
            .into_group_map_by(|record| normalize_path(&record.file));

        by_file
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(file, records)| {
                let records: Vec<_> = records.into_iter().cloned().collect();
                let summary = summarize(&records);
                self.files.insert(file.clone(), records);
                (file, summary)
            })
            .collect()
    }

    /// Returns the records for `file`.
    pub fn records(&self, file: &Utf8Path) -> Option<&[CoverageRecord]> {
        self.files.get(&normalize_path(file)).map(Vec::as_slice)
    }

    /// Returns the covered and total clause counts for `file`.
    pub fn summary(&self, file: &Utf8Path) -> Option<CoverageSummary> {
        self.records(file).map(summarize)
    }

    /// Iterates over files with coverage, in path order.
    pub fn files(&self) -> impl Iterator<Item = &Utf8Path> {
        self.files.keys().map(|file| file.as_path())
    }
}

fn summarize(records: &[CoverageRecord]) -> CoverageSummary {
    records
        .iter()
        .filter(|record| !record.is_dynamic())
        .fold(CoverageSummary::default(), |acc, record| CoverageSummary {
            covered: acc.covered + record.covered,
            total: acc.total + record.total,
        })
}

/// Projects coverage records onto clause ranges.
#[derive(Clone, Copy, Debug)]
pub struct CoverageProjector<'e, E: ?Sized> {
    grouper: ConsecutiveClauseGrouper<'e, E>,
}

impl<'e, E: ClauseExtents + ?Sized> CoverageProjector<'e, E> {
    /// Creates a projector that finds clause extents with `extents`.
    pub fn new(extents: &'e E) -> Self {
        Self {
            grouper: ConsecutiveClauseGrouper::new(extents),
        }
    }

    /// Computes per-clause coverage for `file` from its records and current source text.
    ///
    /// Records for dynamic predicates are skipped. Records whose clause head can't be resolved
    /// are logged and listed in [`FileCoverage::unresolved`].
    pub fn project(&self, file: &Utf8Path, records: &[CoverageRecord], text: &str) -> FileCoverage {
        let source = SourceText::new(text);
        let mut out = FileCoverage {
            file: file.to_owned(),
            ..Default::default()
        };

        for record in records {
            if record.is_dynamic() || record.total == 0 {
                continue;
            }
            let line = zero_based(record.line);
            let Some(indicator) = ClauseIndicator::resolve(&source, line) else {
                warn!(
                    "{file}:{}: could not resolve the clause head for coverage, skipping",
                    record.line,
                );
                out.unresolved.push(record.line);
                continue;
            };

            let ranges = self.grouper.group(&source, &indicator, line);
            if ranges.len() != record.total as usize {
                debug!(
                    "{file}:{}: {indicator} has {} {} in source, {} reported",
                    record.line,
                    ranges.len(),
                    plural::clauses_str(ranges.len()),
                    record.total,
                );
            }
            for (clause_index, range) in (1..=record.total).zip(ranges) {
                out.clauses.push(ClauseCoverage {
                    indicator: indicator.clone(),
                    clause_index,
                    range: SourceRange::from_lines(&source, range),
                    execution_count: u32::from(record.is_covered(clause_index)),
                });
            }
        }
        out
    }
}
