// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    CoverageDetail, CoverageRecord, ResultRecord, TestResultRecord, TestSummaryRecord,
};
use camino::Utf8PathBuf;
use std::{error, fmt, num::ParseIntError};

const COVERAGE_PREFIX: &str = "Tests clause coverage: ";

/// The records read from one result file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultFile {
    /// Records in file order.
    pub records: Vec<ResultRecord>,

    /// Lines that matched one of the record shapes but couldn't be parsed.
    ///
    /// These lines are dropped; they are kept here for diagnostics only.
    pub malformed: Vec<MalformedLine>,
}

impl ResultFile {
    /// Parses the full text of a result file.
    ///
    /// Never fails: lines matching no record shape are ignored, and lines with bad numeric fields
    /// are recorded in [`Self::malformed`] and otherwise dropped.
    pub fn parse(text: &str) -> Self {
        let mut out = Self::default();
        for (idx, line) in text.lines().enumerate() {
            match parse_line(line) {
                Some(Ok(record)) => out.records.push(record),
                Some(Err(error)) => out.malformed.push(MalformedLine {
                    line_number: idx + 1,
                    error,
                }),
                None => {}
            }
        }
        out
    }

    /// Returns the test result and test summary records, skipping coverage.
    pub fn test_records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records
            .iter()
            .filter(|record| !matches!(record, ResultRecord::Coverage(_)))
    }

    /// Returns the coverage records.
    pub fn coverage_records(&self) -> impl Iterator<Item = &CoverageRecord> {
        self.records.iter().filter_map(|record| match record {
            ResultRecord::Coverage(record) => Some(record),
            _ => None,
        })
    }
}

/// A result file line that was recognized but couldn't be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MalformedLine {
    /// The 1-based line number within the result file.
    pub line_number: usize,

    /// Why the line was dropped.
    pub error: LineParseError,
}

/// Parses a single result file line.
///
/// The three record shapes are tried in order: test result, test summary, coverage. Returns `None`
/// if the line matches none of them.
pub fn parse_line(line: &str) -> Option<Result<ResultRecord, LineParseError>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(res) = lex_test_result(line) {
        return Some(res.map(ResultRecord::TestResult));
    }
    if let Some(res) = lex_test_summary(line) {
        return Some(res.map(ResultRecord::TestSummary));
    }
    lex_coverage(line).map(|res| res.map(ResultRecord::Coverage))
}

/// Splits `File:<path>;Line:<line>;<rest>`.
fn lex_file_line(line: &str) -> Option<(&str, &str, &str)> {
    let rest = line.strip_prefix("File:")?;
    let (file, rest) = rest.split_once(";Line:")?;
    let (line_no, rest) = rest.split_once(';')?;
    Some((file, line_no, rest))
}

fn lex_test_result(line: &str) -> Option<Result<TestResultRecord, LineParseError>> {
    let (file, line_no, rest) = lex_file_line(line)?;
    let rest = rest.strip_prefix("Object:")?;
    let (object, rest) = rest.split_once(";Test:")?;
    let (test, status) = rest.split_once(";Status:")?;

    Some(parse_line_number(line_no).map(|line| TestResultRecord {
        file: Utf8PathBuf::from(file),
        line,
        object: object.into(),
        test: test.into(),
        status: status.to_owned(),
    }))
}

fn lex_test_summary(line: &str) -> Option<Result<TestSummaryRecord, LineParseError>> {
    let (file, line_no, rest) = lex_file_line(line)?;
    let rest = rest.strip_prefix("Object:")?;
    let (object, status) = rest.split_once(";Status:")?;

    Some(parse_line_number(line_no).map(|line| TestSummaryRecord {
        file: Utf8PathBuf::from(file),
        line,
        object: object.into(),
        status: status.to_owned(),
    }))
}

fn lex_coverage(line: &str) -> Option<Result<CoverageRecord, LineParseError>> {
    let (file, line_no, rest) = lex_file_line(line)?;
    let status = rest.strip_prefix("Status:")?;
    let coverage = status.strip_prefix(COVERAGE_PREFIX)?;

    Some(parse_coverage(file, line_no, coverage))
}

fn parse_coverage(
    file: &str,
    line_no: &str,
    coverage: &str,
) -> Result<CoverageRecord, LineParseError> {
    let line = parse_line_number(line_no)?;
    let (counts, detail) = match coverage.split_once(" - ") {
        Some((counts, detail)) => (counts, Some(detail.trim())),
        None => (coverage, None),
    };
    let (covered, total) = counts
        .trim()
        .split_once('/')
        .ok_or_else(|| LineParseError::CoverageCounts(counts.to_owned()))?;
    let covered = parse_count(covered)?;
    let total = parse_count(total)?;

    let (detail, covered_indexes) = match detail {
        None => (CoverageDetail::Absent, Vec::new()),
        Some("(all)") => (CoverageDetail::All, Vec::new()),
        Some(list) => (CoverageDetail::Explicit, parse_index_list(list)?),
    };

    Ok(CoverageRecord {
        file: Utf8PathBuf::from(file),
        line,
        covered,
        total,
        covered_indexes,
        detail,
    })
}

fn parse_index_list(list: &str) -> Result<Vec<u32>, LineParseError> {
    let inner = list
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| LineParseError::CoverageDetail(list.to_owned()))?;

    let mut indexes = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_count)
        .collect::<Result<Vec<_>, _>>()?;
    indexes.sort_unstable();
    indexes.dedup();
    Ok(indexes)
}

fn parse_line_number(input: &str) -> Result<u32, LineParseError> {
    input
        .trim()
        .parse()
        .map_err(|error| LineParseError::LineNumber {
            input: input.to_owned(),
            error,
        })
}

fn parse_count(input: &str) -> Result<u32, LineParseError> {
    input
        .trim()
        .parse()
        .map_err(|error| LineParseError::Count {
            input: input.to_owned(),
            error,
        })
}

/// An error that caused a result file line to be dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LineParseError {
    /// The `Line:` field wasn't an integer.
    LineNumber {
        /// The field text.
        input: String,

        /// The underlying error.
        error: ParseIntError,
    },

    /// A coverage count or clause index wasn't an integer.
    Count {
        /// The field text.
        input: String,

        /// The underlying error.
        error: ParseIntError,
    },

    /// The coverage counts weren't of the form `<covered>/<total>`.
    CoverageCounts(String),

    /// The coverage detail was neither `(all)` nor a bracketed list.
    CoverageDetail(String),
}

impl fmt::Display for LineParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LineNumber { input, .. } => write!(f, "invalid line number `{input}`"),
            Self::Count { input, .. } => write!(f, "invalid coverage count `{input}`"),
            Self::CoverageCounts(input) => {
                write!(f, "coverage counts `{input}` are not of the form <covered>/<total>")
            }
            Self::CoverageDetail(input) => {
                write!(f, "coverage detail `{input}` is neither `(all)` nor `[...]`")
            }
        }
    }
}

impl error::Error for LineParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::LineNumber { error, .. } | Self::Count { error, .. } => Some(error),
            Self::CoverageCounts(_) | Self::CoverageDetail(_) => None,
        }
    }
}
