// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;

/// A single record read from a result file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResultRecord {
    /// The outcome of a single test.
    TestResult(TestResultRecord),

    /// A summary line for a test object.
    TestSummary(TestSummaryRecord),

    /// Clause coverage for a single predicate or grammar rule.
    Coverage(CoverageRecord),
}

impl ResultRecord {
    /// Returns the source file this record refers to.
    pub fn file(&self) -> &Utf8Path {
        match self {
            Self::TestResult(record) => &record.file,
            Self::TestSummary(record) => &record.file,
            Self::Coverage(record) => &record.file,
        }
    }

    /// Returns the 1-based line this record refers to.
    pub fn line(&self) -> u32 {
        match self {
            Self::TestResult(record) => record.line,
            Self::TestSummary(record) => record.line,
            Self::Coverage(record) => record.line,
        }
    }
}

/// `File:<path>;Line:<line>;Object:<object>;Test:<test>;Status:<status>`
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResultRecord {
    /// The file containing the test object.
    pub file: Utf8PathBuf,

    /// The 1-based line of the test clause.
    pub line: u32,

    /// The test object name, including any parameters.
    pub object: SmolStr,

    /// The test name.
    pub test: SmolStr,

    /// The status text, verbatim.
    pub status: String,
}

impl TestResultRecord {
    /// Classifies the status text of this record.
    pub fn test_status(&self) -> TestStatus<'_> {
        TestStatus::parse(&self.status)
    }
}

/// `File:<path>;Line:<line>;Object:<object>;Status:<status>`
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSummaryRecord {
    /// The file containing the test object.
    pub file: Utf8PathBuf,

    /// The 1-based line of the object opening directive.
    pub line: u32,

    /// The test object name, including any parameters.
    pub object: SmolStr,

    /// The status text, verbatim.
    pub status: String,
}

impl TestSummaryRecord {
    /// Extracts test counts from the status text, if it has any.
    pub fn counts(&self) -> Option<SummaryCounts> {
        SummaryCounts::parse(&self.status)
    }
}

/// `File:<path>;Line:<line>;Status:Tests clause coverage: <covered>/<total>[ - <detail>]`
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoverageRecord {
    /// The file containing the predicate definition.
    pub file: Utf8PathBuf,

    /// The 1-based line of the first clause of the predicate.
    pub line: u32,

    /// The number of covered clauses as reported by the runner.
    pub covered: u32,

    /// The total number of clauses.
    pub total: u32,

    /// The 1-based indexes of covered clauses, sorted and deduplicated.
    ///
    /// Empty for [`CoverageDetail::All`], where every clause up to `total` is covered.
    pub covered_indexes: Vec<u32>,

    /// How the covered indexes were written.
    pub detail: CoverageDetail,
}

impl CoverageRecord {
    /// Returns true if this record describes a dynamic predicate with no static clauses.
    ///
    /// Such records must be skipped: they are not "0 covered out of 0".
    pub fn is_dynamic(&self) -> bool {
        self.total == 0 && self.detail == CoverageDetail::Absent
    }

    /// Returns true if the 1-based clause `index` was covered.
    pub fn is_covered(&self, index: u32) -> bool {
        match self.detail {
            CoverageDetail::All => (1..=self.total).contains(&index),
            CoverageDetail::Absent | CoverageDetail::Explicit => {
                self.covered_indexes.binary_search(&index).is_ok()
            }
        }
    }
}

/// The shape of the detail suffix on a coverage line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageDetail {
    /// No ` - ...` suffix.
    Absent,

    /// ` - (all)`.
    All,

    /// ` - [i1,i2,...]`.
    Explicit,
}

/// The classified status of a [`TestResultRecord`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestStatus<'a> {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was skipped.
    Skipped,

    /// A status this crate doesn't know about.
    Other(&'a str),
}

impl<'a> TestStatus<'a> {
    /// Classifies a status string by its leading word.
    ///
    /// The runner may append details (for example `failed (assertion ...)`), so only the prefix is
    /// inspected.
    pub fn parse(status: &'a str) -> Self {
        let status = status.trim_start();
        let word = status
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default();
        if word.eq_ignore_ascii_case("passed") {
            Self::Passed
        } else if word.eq_ignore_ascii_case("failed") {
            Self::Failed
        } else if word.eq_ignore_ascii_case("skipped") {
            Self::Skipped
        } else {
            Self::Other(status)
        }
    }
}

impl fmt::Display for TestStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Other(status) => write!(f, "{status}"),
        }
    }
}

/// Test counts read from the status text of a [`TestSummaryRecord`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SummaryCounts {
    /// Number of skipped tests.
    pub skipped: u32,

    /// Number of passed tests.
    pub passed: u32,

    /// Number of failed tests.
    pub failed: u32,
}

impl SummaryCounts {
    /// Extracts `<n> skipped`, `<n> passed` and `<n> failed` counts from free text.
    ///
    /// Returns `None` if none of the three counts are present.
    pub fn parse(status: &str) -> Option<Self> {
        let mut counts = Self::default();
        let mut found = false;
        let mut prev: Option<u32> = None;

        for word in status.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
            if word.is_empty() {
                continue;
            }
            if let Ok(n) = word.parse::<u32>() {
                prev = Some(n);
                continue;
            }
            if let Some(n) = prev.take() {
                let slot = match word {
                    "skipped" => &mut counts.skipped,
                    "passed" => &mut counts.passed,
                    "failed" => &mut counts.failed,
                    _ => continue,
                };
                *slot = n;
                found = true;
            }
        }

        found.then_some(counts)
    }

    /// Returns the total number of tests.
    pub fn total(&self) -> u32 {
        self.skipped + self.passed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("passed", TestStatus::Passed; "bare passed")]
    #[test_case("failed (assertion X == 1)", TestStatus::Failed; "failed with reason")]
    #[test_case(" skipped", TestStatus::Skipped; "leading space")]
    #[test_case("PASSED", TestStatus::Passed; "upper case")]
    #[test_case("not run", TestStatus::Other("not run"); "unknown status")]
    fn test_status_parse(input: &str, expected: TestStatus<'_>) {
        assert_eq!(TestStatus::parse(input), expected);
    }

    #[test]
    fn summary_counts() {
        assert_eq!(
            SummaryCounts::parse("5 tests: 1 skipped, 3 passed, 1 failed (0 flaky)"),
            Some(SummaryCounts {
                skipped: 1,
                passed: 3,
                failed: 1,
            })
        );
        assert_eq!(
            SummaryCounts::parse("2 passed"),
            Some(SummaryCounts {
                skipped: 0,
                passed: 2,
                failed: 0,
            })
        );
        assert_eq!(SummaryCounts::parse("completed"), None);
        assert_eq!(SummaryCounts::parse("3 tests"), None);
    }
}
