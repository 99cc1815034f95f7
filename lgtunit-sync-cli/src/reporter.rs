// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use lgtunit_metadata::{TestResultRecord, TestStatus};
use lgtunit_sync::{events::RecordReporter, tree::ResultsOrigin};
use owo_colors::OwoColorize;
use std::{collections::BTreeMap, io};

/// Collects the non-passing results of each result file, for printing after a run.
#[derive(Debug, Default)]
pub(crate) struct FailureReporter {
    by_origin: BTreeMap<ResultsOrigin, Vec<TestResultRecord>>,
}

impl FailureReporter {
    pub(crate) fn is_empty(&self) -> bool {
        self.by_origin.values().all(Vec::is_empty)
    }

    /// Writes one line per reported test, failures first.
    pub(crate) fn write_to(
        &self,
        styles: &StderrStyles,
        mut writer: impl io::Write,
    ) -> io::Result<()> {
        let (failed, skipped): (Vec<_>, Vec<_>) = self
            .by_origin
            .values()
            .flatten()
            .partition(|record| record.test_status() != TestStatus::Skipped);

        for record in failed {
            writeln!(
                writer,
                "{:>8} {}::{} ({}:{})",
                "FAIL".style(styles.failed),
                record.object,
                record.test.style(styles.bold),
                record.file,
                record.line,
            )?;
            writeln!(writer, "         {}", record.status)?;
        }
        for record in skipped {
            writeln!(
                writer,
                "{:>8} {}::{}",
                "SKIP".style(styles.skipped),
                record.object,
                record.test,
            )?;
        }
        Ok(())
    }
}

impl RecordReporter for FailureReporter {
    fn clear(&mut self, origin: &ResultsOrigin) {
        self.by_origin.remove(origin);
    }

    fn report(&mut self, origin: &ResultsOrigin, record: &TestResultRecord) {
        self.by_origin
            .entry(origin.clone())
            .or_default()
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(test: &str, line: u32, status: &str) -> TestResultRecord {
        TestResultRecord {
            file: "/p/tests.lgt".into(),
            line,
            object: "tests".into(),
            test: test.into(),
            status: status.to_owned(),
        }
    }

    #[test]
    fn rerun_replaces_previous_reports() {
        let origin = ResultsOrigin::new("/p/.lgtunit/test_results.txt");
        let mut reporter = FailureReporter::default();
        reporter.report(&origin, &record("old", 3, "failed"));
        reporter.clear(&origin);
        assert!(reporter.is_empty());

        reporter.report(&origin, &record("skipped_one", 9, "skipped"));
        reporter.report(&origin, &record("bad", 5, "failed (expected 1)"));

        let mut out = Vec::new();
        reporter
            .write_to(&StderrStyles::default(), &mut out)
            .expect("writing to a Vec succeeds");
        assert_eq!(
            String::from_utf8(out).expect("output is UTF-8"),
            concat!(
                "    FAIL tests::bad (/p/tests.lgt:5)\n",
                "         failed (expected 1)\n",
                "    SKIP tests::skipped_one\n",
            )
        );
    }
}
