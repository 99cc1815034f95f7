// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use lgtunit_metadata::LgtunitExitCode;
use lgtunit_sync::{
    errors::{ConfigParseError, ReadResultsError, SourceLoadError},
    helpers::plural,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are printed with display_to_stderr, which
// colorizes them.

/// An error that lgtunit-sync knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid { error: std::io::Error },
    #[error("current directory is not valid UTF-8")]
    CurrentDirNotUtf8 { path: String },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to read results")]
    ReadResultsError {
        #[from]
        err: ReadResultsError,
    },
    #[error("failed to load source")]
    SourceLoadError {
        #[from]
        err: SourceLoadError,
    },
    #[error("no coverage for source file")]
    NoCoverage { file: Utf8PathBuf },
    #[error("selection not found")]
    SelectionNotFound { description: String },
    #[error("failed to build async runtime")]
    RuntimeBuildError { error: std::io::Error },
    #[error("failed to serialize output")]
    SerializeError { error: serde_json::Error },
    #[error("failed to write output")]
    WriteError { error: std::io::Error },
    #[error("no tests to run")]
    NoTestsRun,
    #[error("test run failed")]
    TestRunFailed { failed: usize },
    #[error("runs abandoned")]
    RunsAbandoned {
        timed_out: usize,
        unreadable: usize,
        not_dispatched: usize,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirNotUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::SelectionNotFound { .. }
            | Self::RuntimeBuildError { .. } => LgtunitExitCode::SETUP_ERROR,
            Self::ReadResultsError { .. }
            | Self::SourceLoadError { .. }
            | Self::NoCoverage { .. } => LgtunitExitCode::READ_ERROR,
            Self::SerializeError { .. } | Self::WriteError { .. } => {
                LgtunitExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NoTestsRun => LgtunitExitCode::NO_TESTS_RUN,
            Self::TestRunFailed { .. } => LgtunitExitCode::TEST_RUN_FAILED,
            Self::RunsAbandoned {
                timed_out,
                unreadable,
                ..
            } => {
                if *timed_out > 0 {
                    LgtunitExitCode::RUN_TIMED_OUT
                } else if *unreadable > 0 {
                    LgtunitExitCode::READ_ERROR
                } else {
                    LgtunitExitCode::SETUP_ERROR
                }
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirInvalid { error } => {
                error!("could not determine the current directory");
                Some(error as &dyn Error)
            }
            Self::CurrentDirNotUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ReadResultsError { err } => {
                error!("failed to read `{}`", err.path.style(styles.bold));
                Some(&err.error as &dyn Error)
            }
            Self::SourceLoadError { err } => {
                error!("failed to load `{}`", err.path.style(styles.bold));
                Some(&err.error as &dyn Error)
            }
            Self::NoCoverage { file } => {
                error!("no coverage recorded for `{}`", file.style(styles.bold));
                None
            }
            Self::SelectionNotFound { description } => {
                error!(
                    "{} was not found among the discovered tests",
                    description.style(styles.bold)
                );
                None
            }
            Self::RuntimeBuildError { error } => {
                error!("failed to initialize the async runtime");
                Some(error as &dyn Error)
            }
            Self::SerializeError { error } => {
                error!("failed to serialize output");
                Some(error as &dyn Error)
            }
            Self::WriteError { error } => {
                error!("failed to write to output");
                Some(error as &dyn Error)
            }
            Self::NoTestsRun => {
                error!("no tests to run");
                None
            }
            Self::TestRunFailed { failed } => {
                error!(
                    "test run failed: {} {} failed",
                    failed.style(styles.failed),
                    plural::tests_str(*failed),
                );
                None
            }
            Self::RunsAbandoned {
                timed_out,
                unreadable,
                not_dispatched,
            } => {
                let count = timed_out + unreadable + not_dispatched;
                error!(
                    "{} {} abandoned ({} timed out, {} unreadable, {} not dispatched)",
                    count.style(styles.failed),
                    plural::runs_str(count),
                    timed_out,
                    unreadable,
                    not_dispatched,
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
