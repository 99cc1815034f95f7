// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by lgtunit-sync.

use crate::runner::RunTarget;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse lgtunit-sync config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while reading a result file.
///
/// A result file that doesn't exist is not an error: it is treated as a file with no records.
#[derive(Debug, Error)]
#[error("failed to read result file `{path}`")]
pub struct ReadResultsError {
    /// The result file path.
    pub path: Utf8PathBuf,

    /// The underlying error.
    #[source]
    pub error: std::io::Error,
}

/// An error that occurred while loading a source file for coverage projection.
#[derive(Debug, Error)]
#[error("failed to load source file `{path}`")]
pub struct SourceLoadError {
    /// The source file path.
    pub path: Utf8PathBuf,

    /// The underlying error.
    #[source]
    pub error: std::io::Error,
}

/// A run that didn't produce results.
///
/// Each error is scoped to the subtree of its target; sibling runs are unaffected.
#[derive(Debug, Error)]
pub enum RunError {
    /// The marker file never appeared.
    #[error("{target}: no completion marker after {}", humantime_duration(*timeout))]
    Timeout {
        /// The run target.
        target: RunTarget,

        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The test runner couldn't be started.
    #[error("{target}: failed to dispatch test runner")]
    Dispatch {
        /// The run target.
        target: RunTarget,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The run was cancelled before it was dispatched.
    #[error("{target}: cancelled before dispatch")]
    Cancelled {
        /// The run target.
        target: RunTarget,
    },

    /// The marker appeared but the result file couldn't be read.
    #[error("{target}: results unavailable")]
    ReadResults {
        /// The run target.
        target: RunTarget,

        /// The underlying error.
        #[source]
        error: ReadResultsError,
    },
}

impl RunError {
    /// Returns the target of the failed run.
    pub fn target(&self) -> &RunTarget {
        match self {
            Self::Timeout { target, .. }
            | Self::Dispatch { target, .. }
            | Self::Cancelled { target }
            | Self::ReadResults { target, .. } => target,
        }
    }
}

/// An error that occurred while crawling a workspace for tests.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Walking the directory tree failed.
    #[error("failed to walk `{root}`")]
    Walk {
        /// The root being walked.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path found during the walk wasn't valid UTF-8.
    #[error("path `{path}` is not valid UTF-8")]
    NonUtf8Path {
        /// The path, lossily converted.
        path: String,
    },

    /// A source file couldn't be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

fn humantime_duration(duration: Duration) -> String {
    humantime_serde::re::humantime::format_duration(duration).to_string()
}

/// Displays an error along with its chain of sources on a single line.
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new chain display for `error`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
