// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running tests.
//!
//! A run request is planned into the smallest set of runner invocations covering the selection
//! (see [`plan_runs`]). Each invocation is dispatched through a [`TestRunner`], which starts the
//! run and returns. The runner signals completion by creating a marker file next to the result
//! file. [`RunCoordinator`] polls for the marker, then reads the result file and reconciles the
//! tree.

mod command;
mod coordinator;
mod marker;
mod plan;

pub use command::*;
pub use coordinator::*;
pub use plan::*;

use camino::{Utf8Path, Utf8PathBuf};
use smol_str::SmolStr;
use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// What a single runner invocation runs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RunTarget {
    /// Every test suite under a workspace root.
    All {
        /// The workspace root.
        scope: Utf8PathBuf,
    },

    /// The test suite in a directory.
    Directory {
        /// The directory.
        dir: Utf8PathBuf,
    },

    /// The tests in one file.
    File {
        /// The file.
        file: Utf8PathBuf,
    },

    /// The tests of one test object.
    Object {
        /// The file containing the object.
        file: Utf8PathBuf,

        /// The object name.
        object: SmolStr,
    },

    /// A single test.
    Test {
        /// The file containing the test.
        file: Utf8PathBuf,

        /// The object name.
        object: SmolStr,

        /// The test name.
        test: SmolStr,
    },
}

impl RunTarget {
    /// Returns a short name for the kind of target.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::All { .. } => "all",
            Self::Directory { .. } => "directory",
            Self::File { .. } => "file",
            Self::Object { .. } => "object",
            Self::Test { .. } => "test",
        }
    }

    /// Returns the path the target is scoped to.
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::All { scope } => scope,
            Self::Directory { dir } => dir,
            Self::File { file } | Self::Object { file, .. } | Self::Test { file, .. } => file,
        }
    }

    /// Starts this run through `runner`.
    pub fn dispatch<R: TestRunner + ?Sized>(
        &self,
        runner: &R,
        outputs: &RunOutputs,
    ) -> io::Result<()> {
        match self {
            Self::All { scope } => runner.run_all(scope, outputs),
            Self::Directory { dir } => runner.run_directory(dir, outputs),
            Self::File { file } => runner.run_file(file, outputs),
            Self::Object { file, object } => runner.run_object(file, object, outputs),
            Self::Test { file, object, test } => runner.run_test(file, object, test, outputs),
        }
    }
}

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All { scope } => write!(f, "workspace {scope}"),
            Self::Directory { dir } => write!(f, "directory {dir}"),
            Self::File { file } => write!(f, "file {file}"),
            Self::Object { file, object } => write!(f, "object {object} in {file}"),
            Self::Test { file, object, test } => write!(f, "test {object}::{test} in {file}"),
        }
    }
}

/// The files a run writes to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutputs {
    /// The directory the run is executed in.
    pub results_dir: Utf8PathBuf,

    /// The scratch directory holding the result file and marker.
    pub scratch_dir: Utf8PathBuf,

    /// The result file.
    pub results_file: Utf8PathBuf,

    /// The marker created once the result file is complete.
    pub marker: Utf8PathBuf,
}

/// Starts test runs.
///
/// Each method returns once the run has been started. The run must write its results to
/// `outputs.results_file` and then create `outputs.marker`.
pub trait TestRunner {
    /// Runs every test suite under a workspace root.
    fn run_all(&self, scope: &Utf8Path, outputs: &RunOutputs) -> io::Result<()>;

    /// Runs the test suite in a directory.
    fn run_directory(&self, dir: &Utf8Path, outputs: &RunOutputs) -> io::Result<()>;

    /// Runs the tests in a file.
    fn run_file(&self, file: &Utf8Path, outputs: &RunOutputs) -> io::Result<()>;

    /// Runs the tests of one object.
    fn run_object(&self, file: &Utf8Path, object: &str, outputs: &RunOutputs) -> io::Result<()>;

    /// Runs a single test.
    fn run_test(
        &self,
        file: &Utf8Path,
        object: &str,
        test: &str,
        outputs: &RunOutputs,
    ) -> io::Result<()>;
}

/// A cooperative cancellation flag, checked before each run is dispatched.
///
/// Runs that were already dispatched are not interrupted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
