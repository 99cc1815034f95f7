// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `lgtunit-sync` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum LgtunitExitCode {}

impl LgtunitExitCode {
    /// No errors occurred and the command exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// One or more runs did not signal completion before the marker timeout.
    pub const RUN_TIMED_OUT: i32 = 101;

    /// A result file or source file could not be read.
    pub const READ_ERROR: i32 = 102;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up an invocation.
    pub const SETUP_ERROR: i32 = 96;
}
