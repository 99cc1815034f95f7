// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for lgtunit-sync.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "run" if `count` is 1, otherwise "runs".
    pub fn runs_str(count: usize) -> &'static str {
        if count == 1 { "run" } else { "runs" }
    }

    /// Returns "clause" if `count` is 1, otherwise "clauses".
    pub fn clauses_str(count: usize) -> &'static str {
        if count == 1 { "clause" } else { "clauses" }
    }
}

/// Lexically normalizes a path: removes `.` components and resolves `..` against preceding
/// components. The file system is not consulted.
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match out.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`.
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_str()),
        }
    }
    out
}

/// Returns true if `ancestor` is a strict, component-wise prefix of `path`.
pub(crate) fn is_strict_prefix(ancestor: &Utf8Path, path: &Utf8Path) -> bool {
    ancestor != path && path.starts_with(ancestor)
}

/// Converts a 1-based line number from a result file into a 0-based line.
pub(crate) fn zero_based(line: u32) -> u32 {
    line.saturating_sub(1)
}
