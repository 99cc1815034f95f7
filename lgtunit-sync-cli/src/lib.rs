// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `lgtunit-sync` command: reconcile lgtunit result files into a test tree, drive test runs
//! and print clause coverage.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
