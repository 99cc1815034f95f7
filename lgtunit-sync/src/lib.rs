// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Keeps a tree of Logtalk tests in sync with the result files written by the lgtunit runner,
//! and projects clause coverage onto source.
//!
//! The basic flow:
//!
//! 1. Create a [`TestContext`](context::TestContext) with the workspace roots, and optionally
//!    populate it with [`discover_workspace`](discovery::discover_workspace).
//! 2. Run a selection of nodes with a [`RunCoordinator`](runner::RunCoordinator). Each run is
//!    dispatched through a [`TestRunner`](runner::TestRunner); once its completion marker
//!    appears, its result file is reconciled into the tree.
//! 3. Ask the context for [detailed coverage](context::TestContext::detailed_coverage) of a
//!    source file.
//!
//! Changes are published to a [`TreeObserver`](events::TreeObserver) in batches.

pub mod clause;
pub mod config;
pub mod context;
pub mod coverage;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod runner;
pub mod tree;
