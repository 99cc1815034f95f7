// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs against a fake test runner that writes result files and markers into a temporary
//! workspace.

mod fixtures;
mod runs;
