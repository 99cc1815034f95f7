// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the result files written by the lgtunit test runner.
//!
//! A result file is line oriented. Each line is one of three records:
//!
//! ```text
//! File:<path>;Line:<line>;Object:<object>;Test:<test>;Status:<status>
//! File:<path>;Line:<line>;Object:<object>;Status:<status>
//! File:<path>;Line:<line>;Status:Tests clause coverage: <covered>/<total>[ - (all) | - [i1,i2,...]]
//! ```
//!
//! Lines that match none of these shapes are ignored. Use [`ResultFile::parse`] to turn a result
//! file into [`ResultRecord`]s.

mod exit_codes;
mod parse;
mod records;

pub use exit_codes::*;
pub use parse::*;
pub use records::*;
