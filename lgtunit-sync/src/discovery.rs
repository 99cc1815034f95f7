// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding tests before they have ever been run.
//!
//! The workspace is crawled for directories containing the tester file, which become suite
//! directories, and for source files defining objects that extend `lgtunit`. The test clauses of
//! those objects are added to the tree without a run state. Nodes a result file has asserted are
//! left to that result file.

use crate::{
    clause::lexer::{ends_with_full_stop, first_argument, strip_line_comment},
    config::DiscoveryConfig,
    context::TestContext,
    errors::DiscoveryError,
    helpers::{normalize_path, plural},
    tree::TreeRecord,
};
use camino::{Utf8Path, Utf8PathBuf};
use smol_str::SmolStr;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Test dialects whose first argument names the test.
const TEST_HEADS: &[&str] = &[
    "test(",
    "succeeds(",
    "deterministic(",
    "fails(",
    "throws(",
    "quick_check(",
];

/// Opening directives are rarely longer than this.
const MAX_DIRECTIVE_LINES: usize = 20;

/// What a discovery crawl found.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Suite directories, in path order.
    pub suite_dirs: Vec<Utf8PathBuf>,

    /// The number of source files scanned.
    pub files_scanned: usize,

    /// The number of tests found.
    pub tests_found: usize,

    /// Entries that couldn't be visited or read. The rest of the crawl is unaffected.
    pub errors: Vec<DiscoveryError>,
}

/// Crawls `root`, adding it as a workspace and populating the tree with the tests found.
///
/// Hidden directories are skipped.
pub fn discover_workspace(
    cx: &mut TestContext,
    root: &Utf8Path,
    config: &DiscoveryConfig,
) -> DiscoveryReport {
    let root = normalize_path(root);
    cx.add_workspace(&root);

    let mut report = DiscoveryReport::default();
    let mut sources = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                report.errors.push(DiscoveryError::Walk {
                    root: root.clone(),
                    error,
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            report.errors.push(DiscoveryError::NonUtf8Path {
                path: entry.path().to_string_lossy().into_owned(),
            });
            continue;
        };

        if path.file_name() == Some(config.tester_file.as_str()) {
            if let Some(dir) = path.parent() {
                report.suite_dirs.push(dir.to_owned());
            }
        }
        if config.is_source_file(path) {
            sources.push(path.to_owned());
        }
    }

    report.suite_dirs.sort();
    for dir in &report.suite_dirs {
        cx.add_suite_dir(dir);
    }

    for source in sources {
        let text = match std::fs::read_to_string(&source) {
            Ok(text) => text,
            Err(error) => {
                report.errors.push(DiscoveryError::Read {
                    path: source,
                    error,
                });
                continue;
            }
        };
        report.files_scanned += 1;

        let records = scan_source(&source, &text);
        let tests = records
            .iter()
            .filter(|record| matches!(record, TreeRecord::Test { .. }))
            .count();
        report.tests_found += tests;
        if tests > 0 {
            debug!("{source}: found {tests} {}", plural::tests_str(tests));
        }
        cx.apply_discovered(&source, records);
    }

    info!(
        "discovered {} {} in {} suite directories under {root}",
        report.tests_found,
        plural::tests_str(report.tests_found),
        report.suite_dirs.len(),
    );
    report
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Scans Logtalk source for objects extending `lgtunit` and their test clauses.
///
/// The file itself is always returned first, so a file whose tests were all removed is pruned.
pub fn scan_source(file: &Utf8Path, text: &str) -> Vec<TreeRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = vec![TreeRecord::File {
        file: file.to_owned(),
    }];

    let mut object: Option<SmolStr> = None;
    let mut at_clause_start = true;
    let mut idx = 0;
    while idx < lines.len() {
        let code = strip_line_comment(lines[idx]).trim();
        if code.is_empty() {
            idx += 1;
            continue;
        }

        match &object {
            None => {
                if code.starts_with(":-") {
                    let (directive, end) = directive_at(&lines, idx);
                    if let Some(name) = test_object_name(&directive) {
                        records.push(TreeRecord::Object {
                            file: file.to_owned(),
                            line: line_u32(idx),
                            object: name.clone(),
                            counts: None,
                        });
                        object = Some(name);
                    }
                    idx = end + 1;
                    at_clause_start = true;
                    continue;
                }
            }
            Some(_) if is_entity_end(code) => {
                object = None;
            }
            Some(name) => {
                if at_clause_start {
                    if let Some(test) = test_name(code) {
                        records.push(TreeRecord::Test {
                            file: file.to_owned(),
                            line: line_u32(idx),
                            object: name.clone(),
                            test: test.into(),
                            outcome: None,
                        });
                    }
                }
            }
        }
        at_clause_start = ends_with_full_stop(code);
        idx += 1;
    }
    records
}

/// Joins the lines of the directive starting at `start`, returning it and its last line.
fn directive_at(lines: &[&str], start: usize) -> (String, usize) {
    let mut directive = String::new();
    let last = (start + MAX_DIRECTIVE_LINES).min(lines.len()) - 1;
    for (idx, line) in lines.iter().enumerate().take(last + 1).skip(start) {
        let code = strip_line_comment(line).trim();
        directive.push_str(code);
        directive.push(' ');
        if ends_with_full_stop(code) {
            return (directive, idx);
        }
    }
    (directive, last)
}

/// Returns the object name if `directive` opens an object that extends `lgtunit`.
fn test_object_name(directive: &str) -> Option<SmolStr> {
    let args = directive
        .strip_prefix(":-")?
        .trim_start()
        .strip_prefix("object(")?;
    let compact: String = args.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.contains("extends(lgtunit)") && !compact.contains("extends(public::lgtunit)") {
        return None;
    }
    first_argument(args)
        .filter(|name| !name.is_empty())
        .map(SmolStr::new)
}

fn is_entity_end(code: &str) -> bool {
    code.strip_prefix(":-").is_some_and(|rest| {
        let rest = rest.trim_start();
        rest.starts_with("end_object") || rest.starts_with("end_category")
    })
}

/// Returns the test name if `code` starts a test clause.
///
/// Skipped tests are written with a leading `- `.
fn test_name(code: &str) -> Option<&str> {
    let code = code.strip_prefix("- ").unwrap_or(code).trim_start();
    TEST_HEADS.iter().find_map(|head| {
        let args = code.strip_prefix(head)?;
        first_argument(args).filter(|name| !name.is_empty())
    })
}

fn line_u32(idx: usize) -> u32 {
    u32::try_from(idx).unwrap_or(u32::MAX)
}
