// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The explicit state shared by the run coordinator, discovery and the presentation layer.

use crate::{
    clause::{ClauseExtents, SourceClauseExtents},
    coverage::{CoverageMap, CoverageProjector, FileCoverage},
    errors::{ReadResultsError, SourceLoadError},
    events::{NoopObserver, TreeEvent, TreeObserver},
    helpers::normalize_path,
    tree::{
        InvalidationTracker, NodeId, ReconcileReport, ResultsOrigin, RunState, TestTree,
        TreeRecord, TreeSynchronizer, tree_records,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use lgtunit_metadata::ResultFile;
use std::{fmt, io};
use tracing::{debug, trace};

/// The test tree, the coverage map, and where changes to them are published.
pub struct TestContext {
    tree: TestTree,
    coverage: CoverageMap,
    observer: Box<dyn TreeObserver>,
}

impl TestContext {
    /// Creates a new context with one workspace node per root.
    pub fn new(workspace_roots: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        let roots = workspace_roots
            .into_iter()
            .map(|root| normalize_path(&root));
        Self {
            tree: TestTree::new(roots),
            coverage: CoverageMap::default(),
            observer: Box::new(NoopObserver),
        }
    }

    /// Publishes changes to `observer` from now on.
    pub fn with_observer(mut self, observer: impl TreeObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Returns the test tree.
    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    /// Returns the coverage map.
    pub fn coverage(&self) -> &CoverageMap {
        &self.coverage
    }

    /// Adds a workspace root.
    pub fn add_workspace(&mut self, root: &Utf8Path) {
        let (_, event) = self.tree.ensure_workspace(&normalize_path(root));
        if let Some(event) = event {
            self.publish(&[event]);
        }
    }

    /// Adds a node for a test suite directory, if it is below a workspace root.
    pub fn add_suite_dir(&mut self, dir: &Utf8Path) -> Option<NodeId> {
        let (id, event) = self.tree.ensure_directory(&normalize_path(dir))?;
        if let Some(event) = event {
            self.publish(&[event]);
        }
        Some(id)
    }

    /// Reconciles the tree and coverage map against a parsed result file.
    pub fn apply_result_file(
        &mut self,
        origin: &ResultsOrigin,
        suite_dir: Option<&Utf8Path>,
        file: &ResultFile,
    ) -> ReconcileReport {
        if !file.malformed.is_empty() {
            for malformed in &file.malformed {
                trace!("{origin}:{}: {}", malformed.line_number, malformed.error);
            }
            debug!(
                "{origin}: skipped {} malformed lines",
                file.malformed.len()
            );
        }

        let mut report =
            TreeSynchronizer::reconcile(&mut self.tree, origin, suite_dir, tree_records(&file.records));
        for (file, summary) in self.coverage.replace_from(file.coverage_records()) {
            report.events.push(TreeEvent::CoverageChanged {
                file,
                covered: summary.covered,
                total: summary.total,
            });
        }
        self.publish(&report.events);
        report
    }

    /// Reads and applies the result file at `path`.
    ///
    /// The results directory is derived from `path` by the caller; a missing file is applied as
    /// a file with no records.
    pub async fn load_result_file(
        &mut self,
        path: &Utf8Path,
        suite_dir: Option<&Utf8Path>,
    ) -> Result<ReconcileReport, ReadResultsError> {
        let text = read_result_file(path).await?;
        let file = ResultFile::parse(text.as_deref().unwrap_or_default());
        Ok(self.apply_result_file(&ResultsOrigin::new(normalize_path(path)), suite_dir, &file))
    }

    /// Reconciles the tree against the tests found by crawling one source file.
    pub fn apply_discovered(
        &mut self,
        source: &Utf8Path,
        records: impl IntoIterator<Item = TreeRecord>,
    ) -> ReconcileReport {
        let origin = ResultsOrigin::new(normalize_path(source));
        let report = TreeSynchronizer::reconcile_discovered(&mut self.tree, &origin, records);
        self.publish(&report.events);
        report
    }

    /// Marks the tests of an edited source file stale.
    pub fn source_edited(&mut self, path: &Utf8Path, is_dirty: bool) {
        let events = InvalidationTracker::source_edited(&mut self.tree, path, is_dirty);
        self.publish(&events);
    }

    /// Projects the coverage of `file` onto its clauses, reading the source from disk.
    ///
    /// Returns `Ok(None)` if there is no coverage for the file.
    pub async fn detailed_coverage(
        &self,
        file: &Utf8Path,
    ) -> Result<Option<FileCoverage>, SourceLoadError> {
        let file = normalize_path(file);
        if self.coverage.records(&file).is_none() {
            return Ok(None);
        }
        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|error| SourceLoadError {
                path: file.clone(),
                error,
            })?;
        Ok(self.detailed_coverage_with(&file, &text, &SourceClauseExtents))
    }

    /// Projects the coverage of `file` onto its clauses, given the current source text.
    pub fn detailed_coverage_with<E: ClauseExtents + ?Sized>(
        &self,
        file: &Utf8Path,
        text: &str,
        extents: &E,
    ) -> Option<FileCoverage> {
        let file = normalize_path(file);
        let records = self.coverage.records(&file)?;
        Some(CoverageProjector::new(extents).project(&file, records, text))
    }

    /// Sets run states without touching results or stale flags.
    pub(crate) fn set_run_states(&mut self, states: impl IntoIterator<Item = (NodeId, RunState)>) {
        let mut events = Vec::new();
        for (id, state) in states {
            let Some(node) = self.tree.get_mut(&id) else {
                continue;
            };
            if node.run_state != state {
                node.run_state = state;
                events.push(TreeEvent::state_changed(node));
            }
        }
        self.publish(&events);
    }

    fn publish(&mut self, events: &[TreeEvent]) {
        if !events.is_empty() {
            self.observer.on_events(events);
        }
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("tree", &self.tree)
            .field("coverage", &self.coverage)
            .finish_non_exhaustive()
    }
}

/// Reads a result file. Returns `Ok(None)` if it doesn't exist.
pub async fn read_result_file(path: &Utf8Path) -> Result<Option<String>, ReadResultsError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("result file {path} doesn't exist, treating it as empty");
            Ok(None)
        }
        Err(error) => Err(ReadResultsError {
            path: path.to_owned(),
            error,
        }),
    }
}
