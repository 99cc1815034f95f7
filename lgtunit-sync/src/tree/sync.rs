// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciling the test tree against one pass of records.

use super::{NodeAddress, NodeId, NodeKind, ResultsOrigin, RunState, TestNode, TestTree};
use crate::{
    events::TreeEvent,
    helpers::{normalize_path, zero_based},
};
use camino::{Utf8Path, Utf8PathBuf};
use lgtunit_metadata::{ResultRecord, SummaryCounts, TestStatus};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// A record to reconcile the tree against.
///
/// Produced either from a result file, in which case tests carry an outcome, or from a discovery
/// crawl, in which case they don't.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TreeRecord {
    /// A source file, asserted even if it has no tests left.
    File {
        /// The file.
        file: Utf8PathBuf,
    },

    /// A test object.
    Object {
        /// The file containing the object.
        file: Utf8PathBuf,

        /// The 0-based line of the object.
        line: u32,

        /// The object name.
        object: SmolStr,

        /// Test counts from a summary line, if any.
        counts: Option<SummaryCounts>,
    },

    /// A single test.
    Test {
        /// The file containing the test.
        file: Utf8PathBuf,

        /// The 0-based line of the test.
        line: u32,

        /// The object name.
        object: SmolStr,

        /// The test name.
        test: SmolStr,

        /// The result of running the test, if known.
        outcome: Option<TestOutcome>,
    },
}

impl TreeRecord {
    /// Converts a result file record. Coverage records have no tree counterpart.
    pub fn from_result(record: &ResultRecord) -> Option<Self> {
        match record {
            ResultRecord::TestResult(record) => Some(Self::Test {
                file: record.file.clone(),
                line: zero_based(record.line),
                object: record.object.clone(),
                test: record.test.clone(),
                outcome: Some(TestOutcome::from_status(&record.status)),
            }),
            ResultRecord::TestSummary(record) => Some(Self::Object {
                file: record.file.clone(),
                line: zero_based(record.line),
                object: record.object.clone(),
                counts: record.counts(),
            }),
            ResultRecord::Coverage(_) => None,
        }
    }

    fn file(&self) -> &Utf8Path {
        match self {
            Self::File { file } | Self::Object { file, .. } | Self::Test { file, .. } => file,
        }
    }
}

/// How a reconcile pass treats nodes owned by other origins.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PassKind {
    /// Records from a result file: every node named is claimed by the pass.
    Results,

    /// Records from crawling a source file: nodes owned by a result file are left to it.
    Discovery,
}

/// The outcome of a single test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestOutcome {
    /// The terminal run state.
    pub state: RunState,

    /// The status text for results other than a plain pass or skip.
    pub message: Option<String>,
}

impl TestOutcome {
    /// Maps result file status text to an outcome.
    ///
    /// Failures keep the status text as the message. Unrecognized statuses count as failures.
    pub fn from_status(status: &str) -> Self {
        let (state, message) = match TestStatus::parse(status) {
            TestStatus::Passed => (RunState::Passed, None),
            TestStatus::Skipped => (RunState::Skipped, None),
            TestStatus::Failed | TestStatus::Other(_) => {
                (RunState::Failed, Some(status.trim().to_owned()))
            }
        };
        Self { state, message }
    }
}

/// Statistics about a single reconcile pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReconcileStats {
    /// Nodes created.
    pub added: usize,

    /// Nodes removed.
    pub removed: usize,

    /// Tests reported as passed.
    pub passed: usize,

    /// Tests reported as failed.
    pub failed: usize,

    /// Tests reported as skipped.
    pub skipped: usize,

    /// Records outside every workspace.
    pub ignored: usize,
}

impl ReconcileStats {
    /// Returns the number of tests with an outcome in this pass.
    pub fn tests_run(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// The result of a reconcile pass.
#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    /// The changes made, in order.
    pub events: Vec<TreeEvent>,

    /// Statistics about the pass.
    pub stats: ReconcileStats,
}

/// Reconciles a [`TestTree`] against the records of one origin.
///
/// Nodes named by the records are created or updated in place. Afterwards, descendants of every
/// touched container node that this origin asserted before but didn't assert now are removed.
/// Nodes last asserted by any other origin are never modified or removed.
pub struct TreeSynchronizer<'a> {
    tree: &'a mut TestTree,
    origin: &'a ResultsOrigin,
    kind: PassKind,
    expected: BTreeSet<NodeId>,
    summaries: BTreeMap<NodeId, SummaryCounts>,
    reported_objects: BTreeSet<NodeId>,
    events: Vec<TreeEvent>,
    stats: ReconcileStats,
}

impl<'a> TreeSynchronizer<'a> {
    /// Runs a reconcile pass for a result file.
    ///
    /// `suite_dir` is the directory the records were produced for. If it is below a workspace
    /// root, a directory node is created for it.
    pub fn reconcile(
        tree: &'a mut TestTree,
        origin: &'a ResultsOrigin,
        suite_dir: Option<&Utf8Path>,
        records: impl IntoIterator<Item = TreeRecord>,
    ) -> ReconcileReport {
        Self::run(tree, origin, PassKind::Results, suite_dir, records)
    }

    /// Runs a reconcile pass for tests found by crawling a source file.
    ///
    /// Nodes last asserted by a result file are kept as they are. A file asserted by this pass
    /// that ends up with no tests is removed.
    pub fn reconcile_discovered(
        tree: &'a mut TestTree,
        origin: &'a ResultsOrigin,
        records: impl IntoIterator<Item = TreeRecord>,
    ) -> ReconcileReport {
        Self::run(tree, origin, PassKind::Discovery, None, records)
    }

    fn run(
        tree: &'a mut TestTree,
        origin: &'a ResultsOrigin,
        kind: PassKind,
        suite_dir: Option<&Utf8Path>,
        records: impl IntoIterator<Item = TreeRecord>,
    ) -> ReconcileReport {
        let mut sync = Self {
            tree,
            origin,
            kind,
            expected: BTreeSet::new(),
            summaries: BTreeMap::new(),
            reported_objects: BTreeSet::new(),
            events: Vec::new(),
            stats: ReconcileStats::default(),
        };

        if let Some(dir) = suite_dir {
            sync.assert_suite_dir(&normalize_path(dir));
        }
        for record in records {
            sync.apply(record);
        }
        sync.update_parent_states();
        sync.prune();
        if kind == PassKind::Discovery {
            sync.remove_empty_files();
        }

        debug!(
            origin = %sync.origin,
            added = sync.stats.added,
            removed = sync.stats.removed,
            "reconciled test tree",
        );
        ReconcileReport {
            events: sync.events,
            stats: sync.stats,
        }
    }

    fn assert_suite_dir(&mut self, dir: &Utf8Path) {
        let Some((_, event)) = self.tree.ensure_directory(dir) else {
            debug!("suite directory {dir} is outside all workspaces");
            return;
        };
        if let Some(event) = event {
            self.events.push(event);
            self.stats.added += 1;
        }
    }

    fn apply(&mut self, record: TreeRecord) {
        let file = normalize_path(record.file());
        let Some(container) = self.tree.container_for(&file) else {
            warn!("ignoring result for `{file}`: not within any workspace");
            self.stats.ignored += 1;
            return;
        };
        let container = container.id().clone();
        self.expect_with_ancestors(&container);

        let file_id = self.upsert(NodeAddress::File { file: file.clone() }, 0, &container);
        match record {
            TreeRecord::File { .. } => {}
            TreeRecord::Object {
                line,
                object,
                counts,
                ..
            } => {
                let object_id = self.upsert(NodeAddress::Object { file, object }, line, &file_id);
                if let Some(counts) = counts {
                    self.summaries.insert(object_id, counts);
                }
            }
            TreeRecord::Test {
                line,
                object,
                test,
                outcome,
                ..
            } => {
                // A test line without a summary line still establishes its object, located at
                // the first test seen.
                let object_address = NodeAddress::Object {
                    file: file.clone(),
                    object: object.clone(),
                };
                let object_line = self
                    .tree
                    .get_address(&object_address)
                    .map_or(line, |node| node.location.line);
                let object_id = self.upsert(object_address, object_line, &file_id);
                let test_id = self.upsert(
                    NodeAddress::Test { file, object, test },
                    line,
                    &object_id,
                );
                if let Some(outcome) = outcome {
                    match outcome.state {
                        RunState::Passed => self.stats.passed += 1,
                        RunState::Failed => self.stats.failed += 1,
                        RunState::Skipped => self.stats.skipped += 1,
                        _ => {}
                    }
                    self.set_state(&test_id, outcome.state, outcome.message);
                    self.reported_objects.insert(object_id);
                }
            }
        }
    }

    fn expect_with_ancestors(&mut self, id: &NodeId) {
        let mut current = Some(id.clone());
        while let Some(id) = current {
            current = self.tree.get(&id).and_then(|node| node.parent().cloned());
            if !self.expected.insert(id) {
                break;
            }
        }
    }

    /// Creates or updates the node at `address` under `parent`, returning its id.
    fn upsert(&mut self, address: NodeAddress, line: u32, parent: &NodeId) -> NodeId {
        let id = address.id();
        self.expected.insert(id.clone());

        let mut changed = match self.tree.get_mut(&id) {
            Some(node)
                if self.kind == PassKind::Discovery && node.origin.as_ref() != Some(self.origin) =>
            {
                return id;
            }
            Some(node) => {
                let mut changed = false;
                if node.location.line != line {
                    node.location.line = line;
                    changed = true;
                }
                if node.origin.as_ref() != Some(self.origin) {
                    node.origin = Some(self.origin.clone());
                    changed = true;
                }
                changed
            }
            None => {
                let node = TestNode::new(address, line, Some(self.origin.clone()));
                self.events.push(TreeEvent::added(&node));
                self.tree.attach(node, parent);
                self.stats.added += 1;
                return id;
            }
        };
        changed |= self.tree.reparent(&id, parent);
        if changed {
            self.events.push(TreeEvent::NodeUpdated { id: id.clone() });
        }
        id
    }

    fn set_state(&mut self, id: &NodeId, state: RunState, message: Option<String>) {
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        if node.run_state == state && !node.stale && node.message == message {
            return;
        }
        node.run_state = state;
        node.stale = false;
        node.message = message;
        self.events.push(TreeEvent::state_changed(node));
    }

    /// Sets object states from summaries or their tests, then file states from their objects.
    fn update_parent_states(&mut self) {
        let mut files = BTreeSet::new();

        let summaries = std::mem::take(&mut self.summaries);
        for (object_id, counts) in &summaries {
            let state = if counts.failed > 0 {
                RunState::Failed
            } else if counts.passed > 0 {
                RunState::Passed
            } else if counts.skipped > 0 {
                RunState::Skipped
            } else {
                continue;
            };
            self.set_state(object_id, state, None);
            files.extend(self.tree.get(object_id).and_then(|node| node.parent().cloned()));
        }

        let reported = std::mem::take(&mut self.reported_objects);
        for object_id in reported.iter().filter(|id| !summaries.contains_key(*id)) {
            let state =
                RunState::aggregate(self.tree.children(object_id).map(|test| test.run_state));
            if let Some(state) = state {
                self.set_state(object_id, state, None);
                files.extend(self.tree.get(object_id).and_then(|node| node.parent().cloned()));
            }
        }

        for file_id in files {
            let state = RunState::aggregate(self.tree.children(&file_id).map(|obj| obj.run_state));
            if let Some(state) = state {
                self.set_state(&file_id, state, None);
            }
        }
    }

    /// Removes nodes under each touched container that this origin asserted before but not now.
    ///
    /// Children are visited before their parents. A node that still has children asserted by
    /// another origin is kept and handed over to one of them.
    fn prune(&mut self) {
        let touched: Vec<NodeId> = self
            .expected
            .iter()
            .filter(|id| {
                self.tree
                    .get(id)
                    .is_some_and(|node| node.kind() != NodeKind::Test)
            })
            .cloned()
            .collect();

        for root in touched {
            for id in self.tree.descendants(&root).into_iter().rev() {
                if self.expected.contains(&id) {
                    continue;
                }
                let Some(node) = self.tree.get(&id) else {
                    continue;
                };
                if node.origin.as_ref() != Some(self.origin) {
                    continue;
                }

                let heir = self
                    .tree
                    .children(&id)
                    .find_map(|child| child.origin.clone());
                match heir {
                    Some(heir) => {
                        if let Some(node) = self.tree.get_mut(&id) {
                            node.origin = Some(heir);
                            self.events.push(TreeEvent::NodeUpdated { id });
                        }
                    }
                    None => {
                        for removed in self.tree.remove_subtree(&id) {
                            self.events.push(TreeEvent::NodeRemoved { id: removed });
                            self.stats.removed += 1;
                        }
                    }
                }
            }
        }
    }

    fn remove_empty_files(&mut self) {
        let empty: Vec<NodeId> = self
            .expected
            .iter()
            .filter_map(|id| self.tree.get(id))
            .filter(|node| {
                node.kind() == NodeKind::File
                    && node.child_ids().len() == 0
                    && node.origin.as_ref() == Some(self.origin)
            })
            .map(|node| node.id().clone())
            .collect();
        for id in empty {
            for removed in self.tree.remove_subtree(&id) {
                self.events.push(TreeEvent::NodeRemoved { id: removed });
                self.stats.removed += 1;
            }
        }
    }
}

/// Builds tree records from the records of a parsed result file.
pub fn tree_records<'a>(
    records: impl IntoIterator<Item = &'a ResultRecord>,
) -> impl Iterator<Item = TreeRecord> {
    records.into_iter().filter_map(TreeRecord::from_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lgtunit_metadata::ResultFile;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn reconcile(tree: &mut TestTree, origin: &str, suite_dir: &str, text: &str) -> ReconcileReport {
        let file = ResultFile::parse(text);
        let origin = ResultsOrigin::new(origin);
        TreeSynchronizer::reconcile(
            tree,
            &origin,
            Some(Utf8Path::new(suite_dir)),
            tree_records(&file.records),
        )
    }

    fn node<'t>(tree: &'t TestTree, id: &str) -> Option<&'t TestNode> {
        tree.iter().find(|node| node.id().as_str() == id)
    }

    fn snapshot(tree: &TestTree) -> Vec<(String, RunState, bool, Option<String>)> {
        tree.iter()
            .map(|node| {
                (
                    node.id().to_string(),
                    node.run_state,
                    node.stale,
                    node.origin.as_ref().map(|origin| origin.to_string()),
                )
            })
            .collect()
    }

    const R1: &str = "/p/.lgtunit/test_results.txt";
    const R2: &str = "/p/sub/.lgtunit/test_results.txt";

    #[test]
    fn single_test_result_builds_address_chain() {
        let mut tree = TestTree::new(["/p".into()]);
        let report = reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed\n",
        );

        let test = node(&tree, "/p/t.lgt::obj::t1").expect("test node exists");
        assert_eq!(test.kind(), NodeKind::Test);
        assert_eq!(test.run_state, RunState::Passed);
        assert_eq!(test.location.line, 9);
        assert_eq!(test.parent().map(|id| id.as_str()), Some("/p/t.lgt::obj"));

        let object = node(&tree, "/p/t.lgt::obj").expect("object node exists");
        assert_eq!(object.parent().map(|id| id.as_str()), Some("/p/t.lgt"));
        assert_eq!(object.run_state, RunState::Passed);

        let file = node(&tree, "/p/t.lgt").expect("file node exists");
        assert_eq!(file.parent().map(|id| id.as_str()), Some("workspace:/p"));
        assert_eq!(file.run_state, RunState::Passed);
        assert_eq!(report.stats.added, 3);
        assert_eq!(report.stats.passed, 1);
    }

    #[test]
    fn summary_counts_set_object_state() {
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R1,
            "/p",
            indoc! {"
                File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed
                File:/p/t.lgt;Line:14;Object:obj;Test:t2;Status:failed (assertion)
                File:/p/t.lgt;Line:1;Object:obj;Status:2 tests: 0 skipped, 1 passed, 1 failed
            "},
        );

        let object = node(&tree, "/p/t.lgt::obj").expect("object node exists");
        assert_eq!(object.run_state, RunState::Failed);
        assert_eq!(object.location.line, 0);

        let t2 = node(&tree, "/p/t.lgt::obj::t2").expect("t2 exists");
        assert_eq!(t2.run_state, RunState::Failed);
        assert_eq!(t2.message.as_deref(), Some("failed (assertion)"));
        assert_eq!(
            node(&tree, "/p/t.lgt").map(|node| node.run_state),
            Some(RunState::Failed)
        );
    }

    #[test]
    fn reparse_is_idempotent() {
        let text = indoc! {"
            File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed
            File:/p/t.lgt;Line:12;Object:obj;Test:t2;Status:skipped
            garbage line
            File:/p/t.lgt;Line:1;Object:obj;Status:2 tests: 1 skipped, 1 passed, 0 failed
        "};
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(&mut tree, R1, "/p", text);
        let before = snapshot(&tree);

        let report = reconcile(&mut tree, R1, "/p", text);
        assert_eq!(snapshot(&tree), before);
        assert!(report.events.is_empty(), "no changes: {:?}", report.events);
    }

    #[test]
    fn origin_isolation() {
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R1,
            "/p",
            indoc! {"
                File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed
                File:/p/t.lgt;Line:12;Object:obj;Test:t2;Status:passed
            "},
        );
        reconcile(
            &mut tree,
            R2,
            "/p/sub",
            "File:/p/sub/u.lgt;Line:3;Object:other;Test:u1;Status:failed\n",
        );
        assert!(node(&tree, "directory:/p/sub").is_some());
        assert_eq!(
            node(&tree, "/p/sub/u.lgt").and_then(|n| n.parent()).map(|id| id.as_str()),
            Some("directory:/p/sub")
        );
        let other_before: Vec<_> = snapshot(&tree)
            .into_iter()
            .filter(|(id, ..)| id.starts_with("/p/sub/"))
            .collect();

        // Reparse R1 without t2.
        let report = reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed\n",
        );
        assert!(node(&tree, "/p/t.lgt::obj::t2").is_none());
        assert!(node(&tree, "/p/t.lgt::obj::t1").is_some());
        assert_eq!(
            report.events,
            vec![TreeEvent::NodeRemoved {
                id: NodeAddress::Test {
                    file: "/p/t.lgt".into(),
                    object: "obj".into(),
                    test: "t2".into(),
                }
                .id()
            }]
        );

        let other_after: Vec<_> = snapshot(&tree)
            .into_iter()
            .filter(|(id, ..)| id.starts_with("/p/sub/"))
            .collect();
        assert_eq!(other_after, other_before);
    }

    #[test]
    fn empty_reparse_keeps_tree() {
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R2,
            "/p/sub",
            "File:/p/sub/t.lgt;Line:1;Object:obj;Test:t1;Status:passed\n",
        );
        let before = snapshot(&tree);

        let report = reconcile(&mut tree, R2, "/p/sub", "");
        assert_eq!(report.stats.removed, 0);
        assert!(report.events.is_empty(), "no changes: {:?}", report.events);
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn reparse_keeps_tests_of_other_origins() {
        const OTHER: &str = "/p/other/.lgtunit/test_results.txt";

        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed\n",
        );
        // Upserting t2 moves the file and object over to OTHER.
        reconcile(
            &mut tree,
            OTHER,
            "/p",
            "File:/p/t.lgt;Line:12;Object:obj;Test:t2;Status:failed\n",
        );
        assert_eq!(
            node(&tree, "/p/t.lgt::obj").and_then(|n| n.origin.as_ref()),
            Some(&ResultsOrigin::new(OTHER))
        );

        let report = reconcile(
            &mut tree,
            OTHER,
            "/p",
            "File:/p/u.lgt;Line:1;Object:u;Test:u1;Status:passed\n",
        );
        assert!(node(&tree, "/p/t.lgt::obj::t2").is_none());
        assert_eq!(report.stats.removed, 1, "only t2 is removed");

        let t1 = node(&tree, "/p/t.lgt::obj::t1").expect("t1 survives");
        assert_eq!(t1.origin.as_ref(), Some(&ResultsOrigin::new(R1)));
        assert_eq!(t1.run_state, RunState::Passed);
        for id in ["/p/t.lgt::obj", "/p/t.lgt"] {
            let kept = node(&tree, id).expect("ancestor of t1 is kept");
            assert_eq!(kept.origin.as_ref(), Some(&ResultsOrigin::new(R1)), "{id}");
        }
        assert!(node(&tree, "/p/u.lgt::u::u1").is_some());
    }

    #[test]
    fn file_missing_from_reparse_is_removed() {
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R1,
            "/p",
            indoc! {"
                File:/p/a.lgt;Line:10;Object:a;Test:t1;Status:passed
                File:/p/b.lgt;Line:10;Object:b;Test:t1;Status:passed
            "},
        );
        reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/p/a.lgt;Line:10;Object:a;Test:t1;Status:passed\n",
        );
        assert!(node(&tree, "/p/b.lgt").is_none());
        assert!(node(&tree, "/p/b.lgt::b::t1").is_none());
        assert!(node(&tree, "/p/a.lgt::a::t1").is_some());
    }

    #[test]
    fn records_outside_workspaces_are_ignored() {
        let mut tree = TestTree::new(["/p".into()]);
        let report = reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/elsewhere/t.lgt;Line:1;Object:obj;Test:t1;Status:passed\n",
        );
        assert_eq!(report.stats.ignored, 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn paths_are_normalized() {
        let mut tree = TestTree::new(["/p".into()]);
        reconcile(
            &mut tree,
            R1,
            "/p",
            "File:/p/sub/../t.lgt;Line:1;Object:obj;Test:t1;Status:passed\n",
        );
        assert!(node(&tree, "/p/t.lgt::obj::t1").is_some());
    }
}
