// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{NodeAddress, TestTree};
use crate::{events::TreeEvent, helpers::normalize_path};
use camino::Utf8Path;
use tracing::debug;

/// Marks results stale when their source changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvalidationTracker;

impl InvalidationTracker {
    /// Handles an edit notification for `path`.
    ///
    /// Sets `stale` on the file node and every object and test below it. Run states and nodes
    /// are left as they are. The flag is cleared by the next reconcile pass that sets a node's
    /// state.
    pub fn source_edited(tree: &mut TestTree, path: &Utf8Path, is_dirty: bool) -> Vec<TreeEvent> {
        let file_id = NodeAddress::File {
            file: normalize_path(path),
        }
        .id();
        if !tree.contains(&file_id) {
            return Vec::new();
        }
        debug!(%file_id, is_dirty, "source edited, marking results stale");

        let mut ids = tree.descendants(&file_id);
        ids.insert(0, file_id);

        let mut events = Vec::new();
        for id in ids {
            if let Some(node) = tree.get_mut(&id) {
                if node.kind().has_results() && !node.stale {
                    node.stale = true;
                    events.push(TreeEvent::state_changed(node));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ResultsOrigin, RunState, TreeSynchronizer, tree_records};
    use lgtunit_metadata::ResultFile;

    #[test]
    fn edit_then_rerun_clears_stale() {
        let mut tree = TestTree::new(["/p".into()]);
        let origin = ResultsOrigin::new("/p/.lgtunit/test_results.txt");
        let text = "File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:passed\n";
        let run = |tree: &mut TestTree, text: &str| {
            let file = ResultFile::parse(text);
            TreeSynchronizer::reconcile(
                tree,
                &origin,
                Some(Utf8Path::new("/p")),
                tree_records(&file.records),
            );
        };
        run(&mut tree, text);

        let events = InvalidationTracker::source_edited(&mut tree, Utf8Path::new("/p/t.lgt"), true);
        assert_eq!(events.len(), 3);
        for node in tree.iter().filter(|node| node.kind().has_results()) {
            assert!(node.stale, "{} is stale", node.id());
            assert_eq!(node.run_state, RunState::Passed, "{} keeps its state", node.id());
        }

        // A second edit doesn't repeat events.
        let events = InvalidationTracker::source_edited(&mut tree, Utf8Path::new("/p/t.lgt"), false);
        assert!(events.is_empty());

        run(
            &mut tree,
            "File:/p/t.lgt;Line:10;Object:obj;Test:t1;Status:failed\n",
        );
        for node in tree.iter().filter(|node| node.kind().has_results()) {
            assert!(!node.stale, "{} is fresh", node.id());
            assert_eq!(node.run_state, RunState::Failed);
        }
    }

    #[test]
    fn unknown_file_is_ignored() {
        let mut tree = TestTree::new(["/p".into()]);
        let events = InvalidationTracker::source_edited(&mut tree, Utf8Path::new("/p/x.lgt"), true);
        assert!(events.is_empty());
    }
}
