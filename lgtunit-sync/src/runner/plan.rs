// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunOutputs, RunTarget};
use crate::{
    config::ResultsLayout,
    tree::{NodeAddress, NodeId, NodeKind, TestTree},
};
use tracing::warn;

/// A single runner invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedRun {
    /// The node the run was planned for.
    pub node: NodeId,

    /// What to run.
    pub target: RunTarget,

    /// Where the run writes its results.
    pub outputs: RunOutputs,
}

/// Maps a selection of nodes to runner invocations.
///
/// An empty selection selects every workspace. A workspace with suite directories gets one run
/// per directory; a workspace without any gets a single run over the whole workspace. Every
/// other node gets one run targeted at it. Identical runs are planned once.
pub fn plan_runs(tree: &TestTree, selection: &[NodeId], layout: &ResultsLayout) -> Vec<PlannedRun> {
    let all_roots: Vec<NodeId>;
    let selection = if selection.is_empty() {
        all_roots = tree.roots().map(|root| root.id().clone()).collect();
        &all_roots
    } else {
        selection
    };

    let mut runs: Vec<PlannedRun> = Vec::new();
    let mut push = |node: &NodeId, target: RunTarget| {
        if runs.iter().any(|run| run.target == target) {
            return;
        }
        let Some(results_dir) = tree.suite_dir_for(node) else {
            return;
        };
        runs.push(PlannedRun {
            node: node.clone(),
            outputs: layout.outputs_for(results_dir),
            target,
        });
    };

    for id in selection {
        let Some(node) = tree.get(id) else {
            warn!("selected node `{id}` is not in the test tree");
            continue;
        };
        match node.address() {
            NodeAddress::Workspace { root } => {
                let mut dirs = tree
                    .children(id)
                    .filter(|child| child.kind() == NodeKind::Directory)
                    .peekable();
                if dirs.peek().is_none() {
                    push(id, RunTarget::All {
                        scope: root.clone(),
                    });
                }
                for dir in dirs {
                    push(dir.id(), RunTarget::Directory {
                        dir: dir.address().path().to_owned(),
                    });
                }
            }
            NodeAddress::Directory { dir } => {
                push(id, RunTarget::Directory { dir: dir.clone() });
            }
            NodeAddress::File { file } => push(id, RunTarget::File { file: file.clone() }),
            NodeAddress::Object { file, object } => push(id, RunTarget::Object {
                file: file.clone(),
                object: object.clone(),
            }),
            NodeAddress::Test { file, object, test } => push(id, RunTarget::Test {
                file: file.clone(),
                object: object.clone(),
                test: test.clone(),
            }),
        }
    }
    runs
}
