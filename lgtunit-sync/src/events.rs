// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change notifications published to the presentation layer.
//!
//! Tree mutations are batched per reconcile pass (or per run state transition) and handed to a
//! [`TreeObserver`] once the tree is consistent again.

use crate::tree::{NodeId, NodeKind, ResultsOrigin, RunState, TestNode};
use camino::Utf8PathBuf;
use lgtunit_metadata::TestResultRecord;

/// A change to the test tree or to coverage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TreeEvent {
    /// A node was created.
    NodeAdded {
        /// The new node.
        id: NodeId,

        /// Its kind.
        kind: NodeKind,
    },

    /// A node's label, location, parent or origin changed.
    NodeUpdated {
        /// The node.
        id: NodeId,
    },

    /// A node was removed along with its subtree.
    NodeRemoved {
        /// The node.
        id: NodeId,
    },

    /// A node's run state or stale flag changed.
    RunStateChanged {
        /// The node.
        id: NodeId,

        /// The new run state.
        state: RunState,

        /// The new stale flag.
        stale: bool,
    },

    /// The coverage summary for a file was replaced.
    CoverageChanged {
        /// The file.
        file: Utf8PathBuf,

        /// Covered clauses.
        covered: u32,

        /// Total clauses.
        total: u32,
    },
}

impl TreeEvent {
    pub(crate) fn added(node: &TestNode) -> Self {
        Self::NodeAdded {
            id: node.id().clone(),
            kind: node.kind(),
        }
    }

    pub(crate) fn state_changed(node: &TestNode) -> Self {
        Self::RunStateChanged {
            id: node.id().clone(),
            state: node.run_state,
            stale: node.stale,
        }
    }
}

/// Receives batches of [`TreeEvent`]s.
pub trait TreeObserver {
    /// Called after a batch of changes has been applied.
    fn on_events(&mut self, events: &[TreeEvent]);
}

impl<F> TreeObserver for F
where
    F: FnMut(&[TreeEvent]),
{
    fn on_events(&mut self, events: &[TreeEvent]) {
        self(events)
    }
}

/// A [`TreeObserver`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl TreeObserver for NoopObserver {
    fn on_events(&mut self, _events: &[TreeEvent]) {}
}

/// A sink for per-test diagnostics, such as failures shown next to source.
pub trait RecordReporter {
    /// Clears everything previously reported for `origin`.
    fn clear(&mut self, origin: &ResultsOrigin);

    /// Reports a single non-passing test result.
    fn report(&mut self, origin: &ResultsOrigin, record: &TestResultRecord);
}
