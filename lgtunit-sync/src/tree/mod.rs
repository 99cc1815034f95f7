// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test tree: workspace → directory → file → test object → test.
//!
//! Nodes live in a single arena keyed by [`NodeId`]. Parent links are ids used for lookup only;
//! ownership of a node is the arena's.
//!
//! The tree is mutated in exactly three places:
//!
//! - [`TreeSynchronizer`] reconciles it against records from a result file or a discovery crawl.
//! - [`InvalidationTracker`] marks file subtrees stale on source edits.
//! - The run coordinator moves nodes through `Queued` and `Running`.

mod display;
mod invalidate;
mod sync;

pub use display::*;
pub use invalidate::*;
pub use sync::*;

use crate::{events::TreeEvent, helpers::is_strict_prefix};
use camino::{Utf8Path, Utf8PathBuf};
use smol_str::SmolStr;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// A stable node identifier, derived from the node's kind, path and names.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of a [`TestNode`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeKind {
    /// A workspace root.
    Workspace,

    /// A directory holding an independent test suite.
    Directory,

    /// A source file.
    File,

    /// A test object.
    Object,

    /// A single test.
    Test,
}

impl NodeKind {
    /// Returns true for the kinds that carry run results.
    pub fn has_results(self) -> bool {
        matches!(self, Self::File | Self::Object | Self::Test)
    }
}

/// Where a node sits in the workspace, by path and name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeAddress {
    /// A workspace root.
    Workspace {
        /// The workspace root directory.
        root: Utf8PathBuf,
    },

    /// A test suite directory.
    Directory {
        /// The directory.
        dir: Utf8PathBuf,
    },

    /// A source file.
    File {
        /// The file.
        file: Utf8PathBuf,
    },

    /// A test object within a file.
    Object {
        /// The file.
        file: Utf8PathBuf,

        /// The object name, including parameters.
        object: SmolStr,
    },

    /// A test within a test object.
    Test {
        /// The file.
        file: Utf8PathBuf,

        /// The object name, including parameters.
        object: SmolStr,

        /// The test name.
        test: SmolStr,
    },
}

impl NodeAddress {
    /// Returns the node id for this address.
    pub fn id(&self) -> NodeId {
        NodeId(match self {
            Self::Workspace { root } => format!("workspace:{root}"),
            Self::Directory { dir } => format!("directory:{dir}"),
            Self::File { file } => file.to_string(),
            Self::Object { file, object } => format!("{file}::{object}"),
            Self::Test { file, object, test } => format!("{file}::{object}::{test}"),
        })
    }

    /// Returns the kind of node at this address.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Workspace { .. } => NodeKind::Workspace,
            Self::Directory { .. } => NodeKind::Directory,
            Self::File { .. } => NodeKind::File,
            Self::Object { .. } => NodeKind::Object,
            Self::Test { .. } => NodeKind::Test,
        }
    }

    /// Returns the path of the directory or file this address refers to.
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Workspace { root } => root,
            Self::Directory { dir } => dir,
            Self::File { file } | Self::Object { file, .. } | Self::Test { file, .. } => file,
        }
    }

    /// Returns the default label for this address.
    pub fn label(&self) -> String {
        match self {
            Self::Workspace { root } | Self::Directory { dir: root } => root
                .file_name()
                .map_or_else(|| root.to_string(), str::to_owned),
            Self::File { file } => file
                .file_name()
                .map_or_else(|| file.to_string(), str::to_owned),
            Self::Object { object, .. } => object.to_string(),
            Self::Test { test, .. } => test.to_string(),
        }
    }
}

/// The run state of a node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RunState {
    /// Never run, or no result known.
    #[default]
    NotRun,

    /// Selected for a run that hasn't been dispatched yet.
    Queued,

    /// Part of a dispatched run.
    Running,

    /// Passed.
    Passed,

    /// Failed.
    Failed,

    /// Skipped.
    Skipped,
}

impl RunState {
    /// Returns true for `Passed`, `Failed` and `Skipped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    /// Returns true for `Queued` and `Running`.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Combines the terminal states of a set of children into the state of their parent.
    ///
    /// Any failure fails the parent; otherwise any pass passes it; a parent whose children were
    /// all skipped is skipped. Returns `None` if no child has a terminal state.
    pub fn aggregate(states: impl IntoIterator<Item = RunState>) -> Option<RunState> {
        states
            .into_iter()
            .filter(|state| state.is_terminal())
            .fold(None, |acc, state| match (acc, state) {
                (Some(Self::Failed), _) | (_, Self::Failed) => Some(Self::Failed),
                (Some(Self::Passed), _) | (_, Self::Passed) => Some(Self::Passed),
                _ => Some(Self::Skipped),
            })
    }

    /// Returns a short lowercase name for this state.
    pub fn name(self) -> &'static str {
        match self {
            Self::NotRun => "not run",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file and 0-based line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation {
    /// The file.
    pub file: Utf8PathBuf,

    /// The 0-based line.
    pub line: u32,
}

/// Identifies the source that last asserted a node: a result file, or for discovered nodes, the
/// crawled source file.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ResultsOrigin(Utf8PathBuf);

impl ResultsOrigin {
    /// Creates a new origin.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns the path of the origin.
    pub fn path(&self) -> &Utf8Path {
        &self.0
    }
}

impl fmt::Display for ResultsOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the [`TestTree`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestNode {
    id: NodeId,
    address: NodeAddress,
    /// The display label.
    pub label: String,
    /// The source location.
    pub location: SourceLocation,
    children: BTreeSet<NodeId>,
    parent: Option<NodeId>,
    /// The result file (or crawled file) that last asserted this node. `None` for workspaces and
    /// directories.
    pub origin: Option<ResultsOrigin>,
    /// The current run state.
    pub run_state: RunState,
    /// Whether the source changed since the last result.
    pub stale: bool,
    /// The status text of the last non-passing result.
    pub message: Option<String>,
}

impl TestNode {
    pub(crate) fn new(address: NodeAddress, line: u32, origin: Option<ResultsOrigin>) -> Self {
        let location = SourceLocation {
            file: address.path().to_owned(),
            line,
        };
        Self {
            id: address.id(),
            label: address.label(),
            address,
            location,
            children: BTreeSet::new(),
            parent: None,
            origin,
            run_state: RunState::NotRun,
            stale: false,
            message: None,
        }
    }

    /// Returns the id of this node.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the address of this node.
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Returns the kind of this node.
    pub fn kind(&self) -> NodeKind {
        self.address.kind()
    }

    /// Returns the parent id, if this isn't a workspace root.
    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    /// Returns the ids of this node's children.
    pub fn child_ids(&self) -> impl ExactSizeIterator<Item = &NodeId> {
        self.children.iter()
    }
}

/// The test tree forest.
#[derive(Clone, Debug, Default)]
pub struct TestTree {
    nodes: BTreeMap<NodeId, TestNode>,
    roots: BTreeSet<NodeId>,
}

impl TestTree {
    /// Creates a tree with one workspace node per root.
    pub fn new(workspace_roots: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        let mut tree = Self::default();
        for root in workspace_roots {
            tree.ensure_workspace(&root);
        }
        tree
    }

    /// Returns the node with the given id.
    pub fn get(&self, id: &NodeId) -> Option<&TestNode> {
        self.nodes.get(id)
    }

    /// Returns the node at the given address.
    pub fn get_address(&self, address: &NodeAddress) -> Option<&TestNode> {
        self.nodes.get(&address.id())
    }

    /// Returns true if the tree has a node with the given id.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all nodes, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TestNode> {
        self.nodes.values()
    }

    /// Iterates over the workspace roots.
    pub fn roots(&self) -> impl Iterator<Item = &TestNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Iterates over the children of a node.
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a TestNode> + use<'a> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(|child| self.nodes.get(child))
    }

    /// Returns the ids of all strict descendants of a node, parents before children.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id.clone());
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Returns the workspace root containing `path`, preferring the innermost one.
    pub fn workspace_for(&self, path: &Utf8Path) -> Option<&TestNode> {
        self.roots()
            .filter(|root| path.starts_with(root.address.path()))
            .max_by_key(|root| root.address.path().as_str().len())
    }

    /// Returns the node a file at `path` belongs under: the innermost directory node whose path
    /// is a strict prefix of `path`, else its workspace.
    pub fn container_for(&self, path: &Utf8Path) -> Option<&TestNode> {
        let workspace = self.workspace_for(path)?;
        let directory = self
            .children(&workspace.id)
            .filter(|child| child.kind() == NodeKind::Directory)
            .filter(|child| is_strict_prefix(child.address.path(), path))
            .max_by_key(|child| child.address.path().as_str().len());
        Some(directory.unwrap_or(workspace))
    }

    /// Returns the directory the runner writes results to for a node: the node's own path for
    /// workspaces and directories, otherwise that of its nearest directory or workspace ancestor.
    pub fn suite_dir_for(&self, id: &NodeId) -> Option<&Utf8Path> {
        let mut current = self.nodes.get(id)?;
        loop {
            match current.kind() {
                NodeKind::Workspace | NodeKind::Directory => {
                    return Some(current.address.path());
                }
                _ => current = self.nodes.get(current.parent.as_ref()?)?,
            }
        }
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut TestNode> {
        self.nodes.get_mut(id)
    }

    /// Adds a workspace root if it doesn't already exist, returning its id.
    pub(crate) fn ensure_workspace(&mut self, root: &Utf8Path) -> (NodeId, Option<TreeEvent>) {
        let address = NodeAddress::Workspace {
            root: root.to_owned(),
        };
        let id = address.id();
        if self.nodes.contains_key(&id) {
            return (id, None);
        }
        let node = TestNode::new(address, 0, None);
        let event = TreeEvent::added(&node);
        self.roots.insert(id.clone());
        self.nodes.insert(id.clone(), node);
        (id, Some(event))
    }

    /// Adds a directory node under the workspace containing `dir`, returning its id.
    ///
    /// Returns the workspace itself if `dir` is a workspace root, and `None` if `dir` is outside
    /// every workspace.
    pub(crate) fn ensure_directory(
        &mut self,
        dir: &Utf8Path,
    ) -> Option<(NodeId, Option<TreeEvent>)> {
        let workspace = self.workspace_for(dir)?;
        if workspace.address.path() == dir {
            return Some((workspace.id.clone(), None));
        }
        let workspace = workspace.id.clone();

        let address = NodeAddress::Directory {
            dir: dir.to_owned(),
        };
        let id = address.id();
        if self.nodes.contains_key(&id) {
            return Some((id, None));
        }
        let node = TestNode::new(address, 0, None);
        let event = TreeEvent::added(&node);
        self.attach(node, &workspace);
        Some((id, Some(event)))
    }

    /// Inserts a node under `parent`, or moves an existing node there.
    ///
    /// Returns true if the node is new.
    pub(crate) fn attach(&mut self, mut node: TestNode, parent: &NodeId) -> bool {
        let id = node.id.clone();
        node.parent = Some(parent.clone());
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.insert(id.clone());
        }
        match self.nodes.insert(id, node) {
            Some(_) => false,
            None => true,
        }
    }

    /// Moves an existing node under a new parent. Returns true if the parent changed.
    pub(crate) fn reparent(&mut self, id: &NodeId, new_parent: &NodeId) -> bool {
        let old_parent = match self.nodes.get(id) {
            Some(node) if node.parent.as_ref() != Some(new_parent) => node.parent.clone(),
            _ => return false,
        };
        if let Some(old) = old_parent.and_then(|old| self.nodes.get_mut(&old)) {
            old.children.remove(id);
        }
        if let Some(parent) = self.nodes.get_mut(new_parent) {
            parent.children.insert(id.clone());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent.clone());
        }
        true
    }

    /// Removes a node and all its descendants, returning the removed ids, children first.
    pub(crate) fn remove_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let mut removed = self.descendants(id);
        removed.reverse();
        removed.push(id.clone());

        if let Some(parent) = self
            .nodes
            .get(id)
            .and_then(|node| node.parent.clone())
            .and_then(|parent| self.nodes.get_mut(&parent))
        {
            parent.children.remove(id);
        }
        self.roots.remove(id);
        for id in &removed {
            self.nodes.remove(id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn file_node(file: &str) -> TestNode {
        TestNode::new(NodeAddress::File { file: file.into() }, 0, None)
    }

    #[test]
    fn ids_are_derived_from_addresses() {
        let test = NodeAddress::Test {
            file: "/p/t.lgt".into(),
            object: "obj".into(),
            test: "t1".into(),
        };
        assert_eq!(test.id().as_str(), "/p/t.lgt::obj::t1");
        assert_eq!(
            NodeAddress::Directory { dir: "/p/sub".into() }.id().as_str(),
            "directory:/p/sub"
        );
        assert_eq!(test.label(), "t1");
        assert_eq!(NodeAddress::File { file: "/p/t.lgt".into() }.label(), "t.lgt");
    }

    #[test_case(vec![], None; "no children")]
    #[test_case(vec![RunState::NotRun, RunState::Queued], None; "no terminal children")]
    #[test_case(vec![RunState::Passed, RunState::Skipped], Some(RunState::Passed); "pass wins over skip")]
    #[test_case(vec![RunState::Passed, RunState::Failed, RunState::Skipped], Some(RunState::Failed); "fail wins")]
    #[test_case(vec![RunState::Skipped, RunState::Skipped], Some(RunState::Skipped); "all skipped")]
    fn aggregate(states: Vec<RunState>, expected: Option<RunState>) {
        assert_eq!(RunState::aggregate(states), expected);
    }

    #[test]
    fn containers_follow_path_prefixes() {
        let mut tree = TestTree::new(["/p".into(), "/p/nested".into()]);
        let (ws, _) = tree.ensure_workspace(Utf8Path::new("/p"));
        tree.attach(
            TestNode::new(NodeAddress::Directory { dir: "/p/sub".into() }, 0, None),
            &ws,
        );

        let container = |path: &str| {
            tree.container_for(Utf8Path::new(path))
                .map(|node| node.id().to_string())
        };
        assert_eq!(container("/p/t.lgt").as_deref(), Some("workspace:/p"));
        assert_eq!(container("/p/sub/t.lgt").as_deref(), Some("directory:/p/sub"));
        assert_eq!(container("/p/subway/t.lgt").as_deref(), Some("workspace:/p"));
        assert_eq!(container("/p/nested/t.lgt").as_deref(), Some("workspace:/p/nested"));
        assert_eq!(container("/elsewhere/t.lgt"), None);
    }

    #[test]
    fn remove_subtree_unlinks_from_parent() {
        let mut tree = TestTree::new(["/p".into()]);
        let ws = NodeAddress::Workspace { root: "/p".into() }.id();
        let file = file_node("/p/t.lgt");
        let file_id = file.id().clone();
        tree.attach(file, &ws);
        let object = TestNode::new(
            NodeAddress::Object {
                file: "/p/t.lgt".into(),
                object: "obj".into(),
            },
            0,
            None,
        );
        let object_id = object.id().clone();
        tree.attach(object, &file_id);

        assert_eq!(tree.descendants(&ws), vec![file_id.clone(), object_id.clone()]);
        assert_eq!(tree.suite_dir_for(&object_id), Some(Utf8Path::new("/p")));

        let removed = tree.remove_subtree(&file_id);
        assert_eq!(removed, vec![object_id, file_id]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.children(&ws).count(), 0);
    }
}
