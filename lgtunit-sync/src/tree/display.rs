// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable rendering of the test tree.
//!
//! # Display rules
//!
//! 1. **Roots:** no tree characters.
//! 2. **Children:** `├─` (not last) or `└─` (last).
//! 3. **Continuation lines:** `│` when an ancestor has more siblings, blank otherwise.
//! 4. **Sorting:** roots by id; children by source line, then label.
//! 5. **Stale nodes:** the run state is followed by `*`.

use super::{NodeId, NodeKind, RunState, TestNode, TestTree};
use owo_colors::{OwoColorize, Style};
use std::fmt;
use swrite::{SWrite, swrite};

/// Styles for displaying the test tree.
#[derive(Clone, Debug, Default)]
pub struct Styles {
    /// Style for workspace and directory labels.
    pub container: Style,
    /// Style for file labels.
    pub file: Style,
    /// Style for object labels.
    pub object: Style,
    /// Style for "passed".
    pub passed: Style,
    /// Style for "failed".
    pub failed: Style,
    /// Style for "skipped".
    pub skipped: Style,
    /// Style for "queued", "running" and "not run".
    pub pending: Style,
    /// Style for the stale marker.
    pub stale: Style,
}

impl Styles {
    /// Colorizes the styles for terminal output.
    pub fn colorize(&mut self) {
        self.container = Style::new().bold();
        self.file = Style::new().bold().blue();
        self.object = Style::new().purple();
        self.passed = Style::new().bold().green();
        self.failed = Style::new().bold().red();
        self.skipped = Style::new().bold().yellow();
        self.pending = Style::new().bright_black();
        self.stale = Style::new().bold().yellow();
    }

    fn for_state(&self, state: RunState) -> Style {
        match state {
            RunState::Passed => self.passed,
            RunState::Failed => self.failed,
            RunState::Skipped => self.skipped,
            RunState::NotRun | RunState::Queued | RunState::Running => self.pending,
        }
    }

    fn for_kind(&self, kind: NodeKind) -> Style {
        match kind {
            NodeKind::Workspace | NodeKind::Directory => self.container,
            NodeKind::File => self.file,
            NodeKind::Object => self.object,
            NodeKind::Test => Style::new(),
        }
    }
}

/// Characters used to draw the tree.
#[derive(Clone, Debug)]
pub struct TreeCharacters {
    branch: &'static str,
    last: &'static str,
    continuation: &'static str,
}

impl TreeCharacters {
    /// Box-drawing characters.
    pub fn unicode() -> Self {
        Self {
            branch: "├─",
            last: "└─",
            continuation: "│  ",
        }
    }

    /// ASCII-only characters.
    pub fn ascii() -> Self {
        Self {
            branch: "|-",
            last: "`-",
            continuation: "|  ",
        }
    }
}

impl Default for TreeCharacters {
    fn default() -> Self {
        Self::unicode()
    }
}

/// An item in the display traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
struct TreeItem<'a> {
    id: &'a NodeId,
    depth: usize,
    is_last: bool,
    /// For each ancestor level below the root, whether to draw a continuation line.
    continuation_flags: Vec<bool>,
}

/// Displays a [`TestTree`] as an indented tree with run states.
pub struct DisplayTestTree<'a> {
    tree: &'a TestTree,
    styles: &'a Styles,
    characters: &'a TreeCharacters,
}

impl<'a> DisplayTestTree<'a> {
    /// Creates a new display wrapper for a tree.
    pub fn new(tree: &'a TestTree, styles: &'a Styles, characters: &'a TreeCharacters) -> Self {
        Self {
            tree,
            styles,
            characters,
        }
    }

    fn sorted_children(&self, id: &NodeId) -> Vec<&'a TestNode> {
        let mut children: Vec<_> = self.tree.children(id).collect();
        children.sort_by(|a, b| {
            (a.location.line, &a.label, a.id()).cmp(&(b.location.line, &b.label, b.id()))
        });
        children
    }

    fn traversal(&self) -> Vec<TreeItem<'a>> {
        let mut items = Vec::new();
        let mut stack: Vec<TreeItem<'a>> = self
            .tree
            .roots()
            .map(|root| TreeItem {
                id: root.id(),
                depth: 0,
                is_last: true,
                continuation_flags: Vec::new(),
            })
            .collect();
        stack.reverse();

        while let Some(item) = stack.pop() {
            let children = self.sorted_children(item.id);
            let count = children.len();
            for (i, child) in children.into_iter().enumerate().rev() {
                let continuation_flags = if item.depth == 0 {
                    Vec::new()
                } else {
                    let mut flags = item.continuation_flags.clone();
                    flags.push(!item.is_last);
                    flags
                };
                stack.push(TreeItem {
                    id: child.id(),
                    depth: item.depth + 1,
                    is_last: i + 1 == count,
                    continuation_flags,
                });
            }
            items.push(item);
        }
        items
    }

    fn format_prefix(&self, item: &TreeItem<'_>) -> String {
        let mut prefix = String::new();
        if item.depth == 0 {
            return prefix;
        }
        for &continues in &item.continuation_flags {
            prefix.push_str(if continues {
                self.characters.continuation
            } else {
                "   "
            });
        }
        prefix.push_str(if item.is_last {
            self.characters.last
        } else {
            self.characters.branch
        });
        prefix.push(' ');
        prefix
    }

    fn format_node(&self, node: &TestNode) -> String {
        let mut out = String::new();
        let label = match node.kind() {
            NodeKind::Workspace | NodeKind::Directory => node.location.file.to_string(),
            _ => node.label.clone(),
        };
        swrite!(out, "{}", label.style(self.styles.for_kind(node.kind())));
        if node.kind().has_results() {
            swrite!(
                out,
                " [{}]",
                node.run_state.style(self.styles.for_state(node.run_state))
            );
            if node.stale {
                swrite!(out, "{}", "*".style(self.styles.stale));
            }
        }
        if let Some(message) = &node.message {
            swrite!(out, ": {message}");
        }
        out
    }
}

impl fmt::Display for DisplayTestTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in self.traversal() {
            let Some(node) = self.tree.get(item.id) else {
                continue;
            };
            writeln!(f, "{}{}", self.format_prefix(&item), self.format_node(node))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ResultsOrigin, TreeSynchronizer, tree_records};
    use camino::Utf8Path;
    use indoc::indoc;
    use lgtunit_metadata::ResultFile;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_box_drawing_tree() {
        let mut tree = TestTree::new(["/p".into()]);
        let file = ResultFile::parse(indoc! {"
            File:/p/a.lgt;Line:10;Object:a_tests;Test:first;Status:passed
            File:/p/a.lgt;Line:20;Object:a_tests;Test:second;Status:failed
            File:/p/b.lgt;Line:5;Object:b_tests;Test:only;Status:skipped
        "});
        TreeSynchronizer::reconcile(
            &mut tree,
            &ResultsOrigin::new("/p/.lgtunit/test_results.txt"),
            Some(Utf8Path::new("/p")),
            tree_records(&file.records),
        );
        crate::tree::InvalidationTracker::source_edited(&mut tree, Utf8Path::new("/p/b.lgt"), true);

        let output = DisplayTestTree::new(&tree, &Styles::default(), &TreeCharacters::unicode())
            .to_string();
        assert_eq!(
            output,
            indoc! {"
                /p
                ├─ a.lgt [failed]
                │  └─ a_tests [failed]
                │     ├─ first [passed]
                │     └─ second [failed]: failed
                └─ b.lgt [skipped]*
                   └─ b_tests [skipped]*
                      └─ only [skipped]*
            "}
        );
    }
}
