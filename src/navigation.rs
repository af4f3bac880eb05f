//! Selection and branching state machine.
//!
//! Tracks where the user currently is in the conversation tree, detects
//! branching mode, and carries a preserved selection across the reload that
//! follows a streamed send. Every tree-dependent operation takes the
//! snapshot as an explicit parameter; there is no hidden "current tree",
//! which is what makes operating on a stale snapshot impossible to express.

use crate::model::Role;
use crate::tree::{Tree, TreeNode};

/// Selection state for one chat session.
///
/// `path` is always the root-to-selected id chain recomputed from the tree
/// passed to [`select`](Self::select). `preserved_id` is a scratch slot that
/// outlives one reload cycle; it exists only to survive the reload that
/// follows a streamed send in branching mode.
#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    selected_id: Option<String>,
    path: Vec<String>,
    preserved_id: Option<String>,
}

impl NavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently selected node id, if any.
    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// Root-to-selected id chain. Empty when nothing is selected or the
    /// selected id is absent from the tree it was selected against.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn preserved_id(&self) -> Option<&str> {
        self.preserved_id.as_deref()
    }

    /// Select a node and recompute the path against `tree`.
    ///
    /// Selecting an id the tree does not contain yields an empty path and an
    /// orphaned selection; callers surface that as "node not found", the
    /// state machine does not.
    pub fn select(&mut self, id: &str, tree: &Tree) {
        self.selected_id = Some(id.to_string());
        self.path = tree.path_to(id).iter().map(|n| n.id.clone()).collect();
        if self.path.is_empty() {
            tracing::debug!(target: "arbor::navigation", id, "selected id not in tree");
        }
    }

    /// True iff a node is selected and it is not the tree's latest leaf.
    ///
    /// This is the single source of truth for whether the next message
    /// becomes a branch (parent = selected id) or a continuation.
    pub fn is_branching(&self, tree: &Tree) -> bool {
        match self.selected_id.as_deref() {
            Some(selected) => tree.latest_leaf().map_or(true, |leaf| leaf.id != selected),
            None => false,
        }
    }

    /// Capture the selection before a streamed send.
    ///
    /// Continuation-mode sends do not need preservation: auto-select-latest
    /// already produces the correct post-reload state, so the slot is
    /// cleared instead.
    pub fn preserve_for_streaming(&mut self, tree: &Tree) {
        if self.is_branching(tree) {
            self.preserved_id = self.selected_id.clone();
        } else {
            self.preserved_id = None;
        }
    }

    /// Restore the preserved selection against a freshly loaded tree.
    ///
    /// Returns false (and changes nothing) when no id is preserved or the
    /// preserved id is no longer present. With `prefer_new_branch`, the
    /// lexicographically greatest assistant-role node in the preserved
    /// node's subtree is selected when it exists and differs from the
    /// preserved id: that node is the branch the user just created.
    pub fn restore_preserved(&mut self, tree: &Tree, prefer_new_branch: bool) -> bool {
        let Some(preserved) = self.preserved_id.clone() else {
            return false;
        };
        let Some(anchor) = tree.find(&preserved) else {
            tracing::debug!(
                target: "arbor::navigation",
                id = %preserved,
                "preserved selection absent from reloaded tree"
            );
            return false;
        };

        if prefer_new_branch {
            if let Some(branch) = latest_assistant_descendant(anchor) {
                if branch.id != preserved {
                    let id = branch.id.clone();
                    self.select(&id, tree);
                    self.preserved_id = None;
                    return true;
                }
            }
        }

        self.select(&preserved, tree);
        self.preserved_id = None;
        true
    }

    /// Select the tree's latest leaf iff it is an assistant node.
    ///
    /// The default entry point after a fresh load, and the fallback when no
    /// preservation applies.
    pub fn auto_select_latest(&mut self, tree: &Tree) -> bool {
        match tree.latest_leaf() {
            Some(leaf) if leaf.role == Role::Assistant => {
                let id = leaf.id.clone();
                self.select(&id, tree);
                true
            }
            _ => false,
        }
    }

    /// Reset selection and path. Leaves `preserved_id` untouched so a
    /// restore can still run after the clear that precedes it.
    pub fn clear(&mut self) {
        self.selected_id = None;
        self.path.clear();
    }
}

/// Lexicographically greatest assistant-role node in `anchor`'s subtree,
/// the anchor itself included.
fn latest_assistant_descendant(anchor: &TreeNode) -> Option<&TreeNode> {
    let mut best: Option<&TreeNode> = None;
    let mut stack = vec![anchor];
    while let Some(node) = stack.pop() {
        if node.role == Role::Assistant && best.map_or(true, |b| node.id > b.id) {
            best = Some(node);
        }
        stack.extend(node.children.iter());
    }
    best
}
