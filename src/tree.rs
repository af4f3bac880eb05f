//! Conversation tree model.
//!
//! A [`Tree`] is a validated, immutable snapshot of the conversation graph.
//! Mutations never happen in place; a reload constructs a whole new snapshot
//! that replaces the old one. All traversals use an explicit stack so a
//! hostile or deeply nested payload cannot blow the call stack.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Role;

/// A single node in the conversation tree.
///
/// `children` order is insertion order and significant: the first-created
/// branch comes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// A node with no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A validated conversation tree snapshot.
#[derive(Debug, Clone)]
pub struct Tree {
    root: TreeNode,
}

impl Tree {
    /// Validate and wrap a root node.
    ///
    /// Rejects duplicate ids, which also rejects any unfolded DAG encoding:
    /// with unique ids and by-ownership children, no node can be reached
    /// twice.
    pub fn new(root: TreeNode) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![&root];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id.as_str()) {
                return Err(Error::snapshot(format!("duplicate node id: {}", node.id)));
            }
            stack.extend(node.children.iter());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Pre-order search for a node by id. First match wins; ids are unique
    /// so at most one node matches. Absence is an expected, frequent case
    /// (stale ids after a reload) and returns `None`.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            // Reverse keeps pre-order: first child is popped next.
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Root-to-node path, inclusive on both ends. Empty if the id is absent.
    pub fn path_to(&self, id: &str) -> Vec<&TreeNode> {
        // Iterative DFS where the stack *is* the current path.
        let mut stack: Vec<(&TreeNode, usize)> = vec![(&self.root, 0)];
        if self.root.id == id {
            return vec![&self.root];
        }
        while let Some(&mut (node, ref mut next_child)) = stack.last_mut() {
            if *next_child < node.children.len() {
                let child = &node.children[*next_child];
                *next_child += 1;
                if child.id == id {
                    let mut path: Vec<&TreeNode> = stack.iter().map(|(n, _)| *n).collect();
                    path.push(child);
                    return path;
                }
                stack.push((child, 0));
            } else {
                stack.pop();
            }
        }
        Vec::new()
    }

    /// All nodes with no children, in pre-order.
    pub fn leaves(&self) -> Vec<&TreeNode> {
        let mut leaves = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                leaves.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        leaves
    }

    /// The leaf with the lexicographically greatest id.
    ///
    /// Used as a proxy for recency: ids are assumed assigned in creation
    /// order by the external id generator (ULID-style, not random UUIDv4).
    /// A creation timestamp on each node would remove the assumption.
    pub fn latest_leaf(&self) -> Option<&TreeNode> {
        self.leaves()
            .into_iter()
            .max_by(|a, b| a.id.as_str().cmp(b.id.as_str()))
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Shorthand node constructor for tests.
    pub fn node(id: &str, role: Role, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            id: id.to_string(),
            role,
            content: format!("content of {id}"),
            children,
        }
    }

    /// A small branching fixture:
    ///
    /// ```text
    /// root (system)
    /// └── u1 (user)
    ///     ├── a1 (assistant)
    ///     │   └── u2 (user)
    ///     │       └── a2 (assistant)
    ///     └── a3 (assistant)
    /// ```
    pub fn sample_tree() -> Tree {
        Tree::new(node(
            "root",
            Role::System,
            vec![node(
                "u1",
                Role::User,
                vec![
                    node(
                        "a1",
                        Role::Assistant,
                        vec![node("u2", Role::User, vec![node("a2", Role::Assistant, vec![])])],
                    ),
                    node("a3", Role::Assistant, vec![]),
                ],
            )],
        ))
        .expect("fixture is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{node, sample_tree};
    use super::*;

    #[test]
    fn test_duplicate_id_rejected() {
        let result = Tree::new(node(
            "root",
            Role::System,
            vec![
                node("x", Role::User, vec![]),
                node("x", Role::User, vec![]),
            ],
        ));
        assert!(matches!(result, Err(Error::Snapshot(_))));
    }

    #[test]
    fn test_find_hits_and_misses() {
        let tree = sample_tree();
        assert_eq!(tree.find("a2").map(|n| n.id.as_str()), Some("a2"));
        assert!(tree.find("nope").is_none());
    }

    #[test]
    fn test_find_returns_at_most_one_per_id() {
        let tree = sample_tree();
        for id in ["root", "u1", "a1", "u2", "a2", "a3"] {
            let found = tree.find(id).expect("all fixture ids resolve");
            assert_eq!(found.id, id);
        }
        assert_eq!(tree.node_count(), 6);
    }

    #[test]
    fn test_path_starts_at_root_and_ends_at_target() {
        let tree = sample_tree();
        let path = tree.path_to("a2");
        let ids: Vec<&str> = path.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["root", "u1", "a1", "u2", "a2"]);

        // Every consecutive pair is a parent -> child edge.
        for pair in path.windows(2) {
            assert!(pair[0].children.iter().any(|c| c.id == pair[1].id));
        }
    }

    #[test]
    fn test_path_to_root_and_to_missing() {
        let tree = sample_tree();
        let ids: Vec<&str> = tree.path_to("root").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["root"]);
        assert!(tree.path_to("gone").is_empty());
    }

    #[test]
    fn test_leaves_in_preorder() {
        let tree = sample_tree();
        let ids: Vec<&str> = tree.leaves().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a2", "a3"]);
    }

    #[test]
    fn test_latest_leaf_is_lexicographically_greatest() {
        let tree = sample_tree();
        assert_eq!(tree.latest_leaf().map(|n| n.id.as_str()), Some("a3"));
    }

    #[test]
    fn test_single_node_tree_is_its_own_latest_leaf() {
        let tree = Tree::new(node("only", Role::System, vec![])).unwrap();
        assert_eq!(tree.latest_leaf().map(|n| n.id.as_str()), Some("only"));
    }

    #[test]
    fn test_deeply_nested_tree_does_not_overflow() {
        // 10k-deep chain; recursion would overflow, the explicit stack must not.
        let mut node_at_bottom = node("n10000", Role::Assistant, vec![]);
        for depth in (0..10_000).rev() {
            node_at_bottom = node(&format!("n{depth:05}"), Role::User, vec![node_at_bottom]);
        }
        let tree = Tree::new(node_at_bottom).unwrap();
        assert_eq!(tree.node_count(), 10_001);
        assert_eq!(tree.path_to("n10000").len(), 10_001);
        assert_eq!(tree.leaves().len(), 1);
    }
}
