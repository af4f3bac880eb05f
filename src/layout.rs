//! Render-coordinate layout for the conversation tree.
//!
//! Purely derived output: recomputed from scratch on every snapshot change,
//! no incremental state. Coordinates are assigned top-down — the root is
//! centered, children spread symmetrically around their parent — then a
//! post-pass separates colliding nodes level by level.

use std::collections::BTreeMap;

use crate::tree::Tree;

/// Geometry knobs for the layout.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    pub h_spacing: f64,
    pub v_spacing: f64,
    /// Extra gap required between nodes on one level, on top of the width.
    pub padding: f64,
    /// Vertical offset of the root row.
    pub base_offset: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 160.0,
            node_height: 44.0,
            h_spacing: 200.0,
            v_spacing: 32.0,
            padding: 16.0,
            base_offset: 0.0,
        }
    }
}

/// A tree node's render position. Disposable projection, never a source of
/// truth; pair it back with the tree by id.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub level: usize,
}

/// Assign coordinates to every node of `tree`.
///
/// `y = base_offset + level * (node_height + v_spacing)`; each child's x is
/// offset from its parent by `(index - (count - 1) / 2) * h_spacing`.
/// Collisions within a level are resolved by pushing the right-hand node
/// (and everything after it on that level) further right until consecutive
/// nodes are at least `node_width + padding` apart.
pub fn layout(tree: &Tree, config: &LayoutConfig) -> Vec<RenderNode> {
    let mut nodes = Vec::with_capacity(tree.node_count());

    let mut stack = vec![(tree.root(), 0usize, 0.0f64)];
    while let Some((node, level, x)) = stack.pop() {
        nodes.push(RenderNode {
            id: node.id.clone(),
            x,
            y: config.base_offset + level as f64 * (config.node_height + config.v_spacing),
            level,
        });

        let count = node.children.len();
        // Reverse keeps pre-order in the output.
        for (index, child) in node.children.iter().enumerate().rev() {
            let offset = (index as f64 - (count as f64 - 1.0) / 2.0) * config.h_spacing;
            stack.push((child, level + 1, x + offset));
        }
    }

    separate_levels(&mut nodes, config);
    nodes
}

/// Cascade-separate each level: scan left to right and push any node closer
/// than the minimum separation to its left neighbor rightward by the
/// deficit, carrying the shift to all subsequent nodes on the level.
fn separate_levels(nodes: &mut [RenderNode], config: &LayoutConfig) {
    let min_separation = config.node_width + config.padding;

    let mut by_level: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        by_level.entry(node.level).or_default().push(index);
    }

    for indices in by_level.values_mut() {
        indices.sort_by(|&a, &b| {
            nodes[a]
                .x
                .partial_cmp(&nodes[b].x)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut carry = 0.0;
        let mut previous_x: Option<f64> = None;
        for &index in indices.iter() {
            let mut x = nodes[index].x + carry;
            if let Some(prev) = previous_x {
                let deficit = min_separation - (x - prev);
                if deficit > 0.0 {
                    x += deficit;
                    carry += deficit;
                }
            }
            nodes[index].x = x;
            previous_x = Some(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::tree::test_support::{node, sample_tree};
    use crate::tree::Tree;

    fn config() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn find<'a>(nodes: &'a [RenderNode], id: &str) -> &'a RenderNode {
        nodes.iter().find(|n| n.id == id).expect("node laid out")
    }

    #[test]
    fn test_root_centered_levels_stacked() {
        let tree = sample_tree();
        let cfg = config();
        let nodes = layout(&tree, &cfg);

        let root = find(&nodes, "root");
        assert_eq!(root.x, 0.0);
        assert_eq!(root.y, cfg.base_offset);
        assert_eq!(root.level, 0);

        let u1 = find(&nodes, "u1");
        assert_eq!(u1.level, 1);
        assert_eq!(u1.y, cfg.base_offset + cfg.node_height + cfg.v_spacing);
        // Only child sits directly under its parent.
        assert_eq!(u1.x, root.x);
    }

    #[test]
    fn test_children_spread_symmetrically() {
        let tree = sample_tree();
        let cfg = config();
        let nodes = layout(&tree, &cfg);

        let u1 = find(&nodes, "u1");
        let a1 = find(&nodes, "a1");
        let a3 = find(&nodes, "a3");
        // Two children: offsets -0.5 and +0.5 of h_spacing.
        assert!((a1.x - (u1.x - cfg.h_spacing / 2.0)).abs() < 1e-9);
        assert!((a3.x - (u1.x + cfg.h_spacing / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_every_node_gets_coordinates() {
        let tree = sample_tree();
        let nodes = layout(&tree, &config());
        assert_eq!(nodes.len(), tree.node_count());
    }

    #[test]
    fn test_no_overlap_within_level() {
        // Two wide sibling subtrees whose children would collide in the
        // symmetric pass.
        let tree = Tree::new(node(
            "root",
            Role::System,
            vec![
                node(
                    "l",
                    Role::User,
                    vec![
                        node("l1", Role::Assistant, vec![]),
                        node("l2", Role::Assistant, vec![]),
                        node("l3", Role::Assistant, vec![]),
                    ],
                ),
                node(
                    "r",
                    Role::User,
                    vec![
                        node("r1", Role::Assistant, vec![]),
                        node("r2", Role::Assistant, vec![]),
                        node("r3", Role::Assistant, vec![]),
                    ],
                ),
            ],
        ))
        .unwrap();

        let cfg = config();
        let nodes = layout(&tree, &cfg);

        let mut by_level: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for n in &nodes {
            by_level.entry(n.level).or_default().push(n.x);
        }
        for xs in by_level.values_mut() {
            xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for pair in xs.windows(2) {
                assert!(
                    pair[1] - pair[0] >= cfg.node_width,
                    "nodes {} and {} overlap",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_collision_shift_cascades() {
        // Three coincident nodes on one level end up evenly separated.
        let tree = Tree::new(node(
            "root",
            Role::System,
            vec![
                node("a", Role::User, vec![node("a-child", Role::Assistant, vec![])]),
                node("b", Role::User, vec![node("b-child", Role::Assistant, vec![])]),
                node("c", Role::User, vec![node("c-child", Role::Assistant, vec![])]),
            ],
        ))
        .unwrap();

        let mut cfg = config();
        // Single-child offsets are zero, so all three grandchildren start
        // exactly above their parents; force the parents to collide too.
        cfg.h_spacing = 10.0;
        let nodes = layout(&tree, &cfg);

        let min_separation = cfg.node_width + cfg.padding;
        let mut level1: Vec<f64> = nodes.iter().filter(|n| n.level == 1).map(|n| n.x).collect();
        level1.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in level1.windows(2) {
            assert!((pair[1] - pair[0]) - min_separation >= -1e-9);
        }
    }

    #[test]
    fn test_layout_is_deterministic() {
        let tree = sample_tree();
        let first = layout(&tree, &config());
        let second = layout(&tree, &config());
        assert_eq!(first, second);
    }
}
