//! Deterministic placement of tree nodes in world space.
//!
//! Each node sits on a horizontal band for its depth, and siblings are spread
//! symmetrically around their parent's x. A stored manual position replaces
//! the computed one outright, and the children of a moved node follow the
//! moved position. There is no iterative relaxation: every coordinate is a
//! closed-form function of the tree shape and the [`PositionStore`].

use std::collections::HashMap;

use crate::positions::PositionStore;
use crate::{Category, Position, TreeNode};

pub const LEVEL_SPACING: f64 = 200.0;
pub const SIBLING_SPACING: f64 = 250.0;

pub const ROOT_RADIUS: f64 = 85.0;
pub const BRANCH_RADIUS: f64 = 65.0;
pub const LEAF_RADIUS: f64 = 50.0;

/// Render color of a node, fixed by depth and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Swatch {
    Root,
    Strategy,
    Design,
    Implementation,
}

impl Swatch {
    pub fn hex(&self) -> &'static str {
        match self {
            Swatch::Root => "#ffffff",
            Swatch::Strategy => "#fbbf24",
            Swatch::Design => "#ec4899",
            Swatch::Implementation => "#06b6d4",
        }
    }

    /// The legend shown next to the diagram, root excluded.
    pub const LEGEND: [(Swatch, &'static str); 3] = [
        (Swatch::Strategy, "Strategy"),
        (Swatch::Design, "Design"),
        (Swatch::Implementation, "Implementation"),
    ];
}

pub fn radius_for_depth(depth: usize) -> f64 {
    match depth {
        0 => ROOT_RADIUS,
        1 => BRANCH_RADIUS,
        _ => LEAF_RADIUS,
    }
}

/// The root is always white; everything else follows its category and
/// falls back to design.
pub fn swatch_for(depth: usize, category: Option<Category>) -> Swatch {
    if depth == 0 {
        return Swatch::Root;
    }
    match category {
        Some(Category::Strategy) => Swatch::Strategy,
        Some(Category::Implementation) => Swatch::Implementation,
        Some(Category::Design) | None => Swatch::Design,
    }
}

/// Computed default for a child given its parent's resolved position.
pub fn default_position(
    parent: Option<Position>,
    depth: usize,
    sibling_index: usize,
    sibling_count: usize,
) -> Position {
    let x = match parent {
        Some(p) => {
            let offset = sibling_index as f64 - (sibling_count.max(1) - 1) as f64 / 2.0;
            p.x + offset * SIBLING_SPACING
        }
        None => 0.0,
    };
    Position::new(x, depth as f64 * LEVEL_SPACING)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeLayout {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub position: Position,
    pub radius: f64,
    pub swatch: Swatch,
    /// True when the position came from the store.
    pub pinned: bool,
}

impl NodeLayout {
    pub fn contains(&self, point: Position) -> bool {
        self.position.distance_to(point) <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeLayout {
    pub source: String,
    pub target: String,
}

/// Resolved coordinates for every node of one tree, recomputed each render.
#[derive(Debug, Clone, Default)]
pub struct LayoutSnapshot {
    pub nodes: Vec<NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    index: HashMap<String, usize>,
}

impl LayoutSnapshot {
    pub fn compute(tree: &TreeNode, store: &PositionStore) -> Self {
        let mut snapshot = LayoutSnapshot::default();
        place(tree, None, 0, 0, 1, store, &mut snapshot);
        snapshot
    }

    pub fn node(&self, id: &str) -> Option<&NodeLayout> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn position(&self, id: &str) -> Option<Position> {
        self.node(id).map(|n| n.position)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topmost node under `point`. Later nodes draw over earlier ones.
    pub fn hit_test(&self, point: Position) -> Option<&NodeLayout> {
        self.nodes.iter().rev().find(|n| n.contains(point))
    }

    pub fn incident_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeLayout> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == id || e.target == id)
    }
}

fn place(
    node: &TreeNode,
    parent: Option<(&str, Position)>,
    depth: usize,
    sibling_index: usize,
    sibling_count: usize,
    store: &PositionStore,
    out: &mut LayoutSnapshot,
) {
    let (position, pinned) = match store.get(&node.id) {
        Some(saved) => (saved, true),
        None => (
            default_position(parent.map(|(_, p)| p), depth, sibling_index, sibling_count),
            false,
        ),
    };

    out.index.insert(node.id.clone(), out.nodes.len());
    out.nodes.push(NodeLayout {
        id: node.id.clone(),
        name: node.name.clone(),
        parent_id: parent.map(|(id, _)| id.to_string()),
        depth,
        position,
        radius: radius_for_depth(depth),
        swatch: swatch_for(depth, node.category),
        pinned,
    });

    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        out.edges.push(EdgeLayout {
            source: node.id.clone(),
            target: child.id.clone(),
        });
        place(child, Some((&node.id, position)), depth + 1, i, count, store, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fan(n: usize) -> TreeNode {
        let children = (0..n)
            .map(|i| TreeNode::new(format!("c{}", i), format!("Child {}", i), Some(Category::Design)))
            .collect();
        TreeNode::new("root", "Root", Some(Category::Strategy)).with_children(children)
    }

    #[test]
    fn root_sits_at_origin_and_is_white() {
        let snap = LayoutSnapshot::compute(&fan(0), &PositionStore::new());
        let root = snap.node("root").unwrap();
        assert_eq!(root.position, Position::new(0.0, 0.0));
        assert_eq!(root.swatch, Swatch::Root);
        assert_eq!(root.radius, ROOT_RADIUS);
        assert!(snap.edges.is_empty());
    }

    #[test]
    fn three_children_spread_symmetrically() {
        let snap = LayoutSnapshot::compute(&fan(3), &PositionStore::new());
        let xs: Vec<f64> = ["c0", "c1", "c2"].iter().map(|id| snap.position(id).unwrap().x).collect();
        assert_eq!(xs, vec![-250.0, 0.0, 250.0]);
        assert!(["c0", "c1", "c2"].iter().all(|id| snap.position(id).unwrap().y == 200.0));
    }

    #[test]
    fn two_children_straddle_parent() {
        let snap = LayoutSnapshot::compute(&fan(2), &PositionStore::new());
        assert_eq!(snap.position("c0").unwrap().x, -125.0);
        assert_eq!(snap.position("c1").unwrap().x, 125.0);
    }

    #[test]
    fn children_follow_a_moved_parent_horizontally_only() {
        let tree = TreeNode::new("root", "Root", None).with_children(vec![
            TreeNode::new("p", "Parent", None).with_children(vec![TreeNode::new("k", "Kid", None)]),
        ]);
        let store = PositionStore::single("p", Position::new(400.0, -30.0));
        let snap = LayoutSnapshot::compute(&tree, &store);
        assert!(snap.node("p").unwrap().pinned);
        assert_eq!(snap.position("k"), Some(Position::new(400.0, 400.0)));
    }

    #[test]
    fn radius_and_color_tiers() {
        let tree = TreeNode::new("root", "Root", Some(Category::Implementation)).with_children(vec![
            TreeNode::new("a", "A", Some(Category::Strategy)).with_children(vec![
                TreeNode::new("b", "B", None).with_children(vec![TreeNode::new(
                    "c",
                    "C",
                    Some(Category::Implementation),
                )]),
            ]),
        ]);
        let snap = LayoutSnapshot::compute(&tree, &PositionStore::new());
        let tiers: Vec<(f64, Swatch)> = snap.nodes.iter().map(|n| (n.radius, n.swatch)).collect();
        assert_eq!(
            tiers,
            vec![
                (85.0, Swatch::Root),
                (65.0, Swatch::Strategy),
                (50.0, Swatch::Design),
                (50.0, Swatch::Implementation),
            ]
        );
    }

    #[test]
    fn hit_test_prefers_topmost() {
        let tree = fan(1);
        // park the child on top of the root
        let store = PositionStore::single("c0", Position::new(10.0, 0.0));
        let snap = LayoutSnapshot::compute(&tree, &store);
        assert_eq!(snap.hit_test(Position::new(5.0, 0.0)).map(|n| n.id.as_str()), Some("c0"));
        assert_eq!(snap.hit_test(Position::new(-80.0, 0.0)).map(|n| n.id.as_str()), Some("root"));
        assert!(snap.hit_test(Position::new(1000.0, 1000.0)).is_none());
    }

    #[test]
    fn incident_edges_cover_both_directions() {
        let tree = TreeNode::new("root", "Root", None).with_children(vec![
            TreeNode::new("p", "Parent", None).with_children(vec![TreeNode::new("k", "Kid", None)]),
        ]);
        let snap = LayoutSnapshot::compute(&tree, &PositionStore::new());
        let edges: Vec<(&str, &str)> = snap
            .incident_edges("p")
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(edges, vec![("root", "p"), ("p", "k")]);
    }
}
