//! Keyed, incremental reconciliation of a [`LayoutSnapshot`] against what a
//! [`Scene`] currently shows.
//!
//! Nodes are keyed by id and edges by `(source, target)`. A sync pass only
//! issues scene calls for visuals that appeared, disappeared or changed, so a
//! re-render triggered by unrelated host state costs nothing on the scene
//! side, and a drag touches one node plus its incident edges.

use std::collections::{HashMap, HashSet};

use crate::layout::{LayoutSnapshot, NodeLayout, Swatch};
use crate::Position;

pub const EDGE_OPACITY: f64 = 0.2;
pub const EDGE_WIDTH: f64 = 2.5;
pub const EMPHASIS_STROKE: f64 = 4.0;
pub const NORMAL_STROKE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeVisual {
    pub position: Position,
    pub radius: f64,
    pub swatch: Swatch,
    pub stroke_width: f64,
    pub label: String,
    pub font_size: f64,
    pub font_weight: u16,
    pub is_root: bool,
}

impl NodeVisual {
    pub fn from_layout(node: &NodeLayout, selected: Option<&str>) -> Self {
        let is_root = node.depth == 0;
        let emphasized = is_root || selected == Some(node.id.as_str());
        Self {
            position: node.position,
            radius: node.radius,
            swatch: node.swatch,
            stroke_width: if emphasized { EMPHASIS_STROKE } else { NORMAL_STROKE },
            label: node.name.clone(),
            font_size: node.radius * if is_root { 0.18 } else { 0.22 },
            font_weight: if is_root { 900 } else { 700 },
            is_root,
        }
    }
}

/// Edges take their color from the target node and are always faint.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeVisual {
    pub from: Position,
    pub to: Position,
    pub swatch: Swatch,
    pub opacity: f64,
    pub width: f64,
}

/// The drawing surface. Implementations only ever see minimal changes.
pub trait Scene {
    fn add_node(&mut self, id: &str, visual: &NodeVisual);
    fn update_node(&mut self, id: &str, visual: &NodeVisual);
    fn remove_node(&mut self, id: &str);
    fn add_edge(&mut self, key: &EdgeKey, visual: &EdgeVisual);
    fn update_edge(&mut self, key: &EdgeKey, visual: &EdgeVisual);
    fn remove_edge(&mut self, key: &EdgeKey);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl SyncStats {
    pub fn touched(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

/// Remembers the visuals last handed to the scene.
#[derive(Debug, Default)]
pub struct RenderSync {
    nodes: HashMap<String, NodeVisual>,
    edges: HashMap<EdgeKey, EdgeVisual>,
    adjacency: HashMap<String, Vec<EdgeKey>>,
}

impl RenderSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&NodeVisual> {
        self.nodes.get(id)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&EdgeVisual> {
        self.edges.get(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Bring the scene in line with `snapshot`.
    pub fn sync(
        &mut self,
        snapshot: &LayoutSnapshot,
        selected: Option<&str>,
        scene: &mut dyn Scene,
    ) -> SyncStats {
        let mut stats = SyncStats::default();

        let live_nodes: HashSet<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
        let live_edges: HashSet<EdgeKey> = snapshot
            .edges
            .iter()
            .map(|e| EdgeKey::new(e.source.as_str(), e.target.as_str()))
            .collect();

        // exits
        let stale_edges: Vec<EdgeKey> = self
            .edges
            .keys()
            .filter(|k| !live_edges.contains(*k))
            .cloned()
            .collect();
        for key in stale_edges {
            self.edges.remove(&key);
            scene.remove_edge(&key);
            stats.removed += 1;
        }
        let stale_nodes: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !live_nodes.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale_nodes {
            self.nodes.remove(&id);
            scene.remove_node(&id);
            stats.removed += 1;
        }

        // edges first so they stay beneath the nodes
        self.adjacency.clear();
        for edge in &snapshot.edges {
            let (Some(source), Some(target)) = (snapshot.node(&edge.source), snapshot.node(&edge.target)) else {
                continue;
            };
            let key = EdgeKey::new(edge.source.as_str(), edge.target.as_str());
            let visual = EdgeVisual {
                from: source.position,
                to: target.position,
                swatch: target.swatch,
                opacity: EDGE_OPACITY,
                width: EDGE_WIDTH,
            };
            self.adjacency.entry(key.source.clone()).or_default().push(key.clone());
            self.adjacency.entry(key.target.clone()).or_default().push(key.clone());
            upsert_edge(&mut self.edges, key, visual, scene, &mut stats);
        }

        for node in &snapshot.nodes {
            let visual = NodeVisual::from_layout(node, selected);
            match self.nodes.get(&node.id) {
                None => {
                    scene.add_node(&node.id, &visual);
                    self.nodes.insert(node.id.clone(), visual);
                    stats.added += 1;
                }
                Some(prev) if *prev != visual => {
                    scene.update_node(&node.id, &visual);
                    self.nodes.insert(node.id.clone(), visual);
                    stats.updated += 1;
                }
                Some(_) => stats.unchanged += 1,
            }
        }

        stats
    }

    /// Drag-time redraw: move one node and its incident edges, nothing else.
    /// Returns false for an id that is not on screen.
    pub fn move_node(&mut self, id: &str, position: Position, scene: &mut dyn Scene) -> bool {
        let Some(visual) = self.nodes.get_mut(id) else {
            return false;
        };
        if visual.position == position {
            return true;
        }
        visual.position = position;
        scene.update_node(id, visual);

        for key in self.adjacency.get(id).into_iter().flatten() {
            if let Some(edge) = self.edges.get_mut(key) {
                if key.source == id {
                    edge.from = position;
                }
                if key.target == id {
                    edge.to = position;
                }
                scene.update_edge(key, edge);
            }
        }
        true
    }

    /// Remove every visual, e.g. when the host has no tree anymore.
    pub fn clear(&mut self, scene: &mut dyn Scene) -> SyncStats {
        let mut stats = SyncStats::default();
        for key in self.edges.keys() {
            scene.remove_edge(key);
            stats.removed += 1;
        }
        for id in self.nodes.keys() {
            scene.remove_node(id);
            stats.removed += 1;
        }
        self.edges.clear();
        self.nodes.clear();
        self.adjacency.clear();
        stats
    }
}

fn upsert_edge(
    edges: &mut HashMap<EdgeKey, EdgeVisual>,
    key: EdgeKey,
    visual: EdgeVisual,
    scene: &mut dyn Scene,
    stats: &mut SyncStats,
) {
    match edges.get(&key) {
        None => {
            scene.add_edge(&key, &visual);
            edges.insert(key, visual);
            stats.added += 1;
        }
        Some(prev) if *prev != visual => {
            scene.update_edge(&key, &visual);
            edges.insert(key, visual);
            stats.updated += 1;
        }
        Some(_) => stats.unchanged += 1,
    }
}

/// Scene that records every call; handy for asserting on diff behaviour.
#[derive(Debug, Default)]
pub struct RecordingScene {
    pub calls: Vec<SceneCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    AddNode(String),
    UpdateNode(String),
    RemoveNode(String),
    AddEdge(EdgeKey),
    UpdateEdge(EdgeKey),
    RemoveEdge(EdgeKey),
}

impl RecordingScene {
    pub fn take(&mut self) -> Vec<SceneCall> {
        std::mem::take(&mut self.calls)
    }
}

impl Scene for RecordingScene {
    fn add_node(&mut self, id: &str, _: &NodeVisual) {
        self.calls.push(SceneCall::AddNode(id.to_string()));
    }
    fn update_node(&mut self, id: &str, _: &NodeVisual) {
        self.calls.push(SceneCall::UpdateNode(id.to_string()));
    }
    fn remove_node(&mut self, id: &str) {
        self.calls.push(SceneCall::RemoveNode(id.to_string()));
    }
    fn add_edge(&mut self, key: &EdgeKey, _: &EdgeVisual) {
        self.calls.push(SceneCall::AddEdge(key.clone()));
    }
    fn update_edge(&mut self, key: &EdgeKey, _: &EdgeVisual) {
        self.calls.push(SceneCall::UpdateEdge(key.clone()));
    }
    fn remove_edge(&mut self, key: &EdgeKey) {
        self.calls.push(SceneCall::RemoveEdge(key.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::PositionStore;
    use crate::tree;
    use crate::{Category, TreeNode};

    fn sample() -> TreeNode {
        TreeNode::new("root", "Shop", None).with_children(vec![
            TreeNode::new("a", "Pricing", Some(Category::Strategy)),
            TreeNode::new("b", "Cart", Some(Category::Implementation)),
        ])
    }

    fn synced(tree: &TreeNode, store: &PositionStore) -> (RenderSync, RecordingScene) {
        let mut sync = RenderSync::new();
        let mut scene = RecordingScene::default();
        sync.sync(&LayoutSnapshot::compute(tree, store), None, &mut scene);
        scene.take();
        (sync, scene)
    }

    #[test]
    fn first_pass_adds_everything() {
        let mut sync = RenderSync::new();
        let mut scene = RecordingScene::default();
        let stats = sync.sync(&LayoutSnapshot::compute(&sample(), &PositionStore::new()), None, &mut scene);
        assert_eq!(stats.added, 5);
        assert_eq!(sync.node_count(), 3);
        assert_eq!(sync.edge_count(), 2);
        // edges are drawn before nodes
        assert!(matches!(scene.calls[0], SceneCall::AddEdge(_)));
    }

    #[test]
    fn identical_rerender_touches_nothing() {
        let tree = sample();
        let store = PositionStore::new();
        let (mut sync, mut scene) = synced(&tree, &store);
        let stats = sync.sync(&LayoutSnapshot::compute(&tree, &store), None, &mut scene);
        assert_eq!(stats.touched(), 0);
        assert_eq!(stats.unchanged, 5);
        assert!(scene.calls.is_empty());
    }

    #[test]
    fn selection_only_updates_the_ring() {
        let tree = sample();
        let store = PositionStore::new();
        let (mut sync, mut scene) = synced(&tree, &store);
        sync.sync(&LayoutSnapshot::compute(&tree, &store), Some("a"), &mut scene);
        assert_eq!(scene.take(), vec![SceneCall::UpdateNode("a".into())]);
        assert_eq!(sync.node("a").unwrap().stroke_width, EMPHASIS_STROKE);
        assert_eq!(sync.node("b").unwrap().stroke_width, NORMAL_STROKE);
        assert_eq!(sync.node("root").unwrap().stroke_width, EMPHASIS_STROKE);
    }

    #[test]
    fn deleting_a_node_removes_it_and_its_edge() {
        let tree = sample();
        let store = PositionStore::new();
        let (mut sync, mut scene) = synced(&tree, &store);
        let pruned = tree::delete_subtree(&tree, "b").unwrap();
        sync.sync(&LayoutSnapshot::compute(&pruned, &store), None, &mut scene);
        let calls = scene.take();
        assert!(calls.contains(&SceneCall::RemoveNode("b".into())));
        assert!(calls.contains(&SceneCall::RemoveEdge(EdgeKey::new("root", "b"))));
        // "a" recenters under the root once its sibling is gone
        assert!(calls.contains(&SceneCall::UpdateNode("a".into())));
        assert_eq!(sync.node("a").unwrap().position, Position::new(0.0, 200.0));
    }

    #[test]
    fn move_node_touches_only_incident_edges() {
        let tree = TreeNode::new("root", "Root", None).with_children(vec![
            TreeNode::new("p", "P", None).with_children(vec![TreeNode::new("k", "K", None)]),
            TreeNode::new("q", "Q", None),
        ]);
        let (mut sync, mut scene) = synced(&tree, &PositionStore::new());
        assert!(sync.move_node("p", Position::new(30.0, 40.0), &mut scene));
        let calls = scene.take();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&SceneCall::UpdateNode("p".into())));
        assert!(calls.contains(&SceneCall::UpdateEdge(EdgeKey::new("root", "p"))));
        assert!(calls.contains(&SceneCall::UpdateEdge(EdgeKey::new("p", "k"))));
        assert_eq!(sync.edge(&EdgeKey::new("p", "k")).unwrap().from, Position::new(30.0, 40.0));
        assert!(!sync.move_node("ghost", Position::new(0.0, 0.0), &mut scene));
    }

    #[test]
    fn edge_color_follows_target() {
        let (sync, _) = synced(&sample(), &PositionStore::new());
        let edge = sync.edge(&EdgeKey::new("root", "a")).unwrap();
        assert_eq!(edge.swatch, Swatch::Strategy);
        assert_eq!(edge.opacity, EDGE_OPACITY);
    }
}
