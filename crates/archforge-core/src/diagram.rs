//! The interactive project-tree diagram.
//!
//! A [`Diagram`] is re-rendered with fresh [`DiagramProps`] whenever the host's
//! state changes. Each render recomputes the layout, but only the keyed diff
//! reaches the scene. Pointer input is routed either to a node drag (world
//! coordinates, committed to the host on release) or to a canvas pan (camera
//! only), so the two never mix.

use tracing::{debug, trace};

use crate::drag::{DragCommit, DragController};
use crate::layout::LayoutSnapshot;
use crate::positions::PositionStore;
use crate::render::{RenderSync, Scene, SyncStats};
use crate::tree;
use crate::viewport::{ViewportController, ViewportTransform};
use crate::{Position, TreeNode};

/// Wheel notch to zoom exponent, as in common browser zoom behaviours.
const WHEEL_SENSITIVITY: f64 = 0.002;

/// Callbacks from the diagram back to whoever owns the tree and the store.
pub trait DiagramHost {
    /// Called once per finished drag with a single-entry mapping.
    fn on_positions_update(&mut self, update: PositionStore);
    /// Called when a node is clicked.
    fn on_select_node(&mut self, node: &TreeNode);
}

#[derive(Debug, Clone, Copy)]
pub struct DiagramProps<'a> {
    pub tree: &'a TreeNode,
    pub positions: &'a PositionStore,
    pub selected: Option<&'a str>,
}

/// What a pointer press landed on.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerTarget {
    Node(String),
    Canvas,
}

pub struct Diagram {
    width: f64,
    height: f64,
    viewport: ViewportController,
    sync: RenderSync,
    drag: DragController,
    grab_offset: Position,
    pan_from: Option<Position>,
    snapshot: LayoutSnapshot,
    tree: Option<TreeNode>,
}

impl Diagram {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            viewport: ViewportController::new(),
            sync: RenderSync::new(),
            drag: DragController::new(),
            grab_offset: Position::default(),
            pan_from: None,
            snapshot: LayoutSnapshot::default(),
            tree: None,
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Container size changed. The camera is left where the user put it.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn viewport(&self) -> ViewportTransform {
        self.viewport.transform()
    }

    pub fn snapshot(&self) -> &LayoutSnapshot {
        &self.snapshot
    }

    pub fn render_state(&self) -> &RenderSync {
        &self.sync
    }

    pub fn dragging(&self) -> Option<&str> {
        self.drag.active_node()
    }

    pub fn render(&mut self, props: DiagramProps<'_>, scene: &mut dyn Scene) -> SyncStats {
        self.viewport.mount(self.width, self.height);

        let snapshot = LayoutSnapshot::compute(props.tree, props.positions);
        let stats = self.sync.sync(&snapshot, props.selected, scene);

        // an unrelated re-render must not yank a node out from under the pointer
        if let (Some(id), Some(live)) = (self.drag.active_node(), self.drag.live_position()) {
            if snapshot.node(id).is_some() {
                let id = id.to_string();
                self.sync.move_node(&id, live, scene);
            } else {
                let gone = self.drag.abandon();
                debug!(node = ?gone, "dragged node disappeared, drag dropped");
            }
        }

        trace!(
            added = stats.added,
            updated = stats.updated,
            removed = stats.removed,
            "diagram render"
        );
        self.snapshot = snapshot;
        self.tree = Some(props.tree.clone());
        stats
    }

    /// The host has no tree: drop every visual and recentre on the next mount.
    pub fn unmount(&mut self, scene: &mut dyn Scene) -> SyncStats {
        self.drag.abandon();
        self.pan_from = None;
        self.snapshot = LayoutSnapshot::default();
        self.tree = None;
        self.viewport.unmount();
        self.sync.clear(scene)
    }

    /// Topmost node under a screen point, using on-screen positions.
    pub fn node_at(&self, screen: Position) -> Option<&str> {
        let world = self.viewport.screen_to_world(screen);
        self.snapshot
            .nodes
            .iter()
            .rev()
            .find(|n| {
                let at = self.sync.node(&n.id).map(|v| v.position).unwrap_or(n.position);
                at.distance_to(world) <= n.radius
            })
            .map(|n| n.id.as_str())
    }

    pub fn pointer_down(&mut self, screen: Position) -> PointerTarget {
        let Some(id) = self.node_at(screen).map(str::to_string) else {
            self.pan_from = Some(screen);
            return PointerTarget::Canvas;
        };
        let world = self.viewport.screen_to_world(screen);
        let at = self
            .sync
            .node(&id)
            .map(|v| v.position)
            .or_else(|| self.snapshot.position(&id))
            .unwrap_or(world);
        // keep the grab point under the pointer instead of snapping the centre to it
        self.grab_offset = Position::new(at.x - world.x, at.y - world.y);
        self.drag.begin(id.clone(), at);
        PointerTarget::Node(id)
    }

    /// Returns true when something was redrawn or the camera moved.
    pub fn pointer_move(&mut self, screen: Position, scene: &mut dyn Scene) -> bool {
        if let Some(from) = self.pan_from {
            self.viewport.pan_by(screen.x - from.x, screen.y - from.y);
            self.pan_from = Some(screen);
            return true;
        }
        let target = self.pointer_world(screen);
        let Some(id) = self.drag.update(target).map(str::to_string) else {
            return false;
        };
        self.sync.move_node(&id, target, scene)
    }

    /// Finish a gesture. A node release always reports its final position;
    /// a release without movement is also a click and selects the node.
    pub fn pointer_up(
        &mut self,
        screen: Position,
        scene: &mut dyn Scene,
        host: &mut dyn DiagramHost,
    ) -> Option<DragCommit> {
        if self.pan_from.take().is_some() {
            return None;
        }
        let target = self.pointer_world(screen);
        let commit = self.drag.release(target)?;
        self.sync.move_node(&commit.node_id, commit.position, scene);
        host.on_positions_update(commit.to_update());

        if !commit.moved {
            if let Some(node) = self.tree.as_ref().and_then(|t| tree::find(t, &commit.node_id)) {
                host.on_select_node(node);
            }
        }
        Some(commit)
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by(dx, dy);
    }

    pub fn zoom_at(&mut self, factor: f64, anchor: Position) {
        self.viewport.zoom_at(factor, anchor);
    }

    /// Positive `delta_y` (scrolling down) zooms out.
    pub fn wheel(&mut self, delta_y: f64, anchor: Position) {
        self.viewport.zoom_at(2f64.powf(-delta_y * WHEEL_SENSITIVITY), anchor);
    }

    fn pointer_world(&self, screen: Position) -> Position {
        let world = self.viewport.screen_to_world(screen);
        Position::new(world.x + self.grab_offset.x, world.y + self.grab_offset.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingScene, SceneCall};
    use crate::Category;

    #[derive(Default)]
    struct Host {
        updates: Vec<PositionStore>,
        selected: Vec<String>,
    }

    impl DiagramHost for Host {
        fn on_positions_update(&mut self, update: PositionStore) {
            self.updates.push(update);
        }
        fn on_select_node(&mut self, node: &TreeNode) {
            self.selected.push(node.id.clone());
        }
    }

    fn tree() -> TreeNode {
        TreeNode::new("root", "App", None).with_children(vec![
            TreeNode::new("a", "Auth", Some(Category::Implementation)),
            TreeNode::new("b", "Brand", Some(Category::Design)),
        ])
    }

    fn mounted(tree: &TreeNode, store: &PositionStore) -> (Diagram, RecordingScene) {
        let mut diagram = Diagram::new(800.0, 600.0);
        let mut scene = RecordingScene::default();
        diagram.render(
            DiagramProps {
                tree,
                positions: store,
                selected: None,
            },
            &mut scene,
        );
        scene.take();
        (diagram, scene)
    }

    #[test]
    fn click_selects_and_reports_unchanged_position() {
        let tree = tree();
        let store = PositionStore::new();
        let (mut diagram, mut scene) = mounted(&tree, &store);
        let mut host = Host::default();

        let a_screen = diagram.viewport.world_to_screen(Position::new(-125.0, 200.0));
        // press off-centre: the node must not jump to the pointer
        let press = Position::new(a_screen.x + 10.0, a_screen.y);
        assert_eq!(diagram.pointer_down(press), PointerTarget::Node("a".into()));
        let commit = diagram.pointer_up(press, &mut scene, &mut host).unwrap();

        assert!(!commit.moved);
        assert_eq!(commit.position, Position::new(-125.0, 200.0));
        assert_eq!(host.selected, vec!["a".to_string()]);
        assert_eq!(host.updates.len(), 1);
        assert!(scene.take().is_empty());
    }

    #[test]
    fn canvas_drag_pans_without_touching_nodes() {
        let tree = tree();
        let store = PositionStore::new();
        let (mut diagram, mut scene) = mounted(&tree, &store);
        let mut host = Host::default();
        let before = diagram.viewport();

        assert_eq!(diagram.pointer_down(Position::new(5.0, 5.0)), PointerTarget::Canvas);
        assert!(diagram.pointer_move(Position::new(25.0, 15.0), &mut scene));
        assert!(diagram.pointer_up(Position::new(25.0, 15.0), &mut scene, &mut host).is_none());

        let after = diagram.viewport();
        assert_eq!(after.translate_x, before.translate_x + 20.0);
        assert_eq!(after.translate_y, before.translate_y + 10.0);
        assert!(scene.take().is_empty());
        assert!(host.updates.is_empty());
    }

    #[test]
    fn rerender_mid_drag_keeps_live_position() {
        let tree = tree();
        let store = PositionStore::new();
        let (mut diagram, mut scene) = mounted(&tree, &store);

        let b_screen = diagram.viewport.world_to_screen(Position::new(125.0, 200.0));
        diagram.pointer_down(b_screen);
        let to = diagram.viewport.world_to_screen(Position::new(300.0, 50.0));
        diagram.pointer_move(to, &mut scene);

        // selection changes upstream while the pointer is still down
        diagram.render(
            DiagramProps {
                tree: &tree,
                positions: &store,
                selected: Some("a"),
            },
            &mut scene,
        );
        assert_eq!(diagram.render_state().node("b").unwrap().position, Position::new(300.0, 50.0));
    }

    #[test]
    fn deleting_dragged_node_abandons_drag() {
        let tree = tree();
        let store = PositionStore::new();
        let (mut diagram, mut scene) = mounted(&tree, &store);
        let mut host = Host::default();

        diagram.pointer_down(diagram.viewport.world_to_screen(Position::new(125.0, 200.0)));
        let pruned = tree::delete_subtree(&tree, "b").unwrap();
        diagram.render(
            DiagramProps {
                tree: &pruned,
                positions: &store,
                selected: None,
            },
            &mut scene,
        );
        assert!(diagram.dragging().is_none());
        assert!(diagram.pointer_up(Position::new(0.0, 0.0), &mut scene, &mut host).is_none());
        assert!(host.updates.is_empty());
    }

    #[test]
    fn unmount_clears_scene() {
        let tree = tree();
        let store = PositionStore::new();
        let (mut diagram, mut scene) = mounted(&tree, &store);
        let stats = diagram.unmount(&mut scene);
        assert_eq!(stats.removed, 5);
        assert!(scene.take().iter().any(|c| matches!(c, SceneCall::RemoveNode(id) if id == "root")));
        assert!(diagram.snapshot().is_empty());
    }

    #[test]
    fn wheel_down_zooms_out() {
        let mut diagram = Diagram::new(800.0, 600.0);
        diagram.viewport.mount(800.0, 600.0);
        diagram.wheel(500.0, Position::new(400.0, 300.0));
        assert!((diagram.viewport().scale - 0.4).abs() < 1e-9);
    }
}
