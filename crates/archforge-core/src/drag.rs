//! Single-node drag sessions.
//!
//! `Idle -> Dragging` on press, `Dragging -> Dragging` on every move, and a
//! release produces a [`DragCommit`] and returns to `Idle`. Only the release
//! position is ever persisted. There is no cancel: releasing always commits.

use tracing::debug;

use crate::positions::PositionStore;
use crate::Position;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        node_id: String,
        /// Live world position the node is pinned to.
        position: Position,
        moved: bool,
    },
}

/// The final placement of a finished drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragCommit {
    pub node_id: String,
    pub position: Position,
    /// False when the node was pressed and released without moving.
    pub moved: bool,
}

impl DragCommit {
    /// The single-entry update a host merges into its store.
    pub fn to_update(&self) -> PositionStore {
        PositionStore::single(self.node_id.clone(), self.position)
    }
}

#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn active_node(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { node_id, .. } => Some(node_id),
            DragState::Idle => None,
        }
    }

    pub fn live_position(&self) -> Option<Position> {
        match &self.state {
            DragState::Dragging { position, .. } => Some(*position),
            DragState::Idle => None,
        }
    }

    /// Pin `node_id` at its current world position. A press while another
    /// drag is active simply takes over.
    pub fn begin(&mut self, node_id: impl Into<String>, position: Position) {
        let node_id = node_id.into();
        debug!(node = %node_id, x = position.x, y = position.y, "drag start");
        self.state = DragState::Dragging {
            node_id,
            position,
            moved: false,
        };
    }

    /// Re-pin the dragged node. Returns its id when a drag is active.
    pub fn update(&mut self, to: Position) -> Option<&str> {
        match &mut self.state {
            DragState::Dragging {
                node_id,
                position,
                moved,
            } => {
                if *position != to {
                    *moved = true;
                }
                *position = to;
                Some(node_id.as_str())
            }
            DragState::Idle => None,
        }
    }

    /// Commit at the release point and go back to idle.
    pub fn release(&mut self, at: Position) -> Option<DragCommit> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging {
                node_id,
                position,
                moved,
            } => {
                let moved = moved || position != at;
                debug!(node = %node_id, x = at.x, y = at.y, moved, "drag commit");
                Some(DragCommit {
                    node_id,
                    position: at,
                    moved,
                })
            }
            DragState::Idle => None,
        }
    }

    /// Drop an active drag without committing, used when its node vanished.
    pub fn abandon(&mut self) -> Option<String> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging { node_id, .. } => Some(node_id),
            DragState::Idle => None,
        }
    }
}
