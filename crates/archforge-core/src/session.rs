//! Host-side state around the diagram: the current tree, manual placements,
//! selection, the architect chat transcript and request/error flags.
//!
//! All mutations go through here one at a time. While an AI request is in
//! flight [`Session::begin_request`] refuses a second one, which is what keeps
//! tree and store single-writer. Each request gets a number; a result that
//! arrives after [`Session::reset`] or [`Session::abandon_request`] is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diagram::{Diagram, DiagramHost, DiagramProps};
use crate::positions::PositionStore;
use crate::render::{Scene, SyncStats};
use crate::tree;
use crate::TreeNode;

pub const DEFAULT_FEEDBACK: &str = "Understood. The structure has been updated.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: u64,
}

static NEXT_MESSAGE: AtomicU64 = AtomicU64::new(1);

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", NEXT_MESSAGE.fetch_add(1, Ordering::Relaxed)),
            role,
            text: text.into(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    tree: Option<TreeNode>,
    positions: PositionStore,
    selected: Option<String>,
    messages: Vec<ChatMessage>,
    theme: String,
    loading: bool,
    request: u64,
    error: Option<String>,
    quota_exceeded: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> Option<&TreeNode> {
        self.tree.as_ref()
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The selected node, if it still exists.
    pub fn selected_node(&self) -> Option<&TreeNode> {
        let id = self.selected.as_deref()?;
        tree::find(self.tree.as_ref()?, id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.theme = theme.into();
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn quota_exceeded(&self) -> bool {
        self.quota_exceeded
    }

    // --- Requests ---

    /// Mark an AI request as in flight. Returns false if one already is.
    pub fn begin_request(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        self.request += 1;
        self.error = None;
        true
    }

    /// Number of the latest request handed out by [`Session::begin_request`].
    pub fn request_epoch(&self) -> u64 {
        self.request
    }

    /// True while request `epoch` is the one in flight.
    pub fn is_current_request(&self, epoch: u64) -> bool {
        self.loading && self.request == epoch
    }

    /// Give up on request `epoch` without a result. A newer request is left alone.
    pub fn abandon_request(&mut self, epoch: u64) -> bool {
        if !self.is_current_request(epoch) {
            return false;
        }
        debug!(request = epoch, "AI request abandoned");
        self.loading = false;
        true
    }

    /// Record a failed request. Tree, positions and selection stay as they were.
    pub fn apply_ai_failure(&mut self, quota_exceeded: bool, message: impl Into<String>) {
        if !self.loading {
            debug!("late AI failure ignored");
            return;
        }
        self.loading = false;
        let message = message.into();
        if quota_exceeded {
            warn!("AI quota exhausted");
            self.quota_exceeded = true;
        } else {
            warn!(error = %message, "AI request failed");
        }
        self.error = Some(message);
    }

    pub fn dismiss_quota_banner(&mut self) {
        self.quota_exceeded = false;
    }

    /// A freshly generated tree. `None` (unusable payload) leaves things alone.
    pub fn apply_generated_tree(&mut self, tree: Option<TreeNode>, project_name: &str) -> bool {
        if !self.loading {
            warn!("generated tree arrived with no request in flight, dropped");
            return false;
        }
        self.loading = false;
        let Some(tree) = tree else {
            warn!("generated tree was empty, nothing applied");
            return false;
        };
        info!(root = %tree.id, nodes = tree.len(), "tree generated");
        self.tree = Some(tree);
        self.selected = None;
        self.messages = vec![ChatMessage::new(
            Role::Ai,
            format!(
                "The design for \"{}\" is ready. Ask here to add elements or fine-tune the structure.",
                project_name
            ),
        )];
        true
    }

    /// Record the user's instruction before the modification request goes out.
    pub fn push_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::User, text));
    }

    /// Apply an AI edit. A missing tree means "no update"; the reply is still
    /// shown and the selection is cleared either way.
    pub fn apply_modification(&mut self, tree: Option<TreeNode>, feedback: Option<String>) -> bool {
        if !self.loading {
            warn!("AI edit arrived with no request in flight, dropped");
            return false;
        }
        self.loading = false;
        let applied = match tree {
            Some(tree) => {
                info!(root = %tree.id, nodes = tree.len(), "tree replaced by AI edit");
                self.tree = Some(tree);
                true
            }
            None => {
                warn!("AI edit carried no tree, keeping the current one");
                false
            }
        };
        let text = feedback
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FEEDBACK.to_string());
        self.messages.push(ChatMessage::new(Role::Ai, text));
        self.selected = None;
        applied
    }

    // --- Local edits ---

    pub fn set_tree(&mut self, tree: Option<TreeNode>) {
        self.tree = tree;
    }

    pub fn select(&mut self, id: &str) -> bool {
        let exists = self.tree.as_ref().is_some_and(|t| t.contains(id));
        if exists {
            self.selected = Some(id.to_string());
        }
        exists
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Blank names are ignored.
    pub fn rename_selected(&mut self, name: &str) -> bool {
        let (Some(current), Some(id)) = (self.tree.as_ref(), self.selected.as_deref()) else {
            return false;
        };
        if name.trim().is_empty() || !current.contains(id) {
            return false;
        }
        self.tree = Some(tree::rename(current, id, name));
        true
    }

    /// Add a placeholder child under the selection. Returns the new id.
    pub fn add_child_to_selected(&mut self) -> Option<String> {
        let current = self.tree.as_ref()?;
        let parent = self.selected.as_deref()?;
        let before: Vec<String> = current.ids().into_iter().map(str::to_string).collect();
        let next = tree::add_child(current, parent);
        let added = next
            .ids()
            .into_iter()
            .find(|id| !before.iter().any(|b| b == id))
            .map(str::to_string);
        self.tree = Some(next);
        added
    }

    /// Delete the selected subtree. Not offered for the root.
    pub fn delete_selected(&mut self) -> bool {
        let (Some(current), Some(id)) = (self.tree.as_ref(), self.selected.clone()) else {
            return false;
        };
        if current.id == id || !current.contains(&id) {
            return false;
        }
        self.tree = tree::delete_subtree(current, &id);
        self.selected = None;
        debug!(node = %id, "subtree deleted");
        true
    }

    /// Back to "no tree": store, selection and transcript are emptied too.
    /// A request still in flight is cancelled and its result will be dropped.
    pub fn reset(&mut self) {
        info!(cancelled = self.loading, "session reset");
        self.loading = false;
        self.tree = None;
        self.positions.clear();
        self.selected = None;
        self.messages.clear();
        self.error = None;
    }

    // --- Rendering ---

    /// Render the current state, or tear the diagram down when there is no tree.
    pub fn render(&self, diagram: &mut Diagram, scene: &mut dyn Scene) -> SyncStats {
        match &self.tree {
            Some(tree) => diagram.render(
                DiagramProps {
                    tree,
                    positions: &self.positions,
                    selected: self.selected.as_deref(),
                },
                scene,
            ),
            None => diagram.unmount(scene),
        }
    }
}

impl DiagramHost for Session {
    fn on_positions_update(&mut self, update: PositionStore) {
        self.positions.merge(update);
    }

    fn on_select_node(&mut self, node: &TreeNode) {
        self.selected = Some(node.id.clone());
    }
}
