use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use archforge_core::diagram::PointerTarget;
use archforge_core::layout::Swatch;
use archforge_core::svg::SvgScene;
use archforge_core::{tree, AiSettings, Diagram, Position, Session, TreeNode};
use archforge_suggest::{AiError, Engine, GenerationRequest, Modification, Provider};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const VIEW_WIDTH: f64 = 1200.0;
const VIEW_HEIGHT: f64 = 800.0;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GenerateTreeRequest {
    /// Project name, shown at the root of the tree
    project_name: String,
    /// Feature list; blank entries are ignored
    features: Option<Vec<String>>,
    /// Free-form requirements
    notes: Option<String>,
    /// Where the project will run, e.g. "Vercel" or "on-prem Kubernetes"
    deploy_target: Option<String>,
    /// Visual theme name carried into the prompt
    theme: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ModifyTreeRequest {
    /// What to change, in plain language (e.g. "split implementation into frontend and backend")
    instruction: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct NodeRequest {
    /// ID of the node
    node_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenameNodeRequest {
    /// ID of the node to rename
    node_id: String,
    /// New display name. Blank names are rejected.
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SelectNodeRequest {
    /// ID of the node to select. Omit to clear the selection.
    node_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DragNodeRequest {
    /// ID of the node to drag
    node_id: String,
    /// Target X in world coordinates (the root starts at 0,0; levels are 200 apart on Y)
    x: f64,
    /// Target Y in world coordinates
    y: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PanRequest {
    /// Horizontal shift in screen pixels
    dx: f64,
    /// Vertical shift in screen pixels
    dy: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ConfigureAiRequest {
    /// One of openai, anthropic, google, ollama, groq, mistral, deepseek
    provider: String,
    /// Model name as the provider knows it
    model: String,
    /// API key. Omit to keep the stored one; ollama needs none.
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ZoomRequest {
    /// Scale multiplier; >1 zooms in. The resulting scale is clamped to [0.1, 4].
    factor: f64,
    /// Screen X kept fixed while zooming. Default: centre of the view.
    anchor_x: Option<f64>,
    /// Screen Y kept fixed while zooming. Default: centre of the view.
    anchor_y: Option<f64>,
}

// --- State ---

/// Everything one connected client works on: the host session plus the
/// mounted diagram and the scene it draws into.
struct State {
    session: Session,
    diagram: Diagram,
    scene: SvgScene,
    settings: AiSettings,
}

impl State {
    fn new(settings: AiSettings) -> Self {
        Self {
            session: Session::new(),
            diagram: Diagram::new(VIEW_WIDTH, VIEW_HEIGHT),
            scene: SvgScene::new(),
            settings,
        }
    }

    fn rerender(&mut self) {
        let stats = self.session.render(&mut self.diagram, &mut self.scene);
        tracing::debug!(
            added = stats.added,
            updated = stats.updated,
            removed = stats.removed,
            "scene synced"
        );
    }

    fn require_tree(&self) -> Result<&TreeNode, String> {
        self.session
            .tree()
            .ok_or_else(|| "No tree yet. Use generate_tree first.".to_string())
    }

    fn require_node(&self, id: &str) -> Result<(), String> {
        if self.require_tree()?.contains(id) {
            Ok(())
        } else {
            Err(format!("Node '{}' not found", id))
        }
    }

    fn tree_json(&self) -> String {
        let body = json!({
            "tree": self.session.tree(),
            "selected": self.session.selected_id(),
            "messages": self.session.messages(),
            "theme": self.session.theme(),
            "error": self.session.error(),
            "quotaExceeded": self.session.quota_exceeded(),
        });
        serde_json::to_string_pretty(&body).unwrap_or_else(|e| format!("Serialization error: {}", e))
    }

    fn add_node(&mut self, parent_id: &str) -> Result<String, String> {
        self.require_node(parent_id)?;
        self.session.select(parent_id);
        let id = self
            .session
            .add_child_to_selected()
            .ok_or_else(|| format!("Could not add a child under '{}'", parent_id))?;
        self.session.select(&id);
        self.rerender();
        Ok(id)
    }

    fn rename_node(&mut self, node_id: &str, name: &str) -> Result<(), String> {
        self.require_node(node_id)?;
        if name.trim().is_empty() {
            return Err("Name must not be blank".to_string());
        }
        let previous = self.session.selected_id().map(str::to_string);
        self.session.select(node_id);
        self.session.rename_selected(name);
        match previous {
            Some(id) => {
                self.session.select(&id);
            }
            None => self.session.clear_selection(),
        }
        self.rerender();
        Ok(())
    }

    fn delete_node(&mut self, node_id: &str) -> Result<usize, String> {
        let current = self.require_tree()?;
        if current.id == node_id {
            return Err("The root cannot be deleted. Use reset to start over.".to_string());
        }
        let removed = tree::find(current, node_id)
            .map(TreeNode::len)
            .ok_or_else(|| format!("Node '{}' not found", node_id))?;
        self.session.select(node_id);
        self.session.delete_selected();
        self.rerender();
        Ok(removed)
    }

    fn select_node(&mut self, node_id: Option<&str>) -> Result<(), String> {
        match node_id {
            Some(id) => {
                self.require_node(id)?;
                self.session.select(id);
            }
            None => self.session.clear_selection(),
        }
        self.rerender();
        Ok(())
    }

    /// Replay a full pointer gesture: press on the node, move, release.
    fn drag_node(&mut self, node_id: &str, to: Position) -> Result<Position, String> {
        self.require_node(node_id)?;
        let State {
            session,
            diagram,
            scene,
            ..
        } = &mut *self;

        let at = diagram
            .render_state()
            .node(node_id)
            .map(|v| v.position)
            .ok_or_else(|| format!("Node '{}' is not on screen", node_id))?;
        let vp = diagram.viewport();
        let press = vp.world_to_screen(at);
        let missed = match diagram.pointer_down(press) {
            PointerTarget::Node(hit) if hit == node_id => None,
            PointerTarget::Node(hit) => Some(format!("Node '{}' is covered by '{}'", node_id, hit)),
            PointerTarget::Canvas => Some(format!("Node '{}' could not be grabbed", node_id)),
        };
        if let Some(err) = missed {
            // end the stray gesture without reporting anything to the session
            diagram.pointer_up(press, scene, &mut NoHost);
            return Err(err);
        }
        let release = vp.world_to_screen(to);
        diagram.pointer_move(release, scene);
        let commit = diagram
            .pointer_up(release, scene, session)
            .ok_or_else(|| "Drag ended without a commit".to_string())?;
        self.rerender();
        Ok(commit.position)
    }

    fn zoom(&mut self, factor: f64, anchor: Option<Position>) -> Result<f64, String> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err("factor must be a positive number".to_string());
        }
        let (w, h) = self.diagram.size();
        let anchor = anchor.unwrap_or(Position::new(w / 2.0, h / 2.0));
        self.diagram.zoom_at(factor, anchor);
        Ok(self.diagram.viewport().scale)
    }

    fn layout_json(&self) -> String {
        let snapshot = self.diagram.snapshot();
        let nodes: Vec<_> = snapshot
            .nodes
            .iter()
            .map(|n| {
                let on_screen = self
                    .diagram
                    .render_state()
                    .node(&n.id)
                    .map(|v| v.position)
                    .unwrap_or(n.position);
                json!({
                    "id": n.id,
                    "name": n.name,
                    "parentId": n.parent_id,
                    "depth": n.depth,
                    "x": on_screen.x,
                    "y": on_screen.y,
                    "radius": n.radius,
                    "color": n.swatch.hex(),
                    "pinned": n.pinned,
                })
            })
            .collect();
        let edges: Vec<_> = snapshot
            .edges
            .iter()
            .map(|e| json!({ "source": e.source, "target": e.target }))
            .collect();
        let legend: Vec<_> = Swatch::LEGEND
            .iter()
            .map(|(swatch, label)| json!({ "label": label, "color": swatch.hex() }))
            .collect();
        let body = json!({
            "nodes": nodes,
            "edges": edges,
            "viewport": self.diagram.viewport(),
            "legend": legend,
        });
        serde_json::to_string_pretty(&body).unwrap_or_else(|e| format!("Serialization error: {}", e))
    }

    fn render_svg(&self) -> String {
        let (w, h) = self.diagram.size();
        self.scene.to_svg(&self.diagram.viewport(), w, h)
    }

    fn reset(&mut self) {
        self.session.reset();
        self.rerender();
    }

    /// Validate and store new provider settings, then use them from now on.
    fn configure_ai(&mut self, req: ConfigureAiRequest, path: &Path) -> Result<String, String> {
        let provider = Provider::parse(&req.provider).map_err(|e| e.to_string())?;
        let api_key = match req.api_key {
            Some(key) => key.trim().to_string(),
            None => self.settings.api_key.clone(),
        };
        let settings = AiSettings {
            provider: provider.as_str().to_string(),
            model: req.model.trim().to_string(),
            api_key,
        };
        Engine::from_settings(&settings).map_err(|e| e.to_string())?;
        archforge_core::write_settings_to(path, &settings)?;
        info!(provider = %provider, model = %settings.model, "AI settings saved");
        let reply = format!("Using {} / {}", provider, settings.model);
        self.settings = settings;
        Ok(reply)
    }

    /// Claim the AI slot for a fresh tree. Refused while a tree exists.
    fn start_generation(&mut self, theme: &str) -> Result<(u64, AiSettings), String> {
        if self.session.tree().is_some() {
            return Err("A tree already exists. Use modify_tree to change it, or reset first.".to_string());
        }
        let claimed = self.claim_request()?;
        self.session.set_theme(theme);
        Ok(claimed)
    }

    fn start_modification(&mut self, instruction: &str) -> Result<(u64, TreeNode, AiSettings), String> {
        let current = self.require_tree()?.clone();
        let (epoch, settings) = self.claim_request()?;
        self.session.push_user_message(instruction);
        Ok((epoch, current, settings))
    }

    fn claim_request(&mut self) -> Result<(u64, AiSettings), String> {
        if !self.session.begin_request() {
            return Err("Another AI request is still running".to_string());
        }
        Ok((self.session.request_epoch(), self.settings.clone()))
    }

    fn check_current(&self, epoch: u64) -> Result<(), String> {
        if self.session.is_current_request(epoch) {
            Ok(())
        } else {
            warn!(request = epoch, "AI reply arrived after reset, discarded");
            Err("The session was reset while the AI request was running; the reply was discarded.".to_string())
        }
    }

    fn finish_generation(
        &mut self,
        epoch: u64,
        project_name: &str,
        result: Result<Option<TreeNode>, AiError>,
    ) -> Result<String, String> {
        self.check_current(epoch)?;
        match result {
            Ok(tree) => {
                if self.session.apply_generated_tree(tree, project_name) {
                    self.rerender();
                    Ok(self.tree_json())
                } else {
                    Err("The AI reply held no usable tree; nothing was changed.".to_string())
                }
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn finish_modification(
        &mut self,
        epoch: u64,
        result: Result<Modification, AiError>,
    ) -> Result<String, String> {
        self.check_current(epoch)?;
        match result {
            Ok(Modification { tree, feedback }) => {
                let applied = self.session.apply_modification(tree, feedback);
                self.rerender();
                let reply = self
                    .session
                    .messages()
                    .last()
                    .map(|m| m.text.clone())
                    .unwrap_or_default();
                Ok(if applied {
                    reply
                } else {
                    format!("{}\n(no tree update was applied)", reply)
                })
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn record_failure(&mut self, e: AiError) -> String {
        let message = e.to_string();
        self.session.apply_ai_failure(e.is_quota(), message.clone());
        if e.is_quota() {
            "AI quota exceeded. Wait a bit or switch providers, then try again.".to_string()
        } else {
            message
        }
    }
}

/// Host used to discard a gesture that landed on the wrong node.
struct NoHost;

impl archforge_core::DiagramHost for NoHost {
    fn on_positions_update(&mut self, _: archforge_core::PositionStore) {}
    fn on_select_node(&mut self, _: &TreeNode) {}
}

/// Frees the AI slot when a tool future is dropped before its reply is
/// applied. After a normal finish it does nothing.
struct PendingRequest {
    state: Arc<Mutex<State>>,
    epoch: u64,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.session.abandon_request(self.epoch) {
            warn!(request = self.epoch, "AI request dropped before it finished");
        }
    }
}

fn reply(result: Result<String, String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
    }
}

// --- Server ---

#[derive(Clone)]
pub struct ArchforgeServer {
    state: Arc<Mutex<State>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ArchforgeServer {
    pub fn new(settings: AiSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(settings))),
            tool_router: Self::tool_router(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, McpError> {
        self.state
            .lock()
            .map_err(|_| McpError::internal_error("session state poisoned", None))
    }

    #[tool(
        description = "Get the current project tree as JSON: {tree: {id, name, category?, description?, children?}, selected, messages, theme, error, quotaExceeded}. tree is null before generate_tree or after reset."
    )]
    fn get_tree(&self) -> Result<CallToolResult, McpError> {
        let state = self.state()?;
        Ok(CallToolResult::success(vec![Content::text(state.tree_json())]))
    }

    #[tool(
        description = "Ask the configured AI provider for a new project tree split into strategy, design and implementation branches, and start a fresh chat. Only allowed while there is no tree: use reset first to start over. If the AI reply holds no usable tree, there is still no tree afterwards."
    )]
    async fn generate_tree(
        &self,
        Parameters(req): Parameters<GenerateTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = GenerationRequest {
            project_name: req.project_name,
            features: req.features.unwrap_or_default(),
            notes: req.notes.unwrap_or_default(),
            deploy_target: req.deploy_target.unwrap_or_default(),
            theme: req.theme.unwrap_or_default(),
        };
        let started = self.state()?.start_generation(&request.theme);
        let (epoch, settings) = match started {
            Ok(claimed) => claimed,
            Err(e) => return reply(Err(e)),
        };
        let _pending = PendingRequest { state: Arc::clone(&self.state), epoch };

        info!(project = %request.project_name, request = epoch, "generating tree");
        let result = archforge_suggest::generate_project_tree(&request, &settings).await;
        let mut state = self.state()?;
        reply(state.finish_generation(epoch, &request.project_name, result))
    }

    #[tool(
        description = "Ask the AI to edit the current tree following a plain-language instruction. The reply's feedback is returned. If the AI answer holds no valid tree, the tree stays as it was. Clears the selection."
    )]
    async fn modify_tree(
        &self,
        Parameters(req): Parameters<ModifyTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.instruction.trim().is_empty() {
            return reply(Err("instruction must not be blank".to_string()));
        }
        let started = self.state()?.start_modification(req.instruction.trim());
        let (epoch, current, settings) = match started {
            Ok(claimed) => claimed,
            Err(e) => return reply(Err(e)),
        };
        let _pending = PendingRequest { state: Arc::clone(&self.state), epoch };

        let result = archforge_suggest::modify_project_tree(&current, &req.instruction, &settings).await;
        let mut state = self.state()?;
        reply(state.finish_modification(epoch, result))
    }

    #[tool(
        description = "Add a placeholder child (\"New element\", same category as its parent) under a node. Returns the new node's id; the new node becomes selected."
    )]
    fn add_node(&self, Parameters(req): Parameters<NodeRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(state.add_node(&req.node_id))
    }

    #[tool(description = "Rename a node. Only the name changes; id, category and children are kept.")]
    fn rename_node(&self, Parameters(req): Parameters<RenameNodeRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(
            state
                .rename_node(&req.node_id, &req.name)
                .map(|_| format!("Renamed '{}' to '{}'", req.node_id, req.name.trim())),
        )
    }

    #[tool(description = "Delete a node and its whole subtree. The root cannot be deleted.")]
    fn delete_node(&self, Parameters(req): Parameters<NodeRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(
            state
                .delete_node(&req.node_id)
                .map(|n| format!("Deleted '{}' ({} node(s))", req.node_id, n)),
        )
    }

    #[tool(description = "Select a node (drawn with a thicker outline), or clear the selection when node_id is omitted.")]
    fn select_node(&self, Parameters(req): Parameters<SelectNodeRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(state.select_node(req.node_id.as_deref()).map(|_| match &req.node_id {
            Some(id) => format!("Selected '{}'", id),
            None => "Selection cleared".to_string(),
        }))
    }

    #[tool(
        description = "Drag a node to a world position, like pressing on it, moving the pointer and releasing. The final position is stored as a manual placement and survives later tree edits. Unplaced children follow the node."
    )]
    fn drag_node(&self, Parameters(req): Parameters<DragNodeRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(
            state
                .drag_node(&req.node_id, Position::new(req.x, req.y))
                .map(|p| format!("Placed '{}' at ({}, {})", req.node_id, p.x, p.y)),
        )
    }

    #[tool(description = "Pan the camera by a screen-space offset. Node positions are not affected.")]
    fn pan(&self, Parameters(req): Parameters<PanRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        state.diagram.pan_by(req.dx, req.dy);
        let vp = state.diagram.viewport();
        reply(Ok(vp.to_svg_transform()))
    }

    #[tool(description = "Zoom the camera around a screen anchor. Node positions are not affected.")]
    fn zoom(&self, Parameters(req): Parameters<ZoomRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        let anchor = match (req.anchor_x, req.anchor_y) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            _ => None,
        };
        reply(state.zoom(req.factor, anchor).map(|s| format!("Scale is now {}", s)))
    }

    #[tool(
        description = "Get the resolved layout: nodes with id, name, parentId, depth, x, y, radius, color and pinned (true when manually placed), parent-child edges, the viewport transform and the color legend."
    )]
    fn get_layout(&self) -> Result<CallToolResult, McpError> {
        let state = self.state()?;
        Ok(CallToolResult::success(vec![Content::text(state.layout_json())]))
    }

    #[tool(description = "Render the diagram as an SVG document with the current camera.")]
    fn render_svg(&self) -> Result<CallToolResult, McpError> {
        let state = self.state()?;
        Ok(CallToolResult::success(vec![Content::text(state.render_svg())]))
    }

    #[tool(
        description = "Choose the AI provider and model and save them to ~/.archforge/settings.json. The API key is never echoed back."
    )]
    fn configure_ai(&self, Parameters(req): Parameters<ConfigureAiRequest>) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        reply(state.configure_ai(req, &archforge_core::settings_path()))
    }

    #[tool(
        description = "Forget the tree, all manual placements, the selection and the chat. An AI request still running is cancelled and its reply discarded."
    )]
    fn reset(&self) -> Result<CallToolResult, McpError> {
        let mut state = self.state()?;
        state.reset();
        Ok(CallToolResult::success(vec![Content::text("Session reset")]))
    }

    #[tool(description = "Get the stored manual placements as {nodeId: {x, y}}.")]
    fn get_positions(&self) -> Result<CallToolResult, McpError> {
        let state = self.state()?;
        let json = serde_json::to_string_pretty(state.session.positions())
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for ArchforgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

const INSTRUCTIONS: &str = r#"archforge lays out a software project as a tree of hexagon nodes.

## Tree
- Every node has an id, a name and a category: "strategy", "design" or "implementation". The root is drawn larger and white.
- Start with generate_tree, refine with modify_tree (AI) or add_node / rename_node / delete_node (local edits).
- generate_tree only runs while there is no tree. Call reset to start over.
- configure_ai picks the provider and model when none is set up yet.

## Layout
- Nodes without a manual placement are laid out automatically: 200 units per level, siblings 250 apart, centred under their parent.
- drag_node stores a manual placement. Placements are never recomputed, even when the tree changes.
- pan and zoom only move the camera.

Use get_layout for coordinates and render_svg to look at the result."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = archforge_core::read_settings().with_env_overrides();
    if !archforge_core::ai_configured(&settings) {
        warn!("AI provider not configured; call configure_ai before generate_tree or modify_tree");
    }

    let service = ArchforgeServer::new(settings)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
