pub mod diagram;
pub mod drag;
pub mod layout;
pub mod positions;
pub mod render;
pub mod session;
pub mod svg;
pub mod tree;
pub mod viewport;

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use diagram::{Diagram, DiagramHost, DiagramProps};
pub use layout::LayoutSnapshot;
pub use positions::PositionStore;
pub use session::Session;

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Strategy,
    Design,
    Implementation,
}

impl Category {
    pub fn parse(s: &str) -> Option<Category> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strategy" => Some(Category::Strategy),
            "design" => Some(Category::Design),
            "implementation" => Some(Category::Implementation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Strategy => "strategy",
            Category::Design => "design",
            Category::Implementation => "implementation",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One element of the project structure. Each child is owned by its parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unrecognized values decode to `None` and render with the design color.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_category"
    )]
    pub category: Option<Category>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "nullable_children"
    )]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Option<Category>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            category,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    /// Decode an AI or host payload. Anything that is not an object carrying
    /// both `id` and `name` (e.g. the `{}` a failed JSON repair degrades to)
    /// is "no tree". So is a tree that repeats an id.
    pub fn from_value(value: serde_json::Value) -> Option<TreeNode> {
        let obj = value.as_object()?;
        if !obj.contains_key("id") || !obj.contains_key("name") {
            return None;
        }
        let tree: TreeNode = serde_json::from_value(value).ok()?;
        if !tree.has_unique_ids() {
            tracing::warn!(root = %tree.id, "tree repeats an id, dropped");
            return None;
        }
        Some(tree)
    }
}

fn lenient_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(Category::parse))
}

fn nullable_children<'de, D>(deserializer: D) -> Result<Vec<TreeNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<TreeNode>>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Storage ---

/// Resolve the global data directory (~/.archforge/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".archforge")
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl AiSettings {
    /// Apply `ARCHFORGE_PROVIDER`, `ARCHFORGE_MODEL` and `ARCHFORGE_API_KEY` on top.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(provider) = non_empty("ARCHFORGE_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = non_empty("ARCHFORGE_MODEL") {
            self.model = model;
        }
        if let Some(key) = non_empty("ARCHFORGE_API_KEY") {
            self.api_key = key;
        }
        self
    }
}

pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn read_settings() -> AiSettings {
    read_settings_from(&settings_path())
}

/// Defaults when the file is missing or unreadable.
pub fn read_settings_from(path: &Path) -> AiSettings {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_settings(settings: &AiSettings) -> Result<(), String> {
    write_settings_to(&settings_path(), settings)
}

pub fn write_settings_to(path: &Path, settings: &AiSettings) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
    fs::write(path, json).map_err(|e| e.to_string())
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
