pub mod engine;
mod parse;
mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use archforge_core::{AiSettings, TreeNode};

pub use engine::{Engine, Provider};
pub use parse::repair_json;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI quota exceeded")]
    QuotaExceeded,
    #[error("AI provider is not configured")]
    NotConfigured,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("AI request failed: {0}")]
    Request(String),
    #[error("AI returned an empty response")]
    EmptyResponse,
}

impl AiError {
    /// Classify a provider error message. Rate limits and exhausted quotas
    /// become [`AiError::QuotaExceeded`].
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_quota_message(&message) {
            AiError::QuotaExceeded
        } else {
            AiError::Request(message)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, AiError::QuotaExceeded)
    }
}

pub fn is_quota_message(message: &str) -> bool {
    message.contains("429") || message.contains("quota") || message.contains("RESOURCE_EXHAUSTED")
}

/// Input of the project-setup form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub project_name: String,
    pub features: Vec<String>,
    pub notes: String,
    pub deploy_target: String,
    pub theme: String,
}

impl GenerationRequest {
    /// Non-blank features, comma-joined.
    pub fn feature_list(&self) -> String {
        self.features
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result of an edit request. `tree: None` means "leave the tree alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub tree: Option<TreeNode>,
    pub feedback: Option<String>,
}

/// Anything that can answer a system + user prompt with text.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}

#[async_trait]
impl TextModel for Engine {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        debug!(provider = %self.provider(), model = %self.model(), "sending prompt");
        self.exchange(system, user).await
    }
}

/// Generate a fresh tree. `Ok(None)` when the reply held no usable tree.
pub async fn generate_project_tree(
    req: &GenerationRequest,
    settings: &AiSettings,
) -> Result<Option<TreeNode>, AiError> {
    let model = Engine::from_settings(settings)?;
    generate_project_tree_with(&model, req).await
}

pub async fn generate_project_tree_with(
    model: &dyn TextModel,
    req: &GenerationRequest,
) -> Result<Option<TreeNode>, AiError> {
    let raw = model
        .complete(&prompt::generation_system_prompt(), &prompt::generation_user_message(req))
        .await?;
    debug!(len = raw.len(), "generation reply received");

    let tree = parse::parse_tree(&raw);
    match &tree {
        Some(t) => info!(project = %req.project_name, nodes = t.len(), "tree generated"),
        None => warn!(project = %req.project_name, "generation reply held no tree"),
    }
    Ok(tree)
}

/// Ask for an edit of `tree` following `instruction`.
pub async fn modify_project_tree(
    tree: &TreeNode,
    instruction: &str,
    settings: &AiSettings,
) -> Result<Modification, AiError> {
    let model = Engine::from_settings(settings)?;
    modify_project_tree_with(&model, tree, instruction).await
}

pub async fn modify_project_tree_with(
    model: &dyn TextModel,
    tree: &TreeNode,
    instruction: &str,
) -> Result<Modification, AiError> {
    let raw = model
        .complete(
            &prompt::modification_system_prompt(),
            &prompt::modification_user_message(tree, instruction),
        )
        .await?;
    debug!(len = raw.len(), "modification reply received");

    let modification = parse::parse_modification(&raw);
    info!(
        has_tree = modification.tree.is_some(),
        has_feedback = modification.feedback.is_some(),
        "modification parsed"
    );
    Ok(modification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_core::Category;
    use std::sync::Mutex;

    /// Replays a canned reply and keeps the prompts it was given.
    struct Canned {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self { reply: Ok(reply.to_string()), seen: Mutex::new(Vec::new()) }
        }

        fn failing(message: &str) -> Self {
            Self { reply: Err(message.to_string()), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl TextModel for Canned {
        async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
            self.seen.lock().unwrap().push((system.to_string(), user.to_string()));
            self.reply.clone().map_err(AiError::from_message)
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            project_name: "Atlas".into(),
            features: vec!["Maps".into()],
            theme: "Neon".into(),
            ..Default::default()
        }
    }

    #[test]
    fn quota_messages_are_recognised() {
        assert!(AiError::from_message("HTTP 429 Too Many Requests").is_quota());
        assert!(AiError::from_message("you exceeded your quota").is_quota());
        assert!(AiError::from_message("status: RESOURCE_EXHAUSTED").is_quota());
        assert!(!AiError::from_message("connection reset").is_quota());
    }

    #[tokio::test]
    async fn generation_parses_fenced_reply() {
        let model = Canned::ok(
            "```json\n{\"id\":\"root\",\"name\":\"Atlas\",\"category\":\"strategy\",\
             \"children\":[{\"id\":\"ux\",\"name\":\"Onboarding\",\"category\":\"design\"}]}\n```",
        );
        let tree = generate_project_tree_with(&model, &request()).await.unwrap().unwrap();
        assert_eq!(tree.name, "Atlas");
        assert_eq!(tree.children[0].category, Some(Category::Design));

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].1.contains("Project name: Atlas"));
    }

    #[tokio::test]
    async fn non_json_modification_is_no_update() {
        let tree = TreeNode::new("root", "Atlas", None);
        let model = Canned::ok("I could not do that, sorry.");
        let m = modify_project_tree_with(&model, &tree, "rewrite everything").await.unwrap();
        assert_eq!(m, Modification::default());
    }

    #[tokio::test]
    async fn provider_failure_is_classified() {
        let tree = TreeNode::new("root", "Atlas", None);
        let model = Canned::failing("429 RESOURCE_EXHAUSTED");
        let err = modify_project_tree_with(&model, &tree, "x").await.unwrap_err();
        assert!(err.is_quota());

        let model = Canned::failing("timeout");
        let err = generate_project_tree_with(&model, &request()).await.unwrap_err();
        assert!(matches!(err, AiError::Request(ref m) if m == "timeout"));
    }

    #[tokio::test]
    async fn unconfigured_settings_fail_fast() {
        let err = generate_project_tree(&request(), &AiSettings::default()).await.unwrap_err();
        assert!(matches!(err, AiError::NotConfigured));
    }
}
