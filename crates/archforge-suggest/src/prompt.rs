use archforge_core::TreeNode;

use crate::GenerationRequest;

const TREE_SHAPE: &str = "{\"id\":\"<unique id>\",\"name\":\"<short label>\",\
\"category\":\"strategy\"|\"design\"|\"implementation\",\"description\":\"<optional>\",\
\"children\":[ ...same shape... ]}";

pub fn generation_system_prompt() -> String {
    format!(
        "You are a skill-tree architect for software projects. Break the project down into a \
tree whose branches cover three categories: \"strategy\" (goals, audience, positioning), \
\"design\" (experience, visual language, flows) and \"implementation\" (architecture, \
services, infrastructure).\n\n\
Rules:\n\
- Every node must carry a \"category\" from exactly that set of three values\n\
- Ids must be unique across the whole tree\n\
- Keep names short enough to fit on a diagram node\n\
- Two to four levels deep is usually enough\n\n\
Output ONLY one JSON object of this shape, nothing else:\n{TREE_SHAPE}"
    )
}

pub fn generation_user_message(req: &GenerationRequest) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("Project name: ");
    out.push_str(&req.project_name);
    out.push('\n');

    let features = req.feature_list();
    if !features.is_empty() {
        out.push_str("Features: ");
        out.push_str(&features);
        out.push('\n');
    }
    if !req.notes.trim().is_empty() {
        out.push_str("Requirements: ");
        out.push_str(req.notes.trim());
        out.push('\n');
    }
    if !req.deploy_target.trim().is_empty() {
        out.push_str("Deploy target: ");
        out.push_str(req.deploy_target.trim());
        out.push('\n');
    }
    if !req.theme.trim().is_empty() {
        out.push_str("Theme: ");
        out.push_str(req.theme.trim());
        out.push('\n');
    }
    out
}

pub fn modification_system_prompt() -> String {
    format!(
        "You are a software architect editing an existing project tree. Apply the user's \
instruction to the tree and explain the intent of the change briefly.\n\n\
Rules:\n\
- Keep the ids of nodes you do not touch\n\
- Every node keeps a \"category\" of \"strategy\", \"design\" or \"implementation\"\n\
- Return the complete tree, not a diff\n\n\
Output ONLY one JSON object: {{\"tree\": {TREE_SHAPE}, \"feedback\": \"<one or two sentences>\"}}"
    )
}

pub fn modification_user_message(tree: &TreeNode, instruction: &str) -> String {
    let current = serde_json::to_string(tree).unwrap_or_else(|_| "{}".to_string());
    format!("Current tree: {current}\nInstruction: \"{}\"", instruction.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_core::Category;

    #[test]
    fn system_prompts_pin_the_categories() {
        for prompt in [generation_system_prompt(), modification_system_prompt()] {
            for c in ["strategy", "design", "implementation"] {
                assert!(prompt.contains(c));
            }
        }
    }

    #[test]
    fn blank_fields_are_left_out() {
        let req = GenerationRequest {
            project_name: "Atlas".into(),
            features: vec!["Maps".into(), "  ".into(), "Search".into()],
            notes: String::new(),
            deploy_target: "  ".into(),
            theme: "Neon".into(),
        };
        let msg = generation_user_message(&req);
        assert!(msg.contains("Features: Maps, Search\n"));
        assert!(!msg.contains("Requirements"));
        assert!(!msg.contains("Deploy"));
        assert!(msg.ends_with("Theme: Neon\n"));
    }

    #[test]
    fn current_tree_is_sent_as_json() {
        let tree = TreeNode::new("root", "Atlas", Some(Category::Strategy));
        let msg = modification_user_message(&tree, " add a blog ");
        assert!(msg.starts_with("Current tree: {\"id\":\"root\""));
        assert!(msg.ends_with("Instruction: \"add a blog\""));
    }
}
