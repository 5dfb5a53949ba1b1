use serde_json::Value;

use archforge_core::TreeNode;

use crate::Modification;

/// Best-effort JSON recovery from model output.
///
/// Cuts from the first `{`/`[` to the last `}`/`]` (whichever comes first and
/// last respectively) and parses that. When nothing parses, returns an empty
/// array if the text looked like one and an empty object otherwise.
pub fn repair_json(text: &str) -> Value {
    let trimmed = text.trim();
    let candidate = slice_json(trimmed).unwrap_or(trimmed);
    match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, len = text.len(), "unparseable model output");
            if trimmed.starts_with('[') {
                Value::Array(Vec::new())
            } else {
                Value::Object(Default::default())
            }
        }
    }
}

fn slice_json(text: &str) -> Option<&str> {
    let start = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(square)) => brace.min(square),
        (brace, square) => brace.or(square)?,
    };
    let end = match (text.rfind('}'), text.rfind(']')) {
        (Some(brace), Some(square)) => brace.max(square),
        (brace, square) => brace.or(square)?,
    };
    (end >= start).then(|| &text[start..=end])
}

/// A generated tree. Some models wrap it as `{"tree": {...}}`; accept that too.
pub(crate) fn parse_tree(raw: &str) -> Option<TreeNode> {
    let value = repair_json(raw);
    match value.get("tree") {
        Some(inner) if value.get("id").is_none() => TreeNode::from_value(inner.clone()),
        _ => TreeNode::from_value(value),
    }
}

pub(crate) fn parse_modification(raw: &str) -> Modification {
    let value = repair_json(raw);
    let tree = value.get("tree").cloned().and_then(TreeNode::from_value);
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    Modification { tree, feedback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_prose_and_fences() {
        let raw = "Sure! Here it is:\n```json\n{\"id\":\"root\",\"name\":\"App\"}\n```\nEnjoy.";
        assert_eq!(repair_json(raw), json!({"id": "root", "name": "App"}));
    }

    #[test]
    fn array_wins_when_it_starts_first() {
        assert_eq!(repair_json("x [1, {\"a\": 2}] y"), json!([1, {"a": 2}]));
    }

    #[test]
    fn degrades_to_empty_object_or_array() {
        assert_eq!(repair_json("not json"), json!({}));
        assert_eq!(repair_json("{ broken"), json!({}));
        assert_eq!(repair_json("[1, 2"), json!([]));
        assert_eq!(repair_json(""), json!({}));
    }

    #[test]
    fn closing_before_opening_is_not_sliced() {
        assert_eq!(repair_json("} oops {"), json!({}));
    }

    #[test]
    fn tree_from_plain_and_wrapped_payloads() {
        let plain = r#"{"id":"root","name":"Shop","category":"strategy","children":[{"id":"a","name":"Cart","category":"implementation"}]}"#;
        let tree = parse_tree(plain).unwrap();
        assert_eq!(tree.children.len(), 1);

        let wrapped = format!("{{\"tree\": {plain}}}");
        assert_eq!(parse_tree(&wrapped).unwrap(), tree);
    }

    #[test]
    fn garbage_yields_no_tree() {
        assert!(parse_tree("not json").is_none());
        assert!(parse_tree("[]").is_none());
    }

    #[test]
    fn edit_with_repeated_ids_keeps_only_feedback() {
        let m = parse_modification(
            r#"{"tree":{"id":"r","name":"R","children":[{"id":"x","name":"A"},{"id":"x","name":"B"}]},"feedback":"Split it."}"#,
        );
        assert!(m.tree.is_none());
        assert_eq!(m.feedback.as_deref(), Some("Split it."));
    }

    #[test]
    fn modification_fields_are_independent() {
        let m = parse_modification(r#"{"tree":{"id":"r","name":"R"},"feedback":"  Merged two branches. "}"#);
        assert_eq!(m.tree.unwrap().id, "r");
        assert_eq!(m.feedback.as_deref(), Some("Merged two branches."));

        let m = parse_modification(r#"{"feedback":"Nothing to change"}"#);
        assert!(m.tree.is_none());
        assert_eq!(m.feedback.as_deref(), Some("Nothing to change"));

        let m = parse_modification("not json");
        assert!(m.tree.is_none());
        assert!(m.feedback.is_none());
    }
}
