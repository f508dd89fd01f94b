//! `{{path}}` string interpolation against a scope.

use crate::scope::{ScopeId, ScopeTree};
use serde_json::Value;

/// Renders `template`, replacing every `{{path}}` with the value resolved
/// against `scope`. Strings render bare, other values as JSON; unresolved
/// paths render empty.
///
/// # Example
///
/// ```
/// use hindsight_scope::{interpolate, ScopeTree};
/// use serde_json::json;
///
/// let tree = ScopeTree::new();
/// let root = tree.root();
/// tree.assign(root, "user", json!({"name": "ada", "age": 36})).unwrap();
///
/// let rendered = interpolate(&tree, root, "{{user.name}} is {{user.age}}");
/// assert_eq!(rendered, "ada is 36");
/// ```
pub fn interpolate(tree: &ScopeTree, scope: ScopeId, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated marker renders verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let expr = after_open[..end].trim();
        match tree.resolve(scope, expr) {
            Ok(Some(Value::String(s))) => out.push_str(&s),
            Ok(Some(v)) => out.push_str(&v.to_string()),
            _ => {}
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_values_and_skips_unresolved() {
        let tree = ScopeTree::new();
        let root = tree.root();
        tree.assign(root, "n", json!(3)).unwrap();
        assert_eq!(interpolate(&tree, root, "n = {{n}}"), "n = 3");
        assert_eq!(interpolate(&tree, root, "missing: {{nope}}!"), "missing: !");
        assert_eq!(interpolate(&tree, root, "no markers"), "no markers");
    }

    #[test]
    fn unterminated_marker_is_verbatim() {
        let tree = ScopeTree::new();
        assert_eq!(interpolate(&tree, tree.root(), "a {{b"), "a {{b");
    }
}
