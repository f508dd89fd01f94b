//! Deep-watch expression grammar.
//!
//! `<target> for <value> in <collection>` watches `target` (evaluated
//! against a per-element child scope) for every element of `collection`.
//! The keyed form `<target> for (<key>, <value>) in <collection>` also
//! binds the element's key or index.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepWatchExpr {
    pub target: String,
    pub key: Option<String>,
    pub value: String,
    pub collection: String,
}

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(
            r"^\s*(.*?)\s+for\s+(?:([A-Za-z_$][A-Za-z0-9_$]*)|\(\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*,\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\))\s+in\s+(.*?)\s*$",
        )
        .expect("deep-watch grammar is a fixed, valid pattern")
    })
}

/// Parses a deep-watch expression; `None` when it does not match the
/// grammar.
pub fn parse(expression: &str) -> Option<DeepWatchExpr> {
    let captures = grammar().captures(expression)?;
    let target = captures.get(1)?.as_str().to_string();
    if target.is_empty() {
        return None;
    }
    let (key, value) = match (captures.get(2), captures.get(3), captures.get(4)) {
        (Some(value), _, _) => (None, value.as_str().to_string()),
        (None, Some(key), Some(value)) => {
            (Some(key.as_str().to_string()), value.as_str().to_string())
        }
        _ => return None,
    };
    let collection = captures.get(5)?.as_str().to_string();
    if collection.is_empty() {
        return None;
    }
    Some(DeepWatchExpr {
        target,
        key,
        value,
        collection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_plain_form() {
        let expr = parse("v.name for v in items").unwrap();
        assert_eq!(expr.target, "v.name");
        assert_eq!(expr.key, None);
        assert_eq!(expr.value, "v");
        assert_eq!(expr.collection, "items");
    }

    #[test]
    fn parses_the_keyed_form() {
        let expr = parse("v.name for (k, v) in data.items").unwrap();
        assert_eq!(expr.target, "v.name");
        assert_eq!(expr.key.as_deref(), Some("k"));
        assert_eq!(expr.value, "v");
        assert_eq!(expr.collection, "data.items");
    }

    #[test]
    fn tolerates_extra_whitespace() {
        let expr = parse("  v.name   for  ( k ,  v )  in   items  ").unwrap();
        assert_eq!(expr.key.as_deref(), Some("k"));
        assert_eq!(expr.collection, "items");
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(parse("v.name"), None);
        assert_eq!(parse("for v in items"), None);
        assert_eq!(parse("v.name for in items"), None);
        assert_eq!(parse("v.name for (k v) in items"), None);
        assert_eq!(parse("v.name for v items"), None);
    }
}
