//! Per-(scope, path) history lines with a movable cursor.
//!
//! A [`PathHistory`] is an ordered sequence of deep-copied snapshots plus an
//! integer cursor. The sequence is append-only except for two truncations:
//! entries beyond the cursor are dropped before a new write, and rollback
//! physically pops replayed entries so later undo/redo never see them.

use hindsight_scope::ScopeId;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// One path's archived snapshots. Invariant: `cursor < entries.len()`
/// whenever `entries` is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathHistory {
    pub entries: Vec<Value>,
    pub cursor: usize,
}

impl PathHistory {
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }
}

/// Outcome of [`HistoryStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// The very first capture for this key — the baseline; observers are not
    /// notified of it.
    Baseline,
    /// A subsequent capture; the cursor moved to the new last index.
    Archived { cursor: usize },
}

/// All history lines, keyed by scope id, then path (insertion ordered).
#[derive(Debug, Default)]
pub struct HistoryStore {
    lines: HashMap<ScopeId, IndexMap<String, PathHistory>>,
}

impl HistoryStore {
    /// Drops any redo entries beyond the cursor, pushes a deep copy of
    /// `value`, and moves the cursor to the new last index.
    pub fn append(&mut self, scope: ScopeId, path: &str, value: &Value) -> Append {
        let line = self
            .lines
            .entry(scope)
            .or_default()
            .entry(path.to_string())
            .or_default();
        if !line.entries.is_empty() {
            line.entries.truncate(line.cursor + 1);
        }
        line.entries.push(value.clone());
        line.cursor = line.entries.len() - 1;
        if line.cursor == 0 {
            Append::Baseline
        } else {
            Append::Archived {
                cursor: line.cursor,
            }
        }
    }

    pub fn line(&self, scope: ScopeId, path: &str) -> Option<&PathHistory> {
        self.lines.get(&scope).and_then(|paths| paths.get(path))
    }

    pub fn line_mut(&mut self, scope: ScopeId, path: &str) -> Option<&mut PathHistory> {
        self.lines.get_mut(&scope).and_then(|paths| paths.get_mut(path))
    }

    /// Installs a whole line, replacing any existing one (used to seed
    /// transactional shadow scopes).
    pub fn put_line(&mut self, scope: ScopeId, path: &str, line: PathHistory) {
        self.lines
            .entry(scope)
            .or_default()
            .insert(path.to_string(), line);
    }

    /// Whether `index` is a valid cursor position for the line.
    pub fn seek(&self, scope: ScopeId, path: &str, index: usize) -> bool {
        self.line(scope, path)
            .is_some_and(|line| index < line.entries.len())
    }

    /// Paths tracked for a scope, in registration order.
    pub fn paths(&self, scope: ScopeId) -> Vec<String> {
        self.lines
            .get(&scope)
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_scope(&self, scope: ScopeId) -> bool {
        self.lines.contains_key(&scope)
    }

    pub fn forget_path(&mut self, scope: ScopeId, path: &str) -> bool {
        let Some(paths) = self.lines.get_mut(&scope) else {
            return false;
        };
        let removed = paths.shift_remove(path).is_some();
        if paths.is_empty() {
            self.lines.remove(&scope);
        }
        removed
    }

    pub fn forget_scope(&mut self, scope: ScopeId) {
        self.lines.remove(&scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> ScopeId {
        hindsight_scope::ScopeTree::new().root()
    }

    #[test]
    fn first_append_is_the_baseline() {
        let mut store = HistoryStore::default();
        let s = scope();
        assert_eq!(store.append(s, "a", &json!(1)), Append::Baseline);
        assert_eq!(store.append(s, "a", &json!(2)), Append::Archived { cursor: 1 });
        assert_eq!(store.line(s, "a").unwrap().entries, vec![json!(1), json!(2)]);
    }

    #[test]
    fn append_truncates_redo_entries() {
        let mut store = HistoryStore::default();
        let s = scope();
        for n in 1..=4 {
            store.append(s, "a", &json!(n));
        }
        store.line_mut(s, "a").unwrap().cursor = 1;
        assert_eq!(store.append(s, "a", &json!(9)), Append::Archived { cursor: 2 });
        assert_eq!(
            store.line(s, "a").unwrap().entries,
            vec![json!(1), json!(2), json!(9)]
        );
    }

    #[test]
    fn seek_validates_bounds() {
        let mut store = HistoryStore::default();
        let s = scope();
        assert!(!store.seek(s, "a", 0));
        store.append(s, "a", &json!(1));
        store.append(s, "a", &json!(2));
        assert!(store.seek(s, "a", 0));
        assert!(store.seek(s, "a", 1));
        assert!(!store.seek(s, "a", 2));
    }

    #[test]
    fn forget_removes_lines_and_scopes() {
        let mut store = HistoryStore::default();
        let s = scope();
        store.append(s, "a", &json!(1));
        store.append(s, "b", &json!(2));
        assert!(store.forget_path(s, "a"));
        assert!(!store.forget_path(s, "a"));
        assert!(store.contains_scope(s));
        store.forget_scope(s);
        assert!(!store.contains_scope(s));
    }

    #[test]
    fn paths_keep_registration_order() {
        let mut store = HistoryStore::default();
        let s = scope();
        store.append(s, "b", &json!(1));
        store.append(s, "a", &json!(1));
        assert_eq!(store.paths(s), vec!["b".to_string(), "a".to_string()]);
    }
}
