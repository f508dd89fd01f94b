//! Cursor-seeking operations: undo, redo, revert.

use crate::error::HistoryError;
use crate::event::HistoryEvent;
use crate::handlers::HandlerKind;
use crate::History;
use hindsight_scope::ScopeId;

/// Outcome of a seek operation.
///
/// Boundary conditions — undo at index 0, redo at the end, revert with no
/// history — leave state untouched and are reported here rather than as
/// errors; operating on a path that was never archived at all is the fatal
/// [`HistoryError::NoHistory`].
#[derive(Debug, Clone, PartialEq)]
pub enum Seek {
    Applied {
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    },
    AtBoundary,
}

impl Seek {
    pub fn is_applied(&self) -> bool {
        matches!(self, Seek::Applied { .. })
    }
}

impl History {
    /// Steps a path back to its previous archived value.
    pub fn undo(&self, path: &str, scope: ScopeId) -> Result<Seek, HistoryError> {
        let cursor = {
            let st = self.state.borrow();
            match st.store.line(scope, path) {
                None => {
                    return Err(HistoryError::NoHistory {
                        scope,
                        path: path.to_string(),
                    })
                }
                Some(line) => line.cursor,
            }
        };
        if cursor == 0 {
            tracing::warn!(scope = %scope, path, "attempt to undo past history");
            return Ok(Seek::AtBoundary);
        }
        let index = cursor - 1;
        self.set_cursor(scope, path, index);
        let (old_value, new_value) = self.reassign(scope, path, index)?;
        if let Some(bundle) = self.owner_bundle(scope, path) {
            bundle.fire(HandlerKind::Undo, &self.tree, Some(scope));
        }
        self.bus.publish(&HistoryEvent::Undone {
            scope,
            path: path.to_string(),
            old_value: old_value.clone(),
            new_value: new_value.clone(),
            description: self.description(scope, path),
        });
        Ok(Seek::Applied {
            old_value,
            new_value,
        })
    }

    /// Steps a path forward to its next archived value.
    pub fn redo(&self, path: &str, scope: ScopeId) -> Result<Seek, HistoryError> {
        let (cursor, len) = {
            let st = self.state.borrow();
            match st.store.line(scope, path) {
                None => {
                    return Err(HistoryError::NoHistory {
                        scope,
                        path: path.to_string(),
                    })
                }
                Some(line) => (line.cursor, line.entries.len()),
            }
        };
        if cursor + 1 >= len {
            tracing::warn!(scope = %scope, path, "attempt to redo past history");
            return Ok(Seek::AtBoundary);
        }
        let index = cursor + 1;
        self.set_cursor(scope, path, index);
        let (old_value, new_value) = self.reassign(scope, path, index)?;
        if let Some(bundle) = self.owner_bundle(scope, path) {
            bundle.fire(HandlerKind::Redo, &self.tree, Some(scope));
        }
        self.bus.publish(&HistoryEvent::Redone {
            scope,
            path: path.to_string(),
            old_value: old_value.clone(),
            new_value: new_value.clone(),
            description: self.description(scope, path),
        });
        Ok(Seek::Applied {
            old_value,
            new_value,
        })
    }

    /// Reverts a path to its baseline (index 0).
    pub fn revert(&self, path: &str, scope: ScopeId) -> Result<Seek, HistoryError> {
        self.revert_to(path, scope, 0)
    }

    /// Reverts a path to an arbitrary history index. Entries beyond the
    /// target are preserved — only the cursor moves, so redo can walk
    /// forward again.
    pub fn revert_to(
        &self,
        path: &str,
        scope: ScopeId,
        index: usize,
    ) -> Result<Seek, HistoryError> {
        let tracked = { self.state.borrow().store.line(scope, path).is_some() };
        if !tracked {
            tracing::warn!(scope = %scope, path, "nothing to revert");
            return Ok(Seek::AtBoundary);
        }
        let in_range = { self.state.borrow().store.seek(scope, path, index) };
        if !in_range {
            tracing::warn!(scope = %scope, path, index, "revert target past history");
            return Ok(Seek::AtBoundary);
        }
        let (old_value, new_value) = self.reassign(scope, path, index)?;
        self.set_cursor(scope, path, index);
        if let Some(bundle) = self.owner_bundle(scope, path) {
            bundle.fire(HandlerKind::Change, &self.tree, Some(scope));
        }
        self.bus.publish(&HistoryEvent::Reverted {
            scope,
            path: path.to_string(),
            old_value: old_value.clone(),
            new_value: new_value.clone(),
            description: self.description(scope, path),
            cursor: index,
        });
        Ok(Seek::Applied {
            old_value,
            new_value,
        })
    }

    /// Whether any undo step is available for a path.
    pub fn can_undo(&self, path: &str, scope: ScopeId) -> bool {
        self.state
            .borrow()
            .store
            .line(scope, path)
            .is_some_and(|line| line.can_undo())
    }

    /// Whether any redo step is available for a path.
    pub fn can_redo(&self, path: &str, scope: ScopeId) -> bool {
        self.state
            .borrow()
            .store
            .line(scope, path)
            .is_some_and(|line| line.can_redo())
    }

    fn set_cursor(&self, scope: ScopeId, path: &str, index: usize) {
        if let Some(line) = self.state.borrow_mut().store.line_mut(scope, path) {
            line.cursor = index;
        }
    }
}
