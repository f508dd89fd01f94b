//! Engine events published on the global bus.
//!
//! External listeners subscribe through [`crate::History::subscribe`]; the
//! transaction engine also listens to [`HistoryEvent::Archived`] internally
//! while a batch is open.

use hindsight_scope::ScopeId;
use indexmap::IndexMap;
use serde_json::Value;

/// One value transition recorded by a seek or rollback step.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old_value: Value,
    pub new_value: Value,
}

/// Per-path record of the undo steps a rollback replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackEntry {
    /// Transitions in replay order (latest change undone first).
    pub steps: Vec<ValueChange>,
    /// Description rendered at each step, if any.
    pub descriptions: Vec<Option<String>>,
    /// The live scope whose value was rolled back.
    pub scope: ScopeId,
    /// The transactional shadow that supplied the baseline cursor.
    pub shadow: ScopeId,
}

/// Full rollback report, keyed by path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RollbackReport {
    pub paths: IndexMap<String, RollbackEntry>,
}

impl RollbackReport {
    pub fn get(&self, path: &str) -> Option<&RollbackEntry> {
        self.paths.get(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    /// A watched value changed and was captured onto its history line.
    /// Not published for the baseline (first) capture.
    Archived {
        scope: ScopeId,
        path: String,
        old_value: Value,
        new_value: Value,
        description: Option<String>,
    },
    Undone {
        scope: ScopeId,
        path: String,
        old_value: Value,
        new_value: Value,
        description: Option<String>,
    },
    Redone {
        scope: ScopeId,
        path: String,
        old_value: Value,
        new_value: Value,
        description: Option<String>,
    },
    Reverted {
        scope: ScopeId,
        path: String,
        old_value: Value,
        new_value: Value,
        description: Option<String>,
        /// The history index the path was reverted to.
        cursor: usize,
    },
    BatchBegan {
        transaction: ScopeId,
        description: Option<String>,
    },
    BatchEnded {
        transaction: ScopeId,
        description: Option<String>,
    },
    RolledBack {
        transaction: ScopeId,
        report: RollbackReport,
    },
}
