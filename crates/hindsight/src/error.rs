//! Error taxonomy.
//!
//! Fatal conditions (invalid arguments, non-assignable paths, missing
//! history, invalid rollback targets) are [`HistoryError`] values. Expected
//! boundary conditions — undoing past index 0, redoing past the end,
//! reverting with nothing to revert — are not errors: they surface as
//! [`crate::Seek::AtBoundary`] and a warning.

use hindsight_scope::{PathError, ScopeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("at least one path is required")]
    PathsRequired,
    #[error("path {path:?} is not assignable")]
    NotAssignable {
        path: String,
        #[source]
        source: PathError,
    },
    #[error(
        "expected expression of the form \"<target> for (<key>,)? <value> in <collection>\" \
         but got {expression:?}"
    )]
    BadDeepWatchExpression { expression: String },
    #[error("no history for path {path:?} in scope {scope}")]
    NoHistory { scope: ScopeId, path: String },
    #[error("scope {scope} is not a transaction")]
    NotATransaction { scope: ScopeId },
    #[error("unknown scope {scope}")]
    UnknownScope { scope: ScopeId },
    #[error(transparent)]
    Path(#[from] PathError),
}
