//! Change tracking and undo/redo for reactive scope trees.
//!
//! # Overview
//!
//! `hindsight` archives every detected change to a watched path onto a
//! per-(scope, path) history line with a movable cursor, enabling undo,
//! redo, revert-to-baseline, deep (per-element) watching across
//! collections, and grouped batch transactions that can later be rolled
//! back as a unit.
//!
//! The engine observes a [`hindsight_scope::ScopeTree`] — a hierarchical
//! tree of value namespaces reconciled by an explicit digest loop. The host
//! drives reconciliation: mutate values, then call
//! [`ScopeTree::digest`](hindsight_scope::ScopeTree::digest) (or
//! [`turn`](hindsight_scope::ScopeTree::turn), which also runs deferred
//! batch bodies).
//!
//! Seek operations (undo/redo/revert/rollback) re-arm their watch with the
//! first capture suppressed so the restored value is not re-archived. That
//! suppressed capture is consumed by the next digest — run one after a seek
//! before mutating the path again, as a run loop naturally does.
//!
//! # Example
//!
//! ```
//! use hindsight::History;
//! use hindsight_scope::ScopeTree;
//! use serde_json::json;
//!
//! let tree = ScopeTree::new();
//! let root = tree.root();
//! tree.assign(root, "title", json!("draft")).unwrap();
//!
//! let history = History::new(tree.clone());
//! history
//!     .watch(&["title"], root, Some("title is {{title}}"), None)
//!     .unwrap();
//! tree.digest(); // captures the baseline, without notification
//!
//! tree.assign(root, "title", json!("final")).unwrap();
//! tree.digest(); // archives the change
//!
//! assert_eq!(history.cursor(root, "title"), Some(1));
//! assert_eq!(history.description(root, "title").as_deref(), Some("title is final"));
//!
//! let seek = history.undo("title", root).unwrap();
//! assert!(seek.is_applied());
//! assert_eq!(tree.resolve(root, "title").unwrap(), Some(json!("draft")));
//! assert!(history.can_redo("title", root));
//! ```

pub mod error;
pub mod event;
pub mod expr;
pub mod handlers;
pub mod store;
pub mod transaction;
pub mod undo;

mod engine;

pub use engine::{History, LazyOptions, DEFAULT_SAMPLE_INTERVAL};
pub use error::HistoryError;
pub use event::{HistoryEvent, RollbackEntry, RollbackReport, ValueChange};
pub use expr::DeepWatchExpr;
pub use handlers::{HandlerArgs, HandlerBundle, HandlerFn, HandlerKind, Resolve};
pub use store::{Append, HistoryStore, PathHistory};
pub use transaction::Transaction;
pub use undo::Seek;

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
