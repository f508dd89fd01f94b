//! Named handler bundles fired on history events.
//!
//! A [`HandlerBundle`] keeps five registries of named callbacks, one per
//! event kind. Each handler carries a `resolve` table describing the
//! parameters it wants: a [`Resolve::Literal`] passes through unchanged,
//! while a [`Resolve::Path`] is resolved against the firing scope at fire
//! time. Rollback handlers fire without a scope, so a `Path` entry degrades
//! to its literal path string there.

use hindsight_scope::{ScopeId, ScopeTree};
use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Event kinds a bundle can carry handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Change,
    Undo,
    Redo,
    Revert,
    Rollback,
}

impl HandlerKind {
    fn index(self) -> usize {
        match self {
            HandlerKind::Change => 0,
            HandlerKind::Undo => 1,
            HandlerKind::Redo => 2,
            HandlerKind::Revert => 3,
            HandlerKind::Rollback => 4,
        }
    }
}

/// How a handler parameter is produced at fire time.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolve {
    Literal(Value),
    Path(String),
}

/// Parameters handed to a handler callback, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandlerArgs {
    values: IndexMap<String, Value>,
}

impl HandlerArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type HandlerFn = Rc<dyn Fn(&HandlerArgs)>;

#[derive(Clone)]
struct Handler {
    callback: HandlerFn,
    resolve: Vec<(String, Resolve)>,
}

/// Per-registration collection of named handlers keyed by event kind.
#[derive(Default)]
pub struct HandlerBundle {
    slots: RefCell<[IndexMap<String, Handler>; 5]>,
}

impl std::fmt::Debug for HandlerBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBundle")
            .field(
                "slots",
                &self
                    .slots
                    .borrow()
                    .iter()
                    .map(|slot| slot.keys().cloned().collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HandlerBundle {
    pub fn new() -> Self {
        HandlerBundle::default()
    }

    /// Registers (or replaces) the handler named `name` under `kind`.
    pub fn add_handler(
        &self,
        kind: HandlerKind,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        let handler = Handler {
            callback: Rc::new(callback),
            resolve: resolve
                .iter()
                .map(|(k, r)| (k.to_string(), r.clone()))
                .collect(),
        };
        self.slots.borrow_mut()[kind.index()].insert(name.to_string(), handler);
    }

    pub fn remove_handler(&self, kind: HandlerKind, name: &str) -> bool {
        self.slots.borrow_mut()[kind.index()]
            .shift_remove(name)
            .is_some()
    }

    pub fn add_change_handler(
        &self,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        self.add_handler(HandlerKind::Change, name, callback, resolve);
    }

    pub fn add_undo_handler(
        &self,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        self.add_handler(HandlerKind::Undo, name, callback, resolve);
    }

    pub fn add_redo_handler(
        &self,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        self.add_handler(HandlerKind::Redo, name, callback, resolve);
    }

    pub fn add_revert_handler(
        &self,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        self.add_handler(HandlerKind::Revert, name, callback, resolve);
    }

    pub fn add_rollback_handler(
        &self,
        name: &str,
        callback: impl Fn(&HandlerArgs) + 'static,
        resolve: &[(&str, Resolve)],
    ) {
        self.add_handler(HandlerKind::Rollback, name, callback, resolve);
    }

    pub fn remove_change_handler(&self, name: &str) -> bool {
        self.remove_handler(HandlerKind::Change, name)
    }

    pub fn remove_undo_handler(&self, name: &str) -> bool {
        self.remove_handler(HandlerKind::Undo, name)
    }

    pub fn remove_redo_handler(&self, name: &str) -> bool {
        self.remove_handler(HandlerKind::Redo, name)
    }

    pub fn remove_revert_handler(&self, name: &str) -> bool {
        self.remove_handler(HandlerKind::Revert, name)
    }

    pub fn remove_rollback_handler(&self, name: &str) -> bool {
        self.remove_handler(HandlerKind::Rollback, name)
    }

    /// Fires every handler registered under `kind`, in registration order.
    /// The handler list is snapshotted first, so callbacks may add or remove
    /// handlers reentrantly.
    pub(crate) fn fire(&self, kind: HandlerKind, tree: &ScopeTree, scope: Option<ScopeId>) {
        let handlers: Vec<Handler> = self.slots.borrow()[kind.index()].values().cloned().collect();
        for handler in handlers {
            let mut values = IndexMap::new();
            for (name, resolve) in &handler.resolve {
                let value = match resolve {
                    Resolve::Literal(v) => v.clone(),
                    Resolve::Path(p) => match scope {
                        Some(scope) => tree
                            .resolve(scope, p)
                            .ok()
                            .flatten()
                            .unwrap_or(Value::Null),
                        None => Value::String(p.clone()),
                    },
                };
                values.insert(name.clone(), value);
            }
            (handler.callback)(&HandlerArgs { values });
        }
    }
}
